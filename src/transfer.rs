use std::io::{self, Read, Seek, SeekFrom};

use crate::error::Result;
use crate::fsys;
use crate::protocol::Header;
use crate::{ENCRYPTION_OVERHEAD, MAX_PACKET_SIZE};

/// Largest file payload that fits into one FILEBYTES packet.
///
/// The header, the delimiter and the 8-byte file id are subtracted from
/// the packet maximum, plus the encryption allowance when the session
/// carries a key.
pub fn piece_budget(encrypted: bool) -> u64 {
    let framing = Header::FileBytes.as_bytes().len() as u64 + 1 + 8;
    let mut budget = MAX_PACKET_SIZE - framing;
    if encrypted {
        budget -= ENCRYPTION_OVERHEAD;
    }
    budget
}

/// Reads the next piece of the file, at most `budget` bytes, starting at
/// the transferred-bytes cursor. Returns `Ok(None)` once the whole file
/// has been read; the cursor advances by the bytes actually read, so the
/// sequence can be resumed from any cursor position.
pub fn next_piece(file: &mut fsys::File, budget: u64) -> Result<Option<Vec<u8>>> {
    if file.transferred >= file.size {
        return Ok(None);
    }

    let want = budget.min(file.size - file.transferred);
    let offset = file.transferred;

    let handle = file.open()?;
    handle.seek(SeekFrom::Start(offset))?;

    let mut piece = vec![0u8; want as usize];
    let mut read = 0usize;
    while read < piece.len() {
        let n = handle.read(&mut piece[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }

    if read == 0 {
        // announced size no longer matches what is on disk
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{} ended before its announced size", file.name),
        )
        .into());
    }

    piece.truncate(read);
    file.transferred += read as u64;

    Ok(Some(piece))
}
