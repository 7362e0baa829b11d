use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use sha2::{Digest, Sha256};

const CHUNKS: u64 = 100;
const CHUNK_SIZE: u64 = 100;
const STEP: u64 = 250;

/// Files of this size or smaller are hashed whole instead of sampled.
pub const SAMPLE_THRESHOLD: u64 = CHUNKS * CHUNK_SIZE + STEP * (CHUNKS - 1);

/// Returns the hex-encoded checksum of a file.
///
/// Large files are not hashed in full: starting at the beginning of the
/// file, 100-byte chunks are captured with a 250-byte step between them
/// and the SHA-256 of the concatenated chunks is used instead.
/// BOF... CHUNK -> STEP -> CHUNK... EOF
///
/// Both peers run the same sampling over the same sizes, so the digests
/// are directly comparable.
pub fn partial_checksum(file: &mut File) -> io::Result<String> {
    let file_size = file.metadata()?.len();

    if file_size <= SAMPLE_THRESHOLD {
        // too small to chop into chunks, take the full checksum
        return full_checksum(file);
    }

    let mut captured = Vec::with_capacity((CHUNKS * CHUNK_SIZE) as usize);
    let mut offset: u64 = 0;

    for _ in 0..CHUNKS {
        let read = read_chunk_at(file, offset, &mut captured)?;
        offset += read + STEP;
    }

    Ok(hex::encode(Sha256::digest(&captured)))
}

/// Reads up to one chunk at the given offset, appending whatever could be
/// read (a short chunk at end of file is kept as-is). Returns the number
/// of bytes read.
fn read_chunk_at(file: &mut File, offset: u64, out: &mut Vec<u8>) -> io::Result<u64> {
    file.seek(SeekFrom::Start(offset))?;

    let mut buffer = [0u8; CHUNK_SIZE as usize];
    let mut read = 0usize;
    while read < buffer.len() {
        let n = file.read(&mut buffer[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }

    out.extend_from_slice(&buffer[..read]);
    Ok(read as u64)
}

fn full_checksum(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;

    let mut hasher = Sha256::new();
    io::copy(file, &mut hasher)?;

    Ok(hex::encode(hasher.finalize()))
}
