//! Readers for the packet bodies defined in [`construct`](super::construct).

use crate::error::{Result, TransferError};
use crate::fsys;
use crate::protocol::{DIR_CODE, FILE_CODE};

/// Cursor over a packet body. Every read fails cleanly on a truncated
/// body instead of panicking.
struct BodyReader<'a> {
    body: &'a [u8],
    position: usize,
}

impl<'a> BodyReader<'a> {
    fn new(body: &'a [u8]) -> BodyReader<'a> {
        BodyReader { body, position: 0 }
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_exact(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.body.len() - self.position < len {
            return Err(TransferError::Protocol("truncated packet body".to_string()));
        }
        let slice = &self.body[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    fn read_length_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u64()?;
        self.read_exact(len as usize)
    }

    fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_length_prefixed()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| TransferError::Protocol("packet field is not valid UTF-8".to_string()))
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.body[self.position..];
        self.position = self.body.len();
        slice
    }
}

/// What a TRANSFEROFFER announces: one file, or a whole directory.
#[derive(Debug)]
pub enum TransferOffer {
    File(fsys::File),
    Directory { name: String, size: u64 },
}

impl TransferOffer {
    pub fn total_size(&self) -> u64 {
        match self {
            TransferOffer::File(file) => file.size,
            TransferOffer::Directory { size, .. } => *size,
        }
    }
}

/// ENCRKEY body: the announced session key.
pub fn decode_encryption_key(body: &[u8]) -> Result<Vec<u8>> {
    let mut reader = BodyReader::new(body);
    Ok(reader.read_length_prefixed()?.to_vec())
}

/// FILE body: a file descriptor with no local path yet.
pub fn decode_file(body: &[u8]) -> Result<fsys::File> {
    let mut reader = BodyReader::new(body);

    let id = reader.read_u64()?;
    let name = reader.read_string()?;
    let size = reader.read_u64()?;
    let checksum = reader.read_string()?;
    let relative_path = reader.read_string()?;

    Ok(fsys::File::incoming(id, name, size, checksum, relative_path))
}

/// DIRECTORY body: name and total recursive size.
pub fn decode_directory(body: &[u8]) -> Result<(String, u64)> {
    let mut reader = BodyReader::new(body);

    let name = reader.read_string()?;
    let size = reader.read_u64()?;

    Ok((name, size))
}

/// TRANSFEROFFER body: discriminant byte, then a FILE or DIRECTORY body.
pub fn decode_transfer_offer(body: &[u8]) -> Result<TransferOffer> {
    let Some((&kind, rest)) = body.split_first() else {
        return Err(TransferError::Protocol("empty transfer offer".to_string()));
    };

    match kind {
        FILE_CODE => Ok(TransferOffer::File(decode_file(rest)?)),
        DIR_CODE => {
            let (name, size) = decode_directory(rest)?;
            Ok(TransferOffer::Directory { name, size })
        }
        other => Err(TransferError::Protocol(format!(
            "unknown transfer offer kind {:#04x}",
            other
        ))),
    }
}

/// ENDFILE / ALREADYHAVE body: a lone file id.
pub fn decode_file_id(body: &[u8]) -> Result<u64> {
    BodyReader::new(body).read_u64()
}

/// FILEBYTES body: the file id and the raw content bytes.
pub fn decode_file_bytes(body: &[u8]) -> Result<(u64, &[u8])> {
    let mut reader = BodyReader::new(body);
    let id = reader.read_u64()?;
    Ok((id, reader.rest()))
}

/// SYMLINK body: link path and target path.
pub fn decode_symlink(body: &[u8]) -> Result<(String, String)> {
    let mut reader = BodyReader::new(body);
    let path = reader.read_string()?;
    let target = reader.read_string()?;
    Ok((path, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::construct;

    #[test]
    fn test_file_packet_roundtrip() {
        let mut file = fsys::File::incoming(
            3,
            "видео.mp4".into(),
            123_456,
            "ab".repeat(32),
            "sub/видео.mp4".into(),
        );
        file.transferred = 99; // not part of the wire format

        let packet = construct::file_packet(&file);
        let decoded = decode_file(&packet.body).unwrap();

        assert_eq!(decoded.id, 3);
        assert_eq!(decoded.name, "видео.mp4");
        assert_eq!(decoded.size, 123_456);
        assert_eq!(decoded.checksum, "ab".repeat(32));
        assert_eq!(decoded.relative_path, "sub/видео.mp4");
        assert_eq!(decoded.transferred, 0);
    }

    #[test]
    fn test_transfer_offer_file_roundtrip() {
        let file = fsys::File::incoming(0, "a.txt".into(), 13, "cafe".into(), String::new());
        let packet = construct::offer_file_packet(&file);

        match decode_transfer_offer(&packet.body).unwrap() {
            TransferOffer::File(decoded) => {
                assert_eq!(decoded.name, "a.txt");
                assert_eq!(decoded.size, 13);
            }
            other => panic!("expected a file offer, got {:?}", other),
        }
    }

    #[test]
    fn test_transfer_offer_directory_roundtrip() {
        let directory = fsys::Directory {
            name: "photos".into(),
            path: std::path::PathBuf::new(),
            size: 42_000,
            files: Vec::new(),
            symlinks: Vec::new(),
        };
        let packet = construct::offer_directory_packet(&directory);

        match decode_transfer_offer(&packet.body).unwrap() {
            TransferOffer::Directory { name, size } => {
                assert_eq!(name, "photos");
                assert_eq!(size, 42_000);
            }
            other => panic!("expected a directory offer, got {:?}", other),
        }
    }

    #[test]
    fn test_transfer_offer_rejects_unknown_kind() {
        assert!(decode_transfer_offer(b"x0123").is_err());
        assert!(decode_transfer_offer(b"").is_err());
    }

    #[test]
    fn test_encryption_key_roundtrip() {
        let packet = construct::encryption_key_packet(&[7u8; 32]);
        assert_eq!(decode_encryption_key(&packet.body).unwrap(), vec![7u8; 32]);
    }

    #[test]
    fn test_file_bytes_roundtrip() {
        let packet = construct::file_bytes_packet(12, b"some data");
        let (id, data) = decode_file_bytes(&packet.body).unwrap();
        assert_eq!(id, 12);
        assert_eq!(data, b"some data");
    }

    #[test]
    fn test_file_id_roundtrip() {
        let packet = construct::file_id_packet(crate::protocol::Header::AlreadyHave, 5);
        assert_eq!(decode_file_id(&packet.body).unwrap(), 5);
    }

    #[test]
    fn test_symlink_roundtrip() {
        let symlink = fsys::Symlink {
            path: "sub/link".into(),
            target: "../target.txt".into(),
        };
        let packet = construct::symlink_packet(&symlink);

        let (path, target) = decode_symlink(&packet.body).unwrap();
        assert_eq!(path, "sub/link");
        assert_eq!(target, "../target.txt");
    }

    #[test]
    fn test_truncated_body_fails_cleanly() {
        let file = fsys::File::incoming(1, "name".into(), 10, "sum".into(), String::new());
        let packet = construct::file_packet(&file);

        for cut in [0, 4, 8, 12, packet.body.len() - 1] {
            assert!(decode_file(&packet.body[..cut]).is_err());
        }
    }
}
