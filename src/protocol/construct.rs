//! Builders for the packet bodies the sender puts on the wire.
//!
//! Integers are big-endian u64; variable-length fields carry a u64 length
//! prefix.

use crate::fsys;
use crate::protocol::{Header, Packet, DIR_CODE, FILE_CODE};

fn put_u64(buffer: &mut Vec<u8>, value: u64) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

fn put_length_prefixed(buffer: &mut Vec<u8>, bytes: &[u8]) {
    put_u64(buffer, bytes.len() as u64);
    buffer.extend_from_slice(bytes);
}

/// ENCRKEY: `klen ‖ key`. The one packet of a session that is never
/// encrypted.
pub fn encryption_key_packet(key: &[u8]) -> Packet {
    let mut body = Vec::with_capacity(8 + key.len());
    put_length_prefixed(&mut body, key);

    Packet::with_body(Header::EncryptionKey, body)
}

fn file_body(file: &fsys::File) -> Vec<u8> {
    // (id)(name len)(name)(size)(checksum len)(checksum)(rel path len)(rel path)
    let mut body = Vec::new();
    put_u64(&mut body, file.id);
    put_length_prefixed(&mut body, file.name.as_bytes());
    put_u64(&mut body, file.size);
    put_length_prefixed(&mut body, file.checksum.as_bytes());
    put_length_prefixed(&mut body, file.relative_path.as_bytes());
    body
}

fn directory_body(directory: &fsys::Directory) -> Vec<u8> {
    // (name len)(name)(size)
    let mut body = Vec::new();
    put_length_prefixed(&mut body, directory.name.as_bytes());
    put_u64(&mut body, directory.size);
    body
}

/// FILE: metadata of the file that is about to be streamed.
pub fn file_packet(file: &fsys::File) -> Packet {
    Packet::with_body(Header::File, file_body(file))
}

/// TRANSFEROFFER for a single file: `'f'` followed by the FILE body.
pub fn offer_file_packet(file: &fsys::File) -> Packet {
    let mut body = vec![FILE_CODE];
    body.extend_from_slice(&file_body(file));

    Packet::with_body(Header::TransferOffer, body)
}

/// TRANSFEROFFER for a directory: `'d'` followed by the DIRECTORY body.
pub fn offer_directory_packet(directory: &fsys::Directory) -> Packet {
    let mut body = vec![DIR_CODE];
    body.extend_from_slice(&directory_body(directory));

    Packet::with_body(Header::TransferOffer, body)
}

/// FILEBYTES: `id ‖ data`.
pub fn file_bytes_packet(id: u64, data: &[u8]) -> Packet {
    let mut body = Vec::with_capacity(8 + data.len());
    put_u64(&mut body, id);
    body.extend_from_slice(data);

    Packet::with_body(Header::FileBytes, body)
}

/// ENDFILE and ALREADYHAVE both carry a lone file id.
pub fn file_id_packet(header: Header, id: u64) -> Packet {
    Packet::with_body(header, id.to_be_bytes().to_vec())
}

/// SYMLINK: `path len ‖ path ‖ target len ‖ target`.
pub fn symlink_packet(symlink: &fsys::Symlink) -> Packet {
    let mut body = Vec::new();
    put_length_prefixed(&mut body, symlink.path.as_bytes());
    put_length_prefixed(&mut body, symlink.target.as_bytes());

    Packet::with_body(Header::Symlink, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_key_body_layout() {
        let packet = encryption_key_packet(&[0xAA; 32]);

        assert_eq!(packet.header, Header::EncryptionKey);
        assert_eq!(&packet.body[..8], &(32u64).to_be_bytes());
        assert_eq!(&packet.body[8..], &[0xAA; 32]);
    }

    #[test]
    fn test_file_bytes_body_starts_with_the_id() {
        let packet = file_bytes_packet(7, b"contents");

        assert_eq!(&packet.body[..8], &(7u64).to_be_bytes());
        assert_eq!(&packet.body[8..], b"contents");
    }

    #[test]
    fn test_file_id_packet_body_is_exactly_the_id() {
        let packet = file_id_packet(Header::EndFile, u64::MAX);

        assert_eq!(packet.header, Header::EndFile);
        assert_eq!(packet.body, u64::MAX.to_be_bytes().to_vec());
    }

    #[test]
    fn test_offer_discriminants() {
        let file = fsys::File::incoming(0, "a".into(), 1, "00".into(), String::new());
        assert_eq!(offer_file_packet(&file).body[0], FILE_CODE);

        let directory = fsys::Directory {
            name: "d".into(),
            path: std::path::PathBuf::new(),
            size: 0,
            files: Vec::new(),
            symlinks: Vec::new(),
        };
        assert_eq!(offer_directory_packet(&directory).body[0], DIR_CODE);
    }
}
