use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::cryptography;
use crate::error::{Result, TransferError};
use crate::protocol::Header;
use crate::{HEADER_DELIMITER, KEY_SIZE, MAX_PACKET_SIZE};

/// Scratch buffer size for draining a framed packet off the stream.
const READ_CHUNK_SIZE: usize = 8192;

/// A protocol packet before or after transportation.
///
/// Wire layout: `packet_len:u64 (big-endian) ‖ header ‖ '~' ‖ body`, where
/// `packet_len` covers everything after the length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(header: Header) -> Packet {
        Packet {
            header,
            body: Vec::new(),
        }
    }

    pub fn with_body(header: Header, body: Vec<u8>) -> Packet {
        Packet { header, body }
    }

    /// Size of the packet as it would appear on the wire, without the
    /// length prefix.
    pub fn size(&self) -> u64 {
        (self.header.as_bytes().len() + 1 + self.body.len()) as u64
    }

    /// Serializes the packet with its length prefix. Fails if the result
    /// would exceed [`MAX_PACKET_SIZE`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let packet_size = self.size();
        if packet_size > MAX_PACKET_SIZE {
            return Err(TransferError::Framing(format!(
                "packet of {} bytes exceeds the {} byte maximum",
                packet_size, MAX_PACKET_SIZE
            )));
        }

        let mut bytes = Vec::with_capacity(8 + packet_size as usize);
        bytes.extend_from_slice(&packet_size.to_be_bytes());
        bytes.extend_from_slice(self.header.as_bytes());
        bytes.push(HEADER_DELIMITER);
        bytes.extend_from_slice(&self.body);

        Ok(bytes)
    }

    /// Parses `header ‖ '~' ‖ body` bytes as produced by
    /// [`read_packet_bytes`].
    pub fn from_bytes(packet_bytes: &[u8]) -> Result<Packet> {
        let delimiter = packet_bytes
            .iter()
            .position(|&b| b == HEADER_DELIMITER)
            .ok_or_else(|| TransferError::Framing("packet has no header delimiter".to_string()))?;

        let header = Header::from_bytes(&packet_bytes[..delimiter]).ok_or_else(|| {
            TransferError::Protocol(format!(
                "unknown packet header {:?}",
                String::from_utf8_lossy(&packet_bytes[..delimiter])
            ))
        })?;

        Ok(Packet {
            header,
            body: packet_bytes[delimiter + 1..].to_vec(),
        })
    }

    /// Encrypts the body in place. Empty bodies stay untouched so that
    /// bare control packets are the same with and without a session key.
    pub fn encrypt_body(&mut self, key: &[u8; KEY_SIZE]) -> Result<()> {
        if self.body.is_empty() {
            return Ok(());
        }
        self.body = cryptography::encrypt(key, &self.body)?;
        Ok(())
    }

    /// Decrypts the body in place; empty bodies stay untouched.
    pub fn decrypt_body(&mut self, key: &[u8; KEY_SIZE]) -> Result<()> {
        if self.body.is_empty() {
            return Ok(());
        }
        self.body = cryptography::decrypt(key, &self.body)?;
        Ok(())
    }
}

/// Reads one framed packet off the stream and returns its
/// `header ‖ '~' ‖ body` bytes.
///
/// The announced length is read first, then the packet is drained in
/// 8 KiB pieces until complete. EOF mid-packet is a framing error.
pub async fn read_packet_bytes<R>(stream: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let packet_size = stream.read_u64().await?;

    if packet_size > MAX_PACKET_SIZE {
        return Err(TransferError::Framing(format!(
            "announced packet of {} bytes exceeds the {} byte maximum",
            packet_size, MAX_PACKET_SIZE
        )));
    }

    let mut packet_bytes = Vec::with_capacity(packet_size as usize);
    let mut scratch = [0u8; READ_CHUNK_SIZE];
    let mut left = packet_size as usize;

    while left > 0 {
        let take = left.min(scratch.len());
        let read = stream.read(&mut scratch[..take]).await?;
        if read == 0 {
            return Err(TransferError::Framing(
                "stream closed in the middle of a packet".to_string(),
            ));
        }
        packet_bytes.extend_from_slice(&scratch[..read]);
        left -= read;
    }

    Ok(packet_bytes)
}

/// Serializes and writes one packet to the stream.
/// All packets must leave through this function.
pub async fn write_packet<W>(stream: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = packet.to_bytes()?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cryptography::generate_session_key;

    #[test]
    fn test_packet_size_counts_header_delimiter_and_body() {
        let packet = Packet::with_body(Header::File, vec![0u8; 10]);
        assert_eq!(packet.size(), 4 + 1 + 10);
    }

    #[test]
    fn test_to_bytes_layout() {
        let packet = Packet::with_body(Header::Ready, b"xyz".to_vec());
        let bytes = packet.to_bytes().unwrap();

        assert_eq!(&bytes[..8], &(9u64).to_be_bytes());
        assert_eq!(&bytes[8..13], b"READY");
        assert_eq!(bytes[13], HEADER_DELIMITER);
        assert_eq!(&bytes[14..], b"xyz");
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let packet = Packet::with_body(Header::FileBytes, vec![0, 1, 2, 0x7E, 4]);
        let bytes = packet.to_bytes().unwrap();

        // skip the length prefix, as read_packet_bytes does
        let parsed = Packet::from_bytes(&bytes[8..]).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn test_from_bytes_without_delimiter_fails() {
        let result = Packet::from_bytes(b"READY");
        assert!(matches!(result, Err(TransferError::Framing(_))));
    }

    #[test]
    fn test_from_bytes_with_unknown_header_fails() {
        let result = Packet::from_bytes(b"HELLO~body");
        assert!(matches!(result, Err(TransferError::Protocol(_))));
    }

    #[test]
    fn test_packet_at_maximum_size_is_accepted() {
        let body_len = MAX_PACKET_SIZE as usize - Header::FileBytes.as_bytes().len() - 1;
        let packet = Packet::with_body(Header::FileBytes, vec![0xAB; body_len]);

        assert_eq!(packet.size(), MAX_PACKET_SIZE);
        assert!(packet.to_bytes().is_ok());
    }

    #[test]
    fn test_packet_over_maximum_size_is_rejected() {
        let body_len = MAX_PACKET_SIZE as usize - Header::FileBytes.as_bytes().len();
        let packet = Packet::with_body(Header::FileBytes, vec![0xAB; body_len]);

        assert_eq!(packet.size(), MAX_PACKET_SIZE + 1);
        assert!(matches!(packet.to_bytes(), Err(TransferError::Framing(_))));
    }

    #[test]
    fn test_encrypt_decrypt_body_roundtrip() {
        let key = generate_session_key();
        let mut packet = Packet::with_body(Header::FileBytes, b"file contents here".to_vec());
        let original = packet.body.clone();

        packet.encrypt_body(&key).unwrap();
        assert_ne!(packet.body, original);

        packet.decrypt_body(&key).unwrap();
        assert_eq!(packet.body, original);
    }

    #[test]
    fn test_empty_body_is_not_encrypted() {
        let key = generate_session_key();
        let mut packet = Packet::new(Header::Ready);

        packet.encrypt_body(&key).unwrap();
        assert!(packet.body.is_empty());

        packet.decrypt_body(&key).unwrap();
        assert!(packet.body.is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read_over_a_stream() {
        let (mut client, mut server) = tokio::io::duplex(1024 * 1024);

        let packet = Packet::with_body(Header::File, vec![7u8; 50_000]);
        write_packet(&mut client, &packet).await.unwrap();

        let bytes = read_packet_bytes(&mut server).await.unwrap();
        let received = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(received, packet);
    }

    #[tokio::test]
    async fn test_multiple_packets_keep_their_order() {
        let (mut client, mut server) = tokio::io::duplex(1024 * 1024);

        let first = Packet::with_body(Header::FileBytes, vec![1u8; 9000]);
        let second = Packet::new(Header::Done);
        let third = Packet::new(Header::Bye);

        write_packet(&mut client, &first).await.unwrap();
        write_packet(&mut client, &second).await.unwrap();
        write_packet(&mut client, &third).await.unwrap();

        for expected in [&first, &second, &third] {
            let bytes = read_packet_bytes(&mut server).await.unwrap();
            assert_eq!(&Packet::from_bytes(&bytes).unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_oversized_announcement_is_rejected_on_read() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        tokio::io::AsyncWriteExt::write_all(
            &mut client,
            &(MAX_PACKET_SIZE + 1).to_be_bytes(),
        )
        .await
        .unwrap();

        let result = read_packet_bytes(&mut server).await;
        assert!(matches!(result, Err(TransferError::Framing(_))));
    }

    #[tokio::test]
    async fn test_truncated_packet_is_a_framing_error() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let packet = Packet::with_body(Header::File, vec![9u8; 100]);
        let bytes = packet.to_bytes().unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut client, &bytes[..bytes.len() - 10])
            .await
            .unwrap();
        drop(client);

        let result = read_packet_bytes(&mut server).await;
        assert!(matches!(result, Err(TransferError::Framing(_))));
    }
}
