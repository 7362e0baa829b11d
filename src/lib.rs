pub mod checksum;
pub mod commands;
pub mod cryptography;
pub mod error;
pub mod fsys;
pub mod networking;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod transfer;

/// Upper bound on one serialized packet (header + delimiter + body).
/// Packets bigger than this are invalid and will not be sent.
pub const MAX_PACKET_SIZE: u64 = 131_072;

/// Separates the packet header from the packet body on the wire.
pub const HEADER_DELIMITER: u8 = b'~';

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;

/// Room reserved in every encrypted packet for the nonce, the
/// authentication tag and padding.
pub const ENCRYPTION_OVERHEAD: u64 = 48;

pub const DEFAULT_PORT: u16 = 7270;

/// How long the receiver waits for the TCP connect to succeed.
pub const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Capacity of the channel between the packet pump and the main loop.
pub const PACKET_CHANNEL_CAPACITY: usize = 100;

// The payload budget must never be starved by the encryption allowance.
const _: () = assert!(MAX_PACKET_SIZE >= 1024);
