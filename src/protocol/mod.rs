pub mod construct;
pub mod decode;
pub mod headers;
pub mod packet;

pub use decode::TransferOffer;
pub use headers::Header;
pub use packet::{read_packet_bytes, write_packet, Packet};

/// Discriminant byte for a file offer inside TRANSFEROFFER.
pub const FILE_CODE: u8 = b'f';
/// Discriminant byte for a directory offer inside TRANSFEROFFER.
pub const DIR_CODE: u8 = b'd';
