use thiserror::Error;

/// Everything that can fatally end a transfer session.
///
/// Checksum mismatches and symlink-creation failures are deliberately not
/// here: they degrade to warnings and the session keeps going.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Packet too large, missing header delimiter, or a truncated read.
    #[error("framing error: {0}")]
    Framing(String),

    /// AEAD verification failed or the session key is unusable.
    #[error("encryption error: {0}")]
    Crypto(String),

    /// A packet that does not belong to the current protocol state, or a
    /// malformed packet body.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer went away without DONE or BYE!.
    #[error("connection closed unexpectedly")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, TransferError>;
