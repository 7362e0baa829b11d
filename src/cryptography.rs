use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use crate::error::{Result, TransferError};
use crate::{KEY_SIZE, NONCE_SIZE};

/// Generates a fresh 32-byte session key from the operating system's
/// CSPRNG. The sender calls this once per session and ships the key to
/// the receiver in the first packet.
pub fn generate_session_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// Seal `plaintext` with AES-256-GCM.
///
/// A random 12-byte nonce is drawn for every call and prepended to the
/// output, so the wire layout is `nonce ‖ ciphertext ‖ tag`.
pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| TransferError::Crypto("could not encrypt data".to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);

    Ok(sealed)
}

/// Open a `nonce ‖ ciphertext ‖ tag` blob produced by [`encrypt`].
///
/// Fails if the authentication tag does not verify, which means the data
/// was tampered with or the key is wrong.
pub fn decrypt(key: &[u8; KEY_SIZE], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE {
        return Err(TransferError::Crypto(
            "encrypted data is shorter than a nonce".to_string(),
        ));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(key.into());

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| TransferError::Crypto("could not decrypt data".to_string()))
}
