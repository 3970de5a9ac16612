//! AES-256-GCM encryption for the LLM-provider API keys users attach to their projects.
//!
//! Keys are encrypted before they are stored and decrypted only when a test run needs to
//! hand them to the compute service. The encryption key is 32 bytes, hex-encoded, taken
//! from `API_KEY_ENCRYPTION_KEY`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::Rng;
use service::config::Config;
use thiserror::Error;

/// 12-byte nonce size for AES-GCM
const NONCE_SIZE: usize = 12;

/// Marks a stored API key as `encrypt` output. Provider keys never start with it.
const ENCRYPTED_PREFIX: &str = "enc:v1:";

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Invalid encryption key: must be 32 bytes (64 hex characters)")]
    InvalidKey,

    #[error("Failed to decode hex key: {0}")]
    HexDecodeError(#[from] hex::FromHexError),

    #[error("Failed to decode base64 ciphertext: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - data may be corrupted or key is incorrect")]
    DecryptionFailed,

    #[error("Ciphertext too short - missing nonce")]
    CiphertextTooShort,

    #[error("No encryption key configured")]
    NoKeyConfigured,
}

/// Encrypts `api_key` for storage unless it already is. Empty keys stay empty.
pub fn encrypt_api_key(config: &Config, api_key: &str) -> Result<String, EncryptionError> {
    if api_key.is_empty() || is_encrypted(api_key) {
        return Ok(api_key.to_string());
    }
    let ciphertext = encrypt(api_key, &configured_key(config)?)?;
    Ok(format!("{ENCRYPTED_PREFIX}{ciphertext}"))
}

/// Returns the plaintext of a stored API key. Values that were never encrypted are
/// returned unchanged.
pub fn decrypt_api_key(config: &Config, stored: &str) -> Result<String, EncryptionError> {
    match stored.strip_prefix(ENCRYPTED_PREFIX) {
        Some(ciphertext) => decrypt(ciphertext, &configured_key(config)?),
        None => Ok(stored.to_string()),
    }
}

/// Whether `value` was stored by `encrypt_api_key`.
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Encrypts plaintext with a random nonce. The nonce is prepended to the ciphertext and
/// the result is base64-encoded.
pub fn encrypt(plaintext: &str, key_hex: &str) -> Result<String, EncryptionError> {
    let cipher = cipher(key_hex)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| EncryptionError::EncryptionFailed)?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend(ciphertext);

    Ok(BASE64.encode(combined))
}

/// Reverses `encrypt`.
pub fn decrypt(ciphertext_b64: &str, key_hex: &str) -> Result<String, EncryptionError> {
    let cipher = cipher(key_hex)?;
    let combined = BASE64.decode(ciphertext_b64)?;

    if combined.len() < NONCE_SIZE {
        return Err(EncryptionError::CiphertextTooShort);
    }
    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);

    let plaintext_bytes = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| EncryptionError::DecryptionFailed)?;

    String::from_utf8(plaintext_bytes).map_err(|_| EncryptionError::DecryptionFailed)
}

fn configured_key(config: &Config) -> Result<String, EncryptionError> {
    config
        .api_key_encryption_key()
        .ok_or(EncryptionError::NoKeyConfigured)
}

fn cipher(key_hex: &str) -> Result<Aes256Gcm, EncryptionError> {
    let bytes = hex::decode(key_hex)?;
    if bytes.len() != 32 {
        return Err(EncryptionError::InvalidKey);
    }
    Aes256Gcm::new_from_slice(&bytes).map_err(|_| EncryptionError::InvalidKey)
}
