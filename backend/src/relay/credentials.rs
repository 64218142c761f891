//! Stored credential encryption and source URL construction.
//!
//! Device admin passwords are stored AES-256-CBC encrypted (PKCS#7
//! padding) and base64 encoded. The key and IV come from configuration.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use tardet_types::Device;
use thiserror::Error;

use super::vendor::StreamProfile;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Errors from encrypting or decrypting stored secrets.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret cipher is not configured")]
    NotConfigured,

    #[error("Invalid cipher key material: {0}")]
    InvalidKey(String),

    #[error("Secret is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Secret could not be decrypted")]
    Padding,

    #[error("Decrypted secret is not UTF-8")]
    Utf8,
}

/// Decrypts stored secrets.
pub trait SecretStore: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> Result<String, SecretError>;
}

/// AES-256-CBC cipher with a fixed key and IV.
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
    iv: [u8; 16],
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    pub fn new(key: [u8; 32], iv: [u8; 16]) -> Self {
        Self { key, iv }
    }

    /// Build a cipher from base64 encoded key (32 bytes) and IV (16 bytes).
    pub fn from_base64(key: &str, iv: &str) -> Result<Self, SecretError> {
        let key: [u8; 32] = STANDARD.decode(key.trim())?.try_into().map_err(|k: Vec<u8>| {
            SecretError::InvalidKey(format!("key is {} bytes, expected 32", k.len()))
        })?;
        let iv: [u8; 16] = STANDARD.decode(iv.trim())?.try_into().map_err(|v: Vec<u8>| {
            SecretError::InvalidKey(format!("IV is {} bytes, expected 16", v.len()))
        })?;
        Ok(Self { key, iv })
    }

    /// Generate a random key and IV from the OS random source.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        let mut iv = [0u8; 16];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    /// Base64 encoded key and IV, as accepted by [`SecretCipher::from_base64`].
    pub fn to_base64(&self) -> (String, String) {
        (STANDARD.encode(self.key), STANDARD.encode(self.iv))
    }

    /// Encrypt a plain-text secret for storage.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        STANDARD.encode(ciphertext)
    }
}

impl SecretStore for SecretCipher {
    fn decrypt(&self, ciphertext: &str) -> Result<String, SecretError> {
        let bytes = STANDARD.decode(ciphertext.trim())?;
        let plaintext = Aes256CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&bytes)
            .map_err(|_| SecretError::Padding)?;
        String::from_utf8(plaintext).map_err(|_| SecretError::Utf8)
    }
}

impl SecretStore for Option<SecretCipher> {
    fn decrypt(&self, ciphertext: &str) -> Result<String, SecretError> {
        self.as_ref()
            .ok_or(SecretError::NotConfigured)?
            .decrypt(ciphertext)
    }
}

/// Build the authenticated stream URL for a device.
///
/// Produces `<scheme>://<account>:<secret>@<host>:<port><path>` with the
/// account and secret percent-encoded.
pub fn build_source_url(
    device: &Device,
    profile: &StreamProfile,
    secrets: &dyn SecretStore,
) -> Result<String, SecretError> {
    let secret = secrets.decrypt(&device.admin_pwd)?;
    Ok(format!(
        "{}://{}:{}@{}{}",
        profile.scheme,
        urlencoding::encode(&device.admin_account),
        urlencoding::encode(&secret),
        device.address(),
        profile.path
    ))
}
