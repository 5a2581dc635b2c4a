//! At-rest encryption: AES-256-CBC with PKCS7 padding, tokens carried
//! as base64url text with a random 16-byte IV prefix.

use crate::error::{DbError, DbResult};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Key length in bytes.
pub const KEY_SIZE: usize = 32;
/// AES block (and IV) length in bytes.
pub const BLOCK_SIZE: usize = 16;

const HKDF_INFO: &[u8] = b"segadb-encryption-key-v1";

/// A 256-bit symmetric key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Wraps raw key material, which must be exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> DbResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| DbError::invalid_key_size(bytes.len(), KEY_SIZE))?;
        Ok(Self { bytes })
    }

    /// Decodes a base64url-encoded key.
    pub fn from_base64(encoded: &str) -> DbResult<Self> {
        let raw = URL_SAFE
            .decode(encoded)
            .map_err(|e| DbError::invalid_format(format!("key is not valid base64url: {e}")))?;
        Self::from_bytes(&raw)
    }

    /// Encodes the key as base64url for storage or transport.
    #[must_use]
    pub fn to_base64(&self) -> String {
        URL_SAFE.encode(self.bytes)
    }

    /// Derives a key deterministically from a passphrase via HKDF-SHA256.
    #[must_use]
    pub fn derive_from_passphrase(passphrase: &str) -> Self {
        let hk = Hkdf::<Sha256>::new(None, passphrase.as_bytes());
        let mut bytes = [0u8; KEY_SIZE];
        // 32 bytes is always a valid HKDF output length for SHA-256
        if hk.expand(HKDF_INFO, &mut bytes).is_err() {
            unreachable!("HKDF-SHA256 supports 32-byte output");
        }
        Self { bytes }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Symmetric cipher over byte payloads.
///
/// `encrypt` produces a base64url token of `IV || ciphertext`; `decrypt`
/// reverses it. A fresh IV is drawn per call, so encrypting the same
/// payload twice yields different tokens.
#[derive(Debug, Clone)]
pub struct Fernet {
    key: EncryptionKey,
}

impl Fernet {
    /// Builds a cipher around a key.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Generates a fresh key in its portable base64url form.
    #[must_use]
    pub fn generate_key() -> String {
        EncryptionKey::generate().to_base64()
    }

    /// Encrypts a payload into a base64url token.
    #[must_use]
    pub fn encrypt(&self, data: &[u8]) -> String {
        let mut iv = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        let ciphertext = Aes256CbcEnc::new(self.key.as_bytes().into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(data);
        let mut token = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);
        URL_SAFE.encode(token)
    }

    /// Decrypts a token back into the original payload.
    ///
    /// A malformed token fails with `InvalidFormat`; a token encrypted
    /// under a different key typically fails with `Padding`.
    pub fn decrypt(&self, token: &str) -> DbResult<Vec<u8>> {
        let raw = URL_SAFE
            .decode(token)
            .map_err(|e| DbError::invalid_format(format!("token is not valid base64url: {e}")))?;
        if raw.len() < BLOCK_SIZE || (raw.len() - BLOCK_SIZE) % BLOCK_SIZE != 0 {
            return Err(DbError::invalid_format("token too short or misaligned"));
        }
        let (iv, ciphertext) = raw.split_at(BLOCK_SIZE);
        let iv: [u8; BLOCK_SIZE] = iv
            .try_into()
            .map_err(|_| DbError::invalid_format("bad IV length"))?;
        Aes256CbcDec::new(self.key.as_bytes().into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| DbError::Padding)
    }
}
