//! Block-wise RSA-OAEP body encryption.
//!
//! RSA-OAEP with SHA-256 caps the plaintext per operation at
//! `k − 2·hLen − 2` bytes, where `k` is the modulus size and `hLen` the hash
//! size. Payloads of arbitrary length are split into chunks of that size on
//! the agent; each chunk encrypts to exactly `k` bytes, so the server splits
//! the ciphertext at `k`-byte boundaries and concatenates the decrypted
//! blocks.

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::path::Path;

const SHA256_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("cannot read key file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse PEM key: {0}")]
    BadPem(String),
    #[error("ciphertext length {len} is not a multiple of the key size {key_size}")]
    BadBlockLength { len: usize, key_size: usize },
    #[error("RSA operation failed: {0}")]
    Rsa(#[from] rsa::Error),
}

/// Agent-side encryptor holding the server's public key.
pub struct BodyEncryptor {
    key: RsaPublicKey,
}

impl BodyEncryptor {
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| CryptoError::BadPem(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn from_pem_file(path: &Path) -> Result<Self, CryptoError> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_pem(&pem)
    }

    /// Largest plaintext chunk a single OAEP operation accepts.
    pub fn chunk_size(&self) -> usize {
        self.key.size() - 2 * SHA256_LEN - 2
    }

    /// Encrypts `body` chunk by chunk; output length is a multiple of the
    /// key size.
    pub fn encrypt(&self, body: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut rng = rand::thread_rng();
        let mut out = Vec::with_capacity(body.len().div_ceil(self.chunk_size()) * self.key.size());
        for chunk in body.chunks(self.chunk_size()) {
            let block = self.key.encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)?;
            out.extend_from_slice(&block);
        }
        Ok(out)
    }
}

/// Server-side decryptor holding the private key.
pub struct BodyDecryptor {
    key: RsaPrivateKey,
}

impl BodyDecryptor {
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| CryptoError::BadPem(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn from_pem_file(path: &Path) -> Result<Self, CryptoError> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_pem(&pem)
    }

    /// Decrypts a body produced by [`BodyEncryptor::encrypt`]. The input must
    /// split evenly into key-size blocks.
    pub fn decrypt(&self, body: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key_size = self.key.size();
        if body.is_empty() || body.len() % key_size != 0 {
            return Err(CryptoError::BadBlockLength {
                len: body.len(),
                key_size,
            });
        }
        let mut out = Vec::with_capacity(body.len());
        for block in body.chunks(key_size) {
            let plain = self.key.decrypt(Oaep::new::<Sha256>(), block)?;
            out.extend_from_slice(&plain);
        }
        Ok(out)
    }
}
