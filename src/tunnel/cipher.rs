//! AES-256-CBC with PKCS#7 padding.
//!
//! Wire format: `IV (16 bytes) || ciphertext`. A fresh random IV is drawn for
//! every message.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{SecurityError, SecurityResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

/// Per-tunnel symmetric key, wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TunnelCipher {
    key: [u8; KEY_LEN],
}

impl TunnelCipher {
    /// Draw a new key from the OS random source.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out
    }

    pub fn decrypt(&self, data: &[u8]) -> SecurityResult<Vec<u8>> {
        if data.len() < IV_LEN {
            return Err(SecurityError::Decryption(format!(
                "ciphertext is {} bytes, shorter than the {IV_LEN}-byte IV",
                data.len()
            )));
        }
        let (iv, body) = data.split_at(IV_LEN);

        let decryptor = Aes256CbcDec::new_from_slices(&self.key, iv)
            .map_err(|e| SecurityError::Decryption(e.to_string()))?;
        decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| SecurityError::Decryption("invalid padding or block alignment".to_string()))
    }
}

impl fmt::Debug for TunnelCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TunnelCipher { key: <redacted> }")
    }
}
