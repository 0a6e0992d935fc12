//! Value encryption for the encrypted entity stores.
//!
//! A [`ValueEncryptor`] turns a plaintext string into an opaque ciphertext
//! string and back. [`NullEncryptor`] passes values through unchanged;
//! with the `encryption` feature, [`AesGcmEncryptor`] provides AES-256-GCM
//! authenticated encryption with a fresh random nonce per value.
//!
//! ## Usage
//!
//! ```ignore
//! use edgestore_core::crypto::{AesGcmEncryptor, EncryptionKey, ValueEncryptor};
//!
//! let encryptor = AesGcmEncryptor::new(EncryptionKey::generate());
//! let ciphertext = encryptor.encrypt("{\"twin\":1}")?;
//! let plaintext = encryptor.decrypt(&ciphertext)?;
//! ```

#[cfg(feature = "encryption")]
mod aes;

#[cfg(feature = "encryption")]
pub use aes::*;

use crate::error::CoreResult;

/// Encrypts and decrypts serialized values.
///
/// Implementations must be deterministic in the sense that
/// `decrypt(encrypt(p)) == p`; ciphertexts themselves may differ between
/// calls. `decrypt` must fail on input it did not produce.
pub trait ValueEncryptor: Send + Sync {
    /// Encrypts `plaintext`.
    fn encrypt(&self, plaintext: &str) -> CoreResult<String>;

    /// Decrypts `ciphertext`.
    fn decrypt(&self, ciphertext: &str) -> CoreResult<String>;
}

/// Pass-through encryptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEncryptor;

impl ValueEncryptor for NullEncryptor {
    fn encrypt(&self, plaintext: &str) -> CoreResult<String> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str) -> CoreResult<String> {
        Ok(ciphertext.to_string())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ValueEncryptor;
    use crate::error::{CoreError, CoreResult};

    /// Reversible tagging encryptor that rejects untagged input.
    #[derive(Debug, Default)]
    pub(crate) struct PrefixEncryptor;

    const PREFIX: &str = "enc:";

    impl ValueEncryptor for PrefixEncryptor {
        fn encrypt(&self, plaintext: &str) -> CoreResult<String> {
            Ok(format!("{PREFIX}{}", plaintext.chars().rev().collect::<String>()))
        }

        fn decrypt(&self, ciphertext: &str) -> CoreResult<String> {
            ciphertext
                .strip_prefix(PREFIX)
                .map(|body| body.chars().rev().collect())
                .ok_or_else(|| CoreError::decryption_failed("missing prefix"))
        }
    }
}
