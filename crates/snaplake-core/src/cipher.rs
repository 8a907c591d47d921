//! At-rest credential encryption
//!
//! AES-256-GCM with a fresh 96-bit nonce per call. The wire form is
//! `base64(nonce || ciphertext || tag)`; persisted values additionally carry
//! the `enc:v1:` marker so legacy plaintext can be told apart.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use snaplake_core_types::Sensitive;
use std::fmt;

use crate::errors::{LakeError, Result};
use crate::logging_facility::Profile;

/// Prefix marking a sealed value
pub const SEALED_MARKER: &str = "enc:v1:";

const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;

/// Fixed fallback for non-production profiles. Not a secret.
const INSECURE_DEV_KEY: &[u8; KEY_LEN] = b"snaplake-insecure-development-k!";

pub struct CredentialCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

/// Truncate or zero-pad a configured secret to exactly 32 bytes
fn derive_key(secret: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    let bytes = secret.as_bytes();
    let n = bytes.len().min(KEY_LEN);
    key[..n].copy_from_slice(&bytes[..n]);
    key
}

fn crypto_err(message: impl Into<String>) -> LakeError {
    LakeError::Crypto {
        message: message.into(),
    }
}

impl CredentialCipher {
    /// Build from an explicit secret
    ///
    /// # Errors
    /// `LakeError::Crypto` if the key cannot be loaded.
    pub fn new(secret: &Sensitive<String>) -> Result<Self> {
        Self::from_key_bytes(&derive_key(secret.expose()))
    }

    /// Build from configuration, applying the profile's fallback rule
    ///
    /// Without a configured key, production refuses to start and every
    /// other profile uses a fixed insecure key with a warning.
    ///
    /// # Errors
    /// `LakeError::MissingEncryptionKey` under the production profile.
    pub fn from_config(secret: Option<&Sensitive<String>>, profile: Profile) -> Result<Self> {
        match secret.filter(|s| !s.expose().is_empty()) {
            Some(secret) => Self::new(secret),
            None if profile.is_production() => Err(LakeError::MissingEncryptionKey),
            None => {
                tracing::warn!(
                    component = module_path!(),
                    "No encryption key configured; using the insecure development key"
                );
                Self::from_key_bytes(INSECURE_DEV_KEY)
            }
        }
    }

    fn from_key_bytes(bytes: &[u8; KEY_LEN]) -> Result<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, bytes)
            .map_err(|_| crypto_err("failed to load AES-256-GCM key"))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt to `base64(nonce || ciphertext || tag)`
    ///
    /// # Errors
    /// `LakeError::Crypto` if the nonce cannot be generated or sealing fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| crypto_err("failed to generate nonce"))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| crypto_err("encryption failed"))?;

        let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&in_out);
        Ok(BASE64.encode(out))
    }

    /// Inverse of `encrypt`
    ///
    /// # Errors
    /// `LakeError::Crypto` for bad base64, a truncated payload, a failed
    /// authentication tag or non-UTF-8 plaintext.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let raw = BASE64
            .decode(ciphertext.trim())
            .map_err(|e| crypto_err(format!("ciphertext is not valid base64: {}", e)))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(crypto_err("ciphertext is too short"));
        }

        let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| crypto_err("invalid nonce"))?;
        let mut buf = sealed.to_vec();
        let plain = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| crypto_err("decryption failed: wrong key or tampered data"))?;

        String::from_utf8(plain.to_vec())
            .map_err(|_| crypto_err("decrypted value is not valid UTF-8"))
    }

    /// Encrypt and add the marker. Already-sealed input is returned as is.
    ///
    /// # Errors
    /// As for `encrypt`.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        if is_sealed(plaintext) {
            return Ok(plaintext.to_string());
        }
        Ok(format!("{}{}", SEALED_MARKER, self.encrypt(plaintext)?))
    }

    /// Strip the marker and decrypt
    ///
    /// Unmarked input is legacy plaintext awaiting migration and is returned
    /// unchanged.
    ///
    /// # Errors
    /// As for `decrypt`.
    pub fn unseal(&self, stored: &str) -> Result<String> {
        match stored.strip_prefix(SEALED_MARKER) {
            Some(body) => self.decrypt(body),
            None => {
                if !stored.is_empty() {
                    tracing::warn!(
                        component = module_path!(),
                        "Read an unsealed credential; run credential migration"
                    );
                }
                Ok(stored.to_string())
            }
        }
    }
}

pub fn is_sealed(value: &str) -> bool {
    value.starts_with(SEALED_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CredentialCipher {
        CredentialCipher::new(&Sensitive::from("unit-test-secret")).unwrap()
    }

    #[test]
    fn test_derive_key_pads_and_truncates() {
        let short = derive_key("abc");
        assert_eq!(&short[..3], b"abc");
        assert!(short[3..].iter().all(|b| *b == 0));

        let long = derive_key(&"x".repeat(40));
        assert_eq!(long, [b'x'; KEY_LEN]);
    }

    #[test]
    fn test_round_trip_and_fresh_nonce() {
        let c = cipher();
        let a = c.encrypt("s3cret").unwrap();
        let b = c.encrypt("s3cret").unwrap();
        assert_ne!(a, b);
        assert_eq!(c.decrypt(&a).unwrap(), "s3cret");
    }

    #[test]
    fn test_production_without_key_fails() {
        let err = CredentialCipher::from_config(None, Profile::Production).unwrap_err();
        assert_eq!(err, LakeError::MissingEncryptionKey);
        assert!(CredentialCipher::from_config(None, Profile::Development).is_ok());
    }

    #[test]
    fn test_seal_is_idempotent_and_unseal_tolerates_legacy() {
        let c = cipher();
        let sealed = c.seal("pw").unwrap();
        assert!(is_sealed(&sealed));
        assert_eq!(c.seal(&sealed).unwrap(), sealed);
        assert_eq!(c.unseal(&sealed).unwrap(), "pw");
        assert_eq!(c.unseal("legacy").unwrap(), "legacy");
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let c = cipher();
        let mut raw = BASE64.decode(c.encrypt("pw").unwrap()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert!(c.decrypt(&BASE64.encode(raw)).is_err());
        assert!(c.decrypt("not base64!").is_err());
    }
}
