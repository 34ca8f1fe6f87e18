//! Cryptographic operations for the ledger
//!
//! This module provides:
//! - SHA-512 block hashing, base64-encoded
//! - RSASSA-PSS (SHA-512) signing and verification
//! - RSAES-OAEP (SHA-256) encryption and decryption
//!
//! Keys travel as base64-wrapped DER: SubjectPublicKeyInfo for public keys,
//! PKCS#1 `RSAPrivateKey` for private keys. Key files hold exactly that
//! base64 text.

use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{Oaep, Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs;
use std::path::Path;

/// Default RSA modulus size in bits
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Encode bytes as standard padded base64
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64, tolerating surrounding whitespace
pub fn from_base64(text: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text.trim())?)
}

/// Hash block contents: `base64(SHA-512(previous_hash || rendered))`
pub fn block_hash(previous_hash: &str, rendered_transactions: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(rendered_transactions.as_bytes());
    to_base64(&hasher.finalize())
}

fn decode_public_key(public_key: &str) -> Result<RsaPublicKey> {
    let der = from_base64(public_key)?;
    RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| Error::TypeMismatch(format!("public key is not RSA DER: {}", e)))
}

/// Verify a PSS signature over `message` with a base64 DER public key
///
/// A signature that does not match is `Ok(false)`; only malformed input
/// (bad base64, bad key encoding) is an error.
pub fn verify(message: &str, signature: &str, public_key: &str) -> Result<bool> {
    let signature = from_base64(signature)?;
    let key = decode_public_key(public_key)?;
    let digest = Sha512::digest(message.as_bytes());

    Ok(key
        .verify(Pss::new::<Sha512>(), &digest, &signature)
        .is_ok())
}

/// Encrypt `message` for the holder of `public_key`, returning base64 ciphertext
pub fn encrypt(message: &str, public_key: &str) -> Result<String> {
    let key = decode_public_key(public_key)?;
    let mut rng = rand::thread_rng();
    let ciphertext = key.encrypt(&mut rng, Oaep::new::<Sha256>(), message.as_bytes())?;
    Ok(to_base64(&ciphertext))
}

/// RSA key material for one participant
///
/// The private half is optional: a holder built from a public key alone can
/// still be handed around, but cannot sign or decrypt.
pub struct KeyHolder {
    public_key: RsaPublicKey,
    private_key: Option<RsaPrivateKey>,
}

impl KeyHolder {
    /// Generate a fresh key pair
    pub fn generate(bits: usize) -> Result<Self> {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, bits)?;
        let public_key = private_key.to_public_key();

        Ok(Self {
            public_key,
            private_key: Some(private_key),
        })
    }

    /// Load from base64 DER encodings
    pub fn from_base64(public_key: &str, private_key: Option<&str>) -> Result<Self> {
        let public_key = decode_public_key(public_key)?;
        let private_key = match private_key {
            Some(encoded) => {
                let der = from_base64(encoded)?;
                let key = RsaPrivateKey::from_pkcs1_der(&der).map_err(|e| {
                    Error::TypeMismatch(format!("private key is not PKCS#1 DER: {}", e))
                })?;
                Some(key)
            }
            None => None,
        };

        Ok(Self {
            public_key,
            private_key,
        })
    }

    /// Load a key pair from files holding base64 DER
    pub fn load(
        public_key_path: impl AsRef<Path>,
        private_key_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let public_key = fs::read_to_string(public_key_path.as_ref())?;
        let private_key = fs::read_to_string(private_key_path.as_ref())?;
        Self::from_base64(&public_key, Some(&private_key))
    }

    /// Write the key pair as base64 DER files, creating parent directories
    ///
    /// Requires the private key.
    pub fn save(
        &self,
        public_key_path: impl AsRef<Path>,
        private_key_path: impl AsRef<Path>,
    ) -> Result<()> {
        let private_key = self.private_key_base64()?;
        let public_key = self.public_key_base64()?;

        for (path, contents) in [
            (public_key_path.as_ref(), public_key),
            (private_key_path.as_ref(), private_key),
        ] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, contents)?;
        }

        tracing::info!(
            public_key_path = %public_key_path.as_ref().display(),
            "Key pair stored"
        );
        Ok(())
    }

    /// Whether signing and decryption are available
    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Public key as base64 SubjectPublicKeyInfo DER
    pub fn public_key_base64(&self) -> Result<String> {
        let der = self
            .public_key
            .to_public_key_der()
            .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(to_base64(der.as_bytes()))
    }

    /// Private key as base64 PKCS#1 DER (USE WITH CAUTION)
    pub fn private_key_base64(&self) -> Result<String> {
        let der = self
            .private_key()?
            .to_pkcs1_der()
            .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(to_base64(der.as_bytes()))
    }

    fn private_key(&self) -> Result<&RsaPrivateKey> {
        self.private_key
            .as_ref()
            .ok_or_else(|| Error::UnsetPrecondition("private key does not exist".to_string()))
    }

    /// Sign `message`, returning a base64 PSS signature
    pub fn sign(&self, message: &str) -> Result<String> {
        let key = self.private_key()?;
        let digest = Sha512::digest(message.as_bytes());
        let mut rng = rand::thread_rng();
        let signature = key.sign_with_rng(&mut rng, Pss::new::<Sha512>(), &digest)?;
        Ok(to_base64(&signature))
    }

    /// Decrypt a base64 OAEP ciphertext addressed to this holder
    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let key = self.private_key()?;
        let ciphertext = from_base64(ciphertext)?;
        let plaintext = key.decrypt(Oaep::new::<Sha256>(), &ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|e| Error::TypeMismatch(format!("plaintext is not UTF-8: {}", e)))
    }
}

impl fmt::Debug for KeyHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHolder")
            .field("has_private_key", &self.has_private_key())
            .finish_non_exhaustive()
    }
}

/// Shared key for unit tests; RSA generation is too slow to repeat per test.
#[cfg(test)]
pub(crate) fn test_key() -> &'static KeyHolder {
    use std::sync::OnceLock;

    static KEY: OnceLock<KeyHolder> = OnceLock::new();
    KEY.get_or_init(|| KeyHolder::generate(DEFAULT_KEY_BITS).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_hash_deterministic() {
        let hash1 = block_hash("prev", "gc|ref|a,b|hi|1|t");
        let hash2 = block_hash("prev", "gc|ref|a,b|hi|1|t");
        assert_eq!(hash1, hash2);

        // SHA-512 is 64 bytes, 88 characters once base64-encoded
        assert_eq!(hash1.len(), 88);

        assert_ne!(hash1, block_hash("prev2", "gc|ref|a,b|hi|1|t"));
    }

    #[test]
    fn test_block_hash_concatenates() {
        // No separator between the previous hash and the first transaction
        assert_eq!(block_hash("ab", "cd"), block_hash("abc", "d"));
    }

    #[test]
    fn test_sign_and_verify() {
        let key = test_key();
        let public_key = key.public_key_base64().unwrap();

        let signature = key.sign("give alice a cookie").unwrap();
        assert!(verify("give alice a cookie", &signature, &public_key).unwrap());

        // Wrong message is a plain mismatch, not an error
        assert!(!verify("give bob a cookie", &signature, &public_key).unwrap());
    }

    #[test]
    fn test_verify_garbage_signature_is_false() {
        let public_key = test_key().public_key_base64().unwrap();
        let garbage = to_base64(b"definitely not a signature");
        assert!(!verify("message", &garbage, &public_key).unwrap());
    }

    #[test]
    fn test_verify_malformed_input() {
        let public_key = test_key().public_key_base64().unwrap();

        let result = verify("message", "%%% not base64 %%%", &public_key);
        assert!(matches!(result, Err(Error::TypeMismatch(_))));

        let bogus_key = to_base64(b"not a key");
        let signature = to_base64(&[0u8; 256]);
        let result = verify("message", &signature, &bogus_key);
        assert!(matches!(result, Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let public_key = key.public_key_base64().unwrap();

        let ciphertext = encrypt("one chocolate chip, please", &public_key).unwrap();
        assert_eq!(key.decrypt(&ciphertext).unwrap(), "one chocolate chip, please");
    }

    #[test]
    fn test_public_only_holder_cannot_sign() {
        let public_key = test_key().public_key_base64().unwrap();
        let holder = KeyHolder::from_base64(&public_key, None).unwrap();
        assert!(!holder.has_private_key());

        assert!(matches!(
            holder.sign("message"),
            Err(Error::UnsetPrecondition(_))
        ));
        assert!(matches!(
            holder.decrypt("AAAA"),
            Err(Error::UnsetPrecondition(_))
        ));
    }

    #[test]
    fn test_key_files_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let public_path = dir.path().join("keys/nested/alice.pub");
        let private_path = dir.path().join("keys/nested/alice.key");

        let key = test_key();
        key.save(&public_path, &private_path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&public_path).unwrap(),
            key.public_key_base64().unwrap()
        );

        let loaded = KeyHolder::load(&public_path, &private_path).unwrap();
        assert!(loaded.has_private_key());
        let signature = loaded.sign("from disk").unwrap();
        assert!(verify("from disk", &signature, &key.public_key_base64().unwrap()).unwrap());
    }

    #[test]
    fn test_key_files_errors() {
        let dir = tempfile::tempdir().unwrap();
        let public_path = dir.path().join("missing.pub");
        let private_path = dir.path().join("missing.key");

        let result = KeyHolder::load(&public_path, &private_path);
        assert!(matches!(result, Err(Error::Io(_))));

        let public_only =
            KeyHolder::from_base64(&test_key().public_key_base64().unwrap(), None).unwrap();
        let result = public_only.save(&public_path, &private_path);
        assert!(matches!(result, Err(Error::UnsetPrecondition(_))));
        assert!(!public_path.exists());

        std::fs::write(&public_path, "not base64 at all!").unwrap();
        std::fs::write(&private_path, "not base64 at all!").unwrap();
        let result = KeyHolder::load(&public_path, &private_path);
        assert!(matches!(result, Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_keys_reload_from_base64() {
        let key = test_key();
        let public_key = key.public_key_base64().unwrap();
        let private_key = key.private_key_base64().unwrap();

        let reloaded = KeyHolder::from_base64(&public_key, Some(&private_key)).unwrap();
        let signature = reloaded.sign("reloaded").unwrap();
        assert!(verify("reloaded", &signature, &public_key).unwrap());
    }
}
