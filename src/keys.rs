//! Ed25519 key management for Open Payments clients.
//!
//! Every request to an authorization or resource server is signed with the
//! client's Ed25519 private key; the matching public key is published as a
//! JWK so servers can verify authenticity and integrity. The `KeyStore` owns
//! one key pair and never exposes the private key outside the signing
//! operation. Rotation is modeled as constructing a new `KeyStore` with a new
//! key id.

use crate::errors::{OpError, Result};
use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL},
    Engine,
};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A JSON Web Key record for the client's public key.
///
/// This is the shape Open Payments servers expect at the client's key
/// endpoint (or shared out-of-band) for signature verification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Jwk {
    /// Key id, echoed in signature headers so verifiers know which key signed
    pub kid: String,

    /// Key type: octet string key pairs
    pub kty: String,

    /// Signature algorithm
    pub alg: String,

    /// Curve name
    pub crv: String,

    /// Public key bytes, base64url without padding
    pub x: String,

    /// Key use
    #[serde(rename = "use")]
    pub key_use: String,
}

/// The JSON document published at the client's key endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JwkSet {
    /// Published keys
    pub keys: Vec<Jwk>,
}

/// Owns one Ed25519 key pair and its identifier.
///
/// The store is read-only after construction and safe to share across
/// concurrent signers behind an `Arc`.
///
/// # Examples
///
/// ```
/// use openpayments_rs::keys::KeyStore;
///
/// let keys = KeyStore::generate("key-1").unwrap();
/// let jwk = keys.public_jwk();
/// assert_eq!(jwk.kid, "key-1");
/// assert_eq!(jwk.crv, "Ed25519");
/// ```
pub struct KeyStore {
    key_id: String,
    signing_key: SigningKey,
}

impl KeyStore {
    /// Generates a fresh Ed25519 key pair from the OS randomness source.
    ///
    /// # Errors
    ///
    /// Returns `OpError::KeyGeneration` if the randomness source is
    /// unavailable.
    pub fn generate(key_id: impl Into<String>) -> Result<Self> {
        use rand::RngCore;

        let mut seed = [0u8; 32];
        rand::rngs::OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| OpError::KeyGeneration(e.to_string()))?;

        Ok(Self {
            key_id: key_id.into(),
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Loads a key pair from a private key file written by [`KeyStore::save`].
    ///
    /// The file holds the 32-byte Ed25519 seed, Base64 encoded on one line.
    ///
    /// # Errors
    ///
    /// Returns `OpError::KeyFormat` if the file content is not valid Base64
    /// or decodes to the wrong length.
    pub fn load(key_id: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let encoded = std::fs::read_to_string(path)?;
        let decoded = BASE64
            .decode(encoded.trim().as_bytes())
            .map_err(|e| OpError::KeyFormat(format!("invalid base64 seed: {}", e)))?;

        let seed: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
            OpError::KeyFormat(format!("expected 32-byte seed, got {} bytes", decoded.len()))
        })?;

        Ok(Self {
            key_id: key_id.into(),
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Writes the private seed and the public JWK document under `dir`.
    ///
    /// Produces `<key_id>_private.key` (Base64 seed) and `public_keys.json`
    /// (the document to publish for verification). Returns both paths.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let private_path = dir.join(format!("{}_private.key", self.key_id));
        std::fs::write(&private_path, BASE64.encode(self.signing_key.to_bytes()))?;

        let jwk_path = dir.join("public_keys.json");
        let document = JwkSet {
            keys: vec![self.public_jwk()],
        };
        std::fs::write(&jwk_path, serde_json::to_string_pretty(&document)?)?;

        Ok((private_path, jwk_path))
    }

    /// Returns this key pair's identifier.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Exports the public key as a JWK record.
    pub fn public_jwk(&self) -> Jwk {
        let public_bytes = self.signing_key.verifying_key().to_bytes();
        Jwk {
            kid: self.key_id.clone(),
            kty: "OKP".to_string(),
            alg: "EdDSA".to_string(),
            crv: "Ed25519".to_string(),
            x: BASE64_URL.encode(public_bytes),
            key_use: "sig".to_string(),
        }
    }

    /// Signs a message with the private key, producing a 64-byte signature.
    ///
    /// This is the only path through which the private key is exercised.
    pub fn sign_bytes(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Returns the verifying key for symmetric signature checks.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl std::fmt::Debug for KeyStore {
    // Private key bytes stay out of debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("key_id", &self.key_id)
            .field("public_key", &self.public_jwk().x)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_valid_keys() {
        let keys = KeyStore::generate("key-1").unwrap();
        assert_eq!(keys.key_id(), "key-1");
        assert_eq!(keys.verifying_key().to_bytes().len(), 32);
    }

    #[test]
    fn test_jwk_shape() {
        let keys = KeyStore::generate("key-1").unwrap();
        let jwk = keys.public_jwk();
        assert_eq!(jwk.kty, "OKP");
        assert_eq!(jwk.alg, "EdDSA");
        assert_eq!(jwk.crv, "Ed25519");
        assert_eq!(jwk.key_use, "sig");
        // base64url of 32 bytes, no padding
        assert_eq!(jwk.x.len(), 43);
        assert!(!jwk.x.contains('='));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyStore::generate("key-1").unwrap();
        let (private_path, jwk_path) = keys.save(dir.path()).unwrap();

        let loaded = KeyStore::load("key-1", &private_path).unwrap();
        assert_eq!(
            loaded.verifying_key().to_bytes(),
            keys.verifying_key().to_bytes()
        );

        let document: JwkSet =
            serde_json::from_str(&std::fs::read_to_string(jwk_path).unwrap()).unwrap();
        assert_eq!(document.keys.len(), 1);
        assert_eq!(document.keys[0], keys.public_jwk());
    }

    #[test]
    fn test_load_rejects_bad_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.key");
        std::fs::write(&path, "not!!valid!!base64").unwrap();

        let err = KeyStore::load("key-1", &path).unwrap_err();
        assert!(matches!(err, OpError::KeyFormat(_)));
    }

    #[test]
    fn test_load_rejects_short_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.key");
        std::fs::write(&path, BASE64.encode([7u8; 16])).unwrap();

        let err = KeyStore::load("key-1", &path).unwrap_err();
        assert!(matches!(err, OpError::KeyFormat(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = KeyStore::load("key-1", "/nonexistent/key-1_private.key").unwrap_err();
        assert!(matches!(err, OpError::IoError(_)));
    }
}
