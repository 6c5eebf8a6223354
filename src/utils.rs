//! Utility functions for Open Payments operations.
//!
//! This module provides helpers for content digests, nonces, and timestamps
//! used throughout the library.

use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL},
    Engine,
};
use sha2::{Digest, Sha256};

/// Computes the `Content-Digest` header value for a request body.
///
/// The digest is the SHA-256 of the body bytes, Base64 encoded and wrapped in
/// the structured-field byte-sequence form `sha-256=:<b64>:`.
///
/// # Examples
///
/// ```
/// use openpayments_rs::utils::content_digest;
///
/// let digest = content_digest(b"{}");
/// assert!(digest.starts_with("sha-256=:"));
/// assert!(digest.ends_with(':'));
/// ```
pub fn content_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let hash = hasher.finalize();
    format!("sha-256=:{}:", BASE64.encode(hash))
}

/// Generates a random URL-safe nonce for interactive grant requests.
///
/// # Examples
///
/// ```
/// use openpayments_rs::utils::generate_nonce;
///
/// let nonce = generate_nonce();
/// assert_eq!(nonce.len(), 43); // 32 bytes, base64url without padding
/// assert_ne!(nonce, generate_nonce());
/// ```
pub fn generate_nonce() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    BASE64_URL.encode(bytes)
}

/// Gets the current Unix timestamp in seconds.
///
/// Used as the `created` parameter of signature headers.
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
