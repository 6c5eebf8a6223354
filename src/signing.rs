//! HTTP message signing for Open Payments requests.
//!
//! Every authenticated request carries two headers: `Signature-Input`, naming
//! the signed components, the creation timestamp, and the key id; and
//! `Signature`, carrying the Base64 Ed25519 signature under the same label.
//! Both are derived from a canonical base string so that signing the same
//! logical request twice with the same `created` timestamp yields
//! byte-identical output.

use crate::errors::{OpError, Result};
use crate::keys::KeyStore;
use crate::utils::content_digest;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use reqwest::Method;
use url::Url;

/// Signature label used in `Signature-Input` and `Signature`.
const SIGNATURE_LABEL: &str = "sig1";

/// The headers to attach to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
    /// `Signature-Input` header value: signed components, creation time, key id
    pub signature_input: String,

    /// `Signature` header value: Base64 Ed25519 signature under the label
    pub signature: String,

    /// `Content-Digest` header value, present when the request has a body
    pub content_digest: Option<String>,
}

impl SignatureHeaders {
    /// Appends these headers to a header list.
    pub fn apply(&self, headers: &mut Vec<(String, String)>) {
        headers.push(("Signature-Input".to_string(), self.signature_input.clone()));
        headers.push(("Signature".to_string(), self.signature.clone()));
        if let Some(digest) = &self.content_digest {
            headers.push(("Content-Digest".to_string(), digest.clone()));
        }
    }
}

/// Builds the canonical signing base string for a request.
///
/// Components are concatenated in fixed order, one per line: lower-cased
/// method, absolute path, authority, created timestamp, and the content
/// digest when a body is present. There is no hidden non-determinism: no map
/// iteration order feeds into the string.
pub fn signing_base(method: &Method, url: &str, created: i64, body: Option<&str>) -> Result<String> {
    let parsed = Url::parse(url)?;
    let host = parsed
        .host_str()
        .ok_or(OpError::UrlParseError(url::ParseError::EmptyHost))?;
    let authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let mut base = format!(
        "{}\n{}\n{}\n{}",
        method.as_str().to_lowercase(),
        parsed.path(),
        authority,
        created
    );
    if let Some(body) = body {
        base.push('\n');
        base.push_str(&content_digest(body.as_bytes()));
    }
    Ok(base)
}

/// Signs a request, producing the headers the server needs to verify it.
///
/// # Examples
///
/// ```
/// use openpayments_rs::keys::KeyStore;
/// use openpayments_rs::signing::sign_request;
/// use reqwest::Method;
///
/// let keys = KeyStore::generate("key-1").unwrap();
/// let headers = sign_request(&keys, &Method::POST, "https://auth.example/", 1714000000, Some("{}")).unwrap();
/// assert!(headers.signature_input.contains("keyid=\"key-1\""));
/// assert!(headers.signature.starts_with("sig1=:"));
/// ```
pub fn sign_request(
    keys: &KeyStore,
    method: &Method,
    url: &str,
    created: i64,
    body: Option<&str>,
) -> Result<SignatureHeaders> {
    let base = signing_base(method, url, created, body)?;
    let signature = keys.sign_bytes(base.as_bytes());

    let digest = body.map(|b| content_digest(b.as_bytes()));
    let components = if digest.is_some() {
        r#""@method" "@path" "@authority" "content-digest""#
    } else {
        r#""@method" "@path" "@authority""#
    };

    Ok(SignatureHeaders {
        signature_input: format!(
            "{}=({});created={};keyid=\"{}\"",
            SIGNATURE_LABEL,
            components,
            created,
            keys.key_id()
        ),
        signature: format!("{}=:{}:", SIGNATURE_LABEL, BASE64.encode(signature)),
        content_digest: digest,
    })
}

/// Verifies a `Signature` header against the published public key.
///
/// The client never verifies its own traffic in production; this reproduces
/// the remote party's check symmetrically so the signing scheme is testable
/// end to end.
pub fn verify_request(
    verifying_key: &VerifyingKey,
    method: &Method,
    url: &str,
    created: i64,
    body: Option<&str>,
    signature_header: &str,
) -> bool {
    let Some(encoded) = signature_header
        .strip_prefix(&format!("{}=:", SIGNATURE_LABEL))
        .and_then(|rest| rest.strip_suffix(':'))
    else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded.as_bytes()) else {
        return false;
    };
    let Ok(bytes) = <[u8; 64]>::try_from(decoded.as_slice()) else {
        return false;
    };
    let Ok(base) = signing_base(method, url, created, body) else {
        return false;
    };
    let signature = Signature::from_bytes(&bytes);
    verifying_key.verify(base.as_bytes(), &signature).is_ok()
}
