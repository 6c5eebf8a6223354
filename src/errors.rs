//! Error types for the openpayments-rs library.
//!
//! This module defines all error types that can occur during Open Payments
//! client operations, from key handling through grant negotiation to resource
//! calls.

use crate::types::{Action, ResourceType};
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Main error type for Open Payments client operations.
#[derive(Error, Debug)]
pub enum OpError {
    /// The operating system randomness source was unavailable during key
    /// generation. Fatal, no retry.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Key material on disk was malformed or of the wrong length. Fatal.
    #[error("Malformed key material: {0}")]
    KeyFormat(String),

    /// Error during HTTP request/response handling
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Error during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error during Base64 encoding/decoding
    #[error("Base64 error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    /// Error parsing a URL
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// Error reading or writing key files
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The authorization server explicitly refused a grant, or a resource
    /// server rejected a token. Fatal to the flow.
    #[error("Authorization denied by {server}: {reason}")]
    AuthorizationDenied {
        /// Server that refused the request
        server: String,
        /// Server-supplied reason, or the raw response body
        reason: String,
    },

    /// The user did not complete the consent interaction within the
    /// caller-supplied deadline.
    #[error("Interaction not completed within {waited:?}")]
    InteractionTimeout {
        /// How long the client waited before giving up
        waited: Duration,
    },

    /// The supplied access token does not cover the capability a resource
    /// call requires. Raised locally, before any network call; indicates a
    /// flow-sequencing logic error and is never retried.
    #[error("Access token does not grant '{action}' on '{resource_type}'")]
    CapabilityMismatch {
        /// Resource type the call targets
        resource_type: ResourceType,
        /// Action the call needs
        action: Action,
    },

    /// An outgoing payment referenced a quote past its expiry. The caller
    /// must restart from quote creation.
    #[error("Quote {id} expired at {expires_at}")]
    QuoteExpired {
        /// Quote resource id
        id: String,
        /// Quote expiry timestamp
        expires_at: DateTime<Utc>,
    },

    /// A response did not match the expected resource shape. Carries the
    /// offending payload for diagnosis.
    #[error("Unexpected response shape from {context}: {detail} (payload: {payload})")]
    SchemaError {
        /// Which request produced the response
        context: String,
        /// The parse failure
        detail: String,
        /// The raw response body
        payload: String,
    },

    /// A server returned a non-2xx status that maps to no richer variant.
    #[error("Unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Request URL
        url: String,
        /// Response body
        body: String,
    },

    /// A payment-flow step failed; wraps the originating error with the step
    /// name and wallet so the caller can resume debugging.
    #[error("Step '{step}' failed for wallet {wallet}: {source}")]
    StepFailed {
        /// Name of the flow step that failed
        step: &'static str,
        /// Wallet address the step was operating on
        wallet: String,
        /// The originating error
        #[source]
        source: Box<OpError>,
    },
}

impl OpError {
    /// Wraps this error with payment-flow step context.
    pub(crate) fn at_step(self, step: &'static str, wallet: &str) -> OpError {
        OpError::StepFailed {
            step,
            wallet: wallet.to_string(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for Open Payments client operations.
pub type Result<T> = std::result::Result<T, OpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OpError::CapabilityMismatch {
            resource_type: ResourceType::Quote,
            action: Action::Create,
        };
        assert_eq!(
            err.to_string(),
            "Access token does not grant 'create' on 'quote'"
        );
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let op_err: OpError = json_err.into();
        assert!(matches!(op_err, OpError::JsonError(_)));
    }

    #[test]
    fn test_step_context() {
        let err = OpError::KeyFormat("truncated seed".to_string())
            .at_step("create-quote", "https://wallet.example/alice");
        let msg = err.to_string();
        assert!(msg.contains("create-quote"));
        assert!(msg.contains("https://wallet.example/alice"));
        assert!(msg.contains("truncated seed"));
    }
}
