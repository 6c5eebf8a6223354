//! # openpayments-rs
//!
//! A Rust client for Open Payments resource servers, using the GNAP
//! authorization model (Grant Negotiation and Authorization Protocol) and
//! Ed25519 HTTP message signing.
//!
//! The crate lets an application discover a wallet's capabilities, negotiate
//! access grants — non-interactive and interactive, with user-consent
//! redirects — and sequence the resource calls (quote, incoming payment,
//! outgoing payment) that constitute one interledger payment.
//!
//! ## Features
//!
//! - **Key management**: Ed25519 key pair generation, file persistence, and
//!   JWK export for out-of-band verification
//! - **Request signing**: deterministic canonical signing base with
//!   `Signature-Input` / `Signature` headers
//! - **Grant negotiation**: explicit GNAP state machine covering immediate
//!   grants, interactive continuation, revocation, and timeouts
//! - **Resource orchestration**: capability-checked, signed calls for
//!   incoming payments, quotes, and outgoing payments
//! - **Flow control**: end-to-end payment sequencing with an explicit
//!   suspension point for user consent
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use openpayments_rs::flow::{InteractionHandler, PaymentFlow};
//! use openpayments_rs::keys::KeyStore;
//! use openpayments_rs::transport::ReqwestTransport;
//! use openpayments_rs::types::Amount;
//! use openpayments_rs::Result;
//!
//! struct PrintRedirect;
//!
//! #[async_trait::async_trait]
//! impl InteractionHandler for PrintRedirect {
//!     async fn on_interaction(&self, redirect_uri: &str) -> Result<()> {
//!         println!("Approve the payment at: {}", redirect_uri);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let keys = Arc::new(KeyStore::generate("key-1")?);
//! let transport = Arc::new(ReqwestTransport::new());
//!
//! let flow = PaymentFlow::new(
//!     keys,
//!     transport,
//!     "music-site-client",
//!     "https://music-site.example/payment/callback",
//! );
//!
//! let outcome = flow
//!     .send_payment(
//!         "https://wallet.example/alice",
//!         "https://wallet.example/bob",
//!         Amount::new("500", "USD", 2),
//!         &PrintRedirect,
//!     )
//!     .await?;
//!
//! println!("sent {}", outcome.outgoing_payment.sent_amount.value);
//! # Ok(())
//! # }
//! ```
//!
//! ## Protocol Overview
//!
//! One payment runs through a fixed sequence:
//!
//! 1. **Discover** both wallet addresses to find their authorization and
//!    resource servers
//! 2. **Grant** for the incoming-payment capability on the receiver's
//!    authorization server, then **create the incoming payment**
//! 3. **Grant** for the quote capability on the sender's authorization
//!    server, then **create the quote**
//! 4. **Grant** for the outgoing-payment capability — if the server requires
//!    consent, the flow surfaces a redirect URI and suspends until the user
//!    completes the interaction
//! 5. **Create the outgoing payment** referencing the quote, before the
//!    quote expires
//!
//! Every authenticated request is signed with the client's Ed25519 private
//! key; the matching public key is published as a JWK so servers verify
//! authenticity and integrity. Access tokens are bearer credentials bound to
//! specific resource types and actions — a call whose token does not cover
//! the required capability fails locally, before any network traffic.
//!
//! ## Security
//!
//! - The private key never leaves the [`keys::KeyStore`]; only a signing
//!   operation is exposed
//! - Signature headers bind method, path, authority, timestamp, and body
//!   digest, so any alteration fails verification
//! - Interactive grants never expose a usable token until continuation
//!   completes, even when the server returns a partial token fragment
//!
//! ## References
//!
//! - [Open Payments](https://openpayments.dev)
//! - [GNAP (RFC 9635)](https://datatracker.ietf.org/doc/html/rfc9635)
//! - [HTTP Message Signatures (RFC 9421)](https://datatracker.ietf.org/doc/html/rfc9421)

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod errors;
pub mod flow;
pub mod grant;
pub mod keys;
pub mod resources;
pub mod signing;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use errors::{OpError, Result};
pub use flow::{InteractionHandler, PaymentFlow, PaymentOutcome};
pub use grant::{GrantFailure, GrantNegotiation, GrantNegotiator, GrantState, InteractConfig};
pub use keys::{Jwk, JwkSet, KeyStore};
pub use resources::{discover_wallet, ResourceOrchestrator};
pub use signing::{sign_request, verify_request, SignatureHeaders};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{
    AccessRight, AccessToken, Action, Amount, IncomingPayment, OutgoingPayment, Quote,
    ResourceType, WalletInfo,
};
