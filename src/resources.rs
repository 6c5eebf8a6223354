//! Protected resource operations.
//!
//! The [`ResourceOrchestrator`] performs the signed, token-authorized calls a
//! payment is made of: wallet discovery, incoming payments, quotes, and
//! outgoing payments. Every protected call follows the same sequence: check
//! the token's bound capabilities locally (no network traffic on mismatch),
//! sign the request, send it, map non-2xx statuses to typed failures, and
//! validate the response against the expected resource shape.

use crate::errors::{OpError, Result};
use crate::keys::KeyStore;
use crate::signing::sign_request;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::{
    AccessToken, Action, Amount, IncomingPayment, OutgoingPayment, Quote, ResourceType, WalletInfo,
};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

/// Resolves a wallet address to its public metadata.
///
/// Wallet addresses are public; the request is unsigned and carries no token.
pub async fn discover_wallet(
    transport: &dyn HttpTransport,
    wallet_address: &str,
) -> Result<WalletInfo> {
    tracing::debug!(wallet = %wallet_address, "discovering wallet");
    let request =
        HttpRequest::new(Method::GET, wallet_address).header("Accept", "application/json");
    let response = transport.send(request).await?;
    parse_resource(wallet_address, response)
}

/// Client for one resource server.
///
/// Shares the key store and transport with the rest of the flow; safe to use
/// from multiple concurrent flows.
pub struct ResourceOrchestrator {
    resource_server_url: String,
    keys: Arc<KeyStore>,
    transport: Arc<dyn HttpTransport>,
}

impl ResourceOrchestrator {
    /// Creates an orchestrator for a resource server.
    pub fn new(
        resource_server_url: impl Into<String>,
        keys: Arc<KeyStore>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            resource_server_url: resource_server_url.into(),
            keys,
            transport,
        }
    }

    /// Resolves a wallet address through this orchestrator's transport.
    pub async fn get_wallet_info(&self, wallet_address: &str) -> Result<WalletInfo> {
        discover_wallet(self.transport.as_ref(), wallet_address).await
    }

    /// Creates an incoming payment on the receiver's wallet.
    ///
    /// `expires_at` bounds how long the payment accepts funds; without it the
    /// server applies its own default. Requires a token covering `create` on
    /// `incoming-payment`.
    pub async fn create_incoming_payment(
        &self,
        wallet_address: &str,
        amount: &Amount,
        expires_at: Option<DateTime<Utc>>,
        metadata: Option<Value>,
        token: &AccessToken,
    ) -> Result<IncomingPayment> {
        check_capability(token, ResourceType::IncomingPayment, Action::Create)?;

        let mut body = json!({
            "walletAddress": wallet_address,
            "incomingAmount": amount,
        });
        if let Some(expires_at) = expires_at {
            body["expiresAt"] = json!(expires_at.to_rfc3339());
        }
        if let Some(metadata) = metadata {
            body["metadata"] = metadata;
        }

        let url = self.resource_url("incoming-payments");
        tracing::debug!(wallet = %wallet_address, %url, "creating incoming payment");
        let response = self
            .send_authenticated(Method::POST, &url, Some(body.to_string()), token)
            .await?;
        parse_resource(&url, response)
    }

    /// Reads the state of an incoming payment. The id is its full URL.
    ///
    /// Requires a token covering `read` on `incoming-payment`.
    pub async fn get_incoming_payment(
        &self,
        payment_url: &str,
        token: &AccessToken,
    ) -> Result<IncomingPayment> {
        check_capability(token, ResourceType::IncomingPayment, Action::Read)?;
        let response = self
            .send_authenticated(Method::GET, payment_url, None, token)
            .await?;
        parse_resource(payment_url, response)
    }

    /// Creates a quote for paying into `receiver` (an incoming payment URL).
    ///
    /// Requires a token covering `create` on `quote`.
    pub async fn create_quote(
        &self,
        wallet_address: &str,
        receiver: &str,
        token: &AccessToken,
    ) -> Result<Quote> {
        check_capability(token, ResourceType::Quote, Action::Create)?;

        let body = json!({
            "walletAddress": wallet_address,
            "receiver": receiver,
            "method": "ilp",
        });

        let url = self.resource_url("quotes");
        tracing::debug!(wallet = %wallet_address, %receiver, "creating quote");
        let response = self
            .send_authenticated(Method::POST, &url, Some(body.to_string()), token)
            .await?;
        parse_resource(&url, response)
    }

    /// Creates an outgoing payment from the given quote.
    ///
    /// Fails locally with `QuoteExpired`, issuing no resource-server call,
    /// if the quote is past its expiry. Requires a token covering `create`
    /// on `outgoing-payment`.
    pub async fn create_outgoing_payment(
        &self,
        wallet_address: &str,
        quote: &Quote,
        metadata: Option<Value>,
        token: &AccessToken,
    ) -> Result<OutgoingPayment> {
        check_capability(token, ResourceType::OutgoingPayment, Action::Create)?;
        if quote.is_expired(Utc::now()) {
            return Err(OpError::QuoteExpired {
                id: quote.id.clone(),
                expires_at: quote.expires_at,
            });
        }

        let mut body = json!({
            "walletAddress": wallet_address,
            "quoteId": quote.id,
        });
        if let Some(metadata) = metadata {
            body["metadata"] = metadata;
        }

        let url = self.resource_url("outgoing-payments");
        tracing::debug!(wallet = %wallet_address, quote = %quote.id, "creating outgoing payment");
        let response = self
            .send_authenticated(Method::POST, &url, Some(body.to_string()), token)
            .await?;
        parse_resource(&url, response)
    }

    /// Reads the state of an outgoing payment. The id is its full URL.
    ///
    /// Requires a token covering `read` on `outgoing-payment`.
    pub async fn get_outgoing_payment(
        &self,
        payment_url: &str,
        token: &AccessToken,
    ) -> Result<OutgoingPayment> {
        check_capability(token, ResourceType::OutgoingPayment, Action::Read)?;
        let response = self
            .send_authenticated(Method::GET, payment_url, None, token)
            .await?;
        parse_resource(payment_url, response)
    }

    fn resource_url(&self, path: &str) -> String {
        format!("{}/{}", self.resource_server_url.trim_end_matches('/'), path)
    }

    async fn send_authenticated(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
        token: &AccessToken,
    ) -> Result<HttpResponse> {
        let headers = sign_request(
            &self.keys,
            &method,
            url,
            current_timestamp(),
            body.as_deref(),
        )?;

        let mut request = HttpRequest::new(method, url)
            .header("Authorization", format!("GNAP {}", token.value))
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(body);
        }
        headers.apply(&mut request.headers);

        self.transport.send(request).await
    }
}

/// Checks a token's bound capabilities against a call's requirement.
fn check_capability(token: &AccessToken, resource_type: ResourceType, action: Action) -> Result<()> {
    if token.covers(resource_type, action) {
        Ok(())
    } else {
        Err(OpError::CapabilityMismatch {
            resource_type,
            action,
        })
    }
}

/// Maps a response to a typed resource, or to a typed failure.
fn parse_resource<T: DeserializeOwned>(url: &str, response: HttpResponse) -> Result<T> {
    if !response.is_success() {
        return Err(match response.status {
            401 | 403 => OpError::AuthorizationDenied {
                server: url.to_string(),
                reason: response.body,
            },
            status => OpError::UnexpectedStatus {
                status,
                url: url.to_string(),
                body: response.body,
            },
        });
    }
    serde_json::from_str(&response.body).map_err(|e| OpError::SchemaError {
        context: url.to_string(),
        detail: e.to_string(),
        payload: response.body,
    })
}
