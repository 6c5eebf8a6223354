//! Core type definitions for the Open Payments client.
//!
//! This module contains the data structures exchanged with authorization and
//! resource servers: amounts, wallet metadata, access rights, access tokens,
//! and the quote / incoming-payment / outgoing-payment resource records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Protected resource types an access token can be bound to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    /// Receiver-side payment record
    IncomingPayment,
    /// Priced, time-bounded transfer offer
    Quote,
    /// Sender-side payment record
    OutgoingPayment,
}

impl ResourceType {
    /// Returns the wire name of this resource type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::IncomingPayment => "incoming-payment",
            ResourceType::Quote => "quote",
            ResourceType::OutgoingPayment => "outgoing-payment",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions that can be requested on a resource type.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create a new resource
    Create,
    /// Read an existing resource
    Read,
    /// Update an existing resource
    Update,
    /// List resources
    List,
}

impl Action {
    /// Returns the wire name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::List => "list",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single access right requested in a grant and bound to the resulting
/// token.
///
/// # Examples
///
/// ```
/// use openpayments_rs::types::{AccessRight, Action, ResourceType};
///
/// let right = AccessRight::new(ResourceType::Quote, vec![Action::Create, Action::Read]);
/// assert!(right.covers(ResourceType::Quote, Action::Create));
/// assert!(!right.covers(ResourceType::OutgoingPayment, Action::Create));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccessRight {
    /// Resource type this right applies to
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    /// Actions permitted on the resource type
    pub actions: Vec<Action>,

    /// Optional URL restricting the right to one specific resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl AccessRight {
    /// Creates an access right for a resource type and set of actions.
    pub fn new(resource_type: ResourceType, actions: Vec<Action>) -> Self {
        Self {
            resource_type,
            actions,
            identifier: None,
        }
    }

    /// Returns true if this right permits `action` on `resource_type`.
    pub fn covers(&self, resource_type: ResourceType, action: Action) -> bool {
        self.resource_type == resource_type && self.actions.contains(&action)
    }
}

/// An amount in the smallest unit of an asset.
///
/// `value` is a string to match the wire format, which must represent amounts
/// beyond u64 without loss.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Amount {
    /// Amount in the smallest unit, as a decimal string (e.g., "500" cents)
    pub value: String,

    /// Asset code (e.g., "USD")
    #[serde(rename = "assetCode")]
    pub asset_code: String,

    /// Number of decimal places in the smallest unit (e.g., 2 for cents)
    #[serde(rename = "assetScale")]
    pub asset_scale: u8,
}

impl Amount {
    /// Creates an amount from a value string, asset code, and scale.
    pub fn new(value: impl Into<String>, asset_code: impl Into<String>, asset_scale: u8) -> Self {
        Self {
            value: value.into(),
            asset_code: asset_code.into(),
            asset_scale,
        }
    }
}

/// Public metadata resolved from a wallet address via discovery.
///
/// Fetched once per wallet and cached for the session.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WalletInfo {
    /// Canonical wallet address URL
    pub id: String,

    /// Asset code of the account
    #[serde(rename = "assetCode")]
    pub asset_code: String,

    /// Asset scale of the account
    #[serde(rename = "assetScale")]
    pub asset_scale: u8,

    /// Authorization server for grants on this wallet
    #[serde(rename = "authServer")]
    pub auth_server: String,

    /// Resource server holding this wallet's payment resources
    #[serde(rename = "resourceServer")]
    pub resource_server: String,
}

/// A bearer credential issued by an authorization server.
///
/// Tokens are immutable snapshots: refreshing or rotating produces a new
/// `AccessToken` value rather than mutating a held one, so concurrent readers
/// never observe a half-updated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Opaque token value, sent as `Authorization: GNAP <value>`
    pub value: String,

    /// URL for managing (revoking) this token
    pub manage: String,

    /// Expiry instant, if the server declared one
    pub expires_at: Option<DateTime<Utc>>,

    /// Capabilities this token is bound to
    pub access: Vec<AccessRight>,
}

impl AccessToken {
    /// Returns true if this token's bound capabilities cover `action` on
    /// `resource_type`.
    ///
    /// Over-broad coverage is acceptable; under-coverage makes the resource
    /// call fail locally with a capability mismatch.
    pub fn covers(&self, resource_type: ResourceType, action: Action) -> bool {
        self.access.iter().any(|r| r.covers(resource_type, action))
    }

    /// Returns true if this token has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// A priced, time-bounded offer for one transfer, created on the sender's
/// resource server.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Quote {
    /// Quote resource URL
    pub id: String,

    /// Amount debited from the sender, fees included
    #[serde(rename = "sendAmount")]
    pub send_amount: Amount,

    /// Amount delivered to the receiver
    #[serde(rename = "receiveAmount")]
    pub receive_amount: Amount,

    /// Fees charged for the transfer, if reported separately
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fees: Option<Amount>,

    /// Instant after which this quote may no longer be used
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

impl Quote {
    /// Returns true if this quote may no longer back an outgoing payment.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A receiver-side payment record on the receiver's resource server.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IncomingPayment {
    /// Incoming payment resource URL
    pub id: String,

    /// Receiver's wallet address
    #[serde(rename = "walletAddress")]
    pub wallet_address: String,

    /// Amount the receiver expects
    #[serde(rename = "incomingAmount")]
    pub incoming_amount: Amount,

    /// Amount received so far, if any
    #[serde(rename = "receivedAmount", skip_serializing_if = "Option::is_none")]
    pub received_amount: Option<Amount>,

    /// Whether the payment has completed
    #[serde(default)]
    pub completed: bool,

    /// Caller-supplied metadata echoed by the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A sender-side payment record on the sender's resource server.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OutgoingPayment {
    /// Outgoing payment resource URL
    pub id: String,

    /// Sender's wallet address
    #[serde(rename = "walletAddress")]
    pub wallet_address: String,

    /// Quote the payment was created from
    #[serde(rename = "quoteId", skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<String>,

    /// Amount debited from the sender
    #[serde(rename = "sentAmount")]
    pub sent_amount: Amount,

    /// Whether the payment failed downstream
    #[serde(default)]
    pub failed: bool,

    /// Caller-supplied metadata echoed by the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token_with(rights: Vec<AccessRight>) -> AccessToken {
        AccessToken {
            value: "tok".to_string(),
            manage: "https://auth.example/token/1".to_string(),
            expires_at: None,
            access: rights,
        }
    }

    #[test]
    fn test_access_right_serialization() {
        let right = AccessRight::new(
            ResourceType::IncomingPayment,
            vec![Action::Create, Action::Read],
        );
        let json = serde_json::to_string(&right).unwrap();
        assert!(json.contains("\"type\":\"incoming-payment\""));
        assert!(json.contains("\"create\""));
        assert!(!json.contains("identifier"));
    }

    #[test]
    fn test_token_covers_exact() {
        let token = token_with(vec![AccessRight::new(
            ResourceType::Quote,
            vec![Action::Create],
        )]);
        assert!(token.covers(ResourceType::Quote, Action::Create));
        assert!(!token.covers(ResourceType::Quote, Action::Read));
        assert!(!token.covers(ResourceType::OutgoingPayment, Action::Create));
    }

    #[test]
    fn test_token_overbroad_coverage_is_accepted() {
        let token = token_with(vec![
            AccessRight::new(
                ResourceType::Quote,
                vec![Action::Create, Action::Read, Action::List],
            ),
            AccessRight::new(ResourceType::OutgoingPayment, vec![Action::Create]),
        ]);
        // Broader than needed is fine; only under-coverage is fatal.
        assert!(token.covers(ResourceType::Quote, Action::Read));
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        let mut token = token_with(vec![]);
        assert!(!token.is_expired(now));
        token.expires_at = Some(now - Duration::seconds(1));
        assert!(token.is_expired(now));
    }

    #[test]
    fn test_quote_deserialization_and_expiry() {
        let json = r#"{
            "id": "https://backend.example/quotes/q1",
            "sendAmount": {"value": "530", "assetCode": "USD", "assetScale": 2},
            "receiveAmount": {"value": "500", "assetCode": "USD", "assetScale": 2},
            "fees": {"value": "30", "assetCode": "USD", "assetScale": 2},
            "expiresAt": "2030-01-01T00:00:00Z"
        }"#;
        let quote: Quote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.send_amount.value, "530");
        assert_eq!(quote.fees.as_ref().unwrap().value, "30");
        assert!(!quote.is_expired(Utc::now()));
        assert!(quote.is_expired(quote.expires_at));
    }

    #[test]
    fn test_wallet_info_deserialization() {
        let json = r#"{
            "id": "https://wallet.example/alice",
            "assetCode": "USD",
            "assetScale": 2,
            "authServer": "https://auth.example",
            "resourceServer": "https://backend.example"
        }"#;
        let info: WalletInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.asset_scale, 2);
        assert_eq!(info.auth_server, "https://auth.example");
    }

    #[test]
    fn test_outgoing_payment_defaults() {
        let json = r#"{
            "id": "https://backend.example/outgoing-payments/op1",
            "walletAddress": "https://wallet.example/alice",
            "sentAmount": {"value": "530", "assetCode": "USD", "assetScale": 2}
        }"#;
        let payment: OutgoingPayment = serde_json::from_str(json).unwrap();
        assert!(!payment.failed);
        assert!(payment.quote_id.is_none());
    }
}
