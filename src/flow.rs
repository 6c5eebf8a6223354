//! End-to-end payment flow orchestration.
//!
//! [`PaymentFlow`] sequences one interledger payment: authorize and create an
//! incoming payment on the receiver's side, authorize and create a quote on
//! the sender's side, obtain the (possibly interactive) outgoing-payment
//! grant, and create the outgoing payment from the quote. Steps are strictly
//! sequential; a failure at any step aborts the rest and surfaces the
//! originating error wrapped with the step name and wallet. No cross-step
//! retries are attempted — restarting the whole flow is the caller's call.
//!
//! The "wait for user consent" step is an explicit suspension point: the flow
//! hands the consent redirect URI to an [`InteractionHandler`] and bounds the
//! wait with a timeout, so protocol logic stays decoupled from whatever
//! front-end drives the interaction. Cancelling the flow future stops its
//! remaining HTTP calls without affecting other flows sharing the key store.

use crate::errors::{OpError, Result};
use crate::grant::{GrantNegotiation, GrantNegotiator, InteractConfig};
use crate::keys::KeyStore;
use crate::resources::{discover_wallet, ResourceOrchestrator};
use crate::transport::HttpTransport;
use crate::types::{
    AccessRight, AccessToken, Action, Amount, IncomingPayment, OutgoingPayment, Quote,
    ResourceType, WalletInfo,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default bound on the wait for user consent plus continuation polling.
const DEFAULT_INTERACTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Receives the consent redirect URI when a grant requires user interaction.
///
/// `on_interaction` resolves once the user has completed the interaction
/// (e.g., the redirect callback fired). The flow bounds the wait; an
/// implementation that never resolves produces `InteractionTimeout` rather
/// than a silently pending flow.
#[async_trait]
pub trait InteractionHandler: Send + Sync {
    /// Called with the redirect URI the user must visit to give consent.
    async fn on_interaction(&self, redirect_uri: &str) -> Result<()>;
}

/// The resources produced by a completed payment flow.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    /// Incoming payment created on the receiver's resource server
    pub incoming_payment: IncomingPayment,
    /// Quote the payment was priced from
    pub quote: Quote,
    /// Outgoing payment created on the sender's resource server
    pub outgoing_payment: OutgoingPayment,
}

/// Drives complete payments between two wallets.
///
/// Holds the session-scoped pieces: the key store, the transport, the client
/// identity, and a per-session cache of discovered wallet metadata. One
/// `PaymentFlow` can run multiple independent payments concurrently.
pub struct PaymentFlow {
    keys: Arc<KeyStore>,
    transport: Arc<dyn HttpTransport>,
    client_id: String,
    finish_uri: String,
    interaction_timeout: Duration,
    wallets: RwLock<HashMap<String, WalletInfo>>,
}

impl PaymentFlow {
    /// Creates a flow controller.
    ///
    /// `finish_uri` is where the identity provider redirects after consent;
    /// it is sent with every interactive grant request.
    pub fn new(
        keys: Arc<KeyStore>,
        transport: Arc<dyn HttpTransport>,
        client_id: impl Into<String>,
        finish_uri: impl Into<String>,
    ) -> Self {
        Self {
            keys,
            transport,
            client_id: client_id.into(),
            finish_uri: finish_uri.into(),
            interaction_timeout: DEFAULT_INTERACTION_TIMEOUT,
            wallets: RwLock::new(HashMap::new()),
        }
    }

    /// Bounds the wait for user consent and continuation polling.
    pub fn with_interaction_timeout(mut self, timeout: Duration) -> Self {
        self.interaction_timeout = timeout;
        self
    }

    /// Resolves wallet metadata, using the session cache after the first hit.
    pub async fn wallet_info(&self, wallet_address: &str) -> Result<WalletInfo> {
        if let Some(info) = self.wallets.read().await.get(wallet_address) {
            return Ok(info.clone());
        }
        let info = discover_wallet(self.transport.as_ref(), wallet_address).await?;
        self.wallets
            .write()
            .await
            .insert(wallet_address.to_string(), info.clone());
        Ok(info)
    }

    /// Sends `amount` from `sender` to `receiver`.
    ///
    /// The amount is what the receiver should be credited; the sender is
    /// debited the quoted send amount, fees included. If the sender's
    /// authorization server requires consent for the outgoing payment,
    /// `handler` is given the redirect URI and the flow suspends until the
    /// interaction completes or the interaction timeout elapses.
    pub async fn send_payment(
        &self,
        sender: &str,
        receiver: &str,
        amount: Amount,
        handler: &dyn InteractionHandler,
    ) -> Result<PaymentOutcome> {
        let receiver_info = self
            .wallet_info(receiver)
            .await
            .map_err(|e| e.at_step("discover-receiver", receiver))?;
        let sender_info = self
            .wallet_info(sender)
            .await
            .map_err(|e| e.at_step("discover-sender", sender))?;

        tracing::info!(sender, receiver, value = %amount.value, "starting payment flow");

        // Receiver side: authorize and create the incoming payment.
        let receiver_grants = self.negotiator(&receiver_info.auth_server);
        let incoming_token = self
            .immediate_grant(
                &receiver_grants,
                ResourceType::IncomingPayment,
                &receiver_info.auth_server,
            )
            .await
            .map_err(|e| e.at_step("grant-incoming-payment", receiver))?;

        let receiver_resources = self.orchestrator(&receiver_info.resource_server);
        let incoming_payment = receiver_resources
            .create_incoming_payment(&receiver_info.id, &amount, None, None, &incoming_token)
            .await
            .map_err(|e| e.at_step("create-incoming-payment", receiver))?;

        // Sender side: authorize and create the quote.
        let sender_grants = self.negotiator(&sender_info.auth_server);
        let quote_token = self
            .immediate_grant(&sender_grants, ResourceType::Quote, &sender_info.auth_server)
            .await
            .map_err(|e| e.at_step("grant-quote", sender))?;

        let sender_resources = self.orchestrator(&sender_info.resource_server);
        let quote = sender_resources
            .create_quote(&sender_info.id, &incoming_payment.id, &quote_token)
            .await
            .map_err(|e| e.at_step("create-quote", sender))?;

        // Outgoing payments move the user's money, so the grant may require
        // explicit consent.
        let outgoing_token = self
            .interactive_grant(&sender_grants, handler)
            .await
            .map_err(|e| e.at_step("grant-outgoing-payment", sender))?;

        let outgoing_payment = sender_resources
            .create_outgoing_payment(&sender_info.id, &quote, None, &outgoing_token)
            .await
            .map_err(|e| e.at_step("create-outgoing-payment", sender))?;

        tracing::info!(
            outgoing = %outgoing_payment.id,
            sent = %outgoing_payment.sent_amount.value,
            "payment flow completed"
        );

        Ok(PaymentOutcome {
            incoming_payment,
            quote,
            outgoing_payment,
        })
    }

    fn negotiator(&self, auth_server: &str) -> GrantNegotiator {
        GrantNegotiator::new(
            auth_server,
            self.client_id.clone(),
            self.keys.clone(),
            self.transport.clone(),
        )
    }

    fn orchestrator(&self, resource_server: &str) -> ResourceOrchestrator {
        ResourceOrchestrator::new(resource_server, self.keys.clone(), self.transport.clone())
    }

    /// Requests a non-interactive grant and expects an immediate token.
    async fn immediate_grant(
        &self,
        negotiator: &GrantNegotiator,
        resource_type: ResourceType,
        auth_server: &str,
    ) -> Result<AccessToken> {
        let rights = vec![AccessRight::new(
            resource_type,
            vec![Action::Create, Action::Read],
        )];
        let negotiation = negotiator.request(rights, None).await?;
        granted_token(&negotiation, auth_server)
    }

    /// Requests the outgoing-payment grant, suspending for user consent if
    /// the server requires it.
    async fn interactive_grant(
        &self,
        negotiator: &GrantNegotiator,
        handler: &dyn InteractionHandler,
    ) -> Result<AccessToken> {
        let rights = vec![AccessRight::new(
            ResourceType::OutgoingPayment,
            vec![Action::Create, Action::Read],
        )];
        let mut negotiation = negotiator
            .request(rights, Some(InteractConfig::redirect(&self.finish_uri)))
            .await?;

        if !negotiation.needs_interaction() {
            return granted_token(&negotiation, negotiator.auth_server_url());
        }

        let redirect_uri = negotiation
            .redirect_uri()
            .ok_or_else(|| OpError::SchemaError {
                context: "interactive grant".to_string(),
                detail: "pending grant carries no redirect URI".to_string(),
                payload: String::new(),
            })?
            .to_string();

        tracing::info!(redirect = %redirect_uri, "user consent required, suspending flow");
        let started = Instant::now();
        tokio::time::timeout(self.interaction_timeout, handler.on_interaction(&redirect_uri))
            .await
            .map_err(|_| OpError::InteractionTimeout {
                waited: self.interaction_timeout,
            })??;

        // The continuation polling shares the remaining interaction budget.
        let remaining = self.interaction_timeout.saturating_sub(started.elapsed());
        negotiator.resume(&mut negotiation, remaining).await
    }
}

fn granted_token(negotiation: &GrantNegotiation, server: &str) -> Result<AccessToken> {
    negotiation
        .token()
        .cloned()
        .ok_or_else(|| OpError::AuthorizationDenied {
            server: server.to_string(),
            reason: "server required interaction for a non-interactive grant".to_string(),
        })
}
