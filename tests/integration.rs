//! Integration tests for the openpayments-rs library.
//!
//! These run the end-to-end payment flow against a scripted transport: two
//! wallets, grant negotiation on both authorization servers, and the full
//! incoming-payment / quote / outgoing-payment sequence.

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use openpayments_rs::flow::{InteractionHandler, PaymentFlow};
use openpayments_rs::grant::{GrantNegotiator, GrantState};
use openpayments_rs::keys::KeyStore;
use openpayments_rs::resources::ResourceOrchestrator;
use openpayments_rs::transport::mock::MockTransport;
use openpayments_rs::types::{AccessRight, Action, Amount, ResourceType};
use openpayments_rs::{OpError, Result};

const ALICE: &str = "https://wallet.example/alice";
const BOB: &str = "https://wallet.example/bob";

struct ApproveImmediately;

#[async_trait]
impl InteractionHandler for ApproveImmediately {
    async fn on_interaction(&self, _redirect_uri: &str) -> Result<()> {
        Ok(())
    }
}

/// Records the redirect URI it was shown, then approves.
#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Option<String>>,
}

#[async_trait]
impl InteractionHandler for RecordingHandler {
    async fn on_interaction(&self, redirect_uri: &str) -> Result<()> {
        *self.seen.lock().unwrap() = Some(redirect_uri.to_string());
        Ok(())
    }
}

fn wallet_json(name: &str, side: &str) -> serde_json::Value {
    json!({
        "id": format!("https://wallet.example/{}", name),
        "assetCode": "USD",
        "assetScale": 2,
        "authServer": format!("https://auth-{}.example", side),
        "resourceServer": format!("https://backend-{}.example", side),
    })
}

fn immediate_grant(token: &str) -> serde_json::Value {
    json!({
        "access_token": {
            "value": token,
            "manage": format!("https://auth.example/token/{}", token),
            "expires_in": 600
        }
    })
}

fn quote_json(expires_at: &str) -> serde_json::Value {
    json!({
        "id": "https://backend-sender.example/quotes/q1",
        "sendAmount": {"value": "530", "assetCode": "USD", "assetScale": 2},
        "receiveAmount": {"value": "500", "assetCode": "USD", "assetScale": 2},
        "fees": {"value": "30", "assetCode": "USD", "assetScale": 2},
        "expiresAt": expires_at
    })
}

/// Scripts discovery for both wallets plus the receiver-side and quote steps.
fn script_through_quote(mock: &MockTransport, quote_expires_at: &str) {
    mock.push_json(200, &wallet_json("bob", "receiver"));
    mock.push_json(200, &wallet_json("alice", "sender"));
    mock.push_json(200, &immediate_grant("tok-incoming"));
    mock.push_json(
        201,
        &json!({
            "id": "https://backend-receiver.example/incoming-payments/ip1",
            "walletAddress": BOB,
            "incomingAmount": {"value": "500", "assetCode": "USD", "assetScale": 2},
            "completed": false
        }),
    );
    mock.push_json(200, &immediate_grant("tok-quote"));
    mock.push_json(201, &quote_json(quote_expires_at));
}

fn outgoing_payment_json() -> serde_json::Value {
    json!({
        "id": "https://backend-sender.example/outgoing-payments/op1",
        "walletAddress": ALICE,
        "quoteId": "https://backend-sender.example/quotes/q1",
        "sentAmount": {"value": "530", "assetCode": "USD", "assetScale": 2},
        "failed": false
    })
}

fn flow(mock: Arc<MockTransport>) -> PaymentFlow {
    let keys = Arc::new(KeyStore::generate("key-1").unwrap());
    PaymentFlow::new(
        keys,
        mock,
        "music-site-client",
        "https://music-site.example/payment/callback",
    )
}

#[tokio::test]
async fn test_end_to_end_non_interactive_payment() {
    let mock = Arc::new(MockTransport::new());
    script_through_quote(&mock, "2030-01-01T00:00:00Z");
    // The outgoing-payment grant is issued immediately.
    mock.push_json(200, &immediate_grant("tok-outgoing"));
    mock.push_json(201, &outgoing_payment_json());

    let outcome = flow(mock.clone())
        .send_payment(ALICE, BOB, Amount::new("500", "USD", 2), &ApproveImmediately)
        .await
        .unwrap();

    // Sending 530 cents delivers 500 cents with 30 cents fees.
    assert_eq!(
        outcome.outgoing_payment.sent_amount.value,
        outcome.quote.send_amount.value
    );
    assert_eq!(outcome.quote.receive_amount.value, "500");
    assert_eq!(outcome.incoming_payment.incoming_amount.value, "500");
    assert!(!outcome.outgoing_payment.failed);

    // The sequence hit each server in the prescribed order.
    let urls: Vec<String> = mock
        .recorded()
        .iter()
        .map(|r| r.request.url.clone())
        .collect();
    assert_eq!(
        urls,
        [
            BOB,
            ALICE,
            "https://auth-receiver.example/",
            "https://backend-receiver.example/incoming-payments",
            "https://auth-sender.example/",
            "https://backend-sender.example/quotes",
            "https://auth-sender.example/",
            "https://backend-sender.example/outgoing-payments",
        ]
    );

    // The quote referenced the incoming payment as its receiver.
    let quote_body: serde_json::Value =
        serde_json::from_str(mock.recorded()[5].request.body.as_deref().unwrap()).unwrap();
    assert_eq!(
        quote_body["receiver"],
        "https://backend-receiver.example/incoming-payments/ip1"
    );

    // The outgoing payment referenced the quote.
    let outgoing_body: serde_json::Value =
        serde_json::from_str(mock.recorded()[7].request.body.as_deref().unwrap()).unwrap();
    assert_eq!(
        outgoing_body["quoteId"],
        "https://backend-sender.example/quotes/q1"
    );
}

#[tokio::test]
async fn test_end_to_end_interactive_payment() {
    let mock = Arc::new(MockTransport::new());
    script_through_quote(&mock, "2030-01-01T00:00:00Z");
    // The outgoing-payment grant requires consent.
    mock.push_json(
        200,
        &json!({
            "interact": {"redirect": "https://idp-sender.example/consent/xyz"},
            "continue": {
                "access_token": {"value": "cont-token"},
                "uri": "https://auth-sender.example/continue/xyz"
            }
        }),
    );
    // Continuation succeeds once the user approved.
    mock.push_json(200, &immediate_grant("tok-outgoing"));
    mock.push_json(201, &outgoing_payment_json());

    let handler = RecordingHandler::default();
    let outcome = flow(mock.clone())
        .send_payment(ALICE, BOB, Amount::new("500", "USD", 2), &handler)
        .await
        .unwrap();

    assert_eq!(
        handler.seen.lock().unwrap().as_deref(),
        Some("https://idp-sender.example/consent/xyz")
    );
    assert_eq!(outcome.outgoing_payment.sent_amount.value, "530");

    // The continuation call carried the continuation token.
    let continuation = &mock.recorded()[7].request;
    assert_eq!(continuation.url, "https://auth-sender.example/continue/xyz");
    assert!(continuation
        .headers
        .iter()
        .any(|(n, v)| n == "Authorization" && v == "GNAP cont-token"));
}

#[tokio::test]
async fn test_expired_quote_aborts_before_outgoing_call() {
    let mock = Arc::new(MockTransport::new());
    // Quote already expired when the flow reaches the outgoing payment.
    script_through_quote(&mock, "2020-01-01T00:00:00Z");
    mock.push_json(200, &immediate_grant("tok-outgoing"));

    let err = flow(mock.clone())
        .send_payment(ALICE, BOB, Amount::new("500", "USD", 2), &ApproveImmediately)
        .await
        .unwrap_err();

    match err {
        OpError::StepFailed { step, source, .. } => {
            assert_eq!(step, "create-outgoing-payment");
            assert!(matches!(*source, OpError::QuoteExpired { .. }));
        }
        other => panic!("expected StepFailed, got {:?}", other),
    }
    // Everything up to and including the outgoing grant ran, nothing after.
    assert_eq!(mock.request_count(), 7);
}

#[tokio::test]
async fn test_revoked_token_requires_fresh_grant_cycle() {
    let mock = Arc::new(MockTransport::new());
    let keys = Arc::new(KeyStore::generate("key-1").unwrap());
    let negotiator = GrantNegotiator::new(
        "https://auth.example",
        "music-site-client",
        keys.clone(),
        mock.clone(),
    );
    let orchestrator =
        ResourceOrchestrator::new("https://backend.example", keys, mock.clone());

    mock.push_json(200, &immediate_grant("tok-quote"));
    let mut negotiation = negotiator
        .request(
            vec![AccessRight::new(ResourceType::Quote, vec![Action::Create])],
            None,
        )
        .await
        .unwrap();
    let token = negotiation.token().unwrap().clone();

    // Revoke the token at its manage URI.
    mock.push_response(204, "");
    negotiator.revoke_token(&token).await.unwrap();
    negotiation.mark_revoked();
    assert_eq!(*negotiation.state(), GrantState::Revoked);
    assert!(negotiation.token().is_none());

    // The server refuses the stale token value; nothing is served from a cache.
    mock.push_response(401, r#"{"error":"token revoked"}"#);
    let err = orchestrator
        .create_quote(ALICE, "https://backend.example/incoming-payments/ip1", &token)
        .await
        .unwrap_err();
    assert!(matches!(err, OpError::AuthorizationDenied { .. }));
}

#[tokio::test]
async fn test_concurrent_flows_share_one_key_store() {
    let keys = Arc::new(KeyStore::generate("key-1").unwrap());

    let make_flow = |mock: &Arc<MockTransport>| {
        PaymentFlow::new(
            keys.clone(),
            mock.clone(),
            "music-site-client",
            "https://music-site.example/payment/callback",
        )
    };

    let mock_a = Arc::new(MockTransport::new());
    script_through_quote(&mock_a, "2030-01-01T00:00:00Z");
    mock_a.push_json(200, &immediate_grant("tok-outgoing"));
    mock_a.push_json(201, &outgoing_payment_json());

    let mock_b = Arc::new(MockTransport::new());
    script_through_quote(&mock_b, "2030-01-01T00:00:00Z");
    mock_b.push_json(200, &immediate_grant("tok-outgoing"));
    mock_b.push_json(201, &outgoing_payment_json());

    let flow_a = make_flow(&mock_a);
    let flow_b = make_flow(&mock_b);

    let amount = Amount::new("500", "USD", 2);
    let (a, b) = tokio::join!(
        flow_a.send_payment(ALICE, BOB, amount.clone(), &ApproveImmediately),
        flow_b.send_payment(ALICE, BOB, amount, &ApproveImmediately),
    );

    assert_eq!(a.unwrap().outgoing_payment.sent_amount.value, "530");
    assert_eq!(b.unwrap().outgoing_payment.sent_amount.value, "530");
}

#[tokio::test]
async fn test_flow_cancellation_stops_http_calls() {
    let mock = Arc::new(MockTransport::new());
    script_through_quote(&mock, "2030-01-01T00:00:00Z");
    mock.push_json(
        200,
        &json!({
            "interact": {"redirect": "https://idp.example/consent/xyz"},
            "continue": {
                "access_token": {"value": "cont"},
                "uri": "https://auth-sender.example/continue/xyz"
            }
        }),
    );

    struct Stalls;

    #[async_trait]
    impl InteractionHandler for Stalls {
        async fn on_interaction(&self, _redirect_uri: &str) -> Result<()> {
            std::future::pending().await
        }
    }

    let flow = flow(mock.clone()).with_interaction_timeout(Duration::from_secs(60));
    let handler = Stalls;
    let payment = flow.send_payment(ALICE, BOB, Amount::new("500", "USD", 2), &handler);
    tokio::pin!(payment);

    // Give the flow time to reach the suspension point, then cancel it.
    let raced = tokio::time::timeout(Duration::from_millis(200), &mut payment).await;
    assert!(raced.is_err(), "flow should still be suspended");
    drop(payment);

    // Nothing past the outgoing grant request was issued.
    assert_eq!(mock.request_count(), 7);
}
