//! Runs a complete payment between two wallet addresses.
//!
//! Discovers both wallets, negotiates the three grants, creates the incoming
//! payment and quote, and submits the outgoing payment. If the sender's
//! authorization server requires consent, the redirect URI is printed and the
//! flow waits for you to approve it in a browser.
//!
//! Run with:
//! ```bash
//! cargo run --example complete_flow
//! ```
//!
//! Environment variables (a `.env` file is honored):
//! - KEY_ID: Identifier of the registered key pair (default: "op-client-key")
//! - PRIVATE_KEY_PATH: Path to the private seed file (default: "./keys/op-client-key_private.key")
//! - SENDER_WALLET: Sender's wallet address URL
//! - RECEIVER_WALLET: Receiver's wallet address URL
//! - AMOUNT: Value the receiver should be credited, in minor units (default: "500")
//! - ASSET_CODE / ASSET_SCALE: Currency of the amount (default: USD / 2)

use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use openpayments_rs::flow::{InteractionHandler, PaymentFlow};
use openpayments_rs::keys::KeyStore;
use openpayments_rs::transport::ReqwestTransport;
use openpayments_rs::types::Amount;
use openpayments_rs::Result as OpResult;

/// Prints the consent URL and waits for the user to press enter.
struct ConsoleApproval;

#[async_trait]
impl InteractionHandler for ConsoleApproval {
    async fn on_interaction(&self, redirect_uri: &str) -> OpResult<()> {
        println!();
        println!("🔑 Consent required. Open this URL in a browser:");
        println!("   {}", redirect_uri);
        print!("   Press enter once you have approved... ");
        let _ = io::stdout().flush();
        // Blocking read on a dedicated thread so the runtime keeps polling.
        let _ = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            let _ = io::stdin().lock().read_line(&mut line);
        })
        .await;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let key_id = std::env::var("KEY_ID").unwrap_or_else(|_| "op-client-key".to_string());
    let key_path = std::env::var("PRIVATE_KEY_PATH")
        .unwrap_or_else(|_| "./keys/op-client-key_private.key".to_string());
    let sender = std::env::var("SENDER_WALLET")
        .unwrap_or_else(|_| "https://wallet.example/alice".to_string());
    let receiver = std::env::var("RECEIVER_WALLET")
        .unwrap_or_else(|_| "https://wallet.example/bob".to_string());
    let value = std::env::var("AMOUNT").unwrap_or_else(|_| "500".to_string());
    let asset_code = std::env::var("ASSET_CODE").unwrap_or_else(|_| "USD".to_string());
    let asset_scale: u8 = std::env::var("ASSET_SCALE")
        .unwrap_or_else(|_| "2".to_string())
        .parse()?;

    println!("💸 Open Payments flow");
    println!("   Sender:   {}", sender);
    println!("   Receiver: {}", receiver);
    println!("   Amount:   {} {} (scale {})", value, asset_code, asset_scale);
    println!();

    let keys = Arc::new(KeyStore::load(&key_id, &key_path)?);
    let transport = Arc::new(ReqwestTransport::new());
    let flow = PaymentFlow::new(
        keys,
        transport,
        "openpayments-rs-demo",
        "https://localhost/payment/callback",
    );

    let outcome = flow
        .send_payment(&sender, &receiver, Amount::new(value, asset_code, asset_scale), &ConsoleApproval)
        .await?;

    println!("✅ Payment complete");
    println!("   Incoming payment: {}", outcome.incoming_payment.id);
    println!(
        "   Quoted send amount: {} (fees {})",
        outcome.quote.send_amount.value,
        outcome
            .quote
            .fees
            .as_ref()
            .map(|f| f.value.as_str())
            .unwrap_or("0")
    );
    println!("   Outgoing payment: {}", outcome.outgoing_payment.id);
    println!(
        "   Sent: {} {}",
        outcome.outgoing_payment.sent_amount.value, outcome.outgoing_payment.sent_amount.asset_code
    );

    Ok(())
}
