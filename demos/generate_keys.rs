//! Generates an Ed25519 client key pair for Open Payments.
//!
//! Writes the private seed and a JWK document to disk, then prints the JWK
//! so it can be registered with a wallet provider.
//!
//! Run with:
//! ```bash
//! cargo run --example generate_keys
//! ```
//!
//! Environment variables:
//! - KEY_ID: Identifier for the key pair (default: "op-client-key")
//! - KEY_DIR: Directory to write the key files into (default: "./keys")

use openpayments_rs::keys::{JwkSet, KeyStore};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let key_id = std::env::var("KEY_ID").unwrap_or_else(|_| "op-client-key".to_string());
    let key_dir = std::env::var("KEY_DIR").unwrap_or_else(|_| "./keys".to_string());

    println!("🔐 Open Payments key generation");
    println!("   Key id: {}", key_id);
    println!("   Output: {}", key_dir);
    println!();

    let keys = KeyStore::generate(&key_id)?;
    let (private_path, public_path) = keys.save(&key_dir)?;

    println!("✅ Private key written to {}", private_path.display());
    println!("✅ Public JWK set written to {}", public_path.display());
    println!();

    let document = JwkSet {
        keys: vec![keys.public_jwk()],
    };
    println!("Register this JWK document with your wallet provider:");
    println!("{}", serde_json::to_string_pretty(&document)?);

    Ok(())
}
