//! Shared test fixtures: database setup and marketplace seed data.

use alloy::primitives::{Address, Bytes, U256, address};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::marketplace::{self, Listing, NewListing};

pub(crate) const SELLER: Address = address!("0x5e11e70000000000000000000000000000000001");
pub(crate) const BUYER: Address = address!("0xb0e7000000000000000000000000000000000002");

/// Creates an in-memory SQLite database with all migrations applied.
///
/// The pool is capped at one connection because every `:memory:`
/// connection opens a separate database.
pub(crate) async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

/// Lists an item for [`SELLER`] at `price` USDC.
pub(crate) async fn seed_listing(pool: &SqlitePool, title: &str, price: Decimal) -> Listing {
    marketplace::create_listing(
        pool,
        NewListing {
            wallet_address: SELLER.to_string(),
            title: title.to_string(),
            description: Some(format!("{title} in good condition")),
            price,
            image_url: None,
        },
    )
    .await
    .unwrap()
}

/// CCTP V2 message with a 148-byte header carrying `nonce` and a
/// BurnMessageV2 body minting `amount` to `mint_recipient`.
pub(crate) fn burn_message(
    nonce: [u8; 32],
    mint_recipient: Address,
    amount: U256,
    hook_data: &Bytes,
) -> Bytes {
    let mut message = vec![0u8; 12];
    message.extend_from_slice(&nonce);
    message.resize(148, 0);

    let mut body = vec![0u8; 228];
    body[36..68].copy_from_slice(mint_recipient.into_word().as_slice());
    body[68..100].copy_from_slice(&amount.to_be_bytes::<32>());
    body.extend_from_slice(hook_data);

    message.extend_from_slice(&body);
    Bytes::from(message)
}
