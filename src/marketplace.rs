//! Users, listings and purchase records.
//!
//! Users are keyed by wallet address (case-insensitive). Prices and amounts
//! are whole-USDC decimals stored as text so no precision is lost in SQLite.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::info;

const UNKNOWN_WALLET: &str = "Unknown";

#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("User not found")]
    UserNotFound,
    #[error("Buyer not found. Please ensure your wallet is properly connected.")]
    BuyerNotFound,
    #[error("Listing not found")]
    ListingNotFound,
    #[error("Transaction not found")]
    TransactionNotFound,
    #[error("invalid decimal in {column}: {value}")]
    StoredDecimal {
        column: &'static str,
        value: String,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl MarketplaceError {
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound | Self::BuyerNotFound | Self::ListingNotFound | Self::TransactionNotFound
        )
    }
}

#[derive(Debug, Clone, Serialize, FromRow, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TransactionStatus {
    Paid,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Listing {
    pub id: i64,
    pub seller_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub seller_wallet_address: Option<String>,
}

#[derive(FromRow)]
struct ListingRow {
    id: i64,
    seller_id: i64,
    title: String,
    description: Option<String>,
    price: String,
    image_url: Option<String>,
    status: ListingStatus,
    created_at: DateTime<Utc>,
    seller_wallet_address: Option<String>,
}

impl TryFrom<ListingRow> for Listing {
    type Error = MarketplaceError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            seller_id: row.seller_id,
            title: row.title,
            description: row.description,
            price: parse_decimal("listings.price", &row.price)?,
            image_url: row.image_url,
            status: row.status,
            created_at: row.created_at,
            seller_wallet_address: row.seller_wallet_address,
        })
    }
}

/// A transaction joined with its listing and both parties' wallets.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrderView {
    pub id: i64,
    pub listing_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub amount: Decimal,
    pub source_chain: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub buyer_wallet_address: String,
    pub seller_wallet_address: String,
}

#[derive(FromRow)]
struct OrderRow {
    id: i64,
    listing_id: i64,
    buyer_id: i64,
    seller_id: i64,
    amount: String,
    source_chain: String,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
    title: String,
    description: Option<String>,
    price: String,
    buyer_wallet_address: Option<String>,
    seller_wallet_address: Option<String>,
}

/// Which side of an order the caller is on. The caller's own wallet fills
/// its side when the user row is gone, the other side becomes "Unknown".
#[derive(Clone, Copy)]
enum Perspective<'a> {
    Buyer(&'a str),
    Seller(&'a str),
}

impl OrderRow {
    fn into_view(self, perspective: Perspective<'_>) -> Result<OrderView, MarketplaceError> {
        let (buyer_fallback, seller_fallback) = match perspective {
            Perspective::Buyer(wallet) => (wallet, UNKNOWN_WALLET),
            Perspective::Seller(wallet) => (UNKNOWN_WALLET, wallet),
        };

        Ok(OrderView {
            id: self.id,
            listing_id: self.listing_id,
            buyer_id: self.buyer_id,
            seller_id: self.seller_id,
            amount: parse_decimal("transactions.amount", &self.amount)?,
            source_chain: self.source_chain,
            status: self.status,
            created_at: self.created_at,
            title: self.title,
            description: self.description,
            price: parse_decimal("listings.price", &self.price)?,
            buyer_wallet_address: self
                .buyer_wallet_address
                .unwrap_or_else(|| buyer_fallback.to_string()),
            seller_wallet_address: self
                .seller_wallet_address
                .unwrap_or_else(|| seller_fallback.to_string()),
        })
    }
}

fn parse_decimal(column: &'static str, value: &str) -> Result<Decimal, MarketplaceError> {
    Decimal::from_str(value).map_err(|_| MarketplaceError::StoredDecimal {
        column,
        value: value.to_string(),
    })
}

const LISTING_SELECT: &str = "
    SELECT l.id, l.seller_id, l.title, l.description, l.price, l.image_url,
           l.status, l.created_at, u.wallet_address AS seller_wallet_address
    FROM listings l
    LEFT JOIN users u ON u.id = l.seller_id";

const ORDER_SELECT: &str = "
    SELECT t.id, t.listing_id, t.buyer_id, t.seller_id, t.amount, t.source_chain,
           t.status, t.created_at, l.title, l.description, l.price,
           b.wallet_address AS buyer_wallet_address,
           s.wallet_address AS seller_wallet_address
    FROM transactions t
    JOIN listings l ON l.id = t.listing_id
    LEFT JOIN users b ON b.id = t.buyer_id
    LEFT JOIN users s ON s.id = t.seller_id";

pub async fn find_user(pool: &SqlitePool, wallet: &str) -> Result<Option<User>, MarketplaceError> {
    Ok(sqlx::query_as::<_, User>(
        "SELECT id, wallet_address, created_at FROM users WHERE wallet_address = ?",
    )
    .bind(wallet)
    .fetch_optional(pool)
    .await?)
}

pub async fn get_or_create_user(pool: &SqlitePool, wallet: &str) -> Result<User, MarketplaceError> {
    if wallet.trim().is_empty() {
        return Err(MarketplaceError::Validation("Wallet address is required"));
    }

    sqlx::query("INSERT INTO users (wallet_address) VALUES (?) ON CONFLICT(wallet_address) DO NOTHING")
        .bind(wallet)
        .execute(pool)
        .await?;

    find_user(pool, wallet)
        .await?
        .ok_or(MarketplaceError::UserNotFound)
}

/// Body of `POST /api/listings/create`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListing {
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub price: Decimal,
    pub image_url: Option<String>,
}

pub async fn create_listing(pool: &SqlitePool, new: NewListing) -> Result<Listing, MarketplaceError> {
    if new.wallet_address.trim().is_empty() || new.title.trim().is_empty() || new.price <= Decimal::ZERO
    {
        return Err(MarketplaceError::Validation(
            "Wallet address, title, and price are required",
        ));
    }

    let seller = get_or_create_user(pool, &new.wallet_address).await?;

    let id = sqlx::query(
        "INSERT INTO listings (seller_id, title, description, price, image_url, status)
         VALUES (?, ?, ?, ?, ?, 'active')",
    )
    .bind(seller.id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(new.price.to_string())
    .bind(&new.image_url)
    .execute(pool)
    .await?
    .last_insert_rowid();

    info!(listing_id = id, seller = %seller.wallet_address, price = %new.price, "Listing created");

    get_listing(pool, id).await
}

pub async fn get_listing(pool: &SqlitePool, id: i64) -> Result<Listing, MarketplaceError> {
    sqlx::query_as::<_, ListingRow>(&format!("{LISTING_SELECT} WHERE l.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(MarketplaceError::ListingNotFound)?
        .try_into()
}

/// Every listing created by `wallet`, newest first.
pub async fn listings_for_seller(
    pool: &SqlitePool,
    wallet: &str,
) -> Result<Vec<Listing>, MarketplaceError> {
    let seller = find_user(pool, wallet)
        .await?
        .ok_or(MarketplaceError::UserNotFound)?;

    sqlx::query_as::<_, ListingRow>(&format!(
        "{LISTING_SELECT} WHERE l.seller_id = ? ORDER BY l.created_at DESC, l.id DESC"
    ))
    .bind(seller.id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(Listing::try_from)
    .collect()
}

/// Listings still for sale, newest first.
pub async fn active_listings(pool: &SqlitePool) -> Result<Vec<Listing>, MarketplaceError> {
    sqlx::query_as::<_, ListingRow>(&format!(
        "{LISTING_SELECT} WHERE l.status = 'active' ORDER BY l.created_at DESC, l.id DESC"
    ))
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(Listing::try_from)
    .collect()
}

/// A completed payment for a listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    #[serde(default)]
    pub wallet_address: String,
    pub listing_id: Option<i64>,
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub source_chain: String,
}

/// Records a paid transaction and marks the listing paid, atomically.
#[tracing::instrument(skip_all, fields(listing_id = ?purchase.listing_id), level = tracing::Level::INFO)]
pub async fn record_purchase(
    pool: &SqlitePool,
    purchase: &Purchase,
) -> Result<OrderView, MarketplaceError> {
    let (Some(listing_id), Some(amount)) = (purchase.listing_id, purchase.amount) else {
        return Err(MarketplaceError::Validation(
            "Wallet address, listing ID, amount, and source chain are required",
        ));
    };

    if purchase.wallet_address.trim().is_empty()
        || purchase.source_chain.trim().is_empty()
        || amount <= Decimal::ZERO
    {
        return Err(MarketplaceError::Validation(
            "Wallet address, listing ID, amount, and source chain are required",
        ));
    }

    let buyer = find_user(pool, &purchase.wallet_address)
        .await?
        .ok_or(MarketplaceError::BuyerNotFound)?;

    let mut sql_tx = pool.begin().await?;

    let seller_id: i64 = sqlx::query_scalar("SELECT seller_id FROM listings WHERE id = ?")
        .bind(listing_id)
        .fetch_optional(&mut *sql_tx)
        .await?
        .ok_or(MarketplaceError::ListingNotFound)?;

    let transaction_id = sqlx::query(
        "INSERT INTO transactions (listing_id, buyer_id, seller_id, amount, source_chain, status)
         VALUES (?, ?, ?, ?, ?, 'paid')",
    )
    .bind(listing_id)
    .bind(buyer.id)
    .bind(seller_id)
    .bind(amount.to_string())
    .bind(&purchase.source_chain)
    .execute(&mut *sql_tx)
    .await?
    .last_insert_rowid();

    sqlx::query("UPDATE listings SET status = 'paid' WHERE id = ?")
        .bind(listing_id)
        .execute(&mut *sql_tx)
        .await?;

    sql_tx.commit().await?;

    info!(
        transaction_id,
        buyer = %buyer.wallet_address,
        %amount,
        source_chain = %purchase.source_chain,
        "Purchase recorded"
    );

    let row = fetch_order(pool, transaction_id).await?;
    row.into_view(Perspective::Buyer(&buyer.wallet_address))
}

async fn fetch_order(pool: &SqlitePool, id: i64) -> Result<OrderRow, MarketplaceError> {
    sqlx::query_as::<_, OrderRow>(&format!("{ORDER_SELECT} WHERE t.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(MarketplaceError::TransactionNotFound)
}

pub async fn transaction_by_id(pool: &SqlitePool, id: i64) -> Result<OrderView, MarketplaceError> {
    let row = fetch_order(pool, id).await?;
    let fallback = row.buyer_wallet_address.clone().unwrap_or_default();
    row.into_view(Perspective::Buyer(&fallback))
}

/// Orders where `wallet` is the buyer, newest first.
pub async fn buying_orders(
    pool: &SqlitePool,
    wallet: &str,
) -> Result<Vec<OrderView>, MarketplaceError> {
    let buyer = find_user(pool, wallet)
        .await?
        .ok_or(MarketplaceError::UserNotFound)?;

    sqlx::query_as::<_, OrderRow>(&format!(
        "{ORDER_SELECT} WHERE t.buyer_id = ? ORDER BY t.created_at DESC, t.id DESC"
    ))
    .bind(buyer.id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| row.into_view(Perspective::Buyer(wallet)))
    .collect()
}

/// Orders where `wallet` is the seller, newest first. An unknown seller
/// simply has no orders.
pub async fn selling_orders(
    pool: &SqlitePool,
    wallet: &str,
) -> Result<Vec<OrderView>, MarketplaceError> {
    let Some(seller) = find_user(pool, wallet).await? else {
        return Ok(Vec::new());
    };

    sqlx::query_as::<_, OrderRow>(&format!(
        "{ORDER_SELECT} WHERE t.seller_id = ? ORDER BY t.created_at DESC, t.id DESC"
    ))
    .bind(seller.id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| row.into_view(Perspective::Seller(wallet)))
    .collect()
}
