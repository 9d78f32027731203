//! Wallet sign-in.
//!
//! A client asks for a nonce, signs `Sign in to Cartfree: {nonce}` with its
//! wallet (EIP-191 personal message) and exchanges the signature for an
//! opaque session token. Nonces are single-use and expire after ten minutes.
//! Sessions last a day.

use alloy::primitives::Signature;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::marketplace::{self, MarketplaceError};

const NONCE_TTL_MINUTES: i64 = 10;
const SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Wallet address, signature, and nonce are required")]
    MissingFields,
    #[error("Wallet address is required")]
    MissingWallet,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Signature verification failed")]
    SignatureVerification,
    #[error("Unknown or already used nonce")]
    UnknownNonce,
    #[error("Nonce expired")]
    ExpiredNonce,
    #[error("Invalid or expired session")]
    InvalidSession,
    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AuthError {
    pub const fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::SignatureVerification
                | Self::UnknownNonce
                | Self::ExpiredNonce
                | Self::InvalidSession
        )
    }
}

pub fn sign_in_message(nonce: &str) -> String {
    format!("Sign in to Cartfree: {nonce}")
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IssuedNonce {
    pub nonce: String,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

pub async fn issue_nonce(pool: &SqlitePool, wallet: &str) -> Result<IssuedNonce, AuthError> {
    if wallet.trim().is_empty() {
        return Err(AuthError::MissingWallet);
    }

    let nonce = alloy::hex::encode(rand::random::<[u8; 16]>());
    let expires_at = Utc::now() + Duration::minutes(NONCE_TTL_MINUTES);

    sqlx::query("INSERT INTO auth_nonces (nonce, wallet_address, expires_at) VALUES (?, ?, ?)")
        .bind(&nonce)
        .bind(wallet)
        .bind(expires_at)
        .execute(pool)
        .await?;

    debug!(wallet, "Issued sign-in nonce");

    Ok(IssuedNonce {
        message: sign_in_message(&nonce),
        nonce,
        expires_at,
    })
}

/// Body of `POST /api/auth/verify`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignIn {
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub wallet_address: String,
    pub expires_at: DateTime<Utc>,
}

/// Checks the signature over the sign-in message, consumes the nonce and
/// opens a session for the wallet.
#[tracing::instrument(skip_all, fields(wallet = %sign_in.wallet_address), level = tracing::Level::INFO)]
pub async fn verify(pool: &SqlitePool, sign_in: &SignIn) -> Result<Session, AuthError> {
    let SignIn {
        wallet_address,
        nonce,
        signature,
    } = sign_in;

    if wallet_address.is_empty() || nonce.is_empty() || signature.is_empty() {
        return Err(AuthError::MissingFields);
    }

    let signature = alloy::hex::decode(signature)
        .ok()
        .and_then(|raw| Signature::from_raw(&raw).ok())
        .ok_or(AuthError::SignatureVerification)?;

    let recovered = signature
        .recover_address_from_msg(sign_in_message(nonce))
        .map_err(|_| AuthError::SignatureVerification)?;

    if !recovered.to_string().eq_ignore_ascii_case(wallet_address) {
        warn!(%recovered, "Signature does not match claimed wallet");
        return Err(AuthError::InvalidSignature);
    }

    let expires_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        "DELETE FROM auth_nonces WHERE nonce = ? AND wallet_address = ? RETURNING expires_at",
    )
    .bind(nonce)
    .bind(wallet_address)
    .fetch_optional(pool)
    .await?;

    match expires_at {
        None => return Err(AuthError::UnknownNonce),
        Some(expires_at) if expires_at <= Utc::now() => return Err(AuthError::ExpiredNonce),
        Some(_) => {}
    }

    let user = marketplace::get_or_create_user(pool, wallet_address).await?;

    let token = alloy::hex::encode(rand::random::<[u8; 32]>());
    let expires_at = Utc::now() + Duration::hours(SESSION_TTL_HOURS);

    sqlx::query("INSERT INTO sessions (token, wallet_address, expires_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(&user.wallet_address)
        .bind(expires_at)
        .execute(pool)
        .await?;

    info!(user_id = user.id, "Wallet signed in");

    Ok(Session {
        token,
        wallet_address: user.wallet_address,
        expires_at,
    })
}

/// Wallet that owns an unexpired session token.
pub async fn session_wallet(pool: &SqlitePool, token: &str) -> Result<String, AuthError> {
    let row: Option<(String, DateTime<Utc>)> =
        sqlx::query_as("SELECT wallet_address, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(pool)
            .await?;

    match row {
        Some((wallet, expires_at)) if expires_at > Utc::now() => Ok(wallet),
        _ => Err(AuthError::InvalidSession),
    }
}
