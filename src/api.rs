//! HTTP routes.
//!
//! Successful responses carry `success: true` next to their payload. Errors
//! carry an `error` string, plus `message` for relayer failures.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::response::{self, Responder};
use rocket::serde::json::{Json, Value, json};
use rocket::serde::{Deserialize, Serialize};
use rocket::{Build, FromForm, Rocket, Route, State, get, post, routes};
use sqlx::SqlitePool;
use tracing::{error, warn};

use crate::auth::{self, AuthError, SignIn};
use crate::marketplace::{self, MarketplaceError, NewListing, Purchase};
use crate::relayer::{CompleteTransferRequest, Finalizer, Relayer, RelayerError, TransferFinalization};
use crate::settlement::{self, SettlementError};

/// The in-process relayer, absent when no relayer key is configured.
pub(crate) struct RelayerState(pub(crate) Option<Arc<Relayer>>);

#[derive(Debug)]
pub(crate) struct ApiError {
    status: Status,
    error: String,
    message: Option<String>,
}

impl ApiError {
    fn new(status: Status, error: impl ToString) -> Self {
        Self {
            status,
            error: error.to_string(),
            message: None,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let body = match self.message {
            Some(message) => json!({ "error": self.error, "message": message }),
            None => json!({ "error": self.error }),
        };

        (self.status, Json(body)).respond_to(request)
    }
}

impl From<MarketplaceError> for ApiError {
    fn from(err: MarketplaceError) -> Self {
        let status = match &err {
            MarketplaceError::Validation(_) => Status::BadRequest,
            err if err.is_not_found() => Status::NotFound,
            _ => Status::InternalServerError,
        };

        if status == Status::InternalServerError {
            error!(%err, "Marketplace request failed");
        }

        Self::new(status, err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::MissingFields | AuthError::MissingWallet => Status::BadRequest,
            err if err.is_unauthorized() => Status::Unauthorized,
            AuthError::Marketplace(inner) if inner.is_not_found() => Status::NotFound,
            _ => Status::InternalServerError,
        };

        Self::new(status, err)
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::NotFound(_) => Self::new(Status::NotFound, err),
            err => Self::new(Status::InternalServerError, err),
        }
    }
}

impl From<RelayerError> for ApiError {
    fn from(err: RelayerError) -> Self {
        if err.is_client_error() {
            return Self::new(Status::BadRequest, err);
        }

        error!(%err, "completeTransfer failed");

        Self {
            status: Status::InternalServerError,
            error: "completeTransfer failed".to_string(),
            message: Some(err.to_string()),
        }
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// `?walletAddress=` on the marketplace queries.
#[derive(FromForm)]
struct WalletQuery<'r> {
    #[field(name = "walletAddress")]
    wallet_address: Option<&'r str>,
}

impl<'r> WalletQuery<'r> {
    fn required(&self) -> Result<&'r str, ApiError> {
        self.wallet_address
            .filter(|wallet| !wallet.trim().is_empty())
            .ok_or_else(|| ApiError::new(Status::BadRequest, "Wallet address is required"))
    }
}

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    timestamp: DateTime<Utc>,
}

#[get("/health")]
fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NonceRequest {
    #[serde(default)]
    wallet_address: String,
}

#[post("/auth/nonce", format = "json", data = "<request>")]
async fn auth_nonce(request: Json<NonceRequest>, pool: &State<SqlitePool>) -> ApiResult {
    let issued = auth::issue_nonce(pool.inner(), &request.wallet_address).await?;

    Ok(Json(json!({
        "success": true,
        "nonce": issued.nonce,
        "message": issued.message,
        "expiresAt": issued.expires_at,
    })))
}

#[post("/auth/verify", format = "json", data = "<sign_in>")]
async fn auth_verify(sign_in: Json<SignIn>, pool: &State<SqlitePool>) -> ApiResult {
    let session = auth::verify(pool.inner(), &sign_in).await?;

    Ok(Json(json!({
        "success": true,
        "token": session.token,
        "walletAddress": session.wallet_address,
        "expiresAt": session.expires_at,
    })))
}

/// `Authorization: Bearer <token>`.
struct BearerToken(String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for BearerToken {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request
            .headers()
            .get_one("Authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
        {
            Some(token) if !token.is_empty() => Outcome::Success(Self(token.to_string())),
            _ => Outcome::Error((
                Status::Unauthorized,
                ApiError::new(Status::Unauthorized, AuthError::InvalidSession),
            )),
        }
    }
}

#[get("/auth/session")]
async fn auth_session(token: Result<BearerToken, ApiError>, pool: &State<SqlitePool>) -> ApiResult {
    let BearerToken(token) = token?;
    let wallet = auth::session_wallet(pool.inner(), &token).await?;

    Ok(Json(json!({ "success": true, "walletAddress": wallet })))
}

#[post("/listings/create", format = "json", data = "<listing>")]
async fn create_listing(listing: Json<NewListing>, pool: &State<SqlitePool>) -> ApiResult {
    let listing = marketplace::create_listing(pool.inner(), listing.into_inner()).await?;

    Ok(Json(json!({ "success": true, "listing": listing })))
}

#[get("/marketplace/listings?<query..>")]
async fn seller_listings(query: WalletQuery<'_>, pool: &State<SqlitePool>) -> ApiResult {
    let wallet = query.required()?;
    let listings = marketplace::listings_for_seller(pool.inner(), wallet).await?;

    Ok(Json(json!({ "success": true, "listings": listings })))
}

#[get("/marketplace/sale")]
async fn listings_for_sale(pool: &State<SqlitePool>) -> ApiResult {
    let listings = marketplace::active_listings(pool.inner()).await?;

    Ok(Json(json!({ "success": true, "listings": listings })))
}

#[get("/marketplace/item/<id>")]
async fn listing_item(id: i64, pool: &State<SqlitePool>) -> ApiResult {
    let listing = marketplace::get_listing(pool.inner(), id).await?;

    Ok(Json(json!({ "success": true, "listing": listing })))
}

#[post("/marketplace/buy", format = "json", data = "<purchase>")]
async fn buy(purchase: Json<Purchase>, pool: &State<SqlitePool>) -> ApiResult {
    let transaction = marketplace::record_purchase(pool.inner(), &purchase).await?;

    Ok(Json(json!({ "success": true, "transaction": transaction })))
}

#[get("/marketplace/buying?<query..>")]
async fn buying(query: WalletQuery<'_>, pool: &State<SqlitePool>) -> ApiResult {
    let wallet = query.required()?;
    let orders = marketplace::buying_orders(pool.inner(), wallet).await?;

    Ok(Json(json!({ "success": true, "orders": orders })))
}

#[get("/marketplace/selling?<query..>")]
async fn selling(query: WalletQuery<'_>, pool: &State<SqlitePool>) -> ApiResult {
    let wallet = query.required()?;
    let orders = marketplace::selling_orders(pool.inner(), wallet).await?;

    Ok(Json(json!({ "success": true, "orders": orders })))
}

#[post("/cctp/completeTransfer", format = "json", data = "<request>")]
async fn complete_transfer(
    request: Json<CompleteTransferRequest>,
    relayer: &State<RelayerState>,
) -> ApiResult {
    let transfer = TransferFinalization::try_from(request.into_inner())?;

    let Some(relayer) = relayer.0.as_ref() else {
        warn!("completeTransfer requested but no relayer key is configured");
        return Err(ApiError::new(
            Status::InternalServerError,
            RelayerError::RelayerKeyMissing,
        ));
    };

    let receipt = relayer.complete_transfer(transfer).await?;

    Ok(Json(json!({
        "success": true,
        "receiveHash": receipt.receive_hash,
        "receiveStatus": receipt.receive_status,
        "execHash": receipt.exec_hash,
        "execStatus": receipt.exec_status,
    })))
}

#[get("/settlements/<id>")]
async fn settlement_status(id: &str, pool: &State<SqlitePool>) -> ApiResult {
    let settlement = settlement::load(pool.inner(), id).await?;

    Ok(Json(json!({ "success": true, "settlement": settlement })))
}

pub(crate) fn routes() -> Vec<Route> {
    routes![health]
}

pub(crate) fn api_routes() -> Vec<Route> {
    routes![
        auth_nonce,
        auth_verify,
        auth_session,
        create_listing,
        seller_listings,
        listings_for_sale,
        listing_item,
        buy,
        buying,
        selling,
        complete_transfer,
        settlement_status,
    ]
}

/// Mounts every route on `rocket` with the state they need.
pub(crate) fn mount(
    rocket: Rocket<Build>,
    pool: SqlitePool,
    relayer: Option<Arc<Relayer>>,
) -> Rocket<Build> {
    rocket
        .mount("/", routes())
        .mount("/api", api_routes())
        .manage(pool)
        .manage(RelayerState(relayer))
}
