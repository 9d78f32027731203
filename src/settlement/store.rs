//! Persistence for settlements.

use std::str::FromStr;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, SqlitePool};

use super::{Settlement, SettlementError, SettlementState};
use crate::chain::Chain;

#[derive(FromRow)]
struct SettlementRow {
    id: String,
    listing_id: i64,
    buyer: String,
    seller: String,
    price: String,
    amount: String,
    source_chain: i64,
    destination_chain: i64,
    state: SettlementState,
    transfer_tx: Option<String>,
    burn_tx: Option<String>,
    message: Option<String>,
    attestation: Option<String>,
    hook_data: Option<String>,
    receive_tx: Option<String>,
    execute_tx: Option<String>,
    transaction_id: Option<i64>,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn corrupt(id: &str, column: &'static str, value: impl std::fmt::Display) -> SettlementError {
    SettlementError::Corrupt {
        id: id.to_string(),
        reason: format!("invalid {column}: {value}"),
    }
}

fn parse<T: FromStr>(id: &str, column: &'static str, value: &str) -> Result<T, SettlementError> {
    value.parse().map_err(|_| corrupt(id, column, value))
}

fn parse_opt<T: FromStr>(
    id: &str,
    column: &'static str,
    value: Option<&str>,
) -> Result<Option<T>, SettlementError> {
    value.map(|v| parse(id, column, v)).transpose()
}

fn chain(id: &str, column: &'static str, chain_id: i64) -> Result<Chain, SettlementError> {
    u64::try_from(chain_id)
        .ok()
        .and_then(Chain::from_chain_id)
        .ok_or_else(|| corrupt(id, column, chain_id))
}

impl TryFrom<SettlementRow> for Settlement {
    type Error = SettlementError;

    fn try_from(row: SettlementRow) -> Result<Self, Self::Error> {
        let id = row.id.as_str();

        Ok(Self {
            listing_id: row.listing_id,
            buyer: parse::<Address>(id, "buyer", &row.buyer)?,
            seller: parse::<Address>(id, "seller", &row.seller)?,
            price: parse::<Decimal>(id, "price", &row.price)?,
            amount: parse::<U256>(id, "amount", &row.amount)?,
            source_chain: chain(id, "source_chain", row.source_chain)?,
            destination_chain: chain(id, "destination_chain", row.destination_chain)?,
            state: row.state,
            transfer_tx: parse_opt::<TxHash>(id, "transfer_tx", row.transfer_tx.as_deref())?,
            burn_tx: parse_opt::<TxHash>(id, "burn_tx", row.burn_tx.as_deref())?,
            message: parse_opt::<Bytes>(id, "message", row.message.as_deref())?,
            attestation: parse_opt::<Bytes>(id, "attestation", row.attestation.as_deref())?,
            hook_data: parse_opt::<Bytes>(id, "hook_data", row.hook_data.as_deref())?,
            receive_tx: parse_opt::<TxHash>(id, "receive_tx", row.receive_tx.as_deref())?,
            execute_tx: parse_opt::<TxHash>(id, "execute_tx", row.execute_tx.as_deref())?,
            transaction_id: row.transaction_id,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            id: row.id,
        })
    }
}

fn chain_id(chain: Chain) -> i64 {
    i64::try_from(chain.chain_id()).unwrap_or(i64::MAX)
}

const SELECT: &str = "SELECT * FROM settlements";

/// Inserts a new settlement. A second open settlement for the same listing
/// violates `idx_settlements_open_listing` and is reported as
/// [`SettlementError::InProgress`].
pub(super) async fn insert(pool: &SqlitePool, settlement: &Settlement) -> Result<(), SettlementError> {
    let inserted = sqlx::query(
        "INSERT INTO settlements
            (id, listing_id, buyer, seller, price, amount, source_chain, destination_chain, state,
             created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&settlement.id)
    .bind(settlement.listing_id)
    .bind(settlement.buyer.to_string())
    .bind(settlement.seller.to_string())
    .bind(settlement.price.to_string())
    .bind(settlement.amount.to_string())
    .bind(chain_id(settlement.source_chain))
    .bind(chain_id(settlement.destination_chain))
    .bind(settlement.state)
    .bind(settlement.created_at)
    .bind(settlement.updated_at)
    .execute(pool)
    .await;

    match inserted {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            let id = open_for_listing(pool, settlement.listing_id)
                .await?
                .unwrap_or_default();

            Err(SettlementError::InProgress {
                listing_id: settlement.listing_id,
                id,
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Writes every field a step can change, provided the stored row is still
/// in `from`.
pub(super) async fn save(
    pool: &SqlitePool,
    settlement: &Settlement,
    from: SettlementState,
) -> Result<(), SettlementError> {
    let updated = sqlx::query(
        "UPDATE settlements SET
            state = ?, transfer_tx = ?, burn_tx = ?, message = ?, attestation = ?, hook_data = ?,
            receive_tx = ?, execute_tx = ?, transaction_id = ?, last_error = ?, updated_at = ?
         WHERE id = ? AND state = ?",
    )
    .bind(settlement.state)
    .bind(settlement.transfer_tx.map(|tx| tx.to_string()))
    .bind(settlement.burn_tx.map(|tx| tx.to_string()))
    .bind(settlement.message.as_ref().map(ToString::to_string))
    .bind(settlement.attestation.as_ref().map(ToString::to_string))
    .bind(settlement.hook_data.as_ref().map(ToString::to_string))
    .bind(settlement.receive_tx.map(|tx| tx.to_string()))
    .bind(settlement.execute_tx.map(|tx| tx.to_string()))
    .bind(settlement.transaction_id)
    .bind(&settlement.last_error)
    .bind(settlement.updated_at)
    .bind(&settlement.id)
    .bind(from)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(SettlementError::Conflict {
            id: settlement.id.clone(),
            expected: from,
        });
    }

    Ok(())
}

/// Takes or renews `holder`'s lease on `id` until `until`. Returns false
/// while another holder's lease is live.
pub(super) async fn claim(
    pool: &SqlitePool,
    id: &str,
    holder: &str,
    until: DateTime<Utc>,
) -> Result<bool, SettlementError> {
    let claimed = sqlx::query(
        "UPDATE settlements SET claimed_by = ?, claimed_until = ?
         WHERE id = ?
           AND (claimed_by IS NULL OR claimed_by = ? OR claimed_until < ?)",
    )
    .bind(holder)
    .bind(until.timestamp_millis())
    .bind(id)
    .bind(holder)
    .bind(Utc::now().timestamp_millis())
    .execute(pool)
    .await?;

    Ok(claimed.rows_affected() == 1)
}

pub(super) async fn release(pool: &SqlitePool, id: &str, holder: &str) -> Result<(), SettlementError> {
    sqlx::query(
        "UPDATE settlements SET claimed_by = NULL, claimed_until = NULL
         WHERE id = ? AND claimed_by = ?",
    )
    .bind(id)
    .bind(holder)
    .execute(pool)
    .await?;

    Ok(())
}

pub(super) async fn record_error(
    pool: &SqlitePool,
    id: &str,
    error: &str,
) -> Result<(), SettlementError> {
    sqlx::query(
        "UPDATE settlements SET attempts = attempts + 1, last_error = ?, updated_at = ? WHERE id = ?",
    )
    .bind(error)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn load(pool: &SqlitePool, id: &str) -> Result<Settlement, SettlementError> {
    sqlx::query_as::<_, SettlementRow>(&format!("{SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| SettlementError::NotFound(id.to_string()))?
        .try_into()
}

/// Most recently updated settlements first.
pub(crate) async fn list(pool: &SqlitePool, limit: u32) -> Result<Vec<Settlement>, SettlementError> {
    sqlx::query_as::<_, SettlementRow>(&format!("{SELECT} ORDER BY updated_at DESC LIMIT ?"))
        .bind(limit)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Settlement::try_from)
        .collect()
}

/// Unclaimed settlements past the buyer-signed step that have not completed.
pub(super) async fn resumable(pool: &SqlitePool) -> Result<Vec<Settlement>, SettlementError> {
    sqlx::query_as::<_, SettlementRow>(&format!(
        "{SELECT} WHERE state IN ('submitted', 'transferred', 'burned', 'attested', 'finalized')
           AND (claimed_until IS NULL OR claimed_until < ?)
         ORDER BY created_at ASC"
    ))
    .bind(Utc::now().timestamp_millis())
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(Settlement::try_from)
    .collect()
}

/// Id of a settlement for `listing_id` that is neither failed nor complete.
pub(super) async fn open_for_listing(
    pool: &SqlitePool,
    listing_id: i64,
) -> Result<Option<String>, SettlementError> {
    Ok(sqlx::query_scalar(
        "SELECT id FROM settlements
         WHERE listing_id = ? AND state NOT IN ('completed', 'failed')
         LIMIT 1",
    )
    .bind(listing_id)
    .fetch_optional(pool)
    .await?)
}
