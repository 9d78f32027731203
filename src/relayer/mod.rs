//! Destination-side finalization of cross-chain purchases.
//!
//! After Circle attests a burn, somebody has to submit the message on the
//! destination chain and trigger the hook executor that pays the seller.
//! The [`Relayer`] does this with its own account:
//!
//! 1. `MessageTransmitterV2.receiveMessage()` (skipped if the nonce is
//!    already used on chain)
//! 2. wait until the hook executor holds the minted USDC, topping it up from
//!    the relayer's balance if enabled
//! 3. `HookExecutor.executeHook(hookData)`
//!
//! The request's `hookData` must be the one carried in the message body, the
//! message must mint to the hook executor and the hook may not pay out more
//! than was burned. Top-ups are only sent after this relayer's own
//! `receiveMessage()` succeeded, since that call is what checks the
//! attestation.
//!
//! Finalizations are recorded per `(chain, nonce)` so replays return the
//! original receipt instead of submitting again. [`HttpFinalizer`] forwards
//! the same request to a remote server.

mod client;
mod destination;
#[cfg(test)]
pub(crate) mod mock;

pub use client::HttpFinalizer;
pub(crate) use destination::{Destination, EvmDestination};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, FixedBytes, TxHash, U256};
use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cctp::{
    BurnMessage, CctpError, HookData, HookDataError, decode_burn_message,
    extract_nonce_from_message,
};
use crate::chain::Chain;
use crate::evm::EvmError;

#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
    #[error("{0}")]
    InvalidRequest(&'static str),
    #[error("Unsupported destination chainId {0}")]
    UnsupportedChain(u64),
    #[error("MessageTransmitter not configured for destination chain")]
    MessageTransmitterMissing,
    #[error("Hook executor not configured for destination chain")]
    HookExecutorMissing,
    #[error("relayer private key not configured")]
    RelayerKeyMissing,
    #[error("invalid hook data: {0}")]
    HookData(#[from] HookDataError),
    #[error(transparent)]
    Cctp(#[from] CctpError),
    #[error(transparent)]
    Evm(#[from] EvmError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote relayer returned HTTP {status}: {message}")]
    Remote { status: u16, message: String },
}

impl RelayerError {
    /// Errors caused by the request rather than by the relayer.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_)
                | Self::UnsupportedChain(_)
                | Self::MessageTransmitterMissing
                | Self::HookExecutorMissing
                | Self::HookData(_)
                | Self::Cctp(
                    CctpError::MessageTooShort { .. } | CctpError::BurnMessageTooShort { .. }
                )
        )
    }
}

/// Wire body of `POST /api/cctp/completeTransfer`.
///
/// Fields are loosely typed so that malformed requests produce a specific
/// validation message instead of a generic deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTransferRequest {
    pub destination_chain_id: Option<serde_json::Value>,
    pub message: Option<String>,
    pub attestation: Option<String>,
    pub hook_data: Option<String>,
}

/// Validated finalization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFinalization {
    pub destination: Chain,
    pub message: Bytes,
    pub attestation: Bytes,
    pub hook_data: Bytes,
}

fn hex_field(value: Option<&str>, error: &'static str) -> Result<Bytes, RelayerError> {
    let value = value
        .filter(|v| v.starts_with("0x"))
        .ok_or(RelayerError::InvalidRequest(error))?;

    alloy::hex::decode(value)
        .map(Bytes::from)
        .map_err(|_| RelayerError::InvalidRequest(error))
}

impl TryFrom<CompleteTransferRequest> for TransferFinalization {
    type Error = RelayerError;

    fn try_from(request: CompleteTransferRequest) -> Result<Self, Self::Error> {
        let chain_id = request
            .destination_chain_id
            .as_ref()
            .and_then(serde_json::Value::as_u64)
            .filter(|id| *id != 0)
            .ok_or(RelayerError::InvalidRequest(
                "destinationChainId (number) required",
            ))?;

        let message = hex_field(request.message.as_deref(), "message (0x hex) required")?;
        let attestation = hex_field(
            request.attestation.as_deref(),
            "attestation (0x hex) required",
        )?;
        let hook_data = hex_field(request.hook_data.as_deref(), "hookData (0x hex) required")?;

        let destination =
            Chain::from_chain_id(chain_id).ok_or(RelayerError::UnsupportedChain(chain_id))?;

        Ok(Self {
            destination,
            message,
            attestation,
            hook_data,
        })
    }
}

impl From<&TransferFinalization> for CompleteTransferRequest {
    fn from(transfer: &TransferFinalization) -> Self {
        Self {
            destination_chain_id: Some(transfer.destination.chain_id().into()),
            message: Some(transfer.message.to_string()),
            attestation: Some(transfer.attestation.to_string()),
            hook_data: Some(transfer.hook_data.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    /// The message had already been received on chain.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationReceipt {
    pub receive_hash: Option<TxHash>,
    pub receive_status: TxStatus,
    pub exec_hash: TxHash,
    pub exec_status: TxStatus,
}

/// Completes an attested transfer on its destination chain.
#[async_trait]
pub trait Finalizer: Send + Sync {
    async fn complete_transfer(
        &self,
        transfer: TransferFinalization,
    ) -> Result<FinalizationReceipt, RelayerError>;
}

/// How long to wait for minted USDC to reach the hook executor.
#[derive(Debug, Clone, Copy)]
pub struct BalanceWait {
    pub interval: Duration,
    pub max_checks: usize,
}

impl Default for BalanceWait {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_checks: 15,
        }
    }
}

pub struct Relayer {
    pool: SqlitePool,
    destinations: HashMap<Chain, Arc<dyn Destination>>,
    /// Serializes every transaction this relayer account sends.
    send_lock: Mutex<()>,
    balance_wait: BalanceWait,
    top_up: bool,
}

impl Relayer {
    pub(crate) fn new(
        pool: SqlitePool,
        destinations: Vec<Arc<dyn Destination>>,
        balance_wait: BalanceWait,
        top_up: bool,
    ) -> Self {
        Self {
            pool,
            destinations: destinations
                .into_iter()
                .map(|destination| (destination.chain(), destination))
                .collect(),
            send_lock: Mutex::new(()),
            balance_wait,
            top_up,
        }
    }

    /// Waits for the hook executor to hold `required`, returning the last
    /// balance observed.
    async fn wait_for_hook_balance(
        &self,
        destination: &dyn Destination,
        required: U256,
    ) -> Result<U256, RelayerError> {
        let backoff = ConstantBuilder::default()
            .with_delay(self.balance_wait.interval)
            .with_max_times(self.balance_wait.max_checks.saturating_sub(1));

        let check = || async {
            let balance = destination
                .hook_executor_balance()
                .await
                .map_err(BalanceCheck::Failed)?;

            if balance >= required {
                Ok(balance)
            } else {
                Err(BalanceCheck::Short(balance))
            }
        };

        match check
            .retry(backoff)
            .when(|err| matches!(err, BalanceCheck::Short(_)))
            .notify(|err, dur| {
                if let BalanceCheck::Short(balance) = err {
                    debug!(%balance, %required, ?dur, "Hook executor balance short, waiting");
                }
            })
            .await
        {
            Ok(balance) | Err(BalanceCheck::Short(balance)) => Ok(balance),
            Err(BalanceCheck::Failed(err)) => Err(err),
        }
    }

    async fn finalize(
        &self,
        destination: &dyn Destination,
        transfer: TransferFinalization,
        nonce: FixedBytes<32>,
        hook: HookData,
    ) -> Result<FinalizationReceipt, RelayerError> {
        let chain = destination.chain();

        let receive_hash = if destination.nonce_used(nonce).await? {
            info!(%chain, %nonce, "Message already received on chain, skipping receiveMessage");
            None
        } else {
            let tx = destination
                .receive_message(transfer.message, transfer.attestation)
                .await?;
            info!(%chain, %nonce, %tx, "receiveMessage confirmed");
            Some(tx)
        };

        let balance = self.wait_for_hook_balance(destination, hook.amount).await?;

        if balance < hook.amount {
            let shortfall = hook.amount - balance;

            if !self.top_up {
                warn!(%balance, %shortfall, "Hook executor underfunded and top-up disabled");
            } else if receive_hash.is_none() {
                warn!(
                    %balance,
                    %shortfall,
                    "Hook executor underfunded for a message received elsewhere, not topping up"
                );
            } else {
                warn!(%balance, %shortfall, "Hook executor underfunded, topping up");
                destination.top_up_hook_executor(shortfall).await?;
            }
        }

        let exec_hash = destination.execute_hook(transfer.hook_data).await?;

        info!(%chain, %nonce, %exec_hash, seller = %hook.seller, "executeHook confirmed");

        store::record(&self.pool, chain, nonce, receive_hash, exec_hash).await?;

        Ok(FinalizationReceipt {
            receive_hash,
            receive_status: receive_hash.map_or(TxStatus::Skipped, |_| TxStatus::Success),
            exec_hash,
            exec_status: TxStatus::Success,
        })
    }
}

enum BalanceCheck {
    Short(U256),
    Failed(RelayerError),
}

#[async_trait]
impl Finalizer for Relayer {
    #[tracing::instrument(skip_all, fields(destination = %transfer.destination), level = tracing::Level::INFO)]
    async fn complete_transfer(
        &self,
        transfer: TransferFinalization,
    ) -> Result<FinalizationReceipt, RelayerError> {
        let destination = self
            .destinations
            .get(&transfer.destination)
            .ok_or(RelayerError::MessageTransmitterMissing)?;

        if destination.hook_executor().is_none() {
            return Err(RelayerError::HookExecutorMissing);
        }

        let hook = HookData::decode(&transfer.hook_data)?;
        let nonce = extract_nonce_from_message(&transfer.message)?;
        let burn = decode_burn_message(&transfer.message)?;
        check_burn(&burn, &transfer.hook_data, &hook, destination.hook_executor())?;

        let _guard = self.send_lock.lock().await;

        if let Some(receipt) = store::find(&self.pool, transfer.destination, nonce).await? {
            info!(%nonce, "Transfer already finalized, returning recorded receipt");
            return Ok(receipt);
        }

        self.finalize(&**destination, transfer, nonce, hook).await
    }
}

/// Binds the unauthenticated request fields to the attested burn.
fn check_burn(
    burn: &BurnMessage,
    hook_data: &Bytes,
    hook: &HookData,
    hook_executor: Option<Address>,
) -> Result<(), RelayerError> {
    if burn.hook_data != *hook_data {
        return Err(RelayerError::InvalidRequest(
            "hookData does not match the attested message",
        ));
    }

    if Some(burn.mint_recipient) != hook_executor {
        return Err(RelayerError::InvalidRequest(
            "message does not mint to the hook executor",
        ));
    }

    if hook.amount > burn.amount {
        return Err(RelayerError::InvalidRequest(
            "hookData amount exceeds the burned amount",
        ));
    }

    Ok(())
}

mod store {
    use alloy::primitives::{FixedBytes, TxHash};
    use sqlx::SqlitePool;

    use super::{FinalizationReceipt, RelayerError, TxStatus};
    use crate::chain::Chain;

    pub(super) async fn find(
        pool: &SqlitePool,
        chain: Chain,
        nonce: FixedBytes<32>,
    ) -> Result<Option<FinalizationReceipt>, RelayerError> {
        let row: Option<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT receive_tx, execute_tx FROM relayed_messages WHERE chain_id = ? AND nonce = ?",
        )
        .bind(chain_id(chain))
        .bind(nonce.to_string())
        .fetch_optional(pool)
        .await?;

        let Some((receive_tx, Some(execute_tx))) = row else {
            return Ok(None);
        };

        let receive_hash = receive_tx.as_deref().map(parse_hash).transpose()?;

        Ok(Some(FinalizationReceipt {
            receive_hash,
            receive_status: receive_hash.map_or(TxStatus::Skipped, |_| TxStatus::Success),
            exec_hash: parse_hash(&execute_tx)?,
            exec_status: TxStatus::Success,
        }))
    }

    pub(super) async fn record(
        pool: &SqlitePool,
        chain: Chain,
        nonce: FixedBytes<32>,
        receive_tx: Option<TxHash>,
        execute_tx: TxHash,
    ) -> Result<(), RelayerError> {
        sqlx::query(
            "INSERT INTO relayed_messages (chain_id, nonce, receive_tx, execute_tx)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(chain_id, nonce) DO UPDATE SET
                receive_tx = COALESCE(relayed_messages.receive_tx, excluded.receive_tx),
                execute_tx = excluded.execute_tx",
        )
        .bind(chain_id(chain))
        .bind(nonce.to_string())
        .bind(receive_tx.map(|tx| tx.to_string()))
        .bind(execute_tx.to_string())
        .execute(pool)
        .await?;

        Ok(())
    }

    fn chain_id(chain: Chain) -> i64 {
        i64::try_from(chain.chain_id()).unwrap_or(i64::MAX)
    }

    fn parse_hash(value: &str) -> Result<TxHash, RelayerError> {
        value.parse().map_err(|_| {
            RelayerError::Database(sqlx::Error::Decode(
                format!("invalid transaction hash in relayed_messages: {value}").into(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, b256};
    use serde_json::json;

    use super::mock::MockDestination;
    use super::*;
    use crate::test_utils::{burn_message, setup_test_db};

    const SELLER: Address = address!("0x00000000000000000000000000000000000000aa");

    fn transfer(nonce: u8, amount: u64) -> TransferFinalization {
        let hook_data = HookData::new(SELLER, U256::from(amount)).encode();

        TransferFinalization {
            destination: Chain::BaseSepolia,
            message: burn_message(
                [nonce; 32],
                MockDestination::HOOK_EXECUTOR,
                U256::from(amount),
                &hook_data,
            ),
            attestation: Bytes::from(vec![0xAB; 65]),
            hook_data,
        }
    }

    fn fast_wait() -> BalanceWait {
        BalanceWait {
            interval: Duration::from_millis(1),
            max_checks: 3,
        }
    }

    async fn relayer_with(destination: Arc<MockDestination>, top_up: bool) -> Relayer {
        let destination: Arc<dyn Destination> = destination;
        Relayer::new(setup_test_db().await, vec![destination], fast_wait(), top_up)
    }

    #[test]
    fn request_validation_reports_first_bad_field() {
        let cases = [
            (json!({}), "destinationChainId (number) required"),
            (
                json!({"destinationChainId": "84532"}),
                "destinationChainId (number) required",
            ),
            (
                json!({"destinationChainId": 84532, "message": "abcd"}),
                "message (0x hex) required",
            ),
            (
                json!({"destinationChainId": 84532, "message": "0x01"}),
                "attestation (0x hex) required",
            ),
            (
                json!({"destinationChainId": 84532, "message": "0x01", "attestation": "0x02", "hookData": "0xzz"}),
                "hookData (0x hex) required",
            ),
        ];

        for (body, expected) in cases {
            let request: CompleteTransferRequest = serde_json::from_value(body).unwrap();
            let err = TransferFinalization::try_from(request).unwrap_err();
            assert_eq!(err.to_string(), expected);
            assert!(err.is_client_error());
        }
    }

    #[test]
    fn unsupported_chain_is_rejected() {
        let request: CompleteTransferRequest = serde_json::from_value(json!({
            "destinationChainId": 1,
            "message": "0x01",
            "attestation": "0x02",
            "hookData": "0x03"
        }))
        .unwrap();

        let err = TransferFinalization::try_from(request).unwrap_err();
        assert!(matches!(err, RelayerError::UnsupportedChain(1)), "got: {err:?}");
    }

    #[test]
    fn request_wire_format_survives_conversion() {
        let original = transfer(7, 5);
        let request = CompleteTransferRequest::from(&original);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["destinationChainId"], json!(84532));
        assert!(json["hookData"].as_str().unwrap().starts_with("0x"));

        let parsed: CompleteTransferRequest = serde_json::from_value(json).unwrap();
        assert_eq!(TransferFinalization::try_from(parsed).unwrap(), original);
    }

    #[tokio::test]
    async fn receives_then_executes_hook() {
        let destination = Arc::new(MockDestination::funded(U256::from(5_000_000u64)));
        let relayer = relayer_with(destination.clone(), false).await;

        let receipt = relayer
            .complete_transfer(transfer(1, 5_000_000))
            .await
            .unwrap();

        assert_eq!(receipt.receive_status, TxStatus::Success);
        assert_eq!(receipt.receive_hash, Some(MockDestination::RECEIVE_TX));
        assert_eq!(receipt.exec_hash, MockDestination::EXECUTE_TX);
        assert_eq!(destination.receive_calls(), 1);
        assert_eq!(destination.execute_calls(), 1);
        assert_eq!(destination.top_ups(), Vec::<U256>::new());
    }

    #[tokio::test]
    async fn used_nonce_skips_receive_message() {
        let destination = Arc::new(
            MockDestination::funded(U256::from(10u64)).with_nonce_used(),
        );
        let relayer = relayer_with(destination.clone(), false).await;

        let receipt = relayer.complete_transfer(transfer(2, 10)).await.unwrap();

        assert_eq!(receipt.receive_status, TxStatus::Skipped);
        assert_eq!(receipt.receive_hash, None);
        assert_eq!(destination.receive_calls(), 0);
        assert_eq!(destination.execute_calls(), 1);
    }

    #[tokio::test]
    async fn replayed_transfer_returns_recorded_receipt() {
        let destination = Arc::new(MockDestination::funded(U256::from(10u64)));
        let relayer = relayer_with(destination.clone(), false).await;

        let first = relayer.complete_transfer(transfer(3, 10)).await.unwrap();
        let second = relayer.complete_transfer(transfer(3, 10)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(destination.receive_calls(), 1);
        assert_eq!(destination.execute_calls(), 1);
    }

    #[tokio::test]
    async fn underfunded_hook_executor_is_topped_up_with_shortfall() {
        let destination = Arc::new(MockDestination::funded(U256::from(4u64)));
        let relayer = relayer_with(destination.clone(), true).await;

        relayer.complete_transfer(transfer(4, 10)).await.unwrap();

        assert_eq!(destination.top_ups(), vec![U256::from(6u64)]);
        assert_eq!(destination.balance_checks(), 3);
        assert_eq!(destination.execute_calls(), 1);
    }

    #[tokio::test]
    async fn message_received_elsewhere_is_never_topped_up() {
        let destination = Arc::new(MockDestination::funded(U256::ZERO).with_nonce_used());
        let relayer = relayer_with(destination.clone(), true).await;

        let receipt = relayer.complete_transfer(transfer(9, 10)).await.unwrap();

        assert_eq!(receipt.receive_status, TxStatus::Skipped);
        assert!(destination.top_ups().is_empty());
        assert_eq!(destination.execute_calls(), 1);
    }

    #[tokio::test]
    async fn hook_data_must_match_the_attested_message() {
        let destination = Arc::new(MockDestination::funded(U256::ZERO).with_nonce_used());
        let relayer = relayer_with(destination.clone(), true).await;
        let attacker = address!("0x000000000000000000000000000000000000bad0");

        let forged = TransferFinalization {
            hook_data: HookData::new(attacker, U256::from(1_000_000_000u64)).encode(),
            ..transfer(10, 10)
        };
        let err = relayer.complete_transfer(forged).await.unwrap_err();

        assert_eq!(err.to_string(), "hookData does not match the attested message");
        assert!(err.is_client_error());
        assert!(destination.top_ups().is_empty());
        assert_eq!(destination.execute_calls(), 0);
    }

    #[tokio::test]
    async fn hook_amount_above_burned_amount_is_rejected() {
        let destination = Arc::new(MockDestination::funded(U256::ZERO));
        let relayer = relayer_with(destination.clone(), true).await;

        let hook_data = HookData::new(SELLER, U256::from(1_000u64)).encode();
        let inflated = TransferFinalization {
            message: burn_message(
                [11; 32],
                MockDestination::HOOK_EXECUTOR,
                U256::from(10u64),
                &hook_data,
            ),
            hook_data,
            ..transfer(11, 10)
        };
        let err = relayer.complete_transfer(inflated).await.unwrap_err();

        assert_eq!(err.to_string(), "hookData amount exceeds the burned amount");
        assert_eq!(destination.receive_calls(), 0);
    }

    #[tokio::test]
    async fn message_minting_elsewhere_is_rejected() {
        let destination = Arc::new(MockDestination::funded(U256::from(10u64)));
        let relayer = relayer_with(destination.clone(), false).await;

        let original = transfer(12, 10);
        let redirected = TransferFinalization {
            message: burn_message(
                [12; 32],
                SELLER,
                U256::from(10u64),
                &original.hook_data,
            ),
            ..original
        };
        let err = relayer.complete_transfer(redirected).await.unwrap_err();

        assert_eq!(err.to_string(), "message does not mint to the hook executor");
        assert_eq!(destination.execute_calls(), 0);
    }

    #[tokio::test]
    async fn header_only_message_is_client_error() {
        let destination = Arc::new(MockDestination::funded(U256::from(10u64)));
        let relayer = relayer_with(destination, false).await;

        let short = TransferFinalization {
            message: Bytes::from(vec![0u8; 44]),
            ..transfer(13, 10)
        };
        let err = relayer.complete_transfer(short).await.unwrap_err();

        assert!(err.is_client_error(), "got: {err:?}");
    }

    #[tokio::test]
    async fn top_up_disabled_still_executes_hook() {
        let destination = Arc::new(MockDestination::funded(U256::ZERO));
        let relayer = relayer_with(destination.clone(), false).await;

        relayer.complete_transfer(transfer(5, 10)).await.unwrap();

        assert!(destination.top_ups().is_empty());
        assert_eq!(destination.execute_calls(), 1);
    }

    #[tokio::test]
    async fn missing_hook_executor_is_client_error() {
        let destination = Arc::new(MockDestination::without_hook_executor());
        let relayer = relayer_with(destination, false).await;

        let err = relayer.complete_transfer(transfer(6, 1)).await.unwrap_err();

        assert!(matches!(err, RelayerError::HookExecutorMissing), "got: {err:?}");
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn unconfigured_destination_reports_missing_transmitter() {
        let relayer = Relayer::new(setup_test_db().await, vec![], fast_wait(), false);

        let err = relayer.complete_transfer(transfer(7, 1)).await.unwrap_err();

        assert!(matches!(err, RelayerError::MessageTransmitterMissing), "got: {err:?}");
    }

    #[tokio::test]
    async fn execute_failure_is_not_recorded() {
        let destination = Arc::new(MockDestination::funded(U256::from(10u64)).failing_execute());
        let relayer = relayer_with(destination.clone(), false).await;

        relayer.complete_transfer(transfer(8, 10)).await.unwrap_err();

        let recorded = store::find(&relayer.pool, Chain::BaseSepolia, FixedBytes::from([8u8; 32]))
            .await
            .unwrap();
        assert!(recorded.is_none());
    }

    #[test]
    fn receipt_serializes_like_the_http_response() {
        let receipt = FinalizationReceipt {
            receive_hash: None,
            receive_status: TxStatus::Skipped,
            exec_hash: b256!("0x1111111111111111111111111111111111111111111111111111111111111111"),
            exec_status: TxStatus::Success,
        };

        let json = serde_json::to_value(&receipt).unwrap();

        assert_eq!(json["receiveStatus"], "skipped");
        assert_eq!(json["execStatus"], "success");
        assert!(json["receiveHash"].is_null());
    }
}
