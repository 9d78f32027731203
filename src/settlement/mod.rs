//! Durable orchestration of a marketplace purchase.
//!
//! A purchase moves the listing price in USDC from the buyer to the seller
//! and then records a paid transaction. When both parties are on the same
//! chain this is a single ERC-20 transfer. Otherwise the buyer burns USDC
//! through CCTP towards the destination chain's hook executor, Circle attests
//! the burn and a relayer finalizes it on the destination:
//!
//! ```text
//!                    ┌──confirm──> transferred ───────────────────────────┐
//! pending ──submit──> submitted                                          ├─> completed
//!                    └──confirm──> burned ──attest──> attested ──finalize──> finalized
//! ```
//!
//! Every transition is persisted before the next one starts. The payment
//! hash is stored as `submitted` before its receipt is awaited, so a crash or
//! RPC outage after broadcasting never leaves a paid settlement without its
//! hash. Only `pending` needs the buyer's key. The later steps are resumed by
//! [`SettlementWorker`] without it.
//!
//! A settlement is only advanced under a lease recorded on its row, and each
//! write is conditional on the state it was read in. Two drivers racing on
//! the same settlement therefore cannot both finalize or record it.

mod receipts;
mod store;
mod worker;

#[cfg(test)]
pub(crate) mod mock;

pub use receipts::{PaymentReceipts, SourceChains};
pub(crate) use store::{list, load};
pub use worker::SettlementWorker;

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cctp::{CctpError, CctpPayer, CircleClient, HookData};
use crate::evm::EvmError;
use crate::chain::{Chain, ChainContracts, source_label};
use crate::evm::Wallet;
use crate::marketplace::{self, ListingStatus, MarketplaceError, Purchase};
use crate::relayer::{Finalizer, RelayerError, TransferFinalization};
use crate::usdc::{Usdc, UsdcConversionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SettlementState {
    Pending,
    Submitted,
    Transferred,
    Burned,
    Attested,
    Finalized,
    Completed,
    Failed,
}

impl Display for SettlementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Transferred => "transferred",
            Self::Burned => "burned",
            Self::Attested => "attested",
            Self::Finalized => "finalized",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub id: String,
    pub listing_id: i64,
    pub buyer: Address,
    pub seller: Address,
    pub price: Decimal,
    /// Price in USDC base units.
    pub amount: U256,
    pub source_chain: Chain,
    pub destination_chain: Chain,
    pub state: SettlementState,
    pub transfer_tx: Option<TxHash>,
    pub burn_tx: Option<TxHash>,
    pub message: Option<Bytes>,
    pub attestation: Option<Bytes>,
    pub hook_data: Option<Bytes>,
    pub receive_tx: Option<TxHash>,
    pub execute_tx: Option<TxHash>,
    pub transaction_id: Option<i64>,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Settlement {
    pub fn is_cross_chain(&self) -> bool {
        self.source_chain != self.destination_chain
    }

    fn require<T: Clone>(&self, field: &'static str, value: Option<&T>) -> Result<T, SettlementError> {
        value.cloned().ok_or_else(|| SettlementError::MissingField {
            id: self.id.clone(),
            field,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("listing {listing_id} is no longer for sale")]
    ListingUnavailable { listing_id: i64 },
    #[error("listing {listing_id} already has settlement {id} in progress")]
    InProgress { listing_id: i64, id: String },
    #[error("seller not found for listing {listing_id}")]
    SellerMissing { listing_id: i64 },
    #[error("seller wallet is not an EVM address: {0}")]
    InvalidSellerAddress(String),
    #[error("invalid price: {0}")]
    InvalidPrice(#[from] UsdcConversionError),
    #[error("USDC not configured on {0}")]
    UsdcNotConfigured(Chain),
    #[error("TokenMessenger not configured on {0}")]
    TokenMessengerMissing(Chain),
    #[error("Hook executor not configured on {0}")]
    HookExecutorMissing(Chain),
    #[error("settlement {id} is {state}; this step must be signed by the buyer")]
    PayerRequired { id: String, state: SettlementState },
    #[error("buyer wallet is on {actual}, settlement pays from {expected}")]
    PayerChainMismatch { expected: Chain, actual: Chain },
    #[error("settlement {id} failed: {reason}")]
    Failed { id: String, reason: String },
    #[error("settlement {id} is being advanced by another process")]
    Claimed { id: String },
    #[error("settlement {id} left {expected} while this step ran")]
    Conflict {
        id: String,
        expected: SettlementState,
    },
    #[error("settlement not found: {0}")]
    NotFound(String),
    #[error("settlement {id} is missing {field}")]
    MissingField { id: String, field: &'static str },
    #[error("settlement {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
    #[error(transparent)]
    Cctp(#[from] CctpError),
    #[error(transparent)]
    Relayer(#[from] RelayerError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Source-chain wallet operations signed by the buyer. Both payments return
/// once broadcast. Confirmation goes through [`PaymentReceipts`].
#[async_trait]
pub trait Payer: Send + Sync {
    fn chain(&self) -> Chain;

    fn address(&self) -> Address;

    async fn submit_transfer(&self, to: Address, amount: U256) -> Result<TxHash, CctpError>;

    /// Approves TokenMessenger as needed and submits a burn with hook data
    /// attached.
    async fn submit_burn(
        &self,
        amount: U256,
        destination: Chain,
        hook_executor: Address,
        max_fee: U256,
        hook_data: Bytes,
    ) -> Result<TxHash, CctpError>;
}

#[async_trait]
impl<W: Wallet> Payer for CctpPayer<W> {
    fn chain(&self) -> Chain {
        Self::chain(self)
    }

    fn address(&self) -> Address {
        Self::address(self)
    }

    async fn submit_transfer(&self, to: Address, amount: U256) -> Result<TxHash, CctpError> {
        Self::submit_transfer(self, to, amount).await
    }

    async fn submit_burn(
        &self,
        amount: U256,
        destination: Chain,
        hook_executor: Address,
        max_fee: U256,
        hook_data: Bytes,
    ) -> Result<TxHash, CctpError> {
        self.ensure_usdc_approval(amount).await?;

        self.submit_burn_with_hook(amount, destination, hook_executor, max_fee, hook_data)
            .await
    }
}

/// Slack on top of the longest attestation wait before a claim lapses.
const CLAIM_MARGIN: Duration = Duration::from_secs(600);

/// Drives settlements through their states.
pub struct Settler {
    pool: SqlitePool,
    circle: CircleClient,
    finalizer: Arc<dyn Finalizer>,
    receipts: Arc<dyn PaymentReceipts>,
    contracts: HashMap<Chain, ChainContracts>,
    destination: Chain,
    claim_for: Duration,
}

impl Settler {
    pub fn new(
        pool: SqlitePool,
        circle: CircleClient,
        finalizer: Arc<dyn Finalizer>,
        receipts: Arc<dyn PaymentReceipts>,
        contracts: HashMap<Chain, ChainContracts>,
        destination: Chain,
    ) -> Self {
        let claim_for = circle.max_poll_duration().saturating_add(CLAIM_MARGIN);

        Self {
            pool,
            circle,
            finalizer,
            receipts,
            contracts,
            destination,
            claim_for,
        }
    }

    pub(crate) const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn contracts(&self, chain: Chain) -> ChainContracts {
        self.contracts
            .get(&chain)
            .copied()
            .unwrap_or_else(|| chain.default_contracts())
    }

    /// Creates a `pending` settlement for buying `listing_id` with `payer`.
    #[tracing::instrument(skip(self, payer), fields(buyer = %payer.address(), source = %payer.chain()), level = tracing::Level::INFO)]
    pub async fn start(
        &self,
        listing_id: i64,
        payer: &dyn Payer,
    ) -> Result<Settlement, SettlementError> {
        let listing = marketplace::get_listing(&self.pool, listing_id).await?;

        if listing.status != ListingStatus::Active {
            return Err(SettlementError::ListingUnavailable { listing_id });
        }

        if let Some(id) = store::open_for_listing(&self.pool, listing_id).await? {
            return Err(SettlementError::InProgress { listing_id, id });
        }

        let seller_wallet = listing
            .seller_wallet_address
            .ok_or(SettlementError::SellerMissing { listing_id })?;
        let seller: Address = seller_wallet
            .parse()
            .map_err(|_| SettlementError::InvalidSellerAddress(seller_wallet.clone()))?;

        let source = payer.chain();
        let source_contracts = self.contracts(source);

        if source_contracts.usdc.is_zero() {
            return Err(SettlementError::UsdcNotConfigured(source));
        }

        if source != self.destination {
            if source_contracts.token_messenger.is_zero() {
                return Err(SettlementError::TokenMessengerMissing(source));
            }

            if self.contracts(self.destination).hook_executor.is_none() {
                return Err(SettlementError::HookExecutorMissing(self.destination));
            }
        }

        let amount = Usdc::new(listing.price).to_u256_6_decimals()?;
        let buyer = payer.address();

        // The purchase record at the end of the flow needs the buyer row.
        marketplace::get_or_create_user(&self.pool, &buyer.to_string()).await?;

        let now = Utc::now();
        let settlement = Settlement {
            id: Uuid::new_v4().to_string(),
            listing_id,
            buyer,
            seller,
            price: listing.price,
            amount,
            source_chain: source,
            destination_chain: self.destination,
            state: SettlementState::Pending,
            transfer_tx: None,
            burn_tx: None,
            message: None,
            attestation: None,
            hook_data: None,
            receive_tx: None,
            execute_tx: None,
            transaction_id: None,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        store::insert(&self.pool, &settlement).await?;

        info!(
            id = %settlement.id,
            %seller,
            %amount,
            destination = %self.destination,
            step = "processing",
            "Settlement created"
        );

        Ok(settlement)
    }

    /// Advances `id` until it completes. A failed step is recorded on the
    /// settlement and returned.
    ///
    /// The settlement is claimed for the duration of the call. While another
    /// driver holds a live claim this returns [`SettlementError::Claimed`]
    /// without touching the row.
    #[tracing::instrument(skip(self, payer), level = tracing::Level::INFO)]
    pub async fn drive(
        &self,
        id: &str,
        payer: Option<&dyn Payer>,
    ) -> Result<Settlement, SettlementError> {
        store::load(&self.pool, id).await?;

        let holder = Uuid::new_v4().to_string();
        if !store::claim(&self.pool, id, &holder, self.claim_until()).await? {
            info!("Settlement claimed by another driver, skipping");
            return Err(SettlementError::Claimed { id: id.to_string() });
        }

        let result = self.drive_claimed(id, payer, &holder).await;

        // Claim and conflict errors belong to whoever moved the row on.
        if let Err(err) = &result {
            let owned_elsewhere = matches!(
                err,
                SettlementError::Claimed { .. } | SettlementError::Conflict { .. }
            );

            if !owned_elsewhere {
                if let Err(record_err) = store::record_error(&self.pool, id, &err.to_string()).await {
                    warn!(%record_err, "Failed to record settlement error");
                }
            }
        }

        if let Err(release_err) = store::release(&self.pool, id, &holder).await {
            warn!(%release_err, "Failed to release settlement claim");
        }

        result
    }

    async fn drive_claimed(
        &self,
        id: &str,
        payer: Option<&dyn Payer>,
        holder: &str,
    ) -> Result<Settlement, SettlementError> {
        let mut settlement = store::load(&self.pool, id).await?;

        while settlement.state != SettlementState::Completed {
            if !store::claim(&self.pool, id, holder, self.claim_until()).await? {
                warn!("Settlement claim lapsed mid-drive");
                return Err(SettlementError::Claimed { id: id.to_string() });
            }

            settlement = self.advance(settlement, payer).await?;
        }

        Ok(settlement)
    }

    fn claim_until(&self) -> DateTime<Utc> {
        let lease = chrono::Duration::from_std(self.claim_for)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        Utc::now() + lease
    }

    /// Performs one step and persists the resulting state, provided nobody
    /// moved the settlement on in the meantime.
    async fn advance(
        &self,
        mut settlement: Settlement,
        payer: Option<&dyn Payer>,
    ) -> Result<Settlement, SettlementError> {
        let from = settlement.state;

        match from {
            SettlementState::Pending => {
                let Some(payer) = payer else {
                    return Err(SettlementError::PayerRequired {
                        id: settlement.id,
                        state: settlement.state,
                    });
                };

                // Submission is the last fallible call, so no hash exists yet.
                if let Err(err) = self.pay(&mut settlement, payer).await {
                    error!(id = %settlement.id, %err, "Buyer payment failed");
                    return Err(self.fail(settlement, from, err).await);
                }
            }
            SettlementState::Submitted => {
                if let Err(err) = self.confirm(&mut settlement).await {
                    if !is_revert(&err) {
                        return Err(err);
                    }

                    error!(id = %settlement.id, %err, "Buyer payment reverted");
                    return Err(self.fail(settlement, from, err).await);
                }
            }
            SettlementState::Burned => self.attest(&mut settlement).await?,
            SettlementState::Attested => self.finalize(&mut settlement).await?,
            SettlementState::Transferred | SettlementState::Finalized => {
                self.record(&mut settlement).await?;
            }
            SettlementState::Completed => return Ok(settlement),
            SettlementState::Failed => {
                return Err(SettlementError::Failed {
                    reason: settlement.last_error.unwrap_or_default(),
                    id: settlement.id,
                });
            }
        }

        settlement.last_error = None;
        settlement.updated_at = Utc::now();
        store::save(&self.pool, &settlement, from).await?;

        Ok(settlement)
    }

    /// Marks the settlement failed and hands back the error that caused it.
    async fn fail(
        &self,
        mut settlement: Settlement,
        from: SettlementState,
        err: SettlementError,
    ) -> SettlementError {
        settlement.state = SettlementState::Failed;
        settlement.last_error = Some(err.to_string());
        settlement.updated_at = Utc::now();

        match store::save(&self.pool, &settlement, from).await {
            Ok(()) => err,
            Err(save_err) => save_err,
        }
    }

    /// Broadcasts the buyer's payment. The hash is persisted as `submitted`
    /// before anything waits on it.
    async fn pay(
        &self,
        settlement: &mut Settlement,
        payer: &dyn Payer,
    ) -> Result<(), SettlementError> {
        if payer.chain() != settlement.source_chain {
            return Err(SettlementError::PayerChainMismatch {
                expected: settlement.source_chain,
                actual: payer.chain(),
            });
        }

        if !settlement.is_cross_chain() {
            info!(id = %settlement.id, step = "transferring", "Same-chain purchase, transferring directly");

            let tx = payer
                .submit_transfer(settlement.seller, settlement.amount)
                .await?;

            settlement.transfer_tx = Some(tx);
            settlement.state = SettlementState::Submitted;
            return Ok(());
        }

        let destination = settlement.destination_chain;
        let hook_executor = self
            .contracts(destination)
            .hook_executor
            .ok_or(SettlementError::HookExecutorMissing(destination))?;

        let max_fee = self
            .circle
            .max_fee(settlement.amount, settlement.source_chain, destination)
            .await;
        let hook_data = HookData::new(settlement.seller, settlement.amount).encode();

        info!(id = %settlement.id, %max_fee, step = "approving", "Approving and burning USDC");

        let burn_tx = payer
            .submit_burn(
                settlement.amount,
                destination,
                hook_executor,
                max_fee,
                hook_data.clone(),
            )
            .await?;

        info!(id = %settlement.id, %burn_tx, step = "burning", "Burn submitted");

        settlement.burn_tx = Some(burn_tx);
        settlement.hook_data = Some(hook_data);
        settlement.state = SettlementState::Submitted;

        Ok(())
    }

    async fn confirm(&self, settlement: &mut Settlement) -> Result<(), SettlementError> {
        let chain = settlement.source_chain;

        if !settlement.is_cross_chain() {
            let tx = settlement.require("transfer_tx", settlement.transfer_tx.as_ref())?;
            self.receipts.confirm_transfer(chain, tx).await?;

            info!(id = %settlement.id, %tx, step = "transferred", "Transfer confirmed");
            settlement.state = SettlementState::Transferred;
            return Ok(());
        }

        let burn_tx = settlement.require("burn_tx", settlement.burn_tx.as_ref())?;
        self.receipts.confirm_burn(chain, burn_tx).await?;

        info!(id = %settlement.id, %burn_tx, step = "burned", "Burn confirmed");
        settlement.state = SettlementState::Burned;

        Ok(())
    }

    async fn attest(&self, settlement: &mut Settlement) -> Result<(), SettlementError> {
        let burn_tx = settlement.require("burn_tx", settlement.burn_tx.as_ref())?;

        info!(id = %settlement.id, %burn_tx, step = "polling", "Waiting for attestation");

        let attestation = self
            .circle
            .poll_attestation(settlement.source_chain, burn_tx)
            .await?;

        settlement.message = Some(attestation.message);
        settlement.attestation = Some(attestation.attestation);
        settlement.state = SettlementState::Attested;

        Ok(())
    }

    async fn finalize(&self, settlement: &mut Settlement) -> Result<(), SettlementError> {
        let transfer = TransferFinalization {
            destination: settlement.destination_chain,
            message: settlement.require("message", settlement.message.as_ref())?,
            attestation: settlement.require("attestation", settlement.attestation.as_ref())?,
            hook_data: settlement.require("hook_data", settlement.hook_data.as_ref())?,
        };

        info!(id = %settlement.id, step = "finalizing", "Finalizing on destination");

        let receipt = self.finalizer.complete_transfer(transfer).await?;

        settlement.receive_tx = receipt.receive_hash;
        settlement.execute_tx = Some(receipt.exec_hash);
        settlement.state = SettlementState::Finalized;

        Ok(())
    }

    async fn record(&self, settlement: &mut Settlement) -> Result<(), SettlementError> {
        let order = marketplace::record_purchase(
            &self.pool,
            &Purchase {
                wallet_address: settlement.buyer.to_string(),
                listing_id: Some(settlement.listing_id),
                amount: Some(settlement.price),
                source_chain: source_label(settlement.source_chain.chain_id()),
            },
        )
        .await?;

        info!(id = %settlement.id, transaction_id = order.id, step = "completed", "Purchase recorded");

        settlement.transaction_id = Some(order.id);
        settlement.state = SettlementState::Completed;

        Ok(())
    }
}

/// A mined revert is final. Anything else leaves the payment unconfirmed.
const fn is_revert(err: &SettlementError) -> bool {
    matches!(
        err,
        SettlementError::Cctp(CctpError::Evm(EvmError::Reverted { .. }))
    )
}
