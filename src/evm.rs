//! EVM chain interaction.
//!
//! - [`Evm`]: read-only chain access through an alloy provider.
//! - [`Wallet`]: extends `Evm` with a signing identity. Submission and
//!   confirmation are separate steps so callers can persist a transaction
//!   hash before waiting on it. A failed receipt status is an error.
//!
//! [`RawPrivateKeyWallet`] signs locally with a private key held in the
//! secrets file. It backs both the relayer account and the buyer account
//! used by the CLI.

use std::sync::Arc;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use tracing::{debug, info};
use url::Url;

use crate::bindings::IERC20;

#[cfg(test)]
pub(crate) mod mock;

/// Errors that can occur during EVM operations.
#[derive(Debug, thiserror::Error)]
pub enum EvmError {
    #[error("transport error: {0}")]
    Transport(#[from] alloy::transports::RpcError<alloy::transports::TransportErrorKind>),
    #[error("contract error: {0}")]
    Contract(#[from] alloy::contract::Error),
    #[error("transaction reverted: {tx_hash}")]
    Reverted { tx_hash: TxHash },
    #[error("no receipt for {tx_hash} after {polls} polls")]
    ReceiptTimeout { tx_hash: TxHash, polls: usize },
}

/// Read-only EVM chain access.
#[async_trait]
pub trait Evm: Send + Sync + 'static {
    /// The provider type used for chain access.
    type Provider: Provider + Clone + Send + Sync;

    /// Returns the underlying provider for direct chain queries.
    fn provider(&self) -> &Self::Provider;
}

/// Signing wallet on an EVM chain.
#[async_trait]
pub trait Wallet: Evm {
    /// Returns the address this wallet signs transactions from.
    fn address(&self) -> Address;

    /// Signs and broadcasts a contract call, returning its hash as soon as
    /// the node accepts it.
    ///
    /// `note` is a human-readable description of the operation used for
    /// logging.
    async fn submit(&self, contract: Address, calldata: Bytes, note: &str)
    -> Result<TxHash, EvmError>;

    /// Waits until `tx_hash` is mined with enough confirmations.
    async fn confirm(&self, tx_hash: TxHash, note: &str) -> Result<TransactionReceipt, EvmError>;

    /// Submit a signed contract call and wait for its receipt.
    async fn send(
        &self,
        contract: Address,
        calldata: Bytes,
        note: &str,
    ) -> Result<TransactionReceipt, EvmError> {
        let tx_hash = self.submit(contract, calldata, note).await?;
        self.confirm(tx_hash, note).await
    }
}

#[async_trait]
impl<T: Evm> Evm for Arc<T> {
    type Provider = T::Provider;

    fn provider(&self) -> &Self::Provider {
        (**self).provider()
    }
}

#[async_trait]
impl<T: Wallet> Wallet for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn submit(
        &self,
        contract: Address,
        calldata: Bytes,
        note: &str,
    ) -> Result<TxHash, EvmError> {
        (**self).submit(contract, calldata, note).await
    }

    async fn confirm(&self, tx_hash: TxHash, note: &str) -> Result<TransactionReceipt, EvmError> {
        (**self).confirm(tx_hash, note).await
    }
}

/// How often and how long to look for a transaction receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolling {
    pub interval: Duration,
    pub max_polls: usize,
    pub required_confirmations: u64,
}

impl ReceiptPolling {
    pub const fn with_confirmations(required_confirmations: u64) -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_polls: 150,
            required_confirmations,
        }
    }
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self::with_confirmations(1)
    }
}

enum ReceiptPoll {
    NotMined,
    Failed(EvmError),
}

impl From<alloy::transports::TransportError> for ReceiptPoll {
    fn from(err: alloy::transports::TransportError) -> Self {
        Self::Failed(err.into())
    }
}

/// Polls for the receipt of `tx_hash` until it is buried under
/// `required_confirmations` blocks. Works for transactions sent by any
/// process, so a restarted caller can confirm what an earlier run submitted.
pub(crate) async fn await_receipt<E: Evm + ?Sized>(
    evm: &E,
    tx_hash: TxHash,
    polling: ReceiptPolling,
) -> Result<TransactionReceipt, EvmError> {
    let provider = evm.provider();

    let fetch = || async {
        let receipt = provider
            .get_transaction_receipt(tx_hash)
            .await?
            .ok_or(ReceiptPoll::NotMined)?;

        if polling.required_confirmations > 1 {
            let head = provider.get_block_number().await?;
            let mined = receipt.block_number.unwrap_or(head);

            if head.saturating_sub(mined) + 1 < polling.required_confirmations {
                return Err(ReceiptPoll::NotMined);
            }
        }

        Ok::<_, ReceiptPoll>(receipt)
    };

    let backoff = ConstantBuilder::default()
        .with_delay(polling.interval)
        .with_max_times(polling.max_polls.saturating_sub(1));

    let receipt = fetch
        .retry(backoff)
        .when(|poll| matches!(poll, ReceiptPoll::NotMined))
        .notify(|_, dur| debug!(%tx_hash, ?dur, "Transaction not confirmed yet"))
        .await
        .map_err(|poll| match poll {
            ReceiptPoll::NotMined => EvmError::ReceiptTimeout {
                tx_hash,
                polls: polling.max_polls,
            },
            ReceiptPoll::Failed(err) => err,
        })?;

    if !receipt.status() {
        return Err(EvmError::Reverted { tx_hash });
    }

    Ok(receipt)
}

/// Read-only connection to a chain's JSON-RPC endpoint.
#[derive(Clone)]
pub struct ReadOnlyEvm {
    provider: DynProvider,
}

impl ReadOnlyEvm {
    pub fn connect(rpc_url: Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();
        Self { provider }
    }
}

#[async_trait]
impl Evm for ReadOnlyEvm {
    type Provider = DynProvider;

    fn provider(&self) -> &DynProvider {
        &self.provider
    }
}

/// Local wallet that signs and submits transactions directly.
#[derive(Clone)]
pub struct RawPrivateKeyWallet {
    provider: DynProvider,
    address: Address,
    receipts: ReceiptPolling,
}

impl RawPrivateKeyWallet {
    pub fn connect(rpc_url: Url, signer: PrivateKeySigner, required_confirmations: u64) -> Self {
        let address = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(rpc_url)
            .erased();

        Self {
            provider,
            address,
            receipts: ReceiptPolling::with_confirmations(required_confirmations),
        }
    }
}

#[async_trait]
impl Evm for RawPrivateKeyWallet {
    type Provider = DynProvider;

    fn provider(&self) -> &DynProvider {
        &self.provider
    }
}

#[async_trait]
impl Wallet for RawPrivateKeyWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn submit(
        &self,
        contract: Address,
        calldata: Bytes,
        note: &str,
    ) -> Result<TxHash, EvmError> {
        info!(%contract, note, "Submitting contract call");

        let tx = alloy::rpc::types::TransactionRequest::default()
            .from(self.address)
            .to(contract)
            .input(calldata.into());

        let pending = self.provider.send_transaction(tx).await?;
        let tx_hash = *pending.tx_hash();

        info!(%tx_hash, note, "Transaction submitted");

        Ok(tx_hash)
    }

    async fn confirm(&self, tx_hash: TxHash, note: &str) -> Result<TransactionReceipt, EvmError> {
        let receipt = await_receipt(self, tx_hash, self.receipts).await?;

        info!(%tx_hash, note, "Transaction confirmed");

        Ok(receipt)
    }
}

pub(crate) async fn usdc_balance<E: Evm + ?Sized>(
    evm: &E,
    usdc: Address,
    owner: Address,
) -> Result<U256, EvmError> {
    Ok(IERC20::new(usdc, evm.provider())
        .balanceOf(owner)
        .call()
        .await?)
}

pub(crate) async fn usdc_allowance<E: Evm + ?Sized>(
    evm: &E,
    usdc: Address,
    owner: Address,
    spender: Address,
) -> Result<U256, EvmError> {
    Ok(IERC20::new(usdc, evm.provider())
        .allowance(owner, spender)
        .call()
        .await?)
}

pub(crate) async fn usdc_decimals<E: Evm + ?Sized>(evm: &E, usdc: Address) -> Result<u8, EvmError> {
    Ok(IERC20::new(usdc, evm.provider()).decimals().call().await?)
}
