//! Destination-chain contract calls made by the relayer account.

use alloy::primitives::{Address, Bytes, FixedBytes, TxHash, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use super::RelayerError;
use crate::bindings::{HookExecutor, IERC20, MessageTransmitterV2};
use crate::cctp::receive_message;
use crate::chain::{Chain, ChainContracts};
use crate::evm::{Wallet, usdc_balance};

/// Operations the relayer performs on one destination chain.
#[async_trait]
pub(crate) trait Destination: Send + Sync {
    fn chain(&self) -> Chain;

    fn hook_executor(&self) -> Option<Address>;

    /// Whether `MessageTransmitterV2` has already consumed `nonce`.
    async fn nonce_used(&self, nonce: FixedBytes<32>) -> Result<bool, RelayerError>;

    async fn receive_message(
        &self,
        message: Bytes,
        attestation: Bytes,
    ) -> Result<TxHash, RelayerError>;

    async fn hook_executor_balance(&self) -> Result<U256, RelayerError>;

    /// Sends `amount` of the relayer's own USDC to the hook executor.
    async fn top_up_hook_executor(&self, amount: U256) -> Result<TxHash, RelayerError>;

    async fn execute_hook(&self, hook_data: Bytes) -> Result<TxHash, RelayerError>;
}

pub(crate) struct EvmDestination<W> {
    chain: Chain,
    wallet: W,
    contracts: ChainContracts,
}

impl<W: Wallet> EvmDestination<W> {
    pub(crate) const fn new(chain: Chain, wallet: W, contracts: ChainContracts) -> Self {
        Self {
            chain,
            wallet,
            contracts,
        }
    }

    fn require_hook_executor(&self) -> Result<Address, RelayerError> {
        self.contracts
            .hook_executor
            .ok_or(RelayerError::HookExecutorMissing)
    }
}

#[async_trait]
impl<W: Wallet> Destination for EvmDestination<W> {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn hook_executor(&self) -> Option<Address> {
        self.contracts.hook_executor
    }

    async fn nonce_used(&self, nonce: FixedBytes<32>) -> Result<bool, RelayerError> {
        let used = MessageTransmitterV2::new(
            self.contracts.message_transmitter,
            self.wallet.provider(),
        )
        .usedNonces(nonce)
        .call()
        .await
        .map_err(crate::evm::EvmError::from)?;

        Ok(!used.is_zero())
    }

    async fn receive_message(
        &self,
        message: Bytes,
        attestation: Bytes,
    ) -> Result<TxHash, RelayerError> {
        let receipt = receive_message(
            &self.wallet,
            self.contracts.message_transmitter,
            message,
            attestation,
        )
        .await?;

        Ok(receipt.transaction_hash)
    }

    async fn hook_executor_balance(&self) -> Result<U256, RelayerError> {
        let hook_executor = self.require_hook_executor()?;
        Ok(usdc_balance(&self.wallet, self.contracts.usdc, hook_executor).await?)
    }

    async fn top_up_hook_executor(&self, amount: U256) -> Result<TxHash, RelayerError> {
        let to = self.require_hook_executor()?;
        let calldata = Bytes::from(IERC20::transferCall { to, amount }.abi_encode());

        let receipt = self
            .wallet
            .send(self.contracts.usdc, calldata, "USDC top-up for hook executor")
            .await?;

        Ok(receipt.transaction_hash)
    }

    async fn execute_hook(&self, hook_data: Bytes) -> Result<TxHash, RelayerError> {
        let hook_executor = self.require_hook_executor()?;
        let calldata = Bytes::from(HookExecutor::executeHookCall { hookData: hook_data }.abi_encode());

        let receipt = self
            .wallet
            .send(hook_executor, calldata, "HookExecutor executeHook")
            .await?;

        Ok(receipt.transaction_hash)
    }
}
