//! Source-chain CCTP operations performed by a paying wallet.

use alloy::primitives::{Address, Bytes, FixedBytes, TxHash, U256};
use alloy::rpc::types::TransactionReceipt;
use alloy::sol_types::{SolCall, SolEvent};
use tracing::{info, trace, warn};

use super::{CctpError, FAST_TRANSFER_THRESHOLD};
use crate::bindings::{IERC20, MessageTransmitterV2, TokenMessengerV2};
use crate::chain::{Chain, ChainContracts};
use crate::evm::{Evm, ReceiptPolling, Wallet, await_receipt, usdc_allowance};

/// Wallet paired with the CCTP contracts of the chain it pays from.
pub(crate) struct CctpPayer<W> {
    chain: Chain,
    wallet: W,
    contracts: ChainContracts,
}

impl<W: Wallet> CctpPayer<W> {
    pub(crate) const fn new(chain: Chain, wallet: W, contracts: ChainContracts) -> Self {
        Self {
            chain,
            wallet,
            contracts,
        }
    }

    pub(crate) const fn chain(&self) -> Chain {
        self.chain
    }

    pub(crate) fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Approves TokenMessenger for `amount` unless the current allowance
    /// already covers it. A failed allowance read counts as zero.
    pub(crate) async fn ensure_usdc_approval(&self, amount: U256) -> Result<(), CctpError> {
        let spender = self.contracts.token_messenger;

        let allowance = match usdc_allowance(
            &self.wallet,
            self.contracts.usdc,
            self.wallet.address(),
            spender,
        )
        .await
        {
            Ok(allowance) => allowance,
            Err(err) => {
                warn!(%err, "Allowance read failed, assuming zero");
                U256::ZERO
            }
        };

        trace!(%allowance, %amount, "Checking USDC allowance");

        if allowance >= amount {
            return Ok(());
        }

        let calldata = Bytes::from(IERC20::approveCall { spender, amount }.abi_encode());

        self.wallet
            .send(self.contracts.usdc, calldata, "USDC approval for CCTP")
            .await?;

        Ok(())
    }

    /// Plain ERC-20 transfer that waits for confirmation.
    pub(crate) async fn transfer(&self, to: Address, amount: U256) -> Result<TxHash, CctpError> {
        let tx = self.submit_transfer(to, amount).await?;
        self.wallet.confirm(tx, "USDC transfer").await?;
        Ok(tx)
    }

    /// Broadcasts a plain ERC-20 transfer without waiting for it to be mined.
    pub(crate) async fn submit_transfer(&self, to: Address, amount: U256) -> Result<TxHash, CctpError> {
        info!(%to, %amount, "Transferring USDC");

        let calldata = Bytes::from(IERC20::transferCall { to, amount }.abi_encode());

        Ok(self
            .wallet
            .submit(self.contracts.usdc, calldata, "USDC transfer")
            .await?)
    }

    /// Broadcasts a burn of `amount` towards `destination`, minting to
    /// `hook_executor` with `hook_data` attached for `executeHook()`.
    ///
    /// Returns once the node accepted the transaction. Confirm it with
    /// [`confirm_burn`].
    pub(crate) async fn submit_burn_with_hook(
        &self,
        amount: U256,
        destination: Chain,
        hook_executor: Address,
        max_fee: U256,
        hook_data: Bytes,
    ) -> Result<TxHash, CctpError> {
        info!(%max_fee, %amount, %destination, %hook_executor, "Depositing for burn with hook");

        let calldata = Bytes::from(
            TokenMessengerV2::depositForBurnWithHookCall {
                amount,
                destinationDomain: destination.domain(),
                mintRecipient: FixedBytes::<32>::left_padding_from(hook_executor.as_slice()),
                burnToken: self.contracts.usdc,
                // bytes32(0) lets any address call receiveMessage() on destination.
                destinationCaller: FixedBytes::<32>::ZERO,
                maxFee: max_fee,
                minFinalityThreshold: FAST_TRANSFER_THRESHOLD,
                hookData: hook_data,
            }
            .abi_encode(),
        );

        Ok(self
            .wallet
            .submit(
                self.contracts.token_messenger,
                calldata,
                "CCTP depositForBurnWithHook",
            )
            .await?)
    }

    /// Burns `amount` towards `destination`, minting straight to `recipient`.
    pub(crate) async fn deposit_for_burn(
        &self,
        amount: U256,
        destination: Chain,
        recipient: Address,
        max_fee: U256,
    ) -> Result<TxHash, CctpError> {
        info!(%max_fee, %amount, %destination, %recipient, "Depositing for burn");

        let calldata = Bytes::from(
            TokenMessengerV2::depositForBurnCall {
                amount,
                destinationDomain: destination.domain(),
                mintRecipient: FixedBytes::<32>::left_padding_from(recipient.as_slice()),
                burnToken: self.contracts.usdc,
                destinationCaller: FixedBytes::<32>::ZERO,
                maxFee: max_fee,
                minFinalityThreshold: FAST_TRANSFER_THRESHOLD,
            }
            .abi_encode(),
        );

        let receipt = self
            .wallet
            .send(self.contracts.token_messenger, calldata, "CCTP depositForBurn")
            .await?;

        ensure_message_sent(&receipt)?;

        Ok(receipt.transaction_hash)
    }
}

/// Waits for a burn sent by any wallet and checks that it emitted
/// `MessageSent`.
pub(crate) async fn confirm_burn<E: Evm + ?Sized>(
    evm: &E,
    tx: TxHash,
    polling: ReceiptPolling,
) -> Result<(), CctpError> {
    let receipt = await_receipt(evm, tx, polling).await?;
    ensure_message_sent(&receipt)
}

fn ensure_message_sent(receipt: &TransactionReceipt) -> Result<(), CctpError> {
    if !receipt
        .inner
        .logs()
        .iter()
        .any(|log| MessageTransmitterV2::MessageSent::decode_log(log.as_ref()).is_ok())
    {
        return Err(CctpError::MessageSentEventNotFound);
    }

    Ok(())
}

/// Submits an attested message to `MessageTransmitterV2.receiveMessage()`.
pub(crate) async fn receive_message<W: Wallet + ?Sized>(
    wallet: &W,
    message_transmitter: Address,
    message: Bytes,
    attestation: Bytes,
) -> Result<TransactionReceipt, CctpError> {
    let calldata = Bytes::from(
        MessageTransmitterV2::receiveMessageCall {
            message,
            attestation,
        }
        .abi_encode(),
    );

    Ok(wallet
        .send(message_transmitter, calldata, "CCTP receiveMessage")
        .await?)
}
