use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloy::primitives::{Address, Bytes, TxHash, U256, b256};
use alloy::transports::TransportErrorKind;
use async_trait::async_trait;

use super::{Payer, PaymentReceipts};
use crate::cctp::CctpError;
use crate::chain::Chain;
use crate::evm::EvmError;
use crate::relayer::{
    FinalizationReceipt, Finalizer, RelayerError, TransferFinalization, TxStatus,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BurnCall {
    pub(crate) amount: U256,
    pub(crate) destination: Chain,
    pub(crate) hook_executor: Address,
    pub(crate) max_fee: U256,
    pub(crate) hook_data: Bytes,
}

/// Buyer wallet that records submissions instead of signing.
pub(crate) struct MockPayer {
    chain: Chain,
    address: Address,
    fail: bool,
    burn_tx: TxHash,
    transfers: Mutex<Vec<(Address, U256)>>,
    burns: Mutex<Vec<BurnCall>>,
}

impl MockPayer {
    pub(crate) const TRANSFER_TX: TxHash =
        b256!("0x7777777777777777777777777777777777777777777777777777777777777777");
    pub(crate) const BURN_TX: TxHash =
        b256!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");

    pub(crate) fn new(chain: Chain, address: Address) -> Self {
        Self {
            chain,
            address,
            fail: false,
            burn_tx: Self::BURN_TX,
            transfers: Mutex::new(Vec::new()),
            burns: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(self) -> Self {
        Self { fail: true, ..self }
    }

    pub(crate) fn with_burn_tx(self, burn_tx: TxHash) -> Self {
        Self { burn_tx, ..self }
    }

    pub(crate) fn transfers(&self) -> Vec<(Address, U256)> {
        self.transfers.lock().unwrap().clone()
    }

    pub(crate) fn burns(&self) -> Vec<BurnCall> {
        self.burns.lock().unwrap().clone()
    }

    fn rejected() -> CctpError {
        CctpError::Evm(EvmError::Transport(TransportErrorKind::custom_str(
            "insufficient funds for gas",
        )))
    }
}

#[async_trait]
impl Payer for MockPayer {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn address(&self) -> Address {
        self.address
    }

    async fn submit_transfer(&self, to: Address, amount: U256) -> Result<TxHash, CctpError> {
        if self.fail {
            return Err(Self::rejected());
        }

        self.transfers.lock().unwrap().push((to, amount));
        Ok(Self::TRANSFER_TX)
    }

    async fn submit_burn(
        &self,
        amount: U256,
        destination: Chain,
        hook_executor: Address,
        max_fee: U256,
        hook_data: Bytes,
    ) -> Result<TxHash, CctpError> {
        if self.fail {
            return Err(Self::rejected());
        }

        self.burns.lock().unwrap().push(BurnCall {
            amount,
            destination,
            hook_executor,
            max_fee,
            hook_data,
        });
        Ok(self.burn_tx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiptOutcome {
    Mined,
    Unreachable,
    Reverted,
}

/// Receipt lookups answered without a chain. Records every hash it is asked
/// to confirm.
pub(crate) struct MockReceipts {
    outcome: ReceiptOutcome,
    failures_left: AtomicUsize,
    confirmed: Mutex<Vec<(Chain, TxHash)>>,
}

impl Default for MockReceipts {
    fn default() -> Self {
        Self {
            outcome: ReceiptOutcome::Mined,
            failures_left: AtomicUsize::new(0),
            confirmed: Mutex::new(Vec::new()),
        }
    }
}

impl MockReceipts {
    /// RPC is unreachable for the first lookup only.
    pub(crate) fn unreachable_once() -> Self {
        Self {
            outcome: ReceiptOutcome::Unreachable,
            failures_left: AtomicUsize::new(1),
            ..Self::default()
        }
    }

    pub(crate) fn reverted() -> Self {
        Self {
            outcome: ReceiptOutcome::Reverted,
            ..Self::default()
        }
    }

    pub(crate) fn confirmed(&self) -> Vec<(Chain, TxHash)> {
        self.confirmed.lock().unwrap().clone()
    }

    fn lookup(&self, chain: Chain, tx_hash: TxHash) -> Result<(), CctpError> {
        self.confirmed.lock().unwrap().push((chain, tx_hash));

        match self.outcome {
            ReceiptOutcome::Mined => Ok(()),
            ReceiptOutcome::Reverted => Err(CctpError::Evm(EvmError::Reverted { tx_hash })),
            ReceiptOutcome::Unreachable => {
                let failing = self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                    .is_ok();

                if failing {
                    return Err(CctpError::Evm(EvmError::Transport(
                        TransportErrorKind::backend_gone(),
                    )));
                }

                Ok(())
            }
        }
    }
}

#[async_trait]
impl PaymentReceipts for MockReceipts {
    async fn confirm_transfer(&self, chain: Chain, tx: TxHash) -> Result<(), CctpError> {
        self.lookup(chain, tx)
    }

    async fn confirm_burn(&self, chain: Chain, tx: TxHash) -> Result<(), CctpError> {
        self.lookup(chain, tx)
    }
}

/// Finalizer that records requests and can fail its first call.
#[derive(Default)]
pub(crate) struct MockFinalizer {
    fail_next: AtomicBool,
    requests: Mutex<Vec<TransferFinalization>>,
}

impl MockFinalizer {
    pub(crate) const RECEIVE_TX: TxHash =
        b256!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    pub(crate) const EXECUTE_TX: TxHash =
        b256!("0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

    pub(crate) fn failing_once() -> Self {
        Self {
            fail_next: AtomicBool::new(true),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<TransferFinalization> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Finalizer for MockFinalizer {
    async fn complete_transfer(
        &self,
        transfer: TransferFinalization,
    ) -> Result<FinalizationReceipt, RelayerError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(RelayerError::Remote {
                status: 500,
                message: "completeTransfer failed".to_string(),
            });
        }

        self.requests.lock().unwrap().push(transfer);

        Ok(FinalizationReceipt {
            receive_hash: Some(Self::RECEIVE_TX),
            receive_status: TxStatus::Success,
            exec_hash: Self::EXECUTE_TX,
            exec_status: TxStatus::Success,
        })
    }
}
