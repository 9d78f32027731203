use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloy::primitives::{Address, Bytes, FixedBytes, TxHash, U256, address, b256};
use async_trait::async_trait;

use super::{Destination, RelayerError};
use crate::chain::Chain;
use crate::evm::EvmError;

/// Destination chain that records calls and reports a fixed hook balance.
pub(crate) struct MockDestination {
    hook_executor: Option<Address>,
    balance: U256,
    nonce_used: AtomicBool,
    fail_execute: bool,
    receive_calls: AtomicUsize,
    execute_calls: AtomicUsize,
    balance_checks: AtomicUsize,
    top_ups: Mutex<Vec<U256>>,
}

impl MockDestination {
    pub(crate) const HOOK_EXECUTOR: Address =
        address!("0x8AE4bb6B48C211072D3DEe6Cd9734a906450623C");
    pub(crate) const RECEIVE_TX: TxHash =
        b256!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    pub(crate) const EXECUTE_TX: TxHash =
        b256!("0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");
    pub(crate) const TOP_UP_TX: TxHash =
        b256!("0x7777777777777777777777777777777777777777777777777777777777777777");

    pub(crate) fn funded(balance: U256) -> Self {
        Self {
            hook_executor: Some(Self::HOOK_EXECUTOR),
            balance,
            nonce_used: AtomicBool::new(false),
            fail_execute: false,
            receive_calls: AtomicUsize::new(0),
            execute_calls: AtomicUsize::new(0),
            balance_checks: AtomicUsize::new(0),
            top_ups: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn without_hook_executor() -> Self {
        Self {
            hook_executor: None,
            ..Self::funded(U256::ZERO)
        }
    }

    pub(crate) fn with_nonce_used(self) -> Self {
        self.nonce_used.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_execute(self) -> Self {
        Self {
            fail_execute: true,
            ..self
        }
    }

    pub(crate) fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn balance_checks(&self) -> usize {
        self.balance_checks.load(Ordering::SeqCst)
    }

    pub(crate) fn top_ups(&self) -> Vec<U256> {
        self.top_ups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Destination for MockDestination {
    fn chain(&self) -> Chain {
        Chain::BaseSepolia
    }

    fn hook_executor(&self) -> Option<Address> {
        self.hook_executor
    }

    async fn nonce_used(&self, _nonce: FixedBytes<32>) -> Result<bool, RelayerError> {
        Ok(self.nonce_used.load(Ordering::SeqCst))
    }

    async fn receive_message(
        &self,
        _message: Bytes,
        _attestation: Bytes,
    ) -> Result<TxHash, RelayerError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        self.nonce_used.store(true, Ordering::SeqCst);
        Ok(Self::RECEIVE_TX)
    }

    async fn hook_executor_balance(&self) -> Result<U256, RelayerError> {
        self.balance_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.balance)
    }

    async fn top_up_hook_executor(&self, amount: U256) -> Result<TxHash, RelayerError> {
        self.top_ups.lock().unwrap().push(amount);
        Ok(Self::TOP_UP_TX)
    }

    async fn execute_hook(&self, _hook_data: Bytes) -> Result<TxHash, RelayerError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_execute {
            return Err(RelayerError::Evm(EvmError::Reverted {
                tx_hash: Self::EXECUTE_TX,
            }));
        }

        Ok(Self::EXECUTE_TX)
    }
}
