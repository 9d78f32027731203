use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, address, keccak256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use alloy::sol_types::SolEvent;
use alloy::transports::mock::Asserter;
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Evm, EvmError, ReceiptPolling, Wallet, await_receipt};
use crate::bindings::MessageTransmitterV2;

const BLOCK_HASH: &str = "0x00000000000000000000000000000000000000000000000000000000000b10c0";

/// Wallet over a mocked JSON-RPC transport.
///
/// Reads and receipt lookups are answered from the [`Asserter`] queue in
/// request order. Submissions are recorded instead of signed, and their hash
/// is the keccak of the calldata.
pub(crate) struct MockWallet {
    provider: DynProvider,
    asserter: Asserter,
    address: Address,
    receipts: ReceiptPolling,
    submitted: Mutex<Vec<(Address, Bytes)>>,
}

impl MockWallet {
    pub(crate) const ADDRESS: Address = address!("0xb0e7000000000000000000000000000000000002");

    pub(crate) fn new() -> Self {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new()
            .connect_mocked_client(asserter.clone())
            .erased();

        Self {
            provider,
            asserter,
            address: Self::ADDRESS,
            receipts: ReceiptPolling {
                interval: Duration::from_millis(1),
                max_polls: 3,
                required_confirmations: 1,
            },
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_confirmations(mut self, required_confirmations: u64) -> Self {
        self.receipts.required_confirmations = required_confirmations;
        self
    }

    pub(crate) fn asserter(&self) -> &Asserter {
        &self.asserter
    }

    pub(crate) fn submitted(&self) -> Vec<(Address, Bytes)> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn tx_hash(calldata: &Bytes) -> TxHash {
        keccak256(calldata)
    }
}

#[async_trait]
impl Evm for MockWallet {
    type Provider = DynProvider;

    fn provider(&self) -> &DynProvider {
        &self.provider
    }
}

#[async_trait]
impl Wallet for MockWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn submit(
        &self,
        contract: Address,
        calldata: Bytes,
        _note: &str,
    ) -> Result<TxHash, EvmError> {
        let tx_hash = Self::tx_hash(&calldata);
        self.submitted.lock().unwrap().push((contract, calldata));
        Ok(tx_hash)
    }

    async fn confirm(&self, tx_hash: TxHash, _note: &str) -> Result<TransactionReceipt, EvmError> {
        await_receipt(self, tx_hash, self.receipts).await
    }
}

/// JSON-RPC receipt for `tx_hash` mined in block `block`.
pub(crate) fn receipt_json(tx_hash: TxHash, block: u64, success: bool, logs: Vec<Value>) -> Value {
    json!({
        "type": "0x2",
        "status": if success { "0x1" } else { "0x0" },
        "cumulativeGasUsed": "0x5208",
        "logs": logs,
        "logsBloom": format!("0x{}", "0".repeat(512)),
        "transactionHash": tx_hash,
        "transactionIndex": "0x0",
        "blockHash": BLOCK_HASH,
        "blockNumber": format!("{block:#x}"),
        "gasUsed": "0x5208",
        "effectiveGasPrice": "0x1",
        "from": MockWallet::ADDRESS,
        "to": Address::ZERO,
        "contractAddress": null
    })
}

/// `MessageSent(message)` emitted by `emitter` in `tx_hash`.
pub(crate) fn message_sent_log(emitter: Address, tx_hash: TxHash, message: Bytes) -> Value {
    let data = Bytes::from(MessageTransmitterV2::MessageSent { message }.encode_data());

    json!({
        "address": emitter,
        "topics": [MessageTransmitterV2::MessageSent::SIGNATURE_HASH],
        "data": data,
        "blockHash": BLOCK_HASH,
        "blockNumber": "0x1",
        "transactionHash": tx_hash,
        "transactionIndex": "0x0",
        "logIndex": "0x0",
        "removed": false
    })
}
