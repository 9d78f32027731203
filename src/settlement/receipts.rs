//! Confirmation of buyer payments that were submitted but not yet mined.

use std::collections::HashMap;

use alloy::primitives::TxHash;
use async_trait::async_trait;
use tracing::debug;

use crate::cctp::{self, CctpError};
use crate::chain::Chain;
use crate::evm::{ReadOnlyEvm, ReceiptPolling, await_receipt};

/// Source-chain receipt lookups that need no signing key, so the worker can
/// confirm a payment the CLI submitted before it exited.
#[async_trait]
pub trait PaymentReceipts: Send + Sync {
    async fn confirm_transfer(&self, chain: Chain, tx: TxHash) -> Result<(), CctpError>;

    /// Also requires the receipt to carry `MessageSent`.
    async fn confirm_burn(&self, chain: Chain, tx: TxHash) -> Result<(), CctpError>;
}

/// Read-only connections to every chain a buyer may pay from.
pub struct SourceChains {
    chains: HashMap<Chain, ReadOnlyEvm>,
    polling: ReceiptPolling,
}

impl SourceChains {
    pub fn new(chains: HashMap<Chain, ReadOnlyEvm>, polling: ReceiptPolling) -> Self {
        Self { chains, polling }
    }

    fn evm(&self, chain: Chain) -> Result<&ReadOnlyEvm, CctpError> {
        self.chains
            .get(&chain)
            .ok_or(CctpError::RpcNotConfigured(chain))
    }
}

#[async_trait]
impl PaymentReceipts for SourceChains {
    async fn confirm_transfer(&self, chain: Chain, tx: TxHash) -> Result<(), CctpError> {
        debug!(%chain, %tx, "Confirming transfer");
        await_receipt(self.evm(chain)?, tx, self.polling).await?;
        Ok(())
    }

    async fn confirm_burn(&self, chain: Chain, tx: TxHash) -> Result<(), CctpError> {
        debug!(%chain, %tx, "Confirming burn");
        cctp::confirm_burn(self.evm(chain)?, tx, self.polling).await
    }
}
