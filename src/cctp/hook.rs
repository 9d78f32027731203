//! Payload carried through CCTP to the destination hook executor.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolValue;

/// ABI-encoded `(address seller, uint256 amount)` handed to
/// `HookExecutor.executeHook()`. The executor forwards `amount` of the
/// minted USDC to `seller`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookData {
    pub seller: Address,
    pub amount: U256,
}

#[derive(Debug, thiserror::Error)]
pub enum HookDataError {
    #[error("hook data must be 64 bytes, got {length}")]
    InvalidLength { length: usize },
    #[error("hook data does not decode as (address, uint256): {0}")]
    Abi(#[from] alloy::sol_types::Error),
}

const ENCODED_LENGTH: usize = 64;

impl HookData {
    pub const fn new(seller: Address, amount: U256) -> Self {
        Self { seller, amount }
    }

    pub fn encode(&self) -> Bytes {
        Bytes::from((self.seller, self.amount).abi_encode_params())
    }

    pub fn decode(data: &[u8]) -> Result<Self, HookDataError> {
        if data.len() != ENCODED_LENGTH {
            return Err(HookDataError::InvalidLength { length: data.len() });
        }

        // The address word must be left-padded with zeros.
        if data[..12].iter().any(|byte| *byte != 0) {
            return Err(HookDataError::Abi(alloy::sol_types::Error::custom(
                "address word has non-zero padding",
            )));
        }

        let (seller, amount) = <(Address, U256)>::abi_decode_params(data)?;

        Ok(Self { seller, amount })
    }
}
