//! Networks the marketplace settles on and their CCTP contract deployments.
//!
//! Each supported chain maps to a fixed EVM chain id, a CCTP domain and a
//! label used when recording purchases. Contract addresses default to
//! Circle's testnet deployments and can be overridden per chain in config.

use alloy::primitives::{Address, address};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

pub(crate) const USDC_ETHEREUM_SEPOLIA: Address =
    address!("0x1c7D4B196Cb0C7B01D743Fbc6116a902379C7238");
pub(crate) const USDC_ARBITRUM_SEPOLIA: Address =
    address!("0x75faf114eafb1bdbe2f0316df893fd58ce46aa4d");
pub(crate) const USDC_BASE_SEPOLIA: Address =
    address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e");

/// TokenMessengerV2 shares one address across the CCTP testnets.
pub(crate) const TOKEN_MESSENGER_V2: Address =
    address!("0x8FE6B999Dc680CcFDD5Bf7EB0974218be2542DAA");

/// MessageTransmitterV2 shares one address across the CCTP testnets.
pub(crate) const MESSAGE_TRANSMITTER_V2: Address =
    address!("0xE737e5cEBEEBa77EFE34D4aa090756590b1CE275");

pub(crate) const HOOK_EXECUTOR_BASE_SEPOLIA: Address =
    address!("0x8AE4bb6B48C211072D3DEe6Cd9734a906450623C");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    EthereumSepolia,
    ArbitrumSepolia,
    BaseSepolia,
}

impl Chain {
    pub const ALL: [Self; 3] = [Self::EthereumSepolia, Self::ArbitrumSepolia, Self::BaseSepolia];

    pub const fn chain_id(self) -> u64 {
        match self {
            Self::EthereumSepolia => 11_155_111,
            Self::ArbitrumSepolia => 421_614,
            Self::BaseSepolia => 84_532,
        }
    }

    /// CCTP domain identifier used by TokenMessenger and the Circle API.
    pub const fn domain(self) -> u32 {
        match self {
            Self::EthereumSepolia => 0,
            Self::ArbitrumSepolia => 3,
            Self::BaseSepolia => 6,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::EthereumSepolia => "ethereum-sepolia",
            Self::ArbitrumSepolia => "arbitrum-sepolia",
            Self::BaseSepolia => "base-sepolia",
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|chain| chain.chain_id() == chain_id)
    }

    /// Contract addresses Circle deployed on this chain, plus the hook
    /// executor where one exists.
    pub(crate) const fn default_contracts(self) -> ChainContracts {
        let (usdc, hook_executor) = match self {
            Self::EthereumSepolia => (USDC_ETHEREUM_SEPOLIA, None),
            Self::ArbitrumSepolia => (USDC_ARBITRUM_SEPOLIA, None),
            Self::BaseSepolia => (USDC_BASE_SEPOLIA, Some(HOOK_EXECUTOR_BASE_SEPOLIA)),
        };

        ChainContracts {
            usdc,
            token_messenger: TOKEN_MESSENGER_V2,
            message_transmitter: MESSAGE_TRANSMITTER_V2,
            hook_executor,
        }
    }
}

/// Label recorded as a purchase's source chain. Unknown chain ids are kept
/// as their decimal representation.
pub fn source_label(chain_id: u64) -> String {
    Chain::from_chain_id(chain_id).map_or_else(|| chain_id.to_string(), |c| c.label().to_string())
}

impl Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unsupported chain: {0}")]
pub struct UnsupportedChain(pub String);

impl FromStr for Chain {
    type Err = UnsupportedChain;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Some(chain) = Self::ALL.into_iter().find(|c| c.label() == value) {
            return Ok(chain);
        }

        value
            .parse::<u64>()
            .ok()
            .and_then(Self::from_chain_id)
            .ok_or_else(|| UnsupportedChain(value.to_string()))
    }
}

/// CCTP-related contract addresses on a single chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainContracts {
    pub usdc: Address,
    pub token_messenger: Address,
    pub message_transmitter: Address,
    pub hook_executor: Option<Address>,
}
