use alloy::primitives::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

const USDC_DECIMALS: u32 = 6;

/// A USDC amount in whole-token units (e.g. `12.5` is twelve and a half
/// dollars).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Usdc(pub(crate) Decimal);

impl Usdc {
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Converts to U256 base units with 6 decimal places (USDC standard).
    ///
    /// Negative values and precision finer than one micro-dollar are
    /// rejected.
    pub fn to_u256_6_decimals(self) -> Result<U256, UsdcConversionError> {
        if self.0.is_sign_negative() && !self.0.is_zero() {
            return Err(UsdcConversionError::NegativeValue(self.0));
        }

        let scaled = self
            .0
            .checked_mul(Decimal::from(10u64.pow(USDC_DECIMALS)))
            .ok_or(UsdcConversionError::Overflow(self.0))?;

        if scaled.fract() != Decimal::ZERO {
            return Err(UsdcConversionError::TooPrecise(self.0));
        }

        scaled
            .to_u128()
            .map(U256::from)
            .ok_or(UsdcConversionError::Overflow(self.0))
    }

    pub fn from_u256_6_decimals(value: U256) -> Result<Self, UsdcConversionError> {
        let raw: u128 = value
            .try_into()
            .map_err(|_| UsdcConversionError::BaseUnitsOverflow(value))?;
        let raw = i128::try_from(raw).map_err(|_| UsdcConversionError::BaseUnitsOverflow(value))?;

        Decimal::try_from_i128_with_scale(raw, USDC_DECIMALS)
            .map(|d| Self(d.normalize()))
            .map_err(|_| UsdcConversionError::BaseUnitsOverflow(value))
    }
}

impl FromStr for Usdc {
    type Err = rust_decimal::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(value).map(Self)
    }
}

impl Display for Usdc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Usdc> for Decimal {
    fn from(value: Usdc) -> Self {
        value.0
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UsdcConversionError {
    #[error("USDC amount cannot be negative: {0}")]
    NegativeValue(Decimal),
    #[error("USDC amount has more than 6 decimal places: {0}")]
    TooPrecise(Decimal),
    #[error("USDC amount overflows base units: {0}")]
    Overflow(Decimal),
    #[error("USDC base units do not fit a decimal: {0}")]
    BaseUnitsOverflow(U256),
}
