//! Ledger amounts carrying a unit suffix.

use crate::decimal::Amount;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An amount with its currency, as the ledger encodes it: `"100.000 HIVE"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetAmount {
    pub amount: Amount,
    pub symbol: String,
}

impl AssetAmount {
    pub fn new(amount: Amount, symbol: impl Into<String>) -> Self {
        Self {
            amount,
            symbol: symbol.into(),
        }
    }

    /// Parse `"<decimal> <SYMBOL>"`.
    pub fn parse(s: &str) -> Result<Self> {
        let (value, symbol) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| CoreError::InvalidAsset(format!("missing unit suffix: {s:?}")))?;

        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(CoreError::InvalidAsset(format!("empty unit suffix: {s:?}")));
        }

        let amount: Amount = value.parse()?;
        if amount.inner().is_sign_negative() {
            return Err(CoreError::InvalidAsset(format!("negative amount: {s:?}")));
        }

        Ok(Self::new(amount, symbol))
    }

    /// Fixed-precision wire form, e.g. `"12.500 HIVE"`.
    pub fn to_wire(&self) -> String {
        format!("{} {}", self.amount.to_wire(), self.symbol)
    }

    pub fn is_currency(&self, symbol: &str) -> bool {
        self.symbol.eq_ignore_ascii_case(symbol)
    }
}

impl fmt::Display for AssetAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl FromStr for AssetAmount {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for AssetAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for AssetAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
