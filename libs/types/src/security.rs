//! Market-side security listing
//!
//! This is the record the matching contract owns, keyed by the bare
//! security id. The regulator keeps its own view of a security with
//! compliance parameters in `regulatory::SecurityProfile`.

use crate::ids::{BrokerId, SecurityId};
use crate::numeric::Price;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Listing status of a security
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityStatus {
    Active,
    Suspended,
    Delisted,
}

impl FromStr for SecurityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "delisted" => Ok(Self::Delisted),
            other => Err(format!(
                "invalid status: must be 'active', 'suspended', or 'delisted', got '{other}'"
            )),
        }
    }
}

impl fmt::Display for SecurityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Delisted => "delisted",
        };
        write!(f, "{s}")
    }
}

/// A listed security as seen by the matching engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    #[serde(rename = "securityID")]
    pub security_id: SecurityId,
    pub symbol: String,
    #[serde(rename = "issuerID")]
    pub issuer_id: BrokerId,
    pub name: String,
    pub total_shares: u64,
    pub current_price: Price,
    /// Appended on every compliance-approved trade, oldest first
    pub price_history: Vec<Price>,
    pub status: SecurityStatus,
    pub last_update_time: String,
}

impl Security {
    /// Create a freshly listed, active security
    pub fn new(
        security_id: SecurityId,
        symbol: impl Into<String>,
        issuer_id: BrokerId,
        name: impl Into<String>,
        total_shares: u64,
        initial_price: Price,
        now: impl Into<String>,
    ) -> Self {
        Self {
            security_id,
            symbol: symbol.into(),
            issuer_id,
            name: name.into(),
            total_shares,
            current_price: initial_price,
            price_history: vec![initial_price],
            status: SecurityStatus::Active,
            last_update_time: now.into(),
        }
    }

    /// Ledger key of this record
    pub fn ledger_key(&self) -> &str {
        self.security_id.as_str()
    }

    pub fn is_active(&self) -> bool {
        self.status == SecurityStatus::Active
    }

    /// Record a traded price: updates the current price and appends to the
    /// price history.
    pub fn record_price(&mut self, price: Price, now: impl Into<String>) {
        self.current_price = price;
        self.price_history.push(price);
        self.last_update_time = now.into();
    }
}
