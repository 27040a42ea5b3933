//! Identifier newtypes for ledger entities
//!
//! All identifiers are caller-supplied or derived from other identifiers,
//! never generated from random or wall-clock sources, so that replicated
//! execution produces identical keys on every node. Each newtype knows how
//! to derive the ledger keys built from it.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

string_id! {
    /// Identifier of a listed security. Doubles as the ledger key of the
    /// market-side security record.
    SecurityId
}

string_id! {
    /// Identifier of an order. Doubles as the ledger key of the order record.
    OrderId
}

string_id! {
    /// Identifier of a broker organization
    BrokerId
}

string_id! {
    /// Identifier of a matched trade, always of the form
    /// `trade-<buyOrderID>-<sellOrderID>-<n>`
    TradeId
}

string_id! {
    /// Identifier of a compliance rule (`RULE001`, `RULE002`, …)
    RuleId
}

string_id! {
    /// Identifier of a compliance check, always `check-<tradeID>`
    CheckId
}

string_id! {
    /// Identifier of a settlement instruction, always `instruction-<tradeID>`
    InstructionId
}

/// Ledger key prefix shared by all trade records
pub const TRADE_KEY_PREFIX: &str = "trade-";

impl TradeId {
    /// Derive the trade identifier for the n-th match of a matching
    /// invocation. Embedding both order identifiers makes the id unique
    /// across repeated invocations: a given order pair can cross at most
    /// once, because every match exhausts at least one of the two sides.
    pub fn for_match(buy: &OrderId, sell: &OrderId, seq: usize) -> Self {
        Self(format!("{TRADE_KEY_PREFIX}{buy}-{sell}-{seq}"))
    }
}

impl CheckId {
    /// Derive the check identifier for a trade. One check per trade.
    pub fn for_trade(trade_id: &TradeId) -> Self {
        Self(format!("check-{trade_id}"))
    }
}

/// Ledger key prefix shared by all settlement instruction records
pub const INSTRUCTION_KEY_PREFIX: &str = "instruction-";

impl InstructionId {
    /// Derive the instruction identifier for a trade. One instruction per trade.
    pub fn for_trade(trade_id: &TradeId) -> Self {
        Self(format!("{INSTRUCTION_KEY_PREFIX}{trade_id}"))
    }
}

impl BrokerId {
    /// Ledger key of the regulator-side broker profile
    pub fn profile_key(&self) -> String {
        format!("broker-{}", self.0)
    }

    /// Ledger key of the broker's cash account
    pub fn cash_account_key(&self) -> String {
        format!("brokerAccount-{}", self.0)
    }

    /// Ledger key of the broker's guarantee deposit
    pub fn guarantee_deposit_key(&self) -> String {
        format!("guaranteeDeposit-{}", self.0)
    }

    /// Ledger key of the broker's holdings account for one security
    pub fn securities_account_key(&self, security_id: &SecurityId) -> String {
        format!("securitiesAccount-{}-{}", self.0, security_id)
    }
}

impl SecurityId {
    /// Ledger key of the regulator-side security profile. The market-side
    /// record sits at the bare security id, so the regulator view needs its
    /// own prefix to coexist in the shared keyspace.
    pub fn profile_key(&self) -> String {
        format!("regSecurity-{}", self.0)
    }
}
