//! Matched trade records

use crate::ids::{BrokerId, OrderId, SecurityId, TradeId};
use crate::numeric::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trade status
///
/// Pending on creation by the matcher, approved or rejected by the
/// compliance check, settled by the settlement engine. A regulator
/// override may flip an approved/rejected verdict after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Approved,
    Rejected,
    Settled,
}

impl TradeStatus {
    /// Transition table for the trade state machine
    pub fn can_transition_to(&self, next: TradeStatus) -> bool {
        use TradeStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Rejected)
                | (Approved, Settled)
                | (Rejected, Approved)
        )
    }
}

impl FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "settled" => Ok(Self::Settled),
            other => Err(format!(
                "invalid status: must be 'pending', 'approved', 'rejected', or 'settled', got '{other}'"
            )),
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Settled => "settled",
        };
        write!(f, "{s}")
    }
}

/// A match between one buy order and one sell order.
///
/// The price is always the resting sell order's price: price improvement
/// accrues to the buyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    #[serde(rename = "tradeID")]
    pub trade_id: TradeId,
    #[serde(rename = "buyOrderID")]
    pub buy_order_id: OrderId,
    #[serde(rename = "sellOrderID")]
    pub sell_order_id: OrderId,
    #[serde(rename = "buyBrokerID")]
    pub buy_broker_id: BrokerId,
    #[serde(rename = "sellBrokerID")]
    pub sell_broker_id: BrokerId,
    #[serde(rename = "securityID")]
    pub security_id: SecurityId,
    pub quantity: u64,
    pub price: Price,
    pub status: TradeStatus,
    pub match_time: String,
}

impl Trade {
    /// Ledger key of this record
    pub fn ledger_key(&self) -> &str {
        self.trade_id.as_str()
    }

    /// Cash value of the trade: quantity × price
    pub fn notional(&self) -> Decimal {
        self.price.notional(self.quantity)
    }
}
