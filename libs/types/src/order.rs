//! Order lifecycle types

use crate::ids::{BrokerId, OrderId, SecurityId};
use crate::numeric::Price;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => Err(format!("order side must be 'buy' or 'sell', got '{other}'")),
        }
    }
}

/// Order status
///
/// `Canceled` and `Executed` are terminal. An order becomes `Matched` the
/// moment its remaining quantity hits zero and `Executed` once the final
/// trade against it settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Matched,
    Executed,
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Canceled)
    }

    /// Transition table for the order state machine
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Matched) | (Pending, Canceled) | (Matched, Executed)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Matched => "matched",
            Self::Executed => "executed",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

/// A buy or sell order resting on the book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "orderID")]
    pub order_id: OrderId,
    #[serde(rename = "brokerID")]
    pub broker_id: BrokerId,
    #[serde(rename = "securityID")]
    pub security_id: SecurityId,
    pub side: Side,
    pub quantity: u64,
    pub price: Price,
    pub status: OrderStatus,
    pub create_time: String,
    pub update_time: String,
    pub remaining_qty: u64,
}

impl Order {
    /// Create a new pending order with the full quantity remaining
    pub fn new(
        order_id: OrderId,
        broker_id: BrokerId,
        security_id: SecurityId,
        side: Side,
        quantity: u64,
        price: Price,
        now: impl Into<String>,
    ) -> Self {
        let now = now.into();
        Self {
            order_id,
            broker_id,
            security_id,
            side,
            quantity,
            price,
            status: OrderStatus::Pending,
            create_time: now.clone(),
            update_time: now,
            remaining_qty: quantity,
        }
    }

    /// Ledger key of this record
    pub fn ledger_key(&self) -> &str {
        self.order_id.as_str()
    }

    /// Open for matching: pending with quantity left
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Pending && self.remaining_qty > 0
    }

    /// `0 <= remaining <= quantity`, and exhaustion implies a matched or
    /// executed status.
    pub fn check_invariant(&self) -> bool {
        self.remaining_qty <= self.quantity
            && (self.remaining_qty > 0
                || matches!(self.status, OrderStatus::Matched | OrderStatus::Executed))
            || self.status == OrderStatus::Canceled
    }

    /// Consume matched quantity, flipping to `Matched` on exhaustion.
    ///
    /// # Panics
    /// Panics if the fill exceeds the remaining quantity.
    pub fn fill(&mut self, quantity: u64, now: impl Into<String>) {
        assert!(
            quantity <= self.remaining_qty,
            "Fill would exceed remaining quantity"
        );
        self.remaining_qty -= quantity;
        if self.remaining_qty == 0 {
            self.status = OrderStatus::Matched;
        }
        self.update_time = now.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_order() -> Order {
        Order::new(
            OrderId::new("ORD1"),
            BrokerId::new("broker1"),
            SecurityId::new("SEC1"),
            Side::Buy,
            100,
            Price::from_u64(105),
            "2024-03-01T09:00:00Z",
        )
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_new_order_is_open() {
        let order = pending_order();
        assert!(order.is_open());
        assert_eq!(order.remaining_qty, 100);
        assert!(order.check_invariant());
    }

    #[test]
    fn test_partial_fill_stays_pending() {
        let mut order = pending_order();
        order.fill(40, "2024-03-01T09:01:00Z");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.remaining_qty, 60);
        assert!(order.check_invariant());
    }

    #[test]
    fn test_exhaustion_flips_to_matched() {
        let mut order = pending_order();
        order.fill(100, "2024-03-01T09:01:00Z");
        assert_eq!(order.status, OrderStatus::Matched);
        assert!(!order.is_open());
    }

    #[test]
    #[should_panic(expected = "Fill would exceed remaining quantity")]
    fn test_overfill_panics() {
        let mut order = pending_order();
        order.fill(101, "2024-03-01T09:01:00Z");
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Matched));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Matched.can_transition_to(Executed));
        assert!(!Matched.can_transition_to(Canceled));
        assert!(!Executed.can_transition_to(Pending));
        assert!(!Canceled.can_transition_to(Pending));
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(pending_order()).unwrap();
        assert!(json.get("orderID").is_some());
        assert!(json.get("brokerID").is_some());
        assert!(json.get("securityID").is_some());
        assert!(json.get("remainingQty").is_some());
        assert!(json.get("createTime").is_some());
        assert_eq!(json["side"], "buy");
        assert_eq!(json["status"], "pending");
    }
}
