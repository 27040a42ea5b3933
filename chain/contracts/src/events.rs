//! Event names and shaped payloads
//!
//! Most events carry the JSON serialization of the record they concern;
//! the structs here cover the cases with an explicit shape of their own.
//! A transaction emits at most one event, so matching and batch
//! settlement aggregate their per-item notifications into one payload.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use types::ids::{BrokerId, InstructionId, SecurityId, TradeId};
use types::numeric::Price;
use types::trade::Trade;

/// Event names as they appear to subscribers
pub mod names {
    pub const ORDER_CREATED: &str = "OrderCreated";
    pub const ORDER_CANCELED: &str = "OrderCanceled";
    pub const ORDERS_MATCHED: &str = "OrdersMatched";
    pub const TRADE_STATUS_UPDATED: &str = "TradeStatusUpdated";
    pub const SETTLEMENT_INITIATED: &str = "SettlementInitiated";
    pub const COMPLIANCE_CHECK_COMPLETED: &str = "ComplianceCheckCompleted";
    pub const COMPLIANCE_CHECK_OVERRIDDEN: &str = "ComplianceCheckOverridden";
    pub const SETTLEMENT_INSTRUCTION_CREATED: &str = "SettlementInstructionCreated";
    pub const SETTLEMENT_INSTRUCTION_VALIDATED: &str = "SettlementInstructionValidated";
    pub const SETTLEMENT_EXECUTED: &str = "SettlementExecuted";
    pub const SETTLEMENT_FAILED: &str = "SettlementFailed";
    pub const BATCH_SETTLEMENT_COMPLETED: &str = "BatchSettlementCompleted";
}

/// Aggregate payload of one matching invocation: every trade produced by
/// the sweep, in match order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    #[serde(rename = "securityID")]
    pub security_id: SecurityId,
    pub trades: Vec<Trade>,
    pub matched_at: String,
}

/// Handoff payload telling compliance and settlement a trade is ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementInitiation {
    #[serde(rename = "tradeID")]
    pub trade_id: TradeId,
    #[serde(rename = "buyBrokerID")]
    pub buy_broker_id: BrokerId,
    #[serde(rename = "sellBrokerID")]
    pub sell_broker_id: BrokerId,
    #[serde(rename = "securityID")]
    pub security_id: SecurityId,
    pub quantity: u64,
    pub price: Price,
    pub initiated_at: String,
}

/// Why a settlement could not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    BuyerInsufficientFunds,
    SellerInsufficientSecurities,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BuyerInsufficientFunds => "buyer_insufficient_funds",
            Self::SellerInsufficientSecurities => "seller_insufficient_securities",
        };
        write!(f, "{s}")
    }
}

/// Payload of a settlement failure with guarantee compensation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementFailure {
    #[serde(rename = "instructionID")]
    pub instruction_id: InstructionId,
    pub failure_reason: FailureReason,
    pub defaulting_broker: BrokerId,
    pub counterparty: BrokerId,
    pub compensation_amount: Decimal,
    pub timestamp: String,
}

/// One failed instruction inside a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedInstruction {
    #[serde(rename = "instructionID")]
    pub instruction_id: InstructionId,
    pub failure_reason: FailureReason,
}

/// Aggregate payload of one batch settlement run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSettlementReport {
    pub executed: Vec<InstructionId>,
    pub failed: Vec<FailedInstruction>,
    pub processed_at: String,
}
