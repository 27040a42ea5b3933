//! Settlement instructions and the transaction audit trail

use crate::ids::{BrokerId, InstructionId, SecurityId, TradeId};
use crate::numeric::Price;
use crate::trade::Trade;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger key range covering all transaction audit records
pub const TRANSACTION_KEY_START: &str = "transaction-";
pub const TRANSACTION_KEY_END: &str = "transaction-~";

/// Settlement instruction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionStatus {
    Pending,
    Validated,
    Completed,
    Failed,
}

impl InstructionStatus {
    /// Transition table for the instruction state machine
    pub fn can_transition_to(&self, next: InstructionStatus) -> bool {
        use InstructionStatus::*;
        matches!(
            (self, next),
            (Pending, Validated)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Validated, Completed)
                | (Validated, Failed)
        )
    }

    /// Still eligible for execution
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Validated)
    }
}

impl fmt::Display for InstructionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Delivery-versus-payment instruction for one approved trade.
///
/// One instruction per trade; the settlement date is creation date plus
/// three calendar days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementInstruction {
    #[serde(rename = "instructionID")]
    pub instruction_id: InstructionId,
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
    pub total_amount: Decimal,
    pub status: InstructionStatus,
    pub created_at: String,
    pub settlement_date: String,
    pub completed_at: String,
}

impl SettlementInstruction {
    /// Build the pending instruction for an approved trade
    pub fn for_trade(trade: &Trade, created_at: impl Into<String>, settlement_date: impl Into<String>) -> Self {
        Self {
            instruction_id: InstructionId::for_trade(&trade.trade_id),
            trade_id: trade.trade_id.clone(),
            buy_broker_id: trade.buy_broker_id.clone(),
            sell_broker_id: trade.sell_broker_id.clone(),
            security_id: trade.security_id.clone(),
            quantity: trade.quantity,
            price: trade.price,
            total_amount: trade.notional(),
            status: InstructionStatus::Pending,
            created_at: created_at.into(),
            settlement_date: settlement_date.into(),
            completed_at: String::new(),
        }
    }

    pub fn ledger_key(&self) -> &str {
        self.instruction_id.as_str()
    }
}

/// Kind of movement recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Cash,
    Security,
    Deposit,
    Withdrawal,
    SecurityDeposit,
    Compensation,
}

impl TransactionType {
    /// Key segment used when deriving transaction record keys
    pub fn key_segment(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Security => "securities",
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::SecurityDeposit => "sec-deposit",
            Self::Compensation => "compensation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Failed,
}

/// Append-only audit record of one cash or security movement.
///
/// `amount` carries the cash amount for cash movements and the share
/// count for security movements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "transactionID")]
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(rename = "fromID")]
    pub from_id: String,
    #[serde(rename = "toID")]
    pub to_id: String,
    #[serde(rename = "securityID")]
    pub security_id: String,
    pub amount: Decimal,
    #[serde(rename = "instructionID")]
    pub instruction_id: String,
    pub status: TransactionStatus,
    pub timestamp: String,
}

impl Transaction {
    pub fn ledger_key(&self) -> &str {
        &self.transaction_id
    }

    /// Record key for the cash or securities leg of a DvP execution
    pub fn settlement_leg_key(kind: TransactionType, instruction_id: &InstructionId) -> String {
        format!("transaction-{}-{}", kind.key_segment(), instruction_id)
    }

    /// Record key for a standalone account movement, unique per host
    /// transaction id
    pub fn movement_key(kind: TransactionType, subject: &str, tx_id: &str) -> String {
        format!("transaction-{}-{}-{}", kind.key_segment(), subject, tx_id)
    }
}
