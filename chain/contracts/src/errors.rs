//! Contract-specific error types
//!
//! Every failure carries a human-readable message and maps onto a fixed
//! kind tag. An error returned from a contract operation aborts the whole
//! transaction; the context's buffered writes are never applied.

use ledger::LedgerError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Fixed taxonomy tag carried by every contract error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input: unknown enum value, non-positive quantity or price
    Validation,
    /// Missing referenced record
    NotFound,
    /// Duplicate creation or rejected state-machine transition
    Conflict,
    /// Caller identity not permitted for the operation
    Unauthorized,
    /// Settlement-internal cash shortfall
    InsufficientFunds,
    /// Settlement-internal securities shortfall
    InsufficientSecurities,
    /// Host marshaling or store failure, surfaced verbatim
    Internal,
}

/// Matching engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchingError {
    #[error("security {security_id} already exists")]
    SecurityExists { security_id: String },

    #[error("security {security_id} does not exist")]
    SecurityNotFound { security_id: String },

    #[error("security {security_id} is not active for trading")]
    SecurityNotActive { security_id: String },

    #[error("order {order_id} already exists")]
    OrderExists { order_id: String },

    #[error("order {order_id} does not exist")]
    OrderNotFound { order_id: String },

    #[error("only pending orders can be canceled, current status: {status}")]
    OrderNotPending { status: String },

    #[error("trade {trade_id} does not exist")]
    TradeNotFound { trade_id: String },

    #[error("trade {trade_id} is not in pending status")]
    TradeNotPending { trade_id: String },

    #[error("invalid trade status transition from {from} to {to}")]
    InvalidTradeTransition { from: String, to: String },

    #[error("{message}")]
    InvalidValue { message: String },

    #[error("{reason}")]
    Unauthorized { reason: String },

    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),
}

impl MatchingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SecurityExists { .. } | Self::OrderExists { .. } => ErrorKind::Conflict,
            Self::OrderNotPending { .. }
            | Self::TradeNotPending { .. }
            | Self::InvalidTradeTransition { .. } => ErrorKind::Conflict,
            Self::SecurityNotFound { .. }
            | Self::OrderNotFound { .. }
            | Self::TradeNotFound { .. } => ErrorKind::NotFound,
            Self::SecurityNotActive { .. } | Self::InvalidValue { .. } => ErrorKind::Validation,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Ledger(_) => ErrorKind::Internal,
        }
    }
}

/// Compliance engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComplianceError {
    #[error("security {security_id} already exists")]
    SecurityExists { security_id: String },

    #[error("security {security_id} does not exist")]
    SecurityNotFound { security_id: String },

    #[error("broker {broker_id} already exists")]
    BrokerExists { broker_id: String },

    #[error("broker {broker_id} does not exist")]
    BrokerNotFound { broker_id: String },

    #[error("rule {rule_id} already exists")]
    RuleExists { rule_id: String },

    #[error("rule {rule_id} does not exist")]
    RuleNotFound { rule_id: String },

    #[error("compliance check for trade {trade_id} already exists")]
    CheckExists { trade_id: String },

    #[error("compliance check {check_id} does not exist")]
    CheckNotFound { check_id: String },

    #[error("trade {trade_id} does not exist")]
    TradeNotFound { trade_id: String },

    #[error("trade {trade_id} has already been checked or settled, current status: {status}")]
    TradeNotPending { trade_id: String, status: String },

    #[error("invalid trade status transition from {from} to {to}")]
    InvalidTradeTransition { from: String, to: String },

    #[error("{message}")]
    InvalidValue { message: String },

    #[error("{reason}")]
    Unauthorized { reason: String },

    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),
}

impl ComplianceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SecurityExists { .. }
            | Self::BrokerExists { .. }
            | Self::RuleExists { .. }
            | Self::CheckExists { .. }
            | Self::TradeNotPending { .. }
            | Self::InvalidTradeTransition { .. } => ErrorKind::Conflict,
            Self::SecurityNotFound { .. }
            | Self::BrokerNotFound { .. }
            | Self::RuleNotFound { .. }
            | Self::CheckNotFound { .. }
            | Self::TradeNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidValue { .. } => ErrorKind::Validation,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Ledger(_) => ErrorKind::Internal,
        }
    }
}

/// Settlement engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettlementError {
    #[error("broker account {broker_id} already exists")]
    AccountExists { broker_id: String },

    #[error("broker account {broker_id} does not exist")]
    AccountNotFound { broker_id: String },

    #[error("securities account for broker {broker_id} and security {security_id} already exists")]
    SecuritiesAccountExists {
        broker_id: String,
        security_id: String,
    },

    #[error("securities account for broker {broker_id} and security {security_id} does not exist")]
    SecuritiesAccountNotFound {
        broker_id: String,
        security_id: String,
    },

    #[error("guarantee deposit for broker {broker_id} already exists")]
    DepositExists { broker_id: String },

    #[error("guarantee deposit for broker {broker_id} does not exist")]
    DepositNotFound { broker_id: String },

    #[error("guarantee fund does not exist")]
    FundNotFound,

    #[error("settlement instruction for trade {trade_id} already exists")]
    InstructionExists { trade_id: String },

    #[error("settlement instruction {instruction_id} does not exist")]
    InstructionNotFound { instruction_id: String },

    #[error("invalid instruction status transition from {from} to {to}")]
    InvalidInstructionTransition { from: String, to: String },

    #[error("invalid trade status transition from {from} to {to}")]
    InvalidTradeTransition { from: String, to: String },

    #[error("trade {trade_id} does not exist")]
    TradeNotFound { trade_id: String },

    #[error("only approved trades can be settled, current status: {status}")]
    TradeNotApproved { status: String },

    #[error("broker {broker_id} has insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        broker_id: String,
        required: Decimal,
        available: Decimal,
    },

    #[error(
        "broker {broker_id} has insufficient securities of {security_id}: required {required}, available {available}"
    )]
    InsufficientSecurities {
        broker_id: String,
        security_id: String,
        required: u64,
        available: u64,
    },

    #[error("{message}")]
    InvalidValue { message: String },

    #[error("{reason}")]
    Unauthorized { reason: String },

    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccountExists { .. }
            | Self::SecuritiesAccountExists { .. }
            | Self::DepositExists { .. }
            | Self::InstructionExists { .. }
            | Self::InvalidInstructionTransition { .. }
            | Self::InvalidTradeTransition { .. }
            | Self::TradeNotApproved { .. } => ErrorKind::Conflict,
            Self::AccountNotFound { .. }
            | Self::SecuritiesAccountNotFound { .. }
            | Self::DepositNotFound { .. }
            | Self::FundNotFound
            | Self::InstructionNotFound { .. }
            | Self::TradeNotFound { .. } => ErrorKind::NotFound,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::InsufficientSecurities { .. } => ErrorKind::InsufficientSecurities,
            Self::InvalidValue { .. } => ErrorKind::Validation,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Ledger(_) => ErrorKind::Internal,
        }
    }
}
