//! Custody records: cash accounts, securities accounts, guarantee
//! deposits and the central guarantee fund
//!
//! Reservations are soft earmarks recorded in the same record as the
//! resource they reserve, so two transactions racing to reserve from one
//! account conflict on the record itself and at most one commits.

use crate::ids::{BrokerId, SecurityId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ledger key of the guarantee fund singleton
pub const GUARANTEE_FUND_KEY: &str = "guaranteeFund";

/// A broker's cash account.
///
/// Invariant: `0 <= reserved_balance <= balance`; the spendable amount is
/// `balance - reserved_balance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerCashAccount {
    #[serde(rename = "brokerID")]
    pub broker_id: BrokerId,
    pub balance: Decimal,
    pub reserved_balance: Decimal,
    pub last_updated: String,
}

impl BrokerCashAccount {
    pub fn new(broker_id: BrokerId, initial_balance: Decimal, now: impl Into<String>) -> Self {
        Self {
            broker_id,
            balance: initial_balance,
            reserved_balance: Decimal::ZERO,
            last_updated: now.into(),
        }
    }

    pub fn ledger_key(&self) -> String {
        self.broker_id.cash_account_key()
    }

    /// Cash not earmarked by any open settlement instruction
    pub fn available(&self) -> Decimal {
        self.balance - self.reserved_balance
    }

    pub fn check_invariant(&self) -> bool {
        self.reserved_balance >= Decimal::ZERO && self.reserved_balance <= self.balance
    }
}

/// A broker's holdings of one security.
///
/// Invariant: `0 <= reserved_qty <= quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritiesAccount {
    #[serde(rename = "accountID")]
    pub account_id: String,
    #[serde(rename = "brokerID")]
    pub broker_id: BrokerId,
    #[serde(rename = "securityID")]
    pub security_id: SecurityId,
    pub quantity: u64,
    pub reserved_qty: u64,
    pub last_updated: String,
}

impl SecuritiesAccount {
    pub fn new(
        broker_id: BrokerId,
        security_id: SecurityId,
        initial_quantity: u64,
        now: impl Into<String>,
    ) -> Self {
        let account_id = broker_id.securities_account_key(&security_id);
        Self {
            account_id,
            broker_id,
            security_id,
            quantity: initial_quantity,
            reserved_qty: 0,
            last_updated: now.into(),
        }
    }

    pub fn ledger_key(&self) -> &str {
        &self.account_id
    }

    /// Shares not earmarked by any open settlement instruction
    pub fn available(&self) -> u64 {
        self.quantity - self.reserved_qty
    }

    pub fn check_invariant(&self) -> bool {
        self.reserved_qty <= self.quantity
    }
}

/// Per-broker collateral posted with the exchange, drawn first on default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuaranteeDeposit {
    #[serde(rename = "brokerID")]
    pub broker_id: BrokerId,
    pub amount: Decimal,
    pub last_updated: String,
}

impl GuaranteeDeposit {
    pub fn new(broker_id: BrokerId, initial_amount: Decimal, now: impl Into<String>) -> Self {
        Self {
            broker_id,
            amount: initial_amount,
            last_updated: now.into(),
        }
    }

    pub fn ledger_key(&self) -> String {
        self.broker_id.guarantee_deposit_key()
    }
}

/// The exchange's mutualized loss pool, drawn after the defaulter's own
/// deposit is exhausted. No replenishment policy is enforced here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuaranteeFund {
    pub total_amount: Decimal,
    pub last_updated: String,
}
