//! Regulator-owned records: rules, broker profiles, security profiles and
//! compliance checks

use crate::ids::{BrokerId, CheckId, RuleId, SecurityId, TradeId};
use crate::numeric::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ───────────────────────── Rules ─────────────────────────

/// Ledger key range covering all rule records
pub const RULE_KEY_START: &str = "RULE";
pub const RULE_KEY_END: &str = "RULE~";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Active,
    Inactive,
}

impl FromStr for RuleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("invalid status: must be 'active' or 'inactive', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for RuleSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!(
                "invalid severity: must be 'low', 'medium', 'high', or 'critical', got '{other}'"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    Price,
    Volume,
    Broker,
    Security,
}

impl FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price" => Ok(Self::Price),
            "volume" => Ok(Self::Volume),
            "broker" => Ok(Self::Broker),
            "security" => Ok(Self::Security),
            other => Err(format!(
                "invalid category: must be 'price', 'volume', 'broker', or 'security', got '{other}'"
            )),
        }
    }
}

/// A compliance rule definition. Identity is immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(rename = "ruleID")]
    pub rule_id: RuleId,
    pub name: String,
    pub description: String,
    pub status: RuleStatus,
    pub severity: RuleSeverity,
    pub category: RuleCategory,
    pub created_at: String,
    pub updated_at: String,
}

impl Rule {
    pub fn ledger_key(&self) -> &str {
        self.rule_id.as_str()
    }
}

// ───────────────────────── Brokers ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerStatus {
    Active,
    Suspended,
    Revoked,
}

impl FromStr for BrokerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "revoked" => Ok(Self::Revoked),
            other => Err(format!(
                "invalid status: must be 'active', 'suspended', or 'revoked', got '{other}'"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskRating {
    Low,
    Medium,
    High,
}

impl FromStr for RiskRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!(
                "invalid risk rating: must be 'low', 'medium', or 'high', got '{other}'"
            )),
        }
    }
}

/// Regulatory standing of a broker. The violation counter only ever
/// increases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerProfile {
    #[serde(rename = "brokerID")]
    pub broker_id: BrokerId,
    pub name: String,
    pub status: BrokerStatus,
    pub trade_limit: Decimal,
    pub risk_rating: RiskRating,
    pub compliance_violations: u64,
    pub last_updated: String,
}

impl BrokerProfile {
    pub fn new(
        broker_id: BrokerId,
        name: impl Into<String>,
        trade_limit: Decimal,
        risk_rating: RiskRating,
        now: impl Into<String>,
    ) -> Self {
        Self {
            broker_id,
            name: name.into(),
            status: BrokerStatus::Active,
            trade_limit,
            risk_rating,
            compliance_violations: 0,
            last_updated: now.into(),
        }
    }

    pub fn ledger_key(&self) -> String {
        self.broker_id.profile_key()
    }

    pub fn is_active(&self) -> bool {
        self.status == BrokerStatus::Active
    }

    pub fn record_violation(&mut self, now: impl Into<String>) {
        self.compliance_violations += 1;
        self.last_updated = now.into();
    }
}

// ───────────────────────── Security profiles ─────────────────────────

/// Regulator-side view of a security, carrying the compliance parameters
/// the rule engine evaluates against. Distinct from the matcher's
/// `Security` record and keyed under its own prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityProfile {
    #[serde(rename = "securityID")]
    pub security_id: SecurityId,
    pub symbol: String,
    pub name: String,
    #[serde(rename = "issuerID")]
    pub issuer_id: BrokerId,
    pub total_shares: u64,
    pub price_limit: Decimal,
    /// Maximum allowed deviation from the last price, in percent
    pub daily_price_change_limit: Decimal,
    pub requires_special_check: bool,
    pub status: crate::security::SecurityStatus,
    pub last_price: Price,
    pub created_at: String,
    pub updated_at: String,
}

impl SecurityProfile {
    pub fn ledger_key(&self) -> String {
        self.security_id.profile_key()
    }

    pub fn is_active(&self) -> bool {
        self.status == crate::security::SecurityStatus::Active
    }
}

// ───────────────────────── Compliance checks ─────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pending,
    Approved,
    Rejected,
}

impl FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!(
                "invalid status: must be 'pending', 'approved', or 'rejected', got '{other}'"
            )),
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// Outcome of the rule evaluation for one trade. At most one per trade;
/// the derived key is the idempotency guard.
///
/// The rule-result map is a `BTreeMap` so its serialized form is
/// byte-identical on every replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCheck {
    #[serde(rename = "checkID")]
    pub check_id: CheckId,
    #[serde(rename = "tradeID")]
    pub trade_id: TradeId,
    pub status: CheckStatus,
    pub rejection_reason: String,
    pub rules: BTreeMap<String, bool>,
    pub comments: String,
    #[serde(rename = "regulatorID")]
    pub regulator_id: String,
    pub check_time: String,
    pub update_time: String,
}

impl ComplianceCheck {
    pub fn ledger_key(&self) -> &str {
        self.check_id.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityStatus;

    fn profile() -> BrokerProfile {
        BrokerProfile::new(
            BrokerId::new("broker1"),
            "Atlas Capital",
            Decimal::from(1_000),
            RiskRating::Low,
            "2024-03-01T09:00:00Z",
        )
    }

    #[test]
    fn test_new_broker_profile_defaults() {
        let p = profile();
        assert!(p.is_active());
        assert_eq!(p.compliance_violations, 0);
        assert_eq!(p.ledger_key(), "broker-broker1");
    }

    #[test]
    fn test_violation_counter_increments() {
        let mut p = profile();
        p.record_violation("2024-03-01T10:00:00Z");
        p.record_violation("2024-03-01T11:00:00Z");
        assert_eq!(p.compliance_violations, 2);
        assert_eq!(p.last_updated, "2024-03-01T11:00:00Z");
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("revoked".parse::<BrokerStatus>().unwrap(), BrokerStatus::Revoked);
        assert_eq!("low".parse::<RiskRating>().unwrap(), RiskRating::Low);
        assert_eq!("critical".parse::<RuleSeverity>().unwrap(), RuleSeverity::Critical);
        assert_eq!("volume".parse::<RuleCategory>().unwrap(), RuleCategory::Volume);
        assert!("extreme".parse::<RuleSeverity>().is_err());
    }

    #[test]
    fn test_security_profile_wire_names() {
        let p = SecurityProfile {
            security_id: SecurityId::new("SEC1"),
            symbol: "IAM".to_string(),
            name: "Itissalat Al-Maghrib".to_string(),
            issuer_id: BrokerId::new("issuer1"),
            total_shares: 10_000,
            price_limit: Decimal::from(500),
            daily_price_change_limit: Decimal::from(10),
            requires_special_check: false,
            status: SecurityStatus::Active,
            last_price: Price::from_u64(100),
            created_at: "2024-03-01T09:00:00Z".to_string(),
            updated_at: "2024-03-01T09:00:00Z".to_string(),
        };
        assert_eq!(p.ledger_key(), "regSecurity-SEC1");
        let json = serde_json::to_value(&p).unwrap();
        assert!(json.get("dailyPriceChangeLimit").is_some());
        assert!(json.get("requiresSpecialCheck").is_some());
        assert!(json.get("lastPrice").is_some());
        assert!(json.get("priceLimit").is_some());
    }

    #[test]
    fn test_compliance_check_rules_map_is_ordered() {
        let mut rules = BTreeMap::new();
        rules.insert("RULE004".to_string(), true);
        rules.insert("RULE001".to_string(), false);
        rules.insert("RULE002".to_string(), true);
        let check = ComplianceCheck {
            check_id: CheckId::new("check-trade-B1-S1-0"),
            trade_id: TradeId::new("trade-B1-S1-0"),
            status: CheckStatus::Rejected,
            rejection_reason: "Price deviation exceeds allowed limit".to_string(),
            rules,
            comments: String::new(),
            regulator_id: "AMMC".to_string(),
            check_time: "2024-03-01T09:10:00Z".to_string(),
            update_time: "2024-03-01T09:10:00Z".to_string(),
        };
        let json = serde_json::to_string(&check).unwrap();
        // BTreeMap keys serialize sorted
        let pos1 = json.find("RULE001").unwrap();
        let pos2 = json.find("RULE002").unwrap();
        let pos4 = json.find("RULE004").unwrap();
        assert!(pos1 < pos2 && pos2 < pos4);
        assert!(json.contains("\"checkID\""));
        assert!(json.contains("\"rejectionReason\""));
        assert!(json.contains("\"regulatorID\""));
    }
}
