//! Compliance rule definitions and evaluation
//!
//! Four seeded rules gate every matched trade, evaluated in a fixed
//! order: security status (RULE004), broker eligibility (RULE002), price
//! band (RULE001), volume (RULE003), then the special low-risk check for
//! flagged securities. The first failure fixes the rejection reason;
//! later failures only mark the rules map.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use types::ids::RuleId;
use types::regulatory::{
    BrokerProfile, Rule, RuleCategory, RuleSeverity, RuleStatus, SecurityProfile,
};
use types::trade::Trade;

pub const RULE_PRICE_BAND: &str = "RULE001";
pub const RULE_BROKER_ELIGIBILITY: &str = "RULE002";
pub const RULE_VOLUME: &str = "RULE003";
pub const RULE_SECURITY_STATUS: &str = "RULE004";

/// Rejection reasons, one per rule
pub mod reason {
    pub const SECURITY_NOT_ACTIVE: &str = "Security is not active for trading";
    pub const BROKER_NOT_ACTIVE: &str = "One or both brokers are not active";
    pub const PRICE_DEVIATION: &str = "Price deviation exceeds allowed limit";
    pub const VOLUME_EXCEEDED: &str = "Trade volume exceeds broker's limit";
    pub const SPECIAL_CHECK: &str = "Special security requires low-risk brokers";
    pub const MANUAL_REJECTION: &str = "Manual rejection by regulator";
}

/// Everything the rule engine looks at for one trade
pub struct RuleInput<'a> {
    pub trade: &'a Trade,
    pub security: &'a SecurityProfile,
    pub buy_broker: &'a BrokerProfile,
    pub sell_broker: &'a BrokerProfile,
}

/// Outcome of evaluating the rule set against one trade
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Pass/fail per rule id. BTreeMap keeps serialization deterministic.
    pub results: BTreeMap<String, bool>,
    /// Reason of the first failing rule, if any
    pub rejection_reason: Option<&'static str>,
}

impl Verdict {
    pub fn approved(&self) -> bool {
        self.rejection_reason.is_none()
    }
}

/// Evaluate the full rule set
pub fn evaluate(input: &RuleInput<'_>) -> Verdict {
    let mut results = BTreeMap::new();
    let mut rejection_reason = None;

    let security_ok = input.security.is_active();
    results.insert(RULE_SECURITY_STATUS.to_string(), security_ok);
    if !security_ok {
        rejection_reason.get_or_insert(reason::SECURITY_NOT_ACTIVE);
    }

    let brokers_ok = input.buy_broker.is_active() && input.sell_broker.is_active();
    results.insert(RULE_BROKER_ELIGIBILITY.to_string(), brokers_ok);
    if !brokers_ok {
        rejection_reason.get_or_insert(reason::BROKER_NOT_ACTIVE);
    }

    let price_ok = price_within_band(input);
    results.insert(RULE_PRICE_BAND.to_string(), price_ok);
    if !price_ok {
        rejection_reason.get_or_insert(reason::PRICE_DEVIATION);
    }

    let volume_ok = volume_within_limits(input);
    results.insert(RULE_VOLUME.to_string(), volume_ok);
    if !volume_ok {
        rejection_reason.get_or_insert(reason::VOLUME_EXCEEDED);
    }

    // Flagged securities additionally demand low-risk brokers on both
    // sides, but only once everything else passed.
    if input.security.requires_special_check && rejection_reason.is_none() {
        let special_ok = input.buy_broker.risk_rating == types::regulatory::RiskRating::Low
            && input.sell_broker.risk_rating == types::regulatory::RiskRating::Low;
        if !special_ok {
            rejection_reason = Some(reason::SPECIAL_CHECK);
        }
    }

    Verdict {
        results,
        rejection_reason,
    }
}

/// RULE001: with a known last price, the traded price must stay within
/// the security's daily change limit (percent, both directions). A
/// security that has never traded passes by definition.
fn price_within_band(input: &RuleInput<'_>) -> bool {
    match input.trade.price.percent_change_from(input.security.last_price) {
        None => true,
        Some(pct_change) => pct_change.abs() <= input.security.daily_price_change_limit,
    }
}

/// RULE003: traded quantity within both brokers' trade limits
fn volume_within_limits(input: &RuleInput<'_>) -> bool {
    let quantity = Decimal::from(input.trade.quantity);
    quantity <= input.buy_broker.trade_limit && quantity <= input.sell_broker.trade_limit
}

/// The rule set written to the ledger at initialization
pub fn seeded_rules(now: &str) -> Vec<Rule> {
    let rule = |id: &str, name: &str, description: &str, severity, category| Rule {
        rule_id: RuleId::new(id),
        name: name.to_string(),
        description: description.to_string(),
        status: RuleStatus::Active,
        severity,
        category,
        created_at: now.to_string(),
        updated_at: now.to_string(),
    };
    vec![
        rule(
            RULE_PRICE_BAND,
            "Price Manipulation Check",
            "Checks if trade price is within acceptable range of market price",
            RuleSeverity::High,
            RuleCategory::Price,
        ),
        rule(
            RULE_BROKER_ELIGIBILITY,
            "Broker Eligibility Check",
            "Verifies that brokers are in good standing",
            RuleSeverity::Critical,
            RuleCategory::Broker,
        ),
        rule(
            RULE_VOLUME,
            "Volume Check",
            "Checks if trade volume is suspicious",
            RuleSeverity::Medium,
            RuleCategory::Volume,
        ),
        rule(
            RULE_SECURITY_STATUS,
            "Security Status Check",
            "Verifies that the security is active and not suspended",
            RuleSeverity::Critical,
            RuleCategory::Security,
        ),
    ]
}
