//! Compliance contract
//!
//! The regulator's service: it keeps its own view of securities and
//! brokers with the parameters the rule engine needs, gates every matched
//! trade exactly once, and may override a verdict after the fact. Trade
//! status is written back in lockstep with the check.

use crate::errors::ComplianceError;
use crate::events::names;
use crate::rules::{self, reason};
use ledger::{StateStore, TxContext};
use rust_decimal::Decimal;
use tracing::{info, warn};
use types::ids::{BrokerId, CheckId, RuleId, SecurityId, TradeId};
use types::regulatory::{
    BrokerProfile, BrokerStatus, CheckStatus, ComplianceCheck, RiskRating, Rule, SecurityProfile,
    RULE_KEY_END, RULE_KEY_START,
};
use types::security::SecurityStatus;
use types::trade::{Trade, TradeStatus};

/// The compliance service. Writing operations require the regulator
/// identity.
pub struct ComplianceContract;

impl ComplianceContract {
    /// Seed the four standing rules. Idempotent by content: re-running
    /// rewrites the same definitions with the current stamp.
    pub fn init_rules<S: StateStore>(ctx: &mut TxContext<'_, S>) -> Result<(), ComplianceError> {
        require_regulator(ctx)?;
        let now = ctx.now_rfc3339();
        for rule in rules::seeded_rules(&now) {
            ctx.put_record(&rule.ledger_key().to_string(), &rule)?;
        }
        Ok(())
    }

    // ───────────────────────── Securities ─────────────────────────

    /// Register the regulator-side profile of a security
    #[allow(clippy::too_many_arguments)]
    pub fn add_security<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        security_id: SecurityId,
        symbol: &str,
        name: &str,
        issuer_id: BrokerId,
        total_shares: u64,
        price_limit: Decimal,
        daily_price_change_limit: Decimal,
        requires_special_check: bool,
    ) -> Result<(), ComplianceError> {
        require_regulator(ctx)?;
        let key = security_id.profile_key();
        if ctx.exists(&key)? {
            return Err(ComplianceError::SecurityExists {
                security_id: security_id.to_string(),
            });
        }
        let now = ctx.now_rfc3339();
        let profile = SecurityProfile {
            security_id,
            symbol: symbol.to_string(),
            name: name.to_string(),
            issuer_id,
            total_shares,
            price_limit,
            daily_price_change_limit,
            requires_special_check,
            status: SecurityStatus::Active,
            last_price: types::numeric::Price::ZERO,
            created_at: now.clone(),
            updated_at: now,
        };
        ctx.put_record(&key, &profile)?;
        Ok(())
    }

    pub fn get_security<S: StateStore>(
        ctx: &TxContext<'_, S>,
        security_id: &SecurityId,
    ) -> Result<SecurityProfile, ComplianceError> {
        load_profile(ctx, security_id)
    }

    pub fn update_security_status<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        security_id: &SecurityId,
        new_status: SecurityStatus,
    ) -> Result<(), ComplianceError> {
        require_regulator(ctx)?;
        let mut profile = load_profile(ctx, security_id)?;
        profile.status = new_status;
        profile.updated_at = ctx.now_rfc3339();
        ctx.put_record(&profile.ledger_key(), &profile)?;
        Ok(())
    }

    // ───────────────────────── Brokers ─────────────────────────

    /// Register a broker in good standing
    pub fn add_broker<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        broker_id: BrokerId,
        name: &str,
        trade_limit: Decimal,
        risk_rating: RiskRating,
    ) -> Result<(), ComplianceError> {
        require_regulator(ctx)?;
        let key = broker_id.profile_key();
        if ctx.exists(&key)? {
            return Err(ComplianceError::BrokerExists {
                broker_id: broker_id.to_string(),
            });
        }
        let profile = BrokerProfile::new(broker_id, name, trade_limit, risk_rating, ctx.now_rfc3339());
        ctx.put_record(&key, &profile)?;
        Ok(())
    }

    pub fn get_broker<S: StateStore>(
        ctx: &TxContext<'_, S>,
        broker_id: &BrokerId,
    ) -> Result<BrokerProfile, ComplianceError> {
        load_broker(ctx, broker_id)
    }

    pub fn update_broker_status<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        broker_id: &BrokerId,
        new_status: BrokerStatus,
    ) -> Result<(), ComplianceError> {
        require_regulator(ctx)?;
        let mut profile = load_broker(ctx, broker_id)?;
        profile.status = new_status;
        profile.last_updated = ctx.now_rfc3339();
        ctx.put_record(&profile.ledger_key(), &profile)?;
        Ok(())
    }

    // ───────────────────────── Rules ─────────────────────────

    /// Register an additional compliance rule
    pub fn add_rule<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        rule: Rule,
    ) -> Result<(), ComplianceError> {
        require_regulator(ctx)?;
        if ctx.exists(rule.ledger_key())? {
            return Err(ComplianceError::RuleExists {
                rule_id: rule.rule_id.to_string(),
            });
        }
        ctx.put_record(&rule.ledger_key().to_string(), &rule)?;
        Ok(())
    }

    pub fn get_rule<S: StateStore>(
        ctx: &TxContext<'_, S>,
        rule_id: &RuleId,
    ) -> Result<Rule, ComplianceError> {
        ctx.get_record(rule_id.as_str())?
            .ok_or_else(|| ComplianceError::RuleNotFound {
                rule_id: rule_id.to_string(),
            })
    }

    pub fn get_all_rules<S: StateStore>(
        ctx: &TxContext<'_, S>,
    ) -> Result<Vec<Rule>, ComplianceError> {
        let rows = ctx.range_records::<Rule>(RULE_KEY_START, RULE_KEY_END)?;
        Ok(rows.into_iter().map(|(_, rule)| rule).collect())
    }

    // ───────────────────────── Trades ─────────────────────────

    /// Write a trade record handed over from another ledger. Exchange or
    /// regulator.
    pub fn import_trade<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        trade: Trade,
    ) -> Result<(), ComplianceError> {
        let caller = ctx.caller();
        if !caller.is_exchange() && !caller.is_regulator() {
            return Err(ComplianceError::Unauthorized {
                reason: "only the exchange or the regulator may import trades".to_string(),
            });
        }
        ctx.put_record(&trade.ledger_key().to_string(), &trade)?;
        Ok(())
    }

    pub fn get_trade<S: StateStore>(
        ctx: &TxContext<'_, S>,
        trade_id: &TradeId,
    ) -> Result<Trade, ComplianceError> {
        load_trade(ctx, trade_id)
    }

    // ───────────────────────── Checks ─────────────────────────

    /// Run the rule set against a pending trade, exactly once per trade.
    ///
    /// The existence of the `check-<tradeID>` record is the idempotency
    /// key; a second invocation is a conflict. The trade mirrors the
    /// verdict; a rejection also marks one violation against each broker,
    /// an approval moves the security profile's last price to the traded
    /// price.
    pub fn perform_trade_check<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        trade_id: &TradeId,
        regulator_id: &str,
    ) -> Result<ComplianceCheck, ComplianceError> {
        require_regulator(ctx)?;
        let mut trade = load_trade(ctx, trade_id)?;
        if trade.status != TradeStatus::Pending {
            return Err(ComplianceError::TradeNotPending {
                trade_id: trade_id.to_string(),
                status: trade.status.to_string(),
            });
        }

        let check_id = CheckId::for_trade(trade_id);
        if ctx.exists(check_id.as_str())? {
            return Err(ComplianceError::CheckExists {
                trade_id: trade_id.to_string(),
            });
        }

        let mut security = load_profile(ctx, &trade.security_id)?;
        let mut buy_broker = load_broker(ctx, &trade.buy_broker_id)?;
        let mut sell_broker = load_broker(ctx, &trade.sell_broker_id)?;

        let verdict = rules::evaluate(&rules::RuleInput {
            trade: &trade,
            security: &security,
            buy_broker: &buy_broker,
            sell_broker: &sell_broker,
        });

        let now = ctx.now_rfc3339();
        let status = if verdict.approved() {
            CheckStatus::Approved
        } else {
            CheckStatus::Rejected
        };
        let check = ComplianceCheck {
            check_id: check_id.clone(),
            trade_id: trade_id.clone(),
            status,
            rejection_reason: verdict.rejection_reason.unwrap_or("").to_string(),
            rules: verdict.results,
            comments: String::new(),
            regulator_id: regulator_id.to_string(),
            check_time: now.clone(),
            update_time: now.clone(),
        };
        ctx.put_record(check_id.as_str(), &check)?;

        trade.status = match status {
            CheckStatus::Approved => TradeStatus::Approved,
            _ => TradeStatus::Rejected,
        };
        ctx.put_record(trade_id.as_str(), &trade)?;

        match status {
            CheckStatus::Rejected => {
                buy_broker.record_violation(now.as_str());
                sell_broker.record_violation(now.as_str());
                ctx.put_record(&buy_broker.ledger_key(), &buy_broker)?;
                ctx.put_record(&sell_broker.ledger_key(), &sell_broker)?;
                warn!(
                    trade_id = %trade_id,
                    reason = %check.rejection_reason,
                    "trade rejected by compliance"
                );
            }
            _ => {
                security.last_price = trade.price;
                security.updated_at = now;
                ctx.put_record(&security.ledger_key(), &security)?;
                info!(trade_id = %trade_id, "trade approved by compliance");
            }
        }

        ctx.set_event(names::COMPLIANCE_CHECK_COMPLETED, &check)?;
        Ok(check)
    }

    pub fn get_compliance_check<S: StateStore>(
        ctx: &TxContext<'_, S>,
        check_id: &CheckId,
    ) -> Result<ComplianceCheck, ComplianceError> {
        ctx.get_record(check_id.as_str())?
            .ok_or_else(|| ComplianceError::CheckNotFound {
                check_id: check_id.to_string(),
            })
    }

    /// Regulator override of an existing verdict, with an audit trail via
    /// the `ComplianceCheckOverridden` event. The trade follows the new
    /// verdict; broker violation counters are left untouched.
    pub fn manual_override<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        check_id: &CheckId,
        new_status: CheckStatus,
        comments: &str,
        regulator_id: &str,
    ) -> Result<(), ComplianceError> {
        require_regulator(ctx)?;
        if new_status == CheckStatus::Pending {
            return Err(ComplianceError::InvalidValue {
                message: "invalid status: must be 'approved' or 'rejected'".to_string(),
            });
        }
        let mut check = Self::get_compliance_check(ctx, check_id)?;

        check.status = new_status;
        check.comments = comments.to_string();
        check.regulator_id = regulator_id.to_string();
        check.update_time = ctx.now_rfc3339();
        if new_status == CheckStatus::Rejected && check.rejection_reason.is_empty() {
            check.rejection_reason = reason::MANUAL_REJECTION.to_string();
        }
        ctx.put_record(check_id.as_str(), &check)?;

        let mut trade = load_trade(ctx, &check.trade_id)?;
        let target = match new_status {
            CheckStatus::Approved => TradeStatus::Approved,
            _ => TradeStatus::Rejected,
        };
        if trade.status != target {
            if !trade.status.can_transition_to(target) {
                return Err(ComplianceError::InvalidTradeTransition {
                    from: trade.status.to_string(),
                    to: target.to_string(),
                });
            }
            trade.status = target;
            ctx.put_record(&trade.ledger_key().to_string(), &trade)?;
        }

        ctx.set_event(names::COMPLIANCE_CHECK_OVERRIDDEN, &check)?;
        Ok(())
    }
}

// ───────────────────────── Helpers ─────────────────────────

fn require_regulator<S: StateStore>(ctx: &TxContext<'_, S>) -> Result<(), ComplianceError> {
    if ctx.caller().is_regulator() {
        Ok(())
    } else {
        Err(ComplianceError::Unauthorized {
            reason: "only the regulator is authorized for this operation".to_string(),
        })
    }
}

fn load_profile<S: StateStore>(
    ctx: &TxContext<'_, S>,
    security_id: &SecurityId,
) -> Result<SecurityProfile, ComplianceError> {
    ctx.get_record(&security_id.profile_key())?
        .ok_or_else(|| ComplianceError::SecurityNotFound {
            security_id: security_id.to_string(),
        })
}

fn load_broker<S: StateStore>(
    ctx: &TxContext<'_, S>,
    broker_id: &BrokerId,
) -> Result<BrokerProfile, ComplianceError> {
    ctx.get_record(&broker_id.profile_key())?
        .ok_or_else(|| ComplianceError::BrokerNotFound {
            broker_id: broker_id.to_string(),
        })
}

fn load_trade<S: StateStore>(
    ctx: &TxContext<'_, S>,
    trade_id: &TradeId,
) -> Result<Trade, ComplianceError> {
    ctx.get_record(trade_id.as_str())?
        .ok_or_else(|| ComplianceError::TradeNotFound {
            trade_id: trade_id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use ledger::{Caller, MemoryStore, Role, TxStamp};
    use types::ids::OrderId;
    use types::numeric::Price;

    fn regulator() -> Caller {
        Caller::new("AMMCMSP", Role::Regulator)
    }

    fn exchange() -> Caller {
        Caller::new("StockMarketMSP", Role::Exchange)
    }

    fn tx(store: &mut MemoryStore, caller: Caller, n: i64) -> TxContext<'_, MemoryStore> {
        TxContext::new(
            store,
            TxStamp::new(format!("tx-{n}"), 1_709_283_600 + n * 60, 0),
            caller,
        )
    }

    fn trade(id: &str, price: u64, quantity: u64) -> Trade {
        Trade {
            trade_id: TradeId::new(id),
            buy_order_id: OrderId::new("B1"),
            sell_order_id: OrderId::new("S1"),
            buy_broker_id: BrokerId::new("broker1"),
            sell_broker_id: BrokerId::new("broker2"),
            security_id: SecurityId::new("SEC1"),
            quantity,
            price: Price::from_u64(price),
            status: TradeStatus::Pending,
            match_time: "2024-03-01T09:05:00Z".to_string(),
        }
    }

    /// Regulator records for SEC1 and both brokers, plus an imported trade
    fn seed(store: &mut MemoryStore, limit_pct: u64, t: Trade) {
        let mut ctx = tx(store, regulator(), 0);
        ComplianceContract::init_rules(&mut ctx).unwrap();
        ComplianceContract::add_security(
            &mut ctx,
            SecurityId::new("SEC1"),
            "IAM",
            "Itissalat Al-Maghrib",
            BrokerId::new("issuer1"),
            10_000,
            Decimal::from(1_000),
            Decimal::from(limit_pct),
            false,
        )
        .unwrap();
        ComplianceContract::add_broker(
            &mut ctx,
            BrokerId::new("broker1"),
            "Atlas Capital",
            Decimal::from(1_000),
            RiskRating::Low,
        )
        .unwrap();
        ComplianceContract::add_broker(
            &mut ctx,
            BrokerId::new("broker2"),
            "Rif Securities",
            Decimal::from(1_000),
            RiskRating::Low,
        )
        .unwrap();
        ComplianceContract::import_trade(&mut ctx, t).unwrap();
        ctx.commit().unwrap();
    }

    /// Give SEC1 a known last price so the price band rule has a baseline
    fn set_last_price(store: &mut MemoryStore, price: u64) {
        let mut ctx = tx(store, regulator(), 1);
        let mut profile = ComplianceContract::get_security(&ctx, &SecurityId::new("SEC1")).unwrap();
        profile.last_price = Price::from_u64(price);
        ctx.put_record(&profile.ledger_key(), &profile).unwrap();
        ctx.commit().unwrap();
    }

    #[test]
    fn test_writes_require_regulator() {
        let mut store = MemoryStore::new();
        let mut ctx = tx(&mut store, exchange(), 0);
        let err = ComplianceContract::init_rules(&mut ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_init_rules_seeds_four() {
        let mut store = MemoryStore::new();
        {
            let mut ctx = tx(&mut store, regulator(), 0);
            ComplianceContract::init_rules(&mut ctx).unwrap();
            ctx.commit().unwrap();
        }
        let ctx = tx(&mut store, regulator(), 1);
        let rules = ComplianceContract::get_all_rules(&ctx).unwrap();
        assert_eq!(rules.len(), 4);
        assert!(
            ComplianceContract::get_rule(&ctx, &RuleId::new("RULE004")).is_ok()
        );
    }

    #[test]
    fn test_approval_updates_trade_and_last_price() {
        let mut store = MemoryStore::new();
        seed(&mut store, 10, trade("trade-B1-S1-0", 102, 100));
        set_last_price(&mut store, 100);

        let mut ctx = tx(&mut store, regulator(), 2);
        let check = ComplianceContract::perform_trade_check(
            &mut ctx,
            &TradeId::new("trade-B1-S1-0"),
            "AMMC",
        )
        .unwrap();
        assert_eq!(check.status, CheckStatus::Approved);
        assert!(check.rejection_reason.is_empty());
        let event = ctx.commit().unwrap().unwrap();
        assert_eq!(event.name, "ComplianceCheckCompleted");
        assert_eq!(event.payload["status"], "approved");

        let ctx = tx(&mut store, regulator(), 3);
        let t = ComplianceContract::get_trade(&ctx, &TradeId::new("trade-B1-S1-0")).unwrap();
        assert_eq!(t.status, TradeStatus::Approved);
        let profile = ComplianceContract::get_security(&ctx, &SecurityId::new("SEC1")).unwrap();
        assert_eq!(profile.last_price, Price::from_u64(102));
        // no violations on approval
        let broker = ComplianceContract::get_broker(&ctx, &BrokerId::new("broker1")).unwrap();
        assert_eq!(broker.compliance_violations, 0);
    }

    #[test]
    fn test_price_band_rejection_increments_violations() {
        let mut store = MemoryStore::new();
        seed(&mut store, 5, trade("trade-B1-S1-0", 110, 100));
        set_last_price(&mut store, 100);

        let mut ctx = tx(&mut store, regulator(), 2);
        let check = ComplianceContract::perform_trade_check(
            &mut ctx,
            &TradeId::new("trade-B1-S1-0"),
            "AMMC",
        )
        .unwrap();
        assert_eq!(check.status, CheckStatus::Rejected);
        assert_eq!(check.rejection_reason, "Price deviation exceeds allowed limit");
        ctx.commit().unwrap();

        let ctx = tx(&mut store, regulator(), 3);
        let t = ComplianceContract::get_trade(&ctx, &TradeId::new("trade-B1-S1-0")).unwrap();
        assert_eq!(t.status, TradeStatus::Rejected);
        for broker in ["broker1", "broker2"] {
            let profile = ComplianceContract::get_broker(&ctx, &BrokerId::new(broker)).unwrap();
            assert_eq!(profile.compliance_violations, 1);
        }
        // last price untouched on rejection
        let profile = ComplianceContract::get_security(&ctx, &SecurityId::new("SEC1")).unwrap();
        assert_eq!(profile.last_price, Price::from_u64(100));
    }

    #[test]
    fn test_check_runs_once_per_trade() {
        let mut store = MemoryStore::new();
        seed(&mut store, 10, trade("trade-B1-S1-0", 102, 100));
        {
            let mut ctx = tx(&mut store, regulator(), 2);
            ComplianceContract::perform_trade_check(&mut ctx, &TradeId::new("trade-B1-S1-0"), "AMMC")
                .unwrap();
            ctx.commit().unwrap();
        }
        let mut ctx = tx(&mut store, regulator(), 3);
        let err = ComplianceContract::perform_trade_check(
            &mut ctx,
            &TradeId::new("trade-B1-S1-0"),
            "AMMC",
        )
        .unwrap_err();
        // the trade already left pending; either guard is a conflict
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_check_requires_known_records() {
        let mut store = MemoryStore::new();
        {
            let mut ctx = tx(&mut store, regulator(), 0);
            ComplianceContract::import_trade(&mut ctx, trade("trade-B1-S1-0", 102, 100)).unwrap();
            ctx.commit().unwrap();
        }
        let mut ctx = tx(&mut store, regulator(), 1);
        let err = ComplianceContract::perform_trade_check(
            &mut ctx,
            &TradeId::new("trade-B1-S1-0"),
            "AMMC",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_manual_override_flips_trade() {
        let mut store = MemoryStore::new();
        seed(&mut store, 5, trade("trade-B1-S1-0", 110, 100));
        set_last_price(&mut store, 100);
        {
            let mut ctx = tx(&mut store, regulator(), 2);
            ComplianceContract::perform_trade_check(&mut ctx, &TradeId::new("trade-B1-S1-0"), "AMMC")
                .unwrap();
            ctx.commit().unwrap();
        }
        let check_id = CheckId::new("check-trade-B1-S1-0");
        {
            let mut ctx = tx(&mut store, regulator(), 3);
            ComplianceContract::manual_override(
                &mut ctx,
                &check_id,
                CheckStatus::Approved,
                "reviewed market conditions",
                "AMMC",
            )
            .unwrap();
            let event = ctx.commit().unwrap().unwrap();
            assert_eq!(event.name, "ComplianceCheckOverridden");
        }
        let ctx = tx(&mut store, regulator(), 4);
        let check = ComplianceContract::get_compliance_check(&ctx, &check_id).unwrap();
        assert_eq!(check.status, CheckStatus::Approved);
        assert_eq!(check.comments, "reviewed market conditions");
        let t = ComplianceContract::get_trade(&ctx, &TradeId::new("trade-B1-S1-0")).unwrap();
        assert_eq!(t.status, TradeStatus::Approved);
        // violation counters are not compensated by an override
        let broker = ComplianceContract::get_broker(&ctx, &BrokerId::new("broker1")).unwrap();
        assert_eq!(broker.compliance_violations, 1);
    }

    #[test]
    fn test_manual_override_rejection_gets_default_reason() {
        let mut store = MemoryStore::new();
        seed(&mut store, 10, trade("trade-B1-S1-0", 102, 100));
        {
            let mut ctx = tx(&mut store, regulator(), 2);
            ComplianceContract::perform_trade_check(&mut ctx, &TradeId::new("trade-B1-S1-0"), "AMMC")
                .unwrap();
            ctx.commit().unwrap();
        }
        let check_id = CheckId::new("check-trade-B1-S1-0");
        {
            let mut ctx = tx(&mut store, regulator(), 3);
            ComplianceContract::manual_override(
                &mut ctx,
                &check_id,
                CheckStatus::Rejected,
                "suspicious pattern",
                "AMMC",
            )
            .unwrap();
            ctx.commit().unwrap();
        }
        let ctx = tx(&mut store, regulator(), 4);
        let check = ComplianceContract::get_compliance_check(&ctx, &check_id).unwrap();
        assert_eq!(check.rejection_reason, "Manual rejection by regulator");
    }

    #[test]
    fn test_manual_override_rejects_pending_target() {
        let mut store = MemoryStore::new();
        seed(&mut store, 10, trade("trade-B1-S1-0", 102, 100));
        {
            let mut ctx = tx(&mut store, regulator(), 2);
            ComplianceContract::perform_trade_check(&mut ctx, &TradeId::new("trade-B1-S1-0"), "AMMC")
                .unwrap();
            ctx.commit().unwrap();
        }
        let mut ctx = tx(&mut store, regulator(), 3);
        let err = ComplianceContract::manual_override(
            &mut ctx,
            &CheckId::new("check-trade-B1-S1-0"),
            CheckStatus::Pending,
            "",
            "AMMC",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_duplicate_registrations_conflict() {
        let mut store = MemoryStore::new();
        seed(&mut store, 10, trade("trade-B1-S1-0", 102, 100));
        let mut ctx = tx(&mut store, regulator(), 2);
        let err = ComplianceContract::add_broker(
            &mut ctx,
            BrokerId::new("broker1"),
            "Atlas Capital",
            Decimal::from(1_000),
            RiskRating::Low,
        )
        .unwrap_err();
        assert!(matches!(err, ComplianceError::BrokerExists { .. }));
    }
}
