//! Custody operations of the settlement service
//!
//! Cash accounts, per-security holdings, guarantee deposits and the
//! central fund. Every movement of value appends a `Transaction` audit
//! record keyed by the host transaction id, so replays of the same block
//! produce identical keys.

use crate::errors::SettlementError;
use crate::settlement::SettlementContract;
use ledger::{StateStore, TxContext};
use rust_decimal::Decimal;
use tracing::debug;
use types::account::{
    BrokerCashAccount, GuaranteeDeposit, GuaranteeFund, SecuritiesAccount, GUARANTEE_FUND_KEY,
};
use types::ids::{BrokerId, SecurityId};
use types::settlement::{
    Transaction, TransactionStatus, TransactionType, TRANSACTION_KEY_END, TRANSACTION_KEY_START,
};

impl SettlementContract {
    // ───────────────────────── Cash accounts ─────────────────────────

    /// Open a cash account. Exchange, or the broker for itself.
    pub fn create_broker_account<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        broker_id: BrokerId,
        initial_balance: Decimal,
    ) -> Result<(), SettlementError> {
        require_act_for(ctx, &broker_id)?;
        if initial_balance < Decimal::ZERO {
            return Err(SettlementError::InvalidValue {
                message: "initial balance must not be negative".to_string(),
            });
        }
        let key = broker_id.cash_account_key();
        if ctx.exists(&key)? {
            return Err(SettlementError::AccountExists {
                broker_id: broker_id.to_string(),
            });
        }
        let account = BrokerCashAccount::new(broker_id, initial_balance, ctx.now_rfc3339());
        ctx.put_record(&key, &account)?;
        Ok(())
    }

    pub fn get_broker_account<S: StateStore>(
        ctx: &TxContext<'_, S>,
        broker_id: &BrokerId,
    ) -> Result<BrokerCashAccount, SettlementError> {
        require_view_of(ctx, broker_id)?;
        load_cash_account(ctx, broker_id)
    }

    /// Credit external funds into a broker's cash account, creating the
    /// account on first use.
    pub fn deposit_funds<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        broker_id: &BrokerId,
        amount: Decimal,
    ) -> Result<(), SettlementError> {
        require_act_for(ctx, broker_id)?;
        require_positive_amount(amount, "deposit amount must be positive")?;

        let now = ctx.now_rfc3339();
        let mut account = cash_account_or_new(ctx, broker_id, &now)?;
        account.balance += amount;
        account.last_updated = now.clone();
        ctx.put_record(&account.ledger_key(), &account)?;

        record_movement(
            ctx,
            TransactionType::Deposit,
            broker_id.as_str(),
            "external",
            broker_id.as_str(),
            "",
            amount,
            now,
        )?;
        Ok(())
    }

    /// Withdraw spendable funds. Reserved cash stays untouchable until
    /// its instruction executes or fails.
    pub fn withdraw_funds<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        broker_id: &BrokerId,
        amount: Decimal,
    ) -> Result<(), SettlementError> {
        require_act_for(ctx, broker_id)?;
        require_positive_amount(amount, "withdrawal amount must be positive")?;

        let mut account = load_cash_account(ctx, broker_id)?;
        if account.available() < amount {
            return Err(SettlementError::InsufficientFunds {
                broker_id: broker_id.to_string(),
                required: amount,
                available: account.available(),
            });
        }
        let now = ctx.now_rfc3339();
        account.balance -= amount;
        account.last_updated = now.clone();
        ctx.put_record(&account.ledger_key(), &account)?;

        record_movement(
            ctx,
            TransactionType::Withdrawal,
            broker_id.as_str(),
            broker_id.as_str(),
            "external",
            "",
            amount,
            now,
        )?;
        Ok(())
    }

    // ───────────────────────── Securities accounts ─────────────────────────

    /// Open a holdings account for one broker and security
    pub fn create_securities_account<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        broker_id: BrokerId,
        security_id: SecurityId,
        initial_quantity: u64,
    ) -> Result<(), SettlementError> {
        require_act_for(ctx, &broker_id)?;
        let key = broker_id.securities_account_key(&security_id);
        if ctx.exists(&key)? {
            return Err(SettlementError::SecuritiesAccountExists {
                broker_id: broker_id.to_string(),
                security_id: security_id.to_string(),
            });
        }
        let account =
            SecuritiesAccount::new(broker_id, security_id, initial_quantity, ctx.now_rfc3339());
        ctx.put_record(&key, &account)?;
        Ok(())
    }

    pub fn get_securities_account<S: StateStore>(
        ctx: &TxContext<'_, S>,
        broker_id: &BrokerId,
        security_id: &SecurityId,
    ) -> Result<SecuritiesAccount, SettlementError> {
        require_view_of(ctx, broker_id)?;
        load_securities_account(ctx, broker_id, security_id)
    }

    /// Credit externally delivered shares, creating the account on first
    /// use.
    pub fn deposit_securities<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        broker_id: &BrokerId,
        security_id: &SecurityId,
        quantity: u64,
    ) -> Result<(), SettlementError> {
        require_act_for(ctx, broker_id)?;
        if quantity == 0 {
            return Err(SettlementError::InvalidValue {
                message: "deposit quantity must be positive".to_string(),
            });
        }
        let now = ctx.now_rfc3339();
        let mut account = match ctx.get_record::<SecuritiesAccount>(
            &broker_id.securities_account_key(security_id),
        )? {
            Some(account) => account,
            None => SecuritiesAccount::new(broker_id.clone(), security_id.clone(), 0, now.as_str()),
        };
        account.quantity += quantity;
        account.last_updated = now.clone();
        ctx.put_record(&account.ledger_key().to_string(), &account)?;

        record_movement(
            ctx,
            TransactionType::SecurityDeposit,
            &format!("{broker_id}-{security_id}"),
            "external",
            broker_id.as_str(),
            security_id.as_str(),
            Decimal::from(quantity),
            now,
        )?;
        Ok(())
    }

    // ───────────────────────── Guarantee collateral ─────────────────────────

    /// Post an initial guarantee deposit; the amount also counts toward
    /// the mutualized fund total.
    pub fn create_guarantee_deposit<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        broker_id: BrokerId,
        initial_amount: Decimal,
    ) -> Result<(), SettlementError> {
        require_act_for(ctx, &broker_id)?;
        if initial_amount < Decimal::ZERO {
            return Err(SettlementError::InvalidValue {
                message: "initial amount must not be negative".to_string(),
            });
        }
        let key = broker_id.guarantee_deposit_key();
        if ctx.exists(&key)? {
            return Err(SettlementError::DepositExists {
                broker_id: broker_id.to_string(),
            });
        }
        let now = ctx.now_rfc3339();
        let deposit = GuaranteeDeposit::new(broker_id, initial_amount, now.as_str());
        ctx.put_record(&key, &deposit)?;

        let mut fund = load_fund(ctx)?;
        fund.total_amount += initial_amount;
        fund.last_updated = now;
        ctx.put_record(GUARANTEE_FUND_KEY, &fund)?;
        Ok(())
    }

    /// Move cash from the broker's account into its guarantee deposit
    pub fn deposit_guarantee<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        broker_id: &BrokerId,
        amount: Decimal,
    ) -> Result<(), SettlementError> {
        require_act_for(ctx, broker_id)?;
        require_positive_amount(amount, "deposit amount must be positive")?;

        let mut account = load_cash_account(ctx, broker_id)?;
        if account.balance < amount {
            return Err(SettlementError::InsufficientFunds {
                broker_id: broker_id.to_string(),
                required: amount,
                available: account.balance,
            });
        }
        let mut deposit = load_deposit(ctx, broker_id)?;
        let mut fund = load_fund(ctx)?;

        let now = ctx.now_rfc3339();
        account.balance -= amount;
        account.last_updated = now.clone();
        deposit.amount += amount;
        deposit.last_updated = now.clone();
        fund.total_amount += amount;
        fund.last_updated = now;

        ctx.put_record(&account.ledger_key(), &account)?;
        ctx.put_record(&deposit.ledger_key(), &deposit)?;
        ctx.put_record(GUARANTEE_FUND_KEY, &fund)?;
        debug!(broker_id = %broker_id, %amount, "guarantee deposit funded");
        Ok(())
    }

    pub fn get_guarantee_deposit<S: StateStore>(
        ctx: &TxContext<'_, S>,
        broker_id: &BrokerId,
    ) -> Result<GuaranteeDeposit, SettlementError> {
        require_view_of(ctx, broker_id)?;
        load_deposit(ctx, broker_id)
    }

    pub fn get_guarantee_fund<S: StateStore>(
        ctx: &TxContext<'_, S>,
    ) -> Result<GuaranteeFund, SettlementError> {
        load_fund(ctx)
    }

    // ───────────────────────── Audit trail ─────────────────────────

    /// All movements a broker was part of, in key order
    pub fn get_transaction_history<S: StateStore>(
        ctx: &TxContext<'_, S>,
        broker_id: &BrokerId,
    ) -> Result<Vec<Transaction>, SettlementError> {
        require_view_of(ctx, broker_id)?;
        let rows = ctx.range_records::<Transaction>(TRANSACTION_KEY_START, TRANSACTION_KEY_END)?;
        Ok(rows
            .into_iter()
            .map(|(_, transaction)| transaction)
            .filter(|transaction| {
                transaction.from_id == broker_id.as_str() || transaction.to_id == broker_id.as_str()
            })
            .collect())
    }
}

// ───────────────────────── Shared helpers ─────────────────────────

pub(crate) fn require_exchange<S: StateStore>(
    ctx: &TxContext<'_, S>,
    action: &str,
) -> Result<(), SettlementError> {
    if ctx.caller().is_exchange() {
        Ok(())
    } else {
        Err(SettlementError::Unauthorized {
            reason: format!("only the exchange is authorized to {action}"),
        })
    }
}

pub(crate) fn require_act_for<S: StateStore>(
    ctx: &TxContext<'_, S>,
    broker_id: &BrokerId,
) -> Result<(), SettlementError> {
    if ctx.caller().can_act_for(broker_id) {
        Ok(())
    } else {
        Err(SettlementError::Unauthorized {
            reason: "brokers can only operate their own accounts".to_string(),
        })
    }
}

pub(crate) fn require_view_of<S: StateStore>(
    ctx: &TxContext<'_, S>,
    broker_id: &BrokerId,
) -> Result<(), SettlementError> {
    let caller = ctx.caller();
    if caller.can_view_all() || caller.broker_id() == Some(broker_id) {
        Ok(())
    } else {
        Err(SettlementError::Unauthorized {
            reason: "not authorized to view this broker's accounts".to_string(),
        })
    }
}

fn require_positive_amount(amount: Decimal, message: &str) -> Result<(), SettlementError> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(SettlementError::InvalidValue {
            message: message.to_string(),
        })
    }
}

pub(crate) fn load_cash_account<S: StateStore>(
    ctx: &TxContext<'_, S>,
    broker_id: &BrokerId,
) -> Result<BrokerCashAccount, SettlementError> {
    ctx.get_record(&broker_id.cash_account_key())?
        .ok_or_else(|| SettlementError::AccountNotFound {
            broker_id: broker_id.to_string(),
        })
}

/// Load a cash account, or start a zero-balance one for brokers seen for
/// the first time on the receiving side of a transfer.
pub(crate) fn cash_account_or_new<S: StateStore>(
    ctx: &TxContext<'_, S>,
    broker_id: &BrokerId,
    now: &str,
) -> Result<BrokerCashAccount, SettlementError> {
    Ok(ctx
        .get_record(&broker_id.cash_account_key())?
        .unwrap_or_else(|| BrokerCashAccount::new(broker_id.clone(), Decimal::ZERO, now)))
}

pub(crate) fn load_securities_account<S: StateStore>(
    ctx: &TxContext<'_, S>,
    broker_id: &BrokerId,
    security_id: &SecurityId,
) -> Result<SecuritiesAccount, SettlementError> {
    ctx.get_record(&broker_id.securities_account_key(security_id))?
        .ok_or_else(|| SettlementError::SecuritiesAccountNotFound {
            broker_id: broker_id.to_string(),
            security_id: security_id.to_string(),
        })
}

pub(crate) fn load_deposit<S: StateStore>(
    ctx: &TxContext<'_, S>,
    broker_id: &BrokerId,
) -> Result<GuaranteeDeposit, SettlementError> {
    ctx.get_record(&broker_id.guarantee_deposit_key())?
        .ok_or_else(|| SettlementError::DepositNotFound {
            broker_id: broker_id.to_string(),
        })
}

pub(crate) fn load_fund<S: StateStore>(
    ctx: &TxContext<'_, S>,
) -> Result<GuaranteeFund, SettlementError> {
    ctx.get_record(GUARANTEE_FUND_KEY)?
        .ok_or(SettlementError::FundNotFound)
}

/// Append one audit record for a standalone account movement
#[allow(clippy::too_many_arguments)]
fn record_movement<S: StateStore>(
    ctx: &mut TxContext<'_, S>,
    kind: TransactionType,
    subject: &str,
    from: &str,
    to: &str,
    security_id: &str,
    amount: Decimal,
    timestamp: String,
) -> Result<(), SettlementError> {
    let transaction = Transaction {
        transaction_id: Transaction::movement_key(kind, subject, ctx.tx_id()),
        transaction_type: kind,
        from_id: from.to_string(),
        to_id: to.to_string(),
        security_id: security_id.to_string(),
        amount,
        instruction_id: String::new(),
        status: TransactionStatus::Completed,
        timestamp,
    };
    ctx.put_record(&transaction.ledger_key().to_string(), &transaction)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::settlement::SettlementContract;
    use ledger::{Caller, MemoryStore, Role, TxStamp};

    fn exchange() -> Caller {
        Caller::new("StockMarketMSP", Role::Exchange)
    }

    fn broker1() -> Caller {
        Caller::new("Broker1MSP", Role::broker("broker1"))
    }

    fn broker2() -> Caller {
        Caller::new("Broker2MSP", Role::broker("broker2"))
    }

    fn tx(store: &mut MemoryStore, caller: Caller, n: i64) -> TxContext<'_, MemoryStore> {
        TxContext::new(
            store,
            TxStamp::new(format!("tx-{n}"), 1_709_283_600 + n * 60, 0),
            caller,
        )
    }

    fn b1() -> BrokerId {
        BrokerId::new("broker1")
    }

    fn init_fund(store: &mut MemoryStore) {
        let mut ctx = tx(store, exchange(), 0);
        SettlementContract::init(&mut ctx).unwrap();
        ctx.commit().unwrap();
    }

    #[test]
    fn test_create_and_get_account() {
        let mut store = MemoryStore::new();
        {
            let mut ctx = tx(&mut store, broker1(), 1);
            SettlementContract::create_broker_account(&mut ctx, b1(), Decimal::from(1_000))
                .unwrap();
            ctx.commit().unwrap();
        }
        let ctx = tx(&mut store, broker1(), 2);
        let account = SettlementContract::get_broker_account(&ctx, &b1()).unwrap();
        assert_eq!(account.balance, Decimal::from(1_000));
        assert_eq!(account.reserved_balance, Decimal::ZERO);
    }

    #[test]
    fn test_broker_cannot_open_foreign_account() {
        let mut store = MemoryStore::new();
        let mut ctx = tx(&mut store, broker2(), 1);
        let err = SettlementContract::create_broker_account(&mut ctx, b1(), Decimal::ZERO)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_deposit_creates_account_and_audit_record() {
        let mut store = MemoryStore::new();
        {
            let mut ctx = tx(&mut store, broker1(), 1);
            SettlementContract::deposit_funds(&mut ctx, &b1(), Decimal::from(500)).unwrap();
            ctx.commit().unwrap();
        }
        let ctx = tx(&mut store, broker1(), 2);
        let account = SettlementContract::get_broker_account(&ctx, &b1()).unwrap();
        assert_eq!(account.balance, Decimal::from(500));

        let history = SettlementContract::get_transaction_history(&ctx, &b1()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].transaction_type, TransactionType::Deposit);
        assert_eq!(history[0].from_id, "external");
        assert_eq!(history[0].transaction_id, "transaction-deposit-broker1-tx-1");
    }

    #[test]
    fn test_withdraw_respects_reservations() {
        let mut store = MemoryStore::new();
        {
            let mut ctx = tx(&mut store, broker1(), 1);
            SettlementContract::deposit_funds(&mut ctx, &b1(), Decimal::from(1_000)).unwrap();
            ctx.commit().unwrap();
        }
        // reserve 800 by hand
        {
            let mut ctx = tx(&mut store, exchange(), 2);
            let mut account = load_cash_account(&ctx, &b1()).unwrap();
            account.reserved_balance = Decimal::from(800);
            ctx.put_record(&account.ledger_key(), &account).unwrap();
            ctx.commit().unwrap();
        }
        let mut ctx = tx(&mut store, broker1(), 3);
        let err =
            SettlementContract::withdraw_funds(&mut ctx, &b1(), Decimal::from(300)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

        SettlementContract::withdraw_funds(&mut ctx, &b1(), Decimal::from(200)).unwrap();
        ctx.commit().unwrap();

        let ctx = tx(&mut store, broker1(), 4);
        let account = SettlementContract::get_broker_account(&ctx, &b1()).unwrap();
        assert_eq!(account.balance, Decimal::from(800));
    }

    #[test]
    fn test_zero_amount_movements_rejected() {
        let mut store = MemoryStore::new();
        let mut ctx = tx(&mut store, broker1(), 1);
        let err = SettlementContract::deposit_funds(&mut ctx, &b1(), Decimal::ZERO).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = SettlementContract::deposit_securities(&mut ctx, &b1(), &SecurityId::new("SEC1"), 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_deposit_securities_accumulates() {
        let mut store = MemoryStore::new();
        let sec = SecurityId::new("SEC1");
        {
            let mut ctx = tx(&mut store, broker2(), 1);
            SettlementContract::deposit_securities(
                &mut ctx,
                &BrokerId::new("broker2"),
                &sec,
                300,
            )
            .unwrap();
            SettlementContract::deposit_securities(
                &mut ctx,
                &BrokerId::new("broker2"),
                &sec,
                200,
            )
            .unwrap();
            ctx.commit().unwrap();
        }
        let ctx = tx(&mut store, broker2(), 2);
        let account =
            SettlementContract::get_securities_account(&ctx, &BrokerId::new("broker2"), &sec)
                .unwrap();
        assert_eq!(account.quantity, 500);
        assert_eq!(account.reserved_qty, 0);
    }

    #[test]
    fn test_guarantee_deposit_flow() {
        let mut store = MemoryStore::new();
        init_fund(&mut store);
        {
            let mut ctx = tx(&mut store, broker1(), 1);
            SettlementContract::deposit_funds(&mut ctx, &b1(), Decimal::from(10_000)).unwrap();
            SettlementContract::create_guarantee_deposit(&mut ctx, b1(), Decimal::from(1_000))
                .unwrap();
            ctx.commit().unwrap();
        }
        {
            let mut ctx = tx(&mut store, broker1(), 2);
            SettlementContract::deposit_guarantee(&mut ctx, &b1(), Decimal::from(3_000)).unwrap();
            ctx.commit().unwrap();
        }
        let ctx = tx(&mut store, broker1(), 3);
        let deposit = SettlementContract::get_guarantee_deposit(&ctx, &b1()).unwrap();
        assert_eq!(deposit.amount, Decimal::from(4_000));
        let fund = SettlementContract::get_guarantee_fund(&ctx).unwrap();
        assert_eq!(fund.total_amount, Decimal::from(4_000));
        let account = SettlementContract::get_broker_account(&ctx, &b1()).unwrap();
        assert_eq!(account.balance, Decimal::from(7_000));
    }

    #[test]
    fn test_guarantee_deposit_needs_balance() {
        let mut store = MemoryStore::new();
        init_fund(&mut store);
        {
            let mut ctx = tx(&mut store, broker1(), 1);
            SettlementContract::deposit_funds(&mut ctx, &b1(), Decimal::from(100)).unwrap();
            SettlementContract::create_guarantee_deposit(&mut ctx, b1(), Decimal::ZERO).unwrap();
            ctx.commit().unwrap();
        }
        let mut ctx = tx(&mut store, broker1(), 2);
        let err = SettlementContract::deposit_guarantee(&mut ctx, &b1(), Decimal::from(200))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    }

    #[test]
    fn test_account_visibility() {
        let mut store = MemoryStore::new();
        {
            let mut ctx = tx(&mut store, broker1(), 1);
            SettlementContract::create_broker_account(&mut ctx, b1(), Decimal::from(100)).unwrap();
            ctx.commit().unwrap();
        }
        let ctx = tx(&mut store, broker2(), 2);
        let err = SettlementContract::get_broker_account(&ctx, &b1()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        drop(ctx);
        let ctx = tx(&mut store, exchange(), 3);
        assert!(SettlementContract::get_broker_account(&ctx, &b1()).is_ok());
    }

    #[test]
    fn test_transaction_history_filters_by_party() {
        let mut store = MemoryStore::new();
        {
            let mut ctx = tx(&mut store, exchange(), 1);
            SettlementContract::deposit_funds(&mut ctx, &b1(), Decimal::from(100)).unwrap();
            SettlementContract::deposit_funds(&mut ctx, &BrokerId::new("broker2"), Decimal::from(200))
                .unwrap();
            ctx.commit().unwrap();
        }
        let ctx = tx(&mut store, exchange(), 2);
        let history = SettlementContract::get_transaction_history(&ctx, &b1()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].to_id, "broker1");
    }
}
