//! Settlement contract: instruction lifecycle, DvP execution and the
//! guarantee-fund fallback
//!
//! An approved trade gets one settlement instruction that immediately
//! earmarks the buyer's cash and the seller's shares. On or after the T+3
//! date the instruction executes as a single atomic exchange of both
//! legs. A shortfall on either side never surfaces as an error: it is
//! converted into a compensation drawn from the defaulter's guarantee
//! deposit and then the shared fund.

use crate::accounts::{
    cash_account_or_new, load_cash_account, load_deposit, load_fund, load_securities_account,
    require_exchange,
};
use crate::errors::SettlementError;
use crate::events::{
    names, BatchSettlementReport, FailedInstruction, FailureReason, SettlementFailure,
};
use crate::matching::promote_filled_orders;
use chrono::DateTime;
use ledger::{StateStore, TxContext};
use rust_decimal::Decimal;
use tracing::{info, warn};
use types::account::{GuaranteeFund, SecuritiesAccount, GUARANTEE_FUND_KEY};
use types::ids::{InstructionId, TradeId, INSTRUCTION_KEY_PREFIX};
use types::settlement::{
    InstructionStatus, SettlementInstruction, Transaction, TransactionStatus, TransactionType,
};
use types::trade::{Trade, TradeStatus};

/// Days between instruction creation and its settlement date
const SETTLEMENT_CYCLE_DAYS: i64 = 3;

/// How one settlement attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Executed,
    Failed(FailureReason),
}

/// The settlement service. Instruction execution and failure processing
/// are exchange operations; brokers touch only their own accounts and
/// validations.
pub struct SettlementContract;

impl SettlementContract {
    /// Seed the guarantee fund singleton. Idempotent: an existing fund is
    /// left untouched.
    pub fn init<S: StateStore>(ctx: &mut TxContext<'_, S>) -> Result<(), SettlementError> {
        require_exchange(ctx, "initialize the settlement ledger")?;
        if ctx.exists(GUARANTEE_FUND_KEY)? {
            return Ok(());
        }
        let fund = GuaranteeFund {
            total_amount: Decimal::ZERO,
            last_updated: ctx.now_rfc3339(),
        };
        ctx.put_record(GUARANTEE_FUND_KEY, &fund)?;
        Ok(())
    }

    // ───────────────────────── Instruction lifecycle ─────────────────────────

    /// Create the settlement instruction for an approved trade and
    /// reserve both legs: the buyer's cash and the seller's shares.
    /// Checks run against *available* resources, so an earlier
    /// reservation cannot be double-spent by a later instruction.
    pub fn create_settlement_instruction<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        trade_id: &TradeId,
    ) -> Result<SettlementInstruction, SettlementError> {
        require_exchange(ctx, "create settlement instructions")?;

        let instruction_id = InstructionId::for_trade(trade_id);
        if ctx.exists(instruction_id.as_str())? {
            return Err(SettlementError::InstructionExists {
                trade_id: trade_id.to_string(),
            });
        }
        let trade = load_trade(ctx, trade_id)?;
        if trade.status != TradeStatus::Approved {
            return Err(SettlementError::TradeNotApproved {
                status: trade.status.to_string(),
            });
        }

        let now = ctx.now_rfc3339();
        let instruction = SettlementInstruction::for_trade(
            &trade,
            now.as_str(),
            ctx.rfc3339_in_days(SETTLEMENT_CYCLE_DAYS),
        );

        let mut buyer = cash_account_or_new(ctx, &trade.buy_broker_id, &now)?;
        if buyer.available() < instruction.total_amount {
            return Err(SettlementError::InsufficientFunds {
                broker_id: trade.buy_broker_id.to_string(),
                required: instruction.total_amount,
                available: buyer.available(),
            });
        }
        let mut seller_holdings =
            load_securities_account(ctx, &trade.sell_broker_id, &trade.security_id)?;
        if seller_holdings.available() < trade.quantity {
            return Err(SettlementError::InsufficientSecurities {
                broker_id: trade.sell_broker_id.to_string(),
                security_id: trade.security_id.to_string(),
                required: trade.quantity,
                available: seller_holdings.available(),
            });
        }

        buyer.reserved_balance += instruction.total_amount;
        buyer.last_updated = now.clone();
        seller_holdings.reserved_qty += trade.quantity;
        seller_holdings.last_updated = now;

        ctx.put_record(&buyer.ledger_key(), &buyer)?;
        ctx.put_record(&seller_holdings.ledger_key().to_string(), &seller_holdings)?;
        ctx.put_record(instruction.ledger_key(), &instruction)?;
        ctx.set_event(names::SETTLEMENT_INSTRUCTION_CREATED, &instruction)?;
        info!(instruction_id = %instruction.instruction_id, "settlement instruction created");
        Ok(instruction)
    }

    pub fn get_settlement_instruction<S: StateStore>(
        ctx: &TxContext<'_, S>,
        instruction_id: &InstructionId,
    ) -> Result<SettlementInstruction, SettlementError> {
        let instruction = load_instruction(ctx, instruction_id)?;
        let caller = ctx.caller();
        let is_party = caller.broker_id() == Some(&instruction.buy_broker_id)
            || caller.broker_id() == Some(&instruction.sell_broker_id);
        if caller.can_view_all() || is_party {
            Ok(instruction)
        } else {
            Err(SettlementError::Unauthorized {
                reason: "not authorized to view this instruction".to_string(),
            })
        }
    }

    /// Instructions still eligible for execution. Exchange and regulator
    /// only.
    pub fn get_pending_settlement_instructions<S: StateStore>(
        ctx: &TxContext<'_, S>,
    ) -> Result<Vec<SettlementInstruction>, SettlementError> {
        if !ctx.caller().can_view_all() {
            return Err(SettlementError::Unauthorized {
                reason: "not authorized to list instructions".to_string(),
            });
        }
        let rows =
            ctx.range_records::<SettlementInstruction>(INSTRUCTION_KEY_PREFIX, "instruction-~")?;
        Ok(rows
            .into_iter()
            .map(|(_, instruction)| instruction)
            .filter(|instruction| instruction.status.is_open())
            .collect())
    }

    /// Acknowledge a pending instruction. Exchange or either party.
    pub fn validate_settlement_instruction<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        instruction_id: &InstructionId,
    ) -> Result<(), SettlementError> {
        let mut instruction = load_instruction(ctx, instruction_id)?;
        let authorized = ctx.caller().is_exchange()
            || ctx.caller().can_act_for(&instruction.buy_broker_id)
            || ctx.caller().can_act_for(&instruction.sell_broker_id);
        if !authorized {
            return Err(SettlementError::Unauthorized {
                reason: "not authorized to validate this instruction".to_string(),
            });
        }
        if instruction.status != InstructionStatus::Pending {
            return Err(SettlementError::InvalidInstructionTransition {
                from: instruction.status.to_string(),
                to: InstructionStatus::Validated.to_string(),
            });
        }
        instruction.status = InstructionStatus::Validated;
        ctx.put_record(&instruction.ledger_key().to_string(), &instruction)?;
        ctx.set_event(names::SETTLEMENT_INSTRUCTION_VALIDATED, &instruction)?;
        Ok(())
    }

    // ───────────────────────── Execution (DvP) ─────────────────────────

    /// Execute the delivery-versus-payment exchange for one instruction.
    /// Exchange only. A shortfall on either side routes into failure
    /// processing instead of erroring.
    pub fn execute_settlement<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        instruction_id: &InstructionId,
    ) -> Result<SettlementOutcome, SettlementError> {
        require_exchange(ctx, "execute settlements")?;
        run_settlement(ctx, instruction_id, true)
    }

    /// Convert a settlement failure into guarantee compensation. Exchange
    /// only. Public so operations can fail an instruction that is known
    /// to be unfulfillable without attempting execution first.
    pub fn process_fail<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        instruction_id: &InstructionId,
        failure_reason: FailureReason,
    ) -> Result<(), SettlementError> {
        require_exchange(ctx, "process settlement failures")?;
        let instruction = load_instruction(ctx, instruction_id)?;
        process_fail_inner(ctx, instruction, failure_reason, true)?;
        Ok(())
    }

    /// Execute every open instruction whose settlement date has arrived.
    /// Exchange only. One bad instruction never aborts the batch: its
    /// writes are rolled back to a checkpoint and the sweep continues.
    /// The run reports through a single aggregate event.
    pub fn batch_settlement<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
    ) -> Result<BatchSettlementReport, SettlementError> {
        require_exchange(ctx, "run batch settlement")?;
        let now = ctx.now();
        let open = Self::get_pending_settlement_instructions(ctx)?;

        let mut report = BatchSettlementReport {
            executed: Vec::new(),
            failed: Vec::new(),
            processed_at: ctx.now_rfc3339(),
        };

        for instruction in open {
            let due = match DateTime::parse_from_rfc3339(&instruction.settlement_date) {
                Ok(date) => date.with_timezone(&chrono::Utc) <= now,
                Err(_) => false,
            };
            if !due {
                continue;
            }

            let checkpoint = ctx.checkpoint();
            match run_settlement(ctx, &instruction.instruction_id, false) {
                Ok(SettlementOutcome::Executed) => {
                    report.executed.push(instruction.instruction_id.clone());
                }
                Ok(SettlementOutcome::Failed(failure_reason)) => {
                    report.failed.push(FailedInstruction {
                        instruction_id: instruction.instruction_id.clone(),
                        failure_reason,
                    });
                }
                Err(error) => {
                    ctx.revert_to(checkpoint);
                    warn!(
                        instruction_id = %instruction.instruction_id,
                        %error,
                        "batch settlement skipped instruction"
                    );
                }
            }
        }

        if !report.executed.is_empty() || !report.failed.is_empty() {
            ctx.set_event(names::BATCH_SETTLEMENT_COMPLETED, &report)?;
        }
        Ok(report)
    }
}

// ───────────────────────── Execution internals ─────────────────────────

/// One settlement attempt. When `emit` is false (batch mode) no event is
/// staged; the batch reports in aggregate.
fn run_settlement<S: StateStore>(
    ctx: &mut TxContext<'_, S>,
    instruction_id: &InstructionId,
    emit: bool,
) -> Result<SettlementOutcome, SettlementError> {
    let mut instruction = load_instruction(ctx, instruction_id)?;
    if !instruction.status.is_open() {
        return Err(SettlementError::InvalidInstructionTransition {
            from: instruction.status.to_string(),
            to: InstructionStatus::Completed.to_string(),
        });
    }

    let now = ctx.now_rfc3339();

    // Cash leg pre-check
    let mut buyer = load_cash_account(ctx, &instruction.buy_broker_id)?;
    if buyer.balance < instruction.total_amount {
        let failure = process_fail_inner(
            ctx,
            instruction,
            FailureReason::BuyerInsufficientFunds,
            emit,
        )?;
        return Ok(SettlementOutcome::Failed(failure.failure_reason));
    }

    // Securities leg pre-check
    let mut seller_holdings =
        load_securities_account(ctx, &instruction.sell_broker_id, &instruction.security_id)?;
    if seller_holdings.quantity < instruction.quantity {
        let failure = process_fail_inner(
            ctx,
            instruction,
            FailureReason::SellerInsufficientSecurities,
            emit,
        )?;
        return Ok(SettlementOutcome::Failed(failure.failure_reason));
    }

    let mut seller = cash_account_or_new(ctx, &instruction.sell_broker_id, &now)?;
    let mut buyer_holdings = match ctx.get_record::<SecuritiesAccount>(
        &instruction.buy_broker_id.securities_account_key(&instruction.security_id),
    )? {
        Some(account) => account,
        None => SecuritiesAccount::new(
            instruction.buy_broker_id.clone(),
            instruction.security_id.clone(),
            0,
            now.as_str(),
        ),
    };

    // Cash leg
    buyer.balance -= instruction.total_amount;
    buyer.reserved_balance -= instruction.total_amount;
    buyer.last_updated = now.clone();
    seller.balance += instruction.total_amount;
    seller.last_updated = now.clone();

    // Securities leg
    seller_holdings.quantity -= instruction.quantity;
    seller_holdings.reserved_qty -= instruction.quantity;
    seller_holdings.last_updated = now.clone();
    buyer_holdings.quantity += instruction.quantity;
    buyer_holdings.last_updated = now.clone();

    let cash_leg = Transaction {
        transaction_id: Transaction::settlement_leg_key(
            TransactionType::Cash,
            &instruction.instruction_id,
        ),
        transaction_type: TransactionType::Cash,
        from_id: instruction.buy_broker_id.to_string(),
        to_id: instruction.sell_broker_id.to_string(),
        security_id: String::new(),
        amount: instruction.total_amount,
        instruction_id: instruction.instruction_id.to_string(),
        status: TransactionStatus::Completed,
        timestamp: now.clone(),
    };
    let securities_leg = Transaction {
        transaction_id: Transaction::settlement_leg_key(
            TransactionType::Security,
            &instruction.instruction_id,
        ),
        transaction_type: TransactionType::Security,
        from_id: instruction.sell_broker_id.to_string(),
        to_id: instruction.buy_broker_id.to_string(),
        security_id: instruction.security_id.to_string(),
        amount: Decimal::from(instruction.quantity),
        instruction_id: instruction.instruction_id.to_string(),
        status: TransactionStatus::Completed,
        timestamp: now.clone(),
    };

    instruction.status = InstructionStatus::Completed;
    instruction.completed_at = now.clone();

    let mut trade = load_trade(ctx, &instruction.trade_id)?;
    if !trade.status.can_transition_to(TradeStatus::Settled) {
        return Err(SettlementError::InvalidTradeTransition {
            from: trade.status.to_string(),
            to: TradeStatus::Settled.to_string(),
        });
    }
    trade.status = TradeStatus::Settled;

    ctx.put_record(&buyer.ledger_key(), &buyer)?;
    ctx.put_record(&seller.ledger_key(), &seller)?;
    ctx.put_record(&seller_holdings.ledger_key().to_string(), &seller_holdings)?;
    ctx.put_record(&buyer_holdings.ledger_key().to_string(), &buyer_holdings)?;
    ctx.put_record(&cash_leg.ledger_key().to_string(), &cash_leg)?;
    ctx.put_record(&securities_leg.ledger_key().to_string(), &securities_leg)?;
    ctx.put_record(&instruction.ledger_key().to_string(), &instruction)?;
    ctx.put_record(&trade.ledger_key().to_string(), &trade)?;
    promote_filled_orders(ctx, &trade)?;

    if emit {
        ctx.set_event(names::SETTLEMENT_EXECUTED, &instruction)?;
    }
    info!(instruction_id = %instruction.instruction_id, "settlement executed");
    Ok(SettlementOutcome::Executed)
}

/// Failure processing: mark the instruction failed, draw compensation
/// from the defaulter's deposit then the shared fund, credit the
/// counterparty, release both legs' reservations and record the
/// compensation movement.
fn process_fail_inner<S: StateStore>(
    ctx: &mut TxContext<'_, S>,
    mut instruction: SettlementInstruction,
    failure_reason: FailureReason,
    emit: bool,
) -> Result<SettlementFailure, SettlementError> {
    if !instruction.status.can_transition_to(InstructionStatus::Failed) {
        return Err(SettlementError::InvalidInstructionTransition {
            from: instruction.status.to_string(),
            to: InstructionStatus::Failed.to_string(),
        });
    }
    let now = ctx.now_rfc3339();
    instruction.status = InstructionStatus::Failed;
    instruction.completed_at = now.clone();
    ctx.put_record(&instruction.ledger_key().to_string(), &instruction)?;

    let (defaulter, counterparty) = match failure_reason {
        FailureReason::BuyerInsufficientFunds => (
            instruction.buy_broker_id.clone(),
            instruction.sell_broker_id.clone(),
        ),
        FailureReason::SellerInsufficientSecurities => (
            instruction.sell_broker_id.clone(),
            instruction.buy_broker_id.clone(),
        ),
    };

    // Cash value of the defaulted leg
    let amount_needed = match failure_reason {
        FailureReason::BuyerInsufficientFunds => instruction.total_amount,
        FailureReason::SellerInsufficientSecurities => {
            instruction.price.notional(instruction.quantity)
        }
    };

    // Deposit first, the shared fund for the remainder
    let mut deposit = load_deposit(ctx, &defaulter)?;
    let mut fund = load_fund(ctx)?;
    let from_deposit = deposit.amount.min(amount_needed);
    let from_fund = amount_needed - from_deposit;
    deposit.amount -= from_deposit;
    deposit.last_updated = now.clone();
    fund.total_amount -= from_fund;
    fund.last_updated = now.clone();
    ctx.put_record(&deposit.ledger_key(), &deposit)?;
    ctx.put_record(GUARANTEE_FUND_KEY, &fund)?;

    release_reservations(ctx, &instruction, &now)?;

    let mut counterparty_account = cash_account_or_new(ctx, &counterparty, &now)?;
    counterparty_account.balance += amount_needed;
    counterparty_account.last_updated = now.clone();
    ctx.put_record(&counterparty_account.ledger_key(), &counterparty_account)?;

    let compensation = Transaction {
        transaction_id: Transaction::settlement_leg_key(
            TransactionType::Compensation,
            &instruction.instruction_id,
        ),
        transaction_type: TransactionType::Compensation,
        from_id: "guarantee".to_string(),
        to_id: counterparty.to_string(),
        security_id: String::new(),
        amount: amount_needed,
        instruction_id: instruction.instruction_id.to_string(),
        status: TransactionStatus::Completed,
        timestamp: now.clone(),
    };
    ctx.put_record(&compensation.ledger_key().to_string(), &compensation)?;

    let failure = SettlementFailure {
        instruction_id: instruction.instruction_id.clone(),
        failure_reason,
        defaulting_broker: defaulter,
        counterparty,
        compensation_amount: amount_needed,
        timestamp: now,
    };
    warn!(
        instruction_id = %failure.instruction_id,
        reason = %failure.failure_reason,
        amount = %failure.compensation_amount,
        "settlement failed, counterparty compensated"
    );
    if emit {
        ctx.set_event(names::SETTLEMENT_FAILED, &failure)?;
    }
    Ok(failure)
}

/// A dead instruction releases the earmarks it created on both legs.
/// Clamped, because the defaulting side's account may already be
/// inconsistent with its reservation.
fn release_reservations<S: StateStore>(
    ctx: &mut TxContext<'_, S>,
    instruction: &SettlementInstruction,
    now: &str,
) -> Result<(), SettlementError> {
    if let Ok(mut buyer) = load_cash_account(ctx, &instruction.buy_broker_id) {
        buyer.reserved_balance -= instruction.total_amount.min(buyer.reserved_balance);
        buyer.last_updated = now.to_string();
        ctx.put_record(&buyer.ledger_key(), &buyer)?;
    }
    if let Ok(mut holdings) =
        load_securities_account(ctx, &instruction.sell_broker_id, &instruction.security_id)
    {
        holdings.reserved_qty -= instruction.quantity.min(holdings.reserved_qty);
        holdings.last_updated = now.to_string();
        ctx.put_record(&holdings.ledger_key().to_string(), &holdings)?;
    }
    Ok(())
}

fn load_instruction<S: StateStore>(
    ctx: &TxContext<'_, S>,
    instruction_id: &InstructionId,
) -> Result<SettlementInstruction, SettlementError> {
    ctx.get_record(instruction_id.as_str())?
        .ok_or_else(|| SettlementError::InstructionNotFound {
            instruction_id: instruction_id.to_string(),
        })
}

fn load_trade<S: StateStore>(
    ctx: &TxContext<'_, S>,
    trade_id: &TradeId,
) -> Result<Trade, SettlementError> {
    ctx.get_record(trade_id.as_str())?
        .ok_or_else(|| SettlementError::TradeNotFound {
            trade_id: trade_id.to_string(),
        })
}
