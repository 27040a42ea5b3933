//! Order matching contract
//!
//! Owns securities, orders and trades. Matching is a continuous double
//! auction with price–time priority: buys sweep the book best-price
//! first, crossing against the lowest-priced resting sells, and every
//! trade executes at the resting sell order's price.

use crate::errors::MatchingError;
use crate::events::{names, MatchReport, SettlementInitiation};
use ledger::{LedgerError, StateStore, TxContext};
use tracing::{debug, info};
use types::ids::{OrderId, SecurityId, TradeId, TRADE_KEY_PREFIX};
use types::numeric::Price;
use types::order::{Order, OrderStatus, Side};
use types::security::{Security, SecurityStatus};
use types::trade::{Trade, TradeStatus};

/// The matching service. All operations run against the caller's
/// transaction context; state-changing ones are restricted by the
/// caller's attested role.
pub struct MatchingContract;

impl MatchingContract {
    // ───────────────────────── Securities ─────────────────────────

    /// List a new security. Exchange only.
    pub fn create_security<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        security_id: SecurityId,
        symbol: &str,
        issuer_id: types::ids::BrokerId,
        name: &str,
        total_shares: u64,
        initial_price: Price,
    ) -> Result<(), MatchingError> {
        require_exchange(ctx, "create securities")?;
        if ctx.exists(security_id.as_str())? {
            return Err(MatchingError::SecurityExists {
                security_id: security_id.to_string(),
            });
        }
        let security = Security::new(
            security_id,
            symbol,
            issuer_id,
            name,
            total_shares,
            initial_price,
            ctx.now_rfc3339(),
        );
        ctx.put_record(&security.ledger_key().to_string(), &security)?;
        Ok(())
    }

    pub fn get_security<S: StateStore>(
        ctx: &TxContext<'_, S>,
        security_id: &SecurityId,
    ) -> Result<Security, MatchingError> {
        load_security(ctx, security_id)
    }

    /// Every security on the book, in key order
    pub fn get_all_securities<S: StateStore>(
        ctx: &TxContext<'_, S>,
    ) -> Result<Vec<Security>, MatchingError> {
        let rows = ctx.range_records::<Security>("", "")?;
        Ok(rows.into_iter().map(|(_, security)| security).collect())
    }

    /// Change a security's listing status. Exchange only.
    pub fn update_security_status<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        security_id: &SecurityId,
        new_status: SecurityStatus,
    ) -> Result<(), MatchingError> {
        require_exchange(ctx, "update security status")?;
        let mut security = load_security(ctx, security_id)?;
        security.status = new_status;
        security.last_update_time = ctx.now_rfc3339();
        ctx.put_record(security_id.as_str(), &security)?;
        Ok(())
    }

    // ───────────────────────── Orders ─────────────────────────

    /// Submit an order. Brokers may only submit for themselves; the
    /// exchange may submit for any broker.
    pub fn create_order<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        order_id: OrderId,
        broker_id: types::ids::BrokerId,
        security_id: SecurityId,
        side: Side,
        quantity: u64,
        price: Price,
    ) -> Result<(), MatchingError> {
        if !ctx.caller().can_act_for(&broker_id) {
            return Err(MatchingError::Unauthorized {
                reason: "brokers can only submit orders for themselves".to_string(),
            });
        }
        if quantity == 0 {
            return Err(MatchingError::InvalidValue {
                message: "quantity must be positive".to_string(),
            });
        }
        if price.is_zero() {
            return Err(MatchingError::InvalidValue {
                message: "price must be positive".to_string(),
            });
        }
        if ctx.exists(order_id.as_str())? {
            return Err(MatchingError::OrderExists {
                order_id: order_id.to_string(),
            });
        }
        let security = load_security(ctx, &security_id)?;
        if !security.is_active() {
            return Err(MatchingError::SecurityNotActive {
                security_id: security_id.to_string(),
            });
        }

        let order = Order::new(
            order_id,
            broker_id,
            security_id,
            side,
            quantity,
            price,
            ctx.now_rfc3339(),
        );
        debug!(order_id = %order.order_id, side = ?order.side, quantity, "order accepted");
        ctx.put_record(&order.ledger_key().to_string(), &order)?;
        ctx.set_event(names::ORDER_CREATED, &order)?;
        Ok(())
    }

    /// Read an order. Exchange and regulator see all orders; a broker
    /// only its own.
    pub fn get_order<S: StateStore>(
        ctx: &TxContext<'_, S>,
        order_id: &OrderId,
    ) -> Result<Order, MatchingError> {
        let order = load_order(ctx, order_id)?;
        let caller = ctx.caller();
        if caller.can_view_all() || caller.broker_id() == Some(&order.broker_id) {
            Ok(order)
        } else {
            Err(MatchingError::Unauthorized {
                reason: "not authorized to view this order".to_string(),
            })
        }
    }

    /// Cancel a pending order. The exchange may cancel any order; a
    /// broker only its own.
    pub fn cancel_order<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        order_id: &OrderId,
    ) -> Result<(), MatchingError> {
        let mut order = load_order(ctx, order_id)?;
        if !ctx.caller().can_act_for(&order.broker_id) {
            return Err(MatchingError::Unauthorized {
                reason: "not authorized to cancel this order".to_string(),
            });
        }
        if order.status != OrderStatus::Pending {
            return Err(MatchingError::OrderNotPending {
                status: order.status.to_string(),
            });
        }
        order.status = OrderStatus::Canceled;
        order.update_time = ctx.now_rfc3339();
        ctx.put_record(order_id.as_str(), &order)?;
        ctx.set_event(names::ORDER_CANCELED, &order)?;
        Ok(())
    }

    /// Open orders (pending, quantity left) for one security
    pub fn get_open_orders_by_security<S: StateStore>(
        ctx: &TxContext<'_, S>,
        security_id: &SecurityId,
    ) -> Result<Vec<Order>, MatchingError> {
        let rows = ctx.range_records::<Order>("", "")?;
        Ok(rows
            .into_iter()
            .map(|(_, order)| order)
            .filter(|order| order.security_id == *security_id && order.is_open())
            .collect())
    }

    /// All orders of one broker, any status
    pub fn get_orders_by_broker<S: StateStore>(
        ctx: &TxContext<'_, S>,
        broker_id: &types::ids::BrokerId,
    ) -> Result<Vec<Order>, MatchingError> {
        require_view_of(ctx, broker_id)?;
        let rows = ctx.range_records::<Order>("", "")?;
        Ok(rows
            .into_iter()
            .map(|(_, order)| order)
            .filter(|order| order.broker_id == *broker_id)
            .collect())
    }

    // ───────────────────────── Matching ─────────────────────────

    /// Run one matching sweep over a security's open orders. Exchange
    /// only.
    ///
    /// Buys sort by price descending then submission time ascending;
    /// sells by price ascending then submission time ascending. Both
    /// sorts are stable, so equal keys keep their key-order sequence and
    /// the sweep is fully deterministic. Re-running on a book with no
    /// crossing orders writes nothing.
    ///
    /// All trades of the sweep go out in a single aggregate
    /// `OrdersMatched` event; the host accepts only one event per
    /// transaction.
    pub fn match_orders<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        security_id: &SecurityId,
    ) -> Result<Vec<Trade>, MatchingError> {
        require_exchange(ctx, "match orders")?;
        let mut security = load_security(ctx, security_id)?;

        let open = Self::get_open_orders_by_security(ctx, security_id)?;
        let (mut buys, mut sells): (Vec<Order>, Vec<Order>) =
            open.into_iter().partition(|order| order.side == Side::Buy);

        buys.sort_by(|a, b| {
            b.price
                .cmp(&a.price)
                .then_with(|| a.create_time.cmp(&b.create_time))
        });
        sells.sort_by(|a, b| {
            a.price
                .cmp(&b.price)
                .then_with(|| a.create_time.cmp(&b.create_time))
        });

        let now = ctx.now_rfc3339();
        let mut trades = Vec::new();

        for buy in buys.iter_mut() {
            if buy.remaining_qty == 0 {
                continue;
            }
            for sell in sells.iter_mut() {
                if sell.remaining_qty == 0 {
                    continue;
                }
                if buy.price < sell.price {
                    continue;
                }

                let quantity = buy.remaining_qty.min(sell.remaining_qty);
                let trade = Trade {
                    trade_id: TradeId::for_match(&buy.order_id, &sell.order_id, trades.len()),
                    buy_order_id: buy.order_id.clone(),
                    sell_order_id: sell.order_id.clone(),
                    buy_broker_id: buy.broker_id.clone(),
                    sell_broker_id: sell.broker_id.clone(),
                    security_id: security_id.clone(),
                    quantity,
                    // Resting sell price: improvement goes to the buyer
                    price: sell.price,
                    status: TradeStatus::Pending,
                    match_time: now.clone(),
                };
                ctx.put_record(&trade.ledger_key().to_string(), &trade)?;

                buy.fill(quantity, now.as_str());
                sell.fill(quantity, now.as_str());
                ctx.put_record(buy.ledger_key(), &*buy)?;
                ctx.put_record(sell.ledger_key(), &*sell)?;

                security.record_price(trade.price, now.as_str());

                debug!(trade_id = %trade.trade_id, quantity, price = %trade.price, "orders crossed");
                trades.push(trade);

                if buy.remaining_qty == 0 {
                    break;
                }
            }
        }

        if !trades.is_empty() {
            ctx.put_record(security_id.as_str(), &security)?;
            let report = MatchReport {
                security_id: security_id.clone(),
                trades: trades.clone(),
                matched_at: now,
            };
            ctx.set_event(names::ORDERS_MATCHED, &report)?;
        }
        info!(security_id = %security_id, trades = trades.len(), "matching sweep finished");
        Ok(trades)
    }

    // ───────────────────────── Trades ─────────────────────────

    /// Read a trade. Exchange and regulator see all trades; a broker
    /// only trades it is party to.
    pub fn get_trade<S: StateStore>(
        ctx: &TxContext<'_, S>,
        trade_id: &TradeId,
    ) -> Result<Trade, MatchingError> {
        let trade = load_trade(ctx, trade_id)?;
        let caller = ctx.caller();
        let is_party = caller.broker_id() == Some(&trade.buy_broker_id)
            || caller.broker_id() == Some(&trade.sell_broker_id);
        if caller.can_view_all() || is_party {
            Ok(trade)
        } else {
            Err(MatchingError::Unauthorized {
                reason: "not authorized to view this trade".to_string(),
            })
        }
    }

    /// All trades a broker is party to
    pub fn get_trades_by_broker<S: StateStore>(
        ctx: &TxContext<'_, S>,
        broker_id: &types::ids::BrokerId,
    ) -> Result<Vec<Trade>, MatchingError> {
        require_view_of(ctx, broker_id)?;
        let rows = ctx.range_records::<Trade>(TRADE_KEY_PREFIX, "trade-~")?;
        Ok(rows
            .into_iter()
            .map(|(_, trade)| trade)
            .filter(|trade| {
                trade.buy_broker_id == *broker_id || trade.sell_broker_id == *broker_id
            })
            .collect())
    }

    /// All trades with a given status. Exchange and regulator only.
    pub fn get_all_trades_by_status<S: StateStore>(
        ctx: &TxContext<'_, S>,
        status: TradeStatus,
    ) -> Result<Vec<Trade>, MatchingError> {
        if !ctx.caller().can_view_all() {
            return Err(MatchingError::Unauthorized {
                reason: "not authorized to list trades".to_string(),
            });
        }
        let rows = ctx.range_records::<Trade>(TRADE_KEY_PREFIX, "trade-~")?;
        Ok(rows
            .into_iter()
            .map(|(_, trade)| trade)
            .filter(|trade| trade.status == status)
            .collect())
    }

    /// Move a trade through its state machine. Exchange only. Settling a
    /// trade promotes its fully-filled orders to executed.
    pub fn update_trade_status<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        trade_id: &TradeId,
        new_status: TradeStatus,
    ) -> Result<(), MatchingError> {
        require_exchange(ctx, "update trade status")?;
        let mut trade = load_trade(ctx, trade_id)?;
        if !trade.status.can_transition_to(new_status) {
            return Err(MatchingError::InvalidTradeTransition {
                from: trade.status.to_string(),
                to: new_status.to_string(),
            });
        }
        trade.status = new_status;
        ctx.put_record(trade_id.as_str(), &trade)?;

        if new_status == TradeStatus::Settled {
            promote_filled_orders(ctx, &trade)?;
        }
        ctx.set_event(names::TRADE_STATUS_UPDATED, &trade)?;
        Ok(())
    }

    /// Announce that a pending trade is ready for the compliance and
    /// settlement pipeline. Mutates nothing; downstream services pick the
    /// handoff up from the event.
    pub fn initiate_settlement<S: StateStore>(
        ctx: &mut TxContext<'_, S>,
        trade_id: &TradeId,
    ) -> Result<(), MatchingError> {
        let trade = load_trade(ctx, trade_id)?;
        if trade.status != TradeStatus::Pending {
            return Err(MatchingError::TradeNotPending {
                trade_id: trade_id.to_string(),
            });
        }
        let initiation = SettlementInitiation {
            trade_id: trade.trade_id.clone(),
            buy_broker_id: trade.buy_broker_id.clone(),
            sell_broker_id: trade.sell_broker_id.clone(),
            security_id: trade.security_id.clone(),
            quantity: trade.quantity,
            price: trade.price,
            initiated_at: ctx.now_rfc3339(),
        };
        ctx.set_event(names::SETTLEMENT_INITIATED, &initiation)?;
        Ok(())
    }
}

/// Promote a settled trade's orders to executed once nothing of them
/// remains on the book. Trades imported from another ledger may have no
/// order records behind them; those are left alone.
pub(crate) fn promote_filled_orders<S: StateStore>(
    ctx: &mut TxContext<'_, S>,
    trade: &Trade,
) -> Result<(), LedgerError> {
    for order_id in [&trade.buy_order_id, &trade.sell_order_id] {
        if let Some(mut order) = ctx.get_record::<Order>(order_id.as_str())? {
            if order.remaining_qty == 0 && order.status.can_transition_to(OrderStatus::Executed) {
                order.status = OrderStatus::Executed;
                order.update_time = ctx.now_rfc3339();
                ctx.put_record(order_id.as_str(), &order)?;
            }
        }
    }
    Ok(())
}

// ───────────────────────── Helpers ─────────────────────────

fn require_exchange<S: StateStore>(
    ctx: &TxContext<'_, S>,
    action: &str,
) -> Result<(), MatchingError> {
    if ctx.caller().is_exchange() {
        Ok(())
    } else {
        Err(MatchingError::Unauthorized {
            reason: format!("only the exchange is authorized to {action}"),
        })
    }
}

fn require_view_of<S: StateStore>(
    ctx: &TxContext<'_, S>,
    broker_id: &types::ids::BrokerId,
) -> Result<(), MatchingError> {
    let caller = ctx.caller();
    if caller.can_view_all() || caller.broker_id() == Some(broker_id) {
        Ok(())
    } else {
        Err(MatchingError::Unauthorized {
            reason: "not authorized to view this broker's records".to_string(),
        })
    }
}

fn load_security<S: StateStore>(
    ctx: &TxContext<'_, S>,
    security_id: &SecurityId,
) -> Result<Security, MatchingError> {
    ctx.get_record(security_id.as_str())?
        .ok_or_else(|| MatchingError::SecurityNotFound {
            security_id: security_id.to_string(),
        })
}

fn load_order<S: StateStore>(
    ctx: &TxContext<'_, S>,
    order_id: &OrderId,
) -> Result<Order, MatchingError> {
    ctx.get_record(order_id.as_str())?
        .ok_or_else(|| MatchingError::OrderNotFound {
            order_id: order_id.to_string(),
        })
}

fn load_trade<S: StateStore>(
    ctx: &TxContext<'_, S>,
    trade_id: &TradeId,
) -> Result<Trade, MatchingError> {
    ctx.get_record(trade_id.as_str())?
        .ok_or_else(|| MatchingError::TradeNotFound {
            trade_id: trade_id.to_string(),
        })
}
