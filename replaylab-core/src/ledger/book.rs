//! Ledger: pending orders, positions, cash and the equity series.
//!
//! A replay sequence holds one symbol, so `process_orders` evaluates every
//! pending order against the bar it is given. Position and price maps are
//! `BTreeMap`s so sums and iteration are order-stable across runs.

use super::fill;
use crate::config::EngineConfig;
use crate::domain::{
    Bar, EquityPoint, OcoGroupId, Order, OrderId, OrderKind, OrderRole, OrderStatus, Position,
    Side, Signal, Trade, TradeReason, FLAT_EPSILON,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("invalid quantity {quantity} for {symbol}")]
    InvalidQuantity { symbol: String, quantity: f64 },

    #[error("no tradable reference price for {0}")]
    NoReferencePrice(String),

    #[error("{kind:?} order for {symbol} requires a {field}")]
    MissingPrice {
        symbol: String,
        kind: OrderKind,
        field: &'static str,
    },
}

/// Order book plus portfolio accounting for one replay.
#[derive(Debug, Clone)]
pub struct Ledger {
    config: EngineConfig,
    cash: f64,
    positions: BTreeMap<String, Position>,
    orders: Vec<Order>,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    last_prices: BTreeMap<String, f64>,
    peak_equity: f64,
    next_order_id: u64,
    next_oco_group: u64,
}

impl Ledger {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            cash: config.initial_capital,
            peak_equity: config.initial_capital,
            config,
            positions: BTreeMap::new(),
            orders: Vec::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            last_prices: BTreeMap::new(),
            next_order_id: 1,
            next_oco_group: 1,
        }
    }

    // ── Orders ──

    /// Enqueue a pending order for `signal`, submitted at `bar_index`.
    ///
    /// The order becomes eligible to fill from `bar_index + 1`.
    pub fn submit_order(&mut self, signal: &Signal, bar_index: usize) -> Result<OrderId, LedgerError> {
        let missing = |field| LedgerError::MissingPrice {
            symbol: signal.symbol.clone(),
            kind: signal.kind,
            field,
        };
        let reference = match signal.kind {
            OrderKind::Market => self.last_prices.get(&signal.symbol).copied(),
            OrderKind::Limit => Some(signal.price.ok_or_else(|| missing("limit price"))?),
            OrderKind::Stop => Some(signal.stop_price.ok_or_else(|| missing("stop price"))?),
            OrderKind::StopLimit => {
                signal.stop_price.ok_or_else(|| missing("stop price"))?;
                Some(signal.price.ok_or_else(|| missing("limit price"))?)
            }
        };
        let reference = reference
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| LedgerError::NoReferencePrice(signal.symbol.clone()))?;

        let quantity = match signal.quantity {
            Some(q) => q,
            None => {
                let equity = self.current_equity();
                self.config
                    .sizing
                    .size(equity, reference, self.config.fractional)
            }
        };
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(LedgerError::InvalidQuantity {
                symbol: signal.symbol.clone(),
                quantity,
            });
        }

        let id = self.allocate_id();
        self.orders.push(Order {
            id,
            symbol: signal.symbol.clone(),
            side: signal.side,
            kind: signal.kind,
            quantity,
            price: signal.price,
            stop_price: signal.stop_price,
            submitted_bar: bar_index,
            status: OrderStatus::Pending,
            role: OrderRole::Entry,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            tag: signal.tag.clone(),
            oco_group: None,
            triggered: false,
            filled_bar: None,
            fill_price: None,
            cancel_reason: None,
        });
        debug!(order = %id, symbol = %signal.symbol, side = %signal.side, quantity, bar = bar_index, "order submitted");
        Ok(id)
    }

    /// Fill every pending order triggered by `bar`.
    ///
    /// Only orders submitted before `bar_index` are considered. Returns the
    /// filled orders with their trades, in order-id order.
    pub fn process_orders(&mut self, bar: &Bar, bar_index: usize) -> Vec<(Order, Trade)> {
        if let Some(ttl) = self.config.order_ttl_bars {
            for order in self.orders.iter_mut() {
                let expired = order.role == OrderRole::Entry && bar_index > order.submitted_bar + ttl;
                if order.is_pending() && expired {
                    order.status = OrderStatus::Cancelled;
                    order.cancel_reason = Some("expired".into());
                }
            }
        }

        let eligible: Vec<usize> = self
            .orders
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_pending() && o.submitted_bar < bar_index)
            .map(|(i, _)| i)
            .collect();

        let mut fills = Vec::new();
        for idx in eligible {
            // an earlier fill this bar may have cancelled it
            if !self.orders[idx].is_pending() {
                continue;
            }
            let Some(raw_price) = fill::evaluate(&mut self.orders[idx], bar) else {
                continue;
            };

            let quantity = match self.fill_quantity(&self.orders[idx]) {
                Some(q) => q,
                None => {
                    let order = &mut self.orders[idx];
                    order.status = OrderStatus::Cancelled;
                    order.cancel_reason = Some("position closed".into());
                    continue;
                }
            };

            let (side, kind) = (self.orders[idx].side, self.orders[idx].kind);
            let price = if fill::pays_slippage(kind) {
                fill::apply_slippage(raw_price, side, self.config.slippage_bps)
            } else {
                raw_price
            };

            let trade = self.apply_fill(idx, quantity, price, bar, bar_index);

            let order = &mut self.orders[idx];
            order.status = OrderStatus::Filled;
            order.quantity = quantity;
            order.filled_bar = Some(bar_index);
            order.fill_price = Some(price);
            let filled = order.clone();

            if let Some(group) = filled.oco_group {
                self.cancel_where(
                    |o| o.oco_group == Some(group) && o.id != filled.id,
                    "oco sibling filled",
                );
            }
            if filled.role == OrderRole::Entry {
                self.spawn_protective(&filled, bar_index);
            }
            if self.position(&filled.symbol).map_or(true, Position::is_flat) {
                let symbol = filled.symbol.clone();
                self.cancel_where(
                    |o| o.symbol == symbol && o.role != OrderRole::Entry,
                    "position flat",
                );
            }

            debug!(order = %filled.id, price, quantity, bar = bar_index, reason = ?trade.reason, "order filled");
            fills.push((filled, trade));
        }
        fills
    }

    /// Cancel one pending order. Returns false if it was not pending.
    pub fn cancel_order(&mut self, id: OrderId) -> bool {
        match self.orders.iter_mut().find(|o| o.id == id && o.is_pending()) {
            Some(order) => {
                order.status = OrderStatus::Cancelled;
                order.cancel_reason = Some("cancelled".into());
                true
            }
            None => false,
        }
    }

    /// Cancel every pending order. Returns how many were cancelled.
    pub fn cancel_all_orders(&mut self) -> usize {
        self.cancel_where(|_| true, "cancelled")
    }

    // ── Marking and equity ──

    /// Record `prices` as the latest marks and recompute unrealized PnL.
    pub fn update_positions(&mut self, prices: &HashMap<String, f64>) {
        for (symbol, &price) in prices {
            self.last_prices.insert(symbol.clone(), price);
            if let Some(pos) = self.positions.get_mut(symbol) {
                pos.mark(price);
            }
        }
    }

    /// Cash plus the market value of every position.
    ///
    /// Symbols missing from `prices` are valued at their last mark, then at cost.
    pub fn equity(&self, prices: &HashMap<String, f64>) -> f64 {
        self.cash
            + self
                .positions
                .values()
                .map(|pos| pos.market_value(self.price_for(&pos.symbol, prices, pos.avg_price)))
                .sum::<f64>()
    }

    /// Append one equity point for this bar.
    pub fn record_equity(
        &mut self,
        timestamp: DateTime<Utc>,
        bar_index: usize,
        prices: &HashMap<String, f64>,
    ) -> EquityPoint {
        let equity = self.equity(prices);
        self.peak_equity = self.peak_equity.max(equity);
        let drawdown = if self.peak_equity > 0.0 {
            ((self.peak_equity - equity) / self.peak_equity).max(0.0)
        } else {
            0.0
        };
        let point = EquityPoint {
            timestamp,
            bar_index,
            equity,
            cash: self.cash,
            position_value: equity - self.cash,
            drawdown,
        };
        self.equity_curve.push(point);
        point
    }

    // ── Accessors ──

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_capital(&self) -> f64 {
        self.config.initial_capital
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn pending_orders(&self) -> Vec<&Order> {
        self.orders.iter().filter(|o| o.is_pending()).collect()
    }

    /// Every order ever submitted, in id order.
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn last_price(&self, symbol: &str) -> Option<f64> {
        self.last_prices.get(symbol).copied()
    }

    /// Equity at the latest marks.
    pub fn current_equity(&self) -> f64 {
        self.equity(&HashMap::new())
    }

    // ── Internals ──

    fn allocate_id(&mut self) -> OrderId {
        let id = OrderId(self.next_order_id);
        self.next_order_id += 1;
        id
    }

    fn price_for(&self, symbol: &str, prices: &HashMap<String, f64>, fallback: f64) -> f64 {
        prices
            .get(symbol)
            .or_else(|| self.last_prices.get(symbol))
            .copied()
            .unwrap_or(fallback)
    }

    fn cancel_where(&mut self, pred: impl Fn(&Order) -> bool, reason: &str) -> usize {
        let mut count = 0;
        for order in self.orders.iter_mut().filter(|o| o.is_pending() && pred(o)) {
            order.status = OrderStatus::Cancelled;
            order.cancel_reason = Some(reason.to_string());
            count += 1;
        }
        count
    }

    /// Quantity to fill. Protective orders never exceed the exposure they
    /// protect; `None` means there is nothing left to protect.
    fn fill_quantity(&self, order: &Order) -> Option<f64> {
        if order.role == OrderRole::Entry {
            return Some(order.quantity);
        }
        let held = self.position(&order.symbol).map_or(0.0, |p| p.quantity);
        // a protective sell needs a long to close, a protective buy a short
        if held * order.side.sign() >= -FLAT_EPSILON {
            return None;
        }
        Some(order.quantity.min(held.abs()))
    }

    fn apply_fill(&mut self, idx: usize, quantity: f64, price: f64, bar: &Bar, bar_index: usize) -> Trade {
        let order = &self.orders[idx];
        let signed = order.side.sign() * quantity;
        let commission = (quantity * price).abs() * self.config.commission_rate;

        let pos = self
            .positions
            .entry(order.symbol.clone())
            .or_insert_with(|| Position::flat(order.symbol.clone()));
        let old_qty = pos.quantity;
        let old_avg = pos.avg_price;
        let opened_at = pos.opened_at;
        let mut new_qty = old_qty + signed;
        if new_qty.abs() < FLAT_EPSILON {
            new_qty = 0.0;
        }

        let was_flat = old_qty.abs() < FLAT_EPSILON;
        let same_direction = !was_flat && old_qty.signum() == signed.signum();
        let closing = if was_flat || same_direction {
            0.0
        } else {
            signed.abs().min(old_qty.abs())
        };
        let realized = closing * (price - old_avg) * old_qty.signum();

        let mut reason = if was_flat {
            TradeReason::Entry
        } else if same_direction {
            TradeReason::ScaleIn
        } else if new_qty == 0.0 {
            TradeReason::Exit
        } else if new_qty.signum() == old_qty.signum() {
            TradeReason::Reduce
        } else {
            TradeReason::Reversal
        };
        match order.role {
            OrderRole::StopLoss if closing > 0.0 => reason = TradeReason::StopLoss,
            OrderRole::TakeProfit if closing > 0.0 => reason = TradeReason::TakeProfit,
            _ => {}
        }

        match reason {
            TradeReason::Entry | TradeReason::Reversal => {
                pos.avg_price = price;
                pos.opened_at = Some(bar.timestamp);
            }
            TradeReason::ScaleIn => {
                pos.avg_price = (old_qty * old_avg + signed * price) / new_qty;
            }
            _ if new_qty == 0.0 => {
                pos.avg_price = 0.0;
                pos.opened_at = None;
            }
            _ => {}
        }
        pos.quantity = new_qty;
        pos.realized_pnl += realized;
        pos.mark(price);

        self.cash -= signed * price + commission;

        let (entry_price, entry_time) = if closing > 0.0 {
            (old_avg, opened_at.unwrap_or(bar.timestamp))
        } else {
            (price, bar.timestamp)
        };
        let trade = Trade {
            order_id: order.id,
            entry_time,
            exit_time: bar.timestamp,
            symbol: order.symbol.clone(),
            side: order.side,
            entry_price,
            exit_price: price,
            quantity,
            pnl: realized - commission,
            commission,
            reason,
            bar_index,
            tag: order.tag.clone(),
        };
        self.trades.push(trade.clone());
        trade
    }

    /// Attach stop-loss / take-profit children to a filled entry, linked as one
    /// OCO group and eligible from the next bar.
    fn spawn_protective(&mut self, entry: &Order, bar_index: usize) {
        if entry.stop_loss.is_none() && entry.take_profit.is_none() {
            return;
        }
        let held = self.position(&entry.symbol).map_or(0.0, |p| p.quantity);
        if held * entry.side.sign() <= FLAT_EPSILON {
            return;
        }
        let quantity = entry.quantity.min(held.abs());
        let exit_side = entry.side.opposite();
        let group = OcoGroupId(self.next_oco_group);
        self.next_oco_group += 1;

        let children = [
            (OrderRole::StopLoss, OrderKind::Stop, entry.stop_loss),
            (OrderRole::TakeProfit, OrderKind::Limit, entry.take_profit),
        ];
        for (role, kind, level) in children {
            let Some(level) = level else { continue };
            let id = self.allocate_id();
            let (price, stop_price) = match kind {
                OrderKind::Stop => (None, Some(level)),
                _ => (Some(level), None),
            };
            self.orders.push(Order {
                id,
                symbol: entry.symbol.clone(),
                side: exit_side,
                kind,
                quantity,
                price,
                stop_price,
                submitted_bar: bar_index,
                status: OrderStatus::Pending,
                role,
                stop_loss: None,
                take_profit: None,
                tag: entry.tag.clone(),
                oco_group: Some(group),
                triggered: false,
                filled_bar: None,
                fill_price: None,
                cancel_reason: None,
            });
        }
    }
}

/// Price map for a single symbol, the common case during a replay.
pub fn price_map(symbol: &str, price: f64) -> HashMap<String, f64> {
    HashMap::from([(symbol.to_string(), price)])
}

/// Side that closes `quantity` of signed exposure.
pub fn closing_side(quantity: f64) -> Side {
    if quantity > 0.0 {
        Side::Sell
    } else {
        Side::Buy
    }
}
