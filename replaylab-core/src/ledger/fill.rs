//! Trigger evaluation: does a pending order fill on this bar, and at what price.
//!
//! - Market: fills at the open.
//! - Limit: buy fills once low <= limit at min(open, limit); sell once
//!   high >= limit at max(open, limit).
//! - Stop: buy triggers on high >= stop, sell on low <= stop. A bar that opens
//!   beyond the stop gaps through and fills at the open.
//! - Stop-limit: arms when the stop is crossed, then follows the limit rule on
//!   the same bar and every bar after.

use crate::domain::{Bar, Order, OrderKind, Side};

/// Fill price for `order` against `bar`, before slippage. `None` if untriggered.
///
/// May set `order.triggered` for stop-limit orders even when nothing fills.
pub(crate) fn evaluate(order: &mut Order, bar: &Bar) -> Option<f64> {
    match order.kind {
        OrderKind::Market => Some(bar.open),
        OrderKind::Limit => limit_fill(order.side, order.price?, bar),
        OrderKind::Stop => stop_fill(order.side, order.stop_price?, bar),
        OrderKind::StopLimit => {
            if !order.triggered {
                stop_fill(order.side, order.stop_price?, bar)?;
                order.triggered = true;
            }
            limit_fill(order.side, order.price?, bar)
        }
    }
}

/// True if slippage applies to fills of this kind. Resting limit fills are passive.
pub(crate) fn pays_slippage(kind: OrderKind) -> bool {
    matches!(kind, OrderKind::Market | OrderKind::Stop)
}

/// Move `price` against the trader by `bps` basis points.
pub(crate) fn apply_slippage(price: f64, side: Side, bps: f64) -> f64 {
    price * (1.0 + side.sign() * bps / 10_000.0)
}

fn limit_fill(side: Side, limit: f64, bar: &Bar) -> Option<f64> {
    match side {
        Side::Buy if bar.low <= limit => Some(bar.open.min(limit)),
        Side::Sell if bar.high >= limit => Some(bar.open.max(limit)),
        _ => None,
    }
}

fn stop_fill(side: Side, stop: f64, bar: &Bar) -> Option<f64> {
    match side {
        Side::Buy if bar.high >= stop => Some(bar.open.max(stop)),
        Side::Sell if bar.low <= stop => Some(bar.open.min(stop)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, OrderRole, OrderStatus};
    use chrono::{TimeZone, Utc};

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            1000.0,
        )
    }

    fn order(side: Side, kind: OrderKind, price: Option<f64>, stop: Option<f64>) -> Order {
        Order {
            id: OrderId(1),
            symbol: "SPY".into(),
            side,
            kind,
            quantity: 10.0,
            price,
            stop_price: stop,
            submitted_bar: 0,
            status: OrderStatus::Pending,
            role: OrderRole::Entry,
            stop_loss: None,
            take_profit: None,
            tag: None,
            oco_group: None,
            triggered: false,
            filled_bar: None,
            fill_price: None,
            cancel_reason: None,
        }
    }

    #[test]
    fn market_fills_at_open() {
        let mut o = order(Side::Buy, OrderKind::Market, None, None);
        assert_eq!(evaluate(&mut o, &bar(100.0, 105.0, 95.0, 102.0)), Some(100.0));
    }

    #[test]
    fn buy_limit_requires_cross() {
        let mut o = order(Side::Buy, OrderKind::Limit, Some(94.0), None);
        assert_eq!(evaluate(&mut o, &bar(100.0, 105.0, 95.0, 102.0)), None);
        assert_eq!(evaluate(&mut o, &bar(100.0, 105.0, 93.0, 102.0)), Some(94.0));
    }

    #[test]
    fn buy_limit_gap_fills_at_better_open() {
        let mut o = order(Side::Buy, OrderKind::Limit, Some(98.0), None);
        assert_eq!(evaluate(&mut o, &bar(96.0, 99.0, 95.0, 97.0)), Some(96.0));
    }

    #[test]
    fn sell_limit_fills_at_limit_or_better() {
        let mut o = order(Side::Sell, OrderKind::Limit, Some(104.0), None);
        assert_eq!(evaluate(&mut o, &bar(100.0, 105.0, 95.0, 102.0)), Some(104.0));
        assert_eq!(evaluate(&mut o, &bar(106.0, 108.0, 105.0, 107.0)), Some(106.0));
    }

    #[test]
    fn sell_stop_triggers_and_gaps() {
        let mut o = order(Side::Sell, OrderKind::Stop, None, Some(95.0));
        assert_eq!(evaluate(&mut o, &bar(100.0, 101.0, 96.0, 98.0)), None);
        assert_eq!(evaluate(&mut o, &bar(100.0, 101.0, 94.0, 98.0)), Some(95.0));
        // opens below the stop: fill at the open
        assert_eq!(evaluate(&mut o, &bar(92.0, 93.0, 90.0, 91.0)), Some(92.0));
    }

    #[test]
    fn buy_stop_triggers_on_high() {
        let mut o = order(Side::Buy, OrderKind::Stop, None, Some(105.0));
        assert_eq!(evaluate(&mut o, &bar(100.0, 104.0, 99.0, 103.0)), None);
        assert_eq!(evaluate(&mut o, &bar(100.0, 106.0, 99.0, 103.0)), Some(105.0));
        assert_eq!(evaluate(&mut o, &bar(107.0, 108.0, 106.0, 107.5)), Some(107.0));
    }

    #[test]
    fn stop_limit_arms_then_waits_for_limit() {
        // buy stop 105, limit 104: the bar crosses 105 but never trades back to 104
        let mut o = order(Side::Buy, OrderKind::StopLimit, Some(104.0), Some(105.0));
        assert_eq!(evaluate(&mut o, &bar(104.5, 106.0, 104.5, 105.5)), None);
        assert!(o.triggered);
        // stays armed: a later dip through the limit fills without re-crossing the stop
        assert_eq!(evaluate(&mut o, &bar(104.2, 104.8, 103.5, 104.0)), Some(104.0));
    }

    #[test]
    fn untriggered_stop_limit_never_arms() {
        let mut o = order(Side::Sell, OrderKind::StopLimit, Some(94.0), Some(95.0));
        assert_eq!(evaluate(&mut o, &bar(100.0, 101.0, 96.0, 98.0)), None);
        assert!(!o.triggered);
    }

    #[test]
    fn slippage_is_adverse() {
        assert!((apply_slippage(100.0, Side::Buy, 10.0) - 100.1).abs() < 1e-9);
        assert!((apply_slippage(100.0, Side::Sell, 10.0) - 99.9).abs() < 1e-9);
        assert!(pays_slippage(OrderKind::Market));
        assert!(!pays_slippage(OrderKind::Limit));
    }
}
