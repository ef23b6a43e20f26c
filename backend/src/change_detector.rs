//! Change Detector
//!
//! Compares the two newest observations in the history and describes the
//! difference between them. Only adjacent pairs are considered: a price that
//! goes 100 → 110 → 100 produces two events, and repeated moves of the same
//! size are reported every time.
//!
//! # Formula
//! ```text
//! change         = current - last
//! change_percent = change / last × 100      (rounded to 2 dp)
//!                = 0                        when last <= 0
//! ```

use crate::types::{ChangeEvent, PriceObservation};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;

/// Detect a price change between the last two observations
///
/// # Arguments
/// * `prices` - Full observation history, oldest first
/// * `now` - Detection time recorded on the event
///
/// # Returns
/// `None` with fewer than two observations or when the last two prices match
pub fn detect_change(prices: &[PriceObservation], now: NaiveDateTime) -> Option<ChangeEvent> {
    let [.., previous, current] = prices else {
        return None;
    };

    if previous.price == current.price {
        return None;
    }

    let change = current.price - previous.price;

    Some(ChangeEvent {
        timestamp: now,
        old_price: previous.price,
        new_price: current.price,
        change,
        change_percent: change_percent(change, previous.price),
        currency: current.currency.clone(),
    })
}

fn change_percent(change: Decimal, last: Decimal) -> Decimal {
    if last <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (change / last * Decimal::ONE_HUNDRED).round_dp(2)
}
