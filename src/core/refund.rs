use chrono::{DateTime, Utc};

use crate::constants::{
    REFUND_30_FROM_DAYS, REFUND_50_FROM_DAYS, REFUND_80_FROM_DAYS, REFUND_FULL_OVER_DAYS,
};

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days between `now` and the offering start, rounded up. An offering
/// that already started counts as zero days out.
pub fn days_until_start(event_start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (event_start - now).num_seconds();
    if seconds <= 0 {
        0
    } else {
        seconds.div_euclid(SECONDS_PER_DAY) + (seconds.rem_euclid(SECONDS_PER_DAY) != 0) as i64
    }
}

/// Tiered cancellation policy. Each band's rate applies down to and
/// including its lower bound: exactly 30 days out is 80%, exactly 7 is 30%.
pub fn refund_rate(days_until_start: i64) -> u32 {
    if days_until_start > REFUND_FULL_OVER_DAYS {
        100
    } else if days_until_start >= REFUND_80_FROM_DAYS {
        80
    } else if days_until_start >= REFUND_50_FROM_DAYS {
        50
    } else if days_until_start >= REFUND_30_FROM_DAYS {
        30
    } else {
        0
    }
}

/// floor(paid_amount * rate / 100). Pure; never mutates participation or
/// payment state. Executing the refund against the gateway is the caller's
/// job, using the same `now` it persists as the cancellation timestamp.
pub fn refund_amount(event_start: DateTime<Utc>, now: DateTime<Utc>, paid_amount: i64) -> i64 {
    let rate = refund_rate(days_until_start(event_start, now));
    paid_amount * i64::from(rate) / 100
}
