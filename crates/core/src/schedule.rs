//! Index/date and index/amount formulas
//!
//! Dates are calendar days without a time component. Day distances come from
//! `NaiveDate` arithmetic, so no daylight-saving shift can skew them.

use chrono::{DateTime, Datelike, Duration, NaiveDate};

use crate::models::{Plan, PlanKind};
use crate::money::Money;

/// Whole calendar days from `earlier` to `later` (negative when `later` precedes)
pub fn day_diff(later: NaiveDate, earlier: NaiveDate) -> i64 {
    (later - earlier).num_days()
}

/// Shift a date by whole days, saturating at the calendar bounds
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

/// Monday of the week containing `date`
pub fn monday_start(date: NaiveDate) -> NaiveDate {
    add_days(date, -i64::from(date.weekday().num_days_from_monday()))
}

/// Parse a stored plan date: `YYYY-MM-DD`, or the date part of an RFC 3339 timestamp
pub fn parse_plan_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// Days between consecutive entries
fn step_days(plan: &Plan) -> i64 {
    if plan.mode().is_weekly() {
        7
    } else {
        1
    }
}

/// Due date of entry `index`
pub fn date_for_index(plan: &Plan, index: u32) -> NaiveDate {
    let offset = (i64::from(index) - 1) * step_days(plan);
    add_days(plan.start_date, offset)
}

/// Entry due on `date`, if any
///
/// `None` before the start date, off the weekly cadence, or past the last entry.
pub fn index_for_date(plan: &Plan, date: NaiveDate) -> Option<u32> {
    let distance = day_diff(date, plan.start_date);
    if distance < 0 {
        return None;
    }
    let step = step_days(plan);
    if distance % step != 0 {
        return None;
    }
    let index = distance / step + 1;
    u32::try_from(index)
        .ok()
        .filter(|i| *i <= plan.total_days)
}

/// Deposit amount of entry `index`
pub fn amount_for_index(plan: &Plan, index: u32) -> Money {
    match plan.kind {
        PlanKind::Simple { fixed_daily_amount } => fixed_daily_amount,
        _ => Money::from_f64(f64::from(index) * plan.kind.increment_multiplier()),
    }
}

/// Closed-form sum of `index * multiplier` over `1..=total_days`, rounded to cents
pub fn arithmetic_total(total_days: u32, multiplier: f64) -> Money {
    let n = f64::from(total_days);
    Money::from_f64(n * (n + 1.0) * multiplier / 2.0)
}

/// Canonical target of a plan
pub fn target_amount(plan: &Plan) -> Money {
    match plan.kind {
        PlanKind::Simple { fixed_daily_amount } => {
            fixed_daily_amount * i64::from(plan.total_days)
        }
        _ => arithmetic_total(plan.total_days, plan.kind.increment_multiplier()),
    }
}
