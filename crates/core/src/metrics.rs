//! Progress metrics for one plan at one day
//!
//! Every function here is total: indices outside `1..=total_days` are
//! ignored or clamped, never reported as errors.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::milestones::{record_milestones, MilestoneEvent};
use crate::models::{Plan, PlanKind};
use crate::money::Money;
use crate::schedule::{amount_for_index, arithmetic_total, date_for_index, day_diff};

/// Snapshot of a plan's progress
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Day the snapshot was taken for
    pub as_of: NaiveDate,
    /// Unclamped entry index for `as_of`; 0 before the start date
    pub current_index: u32,
    /// `current_index` clamped to `0..=total_days`
    pub due_through_today: u32,
    pub in_range: bool,
    pub completed_count: u32,
    pub completed_amount: Money,
    pub target_amount: Money,
    pub projected_by_now: Money,
    pub variance_by_now: Money,
    pub progress_percent: f64,
    pub overdue: u32,
    pub upcoming: u32,
    pub streak: u32,
    pub next_due_index: Option<u32>,
}

/// Entry index for `today`: whole days (or weeks) since the start, plus one
pub fn current_index(plan: &Plan, today: NaiveDate) -> u32 {
    let distance = day_diff(today, plan.start_date);
    if distance < 0 {
        return 0;
    }
    let units = if plan.mode().is_weekly() {
        distance / 7
    } else {
        distance
    };
    u32::try_from(units + 1).unwrap_or(u32::MAX)
}

pub fn completed_count(plan: &Plan) -> u32 {
    plan.completed_in_range().count() as u32
}

pub fn completed_amount(plan: &Plan) -> Money {
    plan.completed_in_range()
        .map(|index| amount_for_index(plan, index))
        .sum()
}

/// Amount due over entries `1..=limit`, with `limit` clamped to the plan
pub fn projected_amount_by_index(plan: &Plan, limit: i64) -> Money {
    let limit = limit.clamp(0, i64::from(plan.total_days)) as u32;
    match plan.kind {
        PlanKind::Simple { fixed_daily_amount } => fixed_daily_amount * i64::from(limit),
        _ => arithmetic_total(limit, plan.kind.increment_multiplier()),
    }
}

/// Consecutive completed entries ending at `min(current_index, total_days)`
pub fn streak(plan: &Plan, current_index: u32) -> u32 {
    if current_index < 1 {
        return 0;
    }
    let last = current_index.min(plan.total_days);
    (1..=last)
        .rev()
        .take_while(|index| plan.is_completed(*index))
        .count() as u32
}

/// Incomplete entries due before and after `today`; entries due today count in neither
pub fn overdue_upcoming(plan: &Plan, today: NaiveDate) -> (u32, u32) {
    let mut overdue = 0;
    let mut upcoming = 0;
    for index in 1..=plan.total_days {
        if plan.is_completed(index) {
            continue;
        }
        let due = date_for_index(plan, index);
        if due < today {
            overdue += 1;
        } else if due > today {
            upcoming += 1;
        }
    }
    (overdue, upcoming)
}

/// First incomplete entry at or after `current_index`, wrapping to the start
pub fn next_due_index(plan: &Plan, current_index: u32) -> Option<u32> {
    if plan.total_days == 0 {
        return None;
    }
    let start = current_index.clamp(1, plan.total_days);
    (start..=plan.total_days)
        .chain(1..start)
        .find(|index| !plan.is_completed(*index))
}

pub fn progress_percent(completed: Money, target: Money) -> f64 {
    if !target.is_positive() {
        return 0.0;
    }
    (completed.as_f64() / target.as_f64() * 100.0).min(100.0)
}

/// Compute every metric for `plan` as of `today`
pub fn compute_metrics(plan: &Plan, today: NaiveDate) -> Metrics {
    let current = current_index(plan, today);
    let due_through_today = current.min(plan.total_days);
    let completed_amount = completed_amount(plan);
    let target_amount = plan.target_amount();
    let projected_by_now = projected_amount_by_index(plan, i64::from(due_through_today));
    let (overdue, upcoming) = overdue_upcoming(plan, today);

    Metrics {
        as_of: today,
        current_index: current,
        due_through_today,
        in_range: current >= 1 && current <= plan.total_days,
        completed_count: completed_count(plan),
        completed_amount,
        target_amount,
        projected_by_now,
        variance_by_now: completed_amount - projected_by_now,
        progress_percent: progress_percent(completed_amount, target_amount),
        overdue,
        upcoming,
        streak: streak(plan, current),
        next_due_index: next_due_index(plan, current),
    }
}

/// Flip entry `index` between pending and completed.
///
/// Indices outside the plan leave it unchanged. Milestones reached by the
/// change are recorded on the returned plan.
pub fn toggle_completion(plan: &Plan, index: u32) -> (Plan, Vec<MilestoneEvent>) {
    let mut updated = plan.clone();
    if !updated.contains_index(index) {
        return (updated, Vec::new());
    }
    if !updated.completed_days.remove(&index) {
        updated.completed_days.insert(index);
    }
    let events = record_milestones(&mut updated);
    (updated, events)
}

/// Complete the entry due `today`
pub fn mark_current_paid(plan: &Plan, today: NaiveDate) -> Result<(Plan, Vec<MilestoneEvent>)> {
    let index = current_index(plan, today);
    if index < 1 {
        return Err(Error::Precondition(format!(
            "Plan starts on {}.",
            plan.start_date.format("%Y-%m-%d")
        )));
    }
    if index > plan.total_days {
        return Err(Error::Precondition(
            "Today is outside this plan range.".to_string(),
        ));
    }
    if plan.is_completed(index) {
        return Err(Error::Precondition(
            "Today's entry is already completed.".to_string(),
        ));
    }

    let mut updated = plan.clone();
    updated.completed_days.insert(index);
    let events = record_milestones(&mut updated);
    Ok((updated, events))
}
