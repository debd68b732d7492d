//! Chartable series derived from a plan and its metrics
//!
//! Every series is a pair of parallel label/value vectors. Values that are
//! undefined at a position (actual progress in the future, projection before
//! today) are `None` and serialize as `null`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::metrics::{compute_metrics, Metrics};
use crate::models::{Plan, PlanMode};
use crate::money::Money;
use crate::schedule::{add_days, amount_for_index, date_for_index, monday_start};

/// Number of Monday-anchored buckets in the weekly series
pub const WEEKLY_BUCKETS: i64 = 10;
/// Entries shown in the streak timeline
pub const STREAK_WINDOW: u32 = 30;
/// Trailing entries in the rolling completion window
pub const ROLLING_WINDOW: u32 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeSeries {
    pub labels: Vec<String>,
    pub actual: Vec<Money>,
    pub target: Vec<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySeries {
    pub labels: Vec<String>,
    pub week_starts: Vec<NaiveDate>,
    pub values: Vec<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakTimeline {
    pub labels: Vec<String>,
    /// 1 for completed, 0 for pending
    pub values: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingCompletion {
    pub labels: Vec<String>,
    /// Whole percentages
    pub values: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSeries {
    pub labels: Vec<String>,
    pub actual: Vec<Option<Money>>,
    pub target: Vec<Money>,
    pub projected: Vec<Option<Money>>,
    /// Index at which the current pace reaches the target; may lie past the plan
    pub finish_index: Option<u64>,
    pub finish_date: Option<NaiveDate>,
}

/// All series for one plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesBundle {
    pub cumulative: CumulativeSeries,
    pub weekly: WeeklySeries,
    pub streak: StreakTimeline,
    pub rolling: RollingCompletion,
    pub projection: ProjectionSeries,
}

pub fn build_analytics(plan: &Plan, metrics: &Metrics) -> SeriesBundle {
    SeriesBundle {
        cumulative: cumulative_series(plan),
        weekly: weekly_series(plan, metrics.as_of),
        streak: streak_timeline(plan, metrics),
        rolling: rolling_completion(plan),
        projection: projection_series(plan, metrics),
    }
}

/// Running actual and running target over `1..=total_days`
pub fn cumulative_series(plan: &Plan) -> CumulativeSeries {
    let mut series = CumulativeSeries {
        labels: Vec::with_capacity(plan.total_days as usize),
        actual: Vec::with_capacity(plan.total_days as usize),
        target: Vec::with_capacity(plan.total_days as usize),
    };
    let mut actual = Money::ZERO;
    let mut target = Money::ZERO;

    for index in 1..=plan.total_days {
        let amount = amount_for_index(plan, index);
        target += amount;
        if plan.is_completed(index) {
            actual += amount;
        }
        series.labels.push(index.to_string());
        series.actual.push(actual);
        series.target.push(target);
    }
    series
}

/// Completed amounts bucketed by the Monday of their due date, last ten weeks up to `today`
pub fn weekly_series(plan: &Plan, today: NaiveDate) -> WeeklySeries {
    let current_monday = monday_start(today);
    let week_starts: Vec<NaiveDate> = (0..WEEKLY_BUCKETS)
        .rev()
        .map(|back| add_days(current_monday, -back * 7))
        .collect();

    let mut totals: BTreeMap<NaiveDate, Money> =
        week_starts.iter().map(|week| (*week, Money::ZERO)).collect();
    for index in plan.completed_in_range() {
        let week = monday_start(date_for_index(plan, index));
        if let Some(total) = totals.get_mut(&week) {
            *total += amount_for_index(plan, index);
        }
    }

    WeeklySeries {
        labels: week_starts
            .iter()
            .map(|week| week.format("%b %-d").to_string())
            .collect(),
        values: week_starts.iter().map(|week| totals[week]).collect(),
        week_starts,
    }
}

/// Completed/pending flags for the 30 entries ending at the current index
pub fn streak_timeline(plan: &Plan, metrics: &Metrics) -> StreakTimeline {
    let anchor = metrics.current_index.clamp(1, plan.total_days.max(1));
    let start = anchor.saturating_sub(STREAK_WINDOW - 1).max(1);

    let indices = start..=anchor.min(plan.total_days);
    StreakTimeline {
        labels: indices.clone().map(|i| i.to_string()).collect(),
        values: indices.map(|i| u8::from(plan.is_completed(i))).collect(),
    }
}

/// Percentage of completed entries in the trailing seven-entry window
pub fn rolling_completion(plan: &Plan) -> RollingCompletion {
    let mut labels = Vec::with_capacity(plan.total_days as usize);
    let mut values = Vec::with_capacity(plan.total_days as usize);

    for index in 1..=plan.total_days {
        let window_start = index.saturating_sub(ROLLING_WINDOW - 1).max(1);
        let span = index - window_start + 1;
        let done = (window_start..=index)
            .filter(|i| plan.is_completed(*i))
            .count() as u32;
        labels.push(index.to_string());
        values.push((f64::from(done) / f64::from(span) * 100.0).round() as u32);
    }

    RollingCompletion { labels, values }
}

/// Actual, target and pace-based projected savings over a horizon of up to three plan lengths
pub fn projection_series(plan: &Plan, metrics: &Metrics) -> ProjectionSeries {
    let total_days = u64::from(plan.total_days);
    let elapsed = u64::from(metrics.current_index.min(plan.total_days));
    let completed = metrics.completed_amount;
    let target = metrics.target_amount;

    let velocity = completed.cents() as f64 / elapsed.max(1) as f64;
    let remaining = if target > completed {
        target - completed
    } else {
        Money::ZERO
    };

    let finish_index = if !remaining.is_positive() {
        Some(if elapsed > 0 { elapsed } else { total_days })
    } else if velocity > 0.0 {
        Some(elapsed + (remaining.cents() as f64 / velocity).ceil() as u64)
    } else {
        None
    };

    let horizon = finish_index
        .unwrap_or(total_days)
        .max(total_days)
        .min(total_days * 3);

    let mut series = ProjectionSeries {
        labels: Vec::with_capacity(horizon as usize),
        actual: Vec::with_capacity(horizon as usize),
        target: Vec::with_capacity(horizon as usize),
        projected: Vec::with_capacity(horizon as usize),
        finish_index,
        finish_date: finish_index.map(|finish| {
            let capped = finish.min(total_days) as u32;
            date_for_index(plan, capped)
        }),
    };

    let mut running_actual = Money::ZERO;
    let mut running_target = Money::ZERO;
    for index in 1..=horizon {
        series.labels.push(index.to_string());

        if index <= elapsed {
            let entry = index as u32;
            if plan.is_completed(entry) {
                running_actual += amount_for_index(plan, entry);
            }
            series.actual.push(Some(running_actual));
        } else {
            series.actual.push(None);
        }

        if index <= total_days {
            running_target += amount_for_index(plan, index as u32);
        }
        series.target.push(running_target);

        let projected = match finish_index {
            None => None,
            Some(_) if velocity <= 0.0 || index < elapsed => None,
            Some(finish) if finish == elapsed => Some(target),
            Some(finish) if index <= finish => {
                let ratio = (index - elapsed) as f64 / (finish - elapsed).max(1) as f64;
                let gap = (target - completed).cents() as f64;
                Some(completed + Money::from_cents((ratio * gap).round() as i64))
            }
            Some(_) => Some(target),
        };
        series.projected.push(projected);
    }

    series
}

/// One plan's line in a portfolio summary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSnapshot {
    pub plan_id: String,
    pub name: String,
    pub mode: PlanMode,
    pub metrics: Metrics,
}

/// Totals across every plan of one user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub as_of: NaiveDate,
    pub plans: Vec<PlanSnapshot>,
    pub total_target: Money,
    pub total_saved: Money,
    pub total_overdue: u32,
}

pub fn portfolio_summary(plans: &[Plan], today: NaiveDate) -> PortfolioSummary {
    let snapshots: Vec<PlanSnapshot> = plans
        .iter()
        .map(|plan| PlanSnapshot {
            plan_id: plan.id.clone(),
            name: plan.name.clone(),
            mode: plan.mode(),
            metrics: compute_metrics(plan, today),
        })
        .collect();

    PortfolioSummary {
        as_of: today,
        total_target: snapshots.iter().map(|s| s.metrics.target_amount).sum(),
        total_saved: snapshots.iter().map(|s| s.metrics.completed_amount).sum(),
        total_overdue: snapshots.iter().map(|s| s.metrics.overdue).sum(),
        plans: snapshots,
    }
}
