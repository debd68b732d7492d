//! Savings plan model

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::invariants::assert_plan_invariants;
use crate::milestones::Milestone;
use crate::money::Money;
use crate::schedule;

/// Colour used when a plan does not pick one
pub const DEFAULT_COLOR_THEME: &str = "#7c5cff";

/// Deposit schedule modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanMode {
    /// Index times 1.0 every day
    Full,
    /// Index times 0.5 every day
    Half,
    /// Index times 0.25 every day
    Quarter,
    /// Same fixed amount every day
    Simple,
    /// Index times the multiplier once a week
    Weekly,
}

impl PlanMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" => Some(Self::Full),
            "half" => Some(Self::Half),
            "quarter" => Some(Self::Quarter),
            "simple" => Some(Self::Simple),
            "weekly" => Some(Self::Weekly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Half => "half",
            Self::Quarter => "quarter",
            Self::Simple => "simple",
            Self::Weekly => "weekly",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Full => "Full daily (1.0x)",
            Self::Half => "Half daily (0.5x)",
            Self::Quarter => "Quarter daily (0.25x)",
            Self::Simple => "Simple daily (fixed amount)",
            Self::Weekly => "Weekly",
        }
    }

    pub fn default_multiplier(&self) -> f64 {
        match self {
            Self::Half => 0.5,
            Self::Quarter => 0.25,
            Self::Full | Self::Simple | Self::Weekly => 1.0,
        }
    }

    /// Entry count: 52 weeks for weekly plans, 365 days otherwise
    pub fn default_total_days(&self) -> u32 {
        match self {
            Self::Weekly => 52,
            _ => 365,
        }
    }

    pub fn is_weekly(&self) -> bool {
        matches!(self, Self::Weekly)
    }

    pub fn all() -> &'static [PlanMode] {
        &[
            PlanMode::Full,
            PlanMode::Half,
            PlanMode::Quarter,
            PlanMode::Simple,
            PlanMode::Weekly,
        ]
    }
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Amount rule of a plan, one variant per mode with only the fields that mode uses
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanKind {
    Full { increment_multiplier: f64 },
    Half { increment_multiplier: f64 },
    Quarter { increment_multiplier: f64 },
    Simple { fixed_daily_amount: Money },
    Weekly { increment_multiplier: f64 },
}

impl PlanKind {
    /// Build the variant for `mode`.
    ///
    /// Returns `None` when a simple plan has no positive fixed amount or an
    /// arithmetic plan has a non-positive multiplier.
    pub fn for_mode(mode: PlanMode, multiplier: f64, fixed_daily_amount: Option<Money>) -> Option<Self> {
        let arithmetic = multiplier.is_finite() && multiplier > 0.0;
        let increment_multiplier = multiplier;
        match mode {
            PlanMode::Simple => fixed_daily_amount
                .filter(|amount| amount.is_positive())
                .map(|fixed_daily_amount| Self::Simple { fixed_daily_amount }),
            _ if !arithmetic => None,
            PlanMode::Full => Some(Self::Full { increment_multiplier }),
            PlanMode::Half => Some(Self::Half { increment_multiplier }),
            PlanMode::Quarter => Some(Self::Quarter { increment_multiplier }),
            PlanMode::Weekly => Some(Self::Weekly { increment_multiplier }),
        }
    }

    /// Variant for `mode` using the mode's default multiplier
    pub fn with_defaults(mode: PlanMode, fixed_daily_amount: Option<Money>) -> Option<Self> {
        Self::for_mode(mode, mode.default_multiplier(), fixed_daily_amount)
    }

    pub fn mode(&self) -> PlanMode {
        match self {
            Self::Full { .. } => PlanMode::Full,
            Self::Half { .. } => PlanMode::Half,
            Self::Quarter { .. } => PlanMode::Quarter,
            Self::Simple { .. } => PlanMode::Simple,
            Self::Weekly { .. } => PlanMode::Weekly,
        }
    }

    /// Per-index scale; simple plans report 1.0
    pub fn increment_multiplier(&self) -> f64 {
        match self {
            Self::Full { increment_multiplier }
            | Self::Half { increment_multiplier }
            | Self::Quarter { increment_multiplier }
            | Self::Weekly { increment_multiplier } => *increment_multiplier,
            Self::Simple { .. } => 1.0,
        }
    }

    pub fn fixed_daily_amount(&self) -> Option<Money> {
        match self {
            Self::Simple { fixed_daily_amount } => Some(*fixed_daily_amount),
            _ => None,
        }
    }
}

/// Input for creating a plan
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub name: String,
    pub start_date: NaiveDate,
    pub mode: PlanMode,
    pub color_theme: Option<String>,
    /// Required for simple mode, ignored otherwise
    pub fixed_daily_amount: Option<Money>,
}

/// A savings schedule with indexed deposit entries `1..=total_days`
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub kind: PlanKind,
    pub total_days: u32,
    pub completed_days: BTreeSet<u32>,
    pub color_theme: String,
    pub milestones_hit: BTreeSet<Milestone>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Validate creation input and build a fresh plan
    pub fn create(new: NewPlan, now: DateTime<Utc>) -> Result<Self> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("plan name is required".to_string()));
        }

        let kind = PlanKind::with_defaults(new.mode, new.fixed_daily_amount).ok_or_else(|| {
            Error::Validation("simple plans need a daily amount greater than 0".to_string())
        })?;

        let color_theme = new
            .color_theme
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_COLOR_THEME.to_string());

        let plan = Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            start_date: new.start_date,
            kind,
            total_days: new.mode.default_total_days(),
            completed_days: BTreeSet::new(),
            color_theme,
            milestones_hit: BTreeSet::new(),
            created_at: now,
        };
        assert_plan_invariants(&plan);
        Ok(plan)
    }

    pub fn mode(&self) -> PlanMode {
        self.kind.mode()
    }

    /// Canonical sum of every entry amount, derived on each call
    pub fn target_amount(&self) -> Money {
        schedule::target_amount(self)
    }

    pub fn contains_index(&self, index: u32) -> bool {
        (1..=self.total_days).contains(&index)
    }

    pub fn is_completed(&self, index: u32) -> bool {
        self.contains_index(index) && self.completed_days.contains(&index)
    }

    /// Completed indices inside the plan range
    pub fn completed_in_range(&self) -> impl Iterator<Item = u32> + '_ {
        self.completed_days
            .iter()
            .copied()
            .filter(move |i| self.contains_index(*i))
    }
}

/// Wire shape of a plan inside the persisted document
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanRecord<'a> {
    id: &'a str,
    name: &'a str,
    start_date: String,
    mode: PlanMode,
    total_days: u32,
    increment_multiplier: f64,
    fixed_daily_amount: Option<Money>,
    target_amount: Money,
    completed_days: BTreeMap<String, bool>,
    color_theme: &'a str,
    milestones_hit: BTreeMap<String, bool>,
    created_at: DateTime<Utc>,
}

impl Serialize for Plan {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        PlanRecord {
            id: &self.id,
            name: &self.name,
            start_date: self.start_date.format("%Y-%m-%d").to_string(),
            mode: self.mode(),
            total_days: self.total_days,
            increment_multiplier: self.kind.increment_multiplier(),
            fixed_daily_amount: self.kind.fixed_daily_amount(),
            target_amount: self.target_amount(),
            completed_days: self
                .completed_days
                .iter()
                .map(|i| (i.to_string(), true))
                .collect(),
            color_theme: &self.color_theme,
            milestones_hit: self
                .milestones_hit
                .iter()
                .map(|m| (m.key(), true))
                .collect(),
            created_at: self.created_at,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_plan(mode: PlanMode, fixed: Option<Money>) -> NewPlan {
        NewPlan {
            name: "  Rainy day  ".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            mode,
            color_theme: None,
            fixed_daily_amount: fixed,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_create_full_plan() {
        let plan = Plan::create(new_plan(PlanMode::Full, None), now()).unwrap();
        assert_eq!(plan.name, "Rainy day");
        assert_eq!(plan.total_days, 365);
        assert_eq!(plan.kind, PlanKind::Full { increment_multiplier: 1.0 });
        assert_eq!(plan.color_theme, DEFAULT_COLOR_THEME);
        assert_eq!(plan.target_amount(), Money::from_cents(6_679_500));
    }

    #[test]
    fn test_create_weekly_plan_has_52_entries() {
        let plan = Plan::create(new_plan(PlanMode::Weekly, None), now()).unwrap();
        assert_eq!(plan.total_days, 52);
        assert_eq!(plan.target_amount(), Money::from_cents(137_800));
    }

    #[test]
    fn test_create_simple_plan_requires_amount() {
        let err = Plan::create(new_plan(PlanMode::Simple, None), now()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = Plan::create(new_plan(PlanMode::Simple, Some(Money::ZERO)), now()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let plan =
            Plan::create(new_plan(PlanMode::Simple, Some(Money::from_cents(1000))), now()).unwrap();
        assert_eq!(plan.target_amount(), Money::from_cents(365_000));
    }

    #[test]
    fn test_create_rejects_blank_name() {
        let mut input = new_plan(PlanMode::Full, None);
        input.name = "   ".to_string();
        assert!(matches!(
            Plan::create(input, now()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(PlanMode::from_str("Half"), Some(PlanMode::Half));
        assert_eq!(PlanMode::from_str(" weekly "), Some(PlanMode::Weekly));
        assert_eq!(PlanMode::from_str("monthly"), None);
        for mode in PlanMode::all() {
            assert_eq!(PlanMode::from_str(mode.as_str()), Some(*mode));
        }
    }

    #[test]
    fn test_kind_rejects_non_positive_multiplier() {
        assert!(PlanKind::for_mode(PlanMode::Full, 0.0, None).is_none());
        assert!(PlanKind::for_mode(PlanMode::Half, f64::NAN, None).is_none());
    }

    #[test]
    fn test_serialized_record_shape() {
        let mut plan = Plan::create(new_plan(PlanMode::Half, None), now()).unwrap();
        plan.completed_days.insert(3);
        plan.milestones_hit.insert(Milestone::Final);

        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["mode"], "half");
        assert_eq!(value["startDate"], "2024-01-01");
        assert_eq!(value["incrementMultiplier"], 0.5);
        assert_eq!(value["fixedDailyAmount"], serde_json::Value::Null);
        assert_eq!(value["targetAmount"], 33397.5);
        assert_eq!(value["completedDays"]["3"], true);
        assert_eq!(value["milestonesHit"]["final"], true);
    }
}
