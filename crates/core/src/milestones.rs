//! Completed-count milestones
//!
//! A milestone fires once per plan. Un-completing entries later never
//! clears a milestone that was already reached.

use std::fmt;

use crate::models::Plan;

/// Completed-entry counts that unlock a milestone
pub const MILESTONE_THRESHOLDS: [u32; 4] = [30, 60, 100, 200];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Milestone {
    /// Reached `n` completed entries
    Entries(u32),
    /// Every entry of the plan is completed
    Final,
}

impl Milestone {
    /// Key used in the persisted `milestonesHit` map
    pub fn key(&self) -> String {
        match self {
            Self::Entries(n) => n.to_string(),
            Self::Final => "final".to_string(),
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        if key.eq_ignore_ascii_case("final") {
            return Some(Self::Final);
        }
        key.parse::<u32>().ok().filter(|n| *n > 0).map(Self::Entries)
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A milestone reached by the latest mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneEvent {
    pub milestone: Milestone,
    pub completed_count: u32,
}

impl MilestoneEvent {
    pub fn message(&self) -> String {
        match self.milestone {
            Milestone::Final => "Plan completed. Outstanding consistency.".to_string(),
            Milestone::Entries(n) => format!("Milestone unlocked: {} entries completed.", n),
        }
    }
}

/// Record newly reached milestones on `plan` and report them in threshold order
pub fn record_milestones(plan: &mut Plan) -> Vec<MilestoneEvent> {
    let completed_count = plan.completed_in_range().count() as u32;
    let mut events = Vec::new();

    for threshold in MILESTONE_THRESHOLDS {
        let milestone = Milestone::Entries(threshold);
        if completed_count >= threshold && plan.milestones_hit.insert(milestone) {
            events.push(MilestoneEvent {
                milestone,
                completed_count,
            });
        }
    }

    if plan.total_days > 0
        && completed_count >= plan.total_days
        && plan.milestones_hit.insert(Milestone::Final)
    {
        events.push(MilestoneEvent {
            milestone: Milestone::Final,
            completed_count,
        });
    }

    events
}
