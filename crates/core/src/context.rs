//! Signed-in user's working set of plans
//!
//! A `PlanContext` is loaded from a repository, mutated, and saved back.
//! Engine calls receive it explicitly instead of reading shared state.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Error, Result};
use crate::metrics;
use crate::milestones::MilestoneEvent;
use crate::models::{NewPlan, Plan};
use crate::storage::{PlanRepository, UserPlans};

#[derive(Debug, Clone, PartialEq)]
pub struct PlanContext {
    pub username: String,
    pub plans: Vec<Plan>,
    pub active_plan_id: Option<String>,
}

impl PlanContext {
    pub fn new(username: impl Into<String>, user_plans: UserPlans) -> Self {
        let mut context = Self {
            username: username.into(),
            plans: user_plans.plans,
            active_plan_id: None,
        };
        context.set_active_plan(user_plans.active_plan_id.as_deref());
        context
    }

    pub fn load<R: PlanRepository>(repo: &R, username: &str) -> Result<Self> {
        Ok(Self::new(username, repo.load(username)?))
    }

    /// Write plans and the active pointer back
    pub fn save<R: PlanRepository>(&self, repo: &R) -> Result<()> {
        repo.save(&self.username, &self.plans)?;
        repo.set_active_plan(&self.username, self.active_plan_id.as_deref())
    }

    pub fn active_plan(&self) -> Option<&Plan> {
        let id = self.active_plan_id.as_deref()?;
        self.plans.iter().find(|plan| plan.id == id)
    }

    /// Select a plan by id; an unknown id selects the first plan
    pub fn set_active_plan(&mut self, plan_id: Option<&str>) -> Option<&Plan> {
        let chosen = plan_id
            .and_then(|id| self.plans.iter().find(|plan| plan.id == id))
            .or_else(|| self.plans.first())
            .map(|plan| plan.id.clone());
        self.active_plan_id = chosen;
        self.active_plan()
    }

    /// Create a plan and make it active
    pub fn add_plan(&mut self, new: NewPlan, now: DateTime<Utc>) -> Result<&Plan> {
        let plan = Plan::create(new, now)?;
        self.active_plan_id = Some(plan.id.clone());
        self.plans.push(plan);
        self.active_plan()
            .ok_or_else(|| Error::NotFound("created plan".to_string()))
    }

    /// Flip entry `index` of the active plan
    pub fn toggle(&mut self, index: u32) -> Result<Vec<MilestoneEvent>> {
        let slot = self.active_slot()?;
        let (updated, events) = metrics::toggle_completion(&self.plans[slot], index);
        self.plans[slot] = updated;
        Ok(events)
    }

    /// Complete today's entry of the active plan
    pub fn mark_current_paid(&mut self, today: NaiveDate) -> Result<Vec<MilestoneEvent>> {
        let slot = self.active_slot()?;
        let (updated, events) = metrics::mark_current_paid(&self.plans[slot], today)?;
        self.plans[slot] = updated;
        Ok(events)
    }

    fn active_slot(&self) -> Result<usize> {
        self.active_plan_id
            .as_deref()
            .and_then(|id| self.plans.iter().position(|plan| plan.id == id))
            .ok_or_else(|| Error::Precondition("Create a plan first.".to_string()))
    }
}
