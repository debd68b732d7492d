//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use std::collections::BTreeSet;

use crate::models::{Plan, PlanKind};
use crate::storage::{Document, MAX_TOTAL_DAYS};

/// Validate that a plan's state is internally consistent
pub fn assert_plan_invariants(plan: &Plan) {
    debug_assert!(!plan.name.trim().is_empty(), "Plan {} has empty name", plan.id);

    debug_assert!(
        plan.total_days > 0 && plan.total_days <= MAX_TOTAL_DAYS,
        "Plan {} has {} entries",
        plan.id,
        plan.total_days
    );

    // Multipliers and daily amounts are strictly positive
    let positive = match plan.kind {
        PlanKind::Simple { fixed_daily_amount } => fixed_daily_amount.is_positive(),
        _ => plan.kind.increment_multiplier() > 0.0,
    };
    debug_assert!(positive, "Plan {} has a non-positive amount scale", plan.id);

    debug_assert!(
        plan.completed_days.iter().all(|i| plan.contains_index(*i)),
        "Plan {} has completed indices outside 1..={}",
        plan.id,
        plan.total_days
    );
}

/// Validate bucket consistency of a normalized document
pub fn assert_document_invariants(document: &Document) {
    let usernames: BTreeSet<&str> = document.users.iter().map(|u| u.username.as_str()).collect();

    debug_assert_eq!(
        usernames.len(),
        document.users.len(),
        "Document has duplicate usernames"
    );

    // Exactly one bucket per known user
    debug_assert!(
        document.plans_by_user.keys().map(String::as_str).eq(usernames.iter().copied()),
        "Plan buckets do not match users"
    );

    for (username, active) in &document.active_plan_by_user {
        let found = document
            .plans_by_user
            .get(username)
            .is_some_and(|plans| plans.iter().any(|p| &p.id == active));
        debug_assert!(found, "User {} points at missing plan {}", username, active);
    }

    for plan in document.plans_by_user.values().flatten() {
        assert_plan_invariants(plan);
    }
}
