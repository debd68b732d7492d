//! Record normalization for loaded and imported documents
//!
//! Normalization never fails. Records that cannot be read are dropped and
//! logged at debug level, and every derived value is recomputed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use super::document::{Document, CURRENT_SCHEMA_VERSION};
use super::parse::{
    as_text, datetime_field, flag_keys, is_truthy, positive_field, text_field, trimmed_field,
};
use crate::invariants::assert_document_invariants;
use crate::milestones::Milestone;
use crate::models::{Plan, PlanKind, PlanMode, Session, User, DEFAULT_COLOR_THEME};
use crate::money::Money;
use crate::schedule::parse_plan_date;

/// Day counts used by retired half and quarter plans
const LEGACY_HALF_DAYS: u32 = 182;
const LEGACY_QUARTER_DAYS: u32 = 91;

/// Longest plan a document may describe; longer ones fall back to the mode default
pub const MAX_TOTAL_DAYS: u32 = 3 * 365;

pub fn normalize_user(value: &Value, now: DateTime<Utc>) -> Option<User> {
    if !value.is_object() {
        return None;
    }
    let username = trimmed_field(value, "username")?;
    let password_hash = trimmed_field(value, "passwordHash")?;
    let created_at = datetime_field(value, "createdAt").unwrap_or(now);
    Some(User::new(username, password_hash, created_at))
}

pub fn normalize_plan(value: &Value, now: DateTime<Utc>) -> Option<Plan> {
    if !value.is_object() {
        return None;
    }
    let id = text_field(value, "id").filter(|id| !id.is_empty())?;
    let name = text_field(value, "name").filter(|name| !name.trim().is_empty())?;
    let start_date = text_field(value, "startDate").and_then(|s| parse_plan_date(&s))?;
    let mode = text_field(value, "mode").and_then(|m| PlanMode::from_str(&m))?;

    let explicit_multiplier = positive_field(value, "incrementMultiplier");
    let mut total_days = positive_field(value, "totalDays")
        .and_then(|n| u32::try_from(n.floor() as u64).ok())
        .filter(|n| *n > 0)
        .filter(|n| {
            let fits = *n <= MAX_TOTAL_DAYS;
            if !fits {
                debug!(plan_id = %id, total_days = *n, "Plan duration out of range, using mode default");
            }
            fits
        })
        .unwrap_or_else(|| mode.default_total_days());

    let mut fixed_daily_amount = positive_field(value, "fixedDailyAmount")
        .map(Money::from_f64)
        .filter(|amount| amount.is_positive());
    if mode == PlanMode::Simple && fixed_daily_amount.is_none() {
        fixed_daily_amount = positive_field(value, "targetAmount")
            .map(|target| Money::from_f64(target / f64::from(total_days)))
            .filter(|amount| amount.is_positive());
    }
    if mode == PlanMode::Simple && fixed_daily_amount.is_none() {
        debug!(plan_id = %id, "Simple plan without a daily amount, using 1.00");
        fixed_daily_amount = Some(Money::from_cents(100));
    }

    if explicit_multiplier.is_none() {
        let legacy = match mode {
            PlanMode::Half => total_days == LEGACY_HALF_DAYS,
            PlanMode::Quarter => total_days == LEGACY_QUARTER_DAYS,
            _ => false,
        };
        if legacy {
            debug!(plan_id = %id, from = total_days, "Upgrading legacy plan duration");
            total_days = mode.default_total_days();
        }
    }

    let multiplier = explicit_multiplier.unwrap_or_else(|| mode.default_multiplier());
    let kind = PlanKind::for_mode(mode, multiplier, fixed_daily_amount)?;

    let completed_days: BTreeSet<u32> = flag_keys(value.get("completedDays"))
        .iter()
        .filter_map(|key| key.trim().parse::<u32>().ok())
        .filter(|index| (1..=total_days).contains(index))
        .collect();

    let milestones_hit: BTreeSet<Milestone> = flag_keys(value.get("milestonesHit"))
        .iter()
        .filter_map(|key| Milestone::from_key(key))
        .collect();

    let color_theme = value
        .get("colorTheme")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_COLOR_THEME.to_string());

    Some(Plan {
        id,
        name,
        start_date,
        kind,
        total_days,
        completed_days,
        color_theme,
        milestones_hit,
        created_at: datetime_field(value, "createdAt").unwrap_or(now),
    })
}

/// Valid users in order; for a repeated username the later record wins
pub fn normalize_users(value: Option<&Value>, now: DateTime<Utc>) -> Vec<User> {
    let Some(Value::Array(records)) = value else {
        return Vec::new();
    };

    let users: Vec<User> = records
        .iter()
        .filter_map(|record| {
            let user = normalize_user(record, now);
            if user.is_none() {
                debug!("Dropping malformed user record");
            }
            user
        })
        .collect();

    let last_seen: HashMap<&str, usize> = users
        .iter()
        .enumerate()
        .map(|(position, user)| (user.username.as_str(), position))
        .collect();
    let keep: BTreeSet<usize> = last_seen.values().copied().collect();

    users
        .iter()
        .enumerate()
        .filter(|(position, _)| keep.contains(position))
        .map(|(_, user)| user.clone())
        .collect()
}

pub fn normalize_plans(value: Option<&Value>, now: DateTime<Utc>) -> Vec<Plan> {
    let Some(Value::Array(records)) = value else {
        return Vec::new();
    };
    records
        .iter()
        .filter_map(|record| {
            let plan = normalize_plan(record, now);
            if plan.is_none() {
                debug!("Dropping malformed plan record");
            }
            plan
        })
        .collect()
}

pub fn normalize_plans_by_user(
    value: Option<&Value>,
    now: DateTime<Utc>,
) -> BTreeMap<String, Vec<Plan>> {
    let Some(Value::Object(buckets)) = value else {
        return BTreeMap::new();
    };
    buckets
        .iter()
        .map(|(username, plans)| (username.clone(), normalize_plans(Some(plans), now)))
        .collect()
}

pub fn normalize_active_plan_by_user(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(pointers)) = value else {
        return BTreeMap::new();
    };
    pointers
        .iter()
        .filter(|(_, plan_id)| is_truthy(plan_id))
        .filter_map(|(username, plan_id)| Some((username.clone(), as_text(plan_id)?)))
        .collect()
}

pub fn normalize_session(value: Option<&Value>) -> Option<Session> {
    let value = value.filter(|v| v.is_object())?;
    Some(Session {
        token: trimmed_field(value, "token")?,
        username: trimmed_field(value, "username")?,
        issued_at: datetime_field(value, "issuedAt")?,
        expires_at: datetime_field(value, "expiresAt")?,
    })
}

/// Give every user a bucket and a valid active pointer; drop data of unknown users
pub fn ensure_user_buckets(
    users: &[User],
    plans_by_user: &mut BTreeMap<String, Vec<Plan>>,
    active_plan_by_user: &mut BTreeMap<String, String>,
) {
    let known: BTreeSet<&str> = users.iter().map(|u| u.username.as_str()).collect();

    plans_by_user.retain(|username, _| {
        let keep = known.contains(username.as_str());
        if !keep {
            debug!(username = %username, "Dropping plans of unknown user");
        }
        keep
    });
    active_plan_by_user.retain(|username, _| known.contains(username.as_str()));

    for user in users {
        let plans = plans_by_user.entry(user.username.clone()).or_default();
        let pointer_valid = active_plan_by_user
            .get(&user.username)
            .is_some_and(|active| plans.iter().any(|p| &p.id == active));
        if pointer_valid {
            continue;
        }
        match plans.first() {
            Some(first) => {
                active_plan_by_user.insert(user.username.clone(), first.id.clone());
            }
            None => {
                active_plan_by_user.remove(&user.username);
            }
        }
    }
}

/// Normalize a multi-user document object into its typed form
pub fn normalize_document(value: &Value, now: DateTime<Utc>) -> Document {
    let empty = Map::new();
    let root = value.as_object().unwrap_or(&empty);

    let users = normalize_users(root.get("users"), now);
    let mut plans_by_user = normalize_plans_by_user(root.get("plansByUser"), now);
    let mut active_plan_by_user = normalize_active_plan_by_user(root.get("activePlanByUser"));
    ensure_user_buckets(&users, &mut plans_by_user, &mut active_plan_by_user);

    let session = normalize_session(root.get("session"))
        .filter(|session| users.iter().any(|u| u.username == session.username));

    let document = Document {
        schema_version: CURRENT_SCHEMA_VERSION,
        users,
        plans_by_user,
        active_plan_by_user,
        session,
    };
    assert_document_invariants(&document);
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn plan_record(id: &str) -> Value {
        json!({ "id": id, "name": "Plan", "startDate": "2024-01-01", "mode": "full" })
    }

    #[test]
    fn test_legacy_half_plan_is_upgraded() {
        let plan = normalize_plan(
            &json!({
                "id": "p1",
                "name": "Half",
                "startDate": "2024-01-01",
                "mode": "half",
                "totalDays": 182,
                "targetAmount": 1
            }),
            now(),
        )
        .unwrap();

        assert_eq!(plan.total_days, 365);
        assert_eq!(plan.kind, PlanKind::Half { increment_multiplier: 0.5 });
        assert_eq!(plan.target_amount(), Money::from_cents(3_339_750));
    }

    #[test]
    fn test_explicit_multiplier_keeps_legacy_duration() {
        let plan = normalize_plan(
            &json!({
                "id": "p1",
                "name": "Quarter",
                "startDate": "2024-01-01",
                "mode": "quarter",
                "totalDays": 91,
                "incrementMultiplier": 0.25
            }),
            now(),
        )
        .unwrap();
        assert_eq!(plan.total_days, 91);
    }

    #[test]
    fn test_plan_defaults_and_coercion() {
        let plan = normalize_plan(
            &json!({
                "id": 7,
                "name": "Trip",
                "startDate": "2024-03-01T00:00:00.000Z",
                "mode": "weekly",
                "totalDays": "0",
                "completedDays": { "1": true, "2": false, "60": true, "x": true },
                "milestonesHit": { "30": true, "final": false },
                "colorTheme": 5
            }),
            now(),
        )
        .unwrap();

        assert_eq!(plan.id, "7");
        assert_eq!(plan.start_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(plan.total_days, 52);
        assert_eq!(plan.completed_days, BTreeSet::from([1]));
        assert_eq!(plan.milestones_hit, BTreeSet::from([Milestone::Entries(30)]));
        assert_eq!(plan.color_theme, DEFAULT_COLOR_THEME);
        assert_eq!(plan.created_at, now());
    }

    #[test]
    fn test_oversized_duration_falls_back_to_mode_default() {
        let mut record = plan_record("p1");
        record["totalDays"] = json!(4_000_000_000u64);
        record["completedDays"] = json!([1, 2, 400, 5000]);
        let plan = normalize_plan(&record, now()).unwrap();
        assert_eq!(plan.total_days, 365);
        assert_eq!(plan.completed_days, BTreeSet::from([1, 2]));

        record["totalDays"] = json!(MAX_TOTAL_DAYS);
        let plan = normalize_plan(&record, now()).unwrap();
        assert_eq!(plan.total_days, MAX_TOTAL_DAYS);
        assert_eq!(crate::analytics::cumulative_series(&plan).actual.len(), MAX_TOTAL_DAYS as usize);
    }

    #[test]
    fn test_stored_target_is_ignored() {
        let mut record = plan_record("p1");
        record["targetAmount"] = json!(1);
        let plan = normalize_plan(&record, now()).unwrap();
        assert_eq!(plan.target_amount(), Money::from_cents(6_679_500));
    }

    #[test]
    fn test_simple_daily_amount_from_legacy_target() {
        let plan = normalize_plan(
            &json!({
                "id": "s1",
                "name": "Simple",
                "startDate": "2024-01-01",
                "mode": "simple",
                "targetAmount": "3650"
            }),
            now(),
        )
        .unwrap();
        assert_eq!(plan.kind.fixed_daily_amount(), Some(Money::from_cents(1000)));
        assert_eq!(plan.target_amount(), Money::from_cents(365_000));
    }

    #[test]
    fn test_plan_missing_required_fields_is_dropped() {
        for field in ["id", "name", "startDate", "mode"] {
            let mut record = plan_record("p1");
            record.as_object_mut().unwrap().remove(field);
            assert!(normalize_plan(&record, now()).is_none(), "missing {field}");
        }
        let mut bad_mode = plan_record("p1");
        bad_mode["mode"] = json!("monthly");
        assert!(normalize_plan(&bad_mode, now()).is_none());
        assert!(normalize_plan(&json!("plan"), now()).is_none());
    }

    #[test]
    fn test_later_duplicate_user_wins() {
        let users = normalize_users(
            Some(&json!([
                { "username": "ama", "passwordHash": "first" },
                { "username": "kofi", "passwordHash": "k" },
                { "username": " ama ", "passwordHash": "second" },
                { "username": "", "passwordHash": "x" }
            ])),
            now(),
        );
        let summary: Vec<(&str, &str)> = users
            .iter()
            .map(|u| (u.username.as_str(), u.password_hash.as_str()))
            .collect();
        assert_eq!(summary, vec![("kofi", "k"), ("ama", "second")]);
    }

    #[test]
    fn test_user_requires_password_hash() {
        assert!(normalize_user(&json!({ "username": "ama" }), now()).is_none());
        assert!(normalize_user(&json!({ "username": "ama", "passwordHash": "  " }), now()).is_none());
    }

    #[test]
    fn test_active_pointer_is_reassigned() {
        let document = normalize_document(
            &json!({
                "users": [
                    { "username": "ama", "passwordHash": "h" },
                    { "username": "kofi", "passwordHash": "h" },
                    { "username": "esi", "passwordHash": "h" }
                ],
                "plansByUser": {
                    "ama": [plan_record("a1"), plan_record("a2")],
                    "kofi": []
                },
                "activePlanByUser": { "ama": "gone", "kofi": "also-gone" }
            }),
            now(),
        );

        assert_eq!(document.active_plan_by_user.get("ama").map(String::as_str), Some("a1"));
        assert_eq!(document.active_plan_by_user.get("kofi"), None);
        assert_eq!(document.plans_by_user.get("esi"), Some(&Vec::new()));
        assert_eq!(document.plans_by_user.len(), 3);
    }

    #[test]
    fn test_unknown_user_bucket_is_dropped() {
        let document = normalize_document(
            &json!({
                "users": [
                    { "username": "ama", "passwordHash": "h" },
                    { "username": "ghost" }
                ],
                "plansByUser": {
                    "ama": [plan_record("a1")],
                    "ghost": [plan_record("g1")]
                },
                "activePlanByUser": { "ghost": "g1" }
            }),
            now(),
        );

        assert_eq!(document.users.len(), 1);
        assert!(!document.plans_by_user.contains_key("ghost"));
        assert!(!document.active_plan_by_user.contains_key("ghost"));
        assert_eq!(document.plans_by_user["ama"].len(), 1);
    }

    #[test]
    fn test_session_of_unknown_user_is_dropped() {
        let session = json!({
            "token": "t",
            "username": "ghost",
            "issuedAt": "2024-06-01T00:00:00Z",
            "expiresAt": "2024-06-02T00:00:00Z"
        });
        let document = normalize_document(&json!({ "users": [], "session": session }), now());
        assert_eq!(document.session, None);
        assert!(normalize_session(Some(&session)).is_some());
    }

    #[test]
    fn test_normalize_is_stable() {
        let raw = json!({
            "users": [{ "username": "ama", "passwordHash": "h", "createdAt": "2024-01-01T00:00:00Z" }],
            "plansByUser": { "ama": [plan_record("a1")] }
        });
        let first = normalize_document(&raw, now());
        let reloaded = normalize_document(&serde_json::to_value(&first).unwrap(), now());
        assert_eq!(first, reloaded);
    }
}
