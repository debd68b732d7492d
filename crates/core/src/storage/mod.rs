//! SQLite storage layer for Zenith

mod document;
mod migrations;
mod normalize;
mod parse;
mod store;
mod traits;

use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use tracing::instrument;

use crate::error::Result;

pub use document::{Document, ExportBundle, UserPlans, CURRENT_SCHEMA_VERSION};
pub use migrations::{migrate_document, DocumentMigration, DOCUMENT_MIGRATIONS};
pub use normalize::{
    ensure_user_buckets, normalize_document, normalize_plan, normalize_user, normalize_users,
    MAX_TOTAL_DAYS,
};
pub use store::DocumentStore;
pub use traits::{parse_bundle, PlanRepository};

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current table schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    pub fn documents(&self) -> DocumentStore<'_> {
        DocumentStore::new(&self.conn)
    }
}

impl PlanRepository for Database {
    fn load_document(&self) -> Result<Document> {
        self.documents().load(Utc::now())
    }

    fn save_document(&self, document: &Document) -> Result<()> {
        self.documents().save(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPlan, Plan, PlanMode, Session, User};
    use crate::money::Money;
    use chrono::{DateTime, NaiveDate, TimeZone};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn make_plan(name: &str) -> Plan {
        Plan::create(
            NewPlan {
                name: name.to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                mode: PlanMode::Full,
                color_theme: None,
                fixed_daily_amount: None,
            },
            now(),
        )
        .unwrap()
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_user(&User::new("ama".to_string(), "hash".to_string(), now()))
            .unwrap();
        db
    }

    #[test]
    fn test_empty_database_loads_default_document() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version(), 1);
        assert_eq!(db.load_document().unwrap(), Document::default());
        assert_eq!(db.load("nobody").unwrap(), UserPlans::default());
    }

    #[test]
    fn test_upsert_user_creates_empty_bucket() {
        let db = seeded();
        let document = db.load_document().unwrap();
        assert_eq!(document.plans_by_user.get("ama"), Some(&Vec::new()));
        assert!(db.find_user(" ama ").unwrap().is_some());
        assert!(db.find_user("kofi").unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_plans() {
        let db = seeded();
        let mut first = make_plan("First");
        first.completed_days.extend([1, 2, 3]);
        let second = make_plan("Second");
        db.save("ama", &[first.clone(), second.clone()]).unwrap();

        let loaded = db.load("ama").unwrap();
        assert_eq!(loaded.plans, vec![first.clone(), second.clone()]);
        assert_eq!(loaded.active_plan_id.as_deref(), Some(first.id.as_str()));

        db.set_active_plan("ama", Some(&second.id)).unwrap();
        assert_eq!(
            db.load("ama").unwrap().active_plan_id.as_deref(),
            Some(second.id.as_str())
        );

        // An unknown id falls back to the first plan
        db.set_active_plan("ama", Some("missing")).unwrap();
        assert_eq!(
            db.load("ama").unwrap().active_plan_id.as_deref(),
            Some(first.id.as_str())
        );
    }

    #[test]
    fn test_save_for_unknown_user_fails() {
        let db = seeded();
        let result = db.save("kofi", &[make_plan("Nope")]);
        assert!(matches!(result, Err(crate::Error::NotFound(_))));
    }

    #[test]
    fn test_session_round_trip() {
        let db = seeded();
        let session = Session::new("ama".to_string(), now());
        db.set_session(&session).unwrap();
        assert_eq!(db.session().unwrap(), Some(session));
        db.clear_session().unwrap();
        assert_eq!(db.session().unwrap(), None);
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("zenith.db");
        let plan = make_plan("Persistent");
        {
            let db = Database::open(&path).unwrap();
            db.upsert_user(&User::new("ama".to_string(), "hash".to_string(), now()))
                .unwrap();
            db.save("ama", &[plan.clone()]).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.load("ama").unwrap().plans, vec![plan]);
        assert_eq!(db.schema_version(), 1);
    }

    #[test]
    fn test_legacy_row_is_migrated_on_load() {
        let db = Database::open_in_memory().unwrap();
        db.documents()
            .write_raw(&json!({
                "user": { "username": "ama", "passwordHash": "h" },
                "plans": [{
                    "id": "legacy",
                    "name": "Half",
                    "startDate": "2023-01-01",
                    "mode": "half",
                    "totalDays": 182,
                    "targetAmount": 8326.5
                }],
                "activePlanId": "legacy"
            }))
            .unwrap();

        let loaded = db.load("ama").unwrap();
        assert_eq!(loaded.active_plan_id.as_deref(), Some("legacy"));
        assert_eq!(loaded.plans[0].total_days, 365);
        assert_eq!(loaded.plans[0].target_amount(), Money::from_cents(3_339_750));

        let raw = db.documents().read_raw().unwrap().unwrap();
        assert_eq!(raw["schemaVersion"], json!(CURRENT_SCHEMA_VERSION));
        assert!(raw.get("user").is_none());
    }

    #[test]
    fn test_corrupt_row_loads_empty() {
        let db = Database::open_in_memory().unwrap();
        db.documents().write_raw(&json!("garbage")).unwrap();
        assert_eq!(db.load_document().unwrap().users, Vec::new());
    }

    #[test]
    fn test_unreadable_row_is_kept() {
        let db = Database::open_in_memory().unwrap();
        db.documents().write_body(1, "{\"users\": [").unwrap();

        assert!(db.users().unwrap().is_empty());
        assert_eq!(db.documents().read_raw().unwrap(), Some(Value::Null));
        assert_eq!(db.documents().body().unwrap().as_deref(), Some("{\"users\": ["));
    }

    #[test]
    fn test_import_drops_user_without_password_hash() {
        let db = seeded();
        let bundle = json!({
            "version": 2,
            "exportedAt": "2024-06-01T00:00:00Z",
            "users": [
                { "username": "kofi", "passwordHash": "k" },
                { "username": "esi" }
            ],
            "plansByUser": {
                "kofi": [{ "id": "k1", "name": "K", "startDate": "2024-01-01", "mode": "full" }],
                "esi": [{ "id": "e1", "name": "E", "startDate": "2024-01-01", "mode": "full" }]
            },
            "activePlanByUser": { "kofi": "k1", "esi": "e1" }
        });

        let document = db.import_bundle(&bundle, now()).unwrap();
        let names: Vec<&str> = document.users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["kofi"]);
        assert!(!document.plans_by_user.contains_key("esi"));
        assert!(!document.active_plan_by_user.contains_key("esi"));
        assert_eq!(db.load("kofi").unwrap().active_plan_id.as_deref(), Some("k1"));
        // The previous store is replaced
        assert!(db.find_user("ama").unwrap().is_none());
    }

    #[test]
    fn test_import_clears_session() {
        let db = seeded();
        db.set_session(&Session::new("ama".to_string(), now())).unwrap();
        db.import_bundle(
            &json!({ "users": [{ "username": "ama", "passwordHash": "h" }] }),
            now(),
        )
        .unwrap();
        assert_eq!(db.session().unwrap(), None);
    }

    #[test]
    fn test_legacy_import() {
        let db = Database::open_in_memory().unwrap();
        let document = db
            .import_bundle(
                &json!({
                    "user": { "username": "ama", "passwordHash": "h" },
                    "plans": [
                        { "id": "p1", "name": "One", "startDate": "2024-01-01", "mode": "full" },
                        { "id": "p2", "name": "Two", "startDate": "2024-01-01", "mode": "weekly" }
                    ],
                    "activePlanId": "p2"
                }),
                now(),
            )
            .unwrap();

        assert_eq!(document.users.len(), 1);
        assert_eq!(document.plans_by_user["ama"].len(), 2);
        assert_eq!(document.active_plan_by_user["ama"], "p2");
    }

    #[test]
    fn test_rejected_import_writes_nothing() {
        let db = seeded();
        for payload in [
            json!([1, 2]),
            json!("bundle"),
            Value::Null,
            json!({ "users": "ama" }),
            json!({ "version": 99, "users": [] }),
            json!({}),
        ] {
            let result = db.import_bundle(&payload, now());
            assert!(matches!(result, Err(crate::Error::Import(_))), "{payload}");
        }
        assert!(db.find_user("ama").unwrap().is_some());
    }

    #[test]
    fn test_export_matches_interchange_shape() {
        let db = seeded();
        let plan = make_plan("Export");
        db.save("ama", &[plan.clone()]).unwrap();

        let bundle = serde_json::to_value(db.export_bundle(now()).unwrap()).unwrap();
        assert_eq!(bundle["version"], json!(2));
        assert_eq!(bundle["exportedAt"], json!("2024-06-01T12:00:00Z"));
        assert_eq!(bundle["users"][0]["username"], json!("ama"));
        assert_eq!(bundle["plansByUser"]["ama"][0]["targetAmount"], json!(66795.0));
        assert_eq!(bundle["activePlanByUser"]["ama"], json!(plan.id));

        // An export imports back to the same store
        let other = Database::open_in_memory().unwrap();
        let imported = other.import_bundle(&bundle, now()).unwrap();
        assert_eq!(imported.plans_by_user["ama"], vec![plan]);
    }
}
