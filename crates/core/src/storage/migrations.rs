//! Database and document migration system
//!
//! SQL migrations version the table layout through `schema_migrations`.
//! Document migrations upgrade the stored JSON document one version at a
//! time; every step is idempotent so re-running a chain is harmless.

use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use super::document::CURRENT_SCHEMA_VERSION;
use super::parse::{as_text, number_field, text_field, trimmed_field};
use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Document table",
    sql: r#"
        -- Single-row table holding the whole JSON document
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL,
            body TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#,
}];

/// Create the migrations tracking table
fn init_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version
fn get_current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .unwrap_or(None);
    Ok(version.unwrap_or(0))
}

/// Record that a migration was applied
fn record_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.description,
            chrono::Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

/// Run all pending migrations
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    init_migrations_table(conn)?;

    let current_version = get_current_version(conn)?;
    info!(current_version, "Checking for pending migrations");

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                description = migration.description,
                "Applying migration"
            );

            conn.execute_batch(migration.sql)?;
            record_migration(conn, migration)?;

            info!(version = migration.version, "Migration complete");
        }
    }

    let new_version = get_current_version(conn)?;
    if new_version > current_version {
        info!(
            from = current_version,
            to = new_version,
            "Database schema updated"
        );
    }

    Ok(())
}

/// One upgrade step of the stored document
pub struct DocumentMigration {
    /// Version the document has after this step
    pub version: u32,
    pub description: &'static str,
    pub apply: fn(Value) -> Value,
}

/// All document migrations in order
pub const DOCUMENT_MIGRATIONS: &[DocumentMigration] = &[
    DocumentMigration {
        version: 1,
        description: "Coerce the root into an object",
        apply: ensure_object_root,
    },
    DocumentMigration {
        version: 2,
        description: "Fold the single-user layout into per-user maps",
        apply: fold_legacy_layout,
    },
];

/// Version recorded inside a document; absent means a pre-versioned layout
pub fn document_version(document: &Value) -> u32 {
    number_field(document, "schemaVersion")
        .filter(|v| *v >= 0.0)
        .map(|v| v as u32)
        .unwrap_or(0)
}

/// Apply every document step above the stored version
#[instrument(skip(document))]
pub fn migrate_document(document: Value) -> Value {
    let from = document_version(&document);
    let mut document = document;

    for step in DOCUMENT_MIGRATIONS.iter().filter(|step| step.version > from) {
        info!(
            version = step.version,
            description = step.description,
            "Applying document migration"
        );
        document = (step.apply)(document);
        if let Value::Object(root) = &mut document {
            root.insert("schemaVersion".to_string(), json!(step.version));
        }
    }

    if from < CURRENT_SCHEMA_VERSION {
        info!(from, to = CURRENT_SCHEMA_VERSION, "Document schema updated");
    }
    document
}

fn ensure_object_root(document: Value) -> Value {
    match document {
        Value::Object(_) => document,
        _ => Value::Object(Map::new()),
    }
}

const LEGACY_KEYS: [&str; 3] = ["user", "plans", "activePlanId"];

/// True when the object carries any of the single-user keys
pub fn has_legacy_layout(root: &Map<String, Value>) -> bool {
    LEGACY_KEYS.iter().any(|key| root.contains_key(*key))
}

/// Move `user`, `plans` and `activePlanId` into the per-user maps
///
/// The active id is kept only when it names one of the legacy plans,
/// otherwise the first legacy plan becomes active.
pub fn fold_legacy_layout(document: Value) -> Value {
    let mut root = match document {
        Value::Object(root) => root,
        other => return other,
    };
    if !has_legacy_layout(&root) {
        return Value::Object(root);
    }

    let user = root.remove("user").unwrap_or(Value::Null);
    let plans = match root.remove("plans") {
        Some(Value::Array(plans)) => plans,
        _ => Vec::new(),
    };
    let requested = root
        .remove("activePlanId")
        .as_ref()
        .and_then(as_text);

    let Some(username) = trimmed_field(&user, "username") else {
        debug!("Legacy layout has no usable user, discarding its plans");
        return Value::Object(root);
    };

    let plan_ids: Vec<String> = plans.iter().filter_map(|p| text_field(p, "id")).collect();
    let active = requested
        .filter(|id| plan_ids.contains(id))
        .or_else(|| plan_ids.first().cloned());

    let users = root
        .entry("users")
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(users) = users {
        users.push(user);
    }

    let buckets = root
        .entry("plansByUser")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(buckets) = buckets {
        buckets
            .entry(username.clone())
            .or_insert(Value::Array(plans));
    }

    if let Some(active) = active {
        let pointers = root
            .entry("activePlanByUser")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(pointers) = pointers {
            pointers.entry(username).or_insert(Value::String(active));
        }
    }

    Value::Object(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Get the latest migration version (test helper)
    fn latest_version() -> u32 {
        MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
    }

    #[test]
    fn test_migrations_run() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Run twice
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, latest_version());
    }

    #[test]
    fn test_migrations_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, i + 1);
        }
        for (i, migration) in DOCUMENT_MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, i + 1);
        }
        assert_eq!(
            DOCUMENT_MIGRATIONS.last().map(|m| m.version),
            Some(CURRENT_SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_non_object_root_becomes_empty_document() {
        let migrated = migrate_document(json!([1, 2, 3]));
        assert_eq!(migrated, json!({ "schemaVersion": 2 }));
    }

    #[test]
    fn test_legacy_layout_is_folded() {
        let migrated = migrate_document(json!({
            "user": { "username": "ama", "passwordHash": "h" },
            "plans": [{ "id": "p1" }, { "id": "p2" }],
            "activePlanId": "p2"
        }));

        assert_eq!(
            migrated,
            json!({
                "schemaVersion": 2,
                "users": [{ "username": "ama", "passwordHash": "h" }],
                "plansByUser": { "ama": [{ "id": "p1" }, { "id": "p2" }] },
                "activePlanByUser": { "ama": "p2" }
            })
        );
    }

    #[test]
    fn test_unknown_legacy_active_falls_back_to_first_plan() {
        let migrated = fold_legacy_layout(json!({
            "user": { "username": "ama", "passwordHash": "h" },
            "plans": [{ "id": "p1" }],
            "activePlanId": "nope"
        }));
        assert_eq!(migrated["activePlanByUser"], json!({ "ama": "p1" }));
    }

    #[test]
    fn test_document_steps_are_idempotent() {
        let legacy = json!({
            "user": { "username": "ama", "passwordHash": "h" },
            "plans": []
        });
        let once = migrate_document(legacy);
        let twice = fold_legacy_layout(ensure_object_root(once.clone()));
        assert_eq!(once, twice);
        assert_eq!(migrate_document(once.clone()), once);
    }

    #[test]
    fn test_current_document_is_untouched() {
        let current = json!({ "schemaVersion": 2, "users": [], "plans": "not legacy here" });
        assert_eq!(migrate_document(current.clone()), current);
    }
}
