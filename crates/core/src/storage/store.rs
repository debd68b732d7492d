//! Document row persistence
//!
//! The whole document lives in a single row of the `documents` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::document::Document;
use super::migrations::{document_version, migrate_document};
use super::normalize::normalize_document;
use super::parse::OptionalExt;
use crate::error::Result;

const DOCUMENT_ROW: i64 = 1;

pub struct DocumentStore<'a> {
    conn: &'a Connection,
}

impl<'a> DocumentStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn read_body(&self) -> Result<Option<String>> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE id = ?1",
                params![DOCUMENT_ROW],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    /// Stored JSON body, if any document was ever written
    ///
    /// A body that is not valid JSON reads as `Null`.
    pub fn read_raw(&self) -> Result<Option<Value>> {
        Ok(self
            .read_body()?
            .map(|body| serde_json::from_str(&body).unwrap_or(Value::Null)))
    }

    /// Load, migrate and normalize the document
    ///
    /// An upgraded document is written back before it is returned. An
    /// unreadable body loads as an empty document and stays untouched.
    #[instrument(skip(self))]
    pub fn load(&self, now: DateTime<Utc>) -> Result<Document> {
        let Some(body) = self.read_body()? else {
            return Ok(Document::default());
        };
        let raw: Value = match serde_json::from_str(&body) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Stored document is not valid JSON, starting empty");
                return Ok(normalize_document(&Value::Null, now));
            }
        };

        let stored_version = document_version(&raw);
        let document = normalize_document(&migrate_document(raw), now);
        if stored_version < document.schema_version {
            debug!(from = stored_version, "Persisting migrated document");
            self.save(&document)?;
        }
        Ok(document)
    }

    /// Replace the stored document in one transaction
    #[instrument(skip(self, document), fields(users = document.users.len()))]
    pub fn save(&self, document: &Document) -> Result<()> {
        let body = serde_json::to_string(document)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO documents (id, schema_version, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                DOCUMENT_ROW,
                document.schema_version,
                body,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Store an arbitrary body as-is
    #[cfg(test)]
    pub fn write_raw(&self, body: &Value) -> Result<()> {
        self.write_body(document_version(body), &body.to_string())
    }

    #[cfg(test)]
    pub fn write_body(&self, schema_version: u32, body: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO documents (id, schema_version, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![DOCUMENT_ROW, schema_version, body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn body(&self) -> Result<Option<String>> {
        self.read_body()
    }
}
