//! Database backend
//!
//! Reads lines from a SQLite-compatible table through Turso using keyset
//! pagination over `(timestamp, id)`.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE lines (
//!     id        TEXT    NOT NULL,
//!     timestamp INTEGER NOT NULL,   -- epoch milliseconds
//!     seq       INTEGER NOT NULL DEFAULT 0,
//!     logger    TEXT    NOT NULL DEFAULT '',
//!     message   TEXT    NOT NULL DEFAULT '',
//!     context   TEXT    NOT NULL DEFAULT '{}'  -- JSON object of strings
//! );
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use tracing::info;
use turso::{Builder, Database};

use crate::backend::Source;
use crate::error::SourceError;
use crate::filter::Query;
use crate::line::{Direction, Line};
use crate::page::Page;

/// Turso-backed source
pub struct DatabaseSource {
    db: Database,
    table: String,
}

impl std::fmt::Debug for DatabaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSource")
            .field("table", &self.table)
            .finish()
    }
}

impl DatabaseSource {
    /// Open a database file, creating the table if it doesn't exist
    pub async fn open(path: impl AsRef<Path>, table: impl Into<String>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| SourceError::Config(format!("non UTF-8 path: {}", path.display())))?;

        info!(path = %path.display(), "Opening line database");
        let db = Builder::new_local(path_str).build().await?;
        Self::with_database(db, table).await
    }

    /// Open an in-memory database (for testing)
    pub async fn open_memory(table: impl Into<String>) -> Result<Self, SourceError> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::with_database(db, table).await
    }

    async fn with_database(db: Database, table: impl Into<String>) -> Result<Self, SourceError> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(SourceError::Config(format!(
                "table '{}' is not a plain identifier",
                table
            )));
        }

        let source = Self { db, table };
        source.init_schema().await?;
        Ok(source)
    }

    async fn init_schema(&self) -> Result<(), SourceError> {
        let conn = self.db.connect()?;
        conn.execute(
            &format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id TEXT NOT NULL,
                    timestamp INTEGER NOT NULL,
                    seq INTEGER NOT NULL DEFAULT 0,
                    logger TEXT NOT NULL DEFAULT '',
                    message TEXT NOT NULL DEFAULT '',
                    context TEXT NOT NULL DEFAULT '{{}}'
                )
                "#,
                self.table
            ),
            (),
        )
        .await?;
        Ok(())
    }

    /// Insert one line
    pub async fn insert(&self, line: &Line) -> Result<(), SourceError> {
        let conn = self.db.connect()?;

        let timestamp = line.timestamp().timestamp_millis().to_string();
        let seq = line.seq().to_string();
        let context = serde_json::to_string(line.context())?;

        conn.execute(
            &format!(
                r#"
                INSERT INTO {} (id, timestamp, seq, logger, message, context)
                VALUES (?1, CAST(?2 AS INTEGER), CAST(?3 AS INTEGER), ?4, ?5, ?6)
                "#,
                self.table
            ),
            [
                line.id(),
                timestamp.as_str(),
                seq.as_str(),
                line.logger(),
                line.message(),
                context.as_str(),
            ],
        )
        .await?;

        Ok(())
    }

    fn row_to_line(row: &turso::Row) -> Result<Line, SourceError> {
        let id = row.get_value(0)?.as_text().cloned().unwrap_or_default();
        let millis = *row.get_value(1)?.as_integer().unwrap_or(&0);
        let seq = *row.get_value(2)?.as_integer().unwrap_or(&0);
        let logger = row.get_value(3)?.as_text().cloned().unwrap_or_default();
        let message = row.get_value(4)?.as_text().cloned().unwrap_or_default();
        let context_json = row
            .get_value(5)?
            .as_text()
            .cloned()
            .unwrap_or_else(|| "{}".to_string());

        let timestamp = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            SourceError::Serialization(format!("timestamp out of range: {}", millis))
        })?;
        let context: BTreeMap<String, String> = serde_json::from_str(&context_json)?;

        let mut line = Line::new(id, timestamp)
            .with_seq(u64::try_from(seq).unwrap_or_default())
            .with_logger(logger)
            .with_message(message);
        for (key, value) in context {
            line = line.with_context(key, value);
        }
        Ok(line)
    }
}

#[async_trait]
impl Source for DatabaseSource {
    async fn get(&self, query: &Query) -> Result<Page, SourceError> {
        let sql = build_select(&self.table, query);
        let conn = self.db.connect()?;

        let mut rows = conn.query(&sql, ()).await?;
        let mut candidates = Vec::with_capacity(query.fetch_size.max(1) + 1);
        while let Some(row) = rows.next().await? {
            candidates.push(Self::row_to_line(&row)?);
        }

        tracing::debug!(
            table = %self.table,
            rows = candidates.len(),
            fetch_size = query.fetch_size,
            "Database page fetched"
        );

        Ok(Page::from_candidates(candidates, query.fetch_size))
    }

    fn name(&self) -> &'static str {
        "database"
    }
}

// =============================================================================
// SQL Building
// =============================================================================

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote a string literal
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Column expression for a filter field
fn column(field: &str) -> String {
    match field {
        "id" | "logger" | "message" => field.to_string(),
        key => {
            let path = format!("$.\"{}\"", key.replace('"', ""));
            format!("json_extract(context, {})", quote(&path))
        }
    }
}

/// Build the keyset query for one bounded fetch
fn build_select(table: &str, query: &Query) -> String {
    let mut conditions = Vec::new();

    for (field, values) in query.filters.active_matches() {
        let list: Vec<String> = values.iter().map(|v| quote(v)).collect();
        conditions.push(format!("{} IN ({})", column(field), list.join(", ")));
    }

    for (field, prefixes) in query.filters.active_prefixes() {
        let col = column(field);
        let any: Vec<String> = prefixes
            .iter()
            .map(|p| format!("substr({}, 1, {}) = {}", col, p.chars().count(), quote(p)))
            .collect();
        conditions.push(format!("({})", any.join(" OR ")));
    }

    let (cmp, order) = match query.direction {
        Direction::Asc => (">", "ASC"),
        Direction::Desc => ("<", "DESC"),
    };

    if let Some(after) = &query.after {
        let (millis, id) = after.sort_key();
        let id = quote(id);
        conditions.push(format!(
            "(timestamp {cmp} {millis} OR (timestamp = {millis} AND id {cmp} {id}))"
        ));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    format!(
        "SELECT id, timestamp, seq, logger, message, context FROM {table}{where_clause} ORDER BY timestamp {order}, id {order} LIMIT {}",
        query.fetch_size.max(1) + 1
    )
}

#[cfg(test)]
#[path = "database_test.rs"]
mod tests;
