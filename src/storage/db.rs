//! SQLite storage layer for Recall

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::models::{
    FeedbackRecord, FlightEntryType, FlightRecorderEntry, ItemType, KnowledgeItem, NewFlightEntry,
    NewItem, Scope, SearchOptions,
};

/// How long a statement waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ITEM_COLUMNS: &str = "i.id, i.type, i.title, i.content, i.tags, i.scope, i.project_path, \
     i.created_at, i.updated_at, i.usefulness_score, i.use_count";

/// Get the default database path
pub fn default_db_path() -> Result<PathBuf> {
    let config_dir = dirs::home_dir()
        .context("Could not find home directory")?
        .join(".recall");

    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("recall.db"))
}

/// Generates a new item id: the type prefix, a dash and 8 random hex digits.
pub fn generate_item_id(item_type: &ItemType) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}-{:08x}", item_type.id_prefix(), suffix)
}

/// Formats a timestamp so that lexical order matches chronological order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp, degrading to the Unix epoch on corrupt data.
fn parse_timestamp(raw: &str, column: &str, row_id: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            tracing::warn!(
                "Unparseable {} '{}' on row {}: {}; using epoch",
                column,
                raw,
                row_id,
                e
            );
            DateTime::<Utc>::default()
        }
    }
}

/// Parses a stored tag list, degrading to no tags on corrupt data.
fn parse_tags(raw: &str, item_id: &str) -> Vec<String> {
    match serde_json::from_str(raw) {
        Ok(tags) => tags,
        Err(e) => {
            tracing::warn!("Corrupt tag list on item {}: {}; using no tags", item_id, e);
            Vec::new()
        }
    }
}

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        let db = Self { conn };
        db.configure()?;
        db.migrate()?;
        tracing::debug!("Opened knowledge store at {}", path.display());
        Ok(db)
    }

    /// Close the connection, reporting any error from SQLite.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| e)
            .context("Failed to close database")
    }

    /// Connection settings for sharing the file with another process.
    fn configure(&self) -> Result<()> {
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        self.conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;
        Ok(())
    }

    /// Run migrations
    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );
            INSERT OR IGNORE INTO schema_version (version) VALUES (1);

            CREATE TABLE IF NOT EXISTS knowledge_items (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                type TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                scope TEXT NOT NULL DEFAULT 'project',
                project_path TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                usefulness_score REAL NOT NULL DEFAULT 0,
                use_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_fts USING fts5(
                title,
                content,
                content='knowledge_items',
                content_rowid='seq',
                tokenize='porter unicode61'
            );

            CREATE TRIGGER IF NOT EXISTS knowledge_items_ai AFTER INSERT ON knowledge_items BEGIN
                INSERT INTO knowledge_fts(rowid, title, content)
                VALUES (new.seq, new.title, new.content);
            END;

            CREATE TRIGGER IF NOT EXISTS knowledge_items_ad AFTER DELETE ON knowledge_items BEGIN
                INSERT INTO knowledge_fts(knowledge_fts, rowid, title, content)
                VALUES ('delete', old.seq, old.title, old.content);
            END;

            CREATE TRIGGER IF NOT EXISTS knowledge_items_au
            AFTER UPDATE OF title, content ON knowledge_items BEGIN
                INSERT INTO knowledge_fts(knowledge_fts, rowid, title, content)
                VALUES ('delete', old.seq, old.title, old.content);
                INSERT INTO knowledge_fts(rowid, title, content)
                VALUES (new.seq, new.title, new.content);
            END;

            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                useful INTEGER NOT NULL,
                context TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS flight_recorder (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                type TEXT NOT NULL,
                content TEXT NOT NULL,
                rationale TEXT,
                metadata TEXT
            );

            -- Indexes for common queries
            CREATE INDEX IF NOT EXISTS idx_knowledge_items_type ON knowledge_items(type);
            CREATE INDEX IF NOT EXISTS idx_knowledge_items_scope ON knowledge_items(scope);
            CREATE INDEX IF NOT EXISTS idx_feedback_item_id ON feedback(item_id);
            CREATE INDEX IF NOT EXISTS idx_flight_recorder_session
                ON flight_recorder(session_id, timestamp);
            "#,
        )?;
        Ok(())
    }

    // ==================== Knowledge Items ====================

    /// Insert a new knowledge item with a freshly generated id
    pub fn add_item(&self, new_item: &NewItem) -> Result<KnowledgeItem> {
        let now = Utc::now();
        let item = KnowledgeItem {
            id: generate_item_id(&new_item.item_type),
            item_type: new_item.item_type.clone(),
            title: new_item.title.clone(),
            content: new_item.content.clone(),
            tags: new_item.tags.clone(),
            scope: new_item.scope,
            project_path: new_item.project_path.clone(),
            created_at: now,
            updated_at: now,
            usefulness_score: 0.0,
            use_count: 0,
        };

        let tags_json = serde_json::to_string(&item.tags)?;
        let ts = format_timestamp(&now);

        self.conn
            .execute(
                r#"
                INSERT INTO knowledge_items
                    (id, type, title, content, tags, scope, project_path,
                     created_at, updated_at, usefulness_score, use_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 0, 0)
                "#,
                params![
                    item.id,
                    item.item_type.as_str(),
                    item.title,
                    item.content,
                    tags_json,
                    item.scope.as_str(),
                    item.project_path,
                    ts,
                ],
            )
            .context("Failed to insert knowledge item")?;

        tracing::debug!("Added knowledge item {}", item.id);
        Ok(item)
    }

    /// Get a knowledge item by ID
    pub fn get_item(&self, id: &str) -> Result<Option<KnowledgeItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM knowledge_items i WHERE i.id = ?1");
        self.conn
            .query_row(&sql, params![id], Self::row_to_item)
            .optional()
            .context("Failed to get knowledge item")
    }

    /// Ranked full-text search over item titles and content.
    ///
    /// Results are ordered best match first and truncated to the effective
    /// limit. An empty query matches nothing.
    pub fn search(&self, options: &SearchOptions) -> Result<Vec<KnowledgeItem>> {
        if options.query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT {ITEM_COLUMNS} \
             FROM knowledge_fts \
             JOIN knowledge_items i ON i.seq = knowledge_fts.rowid \
             WHERE knowledge_fts MATCH ?"
        );
        let mut values: Vec<rusqlite::types::Value> = vec![options.query.clone().into()];

        let types: Vec<&String> = options.types.iter().filter(|t| !t.is_empty()).collect();
        if !types.is_empty() {
            let placeholders = vec!["?"; types.len()].join(", ");
            sql.push_str(&format!(" AND i.type IN ({placeholders})"));
            values.extend(types.into_iter().map(|t| t.clone().into()));
        }

        if let Some(scope) = options.scope {
            sql.push_str(" AND i.scope = ?");
            values.push(scope.as_str().to_string().into());
        }

        sql.push_str(" ORDER BY bm25(knowledge_fts) LIMIT ?");
        values.push(options.effective_limit().into());

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), Self::row_to_item)?;

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to search knowledge items")
    }

    /// Get total item count
    pub fn item_count(&self) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM knowledge_items", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<KnowledgeItem> {
        let id: String = row.get(0)?;
        let type_str: String = row.get(1)?;
        let tags_str: String = row.get(4)?;
        let scope_str: String = row.get(5)?;
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(8)?;

        let scope = scope_str.parse::<Scope>().unwrap_or_else(|e| {
            tracing::warn!("Item {}: {}; treating as project scope", id, e);
            Scope::Project
        });

        Ok(KnowledgeItem {
            item_type: ItemType::from(type_str),
            title: row.get(2)?,
            content: row.get(3)?,
            tags: parse_tags(&tags_str, &id),
            scope,
            project_path: row.get(6)?,
            created_at: parse_timestamp(&created_at, "created_at", &id),
            updated_at: parse_timestamp(&updated_at, "updated_at", &id),
            usefulness_score: row.get(9)?,
            use_count: row.get(10)?,
            id,
        })
    }

    // ==================== Feedback ====================

    /// Record a usefulness judgment for an item.
    ///
    /// The feedback row and, when `useful` is true, the score and use count
    /// increment are written in one transaction. Returns `None` without
    /// writing anything if the item does not exist.
    pub fn record_feedback(
        &mut self,
        item_id: &str,
        session_id: &str,
        useful: bool,
        context: &str,
    ) -> Result<Option<FeedbackRecord>> {
        let now = Utc::now();
        let ts = format_timestamp(&now);
        let tx = self.conn.transaction()?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM knowledge_items WHERE id = ?1",
                params![item_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Ok(None);
        }

        tx.execute(
            "INSERT INTO feedback (item_id, session_id, useful, context, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![item_id, session_id, useful, context, ts],
        )
        .context("Failed to insert feedback")?;

        if useful {
            tx.execute(
                "UPDATE knowledge_items
                 SET usefulness_score = usefulness_score + 1.0,
                     use_count = use_count + 1,
                     updated_at = ?1
                 WHERE id = ?2",
                params![ts, item_id],
            )
            .context("Failed to update item usefulness")?;
        }

        tx.commit()?;

        Ok(Some(FeedbackRecord {
            item_id: item_id.to_string(),
            session_id: session_id.to_string(),
            useful,
            context: context.to_string(),
            created_at: now,
        }))
    }

    /// Get all feedback recorded for an item, oldest first
    pub fn feedback_for_item(&self, item_id: &str) -> Result<Vec<FeedbackRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, session_id, useful, context, created_at
             FROM feedback
             WHERE item_id = ?1
             ORDER BY id",
        )?;

        let rows = stmt.query_map(params![item_id], |row| {
            let item_id: String = row.get(0)?;
            let created_at: String = row.get(4)?;
            Ok(FeedbackRecord {
                session_id: row.get(1)?,
                useful: row.get(2)?,
                context: row.get(3)?,
                created_at: parse_timestamp(&created_at, "created_at", &item_id),
                item_id,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to get feedback")
    }

    // ==================== Flight Recorder ====================

    /// Append an entry to the flight recorder for a session
    pub fn log_flight_entry(
        &self,
        session_id: &str,
        entry: &NewFlightEntry,
    ) -> Result<FlightRecorderEntry> {
        let now = Utc::now();
        let metadata_json = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO flight_recorder
                    (session_id, timestamp, type, content, rationale, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session_id,
                    format_timestamp(&now),
                    entry.entry_type.as_str(),
                    entry.content,
                    entry.rationale,
                    metadata_json,
                ],
            )
            .context("Failed to write flight recorder entry")?;

        Ok(FlightRecorderEntry {
            id: self.conn.last_insert_rowid(),
            session_id: session_id.to_string(),
            timestamp: now,
            entry_type: entry.entry_type,
            content: entry.content.clone(),
            rationale: entry.rationale.clone(),
            metadata: entry.metadata.clone(),
        })
    }

    /// Get a session's flight recorder entries in timestamp order
    pub fn flight_log(&self, session_id: &str) -> Result<Vec<FlightRecorderEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, timestamp, type, content, rationale, metadata
             FROM flight_recorder
             WHERE session_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            let id: i64 = row.get(0)?;
            let row_id = id.to_string();
            let timestamp: String = row.get(2)?;
            let type_str: String = row.get(3)?;
            let metadata: Option<String> = row.get(6)?;

            let entry_type = type_str.parse::<FlightEntryType>().unwrap_or_else(|e| {
                tracing::warn!("Flight recorder row {}: {}; treating as observation", id, e);
                FlightEntryType::Observation
            });
            let metadata = metadata.and_then(|m| match serde_json::from_str(&m) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Corrupt metadata on flight recorder row {}: {}", id, e);
                    None
                }
            });

            Ok(FlightRecorderEntry {
                id,
                session_id: row.get(1)?,
                timestamp: parse_timestamp(&timestamp, "timestamp", &row_id),
                entry_type,
                content: row.get(4)?,
                rationale: row.get(5)?,
                metadata,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to get flight recorder entries")
    }
}
