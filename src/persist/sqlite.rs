use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{AggregatorError, Result};
use crate::ingest::types::Posting;
use crate::persist::PostingStore;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    id             TEXT NOT NULL,
    external_id    TEXT NOT NULL DEFAULT '',
    title          TEXT NOT NULL DEFAULT '',
    company        TEXT NOT NULL DEFAULT '',
    url            TEXT NOT NULL,
    source         TEXT NOT NULL DEFAULT '',
    location       TEXT NOT NULL DEFAULT '',
    salary         TEXT NOT NULL DEFAULT '',
    description    TEXT NOT NULL DEFAULT '',
    type_contrat   TEXT NOT NULL DEFAULT '',
    date_creation  TEXT NOT NULL,
    liked          INTEGER NOT NULL DEFAULT 0
);
CREATE UNIQUE INDEX IF NOT EXISTS jobs_url_unique ON jobs(url);
CREATE INDEX IF NOT EXISTS jobs_id_idx ON jobs(id);
";

const SELECT_COLUMNS: &str = "id, external_id, title, company, url, source, location, salary, \
     description, type_contrat, date_creation, liked";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed store. The connection is shared behind a mutex and every
/// operation runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_connection<T, F>(&self, operation_name: &'static str, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                AggregatorError::storage(format!("{operation_name}: connection lock poisoned"))
            })?;
            operation(&mut guard)
        })
        .await
        .map_err(|e| AggregatorError::storage(format!("{operation_name}: {e}")))?
    }
}

fn row_to_posting(row: &Row<'_>) -> rusqlite::Result<Posting> {
    let date: String = row.get(10)?;
    let date_created = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Posting {
        id: row.get(0)?,
        external_id: row.get(1)?,
        title: row.get(2)?,
        company: row.get(3)?,
        url: row.get(4)?,
        source: row.get(5)?,
        location: row.get(6)?,
        salary: row.get(7)?,
        description: row.get(8)?,
        contract_type: row.get(9)?,
        date_created,
        liked: row.get::<_, i64>(11)? != 0,
    })
}

#[async_trait]
impl PostingStore for SqliteStore {
    async fn existing_urls(&self, urls: &[String]) -> Result<HashSet<String>> {
        let urls = urls.to_vec();
        self.with_connection("existing_urls", move |conn| {
            let mut stmt = conn.prepare_cached("SELECT 1 FROM jobs WHERE url = ?1")?;
            let mut found = HashSet::new();
            for url in urls {
                if stmt.exists(params![url])? {
                    found.insert(url);
                }
            }
            Ok(found)
        })
        .await
    }

    async fn insert_batch(&self, postings: &[Posting]) -> Result<usize> {
        let postings = postings.to_vec();
        self.with_connection("insert_batch", move |conn| {
            // Dropping the transaction on error rolls the whole batch back.
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "
INSERT INTO jobs (
    id, external_id, title, company, url, source, location, salary,
    description, type_contrat, date_creation, liked
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
",
                )?;
                for p in &postings {
                    if p.url.is_empty() {
                        return Err(AggregatorError::storage(format!(
                            "posting {} has no url",
                            p.id
                        )));
                    }
                    stmt.execute(params![
                        p.id,
                        p.external_id,
                        p.title,
                        p.company,
                        p.url,
                        p.source,
                        p.location,
                        p.salary,
                        p.description,
                        p.contract_type,
                        p.date_created.format(DATE_FORMAT).to_string(),
                        p.liked as i64,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(postings.len())
        })
        .await
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Posting>> {
        // SQLite reads a negative OFFSET as 0 and a negative LIMIT as unbounded.
        let Ok(offset) = i64::try_from(offset) else {
            return Ok(Vec::new());
        };
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_connection("list", move |conn| {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM jobs ORDER BY seq LIMIT ?1 OFFSET ?2");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit, offset], row_to_posting)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Posting>> {
        let id = id.to_string();
        self.with_connection("get", move |conn| {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM jobs WHERE id = ?1 ORDER BY seq LIMIT 1");
            Ok(conn.query_row(&sql, params![id], row_to_posting).optional()?)
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.with_connection("count", |conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?;
            Ok(n.max(0) as usize)
        })
        .await
    }
}
