//! Two-tier (cache + durable) session persistence with a distributed per-session lock
//! implemented as a row-level optimistic lease in the durable store.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use moka::future::Cache;
use rand::Rng;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Brainstorm,
    Code,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub model: String,
    pub status: SessionStatus,
    pub owner_api_key: String,
    pub working_directory: Option<String>,
    pub parent_session_id: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub total_turns: u64,
    pub total_cost: Option<f64>,
    pub metadata: HashMap<String, Value>,
    pub tags: BTreeSet<String>,
    pub mode: SessionMode,
}

#[derive(Clone, Debug, Default)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub total_turns_delta: Option<u64>,
    pub total_cost_delta: Option<f64>,
    pub metadata: Option<HashMap<String, Value>>,
    pub tags: Option<BTreeSet<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct SessionFilters {
    pub mode: Option<SessionMode>,
    pub tags: Vec<String>,
    pub search: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub index: u64,
    pub resume_token: String,
    pub summary: String,
    pub created_at_ms: i64,
}

pub struct LockConfig {
    pub ttl: Duration,
    pub retry_count: u32,
    pub base_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            retry_count: 8,
            base_delay: Duration::from_millis(50),
        }
    }
}

pub struct SessionStore {
    db: Arc<Mutex<rusqlite::Connection>>,
    cache: Cache<String, Session>,
    lock_config: LockConfig,
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let status: String = row.get("status")?;
    let mode: String = row.get("mode")?;
    let metadata_json: String = row.get("metadata")?;
    let tags_json: String = row.get("tags")?;
    Ok(Session {
        id: row.get("id")?,
        model: row.get("model")?,
        status: match status.as_str() {
            "active" => SessionStatus::Active,
            "completed" => SessionStatus::Completed,
            _ => SessionStatus::Error,
        },
        owner_api_key: row.get("owner_api_key")?,
        working_directory: row.get("working_directory")?,
        parent_session_id: row.get("parent_session_id")?,
        created_at_ms: row.get("created_at")?,
        updated_at_ms: row.get("updated_at")?,
        total_turns: row.get::<_, i64>("total_turns")? as u64,
        total_cost: row.get("total_cost")?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        mode: if mode == "code" {
            SessionMode::Code
        } else {
            SessionMode::Brainstorm
        },
    })
}

fn status_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Active => "active",
        SessionStatus::Completed => "completed",
        SessionStatus::Error => "error",
    }
}

fn mode_str(m: SessionMode) -> &'static str {
    match m {
        SessionMode::Brainstorm => "brainstorm",
        SessionMode::Code => "code",
    }
}

impl SessionStore {
    pub fn new(
        path: impl AsRef<std::path::Path>,
        cache_ttl: Duration,
        lock_config: LockConfig,
    ) -> StoreResult<Self> {
        let conn = rusqlite::Connection::open(path).map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                model TEXT NOT NULL,
                status TEXT NOT NULL,
                owner_api_key TEXT NOT NULL,
                working_directory TEXT,
                parent_session_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                total_turns INTEGER NOT NULL DEFAULT 0,
                total_cost REAL,
                metadata TEXT NOT NULL DEFAULT '{}',
                tags TEXT NOT NULL DEFAULT '[]',
                mode TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_owner ON sessions(owner_api_key, created_at DESC, id ASC);

            CREATE TABLE IF NOT EXISTS checkpoints (
                session_id TEXT NOT NULL,
                idx INTEGER NOT NULL,
                resume_token TEXT NOT NULL,
                summary TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (session_id, idx)
            );

            CREATE TABLE IF NOT EXISTS session_locks (
                session_id TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            cache: Cache::builder().time_to_live(cache_ttl).build(),
            lock_config,
        })
    }

    pub async fn create(
        &self,
        owner: &str,
        model: &str,
        working_directory: Option<String>,
        parent_session_id: Option<String>,
        mode: SessionMode,
    ) -> StoreResult<Session> {
        if let Some(parent_id) = &parent_session_id {
            let parent = self.get(parent_id, owner).await?;
            if parent.owner_api_key != owner {
                return Err(StoreError::NotFound);
            }
        }
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_ms();
        let session = Session {
            id: id.clone(),
            model: model.to_string(),
            status: SessionStatus::Active,
            owner_api_key: owner.to_string(),
            working_directory,
            parent_session_id,
            created_at_ms: now,
            updated_at_ms: now,
            total_turns: 0,
            total_cost: None,
            metadata: HashMap::new(),
            tags: BTreeSet::new(),
            mode,
        };
        let db = self.db.clone();
        let s = session.clone();
        tokio::task::block_in_place(|| {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            let existing: Option<String> = conn
                .query_row("SELECT id FROM sessions WHERE id = ?1", params![s.id], |r| r.get(0))
                .optional()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            if existing.is_some() {
                return Err(StoreError::AlreadyExists);
            }
            conn.execute(
                "INSERT INTO sessions (id, model, status, owner_api_key, working_directory, parent_session_id, created_at, updated_at, total_turns, total_cost, metadata, tags, mode)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    s.id,
                    s.model,
                    status_str(s.status),
                    s.owner_api_key,
                    s.working_directory,
                    s.parent_session_id,
                    s.created_at_ms,
                    s.updated_at_ms,
                    s.total_turns as i64,
                    s.total_cost,
                    serde_json::to_string(&s.metadata).unwrap_or_else(|_| "{}".into()),
                    serde_json::to_string(&s.tags).unwrap_or_else(|_| "[]".into()),
                    mode_str(s.mode),
                ],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })?;
        self.cache.insert(id, session.clone()).await;
        Ok(session)
    }

    pub async fn get(&self, id: &str, current_owner: &str) -> StoreResult<Session> {
        if let Some(session) = self.cache.get(id).await {
            if session.owner_api_key != current_owner {
                return Err(StoreError::NotFound);
            }
            return Ok(session);
        }
        let session = self.get_durable(id).await?;
        if session.owner_api_key != current_owner {
            return Err(StoreError::NotFound);
        }
        self.cache.insert(id.to_string(), session.clone()).await;
        Ok(session)
    }

    async fn get_durable(&self, id: &str) -> StoreResult<Session> {
        let db = self.db.clone();
        let id = id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            conn.query_row("SELECT * FROM sessions WHERE id = ?1", params![id], row_to_session)
                .optional()
                .map_err(|e| StoreError::Storage(e.to_string()))?
                .ok_or(StoreError::NotFound)
        })
    }

    pub async fn list(
        &self,
        owner: &str,
        page: u32,
        page_size: u32,
        filters: SessionFilters,
    ) -> StoreResult<(Vec<Session>, u64)> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 1000);
        let offset = (page - 1) as i64 * page_size as i64;
        let db = self.db.clone();
        let owner = owner.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;

            // owner_api_key is always the first predicate; mode/tags/search are pushed in as
            // additional WHERE clauses rather than filtered out of the result set afterward, so
            // pagination and COUNT(*) both see the same row set.
            let mut clauses = vec!["owner_api_key = ?1".to_string()];
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(owner.clone())];

            if let Some(mode) = filters.mode {
                clauses.push(format!("mode = ?{}", values.len() + 1));
                values.push(Box::new(mode_str(mode).to_string()));
            }
            for tag in &filters.tags {
                clauses.push(format!("instr(tags, ?{}) > 0", values.len() + 1));
                values.push(Box::new(format!("\"{tag}\"")));
            }
            if let Some(needle) = &filters.search {
                clauses.push(format!("instr(model, ?{}) > 0", values.len() + 1));
                values.push(Box::new(needle.clone()));
            }

            let where_clause = clauses.join(" AND ");
            let list_sql = format!(
                "SELECT * FROM sessions WHERE {where_clause} ORDER BY created_at DESC, id ASC LIMIT ?{} OFFSET ?{}",
                values.len() + 1,
                values.len() + 2,
            );
            let page_size_i64 = page_size as i64;
            let mut list_values = values.iter().map(|v| v.as_ref()).collect::<Vec<_>>();
            list_values.push(&page_size_i64 as &dyn rusqlite::ToSql);
            list_values.push(&offset as &dyn rusqlite::ToSql);

            let mut stmt = conn.prepare(&list_sql).map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(list_values.as_slice(), row_to_session)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let sessions: Vec<Session> = rows
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::Storage(e.to_string()))?;

            let count_sql = format!("SELECT COUNT(*) FROM sessions WHERE {where_clause}");
            let count_values = values.iter().map(|v| v.as_ref()).collect::<Vec<_>>();
            let total: i64 = conn
                .query_row(&count_sql, count_values.as_slice(), |r| r.get(0))
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok((sessions, total as u64))
        })
    }

    pub async fn update(&self, id: &str, owner: &str, patch: SessionPatch) -> StoreResult<Session> {
        let id = id.to_string();
        let owner = owner.to_string();
        self.with_lock(&id.clone(), || {
            let id = id.clone();
            let owner = owner.clone();
            let patch = patch.clone();
            async move {
                let mut session = self.get(&id, &owner).await?;
                if let Some(status) = patch.status {
                    session.status = status;
                }
                if let Some(delta) = patch.total_turns_delta {
                    session.total_turns += delta;
                }
                if let Some(delta) = patch.total_cost_delta {
                    session.total_cost = Some(session.total_cost.unwrap_or(0.0) + delta);
                }
                if let Some(metadata) = patch.metadata {
                    session.metadata = metadata;
                }
                if let Some(tags) = patch.tags {
                    session.tags = tags;
                }
                session.updated_at_ms = now_ms();
                self.write_durable(&session).await?;
                self.cache.insert(session.id.clone(), session.clone()).await;
                Ok(session)
            }
        })
        .await
    }

    async fn write_durable(&self, session: &Session) -> StoreResult<()> {
        let db = self.db.clone();
        let s = session.clone();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            let changed = conn
                .execute(
                    "UPDATE sessions SET status = ?1, total_turns = ?2, total_cost = ?3, metadata = ?4, tags = ?5, updated_at = ?6 WHERE id = ?7",
                    params![
                        status_str(s.status),
                        s.total_turns as i64,
                        s.total_cost,
                        serde_json::to_string(&s.metadata).unwrap_or_else(|_| "{}".into()),
                        serde_json::to_string(&s.tags).unwrap_or_else(|_| "[]".into()),
                        s.updated_at_ms,
                        s.id,
                    ],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    pub async fn delete(&self, id: &str, owner: &str) -> StoreResult<()> {
        let _ = self.get(id, owner).await?;
        let db = self.db.clone();
        let id_owned = id.to_string();
        let owner_owned = owner.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            let changed = conn
                .execute(
                    "DELETE FROM sessions WHERE id = ?1 AND owner_api_key = ?2",
                    params![id_owned, owner_owned],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })?;
        self.cache.invalidate(id).await;
        Ok(())
    }

    /// Runs `f` under a best-effort exclusive lease on `id`, implemented as a CAS row in
    /// `session_locks`. Retries with exponential backoff and jitter up to `lock_config.retry_count`.
    pub async fn with_lock<F, Fut, T>(&self, id: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = StoreResult<T>>,
    {
        let holder = uuid::Uuid::new_v4().to_string();
        let mut attempt = 0;
        loop {
            if self.try_acquire_lock(id, &holder).await? {
                break;
            }
            attempt += 1;
            if attempt > self.lock_config.retry_count {
                return Err(StoreError::LockConflict);
            }
            let backoff = self.lock_config.base_delay * 2u32.pow(attempt.min(10));
            let jitter_ms = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 4 + 1);
            tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
        }
        let result = f().await;
        self.release_lock(id, &holder).await?;
        result
    }

    async fn try_acquire_lock(&self, id: &str, holder: &str) -> StoreResult<bool> {
        let db = self.db.clone();
        let id = id.to_string();
        let holder = holder.to_string();
        let now = now_ms();
        let expires_at = now + self.lock_config.ttl.as_millis() as i64;
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            let changed = conn
                .execute(
                    "INSERT INTO session_locks (session_id, holder, expires_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(session_id) DO UPDATE SET holder = excluded.holder, expires_at = excluded.expires_at
                     WHERE session_locks.expires_at < ?4",
                    params![id, holder, expires_at, now],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(changed == 1)
        })
    }

    async fn release_lock(&self, id: &str, holder: &str) -> StoreResult<()> {
        let db = self.db.clone();
        let id = id.to_string();
        let holder = holder.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            conn.execute(
                "DELETE FROM session_locks WHERE session_id = ?1 AND holder = ?2",
                params![id, holder],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })
    }

    pub async fn checkpoint_list(&self, id: &str, owner: &str) -> StoreResult<Vec<Checkpoint>> {
        let _ = self.get(id, owner).await?;
        let db = self.db.clone();
        let id = id.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            let mut stmt = conn
                .prepare("SELECT session_id, idx, resume_token, summary, created_at FROM checkpoints WHERE session_id = ?1 ORDER BY idx ASC")
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![id], |row| {
                    Ok(Checkpoint {
                        session_id: row.get(0)?,
                        index: row.get::<_, i64>(1)? as u64,
                        resume_token: row.get(2)?,
                        summary: row.get(3)?,
                        created_at_ms: row.get(4)?,
                    })
                })
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|e| StoreError::Storage(e.to_string()))
        })
    }

    pub async fn append_checkpoint(
        &self,
        id: &str,
        resume_token: &str,
        summary: &str,
    ) -> StoreResult<Checkpoint> {
        let db = self.db.clone();
        let id = id.to_string();
        let resume_token = resume_token.to_string();
        let summary = summary.to_string();
        let now = now_ms();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            let next_idx: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(idx), -1) + 1 FROM checkpoints WHERE session_id = ?1",
                    params![id],
                    |r| r.get(0),
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT INTO checkpoints (session_id, idx, resume_token, summary, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, next_idx, resume_token, summary, now],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(Checkpoint {
                session_id: id,
                index: next_idx as u64,
                resume_token,
                summary,
                created_at_ms: now,
            })
        })
    }

    pub async fn fork(&self, id: &str, owner: &str, checkpoint_index: u64) -> StoreResult<Session> {
        let parent = self.get(id, owner).await?;
        let checkpoints = self.checkpoint_list(id, owner).await?;
        if !checkpoints.iter().any(|c| c.index == checkpoint_index) {
            return Err(StoreError::NotFound);
        }
        self.create(
            owner,
            &parent.model,
            parent.working_directory.clone(),
            Some(parent.id.clone()),
            parent.mode,
        )
        .await
    }

    pub async fn resume(&self, id: &str, owner: &str) -> StoreResult<Session> {
        self.update(
            id,
            owner,
            SessionPatch {
                status: Some(SessionStatus::Active),
                ..Default::default()
            },
        )
        .await
    }
}
