//! Per-tenant MCP server config storage plus share-token issuance/resolution (spec §4.3).

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use gateway_mcp::McpServerEntry;
use rand::RngCore;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::error::{StoreError, StoreResult};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Hex-encodes a SHA-256 digest so share tokens are never stored in recoverable form.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Generates a 128-bit-entropy, URL-safe opaque token.
fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub struct McpStore {
    db: Arc<Mutex<rusqlite::Connection>>,
}

impl McpStore {
    pub fn new(path: impl AsRef<std::path::Path>) -> StoreResult<Self> {
        let conn = rusqlite::Connection::open(path).map_err(|e| StoreError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS mcp_servers (
                owner_api_key TEXT NOT NULL,
                name TEXT NOT NULL,
                entry TEXT NOT NULL,
                PRIMARY KEY (owner_api_key, name)
            );
            CREATE TABLE IF NOT EXISTS mcp_shares (
                token_hash TEXT PRIMARY KEY,
                owner_api_key TEXT NOT NULL,
                entry TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn put(&self, owner: &str, name: &str, entry: McpServerEntry) -> StoreResult<McpServerEntry> {
        let db = self.db.clone();
        let owner = owner.to_string();
        let name = name.to_string();
        let entry_json = serde_json::to_string(&entry).map_err(|e| StoreError::Storage(e.to_string()))?;
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            conn.execute(
                "INSERT INTO mcp_servers (owner_api_key, name, entry) VALUES (?1, ?2, ?3)
                 ON CONFLICT(owner_api_key, name) DO UPDATE SET entry = excluded.entry",
                params![owner, name, entry_json],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })?;
        Ok(entry)
    }

    pub async fn get(&self, owner: &str, name: &str) -> StoreResult<McpServerEntry> {
        let db = self.db.clone();
        let owner = owner.to_string();
        let name = name.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            let raw: Option<String> = conn
                .query_row(
                    "SELECT entry FROM mcp_servers WHERE owner_api_key = ?1 AND name = ?2",
                    params![owner, name],
                    |r| r.get(0),
                )
                .optional()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            match raw {
                Some(json) => serde_json::from_str(&json).map_err(|e| StoreError::Storage(e.to_string())),
                None => Err(StoreError::NotFound),
            }
        })
    }

    pub async fn list(&self, owner: &str) -> StoreResult<Vec<(String, McpServerEntry)>> {
        let db = self.db.clone();
        let owner = owner.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            let mut stmt = conn
                .prepare("SELECT name, entry FROM mcp_servers WHERE owner_api_key = ?1 ORDER BY name ASC")
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![owner], |row| {
                    let name: String = row.get(0)?;
                    let entry: String = row.get(1)?;
                    Ok((name, entry))
                })
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let mut out = Vec::new();
            for row in rows {
                let (name, entry_json) = row.map_err(|e| StoreError::Storage(e.to_string()))?;
                let entry: McpServerEntry =
                    serde_json::from_str(&entry_json).map_err(|e| StoreError::Storage(e.to_string()))?;
                out.push((name, entry));
            }
            Ok(out)
        })
    }

    pub async fn delete(&self, owner: &str, name: &str) -> StoreResult<()> {
        let db = self.db.clone();
        let owner = owner.to_string();
        let name = name.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            let changed = conn
                .execute(
                    "DELETE FROM mcp_servers WHERE owner_api_key = ?1 AND name = ?2",
                    params![owner, name],
                )
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    pub async fn share_create(&self, owner: &str, entry: McpServerEntry, ttl: Duration) -> StoreResult<String> {
        let token = generate_token();
        let token_hash = hash_token(&token);
        let expires_at = now_ms() + ttl.as_millis() as i64;
        let entry_json = serde_json::to_string(&entry).map_err(|e| StoreError::Storage(e.to_string()))?;
        let db = self.db.clone();
        let owner = owner.to_string();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            conn.execute(
                "INSERT INTO mcp_shares (token_hash, owner_api_key, entry, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![token_hash, owner, entry_json, expires_at],
            )
            .map_err(|e| StoreError::Storage(e.to_string()))?;
            Ok(())
        })?;
        Ok(token)
    }

    /// Resolves a share token. Returns `NotFound` — never a distinct "forbidden" — both when
    /// the token doesn't exist and when it exists but is owned by someone else, so a caller
    /// cannot use the error shape to probe for token existence.
    pub async fn share_resolve(&self, owner: &str, token: &str) -> StoreResult<McpServerEntry> {
        let token_hash = hash_token(token);
        let db = self.db.clone();
        let owner = owner.to_string();
        let now = now_ms();
        tokio::task::block_in_place(move || {
            let conn = db.lock().map_err(|_| StoreError::Storage("lock poisoned".into()))?;
            let row: Option<(String, String, i64)> = conn
                .query_row(
                    "SELECT owner_api_key, entry, expires_at FROM mcp_shares WHERE token_hash = ?1",
                    params![token_hash],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
                )
                .optional()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            match row {
                Some((share_owner, entry_json, expires_at)) if share_owner == owner && expires_at > now => {
                    serde_json::from_str(&entry_json).map_err(|e| StoreError::Storage(e.to_string()))
                }
                _ => Err(StoreError::NotFound),
            }
        })
    }
}
