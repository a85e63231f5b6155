//! Repository Pattern for Database Abstraction
//!
//! This module provides trait-based repository abstractions so the
//! reconciliation loop never depends on a concrete store:
//! - Easy testing with mock implementations
//! - SQLite for production
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Reconciliation Loop                        │
//! │        (scheduler, reconciler, throttle, commands)          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Repository Traits                         │
//! │      ServerRepository, InviteUpdateRepository               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!         ┌─────────────────┐     ┌─────────────────┐
//!         │     SQLite      │     │      Mock       │
//!         │  Implementation │     │ Implementation  │
//!         └─────────────────┘     └─────────────────┘
//! ```
//!
//! Writes always replace the whole record; there are no partial-field
//! updates.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{InviteUpdate, ServerRecord, Visibility};

// ============================================================================
// Repository Traits
// ============================================================================

/// Repository for server records
pub trait ServerRepository: Send + Sync {
    /// Load every server record
    fn find_all(&self) -> Result<Vec<ServerRecord>>;

    /// Load one server record by identifier
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<ServerRecord>>;

    /// Insert or replace a server record
    fn save(&self, server: &ServerRecord) -> Result<()>;

    /// Delete a server record; returns whether it existed
    fn delete(&self, identifier: &str) -> Result<bool>;
}

/// Repository for owner-notification throttle records
pub trait InviteUpdateRepository: Send + Sync {
    /// Load all throttle records for a server, oldest first
    fn find_by_server(&self, server_id: &str) -> Result<Vec<InviteUpdate>>;

    /// Insert a throttle record
    fn insert(&self, update: &InviteUpdate) -> Result<()>;

    /// Remove a throttle record; returns whether it existed
    fn remove(&self, update: &InviteUpdate) -> Result<bool>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of both repositories
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) a SQLite database
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite repository initialized");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;
        Ok(repo)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("SQLite connection lock poisoned"))
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS servers (
                    identifier TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    owner_id TEXT NOT NULL,
                    invite_code TEXT,
                    enabled INTEGER NOT NULL DEFAULT 1,
                    visibility TEXT NOT NULL DEFAULT 'public',
                    default_channel TEXT,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS invite_updates (
                    id TEXT PRIMARY KEY,
                    server_id TEXT NOT NULL,
                    inserted_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_invite_updates_server
                    ON invite_updates(server_id);
                "#,
        )
        .context("Failed to create SQLite schema")?;

        Ok(())
    }

    fn server_from_row(row: &Row<'_>) -> rusqlite::Result<ServerRecord> {
        Ok(ServerRecord {
            identifier: row.get(0)?,
            name: row.get(1)?,
            owner_id: row.get(2)?,
            invite_code: row.get(3)?,
            enabled: row.get(4)?,
            visibility: row
                .get::<_, String>(5)?
                .parse::<Visibility>()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
            default_channel: row.get(6)?,
        })
    }
}

impl ServerRepository for SqliteRepository {
    fn find_all(&self) -> Result<Vec<ServerRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT identifier, name, owner_id, invite_code, enabled, visibility, default_channel
                 FROM servers ORDER BY identifier",
            )
            .context("Failed to prepare server query")?;

        let servers = stmt
            .query_map([], Self::server_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load servers")?;

        Ok(servers)
    }

    fn find_by_identifier(&self, identifier: &str) -> Result<Option<ServerRecord>> {
        let conn = self.lock()?;
        let server = conn
            .query_row(
                "SELECT identifier, name, owner_id, invite_code, enabled, visibility, default_channel
                 FROM servers WHERE identifier = ?1",
                params![identifier],
                Self::server_from_row,
            )
            .optional()
            .context("Failed to load server")?;

        Ok(server)
    }

    fn save(&self, server: &ServerRecord) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
                INSERT INTO servers (identifier, name, owner_id, invite_code, enabled, visibility, default_channel, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(identifier) DO UPDATE SET
                    name = excluded.name,
                    owner_id = excluded.owner_id,
                    invite_code = excluded.invite_code,
                    enabled = excluded.enabled,
                    visibility = excluded.visibility,
                    default_channel = excluded.default_channel,
                    updated_at = excluded.updated_at
                "#,
            params![
                server.identifier,
                server.name,
                server.owner_id,
                server.invite_code,
                server.enabled,
                server.visibility.as_str(),
                server.default_channel,
                now
            ],
        )
        .with_context(|| format!("Failed to save server {}", server.identifier))?;

        Ok(())
    }

    fn delete(&self, identifier: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM servers WHERE identifier = ?1", params![identifier])
            .context("Failed to delete server")?;

        Ok(deleted > 0)
    }
}

impl InviteUpdateRepository for SqliteRepository {
    fn find_by_server(&self, server_id: &str) -> Result<Vec<InviteUpdate>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, server_id, inserted_at FROM invite_updates
                 WHERE server_id = ?1 ORDER BY inserted_at",
            )
            .context("Failed to prepare invite update query")?;

        let updates = stmt
            .query_map(params![server_id], |row| {
                Ok(InviteUpdate {
                    id: row.get(0)?,
                    server_id: row.get(1)?,
                    inserted_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(2)?)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                        })?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load invite updates")?;

        Ok(updates)
    }

    fn insert(&self, update: &InviteUpdate) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO invite_updates (id, server_id, inserted_at) VALUES (?1, ?2, ?3)",
            params![update.id, update.server_id, update.inserted_at.to_rfc3339()],
        )
        .context("Failed to insert invite update")?;

        Ok(())
    }

    fn remove(&self, update: &InviteUpdate) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM invite_updates WHERE id = ?1", params![update.id])
            .context("Failed to remove invite update")?;

        Ok(removed > 0)
    }
}

// ============================================================================
// Mock Implementation (for testing)
// ============================================================================

/// In-memory mock implementation of ServerRepository
///
/// Counts writes and can be told to fail them, so tests can assert that a
/// visit did (or did not) touch the store.
#[derive(Default)]
pub struct MockServerRepository {
    records: RwLock<HashMap<String, ServerRecord>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MockServerRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock repository holding `servers`
    pub fn with_servers(servers: impl IntoIterator<Item = ServerRecord>) -> Self {
        let repo = Self::new();
        {
            let mut records = repo.records.write().unwrap();
            for server in servers {
                records.insert(server.identifier.clone(), server);
            }
        }
        repo
    }

    /// Get the number of records
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Get a record without going through the trait
    pub fn get(&self, identifier: &str) -> Option<ServerRecord> {
        self.records.read().unwrap().get(identifier).cloned()
    }
}

impl ServerRepository for MockServerRepository {
    fn find_all(&self) -> Result<Vec<ServerRecord>> {
        let records = self.records.read().unwrap();
        let mut servers: Vec<_> = records.values().cloned().collect();
        servers.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(servers)
    }

    fn find_by_identifier(&self, identifier: &str) -> Result<Option<ServerRecord>> {
        Ok(self.get(identifier))
    }

    fn save(&self, server: &ServerRecord) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            anyhow::bail!("Simulated save failure for {}", server.identifier);
        }
        self.records
            .write()
            .unwrap()
            .insert(server.identifier.clone(), server.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, identifier: &str) -> Result<bool> {
        Ok(self.records.write().unwrap().remove(identifier).is_some())
    }
}

/// In-memory mock implementation of InviteUpdateRepository
#[derive(Default)]
pub struct MockInviteUpdateRepository {
    updates: RwLock<Vec<InviteUpdate>>,
    fail_inserts: AtomicBool,
}

impl MockInviteUpdateRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock repository holding `updates`
    pub fn with_updates(updates: impl IntoIterator<Item = InviteUpdate>) -> Self {
        let repo = Self::new();
        repo.updates.write().unwrap().extend(updates);
        repo
    }

    /// Make subsequent inserts fail
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// All stored records
    pub fn all(&self) -> Vec<InviteUpdate> {
        self.updates.read().unwrap().clone()
    }
}

impl InviteUpdateRepository for MockInviteUpdateRepository {
    fn find_by_server(&self, server_id: &str) -> Result<Vec<InviteUpdate>> {
        let mut found: Vec<_> = self
            .updates
            .read()
            .unwrap()
            .iter()
            .filter(|u| u.server_id == server_id)
            .cloned()
            .collect();
        found.sort_by_key(|u| u.inserted_at);
        Ok(found)
    }

    fn insert(&self, update: &InviteUpdate) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            anyhow::bail!("Simulated insert failure for {}", update.server_id);
        }
        self.updates.write().unwrap().push(update.clone());
        Ok(())
    }

    fn remove(&self, update: &InviteUpdate) -> Result<bool> {
        let mut updates = self.updates.write().unwrap();
        let before = updates.len();
        updates.retain(|u| u.id != update.id);
        Ok(updates.len() < before)
    }
}

// ============================================================================
// Shared Repository Types
// ============================================================================

/// Thread-safe shared server repository
pub type SharedServerRepository = Arc<dyn ServerRepository>;

/// Thread-safe shared throttle repository
pub type SharedInviteUpdateRepository = Arc<dyn InviteUpdateRepository>;

/// Open a SQLite database and share it as both repositories
pub fn create_sqlite_repositories(
    path: impl AsRef<Path>,
) -> Result<(SharedServerRepository, SharedInviteUpdateRepository)> {
    let repo = Arc::new(SqliteRepository::new(path)?);
    Ok((repo.clone(), repo))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_server_repos() -> Vec<Box<dyn ServerRepository>> {
        vec![
            Box::new(SqliteRepository::in_memory().unwrap()),
            Box::new(MockServerRepository::new()),
        ]
    }

    fn create_update_repos() -> Vec<Box<dyn InviteUpdateRepository>> {
        vec![
            Box::new(SqliteRepository::in_memory().unwrap()),
            Box::new(MockInviteUpdateRepository::new()),
        ]
    }

    #[test]
    fn test_save_and_find_server() {
        for repo in create_server_repos() {
            assert!(repo.find_by_identifier("1").unwrap().is_none());

            let server = ServerRecord::new("1", "Rustaceans", "42")
                .with_invite("abc")
                .with_default_channel("100");
            repo.save(&server).unwrap();

            assert_eq!(repo.find_by_identifier("1").unwrap(), Some(server));
        }
    }

    #[test]
    fn test_save_replaces_whole_record() {
        for repo in create_server_repos() {
            let mut server = ServerRecord::new("1", "Rustaceans", "42").with_invite("abc");
            repo.save(&server).unwrap();

            server.disable();
            server.visibility = Visibility::Private;
            repo.save(&server).unwrap();

            let loaded = repo.find_by_identifier("1").unwrap().unwrap();
            assert!(!loaded.enabled);
            assert!(loaded.invite_code.is_none());
            assert!(loaded.is_private());
            assert_eq!(repo.find_all().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_find_all_and_delete() {
        for repo in create_server_repos() {
            repo.save(&ServerRecord::new("2", "B", "42")).unwrap();
            repo.save(&ServerRecord::new("1", "A", "42")).unwrap();

            let all = repo.find_all().unwrap();
            assert_eq!(all.len(), 2);
            assert_eq!(all[0].identifier, "1");

            assert!(repo.delete("1").unwrap());
            assert!(!repo.delete("1").unwrap());
            assert_eq!(repo.find_all().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_invite_updates_by_server() {
        for repo in create_update_repos() {
            let old = InviteUpdate::at("1", Utc::now() - Duration::days(20));
            let recent = InviteUpdate::new("1");
            let other = InviteUpdate::new("2");

            repo.insert(&recent).unwrap();
            repo.insert(&old).unwrap();
            repo.insert(&other).unwrap();

            let found = repo.find_by_server("1").unwrap();
            assert_eq!(found.len(), 2);
            assert_eq!(found[0].id, old.id);

            assert!(repo.remove(&old).unwrap());
            assert!(!repo.remove(&old).unwrap());
            assert_eq!(repo.find_by_server("1").unwrap().len(), 1);
        }
    }

    #[test]
    fn test_inserted_at_round_trips_through_sqlite() {
        let repo = SqliteRepository::in_memory().unwrap();
        let at = Utc::now() - Duration::days(16);
        let update = InviteUpdate::at("1", at);
        repo.insert(&update).unwrap();

        let loaded = repo.find_by_server("1").unwrap();
        assert_eq!(loaded[0].inserted_at.timestamp(), at.timestamp());
    }

    #[test]
    fn test_corrupt_inserted_at_is_an_error() {
        let repo = SqliteRepository::in_memory().unwrap();
        repo.insert(&InviteUpdate::new("1")).unwrap();
        repo.lock()
            .unwrap()
            .execute("UPDATE invite_updates SET inserted_at = 'yesterday'", [])
            .unwrap();

        assert!(repo.find_by_server("1").is_err());
    }

    #[test]
    fn test_unknown_visibility_is_an_error() {
        let repo = SqliteRepository::in_memory().unwrap();
        repo.save(&ServerRecord::new("1", "A", "42").with_visibility(Visibility::Private))
            .unwrap();
        repo.lock()
            .unwrap()
            .execute("UPDATE servers SET visibility = 'hidden'", [])
            .unwrap();

        assert!(repo.find_by_identifier("1").is_err());
        assert!(repo.find_all().is_err());
    }

    #[test]
    fn test_mock_save_failure() {
        let repo = MockServerRepository::new();
        repo.set_fail_saves(true);

        assert!(repo.save(&ServerRecord::new("1", "A", "42")).is_err());
        assert_eq!(repo.save_count(), 0);
        assert!(repo.is_empty());
    }

    #[test]
    fn test_sqlite_file_repository() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keeper.db");

        let (servers, updates) = create_sqlite_repositories(&path).unwrap();
        servers.save(&ServerRecord::new("1", "A", "42")).unwrap();
        updates.insert(&InviteUpdate::new("1")).unwrap();

        assert!(path.exists());
        assert_eq!(servers.find_all().unwrap().len(), 1);
        assert_eq!(updates.find_by_server("1").unwrap().len(), 1);
    }
}
