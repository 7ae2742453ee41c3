//! Durable allow/block list store
//!
//! A process-local key-value store: one SQLite row per list name, the value
//! being a JSON array of flat entry objects. Every read-modify-write sequence
//! funnels through this type; a missing list reads as empty, never as an
//! error. Block expiry is computed at read time against the TTL, rows are
//! never deleted, so re-running the same source reproduces identical history.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::models::{AllowEntry, BlockEntry, BlockStatusRow, ListKind};

/// Thread-safe list store wrapper
#[derive(Clone)]
pub struct ListStore {
    conn: Arc<Mutex<Connection>>,
    block_ttl_ms: i64,
}

impl ListStore {
    /// Open or create the store at the given path
    pub fn open<P: AsRef<Path>>(path: P, block_ttl_ms: i64) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open list store: {}", path.as_ref().display()))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            block_ttl_ms,
        };

        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn open_memory(block_ttl_ms: i64) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            block_ttl_ms,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS lists (
                name TEXT PRIMARY KEY,
                entries TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Block TTL this store was opened with
    pub fn block_ttl_ms(&self) -> i64 {
        self.block_ttl_ms
    }

    fn read_list<T: DeserializeOwned>(&self, kind: ListKind) -> Result<Vec<T>> {
        let conn = self.conn.lock().unwrap();

        let raw: Option<String> = conn
            .query_row(
                "SELECT entries FROM lists WHERE name = ?",
                [kind.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(json) => serde_json::from_str(&json)
                .with_context(|| format!("Corrupt {} payload in list store", kind)),
            None => Ok(Vec::new()),
        }
    }

    fn write_list<T: Serialize>(&self, kind: ListKind, entries: &[T]) -> Result<()> {
        let json = serde_json::to_string(entries)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO lists (name, entries) VALUES (?, ?)",
            params![kind.as_str(), json],
        )?;
        Ok(())
    }

    // ==================== Allowlist ====================

    /// Insert an allowlist entry unless one already exists for the same IP.
    /// Returns whether an entry was actually inserted; idempotent.
    pub fn record_allow(&self, entry: &AllowEntry) -> Result<bool> {
        let mut entries: Vec<AllowEntry> = self.read_list(ListKind::Allow)?;
        if entries.iter().any(|e| e.ip == entry.ip) {
            return Ok(false);
        }
        entries.push(entry.clone());
        self.write_list(ListKind::Allow, &entries)?;
        Ok(true)
    }

    /// Full allowlist contents in insertion order
    pub fn allow_snapshot(&self) -> Result<Vec<AllowEntry>> {
        self.read_list(ListKind::Allow)
    }

    // ==================== Blocklist ====================

    /// Append a block event unconditionally; an IP may accrue many
    pub fn record_block(&self, entry: &BlockEntry) -> Result<()> {
        let mut entries: Vec<BlockEntry> = self.read_list(ListKind::Block)?;
        entries.push(entry.clone());
        self.write_list(ListKind::Block, &entries)
    }

    /// True iff some block event for `ip` is younger than the TTL
    pub fn is_currently_blocked(&self, ip: &str, now_ms: i64) -> Result<bool> {
        let entries: Vec<BlockEntry> = self.read_list(ListKind::Block)?;
        Ok(entries
            .iter()
            .any(|e| e.ip == ip && e.is_active(now_ms, self.block_ttl_ms)))
    }

    /// Full blocklist contents in insertion order, expired events included
    pub fn block_snapshot(&self) -> Result<Vec<BlockEntry>> {
        self.read_list(ListKind::Block)
    }

    /// Blocklist view rows with remaining TTL computed against `now_ms`.
    /// Pure function of the stored entries and `now_ms`; no reclassification.
    pub fn block_status(&self, now_ms: i64) -> Result<Vec<BlockStatusRow>> {
        let entries = self.block_snapshot()?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                let remaining_ms = entry.remaining_ms(now_ms, self.block_ttl_ms);
                BlockStatusRow {
                    entry,
                    remaining_ms,
                }
            })
            .collect())
    }

    // ==================== Maintenance ====================

    /// Destructive wipe of the persisted state for one list. Intent
    /// confirmation is the caller's responsibility.
    pub fn clear(&self, kind: ListKind) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM lists WHERE name = ?", [kind.as_str()])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, ScoreResult, Tier};

    const TTL: i64 = 12 * 60 * 60 * 1000;

    fn record(ip: &str) -> Record {
        Record {
            ip: ip.to_string(),
            port: Some(443),
            method: "GET".to_string(),
            uri: "/".to_string(),
            referer: String::new(),
            user_agent: String::new(),
            country: "US".to_string(),
            asn: "1".to_string(),
            device: "desktop".to_string(),
            scheme: "https".to_string(),
        }
    }

    fn block_entry(ip: &str, now_ms: i64) -> BlockEntry {
        let score = ScoreResult {
            points: 21,
            reasons: vec!["País Suspeito"],
            tier: Tier::High,
        };
        BlockEntry::new(&record(ip), &score, now_ms)
    }

    #[test]
    fn test_record_allow_idempotent() {
        let store = ListStore::open_memory(TTL).unwrap();
        let entry = AllowEntry::from_record(&record("1.1.1.1"));

        assert!(store.record_allow(&entry).unwrap());
        assert!(!store.record_allow(&entry).unwrap());
        assert_eq!(store.allow_snapshot().unwrap().len(), 1);
    }

    #[test]
    fn test_record_block_append_only() {
        let store = ListStore::open_memory(TTL).unwrap();
        for i in 0..3 {
            store.record_block(&block_entry("2.2.2.2", i)).unwrap();
        }
        let snapshot = store.block_snapshot().unwrap();
        assert_eq!(snapshot.len(), 3);
        // Insertion order preserved
        assert_eq!(snapshot[0].timestamp, 0);
        assert_eq!(snapshot[2].timestamp, 2);
    }

    #[test]
    fn test_currently_blocked_respects_ttl() {
        let store = ListStore::open_memory(TTL).unwrap();
        store.record_block(&block_entry("2.2.2.2", 1_000)).unwrap();

        assert!(store.is_currently_blocked("2.2.2.2", 1_000).unwrap());
        assert!(store.is_currently_blocked("2.2.2.2", 1_000 + TTL - 1).unwrap());
        assert!(!store.is_currently_blocked("2.2.2.2", 1_000 + TTL).unwrap());
        assert!(!store.is_currently_blocked("9.9.9.9", 1_000).unwrap());

        // Expiry never deletes rows
        assert_eq!(store.block_snapshot().unwrap().len(), 1);
    }

    #[test]
    fn test_block_status_remaining() {
        let store = ListStore::open_memory(TTL).unwrap();
        store.record_block(&block_entry("2.2.2.2", 0)).unwrap();

        let rows = store.block_status(1_000).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].remaining_ms, TTL - 1_000);

        let rows = store.block_status(TTL + 1).unwrap();
        assert_eq!(rows[0].remaining_ms, 0);
    }

    #[test]
    fn test_clear_is_per_list() {
        let store = ListStore::open_memory(TTL).unwrap();
        store
            .record_allow(&AllowEntry::from_record(&record("1.1.1.1")))
            .unwrap();
        store.record_block(&block_entry("2.2.2.2", 0)).unwrap();

        store.clear(ListKind::Block).unwrap();
        assert!(store.block_snapshot().unwrap().is_empty());
        assert_eq!(store.allow_snapshot().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_list_reads_empty() {
        let store = ListStore::open_memory(TTL).unwrap();
        assert!(store.allow_snapshot().unwrap().is_empty());
        assert!(store.block_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lists.db");

        {
            let store = ListStore::open(&path, TTL).unwrap();
            store.record_block(&block_entry("2.2.2.2", 5_000)).unwrap();
            store
                .record_allow(&AllowEntry::from_record(&record("1.1.1.1")))
                .unwrap();
        }

        let store = ListStore::open(&path, TTL).unwrap();
        assert!(store.is_currently_blocked("2.2.2.2", 6_000).unwrap());
        assert_eq!(store.allow_snapshot().unwrap().len(), 1);
    }
}
