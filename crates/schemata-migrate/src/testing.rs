//! In-memory [`Connection`] for tests.
//!
//! Understands the ledger statements issued by [`MigrationLedger`], tracks
//! `CREATE TABLE` / `DROP TABLE` names, and logs every other statement.
//! `begin` snapshots the state and `rollback` restores it.

#![allow(dead_code)]

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::artifact::MigrationVersion;
use crate::connection::{Connection, Row};
use crate::error::{MigrateError, Result};
use crate::ledger::MigrationLedger;

const APPLIED_AT: &str = "2026-10-19 09:05:07";

#[derive(Debug, Clone, Default)]
struct State {
    /// Applied versions; `None` until the ledger table exists.
    ledger: Option<BTreeSet<u64>>,
    /// The lock row's flag; `None` while the row is missing.
    lock: Option<bool>,
    tables: BTreeSet<String>,
    log: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryConnection {
    state: State,
    saved: Option<State>,
    ledger: MigrationLedger,
    fail_marker: Option<String>,
    fail_begin: Option<usize>,
    begins: usize,
    fail_query: Option<usize>,
    queries: usize,
    pub closed: bool,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with an existing ledger holding `versions` and no lock row.
    pub fn with_ledger(versions: &[u64]) -> Self {
        let mut conn = Self::new();
        conn.state.ledger = Some(versions.iter().copied().collect());
        conn
    }

    /// Marks the ledger as locked by another runner.
    pub fn locked(mut self) -> Self {
        self.state.lock = Some(true);
        self
    }

    /// Fails any statement containing `marker`.
    pub fn fail_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Fails the `nth` call to `begin` (1-based), once.
    pub fn fail_begin(mut self, nth: usize) -> Self {
        self.fail_begin = Some(nth);
        self
    }

    /// Fails the `nth` call to `query` (1-based), once.
    pub fn fail_query(mut self, nth: usize) -> Self {
        self.fail_query = Some(nth);
        self
    }

    pub fn tables(&self) -> Vec<&str> {
        self.state.tables.iter().map(String::as_str).collect()
    }

    pub fn log(&self) -> &[String] {
        &self.state.log
    }

    pub fn ledger_versions(&self) -> Vec<u64> {
        self.state
            .ledger
            .as_ref()
            .map(|rows| rows.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_lock_row(&self) -> bool {
        self.state.lock.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock == Some(true)
    }

    fn rows(&mut self) -> Result<&mut BTreeSet<u64>> {
        self.state.ledger.as_mut().ok_or_else(|| MigrateError::Statement {
            sql: String::new(),
            message: "ledger table does not exist".to_string(),
        })
    }

    fn version_in(sql: &str) -> Option<MigrationVersion> {
        sql.split(|c: char| !c.is_ascii_digit())
            .filter(|run| run.len() > 1)
            .last()
            .and_then(|run| run.parse().ok())
            .map(MigrationVersion::new)
    }

    fn backticked(sql: &str) -> Option<String> {
        let start = sql.find('`')? + 1;
        let len = sql[start..].find('`')?;
        Some(sql[start..start + len].to_string())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.queries += 1;
        if self.fail_query == Some(self.queries) {
            return Err(MigrateError::Statement {
                sql: sql.to_string(),
                message: "connection reset".to_string(),
            });
        }
        if sql == self.ledger.exists_sql() {
            let count = u8::from(self.state.ledger.is_some());
            return Ok(vec![Row::new(vec![Some(count.to_string())])]);
        }
        if sql == self.ledger.applied_sql() {
            return Ok(self
                .rows()?
                .iter()
                .map(|v| {
                    Row::new(vec![
                        Some(MigrationVersion::new(*v).to_string()),
                        Some(APPLIED_AT.to_string()),
                    ])
                })
                .collect());
        }
        if sql == self.ledger.lock_probe_sql() {
            self.rows()?;
            return Ok(self
                .state
                .lock
                .map(|locked| Row::new(vec![Some(u8::from(locked).to_string())]))
                .into_iter()
                .collect());
        }
        Err(MigrateError::Statement {
            sql: sql.to_string(),
            message: "unexpected query".to_string(),
        })
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        if let Some(marker) = &self.fail_marker {
            if sql.contains(marker.as_str()) {
                return Err(MigrateError::Statement {
                    sql: sql.to_string(),
                    message: "simulated failure".to_string(),
                });
            }
        }

        if sql == self.ledger.create_table_sql() {
            self.state.ledger.get_or_insert_with(BTreeSet::new);
            return Ok(0);
        }
        if sql == self.ledger.seed_lock_sql() {
            self.rows()?;
            if self.state.lock.is_some() {
                return Ok(0);
            }
            self.state.lock = Some(false);
            return Ok(1);
        }
        if sql == self.ledger.lock_sql() || sql == self.ledger.release_sql() {
            self.rows()?;
            let Some(locked) = self.state.lock.as_mut() else {
                return Ok(0);
            };
            *locked = sql == self.ledger.lock_sql();
            return Ok(1);
        }
        if let Some(version) = Self::version_in(sql) {
            if sql == self.ledger.insert_sql(version) {
                if !self.rows()?.insert(version.get()) {
                    return Err(MigrateError::Statement {
                        sql: sql.to_string(),
                        message: "duplicate entry for key 'PRIMARY'".to_string(),
                    });
                }
                return Ok(1);
            }
        }

        if sql.starts_with("CREATE TABLE") {
            if let Some(name) = Self::backticked(sql) {
                self.state.tables.insert(name);
            }
        } else if sql.starts_with("DROP TABLE") {
            if let Some(name) = Self::backticked(sql) {
                self.state.tables.remove(&name);
            }
        }
        self.state.log.push(sql.to_string());
        Ok(0)
    }

    async fn begin(&mut self) -> Result<()> {
        self.begins += 1;
        if self.fail_begin == Some(self.begins) {
            return Err(MigrateError::Statement {
                sql: "START TRANSACTION".to_string(),
                message: "connection reset".to_string(),
            });
        }
        self.saved = Some(self.state.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.saved = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(saved) = self.saved.take() {
            self.state = saved;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
