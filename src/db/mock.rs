//! Mock runners for testing.
//!
//! Provides an in-memory runner with scripted results and a call log, and a
//! runner that always fails.

use super::{CacheMode, ColumnInfo, SqlRunner, SqlStatement, TabularResult, Value};
use crate::error::{Result, StructError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

type Generator = Box<dyn Fn(u64) -> TabularResult + Send + Sync>;

/// Which runner entry point a call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Select,
    Count,
}

/// A call observed by the mock runner.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub sql: String,
    pub binds: Vec<Value>,
    pub label: String,
    pub cache: CacheMode,
}

/// A mock runner that returns predefined results.
///
/// Results are keyed by SQL text with surrounding whitespace trimmed.
/// Unscripted SELECTs return a single `result` column echoing the SQL;
/// unscripted statements affect zero rows.
#[derive(Default)]
pub struct MockRunner {
    results: HashMap<String, TabularResult>,
    generators: HashMap<String, Generator>,
    counts: HashMap<String, u64>,
    calls: Mutex<Vec<RecordedCall>>,
    executions: AtomicU64,
}

impl MockRunner {
    /// Creates a new mock runner with no scripted results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the result returned for the given SQL.
    pub fn with_result(mut self, sql: impl Into<String>, result: TabularResult) -> Self {
        self.results.insert(script_key(sql.into()), result);
        self
    }

    /// Scripts a result computed from the execution number, for SQL whose
    /// result changes on every execution.
    pub fn with_generator<F>(mut self, sql: impl Into<String>, generator: F) -> Self
    where
        F: Fn(u64) -> TabularResult + Send + Sync + 'static,
    {
        self.generators.insert(script_key(sql.into()), Box::new(generator));
        self
    }

    /// Scripts the affected-row count returned for the given SQL.
    pub fn with_count(mut self, sql: impl Into<String>, count: u64) -> Self {
        self.counts.insert(script_key(sql.into()), count);
        self
    }

    /// Returns every call observed so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns how many statements actually reached the mock.
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    fn record(&self, kind: CallKind, statement: &SqlStatement, label: &str, cache: CacheMode) -> u64 {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedCall {
                kind,
                sql: statement.sql.clone(),
                binds: statement.binds.clone(),
                label: label.to_string(),
                cache,
            });
        self.executions.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn script_key(sql: String) -> String {
    sql.trim().to_string()
}

#[async_trait]
impl SqlRunner for MockRunner {
    async fn select_all(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<TabularResult> {
        let execution = self.record(CallKind::Select, statement, label, cache);
        let sql = statement.sql.trim();

        if let Some(generator) = self.generators.get(sql) {
            return Ok(generator(execution));
        }
        if let Some(result) = self.results.get(sql) {
            return Ok(result.clone());
        }

        if sql.to_uppercase().starts_with("SELECT") {
            TabularResult::new(
                vec![ColumnInfo::new("result", "TEXT")],
                vec![vec![Value::String(format!("Mock result for: {sql}"))]],
            )
        } else {
            Ok(TabularResult::default())
        }
    }

    async fn execute_for_count(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<u64> {
        self.record(CallKind::Count, statement, label, cache);
        Ok(self.counts.get(statement.sql.trim()).copied().unwrap_or(0))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A runner whose every statement fails with the same query error.
pub struct FailingRunner {
    message: String,
}

impl FailingRunner {
    /// Creates a runner that fails with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl SqlRunner for FailingRunner {
    async fn select_all(
        &self,
        _statement: &SqlStatement,
        _label: &str,
        _cache: CacheMode,
    ) -> Result<TabularResult> {
        Err(StructError::query(self.message.clone()))
    }

    async fn execute_for_count(
        &self,
        _statement: &SqlStatement,
        _label: &str,
        _cache: CacheMode,
    ) -> Result<u64> {
        Err(StructError::query(self.message.clone()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
