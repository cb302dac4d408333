//! Query result cache wrapper.
//!
//! `CachingRunner` adds a request-scoped query cache in front of any runner:
//! while a scope is active, repeated SELECTs with identical SQL and binds are
//! answered from memory. Calls made with `CacheMode::Bypass` always reach the
//! wrapped runner and never populate the cache; any count-returning statement
//! clears it.

use super::{CacheMode, SqlRunner, SqlStatement, TabularResult};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct CacheState {
    /// Set by `enable`/`disable`.
    pinned: bool,
    /// Number of `scoped` futures currently running.
    scopes: usize,
    entries: HashMap<String, TabularResult>,
}

impl CacheState {
    fn is_enabled(&self) -> bool {
        self.pinned || self.scopes > 0
    }
}

/// Closes one scope when dropped, so a cancelled scope is released too.
struct ScopeGuard<'a> {
    state: &'a Mutex<CacheState>,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let mut state = lock_state(self.state);
        state.scopes = state.scopes.saturating_sub(1);
        if !state.is_enabled() {
            state.entries.clear();
        }
    }
}

fn lock_state(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(|poisoned| {
        warn!("Query cache lock was poisoned; recovering");
        poisoned.into_inner()
    })
}

/// A runner wrapper that memoizes SELECT results while caching is enabled.
#[derive(Debug)]
pub struct CachingRunner<R> {
    inner: R,
    state: Mutex<CacheState>,
}

impl<R: SqlRunner> CachingRunner<R> {
    /// Wraps a runner. Caching starts disabled.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Returns the wrapped runner.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Enables caching until `disable` is called.
    pub fn enable(&self) {
        self.lock().pinned = true;
    }

    /// Drops every cached result and turns off caching enabled by `enable`.
    /// Running scopes stay enabled.
    pub fn disable(&self) {
        let mut state = self.lock();
        state.pinned = false;
        state.entries.clear();
    }

    /// Returns true while caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.lock().is_enabled()
    }

    /// Returns the number of cached results.
    pub fn cached_len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Runs a future with caching enabled.
    ///
    /// Scopes may nest or overlap; entries are dropped once the last scope
    /// ends and caching was not enabled with `enable`.
    pub async fn scoped<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.lock().scopes += 1;
        let _guard = ScopeGuard { state: &self.state };
        fut.await
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        lock_state(&self.state)
    }
}

#[async_trait]
impl<R: SqlRunner> SqlRunner for CachingRunner<R> {
    async fn select_all(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<TabularResult> {
        if cache.is_bypass() {
            return self.inner.select_all(statement, label, cache).await;
        }

        let key = statement.cache_key();
        let lookup = {
            let state = self.lock();
            state
                .is_enabled()
                .then(|| state.entries.get(&key).cloned())
        };

        match lookup {
            None => return self.inner.select_all(statement, label, cache).await,
            Some(Some(hit)) => {
                debug!("{label} served from query cache");
                return Ok(hit);
            }
            Some(None) => {}
        }

        let result = self.inner.select_all(statement, label, cache).await?;

        let mut state = self.lock();
        if state.is_enabled() {
            state.entries.insert(key, result.clone());
        }
        Ok(result)
    }

    async fn execute_for_count(
        &self,
        statement: &SqlStatement,
        label: &str,
        cache: CacheMode,
    ) -> Result<u64> {
        let count = self.inner.execute_for_count(statement, label, cache).await?;
        self.lock().entries.clear();
        Ok(count)
    }

    async fn close(&self) -> Result<()> {
        self.disable();
        self.inner.close().await
    }
}
