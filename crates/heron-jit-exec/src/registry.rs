//! Compiled-function registry and compile timing.
//!
//! Owned by the coordinator's shared state and only touched under the
//! serialization lock.

use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::engine::CodeMetrics;
use crate::handle::{FunctionHandle, FunctionId};

/// Registry entry for a function with installed native code.
#[derive(Debug, Clone)]
pub struct CompiledEntry {
    /// Compiled function
    pub handle: FunctionHandle,
    /// Size metrics reported by the engine at install time
    pub metrics: CodeMetrics,
}

/// Functions with installed native code, plus per-function compile times.
///
/// Compile times are kept separately from entries: every attempt is timed,
/// including the ones that did not produce code.
#[derive(Debug, Default)]
pub struct CompiledFunctionRegistry {
    entries: FxHashMap<FunctionId, CompiledEntry>,
    compile_times: FxHashMap<FunctionId, Duration>,
    total_compile_time: Duration,
}

impl CompiledFunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for a successful (re)compile.
    pub fn record_compiled(&mut self, handle: FunctionHandle, metrics: CodeMetrics) {
        self.entries
            .insert(handle.id(), CompiledEntry { handle, metrics });
    }

    /// Add one attempt's duration to the function's and the global totals.
    pub fn record_compile_time(&mut self, id: FunctionId, elapsed: Duration) {
        *self.compile_times.entry(id).or_default() += elapsed;
        self.total_compile_time += elapsed;
    }

    /// Drop the entry for `id`. Returns whether one existed.
    pub fn invalidate(&mut self, id: FunctionId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Entry for `id`, if compiled.
    pub fn get(&self, id: FunctionId) -> Option<&CompiledEntry> {
        self.entries.get(&id)
    }

    /// Whether an entry exists for `id`.
    pub fn contains(&self, id: FunctionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Metrics recorded for `id`, if compiled.
    pub fn metrics(&self, id: FunctionId) -> Option<CodeMetrics> {
        self.entries.get(&id).map(|entry| entry.metrics)
    }

    /// Cumulative time spent compiling `id`, `None` if never attempted.
    pub fn function_compile_time(&self, id: FunctionId) -> Option<Duration> {
        self.compile_times.get(&id).copied()
    }

    /// Time spent in the engine across all attempts.
    pub fn total_compile_time(&self) -> Duration {
        self.total_compile_time
    }

    /// Handles of compiled functions the host still keeps alive.
    pub fn live_handles(&self) -> Vec<FunctionHandle> {
        self.entries
            .values()
            .filter(|entry| !entry.handle.is_dropped())
            .map(|entry| entry.handle.clone())
            .collect()
    }

    /// Remove entries whose function has been dropped by the host.
    pub fn prune_dropped(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.handle.is_dropped());
        before - self.entries.len()
    }

    /// Number of entries, including not-yet-pruned dropped functions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries and timings.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.compile_times.clear();
        self.total_compile_time = Duration::ZERO;
    }
}
