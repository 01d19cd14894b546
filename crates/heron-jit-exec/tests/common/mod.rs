//! Shared test doubles for coordinator integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use heron_jit_exec::{
    CodeId, CodeMetrics, CompilationEngine, Coordinator, EngineResult, FunctionId, JitConfig,
    JitFunction,
};
use parking_lot::Mutex;

/// Names starting with this prefix are refused by [`MockEngine`].
pub const REJECT_PREFIX: &str = "reject:";
/// Names starting with this prefix fail to compile in [`MockEngine`].
pub const FAIL_PREFIX: &str = "fail:";

/// Engine that "compiles" by remembering function ids.
#[derive(Default)]
pub struct MockEngine {
    compiled: Mutex<HashSet<FunctionId>>,
    calls: Mutex<Vec<String>>,
    active_codes: Mutex<HashSet<CodeId>>,
    overlapped: AtomicBool,
    retry_on_workers: bool,
    delay: Duration,
    coordinator: OnceLock<Weak<Coordinator>>,
    host_checks_seen: Mutex<Vec<bool>>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every compile on a batch worker asks for a retry.
    pub fn retrying_on_workers() -> Arc<Self> {
        Arc::new(Self {
            retry_on_workers: true,
            ..Self::default()
        })
    }

    /// Every compile takes at least `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    /// Let compiles observe coordinator state.
    pub fn attach(&self, coordinator: &Arc<Coordinator>) {
        let _ = self.coordinator.set(Arc::downgrade(coordinator));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, qualname: &str) -> usize {
        self.calls.lock().iter().filter(|name| *name == qualname).count()
    }

    /// Whether two compiles of one code body ever ran at the same time.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    pub fn host_checks_seen(&self) -> Vec<bool> {
        self.host_checks_seen.lock().clone()
    }
}

impl CompilationEngine for MockEngine {
    fn compile(&self, function: &JitFunction) -> EngineResult {
        if let Some(coordinator) = self.coordinator.get().and_then(Weak::upgrade) {
            self.host_checks_seen
                .lock()
                .push(coordinator.host_checks_enabled());
        }
        if !self.active_codes.lock().insert(function.code_id()) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.calls.lock().push(function.qualname().to_owned());
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let on_worker = thread::current()
            .name()
            .is_some_and(|name| name.starts_with("heron-jit-worker"));
        let result = if self.retry_on_workers && on_worker {
            EngineResult::Retry
        } else if function.qualname().starts_with(REJECT_PREFIX) {
            EngineResult::CannotSpecialize
        } else if function.qualname().starts_with(FAIL_PREFIX) {
            EngineResult::Failure
        } else {
            self.compiled.lock().insert(function.id());
            EngineResult::Ok
        };

        self.active_codes.lock().remove(&function.code_id());
        result
    }

    fn did_compile(&self, function: &JitFunction) -> bool {
        self.compiled.lock().contains(&function.id())
    }

    fn metrics(&self, function: &JitFunction) -> Option<CodeMetrics> {
        self.did_compile(function).then(|| CodeMetrics {
            code_size: 64 + function.qualname().len(),
            stack_size: 32,
            spill_stack_size: 8,
        })
    }
}

/// Enabled config with `workers` batch workers.
pub fn config(workers: usize) -> JitConfig {
    JitConfig {
        enabled: true,
        batch_compile_workers: workers,
        ..JitConfig::default()
    }
}
