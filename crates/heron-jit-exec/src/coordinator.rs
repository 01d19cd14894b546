//! Process-wide compilation coordinator.
//!
//! One [`Coordinator`] owns every piece of shared JIT state: the pending
//! set, the compiled-function registry, the compile attempt record and the
//! per-pass batch bookkeeping. All of it lives behind a single re-entrant
//! serialization lock; the inner `RefCell` is never borrowed across a call
//! into the engine or the eligibility oracle, so both may call back into the
//! coordinator.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use rustc_hash::FxHashSet;

use crate::allow_list::AllowList;
use crate::batch::BatchCompileStats;
use crate::config::JitConfig;
use crate::engine::{CodeMetrics, CompilationEngine, EligibilityOracle};
use crate::error::CoordinatorError;
use crate::handle::{CodeId, FunctionHandle, JitFunction};
use crate::pending::PendingSet;
use crate::registry::CompiledFunctionRegistry;
use crate::single_flight::{CompileAttemptRecord, CompileOutcome};

/// Coordinator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Constructed, `initialize` not yet called.
    NotInitialized,
    /// Accepting work.
    Initialized,
    /// Torn down; all state has been released.
    Finalized,
}

/// Bookkeeping for the batch pass in progress, if any.
#[derive(Debug, Default)]
pub(crate) struct PassState {
    /// Code bodies claimed by a worker during this pass.
    pub(crate) claimed: FxHashSet<CodeId>,
    /// Code bodies a worker is compiling right now, outside the lock.
    pub(crate) in_flight: FxHashSet<CodeId>,
    /// Handles left for the serial drain, in push order.
    pub(crate) retry_queue: Vec<FunctionHandle>,
    pub(crate) retried: usize,
    pub(crate) deferred: usize,
}

pub(crate) struct SharedState {
    pub(crate) init_state: InitState,
    pub(crate) enabled: bool,
    pub(crate) oracle: Option<Arc<dyn EligibilityOracle>>,
    pub(crate) pending: PendingSet,
    pub(crate) registry: CompiledFunctionRegistry,
    pub(crate) attempts: CompileAttemptRecord,
    pub(crate) pass: PassState,
    /// Strong references kept for forced test recompiles.
    pub(crate) retained: Vec<Arc<JitFunction>>,
    pub(crate) last_batch: Option<BatchCompileStats>,
}

impl SharedState {
    pub(crate) fn ensure_initialized(&self) -> Result<(), CoordinatorError> {
        match self.init_state {
            InitState::Initialized => Ok(()),
            InitState::NotInitialized => Err(CoordinatorError::NotInitialized),
            InitState::Finalized => Err(CoordinatorError::Finalized),
        }
    }
}

/// Decides which functions get compiled, when, and by how many workers.
pub struct Coordinator {
    pub(crate) config: JitConfig,
    pub(crate) engine: Arc<dyn CompilationEngine>,
    shared: ReentrantMutex<RefCell<SharedState>>,
    /// Held for the whole of a batch pass; finalization waits on it.
    pub(crate) pass_lock: Mutex<()>,
    /// Host exclusivity checks; switched off inside a cooperative region.
    pub(crate) host_checks: AtomicBool,
}

impl Coordinator {
    /// Create an uninitialized coordinator.
    ///
    /// `oracle` takes precedence over `config.jit_list_file`; with neither,
    /// every function is eligible.
    pub fn new(
        config: JitConfig,
        engine: Arc<dyn CompilationEngine>,
        oracle: Option<Arc<dyn EligibilityOracle>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            engine,
            shared: ReentrantMutex::new(RefCell::new(SharedState {
                init_state: InitState::NotInitialized,
                enabled: false,
                oracle,
                pending: PendingSet::new(),
                registry: CompiledFunctionRegistry::new(),
                attempts: CompileAttemptRecord::new(),
                pass: PassState::default(),
                retained: Vec::new(),
                last_batch: None,
            })),
            pass_lock: Mutex::new(()),
            host_checks: AtomicBool::new(true),
        })
    }

    /// Create and initialize in one step.
    pub fn initialize(
        config: JitConfig,
        engine: Arc<dyn CompilationEngine>,
        oracle: Option<Arc<dyn EligibilityOracle>>,
    ) -> Result<Arc<Self>, CoordinatorError> {
        let coordinator = Self::new(config, engine, oracle);
        coordinator.init()?;
        Ok(coordinator)
    }

    /// Move to [`InitState::Initialized`]. Idempotent while initialized.
    ///
    /// Loads the allow-list file from the config when no oracle was given.
    pub fn init(&self) -> Result<(), CoordinatorError> {
        let guard = self.serialize();
        let needs_list = {
            let state = guard.borrow();
            match state.init_state {
                InitState::Initialized => return Ok(()),
                InitState::Finalized => return Err(CoordinatorError::Finalized),
                InitState::NotInitialized => state.oracle.is_none(),
            }
        };

        let list = match (&self.config.jit_list_file, needs_list) {
            (Some(path), true) => Some(AllowList::from_file(path)?),
            _ => None,
        };

        let mut state = guard.borrow_mut();
        if let Some(list) = list {
            state.oracle = Some(Arc::new(list));
        }
        state.init_state = InitState::Initialized;
        state.enabled = self.config.enabled;
        tracing::debug!(
            target: "heron::jit",
            enabled = state.enabled,
            batch_compile_workers = self.config.batch_compile_workers,
            "jit coordinator initialized"
        );
        Ok(())
    }

    /// Tear down: wait for any batch pass, compile everything still pending,
    /// then release all state.
    pub fn finalize(&self) -> Result<(), CoordinatorError> {
        let _pass = self.pass_lock.lock();
        match self.init_state() {
            InitState::Finalized => return Ok(()),
            InitState::NotInitialized => {
                self.with_state(|state| state.init_state = InitState::Finalized);
                return Ok(());
            }
            InitState::Initialized => {}
        }

        self.drain_pending_in_pass()?;

        self.with_state(|state| {
            state.init_state = InitState::Finalized;
            state.enabled = false;
            state.pending.take_all();
            state.registry.clear();
            state.retained.clear();
            state.oracle = None;
        });
        tracing::debug!(target: "heron::jit", "jit coordinator finalized");
        Ok(())
    }

    /// Current lifecycle state.
    pub fn init_state(&self) -> InitState {
        self.with_state(|state| state.init_state)
    }

    /// Configuration the coordinator was built with.
    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    /// Whether registrations are currently accepted.
    pub fn is_enabled(&self) -> bool {
        self.with_state(|state| state.init_state == InitState::Initialized && state.enabled)
    }

    /// Resume accepting registrations. No effect unless initialized.
    pub fn enable(&self) {
        self.with_state(|state| {
            if state.init_state == InitState::Initialized {
                state.enabled = true;
            }
        });
    }

    /// Stop accepting registrations.
    ///
    /// With `drain`, every pending function is compiled first so no observer
    /// sees the coordinator disabled with work still pending.
    pub fn disable(&self, drain: bool) -> Result<(), CoordinatorError> {
        if drain && self.init_state() == InitState::Initialized {
            let _pass = self.pass_lock.lock();
            self.drain_pending_in_pass()?;
        }
        self.with_state(|state| state.enabled = false);
        tracing::debug!(target: "heron::jit", drain, "jit disabled");
        Ok(())
    }

    /// Replace the eligibility oracle. `None` makes every function eligible.
    pub fn set_oracle(&self, oracle: Option<Arc<dyn EligibilityOracle>>) {
        self.with_state(|state| state.oracle = oracle);
    }

    /// Register a JIT candidate.
    ///
    /// Returns `true` if the coordinator is enabled and the function is
    /// eligible, in which case it is now pending.
    pub fn register_function(&self, function: &Arc<JitFunction>) -> bool {
        let guard = self.serialize();
        {
            let state = guard.borrow();
            if state.init_state != InitState::Initialized || !state.enabled {
                return false;
            }
        }
        if !self.is_eligible(&guard, function) {
            return false;
        }

        let mut state = guard.borrow_mut();
        let newly_pending = state.pending.insert(function.handle());
        if self.config.test_multithreaded_compile
            && newly_pending
            && !state.retained.iter().any(|kept| kept.id() == function.id())
        {
            state.retained.push(Arc::clone(function));
        }
        tracing::trace!(
            target: "heron::jit",
            function = function.qualname(),
            "registered jit candidate"
        );
        true
    }

    /// Forget a pending function, e.g. when the host deallocates it.
    pub fn unregister_function(&self, handle: &FunctionHandle) {
        self.with_state(|state| {
            state.pending.remove(handle);
        });
    }

    /// Compile `handle` now if it is pending.
    ///
    /// Returns `None` when the function was not pending, so nothing was
    /// attempted.
    pub fn force_compile(
        &self,
        handle: &FunctionHandle,
    ) -> Result<Option<CompileOutcome>, CoordinatorError> {
        let guard = self.serialize();
        guard.borrow().ensure_initialized()?;
        if !guard.borrow().pending.contains(handle) {
            return Ok(None);
        }
        self.compile_function(handle).map(Some)
    }

    /// Whether native code is installed for `handle`.
    ///
    /// Requires both a registry entry and the engine's confirmation, so an
    /// [`invalidate`](Self::invalidate)d function reads as not compiled.
    pub fn is_compiled(&self, handle: &FunctionHandle) -> bool {
        let recorded = self.with_state(|state| {
            state.init_state == InitState::Initialized && state.registry.contains(handle.id())
        });
        if !recorded {
            return false;
        }
        handle
            .upgrade()
            .is_some_and(|function| self.engine.did_compile(&function))
    }

    /// Whether `handle` is waiting to be compiled.
    pub fn is_pending(&self, handle: &FunctionHandle) -> bool {
        self.with_state(|state| state.pending.contains(handle))
    }

    /// Number of functions waiting to be compiled.
    pub fn pending_count(&self) -> usize {
        self.with_state(|state| state.pending.len())
    }

    /// Time spent in the engine across all attempts.
    pub fn total_compile_time(&self) -> Duration {
        self.with_state(|state| state.registry.total_compile_time())
    }

    /// Cumulative time spent compiling one function, `None` if never attempted.
    pub fn function_compile_time(&self, handle: &FunctionHandle) -> Option<Duration> {
        self.with_state(|state| state.registry.function_compile_time(handle.id()))
    }

    /// Size metrics of a compiled function.
    pub fn compiled_metrics(&self, handle: &FunctionHandle) -> Option<CodeMetrics> {
        self.with_state(|state| state.registry.metrics(handle.id()))
    }

    /// Machine code size in bytes of a compiled function.
    pub fn code_size(&self, handle: &FunctionHandle) -> Option<usize> {
        self.compiled_metrics(handle).map(|m| m.code_size)
    }

    /// Native frame size in bytes of a compiled function.
    pub fn stack_size(&self, handle: &FunctionHandle) -> Option<usize> {
        self.compiled_metrics(handle).map(|m| m.stack_size)
    }

    /// Register spill area size in bytes of a compiled function.
    pub fn spill_stack_size(&self, handle: &FunctionHandle) -> Option<usize> {
        self.compiled_metrics(handle).map(|m| m.spill_stack_size)
    }

    /// Compiled functions the host still keeps alive.
    pub fn compiled_functions(&self) -> Vec<Arc<JitFunction>> {
        let handles = self.with_state(|state| {
            state.registry.prune_dropped();
            state.registry.live_handles()
        });
        let mut functions: Vec<Arc<JitFunction>> =
            handles.iter().filter_map(FunctionHandle::upgrade).collect();
        functions.sort_by_key(|function| function.id());
        functions
    }

    /// Drop the registry entry for `handle`, e.g. after the engine discards
    /// its code. Returns whether an entry existed.
    pub fn invalidate(&self, handle: &FunctionHandle) -> bool {
        self.with_state(|state| state.registry.invalidate(handle.id()))
    }

    /// Counters from the most recent batch pass.
    pub fn last_batch_stats(&self) -> Option<BatchCompileStats> {
        self.with_state(|state| state.last_batch.clone())
    }

    /// Whether host exclusivity checks are active.
    ///
    /// `false` only while a batch pass runs its cooperative worker group.
    pub fn host_checks_enabled(&self) -> bool {
        self.host_checks.load(Ordering::Acquire)
    }

    pub(crate) fn serialize(&self) -> ReentrantMutexGuard<'_, RefCell<SharedState>> {
        self.shared.lock()
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut SharedState) -> R) -> R {
        let guard = self.serialize();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// Eligibility as seen by registration, single-flight and batch paths.
    ///
    /// Caller must hold the serialization lock; `state` must not be borrowed.
    pub(crate) fn is_eligible(&self, state: &RefCell<SharedState>, function: &JitFunction) -> bool {
        if function.is_static() && self.config.compile_all_static_functions {
            return true;
        }
        let oracle = state.borrow().oracle.clone();
        match oracle {
            Some(oracle) => oracle.is_eligible(function),
            None => true,
        }
    }

    /// Compile everything pending. Caller holds `pass_lock`.
    pub(crate) fn drain_pending_in_pass(&self) -> Result<(), CoordinatorError> {
        let workers = self.config.batch_compile_workers;
        if workers > 0 {
            self.run_batch_pass(workers, false)?;
            return Ok(());
        }

        let handles = self.with_state(|state| state.pending.snapshot());
        for handle in handles {
            match self.compile_function(&handle) {
                Ok(_) | Err(CoordinatorError::FunctionDropped(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (init_state, enabled, pending, compiled) = self.with_state(|state| {
            (
                state.init_state,
                state.enabled,
                state.pending.len(),
                state.registry.len(),
            )
        });
        f.debug_struct("Coordinator")
            .field("init_state", &init_state)
            .field("enabled", &enabled)
            .field("pending", &pending)
            .field("compiled", &compiled)
            .finish()
    }
}
