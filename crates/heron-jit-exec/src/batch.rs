//! Multithreaded batch compilation.
//!
//! A pass moves every pending handle onto a work channel, lets a fixed pool
//! of scoped worker threads drain it, then compiles whatever the workers
//! could not finish serially on the driving thread. Workers call the engine
//! outside the serialization lock; everything they read or write in shared
//! state goes through it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::coordinator::{Coordinator, PassState};
use crate::engine::EngineResult;
use crate::error::CoordinatorError;
use crate::handle::FunctionHandle;
use crate::single_flight::CompileOutcome;

/// Counters for one batch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchCompileStats {
    /// Handles taken from the pending set.
    pub queued: usize,
    /// Engine invocations made by workers.
    pub attempted: usize,
    /// Worker compiles the engine asked to retry.
    pub retried: usize,
    /// Handles postponed because their code body was already claimed.
    pub deferred: usize,
    /// Retry-queue entries that compiled in the serial drain.
    pub retry_compiled: usize,
    /// Wall time of the whole pass.
    pub elapsed: Duration,
}

/// Host exclusivity checks are off while this guard lives.
///
/// Only a batch pass enters one, around the lifetime of its workers.
struct CooperativeRegion<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl<'a> CooperativeRegion<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let previous = flag.swap(false, Ordering::AcqRel);
        Self { flag, previous }
    }
}

impl Drop for CooperativeRegion<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::Release);
    }
}

impl Coordinator {
    /// Compile every pending function using `worker_count` threads.
    ///
    /// Blocks until the pass, including the serial retry drain, is done.
    /// Afterwards every handle that was pending is either compiled or was
    /// rejected by eligibility or the engine.
    ///
    /// # Panics
    ///
    /// Panics if `worker_count` is zero.
    pub fn compile_all(&self, worker_count: usize) -> Result<BatchCompileStats, CoordinatorError> {
        assert!(worker_count > 0, "zero workers for batch compile");
        let _pass = self.pass_lock.lock();
        self.run_batch_pass(worker_count, false)
    }

    /// Batch-recompile every function retained in test mode, even ones that
    /// are already compiled.
    ///
    /// The retained functions are released afterwards and the pending set
    /// the caller had is put back.
    pub fn recompile_for_test(&self) -> Result<BatchCompileStats, CoordinatorError> {
        if !self.config.test_multithreaded_compile {
            return Err(CoordinatorError::TestRecompileDisabled);
        }
        let workers = self.config.batch_compile_workers;
        if workers == 0 {
            return Err(CoordinatorError::ZeroWorkersConfigured);
        }

        let _pass = self.pass_lock.lock();
        let previous = self.with_state(|state| {
            state.ensure_initialized()?;
            let retained: Vec<FunctionHandle> =
                state.retained.iter().map(|function| function.handle()).collect();
            Ok::<_, CoordinatorError>(state.pending.replace(retained))
        })?;

        let result = self.run_batch_pass(workers, true);
        self.with_state(|state| {
            state.pending.replace(previous);
            state.retained.clear();
        });

        let stats = result?;
        tracing::info!(
            target: "heron::jit::batch",
            elapsed_ms = stats.elapsed.as_millis() as u64,
            attempted = stats.attempted,
            retried = stats.retried,
            "finished multithreaded test recompile"
        );
        Ok(stats)
    }

    /// One batch pass. Caller holds `pass_lock`.
    pub(crate) fn run_batch_pass(
        &self,
        workers: usize,
        force: bool,
    ) -> Result<BatchCompileStats, CoordinatorError> {
        assert!(workers > 0, "zero workers for batch compile");
        let start = Instant::now();

        let guard = self.serialize();
        guard.borrow().ensure_initialized()?;
        let work = {
            let mut state = guard.borrow_mut();
            state.pass = PassState::default();
            state.pending.take_all()
        };
        let queued = work.len();

        let (sender, receiver) = crossbeam_channel::unbounded();
        for handle in work {
            // The receiver is alive, so sending cannot fail.
            let _ = sender.send(handle);
        }
        drop(sender);

        tracing::debug!(target: "heron::jit::batch", queued, workers, "starting batch compile");

        let attempted = AtomicUsize::new(0);
        {
            let _region = CooperativeRegion::enter(&self.host_checks);
            thread::scope(|scope| {
                let mut spawned = Vec::with_capacity(workers);
                for index in 0..workers {
                    let receiver = receiver.clone();
                    let attempted = &attempted;
                    let worker = thread::Builder::new()
                        .name(format!("heron-jit-worker-{index}"))
                        .spawn_scoped(scope, move || self.batch_worker(receiver, force, attempted));
                    match worker {
                        Ok(worker) => spawned.push(worker),
                        Err(err) => tracing::warn!(
                            target: "heron::jit::batch",
                            index,
                            error = %err,
                            "failed to spawn jit worker"
                        ),
                    }
                }
                // Workers block on the lock until every one is spawned.
                drop(guard);

                if spawned.is_empty() {
                    self.batch_worker(receiver.clone(), force, &attempted);
                }
                for worker in spawned {
                    if worker.join().is_err() {
                        tracing::error!(target: "heron::jit::batch", "jit worker panicked");
                    }
                }
            });
        }

        let pass = self.with_state(|state| std::mem::take(&mut state.pass));
        let mut retry_compiled = 0;
        for handle in &pass.retry_queue {
            match self.compile_function(handle) {
                Ok(CompileOutcome::Compiled) => retry_compiled += 1,
                Ok(_) | Err(CoordinatorError::FunctionDropped(_)) => {}
                Err(err) => return Err(err),
            }
        }

        let stats = BatchCompileStats {
            queued,
            attempted: attempted.into_inner(),
            retried: pass.retried,
            deferred: pass.deferred,
            retry_compiled,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            target: "heron::jit::batch",
            queued = stats.queued,
            attempted = stats.attempted,
            retried = stats.retried,
            deferred = stats.deferred,
            retry_compiled = stats.retry_compiled,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "batch compile finished"
        );
        self.with_state(|state| state.last_batch = Some(stats.clone()));
        Ok(stats)
    }

    fn batch_worker(&self, work: Receiver<FunctionHandle>, force: bool, attempted: &AtomicUsize) {
        while let Ok(handle) = work.recv() {
            let Some(function) = handle.upgrade() else {
                continue;
            };
            let code = function.code_id();

            // Same gate as compile_function, plus the per-pass claim.
            {
                let guard = self.serialize();
                if !force && self.engine.did_compile(&function) {
                    continue;
                }
                if !self.is_eligible(&guard, &function) {
                    continue;
                }
                let mut state = guard.borrow_mut();
                if !state.pass.claimed.insert(code) {
                    state.pass.retry_queue.push(handle);
                    state.pass.deferred += 1;
                    continue;
                }
                state.pass.in_flight.insert(code);
            }

            attempted.fetch_add(1, Ordering::Relaxed);
            self.log_compile_start(&function);
            let start = Instant::now();
            let result = self.engine.compile(&function);
            let elapsed = start.elapsed();
            let metrics = match result {
                EngineResult::Ok => Some(self.engine.metrics(&function).unwrap_or_default()),
                _ => None,
            };

            let guard = self.serialize();
            let mut state = guard.borrow_mut();
            state.registry.record_compile_time(handle.id(), elapsed);
            state.pass.in_flight.remove(&code);
            match result {
                EngineResult::Ok => {
                    if let Some(metrics) = metrics {
                        state.registry.record_compiled(handle, metrics);
                    }
                }
                EngineResult::Retry => {
                    tracing::info!(
                        target: "heron::jit::batch",
                        function = function.qualname(),
                        "Retrying compile of function"
                    );
                    state.pass.retry_queue.push(handle);
                    state.pass.retried += 1;
                }
                other => {
                    tracing::debug!(
                        target: "heron::jit::batch",
                        function = function.qualname(),
                        result = ?other,
                        "batch compile did not produce code"
                    );
                }
            }
        }
    }
}
