//! Single-function compile path.
//!
//! Compiling one function can discover and compile another (inlining,
//! specialization), so this path is re-entrant. The attempt record bounds
//! that recursion and refuses to start a second compile of a code body that
//! is already being compiled further up the stack.

use std::cell::RefCell;
use std::time::Instant;

use smallvec::SmallVec;

use crate::coordinator::{Coordinator, SharedState};
use crate::engine::EngineResult;
use crate::error::CoordinatorError;
use crate::handle::{CodeId, FunctionHandle, JitFunction};

/// Maximum number of nested compiles on the lock-holding thread.
pub const MAX_COMPILE_DEPTH: usize = 10;

/// Prefix of the debug line emitted before every engine invocation.
///
/// Full line: `-- Compiling <qualname> @ 0x<function id>`.
pub const COMPILE_LOG_MARKER: &str = "-- Compiling";

/// Outcome of a compile request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Native code was produced and installed by this call.
    Compiled,
    /// Native code was already installed; the engine was not invoked.
    AlreadyCompiled,
    /// Rejected by eligibility policy or by the engine.
    NotEligible,
    /// Could not be attempted or finished now; may succeed later.
    TransientFailure,
    /// The engine failed; the function stays interpreted.
    Failed,
}

impl CompileOutcome {
    /// Whether native code is installed after this outcome.
    pub fn is_compiled(self) -> bool {
        matches!(self, Self::Compiled | Self::AlreadyCompiled)
    }
}

impl From<EngineResult> for CompileOutcome {
    fn from(result: EngineResult) -> Self {
        match result {
            EngineResult::Ok => Self::Compiled,
            EngineResult::Retry => Self::TransientFailure,
            EngineResult::CannotSpecialize => Self::NotEligible,
            EngineResult::Failure => Self::Failed,
        }
    }
}

/// Why a compile attempt was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptRejected {
    /// [`MAX_COMPILE_DEPTH`] compiles are already nested.
    DepthExceeded,
    /// The same code body is already being compiled.
    AlreadyActive,
}

/// Code bodies currently being compiled by the serialization-lock owner.
///
/// Only the lock owner pushes, so the record is that thread's call stack of
/// compiles. Never holds a [`CodeId`] twice.
#[derive(Debug, Default)]
pub struct CompileAttemptRecord {
    active: SmallVec<[CodeId; MAX_COMPILE_DEPTH]>,
}

impl CompileAttemptRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `code` unless the depth cap is hit or it is already active.
    pub fn try_push(&mut self, code: CodeId) -> Result<(), AttemptRejected> {
        if self.active.len() >= MAX_COMPILE_DEPTH {
            return Err(AttemptRejected::DepthExceeded);
        }
        if self.active.contains(&code) {
            return Err(AttemptRejected::AlreadyActive);
        }
        self.active.push(code);
        Ok(())
    }

    /// Pop the innermost attempt, which must be `code`.
    pub fn pop(&mut self, code: CodeId) {
        let popped = self.active.pop();
        debug_assert_eq!(popped, Some(code), "compile attempts popped out of order");
    }

    /// Whether `code` is being compiled.
    pub fn contains(&self, code: CodeId) -> bool {
        self.active.contains(&code)
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.active.len()
    }
}

/// Pops the attempt record even if the engine panics.
struct ActiveAttempt<'a> {
    state: &'a RefCell<SharedState>,
    code: CodeId,
}

impl Drop for ActiveAttempt<'_> {
    fn drop(&mut self) {
        self.state.borrow_mut().attempts.pop(self.code);
    }
}

impl Coordinator {
    /// Compile one function synchronously on the calling thread.
    ///
    /// Safe to call re-entrantly from inside
    /// [`CompilationEngine::compile`](crate::CompilationEngine::compile). Returns
    /// [`CompileOutcome::TransientFailure`] without invoking the engine when
    /// the nesting cap is reached or the function's code body is already
    /// being compiled.
    pub fn compile_function(
        &self,
        handle: &FunctionHandle,
    ) -> Result<CompileOutcome, CoordinatorError> {
        let guard = self.serialize();
        let state: &RefCell<SharedState> = &guard;
        state.borrow().ensure_initialized()?;

        let Some(function) = handle.upgrade() else {
            state.borrow_mut().pending.remove(handle);
            return Err(CoordinatorError::FunctionDropped(handle.id()));
        };

        // Keep these checks in sync with the batch worker.
        if self.engine.did_compile(&function) {
            return Ok(CompileOutcome::AlreadyCompiled);
        }
        if !self.is_eligible(state, &function) {
            return Ok(CompileOutcome::NotEligible);
        }

        let code = function.code_id();
        {
            let mut shared = state.borrow_mut();
            let admitted = if shared.pass.in_flight.contains(&code) {
                Err(AttemptRejected::AlreadyActive)
            } else {
                shared.attempts.try_push(code)
            };
            if let Err(reason) = admitted {
                tracing::debug!(
                    target: "heron::jit",
                    function = function.qualname(),
                    depth = shared.attempts.depth(),
                    ?reason,
                    "compile not attempted"
                );
                return Ok(CompileOutcome::TransientFailure);
            }
            shared.pending.remove(handle);
        }

        let result = {
            let _attempt = ActiveAttempt { state, code };
            self.log_compile_start(&function);
            let start = Instant::now();
            let result = self.engine.compile(&function);
            let elapsed = start.elapsed();
            state
                .borrow_mut()
                .registry
                .record_compile_time(handle.id(), elapsed);
            result
        };

        let metrics = match result {
            EngineResult::Ok => Some(self.engine.metrics(&function).unwrap_or_default()),
            _ => None,
        };
        let outcome = CompileOutcome::from(result);
        let mut shared = state.borrow_mut();
        if let Some(metrics) = metrics {
            shared.registry.record_compiled(handle.clone(), metrics);
        }
        if outcome == CompileOutcome::Failed {
            tracing::warn!(
                target: "heron::jit",
                function = function.qualname(),
                "jit compilation failed"
            );
        }
        Ok(outcome)
    }

    /// Emit the `-- Compiling` line for `function`; `info` in debug mode.
    pub(crate) fn log_compile_start(&self, function: &JitFunction) {
        if self.config().debug {
            tracing::info!(
                target: "heron::jit",
                "{} {} @ {:#x}",
                COMPILE_LOG_MARKER,
                function.qualname(),
                function.id().as_u64()
            );
        } else {
            tracing::debug!(
                target: "heron::jit",
                "{} {} @ {:#x}",
                COMPILE_LOG_MARKER,
                function.qualname(),
                function.id().as_u64()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{CodeObject, JitFunction};

    #[test]
    fn record_rejects_duplicate_code() {
        let code = CodeObject::new("f").id();
        let mut record = CompileAttemptRecord::new();
        assert_eq!(record.try_push(code), Ok(()));
        assert_eq!(record.try_push(code), Err(AttemptRejected::AlreadyActive));
        record.pop(code);
        assert_eq!(record.depth(), 0);
    }

    #[test]
    fn record_caps_depth() {
        let mut record = CompileAttemptRecord::new();
        for i in 0..MAX_COMPILE_DEPTH {
            let func = JitFunction::new(format!("m:f{i}"), CodeObject::new("f"));
            assert_eq!(record.try_push(func.code_id()), Ok(()));
        }
        let extra = CodeObject::new("extra").id();
        assert_eq!(record.try_push(extra), Err(AttemptRejected::DepthExceeded));
        assert_eq!(record.depth(), MAX_COMPILE_DEPTH);
        assert!(!record.contains(extra));
    }

    #[test]
    fn engine_results_translate() {
        assert_eq!(CompileOutcome::from(EngineResult::Ok), CompileOutcome::Compiled);
        assert_eq!(
            CompileOutcome::from(EngineResult::Retry),
            CompileOutcome::TransientFailure
        );
        assert_eq!(
            CompileOutcome::from(EngineResult::CannotSpecialize),
            CompileOutcome::NotEligible
        );
        assert_eq!(CompileOutcome::from(EngineResult::Failure), CompileOutcome::Failed);
        assert!(CompileOutcome::AlreadyCompiled.is_compiled());
        assert!(!CompileOutcome::TransientFailure.is_compiled());
    }
}
