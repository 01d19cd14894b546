//! Code-generation backend and eligibility seams.
//!
//! Both are external collaborators. The coordinator depends only on the
//! traits below: an opaque compile operation, an idempotency check, size
//! accessors for diagnostics, and an opaque eligibility predicate.

use crate::handle::JitFunction;

/// Raw result reported by a [`CompilationEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineResult {
    /// Native code was produced and installed.
    Ok,
    /// Cannot finish now (e.g. a callee is being compiled elsewhere).
    Retry,
    /// The backend refuses this function.
    CannotSpecialize,
    /// Unrecoverable backend error.
    Failure,
}

/// Size metrics of installed native code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeMetrics {
    /// Machine code size in bytes.
    pub code_size: usize,
    /// Native frame size in bytes.
    pub stack_size: usize,
    /// Part of the frame used for register spills, in bytes.
    pub spill_stack_size: usize,
}

/// Backend that lowers a function to native code.
///
/// `compile` may be invoked concurrently from batch workers, but never for
/// two functions sharing a code identity at the same time within one pass.
/// It may also call back into the coordinator re-entrantly.
pub trait CompilationEngine: Send + Sync {
    /// Attempt to compile and install native code for `function`.
    fn compile(&self, function: &JitFunction) -> EngineResult;

    /// Whether native code is currently installed for `function`.
    fn did_compile(&self, function: &JitFunction) -> bool;

    /// Size metrics for installed code, `None` if not compiled.
    fn metrics(&self, function: &JitFunction) -> Option<CodeMetrics>;
}

/// Policy deciding whether a function may be compiled at all.
pub trait EligibilityOracle: Send + Sync {
    /// Whether `function` is permitted to be compiled.
    fn is_eligible(&self, function: &JitFunction) -> bool;
}

impl<F> EligibilityOracle for F
where
    F: Fn(&JitFunction) -> bool + Send + Sync,
{
    fn is_eligible(&self, function: &JitFunction) -> bool {
        self(function)
    }
}
