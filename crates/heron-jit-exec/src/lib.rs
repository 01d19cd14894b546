//! Heron JIT compilation coordinator
//!
//! Decides which interpreted functions get compiled to native code, when,
//! and by how many workers. The code generator itself sits behind
//! [`CompilationEngine`]; compile policy sits behind [`EligibilityOracle`].
//!
//! Functions are registered as candidates, compiled on demand through
//! [`Coordinator::compile_function`] or drained in bulk by
//! [`Coordinator::compile_all`], and tracked in a registry for
//! introspection.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod allow_list;
pub mod batch;
pub mod bisect;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod handle;
pub mod pending;
pub mod registry;
pub mod single_flight;

pub use allow_list::AllowList;
pub use batch::BatchCompileStats;
pub use bisect::{BisectError, bisect};
pub use config::JitConfig;
pub use coordinator::{Coordinator, InitState};
pub use engine::{CodeMetrics, CompilationEngine, EligibilityOracle, EngineResult};
pub use error::{ConfigError, CoordinatorError};
pub use handle::{CodeId, CodeObject, FunctionFlags, FunctionHandle, FunctionId, JitFunction};
pub use single_flight::{COMPILE_LOG_MARKER, CompileOutcome, MAX_COMPILE_DEPTH};
