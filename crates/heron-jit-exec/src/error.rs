//! Error types for the compilation coordinator.

use std::path::PathBuf;

use crate::handle::FunctionId;

/// Errors from coordinator lifecycle and API misuse.
///
/// Per-function compile outcomes are not errors; see
/// [`CompileOutcome`](crate::CompileOutcome).
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// The coordinator has not been initialized.
    #[error("jit coordinator is not initialized")]
    NotInitialized,

    /// The coordinator has been finalized.
    #[error("jit coordinator has been finalized")]
    Finalized,

    /// The host dropped the function before it could be compiled.
    #[error("function {0:?} was dropped by the host")]
    FunctionDropped(FunctionId),

    /// Forced multithreaded recompile requested without test mode.
    #[error("test_multithreaded_compile not enabled")]
    TestRecompileDisabled,

    /// Batch recompile requested with `batch_compile_workers = 0`.
    #[error("batch compile requested but no workers are configured")]
    ZeroWorkersConfigured,

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors produced while loading [`JitConfig`](crate::JitConfig) or an
/// allow-list.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable holds a value that cannot be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },

    /// TOML document failed to parse.
    #[error("failed to parse jit config: {0}")]
    Toml(#[from] toml::de::Error),

    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}
