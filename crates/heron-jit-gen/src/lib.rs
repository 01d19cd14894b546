//! Heron JIT generator support
//!
//! Compiled generator-like functions keep their suspended state in an
//! [`ExecutionFooter`]. [`JitGenerator`] drives the footer through
//! `NotStarted -> Running -> Completed`, lets the garbage collector visit
//! the locals that must stay reachable while suspended, and releases them
//! exactly once on teardown.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod generator;
pub mod yield_point;

pub use generator::{EntryPoint, ExecutionFooter, GenState, JitGenerator, ResumeInput};
pub use yield_point::{LiveLocals, YieldPoint};
