//! Execution of resolution jobs off the caller's thread.

/// Worker pool running resolution jobs.
pub mod runtime;

pub use runtime::{ResolveHandle, ResolverRuntime, RuntimeConfig};
