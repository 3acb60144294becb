#![deny(missing_docs)]
//! The cortex runtime: context assembly, the orchestrator pipeline, and
//! the composition root that wires every collaborator together.
//!
//! There are no global singletons — [`Runtime`] is constructed once at
//! startup and owns the store handle, embedding service, memory layers,
//! LLM manager, tool router, and MCP manager. The orchestrator borrows
//! them all through `Arc`s.

mod context;
mod orchestrator;
mod runtime;

pub use context::ContextBuilder;
pub use orchestrator::Orchestrator;
pub use runtime::{Runtime, RuntimeConfig};
