#![deny(missing_docs)]
//! Document-store boundary for the cortex runtime.
//!
//! The runtime never talks to a database driver directly; it goes through
//! the [`AgentStore`], [`ConversationStore`], and [`MemoryStore`] traits
//! (combined as [`Store`]), which model the three required collections and
//! the atomic update primitives the orchestrator relies on (array push +
//! counter increment in one operation, targeted flag updates).
//!
//! [`InMemoryStore`] is the reference backend: a `RwLock<HashMap>` per
//! collection with brute-force vector ranking and a fuzzy token-overlap
//! text lane. It backs every test in the workspace and any deployment that
//! doesn't need durability. Real document-database backends implement the
//! same traits; if either search lane is unsupported they return
//! [`StoreError::SearchUnavailable`] and hybrid search degrades to the
//! other lane.

mod error;
mod in_memory;
mod traits;

pub use error::StoreError;
pub use in_memory::InMemoryStore;
pub use traits::{
    AgentStore, ConversationStore, MemoryFilter, MemoryPatch, MemoryStore, StatsDelta, Store,
};
