#![deny(missing_docs)]
//! Memory layer for the cortex runtime.
//!
//! [`LongTermMemory`] is the durable, searchable knowledge store: hybrid
//! retrieval runs the store's vector and lexical lanes concurrently and
//! fuses them with reciprocal rank fusion. [`ShortTermMemory`] is the
//! bounded window of recent conversation turns. [`MemoryExtractor`] mines
//! finished turns for new memories in the background.

mod extraction;
mod long_term;
mod short_term;

pub use extraction::MemoryExtractor;
pub use long_term::{LongTermMemory, MemoryError, MemoryUpdate, RRF_K};
pub use short_term::ShortTermMemory;
