//! Storage collaborator contracts and reference backends.
//!
//! The traits here define the interfaces the provider consumes; [`memory`]
//! provides thread-safe in-memory implementations for embedded use and tests.

pub mod memory;
mod traits;

pub use memory::{LruCache, MemoryLocalStore, MemoryRemoteStore, Richness};
pub use traits::{LocalStore, MemoryCache, RemoteStore};
