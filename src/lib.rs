//! # strata — tiered, identity-keyed entity access
//!
//! strata serves entities by 64-bit id out of a fast in-memory cache, falling
//! through to a local durable store and finally to a remote origin. Bulk
//! misses are coalesced into single round trips, and per-entity staleness
//! lets cached data be invalidated without blocking every caller.
//!
//! ## Core concepts
//!
//! - **[`Provider`]**: the orchestrator over the three tiers
//! - **[`IdSet`]** / **[`ResultSet`]**: the request and response collections,
//!   sized for small cardinalities
//! - **[`Entry`]**: an entity paired with its provider-managed staleness flag
//! - **[`Scope`]**: whether a lookup may fall through to the remote origin
//! - **[`Server`]**: the single-worker execution context providers run on
//!
//! ## Usage
//!
//! ```rust,ignore
//! use strata::{EntityId, IdSet, LruCache, Provider, Scope};
//!
//! let provider = Provider::new(LruCache::new(512), my_local, my_remote);
//!
//! // One bulk call resolves every miss in a single remote round trip.
//! let ids: IdSet = [5u64, 3, 3, 9].into_iter().collect();
//! let results = provider.get_bulk(&ids, Scope::All, None)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod entity;
pub mod error;
pub mod ids;
pub mod provider;
pub mod results;
pub mod server;
pub mod store;

// Re-export primary types at crate root for convenience
pub use entity::{Entry, EntityId, EntityRef, Identified};
pub use error::{Cause, LocalStoreError, StrataError, StrataResult, TransportError};
pub use ids::IdSet;
pub use provider::{BulkError, GetError, Provider, Scope};
pub use results::ResultSet;
pub use server::{Server, ServerConfig, Task, TaskHandle, TaskStatus};
pub use store::{
    LocalStore, LruCache, MemoryCache, MemoryLocalStore, MemoryRemoteStore, RemoteStore, Richness,
};
