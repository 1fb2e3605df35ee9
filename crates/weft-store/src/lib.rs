//! Store boundary for the weft sync engine.
//!
//! The engine keeps a content-addressed object store in a relational
//! backend. Each entity is in exactly one of three locations:
//!
//! - **main** — the object/causal tables; every dependency of a main entity
//!   is itself in main (the closure invariant)
//! - **temp** — a staging table for entities whose dependencies have not all
//!   arrived yet, with the missing set recorded alongside
//! - **absent** — nowhere
//!
//! Promotion from temp to main happens only when every recorded missing
//! dependency has reached main, and writing an entity to main cascades
//! through any temp rows that were waiting on it.
//!
//! This crate defines the boundary traits ([`SyncStore`],
//! [`StoreConnection`], [`EntityOps`]) and an in-memory implementation
//! ([`MemoryStore`]) for tests and embedding. A relational backend lives
//! with the surrounding codebase, behind the same traits.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryConnection, MemoryStore};
pub use traits::{EntityOps, Location, StoreConnection, SyncStore};
