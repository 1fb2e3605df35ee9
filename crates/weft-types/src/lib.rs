//! Foundation types for the weft sync engine.
//!
//! This crate provides the identity and payload types shared by every other
//! weft crate: content addresses, fetch tokens, entity payloads, and remote
//! paths.
//!
//! # Key Types
//!
//! - [`Hash32`] — 32-byte content address, rendered as lowercase hex
//! - [`CausalHash`] — a `Hash32` known to address a causal (history node)
//! - [`HashJwt`] — a server-signed token binding a hash to fetch permission
//! - [`Entity`] — a parsed payload (causal or object) with its dependencies
//! - [`SharePath`] — a remote location: repository name plus name segments

pub mod entity;
pub mod error;
pub mod hash;
pub mod jwt;
pub mod path;

pub use entity::{Entity, ObjectKind};
pub use error::TypeError;
pub use hash::{CausalHash, Hash32};
pub use jwt::HashJwt;
pub use path::SharePath;
