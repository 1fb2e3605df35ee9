use std::collections::BTreeSet;

use thiserror::Error;

use weft_store::StoreError;
use weft_transport::{HashMismatch, TransportError};
use weft_types::{Hash32, SharePath};

/// Failures of the shared upload loop.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no write permission for repository {0}")]
    NoWritePermission(String),

    #[error("entity hash mismatch: supplied {supplied}, server computed {computed}")]
    EntityHashMismatch { supplied: Hash32, computed: Hash32 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of a check-and-set push.
#[derive(Debug, Error)]
pub enum CheckAndSetPushError {
    /// The remote head was not the expected hash; nothing was changed.
    #[error("remote head at {} changed underneath the push", .0.path)]
    HashMismatch(HashMismatch),

    /// The server demanded dependencies again after a full upload round.
    #[error("server still reports {} missing dependencies after upload", .0.len())]
    ServerMissingDependencies(BTreeSet<Hash32>),

    #[error("no write permission for {0}")]
    NoWritePermission(SharePath),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of a fast-forward push.
#[derive(Debug, Error)]
pub enum FastForwardPushError {
    #[error("no read permission for {0}")]
    NoReadPermission(SharePath),

    #[error("no history at {0}")]
    NoHistory(SharePath),

    /// The remote head is not an ancestor of the local head.
    #[error("the local head is not a fast-forward of the remote head at {0}")]
    NotFastForward(SharePath),

    #[error("server still reports {} missing dependencies after upload", .0.len())]
    ServerMissingDependencies(BTreeSet<Hash32>),

    #[error("invalid parentage: {child} does not extend {parent}")]
    InvalidParentage { parent: Hash32, child: Hash32 },

    #[error("no write permission for {0}")]
    NoWritePermission(SharePath),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of a pull.
#[derive(Debug, Error)]
pub enum PullError {
    #[error("no history at {0}")]
    NoHistoryAtPath(SharePath),

    #[error("no read permission for {0}")]
    NoReadPermission(SharePath),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
