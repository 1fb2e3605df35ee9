use std::sync::Arc;

use weft_store::SyncStore;
use weft_transport::ShareTransport;
use weft_types::{CausalHash, SharePath};

use crate::config::SyncConfig;
use crate::error::{CheckAndSetPushError, FastForwardPushError, PullError};
use crate::progress::{PullProgress, PushProgress};
use crate::{pull, push};

/// Client-side sync engine against one Share instance.
///
/// Holds a store handle and a transport; each push or pull call opens its
/// own store connections and leaves no state behind beyond what it committed
/// to the store.
pub struct Syncer<S> {
    store: Arc<S>,
    transport: Arc<dyn ShareTransport>,
    config: SyncConfig,
}

impl<S: SyncStore + 'static> Syncer<S> {
    pub fn new(store: Arc<S>, transport: Arc<dyn ShareTransport>) -> Self {
        Self::with_config(store, transport, SyncConfig::default())
    }

    pub fn with_config(
        store: Arc<S>,
        transport: Arc<dyn ShareTransport>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Atomically replace the remote head at `path` with `new_hash`,
    /// uploading whatever dependencies the server reports missing.
    ///
    /// `expected_hash` is the head the caller last saw (`None` to create the
    /// path); the server rejects the swap if someone else moved it.
    pub async fn push_check_and_set(
        &self,
        path: &SharePath,
        expected_hash: Option<CausalHash>,
        new_hash: CausalHash,
        progress: &dyn PushProgress,
    ) -> Result<(), CheckAndSetPushError> {
        push::check_and_set(
            self.store.as_ref(),
            self.transport.as_ref(),
            path,
            expected_hash,
            new_hash,
            self.config.batch_size,
            progress,
        )
        .await
    }

    /// Advance the remote head at `path` to `local_head` along a causal
    /// chain the local store already holds.
    pub async fn push_fast_forward(
        &self,
        path: &SharePath,
        local_head: CausalHash,
        progress: &dyn PushProgress,
    ) -> Result<(), FastForwardPushError> {
        push::fast_forward(
            self.store.as_ref(),
            self.transport.as_ref(),
            path,
            local_head,
            self.config.batch_size,
            progress,
        )
        .await
    }

    /// Download the head at `path` with its full dependency closure,
    /// returning its causal hash once everything is in main storage.
    pub async fn pull(
        &self,
        path: &SharePath,
        progress: Arc<dyn PullProgress>,
    ) -> Result<CausalHash, PullError> {
        pull::pull(&self.store, &self.transport, path, &progress, &self.config).await
    }
}
