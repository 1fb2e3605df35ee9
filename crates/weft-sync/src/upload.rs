//! The upload loop shared by both push flavors.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use weft_store::StoreConnection;
use weft_transport::{ShareTransport, UploadEntitiesRequest, UploadEntitiesResponse};
use weft_types::{Entity, Hash32};

use crate::error::UploadError;
use crate::progress::PushProgress;

/// Upload everything the server reports missing, to convergence.
///
/// Splits the residual set into batches of at most `batch_size`, loads each
/// batch from the store in a single transaction, and uploads it. A
/// `NeedDependencies` response unions the newly demanded hashes into the
/// residual. There is no iteration cap: the server is responsible for only
/// demanding an acyclic DAG of dependencies, so every round either shrinks
/// the residual or replaces it with strictly older demands.
pub(crate) async fn upload_missing_entities<C: StoreConnection>(
    transport: &dyn ShareTransport,
    conn: &mut C,
    repo_name: &str,
    missing: BTreeSet<Hash32>,
    batch_size: usize,
    progress: &dyn PushProgress,
) -> Result<(), UploadError> {
    let mut remaining = missing;
    let mut uploaded = 0usize;

    while !remaining.is_empty() {
        let batch: Vec<Hash32> = remaining.iter().take(batch_size).copied().collect();
        for hash in &batch {
            remaining.remove(hash);
        }

        let entities: BTreeMap<Hash32, Entity> = conn.transaction(|ops| {
            batch
                .iter()
                .map(|&hash| Ok((hash, ops.expect_entity(hash)?)))
                .collect()
        })?;

        debug!(
            batch = batch.len(),
            remaining = remaining.len(),
            "uploading entity batch"
        );
        let request = UploadEntitiesRequest {
            repo_name: repo_name.to_string(),
            entities,
        };
        match transport.upload_entities(request).await? {
            UploadEntitiesResponse::Success => {
                uploaded += batch.len();
                progress.uploaded(uploaded, remaining.len());
            }
            UploadEntitiesResponse::NeedDependencies(more) => {
                debug!(demanded = more.len(), "server demanded further dependencies");
                remaining.extend(more);
                progress.uploaded(uploaded, remaining.len());
            }
            UploadEntitiesResponse::HashMismatchForEntity { supplied, computed } => {
                return Err(UploadError::EntityHashMismatch { supplied, computed });
            }
            UploadEntitiesResponse::NoWritePermission(repo) => {
                return Err(UploadError::NoWritePermission(repo));
            }
        }
    }

    Ok(())
}
