//! Push entry points: check-and-set and fast-forward.

use std::collections::BTreeSet;

use tracing::debug;

use weft_store::{StoreConnection, SyncStore};
use weft_transport::{
    FastForwardPathRequest, FastForwardPathResponse, GetCausalHashByPathRequest,
    GetCausalHashByPathResponse, ShareTransport, UpdatePathRequest, UpdatePathResponse,
};
use weft_types::{CausalHash, SharePath};

use crate::error::{CheckAndSetPushError, FastForwardPushError};
use crate::progress::PushProgress;
use crate::spine::causal_spine_between;
use crate::upload::upload_missing_entities;

/// Atomically replace the remote head at `path` with `new_hash`.
///
/// If the server demands missing dependencies, they are uploaded and the
/// update is retried exactly once. A second dependency demand after a full
/// upload round means both sides think the other is at fault; that surfaces
/// as [`CheckAndSetPushError::ServerMissingDependencies`] rather than
/// looping.
pub(crate) async fn check_and_set<S: SyncStore>(
    store: &S,
    transport: &dyn ShareTransport,
    path: &SharePath,
    expected_hash: Option<CausalHash>,
    new_hash: CausalHash,
    batch_size: usize,
    progress: &dyn PushProgress,
) -> Result<(), CheckAndSetPushError> {
    let request = UpdatePathRequest {
        path: path.clone(),
        expected_hash: expected_hash.map(Into::into),
        new_hash,
    };
    debug!(%path, new_hash = %new_hash.short_hex(), "check-and-set push");

    let missing = match transport.update_path(request.clone()).await? {
        UpdatePathResponse::Success => return Ok(()),
        UpdatePathResponse::HashMismatch(mismatch) => {
            return Err(CheckAndSetPushError::HashMismatch(mismatch));
        }
        UpdatePathResponse::NoWritePermission(denied) => {
            return Err(CheckAndSetPushError::NoWritePermission(denied));
        }
        UpdatePathResponse::MissingDependencies(missing) => missing,
    };

    let mut conn = store.connect()?;
    upload_missing_entities(
        transport,
        &mut conn,
        &path.repo_name,
        missing,
        batch_size,
        progress,
    )
    .await?;

    // The server now has everything it asked for; retry once.
    match transport.update_path(request).await? {
        UpdatePathResponse::Success => Ok(()),
        UpdatePathResponse::HashMismatch(mismatch) => {
            Err(CheckAndSetPushError::HashMismatch(mismatch))
        }
        UpdatePathResponse::MissingDependencies(more) => {
            Err(CheckAndSetPushError::ServerMissingDependencies(more))
        }
        UpdatePathResponse::NoWritePermission(denied) => {
            Err(CheckAndSetPushError::NoWritePermission(denied))
        }
    }
}

/// Advance the remote head at `path` to `local_head` along a causal chain
/// the local store already holds.
///
/// The full chain is transmitted oldest first; only the head entity is
/// uploaded up front, since the server requests the interior causals as it
/// needs them.
pub(crate) async fn fast_forward<S: SyncStore>(
    store: &S,
    transport: &dyn ShareTransport,
    path: &SharePath,
    local_head: CausalHash,
    batch_size: usize,
    progress: &dyn PushProgress,
) -> Result<(), FastForwardPushError> {
    let response = transport
        .get_causal_hash_by_path(GetCausalHashByPathRequest { path: path.clone() })
        .await?;
    let remote_head = match response {
        GetCausalHashByPathResponse::NoReadPermission(denied) => {
            return Err(FastForwardPushError::NoReadPermission(denied));
        }
        GetCausalHashByPathResponse::Success(None) => {
            return Err(FastForwardPushError::NoHistory(path.clone()));
        }
        GetCausalHashByPathResponse::Success(Some(jwt)) => jwt.causal_hash(),
    };

    let mut conn = store.connect()?;
    let spine = conn.transaction(|ops| causal_spine_between(ops, remote_head, local_head))?;
    let Some(spine) = spine else {
        return Err(FastForwardPushError::NotFastForward(path.clone()));
    };
    if spine.is_empty() {
        debug!(%path, "remote already at local head");
        return Ok(());
    }

    // The spine starts at the matched remote head; the chain to transmit is
    // the interior plus the new local head.
    let mut hashes: Vec<CausalHash> = spine[1..].to_vec();
    hashes.push(local_head);
    debug!(%path, chain = hashes.len(), "fast-forward push");

    upload_missing_entities(
        transport,
        &mut conn,
        &path.repo_name,
        BTreeSet::from([local_head.hash()]),
        batch_size,
        progress,
    )
    .await?;

    let request = FastForwardPathRequest {
        path: path.clone(),
        expected_hash: remote_head,
        hashes,
    };
    match transport.fast_forward_path(request).await? {
        FastForwardPathResponse::Success => Ok(()),
        FastForwardPathResponse::MissingDependencies(missing) => {
            Err(FastForwardPushError::ServerMissingDependencies(missing))
        }
        FastForwardPathResponse::NoHistory => Err(FastForwardPushError::NoHistory(path.clone())),
        FastForwardPathResponse::NotFastForward => {
            Err(FastForwardPushError::NotFastForward(path.clone()))
        }
        FastForwardPathResponse::InvalidParentage { parent, child } => {
            Err(FastForwardPushError::InvalidParentage { parent, child })
        }
        FastForwardPathResponse::NoWritePermission(denied) => {
            Err(FastForwardPushError::NoWritePermission(denied))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::testutil::{causal, h, obj, FakeShare};
    use std::sync::Arc;
    use weft_store::{EntityOps, MemoryStore, StoreResult, SyncStore};
    use weft_transport::HashMismatch;
    use weft_types::Hash32;

    fn path() -> SharePath {
        SharePath::root("alice").child("base")
    }

    /// Local store holding the causal chain `hashes` (ancestors first), each
    /// causal sharing one namespace entity.
    fn store_with_chain(hashes: &[Hash32]) -> MemoryStore {
        let store = MemoryStore::new();
        let mut conn = store.connect().unwrap();
        let ns = h("ns");
        conn.transaction(|ops: &mut dyn EntityOps| -> StoreResult<()> {
            ops.insert_entity(ns, &obj(&[]))?;
            for (i, &hash) in hashes.iter().enumerate() {
                let parents: &[Hash32] = if i == 0 { &[] } else { &hashes[i - 1..i] };
                ops.insert_entity(hash, &causal(ns, parents))?;
            }
            Ok(())
        })
        .unwrap();
        store
    }

    #[tokio::test]
    async fn check_and_set_success_on_first_try_uploads_nothing() {
        let head = h("head");
        let store = store_with_chain(&[head]);
        let share = FakeShare::new();
        share.script_update_path(UpdatePathResponse::Success);

        check_and_set(&store, &share, &path(), None, head.into(), 50, &NoProgress)
            .await
            .unwrap();
        assert_eq!(share.upload_calls(), 0);
        assert_eq!(share.update_path_calls(), 1);
    }

    #[tokio::test]
    async fn check_and_set_mismatch_uploads_nothing() {
        let head = h("head");
        let store = store_with_chain(&[head]);
        let share = FakeShare::new();
        share.script_update_path(UpdatePathResponse::HashMismatch(HashMismatch {
            path: path(),
            expected: None,
            actual: Some(h("other")),
        }));

        let err = check_and_set(&store, &share, &path(), None, head.into(), 50, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckAndSetPushError::HashMismatch(_)));
        assert_eq!(share.upload_calls(), 0);
    }

    #[tokio::test]
    async fn check_and_set_uploads_demanded_dependencies_then_retries_once() {
        let head = h("head");
        let store = store_with_chain(&[head]);
        let share = FakeShare::new();

        check_and_set(&store, &share, &path(), None, head.into(), 50, &NoProgress)
            .await
            .unwrap();

        // First call demanded the head, the upload loop converged, and the
        // retry succeeded.
        assert_eq!(share.update_path_calls(), 2);
        assert!(share.upload_calls() >= 1);
        assert!(share.has_entity(head));
        assert_eq!(share.head(&path()), Some(head.into()));
    }

    #[tokio::test]
    async fn check_and_set_race_lost_after_upload_surfaces_mismatch() {
        let head = h("head");
        let store = store_with_chain(&[head]);
        let share = FakeShare::new();
        share.script_update_path(UpdatePathResponse::MissingDependencies(
            [head].into(),
        ));
        share.script_update_path(UpdatePathResponse::HashMismatch(HashMismatch {
            path: path(),
            expected: None,
            actual: Some(h("raced")),
        }));

        let err = check_and_set(&store, &share, &path(), None, head.into(), 50, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckAndSetPushError::HashMismatch(_)));
    }

    #[tokio::test]
    async fn check_and_set_second_demand_is_server_missing_dependencies() {
        let head = h("head");
        let store = store_with_chain(&[head]);
        let share = FakeShare::new();
        share.script_update_path(UpdatePathResponse::MissingDependencies([head].into()));
        share.script_update_path(UpdatePathResponse::MissingDependencies(
            [h("still-missing")].into(),
        ));

        let err = check_and_set(&store, &share, &path(), None, head.into(), 50, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckAndSetPushError::ServerMissingDependencies(_)
        ));
    }

    #[tokio::test]
    async fn check_and_set_push_is_idempotent() {
        let head = h("head");
        let store = store_with_chain(&[head]);
        let share = FakeShare::new();

        check_and_set(&store, &share, &path(), None, head.into(), 50, &NoProgress)
            .await
            .unwrap();
        let uploads_after_first = share.upload_calls();

        check_and_set(
            &store,
            &share,
            &path(),
            Some(head.into()),
            head.into(),
            50,
            &NoProgress,
        )
        .await
        .unwrap();
        assert_eq!(share.upload_calls(), uploads_after_first);
    }

    #[tokio::test]
    async fn fast_forward_three_hop_chain_transmits_interior_plus_head() {
        let remote = h("remote");
        let m1 = h("m1");
        let m2 = h("m2");
        let local = h("local");
        let store = store_with_chain(&[remote, m1, m2, local]);
        let share = FakeShare::new();
        share.set_head(&path(), remote.into());
        share.insert_entity(h("ns"), obj(&[]));
        share.insert_entity(remote, causal(h("ns"), &[]));

        fast_forward(&store, &share, &path(), local.into(), 50, &NoProgress)
            .await
            .unwrap();

        let requests = share.fast_forward_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].expected_hash, remote.into());
        assert_eq!(
            requests[0].hashes,
            vec![m1.into(), m2.into(), local.into()]
        );
        // The head entity went up before the fast-forward call.
        assert!(share.has_entity(local));
        assert_eq!(share.head(&path()), Some(local.into()));
    }

    #[tokio::test]
    async fn fast_forward_missing_dependencies_surfaces_as_server_missing() {
        let remote = h("remote");
        let m1 = h("m1");
        let m2 = h("m2");
        let local = h("local");
        let store = store_with_chain(&[remote, m1, m2, local]);
        let share = FakeShare::new();
        share.set_head(&path(), remote.into());
        share.script_fast_forward(FastForwardPathResponse::MissingDependencies(
            [m1, m2].into(),
        ));

        let err = fast_forward(&store, &share, &path(), local.into(), 50, &NoProgress)
            .await
            .unwrap_err();
        match err {
            FastForwardPushError::ServerMissingDependencies(missing) => {
                assert_eq!(missing, [m1, m2].into());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fast_forward_of_empty_path_is_no_history() {
        let local = h("local");
        let store = store_with_chain(&[local]);
        let share = FakeShare::new();

        let err = fast_forward(&store, &share, &path(), local.into(), 50, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, FastForwardPushError::NoHistory(_)));
    }

    #[tokio::test]
    async fn fast_forward_without_read_permission_surfaces_denial() {
        let local = h("local");
        let store = store_with_chain(&[local]);
        let share = FakeShare::new();
        share.deny_reads();

        let err = fast_forward(&store, &share, &path(), local.into(), 50, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, FastForwardPushError::NoReadPermission(_)));
    }

    #[tokio::test]
    async fn fast_forward_from_unrelated_head_is_not_fast_forward() {
        let local = h("local");
        let store = store_with_chain(&[local]);
        let share = FakeShare::new();
        share.set_head(&path(), h("unrelated").into());

        let err = fast_forward(&store, &share, &path(), local.into(), 50, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, FastForwardPushError::NotFastForward(_)));
        assert_eq!(share.upload_calls(), 0);
    }

    #[tokio::test]
    async fn fast_forward_of_identical_heads_is_ok_without_calls() {
        let local = h("local");
        let store = store_with_chain(&[local]);
        let share = FakeShare::new();
        share.set_head(&path(), local.into());

        fast_forward(&store, &share, &path(), local.into(), 50, &NoProgress)
            .await
            .unwrap();
        assert_eq!(share.upload_calls(), 0);
        assert!(share.fast_forward_requests().is_empty());
    }

    #[tokio::test]
    async fn syncer_facade_drives_push() {
        let head = h("head");
        let store = Arc::new(store_with_chain(&[head]));
        let share = Arc::new(FakeShare::new());
        let syncer = crate::Syncer::new(store, share.clone());

        syncer
            .push_check_and_set(&path(), None, head.into(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(share.head(&path()), Some(head.into()));
    }
}
