//! The concurrent pull pipeline.
//!
//! Four cooperating roles share one piece of state:
//!
//! - the **dispatcher** peels batches off the download set and spawns
//!   downloaders, or exits once everything is quiescent
//! - up to `download_workers` **downloaders** fetch entity batches
//! - the **inserter** writes downloaded batches into the store, one
//!   transaction per batch
//! - the **elaborator** turns freshly staged temp entities into further
//!   download demands
//!
//! All handoff goes through [`PipelineState`] under a single mutex, with a
//! [`Notify`] waking whoever is blocked. The dispatcher's two actions --
//! dispatch a batch, or observe quiescence and exit -- are arms of one atomic
//! choice, so the pipeline can never exit and launch a worker in the same
//! step.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::pin::pin;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tracing::{debug, info};

use weft_store::{Location, StoreConnection, SyncStore};
use weft_transport::{
    DownloadEntitiesRequest, GetCausalHashByPathRequest, GetCausalHashByPathResponse,
    ShareTransport,
};
use weft_types::{CausalHash, Entity, Hash32, HashJwt, SharePath};

use crate::config::SyncConfig;
use crate::error::PullError;
use crate::progress::PullProgress;

/// Download the head at `path` and everything it transitively needs.
///
/// Returns the head's causal hash once it (and its full dependency closure)
/// is in main storage. Temp rows left behind by an earlier interrupted pull
/// are picked up and completed.
pub(crate) async fn pull<S: SyncStore + 'static>(
    store: &Arc<S>,
    transport: &Arc<dyn ShareTransport>,
    path: &SharePath,
    progress: &Arc<dyn PullProgress>,
    config: &SyncConfig,
) -> Result<CausalHash, PullError> {
    let response = transport
        .get_causal_hash_by_path(GetCausalHashByPathRequest { path: path.clone() })
        .await?;
    let head_jwt = match response {
        GetCausalHashByPathResponse::NoReadPermission(denied) => {
            return Err(PullError::NoReadPermission(denied));
        }
        GetCausalHashByPathResponse::Success(None) => {
            return Err(PullError::NoHistoryAtPath(path.clone()));
        }
        GetCausalHashByPathResponse::Success(Some(jwt)) => jwt,
    };
    let head = head_jwt.causal_hash();

    let mut conn = store.connect()?;
    let location = conn.transaction(|ops| ops.entity_location(head.hash()))?;
    let seed: BTreeSet<Hash32> = match location {
        Location::Main => {
            debug!(head = %head.short_hex(), "head already in main storage");
            return Ok(head);
        }
        Location::Temp => BTreeSet::from([head.hash()]),
        Location::Absent => {
            // Fetch the head itself synchronously; the pipeline takes over
            // from whatever it leaves staged.
            progress.queued_for_download(1);
            let request = DownloadEntitiesRequest {
                repo_name: path.repo_name.clone(),
                hashes: BTreeSet::from([head_jwt.clone()]),
            };
            let response = transport.download_entities(request).await?;
            progress.downloaded(1);
            conn.transaction(|ops| {
                let mut staged = BTreeSet::new();
                for (hash, entity) in &response.entities {
                    if ops.insert_entity(*hash, entity)? == Location::Temp {
                        staged.insert(*hash);
                    }
                }
                Ok(staged)
            })?
        }
    };
    drop(conn);

    if !seed.is_empty() {
        run_pipeline(store, transport, path.repo_name.clone(), seed, progress, config).await?;
    }

    info!(%path, head = %head.short_hex(), "pull complete");
    Ok(head)
}

/// A downloaded batch queued for insertion.
struct DownloadedBatch {
    tokens: Vec<HashJwt>,
    entities: BTreeMap<Hash32, Entity>,
}

#[derive(Default)]
struct PipelineState {
    /// Discovered but not yet committed to a downloader.
    to_download: BTreeSet<HashJwt>,
    /// Committed to a downloader or sitting in `downloaded` awaiting insert.
    in_flight_or_buffered: HashSet<HashJwt>,
    downloaded: VecDeque<DownloadedBatch>,
    /// Hashes that just landed in temp, awaiting elaboration.
    new_temp: VecDeque<BTreeSet<Hash32>>,
    /// Live downloaders plus a busy inserter/elaborator; each role checks in
    /// within the same atomic step as its dequeue and checks out when its
    /// results are back in the shared state.
    workers: usize,
    dispatcher_done: bool,
    failure: Option<PullError>,
}

struct PipelineShared {
    state: Mutex<PipelineState>,
    changed: Notify,
}

impl PipelineShared {
    fn wake(&self) {
        self.changed.notify_waiters();
    }

    async fn record_failure(&self, err: PullError) {
        let mut state = self.state.lock().await;
        if state.failure.is_none() {
            state.failure = Some(err);
        }
        drop(state);
        self.wake();
    }
}

async fn run_pipeline<S: SyncStore + 'static>(
    store: &Arc<S>,
    transport: &Arc<dyn ShareTransport>,
    repo_name: String,
    seed: BTreeSet<Hash32>,
    progress: &Arc<dyn PullProgress>,
    config: &SyncConfig,
) -> Result<(), PullError> {
    let shared = Arc::new(PipelineShared {
        state: Mutex::new(PipelineState {
            new_temp: VecDeque::from([seed]),
            ..Default::default()
        }),
        changed: Notify::new(),
    });
    let worker_cap = config.download_workers + 2;

    let mut tasks: JoinSet<()> = JoinSet::new();
    tasks.spawn(run_inserter(Arc::clone(&shared), Arc::clone(store)));
    tasks.spawn(run_elaborator(
        Arc::clone(&shared),
        Arc::clone(store),
        Arc::clone(progress),
    ));

    enum Step {
        Spawn(Vec<HashJwt>),
        Exit,
        Wait,
    }

    loop {
        let mut notified = pin!(shared.changed.notified());
        // Register for wakeups before inspecting state, so a notify landing
        // between the check and the await is not lost.
        notified.as_mut().enable();
        let step = {
            let mut state = shared.state.lock().await;
            if state.failure.is_some() {
                Step::Exit
            } else if !state.to_download.is_empty() && state.workers < worker_cap {
                let batch: Vec<HashJwt> = state
                    .to_download
                    .iter()
                    .take(config.batch_size)
                    .cloned()
                    .collect();
                for token in &batch {
                    state.to_download.remove(token);
                    state.in_flight_or_buffered.insert(token.clone());
                }
                state.workers += 1;
                Step::Spawn(batch)
            } else if state.workers == 0
                && state.to_download.is_empty()
                && state.downloaded.is_empty()
                && state.new_temp.is_empty()
            {
                Step::Exit
            } else {
                Step::Wait
            }
        };
        match step {
            Step::Spawn(batch) => {
                debug!(batch = batch.len(), "dispatching download batch");
                tasks.spawn(run_downloader(
                    Arc::clone(&shared),
                    Arc::clone(transport),
                    repo_name.clone(),
                    batch,
                    Arc::clone(progress),
                ));
            }
            Step::Exit => break,
            Step::Wait => notified.await,
        }
    }

    {
        let mut state = shared.state.lock().await;
        state.dispatcher_done = true;
    }
    shared.wake();

    let failed = shared.state.lock().await.failure.is_some();
    if failed {
        tasks.shutdown().await;
    } else {
        while tasks.join_next().await.is_some() {}
    }

    let mut state = shared.state.lock().await;
    match state.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn run_downloader(
    shared: Arc<PipelineShared>,
    transport: Arc<dyn ShareTransport>,
    repo_name: String,
    tokens: Vec<HashJwt>,
    progress: Arc<dyn PullProgress>,
) {
    let request = DownloadEntitiesRequest {
        repo_name,
        hashes: tokens.iter().cloned().collect(),
    };
    match transport.download_entities(request).await {
        Ok(response) => {
            progress.downloaded(tokens.len());
            let mut state = shared.state.lock().await;
            state.downloaded.push_back(DownloadedBatch {
                tokens,
                entities: response.entities,
            });
            state.workers -= 1;
            drop(state);
            shared.wake();
        }
        Err(err) => {
            let mut state = shared.state.lock().await;
            if state.failure.is_none() {
                state.failure = Some(err.into());
            }
            state.workers -= 1;
            drop(state);
            shared.wake();
        }
    }
}

async fn run_inserter<S: SyncStore>(shared: Arc<PipelineShared>, store: Arc<S>) {
    let mut conn = match store.connect() {
        Ok(conn) => conn,
        Err(err) => return shared.record_failure(err.into()).await,
    };
    loop {
        let mut notified = pin!(shared.changed.notified());
        notified.as_mut().enable();
        let batch = {
            let mut state = shared.state.lock().await;
            if state.failure.is_some() {
                return;
            }
            match state.downloaded.pop_front() {
                Some(batch) => {
                    state.workers += 1;
                    Some(batch)
                }
                None if state.dispatcher_done => return,
                None => None,
            }
        };
        let Some(batch) = batch else {
            notified.await;
            continue;
        };

        let result = conn.transaction(|ops| {
            let mut staged = BTreeSet::new();
            for (hash, entity) in &batch.entities {
                if ops.insert_entity(*hash, entity)? == Location::Temp {
                    staged.insert(*hash);
                }
            }
            Ok(staged)
        });

        let mut state = shared.state.lock().await;
        match result {
            Ok(staged) => {
                // Un-buffer only now that the transaction has committed, so
                // the elaborator cannot re-request entities mid-insert.
                for token in &batch.tokens {
                    state.in_flight_or_buffered.remove(token);
                }
                debug!(
                    inserted = batch.entities.len(),
                    staged = staged.len(),
                    "inserted downloaded batch"
                );
                if !staged.is_empty() {
                    state.new_temp.push_back(staged);
                }
            }
            Err(err) => {
                if state.failure.is_none() {
                    state.failure = Some(err.into());
                }
            }
        }
        state.workers -= 1;
        drop(state);
        shared.wake();
    }
}

async fn run_elaborator<S: SyncStore>(
    shared: Arc<PipelineShared>,
    store: Arc<S>,
    progress: Arc<dyn PullProgress>,
) {
    let mut conn = match store.connect() {
        Ok(conn) => conn,
        Err(err) => return shared.record_failure(err.into()).await,
    };
    loop {
        let mut notified = pin!(shared.changed.notified());
        notified.as_mut().enable();
        let hashes = {
            let mut state = shared.state.lock().await;
            if state.failure.is_some() {
                return;
            }
            match state.new_temp.pop_front() {
                Some(hashes) => {
                    state.workers += 1;
                    Some(hashes)
                }
                None if state.dispatcher_done => return,
                None => None,
            }
        };
        let Some(hashes) = hashes else {
            notified.await;
            continue;
        };

        let result = conn.transaction(|ops| ops.elaborate_hashes(&hashes));

        let mut state = shared.state.lock().await;
        let mut growth = 0usize;
        match result {
            Ok(tokens) => {
                let before = state.to_download.len();
                for token in tokens {
                    if !state.in_flight_or_buffered.contains(&token) {
                        state.to_download.insert(token);
                    }
                }
                growth = state.to_download.len() - before;
                debug!(elaborated = hashes.len(), growth, "elaborated staged entities");
            }
            Err(err) => {
                if state.failure.is_none() {
                    state.failure = Some(err.into());
                }
            }
        }
        state.workers -= 1;
        drop(state);
        shared.wake();
        if growth > 0 {
            progress.queued_for_download(growth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::testutil::{causal, h, jwt, obj, CountingProgress, FakeShare};
    use crate::Syncer;
    use weft_store::{EntityOps, MemoryStore, StoreResult};
    use weft_types::ObjectKind;

    fn path() -> SharePath {
        SharePath::root("alice").child("base")
    }

    fn syncer(
        store: &Arc<MemoryStore>,
        share: &Arc<FakeShare>,
    ) -> Syncer<MemoryStore> {
        Syncer::new(Arc::clone(store), Arc::clone(share) as Arc<dyn ShareTransport>)
    }

    /// Server-side chain: head causal -> namespace -> `terms` term entities.
    fn seed_server_dag(share: &FakeShare, terms: usize) -> (CausalHash, usize) {
        let term_hashes: Vec<Hash32> = (0..terms).map(|i| h(&format!("term{i}"))).collect();
        for &term in &term_hashes {
            share.insert_entity(
                term,
                Entity::Object {
                    kind: ObjectKind::Term,
                    deps: vec![],
                    body: b"term".to_vec(),
                },
            );
        }
        let ns = h("ns");
        share.insert_entity(ns, obj(&term_hashes));
        let head = h("head");
        share.insert_entity(head, causal(ns, &[]));
        share.set_head(&path(), head.into());
        (head.into(), terms + 2)
    }

    #[tokio::test]
    async fn pull_of_empty_path_is_no_history_without_downloads() {
        let store = Arc::new(MemoryStore::new());
        let share = Arc::new(FakeShare::new());
        let err = syncer(&store, &share)
            .pull(&path(), Arc::new(NoProgress))
            .await
            .unwrap_err();
        assert!(matches!(err, PullError::NoHistoryAtPath(_)));
        assert_eq!(share.download_calls(), 0);
    }

    #[tokio::test]
    async fn pull_without_read_permission_surfaces_denial() {
        let store = Arc::new(MemoryStore::new());
        let share = Arc::new(FakeShare::new());
        share.deny_reads();
        let err = syncer(&store, &share)
            .pull(&path(), Arc::new(NoProgress))
            .await
            .unwrap_err();
        assert!(matches!(err, PullError::NoReadPermission(_)));
        assert_eq!(share.download_calls(), 0);
    }

    #[tokio::test]
    async fn pull_of_synced_head_downloads_nothing() {
        let store = Arc::new(MemoryStore::new());
        let share = Arc::new(FakeShare::new());
        let head = h("head");
        let ns = h("ns");
        store
            .connect()
            .unwrap()
            .transaction(|ops: &mut dyn EntityOps| -> StoreResult<()> {
                ops.insert_entity(ns, &obj(&[]))?;
                ops.insert_entity(head, &causal(ns, &[]))?;
                Ok(())
            })
            .unwrap();
        share.set_head(&path(), head.into());

        let pulled = syncer(&store, &share)
            .pull(&path(), Arc::new(NoProgress))
            .await
            .unwrap();
        assert_eq!(pulled, head.into());
        assert_eq!(share.download_calls(), 0);
    }

    #[tokio::test]
    async fn pull_of_three_entity_chain_lands_everything_in_main() {
        let store = Arc::new(MemoryStore::new());
        let share = Arc::new(FakeShare::new());
        // head causal -> ns namespace -> leaf term
        let leaf = h("leaf");
        share.insert_entity(
            leaf,
            Entity::Object {
                kind: ObjectKind::Term,
                deps: vec![],
                body: vec![],
            },
        );
        let ns = h("ns");
        share.insert_entity(ns, obj(&[leaf]));
        let head = h("head");
        share.insert_entity(head, causal(ns, &[]));
        share.set_head(&path(), head.into());

        let pulled = syncer(&store, &share)
            .pull(&path(), Arc::new(NoProgress))
            .await
            .unwrap();

        assert_eq!(pulled, head.into());
        assert_eq!(store.main_len(), 3);
        assert_eq!(store.temp_len(), 0);
        assert!(share.download_calls() >= 2);
    }

    #[tokio::test]
    async fn pull_of_wide_dag_inserts_every_entity_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let share = Arc::new(FakeShare::new());
        let (head, total) = seed_server_dag(&share, 120);
        let progress = Arc::new(CountingProgress::default());

        let pulled = syncer(&store, &share)
            .pull(&path(), progress.clone() as Arc<dyn PullProgress>)
            .await
            .unwrap();

        assert_eq!(pulled, head);
        assert_eq!(store.main_len(), total);
        assert_eq!(store.temp_len(), 0);
        assert_eq!(progress.queued(), total);
        assert_eq!(progress.downloaded(), total);
        // 120 terms at a batch size of 50 means at least five requests in
        // total (head, namespace, three term batches).
        assert!(share.download_calls() >= 5);
        assert!(share.max_download_batch() <= 50);
    }

    #[tokio::test]
    async fn pull_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let share = Arc::new(FakeShare::new());
        let (head, total) = seed_server_dag(&share, 10);
        let syncer = syncer(&store, &share);

        syncer.pull(&path(), Arc::new(NoProgress)).await.unwrap();
        let downloads_after_first = share.download_calls();
        assert_eq!(store.main_len(), total);

        let pulled = syncer.pull(&path(), Arc::new(NoProgress)).await.unwrap();
        assert_eq!(pulled, head);
        assert_eq!(share.download_calls(), downloads_after_first);
        assert_eq!(store.main_len(), total);
    }

    #[tokio::test]
    async fn pull_resumes_from_temp_rows() {
        let store = Arc::new(MemoryStore::new());
        let share = Arc::new(FakeShare::new());
        let ns = h("ns");
        share.insert_entity(ns, obj(&[]));
        let head = h("head");
        let head_entity = causal(ns, &[]);
        share.insert_entity(head, head_entity.clone());
        share.set_head(&path(), head.into());

        // Simulate an interrupted earlier pull: the head is staged with its
        // namespace still missing.
        store
            .connect()
            .unwrap()
            .transaction(|ops: &mut dyn EntityOps| -> StoreResult<()> {
                ops.insert_temp_entity(
                    head,
                    &head_entity,
                    &std::collections::BTreeMap::from([(ns, jwt(ns))]),
                )?;
                Ok(())
            })
            .unwrap();

        let pulled = syncer(&store, &share)
            .pull(&path(), Arc::new(NoProgress))
            .await
            .unwrap();

        assert_eq!(pulled, head.into());
        assert_eq!(store.main_len(), 2);
        assert_eq!(store.temp_len(), 0);
        // Only the namespace was fetched; the head was already local.
        assert_eq!(share.download_calls(), 1);
    }

    #[tokio::test]
    async fn download_failure_aborts_the_pull_and_keeps_staged_rows() {
        let store = Arc::new(MemoryStore::new());
        let share = Arc::new(FakeShare::new());
        let ns = h("ns");
        share.insert_entity(ns, obj(&[]));
        let head = h("head");
        let head_entity = causal(ns, &[]);
        share.insert_entity(head, head_entity.clone());
        share.set_head(&path(), head.into());
        store
            .connect()
            .unwrap()
            .transaction(|ops: &mut dyn EntityOps| -> StoreResult<()> {
                ops.insert_temp_entity(
                    head,
                    &head_entity,
                    &std::collections::BTreeMap::from([(ns, jwt(ns))]),
                )?;
                Ok(())
            })
            .unwrap();
        share.fail_downloads();

        let err = syncer(&store, &share)
            .pull(&path(), Arc::new(NoProgress))
            .await
            .unwrap_err();
        assert!(matches!(err, PullError::Transport(_)));
        // The staged head survives for the next attempt.
        assert_eq!(store.temp_len(), 1);
    }

    #[tokio::test]
    async fn push_then_pull_round_trips_between_stores() {
        let share = Arc::new(FakeShare::new());
        let pusher = Arc::new(MemoryStore::new());
        let head = h("head");
        let ns = h("ns");
        pusher
            .connect()
            .unwrap()
            .transaction(|ops: &mut dyn EntityOps| -> StoreResult<()> {
                ops.insert_entity(ns, &obj(&[]))?;
                ops.insert_entity(head, &causal(ns, &[]))?;
                Ok(())
            })
            .unwrap();
        syncer(&pusher, &share)
            .push_check_and_set(&path(), None, head.into(), &NoProgress)
            .await
            .unwrap();

        let puller = Arc::new(MemoryStore::new());
        let pulled = syncer(&puller, &share)
            .pull(&path(), Arc::new(NoProgress))
            .await
            .unwrap();

        assert_eq!(pulled, head.into());
        assert_eq!(puller.main_len(), 2);
        assert_eq!(puller.temp_len(), 0);
    }

    #[tokio::test]
    async fn pull_reports_progress_counts() {
        let store = Arc::new(MemoryStore::new());
        let share = Arc::new(FakeShare::new());
        let (_, total) = seed_server_dag(&share, 7);
        let progress = Arc::new(CountingProgress::default());

        syncer(&store, &share)
            .pull(&path(), progress.clone() as Arc<dyn PullProgress>)
            .await
            .unwrap();

        assert_eq!(progress.queued(), total);
        assert_eq!(progress.downloaded(), total);
    }
}
