//! Shared test fixtures: an in-process fake Share server and small entity
//! constructors.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use weft_transport::{
    DownloadEntitiesRequest, DownloadEntitiesResponse, FastForwardPathRequest,
    FastForwardPathResponse, GetCausalHashByPathRequest, GetCausalHashByPathResponse,
    ShareTransport, TransportError, TransportResult, UpdatePathRequest, UpdatePathResponse,
    UploadEntitiesRequest, UploadEntitiesResponse,
};
use weft_types::{CausalHash, Entity, Hash32, HashJwt, ObjectKind, SharePath};

use crate::progress::{PullProgress, PushProgress};

pub(crate) fn h(label: &str) -> Hash32 {
    Hash32::digest(label.as_bytes())
}

pub(crate) fn jwt(hash: Hash32) -> HashJwt {
    HashJwt::unverified(hash)
}

pub(crate) fn obj(deps: &[Hash32]) -> Entity {
    Entity::Object {
        kind: ObjectKind::Namespace,
        deps: deps.iter().copied().map(HashJwt::unverified).collect(),
        body: Vec::new(),
    }
}

pub(crate) fn causal(namespace: Hash32, parents: &[Hash32]) -> Entity {
    Entity::Causal {
        namespace: HashJwt::unverified(namespace),
        parents: parents.iter().copied().map(HashJwt::unverified).collect(),
    }
}

/// Progress recorder for assertions.
#[derive(Default)]
pub(crate) struct CountingProgress {
    downloaded: AtomicUsize,
    queued: AtomicUsize,
    upload_rounds: Mutex<Vec<(usize, usize)>>,
}

impl CountingProgress {
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn upload_rounds(&self) -> Vec<(usize, usize)> {
        self.upload_rounds.lock().unwrap().clone()
    }
}

impl PullProgress for CountingProgress {
    fn downloaded(&self, count: usize) {
        self.downloaded.fetch_add(count, Ordering::SeqCst);
    }

    fn queued_for_download(&self, count: usize) {
        self.queued.fetch_add(count, Ordering::SeqCst);
    }
}

impl PushProgress for CountingProgress {
    fn uploaded(&self, uploaded: usize, remaining: usize) {
        self.upload_rounds.lock().unwrap().push((uploaded, remaining));
    }
}

#[derive(Default)]
struct FakeState {
    entities: BTreeMap<Hash32, Entity>,
    heads: BTreeMap<String, CausalHash>,
    update_path_script: VecDeque<UpdatePathResponse>,
    fast_forward_script: VecDeque<FastForwardPathResponse>,
    upload_script: VecDeque<UploadEntitiesResponse>,
    deny_reads: bool,
    fail_downloads: bool,
    download_calls: usize,
    max_download_batch: usize,
    upload_calls: usize,
    uploaded_batches: Vec<Vec<Hash32>>,
    update_path_calls: usize,
    fast_forward_requests: Vec<FastForwardPathRequest>,
}

impl FakeState {
    /// Hashes reachable from `head` through stored entities that the server
    /// does not hold.
    fn missing_closure(&self, head: Hash32) -> BTreeSet<Hash32> {
        let mut missing = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([head]);
        while let Some(hash) = queue.pop_front() {
            if !visited.insert(hash) {
                continue;
            }
            match self.entities.get(&hash) {
                None => {
                    missing.insert(hash);
                }
                Some(entity) => {
                    for dep in entity.dependencies() {
                        queue.push_back(dep.hash());
                    }
                }
            }
        }
        missing
    }
}

/// In-process Share server.
///
/// Behaves like the real thing for the happy paths -- heads move only when
/// their dependency closure is complete, uploads are met with
/// `NeedDependencies` until everything has arrived -- and individual
/// endpoints can be scripted to exercise failure paths.
#[derive(Default)]
pub(crate) struct FakeShare {
    state: Mutex<FakeState>,
}

impl FakeShare {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_entity(&self, hash: Hash32, entity: Entity) {
        self.state.lock().unwrap().entities.insert(hash, entity);
    }

    pub fn set_head(&self, path: &SharePath, head: CausalHash) {
        self.state
            .lock()
            .unwrap()
            .heads
            .insert(path.to_string(), head);
    }

    pub fn head(&self, path: &SharePath) -> Option<CausalHash> {
        self.state.lock().unwrap().heads.get(&path.to_string()).copied()
    }

    pub fn has_entity(&self, hash: Hash32) -> bool {
        self.state.lock().unwrap().entities.contains_key(&hash)
    }

    pub fn script_update_path(&self, response: UpdatePathResponse) {
        self.state.lock().unwrap().update_path_script.push_back(response);
    }

    pub fn script_fast_forward(&self, response: FastForwardPathResponse) {
        self.state
            .lock()
            .unwrap()
            .fast_forward_script
            .push_back(response);
    }

    pub fn script_upload(&self, response: UploadEntitiesResponse) {
        self.state.lock().unwrap().upload_script.push_back(response);
    }

    pub fn deny_reads(&self) {
        self.state.lock().unwrap().deny_reads = true;
    }

    pub fn fail_downloads(&self) {
        self.state.lock().unwrap().fail_downloads = true;
    }

    pub fn download_calls(&self) -> usize {
        self.state.lock().unwrap().download_calls
    }

    pub fn max_download_batch(&self) -> usize {
        self.state.lock().unwrap().max_download_batch
    }

    pub fn upload_calls(&self) -> usize {
        self.state.lock().unwrap().upload_calls
    }

    pub fn uploaded_batches(&self) -> Vec<Vec<Hash32>> {
        self.state.lock().unwrap().uploaded_batches.clone()
    }

    pub fn update_path_calls(&self) -> usize {
        self.state.lock().unwrap().update_path_calls
    }

    pub fn fast_forward_requests(&self) -> Vec<FastForwardPathRequest> {
        self.state.lock().unwrap().fast_forward_requests.clone()
    }
}

#[async_trait]
impl ShareTransport for FakeShare {
    async fn get_causal_hash_by_path(
        &self,
        request: GetCausalHashByPathRequest,
    ) -> TransportResult<GetCausalHashByPathResponse> {
        let state = self.state.lock().unwrap();
        if state.deny_reads {
            return Ok(GetCausalHashByPathResponse::NoReadPermission(request.path));
        }
        let head = state.heads.get(&request.path.to_string()).copied();
        Ok(GetCausalHashByPathResponse::Success(
            head.map(|head| HashJwt::unverified(head.hash())),
        ))
    }

    async fn update_path(
        &self,
        request: UpdatePathRequest,
    ) -> TransportResult<UpdatePathResponse> {
        let mut state = self.state.lock().unwrap();
        state.update_path_calls += 1;
        if let Some(scripted) = state.update_path_script.pop_front() {
            return Ok(scripted);
        }
        let current = state.heads.get(&request.path.to_string()).copied();
        if current.map(|h| h.hash()) != request.expected_hash {
            return Ok(UpdatePathResponse::HashMismatch(
                weft_transport::HashMismatch {
                    path: request.path,
                    expected: request.expected_hash,
                    actual: current.map(|h| h.hash()),
                },
            ));
        }
        let missing = state.missing_closure(request.new_hash.hash());
        if !missing.is_empty() {
            return Ok(UpdatePathResponse::MissingDependencies(missing));
        }
        state
            .heads
            .insert(request.path.to_string(), request.new_hash);
        Ok(UpdatePathResponse::Success)
    }

    async fn fast_forward_path(
        &self,
        request: FastForwardPathRequest,
    ) -> TransportResult<FastForwardPathResponse> {
        let mut state = self.state.lock().unwrap();
        state.fast_forward_requests.push(request.clone());
        if let Some(scripted) = state.fast_forward_script.pop_front() {
            return Ok(scripted);
        }
        let Some(current) = state.heads.get(&request.path.to_string()).copied() else {
            return Ok(FastForwardPathResponse::NoHistory);
        };
        if current != request.expected_hash {
            return Ok(FastForwardPathResponse::NotFastForward);
        }
        let Some(new_head) = request.hashes.last().copied() else {
            return Ok(FastForwardPathResponse::NotFastForward);
        };
        let missing = state.missing_closure(new_head.hash());
        if !missing.is_empty() {
            return Ok(FastForwardPathResponse::MissingDependencies(missing));
        }
        state.heads.insert(request.path.to_string(), new_head);
        Ok(FastForwardPathResponse::Success)
    }

    async fn download_entities(
        &self,
        request: DownloadEntitiesRequest,
    ) -> TransportResult<DownloadEntitiesResponse> {
        let mut state = self.state.lock().unwrap();
        if state.fail_downloads {
            return Err(TransportError::InternalServerError);
        }
        state.download_calls += 1;
        state.max_download_batch = state.max_download_batch.max(request.hashes.len());
        let mut entities = BTreeMap::new();
        for token in &request.hashes {
            let entity = state
                .entities
                .get(&token.hash())
                .cloned()
                .expect("fake server asked for an entity it does not hold");
            entities.insert(token.hash(), entity);
        }
        Ok(DownloadEntitiesResponse { entities })
    }

    async fn upload_entities(
        &self,
        request: UploadEntitiesRequest,
    ) -> TransportResult<UploadEntitiesResponse> {
        let mut state = self.state.lock().unwrap();
        state.upload_calls += 1;
        state
            .uploaded_batches
            .push(request.entities.keys().copied().collect());
        if let Some(scripted) = state.upload_script.pop_front() {
            return Ok(scripted);
        }
        for (hash, entity) in request.entities.iter() {
            state.entities.insert(*hash, entity.clone());
        }
        let mut missing = BTreeSet::new();
        for entity in request.entities.values() {
            for dep in entity.dependencies() {
                if !state.entities.contains_key(&dep.hash()) {
                    missing.insert(dep.hash());
                }
            }
        }
        if missing.is_empty() {
            Ok(UploadEntitiesResponse::Success)
        } else {
            Ok(UploadEntitiesResponse::NeedDependencies(missing))
        }
    }
}
