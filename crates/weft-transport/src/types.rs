use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use weft_types::{CausalHash, Entity, Hash32, HashJwt, SharePath};

/// Maximum number of entities per upload or download request.
///
/// Clients may batch smaller, never larger, without server coordination.
pub const MAX_ENTITY_BATCH: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCausalHashByPathRequest {
    pub path: SharePath,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GetCausalHashByPathResponse {
    /// The head at the path, or `None` if the path has no history.
    Success(Option<HashJwt>),
    NoReadPermission(SharePath),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePathRequest {
    pub path: SharePath,
    /// The head the caller believes the path is at; `None` to create.
    pub expected_hash: Option<Hash32>,
    pub new_hash: CausalHash,
}

/// The remote head found when a check-and-set failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashMismatch {
    pub path: SharePath,
    pub expected: Option<Hash32>,
    pub actual: Option<Hash32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdatePathResponse {
    Success,
    HashMismatch(HashMismatch),
    /// The server will not take the new head until these are uploaded.
    MissingDependencies(BTreeSet<Hash32>),
    NoWritePermission(SharePath),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastForwardPathRequest {
    pub path: SharePath,
    pub expected_hash: CausalHash,
    /// The chain to advance along, oldest first, ending at the new head.
    pub hashes: Vec<CausalHash>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FastForwardPathResponse {
    Success,
    MissingDependencies(BTreeSet<Hash32>),
    NoHistory,
    NotFastForward,
    InvalidParentage { parent: Hash32, child: Hash32 },
    NoWritePermission(SharePath),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEntitiesRequest {
    pub repo_name: String,
    pub hashes: BTreeSet<HashJwt>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEntitiesResponse {
    pub entities: BTreeMap<Hash32, Entity>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEntitiesRequest {
    pub repo_name: String,
    pub entities: BTreeMap<Hash32, Entity>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadEntitiesResponse {
    Success,
    /// The server wants these uploaded before it will keep the batch.
    NeedDependencies(BTreeSet<Hash32>),
    HashMismatchForEntity { supplied: Hash32, computed: Hash32 },
    NoWritePermission(String),
}
