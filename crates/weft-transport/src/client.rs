use async_trait::async_trait;

use crate::error::TransportResult;
use crate::types::{
    DownloadEntitiesRequest, DownloadEntitiesResponse, FastForwardPathRequest,
    FastForwardPathResponse, GetCausalHashByPathRequest, GetCausalHashByPathResponse,
    UpdatePathRequest, UpdatePathResponse, UploadEntitiesRequest, UploadEntitiesResponse,
};

/// The five Share endpoints the sync engine consumes.
///
/// Semantic outcomes (permission denials, mismatches, dependency demands)
/// arrive inside the typed responses; only transport-level failures surface
/// as errors.
#[async_trait]
pub trait ShareTransport: Send + Sync {
    async fn get_causal_hash_by_path(
        &self,
        request: GetCausalHashByPathRequest,
    ) -> TransportResult<GetCausalHashByPathResponse>;

    async fn update_path(&self, request: UpdatePathRequest)
        -> TransportResult<UpdatePathResponse>;

    async fn fast_forward_path(
        &self,
        request: FastForwardPathRequest,
    ) -> TransportResult<FastForwardPathResponse>;

    async fn download_entities(
        &self,
        request: DownloadEntitiesRequest,
    ) -> TransportResult<DownloadEntitiesResponse>;

    async fn upload_entities(
        &self,
        request: UploadEntitiesRequest,
    ) -> TransportResult<UploadEntitiesResponse>;
}
