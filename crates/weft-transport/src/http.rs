//! HTTP binding for the Share endpoints.
//!
//! [`HttpShareClient`] is generic over an [`HttpClient`] so the surrounding
//! application chooses the HTTP stack; this module only owns the JSON
//! encoding and the status-code classification.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::ShareTransport;
use crate::error::{TransportError, TransportResult};
use crate::types::{
    DownloadEntitiesRequest, DownloadEntitiesResponse, FastForwardPathRequest,
    FastForwardPathResponse, GetCausalHashByPathRequest, GetCausalHashByPathResponse,
    UpdatePathRequest, UpdatePathResponse, UploadEntitiesRequest, UploadEntitiesResponse,
};

/// Endpoint paths under the sync prefix.
pub mod endpoints {
    pub const GET_CAUSAL_HASH_BY_PATH: &str = "/sync/path/get";
    pub const UPDATE_PATH: &str = "/sync/path/update";
    pub const FAST_FORWARD_PATH: &str = "/sync/path/fast-forward";
    pub const DOWNLOAD_ENTITIES: &str = "/sync/entities/download";
    pub const UPLOAD_ENTITIES: &str = "/sync/entities/upload";
}

/// A raw HTTP response: status code plus body bytes.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// Implementations must not impose a response timeout: entity batches can
/// legitimately take a long time, and only connection-level failures should
/// surface (as the `Err` case, classified into
/// [`TransportError::UnreachableService`]).
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;
}

/// [`ShareTransport`] over JSON POST requests.
pub struct HttpShareClient<C> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> HttpShareClient<C> {
    /// Create a client against a base URL (e.g. `https://share.example.com`).
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<Req, Res>(&self, endpoint: &str, request: &Req) -> TransportResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)
            .map_err(|e| TransportError::InvalidResponse(format!("request encoding: {e}")))?;
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url, body)
            .await
            .map_err(TransportError::UnreachableService)?;
        classify(response)
    }
}

/// Map a raw HTTP response to a decoded body or a classified error.
fn classify<Res: DeserializeOwned>(response: HttpResponse) -> TransportResult<Res> {
    match response.status {
        200 => serde_json::from_slice(&response.body)
            .map_err(|e| TransportError::InvalidResponse(format!("response decoding: {e}"))),
        401 => Err(TransportError::Unauthenticated),
        403 => Err(TransportError::PermissionDenied(
            String::from_utf8_lossy(&response.body).into_owned(),
        )),
        408 | 504 => Err(TransportError::Timeout),
        429 => Err(TransportError::RateLimitExceeded),
        status if (500..600).contains(&status) => Err(TransportError::InternalServerError),
        status => Err(TransportError::InvalidResponse(format!(
            "unexpected status {status}: {}",
            String::from_utf8_lossy(&response.body)
        ))),
    }
}

#[async_trait]
impl<C: HttpClient> ShareTransport for HttpShareClient<C> {
    async fn get_causal_hash_by_path(
        &self,
        request: GetCausalHashByPathRequest,
    ) -> TransportResult<GetCausalHashByPathResponse> {
        self.post_json(endpoints::GET_CAUSAL_HASH_BY_PATH, &request)
            .await
    }

    async fn update_path(
        &self,
        request: UpdatePathRequest,
    ) -> TransportResult<UpdatePathResponse> {
        self.post_json(endpoints::UPDATE_PATH, &request).await
    }

    async fn fast_forward_path(
        &self,
        request: FastForwardPathRequest,
    ) -> TransportResult<FastForwardPathResponse> {
        self.post_json(endpoints::FAST_FORWARD_PATH, &request).await
    }

    async fn download_entities(
        &self,
        request: DownloadEntitiesRequest,
    ) -> TransportResult<DownloadEntitiesResponse> {
        self.post_json(endpoints::DOWNLOAD_ENTITIES, &request).await
    }

    async fn upload_entities(
        &self,
        request: UploadEntitiesRequest,
    ) -> TransportResult<UploadEntitiesResponse> {
        self.post_json(endpoints::UPLOAD_ENTITIES, &request).await
    }
}
