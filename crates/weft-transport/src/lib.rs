//! Typed transport to a remote Share instance.
//!
//! The sync engine talks to five endpoints under `/sync`, each a POST with a
//! JSON body. This crate defines the request/response shapes as tagged
//! unions, the [`ShareTransport`] boundary the engine consumes, and an HTTP
//! binding ([`HttpShareClient`]) that is generic over the actual HTTP client
//! so callers can plug in whichever stack they embed.
//!
//! Transport-level failures are classified into [`TransportError`]; any of
//! them is fatal for the current sync call.

pub mod client;
pub mod error;
pub mod http;
pub mod types;

pub use client::ShareTransport;
pub use error::{TransportError, TransportResult};
pub use http::{endpoints, HttpClient, HttpResponse, HttpShareClient};
pub use types::{
    DownloadEntitiesRequest, DownloadEntitiesResponse, FastForwardPathRequest,
    FastForwardPathResponse, GetCausalHashByPathRequest, GetCausalHashByPathResponse,
    HashMismatch, UpdatePathRequest, UpdatePathResponse, UploadEntitiesRequest,
    UploadEntitiesResponse, MAX_ENTITY_BATCH,
};
