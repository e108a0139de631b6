//! # AAS Client
//!
//! AAS Part 2 encoding utilities, the HTTP client used for every call to an
//! AAS repository, registry, discovery, or serialization service, and the
//! bearer-token cache.
//!
//! ## Encoding Rules (per AAS Part 2 HTTP/REST API)
//!
//! - **Identifiable IDs**: base64url-encoded WITHOUT padding
//! - **idShortPath**: URL-encoded (preserving `[]` for list indices)
//! - **Discovery asset ids**: base64url-encoded JSON `{"name", "value"}`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod client;
pub mod encoding;

pub use auth::{AccessToken, ClientCredentialsFetcher, TokenCache, TokenFetcher};
pub use client::{
    AasClient, AasClientConfig, ClientError, FilePayload, SerializationQuery, ServiceDescription,
};
pub use encoding::{
    decode_id_base64url, decode_idshort_path, encode_asset_id_query, encode_id_base64url,
    encode_idshort_path, EncodingError,
};
