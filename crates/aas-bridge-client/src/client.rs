//! HTTP client for the AAS Part 2 service APIs.
//!
//! One [`AasClient`] talks to every infrastructure; each call takes the
//! resolved [`InfrastructureDescriptor`] so the descriptor's security mode is
//! applied per request. All operations return [`ApiResult`]: transport and
//! decoding failures are converted at this boundary and never escape as
//! panics or foreign error types.

use crate::auth::TokenCache;
use crate::encoding::{encode_asset_id_query, encode_id_base64url, encode_idshort_path};
use aas_bridge_core::{
    wrap_bytes, wrap_response, ApiError, ApiResult, AssetAdministrationShell,
    AssetAdministrationShellDescriptor, ErrorKind, InfrastructureDescriptor, RawResponse,
    SpecificAssetId, Submodel, SubmodelDescriptor, TransportError,
};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// AAS HTTP client configuration.
#[derive(Debug, Clone)]
pub struct AasClientConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Token cache for services that expect a bearer token
    pub token: Option<Arc<TokenCache>>,
}

impl Default for AasClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            token: None,
        }
    }
}

/// A file sent to or received from a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    /// File name announced to the server
    pub file_name: String,
    /// MIME type
    pub content_type: String,
    /// File content
    pub bytes: Vec<u8>,
}

/// Self-description of an AAS service (`GET /description`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceDescription {
    /// Implemented service profiles
    #[serde(default)]
    pub profiles: Vec<String>,
}

/// Parameters of a serialization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationQuery<'a> {
    /// Shells to include
    pub aas_ids: &'a [String],
    /// Submodels to include
    pub submodel_ids: &'a [String],
    /// Whether to include concept descriptions
    pub include_concept_descriptions: bool,
    /// `Accept` header selecting the output format
    pub accept: &'a str,
}

/// List responses come either paged (`{"result": [...]}`) or bare.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Paged { result: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Paged { result } | Self::Bare(result) => result,
        }
    }
}

/// HTTP client for AAS Part 2 API operations.
#[derive(Debug, Clone)]
pub struct AasClient {
    client: Client,
    config: AasClientConfig,
}

impl AasClient {
    /// Create a new AAS client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: AasClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .use_rustls_tls()
            .user_agent(concat!("aas-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Init(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// The underlying HTTP client, for collaborators such as token fetchers.
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Build a request with security settings applied.
    ///
    /// The bearer token is only fetched and attached for infrastructures that
    /// opt in with `bearer_token`; other services never see it.
    async fn prepare(
        &self,
        infra: &InfrastructureDescriptor,
        method: Method,
        path: &str,
    ) -> Result<RequestBuilder, ApiError> {
        let target = infra.request_target(path);
        let mut request = self.client.request(method, &target.url);

        let mut has_authorization = false;
        for (name, value) in &target.headers {
            has_authorization |= name.eq_ignore_ascii_case(AUTHORIZATION.as_str());
            request = request.header(name.as_str(), value.as_str());
        }

        if infra.bearer_token && !has_authorization {
            let Some(token) = &self.config.token else {
                return Err(ApiError::new(
                    ErrorKind::Unauthorized,
                    format!("No token source configured for infrastructure {}", infra.name),
                ));
            };
            request = request.bearer_auth(token.bearer().await?);
        }

        Ok(request)
    }

    /// Send a request and read the full response.
    async fn execute(request: RequestBuilder) -> Result<RawResponse, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(RawResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }

    async fn send(
        &self,
        infra: &InfrastructureDescriptor,
        method: Method,
        path: &str,
        configure: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Result<RawResponse, TransportError>, ApiError> {
        tracing::debug!(
            infrastructure = %infra.name,
            kind = %infra.kind,
            %method,
            path,
            "AAS request"
        );
        let request = configure(self.prepare(infra, method, path).await?);
        let raw = Self::execute(request).await;
        match &raw {
            Ok(response) => tracing::debug!(
                infrastructure = %infra.name,
                path,
                status = response.status,
                "AAS response"
            ),
            Err(e) => tracing::debug!(
                infrastructure = %infra.name,
                path,
                error = %e,
                "AAS request failed"
            ),
        }
        Ok(raw)
    }

    async fn json<T: DeserializeOwned>(
        &self,
        infra: &InfrastructureDescriptor,
        method: Method,
        path: &str,
        configure: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> ApiResult<T> {
        wrap_response(self.send(infra, method, path, configure).await?)
    }

    async fn write<B: Serialize + ?Sized>(
        &self,
        infra: &InfrastructureDescriptor,
        method: Method,
        path: &str,
        body: &B,
    ) -> ApiResult<()> {
        let result: ApiResult<IgnoredAny> = self.json(infra, method, path, |r| r.json(body)).await;
        result.map(|s| s.map(|_| ()))
    }

    async fn bytes(
        &self,
        infra: &InfrastructureDescriptor,
        method: Method,
        path: &str,
        configure: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> ApiResult<RawResponse> {
        wrap_bytes(self.send(infra, method, path, configure).await?)
    }

    async fn upload(
        &self,
        infra: &InfrastructureDescriptor,
        path: &str,
        file: &FilePayload,
    ) -> ApiResult<()> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| {
                ApiError::new(
                    ErrorKind::ValidationError,
                    format!("invalid content type '{}': {e}", file.content_type),
                )
            })?;
        let form = Form::new()
            .text("fileName", file.file_name.clone())
            .part("file", part);

        let result: ApiResult<IgnoredAny> = self
            .json(infra, Method::PUT, path, |r| r.multipart(form))
            .await;
        result.map(|s| s.map(|_| ()))
    }

    // ---- Discovery ----------------------------------------------------------

    /// Find the shells linked to an asset id.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn lookup_shells(
        &self,
        infra: &InfrastructureDescriptor,
        asset_id: &SpecificAssetId,
    ) -> ApiResult<Vec<String>> {
        let query = encode_asset_id_query(asset_id);
        let listing: ApiResult<Listing<String>> = self
            .json(infra, Method::GET, "/lookup/shells", |r| {
                r.query(&[("assetIds", query)])
            })
            .await;
        listing.map(|s| s.map(Listing::into_vec))
    }

    /// Link asset ids to a shell.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn link_asset_ids(
        &self,
        infra: &InfrastructureDescriptor,
        aas_id: &str,
        asset_ids: &[SpecificAssetId],
    ) -> ApiResult<()> {
        let path = format!("/lookup/shells/{}", encode_id_base64url(aas_id));
        self.write(infra, Method::POST, &path, asset_ids).await
    }

    // ---- Registries ---------------------------------------------------------

    /// Get a shell descriptor.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn get_shell_descriptor(
        &self,
        infra: &InfrastructureDescriptor,
        aas_id: &str,
    ) -> ApiResult<AssetAdministrationShellDescriptor> {
        let path = format!("/shell-descriptors/{}", encode_id_base64url(aas_id));
        self.json(infra, Method::GET, &path, |r| r).await
    }

    /// Register a shell descriptor.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn post_shell_descriptor(
        &self,
        infra: &InfrastructureDescriptor,
        descriptor: &AssetAdministrationShellDescriptor,
    ) -> ApiResult<()> {
        self.write(infra, Method::POST, "/shell-descriptors", descriptor)
            .await
    }

    /// Register a submodel descriptor.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn post_submodel_descriptor(
        &self,
        infra: &InfrastructureDescriptor,
        descriptor: &SubmodelDescriptor,
    ) -> ApiResult<()> {
        self.write(infra, Method::POST, "/submodel-descriptors", descriptor)
            .await
    }

    // ---- AAS repository -----------------------------------------------------

    /// Get a shell.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn get_shell(
        &self,
        infra: &InfrastructureDescriptor,
        aas_id: &str,
    ) -> ApiResult<AssetAdministrationShell> {
        let path = format!("/shells/{}", encode_id_base64url(aas_id));
        self.json(infra, Method::GET, &path, |r| r).await
    }

    /// Create a shell.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors (409 if the id already exists).
    pub async fn post_shell(
        &self,
        infra: &InfrastructureDescriptor,
        shell: &AssetAdministrationShell,
    ) -> ApiResult<()> {
        self.write(infra, Method::POST, "/shells", shell).await
    }

    /// Download a shell's thumbnail.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn get_thumbnail(
        &self,
        infra: &InfrastructureDescriptor,
        aas_id: &str,
    ) -> ApiResult<RawResponse> {
        let path = format!(
            "/shells/{}/asset-information/thumbnail",
            encode_id_base64url(aas_id)
        );
        self.bytes(infra, Method::GET, &path, |r| r).await
    }

    /// Upload a shell's thumbnail.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn put_thumbnail(
        &self,
        infra: &InfrastructureDescriptor,
        aas_id: &str,
        file: &FilePayload,
    ) -> ApiResult<()> {
        let path = format!(
            "/shells/{}/asset-information/thumbnail",
            encode_id_base64url(aas_id)
        );
        self.upload(infra, &path, file).await
    }

    // ---- Submodel repository ------------------------------------------------

    /// Get a submodel.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn get_submodel(
        &self,
        infra: &InfrastructureDescriptor,
        submodel_id: &str,
    ) -> ApiResult<Submodel> {
        let path = format!("/submodels/{}", encode_id_base64url(submodel_id));
        self.json(infra, Method::GET, &path, |r| r).await
    }

    /// Create a submodel.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors (409 if the id already exists).
    pub async fn post_submodel(
        &self,
        infra: &InfrastructureDescriptor,
        submodel: &Submodel,
    ) -> ApiResult<()> {
        self.write(infra, Method::POST, "/submodels", submodel).await
    }

    /// Download the file behind a `File` element.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn get_attachment(
        &self,
        infra: &InfrastructureDescriptor,
        submodel_id: &str,
        id_short_path: &str,
    ) -> ApiResult<RawResponse> {
        let path = attachment_path(submodel_id, id_short_path);
        self.bytes(infra, Method::GET, &path, |r| r).await
    }

    /// Upload the file behind a `File` element.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn put_attachment(
        &self,
        infra: &InfrastructureDescriptor,
        submodel_id: &str,
        id_short_path: &str,
        file: &FilePayload,
    ) -> ApiResult<()> {
        let path = attachment_path(submodel_id, id_short_path);
        self.upload(infra, &path, file).await
    }

    // ---- Serialization ------------------------------------------------------

    /// Get the service self-description.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn get_description(
        &self,
        infra: &InfrastructureDescriptor,
    ) -> ApiResult<ServiceDescription> {
        self.json(infra, Method::GET, "/description", |r| r).await
    }

    /// Request a serialized package of shells and submodels.
    ///
    /// # Errors
    ///
    /// Returns error on network or API errors.
    pub async fn serialize(
        &self,
        infra: &InfrastructureDescriptor,
        query: &SerializationQuery<'_>,
    ) -> ApiResult<RawResponse> {
        let mut params: Vec<(&str, String)> = Vec::new();
        params.extend(query.aas_ids.iter().map(|id| ("aasIds", encode_id_base64url(id))));
        params.extend(
            query
                .submodel_ids
                .iter()
                .map(|id| ("submodelIds", encode_id_base64url(id))),
        );
        params.push((
            "includeConceptDescriptions",
            query.include_concept_descriptions.to_string(),
        ));

        let accept = query.accept.to_string();
        self.bytes(infra, Method::GET, "/serialization", |r| {
            r.query(&params).header(reqwest::header::ACCEPT, accept)
        })
        .await
    }
}

fn attachment_path(submodel_id: &str, id_short_path: &str) -> String {
    format!(
        "/submodels/{}/submodel-elements/{}/attachment",
        encode_id_base64url(submodel_id),
        encode_idshort_path(id_short_path)
    )
}

/// Errors that can occur when creating the AAS client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// Client initialization failed
    #[error("client init error: {0}")]
    Init(String),
}
