//! Multi-source search across discovery services, registries, and repositories.
//!
//! Every configured source of the relevant kind gets exactly one lookup. All
//! lookups run concurrently on the calling task and are awaited together, so
//! total latency is that of the slowest source. A failing source never
//! affects the others: its error goes to the report's failure log and the
//! remaining matches are still returned.

use aas_bridge_client::AasClient;
use aas_bridge_core::{
    ApiError, ApiResult, AssetAdministrationShell, AssetAdministrationShellDescriptor, ErrorKind,
    InfrastructureDescriptor, InfrastructureRegistry, ServiceKind, SpecificAssetId, Success,
    AAS_INTERFACE,
};
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// One location of an AAS, as found by one source.
///
/// The same AAS may appear once per source that knows it; no deduplication
/// happens here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Name of the infrastructure that produced the match
    pub source_infrastructure: String,
    /// AAS identifier
    pub aas_id: String,
    /// Asset identifier, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    /// URL of a repository serving the AAS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    /// URL of the registry holding the descriptor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,
    /// URL of the discovery service that linked the asset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery_url: Option<String>,
}

/// A shell id found by a discovery service for an asset id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySearchResult {
    /// Name of the discovery infrastructure
    pub source_infrastructure: String,
    /// Base URL of the discovery service
    pub discovery_url: String,
    /// The asset id that was looked up
    pub asset_id: String,
    /// A linked AAS identifier
    pub aas_id: String,
}

/// A shell descriptor found in a registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySearchResult {
    /// Name of the registry infrastructure
    pub source_infrastructure: String,
    /// Base URL of the registry
    pub registry_url: String,
    /// The descriptor
    pub descriptor: AssetAdministrationShellDescriptor,
    /// Href of the descriptor's AAS endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// A shell found in a repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySearchResult {
    /// Name of the repository infrastructure
    pub source_infrastructure: String,
    /// Base URL of the repository
    pub repository_url: String,
    /// The shell
    pub aas: AssetAdministrationShell,
}

/// A source whose lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    /// Name of the failing infrastructure
    pub source_infrastructure: String,
    /// Service kind that was queried
    pub kind: ServiceKind,
    /// What went wrong
    pub error: ApiError,
}

/// Matches from all sources plus the log of failed sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReport<T> {
    /// Number of lookups issued
    pub sources: usize,
    /// Matches, grouped by source in each source's native order
    pub results: Vec<T>,
    /// One entry per failed lookup
    pub failures: Vec<SourceFailure>,
}

impl<T> Default for SearchReport<T> {
    fn default() -> Self {
        Self {
            sources: 0,
            results: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> SearchReport<T> {
    fn map<U>(self, f: impl FnMut(T) -> U) -> SearchReport<U> {
        SearchReport {
            sources: self.sources,
            results: self.results.into_iter().map(f).collect(),
            failures: self.failures,
        }
    }

    fn merge(&mut self, other: Self) {
        self.sources += other.sources;
        self.results.extend(other.results);
        self.failures.extend(other.failures);
    }

    /// Number of lookups that succeeded, with or without matches.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.sources - self.failures.len()
    }

    /// Collapse the report into the match list.
    ///
    /// # Errors
    ///
    /// Fails only if at least one lookup was issued and every one failed:
    /// `NotFound` when all failures were `NotFound`, `UnknownError` otherwise.
    pub fn into_result(self) -> ApiResult<Vec<T>> {
        if self.sources > 0 && self.succeeded() == 0 {
            return Err(aggregate_failure(&self.failures));
        }
        Ok(Success {
            value: self.results,
            status: 200,
        })
    }
}

fn aggregate_failure(failures: &[SourceFailure]) -> ApiError {
    let kind = if failures
        .iter()
        .all(|f| f.error.kind == ErrorKind::NotFound)
    {
        ErrorKind::NotFound
    } else {
        ErrorKind::UnknownError
    };
    let detail = failures
        .iter()
        .map(|f| format!("{} ({}): {}", f.source_infrastructure, f.kind, f.error))
        .collect::<Vec<_>>()
        .join("; ");
    ApiError::new(kind, format!("all {} sources failed: {detail}", failures.len()))
}

/// Issue one lookup per source concurrently and gather the outcomes.
async fn fan_out<T, F, Fut>(sources: Vec<InfrastructureDescriptor>, lookup: F) -> SearchReport<T>
where
    F: FnMut(InfrastructureDescriptor) -> Fut,
    Fut: Future<Output = (InfrastructureDescriptor, Result<Vec<T>, ApiError>)>,
{
    let mut report = SearchReport {
        sources: sources.len(),
        ..SearchReport::default()
    };

    for (infra, outcome) in join_all(sources.into_iter().map(lookup)).await {
        match outcome {
            Ok(matches) => {
                tracing::debug!(
                    infrastructure = %infra.name,
                    kind = %infra.kind,
                    matches = matches.len(),
                    "Source answered"
                );
                report.results.extend(matches);
            }
            Err(error) => {
                tracing::warn!(
                    infrastructure = %infra.name,
                    kind = %infra.kind,
                    error = %error,
                    "Source lookup failed"
                );
                report.failures.push(SourceFailure {
                    source_infrastructure: infra.name,
                    kind: infra.kind,
                    error,
                });
            }
        }
    }

    report
}

/// Searches all configured sources for an asset or AAS.
#[derive(Debug, Clone)]
pub struct MultiSourceSearcher {
    client: AasClient,
    registry: Arc<InfrastructureRegistry>,
}

impl MultiSourceSearcher {
    /// Create a searcher over the given infrastructures.
    #[must_use]
    pub fn new(client: AasClient, registry: Arc<InfrastructureRegistry>) -> Self {
        Self { client, registry }
    }

    /// Ask every discovery service which shells are linked to `asset_id`.
    ///
    /// # Errors
    ///
    /// Fails only if every discovery service failed.
    pub async fn search_aas_in_all_discoveries(
        &self,
        asset_id: &str,
    ) -> ApiResult<Vec<DiscoverySearchResult>> {
        self.discoveries(asset_id).await.into_result()
    }

    /// Ask every AAS registry for the descriptor of `aas_id`.
    ///
    /// # Errors
    ///
    /// Fails only if every registry failed (including `NotFound`).
    pub async fn search_in_all_aas_registries(
        &self,
        aas_id: &str,
    ) -> ApiResult<Vec<RegistrySearchResult>> {
        self.registries(aas_id).await.into_result()
    }

    /// Ask every AAS repository for the shell `aas_id`.
    ///
    /// # Errors
    ///
    /// Fails only if every repository failed (including `NotFound`).
    pub async fn search_in_all_aas_repositories(
        &self,
        aas_id: &str,
    ) -> ApiResult<Vec<RepositorySearchResult>> {
        self.repositories(aas_id).await.into_result()
    }

    /// Search discovery services (treating `key` as an asset id) and
    /// registries and repositories (treating it as an AAS id) all at once.
    ///
    /// # Errors
    ///
    /// Fails only if every source failed.
    pub async fn search_everywhere(&self, key: &str) -> ApiResult<Vec<SearchResult>> {
        self.search_everywhere_detailed(key).await.into_result()
    }

    /// Like [`MultiSourceSearcher::search_everywhere`], keeping the failure log.
    pub async fn search_everywhere_detailed(&self, key: &str) -> SearchReport<SearchResult> {
        let (discoveries, registries, repositories) = futures::join!(
            self.discoveries(key),
            self.registries(key),
            self.repositories(key)
        );

        let mut report = discoveries.map(|hit| SearchResult {
            source_infrastructure: hit.source_infrastructure,
            aas_id: hit.aas_id,
            asset_id: Some(hit.asset_id),
            repository_url: None,
            registry_url: None,
            discovery_url: Some(hit.discovery_url),
        });
        report.merge(registries.map(|hit| SearchResult {
            source_infrastructure: hit.source_infrastructure,
            aas_id: hit.descriptor.id,
            asset_id: hit.descriptor.global_asset_id,
            repository_url: hit.endpoint,
            registry_url: Some(hit.registry_url),
            discovery_url: None,
        }));
        report.merge(repositories.map(|hit| SearchResult {
            source_infrastructure: hit.source_infrastructure,
            aas_id: hit.aas.id,
            asset_id: hit.aas.asset_information.global_asset_id,
            repository_url: Some(hit.repository_url),
            registry_url: None,
            discovery_url: None,
        }));

        tracing::info!(
            key,
            sources = report.sources,
            matches = report.results.len(),
            failures = report.failures.len(),
            "Multi-source search finished"
        );
        report
    }

    async fn discoveries(&self, asset_id: &str) -> SearchReport<DiscoverySearchResult> {
        let client = &self.client;
        let asset = SpecificAssetId::global(asset_id);
        let asset = &asset;
        fan_out(self.registry.list(ServiceKind::Discovery), |infra| async move {
            let outcome = client.lookup_shells(&infra, asset).await.map(|s| {
                s.value
                    .into_iter()
                    .map(|aas_id| DiscoverySearchResult {
                        source_infrastructure: infra.name.clone(),
                        discovery_url: infra.base_url.clone(),
                        asset_id: asset.value.clone(),
                        aas_id,
                    })
                    .collect()
            });
            (infra, outcome)
        })
        .await
    }

    async fn registries(&self, aas_id: &str) -> SearchReport<RegistrySearchResult> {
        let client = &self.client;
        fan_out(self.registry.list(ServiceKind::AasRegistry), |infra| async move {
            let outcome = client
                .get_shell_descriptor(&infra, aas_id)
                .await
                .map(|s| {
                    let descriptor = s.value;
                    vec![RegistrySearchResult {
                        source_infrastructure: infra.name.clone(),
                        registry_url: infra.base_url.clone(),
                        endpoint: descriptor.endpoint_href(AAS_INTERFACE).map(str::to_string),
                        descriptor,
                    }]
                });
            (infra, outcome)
        })
        .await
    }

    async fn repositories(&self, aas_id: &str) -> SearchReport<RepositorySearchResult> {
        let client = &self.client;
        fan_out(self.registry.list(ServiceKind::AasRepository), |infra| async move {
            let outcome = client.get_shell(&infra, aas_id).await.map(|s| {
                vec![RepositorySearchResult {
                    source_infrastructure: infra.name.clone(),
                    repository_url: infra.base_url.clone(),
                    aas: s.value,
                }]
            });
            (infra, outcome)
        })
        .await
    }
}
