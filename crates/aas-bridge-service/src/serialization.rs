//! Serialization gateway: export shells and submodels as XML, JSON, or AASX
//! through an infrastructure's serialization service.

use aas_bridge_client::{AasClient, SerializationQuery};
use aas_bridge_core::{
    ApiError, ApiResult, ErrorKind, InfrastructureDescriptor, InfrastructureRegistry, ServiceKind,
};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Profile fragment advertised by services implementing serialization.
const SERIALIZATION_PROFILE: &str = "SerializationServiceSpecification";

/// Output format of a serialization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// AAS XML
    Xml,
    /// AAS JSON
    Json,
    /// AASX package
    Aasx,
}

impl SerializationFormat {
    /// Value of the `Accept` header requesting this format.
    #[must_use]
    pub fn accept(self) -> &'static str {
        match self {
            Self::Xml => "application/xml",
            Self::Json => "application/json",
            Self::Aasx => "application/asset-administration-shell-package+xml",
        }
    }

    /// File extension, without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Json => "json",
            Self::Aasx => "aasx",
        }
    }
}

impl fmt::Display for SerializationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Unknown format name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown serialization format '{0}' (expected xml, json, or aasx)")]
pub struct ParseFormatError(String);

impl FromStr for SerializationFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(Self::Xml),
            "json" => Ok(Self::Json),
            "aasx" => Ok(Self::Aasx),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

/// Whether a service supports an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Capability {
    /// The operation is available
    Implemented,
    /// The service does not offer the operation
    Unsupported,
}

/// A serialized export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationResult {
    /// Content type reported by the service, or the requested one
    pub content_type: String,
    /// Suggested file name
    pub file_name: String,
    /// Serialized content
    pub bytes: Vec<u8>,
}

/// Exports shells through the serialization service of an infrastructure.
#[derive(Debug, Clone)]
pub struct SerializationGateway {
    client: AasClient,
    registry: Arc<InfrastructureRegistry>,
}

impl SerializationGateway {
    /// Create a gateway over the given infrastructures.
    #[must_use]
    pub fn new(client: AasClient, registry: Arc<InfrastructureRegistry>) -> Self {
        Self { client, registry }
    }

    /// Ask a service whether it implements serialization.
    ///
    /// A service without a usable self-description is treated as unsupported.
    pub async fn probe(&self, infra: &InfrastructureDescriptor) -> Capability {
        match self.client.get_description(infra).await {
            Ok(description)
                if description
                    .value
                    .profiles
                    .iter()
                    .any(|p| p.contains(SERIALIZATION_PROFILE)) =>
            {
                Capability::Implemented
            }
            Ok(_) => Capability::Unsupported,
            Err(e) => {
                tracing::debug!(
                    infrastructure = %infra.name,
                    error = %e,
                    "Serialization probe failed"
                );
                Capability::Unsupported
            }
        }
    }

    /// Export shells and submodels from infrastructure `infrastructure`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the infrastructure has no serialization endpoint
    /// or the endpoint does not implement serialization; otherwise the
    /// service's own failure.
    pub async fn serialize_aas_from_infrastructure(
        &self,
        aas_ids: &[String],
        submodel_ids: &[String],
        infrastructure: &str,
        include_concept_descriptions: bool,
        format: SerializationFormat,
    ) -> ApiResult<SerializationResult> {
        let infra = self
            .registry
            .resolve(infrastructure, ServiceKind::Serialization)?;

        if self.probe(&infra).await == Capability::Unsupported {
            tracing::warn!(infrastructure, "Serialization not supported");
            return Err(ApiError::new(
                ErrorKind::NotFound,
                format!("infrastructure '{infrastructure}' does not implement serialization"),
            ));
        }

        let query = SerializationQuery {
            aas_ids,
            submodel_ids,
            include_concept_descriptions,
            accept: format.accept(),
        };
        let response = self.client.serialize(&infra, &query).await?;

        let file_name = format!(
            "{}.{}",
            aas_ids
                .first()
                .map_or_else(|| "environment".to_string(), |id| file_stem(id)),
            format.extension()
        );
        tracing::info!(
            infrastructure,
            %format,
            bytes = response.value.body.len(),
            "Serialized shells"
        );

        Ok(response.map(|raw| SerializationResult {
            content_type: raw
                .content_type
                .unwrap_or_else(|| format.accept().to_string()),
            file_name,
            bytes: raw.body,
        }))
    }
}

/// Last identifier segment, reduced to characters safe in file names.
fn file_stem(id: &str) -> String {
    let segment = id
        .rsplit([':', '/', '#'])
        .find(|s| !s.is_empty())
        .unwrap_or(id);
    let stem: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "environment".to_string()
    } else {
        stem
    }
}
