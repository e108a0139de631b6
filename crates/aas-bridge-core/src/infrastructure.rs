//! Infrastructure registry.
//!
//! An *infrastructure* is a named set of AAS services (repositories,
//! registries, discovery, serialization) that share one security setting.
//! The registry is loaded from configuration and is read-only afterwards; it
//! resolves `(name, kind)` pairs to concrete [`InfrastructureDescriptor`]s and
//! applies the configured security mode to outgoing requests.

use crate::result::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use url::Url;

/// Header carrying the original base URL when a request is routed via a proxy.
pub const FORWARDED_BASE_HEADER: &str = "X-Forwarded-Base";

/// Kind of AAS service exposed by an infrastructure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceKind {
    /// AAS repository (`/shells`)
    AasRepository,
    /// AAS registry (`/shell-descriptors`)
    AasRegistry,
    /// Submodel repository (`/submodels`)
    SubmodelRepository,
    /// Submodel registry (`/submodel-descriptors`)
    SubmodelRegistry,
    /// Discovery service (`/lookup/shells`)
    Discovery,
    /// Concept description repository (`/concept-descriptions`)
    ConceptDescription,
    /// Serialization service (`/serialization`)
    Serialization,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AasRepository => "AAS_REPOSITORY",
            Self::AasRegistry => "AAS_REGISTRY",
            Self::SubmodelRepository => "SUBMODEL_REPOSITORY",
            Self::SubmodelRegistry => "SUBMODEL_REGISTRY",
            Self::Discovery => "DISCOVERY",
            Self::ConceptDescription => "CONCEPT_DESCRIPTION",
            Self::Serialization => "SERIALIZATION",
        };
        f.write_str(name)
    }
}

/// Security applied to every request sent to an infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Security {
    /// Requests are sent unchanged
    #[default]
    None,
    /// A fixed header is added to every request (e.g. an API key)
    Header {
        /// Header name
        #[serde(rename = "headerName")]
        name: String,
        /// Header value
        #[serde(rename = "headerValue")]
        value: String,
    },
    /// Requests are routed through a proxy that forwards to the base URL
    Proxy {
        /// Proxy base URL replacing the service base URL
        #[serde(rename = "proxyUrl")]
        url: String,
    },
}

/// One service endpoint of an infrastructure, as stored in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// Service kind
    pub kind: ServiceKind,
    /// Base URL of the service
    pub url: String,
}

/// A logical infrastructure, as stored in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Infrastructure {
    /// Unique infrastructure name
    pub name: String,
    /// Whether this is the infrastructure used when none is named
    #[serde(default)]
    pub is_default: bool,
    /// Service endpoints
    #[serde(default)]
    pub endpoints: Vec<ServiceEndpoint>,
    /// Security shared by all endpoints
    #[serde(default)]
    pub security: Security,
    /// Whether requests carry the bearer token of the shared token cache
    #[serde(default)]
    pub bearer_token: bool,
}

impl Infrastructure {
    /// Base URL of the first endpoint of the given kind.
    #[must_use]
    pub fn endpoint(&self, kind: ServiceKind) -> Option<&str> {
        self.endpoints
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.url.as_str())
    }

    fn descriptor(&self, kind: ServiceKind) -> Option<InfrastructureDescriptor> {
        self.endpoint(kind).map(|base_url| InfrastructureDescriptor {
            name: self.name.clone(),
            kind,
            base_url: base_url.to_string(),
            security: self.security.clone(),
            bearer_token: self.bearer_token,
        })
    }
}

/// A single resolved backend: one service kind of one infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureDescriptor {
    /// Infrastructure name
    pub name: String,
    /// Service kind
    pub kind: ServiceKind,
    /// Service base URL (e.g. <http://localhost:8081>)
    pub base_url: String,
    /// Security mode
    pub security: Security,
    /// Whether requests carry the bearer token of the shared token cache
    #[serde(default)]
    pub bearer_token: bool,
}

/// Concrete URL and extra headers for one outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    /// Absolute request URL
    pub url: String,
    /// Headers to add to the request
    pub headers: Vec<(String, String)>,
}

impl InfrastructureDescriptor {
    /// Create a descriptor without security.
    pub fn new(name: impl Into<String>, kind: ServiceKind, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            base_url: base_url.into(),
            security: Security::None,
            bearer_token: false,
        }
    }

    /// Set the security mode.
    #[must_use]
    pub fn with_security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Attach the shared bearer token to requests for this service.
    #[must_use]
    pub fn with_bearer_token(mut self) -> Self {
        self.bearer_token = true;
        self
    }

    /// Public URL of a resource path on this service, ignoring any proxy.
    ///
    /// Used for endpoint hrefs written into registry descriptors.
    #[must_use]
    pub fn public_url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// Build the request target for `path`, applying the security mode.
    ///
    /// - `None`: `{base_url}{path}`
    /// - `Header`: same URL, plus the configured header
    /// - `Proxy`: `{proxy_url}{path}`, plus [`FORWARDED_BASE_HEADER`] naming the
    ///   original base URL
    #[must_use]
    pub fn request_target(&self, path: &str) -> RequestTarget {
        match &self.security {
            Security::None => RequestTarget {
                url: join_url(&self.base_url, path),
                headers: Vec::new(),
            },
            Security::Header { name, value } => RequestTarget {
                url: join_url(&self.base_url, path),
                headers: vec![(name.clone(), value.clone())],
            },
            Security::Proxy { url } => RequestTarget {
                url: join_url(url, path),
                headers: vec![(
                    FORWARDED_BASE_HEADER.to_string(),
                    self.base_url.trim_end_matches('/').to_string(),
                )],
            },
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Read-only registry of configured infrastructures.
#[derive(Debug, Clone, Default)]
pub struct InfrastructureRegistry {
    infrastructures: Vec<Infrastructure>,
}

impl InfrastructureRegistry {
    /// Build a registry, validating names, URLs, and security settings.
    ///
    /// # Errors
    ///
    /// Returns error on duplicate names, unparsable URLs, or empty
    /// header/proxy settings.
    pub fn from_infrastructures(
        infrastructures: Vec<Infrastructure>,
    ) -> Result<Self, InfrastructureError> {
        let mut names = HashSet::new();
        for infra in &infrastructures {
            if infra.name.trim().is_empty() {
                return Err(InfrastructureError::EmptyName);
            }
            if !names.insert(infra.name.as_str()) {
                return Err(InfrastructureError::DuplicateName(infra.name.clone()));
            }
            for endpoint in &infra.endpoints {
                validate_url(&infra.name, &endpoint.url)?;
            }
            match &infra.security {
                Security::None => {}
                Security::Header { name, .. } if name.trim().is_empty() => {
                    return Err(InfrastructureError::InvalidSecurity {
                        name: infra.name.clone(),
                        reason: "header name is empty".to_string(),
                    });
                }
                Security::Header { value, .. } if value.trim().is_empty() => {
                    return Err(InfrastructureError::InvalidSecurity {
                        name: infra.name.clone(),
                        reason: "header value is empty".to_string(),
                    });
                }
                Security::Header { .. } => {}
                Security::Proxy { url } => validate_url(&infra.name, url)?,
            }
        }

        let default_count = infrastructures.iter().filter(|i| i.is_default).count();
        if default_count > 1 {
            tracing::warn!(
                default_count,
                "Several infrastructures are marked default, using the first"
            );
        }

        tracing::debug!(count = infrastructures.len(), "Loaded infrastructures");
        Ok(Self { infrastructures })
    }

    /// Parse a JSON array of infrastructures.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or validation fails.
    pub fn from_json(json: &str) -> Result<Self, InfrastructureError> {
        let infrastructures: Vec<Infrastructure> =
            serde_json::from_str(json).map_err(|e| InfrastructureError::Parse(e.to_string()))?;
        Self::from_infrastructures(infrastructures)
    }

    /// All configured infrastructures, in configuration order.
    #[must_use]
    pub fn infrastructures(&self) -> &[Infrastructure] {
        &self.infrastructures
    }

    /// Whether no infrastructure is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infrastructures.is_empty()
    }

    /// The infrastructure marked default, or the first one.
    #[must_use]
    pub fn default_infrastructure(&self) -> Option<&Infrastructure> {
        self.infrastructures
            .iter()
            .find(|i| i.is_default)
            .or_else(|| self.infrastructures.first())
    }

    /// Look up an infrastructure by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Infrastructure> {
        self.infrastructures.iter().find(|i| i.name == name)
    }

    /// Resolve the endpoint of `kind` exposed by infrastructure `name`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` error if the infrastructure does not exist or
    /// does not expose that service kind. The caller decides whether that
    /// is fatal.
    pub fn resolve(
        &self,
        name: &str,
        kind: ServiceKind,
    ) -> Result<InfrastructureDescriptor, ApiError> {
        let infra = self.get(name).ok_or_else(|| {
            ApiError::not_found(format!("infrastructure '{name}' is not configured"))
        })?;
        infra.descriptor(kind).ok_or_else(|| {
            ApiError::not_found(format!("infrastructure '{name}' has no {kind} endpoint"))
        })
    }

    /// Resolve `kind` if infrastructure `name` exposes it.
    #[must_use]
    pub fn resolve_optional(
        &self,
        name: &str,
        kind: ServiceKind,
    ) -> Option<InfrastructureDescriptor> {
        self.get(name).and_then(|i| i.descriptor(kind))
    }

    /// Every configured endpoint of `kind`, in configuration order.
    #[must_use]
    pub fn list(&self, kind: ServiceKind) -> Vec<InfrastructureDescriptor> {
        self.infrastructures
            .iter()
            .filter_map(|i| i.descriptor(kind))
            .collect()
    }
}

fn validate_url(name: &str, url: &str) -> Result<(), InfrastructureError> {
    let parsed = Url::parse(url).map_err(|e| InfrastructureError::InvalidUrl {
        name: name.to_string(),
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(InfrastructureError::InvalidUrl {
            name: name.to_string(),
            url: url.to_string(),
            reason: format!("unsupported scheme '{scheme}'"),
        }),
    }
}

/// Errors raised while loading infrastructure configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InfrastructureError {
    /// Configuration JSON could not be parsed
    #[error("invalid infrastructure configuration: {0}")]
    Parse(String),
    /// An infrastructure has an empty name
    #[error("infrastructure name must not be empty")]
    EmptyName,
    /// Two infrastructures share a name
    #[error("duplicate infrastructure name '{0}'")]
    DuplicateName(String),
    /// An endpoint or proxy URL is invalid
    #[error("infrastructure '{name}': invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// Infrastructure name
        name: String,
        /// Offending URL
        url: String,
        /// Parser message
        reason: String,
    },
    /// Security settings are incomplete
    #[error("infrastructure '{name}': invalid security: {reason}")]
    InvalidSecurity {
        /// Infrastructure name
        name: String,
        /// What is wrong
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ErrorKind;

    const CONFIG: &str = r#"[
        {
            "name": "local",
            "isDefault": true,
            "endpoints": [
                {"kind": "AAS_REPOSITORY", "url": "http://localhost:8081/"},
                {"kind": "SUBMODEL_REPOSITORY", "url": "http://localhost:8081"},
                {"kind": "DISCOVERY", "url": "http://localhost:8084"}
            ]
        },
        {
            "name": "partner",
            "endpoints": [
                {"kind": "AAS_REGISTRY", "url": "https://registry.partner.example"},
                {"kind": "AAS_REPOSITORY", "url": "https://repo.partner.example/api/v3.0"}
            ],
            "security": {"type": "HEADER", "headerName": "X-API-KEY", "headerValue": "secret"}
        }
    ]"#;

    #[test]
    fn resolve_known_kind() {
        let registry = InfrastructureRegistry::from_json(CONFIG).unwrap();
        let descriptor = registry
            .resolve("partner", ServiceKind::AasRepository)
            .unwrap();
        assert_eq!(descriptor.base_url, "https://repo.partner.example/api/v3.0");
        assert_eq!(descriptor.kind, ServiceKind::AasRepository);
    }

    #[test]
    fn resolve_missing_kind_is_not_found() {
        let registry = InfrastructureRegistry::from_json(CONFIG).unwrap();
        let err = registry
            .resolve("partner", ServiceKind::Discovery)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = registry
            .resolve("nowhere", ServiceKind::AasRepository)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn list_keeps_configuration_order() {
        let registry = InfrastructureRegistry::from_json(CONFIG).unwrap();
        let repos = registry.list(ServiceKind::AasRepository);
        let names: Vec<_> = repos.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["local", "partner"]);
        assert!(registry.list(ServiceKind::Serialization).is_empty());
    }

    #[test]
    fn default_infrastructure() {
        let registry = InfrastructureRegistry::from_json(CONFIG).unwrap();
        assert_eq!(registry.default_infrastructure().unwrap().name, "local");
        assert!(InfrastructureRegistry::default()
            .default_infrastructure()
            .is_none());
    }

    #[test]
    fn no_security_leaves_request_unchanged() {
        let descriptor =
            InfrastructureDescriptor::new("local", ServiceKind::AasRepository, "http://h:8081/");
        let target = descriptor.request_target("/shells");
        assert_eq!(target.url, "http://h:8081/shells");
        assert!(target.headers.is_empty());
    }

    #[test]
    fn header_security_injects_header() {
        let descriptor =
            InfrastructureDescriptor::new("p", ServiceKind::AasRegistry, "https://reg.example")
                .with_security(Security::Header {
                    name: "X-API-KEY".to_string(),
                    value: "secret".to_string(),
                });
        let target = descriptor.request_target("/shell-descriptors");
        assert_eq!(target.url, "https://reg.example/shell-descriptors");
        assert_eq!(
            target.headers,
            vec![("X-API-KEY".to_string(), "secret".to_string())]
        );
    }

    #[test]
    fn proxy_security_rewrites_url() {
        let descriptor =
            InfrastructureDescriptor::new("p", ServiceKind::Discovery, "https://disc.example/")
                .with_security(Security::Proxy {
                    url: "http://proxy.local/forward/".to_string(),
                });
        let target = descriptor.request_target("/lookup/shells");
        assert_eq!(target.url, "http://proxy.local/forward/lookup/shells");
        assert_eq!(
            target.headers,
            vec![(
                FORWARDED_BASE_HEADER.to_string(),
                "https://disc.example".to_string()
            )]
        );
        assert_eq!(
            descriptor.public_url("/lookup/shells"),
            "https://disc.example/lookup/shells"
        );
    }

    #[test]
    fn duplicate_names_rejected() {
        let infra = Infrastructure {
            name: "a".to_string(),
            is_default: false,
            endpoints: Vec::new(),
            security: Security::None,
            bearer_token: false,
        };
        let err = InfrastructureRegistry::from_infrastructures(vec![infra.clone(), infra])
            .unwrap_err();
        assert_eq!(err, InfrastructureError::DuplicateName("a".to_string()));
    }

    #[test]
    fn invalid_url_rejected() {
        let json = r#"[{"name":"x","endpoints":[{"kind":"DISCOVERY","url":"ftp://files"}]}]"#;
        let err = InfrastructureRegistry::from_json(json).unwrap_err();
        assert!(matches!(err, InfrastructureError::InvalidUrl { .. }));
    }

    #[test]
    fn empty_header_name_rejected() {
        let json = r#"[{"name":"x","security":{"type":"HEADER","headerName":" ","headerValue":"v"}}]"#;
        let err = InfrastructureRegistry::from_json(json).unwrap_err();
        assert!(matches!(err, InfrastructureError::InvalidSecurity { .. }));
    }

    #[test]
    fn empty_header_value_rejected() {
        let json = r#"[{"name":"x","security":{"type":"HEADER","headerName":"X-API-KEY","headerValue":"  "}}]"#;
        let err = InfrastructureRegistry::from_json(json).unwrap_err();
        assert_eq!(
            err,
            InfrastructureError::InvalidSecurity {
                name: "x".to_string(),
                reason: "header value is empty".to_string(),
            }
        );
    }

    #[test]
    fn bearer_token_flag_reaches_descriptors() {
        let json = r#"[
            {"name":"internal","bearerToken":true,"endpoints":[{"kind":"AAS_REPOSITORY","url":"http://repo.internal"}]},
            {"name":"partner","endpoints":[{"kind":"AAS_REPOSITORY","url":"https://repo.partner.example"}]}
        ]"#;
        let registry = InfrastructureRegistry::from_json(json).unwrap();

        assert!(
            registry
                .resolve("internal", ServiceKind::AasRepository)
                .unwrap()
                .bearer_token
        );
        assert!(
            !registry
                .resolve("partner", ServiceKind::AasRepository)
                .unwrap()
                .bearer_token
        );
    }
}
