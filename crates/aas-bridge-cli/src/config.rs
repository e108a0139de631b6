//! Bridge configuration.

use aas_bridge_client::auth::DEFAULT_LATENCY_BUFFER;
use aas_bridge_client::{AasClient, AasClientConfig, ClientCredentialsFetcher, TokenCache};
use aas_bridge_core::InfrastructureRegistry;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Configured infrastructures
    pub infrastructures: InfrastructureRegistry,

    /// HTTP request timeout
    pub timeout: Duration,

    /// OAuth2 client credentials, when services expect a bearer token
    pub auth: Option<AuthConfig>,
}

/// OAuth2 client-credentials configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Token endpoint URL
    pub token_url: String,

    /// Client identifier
    pub client_id: String,

    /// Client secret
    pub client_secret: String,

    /// Requested scope
    pub scope: Option<String>,

    /// Margin subtracted from token lifetimes
    pub latency_buffer: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            infrastructures: InfrastructureRegistry::default(),
            timeout: Duration::from_secs(30),
            auth: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// `infrastructures_file` takes precedence over the environment.
    ///
    /// # Environment Variables
    ///
    /// - `AAS_BRIDGE_INFRASTRUCTURES_FILE`: Path of a JSON infrastructure list
    /// - `AAS_BRIDGE_INFRASTRUCTURES`: Inline JSON infrastructure list
    /// - `AAS_BRIDGE_TIMEOUT_SECS`: HTTP request timeout
    /// - `AAS_BRIDGE_TOKEN_URL`: OAuth2 token endpoint
    /// - `AAS_BRIDGE_CLIENT_ID` / `AAS_BRIDGE_CLIENT_SECRET`: Client credentials
    /// - `AAS_BRIDGE_TOKEN_SCOPE`: Requested scope
    /// - `AAS_BRIDGE_TOKEN_LATENCY_BUFFER_SECS`: Token expiry margin
    ///
    /// # Errors
    ///
    /// Returns error if a value is malformed or the credentials are incomplete.
    pub fn from_env(infrastructures_file: Option<&Path>) -> Result<Self> {
        Self::from_lookup(infrastructures_file, |key| std::env::var(key).ok())
    }

    fn from_lookup(
        infrastructures_file: Option<&Path>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = Self::default();

        let file = infrastructures_file
            .map(Path::to_path_buf)
            .or_else(|| var("AAS_BRIDGE_INFRASTRUCTURES_FILE").map(PathBuf::from));
        if let Some(path) = file {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Cannot read infrastructure file {}", path.display()))?;
            config.infrastructures = InfrastructureRegistry::from_json(&json)
                .with_context(|| format!("Invalid infrastructure file {}", path.display()))?;
        } else if let Some(json) = var("AAS_BRIDGE_INFRASTRUCTURES") {
            config.infrastructures = InfrastructureRegistry::from_json(&json)
                .context("Invalid AAS_BRIDGE_INFRASTRUCTURES JSON")?;
        }

        if let Some(secs) = var("AAS_BRIDGE_TIMEOUT_SECS") {
            config.timeout = parse_secs(&secs).context("Invalid AAS_BRIDGE_TIMEOUT_SECS")?;
        }

        if let Some(token_url) = var("AAS_BRIDGE_TOKEN_URL") {
            let (Some(client_id), Some(client_secret)) =
                (var("AAS_BRIDGE_CLIENT_ID"), var("AAS_BRIDGE_CLIENT_SECRET"))
            else {
                bail!(
                    "AAS_BRIDGE_TOKEN_URL requires AAS_BRIDGE_CLIENT_ID and AAS_BRIDGE_CLIENT_SECRET"
                );
            };
            let latency_buffer = match var("AAS_BRIDGE_TOKEN_LATENCY_BUFFER_SECS") {
                Some(secs) => parse_secs(&secs)
                    .context("Invalid AAS_BRIDGE_TOKEN_LATENCY_BUFFER_SECS")?,
                None => DEFAULT_LATENCY_BUFFER,
            };
            config.auth = Some(AuthConfig {
                token_url,
                client_id,
                client_secret,
                scope: var("AAS_BRIDGE_TOKEN_SCOPE"),
                latency_buffer,
            });
        }

        Ok(config)
    }

    /// Build the HTTP client, with a shared token cache if credentials are set.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn client(&self) -> Result<AasClient> {
        let plain = AasClient::new(AasClientConfig {
            timeout: self.timeout,
            token: None,
        })?;
        let Some(auth) = &self.auth else {
            return Ok(plain);
        };

        let mut fetcher = ClientCredentialsFetcher::new(
            plain.http().clone(),
            auth.token_url.clone(),
            auth.client_id.clone(),
            auth.client_secret.clone(),
        );
        if let Some(scope) = &auth.scope {
            fetcher = fetcher.with_scope(scope.clone());
        }
        tracing::debug!(token_url = %auth.token_url, "Using client-credentials authentication");
        if !self
            .infrastructures
            .infrastructures()
            .iter()
            .any(|i| i.bearer_token)
        {
            tracing::warn!("Token credentials are set but no infrastructure enables bearerToken");
        }

        Ok(AasClient::new(AasClientConfig {
            timeout: self.timeout,
            token: Some(Arc::new(TokenCache::new(fetcher, auth.latency_buffer))),
        })?)
    }
}

fn parse_secs(value: &str) -> Result<Duration> {
    Ok(Duration::from_secs(value.trim().parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const ONE_INFRA: &str =
        r#"[{"name":"local","isDefault":true,"endpoints":[{"kind":"AAS_REPOSITORY","url":"http://localhost:8081"}]}]"#;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = BridgeConfig::from_lookup(None, lookup(&[])).unwrap();
        assert!(config.infrastructures.is_empty());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.auth.is_none());
    }

    #[test]
    fn inline_infrastructures() {
        let config =
            BridgeConfig::from_lookup(None, lookup(&[("AAS_BRIDGE_INFRASTRUCTURES", ONE_INFRA)]))
                .unwrap();
        assert_eq!(
            config.infrastructures.default_infrastructure().unwrap().name,
            "local"
        );
    }

    #[test]
    fn file_takes_precedence_over_inline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name":"from-file","endpoints":[{{"kind":"DISCOVERY","url":"https://disco.example"}}]}}]"#
        )
        .unwrap();

        let config = BridgeConfig::from_lookup(
            Some(file.path()),
            lookup(&[("AAS_BRIDGE_INFRASTRUCTURES", ONE_INFRA)]),
        )
        .unwrap();

        assert!(config.infrastructures.get("from-file").is_some());
        assert!(config.infrastructures.get("local").is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = BridgeConfig::from_lookup(
            None,
            lookup(&[("AAS_BRIDGE_INFRASTRUCTURES_FILE", path.to_str().unwrap())]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Cannot read infrastructure file"));
    }

    #[test]
    fn credentials_and_timeouts() {
        let config = BridgeConfig::from_lookup(
            None,
            lookup(&[
                ("AAS_BRIDGE_TIMEOUT_SECS", "5"),
                ("AAS_BRIDGE_TOKEN_URL", "https://idp.example/token"),
                ("AAS_BRIDGE_CLIENT_ID", "bridge"),
                ("AAS_BRIDGE_CLIENT_SECRET", "s3cret"),
                ("AAS_BRIDGE_TOKEN_LATENCY_BUFFER_SECS", "20"),
            ]),
        )
        .unwrap();

        assert_eq!(config.timeout, Duration::from_secs(5));
        let auth = config.auth.as_ref().unwrap();
        assert_eq!(auth.client_id, "bridge");
        assert_eq!(auth.latency_buffer, Duration::from_secs(20));
        assert!(auth.scope.is_none());
        assert!(config.client().is_ok());
    }

    #[test]
    fn incomplete_credentials_rejected() {
        let result = BridgeConfig::from_lookup(
            None,
            lookup(&[("AAS_BRIDGE_TOKEN_URL", "https://idp.example/token")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn bad_timeout_rejected() {
        let result =
            BridgeConfig::from_lookup(None, lookup(&[("AAS_BRIDGE_TIMEOUT_SECS", "soon")]));
        assert!(result.is_err());
    }
}
