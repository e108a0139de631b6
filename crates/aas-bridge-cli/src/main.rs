//! # AAS-Bridge CLI
//!
//! Search, transfer, and export Asset Administration Shells across several
//! AAS infrastructures. Results are printed as JSON on stdout; logs go to
//! stderr and are filtered with `RUST_LOG`.

use aas_bridge_client::{
    decode_id_base64url, decode_idshort_path, encode_id_base64url, encode_idshort_path,
};
use aas_bridge_core::{InfrastructureRegistry, ServiceKind};
use aas_bridge_service::{
    fetch_transfer_unit, IdPolicy, MultiSourceSearcher, SerializationFormat,
    SerializationGateway, TransferOrchestrator, TransferRequest, TransferTarget,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;

pub use config::BridgeConfig;

/// AAS-Bridge - multi-infrastructure resolution and transfer for AAS
#[derive(Parser)]
#[command(name = "aas-bridge", version)]
#[command(
    about = "Search, transfer, and export Asset Administration Shells across infrastructures",
    long_about = None
)]
struct Cli {
    /// JSON file listing the configured infrastructures
    #[arg(long, global = true, value_name = "FILE", env = "AAS_BRIDGE_INFRASTRUCTURES_FILE")]
    infrastructures_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode an AAS identifier to base64url (no padding)
    Encode {
        /// Identifier, or idShortPath with --id-short-path
        value: String,

        /// Percent-encode an idShortPath instead
        #[arg(long)]
        id_short_path: bool,
    },
    /// Decode a base64url-encoded identifier
    Decode {
        /// Encoded identifier, or idShortPath with --id-short-path
        value: String,

        /// Decode a percent-encoded idShortPath instead
        #[arg(long)]
        id_short_path: bool,
    },
    /// Look up an asset or AAS id in every discovery service, registry, and repository
    Search {
        /// Asset id or AAS id
        key: String,

        /// Include the list of failed sources
        #[arg(long)]
        detailed: bool,
    },
    /// Ask every discovery service for the shells linked to an asset id
    Discover {
        /// Asset id
        asset_id: String,
    },
    /// Copy a shell with its submodels and attachments to another infrastructure
    Transfer {
        /// Shell to transfer
        #[arg(long, value_name = "ID")]
        aas_id: String,

        /// Source infrastructure (default infrastructure if omitted)
        #[arg(long, value_name = "NAME")]
        source: Option<String>,

        /// Target infrastructure
        #[arg(long, value_name = "NAME")]
        target: String,

        /// Give the shell and its submodels new identifiers on the target
        #[arg(long)]
        reidentify: bool,
    },
    /// Export shells through an infrastructure's serialization service
    Serialize {
        /// Infrastructure providing the serialization service
        #[arg(long, value_name = "NAME")]
        infrastructure: String,

        /// Shells to include
        #[arg(long = "aas-id", value_name = "ID", required = true)]
        aas_ids: Vec<String>,

        /// Submodels to include
        #[arg(long = "submodel-id", value_name = "ID")]
        submodel_ids: Vec<String>,

        /// Output format: xml, json, or aasx
        #[arg(long, default_value = "json")]
        format: SerializationFormat,

        /// Include concept descriptions
        #[arg(long)]
        include_concept_descriptions: bool,

        /// Output file (defaults to a name derived from the first shell id)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// List the configured infrastructures
    Infrastructures,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Encode {
            value,
            id_short_path,
        } => {
            if id_short_path {
                println!("{}", encode_idshort_path(&value));
            } else {
                println!("{}", encode_id_base64url(&value));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Decode {
            value,
            id_short_path,
        } => {
            let decoded = if id_short_path {
                decode_idshort_path(&value)
            } else {
                decode_id_base64url(&value)
            };
            println!("{}", decoded.context("Failed to decode")?);
            Ok(ExitCode::SUCCESS)
        }
        command => {
            let config = BridgeConfig::from_env(cli.infrastructures_file.as_deref())?;
            tracing::debug!(
                version = env!("CARGO_PKG_VERSION"),
                infrastructures = config.infrastructures.infrastructures().len(),
                "Configuration loaded"
            );
            run(command, config).await
        }
    }
}

async fn run(command: Command, config: BridgeConfig) -> Result<ExitCode> {
    let client = config.client()?;
    let registry = Arc::new(config.infrastructures);

    match command {
        Command::Search { key, detailed } => {
            let searcher = MultiSourceSearcher::new(client, registry);
            if detailed {
                print_json(&searcher.search_everywhere_detailed(&key).await)?;
            } else {
                print_json(&searcher.search_everywhere(&key).await?.value)?;
            }
        }
        Command::Discover { asset_id } => {
            let searcher = MultiSourceSearcher::new(client, registry);
            print_json(&searcher.search_aas_in_all_discoveries(&asset_id).await?.value)?;
        }
        Command::Transfer {
            aas_id,
            source,
            target,
            reidentify,
        } => {
            let source = match source {
                Some(name) => name,
                None => registry
                    .default_infrastructure()
                    .map(|i| i.name.clone())
                    .context("No source infrastructure given and none configured")?,
            };
            let unit = fetch_transfer_unit(
                &client,
                &registry.resolve(&source, ServiceKind::AasRepository)?,
                &registry.resolve(&source, ServiceKind::SubmodelRepository)?,
                &aas_id,
            )
            .await
            .with_context(|| format!("Cannot read {aas_id} from {source}"))?;

            let request = TransferRequest {
                unit,
                target: TransferTarget::resolve(&registry, &target)?,
                id_policy: if reidentify {
                    IdPolicy::Reidentify
                } else {
                    IdPolicy::Preserve
                },
            };
            let results = TransferOrchestrator::new(client)
                .transfer_aas_with_submodels(request)
                .await;
            print_json(&results)?;

            if results.iter().any(|r| !r.success) {
                return Ok(ExitCode::from(2));
            }
        }
        Command::Serialize {
            infrastructure,
            aas_ids,
            submodel_ids,
            format,
            include_concept_descriptions,
            output,
        } => {
            let gateway = SerializationGateway::new(client, registry);
            let result = gateway
                .serialize_aas_from_infrastructure(
                    &aas_ids,
                    &submodel_ids,
                    &infrastructure,
                    include_concept_descriptions,
                    format,
                )
                .await?
                .value;

            let path = output.unwrap_or_else(|| PathBuf::from(&result.file_name));
            std::fs::write(&path, &result.bytes)
                .with_context(|| format!("Cannot write {}", path.display()))?;
            print_json(&Written {
                path: path.display().to_string(),
                content_type: result.content_type,
                bytes: result.bytes.len(),
            })?;
        }
        Command::Infrastructures => {
            print_json(&infrastructure_summary(&registry))?;
        }
        Command::Encode { .. } | Command::Decode { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Written {
    path: String,
    content_type: String,
    bytes: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfrastructureSummary {
    name: String,
    is_default: bool,
    bearer_token: bool,
    services: Vec<ServiceSummary>,
}

#[derive(Debug, Serialize)]
struct ServiceSummary {
    kind: ServiceKind,
    url: String,
}

/// Configured infrastructures without their security secrets.
fn infrastructure_summary(registry: &InfrastructureRegistry) -> Vec<InfrastructureSummary> {
    let default = registry.default_infrastructure().map(|i| i.name.as_str());
    registry
        .infrastructures()
        .iter()
        .map(|infra| InfrastructureSummary {
            name: infra.name.clone(),
            is_default: Some(infra.name.as_str()) == default,
            bearer_token: infra.bearer_token,
            services: infra
                .endpoints
                .iter()
                .map(|e| ServiceSummary {
                    kind: e.kind,
                    url: e.url.clone(),
                })
                .collect(),
        })
        .collect()
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
