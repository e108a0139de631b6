//! Transfer of a shell, its submodels, and their attachments to a target
//! infrastructure.
//!
//! A transfer walks fixed stages:
//!
//! ```text
//! Initialized -> WritingAas -> WritingSubmodels -> LinkingDiscovery?
//!             -> RegisteringDescriptors? -> Completed
//! ```
//!
//! No stage is skipped because an earlier write failed. Every attempted write
//! yields exactly one [`TransferResult`]; optional stages without a configured
//! target yield none. Nothing is rolled back: the caller reads the results and
//! retries the failed resource ids.

use aas_bridge_client::{encode_id_base64url, AasClient, FilePayload};
use aas_bridge_core::{
    ApiError, ApiResult, AssetAdministrationShell, AssetAdministrationShellDescriptor, Endpoint,
    InfrastructureDescriptor, InfrastructureRegistry, ServiceKind, Submodel, SubmodelDescriptor,
    AAS_INTERFACE, SUBMODEL_INTERFACE,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Kind of write recorded in a [`TransferResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Shell written to the AAS repository
    AasRepository,
    /// Submodel written to the submodel repository
    SubmodelRepository,
    /// Shell descriptor registered
    AasRegistry,
    /// Submodel descriptor registered
    SubmodelRegistry,
    /// Asset ids linked in the discovery service
    Discovery,
    /// Attachment or thumbnail uploaded
    FileTransfer,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of one write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    /// What was written
    pub operation_kind: OperationKind,
    /// Identifier of the written resource on the target
    pub resource_id: String,
    /// Source identifier, when the target got a new identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_id: Option<String>,
    /// Whether the write succeeded
    pub success: bool,
    /// Failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferResult {
    fn record(
        operation_kind: OperationKind,
        ids: &Identity,
        outcome: ApiResult<()>,
    ) -> Self {
        let (success, error) = match outcome {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        if let Some(error) = &error {
            tracing::warn!(
                operation = %operation_kind,
                resource_id = %ids.target,
                error = %error,
                "Transfer write failed"
            );
        } else {
            tracing::debug!(
                operation = %operation_kind,
                resource_id = %ids.target,
                "Transfer write succeeded"
            );
        }
        Self {
            operation_kind,
            resource_id: ids.target.clone(),
            original_id: ids.original(),
            success,
            error,
        }
    }
}

/// Where an attachment belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentTarget {
    /// The file behind a `File` element
    SubmodelElement {
        /// Source id of the owning submodel
        submodel_id: String,
        /// idShortPath of the `File` element
        id_short_path: String,
    },
    /// The shell's default thumbnail
    Thumbnail,
}

/// A binary attachment travelling with a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDetails {
    /// Destination of the file
    pub target: AttachmentTarget,
    /// File content
    pub file: FilePayload,
}

/// Everything that is transferred: one shell with its dependents.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferUnit {
    /// The shell
    pub aas: AssetAdministrationShell,
    /// Its submodels
    pub submodels: Vec<Submodel>,
    /// Files belonging to the submodels or the shell
    pub attachments: Vec<AttachmentDetails>,
}

/// Target services of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    /// Where the shell goes
    pub aas_repository: InfrastructureDescriptor,
    /// Where the submodels go
    pub submodel_repository: InfrastructureDescriptor,
    /// Discovery service to link asset ids in
    pub discovery: Option<InfrastructureDescriptor>,
    /// Registry for the shell descriptor
    pub aas_registry: Option<InfrastructureDescriptor>,
    /// Registry for submodel descriptors
    pub submodel_registry: Option<InfrastructureDescriptor>,
}

impl TransferTarget {
    /// Resolve the target services of infrastructure `name`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the infrastructure lacks an AAS repository or a
    /// submodel repository.
    pub fn resolve(registry: &InfrastructureRegistry, name: &str) -> Result<Self, ApiError> {
        Ok(Self {
            aas_repository: registry.resolve(name, ServiceKind::AasRepository)?,
            submodel_repository: registry.resolve(name, ServiceKind::SubmodelRepository)?,
            discovery: registry.resolve_optional(name, ServiceKind::Discovery),
            aas_registry: registry.resolve_optional(name, ServiceKind::AasRegistry),
            submodel_registry: registry.resolve_optional(name, ServiceKind::SubmodelRegistry),
        })
    }
}

/// How identifiers are carried to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdPolicy {
    /// Keep source ids verbatim
    #[default]
    Preserve,
    /// Give the shell and every submodel a fresh `urn:uuid:` id
    Reidentify,
}

/// A complete transfer request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    /// What to transfer
    pub unit: TransferUnit,
    /// Where to transfer it
    pub target: TransferTarget,
    /// Identifier policy
    pub id_policy: IdPolicy,
}

/// Stage of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    /// Identities assigned, nothing written
    Initialized,
    /// Writing the shell (and thumbnail)
    WritingAas,
    /// Writing submodels and attachments
    WritingSubmodels,
    /// Linking asset ids in the discovery service
    LinkingDiscovery,
    /// Registering descriptors
    RegisteringDescriptors,
    /// All planned writes attempted
    Completed,
}

/// Source and target identifier of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Identity {
    source: String,
    target: String,
}

impl Identity {
    fn original(&self) -> Option<String> {
        (self.source != self.target).then(|| self.source.clone())
    }
}

fn assign_identity(source: &str, policy: IdPolicy) -> Identity {
    let target = match policy {
        IdPolicy::Preserve => source.to_string(),
        IdPolicy::Reidentify => format!("urn:uuid:{}", Uuid::new_v4()),
    };
    Identity {
        source: source.to_string(),
        target,
    }
}

/// The unit with target identities applied.
struct PreparedUnit {
    aas: AssetAdministrationShell,
    aas_ids: Identity,
    submodels: Vec<(Identity, Submodel)>,
    thumbnails: Vec<FilePayload>,
    /// Attachments per source submodel id, in unit order
    attachments: HashMap<String, Vec<(String, FilePayload)>>,
}

impl PreparedUnit {
    fn new(unit: TransferUnit, policy: IdPolicy) -> Self {
        let mut aas = unit.aas;
        let aas_ids = assign_identity(&aas.id, policy);
        aas.id.clone_from(&aas_ids.target);

        let mut renamed = HashMap::new();
        let submodels: Vec<_> = unit
            .submodels
            .into_iter()
            .map(|mut submodel| {
                let ids = assign_identity(&submodel.id, policy);
                renamed.insert(ids.source.clone(), ids.target.clone());
                submodel.id.clone_from(&ids.target);
                (ids, submodel)
            })
            .collect();

        for reference in &mut aas.submodels {
            for key in &mut reference.keys {
                if key.key_type == "Submodel" {
                    if let Some(target) = renamed.get(&key.value) {
                        key.value.clone_from(target);
                    }
                }
            }
        }

        let mut thumbnails = Vec::new();
        let mut attachments: HashMap<String, Vec<(String, FilePayload)>> = HashMap::new();
        for attachment in unit.attachments {
            match attachment.target {
                AttachmentTarget::Thumbnail => thumbnails.push(attachment.file),
                AttachmentTarget::SubmodelElement {
                    submodel_id,
                    id_short_path,
                } => attachments
                    .entry(submodel_id)
                    .or_default()
                    .push((id_short_path, attachment.file)),
            }
        }

        Self {
            aas,
            aas_ids,
            submodels,
            thumbnails,
            attachments,
        }
    }
}

/// Writes transfer units to target infrastructures.
#[derive(Debug, Clone)]
pub struct TransferOrchestrator {
    client: AasClient,
}

impl TransferOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(client: AasClient) -> Self {
        Self { client }
    }

    /// Transfer a shell with its submodels and attachments.
    ///
    /// Returns one result per attempted write, in stage order. Individual
    /// failures are reported, never raised.
    pub async fn transfer_aas_with_submodels(
        &self,
        request: TransferRequest,
    ) -> Vec<TransferResult> {
        let TransferRequest {
            unit,
            target,
            id_policy,
        } = request;

        let mut stage = TransferStage::Initialized;
        let mut prepared = PreparedUnit::new(unit, id_policy);
        let mut results = Vec::new();
        tracing::info!(
            aas_id = %prepared.aas_ids.source,
            target_aas_id = %prepared.aas_ids.target,
            submodels = prepared.submodels.len(),
            ?stage,
            "Starting transfer"
        );

        stage = advance(stage, TransferStage::WritingAas);
        self.write_aas(&target, &prepared, &mut results).await;

        stage = advance(stage, TransferStage::WritingSubmodels);
        self.write_submodels(&target, &mut prepared, &mut results)
            .await;

        if let Some(discovery) = &target.discovery {
            stage = advance(stage, TransferStage::LinkingDiscovery);
            let asset_ids = prepared.aas.asset_ids();
            let outcome = self
                .client
                .link_asset_ids(discovery, &prepared.aas.id, &asset_ids)
                .await;
            results.push(TransferResult::record(
                OperationKind::Discovery,
                &prepared.aas_ids,
                outcome,
            ));
        }

        if target.aas_registry.is_some() || target.submodel_registry.is_some() {
            stage = advance(stage, TransferStage::RegisteringDescriptors);
            self.register_descriptors(&target, &prepared, &mut results)
                .await;
        }

        let stage = advance(stage, TransferStage::Completed);
        let failed = results.iter().filter(|r| !r.success).count();
        tracing::info!(
            aas_id = %prepared.aas_ids.target,
            writes = results.len(),
            failed,
            ?stage,
            "Transfer finished"
        );
        results
    }

    async fn write_aas(
        &self,
        target: &TransferTarget,
        prepared: &PreparedUnit,
        results: &mut Vec<TransferResult>,
    ) {
        let outcome = self
            .client
            .post_shell(&target.aas_repository, &prepared.aas)
            .await;
        results.push(TransferResult::record(
            OperationKind::AasRepository,
            &prepared.aas_ids,
            outcome,
        ));

        for thumbnail in &prepared.thumbnails {
            let outcome = self
                .client
                .put_thumbnail(&target.aas_repository, &prepared.aas.id, thumbnail)
                .await;
            results.push(TransferResult::record(
                OperationKind::FileTransfer,
                &prepared.aas_ids,
                outcome,
            ));
        }
    }

    async fn write_submodels(
        &self,
        target: &TransferTarget,
        prepared: &mut PreparedUnit,
        results: &mut Vec<TransferResult>,
    ) {
        for (ids, submodel) in &prepared.submodels {
            let outcome = self
                .client
                .post_submodel(&target.submodel_repository, submodel)
                .await;
            results.push(TransferResult::record(
                OperationKind::SubmodelRepository,
                ids,
                outcome,
            ));

            let files = prepared.attachments.remove(&ids.source).unwrap_or_default();
            self.upload_attachments(target, ids, &files, results).await;
        }

        // Attachments of submodels that are not part of the unit go to the
        // submodel under its source id.
        let mut orphans: Vec<_> = prepared.attachments.drain().collect();
        orphans.sort_by(|a, b| a.0.cmp(&b.0));
        for (submodel_id, files) in orphans {
            tracing::debug!(
                submodel_id,
                files = files.len(),
                "Uploading attachments of a submodel outside the unit"
            );
            let ids = Identity {
                source: submodel_id.clone(),
                target: submodel_id,
            };
            self.upload_attachments(target, &ids, &files, results).await;
        }
    }

    async fn upload_attachments(
        &self,
        target: &TransferTarget,
        submodel: &Identity,
        files: &[(String, FilePayload)],
        results: &mut Vec<TransferResult>,
    ) {
        let uploads = files.iter().map(|(path, file)| async move {
            let outcome = self
                .client
                .put_attachment(&target.submodel_repository, &submodel.target, path, file)
                .await;
            let ids = Identity {
                source: format!("{}/{path}", submodel.source),
                target: format!("{}/{path}", submodel.target),
            };
            TransferResult::record(OperationKind::FileTransfer, &ids, outcome)
        });
        results.extend(join_all(uploads).await);
    }

    async fn register_descriptors(
        &self,
        target: &TransferTarget,
        prepared: &PreparedUnit,
        results: &mut Vec<TransferResult>,
    ) {
        let submodel_descriptors: Vec<_> = prepared
            .submodels
            .iter()
            .map(|(_, submodel)| submodel_descriptor(&target.submodel_repository, submodel))
            .collect();

        if let Some(registry) = &target.aas_registry {
            let embedded = if target.submodel_registry.is_none() {
                submodel_descriptors.clone()
            } else {
                Vec::new()
            };
            let descriptor = shell_descriptor(&target.aas_repository, &prepared.aas, embedded);
            let outcome = self.client.post_shell_descriptor(registry, &descriptor).await;
            results.push(TransferResult::record(
                OperationKind::AasRegistry,
                &prepared.aas_ids,
                outcome,
            ));
        }

        if let Some(registry) = &target.submodel_registry {
            for ((ids, _), descriptor) in prepared.submodels.iter().zip(&submodel_descriptors) {
                let outcome = self
                    .client
                    .post_submodel_descriptor(registry, descriptor)
                    .await;
                results.push(TransferResult::record(
                    OperationKind::SubmodelRegistry,
                    ids,
                    outcome,
                ));
            }
        }
    }
}

fn advance(from: TransferStage, to: TransferStage) -> TransferStage {
    tracing::debug!(?from, ?to, "Transfer stage");
    to
}

/// Descriptor pointing at the shell in the target AAS repository.
fn shell_descriptor(
    repository: &InfrastructureDescriptor,
    aas: &AssetAdministrationShell,
    submodel_descriptors: Vec<SubmodelDescriptor>,
) -> AssetAdministrationShellDescriptor {
    let href = repository.public_url(&format!("/shells/{}", encode_id_base64url(&aas.id)));
    AssetAdministrationShellDescriptor {
        id: aas.id.clone(),
        id_short: aas.id_short.clone(),
        global_asset_id: aas.asset_information.global_asset_id.clone(),
        specific_asset_ids: aas.asset_information.specific_asset_ids.clone(),
        endpoints: vec![Endpoint::http(AAS_INTERFACE, href)],
        submodel_descriptors,
        extra: Map::new(),
    }
}

/// Descriptor pointing at the submodel in the target submodel repository.
fn submodel_descriptor(
    repository: &InfrastructureDescriptor,
    submodel: &Submodel,
) -> SubmodelDescriptor {
    let href = repository.public_url(&format!(
        "/submodels/{}",
        encode_id_base64url(&submodel.id)
    ));
    let mut extra = Map::new();
    if let Some(semantic_id) = submodel.extra.get("semanticId") {
        extra.insert("semanticId".to_string(), semantic_id.clone());
    }
    SubmodelDescriptor {
        id: submodel.id.clone(),
        id_short: submodel.id_short.clone(),
        endpoints: vec![Endpoint::http(SUBMODEL_INTERFACE, href)],
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unit() -> TransferUnit {
        TransferUnit {
            aas: serde_json::from_value(json!({
                "id": "urn:aas:1",
                "assetInformation": {"globalAssetId": "urn:asset:1"},
                "submodels": [
                    {"type": "ModelReference", "keys": [{"type": "Submodel", "value": "urn:sm:1"}]},
                    {"type": "ModelReference", "keys": [{"type": "Submodel", "value": "urn:sm:external"}]}
                ]
            }))
            .unwrap(),
            submodels: vec![serde_json::from_value(json!({"id": "urn:sm:1"})).unwrap()],
            attachments: vec![
                AttachmentDetails {
                    target: AttachmentTarget::SubmodelElement {
                        submodel_id: "urn:sm:1".to_string(),
                        id_short_path: "Manual".to_string(),
                    },
                    file: FilePayload {
                        file_name: "manual.pdf".to_string(),
                        content_type: "application/pdf".to_string(),
                        bytes: vec![1, 2, 3],
                    },
                },
                AttachmentDetails {
                    target: AttachmentTarget::Thumbnail,
                    file: FilePayload {
                        file_name: "thumb.png".to_string(),
                        content_type: "image/png".to_string(),
                        bytes: vec![4],
                    },
                },
            ],
        }
    }

    #[test]
    fn preserve_keeps_ids() {
        let prepared = PreparedUnit::new(unit(), IdPolicy::Preserve);
        assert_eq!(prepared.aas.id, "urn:aas:1");
        assert_eq!(prepared.aas_ids.original(), None);
        assert_eq!(prepared.submodels[0].1.id, "urn:sm:1");
        assert_eq!(prepared.thumbnails.len(), 1);
        assert_eq!(prepared.attachments["urn:sm:1"].len(), 1);
    }

    #[test]
    fn reidentify_rewrites_ids_and_references() {
        let prepared = PreparedUnit::new(unit(), IdPolicy::Reidentify);

        assert!(prepared.aas.id.starts_with("urn:uuid:"));
        assert_eq!(prepared.aas_ids.original().as_deref(), Some("urn:aas:1"));

        let (ids, submodel) = &prepared.submodels[0];
        assert!(submodel.id.starts_with("urn:uuid:"));
        assert_eq!(ids.source, "urn:sm:1");

        let refs: Vec<_> = prepared.aas.submodel_ids().collect();
        assert_eq!(refs, [submodel.id.as_str(), "urn:sm:external"]);
        // Attachments stay keyed by source id.
        assert!(prepared.attachments.contains_key("urn:sm:1"));
    }

    #[test]
    fn descriptors_point_at_public_urls() {
        let repo = InfrastructureDescriptor::new(
            "target",
            ServiceKind::AasRepository,
            "http://repo.example/",
        )
        .with_security(aas_bridge_core::Security::Proxy {
            url: "http://proxy.example".to_string(),
        });
        let aas = unit().aas;
        let descriptor = shell_descriptor(&repo, &aas, Vec::new());

        let expected = format!(
            "http://repo.example/shells/{}",
            encode_id_base64url("urn:aas:1")
        );
        assert_eq!(
            descriptor.endpoint_href(AAS_INTERFACE),
            Some(expected.as_str())
        );
        assert_eq!(descriptor.global_asset_id.as_deref(), Some("urn:asset:1"));
    }

    #[test]
    fn result_serializes_camel_case() {
        let ids = Identity {
            source: "urn:a".to_string(),
            target: "urn:b".to_string(),
        };
        let result = TransferResult::record(
            OperationKind::AasRepository,
            &ids,
            Err(ApiError::not_found("gone")),
        );
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "operationKind": "AasRepository",
                "resourceId": "urn:b",
                "originalId": "urn:a",
                "success": false,
                "error": "NOT_FOUND: gone"
            })
        );
    }
}
