//! Source-side assembly of a [`TransferUnit`].

use crate::transfer::{AttachmentDetails, AttachmentTarget, TransferUnit};
use aas_bridge_client::{AasClient, FilePayload};
use aas_bridge_core::{
    is_stored_path, ApiError, FileElement, InfrastructureDescriptor, RawResponse, Submodel,
};

const OCTET_STREAM: &str = "application/octet-stream";

/// Read a shell, its submodels, and their stored files from a source.
///
/// Submodels and files that cannot be read are logged and left out, so the
/// unit carries everything that was reachable.
///
/// # Errors
///
/// Returns the error of the shell lookup; nothing else is fatal.
pub async fn fetch_transfer_unit(
    client: &AasClient,
    aas_repository: &InfrastructureDescriptor,
    submodel_repository: &InfrastructureDescriptor,
    aas_id: &str,
) -> Result<TransferUnit, ApiError> {
    let aas = client.get_shell(aas_repository, aas_id).await?.value;
    let mut attachments = Vec::new();

    if let Some(thumbnail) = &aas.asset_information.default_thumbnail {
        if is_stored_path(&thumbnail.path) {
            match client.get_thumbnail(aas_repository, aas_id).await {
                Ok(response) => attachments.push(AttachmentDetails {
                    target: AttachmentTarget::Thumbnail,
                    file: payload(
                        &thumbnail.path,
                        thumbnail.content_type.as_deref(),
                        response.value,
                    ),
                }),
                Err(e) => {
                    tracing::warn!(aas_id, error = %e, "Skipping unreadable thumbnail");
                }
            }
        }
    }

    let mut submodels = Vec::new();
    for submodel_id in aas.submodel_ids() {
        match client.get_submodel(submodel_repository, submodel_id).await {
            Ok(response) => {
                let submodel = response.value;
                attachments.extend(
                    fetch_attachments(client, submodel_repository, &submodel).await,
                );
                submodels.push(submodel);
            }
            Err(e) => {
                tracing::warn!(aas_id, submodel_id, error = %e, "Skipping unreadable submodel");
            }
        }
    }

    tracing::info!(
        aas_id,
        submodels = submodels.len(),
        attachments = attachments.len(),
        "Fetched transfer unit"
    );

    Ok(TransferUnit {
        aas,
        submodels,
        attachments,
    })
}

async fn fetch_attachments(
    client: &AasClient,
    repository: &InfrastructureDescriptor,
    submodel: &Submodel,
) -> Vec<AttachmentDetails> {
    let mut attachments = Vec::new();
    for file in submodel
        .file_elements()
        .into_iter()
        .filter(FileElement::is_attachment)
    {
        match client
            .get_attachment(repository, &submodel.id, &file.id_short_path)
            .await
        {
            Ok(response) => attachments.push(AttachmentDetails {
                file: payload(&file.value, file.content_type.as_deref(), response.value),
                target: AttachmentTarget::SubmodelElement {
                    submodel_id: submodel.id.clone(),
                    id_short_path: file.id_short_path,
                },
            }),
            Err(e) => tracing::warn!(
                submodel_id = %submodel.id,
                id_short_path = %file.id_short_path,
                error = %e,
                "Skipping unreadable attachment"
            ),
        }
    }
    attachments
}

/// Build an upload payload; the declared type wins over the served one.
fn payload(path: &str, declared_type: Option<&str>, response: RawResponse) -> FilePayload {
    let content_type = declared_type
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or(response.content_type)
        .unwrap_or_else(|| OCTET_STREAM.to_string());
    FilePayload {
        file_name: file_name(path),
        content_type,
        bytes: response.body,
    }
}

fn file_name(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or("file")
        .to_string()
}
