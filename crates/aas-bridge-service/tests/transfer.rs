use aas_bridge_client::{encode_id_base64url, AasClient, AasClientConfig, FilePayload};
use aas_bridge_core::{
    ErrorKind, Infrastructure, InfrastructureRegistry, ServiceEndpoint, ServiceKind,
};
use aas_bridge_service::{
    fetch_transfer_unit, AttachmentDetails, AttachmentTarget, IdPolicy, OperationKind,
    TransferOrchestrator, TransferRequest, TransferResult, TransferTarget, TransferUnit,
};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;

const AAS_ID: &str = "urn:example:aas:pump";
const SM_DOCS: &str = "urn:example:sm:docs";
const SM_NAMEPLATE: &str = "urn:example:sm:nameplate";

fn client() -> AasClient {
    AasClient::new(AasClientConfig::default()).unwrap()
}

fn manual() -> FilePayload {
    FilePayload {
        file_name: "manual.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        bytes: b"%PDF-1.4".to_vec(),
    }
}

/// One shell, two submodels, one attachment on the first submodel.
fn unit() -> TransferUnit {
    TransferUnit {
        aas: serde_json::from_value(json!({
            "modelType": "AssetAdministrationShell",
            "id": AAS_ID,
            "assetInformation": {"assetKind": "Instance", "globalAssetId": "urn:example:asset:pump"},
            "submodels": [
                {"type": "ModelReference", "keys": [{"type": "Submodel", "value": SM_DOCS}]},
                {"type": "ModelReference", "keys": [{"type": "Submodel", "value": SM_NAMEPLATE}]}
            ]
        }))
        .unwrap(),
        submodels: vec![
            serde_json::from_value(json!({"modelType": "Submodel", "id": SM_DOCS})).unwrap(),
            serde_json::from_value(json!({"modelType": "Submodel", "id": SM_NAMEPLATE})).unwrap(),
        ],
        attachments: vec![AttachmentDetails {
            target: AttachmentTarget::SubmodelElement {
                submodel_id: SM_DOCS.to_string(),
                id_short_path: "Manual".to_string(),
            },
            file: manual(),
        }],
    }
}

fn target(server: &ServerGuard, kinds: &[ServiceKind]) -> TransferTarget {
    let registry = InfrastructureRegistry::from_infrastructures(vec![Infrastructure {
        name: "target".to_string(),
        is_default: true,
        endpoints: kinds
            .iter()
            .map(|kind| ServiceEndpoint {
                kind: *kind,
                url: server.url(),
            })
            .collect(),
        security: Default::default(),
        bearer_token: false,
    }])
    .unwrap();
    TransferTarget::resolve(&registry, "target").unwrap()
}

const REPOSITORIES: [ServiceKind; 2] = [
    ServiceKind::AasRepository,
    ServiceKind::SubmodelRepository,
];

fn attachment_path(submodel_id: &str, id_short_path: &str) -> String {
    format!(
        "/submodels/{}/submodel-elements/{id_short_path}/attachment",
        encode_id_base64url(submodel_id)
    )
}

async fn repository_mocks(server: &mut ServerGuard, shell_status: usize) -> Vec<Mock> {
    vec![
        server
            .mock("POST", "/shells")
            .with_status(shell_status)
            .create_async()
            .await,
        server
            .mock("POST", "/submodels")
            .with_status(201)
            .expect(2)
            .create_async()
            .await,
        server
            .mock("PUT", attachment_path(SM_DOCS, "Manual").as_str())
            .with_status(204)
            .create_async()
            .await,
    ]
}

fn kinds(results: &[TransferResult]) -> Vec<OperationKind> {
    results.iter().map(|r| r.operation_kind).collect()
}

async fn run(
    target: TransferTarget,
    unit: TransferUnit,
    id_policy: IdPolicy,
) -> Vec<TransferResult> {
    TransferOrchestrator::new(client())
        .transfer_aas_with_submodels(TransferRequest {
            unit,
            target,
            id_policy,
        })
        .await
}

#[tokio::test]
async fn one_entry_per_write() {
    let mut server = Server::new_async().await;
    let mocks = repository_mocks(&mut server, 201).await;

    let results = run(target(&server, &REPOSITORIES), unit(), IdPolicy::Preserve).await;

    assert_eq!(
        kinds(&results),
        [
            OperationKind::AasRepository,
            OperationKind::SubmodelRepository,
            OperationKind::FileTransfer,
            OperationKind::SubmodelRepository,
        ]
    );
    assert!(results.iter().all(|r| r.success && r.error.is_none()));
    assert!(results.iter().all(|r| r.original_id.is_none()));
    assert_eq!(results[0].resource_id, AAS_ID);
    assert_eq!(results[1].resource_id, SM_DOCS);
    assert_eq!(results[2].resource_id, format!("{SM_DOCS}/Manual"));
    assert_eq!(results[3].resource_id, SM_NAMEPLATE);
    for mock in mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn failed_shell_write_does_not_abort() {
    let mut server = Server::new_async().await;
    let mocks = repository_mocks(&mut server, 500).await;

    let results = run(target(&server, &REPOSITORIES), unit(), IdPolicy::Preserve).await;

    assert_eq!(results.len(), 4);
    assert!(!results[0].success);
    assert!(results[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("INTERNAL_SERVER_ERROR"));
    assert!(results[1..].iter().all(|r| r.success));
    // Submodels and attachments were still sent.
    mocks[1].assert_async().await;
    mocks[2].assert_async().await;
}

#[tokio::test]
async fn failed_attachment_is_its_own_entry() {
    let mut server = Server::new_async().await;
    let _shell = server
        .mock("POST", "/shells")
        .with_status(201)
        .create_async()
        .await;
    let _submodels = server
        .mock("POST", "/submodels")
        .with_status(201)
        .expect(2)
        .create_async()
        .await;
    let _attachment = server
        .mock("PUT", attachment_path(SM_DOCS, "Manual").as_str())
        .with_status(400)
        .with_body(r#"{"messages":[{"text":"bad file"}]}"#)
        .create_async()
        .await;

    let results = run(target(&server, &REPOSITORIES), unit(), IdPolicy::Preserve).await;

    let failed: Vec<_> = results.iter().filter(|r| !r.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].operation_kind, OperationKind::FileTransfer);
    assert_eq!(failed[0].error.as_deref(), Some("VALIDATION_ERROR: bad file"));
    assert_eq!(results.len(), 4);
}

#[tokio::test]
async fn rerun_against_existing_target_keeps_shape() {
    let mut server = Server::new_async().await;
    let _mocks = repository_mocks(&mut server, 201).await;
    let first = run(target(&server, &REPOSITORIES), unit(), IdPolicy::Preserve).await;

    let mut existing = Server::new_async().await;
    let _conflicts = vec![
        existing
            .mock("POST", "/shells")
            .with_status(409)
            .create_async()
            .await,
        existing
            .mock("POST", "/submodels")
            .with_status(409)
            .expect(2)
            .create_async()
            .await,
        existing
            .mock("PUT", attachment_path(SM_DOCS, "Manual").as_str())
            .with_status(204)
            .create_async()
            .await,
    ];
    let second = run(target(&existing, &REPOSITORIES), unit(), IdPolicy::Preserve).await;

    assert_eq!(kinds(&first), kinds(&second));
    let ids = |r: &[TransferResult]| r.iter().map(|x| x.resource_id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
    assert!(second[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("VALIDATION_ERROR"));
}

#[tokio::test]
async fn thumbnail_follows_shell_write() {
    let mut server = Server::new_async().await;
    let _mocks = repository_mocks(&mut server, 201).await;
    let thumbnail = server
        .mock(
            "PUT",
            format!(
                "/shells/{}/asset-information/thumbnail",
                encode_id_base64url(AAS_ID)
            )
            .as_str(),
        )
        .match_body(Matcher::Regex("thumb.png".into()))
        .with_status(204)
        .create_async()
        .await;

    let mut unit = unit();
    unit.attachments.push(AttachmentDetails {
        target: AttachmentTarget::Thumbnail,
        file: FilePayload {
            file_name: "thumb.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        },
    });
    let results = run(target(&server, &REPOSITORIES), unit, IdPolicy::Preserve).await;

    assert_eq!(results.len(), 5);
    assert_eq!(results[1].operation_kind, OperationKind::FileTransfer);
    assert_eq!(results[1].resource_id, AAS_ID);
    assert!(results[1].success);
    thumbnail.assert_async().await;
}

#[tokio::test]
async fn discovery_and_registry_entries_are_added() {
    let mut server = Server::new_async().await;
    let _mocks = repository_mocks(&mut server, 201).await;
    let link = server
        .mock(
            "POST",
            format!("/lookup/shells/{}", encode_id_base64url(AAS_ID)).as_str(),
        )
        .match_body(Matcher::Regex("urn:example:asset:pump".into()))
        .with_status(201)
        .create_async()
        .await;
    let shell_descriptor = server
        .mock("POST", "/shell-descriptors")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("submodelDescriptors".into()),
            Matcher::Regex("AAS-3.0".into()),
        ]))
        .with_status(201)
        .create_async()
        .await;

    let results = run(
        target(
            &server,
            &[
                ServiceKind::AasRepository,
                ServiceKind::SubmodelRepository,
                ServiceKind::Discovery,
                ServiceKind::AasRegistry,
            ],
        ),
        unit(),
        IdPolicy::Preserve,
    )
    .await;

    assert_eq!(
        &kinds(&results)[4..],
        &[OperationKind::Discovery, OperationKind::AasRegistry]
    );
    assert!(results.iter().all(|r| r.success));
    link.assert_async().await;
    shell_descriptor.assert_async().await;
}

#[tokio::test]
async fn submodel_registry_gets_one_entry_per_submodel() {
    let mut server = Server::new_async().await;
    let _mocks = repository_mocks(&mut server, 201).await;
    let shell_descriptor = server
        .mock("POST", "/shell-descriptors")
        .with_status(201)
        .create_async()
        .await;
    let submodel_descriptors = server
        .mock("POST", "/submodel-descriptors")
        .match_body(Matcher::Regex("SUBMODEL-3.0".into()))
        .with_status(201)
        .expect(2)
        .create_async()
        .await;

    let results = run(
        target(
            &server,
            &[
                ServiceKind::AasRepository,
                ServiceKind::SubmodelRepository,
                ServiceKind::AasRegistry,
                ServiceKind::SubmodelRegistry,
            ],
        ),
        unit(),
        IdPolicy::Preserve,
    )
    .await;

    assert_eq!(
        &kinds(&results)[4..],
        &[
            OperationKind::AasRegistry,
            OperationKind::SubmodelRegistry,
            OperationKind::SubmodelRegistry
        ]
    );
    shell_descriptor.assert_async().await;
    submodel_descriptors.assert_async().await;
}

#[tokio::test]
async fn reidentify_records_original_ids() {
    let mut server = Server::new_async().await;
    let shell = server
        .mock("POST", "/shells")
        .match_body(Matcher::Regex(r#""id":"urn:uuid:"#.into()))
        .with_status(201)
        .create_async()
        .await;
    let _submodels = server
        .mock("POST", "/submodels")
        .with_status(201)
        .expect(2)
        .create_async()
        .await;
    let attachment = server
        .mock("PUT", Matcher::Regex("/attachment$".into()))
        .with_status(204)
        .create_async()
        .await;

    let results = run(target(&server, &REPOSITORIES), unit(), IdPolicy::Reidentify).await;

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.success));
    assert!(results[0].resource_id.starts_with("urn:uuid:"));
    assert_eq!(results[0].original_id.as_deref(), Some(AAS_ID));
    assert_eq!(results[1].original_id.as_deref(), Some(SM_DOCS));
    assert_eq!(results[3].original_id.as_deref(), Some(SM_NAMEPLATE));
    assert_ne!(results[1].resource_id, results[3].resource_id);
    assert_eq!(
        results[2].original_id.as_deref(),
        Some(format!("{SM_DOCS}/Manual").as_str())
    );
    shell.assert_async().await;
    attachment.assert_async().await;
}

#[test]
fn missing_submodel_repository_fails_resolution() {
    let registry = InfrastructureRegistry::from_json(
        r#"[{"name":"half","endpoints":[{"kind":"AAS_REPOSITORY","url":"http://localhost:8081"}]}]"#,
    )
    .unwrap();

    let err = TransferTarget::resolve(&registry, "half").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn fetched_unit_carries_submodels_and_files() {
    let mut source = Server::new_async().await;
    let shell_path = format!("/shells/{}", encode_id_base64url(AAS_ID));
    let _shell = source
        .mock("GET", shell_path.as_str())
        .with_status(200)
        .with_body(
            json!({
                "id": AAS_ID,
                "assetInformation": {
                    "assetKind": "Instance",
                    "defaultThumbnail": {"path": "https://cdn.example/thumb.png"}
                },
                "submodels": [
                    {"type": "ModelReference", "keys": [{"type": "Submodel", "value": SM_DOCS}]},
                    {"type": "ModelReference", "keys": [{"type": "Submodel", "value": SM_NAMEPLATE}]}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let _docs = source
        .mock(
            "GET",
            format!("/submodels/{}", encode_id_base64url(SM_DOCS)).as_str(),
        )
        .with_status(200)
        .with_body(
            json!({
                "id": SM_DOCS,
                "submodelElements": [
                    {"modelType": "File", "idShort": "Manual", "value": "/aasx/manual.pdf", "contentType": "application/pdf"},
                    {"modelType": "File", "idShort": "Link", "value": "https://cdn.example/sheet.pdf"}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let _nameplate = source
        .mock(
            "GET",
            format!("/submodels/{}", encode_id_base64url(SM_NAMEPLATE)).as_str(),
        )
        .with_status(404)
        .create_async()
        .await;
    let file = source
        .mock("GET", attachment_path(SM_DOCS, "Manual").as_str())
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_body("%PDF-1.4")
        .create_async()
        .await;

    let infra = target(&source, &REPOSITORIES);
    let unit = fetch_transfer_unit(
        &client(),
        &infra.aas_repository,
        &infra.submodel_repository,
        AAS_ID,
    )
    .await
    .unwrap();

    assert_eq!(unit.aas.id, AAS_ID);
    assert_eq!(unit.submodels.len(), 1);
    assert_eq!(unit.attachments.len(), 1);
    assert_eq!(
        unit.attachments[0].target,
        AttachmentTarget::SubmodelElement {
            submodel_id: SM_DOCS.to_string(),
            id_short_path: "Manual".to_string(),
        }
    );
    assert_eq!(unit.attachments[0].file, manual());
    file.assert_async().await;
}
