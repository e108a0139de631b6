//! Typed views over the AAS JSON object model.
//!
//! Only the fields the bridge interprets are typed (identifiers, asset ids,
//! submodel references, endpoints). Everything else is kept in a flattened
//! `extra` map so payloads relayed between servers round-trip unchanged.
//! Submodel elements stay raw JSON and are classified on demand through
//! [`ElementView`], keyed by their `modelType` discriminant.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Interface name of AAS repository endpoints in registry descriptors.
pub const AAS_INTERFACE: &str = "AAS-3.0";

/// Interface name of submodel repository endpoints in registry descriptors.
pub const SUBMODEL_INTERFACE: &str = "SUBMODEL-3.0";

/// Name under which the global asset id is exchanged with discovery services.
pub const GLOBAL_ASSET_ID: &str = "globalAssetId";

/// One key of a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    /// Key type (e.g. `Submodel`, `GlobalReference`)
    #[serde(rename = "type")]
    pub key_type: String,
    /// Key value
    pub value: String,
}

/// Reference type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceType {
    /// Reference to an element outside the AAS model
    ExternalReference,
    /// Reference to a model element
    ModelReference,
}

/// A reference, e.g. from a shell to one of its submodels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Reference type
    #[serde(rename = "type")]
    pub reference_type: ReferenceType,
    /// Keys, outermost first
    pub keys: Vec<Key>,
    /// Untyped remainder (e.g. `referredSemanticId`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reference {
    /// Model reference to a submodel.
    pub fn submodel(id: impl Into<String>) -> Self {
        Self {
            reference_type: ReferenceType::ModelReference,
            keys: vec![Key {
                key_type: "Submodel".to_string(),
                value: id.into(),
            }],
            extra: Map::new(),
        }
    }

    /// The submodel id this reference points to, if it is a submodel reference.
    #[must_use]
    pub fn submodel_id(&self) -> Option<&str> {
        self.keys
            .iter()
            .rev()
            .find(|k| k.key_type == "Submodel")
            .map(|k| k.value.as_str())
    }
}

/// A named asset identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificAssetId {
    /// Identifier name (e.g. `globalAssetId`, `serialNumber`)
    pub name: String,
    /// Identifier value
    pub value: String,
    /// Untyped remainder (e.g. `externalSubjectId`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SpecificAssetId {
    /// Create an asset id.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            extra: Map::new(),
        }
    }

    /// The `globalAssetId` pseudo asset id used by discovery services.
    pub fn global(value: impl Into<String>) -> Self {
        Self::new(GLOBAL_ASSET_ID, value)
    }
}

/// A file resource such as a thumbnail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Path or URL of the file
    pub path: String,
    /// MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Asset information of a shell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetInformation {
    /// Global asset identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_asset_id: Option<String>,
    /// Additional asset identifiers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specific_asset_ids: Vec<SpecificAssetId>,
    /// Thumbnail image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_thumbnail: Option<Resource>,
    /// Untyped remainder (e.g. `assetKind`, `assetType`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An Asset Administration Shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAdministrationShell {
    /// Shell identifier
    pub id: String,
    /// Short name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_short: Option<String>,
    /// Asset information
    #[serde(default)]
    pub asset_information: AssetInformation,
    /// References to the shell's submodels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub submodels: Vec<Reference>,
    /// Untyped remainder (e.g. `modelType`, `administration`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssetAdministrationShell {
    /// All asset ids of the shell, the global asset id first.
    #[must_use]
    pub fn asset_ids(&self) -> Vec<SpecificAssetId> {
        let info = &self.asset_information;
        info.global_asset_id
            .iter()
            .map(SpecificAssetId::global)
            .chain(info.specific_asset_ids.iter().cloned())
            .collect()
    }

    /// Ids of all referenced submodels, in reference order.
    pub fn submodel_ids(&self) -> impl Iterator<Item = &str> {
        self.submodels.iter().filter_map(Reference::submodel_id)
    }
}

/// A submodel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submodel {
    /// Submodel identifier
    pub id: String,
    /// Short name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_short: Option<String>,
    /// Top-level submodel elements, untyped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub submodel_elements: Vec<Value>,
    /// Untyped remainder (e.g. `semanticId`, `kind`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A `File` element found while walking a submodel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileElement {
    /// Dotted idShortPath, with `[n]` for list items
    pub id_short_path: String,
    /// File path or URL stored in the element
    pub value: String,
    /// MIME type declared by the element
    pub content_type: Option<String>,
}

/// Whether a `File` value or thumbnail path points at a file stored by the
/// repository itself rather than an external URL.
#[must_use]
pub fn is_stored_path(path: &str) -> bool {
    !(path.is_empty() || path.starts_with("http://") || path.starts_with("https://"))
}

impl FileElement {
    /// Whether the element's file is stored by the repository.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        is_stored_path(&self.value)
    }
}

impl Submodel {
    /// Every `File` element, depth first, with its idShortPath.
    #[must_use]
    pub fn file_elements(&self) -> Vec<FileElement> {
        let mut files = Vec::new();
        for element in &self.submodel_elements {
            collect_files(element, None, &mut files);
        }
        files
    }
}

fn collect_files(element: &Value, path: Option<String>, files: &mut Vec<FileElement>) {
    let view = ElementView::parse(element);
    let path = path.or_else(|| view.id_short().map(str::to_string));
    let Some(path) = path else {
        return;
    };

    match view {
        ElementView::File {
            value: Some(value),
            content_type,
            ..
        } => files.push(FileElement {
            id_short_path: path,
            value: value.to_string(),
            content_type: content_type.map(str::to_string),
        }),
        ElementView::Collection { children, .. } => {
            for child in children {
                if let Some(id_short) = ElementView::parse(child).id_short() {
                    collect_files(child, Some(format!("{path}.{id_short}")), files);
                }
            }
        }
        ElementView::List { children, .. } => {
            for (index, child) in children.iter().enumerate() {
                collect_files(child, Some(format!("{path}[{index}]")), files);
            }
        }
        _ => {}
    }
}

/// Classified view of a submodel element, keyed by `modelType`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementView<'a> {
    /// `File` element
    File {
        /// Short name
        id_short: Option<&'a str>,
        /// Stored path or URL
        value: Option<&'a str>,
        /// MIME type
        content_type: Option<&'a str>,
    },
    /// `SubmodelElementCollection`
    Collection {
        /// Short name
        id_short: Option<&'a str>,
        /// Child elements
        children: &'a [Value],
    },
    /// `SubmodelElementList`
    List {
        /// Short name
        id_short: Option<&'a str>,
        /// Child elements
        children: &'a [Value],
    },
    /// Any other element kind
    Other {
        /// Short name
        id_short: Option<&'a str>,
        /// The `modelType` value, absent on malformed input
        model_type: Option<&'a str>,
    },
}

impl<'a> ElementView<'a> {
    /// Classify a raw element.
    #[must_use]
    pub fn parse(element: &'a Value) -> Self {
        let id_short = str_field(element, "idShort");

        match str_field(element, "modelType") {
            Some("File") => Self::File {
                id_short,
                value: str_field(element, "value"),
                content_type: str_field(element, "contentType"),
            },
            Some("SubmodelElementCollection") => Self::Collection {
                id_short,
                children: child_elements(element),
            },
            Some("SubmodelElementList") => Self::List {
                id_short,
                children: child_elements(element),
            },
            model_type => Self::Other {
                id_short,
                model_type,
            },
        }
    }

    /// Short name of the element.
    #[must_use]
    pub fn id_short(&self) -> Option<&'a str> {
        match self {
            Self::File { id_short, .. }
            | Self::Collection { id_short, .. }
            | Self::List { id_short, .. }
            | Self::Other { id_short, .. } => *id_short,
        }
    }
}

fn str_field<'a>(element: &'a Value, name: &str) -> Option<&'a str> {
    element.get(name).and_then(Value::as_str)
}

fn child_elements(element: &Value) -> &[Value] {
    element
        .get("value")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice)
}

/// Protocol details of a descriptor endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolInformation {
    /// Absolute URL of the resource
    pub href: String,
    /// Protocol name (e.g. `HTTP`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_protocol: Option<String>,
    /// Untyped remainder (e.g. `securityAttributes`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An endpoint of a registry descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Interface name (e.g. `AAS-3.0`)
    pub interface: String,
    /// Where and how to reach the resource
    pub protocol_information: ProtocolInformation,
}

impl Endpoint {
    /// HTTP endpoint for the given interface.
    pub fn http(interface: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            protocol_information: ProtocolInformation {
                href: href.into(),
                endpoint_protocol: Some("HTTP".to_string()),
                extra: Map::new(),
            },
        }
    }
}

/// Registry descriptor of a submodel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmodelDescriptor {
    /// Submodel identifier
    pub id: String,
    /// Short name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_short: Option<String>,
    /// Endpoints serving the submodel
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    /// Untyped remainder (e.g. `semanticId`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Registry descriptor of a shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAdministrationShellDescriptor {
    /// Shell identifier
    pub id: String,
    /// Short name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_short: Option<String>,
    /// Global asset identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_asset_id: Option<String>,
    /// Additional asset identifiers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specific_asset_ids: Vec<SpecificAssetId>,
    /// Endpoints serving the shell
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    /// Embedded submodel descriptors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub submodel_descriptors: Vec<SubmodelDescriptor>,
    /// Untyped remainder (e.g. `administration`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssetAdministrationShellDescriptor {
    /// Href of the first endpoint with the given interface.
    #[must_use]
    pub fn endpoint_href(&self, interface: &str) -> Option<&str> {
        self.endpoints
            .iter()
            .find(|e| e.interface == interface)
            .map(|e| e.protocol_information.href.as_str())
    }
}
