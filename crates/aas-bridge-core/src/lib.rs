//! # AAS-Bridge Core
//!
//! Transport-neutral building blocks shared by every AAS-Bridge crate.
//!
//! This crate provides:
//! - A uniform success/error envelope (`ApiResult`) for every external call
//! - Typed views over the AAS JSON object model that keep unknown fields intact
//! - The infrastructure registry resolving logical names to service endpoints

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod infrastructure;
pub mod model;
pub mod result;

pub use infrastructure::{
    Infrastructure, InfrastructureDescriptor, InfrastructureError, InfrastructureRegistry,
    RequestTarget, Security, ServiceEndpoint, ServiceKind,
};
pub use model::{
    is_stored_path, AssetAdministrationShell, AssetAdministrationShellDescriptor,
    AssetInformation, ElementView, Endpoint, FileElement, Key, ProtocolInformation, Reference,
    ReferenceType, Resource, SpecificAssetId, Submodel, SubmodelDescriptor, AAS_INTERFACE,
    GLOBAL_ASSET_ID, SUBMODEL_INTERFACE,
};
pub use result::{
    wrap_bytes, wrap_error_code, wrap_response, wrap_success, ApiError, ApiResult, ErrorKind,
    RawResponse, Success, TransportError,
};
