//! # AAS-Bridge Service
//!
//! Operations spanning several AAS infrastructures:
//!
//! - [`search`]: find an asset or AAS across every configured discovery
//!   service, registry, and repository at once
//! - [`transfer`]: copy a shell with its submodels and attachments to a target
//!   infrastructure, reporting the outcome of every write
//! - [`fetch`]: assemble a transfer unit from a source infrastructure
//! - [`serialization`]: export shells as XML, JSON, or AASX

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod fetch;
pub mod search;
pub mod serialization;
pub mod transfer;

pub use fetch::fetch_transfer_unit;
pub use search::{
    DiscoverySearchResult, MultiSourceSearcher, RegistrySearchResult, RepositorySearchResult,
    SearchReport, SearchResult, SourceFailure,
};
pub use serialization::{
    Capability, ParseFormatError, SerializationFormat, SerializationGateway, SerializationResult,
};
pub use transfer::{
    AttachmentDetails, AttachmentTarget, IdPolicy, OperationKind, TransferOrchestrator,
    TransferRequest, TransferResult, TransferStage, TransferTarget, TransferUnit,
};
