//! Modality emulator: synthesizes imaging objects and pushes them to a
//! storage provider, and queries a modality worklist provider.

pub mod association;
pub mod common;
pub mod config;
pub mod dimse;
pub mod error;
pub mod generator;
pub mod receiver;
pub mod sender;
pub mod worklist;

pub use association::{
    check_connection, AssociationClient, AssociationHandle, AssociationResult, Capability,
    Connector, DimseChannel,
};
pub use common::sop_classes::{Modality, SopClassTable};
pub use common::types::{ExchangeOutcome, RemoteNode, SeriesReport};
pub use config::EmulatorConfig;
pub use error::{EmulatorError, Result};
pub use generator::{ImagingObject, ObjectGenerator};
