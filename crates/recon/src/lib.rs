//! `uaplaces-recon`: record reconciliation and merge engine.
//!
//! Pure engine crate: holds the record store, matches external answers to
//! records and merges them field by field. Sources and persistence are
//! reached through the traits in [`source`]; no network or file IO here.

pub mod category;
pub mod checker;
pub mod code;
pub mod duplicates;
pub mod error;
pub mod hierarchy;
pub mod merge;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod source;
pub mod store;

pub use category::{Category, Kind};
pub use checker::{check, BoundaryMaps, ConsistencyReport};
pub use code::AdministrativeCode;
pub use duplicates::{resolve_duplicates, DuplicateGroup, DuplicateResolution};
pub use error::ReconError;
pub use merge::{merge_patch, MergeOutcome, Origin};
pub use reconcile::EngineConfig;
pub use record::{Coordinates, ElementKind, OsmRef, Patch, Record};
pub use report::StepReport;
pub use store::{RecordStore, SecondaryKey};
