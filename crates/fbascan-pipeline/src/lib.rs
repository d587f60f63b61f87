//! Drives a supplier run end to end: fetch, extract, match against the
//! catalog, analyze and aggregate.

pub mod caps;
pub mod catalog;
pub mod error;
pub mod orchestrator;
pub mod report;

pub use caps::{AdmissionCap, CategoryCaps};
pub use catalog::{CachedCatalog, CatalogSource, SnapshotCatalog};
pub use error::{CatalogError, PipelineError};
pub use orchestrator::PipelineOrchestrator;
pub use report::{ErrorTally, ProductResult, RunReport, RunStage};
