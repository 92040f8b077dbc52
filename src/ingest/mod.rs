//! Ingestion pipeline: normalize → resolve → load → backfill

mod loader;
mod normalize;
mod resolve;

pub use loader::{GraphLoader, LoadReport, DEFAULT_ROLE};
pub use normalize::{
    normalize_document, normalize_end_date, normalize_phone, normalize_start_date, truncate_title,
    CanonicalDepartment, CanonicalInstitution, CanonicalPerson, CanonicalProject, ShapeError,
};
pub use resolve::{Resolved, Resolver, RunContext};
