//! Collabgraph: heterogeneous-schema ingestion for collaboration graphs
//!
//! Independent scrapers emit JSON datasets in structurally inconsistent
//! shapes. This crate normalizes them into a canonical form, resolves
//! entities against their natural keys, and loads a deduplicated
//! relational graph of institutions, departments, people, projects, and
//! their relationship edges — with every mutation guarded by a bounded
//! transactional unit of work so concurrent writers cannot lose updates
//! or double-delete.
//!
//! # Example
//!
//! ```
//! use collabgraph::{GraphLoader, OpenStore, SqliteStore};
//! use serde_json::json;
//!
//! let store = SqliteStore::open_in_memory().unwrap();
//! let mut loader = GraphLoader::new(&store);
//! loader
//!     .load_document(&json!({
//!         "institution": {"institution_name": "Example University"}
//!     }))
//!     .unwrap();
//! let report = loader.finish().unwrap();
//! assert_eq!(report.institutions_created, 1);
//! ```

pub mod ingest;
pub mod model;
pub mod store;

pub use ingest::{
    normalize_document, GraphLoader, LoadReport, Resolved, Resolver, RunContext, ShapeError,
};
pub use model::{
    BelongsTo, DepartmentId, InstitutionId, NewDepartment, NewInstitution, NewPerson, NewProject,
    PersonId, Project, ProjectId, ProjectUpdate, TagId, WorkedOn, MAX_TITLE_LEN,
};
pub use store::{OpenStore, SqliteStore, Store, StoreError, StoreResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
