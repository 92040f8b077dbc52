//! Store trait definitions

use crate::model::{
    BelongsTo, DepartmentId, InstitutionId, NewDepartment, NewInstitution, NewPerson, NewProject,
    PersonId, Project, ProjectId, ProjectUpdate, TagId, WorkedOn,
};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same natural key already exists. Treated as
    /// success-equivalent only on dedup-tolerant edge paths (BelongsTo
    /// backfill); a real error everywhere else.
    #[error("duplicate {entity} key: {key}")]
    DuplicateKey { entity: &'static str, key: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    #[error("lock wait timed out: {0}")]
    LockTimeout(String),

    /// The store itself is unreachable. The only run-fatal error class.
    #[error("connection failure: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("date parsing error: {0}")]
    DateParse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_referential_integrity(&self) -> bool {
        matches!(self, StoreError::ReferentialIntegrity(_))
    }

    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, StoreError::LockTimeout(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, ref msg) = e {
            let detail = || msg.clone().unwrap_or_else(|| err.to_string());
            match err.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    return StoreError::LockTimeout(detail());
                }
                rusqlite::ErrorCode::ConstraintViolation => {
                    // Extended codes distinguish foreign-key breaks from
                    // unique/primary-key collisions.
                    match err.extended_code {
                        rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                            return StoreError::ReferentialIntegrity(detail());
                        }
                        rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                        | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => {
                            return StoreError::DuplicateKey {
                                entity: "row",
                                key: detail(),
                            };
                        }
                        _ => {}
                    }
                }
                rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::NotADatabase => {
                    return StoreError::Connection(detail());
                }
                _ => {}
            }
        }
        StoreError::Database(e)
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Relational store for the collaboration graph.
///
/// Implementations must be thread-safe (Send + Sync). Every mutating
/// operation is its own transactional unit of work unless the caller has
/// opened one explicitly with `begin_work` — the loader uses that to make
/// one input file one transaction.
pub trait Store: Send + Sync {
    // === Unit of work ===

    /// Open an explicit unit of work. Mutations join it until
    /// `commit_work` or `rollback_work`.
    fn begin_work(&self) -> StoreResult<()>;

    /// Commit the open unit of work.
    fn commit_work(&self) -> StoreResult<()>;

    /// Roll back the open unit of work, discarding everything since
    /// `begin_work`.
    fn rollback_work(&self) -> StoreResult<()>;

    // === Natural-key lookups ===

    fn institution_id_by_name(&self, name: &str) -> StoreResult<Option<InstitutionId>>;

    /// Department names are a global namespace, not scoped per
    /// institution (preserved source behavior).
    fn department_id_by_name(&self, name: &str) -> StoreResult<Option<DepartmentId>>;

    fn person_id_by_email(&self, email: &str) -> StoreResult<Option<PersonId>>;

    fn person_id_by_name(&self, name: &str) -> StoreResult<Option<PersonId>>;

    /// Lookup by exact title; callers truncate to [`crate::model::MAX_TITLE_LEN`] first.
    fn project_id_by_title(&self, title: &str) -> StoreResult<Option<ProjectId>>;

    // === Entity creation ===

    fn insert_institution(&self, inst: &NewInstitution) -> StoreResult<InstitutionId>;

    fn insert_department(&self, dept: &NewDepartment) -> StoreResult<DepartmentId>;

    fn insert_person(&self, person: &NewPerson) -> StoreResult<PersonId>;

    /// Fails with `ReferentialIntegrity` when `lead_person` does not exist.
    fn insert_project(&self, project: &NewProject) -> StoreResult<ProjectId>;

    // === Project mutation (row-locked) ===

    fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>>;

    /// Replace a project's mutable payload. Fails with `NotFound` when the
    /// row no longer exists; never partially applies.
    fn update_project(&self, id: ProjectId, update: &ProjectUpdate) -> StoreResult<()>;

    /// Delete a project. Exactly one of any set of concurrent attempts
    /// succeeds; the rest fail with `NotFound`.
    fn delete_project(&self, id: ProjectId) -> StoreResult<()>;

    // === Edges ===

    /// Link a person to a department. Returns false when the edge already
    /// existed (a normal outcome, not an error).
    fn link_works_in(&self, person: PersonId, department: DepartmentId) -> StoreResult<bool>;

    /// Link a person to a project with role and date range. Returns false
    /// when the edge already existed.
    fn link_worked_on(&self, edge: &WorkedOn) -> StoreResult<bool>;

    /// Insert a department-institution affiliation. Unlike the other edge
    /// links this raises `DuplicateKey` on conflict; the backfill pass
    /// tolerates that error specifically.
    fn link_belongs_to(&self, edge: &BelongsTo) -> StoreResult<()>;

    fn get_belongs_to(
        &self,
        department: DepartmentId,
        institution: InstitutionId,
    ) -> StoreResult<Option<BelongsTo>>;

    fn get_worked_on(&self, person: PersonId, project: ProjectId)
        -> StoreResult<Option<WorkedOn>>;

    /// Get or create a tag by name.
    fn ensure_tag(&self, name: &str) -> StoreResult<TagId>;

    /// Attach a tag to a project. Returns false when already attached.
    fn tag_project(&self, project: ProjectId, tag: TagId) -> StoreResult<bool>;

    // === Reporting ===

    /// Row counts per table, for operator summaries.
    fn row_counts(&self) -> StoreResult<Vec<(&'static str, u64)>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: Store + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StoreResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StoreResult<Self>;
}
