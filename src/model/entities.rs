//! Primary entities: institutions, departments, people, projects, tags
//!
//! Each entity has a surrogate row identifier (a newtype over the store's
//! rowid) and a natural key used for deduplication: institution name,
//! department name, person email (name when absent), project title.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Maximum persisted length of a project title, in characters.
///
/// Titles are truncated to this width before insertion and before any
/// natural-key comparison, so two titles that differ only past the limit
/// resolve to the same project.
pub const MAX_TITLE_LEN: usize = 200;

/// Row identifier for an institution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstitutionId(pub i64);

/// Row identifier for a department
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartmentId(pub i64);

/// Row identifier for a person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub i64);

/// Row identifier for a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

/// Row identifier for a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub i64);

impl std::fmt::Display for InstitutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for PersonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for TagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An institution row awaiting insertion.
///
/// `name` is the natural key and must be non-empty; the loader skips any
/// institution block that arrives without one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewInstitution {
    pub name: String,
    pub institution_type: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
    pub phone: Option<String>,
}

/// A department row awaiting insertion, bound to its owning institution.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDepartment {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub institution: InstitutionId,
}

/// A person row awaiting insertion.
///
/// `email` is a soft-unique key: unique when present, but many people may
/// have no email at all (lookup falls back to `name` in that case).
/// `phone` should already be normalized to bare digits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPerson {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub expertise: [Option<String>; 3],
    pub main_field: Option<String>,
}

/// A project row awaiting insertion.
///
/// `title` must already be truncated to [`MAX_TITLE_LEN`]. `lead_person`
/// is checked for referential integrity at insert time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProject {
    pub title: String,
    pub description: Option<String>,
    pub tag: Option<String>,
    pub lead_person: Option<PersonId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// A fully materialized project row.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub description: Option<String>,
    pub tag: Option<String>,
    pub lead_person: Option<PersonId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Replacement values for a project update.
///
/// Updates replace the whole mutable payload in one statement so that
/// concurrent writers can never interleave fields from two transactions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectUpdate {
    pub title: String,
    pub description: Option<String>,
    pub tag: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}
