//! Relationship edges between primary entities
//!
//! WorksIn carries no payload beyond the pair, so it has no struct here;
//! the store links it directly from the two ids.

use super::entities::{DepartmentId, InstitutionId, PersonId, ProjectId};
use chrono::NaiveDate;

/// Person-to-project edge with a role and date range.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkedOn {
    pub person: PersonId,
    pub project: ProjectId,
    pub role: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Department-to-institution affiliation with an effective date range.
///
/// `effective_end = None` means the affiliation is currently active.
#[derive(Debug, Clone, PartialEq)]
pub struct BelongsTo {
    pub department: DepartmentId,
    pub institution: InstitutionId,
    pub effective_start: NaiveDate,
    pub effective_end: Option<NaiveDate>,
    pub justification: Option<String>,
}
