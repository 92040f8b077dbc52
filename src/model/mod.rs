//! Core data model for the collaboration graph

mod edges;
mod entities;

pub use edges::{BelongsTo, WorkedOn};
pub use entities::{
    DepartmentId, InstitutionId, NewDepartment, NewInstitution, NewPerson, NewProject, PersonId,
    Project, ProjectId, ProjectUpdate, TagId, MAX_TITLE_LEN,
};
