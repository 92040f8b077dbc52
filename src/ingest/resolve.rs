//! Entity resolver: natural-key lookups with run-scoped dedup state
//!
//! "Already exists" is a normal return path here, never an error path:
//! every resolve-or-create reports `(id, existed)` so callers count
//! creations without catching duplicate-key errors.

use crate::model::{
    DepartmentId, InstitutionId, NewDepartment, NewInstitution, NewPerson, NewProject, PersonId,
    ProjectId,
};
use crate::store::{Store, StoreResult};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

/// Outcome of a resolve-or-create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved<T> {
    pub id: T,
    /// True when the row pre-existed and was reused.
    pub existed: bool,
}

/// In-memory memoization for one ingestion run.
///
/// Owned by the caller of the run and discarded when it completes; never
/// shared across concurrent runs. Nothing in here is persisted — the maps
/// only guarantee idempotent insertion order within the run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// People already processed this run, keyed by lowercased email
    /// (name when no email). A repeat appearance is skipped silently.
    pub(crate) seen_people: HashSet<String>,
    /// Project titles (already truncated) inserted this run.
    pub(crate) seen_project_titles: HashMap<String, ProjectId>,
    /// Which institution each department was last observed under.
    /// Last writer wins; cross-institution collisions on a department
    /// name are a known quirk of the global department namespace.
    pub(crate) department_institution: HashMap<DepartmentId, InstitutionId>,
    /// Earliest project start date observed per department, feeding the
    /// BelongsTo backfill pass.
    pub(crate) department_earliest_start: HashMap<DepartmentId, NaiveDate>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dedup key for a person: email wins, name is the fallback.
    pub(crate) fn person_key(email: Option<&str>, name: &str) -> String {
        match email {
            Some(email) => email.to_lowercase(),
            None => name.to_string(),
        }
    }

    /// Track the minimum project start date seen for a department.
    pub(crate) fn observe_project_start(&mut self, department: DepartmentId, start: NaiveDate) {
        self.department_earliest_start
            .entry(department)
            .and_modify(|current| {
                if start < *current {
                    *current = start;
                }
            })
            .or_insert(start);
    }
}

/// Resolves canonical entities against the store by natural key.
pub struct Resolver<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> Resolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Institution by exact name.
    pub fn institution(&self, inst: &NewInstitution) -> StoreResult<Resolved<InstitutionId>> {
        if let Some(id) = self.store.institution_id_by_name(&inst.name)? {
            return Ok(Resolved { id, existed: true });
        }
        let id = self.store.insert_institution(inst)?;
        Ok(Resolved { id, existed: false })
    }

    /// Department by exact name in the global namespace — not scoped per
    /// institution, so a same-named department under another institution
    /// resolves to the existing row (preserved source behavior).
    pub fn department(&self, dept: &NewDepartment) -> StoreResult<Resolved<DepartmentId>> {
        if let Some(id) = self.store.department_id_by_name(&dept.name)? {
            return Ok(Resolved { id, existed: true });
        }
        let id = self.store.insert_department(dept)?;
        Ok(Resolved { id, existed: false })
    }

    /// Person by email when present, by name otherwise.
    pub fn person(&self, person: &NewPerson) -> StoreResult<Resolved<PersonId>> {
        let existing = match &person.email {
            Some(email) => self.store.person_id_by_email(email)?,
            None => self.store.person_id_by_name(&person.name)?,
        };
        if let Some(id) = existing {
            return Ok(Resolved { id, existed: true });
        }
        let id = self.store.insert_person(person)?;
        Ok(Resolved { id, existed: false })
    }

    /// Project by exact (already truncated) title. The run map records
    /// the id immediately on creation, so a later occurrence in the same
    /// payload resolves instead of reinserting.
    pub fn project(
        &self,
        run: &mut RunContext,
        project: &NewProject,
    ) -> StoreResult<Resolved<ProjectId>> {
        if let Some(&id) = run.seen_project_titles.get(&project.title) {
            return Ok(Resolved { id, existed: true });
        }
        if let Some(id) = self.store.project_id_by_title(&project.title)? {
            run.seen_project_titles.insert(project.title.clone(), id);
            return Ok(Resolved { id, existed: true });
        }
        let id = self.store.insert_project(project)?;
        run.seen_project_titles.insert(project.title.clone(), id);
        Ok(Resolved { id, existed: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{OpenStore, SqliteStore};

    #[test]
    fn institution_created_then_resolved() {
        let store = SqliteStore::open_in_memory().unwrap();
        let resolver = Resolver::new(&store);
        let inst = NewInstitution {
            name: "Roux Institute".to_string(),
            ..Default::default()
        };
        let first = resolver.institution(&inst).unwrap();
        assert!(!first.existed);
        let second = resolver.institution(&inst).unwrap();
        assert!(second.existed);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn person_resolves_by_email_despite_name_change() {
        let store = SqliteStore::open_in_memory().unwrap();
        let resolver = Resolver::new(&store);
        let first = resolver
            .person(&NewPerson {
                name: "J. Doe".to_string(),
                email: Some("jdoe@example.edu".to_string()),
                ..Default::default()
            })
            .unwrap();
        let second = resolver
            .person(&NewPerson {
                name: "Jane Doe".to_string(),
                email: Some("jdoe@example.edu".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert!(second.existed);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn person_without_email_resolves_by_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        let resolver = Resolver::new(&store);
        let first = resolver
            .person(&NewPerson {
                name: "No Email".to_string(),
                ..Default::default()
            })
            .unwrap();
        let second = resolver
            .person(&NewPerson {
                name: "No Email".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert!(second.existed);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn project_dedups_within_run_before_hitting_store() {
        let store = SqliteStore::open_in_memory().unwrap();
        let resolver = Resolver::new(&store);
        let mut run = RunContext::new();
        let project = NewProject {
            title: "Shared Title".to_string(),
            ..Default::default()
        };
        let first = resolver.project(&mut run, &project).unwrap();
        assert!(!first.existed);
        let second = resolver.project(&mut run, &project).unwrap();
        assert!(second.existed);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn earliest_start_keeps_the_minimum() {
        let mut run = RunContext::new();
        let dept = DepartmentId(1);
        run.observe_project_start(dept, NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        run.observe_project_start(dept, NaiveDate::from_ymd_opt(2019, 6, 1).unwrap());
        run.observe_project_start(dept, NaiveDate::from_ymd_opt(2020, 3, 1).unwrap());
        assert_eq!(
            run.department_earliest_start.get(&dept),
            NaiveDate::from_ymd_opt(2019, 6, 1).as_ref()
        );
    }
}
