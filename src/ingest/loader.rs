//! Graph loader: canonical records → deduplicated relational graph
//!
//! Processing order per institution record is a strict dependency chain —
//! institution → departments → people → projects → edges — because each
//! step needs the identifier produced by the one before it.
//!
//! Each input document is one unit of work: a store error rolls back
//! everything that document inserted (and the run-state it recorded) and
//! the run moves on to the next document. Only a connection failure
//! aborts the whole run.

use super::normalize::{
    normalize_document, normalize_end_date, normalize_phone, normalize_start_date, truncate_title,
    CanonicalDepartment, CanonicalInstitution, CanonicalPerson, CanonicalProject,
};
use super::resolve::{Resolver, RunContext};
use crate::model::{
    BelongsTo, DepartmentId, InstitutionId, NewDepartment, NewInstitution, NewPerson, NewProject,
    PersonId, WorkedOn,
};
use crate::store::{Store, StoreError, StoreResult};
use chrono::NaiveDate;
use tracing::{debug, warn};

/// Role recorded on a WorkedOn edge when neither the project nor the
/// person carries one.
pub const DEFAULT_ROLE: &str = "Researcher";

/// Affiliation start used when no project date was observed for a
/// department.
fn default_effective_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).expect("fixed epoch")
}

/// Summary of one ingestion run: what was created, what was skipped, and
/// every error message, so no data loss is silent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub institutions_created: u64,
    pub departments_created: u64,
    pub people_created: u64,
    pub projects_created: u64,
    pub works_in_created: u64,
    pub worked_on_created: u64,
    pub belongs_to_created: u64,
    pub tags_attached: u64,
    pub institutions_skipped: u64,
    pub people_skipped: u64,
    pub projects_skipped: u64,
    pub documents_loaded: u64,
    pub documents_skipped: u64,
    pub documents_failed: u64,
    pub errors: Vec<String>,
}

impl std::fmt::Display for LoadReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "documents: {} loaded, {} skipped, {} failed",
            self.documents_loaded, self.documents_skipped, self.documents_failed
        )?;
        writeln!(
            f,
            "created: {} institutions, {} departments, {} people, {} projects",
            self.institutions_created,
            self.departments_created,
            self.people_created,
            self.projects_created
        )?;
        writeln!(
            f,
            "edges: {} works_in, {} worked_on, {} belongs_to, {} tags attached",
            self.works_in_created, self.worked_on_created, self.belongs_to_created, self.tags_attached
        )?;
        write!(
            f,
            "skipped: {} institutions, {} people, {} projects",
            self.institutions_skipped, self.people_skipped, self.projects_skipped
        )?;
        for error in &self.errors {
            write!(f, "\nerror: {}", error)?;
        }
        Ok(())
    }
}

/// Orchestrates one ingestion run against a store.
///
/// Owns the run-scoped dedup state; create one loader per run and call
/// [`GraphLoader::finish`] to execute the BelongsTo backfill pass and
/// take the report.
pub struct GraphLoader<'a, S: Store> {
    store: &'a S,
    resolver: Resolver<'a, S>,
    run: RunContext,
    report: LoadReport,
}

impl<'a, S: Store> GraphLoader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            resolver: Resolver::new(store),
            run: RunContext::new(),
            report: LoadReport::default(),
        }
    }

    /// Load one JSON document as its own unit of work.
    ///
    /// Shape problems and store errors are recorded in the report and
    /// return `Ok`; only a connection failure propagates.
    pub fn load_document(&mut self, doc: &serde_json::Value) -> StoreResult<()> {
        let records = match normalize_document(doc) {
            Ok(records) => records,
            Err(e) => {
                warn!("skipping document: {}", e);
                self.report.documents_skipped += 1;
                self.report.errors.push(e.to_string());
                return Ok(());
            }
        };

        if let Err(e) = self.store.begin_work() {
            if e.is_connection() {
                return Err(e);
            }
            self.report.documents_failed += 1;
            self.report.errors.push(e.to_string());
            return Ok(());
        }

        // Snapshot run state and counters: a rolled-back document must not
        // leave dangling ids in the dedup maps or phantom creation counts.
        let run_checkpoint = self.run.clone();
        let report_checkpoint = self.report.clone();

        match self.load_records(&records) {
            Ok(()) => match self.store.commit_work() {
                Ok(()) => {
                    self.report.documents_loaded += 1;
                    Ok(())
                }
                Err(e) => self.fail_document(run_checkpoint, report_checkpoint, e),
            },
            Err(e) => self.fail_document(run_checkpoint, report_checkpoint, e),
        }
    }

    /// Mark the current document failed: roll back, restore the dedup
    /// state and counters to their pre-document checkpoint, record the
    /// error. Only a connection failure escapes; anything else (including
    /// a failed commit or rollback) stays in the report.
    fn fail_document(
        &mut self,
        run_checkpoint: RunContext,
        report_checkpoint: LoadReport,
        error: StoreError,
    ) -> StoreResult<()> {
        if error.is_connection() {
            let _ = self.store.rollback_work();
            return Err(error);
        }
        warn!("document failed, rolling back: {}", error);
        if let Err(e) = self.store.rollback_work() {
            if e.is_connection() {
                return Err(e);
            }
            warn!("rollback failed: {}", e);
        }
        self.run = run_checkpoint;
        self.report = report_checkpoint;
        self.report.documents_failed += 1;
        self.report.errors.push(error.to_string());
        Ok(())
    }

    /// Run the BelongsTo backfill pass and take the report.
    ///
    /// The backfill is a second pass because a department's earliest
    /// project date is only knowable after every document has been
    /// scanned.
    pub fn finish(mut self) -> StoreResult<LoadReport> {
        if self.run.department_institution.is_empty() {
            return Ok(self.report);
        }

        if let Err(e) = self.store.begin_work() {
            if e.is_connection() {
                return Err(e);
            }
            self.report.errors.push(e.to_string());
            return Ok(self.report);
        }

        let committed = self
            .backfill_belongs_to()
            .and_then(|created| self.store.commit_work().map(|()| created));
        match committed {
            Ok(created) => self.report.belongs_to_created += created,
            Err(e) if e.is_connection() => {
                let _ = self.store.rollback_work();
                return Err(e);
            }
            Err(e) => {
                warn!("belongs_to backfill failed, rolling back: {}", e);
                if let Err(re) = self.store.rollback_work() {
                    if re.is_connection() {
                        return Err(re);
                    }
                    warn!("rollback failed: {}", re);
                }
                self.report.errors.push(e.to_string());
            }
        }
        Ok(self.report)
    }

    fn backfill_belongs_to(&self) -> StoreResult<u64> {
        let mut created = 0;
        for (&department, &institution) in &self.run.department_institution {
            let effective_start = self
                .run
                .department_earliest_start
                .get(&department)
                .copied()
                .unwrap_or_else(default_effective_start);
            let edge = BelongsTo {
                department,
                institution,
                effective_start,
                effective_end: None,
                justification: None,
            };
            match self.store.link_belongs_to(&edge) {
                Ok(()) => created += 1,
                // "Ensure this fact exists": an affiliation left by an
                // earlier run is not a failure.
                Err(e) if e.is_duplicate_key() => {
                    debug!(%department, %institution, "belongs_to already present");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    fn load_records(&mut self, records: &[CanonicalInstitution]) -> StoreResult<()> {
        for record in records {
            self.load_institution(record)?;
        }
        Ok(())
    }

    fn load_institution(&mut self, record: &CanonicalInstitution) -> StoreResult<()> {
        let Some(name) = record.name.as_deref() else {
            warn!("skipping institution block with no name");
            self.report.institutions_skipped += 1;
            return Ok(());
        };

        let institution = NewInstitution {
            name: name.to_string(),
            institution_type: record.institution_type.clone(),
            street: record.street.clone(),
            city: record.city.clone(),
            state: record.state.clone(),
            zipcode: record.zipcode.clone(),
            phone: record.phone.clone(),
        };
        let resolved = self.resolver.institution(&institution)?;
        if !resolved.existed {
            self.report.institutions_created += 1;
        }

        for department in &record.departments {
            self.load_department(department, resolved.id)?;
        }
        Ok(())
    }

    fn load_department(
        &mut self,
        record: &CanonicalDepartment,
        institution: InstitutionId,
    ) -> StoreResult<()> {
        let department = NewDepartment {
            name: record.name.clone(),
            email: record.email.clone(),
            phone: record.phone.as_deref().and_then(normalize_phone),
            institution,
        };
        let resolved = self.resolver.department(&department)?;
        if !resolved.existed {
            self.report.departments_created += 1;
        }

        // Last writer wins on the institution mapping; collisions across
        // institutions come with the global department namespace.
        self.run
            .department_institution
            .insert(resolved.id, institution);

        for person in &record.people {
            self.load_person(person, resolved.id)?;
        }
        Ok(())
    }

    fn load_person(
        &mut self,
        record: &CanonicalPerson,
        department: DepartmentId,
    ) -> StoreResult<()> {
        let key = RunContext::person_key(record.email.as_deref(), &record.name);
        if self.run.seen_people.contains(&key) {
            debug!(person = %record.name, "already processed this run");
            self.report.people_skipped += 1;
            return Ok(());
        }

        let person = NewPerson {
            name: record.name.clone(),
            email: record.email.clone(),
            phone: record.phone.as_deref().and_then(normalize_phone),
            bio: record.bio.clone(),
            expertise: record.expertise.clone(),
            main_field: record.main_field.clone(),
        };
        let resolved = self.resolver.person(&person)?;
        // Recorded before children so a project referencing this person
        // twice in one payload cannot double-insert.
        self.run.seen_people.insert(key);
        if !resolved.existed {
            self.report.people_created += 1;
        }

        if self.store.link_works_in(resolved.id, department)? {
            self.report.works_in_created += 1;
        }

        for project in &record.projects {
            self.load_project(project, resolved.id, department, record.role.as_deref())?;
        }
        Ok(())
    }

    fn load_project(
        &mut self,
        record: &CanonicalProject,
        person: PersonId,
        department: DepartmentId,
        person_role: Option<&str>,
    ) -> StoreResult<()> {
        // Minimum required fields: a title and a parseable start date.
        let (Some(raw_title), Some(raw_start)) = (record.title.as_deref(), record.start_date.as_deref())
        else {
            warn!(
                title = record.title.as_deref().unwrap_or("<none>"),
                "skipping project missing title or start_date"
            );
            self.report.projects_skipped += 1;
            return Ok(());
        };
        let Some(start_date) = normalize_start_date(raw_start) else {
            warn!(title = raw_title, start_date = raw_start, "skipping project with unparseable start_date");
            self.report.projects_skipped += 1;
            return Ok(());
        };
        let title = truncate_title(raw_title);
        let end_date = record.end_date.as_deref().and_then(normalize_end_date);

        let project = NewProject {
            title,
            description: record.description.clone(),
            tag: record.tag.clone(),
            lead_person: Some(person),
            start_date: Some(start_date),
            end_date,
        };
        let resolved = self.resolver.project(&mut self.run, &project)?;
        if !resolved.existed {
            self.report.projects_created += 1;
        }

        self.run.observe_project_start(department, start_date);

        // Role fallback chain: project role → person role → default.
        let role = record
            .role
            .as_deref()
            .or(person_role)
            .unwrap_or(DEFAULT_ROLE);
        let edge = WorkedOn {
            person,
            project: resolved.id,
            role: role.to_string(),
            start_date: Some(start_date),
            end_date,
            notes: None,
        };
        if self.store.link_worked_on(&edge)? {
            self.report.worked_on_created += 1;
        }

        for tag_name in record.tag.iter().chain(record.tags.iter()) {
            let tag = self.store.ensure_tag(tag_name)?;
            if self.store.tag_project(resolved.id, tag)? {
                self.report.tags_attached += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Project, ProjectId, ProjectUpdate, TagId};
    use crate::store::{OpenStore, SqliteStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Delegating store with injectable failures, for driving the
    /// per-document rollback path without a competing writer.
    struct FailingStore<'a> {
        inner: &'a SqliteStore,
        reject_institution: Option<&'static str>,
        fail_next_commit: AtomicBool,
    }

    impl Store for FailingStore<'_> {
        fn begin_work(&self) -> StoreResult<()> {
            self.inner.begin_work()
        }

        fn commit_work(&self) -> StoreResult<()> {
            if self.fail_next_commit.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Database(rusqlite::Error::InvalidQuery));
            }
            self.inner.commit_work()
        }

        fn rollback_work(&self) -> StoreResult<()> {
            self.inner.rollback_work()
        }

        fn institution_id_by_name(&self, name: &str) -> StoreResult<Option<InstitutionId>> {
            self.inner.institution_id_by_name(name)
        }

        fn department_id_by_name(&self, name: &str) -> StoreResult<Option<DepartmentId>> {
            self.inner.department_id_by_name(name)
        }

        fn person_id_by_email(&self, email: &str) -> StoreResult<Option<PersonId>> {
            self.inner.person_id_by_email(email)
        }

        fn person_id_by_name(&self, name: &str) -> StoreResult<Option<PersonId>> {
            self.inner.person_id_by_name(name)
        }

        fn project_id_by_title(&self, title: &str) -> StoreResult<Option<ProjectId>> {
            self.inner.project_id_by_title(title)
        }

        fn insert_institution(&self, inst: &NewInstitution) -> StoreResult<InstitutionId> {
            if self.reject_institution == Some(inst.name.as_str()) {
                return Err(StoreError::ReferentialIntegrity(format!(
                    "injected failure: {}",
                    inst.name
                )));
            }
            self.inner.insert_institution(inst)
        }

        fn insert_department(&self, dept: &NewDepartment) -> StoreResult<DepartmentId> {
            self.inner.insert_department(dept)
        }

        fn insert_person(&self, person: &NewPerson) -> StoreResult<PersonId> {
            self.inner.insert_person(person)
        }

        fn insert_project(&self, project: &NewProject) -> StoreResult<ProjectId> {
            self.inner.insert_project(project)
        }

        fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
            self.inner.get_project(id)
        }

        fn update_project(&self, id: ProjectId, update: &ProjectUpdate) -> StoreResult<()> {
            self.inner.update_project(id, update)
        }

        fn delete_project(&self, id: ProjectId) -> StoreResult<()> {
            self.inner.delete_project(id)
        }

        fn link_works_in(&self, person: PersonId, department: DepartmentId) -> StoreResult<bool> {
            self.inner.link_works_in(person, department)
        }

        fn link_worked_on(&self, edge: &WorkedOn) -> StoreResult<bool> {
            self.inner.link_worked_on(edge)
        }

        fn link_belongs_to(&self, edge: &BelongsTo) -> StoreResult<()> {
            self.inner.link_belongs_to(edge)
        }

        fn get_belongs_to(
            &self,
            department: DepartmentId,
            institution: InstitutionId,
        ) -> StoreResult<Option<BelongsTo>> {
            self.inner.get_belongs_to(department, institution)
        }

        fn get_worked_on(
            &self,
            person: PersonId,
            project: ProjectId,
        ) -> StoreResult<Option<WorkedOn>> {
            self.inner.get_worked_on(person, project)
        }

        fn ensure_tag(&self, name: &str) -> StoreResult<TagId> {
            self.inner.ensure_tag(name)
        }

        fn tag_project(&self, project: ProjectId, tag: TagId) -> StoreResult<bool> {
            self.inner.tag_project(project, tag)
        }

        fn row_counts(&self) -> StoreResult<Vec<(&'static str, u64)>> {
            self.inner.row_counts()
        }
    }

    #[test]
    fn rolled_back_document_leaves_no_stale_dedup_state() {
        let sqlite = SqliteStore::open_in_memory().unwrap();
        let store = FailingStore {
            inner: &sqlite,
            reject_institution: Some("Poison U"),
            fail_next_commit: AtomicBool::new(false),
        };
        let mut loader = GraphLoader::new(&store);

        // The good block loads fully before the second block fails the
        // whole document.
        loader
            .load_document(&json!({
                "institutions": [
                    {
                        "institution_name": "Good U",
                        "departments": {
                            "D": {
                                "people": {
                                    "Jane": {
                                        "person_email": "jane@good.edu",
                                        "projects": [
                                            {"project_title": "Phoenix", "start_date": "2020-01-01"}
                                        ]
                                    }
                                }
                            }
                        }
                    },
                    {"institution_name": "Poison U"}
                ]
            }))
            .unwrap();

        // Same content again without the poison block. This only succeeds
        // if the dedup maps were restored with the rollback: a stale title
        // entry would point the WorkedOn edge at a rolled-back row, and a
        // stale person key would skip the re-insert entirely.
        loader
            .load_document(&json!({
                "institution": {"institution_name": "Good U"},
                "departments": {
                    "D": {
                        "people": {
                            "Jane": {
                                "person_email": "jane@good.edu",
                                "projects": [
                                    {"project_title": "Phoenix", "start_date": "2020-01-01"}
                                ]
                            }
                        }
                    }
                }
            }))
            .unwrap();
        let report = loader.finish().unwrap();

        assert_eq!(report.documents_failed, 1);
        assert_eq!(report.documents_loaded, 1);
        assert_eq!(report.institutions_created, 1);
        assert_eq!(report.people_created, 1);
        assert_eq!(report.projects_created, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(sqlite.institution_id_by_name("Poison U").unwrap().is_none());

        let project = sqlite.project_id_by_title("Phoenix").unwrap().unwrap();
        let person = sqlite.person_id_by_email("jane@good.edu").unwrap().unwrap();
        assert!(sqlite.get_worked_on(person, project).unwrap().is_some());
    }

    #[test]
    fn a_failed_commit_is_reported_not_run_fatal() {
        let sqlite = SqliteStore::open_in_memory().unwrap();
        let store = FailingStore {
            inner: &sqlite,
            reject_institution: None,
            fail_next_commit: AtomicBool::new(true),
        };
        let mut loader = GraphLoader::new(&store);

        loader
            .load_document(&json!({"institution": {"institution_name": "First U"}}))
            .unwrap();
        loader
            .load_document(&json!({"institution": {"institution_name": "Second U"}}))
            .unwrap();
        let report = loader.finish().unwrap();

        assert_eq!(report.documents_failed, 1);
        assert_eq!(report.documents_loaded, 1);
        assert_eq!(report.institutions_created, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(sqlite.institution_id_by_name("First U").unwrap().is_none());
        assert!(sqlite.institution_id_by_name("Second U").unwrap().is_some());
    }
}
