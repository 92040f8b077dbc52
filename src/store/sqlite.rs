//! SQLite storage backend for the collaboration graph

use super::traits::{OpenStore, Store, StoreError, StoreResult};
use crate::model::{
    BelongsTo, DepartmentId, InstitutionId, NewDepartment, NewInstitution, NewPerson, NewProject,
    PersonId, Project, ProjectId, ProjectUpdate, TagId, WorkedOn,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// Default bound on how long a mutation waits for a competing writer
/// before surfacing `LockTimeout`.
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// SQLite-backed graph store
///
/// Uses a single database file with one table per entity and edge type.
/// A store handle owns one connection (thread-safe via internal mutex);
/// concurrent writers are separate handles opened on the same file, each
/// with its own transaction scope — WAL mode lets readers proceed while a
/// writer holds the write lock.
///
/// Every mutating operation runs `BEGIN IMMEDIATE → check → mutate →
/// COMMIT` on its own, unless the caller has opened an explicit unit of
/// work with `begin_work()`, in which case statements join that
/// transaction instead.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const TABLES: &[&str] = &[
    "institution",
    "department",
    "person",
    "project",
    "works_in",
    "worked_on",
    "belongs_to",
    "tag",
    "project_tag",
];

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            -- Primary entities
            CREATE TABLE IF NOT EXISTS institution (
                institution_id INTEGER PRIMARY KEY,
                institution_name TEXT NOT NULL UNIQUE,
                institution_type TEXT,
                street TEXT,
                city TEXT,
                state TEXT,
                zipcode TEXT,
                institution_phone TEXT
            );

            -- Department names are globally unique, not unique per
            -- institution (preserved source behavior).
            CREATE TABLE IF NOT EXISTS department (
                department_id INTEGER PRIMARY KEY,
                institution_id INTEGER NOT NULL
                    REFERENCES institution(institution_id) ON DELETE CASCADE,
                department_name TEXT NOT NULL UNIQUE,
                department_email TEXT,
                department_phone TEXT
            );

            -- person_email is soft-unique: UNIQUE permits any number of NULLs.
            CREATE TABLE IF NOT EXISTS person (
                person_id INTEGER PRIMARY KEY,
                person_name TEXT NOT NULL,
                person_email TEXT UNIQUE,
                person_phone TEXT,
                bio TEXT,
                expertise_1 TEXT,
                expertise_2 TEXT,
                expertise_3 TEXT,
                main_field TEXT
            );

            CREATE TABLE IF NOT EXISTS project (
                project_id INTEGER PRIMARY KEY,
                project_title TEXT NOT NULL UNIQUE,
                project_description TEXT,
                project_tag TEXT,
                leadperson_id INTEGER
                    REFERENCES person(person_id) ON DELETE SET NULL,
                start_date TEXT,
                end_date TEXT
            );

            -- Relationship edges
            CREATE TABLE IF NOT EXISTS works_in (
                person_id INTEGER NOT NULL
                    REFERENCES person(person_id) ON DELETE CASCADE,
                department_id INTEGER NOT NULL
                    REFERENCES department(department_id) ON DELETE CASCADE,
                PRIMARY KEY (person_id, department_id)
            );

            CREATE TABLE IF NOT EXISTS worked_on (
                person_id INTEGER NOT NULL
                    REFERENCES person(person_id) ON DELETE CASCADE,
                project_id INTEGER NOT NULL
                    REFERENCES project(project_id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                start_date TEXT,
                end_date TEXT,
                notes TEXT,
                PRIMARY KEY (person_id, project_id)
            );

            CREATE TABLE IF NOT EXISTS belongs_to (
                department_id INTEGER NOT NULL
                    REFERENCES department(department_id) ON DELETE CASCADE,
                institution_id INTEGER NOT NULL
                    REFERENCES institution(institution_id) ON DELETE CASCADE,
                effective_start TEXT NOT NULL,
                effective_end TEXT,
                justification TEXT,
                PRIMARY KEY (department_id, institution_id)
            );

            CREATE TABLE IF NOT EXISTS tag (
                tag_id INTEGER PRIMARY KEY,
                tag_name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS project_tag (
                project_id INTEGER NOT NULL
                    REFERENCES project(project_id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL
                    REFERENCES tag(tag_id) ON DELETE CASCADE,
                PRIMARY KEY (project_id, tag_id)
            );

            -- Enable foreign keys (per-connection setting)
            PRAGMA foreign_keys = ON;

            -- WAL mode: readers don't block on the single writer
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(DEFAULT_LOCK_WAIT)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Bound the lock wait for this handle. Waiters that exceed the bound
    /// get `LockTimeout` instead of blocking indefinitely.
    pub fn set_lock_wait(&self, wait: Duration) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.busy_timeout(wait)?;
        Ok(())
    }

    /// Run `f` inside a transactional unit.
    ///
    /// When the caller has an explicit unit of work open (begin_work),
    /// statements join it and commit/rollback is the caller's job.
    /// Otherwise the mutation gets its own immediate transaction: the
    /// write lock is taken up front so the check-then-mutate sequence
    /// inside `f` is serialized against concurrent writers.
    fn mutate<T>(&self, f: impl FnOnce(&Connection) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self.conn.lock().unwrap();
        if !conn.is_autocommit() {
            return f(&conn);
        }
        conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(&conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                // Best effort: the original error is the one to surface.
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn lookup_id(&self, sql: &str, key: &str) -> StoreResult<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(sql, params![key], |row| row.get(0))
            .optional()?;
        Ok(id)
    }
}

/// Rewrap a generic duplicate-key error with the entity and key that hit it.
fn name_duplicate(err: StoreError, entity: &'static str, key: &str) -> StoreError {
    match err {
        StoreError::DuplicateKey { .. } => StoreError::DuplicateKey {
            entity,
            key: key.to_string(),
        },
        other => other,
    }
}

fn date_to_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.to_string())
}

fn text_to_date(text: Option<String>) -> StoreResult<Option<NaiveDate>> {
    match text {
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| StoreError::DateParse(format!("{}: {}", s, e))),
        None => Ok(None),
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Connection(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }
}

impl Store for SqliteStore {
    // === Unit of work ===

    fn begin_work(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit_work(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_work(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    // === Natural-key lookups ===

    fn institution_id_by_name(&self, name: &str) -> StoreResult<Option<InstitutionId>> {
        Ok(self
            .lookup_id(
                "SELECT institution_id FROM institution WHERE institution_name = ?1",
                name,
            )?
            .map(InstitutionId))
    }

    fn department_id_by_name(&self, name: &str) -> StoreResult<Option<DepartmentId>> {
        Ok(self
            .lookup_id(
                "SELECT department_id FROM department WHERE department_name = ?1",
                name,
            )?
            .map(DepartmentId))
    }

    fn person_id_by_email(&self, email: &str) -> StoreResult<Option<PersonId>> {
        Ok(self
            .lookup_id("SELECT person_id FROM person WHERE person_email = ?1", email)?
            .map(PersonId))
    }

    fn person_id_by_name(&self, name: &str) -> StoreResult<Option<PersonId>> {
        Ok(self
            .lookup_id("SELECT person_id FROM person WHERE person_name = ?1", name)?
            .map(PersonId))
    }

    fn project_id_by_title(&self, title: &str) -> StoreResult<Option<ProjectId>> {
        Ok(self
            .lookup_id("SELECT project_id FROM project WHERE project_title = ?1", title)?
            .map(ProjectId))
    }

    // === Entity creation ===

    fn insert_institution(&self, inst: &NewInstitution) -> StoreResult<InstitutionId> {
        self.mutate(|conn| {
            conn.execute(
                r#"
                INSERT INTO institution
                    (institution_name, institution_type, street, city, state, zipcode, institution_phone)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    inst.name,
                    inst.institution_type,
                    inst.street,
                    inst.city,
                    inst.state,
                    inst.zipcode,
                    inst.phone,
                ],
            )
            .map_err(|e| name_duplicate(e.into(), "institution", &inst.name))?;
            Ok(InstitutionId(conn.last_insert_rowid()))
        })
    }

    fn insert_department(&self, dept: &NewDepartment) -> StoreResult<DepartmentId> {
        self.mutate(|conn| {
            conn.execute(
                r#"
                INSERT INTO department
                    (institution_id, department_name, department_email, department_phone)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![dept.institution.0, dept.name, dept.email, dept.phone],
            )
            .map_err(|e| name_duplicate(e.into(), "department", &dept.name))?;
            Ok(DepartmentId(conn.last_insert_rowid()))
        })
    }

    fn insert_person(&self, person: &NewPerson) -> StoreResult<PersonId> {
        self.mutate(|conn| {
            conn.execute(
                r#"
                INSERT INTO person
                    (person_name, person_email, person_phone, bio,
                     expertise_1, expertise_2, expertise_3, main_field)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    person.name,
                    person.email,
                    person.phone,
                    person.bio,
                    person.expertise[0],
                    person.expertise[1],
                    person.expertise[2],
                    person.main_field,
                ],
            )
            .map_err(|e| {
                name_duplicate(
                    e.into(),
                    "person",
                    person.email.as_deref().unwrap_or(&person.name),
                )
            })?;
            Ok(PersonId(conn.last_insert_rowid()))
        })
    }

    fn insert_project(&self, project: &NewProject) -> StoreResult<ProjectId> {
        self.mutate(|conn| {
            // Deterministic parent check: every concurrent attempt against
            // a missing person fails the same way.
            if let Some(person) = project.lead_person {
                let found: Option<i64> = conn
                    .query_row(
                        "SELECT person_id FROM person WHERE person_id = ?1",
                        params![person.0],
                        |row| row.get(0),
                    )
                    .optional()?;
                if found.is_none() {
                    return Err(StoreError::ReferentialIntegrity(format!(
                        "project '{}' references missing person {}",
                        project.title, person
                    )));
                }
            }
            conn.execute(
                r#"
                INSERT INTO project
                    (project_title, project_description, project_tag, leadperson_id, start_date, end_date)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    project.title,
                    project.description,
                    project.tag,
                    project.lead_person.map(|p| p.0),
                    date_to_text(project.start_date),
                    date_to_text(project.end_date),
                ],
            )
            .map_err(|e| name_duplicate(e.into(), "project", &project.title))?;
            Ok(ProjectId(conn.last_insert_rowid()))
        })
    }

    // === Project mutation ===

    fn get_project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                r#"
                SELECT project_title, project_description, project_tag, leadperson_id, start_date, end_date
                FROM project WHERE project_id = ?1
                "#,
                params![id.0],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((title, description, tag, lead, start, end)) => Ok(Some(Project {
                id,
                title,
                description,
                tag,
                lead_person: lead.map(PersonId),
                start_date: text_to_date(start)?,
                end_date: text_to_date(end)?,
            })),
            None => Ok(None),
        }
    }

    fn update_project(&self, id: ProjectId, update: &ProjectUpdate) -> StoreResult<()> {
        self.mutate(|conn| {
            // The resolving SELECT runs under the write lock, so a row
            // deleted by a competing transaction is seen as gone here.
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT project_id FROM project WHERE project_id = ?1",
                    params![id.0],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound {
                    entity: "project",
                    key: id.to_string(),
                });
            }
            // Whole payload in one statement: no field-level interleaving.
            conn.execute(
                r#"
                UPDATE project
                SET project_title = ?2, project_description = ?3, project_tag = ?4,
                    start_date = ?5, end_date = ?6
                WHERE project_id = ?1
                "#,
                params![
                    id.0,
                    update.title,
                    update.description,
                    update.tag,
                    date_to_text(update.start_date),
                    date_to_text(update.end_date),
                ],
            )
            .map_err(|e| name_duplicate(e.into(), "project", &update.title))?;
            Ok(())
        })
    }

    fn delete_project(&self, id: ProjectId) -> StoreResult<()> {
        self.mutate(|conn| {
            let deleted = conn.execute(
                "DELETE FROM project WHERE project_id = ?1",
                params![id.0],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound {
                    entity: "project",
                    key: id.to_string(),
                });
            }
            Ok(())
        })
    }

    // === Edges ===

    fn link_works_in(&self, person: PersonId, department: DepartmentId) -> StoreResult<bool> {
        self.mutate(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO works_in (person_id, department_id) VALUES (?1, ?2)",
                params![person.0, department.0],
            )?;
            Ok(inserted > 0)
        })
    }

    fn link_worked_on(&self, edge: &WorkedOn) -> StoreResult<bool> {
        self.mutate(|conn| {
            let inserted = conn.execute(
                r#"
                INSERT OR IGNORE INTO worked_on
                    (person_id, project_id, role, start_date, end_date, notes)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    edge.person.0,
                    edge.project.0,
                    edge.role,
                    date_to_text(edge.start_date),
                    date_to_text(edge.end_date),
                    edge.notes,
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    fn link_belongs_to(&self, edge: &BelongsTo) -> StoreResult<()> {
        self.mutate(|conn| {
            conn.execute(
                r#"
                INSERT INTO belongs_to
                    (department_id, institution_id, effective_start, effective_end, justification)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    edge.department.0,
                    edge.institution.0,
                    edge.effective_start.to_string(),
                    date_to_text(edge.effective_end),
                    edge.justification,
                ],
            )
            .map_err(|e| {
                name_duplicate(
                    e.into(),
                    "belongs_to",
                    &format!("({}, {})", edge.department, edge.institution),
                )
            })?;
            Ok(())
        })
    }

    fn get_belongs_to(
        &self,
        department: DepartmentId,
        institution: InstitutionId,
    ) -> StoreResult<Option<BelongsTo>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                r#"
                SELECT effective_start, effective_end, justification
                FROM belongs_to WHERE department_id = ?1 AND institution_id = ?2
                "#,
                params![department.0, institution.0],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((start, end, justification)) => Ok(Some(BelongsTo {
                department,
                institution,
                effective_start: text_to_date(Some(start))?.ok_or_else(|| {
                    StoreError::DateParse("belongs_to.effective_start".to_string())
                })?,
                effective_end: text_to_date(end)?,
                justification,
            })),
            None => Ok(None),
        }
    }

    fn get_worked_on(
        &self,
        person: PersonId,
        project: ProjectId,
    ) -> StoreResult<Option<WorkedOn>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                r#"
                SELECT role, start_date, end_date, notes
                FROM worked_on WHERE person_id = ?1 AND project_id = ?2
                "#,
                params![person.0, project.0],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((role, start, end, notes)) => Ok(Some(WorkedOn {
                person,
                project,
                role,
                start_date: text_to_date(start)?,
                end_date: text_to_date(end)?,
                notes,
            })),
            None => Ok(None),
        }
    }

    fn ensure_tag(&self, name: &str) -> StoreResult<TagId> {
        self.mutate(|conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT tag_id FROM tag WHERE tag_name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                return Ok(TagId(id));
            }
            conn.execute("INSERT INTO tag (tag_name) VALUES (?1)", params![name])
                .map_err(|e| name_duplicate(e.into(), "tag", name))?;
            Ok(TagId(conn.last_insert_rowid()))
        })
    }

    fn tag_project(&self, project: ProjectId, tag: TagId) -> StoreResult<bool> {
        self.mutate(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO project_tag (project_id, tag_id) VALUES (?1, ?2)",
                params![project.0, tag.0],
            )?;
            Ok(inserted > 0)
        })
    }

    // === Reporting ===

    fn row_counts(&self) -> StoreResult<Vec<(&'static str, u64)>> {
        let conn = self.conn.lock().unwrap();
        let mut counts = Vec::with_capacity(TABLES.len());
        for table in TABLES {
            let count: u64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            counts.push((*table, count));
        }
        Ok(counts)
    }
}
