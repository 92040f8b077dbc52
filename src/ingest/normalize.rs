//! Schema normalizer: arbitrary scraper JSON → canonical records
//!
//! Independent scrapers encode the same graph in structurally different
//! shapes: a single `institution` object with sibling `departments`, an
//! `institutions` collection, or a bare top-level list; departments and
//! people each arrive as either a map keyed by name or a list of objects.
//! One tagged-variant parser per observed shape feeds a single canonical
//! `institution → departments → people → projects` form, so shape probing
//! never leaks into the loader.

use crate::model::MAX_TITLE_LEN;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

/// The input document shape was not recognized. The offending record is
/// skipped and reported; a shape problem never aborts a run.
#[derive(Debug, Error)]
#[error("unrecognized document shape: {0}")]
pub struct ShapeError(pub String);

// ============================================================================
// Canonical output
// ============================================================================

/// One fully normalized institution block.
///
/// `name` stays optional here: the loader is the component that decides a
/// nameless block is a reportable skip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalInstitution {
    pub name: Option<String>,
    pub institution_type: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zipcode: Option<String>,
    pub phone: Option<String>,
    pub departments: Vec<CanonicalDepartment>,
}

/// A department with its name resolved (from a field, a map key, or a
/// positional fallback). Departments with zero people are still emitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalDepartment {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub people: Vec<CanonicalPerson>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalPerson {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub expertise: [Option<String>; 3],
    pub main_field: Option<String>,
    /// Person-level role, used as a fallback for WorkedOn edges.
    pub role: Option<String>,
    pub projects: Vec<CanonicalProject>,
}

/// A project as scraped. Dates stay raw strings here; the loader applies
/// [`normalize_start_date`]/[`normalize_end_date`] when it decides whether
/// the record meets the minimum-field requirement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalProject {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Primary tag.
    pub tag: Option<String>,
    /// Secondary tags.
    pub tags: Vec<String>,
    /// Project-level role, first choice for the WorkedOn edge.
    pub role: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

// ============================================================================
// Raw input shapes
// ============================================================================

/// A date as scrapers emit it: an ISO string, a bare year string, or a
/// bare year number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawDate {
    Text(String),
    Year(i64),
}

impl RawDate {
    fn into_text(self) -> String {
        match self {
            RawDate::Text(s) => s,
            RawDate::Year(y) => y.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDocument {
    /// `{"institutions": [...]}` — unified multi-institution exports
    Collection { institutions: Vec<RawInstitution> },
    /// `{"institution": {...}, "departments": ...}` — single-institution
    /// exports with departments as a sibling key
    Single {
        institution: RawInstitution,
        #[serde(default)]
        departments: Option<RawDepartments>,
    },
    /// Bare top-level list of institution objects
    List(Vec<RawInstitution>),
}

#[derive(Debug, Default, Deserialize)]
struct RawInstitution {
    institution_name: Option<String>,
    institution_type: Option<String>,
    street: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zipcode: Option<String>,
    institution_phone: Option<String>,
    #[serde(default)]
    departments: Option<RawDepartments>,
}

/// Departments arrive as a map keyed by name or as a list of objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDepartments {
    Map(IndexMap<String, RawDepartment>),
    List(Vec<RawDepartment>),
}

#[derive(Debug, Default, Deserialize)]
struct RawDepartment {
    department_name: Option<String>,
    department_email: Option<String>,
    department_phone: Option<String>,
    #[serde(default)]
    people: Option<RawPeople>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPeople {
    Map(IndexMap<String, RawPerson>),
    List(Vec<RawPerson>),
}

#[derive(Debug, Default, Deserialize)]
struct RawPerson {
    person_name: Option<String>,
    person_email: Option<String>,
    person_phone: Option<String>,
    bio: Option<String>,
    expertise_1: Option<String>,
    expertise_2: Option<String>,
    expertise_3: Option<String>,
    main_field: Option<String>,
    #[serde(alias = "project_role")]
    role: Option<String>,
    #[serde(default)]
    projects: Vec<RawProject>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProject {
    #[serde(alias = "title")]
    project_title: Option<String>,
    #[serde(alias = "description")]
    project_description: Option<String>,
    #[serde(alias = "project_tag")]
    project_tags: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(alias = "role")]
    project_role: Option<String>,
    start_date: Option<RawDate>,
    end_date: Option<RawDate>,
}

// ============================================================================
// Normalization
// ============================================================================

/// Canonicalize one arbitrary JSON document into institution records.
///
/// Returns `ShapeError` only when the document matches none of the known
/// shapes; missing names inside a recognized shape fall back to map keys
/// or positional synthetic keys instead.
pub fn normalize_document(doc: &serde_json::Value) -> Result<Vec<CanonicalInstitution>, ShapeError> {
    let raw = RawDocument::deserialize(doc).map_err(|e| ShapeError(e.to_string()))?;
    let institutions = match raw {
        RawDocument::Collection { institutions } => institutions
            .into_iter()
            .map(|inst| canonical_institution(inst, None))
            .collect(),
        RawDocument::Single {
            institution,
            departments,
        } => vec![canonical_institution(institution, departments)],
        RawDocument::List(institutions) => institutions
            .into_iter()
            .map(|inst| canonical_institution(inst, None))
            .collect(),
    };
    Ok(institutions)
}

fn canonical_institution(
    mut raw: RawInstitution,
    sibling_departments: Option<RawDepartments>,
) -> CanonicalInstitution {
    // A nested departments key wins over a sibling one.
    let departments = raw.departments.take().or(sibling_departments);
    CanonicalInstitution {
        name: non_empty(raw.institution_name),
        institution_type: non_empty(raw.institution_type),
        street: non_empty(raw.street),
        city: non_empty(raw.city),
        state: non_empty(raw.state),
        zipcode: non_empty(raw.zipcode),
        phone: non_empty(raw.institution_phone),
        departments: canonical_departments(departments),
    }
}

fn canonical_departments(raw: Option<RawDepartments>) -> Vec<CanonicalDepartment> {
    match raw {
        Some(RawDepartments::Map(map)) => map
            .into_iter()
            .map(|(key, dept)| {
                // Map keys are the names unless the object carries its own.
                let name = non_empty(dept.department_name.clone()).unwrap_or(key);
                canonical_department(dept, name)
            })
            .collect(),
        Some(RawDepartments::List(list)) => list
            .into_iter()
            .enumerate()
            .map(|(idx, dept)| {
                let name = non_empty(dept.department_name.clone())
                    .or_else(|| non_empty(dept.department_email.clone()))
                    .unwrap_or_else(|| format!("department-{}", idx + 1));
                canonical_department(dept, name)
            })
            .collect(),
        None => Vec::new(),
    }
}

fn canonical_department(raw: RawDepartment, name: String) -> CanonicalDepartment {
    CanonicalDepartment {
        name,
        email: non_empty(raw.department_email),
        phone: non_empty(raw.department_phone),
        people: canonical_people(raw.people),
    }
}

fn canonical_people(raw: Option<RawPeople>) -> Vec<CanonicalPerson> {
    match raw {
        Some(RawPeople::Map(map)) => map
            .into_iter()
            .map(|(key, person)| {
                let name = non_empty(person.person_name.clone()).unwrap_or(key);
                canonical_person(person, name)
            })
            .collect(),
        Some(RawPeople::List(list)) => list
            .into_iter()
            .enumerate()
            .map(|(idx, person)| {
                let name = non_empty(person.person_name.clone())
                    .unwrap_or_else(|| format!("person-{}", idx + 1));
                canonical_person(person, name)
            })
            .collect(),
        None => Vec::new(),
    }
}

fn canonical_person(raw: RawPerson, name: String) -> CanonicalPerson {
    CanonicalPerson {
        name,
        email: non_empty(raw.person_email),
        phone: non_empty(raw.person_phone),
        bio: non_empty(raw.bio),
        expertise: [
            non_empty(raw.expertise_1),
            non_empty(raw.expertise_2),
            non_empty(raw.expertise_3),
        ],
        main_field: non_empty(raw.main_field),
        role: non_empty(raw.role),
        projects: raw.projects.into_iter().map(canonical_project).collect(),
    }
}

fn canonical_project(raw: RawProject) -> CanonicalProject {
    CanonicalProject {
        title: non_empty(raw.project_title),
        description: non_empty(raw.project_description),
        tag: non_empty(raw.project_tags),
        tags: raw
            .tags
            .into_iter()
            .filter_map(|t| non_empty(Some(t)))
            .collect(),
        role: non_empty(raw.project_role),
        start_date: raw.start_date.map(RawDate::into_text),
        end_date: raw.end_date.map(RawDate::into_text),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

// ============================================================================
// Field normalization
// ============================================================================

/// Normalize a start date: a bare 4-digit year becomes January 1 of that
/// year; full ISO dates pass through. Unparseable input yields `None`.
pub fn normalize_start_date(raw: &str) -> Option<NaiveDate> {
    normalize_date(raw, 1, 1)
}

/// Normalize an end date: a bare 4-digit year becomes December 31 of that
/// year; full ISO dates pass through. Unparseable input yields `None`.
pub fn normalize_end_date(raw: &str) -> Option<NaiveDate> {
    normalize_date(raw, 12, 31)
}

fn normalize_date(raw: &str, month: u32, day: u32) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.len() == 4 && raw.chars().all(|c| c.is_ascii_digit()) {
        let year: i32 = raw.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Normalize a phone number to bare digits. Anything that normalizes to
/// more than 15 digits is scraper noise and is dropped.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() > 15 {
        None
    } else {
        Some(digits)
    }
}

/// Truncate a project title to the persisted column width, on a char
/// boundary. Applied before insertion and before natural-key comparison.
pub fn truncate_title(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(MAX_TITLE_LEN) {
        Some((idx, _)) => trimmed[..idx].to_string(),
        None => trimmed.to_string(),
    }
}
