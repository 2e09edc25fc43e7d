//! Workflows over the three record collections and the assignment tree.
//!
//! Each operation reloads what it touches, applies its change in memory,
//! moves files, then writes every touched document back. Documents are
//! written children first (assignments, courses, semesters).

use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backup::{self, BundleEntry};
use crate::cloud::{CloudBackend, NoCloud};
use crate::config::{self, Settings};
use crate::error::{CascadeError, MigrationError, MigrationStep};
use crate::guard::{EditGuard, EditToken, EntityKind, SessionState};
use crate::hierarchy::{next_id, sort_by_year_then_month};
use crate::migrate;
use crate::model::{
    Assignment, CloudBackup, Course, Record, Semester, SemesterKey, NO_CLOUD_URL,
};
use crate::propagate;
use crate::store;
use crate::validate;

/// Result of a committed change plus any files that could not be moved.
#[derive(Debug)]
pub struct Saved<T> {
    pub record: T,
    pub migration_failures: Vec<MigrationError>,
}

impl<T> Saved<T> {
    fn clean(record: T) -> Self {
        Self {
            record,
            migration_failures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SemesterRef {
    /// Display label, `"<Season> <YYYY>"`.
    Label(String),
    Id(i64),
}

#[derive(Debug, Clone)]
pub enum CourseRef {
    Id(i64),
    Code(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterRow {
    #[serde(flatten)]
    pub semester: Semester,
    pub label: String,
    pub course_count: usize,
    pub deletable: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRow {
    #[serde(flatten)]
    pub course: Course,
    pub label: String,
    pub assignment_count: usize,
    pub deletable: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub semesters: usize,
    pub courses: usize,
    pub assignments: usize,
    pub assignment_root: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentFile {
    pub id: i64,
    pub path: PathBuf,
    pub exists: bool,
    pub cloud_url: Option<String>,
}

#[derive(Debug)]
pub struct RelocationReport {
    pub from: PathBuf,
    pub to: PathBuf,
    pub unchanged: bool,
    pub moved: usize,
    pub old_root_removed: bool,
    pub migration_failures: Vec<MigrationError>,
}

#[derive(Debug)]
pub struct ExportReport {
    pub bundle_format: String,
    pub entry_count: usize,
    /// Assignments whose file was missing (or clashed) and was left out.
    pub skipped: Vec<i64>,
}

#[derive(Debug)]
pub struct ImportReport {
    pub bundle_format: String,
    pub entry_count: usize,
    pub semesters: usize,
    pub courses: usize,
    pub assignments: usize,
    /// Assignments restored without a backing file.
    pub missing_files: Vec<i64>,
    /// Replaced assignments whose files were deleted from the current root.
    pub removed_files: Vec<i64>,
}

pub struct Cascade {
    settings_path: PathBuf,
    settings: Settings,
    guard: EditGuard,
    cloud: Box<dyn CloudBackend>,
    current_year: Option<i32>,
}

impl Cascade {
    pub fn open(settings_path: &Path) -> Result<Self, CascadeError> {
        let settings = config::load_settings(settings_path)?;
        Ok(Self::new(settings_path.to_path_buf(), settings))
    }

    pub fn new(settings_path: PathBuf, settings: Settings) -> Self {
        Self {
            settings_path,
            settings,
            guard: EditGuard::new(),
            cloud: Box::new(NoCloud),
            current_year: None,
        }
    }

    #[cfg(test)]
    pub fn with_cloud(mut self, cloud: Box<dyn CloudBackend>) -> Self {
        self.cloud = cloud;
        self
    }

    #[cfg(test)]
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = Some(year);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    pub fn session_state(&self, kind: EntityKind) -> SessionState {
        self.guard.state(kind)
    }

    fn current_year(&self) -> i32 {
        self.current_year.unwrap_or_else(validate::current_year)
    }

    fn assignment_root(&self) -> &Path {
        &self.settings.assignment_root_folder
    }

    fn load_semesters(&self) -> Result<Vec<Semester>, CascadeError> {
        Ok(store::load(&self.settings.semesters_path())?)
    }

    fn load_courses(&self) -> Result<Vec<Course>, CascadeError> {
        Ok(store::load(&self.settings.courses_path())?)
    }

    fn load_assignments(&self) -> Result<Vec<Assignment>, CascadeError> {
        Ok(store::load(&self.settings.assignments_path())?)
    }

    fn save_semesters(&self, records: &[Semester]) -> Result<(), CascadeError> {
        Ok(store::save(&self.settings.semesters_path(), records)?)
    }

    fn save_courses(&self, records: &[Course]) -> Result<(), CascadeError> {
        Ok(store::save(&self.settings.courses_path(), records)?)
    }

    fn save_assignments(&self, records: &[Assignment]) -> Result<(), CascadeError> {
        Ok(store::save(&self.settings.assignments_path(), records)?)
    }

    // ---- semesters -------------------------------------------------------

    /// Adds a semester, or with a session token updates the one being edited.
    pub fn add_or_update_semester(
        &mut self,
        season: &str,
        year: &str,
        session: Option<EditToken>,
    ) -> Result<Saved<Semester>, CascadeError> {
        match session {
            Some(token) => self.update_semester(token, season, year),
            None => self.add_semester(season, year).map(Saved::clean),
        }
    }

    pub fn add_semester(&mut self, season: &str, year: &str) -> Result<Semester, CascadeError> {
        let (season, year) = validate::semester_input(season, year, self.current_year())?;
        let mut semesters = self.load_semesters()?;
        if semesters.iter().any(|s| s.season == season && s.year == year) {
            return Err(CascadeError::Duplicate {
                what: format!("Semester {season} {year}"),
            });
        }
        let semester = Semester::new(next_id(&semesters), year, season);
        semesters.push(semester.clone());
        sort_by_year_then_month(&mut semesters);
        self.save_semesters(&semesters)?;
        info!(id = semester.id, label = %semester.label(), "semester added");
        Ok(semester)
    }

    pub fn begin_semester_edit(&mut self, id: i64) -> Result<(EditToken, Semester), CascadeError> {
        self.guard.ensure_idle(&[EntityKind::Semester])?;
        let semesters = self.load_semesters()?;
        let semester = store::find_by_id(&semesters, id)
            .cloned()
            .ok_or(CascadeError::UnknownRecord {
                kind: "semester",
                id,
            })?;
        let token = self.guard.begin_edit(EntityKind::Semester, id)?;
        Ok((token, semester))
    }

    pub fn update_semester(
        &mut self,
        token: EditToken,
        season: &str,
        year: &str,
    ) -> Result<Saved<Semester>, CascadeError> {
        let kind = EntityKind::Semester;
        let id = self.guard.editing_record(kind, token)?;
        let (season, year) = validate::semester_input(season, year, self.current_year())?;
        self.guard.advance(kind, token, SessionState::Confirming)?;
        self.guard.advance(kind, token, SessionState::Persisting)?;

        let result = self.commit_semester_update(id, Semester::new(id, year, season));
        self.settle(kind, token, &result);
        result
    }

    fn commit_semester_update(
        &self,
        id: i64,
        new: Semester,
    ) -> Result<Saved<Semester>, CascadeError> {
        let mut semesters = self.load_semesters()?;
        let courses = self.load_courses()?;
        let assignments = self.load_assignments()?;

        if semesters
            .iter()
            .any(|s| s.id != id && s.season == new.season && s.year == new.year)
        {
            return Err(CascadeError::Duplicate {
                what: format!("Semester {}", new.label()),
            });
        }
        let pos = store::position_by_id(&semesters, id).ok_or(CascadeError::UnknownRecord {
            kind: "semester",
            id,
        })?;
        let old = semesters[pos].clone();

        let (courses, mut assignments) =
            propagate::propagate_semester_change(&old, &new, courses, assignments);
        let failures = if propagate::semester_moves_files(&old, &new) {
            let root = self.assignment_root();
            migrate::migrate_batch(&mut assignments, |a| a.semester_id == id, root, root)
        } else {
            Vec::new()
        };

        semesters[pos] = new.clone();
        sort_by_year_then_month(&mut semesters);

        self.save_assignments(&assignments)?;
        self.save_courses(&courses)?;
        self.save_semesters(&semesters)?;

        info!(
            id,
            from = %old.label(),
            to = %new.label(),
            migration_failures = failures.len(),
            "semester updated"
        );
        Ok(Saved {
            record: new,
            migration_failures: failures,
        })
    }

    pub fn delete_semester(&mut self, id: i64) -> Result<Semester, CascadeError> {
        let kind = EntityKind::Semester;
        self.guard.ensure_idle(&[kind])?;
        let mut semesters = self.load_semesters()?;
        let courses = self.load_courses()?;
        let pos = store::position_by_id(&semesters, id).ok_or(CascadeError::UnknownRecord {
            kind: "semester",
            id,
        })?;
        let count = store::count_by(&courses, |c| c.semester_id == id);
        if count > 0 {
            return Err(CascadeError::DependentRecords {
                kind,
                id,
                count,
                dependents: "courses",
            });
        }

        let removed = semesters.remove(pos);
        self.persist_delete(kind, id, |this| this.save_semesters(&semesters))?;
        info!(id, label = %removed.label(), "semester deleted");
        Ok(removed)
    }

    // ---- courses ---------------------------------------------------------

    pub fn add_or_update_course(
        &mut self,
        semester: Option<&SemesterRef>,
        code: &str,
        name: &str,
        session: Option<EditToken>,
    ) -> Result<Saved<Course>, CascadeError> {
        match session {
            Some(token) => self.update_course(token, semester, code, name),
            None => self.add_course(semester, code, name).map(Saved::clean),
        }
    }

    fn resolve_semester(
        semesters: &[Semester],
        semester: Option<&SemesterRef>,
    ) -> Option<Semester> {
        match semester? {
            SemesterRef::Label(label) => {
                let key = SemesterKey::parse(label)?;
                store::find_by(semesters, |s| key.matches(s)).cloned()
            }
            SemesterRef::Id(id) => store::find_by_id(semesters, *id).cloned(),
        }
    }

    fn course_input(
        &self,
        semester: Option<&SemesterRef>,
        code: &str,
        name: &str,
    ) -> Result<(Semester, String, String), CascadeError> {
        let semesters = self.load_semesters()?;
        let resolved = Self::resolve_semester(&semesters, semester);
        let (code, name) = validate::course_input(resolved.is_some(), code, name)?;
        match resolved {
            Some(s) => Ok((s, code, name)),
            None => Err(CascadeError::validation("Select a Semester.")),
        }
    }

    fn course_in(id: i64, semester: &Semester, code: String, name: String) -> Course {
        Course {
            id,
            semester_id: semester.id,
            season: semester.season,
            year: semester.year.clone(),
            month: semester.month,
            course_code: code,
            course_name: name,
        }
    }

    pub fn add_course(
        &mut self,
        semester: Option<&SemesterRef>,
        code: &str,
        name: &str,
    ) -> Result<Course, CascadeError> {
        let (semester, code, name) = self.course_input(semester, code, name)?;
        let mut courses = self.load_courses()?;
        if courses.iter().any(|c| {
            c.course_code == code && c.course_name == name && c.semester_id == semester.id
        }) {
            return Err(CascadeError::Duplicate {
                what: format!("Course {code} {name} in {}", semester.label()),
            });
        }
        let course = Self::course_in(next_id(&courses), &semester, code, name);
        courses.push(course.clone());
        sort_by_year_then_month(&mut courses);
        self.save_courses(&courses)?;
        info!(id = course.id, label = %course.label(), "course added");
        Ok(course)
    }

    pub fn begin_course_edit(&mut self, id: i64) -> Result<(EditToken, Course), CascadeError> {
        self.guard.ensure_idle(&[EntityKind::Course])?;
        let courses = self.load_courses()?;
        let course = store::find_by_id(&courses, id)
            .cloned()
            .ok_or(CascadeError::UnknownRecord { kind: "course", id })?;
        let token = self.guard.begin_edit(EntityKind::Course, id)?;
        Ok((token, course))
    }

    pub fn update_course(
        &mut self,
        token: EditToken,
        semester: Option<&SemesterRef>,
        code: &str,
        name: &str,
    ) -> Result<Saved<Course>, CascadeError> {
        let kind = EntityKind::Course;
        let id = self.guard.editing_record(kind, token)?;
        let (semester, code, name) = self.course_input(semester, code, name)?;
        self.guard.advance(kind, token, SessionState::Confirming)?;
        self.guard.advance(kind, token, SessionState::Persisting)?;

        let result = self.commit_course_update(Self::course_in(id, &semester, code, name));
        self.settle(kind, token, &result);
        result
    }

    fn commit_course_update(&self, new: Course) -> Result<Saved<Course>, CascadeError> {
        let id = new.id;
        let mut courses = self.load_courses()?;
        let assignments = self.load_assignments()?;

        if courses.iter().any(|c| {
            c.id != id
                && c.course_code == new.course_code
                && c.course_name == new.course_name
                && c.semester_id == new.semester_id
        }) {
            return Err(CascadeError::Duplicate {
                what: format!("Course {} {}", new.course_code, new.course_name),
            });
        }
        let pos = store::position_by_id(&courses, id)
            .ok_or(CascadeError::UnknownRecord { kind: "course", id })?;
        let old = courses[pos].clone();

        let mut assignments = propagate::propagate_course_change(&old, &new, assignments);
        let failures = if propagate::course_moves_files(&old, &new) {
            let root = self.assignment_root();
            migrate::migrate_batch(&mut assignments, |a| a.course_id == id, root, root)
        } else {
            Vec::new()
        };

        courses[pos] = new.clone();
        sort_by_year_then_month(&mut courses);

        self.save_assignments(&assignments)?;
        self.save_courses(&courses)?;

        info!(
            id,
            from = %old.label(),
            to = %new.label(),
            migration_failures = failures.len(),
            "course updated"
        );
        Ok(Saved {
            record: new,
            migration_failures: failures,
        })
    }

    pub fn delete_course(&mut self, id: i64) -> Result<Course, CascadeError> {
        let kind = EntityKind::Course;
        self.guard.ensure_idle(&[kind])?;
        let mut courses = self.load_courses()?;
        let assignments = self.load_assignments()?;
        let pos = store::position_by_id(&courses, id)
            .ok_or(CascadeError::UnknownRecord { kind: "course", id })?;
        let code = courses[pos].course_code.clone();
        let count = store::count_by(&assignments, |a| a.course_code == code);
        if count > 0 {
            return Err(CascadeError::DependentRecords {
                kind,
                id,
                count,
                dependents: "assignments",
            });
        }

        let removed = courses.remove(pos);
        self.persist_delete(kind, id, |this| this.save_courses(&courses))?;
        info!(id, label = %removed.label(), "course deleted");
        Ok(removed)
    }

    pub fn cancel_edit(&mut self, kind: EntityKind, token: EditToken) -> Result<(), CascadeError> {
        self.guard.cancel(kind, token)
    }

    /// Rejected submissions go back to Editing; anything else ends the session.
    fn settle<T>(&mut self, kind: EntityKind, token: EditToken, result: &Result<T, CascadeError>) {
        match result {
            Err(CascadeError::Duplicate { .. }) | Err(CascadeError::Validation { .. }) => {
                self.guard.reopen(kind, token)
            }
            _ => self.guard.finish(kind, token),
        }
    }

    fn persist_delete<F>(&mut self, kind: EntityKind, id: i64, write: F) -> Result<(), CascadeError>
    where
        F: FnOnce(&Self) -> Result<(), CascadeError>,
    {
        let token = self.guard.begin_delete(kind, id)?;
        let result = match self.guard.advance(kind, token, SessionState::Persisting) {
            Ok(()) => write(self),
            Err(e) => Err(e),
        };
        self.guard.finish(kind, token);
        result
    }

    // ---- assignments -----------------------------------------------------

    pub fn upload_assignment(
        &mut self,
        course: Option<&CourseRef>,
        name: &str,
        source: Option<&Path>,
        cloud_backup: bool,
    ) -> Result<Assignment, CascadeError> {
        let courses = self.load_courses()?;
        let resolved = match course {
            Some(CourseRef::Id(id)) => store::find_by_id(&courses, *id).cloned(),
            Some(CourseRef::Code(code)) => {
                store::find_by(&courses, |c| c.course_code == code.trim()).cloned()
            }
            None => None,
        };
        let name = validate::upload_input(resolved.is_some(), name, source)?;
        let (course, source) = match (resolved, source) {
            (Some(c), Some(s)) => (c, s),
            _ => return Err(CascadeError::validation("Select a course.")),
        };
        let mut assignments = self.load_assignments()?;

        let dest_dir = migrate::assignment_dir(
            self.assignment_root(),
            &course.year,
            course.season,
            &course.course_code,
        );
        let file = migrate::place_upload(source, &dest_dir)?;

        let cloud_file_url = if cloud_backup {
            match self.cloud.upload(&file) {
                Ok(url) => url.unwrap_or_else(|| NO_CLOUD_URL.to_string()),
                Err(e) => {
                    self.discard_upload(&file);
                    return Err(e.into());
                }
            }
        } else {
            NO_CLOUD_URL.to_string()
        };

        let record = Assignment {
            id: next_id(&assignments),
            course_id: course.id,
            semester_id: course.semester_id,
            name,
            file,
            course_name: course.course_name.clone(),
            course_code: course.course_code.clone(),
            year: course.year.clone(),
            season: course.season,
            month: course.month,
            cloud_backup: if cloud_backup {
                CloudBackup::Yes
            } else {
                CloudBackup::No
            },
            cloud_file_url,
        };
        assignments.push(record.clone());
        sort_by_year_then_month(&mut assignments);
        if let Err(e) = self.save_assignments(&assignments) {
            self.discard_upload(&record.file);
            return Err(e);
        }

        info!(
            id = record.id,
            course = %course.label(),
            file = %record.file.display(),
            "assignment uploaded"
        );
        Ok(record)
    }

    fn discard_upload(&self, file: &Path) {
        if let Err(e) = fs::remove_file(file) {
            warn!(file = %file.display(), error = %e, "failed to discard uploaded copy");
        }
        if let Some(parent) = file.parent() {
            migrate::remove_empty_assignment_dir(parent, self.assignment_root());
        }
    }

    pub fn delete_assignment(&mut self, id: i64) -> Result<Assignment, CascadeError> {
        let mut assignments = self.load_assignments()?;
        let pos = store::position_by_id(&assignments, id).ok_or(CascadeError::UnknownRecord {
            kind: "assignment",
            id,
        })?;
        let record = assignments[pos].clone();

        if record.cloud_backup == CloudBackup::Yes {
            self.cloud.delete(&record.cloud_file_url)?;
        }
        let removed_file = migrate::remove_assignment_file(&record, self.assignment_root())?;
        assignments.remove(pos);
        self.save_assignments(&assignments)?;

        info!(id, removed_file, "assignment deleted");
        Ok(record)
    }

    pub fn assignment_file(&self, id: i64) -> Result<AssignmentFile, CascadeError> {
        let assignments = self.load_assignments()?;
        let record = store::find_by_id(&assignments, id).ok_or(CascadeError::UnknownRecord {
            kind: "assignment",
            id,
        })?;
        Ok(AssignmentFile {
            id,
            path: record.file.clone(),
            exists: record.file.is_file(),
            cloud_url: record.cloud_url().map(str::to_string),
        })
    }

    // ---- aggregates ------------------------------------------------------

    pub fn assignment_count(&self, course_code: &str) -> Result<usize, CascadeError> {
        let assignments = self.load_assignments()?;
        Ok(store::count_by(&assignments, |a| a.course_code == course_code))
    }

    pub fn course_count_for_semester(&self, semester_id: i64) -> Result<usize, CascadeError> {
        let courses = self.load_courses()?;
        Ok(store::count_by(&courses, |c| c.semester_id == semester_id))
    }

    pub fn list_semesters(&self) -> Result<Vec<SemesterRow>, CascadeError> {
        let semesters = self.load_semesters()?;
        let courses = self.load_courses()?;
        Ok(semesters
            .into_iter()
            .map(|semester| {
                let course_count = store::count_by(&courses, |c| c.semester_id == semester.id);
                SemesterRow {
                    label: semester.label(),
                    semester,
                    course_count,
                    deletable: course_count == 0,
                }
            })
            .collect())
    }

    pub fn list_courses(&self) -> Result<Vec<CourseRow>, CascadeError> {
        let courses = self.load_courses()?;
        let assignments = self.load_assignments()?;
        Ok(courses
            .into_iter()
            .map(|course| {
                let assignment_count =
                    store::count_by(&assignments, |a| a.course_code == course.course_code);
                CourseRow {
                    label: course.label(),
                    course,
                    assignment_count,
                    deletable: assignment_count == 0,
                }
            })
            .collect())
    }

    pub fn list_assignments(&self) -> Result<Vec<Assignment>, CascadeError> {
        self.load_assignments()
    }

    pub fn summary(&self) -> Result<Summary, CascadeError> {
        Ok(Summary {
            semesters: self.load_semesters()?.len(),
            courses: self.load_courses()?.len(),
            assignments: self.load_assignments()?.len(),
            assignment_root: self.settings.assignment_root_folder.clone(),
        })
    }

    // ---- assignment root -------------------------------------------------

    pub fn change_assignment_root(
        &mut self,
        new_root: &Path,
    ) -> Result<RelocationReport, CascadeError> {
        self.guard
            .ensure_idle(&[EntityKind::Semester, EntityKind::Course])?;
        let old_root = self.settings.assignment_root_folder.clone();
        let mut report = RelocationReport {
            from: old_root.clone(),
            to: new_root.to_path_buf(),
            unchanged: new_root == old_root,
            moved: 0,
            old_root_removed: false,
            migration_failures: Vec::new(),
        };
        if report.unchanged {
            return Ok(report);
        }
        if !new_root.is_absolute() {
            return Err(CascadeError::validation(
                "The assignment folder must be an absolute path.",
            ));
        }
        if new_root.starts_with(&old_root) {
            return Err(CascadeError::validation(
                "The new assignment folder cannot be inside the current one.",
            ));
        }

        let mut assignments = self.load_assignments()?;
        fs::create_dir_all(new_root)
            .map_err(|e| MigrationError::new(None, MigrationStep::CreateDir, new_root, e))?;
        report.migration_failures =
            migrate::migrate_batch(&mut assignments, |_| true, &old_root, new_root);
        report.moved = assignments
            .len()
            .saturating_sub(report.migration_failures.len());

        let old_root_empty = fs::read_dir(&old_root)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if old_root_empty {
            report.old_root_removed = fs::remove_dir(&old_root).is_ok();
        }

        self.save_assignments(&assignments)?;
        let mut settings = self.settings.clone();
        settings.assignment_root_folder = new_root.to_path_buf();
        config::save_settings(&self.settings_path, &settings)?;
        self.settings = settings;

        info!(
            from = %old_root.display(),
            to = %new_root.display(),
            moved = report.moved,
            migration_failures = report.migration_failures.len(),
            "assignment root changed"
        );
        Ok(report)
    }

    pub fn reset_assignment_root(&mut self) -> Result<RelocationReport, CascadeError> {
        let default_root = self.settings.default_assignment_root_folder.clone();
        self.change_assignment_root(&default_root)
    }

    // ---- backup ----------------------------------------------------------

    pub fn export_backup(&self, out_path: &Path) -> Result<ExportReport, CascadeError> {
        // Parse all three first so a corrupt document is not archived.
        self.load_semesters()?;
        self.load_courses()?;
        let assignments = self.load_assignments()?;

        let mut entries = vec![
            BundleEntry {
                name: "data/semesters.json".into(),
                source: self.settings.semesters_path(),
            },
            BundleEntry {
                name: "data/courses.json".into(),
                source: self.settings.courses_path(),
            },
            BundleEntry {
                name: "data/assignments.json".into(),
                source: self.settings.assignments_path(),
            },
        ];
        let mut skipped = Vec::new();
        for a in &assignments {
            let name = match bundle_file_name(a) {
                Some(name) if a.file.is_file() => name,
                _ => {
                    skipped.push(a.id);
                    continue;
                }
            };
            if entries.iter().any(|e| e.name == name) {
                skipped.push(a.id);
                continue;
            }
            entries.push(BundleEntry {
                name,
                source: a.file.clone(),
            });
        }
        if !skipped.is_empty() {
            warn!(?skipped, "assignment files left out of backup");
        }

        let summary = backup::export_bundle(&entries, out_path).map_err(CascadeError::Backup)?;
        info!(
            out = %out_path.display(),
            entries = summary.entry_count,
            "backup exported"
        );
        Ok(ExportReport {
            bundle_format: summary.bundle_format,
            entry_count: summary.entry_count,
            skipped,
        })
    }

    /// Replaces all three documents from a bundle and restores the files
    /// into the current assignment root.
    pub fn import_backup(&mut self, in_path: &Path) -> Result<ImportReport, CascadeError> {
        self.guard
            .ensure_idle(&[EntityKind::Semester, EntityKind::Course])?;
        let staging = self
            .settings
            .config_root_folder
            .join(format!(".restore-{}", Uuid::new_v4()));
        let result = self.restore_from(in_path, &staging);
        let _ = fs::remove_dir_all(&staging);
        result
    }

    fn restore_from(&self, in_path: &Path, staging: &Path) -> Result<ImportReport, CascadeError> {
        let summary = backup::import_bundle(in_path, staging).map_err(CascadeError::Backup)?;
        let data = staging.join("data");
        let mut semesters: Vec<Semester> = store::load(&data.join("semesters.json"))?;
        let mut courses: Vec<Course> = store::load(&data.join("courses.json"))?;
        let mut assignments: Vec<Assignment> = store::load(&data.join("assignments.json"))?;

        let problems = propagate::hierarchy_problems(&semesters, &courses, &assignments);
        if !problems.is_empty() {
            warn!(bundle = %in_path.display(), ?problems, "backup rejected");
            return Err(CascadeError::Inconsistent { problems });
        }

        let root = self.assignment_root();
        let mut staged_files = Vec::with_capacity(assignments.len());
        for a in assignments.iter_mut() {
            let staged = bundle_file_name(a)
                .map(|name| staging.join(name))
                .filter(|p| p.is_file());
            if let Some(stored) = a.stored_file_name().map(str::to_string) {
                a.file = migrate::expected_dir(a, root).join(stored);
            }
            staged_files.push(staged);
        }

        let kept: HashSet<&Path> = assignments.iter().map(|a| a.file.as_path()).collect();
        let removed_files = self.remove_replaced_files(&kept)?;

        let mut missing_files = Vec::new();
        for (a, staged) in assignments.iter().zip(&staged_files) {
            let Some(staged) = staged else {
                missing_files.push(a.id);
                continue;
            };
            if let Some(dest_dir) = a.file.parent() {
                fs::create_dir_all(dest_dir).map_err(|e| {
                    MigrationError::new(Some(a.id), MigrationStep::CreateDir, dest_dir, e)
                })?;
            }
            migrate::copy_verified(staged, &a.file).map_err(|mut e| {
                e.assignment_id = Some(a.id);
                e
            })?;
        }

        sort_by_year_then_month(&mut semesters);
        sort_by_year_then_month(&mut courses);
        sort_by_year_then_month(&mut assignments);
        self.save_assignments(&assignments)?;
        self.save_courses(&courses)?;
        self.save_semesters(&semesters)?;

        if !missing_files.is_empty() {
            warn!(?missing_files, "restored assignments without files");
        }
        info!(
            bundle = %in_path.display(),
            semesters = semesters.len(),
            courses = courses.len(),
            assignments = assignments.len(),
            removed_files = removed_files.len(),
            "backup restored"
        );
        Ok(ImportReport {
            bundle_format: summary.bundle_format_detected,
            entry_count: summary.entry_count,
            semesters: semesters.len(),
            courses: courses.len(),
            assignments: assignments.len(),
            missing_files,
            removed_files,
        })
    }

    /// Deletes the files of current assignments that the restored set does
    /// not point at. Returns the ids whose file went away.
    fn remove_replaced_files(&self, kept: &HashSet<&Path>) -> Result<Vec<i64>, CascadeError> {
        let current = self.load_assignments()?;
        let mut removed = Vec::new();
        for record in current.iter().filter(|a| !kept.contains(a.file.as_path())) {
            match migrate::remove_assignment_file(record, self.assignment_root()) {
                Ok(true) => removed.push(record.id),
                Ok(false) => {}
                Err(e) => warn!(
                    assignment_id = record.id,
                    path = %e.path.display(),
                    error = %e.source,
                    "could not remove file of replaced assignment"
                ),
            }
        }
        Ok(removed)
    }
}

/// Location of an assignment's file inside a backup bundle.
fn bundle_file_name(a: &Assignment) -> Option<String> {
    let stored = a.stored_file_name()?;
    Some(format!(
        "files/{}/{}/{}/{}",
        a.year(),
        a.season,
        a.course_code,
        stored
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::CloudError;
    use crate::model::Season;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::{SystemTime, UNIX_EPOCH};

    struct Fixture {
        dir: PathBuf,
        cascade: Cascade,
    }

    impl Fixture {
        fn new(prefix: &str) -> Self {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos();
            let dir = std::env::temp_dir().join(format!("{prefix}-{nanos}"));
            let config_root = dir.join("config");
            fs::create_dir_all(&config_root).expect("config dir");
            fs::create_dir_all(dir.join("data")).expect("data dir");
            for name in ["semesters.json", "courses.json", "assignments.json"] {
                fs::write(config_root.join(name), "[]").expect("seed document");
            }
            let settings = Settings {
                config_root_folder: config_root.clone(),
                assignment_root_folder: dir.join("data"),
                default_assignment_root_folder: dir.join("default-data"),
                semesters_data_file: "semesters.json".into(),
                courses_data_file: "courses.json".into(),
                assignments_data_file: "assignments.json".into(),
            };
            let settings_path = config_root.join("settings.json");
            config::save_settings(&settings_path, &settings).expect("settings");
            let cascade = Cascade::new(settings_path, settings).with_current_year(2025);
            Self { dir, cascade }
        }

        fn source(&self, name: &str, bytes: &[u8]) -> PathBuf {
            let src = self.dir.join("incoming");
            fs::create_dir_all(&src).expect("incoming");
            let path = src.join(name);
            fs::write(&path, bytes).expect("source file");
            path
        }

        fn root(&self) -> PathBuf {
            self.cascade.settings().assignment_root_folder.clone()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    struct RecordingCloud {
        deleted: Rc<RefCell<Vec<String>>>,
    }

    impl CloudBackend for RecordingCloud {
        fn upload(&self, file: &Path) -> Result<Option<String>, CloudError> {
            Ok(Some(format!("cloud://{}", file.display())))
        }

        fn delete(&self, url: &str) -> Result<(), CloudError> {
            self.deleted.borrow_mut().push(url.to_string());
            Ok(())
        }
    }

    struct FailingCloud;

    impl CloudBackend for FailingCloud {
        fn upload(&self, file: &Path) -> Result<Option<String>, CloudError> {
            Err(CloudError::Upload {
                path: file.to_path_buf(),
                message: "quota exceeded".into(),
            })
        }

        fn delete(&self, url: &str) -> Result<(), CloudError> {
            Err(CloudError::Delete {
                url: url.to_string(),
                message: "offline".into(),
            })
        }
    }

    fn swap_cloud(fx: &mut Fixture, cloud: Box<dyn CloudBackend>) {
        let settings = fx.cascade.settings().clone();
        let settings_path = fx.cascade.settings_path().to_path_buf();
        fx.cascade = Cascade::new(settings_path, settings)
            .with_current_year(2025)
            .with_cloud(cloud);
    }

    fn fall_2024_with_cs101(fx: &mut Fixture) -> (Semester, Course) {
        let semester = fx.cascade.add_semester("Fall", "2024").expect("semester");
        let course = fx
            .cascade
            .add_course(Some(&SemesterRef::Label("Fall 2024".into())), "CS101", "Intro")
            .expect("course");
        (semester, course)
    }

    #[test]
    fn semester_update_cascades_to_courses_assignments_and_files() {
        let mut fx = Fixture::new("coursevault-cascade-semester");
        let (semester, course) = fall_2024_with_cs101(&mut fx);
        assert_eq!((semester.id, course.id), (1, 1));
        assert_eq!((course.season, course.year.as_str(), course.month), (Season::Fall, "2024", 9));

        let src = fx.source("a.pdf", b"homework one");
        let uploaded = fx
            .cascade
            .upload_assignment(Some(&CourseRef::Code("CS101".into())), "HW1", Some(&src), false)
            .expect("upload");
        let root = fx.root();
        assert_eq!(uploaded.file, root.join("2024/Fall/CS101/1-a.pdf"));

        let (token, current) = fx.cascade.begin_semester_edit(1).expect("begin edit");
        assert_eq!(current, semester);
        let saved = fx
            .cascade
            .add_or_update_semester("Winter", "2025", Some(token))
            .expect("update");
        assert!(saved.migration_failures.is_empty());
        assert_eq!(fx.cascade.session_state(EntityKind::Semester), SessionState::Idle);

        let course = &fx.cascade.list_courses().expect("courses")[0].course;
        assert_eq!((course.season, course.year.as_str(), course.month), (Season::Winter, "2025", 1));

        let assignment = &fx.cascade.list_assignments().expect("assignments")[0];
        assert_eq!(assignment.file, root.join("2025/Winter/CS101/1-a.pdf"));
        assert_eq!(fs::read(&assignment.file).expect("moved file"), b"homework one");
        assert!(!root.join("2024").exists());
        assert!(root.is_dir());
    }

    #[test]
    fn duplicate_update_returns_to_editing_and_changes_nothing() {
        let mut fx = Fixture::new("coursevault-cascade-dup");
        fx.cascade.add_semester("Fall", "2024").expect("fall");
        fx.cascade.add_semester("Winter", "2025").expect("winter");
        let before = fs::read(fx.cascade.settings().semesters_path()).expect("read");

        let (token, _) = fx.cascade.begin_semester_edit(1).expect("edit");
        let err = fx.cascade.update_semester(token, "Winter", "2025").unwrap_err();
        assert_eq!(err.code(), "duplicate");
        assert_eq!(fx.cascade.session_state(EntityKind::Semester), SessionState::Editing);

        let err = fx.cascade.update_semester(token, "Fall", "1999").unwrap_err();
        assert_eq!(err.code(), "validation_failed");
        assert_eq!(fx.cascade.session_state(EntityKind::Semester), SessionState::Editing);
        assert_eq!(fs::read(fx.cascade.settings().semesters_path()).expect("read"), before);

        // Saving the unchanged values is not a duplicate of itself.
        fx.cascade.update_semester(token, "Fall", "2024").expect("same values");
        assert_eq!(fx.cascade.session_state(EntityKind::Semester), SessionState::Idle);
    }

    #[test]
    fn deletes_are_blocked_by_dependents_and_open_sessions() {
        let mut fx = Fixture::new("coursevault-cascade-delete");
        let (semester, course) = fall_2024_with_cs101(&mut fx);

        let err = fx.cascade.delete_semester(semester.id).unwrap_err();
        assert!(matches!(
            err,
            CascadeError::DependentRecords { count: 1, dependents: "courses", .. }
        ));

        let (token, _) = fx.cascade.begin_course_edit(course.id).expect("edit");
        let err = fx.cascade.delete_course(course.id).unwrap_err();
        assert_eq!(err.code(), "operation_in_progress");
        fx.cascade.cancel_edit(EntityKind::Course, token).expect("cancel");

        fx.cascade.delete_course(course.id).expect("delete course");
        fx.cascade.delete_semester(semester.id).expect("delete semester");
        assert_eq!(fx.cascade.summary().expect("summary").semesters, 0);
        assert_eq!(fx.cascade.session_state(EntityKind::Semester), SessionState::Idle);
    }

    #[test]
    fn course_edit_moves_files_to_the_new_code() {
        let mut fx = Fixture::new("coursevault-cascade-course");
        let (_, course) = fall_2024_with_cs101(&mut fx);
        let src = fx.source("a.pdf", b"x");
        fx.cascade
            .upload_assignment(Some(&CourseRef::Id(course.id)), "HW1", Some(&src), false)
            .expect("upload");

        let (token, _) = fx.cascade.begin_course_edit(course.id).expect("edit");
        let saved = fx
            .cascade
            .update_course(token, Some(&SemesterRef::Id(1)), "CS102", "Intro Two")
            .expect("update");
        assert_eq!(saved.record.course_code, "CS102");

        let a = &fx.cascade.list_assignments().expect("assignments")[0];
        assert_eq!(a.course_code, "CS102");
        assert_eq!(a.course_name, "Intro Two");
        assert_eq!(a.file, fx.root().join("2024/Fall/CS102/1-a.pdf"));
        assert!(!fx.root().join("2024/Fall/CS101").exists());
        assert_eq!(fx.cascade.assignment_count("CS102").expect("count"), 1);
        assert_eq!(fx.cascade.assignment_count("CS101").expect("count"), 0);
    }

    #[test]
    fn cloud_flagged_assignment_calls_backend_on_delete() {
        let mut fx = Fixture::new("coursevault-cascade-cloud");
        let deleted = Rc::new(RefCell::new(Vec::new()));
        let cloud = RecordingCloud {
            deleted: Rc::clone(&deleted),
        };
        swap_cloud(&mut fx, Box::new(cloud));

        fall_2024_with_cs101(&mut fx);
        let src = fx.source("a.pdf", b"x");
        let a = fx
            .cascade
            .upload_assignment(Some(&CourseRef::Code("CS101".into())), "HW1", Some(&src), true)
            .expect("upload");
        assert_eq!(a.cloud_backup, CloudBackup::Yes);
        assert!(a.cloud_file_url.starts_with("cloud://"));

        fx.cascade.delete_assignment(a.id).expect("delete");
        assert_eq!(*deleted.borrow(), vec![a.cloud_file_url.clone()]);
        assert!(!a.file.exists());
        assert!(!fx.root().join("2024").exists());
    }

    #[test]
    fn relocation_moves_every_file_and_updates_settings() {
        let mut fx = Fixture::new("coursevault-cascade-relocate");
        fall_2024_with_cs101(&mut fx);
        let src = fx.source("a.pdf", b"bytes");
        fx.cascade
            .upload_assignment(Some(&CourseRef::Code("CS101".into())), "HW1", Some(&src), false)
            .expect("upload");
        let old_root = fx.root();
        let new_root = fx.dir.join("moved");

        let report = fx.cascade.change_assignment_root(&new_root).expect("relocate");
        assert_eq!(report.moved, 1);
        assert!(report.old_root_removed);
        assert!(!old_root.exists());

        let a = &fx.cascade.list_assignments().expect("assignments")[0];
        assert_eq!(a.file, new_root.join("2024/Fall/CS101/1-a.pdf"));
        let on_disk = config::load_settings(fx.cascade.settings_path()).expect("settings");
        assert_eq!(on_disk.assignment_root_folder, new_root);

        let again = fx.cascade.change_assignment_root(&new_root).expect("no-op");
        assert!(again.unchanged);
    }

    #[test]
    fn backup_round_trip_restores_documents_and_files() {
        let mut fx = Fixture::new("coursevault-cascade-backup");
        fall_2024_with_cs101(&mut fx);
        let src = fx.source("a.pdf", b"keep these bytes");
        let a = fx
            .cascade
            .upload_assignment(Some(&CourseRef::Code("CS101".into())), "HW1", Some(&src), false)
            .expect("upload");

        let bundle = fx.dir.join("out/backup.zip");
        let export = fx.cascade.export_backup(&bundle).expect("export");
        assert_eq!(export.entry_count, 4);
        assert!(export.skipped.is_empty());

        fx.cascade.delete_assignment(a.id).expect("delete");
        fx.cascade.delete_course(1).expect("delete course");
        assert_eq!(fx.cascade.summary().expect("summary").courses, 0);

        let report = fx.cascade.import_backup(&bundle).expect("import");
        assert_eq!((report.semesters, report.courses, report.assignments), (1, 1, 1));
        assert!(report.missing_files.is_empty());
        let restored = &fx.cascade.list_assignments().expect("assignments")[0];
        assert_eq!(restored.file, a.file);
        assert_eq!(fs::read(&restored.file).expect("restored"), b"keep these bytes");

        let leftovers: Vec<_> = fs::read_dir(&fx.cascade.settings().config_root_folder)
            .expect("config dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".restore-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn cloud_failures_keep_local_state_consistent() {
        let mut fx = Fixture::new("coursevault-cascade-cloud-fail");
        swap_cloud(&mut fx, Box::new(FailingCloud));
        fall_2024_with_cs101(&mut fx);
        let src = fx.source("a.pdf", b"x");

        let err = fx
            .cascade
            .upload_assignment(Some(&CourseRef::Code("CS101".into())), "HW1", Some(&src), true)
            .unwrap_err();
        assert!(matches!(err, CascadeError::Cloud(CloudError::Upload { .. })));
        assert_eq!(err.code(), "io_failed");
        assert!(fx.cascade.list_assignments().expect("assignments").is_empty());
        assert!(!fx.root().join("2024").exists());

        let deleted = Rc::new(RefCell::new(Vec::new()));
        swap_cloud(
            &mut fx,
            Box::new(RecordingCloud {
                deleted: Rc::clone(&deleted),
            }),
        );
        let a = fx
            .cascade
            .upload_assignment(Some(&CourseRef::Code("CS101".into())), "HW1", Some(&src), true)
            .expect("upload");

        swap_cloud(&mut fx, Box::new(FailingCloud));
        let err = fx.cascade.delete_assignment(a.id).unwrap_err();
        assert!(matches!(err, CascadeError::Cloud(CloudError::Delete { .. })));
        assert!(a.file.is_file());
        assert_eq!(fx.cascade.assignment_count("CS101").expect("count"), 1);
    }

    #[test]
    fn restore_removes_files_of_assignments_it_replaces() {
        let mut fx = Fixture::new("coursevault-cascade-restore-orphans");
        fall_2024_with_cs101(&mut fx);
        let code = CourseRef::Code("CS101".into());
        let first = fx.source("a.pdf", b"first");
        let hw1 = fx
            .cascade
            .upload_assignment(Some(&code), "HW1", Some(&first), false)
            .expect("upload hw1");

        let bundle = fx.dir.join("out/backup.zip");
        fx.cascade.export_backup(&bundle).expect("export");

        let second = fx.source("b.pdf", b"second");
        let hw2 = fx
            .cascade
            .upload_assignment(Some(&code), "HW2", Some(&second), false)
            .expect("upload hw2");
        assert_eq!(hw2.file, fx.root().join("2024/Fall/CS101/2-b.pdf"));

        let report = fx.cascade.import_backup(&bundle).expect("import");
        assert_eq!(report.assignments, 1);
        assert_eq!(report.removed_files, vec![hw2.id]);
        assert!(!hw2.file.exists());
        assert_eq!(fs::read(&hw1.file).expect("hw1 kept"), b"first");

        let on_disk: Vec<_> = fs::read_dir(fx.root().join("2024/Fall/CS101"))
            .expect("course dir")
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(on_disk, vec!["1-a.pdf".to_string()]);
    }

    #[test]
    fn restore_rejects_bundles_with_a_broken_hierarchy() {
        let mut fx = Fixture::new("coursevault-cascade-restore-broken");
        fall_2024_with_cs101(&mut fx);
        let src = fx.source("a.pdf", b"live");
        let live = fx
            .cascade
            .upload_assignment(Some(&CourseRef::Id(1)), "HW1", Some(&src), false)
            .expect("upload");
        let courses_before = fs::read(fx.cascade.settings().courses_path()).expect("courses");

        let staged = fx.dir.join("handmade");
        fs::create_dir_all(&staged).expect("handmade dir");
        let docs = [
            ("semesters.json", "[]"),
            (
                "courses.json",
                r#"[{"id":1,"semesterId":5,"season":"Fall","year":"2024","month":9,"courseCode":"CS101","courseName":"Intro"}]"#,
            ),
            ("assignments.json", "[]"),
        ];
        let entries: Vec<BundleEntry> = docs
            .iter()
            .map(|(name, text)| {
                let path = staged.join(name);
                fs::write(&path, text).expect("handmade document");
                BundleEntry {
                    name: format!("data/{name}"),
                    source: path,
                }
            })
            .collect();
        let bundle = fx.dir.join("handmade.zip");
        backup::export_bundle(&entries, &bundle).expect("bundle");

        let err = fx.cascade.import_backup(&bundle).unwrap_err();
        assert_eq!(err.code(), "corrupt_data");
        match &err {
            CascadeError::Inconsistent { problems } => {
                assert_eq!(problems, &vec!["course 1 references missing semester 5".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            fs::read(fx.cascade.settings().courses_path()).expect("courses"),
            courses_before
        );
        assert_eq!(fs::read(&live.file).expect("live file"), b"live");
    }

    #[test]
    fn year_limit_follows_the_clock_without_an_override() {
        let fx = Fixture::new("coursevault-cascade-clock");
        let settings = fx.cascade.settings().clone();
        let settings_path = fx.cascade.settings_path().to_path_buf();
        let mut live = Cascade::new(settings_path, settings);
        assert_eq!(live.current_year(), validate::current_year());

        let this_year = validate::current_year().to_string();
        live.add_semester("Fall", &this_year).expect("current year accepted");
        let next_year = (validate::current_year() + 1).to_string();
        let err = live.add_semester("Fall", &next_year).unwrap_err();
        assert_eq!(err.code(), "validation_failed");
    }
}
