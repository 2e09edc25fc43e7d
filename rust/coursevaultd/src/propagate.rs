//! Rewrites the parent fields cached on child records.
//!
//! Pure transforms over loaded collections. Callers persist the result and
//! decide whether files have to move.

use tracing::debug;

use crate::hierarchy::sort_by_year_then_month;
use crate::model::{Assignment, Course, Semester};

pub fn propagate_semester_change(
    old: &Semester,
    new: &Semester,
    mut courses: Vec<Course>,
    mut assignments: Vec<Assignment>,
) -> (Vec<Course>, Vec<Assignment>) {
    let mut touched_courses = 0usize;
    for c in courses.iter_mut().filter(|c| c.semester_id == new.id) {
        c.season = new.season;
        c.year = new.year.clone();
        c.month = new.month;
        touched_courses += 1;
    }

    let mut touched_assignments = 0usize;
    for a in assignments.iter_mut().filter(|a| a.semester_id == new.id) {
        a.season = new.season;
        a.year = new.year.clone();
        a.month = new.month;
        touched_assignments += 1;
    }

    sort_by_year_then_month(&mut courses);
    sort_by_year_then_month(&mut assignments);

    debug!(
        semester_id = new.id,
        from = %old.label(),
        to = %new.label(),
        courses = touched_courses,
        assignments = touched_assignments,
        "propagated semester change"
    );
    (courses, assignments)
}

pub fn propagate_course_change(
    old: &Course,
    new: &Course,
    mut assignments: Vec<Assignment>,
) -> Vec<Assignment> {
    let mut touched = 0usize;
    for a in assignments.iter_mut().filter(|a| a.course_id == new.id) {
        a.semester_id = new.semester_id;
        a.season = new.season;
        a.year = new.year.clone();
        a.month = new.month;
        a.course_code = new.course_code.clone();
        a.course_name = new.course_name.clone();
        touched += 1;
    }
    sort_by_year_then_month(&mut assignments);

    debug!(
        course_id = new.id,
        from = %old.label(),
        to = %new.label(),
        assignments = touched,
        "propagated course change"
    );
    assignments
}

/// Any change of (year, season) changes the directory of every dependent file.
pub fn semester_moves_files(old: &Semester, new: &Semester) -> bool {
    old.year != new.year || old.season != new.season
}

pub fn course_moves_files(old: &Course, new: &Course) -> bool {
    old.year != new.year || old.season != new.season || old.course_code != new.course_code
}

/// Broken references and stale cached fields across the three collections.
/// Empty when every child agrees with its parent.
pub fn hierarchy_problems(
    semesters: &[Semester],
    courses: &[Course],
    assignments: &[Assignment],
) -> Vec<String> {
    let mut problems = Vec::new();
    for c in courses {
        match semesters.iter().find(|s| s.id == c.semester_id) {
            None => problems.push(format!(
                "course {} references missing semester {}",
                c.id, c.semester_id
            )),
            Some(s) if s.season != c.season || s.year != c.year || s.month != c.month => {
                problems.push(format!(
                    "course {} does not match semester {}",
                    c.id,
                    s.label()
                ))
            }
            Some(_) => {}
        }
    }
    for a in assignments {
        match courses.iter().find(|c| c.id == a.course_id) {
            None => problems.push(format!(
                "assignment {} references missing course {}",
                a.id, a.course_id
            )),
            Some(c)
                if c.semester_id != a.semester_id
                    || c.season != a.season
                    || c.year != a.year
                    || c.month != a.month
                    || c.course_code != a.course_code
                    || c.course_name != a.course_name =>
            {
                problems.push(format!(
                    "assignment {} does not match course {}",
                    a.id, c.id
                ))
            }
            Some(_) => {}
        }
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CloudBackup, Season, NO_CLOUD_URL};
    use std::path::PathBuf;

    fn course(id: i64, semester: &Semester, code: &str) -> Course {
        Course {
            id,
            semester_id: semester.id,
            season: semester.season,
            year: semester.year.clone(),
            month: semester.month,
            course_code: code.to_string(),
            course_name: format!("{code} name"),
        }
    }

    fn assignment(id: i64, course: &Course) -> Assignment {
        Assignment {
            id,
            course_id: course.id,
            semester_id: course.semester_id,
            name: format!("HW{id}"),
            file: PathBuf::from(format!(
                "/data/{}/{}/{}/{id}-hw.pdf",
                course.year, course.season, course.course_code
            )),
            course_name: course.course_name.clone(),
            course_code: course.course_code.clone(),
            year: course.year.clone(),
            season: course.season,
            month: course.month,
            cloud_backup: CloudBackup::No,
            cloud_file_url: NO_CLOUD_URL.to_string(),
        }
    }

    #[test]
    fn semester_change_rewrites_only_matching_children() {
        let fall = Semester::new(1, "2024".into(), Season::Fall);
        let spring = Semester::new(2, "2023".into(), Season::Spring);
        let c1 = course(1, &fall, "CS101");
        let c2 = course(2, &spring, "MA200");
        let a1 = assignment(1, &c1);
        let a2 = assignment(2, &c2);

        let winter = Semester::new(1, "2025".into(), Season::Winter);
        let (courses, assignments) = propagate_semester_change(
            &fall,
            &winter,
            vec![c1.clone(), c2.clone()],
            vec![a1.clone(), a2.clone()],
        );

        let moved = courses.iter().find(|c| c.id == 1).expect("course 1");
        assert_eq!(moved.season, Season::Winter);
        assert_eq!(moved.year, "2025");
        assert_eq!(moved.month, 1);
        assert_eq!(courses.iter().find(|c| c.id == 2), Some(&c2));

        let moved = assignments.iter().find(|a| a.id == 1).expect("assignment 1");
        assert_eq!((moved.season, moved.year.as_str(), moved.month), (Season::Winter, "2025", 1));
        // File paths are the migrator's business.
        assert_eq!(moved.file, a1.file);
        assert_eq!(assignments.iter().find(|a| a.id == 2), Some(&a2));

        // Re-sorted: 2025 first.
        assert_eq!(courses[0].id, 1);
    }

    #[test]
    fn course_change_carries_code_name_and_semester() {
        let fall = Semester::new(1, "2024".into(), Season::Fall);
        let summer = Semester::new(2, "2024".into(), Season::Summer);
        let c1 = course(1, &fall, "CS101");
        let c2 = course(2, &fall, "CS102");
        let a1 = assignment(1, &c1);
        let a2 = assignment(2, &c2);

        let mut renamed = course(1, &summer, "CS111");
        renamed.course_name = "Data Structures".into();
        let out = propagate_course_change(&c1, &renamed, vec![a1, a2.clone()]);

        let moved = out.iter().find(|a| a.id == 1).expect("assignment 1");
        assert_eq!(moved.semester_id, 2);
        assert_eq!(moved.season, Season::Summer);
        assert_eq!(moved.month, 7);
        assert_eq!(moved.course_code, "CS111");
        assert_eq!(moved.course_name, "Data Structures");
        assert_eq!(out.iter().find(|a| a.id == 2), Some(&a2));

        // Summer (7) sorts before Fall (9) within 2024.
        assert_eq!(out[0].id, 1);
    }

    #[test]
    fn path_relevant_changes_are_detected() {
        let fall = Semester::new(1, "2024".into(), Season::Fall);
        assert!(!semester_moves_files(&fall, &fall.clone()));
        assert!(semester_moves_files(&fall, &Semester::new(1, "2025".into(), Season::Fall)));

        let c = course(1, &fall, "CS101");
        let mut renamed = c.clone();
        renamed.course_name = "Other".into();
        assert!(!course_moves_files(&c, &renamed));
        renamed.course_code = "CS102".into();
        assert!(course_moves_files(&c, &renamed));
    }

    #[test]
    fn hierarchy_problems_flag_dangling_and_stale_children() {
        let fall = Semester::new(1, "2024".into(), Season::Fall);
        let c1 = course(1, &fall, "CS101");
        let a1 = assignment(1, &c1);
        assert!(hierarchy_problems(&[fall.clone()], &[c1.clone()], &[a1.clone()]).is_empty());

        let orphan = course(2, &Semester::new(7, "2023".into(), Season::Spring), "MA200");
        let mut stale = a1.clone();
        stale.id = 2;
        stale.course_code = "CS999".into();
        let mut dangling = a1;
        dangling.id = 3;
        dangling.course_id = 42;

        let problems = hierarchy_problems(&[fall], &[c1, orphan], &[stale, dangling]);
        assert_eq!(
            problems,
            vec![
                "course 2 references missing semester 7".to_string(),
                "assignment 2 does not match course 1".to_string(),
                "assignment 3 references missing course 42".to_string(),
            ]
        );
    }
}
