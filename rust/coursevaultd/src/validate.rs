use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::error::CascadeError;
use crate::model::Season;

pub const MIN_YEAR: i32 = 2000;

static COURSE_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z]{2}[A-Za-z0-9_\- ]{0,8}$").expect("valid course code regex")
});

static COURSE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_\-' ]{0,39}$").expect("valid course name regex")
});

pub fn current_year() -> i32 {
    chrono::Local::now().year()
}

fn rejected(problems: Vec<String>) -> CascadeError {
    CascadeError::Validation { problems }
}

pub fn semester_input(
    season: &str,
    year: &str,
    current_year: i32,
) -> Result<(Season, String), CascadeError> {
    let mut problems = Vec::new();

    let parsed_season = if season.trim().is_empty() {
        problems.push("You must select a season/term.".to_string());
        None
    } else {
        let s = Season::parse(season);
        if s.is_none() {
            problems.push(format!("Unknown season/term '{}'.", season.trim()));
        }
        s
    };

    let year = year.trim();
    let year_ok = year.len() == 4
        && year.chars().all(|c| c.is_ascii_digit())
        && year
            .parse::<i32>()
            .map(|y| (MIN_YEAR..=current_year).contains(&y))
            .unwrap_or(false);
    if !year_ok {
        problems.push(format!(
            "A valid year is between {} and {}.",
            MIN_YEAR, current_year
        ));
    }

    match parsed_season {
        Some(season) if problems.is_empty() => Ok((season, year.to_string())),
        _ => Err(rejected(problems)),
    }
}

/// Trimmed (code, name). Missing fields are reported before format rules.
pub fn course_input(
    semester_selected: bool,
    code: &str,
    name: &str,
) -> Result<(String, String), CascadeError> {
    let code = code.trim();
    let name = name.trim();

    let mut problems = Vec::new();
    if !semester_selected {
        problems.push("Select a Semester.".to_string());
    }
    if code.is_empty() {
        problems.push("Enter a Course Code.".to_string());
    }
    if name.is_empty() {
        problems.push("Enter a Course Name.".to_string());
    }
    if !problems.is_empty() {
        return Err(rejected(problems));
    }

    if !COURSE_CODE_RE.is_match(code) {
        problems.push(
            "Enter a valid Course Code (two letters, then up to 8 letters, digits, spaces, underscores or dashes, e.g. Math-100)."
                .to_string(),
        );
    }
    if !COURSE_NAME_RE.is_match(name) {
        problems.push(
            "Enter a valid Course Name (a letter, then up to 39 letters, digits, spaces, underscores, apostrophes or dashes)."
                .to_string(),
        );
    }
    if !problems.is_empty() {
        return Err(rejected(problems));
    }
    Ok((code.to_string(), name.to_string()))
}

pub fn upload_input(
    course_selected: bool,
    name: &str,
    source: Option<&Path>,
) -> Result<String, CascadeError> {
    let mut problems = Vec::new();
    if !course_selected {
        problems.push("Select a course.".to_string());
    }
    let name = name.trim();
    if name.is_empty() {
        problems.push("Enter an assignment name.".to_string());
    }
    match source {
        None => problems.push("No file selected for upload.".to_string()),
        Some(p) if !p.is_file() => {
            problems.push(format!("Selected file does not exist: {}", p.display()))
        }
        Some(_) => {}
    }
    if !problems.is_empty() {
        return Err(rejected(problems));
    }
    Ok(name.to_string())
}
