use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Placeholder stored in `cloudFileURL` when no cloud copy exists.
pub const NO_CLOUD_URL: &str = "NA";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Winter, Season::Spring, Season::Summer, Season::Fall];

    /// Canonical ordering key within a year.
    pub fn month(self) -> u32 {
        match self {
            Season::Winter => 1,
            Season::Spring => 5,
            Season::Summer => 7,
            Season::Fall => 9,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        }
    }

    pub fn parse(s: &str) -> Option<Season> {
        let s = s.trim();
        Season::ALL.into_iter().find(|season| season.as_str() == s)
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudBackup {
    Yes,
    No,
}

/// Fields shared by every persisted collection: surrogate id plus the
/// (year, month) pair the collections are ordered by.
pub trait Record {
    fn id(&self) -> i64;
    fn year(&self) -> &str;
    fn month(&self) -> u32;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Semester {
    pub id: i64,
    #[serde(deserialize_with = "year_text")]
    pub year: String,
    pub season: Season,
    pub month: u32,
}

impl Semester {
    pub fn new(id: i64, year: String, season: Season) -> Self {
        Self {
            id,
            year,
            season,
            month: season.month(),
        }
    }

    pub fn key(&self) -> SemesterKey {
        SemesterKey {
            season: self.season,
            year: self.year.clone(),
        }
    }

    pub fn label(&self) -> String {
        self.key().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub semester_id: i64,
    pub season: Season,
    #[serde(deserialize_with = "year_text")]
    pub year: String,
    pub month: u32,
    pub course_code: String,
    pub course_name: String,
}

impl Course {
    /// Search label used by the assignment upload form.
    pub fn label(&self) -> String {
        format!(
            "{} ==> {} ({} {})",
            self.course_code, self.course_name, self.season, self.year
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: i64,
    pub course_id: i64,
    pub semester_id: i64,
    pub name: String,
    pub file: PathBuf,
    pub course_name: String,
    pub course_code: String,
    #[serde(deserialize_with = "year_text")]
    pub year: String,
    pub season: Season,
    pub month: u32,
    pub cloud_backup: CloudBackup,
    #[serde(rename = "cloudFileURL")]
    pub cloud_file_url: String,
}

impl Assignment {
    pub fn stored_file_name(&self) -> Option<&str> {
        self.file.file_name().and_then(|n| n.to_str())
    }

    /// Cloud copy location, if one was actually recorded.
    pub fn cloud_url(&self) -> Option<&str> {
        match self.cloud_backup {
            CloudBackup::Yes if self.cloud_file_url != NO_CLOUD_URL => {
                Some(self.cloud_file_url.as_str())
            }
            _ => None,
        }
    }
}

impl Record for Semester {
    fn id(&self) -> i64 {
        self.id
    }
    fn year(&self) -> &str {
        &self.year
    }
    fn month(&self) -> u32 {
        self.month
    }
}

impl Record for Course {
    fn id(&self) -> i64 {
        self.id
    }
    fn year(&self) -> &str {
        &self.year
    }
    fn month(&self) -> u32 {
        self.month
    }
}

impl Record for Assignment {
    fn id(&self) -> i64 {
        self.id
    }
    fn year(&self) -> &str {
        &self.year
    }
    fn month(&self) -> u32 {
        self.month
    }
}

/// Natural key of a semester, displayed as `"<Season> <YYYY>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemesterKey {
    pub season: Season,
    pub year: String,
}

impl SemesterKey {
    pub fn parse(label: &str) -> Option<SemesterKey> {
        let (season, year) = label.trim().rsplit_once(' ')?;
        let year = year.trim();
        if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(SemesterKey {
            season: Season::parse(season)?,
            year: year.to_string(),
        })
    }

    pub fn matches(&self, semester: &Semester) -> bool {
        semester.season == self.season && semester.year == self.year
    }
}

impl fmt::Display for SemesterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.season, self.year)
    }
}

// Hand-edited documents sometimes carry the year as a bare number.
fn year_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawYear {
        Text(String),
        Number(i64),
    }

    Ok(match RawYear::deserialize(deserializer)? {
        RawYear::Text(s) => s,
        RawYear::Number(n) => n.to_string(),
    })
}
