use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Tenth,
    Twelfth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subject {
    Hindi,
    Math,
    Science,
    English,
    SocialScience,
    Physics,
    Chemistry,
}

const TENTH_SUBJECTS: [Subject; 5] = [
    Subject::Hindi,
    Subject::Math,
    Subject::Science,
    Subject::English,
    Subject::SocialScience,
];

const TWELFTH_SUBJECTS: [Subject; 5] = [
    Subject::Hindi,
    Subject::Math,
    Subject::Physics,
    Subject::Chemistry,
    Subject::English,
];

impl Stage {
    /// Subjects graded at this stage, in display order.
    pub fn subjects(self) -> &'static [Subject] {
        match self {
            Stage::Tenth => &TENTH_SUBJECTS,
            Stage::Twelfth => &TWELFTH_SUBJECTS,
        }
    }

    pub fn has_subject(self, subject: Subject) -> bool {
        self.subjects().contains(&subject)
    }

    pub fn table(self) -> &'static str {
        match self {
            Stage::Tenth => "marks_dashboard.tenth_class_marks",
            Stage::Twelfth => "marks_dashboard.twelfth_class_marks",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Tenth => "10th",
            Stage::Twelfth => "12th",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Subject {
    pub const ALL: [Subject; 7] = [
        Subject::Hindi,
        Subject::Math,
        Subject::Science,
        Subject::English,
        Subject::SocialScience,
        Subject::Physics,
        Subject::Chemistry,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Subject::Hindi => "Hindi",
            Subject::Math => "Math",
            Subject::Science => "Science",
            Subject::English => "English",
            Subject::SocialScience => "Social Science",
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
        }
    }

    /// Storage column holding this subject's score in a stage table.
    pub fn column(self) -> &'static str {
        match self {
            Subject::Hindi => "hindi_marks",
            Subject::Math => "math_marks",
            Subject::Science => "science_marks",
            Subject::English => "english_marks",
            Subject::SocialScience => "social_science_marks",
            Subject::Physics => "physics_marks",
            Subject::Chemistry => "chemistry_marks",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Subject {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let normalized = normalized.strip_suffix("marks").unwrap_or(&normalized);

        Subject::ALL
            .into_iter()
            .find(|subject| {
                let label: String = subject
                    .label()
                    .to_ascii_lowercase()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect();
                label == normalized
            })
            .ok_or_else(|| anyhow::anyhow!("unknown subject '{value}'"))
    }
}

/// One student's marks for one stage in one year. An absent subject key is a
/// missing score.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectScoreRecord {
    pub student_id: Uuid,
    pub stage: Stage,
    pub year: i32,
    pub scores: BTreeMap<Subject, f64>,
}

impl SubjectScoreRecord {
    pub fn new(student_id: Uuid, stage: Stage, year: i32) -> Self {
        Self {
            student_id,
            stage,
            year,
            scores: BTreeMap::new(),
        }
    }

    /// Sets a score, ignoring subjects the record's stage does not grade.
    pub fn with_score(mut self, subject: Subject, score: f64) -> Self {
        if self.stage.has_subject(subject) {
            self.scores.insert(subject, score);
        }
        self
    }

    pub fn score(&self, subject: Subject) -> Option<f64> {
        if !self.stage.has_subject(subject) {
            return None;
        }
        self.scores.get(&subject).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectAverage {
    pub subject: Subject,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortSummary {
    pub stage: Stage,
    pub record_count: usize,
    pub averages: Vec<SubjectAverage>,
    pub fail_count: usize,
    pub skipped_records: usize,
}

impl CohortSummary {
    pub fn pass_count(&self) -> usize {
        self.record_count - self.fail_count
    }

    pub fn average(&self, subject: Subject) -> Option<f64> {
        self.averages
            .iter()
            .find(|entry| entry.subject == subject)
            .map(|entry| entry.average)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProfileFields {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub last_login: Option<DateTime<Utc>>,
}

/// Partial profile edit; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub location: Option<String>,
}

impl ProfileUpdate {
    /// Drops empty strings the way the profile form does before saving.
    pub fn normalized(self) -> Self {
        Self {
            name: self.name.filter(|value| !value.is_empty()),
            age: self.age,
            location: self.location.filter(|value| !value.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.age.is_none() && self.location.is_none()
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}
