use crate::models::{CohortSummary, ProfileFields, Stage, SubjectAverage, SubjectScoreRecord};

pub const PASSING_THRESHOLD: f64 = 33.0;
pub const COMPLETENESS_WEIGHT: u8 = 20;

/// How missing scores feed into averages and pass/fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AveragingMode {
    /// Missing scores count as 0 and every record is in the denominator.
    #[default]
    ZeroFill,
    /// Deviation from the dashboard's behaviour: missing scores are left out of
    /// both the average and the pass/fail check.
    ExcludeMissing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CohortOptions {
    pub passing_threshold: f64,
    pub mode: AveragingMode,
}

impl Default for CohortOptions {
    fn default() -> Self {
        Self {
            passing_threshold: PASSING_THRESHOLD,
            mode: AveragingMode::ZeroFill,
        }
    }
}

/// True when any subject of the record's stage scores below the threshold.
/// A missing score is read as 0.
pub fn classify_pass_fail(record: &SubjectScoreRecord, passing_threshold: f64) -> bool {
    classify_with_mode(record, passing_threshold, AveragingMode::ZeroFill)
}

fn classify_with_mode(
    record: &SubjectScoreRecord,
    passing_threshold: f64,
    mode: AveragingMode,
) -> bool {
    record
        .stage
        .subjects()
        .iter()
        .filter_map(|&subject| match (record.score(subject), mode) {
            (Some(score), _) => Some(score),
            (None, AveragingMode::ZeroFill) => Some(0.0),
            (None, AveragingMode::ExcludeMissing) => None,
        })
        .any(|score| score < passing_threshold)
}

pub fn compute_cohort_averages(records: &[SubjectScoreRecord], stage: Stage) -> CohortSummary {
    compute_cohort_averages_with(records, stage, &CohortOptions::default())
}

pub fn compute_cohort_averages_with(
    records: &[SubjectScoreRecord],
    stage: Stage,
    options: &CohortOptions,
) -> CohortSummary {
    let subjects = stage.subjects();
    let mut sums = vec![0.0_f64; subjects.len()];
    let mut present = vec![0usize; subjects.len()];
    let mut record_count = 0usize;
    let mut fail_count = 0usize;
    let mut skipped_records = 0usize;

    for record in records {
        if record.stage != stage {
            skipped_records += 1;
            continue;
        }

        record_count += 1;
        for (index, &subject) in subjects.iter().enumerate() {
            if let Some(score) = record.score(subject) {
                sums[index] += score;
                present[index] += 1;
            }
        }

        if classify_with_mode(record, options.passing_threshold, options.mode) {
            fail_count += 1;
        }
    }

    let averages = subjects
        .iter()
        .enumerate()
        .map(|(index, &subject)| {
            let denominator = match options.mode {
                AveragingMode::ZeroFill => record_count,
                AveragingMode::ExcludeMissing => present[index],
            };
            SubjectAverage {
                subject,
                average: if denominator == 0 {
                    0.0
                } else {
                    sums[index] / denominator as f64
                },
            }
        })
        .collect();

    CohortSummary {
        stage,
        record_count,
        averages,
        fail_count,
        skipped_records,
    }
}

/// 20 points for each of name, age, location, email and creation time that is
/// set. Empty strings and an age of 0 count as unset.
pub fn compute_profile_completeness(profile: &ProfileFields) -> u8 {
    let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());

    [
        present(&profile.name),
        profile.age.is_some_and(|age| age != 0),
        present(&profile.location),
        present(&profile.email),
        profile.created_at.is_some(),
    ]
    .into_iter()
    .filter(|&set| set)
    .count() as u8
        * COMPLETENESS_WEIGHT
}

pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}
