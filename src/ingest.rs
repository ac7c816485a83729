use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use uuid::Uuid;

use crate::models::{ProfileFields, Stage, SubjectScoreRecord};

pub fn read_records_csv(path: &Path, stage: Stage) -> anyhow::Result<Vec<SubjectScoreRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open marks file {}", path.display()))?;
    parse_records(file, stage).with_context(|| format!("failed to read {}", path.display()))
}

/// Reads a stage marks CSV. The header must name `student_id`, `year` and the
/// stage's own subject columns; empty cells are missing scores.
pub fn parse_records<R: Read>(input: R, stage: Stage) -> anyhow::Result<Vec<SubjectScoreRecord>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|header| header == name);

    let id_index = position("student_id").context("missing column 'student_id'")?;
    let year_index = position("year").context("missing column 'year'")?;
    let mut subject_columns = Vec::with_capacity(stage.subjects().len());
    for &subject in stage.subjects() {
        let Some(index) = position(subject.column()) else {
            bail!("missing column '{}' for {} marks", subject.column(), stage);
        };
        subject_columns.push((subject, index));
    }

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;
        let line = line + 2;
        let cell = |index: usize| row.get(index).unwrap_or("");

        let student_id = Uuid::parse_str(cell(id_index))
            .with_context(|| format!("line {line}: invalid student_id"))?;
        let year: i32 = cell(year_index)
            .parse()
            .with_context(|| format!("line {line}: invalid year"))?;

        let mut record = SubjectScoreRecord::new(student_id, stage, year);
        for &(subject, index) in &subject_columns {
            let raw = cell(index);
            if raw.is_empty() {
                continue;
            }
            let score: f64 = raw
                .parse()
                .with_context(|| format!("line {line}: invalid {} score '{raw}'", subject))?;
            if !score.is_finite() {
                bail!("line {line}: {} score must be a finite number, got '{raw}'", subject);
            }
            record = record.with_score(subject, score);
        }
        records.push(record);
    }

    tracing::debug!(%stage, count = records.len(), "parsed marks records");
    Ok(records)
}

pub fn read_profile_json(path: &Path) -> anyhow::Result<ProfileFields> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to open profile file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid profile in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Subject;

    const TENTH_CSV: &str = "\
student_id,year,hindi_marks,math_marks,science_marks,english_marks,social_science_marks
3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2,2024,70,40,65,72,58
0c22f1f1-9184-4fd4-9b21-28c68a6a89dc,2024,81,80,77,,69
";

    #[test]
    fn reads_stage_columns() {
        let records = parse_records(TENTH_CSV.as_bytes(), Stage::Tenth).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].year, 2024);
        assert_eq!(records[0].score(Subject::Math), Some(40.0));
        assert_eq!(records[1].score(Subject::English), None);
        assert_eq!(records[1].score(Subject::SocialScience), Some(69.0));
    }

    #[test]
    fn rejects_file_for_other_stage() {
        let err = parse_records(TENTH_CSV.as_bytes(), Stage::Twelfth).unwrap_err();
        assert!(err.to_string().contains("physics_marks"));
    }

    #[test]
    fn sample_files_summarize() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
        let tenth = read_records_csv(&dir.join("tenth_class_marks.csv"), Stage::Tenth).unwrap();
        let summary = crate::metrics::compute_cohort_averages(&tenth, Stage::Tenth);
        assert_eq!(
            crate::metrics::round_to(summary.average(Subject::Math).unwrap(), 2),
            46.67
        );
        assert_eq!(summary.fail_count, 1);

        let twelfth = read_records_csv(&dir.join("twelfth_class_marks.csv"), Stage::Twelfth).unwrap();
        let summary = crate::metrics::compute_cohort_averages(&twelfth, Stage::Twelfth);
        assert_eq!(summary.average(Subject::Chemistry), Some(30.5));
        assert_eq!(summary.fail_count, 1);

        let profile = read_profile_json(&dir.join("profile.json")).unwrap();
        assert_eq!(crate::metrics::compute_profile_completeness(&profile), 60);
    }

    #[test]
    fn rejects_non_finite_scores() {
        for cell in ["NaN", "inf", "-inf"] {
            let input = format!(
                "student_id,year,hindi_marks,math_marks,science_marks,english_marks,social_science_marks\n\
                 3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2,2024,70,80,65,72,58\n\
                 0c22f1f1-9184-4fd4-9b21-28c68a6a89dc,2024,81,{cell},77,60,69\n"
            );
            let err = parse_records(input.as_bytes(), Stage::Tenth).unwrap_err();
            let message = format!("{err:#}");
            assert!(message.contains("line 3"), "{message}");
            assert!(message.contains("finite"), "{message}");
        }
    }

    #[test]
    fn reports_bad_scores_with_line() {
        let input = "\
student_id,year,hindi_marks,math_marks,physics_marks,chemistry_marks,english_marks
d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2,2024,70,abc,65,72,58
";
        let err = parse_records(input.as_bytes(), Stage::Twelfth).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }
}
