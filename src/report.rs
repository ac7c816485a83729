use std::fmt::Write;

use crate::charts;
use crate::models::CohortSummary;

pub fn render_cohort_section(output: &mut String, summary: &CohortSummary, threshold: f64) {
    let _ = writeln!(output, "## {} Class", summary.stage);

    if summary.record_count == 0 {
        let _ = writeln!(output, "No marks recorded for this stage.");
        let _ = writeln!(output);
        return;
    }

    let _ = writeln!(
        output,
        "{} students, {} passed, {} failed (pass mark {})",
        summary.record_count,
        summary.pass_count(),
        summary.fail_count,
        threshold
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "| Subject | Average |");
    let _ = writeln!(output, "|---|---|");
    for bar in charts::subject_bars(summary) {
        let _ = writeln!(output, "| {} | {:.2} |", bar.subject, bar.average);
    }
    let _ = writeln!(output);
}

pub fn build_report(tenth: &CohortSummary, twelfth: &CohortSummary, threshold: f64) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Marks Dashboard");
    let _ = writeln!(
        output,
        "Generated {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);

    render_cohort_section(&mut output, tenth, threshold);
    render_cohort_section(&mut output, twelfth, threshold);

    let _ = writeln!(output, "## Comparison of Average Marks");
    let _ = writeln!(output, "| Subject | 10th | 12th |");
    let _ = writeln!(output, "|---|---|---|");
    for point in charts::stage_comparison(tenth, twelfth) {
        let _ = writeln!(
            output,
            "| {} | {:.2} | {:.2} |",
            point.subject, point.tenth, point.twelfth
        );
    }

    output
}

pub fn render_student_comparison(points: &[charts::StagePoint]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Marks Comparison");
    let _ = writeln!(output, "| Subject | 10th | 12th |");
    let _ = writeln!(output, "|---|---|---|");
    for point in points {
        let _ = writeln!(
            output,
            "| {} | {} | {} |",
            point.subject, point.tenth, point.twelfth
        );
    }
    output
}

pub fn render_completeness(completeness: u8) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Profile Completeness");
    for slice in charts::completeness_pie(completeness) {
        let _ = writeln!(output, "- {}: {}%", slice.name, slice.value);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{compute_cohort_averages, PASSING_THRESHOLD};
    use crate::models::{Stage, Subject, SubjectScoreRecord};
    use uuid::Uuid;

    #[test]
    fn report_lists_both_stages() {
        let record = Stage::Tenth.subjects().iter().fold(
            SubjectScoreRecord::new(Uuid::new_v4(), Stage::Tenth, 2024),
            |r, &s| r.with_score(s, 64.0),
        );
        let tenth = compute_cohort_averages(&[record.with_score(Subject::Math, 20.0)], Stage::Tenth);
        let twelfth = compute_cohort_averages(&[], Stage::Twelfth);

        let report = build_report(&tenth, &twelfth, PASSING_THRESHOLD);
        assert!(report.contains("## 10th Class"));
        assert!(report.contains("1 students, 0 passed, 1 failed"));
        assert!(report.contains("| Math | 20.00 |"));
        assert!(report.contains("## 12th Class\nNo marks recorded for this stage."));
        assert!(report.contains("| Social Science | 64.00 | 0.00 |"));
    }

    #[test]
    fn completeness_section_shows_remainder() {
        let text = render_completeness(80);
        assert!(text.contains("- Completed: 80%"));
        assert!(text.contains("- Not Completed: 20%"));
    }
}
