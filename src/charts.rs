use serde::Serialize;

use crate::metrics::round_to;
use crate::models::{CohortSummary, Stage, Subject, SubjectScoreRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub name: &'static str,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectBar {
    pub subject: &'static str,
    pub average: f64,
}

/// One category on a 10th vs 12th chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagePoint {
    pub subject: &'static str,
    pub tenth: f64,
    pub twelfth: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortCharts {
    pub stage: Stage,
    pub students: usize,
    pub pass_fail: Vec<PieSlice>,
    pub averages: Vec<SubjectBar>,
}

pub fn pass_fail_pie(summary: &CohortSummary) -> Vec<PieSlice> {
    vec![
        PieSlice {
            name: "Passed",
            value: summary.pass_count() as f64,
        },
        PieSlice {
            name: "Failed",
            value: summary.fail_count as f64,
        },
    ]
}

pub fn subject_bars(summary: &CohortSummary) -> Vec<SubjectBar> {
    summary
        .averages
        .iter()
        .map(|entry| SubjectBar {
            subject: entry.subject.label(),
            average: round_to(entry.average, 2),
        })
        .collect()
}

pub fn cohort_charts(summary: &CohortSummary) -> CohortCharts {
    CohortCharts {
        stage: summary.stage,
        students: summary.record_count,
        pass_fail: pass_fail_pie(summary),
        averages: subject_bars(summary),
    }
}

/// Subject averages of both stages side by side. A subject a stage does not
/// grade plots as 0 for that stage.
pub fn stage_comparison(tenth: &CohortSummary, twelfth: &CohortSummary) -> Vec<StagePoint> {
    Subject::ALL
        .into_iter()
        .map(|subject| StagePoint {
            subject: subject.label(),
            tenth: round_to(tenth.average(subject).unwrap_or(0.0), 2),
            twelfth: round_to(twelfth.average(subject).unwrap_or(0.0), 2),
        })
        .collect()
}

/// A single student's marks across stages; missing records or scores plot as 0.
pub fn student_comparison(
    tenth: Option<&SubjectScoreRecord>,
    twelfth: Option<&SubjectScoreRecord>,
) -> Vec<StagePoint> {
    let score = |record: Option<&SubjectScoreRecord>, subject: Subject| {
        record.and_then(|r| r.score(subject)).unwrap_or(0.0)
    };

    Subject::ALL
        .into_iter()
        .map(|subject| StagePoint {
            subject: subject.label(),
            tenth: score(tenth, subject),
            twelfth: score(twelfth, subject),
        })
        .collect()
}

pub fn completeness_pie(completeness: u8) -> Vec<PieSlice> {
    let completed = completeness.min(100);
    vec![
        PieSlice {
            name: "Completed",
            value: completed as f64,
        },
        PieSlice {
            name: "Not Completed",
            value: (100 - completed) as f64,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::compute_cohort_averages;
    use uuid::Uuid;

    fn record(stage: Stage, score: f64) -> SubjectScoreRecord {
        stage
            .subjects()
            .iter()
            .fold(SubjectScoreRecord::new(Uuid::new_v4(), stage, 2024), |r, &s| {
                r.with_score(s, score)
            })
    }

    #[test]
    fn pie_splits_pass_and_fail() {
        let records = vec![
            record(Stage::Tenth, 80.0),
            record(Stage::Tenth, 20.0),
            record(Stage::Tenth, 50.0),
        ];
        let summary = compute_cohort_averages(&records, Stage::Tenth);
        let pie = pass_fail_pie(&summary);

        assert_eq!(pie[0], PieSlice { name: "Passed", value: 2.0 });
        assert_eq!(pie[1], PieSlice { name: "Failed", value: 1.0 });
    }

    #[test]
    fn bars_follow_stage_order_and_round() {
        let records = vec![
            record(Stage::Twelfth, 40.0),
            record(Stage::Twelfth, 80.0),
            record(Stage::Twelfth, 20.0),
        ];
        let summary = compute_cohort_averages(&records, Stage::Twelfth);
        let bars = subject_bars(&summary);

        let labels: Vec<&str> = bars.iter().map(|bar| bar.subject).collect();
        assert_eq!(labels, ["Hindi", "Math", "Physics", "Chemistry", "English"]);
        assert!(bars.iter().all(|bar| bar.average == 46.67));
    }

    #[test]
    fn comparison_zeroes_subjects_outside_stage() {
        let tenth = compute_cohort_averages(&[record(Stage::Tenth, 60.0)], Stage::Tenth);
        let twelfth = compute_cohort_averages(&[record(Stage::Twelfth, 70.0)], Stage::Twelfth);
        let points = stage_comparison(&tenth, &twelfth);

        assert_eq!(points.len(), Subject::ALL.len());
        let social = points.iter().find(|p| p.subject == "Social Science").unwrap();
        assert_eq!((social.tenth, social.twelfth), (60.0, 0.0));
        let physics = points.iter().find(|p| p.subject == "Physics").unwrap();
        assert_eq!((physics.tenth, physics.twelfth), (0.0, 70.0));
        let math = points.iter().find(|p| p.subject == "Math").unwrap();
        assert_eq!((math.tenth, math.twelfth), (60.0, 70.0));
    }

    #[test]
    fn student_comparison_handles_missing_stage() {
        let tenth = record(Stage::Tenth, 55.0);
        let points = student_comparison(Some(&tenth), None);
        assert!(points.iter().all(|p| p.twelfth == 0.0));
        let english = points.iter().find(|p| p.subject == "English").unwrap();
        assert_eq!(english.tenth, 55.0);
    }

    #[test]
    fn cohort_charts_serialize_as_series() {
        let summary = compute_cohort_averages(&[record(Stage::Tenth, 45.0)], Stage::Tenth);
        let json = serde_json::to_value(cohort_charts(&summary)).unwrap();

        assert_eq!(json["stage"], "tenth");
        assert_eq!(json["students"], 1);
        assert_eq!(json["pass_fail"][0]["name"], "Passed");
        assert_eq!(json["pass_fail"][0]["value"], 1.0);
        assert_eq!(json["averages"][4]["subject"], "Social Science");
        assert_eq!(json["averages"][4]["average"], 45.0);
    }

    #[test]
    fn completeness_pie_sums_to_hundred() {
        let pie = completeness_pie(40);
        assert_eq!(pie[0].value + pie[1].value, 100.0);
        assert_eq!(pie[1].value, 60.0);
    }
}
