use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Datelike;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

mod charts;
mod config;
mod db;
mod ingest;
mod logging;
mod metrics;
mod models;
mod report;

use config::Settings;
use metrics::{AveragingMode, CohortOptions, PASSING_THRESHOLD};
use models::{CohortSummary, ProfileFields, ProfileUpdate, Stage, Subject, SubjectScoreRecord};

#[derive(Parser)]
#[command(name = "marks-dashboard")]
#[command(about = "Student marks dashboard: cohort averages, pass/fail and profile completeness", long_about = None)]
struct Cli {
    /// Log level (overrides MARKS_LOG_LEVEL; RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students and marks
    Seed,
    /// Import one stage's marks from a CSV file
    Import {
        #[arg(long, value_enum)]
        stage: Stage,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Cohort averages and pass/fail counts for a stage
    Summary {
        #[arg(long, value_enum)]
        stage: Stage,
        /// Read marks from a CSV file instead of the database
        #[arg(long)]
        csv: Option<PathBuf>,
        #[arg(long, default_value_t = PASSING_THRESHOLD, value_parser = parse_threshold)]
        threshold: f64,
        /// Leave missing scores out of averages and pass/fail (deviates from the dashboard)
        #[arg(long)]
        exclude_missing: bool,
        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,
    },
    /// Profile completeness for one user
    #[command(group(
        ArgGroup::new("source")
            .args(["user", "json"])
            .required(true)
            .multiple(false)
    ))]
    Profile {
        #[arg(long)]
        user: Option<Uuid>,
        #[arg(long)]
        json: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,
    },
    /// Compare one student's 10th and 12th marks
    Compare {
        #[arg(long)]
        user: Uuid,
        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,
    },
    /// Save a student's marks for a stage and year
    SetMarks {
        #[arg(long)]
        user: Uuid,
        #[arg(long, value_enum)]
        stage: Stage,
        /// Defaults to the current year
        #[arg(long)]
        year: Option<i32>,
        /// Subject score as `subject=value`, one per stage subject
        #[arg(long = "score", value_parser = parse_score, required = true)]
        scores: Vec<(Subject, f64)>,
    },
    /// Update name, age or location on a profile
    UpdateProfile {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        age: Option<i32>,
        #[arg(long)]
        location: Option<String>,
    },
    /// Generate a markdown dashboard report for both stages
    Report {
        #[arg(long, requires = "twelfth_csv")]
        tenth_csv: Option<PathBuf>,
        #[arg(long, requires = "tenth_csv")]
        twelfth_csv: Option<PathBuf>,
        #[arg(long, default_value_t = PASSING_THRESHOLD, value_parser = parse_threshold)]
        threshold: f64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn parse_score(raw: &str) -> Result<(Subject, f64), String> {
    let (subject, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected subject=value, got '{raw}'"))?;
    let subject: Subject = subject.parse().map_err(|err: anyhow::Error| err.to_string())?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid score '{value}' for {subject}"))?;
    if !value.is_finite() {
        return Err(format!("{subject} score must be a finite number, got '{value}'"));
    }
    Ok((subject, value))
}

fn parse_threshold(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("invalid threshold '{raw}'"))?;
    if !value.is_finite() {
        return Err(format!("threshold must be a finite number, got '{raw}'"));
    }
    Ok(value)
}

/// Builds a record from form input; every subject of the stage must be given.
fn record_from_scores(
    user: Uuid,
    stage: Stage,
    year: i32,
    scores: &[(Subject, f64)],
) -> anyhow::Result<SubjectScoreRecord> {
    if let Some((subject, _)) = scores.iter().find(|(subject, _)| !stage.has_subject(*subject)) {
        bail!("{subject} is not a {stage} class subject");
    }

    let mut record = SubjectScoreRecord::new(user, stage, year);
    for &(subject, score) in scores {
        record = record.with_score(subject, score);
    }

    let missing: Vec<&str> = stage
        .subjects()
        .iter()
        .filter(|subject| record.score(**subject).is_none())
        .map(|subject| subject.label())
        .collect();
    if !missing.is_empty() {
        bail!("missing {} marks for: {}", stage, missing.join(", "));
    }

    Ok(record)
}

async fn connect(settings: &Settings) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections()?)
        .connect(settings.database_url()?)
        .await
        .context("failed to connect to Postgres")
}

async fn load_cohort(
    settings: &Settings,
    stage: Stage,
    csv: Option<&std::path::Path>,
) -> anyhow::Result<Vec<SubjectScoreRecord>> {
    match csv {
        Some(path) => ingest::read_records_csv(path, stage),
        None => {
            let pool = connect(settings).await?;
            db::fetch_stage_records(&pool, stage).await
        }
    }
}

fn summarize(
    records: &[SubjectScoreRecord],
    stage: Stage,
    options: &CohortOptions,
) -> CohortSummary {
    let summary = metrics::compute_cohort_averages_with(records, stage, options);
    if summary.skipped_records > 0 {
        tracing::warn!(
            %stage,
            skipped = summary.skipped_records,
            "ignored records from another stage"
        );
    }
    if summary.record_count == 0 {
        tracing::warn!(%stage, "no marks found; averages default to 0");
    }
    summary
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct ProfileView {
    completeness: u8,
    chart: Vec<charts::PieSlice>,
}

fn show_profile(profile: &ProfileFields, format: OutputFormat) -> anyhow::Result<()> {
    let completeness = metrics::compute_profile_completeness(profile);
    match format {
        OutputFormat::Json => print_json(&ProfileView {
            completeness,
            chart: charts::completeness_pie(completeness),
        }),
        OutputFormat::Markdown => {
            print!("{}", report::render_completeness(completeness));
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }
    let level = settings
        .level()
        .with_context(|| format!("unknown log level '{}'", settings.log_level))?;
    logging::init_logging(level);

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&settings).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&settings).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { stage, csv } => {
            let pool = connect(&settings).await?;
            let written = db::import_csv(&pool, stage, &csv).await?;
            println!("Saved {written} {stage} class records from {}.", csv.display());
        }
        Commands::Summary {
            stage,
            csv,
            threshold,
            exclude_missing,
            format,
        } => {
            let options = CohortOptions {
                passing_threshold: threshold,
                mode: if exclude_missing {
                    AveragingMode::ExcludeMissing
                } else {
                    AveragingMode::ZeroFill
                },
            };
            let records = load_cohort(&settings, stage, csv.as_deref()).await?;
            let summary = summarize(&records, stage, &options);

            match format {
                OutputFormat::Json => print_json(&charts::cohort_charts(&summary))?,
                OutputFormat::Markdown => {
                    let mut output = String::new();
                    report::render_cohort_section(&mut output, &summary, threshold);
                    print!("{output}");
                }
            }
        }
        Commands::Profile { user, json, format } => {
            let profile = match (user, json) {
                (_, Some(path)) => ingest::read_profile_json(&path)?,
                (Some(user), None) => {
                    let pool = connect(&settings).await?;
                    db::fetch_profile(&pool, user).await?
                }
                (None, None) => bail!("pass --user or --json"),
            };
            show_profile(&profile, format)?;
        }
        Commands::Compare { user, format } => {
            let pool = connect(&settings).await?;
            let tenth = db::fetch_latest_record(&pool, user, Stage::Tenth).await?;
            let twelfth = db::fetch_latest_record(&pool, user, Stage::Twelfth).await?;
            if tenth.is_none() && twelfth.is_none() {
                println!("No marks found for this user.");
                return Ok(());
            }

            let points = charts::student_comparison(tenth.as_ref(), twelfth.as_ref());
            match format {
                OutputFormat::Json => print_json(&points)?,
                OutputFormat::Markdown => {
                    print!("{}", report::render_student_comparison(&points));
                    for record in tenth.iter().chain(twelfth.iter()) {
                        let failed = metrics::classify_pass_fail(record, PASSING_THRESHOLD);
                        println!(
                            "- {} class ({}): {}",
                            record.stage,
                            record.year,
                            if failed { "failed" } else { "passed" }
                        );
                    }
                }
            }
        }
        Commands::SetMarks {
            user,
            stage,
            year,
            scores,
        } => {
            let year = year.unwrap_or_else(|| chrono::Utc::now().year());
            let record = record_from_scores(user, stage, year, &scores)?;
            let pool = connect(&settings).await?;
            db::upsert_marks(&pool, &record).await?;
            println!("Saved {stage} class marks for {year}.");
        }
        Commands::UpdateProfile {
            user,
            name,
            age,
            location,
        } => {
            let pool = connect(&settings).await?;
            db::update_profile(&pool, user, ProfileUpdate { name, age, location }).await?;
            let profile = db::fetch_profile(&pool, user).await?;
            println!(
                "Profile updated ({}% complete).",
                metrics::compute_profile_completeness(&profile)
            );
        }
        Commands::Report {
            tenth_csv,
            twelfth_csv,
            threshold,
            out,
        } => {
            let options = CohortOptions {
                passing_threshold: threshold,
                ..CohortOptions::default()
            };
            let (tenth, twelfth) = match (tenth_csv, twelfth_csv) {
                (Some(tenth), Some(twelfth)) => (
                    ingest::read_records_csv(&tenth, Stage::Tenth)?,
                    ingest::read_records_csv(&twelfth, Stage::Twelfth)?,
                ),
                _ => {
                    let pool = connect(&settings).await?;
                    (
                        db::fetch_stage_records(&pool, Stage::Tenth).await?,
                        db::fetch_stage_records(&pool, Stage::Twelfth).await?,
                    )
                }
            };
            let report = report::build_report(
                &summarize(&tenth, Stage::Tenth, &options),
                &summarize(&twelfth, Stage::Twelfth, &options),
                threshold,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_score_arguments() {
        assert_eq!(parse_score("math=88").unwrap(), (Subject::Math, 88.0));
        assert_eq!(
            parse_score("social_science= 41.5").unwrap(),
            (Subject::SocialScience, 41.5)
        );
        assert!(parse_score("math").is_err());
        assert!(parse_score("math=ninety").is_err());
        for raw in ["math=NaN", "math=inf", "math=-inf"] {
            let err = parse_score(raw).unwrap_err();
            assert!(err.contains("finite"), "{err}");
        }
    }

    #[test]
    fn threshold_must_be_finite() {
        assert_eq!(parse_threshold("40").unwrap(), 40.0);
        assert_eq!(parse_threshold(" 33.5 ").unwrap(), 33.5);
        assert!(parse_threshold("NaN").is_err());
        assert!(parse_threshold("inf").is_err());
        assert!(parse_threshold("high").is_err());

        let cli = Cli::try_parse_from(["marks-dashboard", "summary", "--stage", "tenth"]).unwrap();
        match cli.command {
            Commands::Summary { threshold, .. } => assert_eq!(threshold, PASSING_THRESHOLD),
            _ => panic!("expected summary"),
        }
        assert!(Cli::try_parse_from([
            "marks-dashboard",
            "summary",
            "--stage",
            "tenth",
            "--threshold",
            "NaN",
        ])
        .is_err());
    }

    #[test]
    fn marks_form_requires_every_stage_subject() {
        let user = Uuid::new_v4();
        let full: Vec<(Subject, f64)> = Stage::Twelfth
            .subjects()
            .iter()
            .map(|&subject| (subject, 60.0))
            .collect();
        let record = record_from_scores(user, Stage::Twelfth, 2024, &full).unwrap();
        assert_eq!(record.scores.len(), 5);

        let err = record_from_scores(user, Stage::Twelfth, 2024, &full[..3]).unwrap_err();
        assert!(err.to_string().contains("Chemistry"));

        let err =
            record_from_scores(user, Stage::Twelfth, 2024, &[(Subject::Science, 50.0)]).unwrap_err();
        assert!(err.to_string().contains("not a 12th class subject"));
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
