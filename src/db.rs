use anyhow::{bail, Context};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::ingest;
use crate::models::{ProfileFields, ProfileUpdate, Stage, Subject, SubjectScoreRecord};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Aarav Sharma",
            "aarav.sharma@example.com",
            17,
            "Jaipur",
            [72.0, 64.0, 58.0, 81.0, 69.0],
            [68.0, 59.0, 52.0, 61.0, 77.0],
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Meera Iyer",
            "meera.iyer@example.com",
            18,
            "Chennai",
            [88.0, 91.0, 86.0, 90.0, 84.0],
            [79.0, 94.0, 88.0, 83.0, 89.0],
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Kabir Singh",
            "kabir.singh@example.com",
            17,
            "Lucknow",
            [61.0, 28.0, 45.0, 55.0, 49.0],
            [57.0, 31.0, 40.0, 36.0, 62.0],
        ),
    ];

    for (id, name, email, age, location, tenth, twelfth) in students {
        sqlx::query(
            r#"
            INSERT INTO marks_dashboard.users (id, name, email, age, location)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, age = EXCLUDED.age, location = EXCLUDED.location
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(age)
        .bind(location)
        .execute(pool)
        .await?;

        for (stage, scores) in [(Stage::Tenth, tenth), (Stage::Twelfth, twelfth)] {
            let record = stage
                .subjects()
                .iter()
                .zip(scores)
                .fold(SubjectScoreRecord::new(id, stage, 2024), |record, (&subject, score)| {
                    record.with_score(subject, score)
                });
            upsert_marks(pool, &record).await?;
        }
    }

    Ok(())
}

pub async fn import_csv(
    pool: &PgPool,
    stage: Stage,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    let records = ingest::read_records_csv(csv_path, stage)?;
    let mut written = 0usize;

    for record in &records {
        sqlx::query(
            "INSERT INTO marks_dashboard.users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING",
        )
        .bind(record.student_id)
        .execute(pool)
        .await?;

        written += upsert_marks(pool, record).await? as usize;
    }

    Ok(written)
}

fn column_list(stage: Stage) -> String {
    stage
        .subjects()
        .iter()
        .map(|subject| subject.column())
        .collect::<Vec<_>>()
        .join(", ")
}

fn record_from_row(row: &PgRow, stage: Stage) -> anyhow::Result<SubjectScoreRecord> {
    let mut record = SubjectScoreRecord::new(row.try_get("user_id")?, stage, row.try_get("year")?);
    for &subject in stage.subjects() {
        let score: Option<f64> = row
            .try_get(subject.column())
            .with_context(|| format!("reading {}", subject.column()))?;
        if let Some(score) = score {
            record = record.with_score(subject, score);
        }
    }
    Ok(record)
}

/// Inserts or replaces the record's `(user_id, year)` row. Only the stage's own
/// subject columns are written.
pub async fn upsert_marks(pool: &PgPool, record: &SubjectScoreRecord) -> anyhow::Result<bool> {
    let subjects: &[Subject] = record.stage.subjects();
    let placeholders = (0..subjects.len())
        .map(|offset| format!("${}", offset + 4))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = subjects
        .iter()
        .map(|subject| format!("{0} = EXCLUDED.{0}", subject.column()))
        .collect::<Vec<_>>()
        .join(", ");
    let statement = format!(
        "INSERT INTO {table} (id, user_id, year, {columns}) \
         VALUES ($1, $2, $3, {placeholders}) \
         ON CONFLICT (user_id, year) DO UPDATE SET {updates}, created_at = NOW()",
        table = record.stage.table(),
        columns = column_list(record.stage),
    );

    let mut query = sqlx::query(&statement)
        .bind(Uuid::new_v4())
        .bind(record.student_id)
        .bind(record.year);
    for &subject in subjects {
        query = query.bind(record.score(subject));
    }

    let result = query.execute(pool).await?;
    tracing::debug!(
        stage = %record.stage,
        student = %record.student_id,
        year = record.year,
        "upserted marks"
    );
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_stage_records(
    pool: &PgPool,
    stage: Stage,
) -> anyhow::Result<Vec<SubjectScoreRecord>> {
    let query = format!(
        "SELECT user_id, year, {} FROM {}",
        column_list(stage),
        stage.table()
    );
    let rows = sqlx::query(&query)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to fetch {stage} marks"))?;

    rows.iter().map(|row| record_from_row(row, stage)).collect()
}

pub async fn fetch_latest_record(
    pool: &PgPool,
    user_id: Uuid,
    stage: Stage,
) -> anyhow::Result<Option<SubjectScoreRecord>> {
    let query = format!(
        "SELECT user_id, year, {} FROM {} WHERE user_id = $1 \
         ORDER BY created_at DESC LIMIT 1",
        column_list(stage),
        stage.table()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch {stage} marks for {user_id}"))?;

    row.as_ref().map(|row| record_from_row(row, stage)).transpose()
}

pub async fn fetch_profile(pool: &PgPool, user_id: Uuid) -> anyhow::Result<ProfileFields> {
    let row = sqlx::query(
        "SELECT name, email, age, location, created_at, last_login \
         FROM marks_dashboard.users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no profile found for user {user_id}"))?;

    Ok(ProfileFields {
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        age: row.try_get("age")?,
        location: row.try_get("location")?,
        created_at: row.try_get("created_at")?,
        last_login: row.try_get("last_login")?,
    })
}

pub async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    update: ProfileUpdate,
) -> anyhow::Result<()> {
    let update = update.normalized();
    if update.is_empty() {
        bail!("nothing to update: pass --name, --age or --location");
    }

    let result = sqlx::query(
        r#"
        UPDATE marks_dashboard.users
        SET name = COALESCE($2, name),
            age = COALESCE($3, age),
            location = COALESCE($4, location)
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(update.name)
    .bind(update.age)
    .bind(update.location)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        bail!("no profile found for user {user_id}");
    }
    Ok(())
}
