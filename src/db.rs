use std::path::Path;
use std::time::Duration;

use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::models::{CourseOffering, MedicineInstitution, SubjectWeights};
use crate::retry::{self, RetryPolicy};

/// Storage failures surfaced to the user, distinguished by cause so each gets
/// its own message.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table does not exist; run `sisu-medicina init-db` first")]
    MissingTable(#[source] sqlx::Error),
    #[error("duplicate records violate a uniqueness constraint")]
    UniqueViolation(#[source] sqlx::Error),
    #[error("database operation failed: {0}")]
    Database(#[from] sqlx::Error),
}

const UNDEFINED_TABLE: &str = "42P01";
const UNIQUE_VIOLATION: &str = "23505";

fn classify(err: sqlx::Error) -> StoreError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.to_string());
    match code.as_deref() {
        Some(UNDEFINED_TABLE) => StoreError::MissingTable(err),
        Some(UNIQUE_VIOLATION) => StoreError::UniqueViolation(err),
        _ => StoreError::Database(err),
    }
}

fn store_policy() -> RetryPolicy {
    RetryPolicy::exponential(3, Duration::from_secs(1))
}

pub async fn init_db(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS medicine_institutions (
            co_ies TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            short_name TEXT NOT NULL,
            state TEXT NOT NULL,
            city TEXT NOT NULL,
            last_update TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(classify)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS universities (
            name TEXT NOT NULL,
            short_name TEXT NOT NULL,
            state TEXT NOT NULL,
            city TEXT NOT NULL,
            course_id TEXT NOT NULL,
            min_score DOUBLE PRECISION NOT NULL,
            weight_linguagens DOUBLE PRECISION NOT NULL,
            weight_humanas DOUBLE PRECISION NOT NULL,
            weight_natureza DOUBLE PRECISION NOT NULL,
            weight_matematica DOUBLE PRECISION NOT NULL,
            weight_redacao DOUBLE PRECISION NOT NULL,
            last_update TIMESTAMPTZ NOT NULL,
            UNIQUE (name, course_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(classify)?;

    Ok(())
}

pub async fn upsert_institutions(
    pool: &PgPool,
    institutions: &[MedicineInstitution],
) -> Result<(), StoreError> {
    let policy = store_policy();
    retry::retry(&policy, || async move {
        for institution in institutions {
            sqlx::query(
                r#"
                INSERT INTO medicine_institutions
                (co_ies, name, short_name, state, city, last_update)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (co_ies) DO UPDATE
                SET name = EXCLUDED.name,
                    short_name = EXCLUDED.short_name,
                    state = EXCLUDED.state,
                    city = EXCLUDED.city,
                    last_update = EXCLUDED.last_update
                "#,
            )
            .bind(&institution.co_ies)
            .bind(&institution.name)
            .bind(&institution.short_name)
            .bind(&institution.state)
            .bind(&institution.city)
            .bind(institution.last_update)
            .execute(pool)
            .await
            .map_err(classify)?;
        }
        Ok(())
    })
    .await
}

pub async fn upsert_offerings(
    pool: &PgPool,
    offerings: &[CourseOffering],
) -> Result<(), StoreError> {
    let policy = store_policy();
    retry::retry(&policy, || async move {
        for offering in offerings {
            sqlx::query(
                r#"
                INSERT INTO universities
                (name, short_name, state, city, course_id, min_score,
                 weight_linguagens, weight_humanas, weight_natureza,
                 weight_matematica, weight_redacao, last_update)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (name, course_id) DO UPDATE
                SET short_name = EXCLUDED.short_name,
                    state = EXCLUDED.state,
                    city = EXCLUDED.city,
                    min_score = EXCLUDED.min_score,
                    weight_linguagens = EXCLUDED.weight_linguagens,
                    weight_humanas = EXCLUDED.weight_humanas,
                    weight_natureza = EXCLUDED.weight_natureza,
                    weight_matematica = EXCLUDED.weight_matematica,
                    weight_redacao = EXCLUDED.weight_redacao,
                    last_update = EXCLUDED.last_update
                "#,
            )
            .bind(&offering.name)
            .bind(&offering.short_name)
            .bind(&offering.state)
            .bind(&offering.city)
            .bind(&offering.course_id)
            .bind(offering.min_score)
            .bind(offering.weights.linguagens)
            .bind(offering.weights.humanas)
            .bind(offering.weights.natureza)
            .bind(offering.weights.matematica)
            .bind(offering.weights.redacao)
            .bind(offering.last_update)
            .execute(pool)
            .await
            .map_err(classify)?;
        }
        Ok(())
    })
    .await
}

pub async fn fetch_offerings(pool: &PgPool) -> Result<Vec<CourseOffering>, StoreError> {
    let policy = store_policy();
    let rows = retry::retry(&policy, || async move {
        sqlx::query("SELECT * FROM universities ORDER BY state")
            .fetch_all(pool)
            .await
            .map_err(classify)
    })
    .await?;

    let mut offerings = Vec::with_capacity(rows.len());
    for row in rows {
        offerings.push(CourseOffering {
            name: row.get("name"),
            short_name: row.get("short_name"),
            state: row.get("state"),
            city: row.get("city"),
            course_id: row.get("course_id"),
            min_score: row.get("min_score"),
            weights: SubjectWeights {
                linguagens: row.get("weight_linguagens"),
                humanas: row.get("weight_humanas"),
                natureza: row.get("weight_natureza"),
                matematica: row.get("weight_matematica"),
                redacao: row.get("weight_redacao"),
            },
            last_update: row.get("last_update"),
        });
    }

    Ok(offerings)
}

/// Write the normalized offerings to a CSV file, one row per offering.
pub fn export_csv(offerings: &[CourseOffering], path: &Path) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "name",
        "short_name",
        "state",
        "city",
        "course_id",
        "min_score",
        "weight_linguagens",
        "weight_humanas",
        "weight_natureza",
        "weight_matematica",
        "weight_redacao",
        "last_update",
    ])?;

    for offering in offerings {
        writer.write_record([
            offering.name.clone(),
            offering.short_name.clone(),
            offering.state.clone(),
            offering.city.clone(),
            offering.course_id.clone(),
            offering.min_score.to_string(),
            offering.weights.linguagens.to_string(),
            offering.weights.humanas.to_string(),
            offering.weights.natureza.to_string(),
            offering.weights.matematica.to_string(),
            offering.weights.redacao.to_string(),
            offering.last_update.to_rfc3339(),
        ])?;
    }

    writer.flush()?;
    Ok(offerings.len())
}
