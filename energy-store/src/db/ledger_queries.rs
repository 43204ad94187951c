//! Queries over the reconstruction ledger and its temperature cache.

use sqlx::SqlitePool;

use crate::domain::{AmbientTemperatureSample, ReconstructedRecord};

#[derive(thiserror::Error, Debug)]
pub enum LedgerWriteError {
    #[error("ledger already holds a record for timestamp {0}")]
    DuplicateTimestamp(i64),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

// Slots are cast so that ledgers created with INTEGER slot columns read back as REAL.
const SELECT_RECORD: &str = r#"
    SELECT
        p.timestamp AS timestamp,
        CAST(p.v1 AS REAL) AS v1,
        CAST(p.v2 AS REAL) AS v2,
        CAST(p.v3 AS REAL) AS v3,
        CAST(p.v4 AS REAL) AS v4,
        CAST(p.v5 AS REAL) AS v5,
        CAST(p.v6 AS REAL) AS v6,
        CAST(p.v7 AS REAL) AS v7,
        CAST(p.v8 AS REAL) AS v8,
        CAST(p.v9 AS REAL) AS v9,
        CAST(p.v10 AS REAL) AS v10,
        CAST(p.v11 AS REAL) AS v11,
        CAST(p.v12 AS REAL) AS v12,
        s.wh AS synthetic_export_wh,
        p.need_upload AS need_upload
    FROM pvoutput p
    LEFT JOIN synthetic_export s ON s.timestamp = p.timestamp
"#;

/// Inserts the record and, when present, its synthetic export counter in one
/// transaction.
pub async fn insert_record(
    pool: &SqlitePool,
    record: &ReconstructedRecord,
) -> Result<(), LedgerWriteError> {
    let mut tx = pool.begin().await?;

    let mut query = sqlx::query(
        r#"
        INSERT INTO pvoutput (
            timestamp,
            v1, v2, v3, v4, v5, v6, v7, v8, v9, v10, v11, v12,
            need_upload
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(record.timestamp);

    for (_, value) in record.slots() {
        query = query.bind(value);
    }

    let res = query.bind(record.pending_publish).execute(&mut *tx).await;
    match res {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(LedgerWriteError::DuplicateTimestamp(record.timestamp));
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(wh) = record.synthetic_export_wh {
        sqlx::query("INSERT OR REPLACE INTO synthetic_export (timestamp, wh) VALUES (?1, ?2)")
            .bind(record.timestamp)
            .bind(wh)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Most recent timestamp in the ledger.
pub async fn last_timestamp(pool: &SqlitePool) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(timestamp) FROM pvoutput")
        .fetch_one(pool)
        .await
}

/// The record immediately preceding `t`.
pub async fn latest_before(
    pool: &SqlitePool,
    t: i64,
) -> Result<Option<ReconstructedRecord>, sqlx::Error> {
    let sql = format!("{SELECT_RECORD} WHERE p.timestamp < ?1 ORDER BY p.timestamp DESC LIMIT 1");
    sqlx::query_as::<_, ReconstructedRecord>(&sql)
        .bind(t)
        .fetch_optional(pool)
        .await
}

/// Oldest-first records still waiting for upload.
pub async fn pending_records(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<ReconstructedRecord>, sqlx::Error> {
    let sql = format!("{SELECT_RECORD} WHERE p.need_upload = 1 ORDER BY p.timestamp ASC LIMIT ?1");
    sqlx::query_as::<_, ReconstructedRecord>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await
}

/// Returns the number of rows changed: 0 when already published or absent.
pub async fn mark_published(pool: &SqlitePool, t: i64) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("UPDATE pvoutput SET need_upload = 0 WHERE timestamp = ?1 AND need_upload = 1")
        .bind(t)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn timestamps_missing_temperature(
    pool: &SqlitePool,
    since: i64,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT timestamp FROM pvoutput WHERE v5 IS NULL AND timestamp >= ?1 ORDER BY timestamp",
    )
    .bind(since)
    .fetch_all(pool)
    .await
}

/// Fills a missing temperature and queues the record for re-upload. Never overwrites
/// a temperature that is already present.
pub async fn fill_temperature(pool: &SqlitePool, t: i64, degrees_c: f64) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        "UPDATE pvoutput SET v5 = ?2, need_upload = 1 WHERE timestamp = ?1 AND v5 IS NULL",
    )
    .bind(t)
    .bind(degrees_c)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

/// Inserts or corrects a cached observation. Replaying an identical observation
/// touches nothing and returns 0.
pub async fn upsert_temperature(
    pool: &SqlitePool,
    sample: &AmbientTemperatureSample,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        r#"
        INSERT INTO temperature (timestamp, degC)
        VALUES (?1, ?2)
        ON CONFLICT (timestamp) DO UPDATE
            SET degC = excluded.degC
            WHERE temperature.degC <> excluded.degC
        "#,
    )
    .bind(sample.timestamp)
    .bind(sample.degrees_c)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

pub async fn temperature_at_or_before(
    pool: &SqlitePool,
    t: i64,
) -> Result<Option<AmbientTemperatureSample>, sqlx::Error> {
    sqlx::query_as::<_, AmbientTemperatureSample>(
        "SELECT timestamp, CAST(degC AS REAL) AS degC FROM temperature WHERE timestamp <= ?1 ORDER BY timestamp DESC LIMIT 1",
    )
    .bind(t)
    .fetch_optional(pool)
    .await
}

pub async fn temperature_after(
    pool: &SqlitePool,
    t: i64,
) -> Result<Option<AmbientTemperatureSample>, sqlx::Error> {
    sqlx::query_as::<_, AmbientTemperatureSample>(
        "SELECT timestamp, CAST(degC AS REAL) AS degC FROM temperature WHERE timestamp > ?1 ORDER BY timestamp ASC LIMIT 1",
    )
    .bind(t)
    .fetch_optional(pool)
    .await
}
