use std::str::FromStr;

use energy_store::{
    db::{
        ledger_queries::{self, LedgerWriteError},
        schema,
    },
    AmbientTemperatureSample, ReconstructedRecord,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::transform::value_at;

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("ledger already holds a record for timestamp {0}")]
    DuplicateTimestamp(i64),
    #[error("ledger database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl From<LedgerWriteError> for LedgerError {
    fn from(e: LedgerWriteError) -> Self {
        match e {
            LedgerWriteError::DuplicateTimestamp(ts) => Self::DuplicateTimestamp(ts),
            LedgerWriteError::Db(e) => Self::Db(e),
        }
    }
}

/// Insert-only store of reconstructed ticks plus the ambient temperature cache.
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str(uri)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn init_schema(&self) -> Result<(), LedgerError> {
        schema::apply(&self.pool, schema::LEDGER_SCHEMA).await?;
        Ok(())
    }

    /// Most recent reconstructed tick.
    pub async fn cursor(&self) -> Result<Option<i64>, LedgerError> {
        Ok(ledger_queries::last_timestamp(&self.pool).await?)
    }

    pub async fn previous_before(&self, t: i64) -> Result<Option<ReconstructedRecord>, LedgerError> {
        Ok(ledger_queries::latest_before(&self.pool, t).await?)
    }

    pub async fn append(&self, record: &ReconstructedRecord) -> Result<(), LedgerError> {
        ledger_queries::insert_record(&self.pool, record).await?;
        metrics::counter!("ledger_records_appended_total").increment(1);
        Ok(())
    }

    /// Up to `limit` records awaiting upload, oldest first.
    pub async fn pending(&self, limit: usize) -> Result<Vec<ReconstructedRecord>, LedgerError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(ledger_queries::pending_records(&self.pool, limit).await?)
    }

    /// Returns `false` when the record was already published.
    pub async fn mark_published(&self, t: i64) -> Result<bool, LedgerError> {
        Ok(ledger_queries::mark_published(&self.pool, t).await? > 0)
    }

    /// Merges observations into the cache. Returns how many rows actually changed.
    pub async fn ingest_temperatures(
        &self,
        samples: &[AmbientTemperatureSample],
    ) -> Result<usize, LedgerError> {
        let mut changed = 0;
        for sample in samples {
            changed += ledger_queries::upsert_temperature(&self.pool, sample).await? as usize;
        }
        Ok(changed)
    }

    /// Cached ambient temperature interpolated at `t`.
    pub async fn temperature_at(&self, t: i64, max_gap: i64) -> Result<Option<f64>, LedgerError> {
        let (before, after) = tokio::try_join!(
            ledger_queries::temperature_at_or_before(&self.pool, t),
            ledger_queries::temperature_after(&self.pool, t)
        )?;
        Ok(value_at(t, before.map(Into::into), after.map(Into::into), Some(max_gap)))
    }

    /// Fills in ambient temperature for records reconstructed before the weather data
    /// arrived, and queues them for re-upload. Records at or after `since` only.
    pub async fn backfill_ambient(&self, max_gap: i64, since: i64) -> Result<usize, LedgerError> {
        let missing = ledger_queries::timestamps_missing_temperature(&self.pool, since).await?;

        let mut filled = 0;
        for ts in missing {
            let Some(temp) = self.temperature_at(ts, max_gap).await? else {
                continue;
            };
            filled += ledger_queries::fill_temperature(&self.pool, ts, temp).await? as usize;
        }

        if filled > 0 {
            tracing::info!(filled, "backfilled ambient temperature");
            metrics::counter!("ledger_temperatures_backfilled_total").increment(filled as u64);
        }
        Ok(filled)
    }
}
