use std::str::FromStr;

use energy_store::{
    db::sample_queries,
    CounterKind, RawCounterSample,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::{
    config::DatabaseConfig,
    transform::{aggregate_panels, value_at, PanelAggregate},
};

/// Read-only view over the meter and solar collectors' logs.
#[derive(Clone)]
pub struct SampleStore {
    meter: SqlitePool,
    solar: SqlitePool,
}

impl SampleStore {
    pub fn new(meter: SqlitePool, solar: SqlitePool) -> Self {
        Self { meter, solar }
    }

    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let meter = read_only_pool(&cfg.meter_uri, cfg.max_connections).await?;
        let solar = read_only_pool(&cfg.solar_uri, cfg.max_connections).await?;
        Ok(Self::new(meter, solar))
    }

    fn pool(&self, kind: CounterKind) -> &SqlitePool {
        match kind {
            CounterKind::Imported | CounterKind::Exported => &self.meter,
            CounterKind::Generated => &self.solar,
        }
    }

    pub async fn latest_at_or_before(
        &self,
        kind: CounterKind,
        t: i64,
    ) -> Result<Option<RawCounterSample>, sqlx::Error> {
        sample_queries::latest_at_or_before(self.pool(kind), kind, t).await
    }

    pub async fn earliest_after(
        &self,
        kind: CounterKind,
        t: i64,
    ) -> Result<Option<RawCounterSample>, sqlx::Error> {
        sample_queries::earliest_after(self.pool(kind), kind, t).await
    }

    pub async fn max_before(&self, kind: CounterKind, t: i64) -> Result<Option<f64>, sqlx::Error> {
        sample_queries::max_before(self.pool(kind), kind, t).await
    }

    /// Interpolated counter value at `t`, or `None` without a usable bracket.
    pub async fn counter_at(&self, kind: CounterKind, t: i64) -> Result<Option<f64>, sqlx::Error> {
        let (before, after) = tokio::try_join!(
            self.latest_at_or_before(kind, t),
            self.earliest_after(kind, t)
        )?;
        let value = value_at(t, before.map(Into::into), after.map(Into::into), None);
        if value.is_none() {
            tracing::debug!(kind = kind.as_str(), timestamp = t, "no usable bracket");
        }
        Ok(value)
    }

    /// Median of the per-panel interpolated telemetry at `t`.
    pub async fn panels_at(&self, t: i64, max_gap: i64) -> Result<PanelAggregate, sqlx::Error> {
        let samples = sample_queries::panel_samples(&self.solar, t - max_gap, t + max_gap).await?;
        Ok(aggregate_panels(&samples, t, max_gap))
    }

    /// Mean exporting net demand over `(from, to]` in W.
    pub async fn export_demand(&self, from: i64, to: i64) -> Result<Option<f64>, sqlx::Error> {
        sample_queries::mean_export_demand(&self.meter, from, to).await
    }
}

async fn read_only_pool(uri: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(uri)?.read_only(true);
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}
