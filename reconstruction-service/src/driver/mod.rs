//! Walks the reconstruction grid, then backfills and uploads.

use energy_store::{CounterKind, ReconstructedRecord};
use futures::TryFutureExt;

use crate::{
    config::{AppConfig, ReconstructionConfig, WeatherConfig},
    sinks::{Ledger, LedgerError, PublishReport, PublishTransport, Publisher},
    sources::{load_observations, SampleStore},
    transform::{
        calculate, CalculationError, CalculatorSettings, PreviousTick, Reconstruction, TickInputs, TickOutcome,
    },
};

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Calculation(#[from] CalculationError),
    #[error("no generation or consumption at {timestamp}, which is past the waiting window")]
    NoPublishableMetric { timestamp: i64 },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("sample store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl RunError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Calculation(CalculationError::PreSunriseGeneration { .. }) => 3,
            Self::NoPublishableMetric { .. } => 4,
            Self::Ledger(_) | Self::Store(_) => 1,
        }
    }

    /// Whether a scheduled loop must stop rather than try again next period.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Ledger(LedgerError::Db(_)))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub temperatures_ingested: usize,
    pub reconstructed: usize,
    /// Tick the walk stopped at because its data has not arrived yet.
    pub waiting_at: Option<i64>,
    pub backfilled: usize,
    pub publish: PublishReport,
}

pub struct Driver<T> {
    settings: CalculatorSettings,
    reconstruction: ReconstructionConfig,
    weather: Option<WeatherConfig>,
    store: SampleStore,
    ledger: Ledger,
    publisher: Publisher<T>,
}

impl<T: PublishTransport> Driver<T> {
    pub fn new(cfg: &AppConfig, store: SampleStore, ledger: Ledger, transport: T) -> anyhow::Result<Self> {
        Ok(Self {
            settings: CalculatorSettings::from_config(cfg)?,
            reconstruction: cfg.reconstruction.clone(),
            weather: cfg.weather.clone(),
            store,
            publisher: Publisher::new(ledger.clone(), transport, cfg.publisher.rate_limit_margin),
            ledger,
        })
    }

    /// One full cycle as of `now` (unix seconds).
    pub async fn run_once(&self, now: i64) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary {
            temperatures_ingested: self.ingest_weather().await?,
            ..RunSummary::default()
        };

        let (reconstructed, waiting_at) = self.reconstruct(now).await?;
        summary.reconstructed = reconstructed;
        summary.waiting_at = waiting_at;

        let since = self
            .reconstruction
            .backfill_lookback_secs
            .map_or(i64::MIN, |lookback| now - lookback);
        summary.backfilled = self
            .ledger
            .backfill_ambient(self.reconstruction.temperature_max_gap_secs, since)
            .await?;

        summary.publish = self.publisher.publish_batch().await?;
        Ok(summary)
    }

    /// Temperature is optional enrichment, so an unreadable snapshot only warns.
    async fn ingest_weather(&self) -> Result<usize, RunError> {
        let Some(weather) = &self.weather else {
            return Ok(0);
        };

        match load_observations(&weather.observations_path).await {
            Ok(samples) => Ok(self.ledger.ingest_temperatures(&samples).await?),
            Err(e) => {
                tracing::warn!(path = %weather.observations_path, error = %e, "weather snapshot unavailable");
                Ok(0)
            }
        }
    }

    /// Reconstructs every grid tick after the ledger cursor and before
    /// `now - safety_lag`, in order.
    async fn reconstruct(&self, now: i64) -> Result<(usize, Option<i64>), RunError> {
        let interval = self.reconstruction.interval_secs;
        let end = now - self.reconstruction.safety_lag_secs;
        let cursor = self
            .ledger
            .cursor()
            .await?
            .unwrap_or(self.reconstruction.start_timestamp);

        let mut reconstructed = 0;
        let mut t = next_tick(cursor, interval);
        while t < end {
            let Some(record) = self.reconstruct_tick(t).await? else {
                if now - t < self.reconstruction.waiting_window_secs {
                    tracing::info!(timestamp = t, "no data for tick yet, waiting");
                    return Ok((reconstructed, Some(t)));
                }
                return Err(RunError::NoPublishableMetric { timestamp: t });
            };

            self.ledger.append(&record).await?;
            reconstructed += 1;
            t += interval;
        }

        Ok((reconstructed, None))
    }

    async fn reconstruct_tick(&self, t: i64) -> Result<Option<ReconstructedRecord>, RunError> {
        let (inputs, previous) = self.gather(t).await?;

        let reconstruction = match calculate(&self.settings, &inputs, &previous)? {
            TickOutcome::Record(r) => r,
            TickOutcome::NoMetric => return Ok(None),
        };

        for adjustment in &reconstruction.adjustments {
            metrics::counter!("reconstruction_adjustments_total", "kind" => adjustment.as_str()).increment(1);
        }
        let adjustments: Vec<&str> = reconstruction.adjustments.iter().map(|a| a.as_str()).collect();
        metrics::counter!("reconstruction_ticks_total").increment(1);

        let delta = TickDeltas::new(&inputs, &previous, &reconstruction);
        let record = reconstruction.record;
        tracing::info!(
            timestamp = t,
            import_delta_wh = ?delta.imported_wh,
            export_delta_wh = ?delta.exported_wh,
            consumption_delta_wh = ?delta.consumption_wh,
            generation_delta_wh = ?delta.generation_wh,
            consumption_wh = ?record.energy_consumption_wh,
            generation_wh = ?record.energy_generation_wh,
            adjustments = ?adjustments,
            "reconstructed tick"
        );
        Ok(Some(record))
    }

    /// Every lookup for a tick is independent, so they run concurrently.
    async fn gather(&self, t: i64) -> Result<(TickInputs, PreviousTick), RunError> {
        let interval = self.reconstruction.interval_secs;
        let prior = t - interval;
        let store = &self.store;

        let meter = async {
            tokio::try_join!(
                store.counter_at(CounterKind::Imported, t),
                store.counter_at(CounterKind::Exported, t),
                store.counter_at(CounterKind::Imported, prior),
                store.counter_at(CounterKind::Exported, prior),
                store.export_demand(prior, t),
                store.max_before(CounterKind::Exported, t),
            )
        };
        let solar = async {
            tokio::try_join!(
                store.counter_at(CounterKind::Generated, t),
                store.panels_at(t, 3 * interval),
            )
        };
        let ledger = async {
            tokio::try_join!(
                self.ledger
                    .temperature_at(t, self.reconstruction.temperature_max_gap_secs),
                self.ledger.previous_before(t),
            )
        };

        let (
            (imported_wh, exported_wh, prior_imported_wh, prior_exported_wh, export_demand_w, export_high_water_wh),
            (generated_wh, panels),
            (ambient_temp_c, previous),
        ) = tokio::try_join!(
            meter.err_into::<RunError>(),
            solar.err_into::<RunError>(),
            ledger.err_into::<RunError>(),
        )?;

        let inputs = TickInputs {
            timestamp: t,
            imported_wh,
            exported_wh,
            generated_wh,
            prior_imported_wh,
            prior_exported_wh,
            export_demand_w,
            export_high_water_wh,
            ambient_temp_c,
            panels,
        };
        let previous = previous.as_ref().map(PreviousTick::from).unwrap_or_default();

        Ok((inputs, previous))
    }
}

/// How far each quantity moved over the interval ending at a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct TickDeltas {
    imported_wh: Option<f64>,
    exported_wh: Option<f64>,
    consumption_wh: Option<f64>,
    generation_wh: Option<f64>,
}

impl TickDeltas {
    fn new(inputs: &TickInputs, previous: &PreviousTick, reconstruction: &Reconstruction) -> Self {
        let record = &reconstruction.record;
        let exported_wh = match record.synthetic_export_wh {
            Some(counter) => Some(counter - previous.synthetic_export_wh.unwrap_or(0.0)),
            None => delta(reconstruction.exported_wh, inputs.prior_exported_wh),
        };

        Self {
            imported_wh: delta(inputs.imported_wh, inputs.prior_imported_wh),
            exported_wh,
            consumption_wh: delta(record.energy_consumption_wh, previous.consumption_wh),
            generation_wh: delta(record.energy_generation_wh, previous.generation_wh),
        }
    }
}

fn delta(now: Option<f64>, before: Option<f64>) -> Option<f64> {
    Some(now? - before?)
}

/// First grid point strictly after `cursor`.
fn next_tick(cursor: i64, interval: i64) -> i64 {
    (cursor.div_euclid(interval) + 1) * interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::publisher::tests::FakeTransport;
    use energy_store::db::{memory_pool, schema};
    use sqlx::SqlitePool;

    // 2024-06-03 12:00 in Brisbane.
    const NOON: i64 = 1_717_380_000;

    fn config(interval: i64, start: i64) -> AppConfig {
        AppConfig::from_toml(&format!(
            r#"
            [database]
            meter_uri = "sqlite::memory:"
            solar_uri = "sqlite::memory:"
            ledger_uri = "sqlite::memory:"

            [reconstruction]
            interval_secs = {interval}
            start_timestamp = {start}
            timezone = "Australia/Brisbane"

            [location]
            latitude = -27.47
            longitude = 153.03

            [publisher]
            api_key = "key"
            system_id = "1"
            "#
        ))
        .unwrap()
    }

    struct Fixture {
        meter: SqlitePool,
        solar: SqlitePool,
        ledger: Ledger,
    }

    impl Fixture {
        async fn new() -> Self {
            Self {
                meter: memory_pool(&[schema::METER_LOG_SCHEMA]).await.unwrap(),
                solar: memory_pool(&[schema::SOLAR_LOG_SCHEMA]).await.unwrap(),
                ledger: Ledger::new(memory_pool(&[schema::LEDGER_SCHEMA]).await.unwrap()),
            }
        }

        async fn metered(&self, rows: &[(i64, f64, f64)]) {
            for (ts, wh_in, wh_out) in rows {
                sqlx::query("INSERT INTO metered (timestamp, wh_in, wh_out) VALUES (?1, ?2, ?3)")
                    .bind(ts)
                    .bind(wh_in)
                    .bind(wh_out)
                    .execute(&self.meter)
                    .await
                    .unwrap();
            }
        }

        async fn demand(&self, rows: &[(i64, f64)]) {
            for (ts, watts) in rows {
                sqlx::query("INSERT INTO demand (timestamp, watts) VALUES (?1, ?2)")
                    .bind(ts)
                    .bind(watts)
                    .execute(&self.meter)
                    .await
                    .unwrap();
            }
        }

        async fn generated(&self, rows: &[(i64, f64)]) {
            for (ts, wh_gen) in rows {
                sqlx::query("INSERT INTO system (timestamp, wh_gen) VALUES (?1, ?2)")
                    .bind(ts)
                    .bind(wh_gen)
                    .execute(&self.solar)
                    .await
                    .unwrap();
            }
        }

        fn driver(&self, cfg: &AppConfig, transport: FakeTransport) -> Driver<FakeTransport> {
            let store = SampleStore::new(self.meter.clone(), self.solar.clone());
            Driver::new(cfg, store, self.ledger.clone(), transport).unwrap()
        }
    }

    #[test]
    fn next_tick_is_strictly_after_cursor() {
        assert_eq!(next_tick(0, 600), 600);
        assert_eq!(next_tick(599, 600), 600);
        assert_eq!(next_tick(600, 600), 1200);
    }

    #[test]
    fn tick_deltas_use_the_export_counter_the_record_was_built_from() {
        let inputs = TickInputs {
            timestamp: 1200,
            imported_wh: Some(1300.0),
            prior_imported_wh: Some(1200.0),
            exported_wh: Some(50.0),
            prior_exported_wh: Some(40.0),
            ..TickInputs::default()
        };
        let previous = PreviousTick {
            generation_wh: Some(700.0),
            consumption_wh: Some(1800.0),
            synthetic_export_wh: None,
        };
        let metered = Reconstruction {
            record: ReconstructedRecord {
                energy_generation_wh: Some(750.0),
                energy_consumption_wh: Some(2000.0),
                ..ReconstructedRecord::new(1200)
            },
            exported_wh: Some(50.0),
            adjustments: Vec::new(),
        };
        let deltas = TickDeltas::new(&inputs, &previous, &metered);
        assert_eq!(
            deltas,
            TickDeltas {
                imported_wh: Some(100.0),
                exported_wh: Some(10.0),
                consumption_wh: Some(200.0),
                generation_wh: Some(50.0),
            }
        );

        let synthesized = Reconstruction {
            record: ReconstructedRecord {
                synthetic_export_wh: Some(125.0),
                ..metered.record.clone()
            },
            exported_wh: Some(125.0),
            ..metered.clone()
        };
        let previous = PreviousTick {
            synthetic_export_wh: Some(100.0),
            ..previous
        };
        assert_eq!(TickDeltas::new(&inputs, &previous, &synthesized).exported_wh, Some(25.0));

        // First tick of a ledger has nothing to compare against.
        let first = TickDeltas::new(&inputs, &PreviousTick::default(), &metered);
        assert_eq!((first.consumption_wh, first.generation_wh), (None, None));
    }

    #[tokio::test]
    async fn mid_interval_tick_synthesizes_export() {
        let fx = Fixture::new().await;
        fx.metered(&[(0, 1000.0, 0.0), (600, 1200.0, 0.0)]).await;
        fx.generated(&[(0, 500.0), (600, 700.0)]).await;
        fx.demand(&[(100, -300.0), (200, -300.0)]).await;

        let driver = fx.driver(&config(300, 0), FakeTransport::default());
        let summary = driver.run_once(1600).await.unwrap();
        assert_eq!(summary.reconstructed, 1);
        assert_eq!(summary.waiting_at, None);

        let pending = fx.ledger.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        let record = &pending[0];
        assert_eq!(record.timestamp, 300);
        assert_eq!(record.energy_generation_wh, Some(600.0));
        // 300 W exported for 300 s.
        assert_eq!(record.synthetic_export_wh, Some(25.0));
        assert_eq!(record.energy_consumption_wh, Some(600.0 + 1100.0 - 25.0));
    }

    #[tokio::test]
    async fn recent_tick_without_data_waits() {
        let fx = Fixture::new().await;
        let tick = NOON - 3 * 3600;
        let driver = fx.driver(&config(600, tick - 600), FakeTransport::with_quota(100));

        let summary = driver.run_once(NOON).await.unwrap();
        assert_eq!(summary.reconstructed, 0);
        assert_eq!(summary.waiting_at, Some(tick));
        assert_eq!(fx.ledger.cursor().await.unwrap(), None);
    }

    #[tokio::test]
    async fn stale_tick_without_data_is_fatal() {
        let fx = Fixture::new().await;
        let tick = NOON - 30 * 3600;
        let driver = fx.driver(&config(600, tick - 600), FakeTransport::default());

        let err = driver.run_once(NOON).await.unwrap_err();
        assert!(matches!(err, RunError::NoPublishableMetric { timestamp } if timestamp == tick));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn generation_before_sunrise_aborts_the_run() {
        let fx = Fixture::new().await;
        // 04:00 local, well before a June sunrise in Brisbane.
        let early = NOON - 8 * 3600;
        fx.metered(&[(early - 1200, 1000.0, 10.0), (early + 600, 1100.0, 10.0)]).await;
        fx.generated(&[(early - 1200, 500.0), (early - 600, 500.0), (early + 600, 560.0)]).await;

        let driver = fx.driver(&config(600, early - 1200), FakeTransport::default());
        let err = driver.run_once(early + 3 * 3600).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::Calculation(CalculationError::PreSunriseGeneration { timestamp, .. }) if timestamp == early
        ));
        assert_eq!(err.exit_code(), 3);

        // The tick before the jump was kept.
        assert_eq!(fx.ledger.cursor().await.unwrap(), Some(early - 600));
    }

    #[tokio::test]
    async fn rerun_resumes_from_cursor_and_publishes() {
        let fx = Fixture::new().await;
        fx.metered(&[(0, 1000.0, 10.0), (1800, 1300.0, 10.0)]).await;
        fx.generated(&[(0, 500.0), (1800, 800.0)]).await;
        let cfg = config(600, 0);

        let driver = fx.driver(&cfg, FakeTransport::with_quota(100));
        let first = driver.run_once(1800 + 1200).await.unwrap();
        assert_eq!(first.reconstructed, 2);
        assert_eq!(first.publish.published, 2);

        let second = driver.run_once(1800 + 1200).await.unwrap();
        assert_eq!(second.reconstructed, 0);
        assert_eq!(second.publish.attempted, 0);
        assert_eq!(fx.ledger.cursor().await.unwrap(), Some(1200));
    }
}
