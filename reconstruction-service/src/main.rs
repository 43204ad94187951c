use std::{process::ExitCode, time::Duration};

use anyhow::Result;
use reconstruction_service::{
    config::AppConfig,
    metrics_server,
    observability,
    sinks::{Ledger, PvOutputClient},
    sources::SampleStore,
    Driver, RunError, RunSummary,
};
use time::OffsetDateTime;

#[tokio::main]
async fn main() -> ExitCode {
    observability::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "reconstruction run failed");
            let code = e.downcast_ref::<RunError>().map_or(1, RunError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run() -> Result<()> {
    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let store = SampleStore::connect(&cfg.database).await?;
    let ledger = Ledger::connect(&cfg.database.ledger_uri, cfg.database.max_connections).await?;
    ledger.init_schema().await?;

    let transport = PvOutputClient::new(&cfg.publisher, cfg.reconstruction.zone()?)?;
    let driver = Driver::new(&cfg, store, ledger, transport)?;

    let Some(schedule) = &cfg.schedule else {
        let summary = driver.run_once(now()).await?;
        log_summary(&summary);
        return Ok(());
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(schedule.run_every_secs));
    loop {
        ticker.tick().await;
        match driver.run_once(now()).await {
            Ok(summary) => log_summary(&summary),
            Err(e) if !e.is_fatal() => {
                tracing::warn!(error = %e, "run failed, retrying next period");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn log_summary(summary: &RunSummary) {
    tracing::info!(
        temperatures = summary.temperatures_ingested,
        reconstructed = summary.reconstructed,
        waiting_at = ?summary.waiting_at,
        backfilled = summary.backfilled,
        quota = ?summary.publish.quota,
        published = summary.publish.published,
        failed = summary.publish.failed,
        "run complete"
    );
}
