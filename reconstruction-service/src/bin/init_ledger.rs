use anyhow::Result;
use reconstruction_service::{config::AppConfig, observability, sinks::Ledger};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    let ledger = Ledger::connect(&cfg.database.ledger_uri, 1).await?;
    ledger.init_schema().await?;

    match ledger.cursor().await? {
        Some(ts) => tracing::info!(uri = %cfg.database.ledger_uri, last_timestamp = ts, "ledger schema ready"),
        None => tracing::info!(
            uri = %cfg.database.ledger_uri,
            start_timestamp = cfg.reconstruction.start_timestamp,
            "empty ledger created"
        ),
    }

    Ok(())
}
