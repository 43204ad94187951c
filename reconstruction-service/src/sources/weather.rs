use std::path::Path;

use energy_store::AmbientTemperatureSample;
use time::{macros::format_description, PrimitiveDateTime};

#[derive(thiserror::Error, Debug)]
pub enum WeatherError {
    #[error("failed to read weather snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse weather snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Bureau of Meteorology observation snapshot, trimmed to the fields we use.
#[derive(serde::Deserialize)]
struct WeatherSnapshot {
    observations: Observations,
}

#[derive(serde::Deserialize)]
struct Observations {
    data: Vec<Observation>,
}

#[derive(serde::Deserialize)]
struct Observation {
    /// `YYYYMMDDhhmmss` in UTC.
    aifstime_utc: String,
    air_temp: Option<f64>,
}

pub async fn load_observations(path: impl AsRef<Path>) -> Result<Vec<AmbientTemperatureSample>, WeatherError> {
    let contents = tokio::fs::read_to_string(path).await?;
    parse_observations(&contents)
}

/// Observations with a usable time and temperature. Entries with a malformed time
/// are skipped with a warning; entries without a temperature are dropped.
pub fn parse_observations(json: &str) -> Result<Vec<AmbientTemperatureSample>, WeatherError> {
    let snapshot: WeatherSnapshot = serde_json::from_str(json)?;
    let format = format_description!("[year][month][day][hour][minute][second]");

    let mut samples = Vec::with_capacity(snapshot.observations.data.len());
    for obs in snapshot.observations.data {
        let Some(degrees_c) = obs.air_temp else {
            continue;
        };

        match PrimitiveDateTime::parse(&obs.aifstime_utc, format) {
            Ok(dt) => samples.push(AmbientTemperatureSample {
                timestamp: dt.assume_utc().unix_timestamp(),
                degrees_c,
            }),
            Err(e) => {
                metrics::counter!("weather_observation_parse_errors_total").increment(1);
                tracing::warn!(
                    aifstime_utc = %obs.aifstime_utc,
                    error = %e,
                    "skipping weather observation with unreadable time"
                );
            }
        }
    }

    Ok(samples)
}
