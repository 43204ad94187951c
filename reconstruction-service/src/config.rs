use serde::Deserialize;
use std::fs;

use crate::transform::LocalZone;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Utility meter log written by the meter collector (read only).
    pub meter_uri: String,
    /// Solar inverter log written by the solar collector (read only).
    pub solar_uri: String,
    /// Reconstruction ledger and temperature cache (read/write).
    pub ledger_uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    pub observations_path: String,
}

/// Half-open window `[start, end)` of unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn contains(&self, t: i64) -> bool {
        t >= self.start && t < self.end
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconstructionConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: i64,
    /// Minimum continuous household draw (W).
    #[serde(default = "default_baseload_watts")]
    pub baseload_watts: f64,
    /// Reconstruction stops this far behind "now".
    #[serde(default = "default_safety_lag_secs")]
    pub safety_lag_secs: i64,
    /// Ticks younger than this may still be waiting for data.
    #[serde(default = "default_waiting_window_secs")]
    pub waiting_window_secs: i64,
    /// Cursor used when the ledger is empty.
    #[serde(default = "default_start_timestamp")]
    pub start_timestamp: i64,
    /// IANA zone for tariff hours, sunrise dates and upload dates.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_temperature_max_gap_secs")]
    pub temperature_max_gap_secs: i64,
    /// How far back the ambient backfill looks for records without a temperature.
    #[serde(default)]
    pub backfill_lookback_secs: Option<i64>,
    /// Windows during which the meter's export counter is known to be wrong.
    #[serde(default)]
    pub unreliable_export_windows: Vec<TimeWindow>,
}

impl ReconstructionConfig {
    pub fn zone(&self) -> anyhow::Result<LocalZone> {
        LocalZone::from_name(&self.timezone)
            .ok_or_else(|| anyhow::anyhow!("unknown reconstruction.timezone {:?}", self.timezone))
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LocationConfig {
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TariffConfig {
    /// Rates per kWh.
    pub peak: f64,
    pub offpeak: f64,
    pub export: f64,
    /// Weekday numbers, 0 = Sunday.
    #[serde(default)]
    pub peak_days: Vec<u8>,
    /// `[start_hour, end_hour)` pairs in local time.
    #[serde(default)]
    pub peak_hours: Vec<(u8, u8)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub system_id: String,
    #[serde(default = "default_rate_limit_margin")]
    pub rate_limit_margin: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    pub run_every_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub weather: Option<WeatherConfig>,
    pub reconstruction: ReconstructionConfig,
    pub location: LocationConfig,
    pub tariff: Option<TariffConfig>,
    pub publisher: PublisherConfig,
    pub metrics: Option<MetricsConfig>,
    pub schedule: Option<ScheduleConfig>,
}

fn default_max_connections() -> u32 {
    4
}

fn default_interval_secs() -> i64 {
    600
}

fn default_baseload_watts() -> f64 {
    200.0
}

fn default_safety_lag_secs() -> i64 {
    20 * 60
}

fn default_waiting_window_secs() -> i64 {
    24 * 60 * 60
}

fn default_start_timestamp() -> i64 {
    1_411_603_200
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_temperature_max_gap_secs() -> i64 {
    3600
}

fn default_base_url() -> String {
    "https://pvoutput.org".to_string()
}

fn default_rate_limit_margin() -> u32 {
    15
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("PVOUTPUT_CONFIG").unwrap_or_else(|_| "pvoutput-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        let mut cfg = Self::from_toml(&contents)?;

        if let Ok(key) = env::var("PVOUTPUT_API_KEY") {
            cfg.publisher.api_key = key;
        }
        if let Ok(id) = env::var("PVOUTPUT_SYSTEM_ID") {
            cfg.publisher.system_id = id;
        }

        Ok(cfg)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let r = &self.reconstruction;
        if r.interval_secs <= 0 || 3600 % r.interval_secs != 0 {
            anyhow::bail!("reconstruction.interval_secs must divide an hour, got {}", r.interval_secs);
        }
        let zone = r.zone()?;
        if r.baseload_watts < 0.0 {
            anyhow::bail!("reconstruction.baseload_watts must be non-negative");
        }
        if r.safety_lag_secs < 0 || r.waiting_window_secs < 0 {
            anyhow::bail!("reconstruction lag and waiting window must be non-negative");
        }
        if !(-90.0..=90.0).contains(&self.location.latitude)
            || !(-180.0..=180.0).contains(&self.location.longitude)
        {
            anyhow::bail!("location is out of range");
        }
        if let Some(t) = &self.tariff {
            if t.peak_days.iter().any(|d| *d > 6) {
                anyhow::bail!("tariff.peak_days uses 0 (Sunday) to 6 (Saturday)");
            }
            if t.peak_hours.iter().any(|(s, e)| s >= e || *e > 24) {
                anyhow::bail!("tariff.peak_hours entries must be [start, end) within 0..=24");
            }
            // Cost is booked on local half-hour boundaries, which a tick must be able to land on.
            let step = gcd(r.interval_secs, 1800);
            for ts in (0..=12).map(|m| r.start_timestamp + m * 30 * 86_400) {
                let offset = i64::from(zone.offset_secs_at(ts).unwrap_or(0));
                if offset.rem_euclid(step) != 0 {
                    anyhow::bail!(
                        "reconstruction.timezone {} has UTC offset {offset}s, which never lines ticks up \
                         with local half hours; tariff cost cannot be booked",
                        zone.name()
                    );
                }
            }
        }
        if self.schedule.as_ref().is_some_and(|s| s.run_every_secs == 0) {
            anyhow::bail!("schedule.run_every_secs must be positive");
        }
        Ok(())
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a.abs()
    } else {
        gcd(b, a % b)
    }
}
