//! Turns interpolated counters into a ledger record.
//!
//! The calculator is pure: it sees the interpolated inputs for one tick and the
//! previous persisted tick, and nothing else. Guard layers run in a fixed order:
//! regression, day/night plausibility, export synthesis, baseload floor.

use energy_store::ReconstructedRecord;

use super::{
    clock::LocalZone,
    panels::PanelAggregate,
    solar::{self, SunTimes},
    tariff,
};
use crate::config::{AppConfig, LocationConfig, TariffConfig, TimeWindow};

/// The slice of configuration the calculator reads.
#[derive(Debug, Clone)]
pub struct CalculatorSettings {
    pub interval_secs: i64,
    pub baseload_watts: f64,
    pub zone: LocalZone,
    pub location: LocationConfig,
    pub tariff: Option<TariffConfig>,
    pub unreliable_export_windows: Vec<TimeWindow>,
}

impl CalculatorSettings {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            interval_secs: cfg.reconstruction.interval_secs,
            baseload_watts: cfg.reconstruction.baseload_watts,
            zone: cfg.reconstruction.zone()?,
            location: cfg.location,
            tariff: cfg.tariff.clone(),
            unreliable_export_windows: cfg.reconstruction.unreliable_export_windows.clone(),
        })
    }

    fn interval_hours(&self) -> f64 {
        self.interval_secs as f64 / 3600.0
    }
}

/// Interpolated source values for one tick. `None` means the quantity had no usable
/// bracket, which is different from zero.
#[derive(Debug, Clone, Default)]
pub struct TickInputs {
    pub timestamp: i64,
    pub imported_wh: Option<f64>,
    pub exported_wh: Option<f64>,
    pub generated_wh: Option<f64>,
    /// Meter counters one interval before `timestamp`, for the cost delta.
    pub prior_imported_wh: Option<f64>,
    pub prior_exported_wh: Option<f64>,
    /// Mean negative net demand over the interval ending at `timestamp` (W).
    pub export_demand_w: Option<f64>,
    /// Highest exported counter the meter reported before `timestamp`.
    pub export_high_water_wh: Option<f64>,
    pub ambient_temp_c: Option<f64>,
    pub panels: PanelAggregate,
}

/// What the guards need to know about the last persisted tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PreviousTick {
    pub generation_wh: Option<f64>,
    pub consumption_wh: Option<f64>,
    pub synthetic_export_wh: Option<f64>,
}

impl From<&ReconstructedRecord> for PreviousTick {
    fn from(r: &ReconstructedRecord) -> Self {
        Self {
            generation_wh: r.energy_generation_wh,
            consumption_wh: r.energy_consumption_wh,
            synthetic_export_wh: r.synthetic_export_wh,
        }
    }
}

/// Corrections applied while building a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    GenerationRegression,
    PostSunsetGeneration,
    ExportSynthesized,
    BaseloadFloor,
}

impl Adjustment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GenerationRegression => "generation_regression",
            Self::PostSunsetGeneration => "post_sunset_generation",
            Self::ExportSynthesized => "export_synthesized",
            Self::BaseloadFloor => "baseload_floor",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub record: ReconstructedRecord,
    /// Exported counter actually used, synthetic or metered.
    pub exported_wh: Option<f64>,
    pub adjustments: Vec<Adjustment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Record(Reconstruction),
    /// Neither generation nor consumption could be worked out.
    NoMetric,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalculationError {
    #[error(
        "generation changed from {previous_wh} Wh to {current_wh} Wh at {timestamp}, \
         before sunrise at {sunrise}"
    )]
    PreSunriseGeneration {
        timestamp: i64,
        sunrise: i64,
        previous_wh: f64,
        current_wh: f64,
    },
}

pub fn calculate(
    settings: &CalculatorSettings,
    inputs: &TickInputs,
    previous: &PreviousTick,
) -> Result<TickOutcome, CalculationError> {
    let ts = inputs.timestamp;
    let mut adjustments = Vec::new();
    let mut generation = inputs.generated_wh;

    // Published cumulative generation never goes down.
    if let (Some(current), Some(prev)) = (generation, previous.generation_wh) {
        if current < prev {
            tracing::warn!(
                timestamp = ts,
                current_wh = current,
                previous_wh = prev,
                "generation counter went backwards, holding previous value"
            );
            generation = Some(prev);
            adjustments.push(Adjustment::GenerationRegression);
        }
    }

    if let (Some(current), Some(prev)) = (generation, previous.generation_wh) {
        if current != prev {
            if let Some(sun) = sun_times_for(settings, ts) {
                let margin = settings.interval_secs;
                if ts < sun.sunrise - margin {
                    return Err(CalculationError::PreSunriseGeneration {
                        timestamp: ts,
                        sunrise: sun.sunrise,
                        previous_wh: prev,
                        current_wh: current,
                    });
                }
                if ts > sun.sunset + margin {
                    tracing::warn!(
                        timestamp = ts,
                        sunset = sun.sunset,
                        current_wh = current,
                        previous_wh = prev,
                        "generation changed after sunset, holding previous value"
                    );
                    generation = Some(prev);
                    adjustments.push(Adjustment::PostSunsetGeneration);
                }
            }
        }
    }

    let mut exported = inputs.exported_wh;
    let mut synthetic_export = None;
    let mut interval_export_wh = None;
    if needs_export_synthesis(settings, inputs) {
        let exported_this_interval = inputs
            .export_demand_w
            .map_or(0.0, |w| w.abs() * settings.interval_hours());
        let mut counter = previous.synthetic_export_wh.unwrap_or(0.0) + exported_this_interval;
        if let Some(high_water) = inputs.export_high_water_wh {
            counter = counter.max(high_water);
        }

        exported = Some(counter);
        synthetic_export = Some(counter);
        interval_export_wh = Some(exported_this_interval);
        adjustments.push(Adjustment::ExportSynthesized);
    }

    let mut consumption = match (generation, inputs.imported_wh, exported) {
        (Some(gen_wh), Some(imp), Some(exp)) => Some(gen_wh + imp - exp),
        _ => None,
    };

    // The meter counts in coarse steps while the inverter counts in single Wh, so the
    // naive figure can dip below what the house is known to draw at idle.
    if let (Some(current), Some(prev)) = (consumption, previous.consumption_wh) {
        let floor = prev + settings.baseload_watts * settings.interval_hours();
        if current < floor {
            consumption = Some(floor);
            adjustments.push(Adjustment::BaseloadFloor);
        }
    }

    let cost_cents = settings
        .tariff
        .as_ref()
        .and_then(|t| interval_cost(settings, t, inputs, interval_export_wh));

    let record = ReconstructedRecord {
        energy_generation_wh: generation,
        energy_consumption_wh: consumption,
        temperature_c: inputs.ambient_temp_c,
        voltage_v: inputs.panels.voltage_v,
        dsp_temp_c: inputs.panels.dsp_temp_c,
        mos_temp_c: inputs.panels.mos_temp_c,
        cost_cents,
        synthetic_export_wh: synthetic_export,
        ..ReconstructedRecord::new(ts)
    };
    if !record.has_energy_metric() {
        return Ok(TickOutcome::NoMetric);
    }

    Ok(TickOutcome::Record(Reconstruction {
        record,
        exported_wh: exported,
        adjustments,
    }))
}

fn sun_times_for(settings: &CalculatorSettings, ts: i64) -> Option<SunTimes> {
    let local = settings.zone.local(ts)?;
    solar::sun_times(local.date(), settings.location.latitude, settings.location.longitude)
}

fn needs_export_synthesis(settings: &CalculatorSettings, inputs: &TickInputs) -> bool {
    inputs.exported_wh == Some(0.0)
        || settings
            .unreliable_export_windows
            .iter()
            .any(|w| w.contains(inputs.timestamp))
}

/// Net grid cost for the interval ending at a tariff boundary.
fn interval_cost(
    settings: &CalculatorSettings,
    tariff: &TariffConfig,
    inputs: &TickInputs,
    synthesized_export_wh: Option<f64>,
) -> Option<f64> {
    let local = settings.zone.local(inputs.timestamp)?;
    if !tariff::is_tariff_boundary(local) {
        return None;
    }

    let imported = inputs.imported_wh? - inputs.prior_imported_wh?;
    let exported = match synthesized_export_wh {
        Some(wh) => wh,
        None => inputs.exported_wh? - inputs.prior_exported_wh?,
    };

    Some(tariff::cost_cents(tariff, local, imported - exported))
}
