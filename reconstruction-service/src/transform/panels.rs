use energy_store::PanelTelemetrySample;

use super::interpolate::{value_at, Point};

/// Panel telemetry reduced to one value per quantity for a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PanelAggregate {
    pub voltage_v: Option<f64>,
    pub dsp_temp_c: Option<f64>,
    pub mos_temp_c: Option<f64>,
}

/// Interpolates every panel at `t` from its own readings, then takes the median
/// across panels. `samples` must be grouped by panel and time-ordered within a panel.
pub fn aggregate_panels(samples: &[PanelTelemetrySample], t: i64, max_gap: i64) -> PanelAggregate {
    let mut voltages = Vec::new();
    let mut dsp_temps = Vec::new();
    let mut mos_temps = Vec::new();

    for panel in samples.chunk_by(|a, b| a.panel_id == b.panel_id) {
        if let Some(v) = panel_value_at(panel, t, max_gap, |s| s.voltage) {
            voltages.push(v);
        }
        if let Some(v) = panel_value_at(panel, t, max_gap, |s| s.dsp_temp) {
            dsp_temps.push(v);
        }
        if let Some(v) = panel_value_at(panel, t, max_gap, |s| s.mos_temp) {
            mos_temps.push(v);
        }
    }

    PanelAggregate {
        voltage_v: median(&mut voltages),
        dsp_temp_c: median(&mut dsp_temps),
        mos_temp_c: median(&mut mos_temps),
    }
}

fn panel_value_at(
    panel: &[PanelTelemetrySample],
    t: i64,
    max_gap: i64,
    field: impl Fn(&PanelTelemetrySample) -> Option<f64>,
) -> Option<f64> {
    let point = |s: &PanelTelemetrySample| field(s).map(|v| Point { t: s.timestamp, v });

    let before = panel.iter().rev().filter(|s| s.timestamp <= t).find_map(point);
    let after = panel.iter().filter(|s| s.timestamp > t).find_map(point);

    value_at(t, before, after, Some(max_gap))
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(panel: &str, ts: i64, voltage: f64, dsp: Option<f64>) -> PanelTelemetrySample {
        PanelTelemetrySample {
            timestamp: ts,
            panel_id: panel.to_string(),
            voltage: Some(voltage),
            dsp_temp: dsp,
            mos_temp: None,
        }
    }

    #[test]
    fn median_of_interpolated_panels() {
        let samples = vec![
            sample("a", 0, 30.0, Some(40.0)),
            sample("a", 600, 32.0, Some(42.0)),
            sample("b", 0, 20.0, Some(50.0)),
            sample("b", 600, 20.0, Some(50.0)),
            sample("c", 300, 35.0, None),
        ];

        let agg = aggregate_panels(&samples, 300, 1800);
        // a=31, b=20, c=35
        assert_eq!(agg.voltage_v, Some(31.0));
        // a=41, b=50
        assert_eq!(agg.dsp_temp_c, Some(45.5));
        assert_eq!(agg.mos_temp_c, None);
    }

    #[test]
    fn panels_without_a_bracket_are_left_out() {
        let samples = vec![
            sample("a", 0, 30.0, None),
            sample("b", 0, 10.0, None),
            sample("b", 600, 10.0, None),
        ];

        let agg = aggregate_panels(&samples, 300, 1800);
        assert_eq!(agg.voltage_v, Some(10.0));
    }

    #[test]
    fn no_samples_no_values() {
        assert_eq!(aggregate_panels(&[], 300, 1800), PanelAggregate::default());
    }
}
