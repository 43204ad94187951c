/// One tick of the reconstructed series, as stored in the `pvoutput` ledger table.
///
/// The twelve metric slots map one-to-one onto the PVOutput `addstatus` parameters
/// `v1`..`v12`; the column names in the ledger keep those parameter names so that
/// downstream reporting can read the table without this crate.
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReconstructedRecord {
    pub timestamp: i64,
    /// Cumulative energy generated (Wh).
    #[sqlx(rename = "v1")]
    pub energy_generation_wh: Option<f64>,
    #[sqlx(rename = "v2")]
    pub power_generation_w: Option<f64>,
    /// Cumulative energy consumed (Wh).
    #[sqlx(rename = "v3")]
    pub energy_consumption_wh: Option<f64>,
    #[sqlx(rename = "v4")]
    pub power_consumption_w: Option<f64>,
    /// Ambient air temperature (°C).
    #[sqlx(rename = "v5")]
    pub temperature_c: Option<f64>,
    /// Median panel input voltage (V).
    #[sqlx(rename = "v6")]
    pub voltage_v: Option<f64>,
    #[sqlx(rename = "v7")]
    pub dsp_temp_c: Option<f64>,
    #[sqlx(rename = "v8")]
    pub mos_temp_c: Option<f64>,
    /// Net cost of the tariff interval, in hundredths of the currency unit.
    #[sqlx(rename = "v9")]
    pub cost_cents: Option<f64>,
    #[sqlx(rename = "v10")]
    pub extended_v10: Option<f64>,
    #[sqlx(rename = "v11")]
    pub extended_v11: Option<f64>,
    #[sqlx(rename = "v12")]
    pub extended_v12: Option<f64>,
    /// Running synthetic export counter (Wh). Kept in the ledger only, never uploaded.
    pub synthetic_export_wh: Option<f64>,
    #[sqlx(rename = "need_upload")]
    pub pending_publish: bool,
}

impl ReconstructedRecord {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            pending_publish: true,
            ..Self::default()
        }
    }

    /// A record is only worth keeping if it says something about energy.
    pub fn has_energy_metric(&self) -> bool {
        self.energy_generation_wh.is_some() || self.energy_consumption_wh.is_some()
    }

    /// The twelve metric slots keyed by their PVOutput parameter name.
    pub fn slots(&self) -> [(&'static str, Option<f64>); 12] {
        [
            ("v1", self.energy_generation_wh),
            ("v2", self.power_generation_w),
            ("v3", self.energy_consumption_wh),
            ("v4", self.power_consumption_w),
            ("v5", self.temperature_c),
            ("v6", self.voltage_v),
            ("v7", self.dsp_temp_c),
            ("v8", self.mos_temp_c),
            ("v9", self.cost_cents),
            ("v10", self.extended_v10),
            ("v11", self.extended_v11),
            ("v12", self.extended_v12),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_pending_and_empty() {
        let r = ReconstructedRecord::new(1_700_000_400);
        assert!(r.pending_publish);
        assert!(!r.has_energy_metric());
        assert!(r.slots().iter().all(|(_, v)| v.is_none()));
    }

    #[test]
    fn slots_follow_parameter_order() {
        let r = ReconstructedRecord {
            energy_consumption_wh: Some(12.0),
            cost_cents: Some(-3.5),
            ..ReconstructedRecord::new(0)
        };
        let slots = r.slots();
        assert_eq!(slots[2], ("v3", Some(12.0)));
        assert_eq!(slots[8], ("v9", Some(-3.5)));
        assert!(r.has_energy_metric());
    }
}
