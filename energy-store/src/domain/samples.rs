/// Which cumulative counter a raw sample belongs to.
///
/// Imported and exported energy come from the utility meter log, generated energy
/// from the solar inverter log. All three are Wh totals that only ever grow, except
/// when a collector resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CounterKind {
    Imported,
    Exported,
    Generated,
}

impl CounterKind {
    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Imported | Self::Exported => "metered",
            Self::Generated => "system",
        }
    }

    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Imported => "wh_in",
            Self::Exported => "wh_out",
            Self::Generated => "wh_gen",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Imported => "imported",
            Self::Exported => "exported",
            Self::Generated => "generated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawCounterSample {
    pub timestamp: i64,
    pub value: f64,
    pub kind: CounterKind,
}

/// One reading from a single panel's micro-inverter.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PanelTelemetrySample {
    pub timestamp: i64,
    /// Micro-inverter MAC/RF id.
    #[sqlx(rename = "macrf")]
    pub panel_id: String,
    #[sqlx(rename = "Vin_V")]
    pub voltage: Option<f64>,
    #[sqlx(rename = "Tdsp_degC")]
    pub dsp_temp: Option<f64>,
    #[sqlx(rename = "Tmos_degC")]
    pub mos_temp: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AmbientTemperatureSample {
    pub timestamp: i64,
    #[sqlx(rename = "degC")]
    pub degrees_c: f64,
}
