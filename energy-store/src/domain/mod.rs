pub mod record;
pub mod samples;

pub use record::ReconstructedRecord;
pub use samples::{AmbientTemperatureSample, CounterKind, PanelTelemetrySample, RawCounterSample};
