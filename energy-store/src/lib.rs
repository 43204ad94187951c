//! Shared data access for the energy reconstruction service.
//!
//! `domain` holds the sample and record types; `db` holds the SQL used against the
//! collectors' SQLite logs and the reconstruction ledger.

pub mod db;
pub mod domain;

pub use domain::{
    AmbientTemperatureSample, CounterKind, PanelTelemetrySample, RawCounterSample,
    ReconstructedRecord,
};
