pub mod calculator;
pub mod clock;
pub mod interpolate;
pub mod panels;
pub mod solar;
pub mod tariff;

pub use calculator::{
    calculate, Adjustment, CalculationError, CalculatorSettings, PreviousTick, Reconstruction,
    TickInputs, TickOutcome,
};
pub use clock::LocalZone;
pub use interpolate::{interpolate, value_at, InterpolationError, Point};
pub use panels::{aggregate_panels, PanelAggregate};
