pub mod sample_store;
pub mod weather;

pub use sample_store::SampleStore;
pub use weather::{load_observations, WeatherError};
