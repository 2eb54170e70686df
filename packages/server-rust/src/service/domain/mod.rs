//! Reference compute functions for the gateway's compute handlers.

pub mod stations;
pub mod train_times;

pub use stations::{load_stops, read_stops, NearestStationsFunction};
pub use train_times::TrainTimesFunction;
