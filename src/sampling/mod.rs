pub mod controller;
mod loop_worker;
pub mod replay;
pub mod simulated;
pub mod source;

pub use controller::{sampling_interval_for, Sampler, StopHandle};
pub use replay::ReplaySource;
pub use simulated::{SimulatedSource, SimulatedSourceConfig};
pub use source::{ChannelSource, LocationSource};
