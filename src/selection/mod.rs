pub mod config;
pub mod scoring;
pub mod selector;

pub use config::SelectionConfig;
pub use scoring::score;
pub use selector::{ReportingWindow, SampleConsumer, Selector, SelectorPhase};
