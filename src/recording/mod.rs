pub mod controller;
pub mod state;

pub use controller::RecordingController;
pub use state::{RecordingSnapshot, RecordingStatus, SessionInfo};
