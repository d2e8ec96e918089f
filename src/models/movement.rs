use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};

/// Whether the user says they are stopped or moving. Written into every trail line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Movement {
    Stopped,
    Moving,
}

impl Movement {
    pub fn from_is_stopped(is_stopped: bool) -> Self {
        if is_stopped {
            Movement::Stopped
        } else {
            Movement::Moving
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Movement::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Movement::Stopped => "Stopped",
            Movement::Moving => "Moving",
        }
    }
}

/// Shared stopped/moving flag. The controller writes it, the selector reads it at
/// emission time so a toggle applies to the next emitted sample.
#[derive(Debug, Clone, Default)]
pub struct MovementFlag {
    stopped: Arc<AtomicBool>,
}

impl MovementFlag {
    pub fn new(is_stopped: bool) -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(is_stopped)),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn set_stopped(&self, is_stopped: bool) {
        self.stopped.store(is_stopped, Ordering::Release);
    }

    pub fn movement(&self) -> Movement {
        Movement::from_is_stopped(self.is_stopped())
    }
}
