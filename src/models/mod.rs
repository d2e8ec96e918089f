pub mod movement;
pub mod sample;

pub use movement::{Movement, MovementFlag};
pub use sample::Sample;
