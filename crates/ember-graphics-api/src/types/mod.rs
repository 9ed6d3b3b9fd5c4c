mod definitions;
mod misc;

pub use definitions::*;
pub use misc::*;
