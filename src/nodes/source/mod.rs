mod player;
mod sine;

pub use player::*;
pub use sine::*;
