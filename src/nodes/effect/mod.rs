mod delay;
mod gain;
mod mixer;

pub use delay::*;
pub use gain::*;
pub use mixer::*;
