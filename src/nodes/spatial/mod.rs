//! Positional sources and the panning they write through.

mod panner;
mod source;

pub use panner::*;
pub use source::*;
