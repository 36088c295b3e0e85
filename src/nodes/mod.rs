//! Built-in kernels.
//!
//! Kernels are organized into categories:
//!
//! ## Sources ([`source`])
//!
//! Generate audio with no audio inputs:
//! - [`Sine`] - Sine wave oscillator with frequency/amplitude control
//! - [`BufferPlayer`] - Play a shared [`SoundBuffer`](crate::SoundBuffer)
//!
//! ## Effects ([`effect`])
//!
//! Process audio (inputs → outputs):
//! - [`Gain`] - Volume control with smoothing
//! - [`Mixer`] - Sum several input slots together
//! - [`Delay`] - Whole-frame delay line
//!
//! ## Spatial ([`spatial`])
//!
//! - [`Source`] - Positions a mono signal inside an environment
//! - [`AmplitudePanner`] - The default [`Spatializer`]
//!
//! ## Sinks ([`sink`])
//!
//! - [`RingSink`] - Render into a ring buffer for another thread

use crate::error::GraphError;

pub mod effect;
pub mod sink;
pub mod source;
pub mod spatial;

// Re-export common types at the top level for convenience
pub use effect::{Delay, Gain, Mixer};
pub use sink::RingSink;
pub use source::{BufferPlayer, Sine};
pub use spatial::{AmplitudePanner, PanningStrategy, Source, Spatializer};

/// Fails with a range error when a kernel was built with zero channels.
pub(crate) fn require_channels(kernel: &str, channels: usize) -> Result<(), GraphError> {
    if channels == 0 {
        return Err(GraphError::Range(format!(
            "{} needs at least one channel",
            kernel
        )));
    }
    Ok(())
}
