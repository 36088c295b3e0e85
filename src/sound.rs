//! Decoded audio shared between playback jobs.

use crate::error::GraphError;

/// Interleaved, fully decoded audio.
///
/// Decoding is left to the caller; the graph only pulls frames out of this.
/// Wrap it in an [`Arc`](std::sync::Arc) to share one buffer between many
/// players, which is what [`EnvironmentNode::play_async`](crate::EnvironmentNode::play_async)
/// expects.
#[derive(Clone, Debug, PartialEq)]
pub struct SoundBuffer {
    channels: usize,
    sample_rate: u32,
    samples: Vec<f32>,
}

impl SoundBuffer {
    /// Create a buffer from interleaved samples.
    ///
    /// Fails with [`GraphError::Range`] if `channels` or `sample_rate` is zero or
    /// the sample count is not a whole number of frames.
    pub fn from_interleaved(
        channels: usize,
        sample_rate: u32,
        samples: Vec<f32>,
    ) -> Result<Self, GraphError> {
        if channels == 0 {
            return Err(GraphError::Range("sound buffer needs at least one channel".into()));
        }
        if sample_rate == 0 {
            return Err(GraphError::Range("sound buffer sample rate must be positive".into()));
        }
        if samples.len() % channels != 0 {
            return Err(GraphError::Range(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            channels,
            sample_rate,
            samples,
        })
    }

    /// Create a mono buffer.
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Result<Self, GraphError> {
        Self::from_interleaved(1, sample_rate, samples)
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Duration in seconds.
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// One sample, or silence past the end.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        self.samples
            .get(frame * self.channels + channel % self.channels)
            .copied()
            .unwrap_or(0.0)
    }

    /// All channels of one frame averaged together.
    pub fn mono_sample(&self, frame: usize) -> f32 {
        let start = frame * self.channels;
        match self.samples.get(start..start + self.channels) {
            Some(frame) => frame.iter().sum::<f32>() / self.channels as f32,
            None => 0.0,
        }
    }

    /// The raw interleaved samples.
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_partial_frames() {
        assert!(matches!(
            SoundBuffer::from_interleaved(2, 48000, vec![0.0; 3]),
            Err(GraphError::Range(_))
        ));
        assert!(SoundBuffer::from_interleaved(0, 48000, vec![]).is_err());
        assert!(SoundBuffer::mono(0, vec![1.0]).is_err());
    }

    #[test]
    fn mono_sample_averages_channels() {
        let buffer = SoundBuffer::from_interleaved(2, 100, vec![1.0, 0.0, 0.5, 0.5]).unwrap();
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.mono_sample(0), 0.5);
        assert_eq!(buffer.mono_sample(1), 0.5);
        assert_eq!(buffer.mono_sample(2), 0.0);
        assert_eq!(buffer.sample(0, 3), 0.0);
        assert!((buffer.duration_secs() - 0.02).abs() < 1e-9);
    }
}
