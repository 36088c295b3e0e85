//! Shared sound buffer player

use dasp_graph::Buffer;

use crate::error::GraphError;
use crate::node::{Kernel, KernelState, ProcessContext, RenderContext};
use crate::nodes::require_channels;
use crate::parameter::{ParamValue, Parameters};

/// Plays a [`SoundBuffer`](crate::SoundBuffer) set through its `buffer`
/// parameter.
///
/// Parameters:
/// - `buffer`: the sound to play (none means silence)
/// - `position`: playback position in seconds; setting it seeks
/// - `looping`: 0 or 1
/// - `gain`
///
/// Buffers recorded at another sample rate are stepped through at the ratio
/// of the two rates without interpolation. With a single output the buffer's
/// channels are averaged. Reaching the end of a non-looping buffer reports
/// [`KernelState::Finished`].
pub struct BufferPlayer {
    channels: usize,
    /// Read position in buffer frames.
    cursor: f64,
}

impl BufferPlayer {
    /// Create a player with `channels` outputs.
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            cursor: 0.0,
        }
    }

    /// Create a player that mixes every buffer down to one channel
    pub fn mono() -> Self {
        Self::new(1)
    }

    /// Create a stereo player
    pub fn stereo() -> Self {
        Self::new(2)
    }
}

impl Kernel for BufferPlayer {
    fn describe(&self, params: &mut Parameters, _ctx: &ProcessContext) {
        params.add("buffer", ParamValue::Buffer(None));
        params.add_float("position", 0.0, 0.0, f32::MAX);
        params.add_int("looping", 0, 0, 1);
        params.add_float("gain", 1.0, 0.0, f32::MAX);
    }

    fn prepare(&mut self, _ctx: &ProcessContext, params: &Parameters) {
        if params.was_changed("buffer") || params.was_changed("position") {
            let rate = params.buffer("buffer").map_or(0, |b| b.sample_rate());
            self.cursor = params.float("position") as f64 * rate as f64;
        }
    }

    fn render(
        &mut self,
        ctx: &mut RenderContext<'_>,
        _inputs: &[Buffer],
        outputs: &mut [Buffer],
    ) -> KernelState {
        for buffer in outputs.iter_mut() {
            buffer.iter_mut().for_each(|s| *s = 0.0);
        }

        let params = ctx.params;
        let Some(sound) = params.buffer("buffer") else {
            return KernelState::Continue;
        };
        let frames = sound.frames();
        let looping = params.flag("looping");
        let gain = params.float("gain");
        let step = sound.sample_rate() as f64 / ctx.sample_rate as f64;

        for i in 0..ctx.block_size {
            // Check for end of samples
            if self.cursor >= frames as f64 {
                if looping && frames > 0 {
                    self.cursor %= frames as f64;
                } else {
                    return KernelState::Finished;
                }
            }

            let frame = self.cursor as usize;
            if self.channels == 1 {
                outputs[0][i] = sound.mono_sample(frame) * gain;
            } else {
                for (ch, buffer) in outputs.iter_mut().enumerate() {
                    buffer[i] = sound.sample(frame, ch) * gain;
                }
            }
            self.cursor += step;
        }

        if !looping && self.cursor >= frames as f64 {
            return KernelState::Finished;
        }
        KernelState::Continue
    }

    fn reset(&mut self) {
        self.cursor = 0.0;
    }

    fn validate(&self) -> Result<(), GraphError> {
        require_channels("a buffer player", self.channels)
    }

    fn num_outputs(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sound::SoundBuffer;

    const CTX: ProcessContext = ProcessContext {
        sample_rate: 100,
        block_size: 64,
    };

    fn render(player: &mut BufferPlayer, params: &Parameters, outputs: &mut [Buffer]) -> KernelState {
        player.prepare(&CTX, params);
        let mut ctx = RenderContext {
            sample_rate: CTX.sample_rate,
            block_size: CTX.block_size,
            params,
            scene: None,
        };
        player.render(&mut ctx, &[], outputs)
    }

    fn loaded(samples: Vec<f32>, looping: bool) -> (BufferPlayer, Parameters) {
        let player = BufferPlayer::mono();
        let mut params = Parameters::new();
        player.describe(&mut params, &CTX);
        let sound = Arc::new(SoundBuffer::mono(100, samples).unwrap());
        params.set("buffer", ParamValue::from(sound)).unwrap();
        params.set("looping", ParamValue::from(looping)).unwrap();
        (player, params)
    }

    #[test]
    fn finishes_at_end_of_content() {
        let (mut player, mut params) = loaded(vec![1.0; 100], false);
        let mut out = [Buffer::SILENT];

        assert_eq!(render(&mut player, &params, &mut out), KernelState::Continue);
        params.clear_changed();
        assert_eq!(render(&mut player, &params, &mut out), KernelState::Finished);
        // 36 frames left in the second block
        assert_eq!(out[0][35], 1.0);
        assert_eq!(out[0][36], 0.0);
    }

    #[test]
    fn exact_fit_finishes_in_the_same_block() {
        let (mut player, params) = loaded(vec![0.5; 64], false);
        let mut out = [Buffer::SILENT];
        assert_eq!(render(&mut player, &params, &mut out), KernelState::Finished);
        assert!(out[0].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn looping_never_finishes() {
        let (mut player, mut params) = loaded(vec![0.25; 10], true);
        let mut out = [Buffer::SILENT];
        for _ in 0..4 {
            assert_eq!(render(&mut player, &params, &mut out), KernelState::Continue);
            params.clear_changed();
        }
        assert!(out[0].iter().all(|&s| s == 0.25));
    }

    #[test]
    fn setting_position_seeks() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let (mut player, mut params) = loaded(samples, false);
        params.set("position", ParamValue::Float(0.5)).unwrap();
        let mut out = [Buffer::SILENT];
        render(&mut player, &params, &mut out);
        assert_eq!(out[0][0], 50.0);
    }
}
