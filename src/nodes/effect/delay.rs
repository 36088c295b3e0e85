//! Fixed-capacity delay line

use dasp_graph::Buffer;

use crate::error::GraphError;
use crate::node::{Kernel, KernelState, ProcessContext, RenderContext};
use crate::nodes::require_channels;
use crate::parameter::Parameters;

/// Delays every channel by a whole number of frames.
///
/// `delay` (seconds) and `delay_samples` (frames) describe the same setting;
/// writing either one updates the other. The line is allocated up front, so
/// the longest delay is fixed at construction.
pub struct Delay {
    channels: usize,
    lines: Vec<Vec<f32>>,
    write: usize,
}

impl Delay {
    /// A delay of up to `max_delay` seconds at `sample_rate`.
    pub fn new(max_delay: f32, sample_rate: u32, channels: usize) -> Self {
        let frames = (max_delay.max(0.0) * sample_rate as f32).ceil() as usize;
        Self::with_max_frames(frames, channels)
    }

    /// A delay of up to `max_frames` frames.
    pub fn with_max_frames(max_frames: usize, channels: usize) -> Self {
        Self {
            channels,
            lines: vec![vec![0.0; max_frames + 1]; channels],
            write: 0,
        }
    }

    #[inline]
    fn max_frames(&self) -> usize {
        self.lines.first().map_or(0, |line| line.len() - 1)
    }
}

impl Kernel for Delay {
    fn describe(&self, params: &mut Parameters, ctx: &ProcessContext) {
        let max_frames = self.max_frames() as f32;
        let sample_rate = ctx.sample_rate as f32;
        params.add_float("delay", 0.0, 0.0, max_frames / sample_rate);
        params.add_float("delay_samples", 0.0, 0.0, max_frames);
        params.mirror("delay", "delay_samples", sample_rate);
    }

    fn render(
        &mut self,
        ctx: &mut RenderContext<'_>,
        inputs: &[Buffer],
        outputs: &mut [Buffer],
    ) -> KernelState {
        let frames = ctx.block_size;
        let len = self.max_frames() + 1;
        let delay = (ctx.params.float("delay_samples").round() as usize).min(len - 1);

        for ((line, input), output) in self.lines.iter_mut().zip(inputs).zip(outputs.iter_mut()) {
            let mut write = self.write;
            for i in 0..frames {
                line[write] = input[i];
                output[i] = line[(write + len - delay) % len];
                write = (write + 1) % len;
            }
        }
        self.write = (self.write + frames) % len;
        KernelState::Continue
    }

    fn reset(&mut self) {
        for line in self.lines.iter_mut() {
            line.iter_mut().for_each(|s| *s = 0.0);
        }
        self.write = 0;
    }

    fn validate(&self) -> Result<(), GraphError> {
        require_channels("a delay", self.channels)
    }

    fn num_inputs(&self) -> usize {
        self.channels
    }

    fn num_outputs(&self) -> usize {
        self.channels
    }
}
