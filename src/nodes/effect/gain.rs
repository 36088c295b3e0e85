//! Gain/volume control effect

use dasp_graph::Buffer;

use crate::error::GraphError;
use crate::node::{Kernel, KernelState, ProcessContext, RenderContext};
use crate::nodes::require_channels;
use crate::parameter::Parameters;

/// A gain (volume) control that passes audio through with amplitude scaling
///
/// Supports any number of channels - each input channel maps to the
/// corresponding output. The `gain` parameter is smoothed towards its target
/// unless it is driven by a connection, in which case it is applied per frame.
pub struct Gain {
    channels: usize,
    gain: f32,
    /// Smoothing to prevent clicks on rapid gain changes
    smoothed_gain: f32,
    /// Smoothing coefficient (0.0 = instant, 1.0 = no change)
    smooth_coeff: f32,
}

impl Gain {
    /// Create a new gain node with the specified gain value
    pub fn new(gain: f32, channels: usize) -> Self {
        Self {
            channels,
            gain,
            smoothed_gain: gain,
            smooth_coeff: 0.995, // ~7ms at 48kHz
        }
    }

    /// Set the smoothing time in milliseconds
    pub fn with_smoothing_ms(mut self, ms: f32, sample_rate: u32) -> Self {
        // Time constant: after `ms` milliseconds, we've reached ~63% of target
        let samples = (ms / 1000.0) * sample_rate as f32;
        self.smooth_coeff = (-1.0 / samples).exp();
        self
    }

    /// Disable smoothing for instant gain changes
    pub fn without_smoothing(mut self) -> Self {
        self.smooth_coeff = 0.0;
        self
    }
}

impl Kernel for Gain {
    fn describe(&self, params: &mut Parameters, _ctx: &ProcessContext) {
        params.add("gain", self.gain);
    }

    fn render(
        &mut self,
        ctx: &mut RenderContext<'_>,
        inputs: &[Buffer],
        outputs: &mut [Buffer],
    ) -> KernelState {
        let frames = ctx.block_size;
        let params = ctx.params;

        if params.is_driven("gain") {
            for (out, input) in outputs.iter_mut().zip(inputs) {
                for (i, (o, s)) in out[..frames].iter_mut().zip(&input[..frames]).enumerate() {
                    *o = *s * params.float_at("gain", i);
                }
            }
            self.smoothed_gain = params.float_at("gain", frames - 1);
            return KernelState::Continue;
        }

        let smooth_coeff = self.smooth_coeff;
        let target_gain = params.float("gain");
        let mut current_gain = self.smoothed_gain;

        for (ch, (out, input)) in outputs.iter_mut().zip(inputs).enumerate() {
            // Every channel starts from the same smoothed value
            let mut gain = self.smoothed_gain;
            for (o, s) in out[..frames].iter_mut().zip(&input[..frames]) {
                gain = target_gain + smooth_coeff * (gain - target_gain);
                *o = *s * gain;
            }
            if ch == 0 {
                current_gain = gain;
            }
        }

        self.smoothed_gain = current_gain;
        KernelState::Continue
    }

    fn reset(&mut self) {
        self.smoothed_gain = self.gain;
    }

    fn validate(&self) -> Result<(), GraphError> {
        require_channels("a gain", self.channels)
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        self.channels
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.channels
    }
}
