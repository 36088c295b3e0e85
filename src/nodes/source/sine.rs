//! Sine wave oscillator

use dasp_graph::Buffer;

use crate::node::{Kernel, KernelState, ProcessContext, RenderContext};
use crate::parameter::Parameters;

/// A sine wave oscillator (mono source)
///
/// Parameters: `frequency` in Hz and `amplitude`. Both can be driven by a
/// connection, in which case they are read per frame.
pub struct Sine {
    frequency: f32,
    amplitude: f32,
    phase: f32,
}

impl Sine {
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency: frequency.max(0.0),
            amplitude: 0.25, // -12dB, safe default
            phase: 0.0,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }
}

impl Kernel for Sine {
    fn describe(&self, params: &mut Parameters, ctx: &ProcessContext) {
        params.add_float("frequency", self.frequency, 0.0, ctx.sample_rate as f32 / 2.0);
        params.add_float("amplitude", self.amplitude, 0.0, 1.0);
    }

    fn render(
        &mut self,
        ctx: &mut RenderContext<'_>,
        _inputs: &[Buffer],
        outputs: &mut [Buffer],
    ) -> KernelState {
        let Some((first, rest)) = outputs.split_first_mut() else {
            return KernelState::Continue;
        };

        let params = ctx.params;
        let sample_rate = ctx.sample_rate as f32;
        let modulated = params.is_driven("frequency") || params.is_driven("amplitude");
        let mut phase_inc = params.float("frequency") / sample_rate;
        let mut amplitude = params.float("amplitude");

        for (i, sample) in first[..ctx.block_size].iter_mut().enumerate() {
            if modulated {
                phase_inc = params.float_at("frequency", i) / sample_rate;
                amplitude = params.float_at("amplitude", i);
            }
            *sample = (self.phase * core::f32::consts::TAU).sin() * amplitude;

            self.phase += phase_inc;
            self.phase -= self.phase.floor();
        }

        // Copy to remaining output channels (if any)
        for buffer in rest.iter_mut() {
            buffer.copy_from_slice(first);
        }
        KernelState::Continue
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dasp_signal::Signal;

    #[test]
    fn matches_reference_sine() {
        let ctx = ProcessContext {
            sample_rate: 48000,
            block_size: 64,
        };
        let mut sine = Sine::new(1000.0).with_amplitude(1.0);
        let mut params = Parameters::new();
        sine.describe(&mut params, &ctx);

        let mut outputs = [Buffer::SILENT];
        let mut rctx = RenderContext {
            sample_rate: ctx.sample_rate,
            block_size: ctx.block_size,
            params: &params,
            scene: None,
        };
        sine.render(&mut rctx, &[], &mut outputs);

        let mut reference = dasp_signal::rate(48000.0).const_hz(1000.0).sine();
        for &sample in outputs[0].iter() {
            let expected = reference.next() as f32;
            assert!((sample - expected).abs() < 1e-3, "{sample} vs {expected}");
        }
    }
}
