//! A positioned mono source inside an environment.

use dasp_graph::Buffer;

use super::panner::{add_scaled, PanningStrategy};
use crate::node::{Kernel, KernelState, ProcessContext, RenderContext};
use crate::parameter::Parameters;

/// Reverb sends spread a source evenly over all four channels.
const REVERB_SPREAD: f32 = 0.5;

/// Writes its mono input into the environment it is registered with.
///
/// Has one input channel and no outputs: everything it renders lands in the
/// environment's scratch channels, so it must be registered (see
/// [`EnvironmentNode::register_source`](crate::EnvironmentNode::register_source))
/// to be heard. The environment's snapshot decides listener position,
/// attenuation and panning.
///
/// Parameters: `position` (world coordinates) and `gain`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Source;

impl Source {
    pub fn new() -> Self {
        Self
    }
}

/// Listener-relative azimuth and elevation in degrees.
pub(crate) fn direction(listener: [f32; 3]) -> (f32, f32) {
    let [x, y, z] = listener;
    let azimuth = x.atan2(-z).to_degrees();
    let elevation = y.atan2((x * x + z * z).sqrt()).to_degrees();
    (azimuth, elevation)
}

impl Kernel for Source {
    fn describe(&self, params: &mut Parameters, _ctx: &ProcessContext) {
        params.add("position", [0.0f32; 3]);
        params.add_float("gain", 1.0, 0.0, f32::MAX);
    }

    fn render(
        &mut self,
        ctx: &mut RenderContext<'_>,
        inputs: &[Buffer],
        _outputs: &mut [Buffer],
    ) -> KernelState {
        let frames = ctx.block_size;
        let position = ctx.params.vector3("position");
        let base_gain = ctx.params.float("gain");

        let Some(scene) = ctx.scene.as_mut() else {
            return KernelState::Continue;
        };
        let Some(input) = inputs.first() else {
            return KernelState::Continue;
        };
        let input = &input[..frames];

        let listener = scene.info.to_listener(position);
        let distance = listener.iter().map(|c| c * c).sum::<f32>().sqrt();
        let (azimuth, elevation) = direction(listener);
        let gain = base_gain * scene.info.attenuation(distance);

        let (base, sends) = scene.scratch.split_at_mut(scene.base_channels);
        scene.spatializer.pan(
            scene.info.panning_strategy,
            azimuth,
            elevation,
            gain,
            input,
            base,
        );

        for &index in scene.feeds {
            let Some(send) = scene.sends.get(index) else {
                continue;
            };
            let start = send.start - scene.base_channels;
            let Some(bus) = sends.get_mut(start..start + send.channels) else {
                continue;
            };

            if send.is_reverb && send.channels == 4 {
                let level = base_gain * scene.info.reverb_level(distance) * REVERB_SPREAD;
                for out in bus.iter_mut() {
                    add_scaled(out, input, level);
                }
            } else {
                let strategy =
                    PanningStrategy::for_channels(send.channels).unwrap_or(PanningStrategy::Stereo);
                scene
                    .spatializer
                    .pan(strategy, azimuth, elevation, gain, input, bus);
            }
        }

        KernelState::Continue
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_follows_listener_axes() {
        // straight ahead is -z
        let (az, el) = direction([0.0, 0.0, -1.0]);
        assert!(az.abs() < 1e-4 && el.abs() < 1e-4);

        let (az, _) = direction([1.0, 0.0, 0.0]);
        assert!((az - 90.0).abs() < 1e-4);

        let (az, _) = direction([-1.0, 0.0, 0.0]);
        assert!((az + 90.0).abs() < 1e-4);

        let (_, el) = direction([0.0, 1.0, 0.0]);
        assert!((el - 90.0).abs() < 1e-4);
    }
}
