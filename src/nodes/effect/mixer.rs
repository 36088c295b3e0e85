//! Mixer effect - sums multiple inputs together

use dasp_graph::Buffer;

use crate::error::GraphError;
use crate::node::{Kernel, KernelState, RenderContext};
use crate::nodes::require_channels;

/// A mixer that sums several input slots together
///
/// Each slot has `channels` channels and is summed with equal weight. Connect
/// one upstream per slot; a mono upstream feeding a wider slot is copied to
/// every channel of that slot.
pub struct Mixer {
    slots: usize,
    channels: usize,
}

impl Mixer {
    /// Create a mixer with `slots` inputs of `channels` channels each
    ///
    /// Zero slots or channels is refused when the node is created.
    pub fn new(slots: usize, channels: usize) -> Self {
        Self { slots, channels }
    }

    /// Create a stereo mixer
    pub fn stereo(slots: usize) -> Self {
        Self::new(slots, 2)
    }

    /// Create a mono mixer
    pub fn mono(slots: usize) -> Self {
        Self::new(slots, 1)
    }
}

impl Kernel for Mixer {
    fn render(
        &mut self,
        ctx: &mut RenderContext<'_>,
        inputs: &[Buffer],
        outputs: &mut [Buffer],
    ) -> KernelState {
        let frames = ctx.block_size;

        // Clear output buffers
        for buf in outputs.iter_mut() {
            buf.iter_mut().for_each(|s| *s = 0.0);
        }

        // Sum all slots
        for slot in inputs.chunks(self.channels) {
            for (out_buf, in_buf) in outputs.iter_mut().zip(slot) {
                for (o, i) in out_buf[..frames].iter_mut().zip(&in_buf[..frames]) {
                    *o += *i;
                }
            }
        }
        KernelState::Continue
    }

    fn validate(&self) -> Result<(), GraphError> {
        require_channels("a mixer", self.channels)?;
        if self.slots == 0 {
            return Err(GraphError::Range("a mixer needs at least one slot".into()));
        }
        Ok(())
    }

    fn num_inputs(&self) -> usize {
        self.slots * self.channels
    }

    fn num_outputs(&self) -> usize {
        self.channels
    }

    fn input_layout(&self) -> Vec<usize> {
        vec![self.channels; self.slots]
    }
}
