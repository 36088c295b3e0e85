//! Ring buffer sink for handing rendered audio to another thread

use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::GraphError;
use crate::root::Root;

/// Drives a [`Root`] and pushes its output into an rtrb ring buffer
///
/// Useful for:
/// - Feeding an audio device callback (see `CpalDevice` with the
///   `cpal_sink` feature)
/// - Sending audio to another thread
/// - Recording/analysis
///
/// Samples are interleaved. Only whole blocks are written.
pub struct RingSink {
    producer: Producer<f32>,
    channels: usize,
}

impl RingSink {
    /// Create a sink that writes interleaved samples to the given producer
    pub fn new(producer: Producer<f32>, channels: usize) -> Self {
        Self {
            producer,
            channels: channels.max(1),
        }
    }

    /// Create a sink and its consumer, with room for `blocks` blocks of the
    /// root's output.
    pub fn with_capacity(root: &Root, blocks: usize) -> (Self, Consumer<f32>) {
        let channels = root.channels();
        let (producer, consumer) = RingBuffer::new(root.block_size() * channels * blocks.max(1));
        (Self::new(producer, channels), consumer)
    }

    /// Returns how many sample slots are available
    #[inline]
    pub fn available(&self) -> usize {
        self.producer.slots()
    }

    /// Whether the consumer side is gone
    #[inline]
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }

    /// Tick `root` for as long as a whole block fits, returning the number of
    /// blocks written.
    pub fn render(&mut self, root: &Root) -> Result<usize, GraphError> {
        let samples_needed = root.block_size() * self.channels;
        let mut blocks = 0;

        while self.producer.slots() >= samples_needed {
            let block = root.tick()?;
            let available = block.len();

            // Interleave channels
            for i in 0..block.frames() {
                for ch in 0..self.channels {
                    let sample = if available == 0 {
                        0.0
                    } else {
                        block[ch.min(available - 1)][i]
                    };
                    let _ = self.producer.push(sample);
                }
            }
            blocks += 1;
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_whole_blocks_only() {
        let root = Root::new(48000).unwrap();
        let (producer, mut consumer) = RingBuffer::new(64 * 2 * 2 + 10);
        let mut sink = RingSink::new(producer, 2);

        assert_eq!(sink.render(&root).unwrap(), 2);
        assert_eq!(sink.available(), 10);
        assert_eq!(consumer.slots(), 256);

        consumer.pop().unwrap();
        assert_eq!(sink.render(&root).unwrap(), 0);
    }
}
