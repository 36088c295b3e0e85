//! The graph owner: settings, the coarse lock and block rendering.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use dasp_graph::Buffer;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::environment::{EnvironmentNode, MIN_BASE_CHANNELS};
use crate::error::GraphError;
use crate::graph::Graph;
use crate::job::{Job, JobId, Sealed};
use crate::node::{Kernel, Node};
use crate::nodes::spatial::{AmplitudePanner, Spatializer};

/// Construction-time settings of a [`Root`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootSettings {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per block, `1..=64`.
    pub block_size: usize,
    /// Channels of the final output.
    pub channels: usize,
    /// Retired async playbacks kept per environment for reuse.
    pub recycle_pool_limit: usize,
}

impl Default for RootSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: Buffer::LEN,
            channels: 2,
            recycle_pool_limit: 30,
        }
    }
}

impl RootSettings {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_recycle_pool_limit(mut self, limit: usize) -> Self {
        self.recycle_pool_limit = limit;
        self
    }

    fn validate(&self) -> Result<(), GraphError> {
        if self.sample_rate == 0 {
            return Err(GraphError::Range("sample rate must be positive".into()));
        }
        if self.block_size == 0 || self.block_size > Buffer::LEN {
            return Err(GraphError::Range(format!(
                "block size {} is outside 1..={}",
                self.block_size,
                Buffer::LEN
            )));
        }
        if self.channels == 0 {
            return Err(GraphError::Range("output needs at least one channel".into()));
        }
        Ok(())
    }
}

struct Shared {
    settings: RootSettings,
    graph: Mutex<Graph>,
}

/// Owner of a job graph and the single entry point for rendering.
///
/// A `Root` is a cheap handle: clones share the same graph. Every edit and
/// every [`tick`](Self::tick) takes the same lock, so an edit is seen either
/// entirely before or entirely after a block.
///
/// ```
/// use raumklang::{Job, Root, nodes::{Gain, Sine}};
///
/// let root = Root::new(48000).unwrap();
/// let sine = root.create_node(Sine::new(440.0)).unwrap();
/// let gain = root.create_node(Gain::new(0.5, 1)).unwrap();
/// sine.connect(0, &gain, 0).unwrap();
/// root.set_output(&gain, 0).unwrap();
///
/// let block = root.tick().unwrap();
/// assert_eq!(block.channels(), 2);
/// ```
#[derive(Clone)]
pub struct Root {
    shared: Arc<Shared>,
}

impl Root {
    /// A root with default settings at `sample_rate`.
    pub fn new(sample_rate: u32) -> Result<Self, GraphError> {
        Self::with_settings(RootSettings::new(sample_rate))
    }

    pub fn with_settings(settings: RootSettings) -> Result<Self, GraphError> {
        settings.validate()?;
        let graph = Graph::new(&settings);
        tracing::debug!(?settings, "created root");
        Ok(Self {
            shared: Arc::new(Shared {
                settings,
                graph: Mutex::new(graph),
            }),
        })
    }

    /// Lock the graph for a control operation, reclaiming dead jobs first.
    pub(crate) fn graph(&self) -> MutexGuard<'_, Graph> {
        let mut graph = self.shared.graph.lock();
        graph.collect_garbage();
        graph
    }

    pub(crate) fn ensure_owned(&self, job: &impl Job) -> Result<(), GraphError> {
        if Arc::ptr_eq(&self.shared, &job.owner().shared) {
            Ok(())
        } else {
            Err(GraphError::ForeignJob(job.id()))
        }
    }

    pub fn settings(&self) -> &RootSettings {
        &self.shared.settings
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.settings.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.shared.settings.block_size
    }

    /// Channels of the final output.
    pub fn channels(&self) -> usize {
        self.shared.settings.channels
    }

    /// Create a node running `kernel`, with the kernel's own input layout.
    pub fn create_node(&self, kernel: impl Kernel) -> Result<Node, GraphError> {
        let slots = kernel.input_layout();
        self.create_node_with_inputs(kernel, &slots)
    }

    /// Create a node whose input channels are split into slots of the given
    /// widths. The widths must add up to the kernel's input count.
    pub fn create_node_with_inputs(
        &self,
        kernel: impl Kernel,
        slots: &[usize],
    ) -> Result<Node, GraphError> {
        let key = self.graph().create_node(Box::new(kernel), slots)?;
        Ok(Node {
            key,
            root: self.clone(),
        })
    }

    /// An environment with eight base channels and amplitude panning.
    pub fn create_environment(&self) -> Result<EnvironmentNode, GraphError> {
        self.create_environment_with(Arc::new(AmplitudePanner), MIN_BASE_CHANNELS)
    }

    /// An environment panning through `spatializer` into `base_channels`
    /// channels (at least eight).
    pub fn create_environment_with(
        &self,
        spatializer: Arc<dyn Spatializer>,
        base_channels: usize,
    ) -> Result<EnvironmentNode, GraphError> {
        let key = self
            .graph()
            .create_environment(spatializer, base_channels)?;
        Ok(EnvironmentNode {
            key,
            root: self.clone(),
        })
    }

    /// Render `job`'s channels starting at `output` as the final output.
    ///
    /// Replaces any previous output. The root keeps the job alive.
    pub fn set_output(&self, job: &impl Job, output: usize) -> Result<(), GraphError> {
        self.ensure_owned(job)?;
        self.graph().set_output(job.key().clone(), output)
    }

    /// Render silence from now on.
    pub fn clear_output(&self) {
        self.graph().clear_output();
    }

    /// Keep `job` alive and rendered every block even though nothing reads it.
    pub fn set_always_active(&self, job: &impl Job) -> Result<(), GraphError> {
        self.ensure_owned(job)?;
        self.graph().set_always_active(job.key().clone());
        Ok(())
    }

    pub fn clear_always_active(&self, job: &impl Job) -> Result<(), GraphError> {
        self.ensure_owned(job)?;
        self.graph().clear_always_active(job.id());
        Ok(())
    }

    /// Render one block.
    ///
    /// The returned buffers hold the lock: drop them before editing the graph
    /// from the same thread. On error the block is abandoned and the graph is
    /// left as it was.
    pub fn tick(&self) -> Result<BlockOutput<'_>, GraphError> {
        let mut graph = self.shared.graph.lock();
        graph.tick()?;
        Ok(BlockOutput {
            buffers: MutexGuard::map(graph, |g| g.root_outputs_mut()),
            frames: self.shared.settings.block_size,
        })
    }

    /// Render one block into `out` as interleaved samples.
    ///
    /// Returns the number of samples written.
    pub fn tick_interleaved(&self, out: &mut [f32]) -> Result<usize, GraphError> {
        let block = self.tick()?;
        Ok(block.interleave_into(out))
    }

    /// The order the next block would run jobs in, without rendering.
    pub fn plan(&self) -> Result<Vec<JobId>, GraphError> {
        self.graph().plan()
    }

    /// Live jobs, not counting the root.
    pub fn job_count(&self) -> usize {
        self.graph().job_count()
    }

    /// Reclaim jobs nobody holds. Every other control operation does this
    /// too; returns how many were reclaimed.
    pub fn collect_garbage(&self) -> usize {
        self.shared.graph.lock().collect_garbage()
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("settings", &self.shared.settings)
            .finish()
    }
}

/// The final output of one block.
///
/// Holds the root's lock until dropped.
pub struct BlockOutput<'a> {
    buffers: MappedMutexGuard<'a, [Buffer]>,
    frames: usize,
}

impl BlockOutput<'_> {
    /// Valid frames per channel.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.buffers.len()
    }

    /// The valid part of one channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.buffers.get(index).map(|b| &b[..self.frames])
    }

    /// Write interleaved frames into `out`, as many as fit.
    ///
    /// Returns the number of samples written.
    pub fn interleave_into(&self, out: &mut [f32]) -> usize {
        let channels = self.channels();
        if channels == 0 {
            return 0;
        }
        let frames = self.frames.min(out.len() / channels);
        for (frame, chunk) in out.chunks_exact_mut(channels).take(frames).enumerate() {
            for (sample, buffer) in chunk.iter_mut().zip(self.buffers.iter()) {
                *sample = buffer[frame];
            }
        }
        frames * channels
    }
}

impl Deref for BlockOutput<'_> {
    type Target = [Buffer];

    fn deref(&self) -> &[Buffer] {
        &self.buffers
    }
}
