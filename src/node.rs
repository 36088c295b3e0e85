//! Core kernel trait, context types and the generic node job.

use std::fmt;
use std::sync::Arc;

use dasp_graph::Buffer;

use crate::connection::{Connection, ConnectionInfo};
use crate::environment::{EffectSendConfiguration, EnvironmentInfo};
use crate::error::GraphError;
use crate::job::{Job, JobId, JobKey, Jobs, Sealed};
use crate::nodes::spatial::Spatializer;
use crate::parameter::Parameters;
use crate::root::Root;

/// Information available during audio processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessContext {
    /// Sample rate of the graph in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Frames rendered per block, at most [`Buffer::LEN`].
    pub block_size: usize,
}

/// Everything a kernel can see while rendering one block.
pub struct RenderContext<'a> {
    pub sample_rate: u32,
    pub block_size: usize,
    /// The node's parameters, with driving connections already pulled in.
    pub params: &'a Parameters,
    /// Present when the node is a registered source of an environment.
    pub scene: Option<Scene<'a>>,
}

/// A source's view of its environment for one block.
pub struct Scene<'a> {
    /// Listener snapshot, rebuilt at most once per block.
    pub info: &'a EnvironmentInfo,
    pub sends: &'a [EffectSendConfiguration],
    /// Indices into `sends` this source feeds.
    pub feeds: &'a [usize],
    /// Shared scratch channels: the base channels first, then each send's range.
    pub scratch: &'a mut [Buffer],
    pub base_channels: usize,
    pub spatializer: &'a dyn Spatializer,
}

/// Whether a kernel has more to play.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KernelState {
    Continue,
    /// Non-looping content reached its end.
    Finished,
}

/// The processing content of a [`Node`].
///
/// The graph takes care of scheduling, input gathering and parameter
/// plumbing; a kernel only turns input buffers into output buffers.
///
/// ```
/// use raumklang::{Kernel, KernelState, Parameters, ProcessContext, RenderContext};
/// use dasp_graph::Buffer;
///
/// struct Dc;
///
/// impl Kernel for Dc {
///     fn describe(&self, params: &mut Parameters, _ctx: &ProcessContext) {
///         params.add_float("level", 0.5, -1.0, 1.0);
///     }
///
///     fn render(
///         &mut self,
///         ctx: &mut RenderContext<'_>,
///         _inputs: &[Buffer],
///         outputs: &mut [Buffer],
///     ) -> KernelState {
///         let level = ctx.params.float("level");
///         for buffer in outputs.iter_mut() {
///             buffer[..ctx.block_size].iter_mut().for_each(|s| *s = level);
///         }
///         KernelState::Continue
///     }
/// }
///
/// let root = raumklang::Root::new(48000).unwrap();
/// let dc = root.create_node(Dc).unwrap();
/// root.set_output(&dc, 0).unwrap();
/// assert_eq!(root.tick().unwrap()[0][0], 0.5);
/// ```
pub trait Kernel: Send + 'static {
    /// Declare parameters. Called once, when the node is created.
    fn describe(&self, _params: &mut Parameters, _ctx: &ProcessContext) {}

    /// Called once per block before any job renders.
    fn prepare(&mut self, _ctx: &ProcessContext, _params: &Parameters) {}

    /// Render one block. Upstream jobs have already rendered.
    fn render(
        &mut self,
        ctx: &mut RenderContext<'_>,
        inputs: &[Buffer],
        outputs: &mut [Buffer],
    ) -> KernelState;

    /// Clear playback state before the node is reused.
    fn reset(&mut self) {}

    /// Number of audio input channels (0 for sources).
    fn num_inputs(&self) -> usize {
        0
    }

    /// Number of audio output channels.
    fn num_outputs(&self) -> usize {
        1
    }

    /// Reject a misconfigured kernel before it becomes a node.
    fn validate(&self) -> Result<(), GraphError> {
        Ok(())
    }

    /// How the input channels split into independently connectable slots.
    ///
    /// Defaults to a single slot holding every input channel.
    fn input_layout(&self) -> Vec<usize> {
        match self.num_inputs() {
            0 => Vec::new(),
            n => vec![n],
        }
    }
}

pub(crate) struct NodeState {
    pub(crate) inputs: Vec<Connection>,
    input_buffers: Vec<Buffer>,
    pub(crate) outputs: Vec<Buffer>,
    pub(crate) params: Parameters,
    pub(crate) kernel: Box<dyn Kernel>,
    /// Environment this node is a source of. Sources own their environment.
    pub(crate) environment: Option<Arc<JobKey>>,
    /// Environment to notify when the kernel finishes.
    pub(crate) on_finish: Option<JobId>,
    pub(crate) finished: bool,
}

impl NodeState {
    /// `slots` partitions the kernel's input channels into connection slots.
    pub(crate) fn new(
        kernel: Box<dyn Kernel>,
        slots: &[usize],
        ctx: &ProcessContext,
    ) -> Result<Self, GraphError> {
        kernel.validate()?;
        let num_inputs = kernel.num_inputs();
        let total: usize = slots.iter().sum();
        if total != num_inputs || slots.iter().any(|&c| c == 0) {
            return Err(GraphError::Range(format!(
                "input slots {:?} do not cover the kernel's {} input channels",
                slots, num_inputs
            )));
        }

        let mut inputs = Vec::with_capacity(slots.len());
        let mut start = 0;
        for &channels in slots {
            inputs.push(Connection::new(start, channels));
            start += channels;
        }

        let mut params = Parameters::new();
        kernel.describe(&mut params, ctx);

        Ok(Self {
            inputs,
            input_buffers: vec![Buffer::SILENT; num_inputs],
            outputs: vec![Buffer::SILENT; kernel.num_outputs()],
            params,
            kernel,
            environment: None,
            on_finish: None,
            finished: false,
        })
    }

    pub(crate) fn visit_dependencies(
        &self,
        f: &mut dyn FnMut(JobId) -> Result<(), GraphError>,
    ) -> Result<(), GraphError> {
        for conn in &self.inputs {
            conn.visit_inputs(f)?;
        }
        self.params.visit_inputs(f)
    }

    pub(crate) fn input(&self, slot: usize) -> Result<&Connection, GraphError> {
        self.inputs
            .get(slot)
            .ok_or_else(|| GraphError::index("input slot", slot, self.inputs.len()))
    }

    pub(crate) fn input_mut(&mut self, slot: usize) -> Result<&mut Connection, GraphError> {
        let len = self.inputs.len();
        self.inputs
            .get_mut(slot)
            .ok_or_else(|| GraphError::index("input slot", slot, len))
    }

    pub(crate) fn prepare(&mut self, ctx: &ProcessContext) {
        self.kernel.prepare(ctx, &self.params);
    }

    pub(crate) fn render(
        &mut self,
        jobs: &Jobs,
        ctx: &ProcessContext,
        scene: Option<Scene<'_>>,
    ) -> KernelState {
        let frames = ctx.block_size;
        for conn in &self.inputs {
            let range = conn.start()..conn.start() + conn.channels();
            conn.gather(jobs, &mut self.input_buffers[range], frames);
        }
        self.params.gather(jobs, frames);

        let mut rctx = RenderContext {
            sample_rate: ctx.sample_rate,
            block_size: frames,
            params: &self.params,
            scene,
        };
        let state = self
            .kernel
            .render(&mut rctx, &self.input_buffers, &mut self.outputs);
        self.params.clear_changed();
        state
    }

    /// Prepare a pooled node for another playback.
    pub(crate) fn reset(&mut self) {
        self.kernel.reset();
        self.finished = false;
        for buffer in self.outputs.iter_mut() {
            buffer.iter_mut().for_each(|s| *s = 0.0);
        }
    }
}

/// Handle to a generic processing job.
///
/// Cloning the handle shares the job. The job is retired once every handle
/// and every connection reading from it is gone.
#[derive(Clone)]
pub struct Node {
    pub(crate) key: Arc<JobKey>,
    pub(crate) root: Root,
}

impl Sealed for Node {
    fn key(&self) -> &Arc<JobKey> {
        &self.key
    }

    fn owner(&self) -> &Root {
        &self.root
    }
}

impl Job for Node {}

impl Node {
    /// Clear input slot `input`; it renders silence afterwards.
    ///
    /// Disconnecting an empty slot is a no-op.
    pub fn disconnect(&self, input: usize) -> Result<(), GraphError> {
        self.root.graph().disconnect(self.key.id, input)
    }

    /// Stop driving parameter `name` from a connection.
    pub fn disconnect_parameter(&self, name: &str) -> Result<(), GraphError> {
        self.root.graph().disconnect_parameter(self.key.id, name)
    }

    pub fn input_connection(&self, input: usize) -> Result<ConnectionInfo, GraphError> {
        self.root.graph().input_connection(self.key.id, input)
    }

    /// Number of input slots.
    pub fn input_count(&self) -> usize {
        self.root.graph().input_count(self.key.id).unwrap_or(0)
    }

    /// Whether the kernel reported the end of its content.
    pub fn is_finished(&self) -> bool {
        self.root.graph().is_finished(self.key.id)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("id", &self.key.id).finish()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.key, &other.key)
    }
}

impl Eq for Node {}
