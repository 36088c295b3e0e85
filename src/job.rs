//! Job identity, ownership and the registry entry shared by every job kind.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use dasp_graph::Buffer;
use hashbrown::HashMap;

use crate::connection::ConnectionInfo;
use crate::environment::EnvironmentState;
use crate::error::GraphError;
use crate::graph::RootState;
use crate::node::{Node, NodeState};
use crate::parameter::{ParamValue, Parameters};
use crate::root::Root;

/// Stable identity of a job within its [`Root`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct JobId(pub(crate) u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ownership token for a job.
///
/// A job lives for as long as at least one `Arc<JobKey>` does: user handles,
/// connections reading from it, the root's always-active set, a source's link
/// to its environment. The registry itself only keeps a `Weak`.
#[derive(Debug)]
pub struct JobKey {
    pub(crate) id: JobId,
}

pub(crate) enum JobState {
    Root(RootState),
    Environment(EnvironmentState),
    Node(NodeState),
}

impl JobState {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            JobState::Root(_) => "root",
            JobState::Environment(_) => "environment",
            JobState::Node(_) => "node",
        }
    }

    /// This block's output channels.
    pub(crate) fn outputs(&self) -> &[Buffer] {
        match self {
            JobState::Root(root) => &root.outputs,
            JobState::Environment(env) => &env.outputs,
            JobState::Node(node) => &node.outputs,
        }
    }

    pub(crate) fn params(&self) -> Option<&Parameters> {
        match self {
            JobState::Root(_) => None,
            JobState::Environment(env) => Some(&env.params),
            JobState::Node(node) => Some(&node.params),
        }
    }

    pub(crate) fn params_mut(&mut self) -> Option<&mut Parameters> {
        match self {
            JobState::Root(_) => None,
            JobState::Environment(env) => Some(&mut env.params),
            JobState::Node(node) => Some(&mut node.params),
        }
    }
}

/// A registry slot.
///
/// The state is only borrowed while the root lock is held, so the `RefCell`
/// never sees two threads.
pub(crate) struct JobEntry {
    key: Weak<JobKey>,
    pub(crate) state: RefCell<JobState>,
}

impl JobEntry {
    pub(crate) fn new(key: &Arc<JobKey>, state: JobState) -> Self {
        Self {
            key: Arc::downgrade(key),
            state: RefCell::new(state),
        }
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.key.strong_count() > 0
    }
}

pub(crate) type Jobs = HashMap<JobId, JobEntry>;

mod sealed {
    use std::sync::Arc;

    use super::JobKey;
    use crate::root::Root;

    pub trait Sealed {
        fn key(&self) -> &Arc<JobKey>;
        fn owner(&self) -> &Root;
    }
}

pub(crate) use sealed::Sealed;

/// Operations shared by every job handle.
///
/// Implemented by [`Node`] and [`EnvironmentNode`](crate::EnvironmentNode).
/// Handles are cheap to clone; dropping the last clone (and every other strong
/// holder) retires the job.
pub trait Job: Sealed {
    fn id(&self) -> JobId {
        self.key().id
    }

    /// The root this job renders under.
    fn root(&self) -> &Root {
        self.owner()
    }

    /// Number of output channels.
    fn output_count(&self) -> usize {
        self.owner()
            .graph()
            .output_count(self.id())
            .unwrap_or(0)
    }

    /// Feed this job's channels starting at `output` into input slot `input`
    /// of `to`.
    ///
    /// Fails with [`GraphError::WouldCycle`] if `to` is already upstream of
    /// this job.
    fn connect(&self, output: usize, to: &Node, input: usize) -> Result<(), GraphError> {
        let root = self.owner();
        root.ensure_owned(to)?;
        root.graph()
            .connect(self.key().clone(), output, to.id(), input)
    }

    /// Drive the float parameter `name` of `to` from this job's `output`.
    fn connect_parameter(&self, output: usize, to: &Node, name: &str) -> Result<(), GraphError> {
        let root = self.owner();
        root.ensure_owned(to)?;
        root.graph()
            .connect_parameter(self.key().clone(), output, to.id(), name)
    }

    /// Set a parameter; the change is seen by the next block.
    fn set(&self, name: &str, value: impl Into<ParamValue>) -> Result<(), GraphError>
    where
        Self: Sized,
    {
        self.owner().graph().set_parameter(self.id(), name, value.into())
    }

    fn get(&self, name: &str) -> Result<ParamValue, GraphError> {
        self.owner().graph().get_parameter(self.id(), name)
    }

    /// The connection driving parameter `name`, if any.
    fn parameter_connection(&self, name: &str) -> Result<Option<ConnectionInfo>, GraphError> {
        self.owner().graph().parameter_connection(self.id(), name)
    }
}
