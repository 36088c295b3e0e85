//! Error type shared by every graph operation.

use crate::job::JobId;

/// Errors returned by graph construction, editing and rendering.
///
/// Construction and configuration errors leave the graph untouched. Planning
/// errors abort the current [`tick`](crate::Root::tick) and leave the topology
/// as it was.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// A count or value was outside the range the operation accepts.
    #[error("value out of range: {0}")]
    Range(String),

    /// An effect send, input slot or output channel index was out of bounds.
    #[error("{what} index {index} out of bounds (count is {len})")]
    Index {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// The planner reached a job that was still being expanded.
    ///
    /// Connections are checked for cycles when they are made, so this means the
    /// graph was corrupted. The tick is abandoned.
    #[error("dependency cycle detected at job {0}; the graph is inconsistent")]
    Cycle(JobId),

    /// The requested connection would make `to` depend on itself.
    #[error("connecting job {from} into job {to} would create a cycle")]
    WouldCycle { from: JobId, to: JobId },

    /// The job has no parameter with this name.
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    /// The value or connection does not match the parameter's type.
    #[error("parameter `{name}` expects a {expected} value")]
    ParameterType { name: String, expected: &'static str },

    /// The handle belongs to a different [`Root`](crate::Root).
    #[error("job {0} belongs to a different root")]
    ForeignJob(JobId),

    /// The job exists but is not the kind the operation needs.
    #[error("job {id} is not a {expected}")]
    WrongJobKind { id: JobId, expected: &'static str },
}

impl GraphError {
    pub(crate) fn index(what: &'static str, index: usize, len: usize) -> Self {
        GraphError::Index { what, index, len }
    }
}
