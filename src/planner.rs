//! Per-block execution order.
//!
//! The planner walks the graph depth first from the root and emits jobs in
//! post-order: a job is appended only after everything it depends on. Each
//! job kind supplies its own dependency rule:
//!
//! - the root depends on its output connection and its always-active jobs,
//! - an environment depends on its live sources,
//! - a node depends on its input connections and its driven parameters.

use hashbrown::HashMap;

use crate::error::GraphError;
use crate::job::{JobId, JobState, Jobs};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Mark {
    /// Dependencies are being expanded.
    Visiting,
    Done,
}

/// Reusable planning state. Capacity grows on the control side so that a
/// tick never allocates here.
#[derive(Default)]
pub(crate) struct Planner {
    marks: HashMap<JobId, Mark>,
    order: Vec<JobId>,
}

impl Planner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make room for a graph of `jobs` jobs.
    pub(crate) fn reserve(&mut self, jobs: usize) {
        self.marks.reserve(jobs.saturating_sub(self.marks.len()));
        self.order.reserve(jobs.saturating_sub(self.order.len()));
    }

    /// Plan everything reachable from `root`, excluding `root` itself.
    ///
    /// Fails with [`GraphError::Cycle`] if a job is reached again while its
    /// own dependencies are still being expanded.
    pub(crate) fn plan(&mut self, jobs: &Jobs, root: JobId) -> Result<&[JobId], GraphError> {
        self.marks.clear();
        self.order.clear();

        if let Err(e) = self.visit(jobs, root) {
            self.order.clear();
            return Err(e);
        }
        if self.order.last() == Some(&root) {
            self.order.pop();
        }
        Ok(&self.order)
    }

    fn visit(&mut self, jobs: &Jobs, id: JobId) -> Result<(), GraphError> {
        match self.marks.get(&id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(GraphError::Cycle(id)),
            None => {}
        }
        // Gone since it was referenced: treat as silent absence.
        let Some(entry) = jobs.get(&id) else {
            return Ok(());
        };
        if !entry.is_live() {
            return Ok(());
        }

        self.marks.insert(id, Mark::Visiting);
        {
            let mut state = entry
                .state
                .try_borrow_mut()
                .map_err(|_| GraphError::Cycle(id))?;
            let mut recurse = |dep: JobId| self.visit(jobs, dep);
            match &mut *state {
                JobState::Root(root) => root.visit_dependencies(&mut recurse)?,
                JobState::Environment(env) => {
                    env.prune_sources(jobs);
                    env.visit_sources(jobs, &mut recurse)?;
                }
                JobState::Node(node) => node.visit_dependencies(&mut recurse)?,
            }
        }
        self.marks.insert(id, Mark::Done);
        self.order.push(id);
        Ok(())
    }
}
