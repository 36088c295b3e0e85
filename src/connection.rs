//! Bindings from upstream outputs to downstream inputs and parameters.

use std::sync::Arc;

use dasp_graph::Buffer;

use crate::error::GraphError;
use crate::job::{JobId, JobKey, Jobs};

/// One upstream output feeding a connection.
///
/// Holds a strong reference: a job stays alive for as long as something
/// downstream reads from it.
#[derive(Debug)]
pub(crate) struct Upstream {
    pub(crate) key: Arc<JobKey>,
    /// First output channel read from the upstream job.
    pub(crate) output: usize,
}

/// A destination channel range plus every upstream output summed into it.
///
/// The destination range is fixed when the owning job is built. Only the
/// upstream set changes, and only from the control side under the root lock.
#[derive(Debug)]
pub(crate) struct Connection {
    start: usize,
    channels: usize,
    upstreams: Vec<Upstream>,
}

/// A snapshot of one connection, as reported to callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// First destination channel.
    pub start: usize,
    /// Number of destination channels.
    pub channels: usize,
    /// Every `(job, first output channel)` pair feeding this connection.
    pub upstreams: Vec<(JobId, usize)>,
}

impl Connection {
    pub(crate) fn new(start: usize, channels: usize) -> Self {
        Self {
            start,
            channels,
            upstreams: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub(crate) fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub(crate) fn is_connected(&self) -> bool {
        !self.upstreams.is_empty()
    }

    /// Add an upstream. Connecting the same output twice is a no-op.
    pub(crate) fn connect(&mut self, key: Arc<JobKey>, output: usize) {
        let duplicate = self
            .upstreams
            .iter()
            .any(|u| u.key.id == key.id && u.output == output);
        if !duplicate {
            self.upstreams.push(Upstream { key, output });
        }
    }

    /// Drop every upstream; the range contributes silence afterwards.
    pub(crate) fn disconnect(&mut self) {
        self.upstreams.clear();
    }

    /// Call `f` once for every distinct upstream job.
    pub(crate) fn visit_inputs(
        &self,
        f: &mut dyn FnMut(JobId) -> Result<(), GraphError>,
    ) -> Result<(), GraphError> {
        for (i, upstream) in self.upstreams.iter().enumerate() {
            let id = upstream.key.id;
            // Two ranges of the same job are still one dependency.
            if self.upstreams[..i].iter().any(|u| u.key.id == id) {
                continue;
            }
            f(id)?;
        }
        Ok(())
    }

    pub(crate) fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            start: self.start,
            channels: self.channels,
            upstreams: self
                .upstreams
                .iter()
                .map(|u| (u.key.id, u.output))
                .collect(),
        }
    }

    /// Sum every upstream output into `dest`, which is this connection's range.
    ///
    /// A mono upstream feeding a wider range is copied to every channel. Missing
    /// upstream channels contribute silence.
    pub(crate) fn gather(&self, jobs: &Jobs, dest: &mut [Buffer], frames: usize) {
        for buffer in dest.iter_mut() {
            buffer.iter_mut().for_each(|s| *s = 0.0);
        }

        for upstream in &self.upstreams {
            let Some(entry) = jobs.get(&upstream.key.id) else {
                continue;
            };
            let Ok(state) = entry.state.try_borrow() else {
                continue;
            };
            let Some(available) = state.outputs().get(upstream.output..) else {
                continue;
            };

            if available.len() == 1 && dest.len() > 1 {
                for buffer in dest.iter_mut() {
                    accumulate(buffer, &available[0], frames);
                }
            } else {
                for (buffer, source) in dest.iter_mut().zip(available) {
                    accumulate(buffer, source, frames);
                }
            }
        }
    }
}

#[inline]
fn accumulate(dest: &mut Buffer, source: &Buffer, frames: usize) {
    for (d, s) in dest[..frames].iter_mut().zip(&source[..frames]) {
        *d += *s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: u64) -> Arc<JobKey> {
        Arc::new(JobKey { id: JobId(id) })
    }

    #[test]
    fn visit_inputs_yields_each_job_once() {
        let a = key(1);
        let b = key(2);
        let mut conn = Connection::new(0, 2);
        conn.connect(a.clone(), 0);
        conn.connect(a.clone(), 1);
        conn.connect(b.clone(), 0);
        conn.connect(a, 0);

        let mut seen = Vec::new();
        conn.visit_inputs(&mut |id| {
            seen.push(id);
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![JobId(1), JobId(2)]);
        assert_eq!(conn.info().upstreams.len(), 3);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut conn = Connection::new(0, 1);
        conn.disconnect();
        assert!(!conn.is_connected());

        conn.connect(key(7), 0);
        assert!(conn.is_connected());
        conn.disconnect();
        conn.disconnect();
        assert!(!conn.is_connected());
        assert!(conn.info().upstreams.is_empty());
    }

    #[test]
    fn connection_holds_its_upstream_alive() {
        let upstream = key(3);
        let weak = Arc::downgrade(&upstream);
        let mut conn = Connection::new(0, 1);
        conn.connect(upstream, 0);
        assert_eq!(weak.strong_count(), 1);
        conn.disconnect();
        assert_eq!(weak.strong_count(), 0);
    }
}
