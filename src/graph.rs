//! The job registry behind a [`Root`](crate::Root)'s lock.
//!
//! Everything in here runs with the lock held. Control operations may
//! allocate and reclaim dead jobs; [`Graph::tick`] does neither.

use std::sync::Arc;

use dasp_graph::Buffer;
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, error, warn};

use crate::connection::{Connection, ConnectionInfo};
use crate::environment::{EnvironmentState, Playback, SourceRouting};
use crate::error::GraphError;
use crate::job::{JobEntry, JobId, JobKey, JobState, Jobs};
use crate::node::{Kernel, KernelState, NodeState, ProcessContext};
use crate::nodes::source::BufferPlayer;
use crate::nodes::spatial::{Source, Spatializer};
use crate::parameter::ParamValue;
use crate::planner::Planner;
use crate::root::RootSettings;
use crate::sound::SoundBuffer;

pub(crate) const ROOT_ID: JobId = JobId(0);

/// The root's own job state: the final output and the always-active set.
pub(crate) struct RootState {
    pub(crate) output: Connection,
    pub(crate) outputs: Vec<Buffer>,
    pub(crate) always_active: Vec<Arc<JobKey>>,
}

impl RootState {
    pub(crate) fn new(channels: usize) -> Self {
        Self {
            output: Connection::new(0, channels),
            outputs: vec![Buffer::SILENT; channels],
            always_active: Vec::new(),
        }
    }

    pub(crate) fn visit_dependencies(
        &self,
        f: &mut dyn FnMut(JobId) -> Result<(), GraphError>,
    ) -> Result<(), GraphError> {
        self.output.visit_inputs(f)?;
        for key in &self.always_active {
            f(key.id)?;
        }
        Ok(())
    }

    fn render(&mut self, jobs: &Jobs, frames: usize) {
        self.output.gather(jobs, &mut self.outputs, frames);
    }
}

pub(crate) struct Graph {
    jobs: Jobs,
    /// Keeps the root entry alive for as long as the graph exists.
    _root_key: Arc<JobKey>,
    next_id: u64,
    planner: Planner,
    ctx: ProcessContext,
    pool_limit: usize,
    /// Async players that finished during the current block.
    finished: Vec<JobId>,
    /// Async playbacks started and not yet retired, across all environments.
    async_playing: usize,
}

impl Graph {
    pub(crate) fn new(settings: &RootSettings) -> Self {
        let root_key = Arc::new(JobKey { id: ROOT_ID });
        let mut jobs = Jobs::with_capacity(64);
        jobs.insert(
            ROOT_ID,
            JobEntry::new(&root_key, JobState::Root(RootState::new(settings.channels))),
        );
        let mut planner = Planner::new();
        planner.reserve(64);

        Self {
            jobs,
            _root_key: root_key,
            next_id: ROOT_ID.0 + 1,
            planner,
            ctx: ProcessContext {
                sample_rate: settings.sample_rate,
                block_size: settings.block_size,
            },
            pool_limit: settings.recycle_pool_limit,
            finished: Vec::with_capacity(settings.recycle_pool_limit),
            async_playing: 0,
        }
    }

    /// Drop registry entries nobody holds any more.
    ///
    /// Dropping an entry releases the connections it held, which can retire
    /// further jobs, so this repeats until nothing changes.
    pub(crate) fn collect_garbage(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let before = self.jobs.len();
            self.jobs.retain(|_, entry| entry.is_live());
            let dropped = before - self.jobs.len();
            if dropped == 0 {
                break;
            }
            removed += dropped;
        }
        if removed > 0 {
            debug!(removed, remaining = self.jobs.len() - 1, "reclaimed jobs");
        }
        removed
    }

    /// Live jobs, not counting the root.
    pub(crate) fn job_count(&self) -> usize {
        self.jobs.len() - 1
    }

    fn insert(&mut self, state: JobState) -> Arc<JobKey> {
        let id = JobId(self.next_id);
        self.next_id += 1;
        let key = Arc::new(JobKey { id });
        debug!(job = %id, kind = state.kind(), "created job");
        self.jobs.insert(id, JobEntry::new(&key, state));
        self.planner.reserve(self.jobs.len());
        key
    }

    pub(crate) fn create_node(
        &mut self,
        kernel: Box<dyn Kernel>,
        slots: &[usize],
    ) -> Result<Arc<JobKey>, GraphError> {
        let state = NodeState::new(kernel, slots, &self.ctx)?;
        Ok(self.insert(JobState::Node(state)))
    }

    pub(crate) fn create_environment(
        &mut self,
        spatializer: Arc<dyn Spatializer>,
        base_channels: usize,
    ) -> Result<Arc<JobKey>, GraphError> {
        let state = EnvironmentState::new(spatializer, base_channels, self.pool_limit)?;
        Ok(self.insert(JobState::Environment(state)))
    }

    fn state_mut(&mut self, id: JobId) -> Result<&mut JobState, GraphError> {
        self.jobs
            .get_mut(&id)
            .map(|entry| entry.state.get_mut())
            .ok_or(GraphError::WrongJobKind {
                id,
                expected: "live job",
            })
    }

    fn state(&self, id: JobId) -> Result<std::cell::Ref<'_, JobState>, GraphError> {
        self.jobs
            .get(&id)
            .map(|entry| entry.state.borrow())
            .ok_or(GraphError::WrongJobKind {
                id,
                expected: "live job",
            })
    }

    pub(crate) fn node_mut(&mut self, id: JobId) -> Result<&mut NodeState, GraphError> {
        match self.state_mut(id)? {
            JobState::Node(node) => Ok(node),
            _ => Err(GraphError::WrongJobKind {
                id,
                expected: "node",
            }),
        }
    }

    pub(crate) fn env_mut(&mut self, id: JobId) -> Result<&mut EnvironmentState, GraphError> {
        match self.state_mut(id)? {
            JobState::Environment(env) => Ok(env),
            _ => Err(GraphError::WrongJobKind {
                id,
                expected: "environment",
            }),
        }
    }

    fn root_mut(&mut self) -> Option<&mut RootState> {
        match self.jobs.get_mut(&ROOT_ID)?.state.get_mut() {
            JobState::Root(root) => Some(root),
            _ => None,
        }
    }

    pub(crate) fn with_environment<R>(
        &mut self,
        id: JobId,
        f: impl FnOnce(&mut EnvironmentState) -> R,
    ) -> Result<R, GraphError> {
        self.env_mut(id).map(f)
    }

    pub(crate) fn output_count(&self, id: JobId) -> Result<usize, GraphError> {
        Ok(self.state(id)?.outputs().len())
    }

    /// Whether making `to` read from `from` would close a loop.
    fn would_cycle(&self, from: JobId, to: JobId) -> bool {
        if from == to {
            return true;
        }
        let mut deps = DiGraphMap::<JobId, ()>::new();
        for (&id, entry) in &self.jobs {
            let Ok(state) = entry.state.try_borrow() else {
                continue;
            };
            let mut edge = |dep: JobId| -> Result<(), GraphError> {
                deps.add_edge(dep, id, ());
                Ok(())
            };
            let _ = match &*state {
                JobState::Root(root) => root.visit_dependencies(&mut edge),
                JobState::Environment(env) => env.visit_sources(&self.jobs, &mut edge),
                JobState::Node(node) => node.visit_dependencies(&mut edge),
            };
        }
        deps.contains_node(to)
            && deps.contains_node(from)
            && has_path_connecting(&deps, to, from, None)
    }

    fn check_cycle(&self, from: JobId, to: JobId) -> Result<(), GraphError> {
        if self.would_cycle(from, to) {
            warn!(%from, %to, "rejected edit that would create a cycle");
            return Err(GraphError::WouldCycle { from, to });
        }
        Ok(())
    }

    fn check_output(&self, id: JobId, output: usize) -> Result<(), GraphError> {
        let len = self.output_count(id)?;
        if output >= len {
            return Err(GraphError::index("output channel", output, len));
        }
        Ok(())
    }

    pub(crate) fn connect(
        &mut self,
        from: Arc<JobKey>,
        output: usize,
        to: JobId,
        input: usize,
    ) -> Result<(), GraphError> {
        self.check_output(from.id, output)?;
        self.node_mut(to)?.input(input)?;
        self.check_cycle(from.id, to)?;

        debug!(from = %from.id, output, to = %to, input, "connected");
        self.node_mut(to)?.input_mut(input)?.connect(from, output);
        Ok(())
    }

    /// Connect without the cycle check.
    #[cfg(test)]
    pub(crate) fn connect_unchecked(
        &mut self,
        from: Arc<JobKey>,
        output: usize,
        to: JobId,
        input: usize,
    ) -> Result<(), GraphError> {
        self.node_mut(to)?.input_mut(input)?.connect(from, output);
        Ok(())
    }

    pub(crate) fn disconnect(&mut self, id: JobId, input: usize) -> Result<(), GraphError> {
        self.node_mut(id)?.input_mut(input)?.disconnect();
        debug!(job = %id, input, "disconnected input");
        Ok(())
    }

    pub(crate) fn input_connection(
        &mut self,
        id: JobId,
        input: usize,
    ) -> Result<ConnectionInfo, GraphError> {
        Ok(self.node_mut(id)?.input(input)?.info())
    }

    pub(crate) fn input_count(&mut self, id: JobId) -> Result<usize, GraphError> {
        Ok(self.node_mut(id)?.inputs.len())
    }

    pub(crate) fn is_finished(&mut self, id: JobId) -> bool {
        self.node_mut(id).map_or(false, |node| node.finished)
    }

    pub(crate) fn connect_parameter(
        &mut self,
        from: Arc<JobKey>,
        output: usize,
        to: JobId,
        name: &str,
    ) -> Result<(), GraphError> {
        self.check_output(from.id, output)?;
        if !self.node_mut(to)?.params.contains(name) {
            return Err(GraphError::UnknownParameter(name.to_owned()));
        }
        self.check_cycle(from.id, to)?;

        debug!(from = %from.id, output, to = %to, name, "connected parameter");
        self.node_mut(to)?.params.connect(name, from, output)
    }

    pub(crate) fn disconnect_parameter(&mut self, id: JobId, name: &str) -> Result<(), GraphError> {
        self.node_mut(id)?.params.disconnect(name)
    }

    pub(crate) fn parameter_connection(
        &mut self,
        id: JobId,
        name: &str,
    ) -> Result<Option<ConnectionInfo>, GraphError> {
        match self.state_mut(id)?.params() {
            Some(params) => params.connection_info(name),
            None => Err(GraphError::UnknownParameter(name.to_owned())),
        }
    }

    pub(crate) fn set_parameter(
        &mut self,
        id: JobId,
        name: &str,
        value: ParamValue,
    ) -> Result<(), GraphError> {
        let result = match self.state_mut(id)?.params_mut() {
            Some(params) => params.set(name, value),
            None => Err(GraphError::UnknownParameter(name.to_owned())),
        };
        if let Err(e) = &result {
            warn!(job = %id, name, error = %e, "rejected parameter change");
        }
        result
    }

    pub(crate) fn get_parameter(&mut self, id: JobId, name: &str) -> Result<ParamValue, GraphError> {
        match self.state_mut(id)?.params() {
            Some(params) => params.get(name),
            None => Err(GraphError::UnknownParameter(name.to_owned())),
        }
    }

    pub(crate) fn set_output(&mut self, from: Arc<JobKey>, output: usize) -> Result<(), GraphError> {
        self.check_output(from.id, output)?;
        if let Some(root) = self.root_mut() {
            root.output.disconnect();
            debug!(from = %from.id, output, "set root output");
            root.output.connect(from, output);
        }
        Ok(())
    }

    pub(crate) fn clear_output(&mut self) {
        if let Some(root) = self.root_mut() {
            root.output.disconnect();
        }
    }

    pub(crate) fn set_always_active(&mut self, key: Arc<JobKey>) {
        if let Some(root) = self.root_mut() {
            if !root.always_active.iter().any(|k| k.id == key.id) {
                root.always_active.push(key);
            }
        }
    }

    pub(crate) fn clear_always_active(&mut self, id: JobId) {
        if let Some(root) = self.root_mut() {
            root.always_active.retain(|k| k.id != id);
        }
    }

    pub(crate) fn create_source(&mut self, env: &Arc<JobKey>) -> Result<Arc<JobKey>, GraphError> {
        self.env_mut(env.id)?;
        let key = self.create_node(Box::new(Source::new()), &[1])?;
        self.register_source(env, key.id, true)?;
        Ok(key)
    }

    pub(crate) fn register_source(
        &mut self,
        env: &Arc<JobKey>,
        source: JobId,
        use_effect_sends: bool,
    ) -> Result<(), GraphError> {
        let feeds = self.env_mut(env.id)?.default_feeds(use_effect_sends);
        let previous = self.node_mut(source)?.environment.as_ref().map(|k| k.id);
        if previous != Some(env.id) {
            self.check_cycle(source, env.id)?;
        }

        if let Some(previous) = previous.filter(|&p| p != env.id) {
            if let Ok(old) = self.env_mut(previous) {
                old.sources.remove(&source);
            }
        }
        self.env_mut(env.id)?.sources.insert(
            source,
            SourceRouting {
                uses_effect_sends: use_effect_sends,
                feeds,
            },
        );
        self.node_mut(source)?.environment = Some(env.clone());
        debug!(environment = %env.id, %source, use_effect_sends, "registered source");
        Ok(())
    }

    pub(crate) fn feed_effect(
        &mut self,
        env: JobId,
        source: JobId,
        send: usize,
        enable: bool,
    ) -> Result<(), GraphError> {
        let env_state = self.env_mut(env)?;
        env_state.effect_send(send)?;
        let routing = env_state
            .sources
            .get_mut(&source)
            .ok_or(GraphError::WrongJobKind {
                id: source,
                expected: "source of this environment",
            })?;
        if enable {
            if !routing.feeds.contains(&send) {
                routing.feeds.push(send);
            }
        } else {
            routing.feeds.retain(|&s| s != send);
        }
        Ok(())
    }

    pub(crate) fn add_effect_send(
        &mut self,
        env: JobId,
        channels: usize,
        is_reverb: bool,
        connect_by_default: bool,
    ) -> Result<usize, GraphError> {
        match self
            .env_mut(env)?
            .add_effect_send(channels, is_reverb, connect_by_default)
        {
            Ok(index) => {
                debug!(environment = %env, index, channels, is_reverb, "added effect send");
                Ok(index)
            }
            Err(e) => {
                warn!(environment = %env, channels, "rejected effect send");
                Err(e)
            }
        }
    }

    pub(crate) fn play_async(
        &mut self,
        env: &Arc<JobKey>,
        sound: Arc<SoundBuffer>,
        position: [f32; 3],
        is_dry: bool,
    ) -> Result<(), GraphError> {
        let playback = match self.env_mut(env.id)?.pool.pop_back() {
            Some(playback) => playback,
            None => {
                let player = self.create_node(Box::new(BufferPlayer::mono()), &[])?;
                let source = self.create_node(Box::new(Source::new()), &[1])?;
                self.node_mut(source.id)?
                    .input_mut(0)?
                    .connect(player.clone(), 0);
                Playback { player, source }
            }
        };

        let player = self.node_mut(playback.player.id)?;
        player.reset();
        player.params.set("buffer", ParamValue::Buffer(Some(sound)))?;
        player.params.set("position", ParamValue::Float(0.0))?;
        player.params.set("looping", ParamValue::Int(0))?;
        player.on_finish = Some(env.id);

        let source = self.node_mut(playback.source.id)?;
        source.reset();
        source.params.set("position", ParamValue::Vector3(position))?;

        self.register_source(env, playback.source.id, !is_dry)?;
        self.set_always_active(playback.player.clone());
        debug!(environment = %env.id, player = %playback.player.id, "started async playback");
        self.env_mut(env.id)?.playing.push(playback);
        self.async_playing += 1;
        // every running playback may finish in the same block
        self.finished.reserve(self.async_playing);
        Ok(())
    }

    /// Return a finished async player and its source to the pool.
    fn retire(&mut self, player: JobId) {
        let Some(env) = self.node_mut(player).ok().and_then(|node| node.on_finish) else {
            return;
        };
        let Some(playback) = self.env_mut(env).ok().and_then(|e| e.take_playing(player)) else {
            return;
        };
        self.async_playing -= 1;

        self.clear_always_active(player);
        let source = playback.source.id;
        if let Ok(node) = self.node_mut(source) {
            node.environment = None;
        }
        if let Ok(env_state) = self.env_mut(env) {
            env_state.sources.remove(&source);
            let evicted = env_state.offer_to_pool(playback);
            debug!(environment = %env, %player, "retired async playback");
            if evicted > 0 {
                debug!(environment = %env, evicted, "recycle pool full, evicted oldest");
            }
        }
    }

    /// The planner's current order, for inspection.
    pub(crate) fn plan(&mut self) -> Result<Vec<JobId>, GraphError> {
        Ok(self.planner.plan(&self.jobs, ROOT_ID)?.to_vec())
    }

    /// Render one block into the root's output buffers.
    pub(crate) fn tick(&mut self) -> Result<(), GraphError> {
        let Graph {
            jobs,
            planner,
            ctx,
            finished,
            ..
        } = self;

        let order = match planner.plan(jobs, ROOT_ID) {
            Ok(order) => order,
            Err(e) => {
                error!(error = %e, "planning failed, block abandoned");
                return Err(e);
            }
        };

        for id in order {
            if let Some(entry) = jobs.get(id) {
                match &mut *entry.state.borrow_mut() {
                    JobState::Node(node) => node.prepare(ctx),
                    JobState::Environment(env) => env.prepare(ctx),
                    JobState::Root(_) => {}
                }
            }
        }

        for &id in order {
            render_job(jobs, id, ctx, finished);
        }

        if let Some(entry) = jobs.get(&ROOT_ID) {
            if let JobState::Root(root) = &mut *entry.state.borrow_mut() {
                root.render(jobs, ctx.block_size);
            }
        }

        while let Some(player) = self.finished.pop() {
            self.retire(player);
        }
        Ok(())
    }

    /// The root's output buffers as of the last tick.
    pub(crate) fn root_outputs_mut(&mut self) -> &mut [Buffer] {
        match self.root_mut() {
            Some(root) => &mut root.outputs[..],
            None => &mut [],
        }
    }
}

fn render_job(jobs: &Jobs, id: JobId, ctx: &ProcessContext, finished: &mut Vec<JobId>) {
    let Some(entry) = jobs.get(&id) else {
        return;
    };
    let Ok(mut state) = entry.state.try_borrow_mut() else {
        return;
    };

    match &mut *state {
        JobState::Node(node) => {
            let env_entry = node.environment.as_ref().and_then(|key| jobs.get(&key.id));
            let mut env_state = env_entry.and_then(|e| e.state.try_borrow_mut().ok());
            let scene = match env_state.as_deref_mut() {
                Some(JobState::Environment(env)) => env.scene_for(id),
                _ => None,
            };

            let result = node.render(jobs, ctx, scene);
            if result == KernelState::Finished && !node.finished {
                node.finished = true;
                if node.on_finish.is_some() {
                    finished.push(id);
                }
            }
        }
        JobState::Environment(env) => env.render(ctx.block_size),
        JobState::Root(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::effect::Mixer;
    use crate::nodes::source::Sine;

    fn graph() -> Graph {
        Graph::new(&RootSettings::default())
    }

    #[test]
    fn cycle_bypassing_connect_fails_the_tick() {
        let mut g = graph();
        let a = g.create_node(Box::new(Mixer::new(1, 1)), &[1]).unwrap();
        let b = g.create_node(Box::new(Mixer::new(1, 1)), &[1]).unwrap();
        g.connect(b.clone(), 0, a.id, 0).unwrap();
        g.set_output(a.clone(), 0).unwrap();

        // the checked path refuses
        assert_eq!(
            g.connect(a.clone(), 0, b.id, 0),
            Err(GraphError::WouldCycle { from: a.id, to: b.id })
        );
        g.connect_unchecked(a.clone(), 0, b.id, 0).unwrap();

        assert!(matches!(g.tick(), Err(GraphError::Cycle(_))));
        assert!(matches!(g.plan(), Err(GraphError::Cycle(_))));
        // topology untouched
        assert_eq!(g.job_count(), 2);
    }

    #[test]
    fn garbage_collection_cascades_through_connections() {
        let mut g = graph();
        let sine = g.create_node(Box::new(Sine::new(440.0)), &[]).unwrap();
        let mixer = g.create_node(Box::new(Mixer::new(1, 1)), &[1]).unwrap();
        g.connect(sine.clone(), 0, mixer.id, 0).unwrap();
        drop(sine);

        // the mixer's input keeps the sine alive
        assert_eq!(g.collect_garbage(), 0);
        assert_eq!(g.job_count(), 2);

        drop(mixer);
        assert_eq!(g.collect_garbage(), 2);
        assert_eq!(g.job_count(), 0);
    }

    #[test]
    fn tick_without_output_is_silent() {
        let mut g = graph();
        let _sine = g.create_node(Box::new(Sine::new(440.0)), &[]).unwrap();
        g.tick().unwrap();
        assert!(g
            .root_outputs_mut()
            .iter()
            .all(|b| b.iter().all(|&s| s == 0.0)));
    }

    #[test]
    fn burst_of_async_playbacks_retires_without_growing_queues() {
        let mut g = graph();
        let env = g
            .create_environment(Arc::new(crate::nodes::spatial::AmplitudePanner), 8)
            .unwrap();
        g.set_output(env.clone(), 0).unwrap();
        let click = Arc::new(SoundBuffer::mono(48000, vec![1.0; 8]).unwrap());
        for _ in 0..40 {
            g.play_async(&env, click.clone(), [1.0, 0.0, 0.0], true)
                .unwrap();
        }
        let finished = g.finished.capacity();
        assert!(finished >= 40);
        let pool = g.with_environment(env.id, |e| e.pool.capacity()).unwrap();

        g.tick().unwrap();
        assert_eq!(g.async_playing, 0);
        assert_eq!(g.finished.capacity(), finished);
        let after = g.with_environment(env.id, |e| (e.pool.len(), e.pool.capacity()));
        assert_eq!(after, Ok((30, pool)));
    }

    #[test]
    fn output_index_is_checked() {
        let mut g = graph();
        let sine = g.create_node(Box::new(Sine::new(440.0)), &[]).unwrap();
        assert!(matches!(
            g.set_output(sine.clone(), 1),
            Err(GraphError::Index { .. })
        ));
        let mixer = g.create_node(Box::new(Mixer::new(1, 1)), &[1]).unwrap();
        assert!(matches!(
            g.connect(sine, 0, mixer.id, 3),
            Err(GraphError::Index { .. })
        ));
    }
}
