//! Spatial scenes: a listener, the sources placed around it and the effect
//! sends they feed.
//!
//! An [`EnvironmentNode`] does not own its sources. It only remembers their
//! ids and looks them up in the root's registry, so a source disappears from
//! the scene as soon as its last handle is dropped. Sources, on the other hand,
//! keep their environment alive.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use dasp_graph::Buffer;
use hashbrown::HashMap;

use crate::error::GraphError;
use crate::job::{Job, JobId, JobKey, Jobs, Sealed};
use crate::node::{Node, ProcessContext, Scene};
use crate::nodes::spatial::{PanningStrategy, Spatializer};
use crate::parameter::Parameters;
use crate::root::Root;
use crate::sound::SoundBuffer;

/// Fewest base channels an environment renders; enough for 7.1.
pub const MIN_BASE_CHANNELS: usize = 8;

/// Channel counts an effect send may have.
pub const EFFECT_SEND_CHANNELS: [usize; 5] = [1, 2, 4, 6, 8];

/// How a source's gain falls off with distance from the listener.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[repr(i32)]
pub enum DistanceModel {
    /// Falls linearly from full gain at `min_distance` to silence at `max_distance`.
    #[default]
    Linear = 0,
    /// `min_distance / distance`.
    Exponential = 1,
    /// `(min_distance / distance)^2`.
    InverseSquare = 2,
}

impl DistanceModel {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(DistanceModel::Linear),
            1 => Some(DistanceModel::Exponential),
            2 => Some(DistanceModel::InverseSquare),
            _ => None,
        }
    }
}

/// Listener state shared by every source of an environment for one block.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvironmentInfo {
    /// Row-major transform from world space into listener space, where the
    /// listener looks down -z with +y up.
    pub world_to_listener: [[f32; 4]; 4],
    pub panning_strategy: PanningStrategy,
    /// Set for the block in which `panning_strategy` changed.
    pub panning_strategy_changed: bool,
    pub distance_model: DistanceModel,
    /// Set for the block in which `distance_model` changed.
    pub distance_model_changed: bool,
    pub min_distance: f32,
    pub max_distance: f32,
    pub reverb_distance: f32,
    pub min_reverb_level: f32,
    pub max_reverb_level: f32,
}

impl Default for EnvironmentInfo {
    fn default() -> Self {
        Self {
            world_to_listener: look_at([0.0; 3], DEFAULT_ORIENTATION),
            panning_strategy: PanningStrategy::default(),
            panning_strategy_changed: false,
            distance_model: DistanceModel::default(),
            distance_model_changed: false,
            min_distance: 1.0,
            max_distance: 50.0,
            reverb_distance: 75.0,
            min_reverb_level: 0.15,
            max_reverb_level: 0.6,
        }
    }
}

const DEFAULT_ORIENTATION: [f32; 6] = [0.0, 0.0, -1.0, 0.0, 1.0, 0.0];

impl EnvironmentInfo {
    /// Transform a world-space point into listener space.
    pub fn to_listener(&self, p: [f32; 3]) -> [f32; 3] {
        let m = &self.world_to_listener;
        let mut out = [0.0; 3];
        for (o, row) in out.iter_mut().zip(m) {
            *o = row[0] * p[0] + row[1] * p[1] + row[2] * p[2] + row[3];
        }
        out
    }

    /// Gain for a source `distance` units from the listener.
    pub fn attenuation(&self, distance: f32) -> f32 {
        if distance <= self.min_distance {
            return 1.0;
        }
        if distance >= self.max_distance {
            return 0.0;
        }
        match self.distance_model {
            DistanceModel::Linear => {
                let span = (self.max_distance - self.min_distance).max(f32::EPSILON);
                1.0 - (distance - self.min_distance) / span
            }
            DistanceModel::Exponential => self.min_distance / distance,
            DistanceModel::InverseSquare => {
                let r = self.min_distance / distance;
                r * r
            }
        }
    }

    /// Reverb send level: grows from `min_reverb_level` at the listener to
    /// `max_reverb_level` at `reverb_distance`.
    pub fn reverb_level(&self, distance: f32) -> f32 {
        let t = if self.reverb_distance <= 0.0 {
            1.0
        } else {
            (distance / self.reverb_distance).clamp(0.0, 1.0)
        };
        self.min_reverb_level + (self.max_reverb_level - self.min_reverb_level) * t
    }

    /// `rendered` holds the strategy and model the last rendered block used.
    fn from_params(params: &Parameters, rendered: (PanningStrategy, DistanceModel)) -> Self {
        let panning_strategy =
            PanningStrategy::from_i32(params.int("panning_strategy")).unwrap_or_default();
        let distance_model =
            DistanceModel::from_i32(params.int("distance_model")).unwrap_or_default();
        Self {
            world_to_listener: look_at(params.vector3("position"), params.vector6("orientation")),
            panning_strategy,
            panning_strategy_changed: panning_strategy != rendered.0,
            distance_model,
            distance_model_changed: distance_model != rendered.1,
            min_distance: params.float("min_distance"),
            max_distance: params.float("max_distance"),
            reverb_distance: params.float("reverb_distance"),
            min_reverb_level: params.float("min_reverb_level"),
            max_reverb_level: params.float("max_reverb_level"),
        }
    }
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len <= f32::EPSILON {
        return v;
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// World-to-listener matrix for a listener at `position` facing
/// `orientation[..3]` with `orientation[3..]` up.
pub fn look_at(position: [f32; 3], orientation: [f32; 6]) -> [[f32; 4]; 4] {
    let forward = normalize([orientation[0], orientation[1], orientation[2]]);
    let right = normalize(cross(forward, [orientation[3], orientation[4], orientation[5]]));
    let up = cross(right, forward);
    let back = [-forward[0], -forward[1], -forward[2]];
    [
        [right[0], right[1], right[2], -dot(right, position)],
        [up[0], up[1], up[2], -dot(up, position)],
        [back[0], back[1], back[2], -dot(back, position)],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// One effect send: a secondary bus carved out of the scratch channels.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EffectSendConfiguration {
    pub channels: usize,
    /// First scratch channel (and output channel) of the bus.
    pub start: usize,
    /// Spread sources evenly with distance-based level. Only 4-channel sends
    /// honour this.
    pub is_reverb: bool,
    /// Sources registered with effect sends enabled feed this bus.
    pub connect_by_default: bool,
}

pub(crate) struct SourceRouting {
    pub(crate) uses_effect_sends: bool,
    pub(crate) feeds: Vec<usize>,
}

/// A fire-and-forget player and the source it plays through.
pub(crate) struct Playback {
    pub(crate) player: Arc<JobKey>,
    pub(crate) source: Arc<JobKey>,
}

pub(crate) struct EnvironmentState {
    /// One output per scratch channel.
    pub(crate) outputs: Vec<Buffer>,
    pub(crate) params: Parameters,
    /// Registered sources, by id only.
    pub(crate) sources: HashMap<JobId, SourceRouting>,
    pub(crate) info: EnvironmentInfo,
    pub(crate) sends: Vec<EffectSendConfiguration>,
    scratch: Vec<Buffer>,
    base_channels: usize,
    spatializer: Arc<dyn Spatializer>,
    pub(crate) pool: VecDeque<Playback>,
    pub(crate) playing: Vec<Playback>,
    pub(crate) pool_limit: usize,
    pub(crate) evictions: u64,
    force_update: bool,
    rendered: (PanningStrategy, DistanceModel),
}

impl EnvironmentState {
    pub(crate) fn new(
        spatializer: Arc<dyn Spatializer>,
        base_channels: usize,
        pool_limit: usize,
    ) -> Result<Self, GraphError> {
        if base_channels < MIN_BASE_CHANNELS {
            return Err(GraphError::Range(format!(
                "environments need at least {} base channels, got {}",
                MIN_BASE_CHANNELS, base_channels
            )));
        }

        let mut params = Parameters::new();
        params.add("position", [0.0f32; 3]);
        params.add("orientation", DEFAULT_ORIENTATION);
        params.add_int(
            "panning_strategy",
            PanningStrategy::Stereo as i32,
            PanningStrategy::Hrtf as i32,
            PanningStrategy::Surround71 as i32,
        );
        params.add_int(
            "distance_model",
            DistanceModel::Linear as i32,
            DistanceModel::Linear as i32,
            DistanceModel::InverseSquare as i32,
        );
        params.add_float("min_distance", 1.0, 0.0, f32::MAX);
        params.add_float("max_distance", 50.0, 0.0, f32::MAX);
        params.add_float("reverb_distance", 75.0, 0.0, f32::MAX);
        params.add_float("min_reverb_level", 0.15, 0.0, 1.0);
        params.add_float("max_reverb_level", 0.6, 0.0, 1.0);

        Ok(Self {
            outputs: vec![Buffer::SILENT; base_channels],
            params,
            sources: HashMap::new(),
            info: EnvironmentInfo::default(),
            sends: Vec::new(),
            scratch: vec![Buffer::SILENT; base_channels],
            base_channels,
            spatializer,
            pool: VecDeque::with_capacity(pool_limit),
            playing: Vec::new(),
            pool_limit,
            evictions: 0,
            force_update: true,
            rendered: (PanningStrategy::default(), DistanceModel::default()),
        })
    }

    #[inline]
    pub(crate) fn scratch_len(&self) -> usize {
        self.scratch.len()
    }

    /// Forget sources whose last strong holder is gone.
    pub(crate) fn prune_sources(&mut self, jobs: &Jobs) {
        self.sources
            .retain(|id, _| jobs.get(id).map_or(false, |entry| entry.is_live()));
    }

    /// Visit every live source.
    pub(crate) fn visit_sources(
        &self,
        jobs: &Jobs,
        f: &mut dyn FnMut(JobId) -> Result<(), GraphError>,
    ) -> Result<(), GraphError> {
        for id in self.sources.keys() {
            if jobs.get(id).map_or(false, |entry| entry.is_live()) {
                f(*id)?;
            }
        }
        Ok(())
    }

    pub(crate) fn add_effect_send(
        &mut self,
        channels: usize,
        is_reverb: bool,
        connect_by_default: bool,
    ) -> Result<usize, GraphError> {
        if !EFFECT_SEND_CHANNELS.contains(&channels) {
            return Err(GraphError::Range(format!(
                "effect sends have 1, 2, 4, 6 or 8 channels, not {}",
                channels
            )));
        }

        let index = self.sends.len();
        self.sends.push(EffectSendConfiguration {
            channels,
            start: self.scratch.len(),
            is_reverb,
            connect_by_default,
        });
        self.scratch.resize(self.scratch.len() + channels, Buffer::SILENT);
        self.outputs.resize(self.scratch.len(), Buffer::SILENT);

        if connect_by_default {
            for routing in self.sources.values_mut().filter(|r| r.uses_effect_sends) {
                routing.feeds.push(index);
            }
        }
        Ok(index)
    }

    pub(crate) fn effect_send(&self, index: usize) -> Result<EffectSendConfiguration, GraphError> {
        self.sends
            .get(index)
            .copied()
            .ok_or_else(|| GraphError::index("effect send", index, self.sends.len()))
    }

    /// Sends a newly registered source feeds.
    pub(crate) fn default_feeds(&self, use_effect_sends: bool) -> Vec<usize> {
        if !use_effect_sends {
            return Vec::new();
        }
        self.sends
            .iter()
            .enumerate()
            .filter(|(_, send)| send.connect_by_default)
            .map(|(i, _)| i)
            .collect()
    }

    /// Rebuild the snapshot if anything changed or `force` is set.
    /// The changed flags compare against the last rendered block.
    pub(crate) fn refresh(&mut self, force: bool) {
        if force || self.force_update || self.params.any_changed() {
            self.info = EnvironmentInfo::from_params(&self.params, self.rendered);
            self.force_update = false;
        }
    }

    pub(crate) fn prepare(&mut self, _ctx: &ProcessContext) {
        self.refresh(false);
        for buffer in self.scratch.iter_mut() {
            buffer.iter_mut().for_each(|s| *s = 0.0);
        }
    }

    /// The view handed to source `id` while it renders.
    pub(crate) fn scene_for(&mut self, id: JobId) -> Option<Scene<'_>> {
        let routing = self.sources.get(&id)?;
        Some(Scene {
            info: &self.info,
            sends: &self.sends,
            feeds: &routing.feeds,
            scratch: &mut self.scratch,
            base_channels: self.base_channels,
            spatializer: &*self.spatializer,
        })
    }

    pub(crate) fn render(&mut self, frames: usize) {
        for (out, scratch) in self.outputs.iter_mut().zip(&self.scratch) {
            out[..frames].copy_from_slice(&scratch[..frames]);
        }
        self.params.clear_changed();
        self.rendered = (self.info.panning_strategy, self.info.distance_model);
        self.info.panning_strategy_changed = false;
        self.info.distance_model_changed = false;
    }

    pub(crate) fn take_playing(&mut self, player: JobId) -> Option<Playback> {
        let i = self.playing.iter().position(|p| p.player.id == player)?;
        Some(self.playing.swap_remove(i))
    }

    /// Keep a retired playback for reuse. Returns how many were evicted.
    pub(crate) fn offer_to_pool(&mut self, playback: Playback) -> usize {
        if self.pool_limit == 0 {
            self.evictions += 1;
            return 1;
        }
        let evicted = self.trim_to(self.pool_limit - 1);
        self.pool.push_back(playback);
        evicted
    }

    pub(crate) fn trim_pool(&mut self) -> usize {
        self.trim_to(self.pool_limit)
    }

    fn trim_to(&mut self, len: usize) -> usize {
        let mut evicted = 0;
        while self.pool.len() > len {
            self.pool.pop_front();
            evicted += 1;
        }
        self.evictions += evicted as u64;
        evicted
    }
}

/// Handle to a spatial scene.
///
/// The environment's outputs are its scratch channels: the base channels
/// first, then each effect send's range in creation order. Connect them
/// onwards (or to the root output) to hear the scene.
#[derive(Clone)]
pub struct EnvironmentNode {
    pub(crate) key: Arc<JobKey>,
    pub(crate) root: Root,
}

impl Sealed for EnvironmentNode {
    fn key(&self) -> &Arc<JobKey> {
        &self.key
    }

    fn owner(&self) -> &Root {
        &self.root
    }
}

impl Job for EnvironmentNode {}

impl EnvironmentNode {
    /// Create a [`Source`](crate::nodes::Source) registered with this
    /// environment, feeding every default effect send.
    pub fn create_source(&self) -> Result<Node, GraphError> {
        let key = self.root.graph().create_source(&self.key)?;
        Ok(Node {
            key,
            root: self.root.clone(),
        })
    }

    /// Add `source` to the scene.
    ///
    /// The environment only remembers the source; dropping every handle to it
    /// removes it again. With `use_effect_sends`, the source feeds every send
    /// created with `connect_by_default`, now and in the future.
    pub fn register_source(&self, source: &Node, use_effect_sends: bool) -> Result<(), GraphError> {
        self.root.ensure_owned(source)?;
        self.root
            .graph()
            .register_source(&self.key, source.id(), use_effect_sends)
    }

    /// Route `source` into effect send `send`.
    pub fn feed_effect(&self, source: &Node, send: usize) -> Result<(), GraphError> {
        self.root.ensure_owned(source)?;
        self.root
            .graph()
            .feed_effect(self.key.id, source.id(), send, true)
    }

    pub fn stop_feeding_effect(&self, source: &Node, send: usize) -> Result<(), GraphError> {
        self.root.ensure_owned(source)?;
        self.root
            .graph()
            .feed_effect(self.key.id, source.id(), send, false)
    }

    /// Append an effect send and return its index.
    ///
    /// `channels` must be 1, 2, 4, 6 or 8; anything else fails with
    /// [`GraphError::Range`] and changes nothing.
    pub fn add_effect_send(
        &self,
        channels: usize,
        is_reverb: bool,
        connect_by_default: bool,
    ) -> Result<usize, GraphError> {
        self.root
            .graph()
            .add_effect_send(self.key.id, channels, is_reverb, connect_by_default)
    }

    pub fn effect_send(&self, index: usize) -> Result<EffectSendConfiguration, GraphError> {
        self.root.graph().with_environment(self.key.id, |env| env.effect_send(index))?
    }

    pub fn effect_send_count(&self) -> usize {
        self.root
            .graph()
            .with_environment(self.key.id, |env| env.sends.len())
            .unwrap_or(0)
    }

    /// Base channels plus every effect send's channels.
    pub fn scratch_buffer_count(&self) -> usize {
        self.root
            .graph()
            .with_environment(self.key.id, |env| env.scratch_len())
            .unwrap_or(0)
    }

    /// Entries in the source set.
    ///
    /// Dead sources are only dropped when the environment is next planned, so
    /// this can briefly include sources that are already gone.
    pub fn source_count(&self) -> usize {
        self.root
            .graph()
            .with_environment(self.key.id, |env| env.sources.len())
            .unwrap_or(0)
    }

    /// The snapshot sources saw during the last block.
    pub fn environment_info(&self) -> EnvironmentInfo {
        self.root
            .graph()
            .with_environment(self.key.id, |env| env.info.clone())
            .unwrap_or_default()
    }

    /// Rebuild the snapshot now instead of at the next block. Without `force`
    /// only a changed parameter triggers a rebuild.
    pub fn update_environment_info(&self, force: bool) {
        let _ = self
            .root
            .graph()
            .with_environment(self.key.id, |env| env.refresh(force));
    }

    /// Play `sound` once at `(x, y, z)` without keeping a handle.
    ///
    /// A player and source are taken from the recycle pool (or created), kept
    /// alive by the root until the sound ends, then returned to the pool. Dry
    /// playback skips the effect sends.
    pub fn play_async(
        &self,
        sound: Arc<SoundBuffer>,
        x: f32,
        y: f32,
        z: f32,
        is_dry: bool,
    ) -> Result<(), GraphError> {
        self.root
            .graph()
            .play_async(&self.key, sound, [x, y, z], is_dry)
    }

    /// Retired playbacks waiting for reuse.
    pub fn recycle_pool_len(&self) -> usize {
        self.root
            .graph()
            .with_environment(self.key.id, |env| env.pool.len())
            .unwrap_or(0)
    }

    /// Playbacks still running.
    pub fn playing_count(&self) -> usize {
        self.root
            .graph()
            .with_environment(self.key.id, |env| env.playing.len())
            .unwrap_or(0)
    }

    /// Pooled playbacks destroyed because the pool was full.
    pub fn recycle_evictions(&self) -> u64 {
        self.root
            .graph()
            .with_environment(self.key.id, |env| env.evictions)
            .unwrap_or(0)
    }

    /// Change the pool bound, evicting the oldest entries if it shrinks.
    pub fn set_recycle_pool_limit(&self, limit: usize) {
        let _ = self.root.graph().with_environment(self.key.id, |env| {
            env.pool_limit = limit;
            let evicted = env.trim_pool();
            let missing = limit.saturating_sub(env.pool.len());
            env.pool.reserve(missing);
            evicted
        });
    }
}

impl fmt::Debug for EnvironmentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentNode")
            .field("id", &self.key.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::spatial::AmplitudePanner;

    fn env() -> EnvironmentState {
        EnvironmentState::new(Arc::new(AmplitudePanner), 8, 30).unwrap()
    }

    #[test]
    fn needs_eight_base_channels() {
        assert!(matches!(
            EnvironmentState::new(Arc::new(AmplitudePanner), 6, 30),
            Err(GraphError::Range(_))
        ));
    }

    #[test]
    fn effect_sends_extend_scratch_and_outputs() {
        let mut env = env();
        assert_eq!(env.add_effect_send(2, false, true).unwrap(), 0);
        assert_eq!(env.add_effect_send(4, true, false).unwrap(), 1);
        assert_eq!(env.scratch_len(), 14);
        assert_eq!(env.outputs.len(), 14);
        assert_eq!(env.effect_send(1).unwrap().start, 10);
        assert_eq!(env.default_feeds(true), vec![0]);
        assert!(env.default_feeds(false).is_empty());
        assert!(matches!(env.effect_send(2), Err(GraphError::Index { .. })));
    }

    #[test]
    fn pool_evicts_oldest() {
        let mut env = env();
        env.pool_limit = 2;
        for id in 0..3 {
            let playback = Playback {
                player: Arc::new(JobKey { id: JobId(id * 2) }),
                source: Arc::new(JobKey { id: JobId(id * 2 + 1) }),
            };
            env.offer_to_pool(playback);
        }
        assert_eq!(env.pool.len(), 2);
        assert_eq!(env.evictions, 1);
        assert_eq!(env.pool.front().map(|p| p.player.id), Some(JobId(2)));
    }

    #[test]
    fn full_pool_never_outgrows_its_reservation() {
        let mut env = env();
        let capacity = env.pool.capacity();
        for id in 0..40 {
            env.offer_to_pool(Playback {
                player: Arc::new(JobKey { id: JobId(id * 2) }),
                source: Arc::new(JobKey { id: JobId(id * 2 + 1) }),
            });
        }
        assert_eq!(env.pool.len(), 30);
        assert_eq!(env.evictions, 10);
        assert_eq!(env.pool.capacity(), capacity);

        env.pool_limit = 0;
        env.trim_pool();
        env.offer_to_pool(Playback {
            player: Arc::new(JobKey { id: JobId(100) }),
            source: Arc::new(JobKey { id: JobId(101) }),
        });
        assert!(env.pool.is_empty());
        assert_eq!(env.evictions, 41);
    }

    #[test]
    fn listener_transform_moves_and_turns() {
        // listener at (0, 0, 5) looking down +x
        let m = look_at([0.0, 0.0, 5.0], [1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let info = EnvironmentInfo {
            world_to_listener: m,
            ..EnvironmentInfo::default()
        };
        let p = info.to_listener([3.0, 0.0, 5.0]);
        // straight ahead
        assert!(p[0].abs() < 1e-5 && p[1].abs() < 1e-5);
        assert!((p[2] + 3.0).abs() < 1e-5);
    }

    #[test]
    fn attenuation_models() {
        let mut info = EnvironmentInfo::default();
        assert_eq!(info.attenuation(0.5), 1.0);
        assert!((info.attenuation(25.5) - 0.5).abs() < 1e-5);
        assert_eq!(info.attenuation(60.0), 0.0);

        info.distance_model = DistanceModel::InverseSquare;
        assert!((info.attenuation(2.0) - 0.25).abs() < 1e-6);

        assert!((info.reverb_level(0.0) - 0.15).abs() < 1e-6);
        assert!((info.reverb_level(75.0) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn snapshot_tracks_changes() {
        let mut env = env();
        env.refresh(false);
        assert!(!env.info.panning_strategy_changed);

        env.params
            .set(
                "panning_strategy",
                crate::ParamValue::Int(PanningStrategy::Surround51 as i32),
            )
            .unwrap();
        env.refresh(false);
        assert_eq!(env.info.panning_strategy, PanningStrategy::Surround51);
        assert!(env.info.panning_strategy_changed);

        env.render(64);
        assert!(!env.info.panning_strategy_changed);
        assert!(!env.params.any_changed());
    }

    #[test]
    fn early_rebuild_keeps_the_changed_flag_for_the_next_block() {
        let mut env = env();
        env.refresh(false);
        env.render(64);

        env.params
            .set(
                "distance_model",
                crate::ParamValue::Int(DistanceModel::Exponential as i32),
            )
            .unwrap();
        // control side, then the block's own rebuild
        env.refresh(false);
        env.refresh(false);
        assert!(env.info.distance_model_changed);

        env.render(64);
        env.refresh(true);
        assert!(!env.info.distance_model_changed);
    }
}
