use std::sync::Arc;

use dasp_graph::Buffer;
use parking_lot::Mutex;
use raumklang::nodes::{Mixer, PanningStrategy, Sine};
use raumklang::{
    EnvironmentNode, GraphError, Job, Kernel, KernelState, RenderContext, Root, SoundBuffer,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn scene() -> (Root, EnvironmentNode) {
    init_tracing();
    let root = Root::new(48000).unwrap();
    let env = root.create_environment().unwrap();
    root.set_output(&env, 0).unwrap();
    (root, env)
}

/// Shorter than one block, so it finishes in the block it starts in.
fn click() -> Arc<SoundBuffer> {
    Arc::new(SoundBuffer::mono(48000, vec![1.0; 16]).unwrap())
}

#[test]
fn sources_expire_when_their_handles_drop() {
    let (root, env) = scene();
    let a = env.create_source().unwrap();
    let b = env.create_source().unwrap();
    let c = env.create_source().unwrap();
    assert_eq!(env.source_count(), 3);

    let gone = b.id();
    drop(b);
    root.tick().unwrap();

    assert_eq!(env.source_count(), 2);
    let plan = root.plan().unwrap();
    assert_eq!(plan.len(), 3);
    assert!(plan.contains(&a.id()) && plan.contains(&c.id()));
    assert!(!plan.contains(&gone));
    assert_eq!(plan.last(), Some(&env.id()));
}

#[test]
fn sources_keep_their_environment_alive() {
    init_tracing();
    let root = Root::new(48000).unwrap();
    let env = root.create_environment().unwrap();
    let source = env.create_source().unwrap();
    drop(env);
    assert_eq!(root.job_count(), 2);

    drop(source);
    assert_eq!(root.job_count(), 0);
}

#[test]
fn registered_source_is_heard_through_the_environment() {
    let (root, env) = scene();
    let sine = root.create_node(Sine::new(1000.0).with_amplitude(1.0)).unwrap();
    let source = env.create_source().unwrap();
    sine.connect(0, &source, 0).unwrap();
    source.set("position", [-3.0f32, 0.0, 0.0]).unwrap();

    let plan = root.plan().unwrap();
    assert_eq!(plan, vec![sine.id(), source.id(), env.id()]);

    let block = root.tick().unwrap();
    let left: f32 = block[0].iter().map(|s| s.abs()).sum();
    let right: f32 = block[1].iter().map(|s| s.abs()).sum();
    assert!(left > 0.0);
    assert!(left > right * 100.0);
}

#[test]
fn moving_a_source_between_environments() {
    let (root, first) = scene();
    let second = root.create_environment().unwrap();
    let source = first.create_source().unwrap();

    second.register_source(&source, false).unwrap();
    assert_eq!(first.source_count(), 0);
    assert_eq!(second.source_count(), 1);

    // registering again is idempotent
    second.register_source(&source, false).unwrap();
    assert_eq!(second.source_count(), 1);
}

#[test]
fn a_source_cannot_read_its_own_environment() {
    let (_root, env) = scene();
    let source = env.create_source().unwrap();
    assert_eq!(
        env.connect(0, &source, 0),
        Err(GraphError::WouldCycle {
            from: env.id(),
            to: source.id()
        })
    );

    // nor can anything upstream of a source be registered downstream of it
    let tap = env.root().create_node(Mixer::mono(1)).unwrap();
    env.connect(0, &tap, 0).unwrap();
    let loopback = env.root().create_node(Mixer::mono(1)).unwrap();
    tap.connect(0, &loopback, 0).unwrap();
    assert!(matches!(
        env.register_source(&loopback, true),
        Err(GraphError::WouldCycle { .. })
    ));
}

#[test]
fn effect_send_channel_counts_are_validated() {
    let (_root, env) = scene();
    for channels in [0, 3, 5, 7, 9] {
        assert!(matches!(
            env.add_effect_send(channels, false, true),
            Err(GraphError::Range(_))
        ));
    }
    assert_eq!(env.effect_send_count(), 0);
    assert_eq!(env.scratch_buffer_count(), 8);

    assert_eq!(env.add_effect_send(4, true, true).unwrap(), 0);
    assert_eq!(env.effect_send_count(), 1);
    assert_eq!(env.scratch_buffer_count(), 12);
    assert_eq!(env.output_count(), 12);

    let send = env.effect_send(0).unwrap();
    assert_eq!((send.start, send.channels), (8, 4));
    assert!(send.is_reverb && send.connect_by_default);
    assert!(matches!(env.effect_send(1), Err(GraphError::Index { .. })));
}

#[test]
fn effect_routing_per_source() {
    let (_root, env) = scene();
    env.add_effect_send(2, false, false).unwrap();
    let wet = env.create_source().unwrap();

    let stranger = env.root().create_node(Sine::new(220.0)).unwrap();
    assert!(matches!(
        env.feed_effect(&stranger, 0),
        Err(GraphError::WrongJobKind { .. })
    ));
    assert!(matches!(
        env.feed_effect(&wet, 1),
        Err(GraphError::Index { .. })
    ));
    env.feed_effect(&wet, 0).unwrap();
    env.stop_feeding_effect(&wet, 0).unwrap();
}

#[test]
fn reverb_send_follows_dry_flag() {
    let (root, env) = scene();
    env.add_effect_send(4, true, true).unwrap();
    // listen to the first two reverb channels
    root.set_output(&env, 8).unwrap();

    env.play_async(click(), 2.0, 0.0, 0.0, true).unwrap();
    {
        let block = root.tick().unwrap();
        assert!(block.iter().all(|b| b.iter().all(|&s| s == 0.0)));
    }

    env.play_async(click(), 2.0, 0.0, 0.0, false).unwrap();
    let block = root.tick().unwrap();
    let level = env_reverb_level(2.0);
    assert!((block[0][0] - level * 0.5).abs() < 1e-5);
    assert_eq!(block[0][0], block[1][0]);
}

fn env_reverb_level(distance: f32) -> f32 {
    0.15 + (0.6 - 0.15) * (distance / 75.0)
}

#[test]
fn listener_snapshot_follows_parameters() {
    let (root, env) = scene();
    env.set("position", [0.0f32, 0.0, 5.0]).unwrap();
    env.set("panning_strategy", PanningStrategy::Surround51 as i32)
        .unwrap();
    assert!(matches!(
        env.set("panning_strategy", 9),
        Err(GraphError::Range(_))
    ));

    root.tick().unwrap();
    let info = env.environment_info();
    assert_eq!(info.panning_strategy, PanningStrategy::Surround51);
    let p = info.to_listener([0.0, 0.0, 5.0]);
    assert!(p.iter().all(|c| c.abs() < 1e-5));

    env.set("min_distance", 2.0f32).unwrap();
    env.update_environment_info(false);
    assert_eq!(env.environment_info().min_distance, 2.0);
}

/// Records the snapshot's `panning_strategy_changed` flag every block.
struct ChangeLog(Arc<Mutex<Vec<bool>>>);

impl Kernel for ChangeLog {
    fn render(
        &mut self,
        ctx: &mut RenderContext<'_>,
        _inputs: &[Buffer],
        _outputs: &mut [Buffer],
    ) -> KernelState {
        if let Some(scene) = ctx.scene.as_ref() {
            self.0.lock().push(scene.info.panning_strategy_changed);
        }
        KernelState::Continue
    }
}

#[test]
fn sources_see_a_change_once_even_after_an_early_update() {
    let (root, env) = scene();
    let log = Arc::new(Mutex::new(Vec::new()));
    let spy = root.create_node(ChangeLog(log.clone())).unwrap();
    env.register_source(&spy, false).unwrap();
    root.tick().unwrap();

    env.set("panning_strategy", PanningStrategy::Surround40 as i32)
        .unwrap();
    env.update_environment_info(false);
    assert_eq!(env.environment_info().panning_strategy, PanningStrategy::Surround40);
    root.tick().unwrap();
    root.tick().unwrap();

    // forcing a rebuild without a change reports nothing new
    env.update_environment_info(true);
    root.tick().unwrap();

    // nor does a change that is undone before the next block
    env.set("panning_strategy", PanningStrategy::Stereo as i32)
        .unwrap();
    env.update_environment_info(true);
    env.set("panning_strategy", PanningStrategy::Surround40 as i32)
        .unwrap();
    root.tick().unwrap();

    assert_eq!(*log.lock(), vec![false, true, false, false, false]);
}

#[test]
fn async_playback_finishes_and_is_recycled() {
    let (root, env) = scene();
    env.play_async(click(), 0.0, 0.0, -1.0, false).unwrap();
    assert_eq!(env.playing_count(), 1);
    // environment plus player and source
    assert_eq!(root.job_count(), 3);

    root.tick().unwrap();
    assert_eq!(env.playing_count(), 0);
    assert_eq!(env.recycle_pool_len(), 1);
    assert_eq!(env.source_count(), 0);
    assert_eq!(root.plan().unwrap(), vec![env.id()]);

    // the next playback reuses the pooled pair
    env.play_async(click(), 0.0, 0.0, -1.0, false).unwrap();
    assert_eq!(env.recycle_pool_len(), 0);
    assert_eq!(root.job_count(), 3);
}

#[test]
fn sequential_playbacks_stay_within_the_pool() {
    let (root, env) = scene();
    for _ in 0..31 {
        env.play_async(click(), 1.0, 0.0, 0.0, true).unwrap();
        root.tick().unwrap();
    }
    assert!(env.recycle_pool_len() <= 1);
    assert_eq!(env.recycle_evictions(), 0);
    assert_eq!(root.job_count(), 3);
}

#[test]
fn burst_of_playbacks_evicts_the_oldest() {
    let (root, env) = scene();
    for i in 0..31 {
        env.play_async(click(), i as f32, 0.0, 0.0, true).unwrap();
    }
    assert_eq!(env.playing_count(), 31);
    assert_eq!(root.job_count(), 1 + 31 * 2);

    root.tick().unwrap();
    assert_eq!(env.playing_count(), 0);
    assert_eq!(env.recycle_pool_len(), 30);
    assert_eq!(env.recycle_evictions(), 1);
    assert_eq!(root.job_count(), 1 + 30 * 2);

    env.set_recycle_pool_limit(10);
    assert_eq!(env.recycle_pool_len(), 10);
    assert_eq!(env.recycle_evictions(), 21);
    assert_eq!(root.job_count(), 1 + 10 * 2);
}

#[test]
fn long_playback_spans_several_blocks() {
    let (root, env) = scene();
    let long = Arc::new(SoundBuffer::mono(48000, vec![0.5; 200]).unwrap());
    env.play_async(long, 0.0, 0.0, -1.0, true).unwrap();

    let mut blocks = 0;
    while env.playing_count() > 0 {
        root.tick().unwrap();
        blocks += 1;
        assert!(blocks < 10);
    }
    assert_eq!(blocks, 4);
}
