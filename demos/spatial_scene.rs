//! Offline example: a sine circling the listener plus a burst of clicks
//!
//! Run with: cargo run --example spatial_scene
//!
//! Renders two seconds of a scene with a reverb send and prints the
//! per-channel energy of every quarter second.

use std::sync::Arc;

use raumklang::nodes::{PanningStrategy, Sine};
use raumklang::{Job, Root, RootSettings, SoundBuffer};

fn main() {
    let _ = tracing_subscriber::fmt().try_init();

    let settings = RootSettings::new(48000).with_channels(4);
    let root = Root::with_settings(settings).expect("valid settings");

    let env = root.create_environment().expect("environment");
    env.set("panning_strategy", PanningStrategy::Surround40 as i32)
        .expect("known parameter");
    let reverb = env.add_effect_send(4, true, true).expect("valid send");
    root.set_output(&env, 0).expect("output");
    println!("reverb send {:?}", env.effect_send(reverb));

    // A sine orbiting the listener at four units
    let sine = root.create_node(Sine::new(330.0).with_amplitude(0.5)).expect("sine");
    let orbiting = env.create_source().expect("source");
    sine.connect(0, &orbiting, 0).expect("connect");

    let click = Arc::new(
        SoundBuffer::mono(48000, (0..480).map(|i| 1.0 - i as f32 / 480.0).collect())
            .expect("click"),
    );

    let sample_rate = root.sample_rate() as f32;
    let block_size = root.block_size();
    let blocks_per_report = (sample_rate / 4.0) as usize / block_size;
    let mut energy = [0.0f32; 4];
    let mut interleaved = vec![0.0f32; block_size * root.channels()];

    for block in 0..blocks_per_report * 8 {
        let t = (block * block_size) as f32 / sample_rate;
        let angle = t * std::f32::consts::PI;
        orbiting
            .set("position", [4.0 * angle.sin(), 0.0, -4.0 * angle.cos()])
            .expect("position");

        if block % blocks_per_report == 0 {
            env.play_async(click.clone(), -2.0, 0.0, 2.0, false)
                .expect("play");
        }

        let written = root.tick_interleaved(&mut interleaved).expect("tick");
        for frame in interleaved[..written].chunks_exact(4) {
            for (e, s) in energy.iter_mut().zip(frame) {
                *e += s * s;
            }
        }

        if (block + 1) % blocks_per_report == 0 {
            println!(
                "t={:.2}s  FL {:7.2}  FR {:7.2}  RL {:7.2}  RR {:7.2}  (playing {}, pooled {})",
                t,
                energy[0],
                energy[1],
                energy[2],
                energy[3],
                env.playing_count(),
                env.recycle_pool_len(),
            );
            energy = [0.0; 4];
        }
    }
}
