//! Play a spatial scene on an audio device
//!
//! Run with: cargo run --example device_output --features cpal_sink
//!
//! Lists available devices and lets you pick one, then moves a sine from
//! left to right while clicks play behind the listener.

use std::io::{self, Write};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use raumklang::nodes::Sine;
use raumklang::{CpalDevice, Job, Root, RootSettings, SoundBuffer};

fn main() {
    let _ = tracing_subscriber::fmt().try_init();

    let devices = CpalDevice::list_outputs();
    if devices.is_empty() {
        eprintln!("No audio output devices found!");
        return;
    }

    println!("Available audio output devices:");
    for (i, device) in devices.iter().enumerate() {
        println!(
            "  [{}] {} ({}Hz, {} ch)",
            i,
            device.name(),
            device.sample_rate(),
            device.channels()
        );
    }

    print!("\nSelect device [0]: ");
    io::stdout().flush().unwrap();

    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();
    let choice: usize = input.trim().parse().unwrap_or(0);

    let device = devices.into_iter().nth(choice).unwrap_or_else(|| {
        println!("Invalid choice, using default device");
        CpalDevice::default_output().expect("No default device")
    });
    println!("\nUsing: {} @ {}Hz", device.name(), device.sample_rate());

    let settings =
        RootSettings::new(device.sample_rate()).with_channels(device.channels() as usize);
    let root = Root::with_settings(settings).expect("device settings");
    let env = root.create_environment().expect("environment");
    root.set_output(&env, 0).expect("output");

    let sine = root.create_node(Sine::new(440.0)).expect("sine");
    let source = env.create_source().expect("source");
    sine.connect(0, &source, 0).expect("connect");

    let click = Arc::new(
        SoundBuffer::mono(
            device.sample_rate(),
            (0..2000).map(|i| (1.0 - i as f32 / 2000.0) * 0.5).collect(),
        )
        .expect("click"),
    );

    let (mut sink, stream) = device.open(&root, 8);
    println!("Playing... Press Ctrl+C to stop\n");

    let start = Instant::now();
    let mut next_click = 0.0;
    loop {
        let elapsed = start.elapsed().as_secs_f32();
        let x = 4.0 * (elapsed * 0.5).sin();
        let _ = source.set("position", [x, 0.0, -2.0]);

        if elapsed >= next_click {
            let _ = env.play_async(click.clone(), 0.0, 0.0, 3.0, true);
            next_click += 1.0;
        }

        if let Err(e) = sink.render(&root) {
            eprintln!("render failed: {e}");
            return;
        }
        if stream.check_underrun() {
            eprintln!("underrun after {} samples", stream.samples_consumed());
        }
        sleep(Duration::from_millis(2));
    }
}
