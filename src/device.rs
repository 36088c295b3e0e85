//! CPAL device discovery and output streams.
//!
//! ```no_run
//! use raumklang::{CpalDevice, Root};
//!
//! let device = CpalDevice::default_output().expect("no output device");
//! let root = Root::new(device.sample_rate()).unwrap();
//! let (mut sink, stream) = device.open(&root, 8);
//!
//! loop {
//!     sink.render(&root).unwrap();
//!     if stream.check_underrun() {
//!         eprintln!("underrun");
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(2));
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig};
use rtrb::{Consumer, RingBuffer};
use tracing::{error, warn};

use crate::nodes::RingSink;
use crate::root::Root;

/// A discovered audio output device.
///
/// Use [`CpalDevice::default_output`] to get the system default, or
/// [`CpalDevice::list_outputs`] to enumerate all available devices.
pub struct CpalDevice {
    device: cpal::Device,
    config: SupportedStreamConfig,
    name: String,
}

impl CpalDevice {
    fn from_device(device: cpal::Device) -> Option<Self> {
        let config = device.default_output_config().ok()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        Some(Self {
            device,
            config,
            name,
        })
    }

    /// Get the system's default output device.
    ///
    /// Returns `None` if no audio device is available.
    pub fn default_output() -> Option<Self> {
        let host = cpal::default_host();
        Self::from_device(host.default_output_device()?)
    }

    /// List all available audio output devices.
    ///
    /// Returns an empty list if no devices are found or if enumeration fails.
    pub fn list_outputs() -> Vec<Self> {
        let host = cpal::default_host();
        host.output_devices()
            .map(|devices| devices.filter_map(Self::from_device).collect())
            .unwrap_or_default()
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device's sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    /// Get the number of output channels.
    pub fn channels(&self) -> u16 {
        self.config.channels()
    }

    /// Start a stream on this device fed by the returned sink.
    ///
    /// The ring buffer holds `blocks` blocks of the root's output. Call
    /// [`RingSink::render`] regularly to keep it full.
    pub fn open(&self, root: &Root, blocks: usize) -> (RingSink, StreamStatus) {
        let channels = self.channels() as usize;
        let capacity = (root.block_size() * channels * blocks.max(2)).next_power_of_two();
        let (producer, consumer) = RingBuffer::<f32>::new(capacity);

        let status = StreamStatus::default();
        let thread_status = status.clone();
        let device = self.device.clone();
        let sample_format = self.config.sample_format();
        let stream_config = self.config.config();

        // The stream lives as long as this thread
        std::thread::spawn(move || {
            let stream = match build_stream(
                &device,
                sample_format,
                &stream_config,
                consumer,
                thread_status,
            ) {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "failed to build output stream");
                    return;
                }
            };
            if let Err(e) = stream.play() {
                error!(error = %e, "failed to start output stream");
                return;
            }
            loop {
                std::thread::park();
            }
        });

        (RingSink::new(producer, channels), status)
    }
}

/// Counters shared with a running stream.
#[derive(Clone, Default)]
pub struct StreamStatus {
    samples_consumed: Arc<AtomicUsize>,
    had_underrun: Arc<AtomicBool>,
}

impl StreamStatus {
    /// Returns how many samples have been played
    pub fn samples_consumed(&self) -> usize {
        self.samples_consumed.load(Ordering::Relaxed)
    }

    /// Check and clear the underrun flag
    pub fn check_underrun(&self) -> bool {
        self.had_underrun.swap(false, Ordering::Relaxed)
    }
}

fn fill<T>(data: &mut [T], consumer: &mut Consumer<f32>, status: &StreamStatus, convert: impl Fn(f32) -> T) {
    let mut underrun = false;
    for sample in data.iter_mut() {
        let s = consumer.pop().unwrap_or_else(|_| {
            underrun = true;
            0.0
        });
        *sample = convert(s.clamp(-1.0, 1.0));
    }
    if underrun {
        status.had_underrun.store(true, Ordering::Relaxed);
    }
    status
        .samples_consumed
        .fetch_add(data.len(), Ordering::Relaxed);
}

fn build_stream(
    device: &cpal::Device,
    sample_format: SampleFormat,
    stream_config: &cpal::StreamConfig,
    mut consumer: Consumer<f32>,
    status: StreamStatus,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let on_error = |err: cpal::StreamError| warn!(error = %err, "stream error");
    match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            stream_config,
            move |data: &mut [f32], _| fill(data, &mut consumer, &status, |s| s),
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            stream_config,
            move |data: &mut [i16], _| {
                fill(data, &mut consumer, &status, |s| (s * i16::MAX as f32) as i16)
            },
            on_error,
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            stream_config,
            move |data: &mut [u16], _| {
                fill(data, &mut consumer, &status, |s| {
                    ((s + 1.0) * 0.5 * u16::MAX as f32) as u16
                })
            },
            on_error,
            None,
        ),
        _ => Err(cpal::BuildStreamError::StreamConfigNotSupported),
    }
}
