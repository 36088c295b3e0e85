//! Amplitude panning over fixed speaker layouts.

use core::f32::consts::FRAC_PI_2;

use dasp_graph::Buffer;
use itertools::Itertools;

/// How sources are panned into an environment's base channels.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[repr(i32)]
pub enum PanningStrategy {
    /// Head-related transfer functions. Needs HRTF data from the spatializer;
    /// [`AmplitudePanner`] renders it as stereo.
    Hrtf = 0,
    #[default]
    Stereo = 1,
    Surround40 = 2,
    Surround51 = 3,
    Surround71 = 4,
}

impl PanningStrategy {
    pub const ALL: [PanningStrategy; 5] = [
        PanningStrategy::Hrtf,
        PanningStrategy::Stereo,
        PanningStrategy::Surround40,
        PanningStrategy::Surround51,
        PanningStrategy::Surround71,
    ];

    pub fn from_i32(v: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(v).ok()?).copied()
    }

    /// Channels written by this strategy.
    pub fn channels(self) -> usize {
        match self {
            PanningStrategy::Hrtf | PanningStrategy::Stereo => 2,
            PanningStrategy::Surround40 => 4,
            PanningStrategy::Surround51 => 6,
            PanningStrategy::Surround71 => 8,
        }
    }

    /// The strategy for a bus of `channels` channels, if one exists.
    pub fn for_channels(channels: usize) -> Option<Self> {
        match channels {
            2 => Some(PanningStrategy::Stereo),
            4 => Some(PanningStrategy::Surround40),
            6 => Some(PanningStrategy::Surround51),
            8 => Some(PanningStrategy::Surround71),
            _ => None,
        }
    }
}

/// Turns a mono signal and a direction into multichannel output.
///
/// This is the environment's spatialization data source. Implementations
/// accumulate into `outputs`; they never overwrite.
pub trait Spatializer: Send + Sync {
    /// `azimuth` is in degrees clockwise from straight ahead, `elevation` in
    /// degrees above the horizon. `input` holds exactly one block.
    fn pan(
        &self,
        strategy: PanningStrategy,
        azimuth: f32,
        elevation: f32,
        gain: f32,
        input: &[f32],
        outputs: &mut [Buffer],
    );
}

/// Speaker angles in degrees, sorted, paired with their channel index.
const QUAD: [(f32, usize); 4] = [(45.0, 1), (135.0, 3), (225.0, 2), (315.0, 0)];
const SURROUND_51: [(f32, usize); 5] = [(0.0, 2), (30.0, 1), (110.0, 5), (250.0, 4), (330.0, 0)];
const SURROUND_71: [(f32, usize); 7] = [
    (0.0, 2),
    (30.0, 1),
    (90.0, 7),
    (150.0, 5),
    (210.0, 4),
    (270.0, 6),
    (330.0, 0),
];

/// Constant-power pairwise panning. Elevation is ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct AmplitudePanner;

impl AmplitudePanner {
    pub fn new() -> Self {
        Self
    }

    /// Left/right gains for a stereo pair.
    pub fn stereo_gains(azimuth: f32) -> (f32, f32) {
        let x = azimuth.to_radians().sin().clamp(-1.0, 1.0);
        let theta = (x + 1.0) * FRAC_PI_2 / 2.0;
        (theta.cos(), theta.sin())
    }

    /// The two speakers surrounding `azimuth` and their gains.
    pub fn pair_gains(layout: &[(f32, usize)], azimuth: f32) -> [(usize, f32); 2] {
        let azimuth = azimuth.rem_euclid(360.0);
        for (&(a, ch_a), &(b, ch_b)) in layout.iter().circular_tuple_windows() {
            let span = (b - a).rem_euclid(360.0);
            let offset = (azimuth - a).rem_euclid(360.0);
            if offset < span {
                let t = offset / span * FRAC_PI_2;
                return [(ch_a, t.cos()), (ch_b, t.sin())];
            }
        }
        // Only reachable with a single speaker.
        let ch = layout.first().map_or(0, |&(_, ch)| ch);
        [(ch, 1.0), (ch, 0.0)]
    }
}

impl Spatializer for AmplitudePanner {
    fn pan(
        &self,
        strategy: PanningStrategy,
        azimuth: f32,
        _elevation: f32,
        gain: f32,
        input: &[f32],
        outputs: &mut [Buffer],
    ) {
        let strategy = if outputs.len() < strategy.channels() {
            match PanningStrategy::for_channels(outputs.len()) {
                Some(s) => s,
                None => {
                    if let Some(out) = outputs.first_mut() {
                        add_scaled(out, input, gain);
                    }
                    return;
                }
            }
        } else {
            strategy
        };

        let layout: &[(f32, usize)] = match strategy {
            PanningStrategy::Hrtf | PanningStrategy::Stereo => {
                let (l, r) = Self::stereo_gains(azimuth);
                add_scaled(&mut outputs[0], input, gain * l);
                add_scaled(&mut outputs[1], input, gain * r);
                return;
            }
            PanningStrategy::Surround40 => &QUAD,
            PanningStrategy::Surround51 => &SURROUND_51,
            PanningStrategy::Surround71 => &SURROUND_71,
        };

        for (ch, g) in Self::pair_gains(layout, azimuth) {
            add_scaled(&mut outputs[ch], input, gain * g);
        }
    }
}

#[inline]
pub(crate) fn add_scaled(out: &mut Buffer, input: &[f32], gain: f32) {
    for (o, i) in out.iter_mut().zip(input) {
        *o += *i * gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power(gains: &[(usize, f32)]) -> f32 {
        gains.iter().map(|(_, g)| g * g).sum()
    }

    #[test]
    fn stereo_is_constant_power() {
        for az in [-90.0f32, -30.0, 0.0, 45.0, 90.0, 180.0] {
            let (l, r) = AmplitudePanner::stereo_gains(az);
            assert!((l * l + r * r - 1.0).abs() < 1e-5, "azimuth {az}");
        }
        let (l, r) = AmplitudePanner::stereo_gains(-90.0);
        assert!(l > 0.99 && r < 0.01);
    }

    #[test]
    fn speaker_on_axis_gets_everything() {
        let gains = AmplitudePanner::pair_gains(&SURROUND_71, 90.0);
        assert_eq!(gains[0].0, 7);
        assert!((gains[0].1 - 1.0).abs() < 1e-5);
        assert!((power(&gains) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn wraps_between_last_and_first_speaker() {
        // between 315 (ch 0) and 45 (ch 1)
        let gains = AmplitudePanner::pair_gains(&QUAD, 0.0);
        assert_eq!([gains[0].0, gains[1].0], [0, 1]);
        assert!((gains[0].1 - gains[1].1).abs() < 1e-5);
        let gains = AmplitudePanner::pair_gains(&QUAD, -10.0);
        assert_eq!(gains[0].0, 0);
    }

    #[test]
    fn narrow_bus_falls_back() {
        let input = [1.0f32; 4];
        let mut outputs = vec![Buffer::SILENT; 1];
        AmplitudePanner.pan(PanningStrategy::Surround71, 0.0, 0.0, 0.5, &input, &mut outputs);
        assert_eq!(&outputs[0][..4], &[0.5; 4]);
        assert_eq!(outputs[0][4], 0.0);
    }

    #[test]
    fn strategy_round_trips_through_int() {
        for s in PanningStrategy::ALL {
            assert_eq!(PanningStrategy::from_i32(s as i32), Some(s));
        }
        assert_eq!(PanningStrategy::from_i32(9), None);
        assert_eq!(PanningStrategy::from_i32(-1), None);
    }
}
