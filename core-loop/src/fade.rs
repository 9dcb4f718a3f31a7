//! # Boundary Fade Processor
//!
//! Shapes the head and tail of a clip so that playing it back-to-back with
//! itself has no audible click at the seam. The tail fades to silence and the
//! head fades in from silence, both over the same number of frames.
//!
//! The default raised-cosine curve has a zero derivative at both ends, so the
//! envelope joins the untouched audio without a slope discontinuity.

use crate::config::FadeConfig;
use crate::pcm::PcmBuffer;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use tracing::debug;

/// Envelope shape of a fade window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// `0.5 * (1 ± cos(pi * t))`
    #[default]
    RaisedCosine,
    /// Straight ramp.
    Linear,
    /// Quarter sine/cosine.
    EqualPower,
}

impl FadeCurve {
    /// Fade-in gain at normalised position `t` in `[0, 1]` (0 at `t = 0`, 1 at `t = 1`).
    pub fn fade_in_gain(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::RaisedCosine => 0.5 * (1.0 - (PI * t).cos()),
            FadeCurve::Linear => t,
            FadeCurve::EqualPower => (FRAC_PI_2 * t).sin(),
        }
    }

    /// Fade-out gain at normalised position `t` in `[0, 1]` (1 at `t = 0`, 0 at `t = 1`).
    pub fn fade_out_gain(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::RaisedCosine => 0.5 * (1.0 + (PI * t).cos()),
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::EqualPower => (FRAC_PI_2 * t).cos(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

/// What a fade pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FadeReport {
    /// Frames shaped at each end.
    pub fade_frames: usize,
    /// Frames the configured duration asked for before clamping.
    pub requested_frames: usize,
}

impl FadeReport {
    /// Returns `true` if the window was shortened to fit the clip.
    pub fn was_clamped(&self) -> bool {
        self.fade_frames < self.requested_frames
    }
}

/// Applies symmetric loop-seam fades in place.
#[derive(Debug, Clone, Default)]
pub struct FadeProcessor {
    config: FadeConfig,
}

impl FadeProcessor {
    /// Create a processor with the given fade settings.
    pub fn new(config: FadeConfig) -> Self {
        Self { config }
    }

    /// Frames the configured duration covers at `sample_rate`.
    pub fn requested_frames(&self, sample_rate: u32) -> usize {
        (sample_rate as f64 * self.config.fade_duration_ms / 1000.0).ceil() as usize
    }

    /// Fade a [`PcmBuffer`] in place.
    pub fn apply(&self, pcm: &mut PcmBuffer, sample_rate: u32) -> FadeReport {
        let channels = pcm.channels();
        self.apply_loop_fades(pcm.as_bytes_mut(), sample_rate, channels)
    }

    /// Fade interleaved LE i16 bytes in place.
    ///
    /// Does nothing for buffers shorter than 4 bytes. The window is clamped to
    /// half the clip so the two fades never overlap.
    pub fn apply_loop_fades(&self, pcm: &mut [u8], sample_rate: u32, channels: u16) -> FadeReport {
        let requested_frames = self.requested_frames(sample_rate);
        if pcm.len() < 4 || channels == 0 {
            return FadeReport {
                fade_frames: 0,
                requested_frames,
            };
        }

        let frame_size = channels as usize * 2;
        let total_frames = pcm.len() / frame_size;
        let fade_frames = requested_frames.min(total_frames / 2);

        if fade_frames > 0 {
            let tail_start = (total_frames - fade_frames) * frame_size;
            self.shape(&mut pcm[tail_start..], fade_frames, frame_size, Direction::Out);
            self.shape(&mut pcm[..fade_frames * frame_size], fade_frames, frame_size, Direction::In);
        }

        debug!(
            fade_frames,
            requested_frames,
            total_frames,
            curve = ?self.config.curve,
            "Applied loop fades"
        );

        FadeReport {
            fade_frames,
            requested_frames,
        }
    }

    fn shape(&self, window: &mut [u8], frames: usize, frame_size: usize, direction: Direction) {
        let curve = self.config.curve;

        for (i, frame) in window.chunks_exact_mut(frame_size).take(frames).enumerate() {
            // A single-frame window is pure silence at the seam.
            let t = if frames > 1 {
                i as f64 / (frames - 1) as f64
            } else {
                1.0
            };
            let gain = match direction {
                Direction::Out => curve.fade_out_gain(t),
                Direction::In if frames > 1 => curve.fade_in_gain(t),
                Direction::In => 0.0,
            };

            for sample in frame.chunks_exact_mut(2) {
                let original = i16::from_le_bytes([sample[0], sample[1]]);
                let faded = (original as f64 * gain) as i32;
                let faded = faded.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
                sample.copy_from_slice(&faded.to_le_bytes());
            }
        }
    }
}
