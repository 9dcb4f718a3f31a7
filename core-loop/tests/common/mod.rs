//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const RATE: u32 = 44_100;
pub const STEREO: u16 = 2;

/// Route `tracing` output through the test harness.
///
/// Only the first call per test binary installs the subscriber.
pub fn init_test_logging() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .for_tests();
    let _ = init_logging(config);
}

/// A temporary directory holding synthesised audio files.
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        init_test_logging();
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a 16-bit sine tone of `seconds` length and return its path.
    pub fn sine_wav(&self, name: &str, sample_rate: u32, channels: u16, seconds: f64) -> PathBuf {
        let path = self.path(name);
        write_sine(&path, sample_rate, channels, seconds, 440.0);
        path
    }

    /// Write arbitrary bytes that no demuxer recognises.
    pub fn garbage(&self, name: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, b"definitely not an audio container, just text".repeat(64))
            .expect("write garbage file");
        path
    }
}

pub fn write_sine(path: &Path, sample_rate: u32, channels: u16, seconds: f64, freq: f64) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
    let frames = (seconds * sample_rate as f64).round() as u64;
    for n in 0..frames {
        let t = n as f64 / sample_rate as f64;
        let value = (8_000.0 * (2.0 * PI * freq * t).sin()) as i16;
        for _ in 0..channels {
            writer.write_sample(value).expect("write sample");
        }
    }
    writer.finalize().expect("finalize wav");
}

/// Expected frame count of the `[start_ms, end_ms)` window.
pub fn expected_frames(sample_rate: u32, start_ms: u64, end_ms: u64) -> i64 {
    let frame = |ms: u64| ((ms * sample_rate as u64) as f64 / 1000.0).ceil() as i64;
    frame(end_ms) - frame(start_ms)
}

/// Interpret little-endian bytes as i16 samples.
pub fn samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
