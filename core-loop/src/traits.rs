//! # Core Loop Types and Traits
//!
//! Data model shared by the clip pipeline plus the three seams it talks through:
//!
//! - [`Demuxer`]: a container reader that seeks to sync points and hands out
//!   compressed units with their presentation timestamps.
//! - [`CodecSession`]: a codec driven by a feed/drain protocol with bounded
//!   waits on its input slots and output queue.
//! - [`ByteStream`]: the pull protocol the playback engine uses to consume a
//!   prepared clip (`open` / `read` / `close`).
//!
//! ## Threading Model
//!
//! Decoding runs synchronously on the caller's thread. A [`ByteStream`] instance
//! is owned by the engine's I/O thread; the PCM it serves is shared read-only.

use crate::error::{LoopError, Result};
use crate::repeat::RepeatPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;

// ============================================================================
// Audio Format Types
// ============================================================================

/// Codec identity of the compressed source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// MPEG-1 Audio Layer 3
    Mp3,
    /// Advanced Audio Coding (AAC/M4A)
    Aac,
    /// Free Lossless Audio Codec
    Flac,
    /// Ogg Vorbis
    Vorbis,
    /// Opus
    Opus,
    /// Uncompressed PCM in a WAV/AIFF container
    Wav,
    /// Apple Lossless Audio Codec
    Alac,
    /// Codec not recognized
    Unknown,
    /// Custom or proprietary codec
    Other(String),
}

/// Format of the decoded PCM produced by this core.
///
/// The container path always emits 16-bit little-endian signed samples, so
/// `bits_per_sample` is fixed at 16.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Source codec (before decoding)
    pub codec: AudioCodec,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Bits per decoded sample
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Bits per sample on the container path.
    pub const PCM_BITS: u16 = 16;

    /// Create a 16-bit PCM format descriptor.
    pub fn new(codec: AudioCodec, sample_rate: u32, channels: u16) -> Self {
        Self {
            codec,
            sample_rate,
            channels,
            bits_per_sample: Self::PCM_BITS,
        }
    }

    /// Standard CD quality (44.1 kHz stereo).
    pub fn cd_quality() -> Self {
        Self::new(AudioCodec::Wav, 44100, 2)
    }

    /// Bytes per frame (one sample for every channel).
    pub fn frame_size(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Bytes of PCM per second of audio.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.frame_size() as u64
    }

    /// Duration of `frames` frames at this sample rate.
    pub fn frames_to_duration(&self, frames: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    /// Duration of `bytes` bytes of interleaved PCM.
    pub fn bytes_to_duration(&self, bytes: u64) -> Duration {
        let frame_size = self.frame_size() as u64;
        if frame_size == 0 {
            return Duration::ZERO;
        }
        self.frames_to_duration(bytes / frame_size)
    }

    /// Check that the format can describe a PCM stream.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(LoopError::Format("sample rate must be > 0".to_string()));
        }
        if self.channels == 0 {
            return Err(LoopError::Format("channel count must be >= 1".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Clip Request
// ============================================================================

/// A request to decode `[start_ms, end_ms)` of a file and loop it `loop_count` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipRequest {
    /// Path of the compressed audio container
    pub source: PathBuf,
    /// Inclusive start of the clip in milliseconds
    pub start_ms: u64,
    /// Exclusive end of the clip in milliseconds
    pub end_ms: u64,
    /// Number of back-to-back repetitions
    pub loop_count: u32,
}

impl ClipRequest {
    /// Create a new clip request.
    pub fn new(source: impl Into<PathBuf>, start_ms: u64, end_ms: u64, loop_count: u32) -> Self {
        Self {
            source: source.into(),
            start_ms,
            end_ms,
            loop_count,
        }
    }

    /// Create a request whose loop count comes from the practice repeat policy.
    ///
    /// Clips outside the policy's loopable window are played once.
    pub fn for_practice(
        source: impl Into<PathBuf>,
        start_ms: u64,
        end_ms: u64,
        policy: &RepeatPolicy,
    ) -> Self {
        let duration_ms = end_ms.saturating_sub(start_ms);
        let loop_count = policy.repeats_for(duration_ms).unwrap_or(1);
        Self::new(source, start_ms, end_ms, loop_count)
    }

    /// Requested clip length in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Validate the request bounds.
    pub fn validate(&self) -> Result<()> {
        if self.end_ms <= self.start_ms {
            return Err(LoopError::InvalidRequest(format!(
                "end_ms ({}) must be greater than start_ms ({})",
                self.end_ms, self.start_ms
            )));
        }
        if self.loop_count == 0 {
            return Err(LoopError::InvalidRequest(
                "loop_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Demuxer / Codec Seams
// ============================================================================

/// How the demuxer positions itself relative to the requested start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekMode {
    /// Land on the nearest sync point; if it is before the target, units are
    /// skipped until one starts at or after the target.
    ClosestSync,
    /// Land on the sync point at or before the target and decode from there.
    /// The negative offset is trimmed away after decoding.
    PreviousSync,
}

/// One compressed unit (packet) read from the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUnit {
    /// Timestamp in the track's native time base
    pub ts: u64,
    /// Duration in the track's native time base
    pub dur: u64,
    /// Presentation time in microseconds
    pub timestamp_us: i64,
    /// Compressed payload
    pub data: Box<[u8]>,
}

/// Handle to a free codec input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot(pub usize);

/// A block of decoded PCM drained from a codec.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedChunk {
    /// Interleaved little-endian i16 samples
    pub pcm: Vec<u8>,
    /// Presentation time of the first frame in microseconds
    pub timestamp_us: i64,
    /// Set on the last chunk the codec will ever produce
    pub end_of_stream: bool,
}

/// Result of one bounded poll on the codec output queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPoll {
    /// A decoded chunk is ready.
    Ready(DecodedChunk),
    /// The output format changed; subsequent chunks use it.
    FormatChanged(AudioFormat),
    /// Nothing became ready within the timeout.
    TryAgain,
}

/// A container reader positioned on one audio track.
#[cfg_attr(test, automock)]
pub trait Demuxer: Send {
    /// Format of the selected track as declared by the container.
    fn format(&self) -> AudioFormat;

    /// Seek to a sync point near `position_us` according to `mode`.
    fn seek(&mut self, position_us: i64, mode: SeekMode) -> Result<()>;

    /// Presentation time of the current unit, or `None` once input is exhausted.
    fn unit_time_us(&self) -> Option<i64>;

    /// Take the current unit and move to the next one.
    fn next_unit(&mut self) -> Result<Option<EncodedUnit>>;

    /// Drop the current unit without returning it. Returns `false` at end of input.
    fn skip_unit(&mut self) -> Result<bool>;
}

/// A codec driven through a feed/drain protocol.
#[cfg_attr(test, automock)]
pub trait CodecSession: Send {
    /// Wait up to `timeout` for a free input slot.
    fn dequeue_input(&mut self, timeout: Duration) -> Option<InputSlot>;

    /// Submit a compressed unit in a previously dequeued slot.
    fn queue_input(&mut self, slot: InputSlot, unit: EncodedUnit) -> Result<()>;

    /// Signal end-of-stream in a previously dequeued slot.
    fn queue_end_of_stream(&mut self, slot: InputSlot) -> Result<()>;

    /// Wait up to `timeout` for decoded output.
    fn dequeue_output(&mut self, timeout: Duration) -> Result<OutputPoll>;
}

// ============================================================================
// Engine Pull Protocol
// ============================================================================

/// Outcome of a successful [`ByteStream::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were copied into the caller's buffer.
    Data(usize),
    /// No more bytes will ever be produced.
    EndOfStream,
}

/// Byte-addressable resource consumed by the playback engine.
///
/// Once `open` succeeded, `read` only ever yields data or end-of-stream.
pub trait ByteStream {
    /// Open at `offset` and return the total length of the stream.
    fn open(&mut self, offset: u64) -> Result<u64>;

    /// Copy the next bytes into `buf`.
    ///
    /// Fails with [`LoopError::NotOpen`] when called before `open`.
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome>;

    /// Invalidate the cursor. The stream may be opened again.
    fn close(&mut self);
}

// ============================================================================
// Tests
// ============================================================================
