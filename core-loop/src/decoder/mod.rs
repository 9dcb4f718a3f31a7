//! # Audio Decoder Module
//!
//! Container probing and frame-accurate clip decoding on top of Symphonia.
//!
//! ## Architecture
//!
//! ```text
//! File → SymphoniaDemuxer ─(EncodedUnit)→ SymphoniaCodec ─(DecodedChunk)→ ClipDecoder → PcmBuffer
//! ```
//!
//! [`ClipDecoder`] only talks to the [`Demuxer`](crate::Demuxer) and
//! [`CodecSession`](crate::CodecSession) traits, so the feed/drain loop can be
//! exercised against scripted codecs.
//!
//! ## Supported Formats
//!
//! Everything Symphonia's `all` feature decodes: MP3, AAC/ALAC in MP4, FLAC,
//! Vorbis, WAV/AIFF PCM. Tracks must declare sample rate and channel count.

mod clip;
mod format_detector;
mod probe;
mod sample_converter;
mod symphonia;

pub use self::symphonia::{SymphoniaCodec, SymphoniaDemuxer};
pub use clip::{ClipDecoder, DecodeReport, DecodedClip};
pub use format_detector::FormatDetector;
pub use probe::{ContainerProbe, ProbeResult};
pub use sample_converter::SampleConverter;
