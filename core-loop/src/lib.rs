//! # Gapless Clip Looping
//!
//! Cuts an arbitrary time range out of a compressed audio file and serves it
//! as a click-free, endlessly repeatable byte stream for practice looping.
//!
//! ## Overview
//!
//! This module handles:
//! - Container probing and frame-accurate range decoding (Symphonia)
//! - Raised-cosine fades at the loop seam
//! - WAV packaging with a size that covers every repetition
//! - Virtual or materialized loop delivery, chosen against a memory budget
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core_loop::{ByteStream, ClipLooper, ClipRequest, LoopConfig, ReadOutcome};
//!
//! # fn example() -> core_loop::Result<()> {
//! let looper = ClipLooper::new(LoopConfig::default())?;
//! let prepared = looper.prepare(&ClipRequest::new("/music/tune.mp3", 12_000, 16_000, 8))?;
//!
//! let mut stream = prepared.open_stream();
//! let total = stream.open(0)?;
//! let mut buf = vec![0u8; 8192];
//! while let ReadOutcome::Data(n) = stream.read(&mut buf)? {
//!     // hand buf[..n] to the audio sink
//! #   let _ = (n, total);
//! }
//! stream.close();
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod config;
pub mod decoder;
pub mod error;
pub mod fade;
pub mod pcm;
pub mod repeat;
pub mod session;
pub mod stream;
pub mod traits;
pub mod wav;

pub use budget::{BudgetVerdict, MemoryBudget};
pub use config::{BudgetConfig, DecodeConfig, DeliveryPreference, FadeConfig, LoopConfig};
pub use decoder::{
    ClipDecoder, ContainerProbe, DecodeReport, DecodedClip, ProbeResult, SymphoniaCodec,
    SymphoniaDemuxer,
};
pub use error::{LoopError, Result};
pub use fade::{FadeCurve, FadeProcessor, FadeReport};
pub use pcm::PcmBuffer;
pub use repeat::RepeatPolicy;
pub use session::{ClipLooper, LoopSession, PreparedClip};
pub use stream::{LoopPlan, LoopResource, LoopStrategy, LoopStreamSource};
pub use traits::{
    AudioCodec, AudioFormat, ByteStream, ClipRequest, CodecSession, DecodedChunk, Demuxer,
    EncodedUnit, InputSlot, OutputPoll, ReadOutcome, SeekMode,
};
pub use wav::{build_header, WavHeader, WAV_HEADER_LEN};
