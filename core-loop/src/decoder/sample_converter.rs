//! # Sample Format Converter
//!
//! Converts Symphonia's planar buffers of any sample type into the interleaved
//! little-endian signed 16-bit layout used by the loop pipeline.

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::conv::IntoSample;
use symphonia::core::sample::Sample;

/// Normalises decoded audio to interleaved LE i16 bytes.
pub struct SampleConverter;

impl SampleConverter {
    /// Convert a decoded buffer to interleaved LE i16 bytes (`LRLR...` for stereo).
    ///
    /// Float input is clamped to the i16 range by the conversion.
    pub fn to_interleaved_i16_le(buffer: &AudioBufferRef<'_>) -> Vec<u8> {
        match buffer {
            AudioBufferRef::U8(buf) => Self::convert_and_interleave(&**buf),
            AudioBufferRef::U16(buf) => Self::convert_and_interleave(&**buf),
            AudioBufferRef::U24(buf) => Self::convert_and_interleave(&**buf),
            AudioBufferRef::U32(buf) => Self::convert_and_interleave(&**buf),
            AudioBufferRef::S8(buf) => Self::convert_and_interleave(&**buf),
            AudioBufferRef::S16(buf) => Self::convert_and_interleave(&**buf),
            AudioBufferRef::S24(buf) => Self::convert_and_interleave(&**buf),
            AudioBufferRef::S32(buf) => Self::convert_and_interleave(&**buf),
            AudioBufferRef::F32(buf) => Self::convert_and_interleave(&**buf),
            AudioBufferRef::F64(buf) => Self::convert_and_interleave(&**buf),
        }
    }

    fn convert_and_interleave<T>(buf: &AudioBuffer<T>) -> Vec<u8>
    where
        T: Sample + IntoSample<i16>,
    {
        let num_channels = buf.spec().channels.count();
        let num_frames = buf.frames();
        let mut interleaved = Vec::with_capacity(num_frames * num_channels * 2);

        for frame_idx in 0..num_frames {
            for chan_idx in 0..num_channels {
                let sample: i16 = buf.chan(chan_idx)[frame_idx].into_sample();
                interleaved.extend_from_slice(&sample.to_le_bytes());
            }
        }

        interleaved
    }
}
