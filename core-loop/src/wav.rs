//! # Container Packager
//!
//! Minimal 44-byte canonical WAV header for 16-bit PCM. The declared data size
//! covers every repetition of the loop, so a player that reads the header once
//! sees one long file regardless of how the bytes behind it are served.
//!
//! Sizes are 32-bit. A payload that would not fit is rejected with
//! [`LoopError::ContainerOverflow`] instead of being silently wrapped; use
//! [`max_loops_for_container`] to cap the loop count up front.

use crate::error::{LoopError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Length of the canonical header.
pub const WAV_HEADER_LEN: usize = 44;

/// Bytes counted by the RIFF size field besides the data payload.
const RIFF_OVERHEAD: u64 = 36;

const FORMAT_PCM: u16 = 1;

/// Fields of a canonical PCM WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Size of the `data` chunk in bytes.
    pub data_size: u32,
}

impl WavHeader {
    /// Create a header for `data_size` payload bytes.
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16, data_size: u64) -> Result<Self> {
        if data_size.saturating_add(RIFF_OVERHEAD) > u32::MAX as u64 {
            return Err(LoopError::ContainerOverflow {
                data_bytes: data_size,
            });
        }
        if sample_rate == 0 || channels == 0 || bits_per_sample == 0 || bits_per_sample % 8 != 0 {
            return Err(LoopError::Format(format!(
                "cannot describe {} Hz / {} ch / {} bit PCM",
                sample_rate, channels, bits_per_sample
            )));
        }
        let byte_rate = channels
            .checked_mul(bits_per_sample / 8)
            .and_then(|block_align| sample_rate.checked_mul(block_align as u32));
        if byte_rate.is_none() {
            return Err(LoopError::Format(format!(
                "{} Hz / {} ch / {} bit PCM overflows the fmt chunk",
                sample_rate, channels, bits_per_sample
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            bits_per_sample,
            data_size: data_size as u32,
        })
    }

    /// Bytes per frame. Saturates for fields that [`WavHeader::new`] would reject.
    pub fn block_align(&self) -> u16 {
        self.channels.saturating_mul(self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate.saturating_mul(self.block_align() as u32)
    }

    /// Value of the RIFF chunk size field (file size minus 8).
    pub fn riff_size(&self) -> u32 {
        self.data_size + RIFF_OVERHEAD as u32
    }

    /// Serialise to the 44-byte little-endian layout.
    pub fn to_bytes(&self) -> [u8; WAV_HEADER_LEN] {
        let mut buf = BytesMut::with_capacity(WAV_HEADER_LEN);

        // RIFF header
        buf.put_slice(b"RIFF");
        buf.put_u32_le(self.riff_size());
        buf.put_slice(b"WAVE");

        // fmt chunk
        buf.put_slice(b"fmt ");
        buf.put_u32_le(16);
        buf.put_u16_le(FORMAT_PCM);
        buf.put_u16_le(self.channels);
        buf.put_u32_le(self.sample_rate);
        buf.put_u32_le(self.byte_rate());
        buf.put_u16_le(self.block_align());
        buf.put_u16_le(self.bits_per_sample);

        // data chunk
        buf.put_slice(b"data");
        buf.put_u32_le(self.data_size);

        let mut out = [0u8; WAV_HEADER_LEN];
        out.copy_from_slice(&buf);
        out
    }

    /// Parse a canonical 44-byte header.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < WAV_HEADER_LEN {
            return Err(LoopError::Format(format!(
                "WAV header needs {} bytes, got {}",
                WAV_HEADER_LEN,
                bytes.len()
            )));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(LoopError::Format("missing RIFF/WAVE signature".to_string()));
        }
        if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
            return Err(LoopError::Format("not a canonical fmt/data layout".to_string()));
        }

        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };

        let format_tag = u16_at(20);
        if format_tag != FORMAT_PCM {
            return Err(LoopError::Format(format!("format tag {} is not PCM", format_tag)));
        }

        Self::new(u32_at(24), u16_at(22), u16_at(34), u32_at(40) as u64)
    }
}

/// Build the header for `loop_count` repetitions of a `single_loop_bytes` clip.
///
/// `total_bytes` is the full payload (`single_loop_bytes × loop_count`) and is
/// what the data size field declares.
pub fn build_header(
    single_loop_bytes: u64,
    total_bytes: u64,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
) -> Result<[u8; WAV_HEADER_LEN]> {
    if single_loop_bytes == 0 || total_bytes % single_loop_bytes != 0 {
        return Err(LoopError::InvalidStream(format!(
            "total {} is not a whole number of {}-byte loops",
            total_bytes, single_loop_bytes
        )));
    }
    let header = WavHeader::new(sample_rate, channels, bits_per_sample, total_bytes)?;
    Ok(header.to_bytes())
}

/// Largest loop count whose payload still fits the 32-bit size fields.
pub fn max_loops_for_container(single_loop_bytes: u64) -> u32 {
    if single_loop_bytes == 0 {
        return u32::MAX;
    }
    let max_payload = u32::MAX as u64 - RIFF_OVERHEAD;
    (max_payload / single_loop_bytes).min(u32::MAX as u64) as u32
}

/// Concatenate `header` and `loop_count` copies of `pcm` into one linear buffer.
pub fn materialize(pcm: &[u8], header: &[u8], loop_count: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(header.len() + pcm.len() * loop_count as usize);
    buf.put_slice(header);
    for _ in 0..loop_count {
        buf.put_slice(pcm);
    }
    buf.freeze()
}
