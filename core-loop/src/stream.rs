//! # Loop Stream Source
//!
//! Serves a prepared clip to the playback engine as one finite byte stream.
//!
//! Two delivery strategies are modelled as a closed sum type, picked once per
//! request:
//!
//! - [`LoopResource::Virtual`] keeps a single canonical PCM buffer and rereads
//!   it at wrapped offsets, so `N` repetitions cost the memory of one.
//! - [`LoopResource::Materialized`] holds one linear buffer with every
//!   repetition already laid out after the header.
//!
//! Both are read through [`LoopStreamSource`], which owns the cursor. The
//! buffers themselves are [`Bytes`], so any number of stream instances can
//! share one resource read-only.

use crate::error::{LoopError, Result};
use crate::traits::{ByteStream, ReadOutcome};
use crate::wav::{self, WAV_HEADER_LEN};
use bytes::Bytes;
use tracing::{debug, trace};

/// Delivery strategy recorded in a [`LoopPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStrategy {
    Virtual,
    Materialized,
}

/// How a decoded clip is repeated. Immutable once chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPlan {
    /// Length of one repetition in bytes
    pub single_loop_bytes: u64,
    /// Number of repetitions
    pub loop_count: u32,
    /// Delivery strategy
    pub strategy: LoopStrategy,
}

impl LoopPlan {
    pub fn new(single_loop_bytes: u64, loop_count: u32, strategy: LoopStrategy) -> Self {
        Self {
            single_loop_bytes,
            loop_count,
            strategy,
        }
    }

    /// PCM bytes across all repetitions, saturating at `u64::MAX`.
    pub fn total_pcm_bytes(&self) -> u64 {
        self.single_loop_bytes.saturating_mul(self.loop_count as u64)
    }
}

/// Bytes behind a prepared clip.
#[derive(Debug, Clone)]
pub enum LoopResource {
    /// One canonical buffer reread `loop_count` times, optionally behind a header.
    Virtual {
        pcm: Bytes,
        loop_count: u32,
        header: Option<[u8; WAV_HEADER_LEN]>,
    },
    /// Header plus every repetition, laid out linearly.
    Materialized(Bytes),
}

impl LoopResource {
    /// Virtual resource over `pcm`.
    pub fn virtual_loop(pcm: Bytes, loop_count: u32, header: Option<[u8; WAV_HEADER_LEN]>) -> Self {
        LoopResource::Virtual {
            pcm,
            loop_count,
            header,
        }
    }

    /// Materialized resource holding `header` and `loop_count` copies of `pcm`.
    pub fn materialized(pcm: &[u8], loop_count: u32, header: &[u8; WAV_HEADER_LEN]) -> Self {
        LoopResource::Materialized(wav::materialize(pcm, header, loop_count))
    }

    pub fn strategy(&self) -> LoopStrategy {
        match self {
            LoopResource::Virtual { .. } => LoopStrategy::Virtual,
            LoopResource::Materialized(_) => LoopStrategy::Materialized,
        }
    }

    /// Length of the header prefix in bytes.
    pub fn header_len(&self) -> u64 {
        match self {
            LoopResource::Virtual { header, .. } => {
                header.as_ref().map_or(0, |h| h.len() as u64)
            }
            LoopResource::Materialized(bytes) => (bytes.len() as u64).min(WAV_HEADER_LEN as u64),
        }
    }

    /// Audio payload length, excluding the header.
    pub fn payload_len(&self) -> u64 {
        match self {
            LoopResource::Virtual {
                pcm, loop_count, ..
            } => (pcm.len() as u64).saturating_mul(*loop_count as u64),
            LoopResource::Materialized(bytes) => bytes.len() as u64 - self.header_len(),
        }
    }

    /// Total bytes a stream over this resource delivers.
    pub fn total_len(&self) -> u64 {
        self.header_len() + self.payload_len()
    }

    /// Copy bytes starting at `position` into `buf`. Returns 0 past the end.
    ///
    /// A single call never crosses a loop boundary or the end of the header.
    fn read_at(&self, position: u64, buf: &mut [u8]) -> usize {
        match self {
            LoopResource::Virtual {
                pcm,
                loop_count,
                header,
            } => {
                let header_len = header.as_ref().map_or(0, |h| h.len() as u64);
                if position < header_len {
                    let Some(header) = header else { return 0 };
                    let start = position as usize;
                    let n = buf.len().min(header.len() - start);
                    buf[..n].copy_from_slice(&header[start..start + n]);
                    return n;
                }

                let single = pcm.len() as u64;
                if single == 0 {
                    return 0;
                }
                let relative = position - header_len;
                let loop_index = relative / single;
                if loop_index >= *loop_count as u64 {
                    return 0;
                }
                let offset = (relative % single) as usize;
                let n = buf.len().min(pcm.len() - offset);
                buf[..n].copy_from_slice(&pcm[offset..offset + n]);
                n
            }
            LoopResource::Materialized(bytes) => {
                let len = bytes.len() as u64;
                if position >= len {
                    return 0;
                }
                let start = position as usize;
                let n = buf.len().min(bytes.len() - start);
                buf[..n].copy_from_slice(&bytes[start..start + n]);
                n
            }
        }
    }
}

/// Pull-based stream over a [`LoopResource`].
///
/// `Closed -> open -> read* -> close -> Closed`. The cursor belongs to this
/// instance; create one stream per consumer thread.
#[derive(Debug, Clone)]
pub struct LoopStreamSource {
    resource: LoopResource,
    cursor: Option<u64>,
}

impl LoopStreamSource {
    /// Create a closed stream over `resource`.
    pub fn new(resource: LoopResource) -> Self {
        Self {
            resource,
            cursor: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    /// Absolute cursor position, if open.
    pub fn position(&self) -> Option<u64> {
        self.cursor
    }

    pub fn resource(&self) -> &LoopResource {
        &self.resource
    }
}

impl ByteStream for LoopStreamSource {
    fn open(&mut self, offset: u64) -> Result<u64> {
        if self.resource.payload_len() == 0 {
            return Err(LoopError::InvalidStream(
                "loop payload is empty (zero-length clip or zero loop count)".to_string(),
            ));
        }

        let total = self.resource.total_len();
        self.cursor = Some(offset);
        debug!(
            offset,
            total,
            strategy = ?self.resource.strategy(),
            "Opened loop stream"
        );
        Ok(total)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        let cursor = self.cursor.ok_or(LoopError::NotOpen)?;
        if cursor >= self.resource.total_len() {
            trace!(cursor, "Loop stream exhausted");
            return Ok(ReadOutcome::EndOfStream);
        }
        if buf.is_empty() {
            return Ok(ReadOutcome::Data(0));
        }

        let n = self.resource.read_at(cursor, buf);
        if n == 0 {
            return Ok(ReadOutcome::EndOfStream);
        }
        self.cursor = Some(cursor + n as u64);
        Ok(ReadOutcome::Data(n))
    }

    fn close(&mut self) {
        if let Some(position) = self.cursor.take() {
            debug!(position, "Closed loop stream");
        }
    }
}
