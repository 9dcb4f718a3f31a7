//! Owned interleaved 16-bit PCM.

use crate::error::{LoopError, Result};
use bytes::Bytes;

/// Interleaved little-endian signed 16-bit samples.
///
/// The length is always a multiple of the frame size (`channels * 2`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    data: Vec<u8>,
    channels: u16,
}

impl PcmBuffer {
    /// Wrap raw bytes, rejecting a trailing partial frame.
    pub fn new(data: Vec<u8>, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(LoopError::Format("channel count must be >= 1".to_string()));
        }
        let frame_size = channels as usize * 2;
        if data.len() % frame_size != 0 {
            return Err(LoopError::Decode(format!(
                "PCM length {} is not a multiple of the {}-byte frame",
                data.len(),
                frame_size
            )));
        }
        Ok(Self { data, channels })
    }

    /// An empty buffer for `channels` channels.
    pub fn empty(channels: u16) -> Self {
        Self {
            data: Vec::new(),
            channels: channels.max(1),
        }
    }

    /// Build a buffer from interleaved i16 samples.
    pub fn from_samples(samples: &[i16], channels: u16) -> Result<Self> {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self::new(data, channels)
    }

    /// Number of interleaved channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Bytes per frame.
    pub fn frame_size(&self) -> usize {
        self.channels as usize * 2
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of complete frames.
    pub fn frames(&self) -> usize {
        self.data.len() / self.frame_size()
    }

    /// Sample of `channel` at `frame`, if in range.
    pub fn sample(&self, frame: usize, channel: usize) -> Option<i16> {
        if channel >= self.channels as usize || frame >= self.frames() {
            return None;
        }
        let offset = frame * self.frame_size() + channel * 2;
        Some(i16::from_le_bytes([self.data[offset], self.data[offset + 1]]))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw bytes. The length cannot change through this view.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Freeze into a shared, read-only buffer.
    pub fn freeze(self) -> Bytes {
        Bytes::from(self.data)
    }

    /// Keep only frames `[start, end)`, clamped to the buffer.
    pub(crate) fn retain_frames(&mut self, start: usize, end: usize) {
        let frames = self.frames();
        let start = start.min(frames);
        let end = end.clamp(start, frames);
        let frame_size = self.frame_size();

        self.data.truncate(end * frame_size);
        self.data.drain(..start * frame_size);
    }
}
