//! Container probe: format metadata without decoding.

use crate::decoder::symphonia::SymphoniaDemuxer;
use crate::error::Result;
use crate::traits::{AudioFormat, Demuxer};
use std::path::Path;
use std::time::Duration;

/// What a probe learned about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Codec, sample rate and channel count of the first decodable track
    pub format: AudioFormat,
    /// Track duration, when the container declares it
    pub duration: Option<Duration>,
}

/// Opens a container just long enough to read its format.
pub struct ContainerProbe;

impl ContainerProbe {
    /// Sample rate, channel count and codec of the first decodable track.
    ///
    /// The reader handle is released before this returns, on every path.
    pub fn open(path: &Path) -> Result<AudioFormat> {
        Ok(Self::inspect(path)?.format)
    }

    /// Like [`open`](Self::open), also reporting the declared duration.
    pub fn inspect(path: &Path) -> Result<ProbeResult> {
        let demuxer = SymphoniaDemuxer::open(path)?;
        Ok(ProbeResult {
            format: demuxer.format(),
            duration: demuxer.duration(),
        })
    }
}
