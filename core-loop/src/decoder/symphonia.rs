//! # Symphonia Demuxer and Codec Session
//!
//! [`SymphoniaDemuxer`] wraps a probed `FormatReader` positioned on the first
//! decodable track. [`SymphoniaCodec`] drives a Symphonia `Decoder` through
//! the feed/drain protocol of [`CodecSession`].
//!
//! Symphonia decodes synchronously, so a queued unit is decoded on the spot
//! and its PCM parked in a bounded output queue. Input slots are only handed
//! out while that queue has room, which gives the clip decoder the same
//! backpressure a hardware codec would.

use crate::decoder::format_detector::FormatDetector;
use crate::decoder::sample_converter::SampleConverter;
use crate::error::{LoopError, Result};
use crate::traits::{
    AudioFormat, CodecSession, DecodedChunk, Demuxer, EncodedUnit, InputSlot, OutputPoll,
    SeekMode,
};
use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{
    FormatOptions, FormatReader, Packet, SeekMode as SymphoniaSeekMode, SeekTo,
};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, error, info, instrument, warn};

/// Consecutive bad packets tolerated before the stream is declared corrupt.
const MAX_CONSECUTIVE_ERRORS: usize = 10;

fn time_to_us(time: Time) -> i64 {
    time.seconds as i64 * 1_000_000 + (time.frac * 1_000_000.0).round() as i64
}

// ============================================================================
// Demuxer
// ============================================================================

/// Container reader over a local file.
pub struct SymphoniaDemuxer {
    /// Format reader (owns the media source stream)
    reader: Box<dyn FormatReader>,

    /// Selected track ID
    track_id: u32,

    /// Codec parameters of the selected track
    codec_params: CodecParameters,

    /// Time base used to convert packet timestamps
    time_base: TimeBase,

    /// Declared output format
    format: AudioFormat,

    /// Track duration (if known)
    duration: Option<Duration>,

    /// Next unit, read ahead so its timestamp can be inspected
    current: Option<Packet>,

    /// Original source (for error reporting)
    source_info: String,
}

impl SymphoniaDemuxer {
    /// Open and probe `path`, selecting the first decodable audio track.
    ///
    /// Fails with [`LoopError::Format`] when no track is decodable or when the
    /// track does not declare its sample rate and channel count.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            error!("Failed to open file {:?}: {}", path, e);
            LoopError::Io(e)
        })?;

        let hint = FormatDetector::hint_from_path(path);
        let media_source = Box::new(file) as Box<dyn MediaSource>;
        let mss = MediaSourceStream::new(media_source, Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                error!("Format probe failed: {}", e);
                LoopError::Format(format!("Failed to probe format: {}", e))
            })?;

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| LoopError::Format("No decodable audio track".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let codec = FormatDetector::detect_codec(codec_params.codec);
        FormatDetector::validate_codec_support(&codec)?;

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| LoopError::Format("Missing sample rate".to_string()))?;
        let channels = codec_params
            .channels
            .map(|ch| ch.count() as u16)
            .ok_or_else(|| LoopError::Format("Missing channel count".to_string()))?;

        let format = AudioFormat::new(codec, sample_rate, channels);
        format.validate()?;

        let time_base = codec_params
            .time_base
            .unwrap_or_else(|| TimeBase::new(1, sample_rate));

        let duration = codec_params
            .n_frames
            .map(|frames| Duration::from_secs_f64(frames as f64 / sample_rate as f64));

        info!(
            track_id,
            codec = ?format.codec,
            sample_rate,
            channels,
            ?duration,
            "Opened audio container"
        );

        let mut demuxer = Self {
            reader,
            track_id,
            codec_params,
            time_base,
            format,
            duration,
            current: None,
            source_info: path.display().to_string(),
        };
        demuxer.advance()?;
        Ok(demuxer)
    }

    /// Track duration, if the container declares it.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Create a codec session for the selected track.
    pub fn make_codec(&self, input_slots: usize) -> Result<SymphoniaCodec> {
        let decoder = symphonia::default::get_codecs()
            .make(&self.codec_params, &DecoderOptions::default())
            .map_err(|e| {
                error!("Failed to create decoder for {}: {}", self.source_info, e);
                LoopError::Decode(format!("Failed to create codec decoder: {}", e))
            })?;

        Ok(SymphoniaCodec::new(decoder, self.format.clone(), input_slots))
    }

    fn ts_to_us(&self, ts: u64) -> i64 {
        time_to_us(self.time_base.calc_time(ts))
    }

    /// Read ahead to the next packet of the selected track.
    fn advance(&mut self) -> Result<()> {
        self.current = None;
        let mut consecutive_errors = 0;

        loop {
            match self.reader.next_packet() {
                Ok(packet) if packet.track_id() != self.track_id => continue,
                Ok(packet) => {
                    self.current = Some(packet);
                    return Ok(());
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of input");
                    return Ok(());
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Track list changed mid-stream");
                    return Err(LoopError::Decode(
                        "Track list changed, reset required".to_string(),
                    ));
                }
                Err(SymphoniaError::IoError(e)) => {
                    consecutive_errors += 1;
                    warn!(
                        "I/O error reading packet (attempt {}/{}): {}",
                        consecutive_errors, MAX_CONSECUTIVE_ERRORS, e
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        return Err(LoopError::Io(e));
                    }
                }
                Err(e) => {
                    error!("Fatal format reader error: {}", e);
                    return Err(LoopError::Decode(format!("Failed to read packet: {}", e)));
                }
            }
        }
    }
}

impl Demuxer for SymphoniaDemuxer {
    fn format(&self) -> AudioFormat {
        self.format.clone()
    }

    fn seek(&mut self, position_us: i64, mode: SeekMode) -> Result<()> {
        let time = Time::from(position_us.max(0) as f64 / 1_000_000.0);
        let symphonia_mode = match mode {
            SeekMode::ClosestSync => SymphoniaSeekMode::Coarse,
            SeekMode::PreviousSync => SymphoniaSeekMode::Accurate,
        };

        match self.reader.seek(
            symphonia_mode,
            SeekTo::Time {
                time,
                track_id: Some(self.track_id),
            },
        ) {
            Ok(seeked) => {
                debug!(
                    position_us,
                    ?mode,
                    actual_ts = seeked.actual_ts,
                    required_ts = seeked.required_ts,
                    "Seek landed"
                );
                self.advance()
            }
            Err(SymphoniaError::SeekError(SeekErrorKind::OutOfRange)) => {
                debug!(position_us, "Seek target is past the end of the track");
                self.current = None;
                Ok(())
            }
            Err(e) => {
                error!("Seek failed: {}", e);
                Err(LoopError::Decode(format!("Seek failed: {}", e)))
            }
        }
    }

    fn unit_time_us(&self) -> Option<i64> {
        self.current.as_ref().map(|packet| self.ts_to_us(packet.ts()))
    }

    fn next_unit(&mut self) -> Result<Option<EncodedUnit>> {
        let Some(packet) = self.current.take() else {
            return Ok(None);
        };

        let unit = EncodedUnit {
            ts: packet.ts(),
            dur: packet.dur(),
            timestamp_us: self.ts_to_us(packet.ts()),
            data: packet.data,
        };
        self.advance()?;
        Ok(Some(unit))
    }

    fn skip_unit(&mut self) -> Result<bool> {
        if self.current.is_none() {
            return Ok(false);
        }
        self.advance()?;
        Ok(self.current.is_some())
    }
}

// ============================================================================
// Codec Session
// ============================================================================

/// Feed/drain adapter over a Symphonia decoder.
pub struct SymphoniaCodec {
    decoder: Box<dyn Decoder>,

    /// Format of the PCM currently being produced
    format: AudioFormat,

    /// Maximum number of parked outputs before input slots are withheld
    capacity: usize,

    /// Decoded output waiting to be drained
    ready: VecDeque<OutputPoll>,

    next_slot: usize,
    consecutive_errors: usize,
    end_of_stream_queued: bool,
}

impl SymphoniaCodec {
    fn new(decoder: Box<dyn Decoder>, format: AudioFormat, capacity: usize) -> Self {
        Self {
            decoder,
            format,
            capacity: capacity.max(1),
            ready: VecDeque::new(),
            next_slot: 0,
            consecutive_errors: 0,
            end_of_stream_queued: false,
        }
    }

    fn decode_unit(&mut self, unit: EncodedUnit) -> Result<()> {
        let timestamp_us = unit.timestamp_us;
        let packet = Packet::new_from_boxed_slice(0, unit.ts, unit.dur, unit.data);

        match self.decoder.decode(&packet) {
            Ok(decoded) => {
                self.consecutive_errors = 0;

                let rate = decoded.spec().rate;
                let channels = decoded.spec().channels.count() as u16;
                if channels != self.format.channels || rate != self.format.sample_rate {
                    debug!(
                        "Output format changed: {} Hz / {} ch -> {} Hz / {} ch",
                        self.format.sample_rate, self.format.channels, rate, channels
                    );
                    self.format.channels = channels;
                    self.format.sample_rate = rate;
                    self.ready
                        .push_back(OutputPoll::FormatChanged(self.format.clone()));
                }

                let pcm = SampleConverter::to_interleaved_i16_le(&decoded);
                if !pcm.is_empty() {
                    self.ready.push_back(OutputPoll::Ready(DecodedChunk {
                        pcm,
                        timestamp_us,
                        end_of_stream: false,
                    }));
                }
                Ok(())
            }
            Err(SymphoniaError::IoError(err)) => {
                self.skip_corrupt_packet(&err.to_string())
            }
            Err(SymphoniaError::DecodeError(err)) => self.skip_corrupt_packet(err),
            Err(SymphoniaError::ResetRequired) => {
                warn!("Decoder reset required");
                self.decoder.reset();
                Ok(())
            }
            Err(e) => {
                error!("Fatal decode error: {}", e);
                Err(LoopError::Decode(format!("Failed to decode packet: {}", e)))
            }
        }
    }

    fn skip_corrupt_packet(&mut self, reason: &str) -> Result<()> {
        self.consecutive_errors += 1;
        warn!(
            "Skipping corrupted packet (attempt {}/{}): {}",
            self.consecutive_errors, MAX_CONSECUTIVE_ERRORS, reason
        );

        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            error!("Too many consecutive decode errors, stream may be corrupted");
            return Err(LoopError::Decode(format!(
                "Decoder failure after {} failed packets: {}",
                MAX_CONSECUTIVE_ERRORS, reason
            )));
        }
        Ok(())
    }
}

impl CodecSession for SymphoniaCodec {
    fn dequeue_input(&mut self, _timeout: Duration) -> Option<InputSlot> {
        if self.end_of_stream_queued || self.ready.len() >= self.capacity {
            return None;
        }
        let slot = InputSlot(self.next_slot);
        self.next_slot = (self.next_slot + 1) % self.capacity;
        Some(slot)
    }

    fn queue_input(&mut self, _slot: InputSlot, unit: EncodedUnit) -> Result<()> {
        if self.end_of_stream_queued {
            return Err(LoopError::Decode(
                "input queued after end of stream".to_string(),
            ));
        }
        self.decode_unit(unit)
    }

    fn queue_end_of_stream(&mut self, _slot: InputSlot) -> Result<()> {
        if self.end_of_stream_queued {
            return Ok(());
        }
        self.end_of_stream_queued = true;
        self.decoder.finalize();
        self.ready.push_back(OutputPoll::Ready(DecodedChunk {
            end_of_stream: true,
            ..DecodedChunk::default()
        }));
        Ok(())
    }

    fn dequeue_output(&mut self, _timeout: Duration) -> Result<OutputPoll> {
        Ok(self.ready.pop_front().unwrap_or(OutputPoll::TryAgain))
    }
}
