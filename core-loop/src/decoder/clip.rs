//! # Clip Decoder
//!
//! Decodes exactly `[start_ms, end_ms)` of a compressed track into 16-bit PCM.
//!
//! ## Algorithm
//!
//! 1. Seek the demuxer near the start. Sync points only exist at keyframes, so
//!    the landing position is rarely the requested one.
//! 2. With [`SeekMode::ClosestSync`], units before the start are skipped. With
//!    [`SeekMode::PreviousSync`], decoding begins early and the negative offset
//!    is carried to the trim step.
//! 3. Feed/drain: feed units while slots are free and the next unit starts
//!    before the end, then signal end-of-stream; drain ready PCM into one
//!    buffer. Every poll is bounded, and a codec that stops making progress
//!    surfaces as [`LoopError::DecodeTimeout`].
//! 4. Trim the buffer to the frames whose timestamps fall inside the request,
//!    measured from where decoding actually started.

use crate::config::DecodeConfig;
use crate::decoder::symphonia::SymphoniaDemuxer;
use crate::error::{LoopError, Result};
use crate::pcm::PcmBuffer;
use crate::traits::{AudioFormat, CodecSession, Demuxer, OutputPoll, SeekMode};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, instrument, warn};

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Seek correction and sizes of one decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// Timestamp of the first unit fed to the codec, if any
    pub landed_us: Option<i64>,
    /// `decoded_start - requested_start`; negative when decoding began early
    pub start_offset_us: i64,
    /// Units dropped while advancing to the start
    pub skipped_units: u32,
    /// Frames drained from the codec before trimming
    pub decoded_frames: u64,
    /// Frames kept after trimming
    pub trimmed_frames: u64,
    /// First decoded frame that was kept
    pub trim_start_frame: u64,
}

/// Output of [`ClipDecoder::decode`].
#[derive(Debug, Clone)]
pub struct DecodedClip {
    /// Interleaved 16-bit PCM covering the requested window
    pub pcm: PcmBuffer,
    /// Sample rate and channel count of `pcm`
    pub format: AudioFormat,
    /// Seek and trim details for this decode
    pub report: DecodeReport,
}

impl DecodedClip {
    /// Returns `true` if trimming left no audio.
    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    /// Playback length of the trimmed PCM.
    pub fn duration(&self) -> std::time::Duration {
        self.format.frames_to_duration(self.pcm.frames() as u64)
    }
}

/// Frame-accurate range decoder.
#[derive(Debug, Clone, Default)]
pub struct ClipDecoder {
    config: DecodeConfig,
}

impl ClipDecoder {
    pub fn new(config: DecodeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Decode `[start_ms, end_ms)` of the file at `path`.
    ///
    /// The container is opened, decoded and released within this call.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn decode(&self, path: &Path, start_ms: u64, end_ms: u64) -> Result<DecodedClip> {
        check_range(start_ms, end_ms)?;

        let mut demuxer = SymphoniaDemuxer::open(path)?;
        let mut codec = demuxer.make_codec(self.config.input_slots)?;
        self.decode_with(&mut demuxer, &mut codec, start_ms, end_ms)
    }

    /// Decode `[start_ms, end_ms)` through an arbitrary demuxer and codec.
    pub fn decode_with<D, C>(
        &self,
        demuxer: &mut D,
        codec: &mut C,
        start_ms: u64,
        end_ms: u64,
    ) -> Result<DecodedClip>
    where
        D: Demuxer + ?Sized,
        C: CodecSession + ?Sized,
    {
        check_range(start_ms, end_ms)?;

        let mut format = demuxer.format();
        format.validate()?;

        let start_us = ms_to_us(start_ms);
        let end_us = ms_to_us(end_ms);

        // 1-2. Position on the first unit to decode.
        demuxer.seek(start_us, self.config.seek_mode)?;
        let mut skipped_units = 0u32;
        if self.config.seek_mode == SeekMode::ClosestSync {
            while let Some(unit_us) = demuxer.unit_time_us() {
                if unit_us >= start_us {
                    break;
                }
                skipped_units += 1;
                if !demuxer.skip_unit()? {
                    break;
                }
            }
        }
        let landed_us = demuxer.unit_time_us();
        debug!(start_us, ?landed_us, skipped_units, "Seek landed");

        // 3. Feed/drain until the codec reports end-of-stream.
        let mut pcm = Vec::new();
        let mut first_chunk_us: Option<i64> = None;
        let mut input_done = false;
        let mut idle_polls = 0u32;
        let poll = self.config.poll_timeout;
        let started = Instant::now();

        loop {
            let mut progressed = false;

            if !input_done {
                if let Some(slot) = codec.dequeue_input(poll) {
                    progressed = true;
                    let next = match demuxer.unit_time_us() {
                        Some(unit_us) if unit_us < end_us => demuxer.next_unit()?,
                        _ => None,
                    };
                    match next {
                        Some(unit) => codec.queue_input(slot, unit)?,
                        None => {
                            codec.queue_end_of_stream(slot)?;
                            input_done = true;
                            debug!(
                                next_unit_us = ?demuxer.unit_time_us(),
                                "Queued end of stream"
                            );
                        }
                    }
                }
            }

            match codec.dequeue_output(poll)? {
                OutputPoll::Ready(chunk) => {
                    progressed = true;
                    if !chunk.pcm.is_empty() {
                        let frame_size = format.frame_size();
                        if chunk.pcm.len() % frame_size != 0 {
                            return Err(LoopError::Decode(format!(
                                "codec produced {} bytes, not a multiple of the {}-byte frame",
                                chunk.pcm.len(),
                                frame_size
                            )));
                        }
                        first_chunk_us.get_or_insert(chunk.timestamp_us);
                        pcm.extend_from_slice(&chunk.pcm);
                    }
                    if chunk.end_of_stream {
                        debug!(bytes = pcm.len(), "Codec reached end of stream");
                        break;
                    }
                }
                OutputPoll::FormatChanged(new_format) => {
                    progressed = true;
                    format = adopt_format(format, new_format, pcm.is_empty())?;
                }
                OutputPoll::TryAgain => {}
            }

            if progressed {
                idle_polls = 0;
            } else {
                idle_polls += 1;
            }

            let elapsed = started.elapsed();
            if idle_polls >= self.config.max_idle_polls || elapsed >= self.config.decode_timeout {
                warn!(?elapsed, idle_polls, "Codec stalled before end of stream");
                return Err(LoopError::DecodeTimeout {
                    elapsed,
                    idle_polls,
                });
            }
        }

        // 4. Trim to the requested window.
        let mut pcm = PcmBuffer::new(pcm, format.channels)?;
        let decoded_frames = pcm.frames() as u64;
        let decoded_start_us = first_chunk_us.or(landed_us).unwrap_or(start_us);
        let (start_frame, end_frame) = trim_window(
            start_us.saturating_sub(decoded_start_us),
            end_us.saturating_sub(decoded_start_us),
            format.sample_rate,
            pcm.frames(),
        );
        pcm.retain_frames(start_frame, end_frame);

        let report = DecodeReport {
            landed_us,
            start_offset_us: decoded_start_us.saturating_sub(start_us),
            skipped_units,
            decoded_frames,
            trimmed_frames: pcm.frames() as u64,
            trim_start_frame: start_frame as u64,
        };

        if pcm.is_empty() {
            warn!(start_ms, end_ms, decoded_frames, "Clip is empty after trimming");
        } else {
            debug!(
                start_offset_us = report.start_offset_us,
                decoded_frames,
                start_frame,
                end_frame,
                "Trimmed clip"
            );
        }

        Ok(DecodedClip {
            pcm,
            format,
            report,
        })
    }
}

fn check_range(start_ms: u64, end_ms: u64) -> Result<()> {
    if end_ms <= start_ms {
        return Err(LoopError::InvalidRequest(format!(
            "end_ms ({}) must be greater than start_ms ({})",
            end_ms, start_ms
        )));
    }
    Ok(())
}

/// Milliseconds past the `i64` microsecond range saturate, so an oversized
/// end reads to the end of the track.
fn ms_to_us(ms: u64) -> i64 {
    i64::try_from(ms)
        .ok()
        .and_then(|ms| ms.checked_mul(1000))
        .unwrap_or(i64::MAX)
}

/// Apply a codec-reported format change.
///
/// A change after PCM was accumulated cannot be reconciled with one buffer.
fn adopt_format(current: AudioFormat, reported: AudioFormat, nothing_decoded: bool) -> Result<AudioFormat> {
    let changed =
        reported.sample_rate != current.sample_rate || reported.channels != current.channels;
    if !changed {
        return Ok(current);
    }
    if !nothing_decoded {
        return Err(LoopError::Decode(format!(
            "output format changed mid-clip ({} Hz / {} ch -> {} Hz / {} ch)",
            current.sample_rate, current.channels, reported.sample_rate, reported.channels
        )));
    }

    debug!(
        sample_rate = reported.sample_rate,
        channels = reported.channels,
        "Codec reported output format"
    );
    let updated = AudioFormat::new(current.codec, reported.sample_rate, reported.channels);
    updated.validate()?;
    Ok(updated)
}

/// Frame range `[start, end)` of the frames whose timestamps fall inside the
/// window, given offsets in microseconds from the first decoded frame.
fn trim_window(start_offset_us: i64, end_offset_us: i64, sample_rate: u32, total_frames: usize) -> (usize, usize) {
    let rate = sample_rate as i64;
    let to_frame = |offset_us: i64| -> usize {
        let frame = div_ceil(offset_us.saturating_mul(rate), MICROS_PER_SECOND);
        frame.clamp(0, total_frames as i64) as usize
    };

    let start = to_frame(start_offset_us);
    let end = to_frame(end_offset_us).max(start);
    (start, end)
}

fn div_ceil(numerator: i64, denominator: i64) -> i64 {
    -(numerator.saturating_neg().div_euclid(denominator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{
        AudioCodec, DecodedChunk, EncodedUnit, InputSlot, MockCodecSession, MockDemuxer,
    };
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    // 1 kHz mono, so one frame per millisecond.
    const RATE: u32 = 1000;
    const UNIT_FRAMES: u64 = 10;
    const KEYFRAME_MS: i64 = 50;

    /// Demuxer over a ramp where sample `n` has value `n`.
    struct RampDemuxer {
        total_frames: u64,
        next_frame: Option<u64>,
    }

    impl RampDemuxer {
        fn new(total_frames: u64) -> Self {
            Self {
                total_frames,
                next_frame: Some(0),
            }
        }

        fn unit_at(&self, frame: u64) -> EncodedUnit {
            let end = (frame + UNIT_FRAMES).min(self.total_frames);
            let data: Vec<u8> = (frame..end)
                .flat_map(|n| (n as i16).to_le_bytes())
                .collect();
            EncodedUnit {
                ts: frame,
                dur: end - frame,
                timestamp_us: frame as i64 * 1000,
                data: data.into_boxed_slice(),
            }
        }
    }

    impl Demuxer for RampDemuxer {
        fn format(&self) -> AudioFormat {
            AudioFormat::new(AudioCodec::Aac, RATE, 1)
        }

        fn seek(&mut self, position_us: i64, mode: SeekMode) -> Result<()> {
            let position_ms = position_us / 1000;
            let keyframe = match mode {
                SeekMode::PreviousSync => position_ms / KEYFRAME_MS * KEYFRAME_MS,
                SeekMode::ClosestSync => {
                    (position_ms + KEYFRAME_MS / 2) / KEYFRAME_MS * KEYFRAME_MS
                }
            };
            let keyframe = keyframe as u64;
            self.next_frame = (keyframe < self.total_frames).then_some(keyframe);
            Ok(())
        }

        fn unit_time_us(&self) -> Option<i64> {
            self.next_frame.map(|frame| frame as i64 * 1000)
        }

        fn next_unit(&mut self) -> Result<Option<EncodedUnit>> {
            let Some(frame) = self.next_frame else {
                return Ok(None);
            };
            let unit = self.unit_at(frame);
            self.skip_unit()?;
            Ok(Some(unit))
        }

        fn skip_unit(&mut self) -> Result<bool> {
            self.next_frame = self
                .next_frame
                .map(|frame| frame + UNIT_FRAMES)
                .filter(|frame| *frame < self.total_frames);
            Ok(self.next_frame.is_some())
        }
    }

    /// Codec that hands every unit's payload straight back as PCM.
    fn echo_codec() -> MockCodecSession {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let mut codec = MockCodecSession::new();

        codec
            .expect_dequeue_input()
            .returning(|_| Some(InputSlot(0)));

        let q = queue.clone();
        codec.expect_queue_input().returning(move |_, unit| {
            q.lock().push_back(OutputPoll::Ready(DecodedChunk {
                pcm: unit.data.to_vec(),
                timestamp_us: unit.timestamp_us,
                end_of_stream: false,
            }));
            Ok(())
        });

        let q = queue.clone();
        codec
            .expect_queue_end_of_stream()
            .times(1)
            .returning(move |_| {
                q.lock().push_back(OutputPoll::Ready(DecodedChunk {
                    end_of_stream: true,
                    ..DecodedChunk::default()
                }));
                Ok(())
            });

        codec
            .expect_dequeue_output()
            .returning(move |_| Ok(queue.lock().pop_front().unwrap_or(OutputPoll::TryAgain)));

        codec
    }

    fn decoder(seek_mode: SeekMode) -> ClipDecoder {
        ClipDecoder::new(DecodeConfig {
            seek_mode,
            ..DecodeConfig::default()
        })
    }

    fn values(clip: &DecodedClip) -> Vec<i16> {
        (0..clip.pcm.frames())
            .map(|f| clip.pcm.sample(f, 0).unwrap())
            .collect()
    }

    #[test]
    fn previous_sync_trims_negative_offset() {
        let mut demuxer = RampDemuxer::new(1000);
        let mut codec = echo_codec();

        let clip = decoder(SeekMode::PreviousSync)
            .decode_with(&mut demuxer, &mut codec, 123, 257)
            .unwrap();

        assert_eq!(clip.report.landed_us, Some(100_000));
        assert_eq!(clip.report.start_offset_us, -23_000);
        assert_eq!(clip.report.skipped_units, 0);
        // Units 100..260 were decoded.
        assert_eq!(clip.report.decoded_frames, 160);
        assert_eq!(clip.report.trim_start_frame, 23);

        let v = values(&clip);
        assert_eq!(v.len(), 134);
        assert_eq!(v[0], 123);
        assert_eq!(*v.last().unwrap(), 256);
    }

    #[test]
    fn closest_sync_skips_units_before_start() {
        let mut demuxer = RampDemuxer::new(1000);
        let mut codec = echo_codec();

        // Nearest keyframe to 110 ms is 100 ms; one unit is skipped.
        let clip = decoder(SeekMode::ClosestSync)
            .decode_with(&mut demuxer, &mut codec, 110, 140)
            .unwrap();

        assert_eq!(clip.report.skipped_units, 1);
        assert_eq!(clip.report.landed_us, Some(110_000));
        assert_eq!(clip.report.start_offset_us, 0);
        assert_eq!(values(&clip), (110..140).collect::<Vec<i16>>());
    }

    #[test]
    fn closest_sync_after_start_keeps_positive_offset() {
        let mut demuxer = RampDemuxer::new(1000);
        let mut codec = echo_codec();

        // Nearest keyframe to 130 ms is 150 ms, past the start.
        let clip = decoder(SeekMode::ClosestSync)
            .decode_with(&mut demuxer, &mut codec, 130, 200)
            .unwrap();

        assert_eq!(clip.report.start_offset_us, 20_000);
        assert_eq!(clip.report.trim_start_frame, 0);
        let v = values(&clip);
        assert_eq!(v.len(), 50);
        assert_eq!(v[0], 150);
    }

    #[test]
    fn end_of_input_finishes_the_clip() {
        let mut demuxer = RampDemuxer::new(1000);
        let mut codec = echo_codec();

        let clip = decoder(SeekMode::PreviousSync)
            .decode_with(&mut demuxer, &mut codec, 900, 5000)
            .unwrap();

        let v = values(&clip);
        assert_eq!(v.len(), 100);
        assert_eq!(v[0], 900);
        assert_eq!(v[99], 999);
    }

    #[test]
    fn start_past_end_yields_empty_clip() {
        let mut demuxer = RampDemuxer::new(1000);
        let mut codec = echo_codec();

        let clip = decoder(SeekMode::PreviousSync)
            .decode_with(&mut demuxer, &mut codec, 2000, 3000)
            .unwrap();

        assert!(clip.is_empty());
        assert_eq!(clip.report.landed_us, None);
        assert_eq!(clip.report.decoded_frames, 0);
    }

    #[test]
    fn unbounded_end_reads_to_end_of_track() {
        let mut demuxer = RampDemuxer::new(1000);
        let mut codec = echo_codec();

        let clip = decoder(SeekMode::PreviousSync)
            .decode_with(&mut demuxer, &mut codec, 0, u64::MAX)
            .unwrap();

        assert_eq!(clip.pcm.frames(), 1000);
        assert_eq!(values(&clip), (0..1000).collect::<Vec<i16>>());
        assert_eq!(clip.report.start_offset_us, 0);
    }

    #[test]
    fn repeated_decodes_are_identical() {
        let run = || {
            let mut demuxer = RampDemuxer::new(1000);
            let mut codec = echo_codec();
            decoder(SeekMode::PreviousSync)
                .decode_with(&mut demuxer, &mut codec, 333, 777)
                .unwrap()
        };
        assert_eq!(run().pcm, run().pcm);
    }

    #[test]
    fn stalled_codec_times_out() {
        let mut demuxer = RampDemuxer::new(1000);
        let mut codec = MockCodecSession::new();
        codec.expect_dequeue_input().returning(|_| None);
        codec
            .expect_dequeue_output()
            .returning(|_| Ok(OutputPoll::TryAgain));

        let decoder = ClipDecoder::new(DecodeConfig {
            max_idle_polls: 5,
            ..DecodeConfig::default()
        });
        let err = decoder
            .decode_with(&mut demuxer, &mut codec, 0, 100)
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(matches!(err, LoopError::DecodeTimeout { idle_polls: 5, .. }));
    }

    #[test]
    fn missing_end_of_stream_hits_wall_clock_limit() {
        let mut demuxer = RampDemuxer::new(1000);
        let mut codec = MockCodecSession::new();
        codec
            .expect_dequeue_input()
            .returning(|_| Some(InputSlot(0)));
        codec.expect_queue_input().returning(|_, _| Ok(()));
        codec.expect_queue_end_of_stream().returning(|_| Ok(()));
        codec
            .expect_dequeue_output()
            .returning(|_| Ok(OutputPoll::TryAgain));

        let decoder = ClipDecoder::new(DecodeConfig {
            max_idle_polls: u32::MAX,
            decode_timeout: Duration::from_millis(20),
            ..DecodeConfig::default()
        });
        let err = decoder
            .decode_with(&mut demuxer, &mut codec, 0, 100)
            .unwrap_err();

        match err {
            LoopError::DecodeTimeout { elapsed, .. } => {
                assert!(elapsed >= Duration::from_millis(20))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn format_change_before_output_is_adopted() {
        let mut demuxer = RampDemuxer::new(1000);
        let mut codec = MockCodecSession::new();
        let mut sent = false;

        codec.expect_dequeue_input().returning(|_| None);
        codec.expect_dequeue_output().returning(move |_| {
            if !sent {
                sent = true;
                return Ok(OutputPoll::FormatChanged(AudioFormat::new(
                    AudioCodec::Unknown,
                    2000,
                    2,
                )));
            }
            Ok(OutputPoll::Ready(DecodedChunk {
                pcm: vec![0; 400],
                timestamp_us: 0,
                end_of_stream: true,
            }))
        });

        let clip = decoder(SeekMode::PreviousSync)
            .decode_with(&mut demuxer, &mut codec, 0, 1000)
            .unwrap();

        assert_eq!(clip.format.sample_rate, 2000);
        assert_eq!(clip.format.channels, 2);
        // Source codec identity is kept.
        assert_eq!(clip.format.codec, AudioCodec::Aac);
        assert_eq!(clip.pcm.frames(), 100);
    }

    #[test]
    fn format_change_mid_clip_is_rejected() {
        let mut demuxer = RampDemuxer::new(1000);
        let mut codec = MockCodecSession::new();

        let mut polls = 0;
        codec.expect_dequeue_input().returning(|_| None);
        codec.expect_dequeue_output().returning(move |_| {
            polls += 1;
            if polls == 1 {
                Ok(OutputPoll::Ready(DecodedChunk {
                    pcm: vec![0; 20],
                    timestamp_us: 0,
                    end_of_stream: false,
                }))
            } else {
                Ok(OutputPoll::FormatChanged(AudioFormat::new(
                    AudioCodec::Aac,
                    RATE,
                    2,
                )))
            }
        });

        let err = decoder(SeekMode::PreviousSync)
            .decode_with(&mut demuxer, &mut codec, 0, 100)
            .unwrap_err();
        assert!(matches!(err, LoopError::Decode(_)));
    }

    #[test]
    fn partial_frames_are_rejected() {
        let mut demuxer = MockDemuxer::new();
        demuxer
            .expect_format()
            .return_const(AudioFormat::new(AudioCodec::Mp3, 44100, 2));
        demuxer.expect_seek().returning(|_, _| Ok(()));
        demuxer.expect_unit_time_us().return_const(None);

        let mut codec = MockCodecSession::new();
        codec.expect_dequeue_input().returning(|_| None);
        codec.expect_dequeue_output().returning(|_| {
            Ok(OutputPoll::Ready(DecodedChunk {
                pcm: vec![0; 6],
                timestamp_us: 0,
                end_of_stream: true,
            }))
        });

        let err = decoder(SeekMode::PreviousSync)
            .decode_with(&mut demuxer, &mut codec, 0, 100)
            .unwrap_err();
        assert!(matches!(err, LoopError::Decode(_)));
    }

    #[test]
    fn seek_failure_propagates() {
        let mut demuxer = MockDemuxer::new();
        demuxer
            .expect_format()
            .return_const(AudioFormat::cd_quality());
        demuxer
            .expect_seek()
            .returning(|_, _| Err(LoopError::Decode("unseekable".to_string())));
        let mut codec = MockCodecSession::new();

        let err = decoder(SeekMode::PreviousSync)
            .decode_with(&mut demuxer, &mut codec, 0, 100)
            .unwrap_err();
        assert!(matches!(err, LoopError::Decode(_)));
    }

    #[test]
    fn invalid_range_is_rejected_before_touching_the_demuxer() {
        let mut demuxer = MockDemuxer::new();
        let mut codec = MockCodecSession::new();

        let err = ClipDecoder::default()
            .decode_with(&mut demuxer, &mut codec, 500, 500)
            .unwrap_err();
        assert!(matches!(err, LoopError::InvalidRequest(_)));
    }

    #[test]
    fn trim_window_rounding() {
        // 5 ms at 44.1 kHz from a start 0: frames [0, 221)
        assert_eq!(trim_window(0, 5_000, 44100, 10_000), (0, 221));
        // Negative offsets clamp to the first frame.
        assert_eq!(trim_window(-20_000, 10_000, 44100, 10_000), (0, 441));
        // Reversed or out-of-range windows collapse.
        assert_eq!(trim_window(50_000, 10_000, 1000, 100), (50, 50));
        assert_eq!(trim_window(200_000, 300_000, 1000, 100), (100, 100));
        assert_eq!(div_ceil(-5, 2), -2);
        assert_eq!(div_ceil(5, 2), 3);
    }

    #[test]
    fn millisecond_conversion_saturates() {
        assert_eq!(ms_to_us(0), 0);
        assert_eq!(ms_to_us(1_500), 1_500_000);
        assert_eq!(ms_to_us(i64::MAX as u64 / 1000), i64::MAX / 1000 * 1000);
        assert_eq!(ms_to_us(i64::MAX as u64 / 1000 + 1), i64::MAX);
        assert_eq!(ms_to_us(u64::MAX), i64::MAX);
        assert_eq!(trim_window(0, i64::MAX, 44100, 10_000), (0, 10_000));
    }
}
