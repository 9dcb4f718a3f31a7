//! # Clip Looper and Loop Session
//!
//! [`ClipLooper::prepare`] runs the whole pipeline for one request:
//!
//! ```text
//! ClipRequest → ClipDecoder → FadeProcessor → container cap → MemoryBudget → LoopResource
//! ```
//!
//! [`LoopSession`] is the holder the playback engine talks to: `prepare` when
//! the selection changes, `release` when it goes away, and `current` to hand
//! streams to the engine's I/O thread.

use crate::budget::MemoryBudget;
use crate::config::{DeliveryPreference, LoopConfig};
use crate::decoder::{ClipDecoder, DecodeReport, DecodedClip};
use crate::error::{LoopError, Result};
use crate::fade::{FadeProcessor, FadeReport};
use crate::stream::{LoopPlan, LoopResource, LoopStrategy, LoopStreamSource};
use crate::traits::{AudioFormat, ClipRequest};
use crate::wav;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// A decoded, faded and packaged clip ready to be streamed.
#[derive(Debug, Clone)]
pub struct PreparedClip {
    pub format: AudioFormat,
    pub plan: LoopPlan,
    pub resource: LoopResource,
    pub report: DecodeReport,
    pub fade: FadeReport,
}

impl PreparedClip {
    /// A fresh, closed stream over the shared resource.
    pub fn open_stream(&self) -> LoopStreamSource {
        LoopStreamSource::new(self.resource.clone())
    }

    /// Bytes a stream delivers, header included.
    pub fn total_len(&self) -> u64 {
        self.resource.total_len()
    }

    /// Length of one repetition.
    pub fn loop_duration(&self) -> Duration {
        self.format.bytes_to_duration(self.plan.single_loop_bytes)
    }

    /// Playing time of all repetitions.
    pub fn duration(&self) -> Duration {
        self.format.bytes_to_duration(self.plan.total_pcm_bytes())
    }
}

/// Turns clip requests into [`PreparedClip`]s.
#[derive(Debug, Clone)]
pub struct ClipLooper {
    config: LoopConfig,
    decoder: ClipDecoder,
    fades: FadeProcessor,
    budget: MemoryBudget,
}

impl ClipLooper {
    /// Build a looper, rejecting invalid configuration.
    pub fn new(config: LoopConfig) -> Result<Self> {
        config.validate().map_err(LoopError::Config)?;
        let budget = MemoryBudget::from_config(&config.budget);
        Ok(Self::with_budget(config, budget))
    }

    /// Build a looper against an explicit memory budget.
    pub fn with_budget(config: LoopConfig, budget: MemoryBudget) -> Self {
        Self {
            decoder: ClipDecoder::new(config.decode.clone()),
            fades: FadeProcessor::new(config.fade.clone()),
            budget,
            config,
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    /// Decode, fade and package `request`.
    #[instrument(
        skip(self, request),
        fields(
            source = %request.source.display(),
            start_ms = request.start_ms,
            end_ms = request.end_ms,
            loop_count = request.loop_count
        )
    )]
    pub fn prepare(&self, request: &ClipRequest) -> Result<PreparedClip> {
        request.validate()?;
        let clip = self
            .decoder
            .decode(&request.source, request.start_ms, request.end_ms)?;
        self.package(clip, request.loop_count)
    }

    /// Fade and package an already decoded clip.
    ///
    /// Fails with [`LoopError::InvalidStream`] when the clip is empty.
    pub fn package(&self, clip: DecodedClip, loop_count: u32) -> Result<PreparedClip> {
        if loop_count == 0 {
            return Err(LoopError::InvalidRequest(
                "loop_count must be at least 1".to_string(),
            ));
        }
        if clip.is_empty() {
            return Err(LoopError::InvalidStream(format!(
                "decoded clip is empty (landed at {:?} us, {} frames decoded)",
                clip.report.landed_us, clip.report.decoded_frames
            )));
        }

        let DecodedClip {
            mut pcm,
            format,
            report,
        } = clip;

        let fade = self.fades.apply(&mut pcm, format.sample_rate);
        if fade.was_clamped() {
            debug!(
                fade_frames = fade.fade_frames,
                requested_frames = fade.requested_frames,
                "Clip shorter than two fade windows"
            );
        }

        let single_loop_bytes = pcm.len() as u64;
        let loop_count = cap_for_container(single_loop_bytes, loop_count)?;
        let total_bytes = single_loop_bytes * loop_count as u64;
        let header = wav::build_header(
            single_loop_bytes,
            total_bytes,
            format.sample_rate,
            format.channels,
            format.bits_per_sample,
        )?;

        let strategy = self.choose_strategy(single_loop_bytes, loop_count);
        let pcm = pcm.freeze();
        let resource = match strategy {
            LoopStrategy::Virtual => LoopResource::virtual_loop(pcm, loop_count, Some(header)),
            LoopStrategy::Materialized => LoopResource::materialized(&pcm, loop_count, &header),
        };
        let plan = LoopPlan::new(single_loop_bytes, loop_count, strategy);

        info!(
            single_loop_bytes,
            loop_count,
            ?strategy,
            total_len = resource.total_len(),
            "Prepared looped clip"
        );

        Ok(PreparedClip {
            format,
            plan,
            resource,
            report,
            fade,
        })
    }

    fn choose_strategy(&self, single_loop_bytes: u64, loop_count: u32) -> LoopStrategy {
        match self.config.delivery {
            DeliveryPreference::Virtual => LoopStrategy::Virtual,
            DeliveryPreference::Materialized => {
                let verdict = self.budget.assess(single_loop_bytes, loop_count);
                if verdict.approved {
                    LoopStrategy::Materialized
                } else {
                    warn!(
                        estimate = verdict.estimate,
                        ceiling = verdict.ceiling,
                        "Materialized loop rejected by memory budget, serving virtually"
                    );
                    LoopStrategy::Virtual
                }
            }
        }
    }
}

/// Cap `loop_count` so the payload fits the 32-bit WAV size fields.
fn cap_for_container(single_loop_bytes: u64, loop_count: u32) -> Result<u32> {
    let max_loops = wav::max_loops_for_container(single_loop_bytes);
    if max_loops == 0 {
        return Err(LoopError::ContainerOverflow {
            data_bytes: single_loop_bytes,
        });
    }
    if loop_count > max_loops {
        warn!(
            requested = loop_count,
            capped = max_loops,
            single_loop_bytes,
            "Loop count exceeds WAV size limit, capping"
        );
        return Ok(max_loops);
    }
    Ok(loop_count)
}

/// Holds the clip currently offered to the playback engine.
#[derive(Debug)]
pub struct LoopSession {
    looper: ClipLooper,
    current: Mutex<Option<Arc<PreparedClip>>>,
}

impl LoopSession {
    pub fn new(looper: ClipLooper) -> Self {
        Self {
            looper,
            current: Mutex::new(None),
        }
    }

    pub fn looper(&self) -> &ClipLooper {
        &self.looper
    }

    /// Release the current clip and prepare `request` in its place.
    ///
    /// On failure no clip is held.
    pub fn prepare(&self, request: &ClipRequest) -> Result<Arc<PreparedClip>> {
        self.release();
        let prepared = Arc::new(self.looper.prepare(request)?);
        *self.current.lock() = Some(Arc::clone(&prepared));
        Ok(prepared)
    }

    /// Drop the current clip. Returns `false` if nothing was held.
    ///
    /// Streams already handed out keep their buffer alive until closed and dropped.
    pub fn release(&self) -> bool {
        let released = self.current.lock().take();
        if released.is_some() {
            debug!("Released prepared clip");
        }
        released.is_some()
    }

    pub fn current(&self) -> Option<Arc<PreparedClip>> {
        self.current.lock().clone()
    }

    /// A new stream over the current clip, if any.
    pub fn open_stream(&self) -> Option<LoopStreamSource> {
        self.current().map(|clip| clip.open_stream())
    }
}
