//! # Practice Repeat Policy
//!
//! Picks how many times a selected phrase is repeated when the user turns
//! looping on. Short phrases are repeated more so a practice session lasts
//! roughly the same wall-clock time regardless of the selection.

use serde::{Deserialize, Serialize};

/// Loop-count policy for practice sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatPolicy {
    /// Target total playing time in milliseconds.
    ///
    /// Default: 300 000 (5 minutes).
    #[serde(default = "default_target_total_ms")]
    pub target_total_ms: u64,

    /// Clips at or below this length are played once.
    ///
    /// Default: 200 ms.
    #[serde(default = "default_min_clip_ms")]
    pub min_clip_ms: u64,

    /// Clips at or above this length are played once.
    ///
    /// Default: 60 000 ms.
    #[serde(default = "default_max_clip_ms")]
    pub max_clip_ms: u64,

    /// Lower bound on the repeat count.
    #[serde(default = "default_min_repeats")]
    pub min_repeats: u32,

    /// Upper bound on the repeat count.
    #[serde(default = "default_max_repeats")]
    pub max_repeats: u32,
}

impl Default for RepeatPolicy {
    fn default() -> Self {
        Self {
            target_total_ms: default_target_total_ms(),
            min_clip_ms: default_min_clip_ms(),
            max_clip_ms: default_max_clip_ms(),
            min_repeats: default_min_repeats(),
            max_repeats: default_max_repeats(),
        }
    }
}

impl RepeatPolicy {
    /// Repeat count for a clip of `duration_ms`, or `None` if the clip is not loopable.
    pub fn repeats_for(&self, duration_ms: u64) -> Option<u32> {
        if duration_ms <= self.min_clip_ms || duration_ms >= self.max_clip_ms {
            return None;
        }

        let repeats = self.target_total_ms.div_ceil(duration_ms);
        let repeats = repeats.min(self.max_repeats as u64) as u32;
        Some(repeats.max(self.min_repeats))
    }

    /// Validate policy bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_repeats == 0 {
            return Err("min_repeats must be >= 1".to_string());
        }
        if self.min_repeats > self.max_repeats {
            return Err("min_repeats cannot exceed max_repeats".to_string());
        }
        if self.min_clip_ms >= self.max_clip_ms {
            return Err("min_clip_ms must be below max_clip_ms".to_string());
        }
        Ok(())
    }
}

fn default_target_total_ms() -> u64 {
    300_000
}

fn default_min_clip_ms() -> u64 {
    200
}

fn default_max_clip_ms() -> u64 {
    60_000
}

fn default_min_repeats() -> u32 {
    2
}

fn default_max_repeats() -> u32 {
    20
}
