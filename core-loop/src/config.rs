//! # Loop Configuration
//!
//! Configuration types for clip decoding, loop-seam fades, memory budgeting and
//! delivery strategy selection.

use crate::error::{LoopError, Result};
use crate::fade::FadeCurve;
use crate::repeat::RepeatPolicy;
use crate::traits::SeekMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for [`ClipLooper`](crate::session::ClipLooper).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Loop-seam fade settings.
    #[serde(default)]
    pub fade: FadeConfig,

    /// Feed/drain decode loop settings.
    #[serde(default)]
    pub decode: DecodeConfig,

    /// Memory budget guard settings.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Preferred delivery strategy.
    ///
    /// `Materialized` is only used when the memory budget approves it.
    #[serde(default)]
    pub delivery: DeliveryPreference,

    /// Practice repeat policy used by [`ClipRequest::for_practice`](crate::ClipRequest::for_practice).
    #[serde(default)]
    pub repeat: RepeatPolicy,
}

impl LoopConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LoopError::Config(format!("Invalid loop configuration: {}", e)))?;
        config.validate().map_err(LoopError::Config)?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.fade.validate()?;
        self.decode.validate()?;
        self.budget.validate()?;
        self.repeat.validate()?;
        Ok(())
    }
}

// ============================================================================
// Fade
// ============================================================================

/// Settings for the boundary fade processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FadeConfig {
    /// Length of each fade window in milliseconds.
    ///
    /// Clamped at run time so a window never exceeds half the clip.
    ///
    /// Default: 10 ms.
    #[serde(default = "default_fade_duration_ms")]
    pub fade_duration_ms: f64,

    /// Envelope shape of both windows.
    ///
    /// Default: raised cosine.
    #[serde(default)]
    pub curve: FadeCurve,
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            fade_duration_ms: default_fade_duration_ms(),
            curve: FadeCurve::default(),
        }
    }
}

impl FadeConfig {
    /// Validate fade settings.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.fade_duration_ms.is_finite() || self.fade_duration_ms < 0.0 {
            return Err("fade_duration_ms must be a finite, non-negative number".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Decode
// ============================================================================

/// Settings for the clip decoder's feed/drain loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// How the demuxer lands relative to the requested start.
    ///
    /// Default: previous sync point, trimmed to the exact start afterwards.
    #[serde(default = "default_seek_mode")]
    pub seek_mode: SeekMode,

    /// Bounded wait used on every input and output poll.
    ///
    /// Default: 10 ms.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: Duration,

    /// Wall-clock ceiling for the whole feed/drain loop.
    ///
    /// Default: 30 seconds.
    #[serde(default = "default_decode_timeout")]
    pub decode_timeout: Duration,

    /// Consecutive polls without progress before the codec is declared stalled.
    ///
    /// Default: 500 (5 seconds at the default poll timeout).
    #[serde(default = "default_max_idle_polls")]
    pub max_idle_polls: u32,

    /// Number of input slots the codec session exposes.
    ///
    /// Default: 4.
    #[serde(default = "default_input_slots")]
    pub input_slots: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            seek_mode: default_seek_mode(),
            poll_timeout: default_poll_timeout(),
            decode_timeout: default_decode_timeout(),
            max_idle_polls: default_max_idle_polls(),
            input_slots: default_input_slots(),
        }
    }
}

impl DecodeConfig {
    /// Validate decode settings.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.poll_timeout.is_zero() {
            return Err("poll_timeout must be > 0".to_string());
        }
        if self.decode_timeout.is_zero() {
            return Err("decode_timeout must be > 0".to_string());
        }
        if self.max_idle_polls == 0 {
            return Err("max_idle_polls must be > 0".to_string());
        }
        if self.input_slots == 0 {
            return Err("input_slots must be > 0".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Budget / Delivery
// ============================================================================

/// Settings for the memory budget guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Fraction of the available memory a materialized loop may use.
    ///
    /// Default: 0.5.
    #[serde(default = "default_memory_fraction")]
    pub memory_fraction: f64,

    /// Override for the platform memory limit, in bytes.
    ///
    /// When unset the limit is read from the operating system.
    #[serde(default)]
    pub memory_limit_bytes: Option<u64>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            memory_fraction: default_memory_fraction(),
            memory_limit_bytes: None,
        }
    }
}

impl BudgetConfig {
    /// Validate budget settings.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.memory_fraction > 0.0 && self.memory_fraction <= 1.0) {
            return Err("memory_fraction must be in (0.0, 1.0]".to_string());
        }
        Ok(())
    }
}

/// Which delivery strategy the caller would like.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPreference {
    /// Serve one canonical buffer reread at wrapped offsets.
    #[default]
    Virtual,
    /// Serve one linear buffer holding every repetition.
    Materialized,
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_fade_duration_ms() -> f64 {
    10.0
}

fn default_seek_mode() -> SeekMode {
    SeekMode::PreviousSync
}

fn default_poll_timeout() -> Duration {
    Duration::from_millis(10)
}

fn default_decode_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_idle_polls() -> u32 {
    500
}

fn default_input_slots() -> usize {
    4
}

fn default_memory_fraction() -> f64 {
    0.5
}
