//! # Memory Budget Guard
//!
//! Advisory check on how much memory a materialized loop would need. A
//! rejection never fails a request: the caller falls back to the virtual
//! strategy or trims the loop count.

use crate::config::BudgetConfig;
use tracing::{debug, warn};

/// Limit assumed when the platform does not report available memory (1 GiB).
pub const DEFAULT_MEMORY_LIMIT: u64 = 1024 * 1024 * 1024;

/// Outcome of a budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetVerdict {
    /// Bytes the request would need.
    pub estimate: u64,
    /// Largest estimate that is still accepted (exclusive).
    pub ceiling: u64,
    pub approved: bool,
}

/// Compares loop memory estimates against a fraction of available memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryBudget {
    limit_bytes: u64,
    fraction: f64,
}

impl MemoryBudget {
    /// Budget against an explicit limit.
    pub fn new(limit_bytes: u64, fraction: f64) -> Self {
        Self {
            limit_bytes,
            fraction: fraction.clamp(0.0, 1.0),
        }
    }

    /// Budget from configuration, probing the platform when no limit is set.
    pub fn from_config(config: &BudgetConfig) -> Self {
        let limit_bytes = match config.memory_limit_bytes {
            Some(limit) => limit,
            None => available_memory().unwrap_or_else(|| {
                warn!(
                    default = DEFAULT_MEMORY_LIMIT,
                    "Available memory unknown, using default limit"
                );
                DEFAULT_MEMORY_LIMIT
            }),
        };
        Self::new(limit_bytes, config.memory_fraction)
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Bytes needed for `loop_count` copies of `bytes_per_loop`.
    pub fn estimate(bytes_per_loop: u64, loop_count: u32) -> u64 {
        bytes_per_loop.saturating_mul(loop_count as u64)
    }

    /// Estimates must stay strictly below this.
    pub fn ceiling(&self) -> u64 {
        (self.limit_bytes as f64 * self.fraction) as u64
    }

    pub fn is_acceptable(&self, bytes_per_loop: u64, loop_count: u32) -> bool {
        Self::estimate(bytes_per_loop, loop_count) < self.ceiling()
    }

    /// Check a request and log the outcome.
    pub fn assess(&self, bytes_per_loop: u64, loop_count: u32) -> BudgetVerdict {
        let estimate = Self::estimate(bytes_per_loop, loop_count);
        let ceiling = self.ceiling();
        let approved = estimate < ceiling;

        if approved {
            debug!(estimate, ceiling, "Loop fits the memory budget");
        } else {
            warn!(
                estimate,
                ceiling,
                limit = self.limit_bytes,
                "Loop exceeds the memory budget"
            );
        }

        BudgetVerdict {
            estimate,
            ceiling,
            approved,
        }
    }

    /// Largest loop count that would still be accepted. Zero if not even one fits.
    pub fn max_loops(&self, bytes_per_loop: u64) -> u32 {
        let ceiling = self.ceiling();
        if bytes_per_loop == 0 {
            return u32::MAX;
        }
        if ceiling == 0 {
            return 0;
        }
        ((ceiling - 1) / bytes_per_loop).min(u32::MAX as u64) as u32
    }
}

/// Memory currently available to new allocations, if the platform reports it.
#[cfg(target_os = "linux")]
pub fn available_memory() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo(&meminfo)
}

/// Memory currently available to new allocations, if the platform reports it.
#[cfg(not(target_os = "linux"))]
pub fn available_memory() -> Option<u64> {
    None
}

/// Extract `MemAvailable` (in kB) from `/proc/meminfo` contents, as bytes.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo(contents: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
        Some(kb.saturating_mul(1024))
    })
}
