//! Workspace umbrella crate.
//!
//! This crate exposes feature flags that map to the individual workspace crates
//! (`core-loop`, `core-runtime`). Host applications can depend on
//! `tunas-workspace` and enable the documented features without wiring each
//! crate individually.

#[cfg(feature = "loop-core")]
pub use core_loop;

#[cfg(feature = "runtime")]
pub use core_runtime;
