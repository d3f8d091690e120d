//! Reconnect pacing policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how reconnect delays evolve (initial / max / ceiling + jitter)
//! - [`Backoff`]       running state machine with the single pending retry timer
//! - [`JitterPolicy`]  optional randomization of each delay
//!
//! ## Quick wiring
//! ```text
//! SupervisorConfig { backoff: BackoffPolicy, .. }
//!      └─► core::supervisor loop owns a Backoff:
//!           - reset() on client `ready`
//!           - schedule() on unexpected `disconnected`
//!           - elapsed() fires the reconnect attempt
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → initial=1s, max=30s, no ceiling, jitter=None.

mod backoff;
mod jitter;

pub use backoff::{Backoff, BackoffPolicy, BackoffStep};
pub use jitter::JitterPolicy;
