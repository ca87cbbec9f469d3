//! Stabilization: deciding when an incrementally rendered collection is safe to reflow.

/// Per-group phase machine.
pub mod controller;
/// Self-write batches and their generation stamps.
pub mod guard;
/// Virtual-time timers.
pub mod timers;

pub use controller::{AttemptResult, Controller, Phase, Reconcile, Wake};
pub use guard::{SelfWrites, WriteBatch};
pub use timers::{TimerId, TimerQueue};
