//! Per-context reconciliation sessions and the services they share.

/// Process-wide filter selection.
pub mod filter;
pub mod reconciler;
pub mod scenario;

pub use filter::FilterState;
pub use reconciler::{PumpReport, Reconciler, SharedServices};
pub use scenario::{Action, NodeReport, ReplayReport, Scenario, Step};
