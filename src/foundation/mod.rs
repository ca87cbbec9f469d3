//! Shared building blocks: identifiers, errors and options.

/// Core identifiers, timestamps and the filter/page-key value types.
pub mod core;
/// Error taxonomy and result alias.
pub mod error;
/// Host calibration options.
pub mod opts;
