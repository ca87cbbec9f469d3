//! Match resolution: from a match rule to the display containers it addresses.

pub mod derive;
/// Ordered container-resolution strategies.
pub mod strategy;

pub use derive::{derive_match_rule, taggable_target};
pub use strategy::{ResolveStrategy, Resolver};
