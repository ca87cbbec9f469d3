//! Persistence: the key-value boundary, the tag store adapter and user preferences.

/// Externally owned key-value store boundary.
pub mod kv;
pub mod prefs;
pub mod tags;
