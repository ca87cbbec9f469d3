use std::fmt;
use std::time::Duration;

pub use kurbo::{Point, Rect, Size};

/// Opaque handle to a node in an externally owned rendering surface.
///
/// Handles are only meaningful for the surface that issued them and only while the node stays
/// mounted; the host may recycle a logical item into a different node at any time.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Virtual timestamp in milliseconds, supplied by the host event loop.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Millis(pub u64);

impl Millis {
    /// Timestamp `delay` after `self`, saturating.
    pub fn after(self, delay: Duration) -> Self {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(ms))
    }

    /// Elapsed time since `earlier` (zero when `earlier` is in the future).
    pub fn since(self, earlier: Millis) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

/// Sentinel customer label meaning "no filter".
pub const ALL_CUSTOMERS: &str = "ALL";

/// The process-wide filter selection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterTarget {
    /// No filter: the host's own layout is authoritative.
    #[default]
    All,
    /// Show only tiles tagged to this customer (plus untagged tiles).
    Customer(String),
}

impl FilterTarget {
    /// Parse a stored/broadcast label. Blank labels and `"ALL"` map to [`FilterTarget::All`].
    pub fn parse(label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() || label == ALL_CUSTOMERS {
            Self::All
        } else {
            Self::Customer(label.to_string())
        }
    }

    /// Return `true` when no filter is active.
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// The active customer, if any.
    pub fn customer(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Customer(c) => Some(c.as_str()),
        }
    }

    /// The label used in storage and on the message bus.
    pub fn as_label(&self) -> &str {
        match self {
            Self::All => ALL_CUSTOMERS,
            Self::Customer(c) => c.as_str(),
        }
    }
}

impl From<String> for FilterTarget {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<FilterTarget> for String {
    fn from(value: FilterTarget) -> Self {
        value.as_label().to_string()
    }
}

impl fmt::Display for FilterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

const PAGE_KEY_PREFIX: &str = "tilefilter_tags::";

/// Storage key scoping a tag set to a page identity (host plus logical route).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PageKey(String);

impl PageKey {
    /// Build a key from a host and a logical route.
    ///
    /// An empty route (or `/`) scopes the tags host-wide.
    pub fn new(host: &str, route: &str) -> Self {
        let host = host.trim().to_ascii_lowercase();
        let route = route.trim().trim_end_matches('/');
        if route.is_empty() {
            Self(format!("{PAGE_KEY_PREFIX}{host}"))
        } else if route.starts_with('/') {
            Self(format!("{PAGE_KEY_PREFIX}{host}{route}"))
        } else {
            Self(format!("{PAGE_KEY_PREFIX}{host}/{route}"))
        }
    }

    /// Wrap an already-formatted storage key.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The storage key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one rendering context (frame) on the message bus.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameId(pub u32);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame-{}", self.0)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
