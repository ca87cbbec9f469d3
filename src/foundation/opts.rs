use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use crate::foundation::error::{TileError, TileResult};
use crate::surface::rule::MatchRule;

/// Every host-specific calibration knob of the reconciler.
///
/// The defaults are tuned against one particular host renderer; none of them is a general truth
/// about virtualized layouts, so a deployment targeting another host should load its own values.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcilerOpts {
    /// Geometry inference and reflow constants.
    pub geometry: GeometryOpts,
    /// Stabilization thresholds and timers.
    pub stabilize: StabilizeOpts,
    /// Display-container resolution rules.
    pub resolve: ResolveOpts,
    /// The virtualized collections the host renders.
    pub collections: Vec<CollectionProfile>,
}

impl Default for ReconcilerOpts {
    fn default() -> Self {
        Self {
            geometry: GeometryOpts::default(),
            stabilize: StabilizeOpts::default(),
            resolve: ResolveOpts::default(),
            collections: vec![
                CollectionProfile {
                    name: "card-grid".to_string(),
                    kind: CollectionKind::Grid,
                    root: "[role=\"grid\"]".to_string(),
                    item: "article".to_string(),
                    expected_count_attr: None,
                },
                CollectionProfile {
                    name: "listbox".to_string(),
                    kind: CollectionKind::List,
                    root: "[role=\"listbox\"]".to_string(),
                    item: "[role=\"option\"]".to_string(),
                    expected_count_attr: Some("aria-setsize".to_string()),
                },
            ],
        }
    }
}

impl ReconcilerOpts {
    /// Parse options from a JSON reader. Missing fields take their defaults.
    pub fn from_reader<R: std::io::Read>(r: R) -> TileResult<Self> {
        let opts: Self = serde_json::from_reader(r)
            .map_err(|e| TileError::config(format!("parse reconciler options JSON: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    /// Parse options from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> TileResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            TileError::config(format!("open options JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> TileResult<()> {
        self.geometry.validate()?;
        self.stabilize.validate()?;
        self.resolve.validate()?;
        for profile in &self.collections {
            if profile.name.trim().is_empty() {
                return Err(TileError::config("collection name must be non-empty"));
            }
            MatchRule::parse(&profile.root).map_err(|e| {
                TileError::config(format!("collection '{}' root: {e}", profile.name))
            })?;
            MatchRule::parse(&profile.item).map_err(|e| {
                TileError::config(format!("collection '{}' item: {e}", profile.name))
            })?;
        }
        Ok(())
    }
}

/// Geometry inference and reflow constants.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeometryOpts {
    /// Vertical tolerance for "same row" and minimum row delta.
    pub row_noise_px: f64,
    /// Gap added to an item's size when a pitch cannot be measured.
    pub fallback_gap_px: f64,
    /// Coordinate used to park suppressed containers (both axes).
    pub offscreen_px: f64,
    /// Row height assumed for list items that report no height.
    pub list_item_height_px: f64,
    /// Extra height granted to list parents so the host does not evict tail items.
    pub list_safety_buffer_px: f64,
}

impl Default for GeometryOpts {
    fn default() -> Self {
        Self {
            row_noise_px: 10.0,
            fallback_gap_px: 24.0,
            offscreen_px: -9999.0,
            list_item_height_px: 32.0,
            list_safety_buffer_px: 24.0,
        }
    }
}

impl GeometryOpts {
    fn validate(&self) -> TileResult<()> {
        let finite = [
            self.row_noise_px,
            self.fallback_gap_px,
            self.offscreen_px,
            self.list_item_height_px,
            self.list_safety_buffer_px,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(TileError::config("geometry values must be finite"));
        }
        if self.row_noise_px < 0.0 || self.fallback_gap_px < 0.0 || self.list_safety_buffer_px < 0.0
        {
            return Err(TileError::config("geometry tolerances must be >= 0"));
        }
        if self.offscreen_px >= 0.0 {
            return Err(TileError::config("offscreen_px must be negative"));
        }
        if self.list_item_height_px <= 0.0 {
            return Err(TileError::config("list_item_height_px must be > 0"));
        }
        Ok(())
    }
}

/// Stabilization thresholds and timers.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StabilizeOpts {
    /// Unchanged-count notifications required before reconciling.
    pub stable_threshold: u32,
    /// Reconcile attempts before settling with whatever is mounted.
    pub max_attempts: u32,
    /// Linear backoff step: attempt `n` waits `n * retry_step_ms`.
    pub retry_step_ms: u64,
    /// Reconcile anyway when no further notification arrives within this window.
    pub observe_fallback_ms: u64,
    /// Quiet period after a reflow before the group may observe again.
    pub settle_grace_ms: u64,
}

impl Default for StabilizeOpts {
    fn default() -> Self {
        Self {
            stable_threshold: 2,
            max_attempts: 5,
            retry_step_ms: 200,
            observe_fallback_ms: 1500,
            settle_grace_ms: 1000,
        }
    }
}

impl StabilizeOpts {
    fn validate(&self) -> TileResult<()> {
        if self.stable_threshold == 0 {
            return Err(TileError::config("stable_threshold must be > 0"));
        }
        if self.max_attempts == 0 {
            return Err(TileError::config("max_attempts must be > 0"));
        }
        if self.retry_step_ms == 0 {
            return Err(TileError::config("retry_step_ms must be > 0"));
        }
        Ok(())
    }

    /// Delay before attempt `attempt + 1`, growing linearly.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_step_ms.saturating_mul(u64::from(attempt.max(1))))
    }

    /// Fallback window while observing.
    pub fn observe_fallback(&self) -> Duration {
        Duration::from_millis(self.observe_fallback_ms)
    }

    /// Post-reflow quiet period.
    pub fn settle_grace(&self) -> Duration {
        Duration::from_millis(self.settle_grace_ms)
    }
}

/// Display-container resolution rules, tried in the order the fields are listed.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolveOpts {
    /// Attributes carrying a stable content identifier.
    pub content_id_attrs: Vec<String>,
    /// Attribute carrying a stable list key.
    pub list_key_attr: String,
    /// Role of the positioned wrapper a keyed list option sits in.
    pub wrapper_role: String,
    /// Rule for the semantic item marker inside a positioned wrapper.
    pub item_marker: String,
    /// Known structural container rules, nearest ancestor first.
    pub structural_rules: Vec<String>,
    /// Rules identifying elements a user gesture may tag.
    pub taggable_rules: Vec<String>,
}

impl Default for ResolveOpts {
    fn default() -> Self {
        Self {
            content_id_attrs: vec![
                "data-item-id".to_string(),
                "data-omega-attribute-contentid".to_string(),
            ],
            list_key_attr: "data-key".to_string(),
            wrapper_role: "presentation".to_string(),
            item_marker: "article".to_string(),
            structural_rules: vec![
                "div[role=\"gridcell\"]".to_string(),
                ".react-spectrum-GridView-item".to_string(),
                "div.item".to_string(),
                "div.library-list-item-container".to_string(),
            ],
            taggable_rules: vec![
                "article[data-omega-attribute-referenceid]".to_string(),
                "article[data-testid^=\"card-\"]".to_string(),
                "[data-item-id]".to_string(),
                "[data-omega-attribute-contentid]".to_string(),
                "[role=\"option\"]".to_string(),
            ],
        }
    }
}

impl ResolveOpts {
    fn validate(&self) -> TileResult<()> {
        if self.list_key_attr.trim().is_empty() {
            return Err(TileError::config("list_key_attr must be non-empty"));
        }
        let rules = std::iter::once(&self.item_marker)
            .chain(self.structural_rules.iter())
            .chain(self.taggable_rules.iter());
        for rule in rules {
            MatchRule::parse(rule).map_err(|e| TileError::config(format!("resolve rule: {e}")))?;
        }
        Ok(())
    }
}

/// Shape of a virtualized collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// Two-dimensional grid of absolutely positioned tiles.
    Grid,
    /// Single-column list (listbox/options) of absolutely positioned rows.
    List,
}

/// One kind of virtualized collection the host renders.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionProfile {
    /// Human-readable name used in logs.
    pub name: String,
    /// Grid or list geometry.
    pub kind: CollectionKind,
    /// Rule matching the collection root (the subtree that gets watched).
    pub root: String,
    /// Rule matching items inside the root; each match resolves to a display container.
    pub item: String,
    /// Attribute on items exposing the host's total item count, when the host provides one.
    #[serde(default)]
    pub expected_count_attr: Option<String>,
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/opts.rs"]
mod tests;
