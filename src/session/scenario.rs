//! Declarative replay of a host session against the in-memory surface.
//!
//! A [`Scenario`] describes what the host renders and does over time; [`Scenario::run`] drives a
//! [`Reconciler`] through it on a virtual clock and reports where everything ended up.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::bus::LocalBus;
use crate::foundation::core::{FilterTarget, FrameId, Millis, NodeId, PageKey};
use crate::foundation::error::{TileError, TileResult};
use crate::foundation::opts::ReconcilerOpts;
use crate::session::filter::FilterState;
use crate::session::reconciler::{Reconciler, SharedServices};
use crate::store::kv::{KvStore, MemoryKv};
use crate::store::tags::{TagRecord, TagSet, TagStore};
use crate::surface::Surface;
use crate::surface::memory::{MemorySurface, NodeSpec};

// Bounds the timer drain after the last step; a settled session needs only a handful.
const MAX_TRAILING_WAKES: usize = 1_000;

/// A recorded host session.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    /// Host part of the page identity.
    pub host: String,
    /// Logical route part of the page identity.
    pub route: String,
    /// Subtrees mounted under the document root before the session starts.
    pub document: Vec<NodeSpec>,
    /// Tags already stored for the page.
    pub tags: Vec<TagRecord>,
    /// Filter selected when the session starts (`"ALL"` when absent).
    pub filter: Option<String>,
    /// Reconciler options; defaults when absent.
    pub opts: Option<ReconcilerOpts>,
    /// Timed host and user actions.
    pub steps: Vec<Step>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            route: String::new(),
            document: Vec::new(),
            tags: Vec::new(),
            filter: None,
            opts: None,
            steps: Vec::new(),
        }
    }
}

/// One action at a point on the virtual clock.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Step {
    /// Milliseconds since the session started.
    pub at_ms: u64,
    /// What happens.
    #[serde(flatten)]
    pub action: Action,
}

/// Host and user actions a scenario can replay.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "do", rename_all = "snake_case")]
pub enum Action {
    /// The host mounts a subtree under the node with this `id` (the document root when absent).
    Mount {
        /// `id` attribute of the parent.
        #[serde(default)]
        parent: Option<String>,
        /// Subtree to mount.
        node: NodeSpec,
    },
    /// The host unmounts the node with this `id`.
    Unmount {
        /// `id` attribute of the node.
        id: String,
    },
    /// The user picks a filter.
    SetFilter {
        /// Customer label, or `"ALL"`.
        customer: String,
    },
    /// The user toggles a tag.
    Toggle {
        /// Match rule.
        rule: String,
        /// Customer.
        customer: String,
    },
    /// The host changes route.
    Navigate {
        /// New logical route.
        route: String,
    },
}

/// Final state of one node carrying an `id`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeReport {
    /// Inline `left`, if set.
    pub left: Option<f64>,
    /// Inline `top`, if set.
    pub top: Option<f64>,
    /// Inline height, if set.
    pub height: Option<f64>,
    /// Whether the engine suppressed it.
    pub suppressed: bool,
}

/// What a replay left behind.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReplayReport {
    /// Filter in effect at the end.
    pub filter: String,
    /// Virtual time of the last processed event.
    pub ended_at_ms: u64,
    /// Pipeline runs over the whole session.
    pub runs: usize,
    /// Every attached node with an `id`, keyed by that id.
    pub nodes: BTreeMap<String, NodeReport>,
}

impl ReplayReport {
    /// Report for the node with `id`.
    pub fn node(&self, id: &str) -> Option<&NodeReport> {
        self.nodes.get(id)
    }
}

impl Scenario {
    /// Parse a scenario from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> TileResult<Self> {
        let scenario: Self = serde_json::from_reader(r)
            .map_err(|e| TileError::serde(format!("parse scenario JSON: {e}")))?;
        if let Some(opts) = &scenario.opts {
            opts.validate()?;
        }
        Ok(scenario)
    }

    /// Parse a scenario from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> TileResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            TileError::config(format!("open scenario JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Replay with the scenario's own options.
    pub fn run(&self) -> TileResult<ReplayReport> {
        self.run_with(self.opts.clone().unwrap_or_default())
    }

    /// Replay with `opts`, ignoring the scenario's own options.
    #[tracing::instrument(skip_all, fields(steps = self.steps.len()))]
    pub fn run_with(&self, opts: ReconcilerOpts) -> TileResult<ReplayReport> {
        let mut surface = MemorySurface::new();
        let root = surface.root();
        for spec in &self.document {
            surface.mount(root, spec)?;
        }

        let kv = Arc::new(MemoryKv::new());
        let page = PageKey::new(&self.host, &self.route);
        if !self.tags.is_empty() {
            let set = TagSet::from_records(self.tags.iter().cloned());
            kv.set(BTreeMap::from([(page.as_str().to_string(), set.to_value()?)]))?;
        }
        let filter = FilterState::new();
        if let Some(label) = &self.filter {
            filter.set(FilterTarget::parse(label))?;
        }
        let services = SharedServices {
            tags: Arc::new(TagStore::new(kv)),
            filter,
            bus: Arc::new(LocalBus::new()),
        };
        let mut reconciler = Reconciler::new(FrameId(0), surface, opts, services, page)?;

        let mut steps: Vec<&Step> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.at_ms);

        let mut now = Millis(0);
        let mut runs = reconciler.pump(now).runs;
        for step in steps {
            let at = Millis(step.at_ms);
            while let Some(due) = reconciler.next_due().filter(|d| *d <= at) {
                now = due;
                runs += reconciler.pump(now).runs;
            }
            now = at;
            runs += self.apply(&mut reconciler, &step.action, now)?;
            runs += reconciler.pump(now).runs;
        }
        for _ in 0..MAX_TRAILING_WAKES {
            let Some(due) = reconciler.next_due() else {
                break;
            };
            now = due.max(now);
            runs += reconciler.pump(now).runs;
        }

        tracing::info!(runs, ended_at_ms = now.0, "replay finished");
        Ok(ReplayReport {
            filter: reconciler.applied_filter().as_label().to_string(),
            ended_at_ms: now.0,
            runs,
            nodes: collect_nodes(reconciler.surface()),
        })
    }

    fn apply(
        &self,
        reconciler: &mut Reconciler<MemorySurface>,
        action: &Action,
        now: Millis,
    ) -> TileResult<usize> {
        tracing::debug!(at_ms = now.0, ?action, "replaying step");
        match action {
            Action::Mount { parent, node } => {
                let surface = reconciler.surface_mut();
                let parent = match parent {
                    Some(id) => find(surface, id)?,
                    None => surface.root(),
                };
                surface.mount(parent, node)?;
                Ok(0)
            }
            Action::Unmount { id } => {
                let surface = reconciler.surface_mut();
                let node = find(surface, id)?;
                surface.unmount(node)?;
                Ok(0)
            }
            Action::SetFilter { customer } => {
                Ok(reconciler.set_filter(FilterTarget::parse(customer), now))
            }
            Action::Toggle { rule, customer } => {
                reconciler.toggle_tag(rule, customer, now)?;
                Ok(0)
            }
            Action::Navigate { route } => Ok(reconciler.navigate(&self.host, route, now)),
        }
    }
}

fn find(surface: &MemorySurface, id: &str) -> TileResult<NodeId> {
    surface
        .find_by_id(id)
        .ok_or_else(|| TileError::surface(format!("no mounted node with id '{id}'")))
}

fn collect_nodes(surface: &MemorySurface) -> BTreeMap<String, NodeReport> {
    let mut out = BTreeMap::new();
    let mut stack = vec![surface.root()];
    while let Some(node) = stack.pop() {
        stack.extend(surface.children(node));
        let Some(id) = surface.attribute(node, "id") else {
            continue;
        };
        let offset = surface.offset(node);
        out.insert(
            id,
            NodeReport {
                left: offset.map(|p| p.x),
                top: offset.map(|p| p.y),
                height: surface.height(node),
                suppressed: surface.is_suppressed(node),
            },
        );
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/session/scenario.rs"]
mod tests;
