//! The per-frame reconciliation engine.
//!
//! A [`Reconciler`] watches one rendering surface, tracks the virtualized collections it finds,
//! and keeps them compacted under the active filter. Host mutations, bus messages, filter and tag
//! changes and stabilization timers are all folded in by [`Reconciler::pump`].

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};

use crate::bus::{BusMessage, Envelope, MessageBus};
use crate::classify::{Classification, TagHits, classify};
use crate::foundation::core::{FilterTarget, FrameId, Millis, NodeId, PageKey};
use crate::foundation::error::{TileError, TileResult};
use crate::foundation::opts::{CollectionKind, CollectionProfile, ReconcilerOpts};
use crate::layout::{GroupShape, ReflowOutcome, SnapshotBook, reflow, restore};
use crate::resolve::{Resolver, derive_match_rule, taggable_target};
use crate::session::filter::FilterState;
use crate::stabilize::{AttemptResult, Controller, Reconcile, SelfWrites, Wake};
use crate::store::tags::{SubscriptionId, TagSet, TagStore};
use crate::surface::rule::MatchRule;
use crate::surface::{Surface, WatchId};

/// Shared services a rendering context is wired to.
#[derive(Clone)]
pub struct SharedServices {
    /// Process-wide tag store.
    pub tags: Arc<TagStore>,
    /// Process-wide filter selection.
    pub filter: FilterState,
    /// Cross-frame message bus.
    pub bus: Arc<dyn MessageBus>,
}

struct CompiledProfile {
    profile: CollectionProfile,
    root: MatchRule,
    item: MatchRule,
}

#[derive(Clone, Copy, Debug)]
struct Group {
    watch: WatchId,
    profile: usize,
}

/// What one [`Reconciler::pump`] call did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Bus messages handled.
    pub messages: usize,
    /// Host mutation records considered (own writes excluded).
    pub records: usize,
    /// Pipeline runs executed.
    pub runs: usize,
}

/// The reconciliation engine of one rendering context (frame).
///
/// Owns the surface handle and all per-frame state; shares the tag store, the filter selection and
/// the message bus with every other context. All work happens inside [`Reconciler::pump`] and the
/// explicit user-action methods, driven by the host's event loop and virtual clock.
pub struct Reconciler<S: Surface> {
    frame: FrameId,
    surface: S,
    opts: ReconcilerOpts,
    resolver: Resolver,
    profiles: Vec<CompiledProfile>,
    services: SharedServices,
    inbox: Receiver<Envelope>,
    filter_rx: Receiver<FilterTarget>,
    tag_tx: Sender<(PageKey, TagSet)>,
    tag_rx: Receiver<(PageKey, TagSet)>,
    subscription: SubscriptionId,
    page: PageKey,
    tags: TagSet,
    applied: FilterTarget,
    tagging: Option<String>,
    context_rule: Option<String>,
    doc_watch: WatchId,
    groups: BTreeMap<NodeId, Group>,
    controller: Controller,
    writes: SelfWrites,
    book: SnapshotBook,
    loose: BTreeSet<NodeId>,
}

impl<S: Surface> Reconciler<S> {
    /// Wire a rendering context to the shared services and load the page's tags.
    ///
    /// Nothing is written to the surface until the first [`Reconciler::pump`].
    #[tracing::instrument(skip(surface, opts, services), fields(page = %page))]
    pub fn new(
        frame: FrameId,
        mut surface: S,
        opts: ReconcilerOpts,
        services: SharedServices,
        page: PageKey,
    ) -> TileResult<Self> {
        opts.validate()?;
        let resolver = Resolver::from_opts(&opts.resolve)?;
        let profiles = opts
            .collections
            .iter()
            .map(|p| {
                let root = MatchRule::parse(&p.root)
                    .map_err(|e| TileError::config(format!("collection '{}': {e}", p.name)))?;
                let item = MatchRule::parse(&p.item)
                    .map_err(|e| TileError::config(format!("collection '{}': {e}", p.name)))?;
                Ok(CompiledProfile {
                    profile: p.clone(),
                    root,
                    item,
                })
            })
            .collect::<TileResult<Vec<_>>>()?;

        let inbox = services.bus.join(frame);
        let filter_rx = services.filter.subscribe();
        let (tag_tx, tag_rx) = channel();
        let subscription = subscribe_tags(&services.tags, &page, &tag_tx);
        let tags = services.tags.load(&page);
        let doc_watch = surface.observe(surface.root());
        let controller = Controller::new(opts.stabilize.clone());

        tracing::info!(%frame, tags = tags.len(), "reconciler ready");
        Ok(Self {
            frame,
            surface,
            opts,
            resolver,
            profiles,
            services,
            inbox,
            filter_rx,
            tag_tx,
            tag_rx,
            subscription,
            page,
            tags,
            applied: FilterTarget::All,
            tagging: None,
            context_rule: None,
            doc_watch,
            groups: BTreeMap::new(),
            controller,
            writes: SelfWrites::new(),
            book: SnapshotBook::new(),
            loose: BTreeSet::new(),
        })
    }

    /// The surface this context reconciles.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Mutable access for the host side (mounting, unmounting).
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Frame id on the bus.
    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Current page identity.
    pub fn page(&self) -> &PageKey {
        &self.page
    }

    /// Tag set the pipeline currently runs against.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Filter the surface currently reflects.
    pub fn applied_filter(&self) -> &FilterTarget {
        &self.applied
    }

    /// Customer tag gestures are attributed to, while tagging.
    pub fn tagging_customer(&self) -> Option<&str> {
        self.tagging.as_deref()
    }

    /// Stabilization state.
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Roots of the tracked reflow groups.
    pub fn groups(&self) -> Vec<NodeId> {
        self.groups.keys().copied().collect()
    }

    /// Snapshots held for restoration.
    pub fn snapshots(&self) -> &SnapshotBook {
        &self.book
    }

    /// Whether an engine write batch is open.
    pub fn is_writing(&self) -> bool {
        self.writes.is_writing()
    }

    /// When the next stabilization timer fires.
    pub fn next_due(&self) -> Option<Millis> {
        self.controller.next_due()
    }

    /// Process everything that happened up to `now`: bus messages, filter and tag changes, host
    /// mutations and due timers.
    #[tracing::instrument(skip(self), fields(frame = %self.frame, now = now.0))]
    pub fn pump(&mut self, now: Millis) -> PumpReport {
        let mut report = PumpReport::default();

        let messages: Vec<Envelope> = self.inbox.try_iter().collect();
        report.messages = messages.len();
        for env in messages {
            self.handle_message(env, now);
        }

        self.filter_rx.try_iter().for_each(drop);
        let target = self.services.filter.get();
        if target != self.applied {
            report.runs += self.apply_filter(target, now);
        }

        let latest = self
            .tag_rx
            .try_iter()
            .filter(|(page, _)| *page == self.page)
            .last();
        if let Some((_, set)) = latest
            && set != self.tags
        {
            tracing::debug!(records = set.len(), "tag set changed");
            self.tags = set;
            report.runs += self.retrigger(now);
        }

        let records: Vec<_> = self
            .surface
            .take_records()
            .into_iter()
            .filter(|r| !self.writes.is_own(r))
            .collect();
        report.records = records.len();
        let mut signaled: BTreeSet<NodeId> = BTreeSet::new();
        if !records.is_empty() {
            signaled.extend(self.discover());
            for record in &records {
                if record.watch == self.doc_watch {
                    continue;
                }
                if let Some((root, _)) = self.groups.iter().find(|(_, g)| g.watch == record.watch) {
                    signaled.insert(*root);
                }
            }
            if !self.applied.is_all() {
                self.apply_loose();
            }
        }
        if !self.applied.is_all() {
            for group in signaled {
                report.runs += self.signal(group, now);
            }
        }

        for wake in self.controller.poll(now) {
            match wake {
                Wake::Reconcile(run) => {
                    self.run_pipeline(run, now);
                    report.runs += 1;
                }
                Wake::Recheck(group) if !self.applied.is_all() => {
                    report.runs += self.signal(group, now);
                }
                Wake::Recheck(_) => {}
            }
        }
        report
    }

    /// Change the process-wide filter, tell the other frames, and apply it here.
    ///
    /// Store or bus unavailability is logged; the filter still applies to this frame.
    #[tracing::instrument(skip(self), fields(frame = %self.frame, target = %target))]
    pub fn set_filter(&mut self, target: FilterTarget, now: Millis) -> usize {
        if let Err(e) = self.services.filter.set(target.clone()) {
            tracing::warn!(error = %e, "could not persist the filter");
        }
        self.broadcast(BusMessage::SetFilter {
            customer_id: target.as_label().to_string(),
        });
        if target == self.applied {
            return 0;
        }
        self.apply_filter(target, now)
    }

    /// Enter tagging mode for `customer` here and in every other frame.
    pub fn start_tagging(&mut self, customer: &str) {
        self.tagging = Some(customer.to_string());
        self.broadcast(BusMessage::StartTagging {
            customer_id: customer.to_string(),
        });
    }

    /// Leave tagging mode here and in every other frame.
    pub fn stop_tagging(&mut self) {
        let previous = self.tagging.take();
        self.broadcast(BusMessage::StopTagging {
            customer_id: previous,
        });
    }

    /// Toggle a tag on the current page and reconcile.
    ///
    /// On a store failure the toggle is deferred by the tag store and the error is returned so the
    /// caller can report tagging as temporarily disabled.
    #[tracing::instrument(skip(self), fields(frame = %self.frame))]
    pub fn toggle_tag(&mut self, match_rule: &str, customer: &str, now: Millis) -> TileResult<TagSet> {
        let set = self
            .services
            .tags
            .toggle(&self.page, match_rule, customer)
            .inspect_err(|e| tracing::warn!(error = %e, "tagging temporarily disabled"))?;
        if set != self.tags {
            self.tags = set.clone();
            self.retrigger(now);
        }
        Ok(set)
    }

    /// Tag gesture on `node`: derive a rule for its taggable element and toggle it for the tagging
    /// customer, falling back to the active filter customer.
    ///
    /// Returns `Ok(None)` when there is no customer, no taggable element, or no derivable rule.
    pub fn tag_node(&mut self, node: NodeId, now: Millis) -> TileResult<Option<TagSet>> {
        let Some(customer) = self
            .tagging
            .clone()
            .or_else(|| self.applied.customer().map(str::to_string))
        else {
            tracing::debug!(%node, "tag gesture without a customer");
            return Ok(None);
        };
        let Some(rule) = self.rule_for_gesture(node) else {
            tracing::debug!(%node, "nothing taggable under the gesture");
            return Ok(None);
        };
        self.toggle_tag(&rule, &customer, now).map(Some)
    }

    /// Remember the element a context menu was opened on. Returns the derived rule.
    pub fn remember_context_target(&mut self, node: NodeId) -> Option<&str> {
        self.context_rule = self.rule_for_gesture(node);
        self.context_rule.as_deref()
    }

    /// Per-container customer badges, only while tagging.
    pub fn badges(&self) -> Vec<(NodeId, Vec<String>)> {
        if self.tagging.is_none() {
            return Vec::new();
        }
        TagHits::collect(&self.surface, &self.resolver, &self.tags)
            .badges()
            .map(|(n, c)| (n, c.to_vec()))
            .collect()
    }

    /// Switch page identity (route change): restore the host layout, reload tags, reconcile.
    #[tracing::instrument(skip(self), fields(frame = %self.frame))]
    pub fn navigate(&mut self, host: &str, route: &str, now: Millis) -> usize {
        let page = PageKey::new(host, route);
        if page == self.page {
            return 0;
        }
        self.restore_all();
        self.services.tags.unsubscribe(self.subscription);
        self.subscription = subscribe_tags(&self.services.tags, &page, &self.tag_tx);
        self.tags = self.services.tags.load(&page);
        tracing::info!(from = %self.page, to = %page, tags = self.tags.len(), "page changed");
        self.page = page;
        let target = self.applied.clone();
        self.applied = FilterTarget::All;
        self.apply_filter(target, now)
    }

    fn handle_message(&mut self, env: Envelope, now: Millis) {
        tracing::debug!(from = %env.from, message = ?env.message, "bus message");
        match env.message {
            BusMessage::SetFilter { customer_id } => {
                let target = FilterTarget::parse(&customer_id);
                if let Err(e) = self.services.filter.set(target) {
                    tracing::warn!(error = %e, "could not persist the filter");
                }
            }
            BusMessage::StartTagging { customer_id } => self.tagging = Some(customer_id),
            BusMessage::StopTagging { .. } => self.tagging = None,
            BusMessage::TagLastRightClicked { customer_id } => {
                let Some(rule) = self.context_rule.clone() else {
                    tracing::debug!("no context-menu target remembered");
                    return;
                };
                // Failures are already logged and deferred by the store.
                let _ = self.toggle_tag(&rule, &customer_id, now);
            }
        }
    }

    fn broadcast(&self, message: BusMessage) {
        if let Err(e) = self.services.bus.publish(self.frame, message) {
            tracing::warn!(error = %e, "message bus unavailable");
        }
    }

    fn rule_for_gesture(&self, node: NodeId) -> Option<String> {
        let target = taggable_target(&self.surface, node, self.resolver.taggable_rules())?;
        derive_match_rule(&self.surface, target, self.resolver.opts())
    }

    fn apply_filter(&mut self, target: FilterTarget, now: Millis) -> usize {
        tracing::info!(frame = %self.frame, filter = %target, "applying filter");
        self.applied = target;
        if self.applied.is_all() {
            self.restore_all();
            return 0;
        }
        self.discover();
        self.retrigger(now)
    }

    fn retrigger(&mut self, now: Millis) -> usize {
        if self.applied.is_all() {
            return 0;
        }
        self.apply_loose();
        let groups: Vec<NodeId> = self.groups.keys().copied().collect();
        let mut runs = 0;
        for group in groups {
            if let Some(run) = self.controller.trigger(group) {
                self.run_pipeline(run, now);
                runs += 1;
            }
        }
        runs
    }

    fn restore_all(&mut self) {
        for group in self.groups.keys() {
            self.controller.reset(*group);
        }
        let loose = std::mem::take(&mut self.loose);
        let mut batch = self.writes.begin(&mut self.surface);
        for node in loose {
            if batch.is_attached(node)
                && let Err(e) = batch.set_suppressed(node, false)
            {
                tracing::debug!(%node, error = %e, "could not unflag container");
            }
        }
        restore(&mut *batch, &mut self.book);
    }

    fn signal(&mut self, group: NodeId, now: Millis) -> usize {
        let Some((containers, expected)) = self.measure(group) else {
            return 0;
        };
        match self.controller.signal(group, containers.len(), expected, now) {
            Some(run) => {
                self.run_pipeline(run, now);
                1
            }
            None => 0,
        }
    }

    #[tracing::instrument(skip(self), fields(group = %run.group, attempt = run.attempt))]
    fn run_pipeline(&mut self, run: Reconcile, now: Millis) {
        if self.applied.is_all() {
            self.controller.reset(run.group);
            return;
        }
        let Some(group) = self.groups.get(&run.group).copied() else {
            return;
        };
        // Recycled containers leave snapshots behind.
        let pruned = self.book.prune(&self.surface);
        if pruned > 0 {
            tracing::debug!(pruned, "dropped snapshots of unmounted nodes");
        }
        let Some((containers, expected)) = self.measure(run.group) else {
            self.release(run.group);
            return;
        };
        if let Some(expected) = expected
            && containers.len() < expected
            && !run.final_attempt
        {
            tracing::debug!(mounted = containers.len(), expected, "waiting for the host to mount more");
            self.controller.finish(&run, AttemptResult::Short, now);
            return;
        }

        let hits = TagHits::collect(&self.surface, &self.resolver, &self.tags);
        let Classification::Partition(partition) =
            classify(&self.applied, &hits, containers.iter().copied())
        else {
            self.controller.reset(run.group);
            return;
        };
        let Some(parent) = containers.first().and_then(|c| self.surface.parent(*c)) else {
            self.controller.finish(&run, AttemptResult::NotReady, now);
            return;
        };
        let shape = match self.profiles[group.profile].profile.kind {
            CollectionKind::Grid => GroupShape::Grid,
            CollectionKind::List => GroupShape::List,
        };
        let outcome = {
            let mut batch = self.writes.begin(&mut self.surface);
            reflow(
                &mut *batch,
                parent,
                shape,
                &partition,
                &mut self.book,
                &self.opts.geometry,
            )
        };
        let result = match outcome {
            ReflowOutcome::Applied(_) => AttemptResult::Applied,
            ReflowOutcome::NotReady => AttemptResult::NotReady,
        };
        self.controller.finish(&run, result, now);
    }

    /// Display containers of a group and the host's expected total, `None` when the root is gone.
    fn measure(&self, group: NodeId) -> Option<(Vec<NodeId>, Option<usize>)> {
        let g = self.groups.get(&group)?;
        if !self.surface.is_attached(group) {
            return None;
        }
        let compiled = &self.profiles[g.profile];
        let items = self.surface.match_all(&compiled.item, group);
        let expected = compiled.profile.expected_count_attr.as_deref().and_then(|attr| {
            items
                .iter()
                .filter_map(|n| self.surface.attribute(*n, attr))
                .filter_map(|v| v.trim().parse::<usize>().ok())
                .max()
        });
        let mut seen = HashSet::new();
        let containers = items
            .into_iter()
            .map(|n| self.resolver.display_container(&self.surface, n))
            .filter(|c| seen.insert(*c))
            .collect();
        Some((containers, expected))
    }

    /// Release groups whose root left the document and start tracking new roots. Returns the new
    /// roots.
    fn discover(&mut self) -> Vec<NodeId> {
        let gone: Vec<NodeId> = self
            .groups
            .keys()
            .copied()
            .filter(|r| !self.surface.is_attached(*r))
            .collect();
        for root in gone {
            self.release(root);
        }

        let doc = self.surface.root();
        let mut fresh = Vec::new();
        for (idx, compiled) in self.profiles.iter().enumerate() {
            for root in self.surface.match_all(&compiled.root, doc) {
                if self.groups.contains_key(&root) {
                    continue;
                }
                let watch = self.surface.observe(root);
                self.groups.insert(
                    root,
                    Group {
                        watch,
                        profile: idx,
                    },
                );
                self.controller.track(root);
                tracing::info!(%root, collection = %compiled.profile.name, "found collection");
                fresh.push(root);
            }
        }
        fresh
    }

    fn release(&mut self, root: NodeId) {
        if let Some(group) = self.groups.remove(&root) {
            self.surface.unobserve(group.watch);
            self.controller.release(root);
            let pruned = self.book.prune(&self.surface);
            tracing::info!(%root, pruned, "collection left the document");
        }
    }

    /// Flag tagged containers outside every collection; they are never repositioned.
    fn apply_loose(&mut self) {
        let hits = TagHits::collect(&self.surface, &self.resolver, &self.tags);
        let mut members = HashSet::new();
        for group in self.groups.keys().copied().collect::<Vec<_>>() {
            if let Some((containers, _)) = self.measure(group) {
                members.extend(containers);
            }
        }
        let candidates: Vec<NodeId> = hits.containers().filter(|c| !members.contains(c)).collect();
        let desired: BTreeSet<NodeId> = match classify(&self.applied, &hits, candidates) {
            Classification::Partition(p) => p.suppressed.into_iter().collect(),
            Classification::Restore => BTreeSet::new(),
        };
        if desired == self.loose {
            return;
        }
        let mut batch = self.writes.begin(&mut self.surface);
        for node in self.loose.difference(&desired) {
            if batch.is_attached(*node)
                && let Err(e) = batch.set_suppressed(*node, false)
            {
                tracing::debug!(%node, error = %e, "could not unflag container");
            }
        }
        for node in desired.difference(&self.loose) {
            if let Err(e) = batch.set_suppressed(*node, true) {
                tracing::debug!(%node, error = %e, "could not flag container");
            }
        }
        drop(batch);
        tracing::debug!(count = desired.len(), "flagged loose containers");
        self.loose = desired;
    }
}

impl<S: Surface> Drop for Reconciler<S> {
    fn drop(&mut self) {
        self.services.bus.leave(self.frame);
        self.services.tags.unsubscribe(self.subscription);
    }
}

fn subscribe_tags(
    store: &TagStore,
    page: &PageKey,
    tx: &Sender<(PageKey, TagSet)>,
) -> SubscriptionId {
    let tx = tx.clone();
    store.subscribe(
        page,
        Box::new(move |page, set| {
            // A closed receiver means the reconciler is gone; the subscription is dropped with it.
            let _ = tx.send((page.clone(), set.clone()));
        }),
    )
}

#[cfg(test)]
#[path = "../../tests/unit/session/reconciler.rs"]
mod tests;
