//! Cross-frame message bus.
//!
//! Every rendering context joins the bus with its [`FrameId`]; a published message reaches every
//! other joined frame at most once. Frames drain their inbox from the event loop, so ordering is
//! only guaranteed per sender.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{PoisonError, RwLock};

use crate::foundation::core::FrameId;
use crate::foundation::error::{TileError, TileResult};

/// A message exchanged between rendering contexts.
///
/// Encoded as `{"kind": "SET_FILTER", "customerId": ".."}`; `customer` is accepted as an alias.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusMessage {
    /// Change the active filter (`"ALL"` clears it).
    SetFilter {
        /// New filter label.
        #[serde(rename = "customerId", alias = "customer")]
        customer_id: String,
    },
    /// Enter tagging mode for a customer.
    StartTagging {
        /// Customer new tags are attributed to.
        #[serde(rename = "customerId", alias = "customer")]
        customer_id: String,
    },
    /// Leave tagging mode.
    StopTagging {
        /// Customer that was tagging, when known.
        #[serde(rename = "customerId", alias = "customer", default)]
        customer_id: Option<String>,
    },
    /// Tag the element last opened with a context menu.
    TagLastRightClicked {
        /// Customer to tag it for.
        #[serde(rename = "customerId", alias = "customer")]
        customer_id: String,
    },
}

/// A message together with the frame that published it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Publishing frame.
    pub from: FrameId,
    /// Payload.
    pub message: BusMessage,
}

/// Best-effort broadcast between rendering contexts.
pub trait MessageBus: Send + Sync {
    /// Register a frame and return its inbox. Re-joining replaces the previous inbox.
    fn join(&self, frame: FrameId) -> Receiver<Envelope>;

    /// Unregister a frame. Unknown frames are ignored.
    fn leave(&self, frame: FrameId);

    /// Deliver `message` to every joined frame except `from`.
    fn publish(&self, from: FrameId, message: BusMessage) -> TileResult<()>;
}

/// In-process [`MessageBus`] over `std::sync::mpsc` channels.
#[derive(Default)]
pub struct LocalBus {
    frames: RwLock<BTreeMap<FrameId, Sender<Envelope>>>,
    unavailable: AtomicBool,
}

impl LocalBus {
    /// An empty, available bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated unavailability (host or extension reload).
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of joined frames.
    pub fn frames(&self) -> usize {
        self.frames
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl MessageBus for LocalBus {
    fn join(&self, frame: FrameId) -> Receiver<Envelope> {
        let (tx, rx) = channel();
        self.frames
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(frame, tx);
        rx
    }

    fn leave(&self, frame: FrameId) {
        self.frames
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&frame);
    }

    #[tracing::instrument(skip(self))]
    fn publish(&self, from: FrameId, message: BusMessage) -> TileResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TileError::store("message bus is unavailable"));
        }
        let mut gone = Vec::new();
        {
            let frames = self.frames.read().unwrap_or_else(PoisonError::into_inner);
            for (frame, tx) in frames.iter().filter(|(f, _)| **f != from) {
                let env = Envelope {
                    from,
                    message: message.clone(),
                };
                if tx.send(env).is_err() {
                    gone.push(*frame);
                }
            }
        }
        if !gone.is_empty() {
            tracing::debug!(?gone, "dropping frames whose inbox closed");
            let mut frames = self.frames.write().unwrap_or_else(PoisonError::into_inner);
            for frame in gone {
                frames.remove(&frame);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bus/mod.rs"]
mod tests;
