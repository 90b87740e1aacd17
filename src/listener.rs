//! Listener registry and dispatch loop.
//!
//! The registry maps an event kind to exactly one listener. Dispatch decodes
//! each inbound frame, looks up its kind and invokes the listener on the
//! calling thread. Frames are consumed strictly in arrival order; a slow
//! listener stalls every frame behind it, so listeners that do real work
//! should hand it off to their own worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{trace, warn};

use crate::error::{ListenerError, NotifyResult};
use crate::event::Event;

/// Something invocable with an event's meta payload.
pub trait Listener: Send + Sync {
    /// Handle one event's raw meta.
    fn on_event(&self, meta: &[u8]);
}

impl<F> Listener for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn on_event(&self, meta: &[u8]) {
        self(meta);
    }
}

/// Outcome of dispatching a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A listener was invoked.
    Delivered,
    /// No listener is registered for the frame's kind.
    Unmatched,
}

/// Snapshot of dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Frames delivered to a listener.
    pub dispatched: u64,
    /// Frames dropped because no listener matched their kind.
    pub unmatched: u64,
    /// Frames that failed to decode.
    pub malformed: u64,
}

/// Mapping from event kind to its single listener.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<String, Arc<dyn Listener>>>,
    dispatched: AtomicU64,
    unmatched: AtomicU64,
    malformed: AtomicU64,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("kinds", &self.kinds())
            .field("stats", &self.stats())
            .finish()
    }
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind`.
    ///
    /// Fails if `kind` already has a listener; the existing one is kept.
    pub fn register(&self, kind: impl Into<String>, listener: impl Listener + 'static) -> NotifyResult<()> {
        let kind = kind.into();
        let mut listeners = self.write_listeners();
        if listeners.contains_key(&kind) {
            return Err(ListenerError::Duplicate { kind }.into());
        }
        trace!(kind = %kind, "listener registered");
        listeners.insert(kind, Arc::new(listener));
        Ok(())
    }

    /// Whether a listener is registered for `kind`.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.read_listeners().contains_key(kind)
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_listeners().len()
    }

    /// Whether no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_listeners().is_empty()
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.read_listeners().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Dispatch one raw frame.
    ///
    /// A frame that fails to decode is treated as a zero-value event (empty
    /// kind) after recording a malformed-frame diagnostic.
    pub fn dispatch(&self, frame: &[u8]) -> DispatchOutcome {
        let event = Event::decode(frame).unwrap_or_else(|err| {
            self.malformed.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, len = frame.len(), "malformed event frame");
            Event::default()
        });
        self.dispatch_event(&event)
    }

    /// Dispatch an already-decoded event.
    pub fn dispatch_event(&self, event: &Event) -> DispatchOutcome {
        // Clone the listener out so the lock is not held while it runs.
        let listener = self.read_listeners().get(&event.kind).cloned();
        match listener {
            Some(listener) => {
                listener.on_event(&event.meta);
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                DispatchOutcome::Delivered
            }
            None => {
                self.unmatched.fetch_add(1, Ordering::Relaxed);
                let err = ListenerError::NotFound {
                    kind: event.kind.clone(),
                };
                warn!(kind = %event.kind, "handler error: {err}");
                DispatchOutcome::Unmatched
            }
        }
    }

    /// Dispatch every frame of `frames` in order, returning when it ends.
    ///
    /// Any iterator of byte frames works. With a
    /// `crossbeam_channel::Receiver<Vec<u8>>` the loop blocks between frames
    /// and ends once every sender has been dropped.
    pub fn handle_events<I>(&self, frames: I)
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        for frame in frames {
            self.dispatch(frame.as_ref());
        }
    }

    /// Snapshot of the dispatch counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }

    fn read_listeners(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn Listener>>> {
        // A listener never runs under the lock, so poisoning cannot leave the map half-updated.
        self.listeners.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_listeners(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn Listener>>> {
        self.listeners.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
