//! Change detection, debounced persistence and subscriber notification
//!
//! # Debouncing
//!
//! Writes land in sled immediately, but flushing them to disk is coalesced:
//! the first [`ChangeTracker::trigger_save`] arms a one-shot timer, and
//! further triggers while it is pending only piggyback on it. When the timer
//! fires the store is flushed once.
//!
//! Every trigger also notifies, right away, each control connection that has
//! subscribed to change events.

use crate::entry::Entry;
use crate::store::PreferenceStore;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

/// Default time between the first change and the flush
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(10);

/// Identifier of a control connection
pub type ConnectionId = u32;

/// Unsolicited event delivered to subscribed connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionEvent {
    /// Something in the preference store changed
    Changed,
}

/// True when `a` and `b` would restore the same state.
///
/// Volumes count as equal when `b`'s volume remapped into `a`'s channel map
/// matches `a`'s volume, so reordered or differently sized layouts at the
/// same gain compare equal.
pub fn entries_equal(a: &Entry, b: &Entry) -> bool {
    if a.device != b.device || a.card != b.card || a.muted != b.muted {
        return false;
    }
    match (&a.volume, &b.volume) {
        (None, None) => true,
        (Some(va), Some(vb)) => vb.volume.remap(&vb.channel_map, &va.channel_map) == va.volume,
        _ => false,
    }
}

pub struct ChangeTracker {
    store: PreferenceStore,
    save_interval: Duration,
    save_timer: Option<JoinHandle<()>>,
    subscribers: BTreeMap<ConnectionId, mpsc::UnboundedSender<ExtensionEvent>>,
    /// Number of times the timer has been armed
    saves_armed: u64,
}

impl ChangeTracker {
    pub fn new(store: PreferenceStore, save_interval: Duration) -> Self {
        Self {
            store,
            save_interval,
            save_timer: None,
            subscribers: BTreeMap::new(),
            saves_armed: 0,
        }
    }

    pub fn save_interval(&self) -> Duration {
        self.save_interval
    }

    /// Notify subscribers and make sure a flush is scheduled
    pub fn trigger_save(&mut self) {
        self.notify_subscribers();

        if self.is_save_pending() {
            trace!("Save already pending");
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                let interval = self.save_interval;
                self.save_timer = Some(handle.spawn(async move {
                    tokio::time::sleep(interval).await;
                    sync(&store);
                }));
                self.saves_armed += 1;
                debug!("Save scheduled in {:?}", interval);
            }
            Err(_) => {
                // No event loop to defer to (synchronous callers, one-shot tools)
                sync(&self.store);
            }
        }
    }

    pub fn is_save_pending(&self) -> bool {
        self.save_timer
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    pub fn saves_armed(&self) -> u64 {
        self.saves_armed
    }

    pub fn subscribe(&mut self, id: ConnectionId, events: mpsc::UnboundedSender<ExtensionEvent>) {
        debug!("Connection {} subscribed to changes", id);
        self.subscribers.insert(id, events);
    }

    /// Returns whether the connection was subscribed
    pub fn unsubscribe(&mut self, id: ConnectionId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!("Connection {} unsubscribed from changes", id);
        }
        removed
    }

    pub fn is_subscribed(&self, id: ConnectionId) -> bool {
        self.subscribers.contains_key(&id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Drop every subscriber, stop the timer and flush now
    pub fn shutdown(&mut self) {
        self.subscribers.clear();
        if let Some(timer) = self.save_timer.take() {
            timer.abort();
        }
        sync(&self.store);
    }

    fn notify_subscribers(&mut self) {
        self.subscribers.retain(|id, events| {
            if events.send(ExtensionEvent::Changed).is_ok() {
                true
            } else {
                debug!("Dropping closed connection {}", id);
                false
            }
        });
    }
}

impl Drop for ChangeTracker {
    fn drop(&mut self) {
        if let Some(timer) = self.save_timer.take() {
            timer.abort();
        }
    }
}

fn sync(store: &PreferenceStore) {
    match store.flush() {
        Ok(_) => info!("Synced."),
        Err(e) => error!("Failed to sync preference database: {}", e),
    }
}
