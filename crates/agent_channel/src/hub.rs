//! Inbound status fan-out with arena-style subscription handles.
//!
//! Each listener role registers under a [`ListenerKey`]. Subscribing again
//! under the same key evicts the previous registration, so a listener that is
//! mounted twice never ends up with two live handlers. Handles carry a slot
//! generation; a stale handle can never unsubscribe a newer registration.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{parse_inbound, RunStatusUpdate};

/// Identifies a listener role (for example the dashboard's run-status listener).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey(&'static str);

impl ListenerKey {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    index: usize,
    generation: u64,
}

/// Live registration returned by [`InboundHub::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub receiver: mpsc::UnboundedReceiver<RunStatusUpdate>,
}

struct Occupant {
    key: ListenerKey,
    sender: mpsc::UnboundedSender<RunStatusUpdate>,
}

struct Slot {
    generation: u64,
    occupant: Option<Occupant>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl Arena {
    fn vacate(&mut self, index: usize) -> bool {
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        if slot.occupant.take().is_none() {
            return false;
        }
        slot.generation += 1;
        self.free.push(index);
        true
    }

    fn live_index_for(&self, key: ListenerKey) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.occupant
                .as_ref()
                .is_some_and(|occupant| occupant.key == key)
        })
    }
}

/// Fan-out point for agent-originated pushes.
#[derive(Clone, Default)]
pub struct InboundHub {
    arena: Arc<Mutex<Arena>>,
}

impl InboundHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` and returns its receiver, evicting any previous
    /// registration under the same key.
    pub fn subscribe(&self, key: ListenerKey) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut arena = lock_unpoisoned(&self.arena);

        if let Some(index) = arena.live_index_for(key) {
            arena.vacate(index);
        }

        let index = match arena.free.pop() {
            Some(index) => index,
            None => {
                arena.slots.push(Slot {
                    generation: 0,
                    occupant: None,
                });
                arena.slots.len() - 1
            }
        };

        let slot = &mut arena.slots[index];
        slot.occupant = Some(Occupant { key, sender });
        let handle = SubscriptionHandle {
            index,
            generation: slot.generation,
        };

        Subscription { handle, receiver }
    }

    /// Removes the registration behind `handle`. Returns false for stale or
    /// already-removed handles.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut arena = lock_unpoisoned(&self.arena);
        let current = arena
            .slots
            .get(handle.index)
            .is_some_and(|slot| slot.generation == handle.generation);
        current && arena.vacate(handle.index)
    }

    #[must_use]
    pub fn is_live(&self, handle: SubscriptionHandle) -> bool {
        let arena = lock_unpoisoned(&self.arena);
        arena.slots.get(handle.index).is_some_and(|slot| {
            slot.generation == handle.generation && slot.occupant.is_some()
        })
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let arena = lock_unpoisoned(&self.arena);
        arena
            .slots
            .iter()
            .filter(|slot| slot.occupant.is_some())
            .count()
    }

    /// Delivers `update` to every live subscriber and returns the delivery count.
    ///
    /// Subscribers whose receiver has been dropped are pruned.
    pub fn publish(&self, update: RunStatusUpdate) -> usize {
        let mut arena = lock_unpoisoned(&self.arena);
        let mut delivered = 0usize;
        let mut closed = Vec::new();

        for (index, slot) in arena.slots.iter().enumerate() {
            let Some(occupant) = slot.occupant.as_ref() else {
                continue;
            };
            if occupant.sender.send(update.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(index);
            }
        }

        for index in closed {
            arena.vacate(index);
        }

        delivered
    }

    /// Parses and publishes a raw inbound message. Messages that are not status
    /// pushes are ignored and report zero deliveries.
    pub fn publish_raw(&self, value: &Value) -> Result<usize, serde_json::Error> {
        match parse_inbound(value)? {
            Some(update) => Ok(self.publish(update)),
            None => Ok(0),
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{RunOutcome, RunStatus};

    const DASHBOARD: ListenerKey = ListenerKey::new("dashboard");
    const OTHER: ListenerKey = ListenerKey::new("other");

    #[test]
    fn resubscribing_same_key_evicts_previous_registration() {
        let hub = InboundHub::new();
        let mut first = hub.subscribe(DASHBOARD);
        let mut second = hub.subscribe(DASHBOARD);

        assert_eq!(hub.subscriber_count(), 1);
        assert!(!hub.is_live(first.handle));
        assert!(hub.is_live(second.handle));

        assert_eq!(hub.publish(RunStatusUpdate::running("Sync All Data")), 1);
        assert!(first.receiver.try_recv().is_err());
        assert_eq!(
            second.receiver.try_recv().expect("update").status,
            RunStatus::Running
        );
    }

    #[test]
    fn stale_handle_cannot_remove_newer_registration() {
        let hub = InboundHub::new();
        let first = hub.subscribe(DASHBOARD);
        assert!(hub.unsubscribe(first.handle));
        assert!(!hub.unsubscribe(first.handle));

        let second = hub.subscribe(DASHBOARD);
        assert_eq!(second.handle.index, first.handle.index);
        assert!(!hub.unsubscribe(first.handle));
        assert!(hub.is_live(second.handle));
    }

    #[test]
    fn distinct_keys_each_receive_updates() {
        let hub = InboundHub::new();
        let mut dashboard = hub.subscribe(DASHBOARD);
        let mut other = hub.subscribe(OTHER);

        assert_eq!(hub.publish(RunStatusUpdate::finished(RunOutcome::Success)), 2);
        assert!(dashboard.receiver.try_recv().is_ok());
        assert!(other.receiver.try_recv().is_ok());
    }

    #[test]
    fn dropped_receivers_are_pruned_on_publish() {
        let hub = InboundHub::new();
        let subscription = hub.subscribe(DASHBOARD);
        drop(subscription.receiver);

        assert_eq!(hub.publish(RunStatusUpdate::failed("boom")), 0);
        assert_eq!(hub.subscriber_count(), 0);
        assert!(!hub.is_live(subscription.handle));
    }

    #[test]
    fn publish_raw_skips_non_status_messages() {
        let hub = InboundHub::new();
        let mut subscription = hub.subscribe(DASHBOARD);

        assert_eq!(hub.publish_raw(&json!({"action": "hello"})).expect("raw"), 0);
        assert_eq!(
            hub.publish_raw(&json!({"action": "runStatusUpdate", "status": "error", "error": "x"}))
                .expect("raw"),
            1
        );
        assert_eq!(
            subscription.receiver.try_recv().expect("update").error.as_deref(),
            Some("x")
        );
    }
}
