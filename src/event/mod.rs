//! Publish/subscribe fabric for data-path diagnostics.
//!
//! Dispatch runs under the registry lock, so once [`Notifier::unsubscribe`]
//! returns the callback is never entered again. Callbacks must not call back
//! into the same [`Notifier`].

use std::collections::HashMap;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    layer::{rx::PeerId, tx::DescId},
    protocol::qos::Tid,
    utils::excl::{ExclusionDomain, Lock, SpinDomain},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EventType {
    PoolExhausted,
    ReorderFlush,
    TxCompletion,
    ContractViolation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PoolExhausted {
        capacity: usize,
    },
    /// Frames forced out of a reorder hole by its timeout.
    ReorderFlush {
        peer: PeerId,
        tid: Tid,
        released: usize,
    },
    TxCompletion {
        released: usize,
        had_error: bool,
    },
    ContractViolation(Violation),
}

impl Event {
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Event::PoolExhausted { .. } => EventType::PoolExhausted,
            Event::ReorderFlush { .. } => EventType::ReorderFlush,
            Event::TxCompletion { .. } => EventType::TxCompletion,
            Event::ContractViolation(_) => EventType::ContractViolation,
        }
    }
}

/// A caller broke an API contract; the offending call was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    DoubleRelease { id: DescId },
    UnknownDescriptor { id: DescId },
    DoubleActivation { peer: PeerId, tid: Tid },
    DanglingTimeout { peer: PeerId, tid: Tid },
    StaleUnsubscribe,
}

type Callback = Box<dyn Fn(&Event) + Send + Sync>;

/// Opaque token returned by [`Notifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    event_type: EventType,
    id: u64,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }
}

#[derive(Debug)]
pub enum SubscribeError {
    StorageExhausted,
}

#[derive(Debug)]
pub enum UnsubscribeError {
    NotSubscribed,
}

struct Registry {
    subscribers: HashMap<EventType, Vec<(u64, Callback)>>,
    len: usize,
    len_cap: usize,
    next_id: u64,
}

impl Registry {
    fn check_rep(&self) {
        let len: usize = self.subscribers.values().map(Vec::len).sum();
        assert_eq!(len, self.len);
        assert!(self.len <= self.len_cap);
    }
}

pub struct Notifier<D: ExclusionDomain = SpinDomain> {
    registry: D::Guarded<Registry>,
}

impl<D: ExclusionDomain> Notifier<D> {
    #[must_use]
    pub fn new(max_subscriptions: usize) -> Self {
        Notifier {
            registry: <D::Guarded<Registry> as Lock<Registry>>::new(Registry {
                subscribers: HashMap::new(),
                len: 0,
                len_cap: max_subscriptions,
                next_id: 0,
            }),
        }
    }

    pub fn subscribe<F>(
        &self,
        event_type: EventType,
        callback: F,
    ) -> Result<SubscriptionHandle, SubscribeError>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let result = self.registry.with(|registry| {
            if registry.len == registry.len_cap {
                return Err(SubscribeError::StorageExhausted);
            }
            let id = registry.next_id;
            registry.next_id += 1;
            registry
                .subscribers
                .entry(event_type)
                .or_default()
                .push((id, Box::new(callback)));
            registry.len += 1;
            registry.check_rep();
            Ok(SubscriptionHandle { event_type, id })
        });
        if result.is_err() {
            log::warn!(target: "txrx::event", "subscription storage exhausted ({:?})", event_type);
        }
        result
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), UnsubscribeError> {
        let removed = self.registry.with(|registry| {
            let subscribers = registry.subscribers.get_mut(&handle.event_type)?;
            let pos = subscribers.iter().position(|(id, _)| *id == handle.id)?;
            let (_, callback) = subscribers.swap_remove(pos);
            if subscribers.is_empty() {
                registry.subscribers.remove(&handle.event_type);
            }
            registry.len -= 1;
            registry.check_rep();
            Some(callback)
        });
        // the callback and its captures are dropped outside the registry lock
        if let Some(callback) = removed {
            drop(callback);
            Ok(())
        } else {
            log::warn!(target: "txrx::event", "unsubscribe of unknown handle {:?}", handle);
            self.publish(&Event::ContractViolation(Violation::StaleUnsubscribe));
            Err(UnsubscribeError::NotSubscribed)
        }
    }

    pub fn publish(&self, event: &Event) {
        let event_type = event.event_type();
        self.registry.with(|registry| {
            if let Some(subscribers) = registry.subscribers.get(&event_type) {
                for (_, callback) in subscribers {
                    callback(event);
                }
            }
        });
    }

    #[must_use]
    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.registry.with(|registry| {
            registry
                .subscribers
                .get(&event_type)
                .map_or(0, Vec::len)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use crate::utils::excl::MutexDomain;

    use super::*;

    fn counter<D: ExclusionDomain>(
        notifier: &Notifier<D>,
        event_type: EventType,
    ) -> (SubscriptionHandle, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let handle = notifier
            .subscribe(event_type, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        (handle, count)
    }

    #[test]
    fn fan_out_to_every_subscriber() {
        let notifier: Notifier = Notifier::new(8);
        let (_h1, c1) = counter(&notifier, EventType::PoolExhausted);
        let (_h2, c2) = counter(&notifier, EventType::PoolExhausted);
        let (_h3, c3) = counter(&notifier, EventType::ReorderFlush);

        notifier.publish(&Event::PoolExhausted { capacity: 4 });

        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c2.load(Ordering::SeqCst), 1);
        assert_eq!(c3.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn publish_without_subscribers() {
        let notifier: Notifier<MutexDomain> = Notifier::new(1);
        notifier.publish(&Event::TxCompletion {
            released: 1,
            had_error: false,
        });
        assert_eq!(notifier.subscriber_count(EventType::TxCompletion), 0);
    }

    #[test]
    fn no_delivery_after_unsubscribe() {
        let notifier: Notifier = Notifier::new(8);
        let (handle, count) = counter(&notifier, EventType::PoolExhausted);
        notifier.unsubscribe(handle).unwrap();
        notifier.publish(&Event::PoolExhausted { capacity: 4 });
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_drops_callback() {
        let notifier: Notifier = Notifier::new(8);
        let captured = Arc::new(());
        let handle = {
            let captured = Arc::clone(&captured);
            notifier
                .subscribe(EventType::TxCompletion, move |_| {
                    let _ = &captured;
                })
                .unwrap()
        };
        assert_eq!(Arc::strong_count(&captured), 2);
        notifier.unsubscribe(handle).unwrap();
        assert_eq!(Arc::strong_count(&captured), 1);
        assert_eq!(notifier.subscriber_count(EventType::TxCompletion), 0);
    }

    #[test]
    fn storage_exhausted() {
        let notifier: Notifier = Notifier::new(1);
        let (handle, _) = counter(&notifier, EventType::PoolExhausted);
        match notifier.subscribe(EventType::ReorderFlush, |_| ()) {
            Err(SubscribeError::StorageExhausted) => (),
            Ok(_) => panic!(),
        }
        // freed storage is reusable
        notifier.unsubscribe(handle).unwrap();
        assert!(notifier.subscribe(EventType::ReorderFlush, |_| ()).is_ok());
    }

    #[test]
    fn double_unsubscribe_is_reported() {
        let notifier: Notifier = Notifier::new(8);
        let (violations, seen) = {
            let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let handle = notifier
                .subscribe(EventType::ContractViolation, move |event| {
                    sink.lock().push(event.clone());
                })
                .unwrap();
            (handle, seen)
        };
        let (handle, _) = counter(&notifier, EventType::PoolExhausted);

        notifier.unsubscribe(handle).unwrap();
        match notifier.unsubscribe(handle) {
            Err(UnsubscribeError::NotSubscribed) => (),
            Ok(_) => panic!(),
        }
        assert_eq!(notifier.subscriber_count(EventType::ContractViolation), 1);
        assert_eq!(
            *seen.lock(),
            vec![Event::ContractViolation(Violation::StaleUnsubscribe)]
        );
        notifier.unsubscribe(violations).unwrap();
    }

    #[test]
    fn concurrent_publish_and_unsubscribe() {
        let notifier: Arc<Notifier> = Arc::new(Notifier::new(64));
        let (handle, count) = counter(&*notifier, EventType::TxCompletion);
        let publisher = {
            let notifier = Arc::clone(&notifier);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    notifier.publish(&Event::TxCompletion {
                        released: 1,
                        had_error: false,
                    });
                }
            })
        };
        notifier.unsubscribe(handle).unwrap();
        let after = count.load(Ordering::SeqCst);
        publisher.join().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), after);
    }
}
