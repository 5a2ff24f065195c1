#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Typed publish/subscribe hub connecting the round systems.
//!
//! Handlers are registered against the runtime type of the payload they
//! receive. Publishing is synchronous: every handler registered for the
//! payload type runs, in registration order, before [`EventBus::publish`]
//! returns. A handler that fails is logged and recorded as a
//! [`HandlerFailure`]; it never prevents the remaining handlers from running
//! and never reaches the publisher.
//!
//! Registrations are owned by [`Subscription`] guards that unregister the
//! handler when dropped, so a subscriber's handlers cannot outlive it.

use std::{
    any::{type_name, Any, TypeId},
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    fmt,
    rc::{Rc, Weak},
};

use anyhow::anyhow;
use rampart_core::EventSource;
use tracing::{error, trace, warn};

type ErasedHandler = dyn FnMut(EventSource, &dyn Any) -> anyhow::Result<()>;

/// Identifier assigned to a handler registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Record of a handler invocation that returned an error.
#[derive(Debug)]
pub struct HandlerFailure {
    /// Type name of the payload being dispatched.
    pub event: &'static str,
    /// Registration whose handler failed.
    pub subscription: SubscriptionId,
    /// Publisher of the payload.
    pub source: EventSource,
    /// Error returned by the handler.
    pub error: anyhow::Error,
}

struct Slot {
    id: SubscriptionId,
    active: Cell<bool>,
    handler: RefCell<Box<ErasedHandler>>,
}

struct Topic {
    type_name: &'static str,
    slots: Vec<Rc<Slot>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    topics: HashMap<TypeId, Topic>,
}

#[derive(Default)]
struct Shared {
    registry: RefCell<Registry>,
    failures: RefCell<Vec<HandlerFailure>>,
}

/// Cheaply cloneable handle to a session-wide event bus.
///
/// Clones share the same registrations. The bus is single-threaded and is
/// meant to be owned by the session composition root.
#[derive(Clone, Default)]
pub struct EventBus {
    shared: Rc<Shared>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for payloads of type `T`.
    ///
    /// Handlers for the same type are dispatched in registration order. The
    /// returned guard unregisters the handler when dropped.
    pub fn subscribe<T, F>(&self, mut handler: F) -> Subscription
    where
        T: Any,
        F: FnMut(EventSource, &T) -> anyhow::Result<()> + 'static,
    {
        let erased: Box<ErasedHandler> = Box::new(move |source, payload: &dyn Any| {
            match payload.downcast_ref::<T>() {
                Some(payload) => handler(source, payload),
                None => Err(anyhow!("payload is not a {}", type_name::<T>())),
            }
        });

        let mut registry = self.shared.registry.borrow_mut();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry
            .topics
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Topic {
                type_name: type_name::<T>(),
                slots: Vec::new(),
            })
            .slots
            .push(Rc::new(Slot {
                id,
                active: Cell::new(true),
                handler: RefCell::new(erased),
            }));
        trace!(event = type_name::<T>(), subscription = id.0, "handler subscribed");

        Subscription {
            bus: Rc::downgrade(&self.shared),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            id,
            armed: true,
        }
    }

    /// Removes the registration `id` for payload type `T`.
    ///
    /// Returns `false` and logs a warning when the type was never subscribed
    /// or the registration is unknown.
    pub fn unsubscribe<T: Any>(&self, id: SubscriptionId) -> bool {
        remove(&self.shared, TypeId::of::<T>(), type_name::<T>(), id)
    }

    /// Delivers `payload` to every handler registered for `T`.
    ///
    /// Handlers registered or removed while the dispatch is running do not
    /// affect which of the already-registered handlers are called, except that
    /// a handler removed mid-dispatch is skipped.
    ///
    /// Failures are reported by returning `Err` from the handler; those are
    /// isolated and recorded. A panicking handler is a bug and is not caught:
    /// the panic unwinds through `publish` and the remaining handlers are not
    /// called.
    pub fn publish<T: Any>(&self, source: EventSource, payload: &T) {
        let slots = {
            let registry = self.shared.registry.borrow();
            match registry.topics.get(&TypeId::of::<T>()) {
                Some(topic) => topic.slots.clone(),
                None => {
                    trace!(event = type_name::<T>(), "no subscribers");
                    return;
                }
            }
        };

        for slot in slots {
            if !slot.active.get() {
                continue;
            }

            let outcome = match slot.handler.try_borrow_mut() {
                Ok(mut handler) => (&mut **handler)(source, payload as &dyn Any),
                Err(_) => Err(anyhow!("handler re-entered while it was already running")),
            };

            if let Err(error) = outcome {
                error!(
                    event = type_name::<T>(),
                    subscription = slot.id.0,
                    ?source,
                    error = %error,
                    "event handler failed"
                );
                self.shared.failures.borrow_mut().push(HandlerFailure {
                    event: type_name::<T>(),
                    subscription: slot.id,
                    source,
                    error,
                });
            }
        }
    }

    /// Number of handlers currently registered for `T`.
    #[must_use]
    pub fn subscriber_count<T: Any>(&self) -> usize {
        self.shared
            .registry
            .borrow()
            .topics
            .get(&TypeId::of::<T>())
            .map_or(0, |topic| topic.slots.len())
    }

    /// Takes the handler failures recorded since the last call.
    pub fn drain_failures(&self) -> Vec<HandlerFailure> {
        std::mem::take(&mut *self.shared.failures.borrow_mut())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.shared.registry.borrow();
        let mut topics: Vec<(&str, usize)> = registry
            .topics
            .values()
            .map(|topic| (topic.type_name, topic.slots.len()))
            .collect();
        topics.sort_unstable();
        f.debug_struct("EventBus").field("topics", &topics).finish()
    }
}

fn remove(shared: &Shared, type_id: TypeId, type_name: &'static str, id: SubscriptionId) -> bool {
    let mut registry = shared.registry.borrow_mut();
    let Some(topic) = registry.topics.get_mut(&type_id) else {
        warn!(
            event = type_name,
            subscription = id.0,
            "unsubscribe for an event type that was never subscribed"
        );
        return false;
    };

    let Some(index) = topic.slots.iter().position(|slot| slot.id == id) else {
        warn!(
            event = type_name,
            subscription = id.0,
            "unsubscribe for an unknown registration"
        );
        return false;
    };

    let slot = topic.slots.remove(index);
    slot.active.set(false);
    trace!(event = type_name, subscription = id.0, "handler unsubscribed");
    true
}

/// Guard that keeps a handler registered on the bus.
///
/// Dropping the guard unregisters the handler. A guard outliving its bus is
/// inert.
#[must_use = "dropping a subscription immediately unregisters its handler"]
pub struct Subscription {
    bus: Weak<Shared>,
    type_id: TypeId,
    type_name: &'static str,
    id: SubscriptionId,
    armed: bool,
}

impl Subscription {
    /// Identifier of the registration.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Type name of the payload the handler receives.
    #[must_use]
    pub const fn event(&self) -> &'static str {
        self.type_name
    }

    /// Unregisters the handler now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Leaves the handler registered for as long as the bus lives.
    pub fn detach(mut self) {
        self.armed = false;
    }

    fn release(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        if let Some(shared) = self.bus.upgrade() {
            let _ = remove(&shared, self.type_id, self.type_name, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.type_name)
            .field("id", &self.id)
            .field("armed", &self.armed)
            .finish()
    }
}

/// Mailbox that turns bus traffic into messages a system drains on its own
/// schedule.
///
/// The inbox owns the subscriptions feeding it, so dropping the owning system
/// unregisters its handlers.
pub struct Inbox<M> {
    queue: Rc<RefCell<VecDeque<M>>>,
    subscriptions: Vec<Subscription>,
}

impl<M: 'static> Inbox<M> {
    /// Creates an inbox with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::new())),
            subscriptions: Vec::new(),
        }
    }

    /// Subscribes to payloads of type `T`, queueing the message produced by
    /// `map` for each one. Payloads for which `map` returns `None` are ignored.
    pub fn listen<T, F>(&mut self, bus: &EventBus, map: F)
    where
        T: Any,
        F: Fn(EventSource, &T) -> Option<M> + 'static,
    {
        let queue = Rc::clone(&self.queue);
        let subscription = bus.subscribe::<T, _>(move |source, payload| {
            if let Some(message) = map(source, payload) {
                queue
                    .try_borrow_mut()
                    .map_err(|_| anyhow!("inbox is being drained"))?
                    .push_back(message);
            }
            Ok(())
        });
        self.subscriptions.push(subscription);
    }

    /// Removes and returns every queued message in arrival order.
    pub fn drain(&self) -> Vec<M> {
        self.queue.borrow_mut().drain(..).collect()
    }

    /// Discards every queued message.
    pub fn clear(&self) {
        self.queue.borrow_mut().clear();
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Reports whether no message is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

impl<M: 'static> Default for Inbox<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for Inbox<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbox")
            .field("queued", &self.queue.borrow().len())
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping;

    #[test]
    fn subscription_ids_are_unique_across_types() {
        let bus = EventBus::new();
        let first = bus.subscribe::<Ping, _>(|_, _| Ok(()));
        let second = bus.subscribe::<u32, _>(|_, _| Ok(()));
        assert_ne!(first.id(), second.id());
        assert!(first.event().ends_with("Ping"));
    }

    #[test]
    fn detached_subscription_stays_registered() {
        let bus = EventBus::new();
        bus.subscribe::<Ping, _>(|_, _| Ok(())).detach();
        assert_eq!(bus.subscriber_count::<Ping>(), 1);
    }

    #[test]
    fn subscription_outliving_bus_is_inert() {
        let subscription = {
            let bus = EventBus::new();
            bus.subscribe::<Ping, _>(|_, _| Ok(()))
        };
        drop(subscription);
    }
}
