use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::{EventEnvelope, EventKind, EventQueue, GameEvent};

/// Consecutive failures after which a listener is unsubscribed.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

pub type HandlerResult = Result<(), HandlerError>;

type Handler = dyn FnMut(&GameEvent, &mut EventQueue) -> HandlerResult;
type SharedHandler = Rc<RefCell<Box<Handler>>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            format!("panicked: {text}")
        } else if let Some(text) = payload.downcast_ref::<String>() {
            format!("panicked: {text}")
        } else {
            "panicked".to_string()
        };
        Self { message }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventBusError {
    #[error("unknown event name: {name}")]
    UnknownEvent { name: String },
    #[error("unsupported event envelope version: expected {expected}, got {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("invalid payload for event {name}: {message}")]
    InvalidPayload { name: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    kind: EventKind,
    serial: u64,
}

impl SubscriptionId {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

struct Listener {
    serial: u64,
    handler: SharedHandler,
    consecutive_failures: u32,
}

#[derive(Default)]
struct Registry {
    next_serial: u64,
    listeners: HashMap<EventKind, Vec<Listener>>,
}

/// Single-threaded publish/subscribe hub.
///
/// Listeners run in subscription order. A listener that fails (returns an
/// error or panics) never stops later listeners from running; after
/// `failure_threshold` consecutive failures it is removed. Events a listener
/// pushes into its queue are dispatched right after it returns.
pub struct EventBus {
    registry: RefCell<Registry>,
    failure_threshold: u32,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_failure_threshold(DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn with_failure_threshold(failure_threshold: u32) -> Self {
        Self {
            registry: RefCell::new(Registry::default()),
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&GameEvent, &mut EventQueue) -> HandlerResult + 'static,
    {
        let mut registry = self.registry.borrow_mut();
        let serial = registry.next_serial;
        registry.next_serial = registry.next_serial.wrapping_add(1);
        let boxed: Box<Handler> = Box::new(handler);
        registry.listeners.entry(kind).or_default().push(Listener {
            serial,
            handler: Rc::new(RefCell::new(boxed)),
            consecutive_failures: 0,
        });
        SubscriptionId { kind, serial }
    }

    pub fn subscribe_named<F>(&self, name: &str, handler: F) -> Result<SubscriptionId, EventBusError>
    where
        F: FnMut(&GameEvent, &mut EventQueue) -> HandlerResult + 'static,
    {
        let kind: EventKind = name.parse()?;
        Ok(self.subscribe(kind, handler))
    }

    /// Returns false when the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.borrow_mut();
        let Some(listeners) = registry.listeners.get_mut(&id.kind) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|listener| listener.serial != id.serial);
        before != listeners.len()
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.registry
            .borrow()
            .listeners
            .get(&id.kind)
            .is_some_and(|listeners| listeners.iter().any(|l| l.serial == id.serial))
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry
            .borrow()
            .listeners
            .get(&kind)
            .map_or(0, Vec::len)
    }

    pub fn total_listener_count(&self) -> usize {
        self.registry.borrow().listeners.values().map(Vec::len).sum()
    }

    /// Delivers `event` to a snapshot of its listeners, then each
    /// listener's follow-ups. Follow-ups queued by a listener that fails
    /// are discarded.
    pub fn emit(&self, event: GameEvent) {
        let kind = event.kind();
        let snapshot: Vec<(u64, SharedHandler)> = {
            let registry = self.registry.borrow();
            match registry.listeners.get(&kind) {
                Some(listeners) => listeners
                    .iter()
                    .map(|listener| (listener.serial, Rc::clone(&listener.handler)))
                    .collect(),
                None => return,
            }
        };

        for (serial, handler) in snapshot {
            let mut follow_ups = EventQueue::new();
            let outcome = match handler.try_borrow_mut() {
                Ok(mut handler) => invoke(&mut **handler, &event, &mut follow_ups),
                Err(_) => {
                    warn!(event = %kind, serial, "event_listener_reentered_skipped");
                    continue;
                }
            };
            match outcome {
                Ok(()) => {
                    self.record_success(kind, serial);
                    for follow_up in follow_ups.take() {
                        self.emit(follow_up);
                    }
                }
                Err(error) => {
                    if !follow_ups.is_empty() {
                        warn!(
                            event = %kind,
                            serial,
                            discarded = follow_ups.len(),
                            "event_follow_ups_discarded"
                        );
                    }
                    self.record_failure(kind, serial, &error);
                }
            }
        }
    }

    pub fn publish(&self, queue: &mut EventQueue) {
        for event in queue.take() {
            self.emit(event);
        }
    }

    pub fn emit_named(&self, name: &str, payload: Value) -> Result<(), EventBusError> {
        self.emit_envelope(&EventEnvelope::new(name, payload))
    }

    pub fn emit_envelope(&self, envelope: &EventEnvelope) -> Result<(), EventBusError> {
        let event = envelope.decode()?;
        self.emit(event);
        Ok(())
    }

    fn record_success(&self, kind: EventKind, serial: u64) {
        let mut registry = self.registry.borrow_mut();
        if let Some(listener) = find_listener(&mut registry, kind, serial) {
            listener.consecutive_failures = 0;
        }
    }

    fn record_failure(&self, kind: EventKind, serial: u64, error: &HandlerError) {
        let mut registry = self.registry.borrow_mut();
        let Some(listener) = find_listener(&mut registry, kind, serial) else {
            debug!(event = %kind, serial, error = %error, "event_listener_failed_after_unsubscribe");
            return;
        };
        listener.consecutive_failures = listener.consecutive_failures.saturating_add(1);
        let failures = listener.consecutive_failures;
        warn!(event = %kind, serial, failures, error = %error, "event_listener_failed");

        if failures >= self.failure_threshold {
            if let Some(listeners) = registry.listeners.get_mut(&kind) {
                listeners.retain(|listener| listener.serial != serial);
            }
            warn!(
                event = %kind,
                serial,
                threshold = self.failure_threshold,
                "event_listener_removed"
            );
        }
    }
}

fn find_listener(registry: &mut Registry, kind: EventKind, serial: u64) -> Option<&mut Listener> {
    registry
        .listeners
        .get_mut(&kind)?
        .iter_mut()
        .find(|listener| listener.serial == serial)
}

fn invoke(handler: &mut Handler, event: &GameEvent, queue: &mut EventQueue) -> HandlerResult {
    match panic::catch_unwind(AssertUnwindSafe(|| handler(event, queue))) {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::from_panic(payload)),
    }
}

/// Subscriptions owned by one component, released together.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    ids: Vec<SubscriptionId>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: SubscriptionId) {
        self.ids.push(id);
    }

    pub fn append(&mut self, other: &mut SubscriptionSet) {
        self.ids.append(&mut other.ids);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Unsubscribes everything and returns how many listeners were removed.
    pub fn release(&mut self, bus: &EventBus) -> usize {
        self.ids
            .drain(..)
            .filter(|id| bus.unsubscribe(*id))
            .count()
    }
}

impl Extend<SubscriptionId> for SubscriptionSet {
    fn extend<T: IntoIterator<Item = SubscriptionId>>(&mut self, iter: T) {
        self.ids.extend(iter);
    }
}
