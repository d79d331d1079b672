mod bus;
mod kinds;
mod queue;

pub use bus::{
    EventBus, EventBusError, HandlerError, HandlerResult, SubscriptionId, SubscriptionSet,
    DEFAULT_FAILURE_THRESHOLD,
};
pub use kinds::{EventEnvelope, EventKind, GameEvent, EVENT_SCHEMA_VERSION};
pub use queue::EventQueue;
