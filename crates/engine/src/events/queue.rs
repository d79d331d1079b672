use super::GameEvent;

/// Outbox for events produced while a component is borrowed.
///
/// Components push into a queue during an update; the owner publishes it on
/// the bus once its own borrow has ended.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EventQueue {
    events: Vec<GameEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameEvent> {
        self.events.iter()
    }

    pub fn take(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Extend<GameEvent> for EventQueue {
    fn extend<T: IntoIterator<Item = GameEvent>>(&mut self, iter: T) {
        self.events.extend(iter);
    }
}
