use std::cell::Cell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use tracing::warn;

use crate::events::GameEvent;
use crate::grid::Direction;

/// Undrained edges kept before the oldest are dropped.
pub const MAX_PENDING_EDGES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalInput {
    Direction(Direction),
    Action,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeState {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEdge {
    pub input: LogicalInput,
    pub state: EdgeState,
}

impl InputEdge {
    pub fn to_event(self) -> GameEvent {
        match (self.input, self.state) {
            (LogicalInput::Direction(direction), EdgeState::Pressed) => {
                GameEvent::InputDirectionDown { direction }
            }
            (LogicalInput::Direction(direction), EdgeState::Released) => {
                GameEvent::InputDirectionUp { direction }
            }
            (LogicalInput::Action, EdgeState::Pressed) => GameEvent::InputActionPress,
            (LogicalInput::Action, EdgeState::Released) => GameEvent::InputActionRelease,
            (LogicalInput::Cancel, EdgeState::Pressed) => GameEvent::InputCancelPress,
            (LogicalInput::Cancel, EdgeState::Released) => GameEvent::InputCancelRelease,
        }
    }
}

/// Read handle onto the set of held directions.
///
/// Clones share state with the mapper that produced them, so the movement
/// controller can query holds without borrowing the mapper.
#[derive(Debug, Clone, Default)]
pub struct HeldDirections {
    bits: Rc<Cell<u8>>,
}

impl HeldDirections {
    pub fn is_held(&self, direction: Direction) -> bool {
        self.bits.get() & direction.bit() != 0
    }

    pub fn any(&self) -> bool {
        self.bits.get() != 0
    }

    fn set(&self, direction: Direction, held: bool) {
        let bits = self.bits.get();
        let next = if held {
            bits | direction.bit()
        } else {
            bits & !direction.bit()
        };
        self.bits.set(next);
    }

    fn clear(&self) {
        self.bits.set(0);
    }
}

/// Raw key or touch identifiers mapped to logical inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBindings {
    bindings: HashMap<String, LogicalInput>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        let mut bindings = Self::empty();
        for (raw, direction) in [
            ("ArrowUp", Direction::Up),
            ("KeyW", Direction::Up),
            ("TouchUp", Direction::Up),
            ("ArrowDown", Direction::Down),
            ("KeyS", Direction::Down),
            ("TouchDown", Direction::Down),
            ("ArrowLeft", Direction::Left),
            ("KeyA", Direction::Left),
            ("TouchLeft", Direction::Left),
            ("ArrowRight", Direction::Right),
            ("KeyD", Direction::Right),
            ("TouchRight", Direction::Right),
        ] {
            bindings.bind(raw, LogicalInput::Direction(direction));
        }
        for raw in ["Enter", "Space", "KeyZ", "TouchA"] {
            bindings.bind(raw, LogicalInput::Action);
        }
        for raw in ["Escape", "KeyX", "Backspace", "TouchB"] {
            bindings.bind(raw, LogicalInput::Cancel);
        }
        bindings
    }
}

impl KeyBindings {
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    pub fn bind(&mut self, raw: &str, input: LogicalInput) {
        self.bindings.insert(raw.to_string(), input);
    }

    pub fn resolve(&self, raw: &str) -> Option<LogicalInput> {
        self.bindings.get(raw).copied()
    }
}

/// Turns raw device key events into logical press/release edges.
///
/// Several raw keys may map to one logical input; the logical input is down
/// while any of them is held and only the first press and last release
/// produce edges. Platform auto-repeat presses are ignored.
#[derive(Debug, Default)]
pub struct InputMapper {
    bindings: KeyBindings,
    held_keys: HashSet<String>,
    held_directions: HeldDirections,
    edges: VecDeque<InputEdge>,
}

impl InputMapper {
    pub fn new(bindings: KeyBindings) -> Self {
        Self {
            bindings,
            held_keys: HashSet::new(),
            held_directions: HeldDirections::default(),
            edges: VecDeque::new(),
        }
    }

    pub fn held_directions(&self) -> HeldDirections {
        self.held_directions.clone()
    }

    pub fn is_held(&self, direction: Direction) -> bool {
        self.held_directions.is_held(direction)
    }

    pub fn is_down(&self, input: LogicalInput) -> bool {
        self.held_keys
            .iter()
            .any(|key| self.bindings.resolve(key) == Some(input))
    }

    pub fn press(&mut self, raw: &str) -> Option<GameEvent> {
        let input = self.bindings.resolve(raw)?;
        if self.held_keys.contains(raw) {
            return None;
        }
        let was_down = self.is_down(input);
        self.held_keys.insert(raw.to_string());
        if was_down {
            return None;
        }
        Some(self.record_edge(input, EdgeState::Pressed))
    }

    pub fn release(&mut self, raw: &str) -> Option<GameEvent> {
        let input = self.bindings.resolve(raw)?;
        if !self.held_keys.remove(raw) {
            return None;
        }
        if self.is_down(input) {
            return None;
        }
        Some(self.record_edge(input, EdgeState::Released))
    }

    /// Releases everything, e.g. when the window loses focus.
    pub fn release_all(&mut self) -> Vec<GameEvent> {
        let mut released: Vec<LogicalInput> = self
            .held_keys
            .drain()
            .filter_map(|key| self.bindings.resolve(&key))
            .collect();
        released.sort_by_key(|input| match input {
            LogicalInput::Direction(direction) => direction.bit(),
            LogicalInput::Action => 0x10,
            LogicalInput::Cancel => 0x20,
        });
        released.dedup();
        self.held_directions.clear();
        released
            .into_iter()
            .map(|input| self.record_edge(input, EdgeState::Released))
            .collect()
    }

    /// Edges recorded since the last drain, oldest first. At most
    /// [`MAX_PENDING_EDGES`] are kept.
    pub fn drain_edges(&mut self) -> Vec<InputEdge> {
        self.edges.drain(..).collect()
    }

    pub fn pending_edges(&self) -> usize {
        self.edges.len()
    }

    fn record_edge(&mut self, input: LogicalInput, state: EdgeState) -> GameEvent {
        if let LogicalInput::Direction(direction) = input {
            self.held_directions
                .set(direction, state == EdgeState::Pressed);
        }
        let edge = InputEdge { input, state };
        if self.edges.len() == MAX_PENDING_EDGES {
            if let Some(dropped) = self.edges.pop_front() {
                warn!(?dropped, "input_edge_buffer_full");
            }
        }
        self.edges.push_back(edge);
        edge.to_event()
    }
}
