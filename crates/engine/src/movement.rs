use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, info};

use crate::config::GameConfig;
use crate::events::{EventBus, EventKind, EventQueue, GameEvent, SubscriptionSet};
use crate::grid::{Direction, GridPos, PixelPos};
use crate::input::HeldDirections;
use crate::npc::NpcRegistry;
use crate::world::{is_blocked, TileMap};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepProgress {
    pub from: PixelPos,
    pub to: PixelPos,
    pub elapsed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovementState {
    Idle,
    Moving(StepProgress),
}

/// Shared on/off switch for player stepping.
///
/// Turned off while a dialogue or quiz is open and back on when it ends.
/// While off, intents still queue but no step starts.
#[derive(Debug, Clone)]
pub struct MovementGate {
    enabled: Rc<Cell<bool>>,
}

impl Default for MovementGate {
    fn default() -> Self {
        Self {
            enabled: Rc::new(Cell::new(true)),
        }
    }
}

impl MovementGate {
    /// Events that flip the gate, with the state each one sets.
    pub const TRANSITIONS: [(EventKind, bool); 5] = [
        (EventKind::DialogueStarted, false),
        (EventKind::QuizStarted, false),
        (EventKind::QuizTrigger, false),
        (EventKind::DialogueFinished, true),
        (EventKind::QuizCompleted, true),
    ];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.replace(enabled) != enabled {
            info!(enabled, "movement_gate_changed");
        }
    }

    pub fn subscribe(&self, bus: &EventBus) -> SubscriptionSet {
        let mut subscriptions = SubscriptionSet::new();
        for (kind, enabled) in Self::TRANSITIONS {
            let gate = self.clone();
            subscriptions.push(bus.subscribe(kind, move |_, _| {
                gate.set_enabled(enabled);
                Ok(())
            }));
        }
        subscriptions
    }
}

/// What the controller reads from the world while stepping.
pub struct MovementWorld<'a> {
    pub map: &'a TileMap,
    pub npcs: &'a NpcRegistry,
    pub held: &'a HeldDirections,
}

/// Grid-stepping player controller.
///
/// A step moves the logical cell immediately and interpolates the pixel
/// position over `step_seconds`. Intents queue FIFO and are consumed only
/// once the step in progress completes; a blocked intent turns the player
/// and is dropped.
#[derive(Debug, Clone)]
pub struct PlayerMovementController {
    grid: GridPos,
    pixel: PixelPos,
    facing: Direction,
    state: MovementState,
    intents: VecDeque<Direction>,
    gate: MovementGate,
    tile_size: u32,
    step_seconds: f32,
}

impl PlayerMovementController {
    pub fn new(start: GridPos, facing: Direction, config: &GameConfig) -> Self {
        let tile_size = config.tile_size.max(1);
        Self {
            grid: start,
            pixel: start.to_pixel(tile_size),
            facing,
            state: MovementState::Idle,
            intents: VecDeque::new(),
            gate: MovementGate::new(),
            tile_size,
            step_seconds: if config.step_duration_seconds > 0.0 {
                config.step_duration_seconds
            } else {
                GameConfig::default().step_duration_seconds
            },
        }
    }

    pub fn with_gate(mut self, gate: MovementGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &MovementGate {
        &self.gate
    }

    pub fn grid_position(&self) -> GridPos {
        self.grid
    }

    pub fn pixel_position(&self) -> PixelPos {
        self.pixel
    }

    pub fn facing(&self) -> Direction {
        self.facing
    }

    pub fn state(&self) -> MovementState {
        self.state
    }

    pub fn is_moving(&self) -> bool {
        matches!(self.state, MovementState::Moving(_))
    }

    pub fn step_seconds(&self) -> f32 {
        self.step_seconds
    }

    pub fn pending_intents(&self) -> usize {
        self.intents.len()
    }

    pub fn enqueue(&mut self, direction: Direction) {
        self.intents.push_back(direction);
    }

    pub fn clear_intents(&mut self) {
        self.intents.clear();
    }

    /// Moves without animation, e.g. on map entry or through a warp.
    pub fn place(&mut self, position: GridPos, facing: Direction) {
        self.grid = position;
        self.pixel = position.to_pixel(self.tile_size);
        self.facing = facing;
        self.state = MovementState::Idle;
        self.intents.clear();
    }

    pub fn faced_cell(&self) -> GridPos {
        self.grid.step(self.facing)
    }

    pub fn update(&mut self, dt: f32, world: &MovementWorld<'_>, events: &mut EventQueue) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        let MovementState::Moving(mut step) = self.state else {
            if self.gate.is_enabled() {
                self.consume_intents(world, events, 0.0);
            }
            return;
        };

        step.elapsed += dt;
        let fraction = (step.elapsed / self.step_seconds).min(1.0);
        if fraction < 1.0 {
            self.pixel = step.from.lerp(step.to, fraction);
            self.state = MovementState::Moving(step);
            return;
        }

        self.pixel = step.to;
        self.state = MovementState::Idle;
        let overflow = step.elapsed - self.step_seconds;

        if let Some(warp) = world.map.warp_at(self.grid) {
            debug!(col = self.grid.col, row = self.grid.row, target = %warp.target_map, "player_on_warp");
            events.emit(GameEvent::PlayerEnterWarp { warp: warp.clone() });
            return;
        }
        if !self.gate.is_enabled() {
            return;
        }
        if self.intents.is_empty() && world.held.is_held(self.facing) {
            self.try_step(self.facing, world, events, overflow);
        } else {
            self.consume_intents(world, events, overflow);
        }
    }

    /// Interacts with whatever occupies the faced cell.
    pub fn interact(&self, npcs: &NpcRegistry, events: &mut EventQueue) -> bool {
        if self.is_moving() || !self.gate.is_enabled() {
            return false;
        }
        let cell = self.faced_cell();
        npcs.interact_at(cell.col, cell.row, events)
    }

    fn consume_intents(&mut self, world: &MovementWorld<'_>, events: &mut EventQueue, carried: f32) {
        while let Some(direction) = self.intents.pop_front() {
            if self.try_step(direction, world, events, carried) {
                break;
            }
        }
    }

    fn try_step(
        &mut self,
        direction: Direction,
        world: &MovementWorld<'_>,
        events: &mut EventQueue,
        carried: f32,
    ) -> bool {
        self.facing = direction;
        let target = self.grid.step(direction);
        if is_blocked(world.map, target.col, target.row)
            || world.npcs.get_at(target.col, target.row).is_some()
        {
            debug!(%direction, col = target.col, row = target.row, "player_step_blocked");
            return false;
        }

        let from = self.grid.to_pixel(self.tile_size);
        let to = target.to_pixel(self.tile_size);
        let elapsed = carried.clamp(0.0, self.step_seconds);
        self.grid = target;
        self.pixel = from.lerp(to, elapsed / self.step_seconds);
        self.state = MovementState::Moving(StepProgress { from, to, elapsed });
        events.emit(GameEvent::PlayerMoved { pos: target });
        true
    }
}
