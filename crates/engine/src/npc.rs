use serde_json::Value;
use tracing::{debug, warn};

use crate::events::{EventQueue, GameEvent};
use crate::grid::{Direction, GridPos};
use crate::world::{MapObject, MapObjectKind, TileMap};

/// Something an NPC does. Interaction fires the first behavior that has a
/// trigger, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum NpcBehavior {
    Dialogue {
        dialogue_id: String,
    },
    Lesson {
        lesson_id: String,
        xp: Option<u32>,
        vocab: Vec<String>,
    },
    Quiz {
        quiz_id: String,
    },
    Patrol(PatrolRoute),
}

impl NpcBehavior {
    fn prompt(&self) -> Option<PromptKind> {
        match self {
            NpcBehavior::Dialogue { .. } => Some(PromptKind::Talk),
            NpcBehavior::Lesson { .. } => Some(PromptKind::Lesson),
            NpcBehavior::Quiz { .. } => Some(PromptKind::Quiz),
            NpcBehavior::Patrol(_) => None,
        }
    }

    /// Returns false for behaviors without an interaction trigger.
    fn trigger(&self, events: &mut EventQueue) -> bool {
        match self {
            NpcBehavior::Dialogue { dialogue_id } => {
                events.emit(GameEvent::DialogueRequested {
                    id: dialogue_id.clone(),
                });
                true
            }
            NpcBehavior::Lesson {
                lesson_id,
                xp,
                vocab,
            } => {
                events.emit(GameEvent::LessonCompleted {
                    lesson: lesson_id.clone(),
                    xp: *xp,
                    vocab: vocab.clone(),
                });
                true
            }
            NpcBehavior::Quiz { quiz_id } => {
                events.emit(GameEvent::QuizTrigger {
                    quiz_id: quiz_id.clone(),
                });
                true
            }
            NpcBehavior::Patrol(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatrolRoute {
    path: Vec<GridPos>,
    index: usize,
    step_seconds: f32,
    elapsed: f32,
}

impl PatrolRoute {
    pub fn new(path: Vec<GridPos>, step_seconds: f32) -> Self {
        Self {
            path,
            index: 0,
            step_seconds,
            elapsed: 0.0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<GridPos> {
        self.path.get(self.index).copied()
    }

    fn advance(&mut self, dt: f32) {
        if self.path.len() < 2 || dt <= 0.0 {
            return;
        }
        if self.step_seconds <= 0.0 {
            self.index = (self.index + 1) % self.path.len();
            return;
        }
        self.elapsed += dt;
        while self.elapsed >= self.step_seconds {
            self.elapsed -= self.step_seconds;
            self.index = (self.index + 1) % self.path.len();
        }
    }
}

/// Placement data for one NPC, usually read from a map object layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NpcDefinition {
    pub id: String,
    pub name: String,
    pub position: GridPos,
    pub sprite: String,
    pub dialogue: Option<String>,
    pub quiz: Option<String>,
    pub lesson: Option<String>,
    pub lesson_xp: Option<u32>,
    pub lesson_vocab: Vec<String>,
    pub patrol: Vec<GridPos>,
}

impl NpcDefinition {
    pub fn from_map_object(object: &MapObject, map: &TileMap) -> Self {
        let id = object
            .property_str("id")
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("{}#{}", map.id(), object.id));
        let owned = |key: &str| object.property_str(key).map(ToString::to_string);
        Self {
            id,
            name: object.name.clone(),
            position: map.grid_of(object),
            sprite: owned("sprite").unwrap_or_else(|| "npc".to_string()),
            dialogue: owned("dialogue"),
            quiz: owned("quiz"),
            lesson: owned("lesson"),
            lesson_xp: object
                .property_i64("xp")
                .and_then(|xp| u32::try_from(xp).ok()),
            lesson_vocab: object
                .properties
                .get("vocab")
                .map(parse_word_list)
                .unwrap_or_default(),
            patrol: object
                .properties
                .get("patrol")
                .map(parse_patrol_path)
                .unwrap_or_default(),
        }
    }

    /// All NPC placements on the map's object layer.
    pub fn from_map(map: &TileMap) -> Vec<Self> {
        map.objects_of(MapObjectKind::Npc)
            .map(|object| Self::from_map_object(object, map))
            .collect()
    }
}

/// Accepts `"a, b"` or `["a", "b"]`.
fn parse_word_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) => text
            .split(',')
            .map(str::trim)
            .filter(|word| !word.is_empty())
            .map(ToString::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Accepts `"3,4; 3,5"` or `[[3, 4], [3, 5]]`.
fn parse_patrol_path(value: &Value) -> Vec<GridPos> {
    let parse_pair = |col: Option<i64>, row: Option<i64>| match (col, row) {
        (Some(col), Some(row)) => Some(GridPos::new(col as i32, row as i32)),
        _ => None,
    };
    let path: Option<Vec<GridPos>> = match value {
        Value::String(text) => text
            .split(';')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let mut parts = pair.split(',').map(|part| part.trim().parse::<i64>().ok());
                parse_pair(parts.next().flatten(), parts.next().flatten())
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let pair = item.as_array()?;
                parse_pair(pair.first()?.as_i64(), pair.get(1)?.as_i64())
            })
            .collect(),
        _ => None,
    };
    path.unwrap_or_else(|| {
        warn!(value = %value, "npc_patrol_path_invalid");
        Vec::new()
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Npc {
    id: String,
    name: String,
    home: GridPos,
    sprite: String,
    behaviors: Vec<NpcBehavior>,
}

impl Npc {
    pub fn from_definition(definition: NpcDefinition, patrol_step_seconds: f32) -> Self {
        let mut behaviors = Vec::new();
        if let Some(dialogue_id) = definition.dialogue {
            behaviors.push(NpcBehavior::Dialogue { dialogue_id });
        }
        if let Some(lesson_id) = definition.lesson {
            behaviors.push(NpcBehavior::Lesson {
                lesson_id,
                xp: definition.lesson_xp,
                vocab: definition.lesson_vocab,
            });
        }
        if let Some(quiz_id) = definition.quiz {
            behaviors.push(NpcBehavior::Quiz { quiz_id });
        }
        if !definition.patrol.is_empty() {
            behaviors.push(NpcBehavior::Patrol(PatrolRoute::new(
                definition.patrol,
                patrol_step_seconds,
            )));
        }
        Self {
            id: definition.id,
            name: definition.name,
            home: definition.position,
            sprite: definition.sprite,
            behaviors,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sprite(&self) -> &str {
        &self.sprite
    }

    pub fn behaviors(&self) -> &[NpcBehavior] {
        &self.behaviors
    }

    /// Current cell: the patrol waypoint if patrolling, else the placement.
    pub fn position(&self) -> GridPos {
        self.patrol()
            .and_then(PatrolRoute::current)
            .unwrap_or(self.home)
    }

    pub fn dialogue_id(&self) -> Option<&str> {
        self.behaviors.iter().find_map(|behavior| match behavior {
            NpcBehavior::Dialogue { dialogue_id } => Some(dialogue_id.as_str()),
            _ => None,
        })
    }

    pub fn is_interactable(&self) -> bool {
        self.behaviors.iter().any(|behavior| behavior.prompt().is_some())
    }

    fn patrol(&self) -> Option<&PatrolRoute> {
        self.behaviors.iter().find_map(|behavior| match behavior {
            NpcBehavior::Patrol(route) => Some(route),
            _ => None,
        })
    }

    fn update(&mut self, dt: f32) {
        for behavior in &mut self.behaviors {
            if let NpcBehavior::Patrol(route) = behavior {
                route.advance(dt);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Talk,
    Lesson,
    Quiz,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionPrompt {
    pub npc_id: String,
    pub npc_name: String,
    pub cell: GridPos,
    pub kind: PromptKind,
}

/// NPCs placed in the current scene.
#[derive(Debug, Clone, Default)]
pub struct NpcRegistry {
    npcs: Vec<Npc>,
    patrol_step_seconds: f32,
}

impl NpcRegistry {
    pub fn new(patrol_step_seconds: f32) -> Self {
        Self {
            npcs: Vec::new(),
            patrol_step_seconds,
        }
    }

    /// Replaces the current set.
    pub fn load(&mut self, definitions: impl IntoIterator<Item = NpcDefinition>) {
        let patrol_step_seconds = self.patrol_step_seconds;
        self.npcs = definitions
            .into_iter()
            .map(|definition| Npc::from_definition(definition, patrol_step_seconds))
            .collect();
        debug!(count = self.npcs.len(), "npcs_loaded");
    }

    pub fn clear(&mut self) {
        self.npcs.clear();
    }

    pub fn len(&self) -> usize {
        self.npcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.npcs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Npc> {
        self.npcs.iter()
    }

    pub fn get_at(&self, col: i32, row: i32) -> Option<&Npc> {
        let cell = GridPos::new(col, row);
        self.npcs.iter().find(|npc| npc.position() == cell)
    }

    pub fn update(&mut self, dt: f32) {
        for npc in &mut self.npcs {
            npc.update(dt);
        }
    }

    /// Fires the occupant's first triggerable behavior. Returns whether
    /// anything fired.
    pub fn interact_at(&self, col: i32, row: i32, events: &mut EventQueue) -> bool {
        let Some(npc) = self.get_at(col, row) else {
            return false;
        };
        let fired = npc
            .behaviors
            .iter()
            .any(|behavior| behavior.trigger(events));
        debug!(npc = %npc.id, col, row, fired, "npc_interaction");
        fired
    }

    /// What the player would interact with when facing `facing` from
    /// `player`. Read-only.
    pub fn prompt_for(&self, player: GridPos, facing: Direction) -> Option<InteractionPrompt> {
        let cell = player.step(facing);
        let npc = self.get_at(cell.col, cell.row)?;
        let kind = npc.behaviors.iter().find_map(NpcBehavior::prompt)?;
        Some(InteractionPrompt {
            npc_id: npc.id.clone(),
            npc_name: npc.name.clone(),
            cell,
            kind,
        })
    }
}
