use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::grid::{Direction, GridPos};
use crate::world::Warp;

use super::EventBusError;

/// Version stamped on every serialized event envelope.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Every event the game can publish. The serialized `name` is the wire name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameEvent {
    FrameTick {
        dt: f32,
    },
    PauseGame,
    ResumeGame,
    AssetLoaded {
        asset: String,
    },
    AssetsComplete,
    LessonCompleted {
        lesson: String,
        #[serde(default)]
        xp: Option<u32>,
        #[serde(default)]
        vocab: Vec<String>,
    },
    QuizStarted {
        id: String,
    },
    QuizCompleted {
        id: String,
        score: u32,
    },
    QuizTrigger {
        quiz_id: String,
    },
    DialogueRequested {
        id: String,
    },
    DialogueStarted {
        id: String,
    },
    DialogueFinished {
        id: String,
    },
    AreaEntered {
        area: String,
    },
    PlayerEnterWarp {
        warp: Warp,
    },
    PlayerMoved {
        pos: GridPos,
    },
    VocabularyLearned {
        word: String,
    },
    LevelUp {
        level: String,
        level_index: usize,
    },
    PlaySound {
        key: String,
    },
    InputDirectionDown {
        direction: Direction,
    },
    InputDirectionUp {
        direction: Direction,
    },
    InputActionPress,
    InputActionRelease,
    InputCancelPress,
    InputCancelRelease,
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::FrameTick { .. } => EventKind::FrameTick,
            GameEvent::PauseGame => EventKind::PauseGame,
            GameEvent::ResumeGame => EventKind::ResumeGame,
            GameEvent::AssetLoaded { .. } => EventKind::AssetLoaded,
            GameEvent::AssetsComplete => EventKind::AssetsComplete,
            GameEvent::LessonCompleted { .. } => EventKind::LessonCompleted,
            GameEvent::QuizStarted { .. } => EventKind::QuizStarted,
            GameEvent::QuizCompleted { .. } => EventKind::QuizCompleted,
            GameEvent::QuizTrigger { .. } => EventKind::QuizTrigger,
            GameEvent::DialogueRequested { .. } => EventKind::DialogueRequested,
            GameEvent::DialogueStarted { .. } => EventKind::DialogueStarted,
            GameEvent::DialogueFinished { .. } => EventKind::DialogueFinished,
            GameEvent::AreaEntered { .. } => EventKind::AreaEntered,
            GameEvent::PlayerEnterWarp { .. } => EventKind::PlayerEnterWarp,
            GameEvent::PlayerMoved { .. } => EventKind::PlayerMoved,
            GameEvent::VocabularyLearned { .. } => EventKind::VocabularyLearned,
            GameEvent::LevelUp { .. } => EventKind::LevelUp,
            GameEvent::PlaySound { .. } => EventKind::PlaySound,
            GameEvent::InputDirectionDown { .. } => EventKind::InputDirectionDown,
            GameEvent::InputDirectionUp { .. } => EventKind::InputDirectionUp,
            GameEvent::InputActionPress => EventKind::InputActionPress,
            GameEvent::InputActionRelease => EventKind::InputActionRelease,
            GameEvent::InputCancelPress => EventKind::InputCancelPress,
            GameEvent::InputCancelRelease => EventKind::InputCancelRelease,
        }
    }

    pub fn to_envelope(&self) -> EventEnvelope {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        let payload = value
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or(Value::Null);
        EventEnvelope {
            version: EVENT_SCHEMA_VERSION,
            name: self.kind().name().to_string(),
            payload,
        }
    }
}

/// Serialized form used by tooling and external producers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl EventEnvelope {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            version: EVENT_SCHEMA_VERSION,
            name: name.into(),
            payload,
        }
    }

    pub fn decode(&self) -> Result<GameEvent, EventBusError> {
        if self.version != EVENT_SCHEMA_VERSION {
            return Err(EventBusError::VersionMismatch {
                expected: EVENT_SCHEMA_VERSION,
                found: self.version,
            });
        }
        let kind: EventKind = self.name.parse()?;

        let mut tagged = serde_json::Map::new();
        tagged.insert("name".to_string(), Value::String(kind.name().to_string()));
        if !self.payload.is_null() {
            tagged.insert("payload".to_string(), self.payload.clone());
        }
        serde_json::from_value(Value::Object(tagged)).map_err(|error| {
            EventBusError::InvalidPayload {
                name: self.name.clone(),
                message: error.to_string(),
            }
        })
    }
}

/// Fieldless mirror of [`GameEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    FrameTick,
    PauseGame,
    ResumeGame,
    AssetLoaded,
    AssetsComplete,
    LessonCompleted,
    QuizStarted,
    QuizCompleted,
    QuizTrigger,
    DialogueRequested,
    DialogueStarted,
    DialogueFinished,
    AreaEntered,
    PlayerEnterWarp,
    PlayerMoved,
    VocabularyLearned,
    LevelUp,
    PlaySound,
    InputDirectionDown,
    InputDirectionUp,
    InputActionPress,
    InputActionRelease,
    InputCancelPress,
    InputCancelRelease,
}

impl EventKind {
    pub const ALL: [EventKind; 24] = [
        EventKind::FrameTick,
        EventKind::PauseGame,
        EventKind::ResumeGame,
        EventKind::AssetLoaded,
        EventKind::AssetsComplete,
        EventKind::LessonCompleted,
        EventKind::QuizStarted,
        EventKind::QuizCompleted,
        EventKind::QuizTrigger,
        EventKind::DialogueRequested,
        EventKind::DialogueStarted,
        EventKind::DialogueFinished,
        EventKind::AreaEntered,
        EventKind::PlayerEnterWarp,
        EventKind::PlayerMoved,
        EventKind::VocabularyLearned,
        EventKind::LevelUp,
        EventKind::PlaySound,
        EventKind::InputDirectionDown,
        EventKind::InputDirectionUp,
        EventKind::InputActionPress,
        EventKind::InputActionRelease,
        EventKind::InputCancelPress,
        EventKind::InputCancelRelease,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            EventKind::FrameTick => "FRAME_TICK",
            EventKind::PauseGame => "PAUSE_GAME",
            EventKind::ResumeGame => "RESUME_GAME",
            EventKind::AssetLoaded => "ASSET_LOADED",
            EventKind::AssetsComplete => "ASSETS_COMPLETE",
            EventKind::LessonCompleted => "LESSON_COMPLETED",
            EventKind::QuizStarted => "QUIZ_STARTED",
            EventKind::QuizCompleted => "QUIZ_COMPLETED",
            EventKind::QuizTrigger => "QUIZ_TRIGGER",
            EventKind::DialogueRequested => "DIALOGUE_REQUESTED",
            EventKind::DialogueStarted => "DIALOGUE_STARTED",
            EventKind::DialogueFinished => "DIALOGUE_FINISHED",
            EventKind::AreaEntered => "AREA_ENTERED",
            EventKind::PlayerEnterWarp => "PLAYER_ENTER_WARP",
            EventKind::PlayerMoved => "PLAYER_MOVED",
            EventKind::VocabularyLearned => "VOCABULARY_LEARNED",
            EventKind::LevelUp => "LEVEL_UP",
            EventKind::PlaySound => "PLAY_SOUND",
            EventKind::InputDirectionDown => "INPUT_DIRECTION_DOWN",
            EventKind::InputDirectionUp => "INPUT_DIRECTION_UP",
            EventKind::InputActionPress => "INPUT_ACTION_PRESS",
            EventKind::InputActionRelease => "INPUT_ACTION_RELEASE",
            EventKind::InputCancelPress => "INPUT_CANCEL_PRESS",
            EventKind::InputCancelRelease => "INPUT_CANCEL_RELEASE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = EventBusError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == raw)
            .ok_or_else(|| EventBusError::UnknownEvent {
                name: raw.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::WarpDestination;

    fn one_of_each() -> Vec<GameEvent> {
        vec![
            GameEvent::FrameTick { dt: 0.016 },
            GameEvent::PauseGame,
            GameEvent::ResumeGame,
            GameEvent::AssetLoaded {
                asset: "tiles".to_string(),
            },
            GameEvent::AssetsComplete,
            GameEvent::LessonCompleted {
                lesson: "greetings".to_string(),
                xp: None,
                vocab: vec!["kaixo".to_string()],
            },
            GameEvent::QuizStarted {
                id: "q1".to_string(),
            },
            GameEvent::QuizCompleted {
                id: "q1".to_string(),
                score: 20,
            },
            GameEvent::QuizTrigger {
                quiz_id: "q1".to_string(),
            },
            GameEvent::DialogueRequested {
                id: "elder".to_string(),
            },
            GameEvent::DialogueStarted {
                id: "elder".to_string(),
            },
            GameEvent::DialogueFinished {
                id: "elder".to_string(),
            },
            GameEvent::AreaEntered {
                area: "town".to_string(),
            },
            GameEvent::PlayerEnterWarp {
                warp: Warp {
                    target_map: "maps/house.json".to_string(),
                    destination: WarpDestination::default(),
                    trigger: GridPos::new(3, 4),
                },
            },
            GameEvent::PlayerMoved {
                pos: GridPos::new(5, 6),
            },
            GameEvent::VocabularyLearned {
                word: "etxea".to_string(),
            },
            GameEvent::LevelUp {
                level: "A2".to_string(),
                level_index: 1,
            },
            GameEvent::PlaySound {
                key: "blip".to_string(),
            },
            GameEvent::InputDirectionDown {
                direction: Direction::Up,
            },
            GameEvent::InputDirectionUp {
                direction: Direction::Up,
            },
            GameEvent::InputActionPress,
            GameEvent::InputActionRelease,
            GameEvent::InputCancelPress,
            GameEvent::InputCancelRelease,
        ]
    }

    #[test]
    fn kind_name_matches_serialized_tag_for_every_event() {
        let events = one_of_each();
        assert_eq!(events.len(), EventKind::ALL.len());
        for event in events {
            let value = serde_json::to_value(&event).expect("serialize");
            assert_eq!(value["name"], event.kind().name(), "{event:?}");
        }
    }

    #[test]
    fn envelope_decodes_back_to_the_same_event() {
        for event in one_of_each() {
            let envelope = event.to_envelope();
            assert_eq!(envelope.version, EVENT_SCHEMA_VERSION);
            assert_eq!(envelope.decode().expect("decode"), event);
        }
    }

    #[test]
    fn lesson_payload_accepts_missing_optional_fields() {
        let envelope = EventEnvelope::new(
            "LESSON_COMPLETED",
            serde_json::json!({ "lesson": "numbers" }),
        );
        assert_eq!(
            envelope.decode().expect("decode"),
            GameEvent::LessonCompleted {
                lesson: "numbers".to_string(),
                xp: None,
                vocab: Vec::new(),
            }
        );
    }

    #[test]
    fn unknown_name_is_rejected() {
        let error = "NOT_AN_EVENT".parse::<EventKind>().expect_err("unknown");
        assert_eq!(
            error,
            EventBusError::UnknownEvent {
                name: "NOT_AN_EVENT".to_string()
            }
        );
    }

    #[test]
    fn envelope_with_wrong_version_is_rejected() {
        let mut envelope = GameEvent::PauseGame.to_envelope();
        envelope.version = 7;
        assert!(matches!(
            envelope.decode(),
            Err(EventBusError::VersionMismatch { found: 7, .. })
        ));
    }

    #[test]
    fn envelope_with_malformed_payload_is_rejected() {
        let envelope = EventEnvelope::new("QUIZ_COMPLETED", serde_json::json!({ "id": 3 }));
        assert!(matches!(
            envelope.decode(),
            Err(EventBusError::InvalidPayload { .. })
        ));
    }
}
