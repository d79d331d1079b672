use std::cell::RefCell;
use std::rc::Rc;

use engine::events::{EventBus, EventKind, GameEvent, SubscriptionSet};
use engine::world::MapLoader;
use engine::{ContentDatabase, GameConfig, HeldDirections, ProgressTracker, SceneManager};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

mod hud;
mod overworld;
mod title;
mod vocabulary_quiz;

pub(crate) use overworld::{Overworld, OverworldPayload};
pub(crate) use title::TitleScene;
pub(crate) use vocabulary_quiz::{QuizPayload, VocabularyQuizScene};

pub(crate) const TITLE_SCENE: &str = "Title";
pub(crate) const OVERWORLD_SCENE: &str = "Overworld";
pub(crate) const QUIZ_SCENE: &str = "VocabularyQuizScene";

/// Long-lived collaborators every scene instance reads from.
pub(crate) struct SceneContext {
    pub(crate) config: GameConfig,
    pub(crate) bus: Rc<EventBus>,
    pub(crate) content: Rc<ContentDatabase>,
    pub(crate) maps: Rc<dyn MapLoader>,
    pub(crate) progress: Rc<RefCell<ProgressTracker>>,
    pub(crate) held: HeldDirections,
    pub(crate) start_map: String,
}

pub(crate) fn register_scenes(scenes: &mut SceneManager, context: &Rc<SceneContext>) {
    let shared = Rc::clone(context);
    scenes.register(TITLE_SCENE, move || Box::new(TitleScene::new(Rc::clone(&shared))));
    let shared = Rc::clone(context);
    scenes.register(OVERWORLD_SCENE, move || Box::new(Overworld::new(Rc::clone(&shared))));
    let shared = Rc::clone(context);
    scenes.register(QUIZ_SCENE, move || {
        Box::new(VocabularyQuizScene::new(Rc::clone(&shared)))
    });
}

/// Bus events a scene collects while it is entered and handles during its
/// own update, where it can borrow itself mutably.
#[derive(Default)]
pub(crate) struct SceneInbox {
    events: Rc<RefCell<Vec<GameEvent>>>,
    subscriptions: SubscriptionSet,
}

impl SceneInbox {
    pub(crate) fn open(bus: &EventBus, kinds: &[EventKind]) -> Self {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut subscriptions = SubscriptionSet::new();
        for kind in kinds {
            let sink = Rc::clone(&events);
            subscriptions.push(bus.subscribe(*kind, move |event, _| {
                sink.borrow_mut().push(event.clone());
                Ok(())
            }));
        }
        Self {
            events,
            subscriptions,
        }
    }

    pub(crate) fn drain(&self) -> Vec<GameEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub(crate) fn close(&mut self, bus: &EventBus) {
        self.subscriptions.release(bus);
        self.events.borrow_mut().clear();
    }
}

pub(crate) fn to_payload<T: Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload).unwrap_or_else(|error| {
        warn!(error = %error, "scene_payload_encode_failed");
        Value::Null
    })
}
