use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::task::Poll;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use super::game_loop::FrameDriver;
use super::rendering::DrawContext;

#[derive(Debug, Clone, PartialEq)]
pub enum SceneCommand {
    None,
    SwitchTo { scene: String, payload: Value },
    Quit,
}

impl SceneCommand {
    pub fn switch_to(scene: impl Into<String>, payload: Value) -> Self {
        Self::SwitchTo {
            scene: scene.into(),
            payload,
        }
    }
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("no scene registered under {name:?}")]
    UnknownScene { name: String },
    #[error("cannot switch to {requested:?} while {entering:?} is still entering")]
    TransitionInProgress { requested: String, entering: String },
    #[error("scene {scene:?} failed to enter: {source}")]
    EnterFailed {
        scene: String,
        #[source]
        source: Box<dyn StdError + 'static>,
    },
    #[error("scene {scene:?} rejected its transition payload: {source}")]
    InvalidPayload {
        scene: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SceneError {
    pub fn enter_failed(scene: impl Into<String>, source: impl StdError + 'static) -> Self {
        Self::EnterFailed {
            scene: scene.into(),
            source: Box::new(source),
        }
    }
}

/// Decodes a transition payload; `null` decodes as `T::default()`.
pub fn decode_payload<T>(scene: &str, payload: Value) -> Result<T, SceneError>
where
    T: DeserializeOwned + Default,
{
    if payload.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(payload).map_err(|source| SceneError::InvalidPayload {
        scene: scene.to_string(),
        source,
    })
}

/// A top-level mode that owns input, update and render while active.
///
/// `enter` may start asynchronous work; the manager keeps polling
/// `poll_enter` and only routes `update`/`render` to the scene once it
/// reports ready. `exit` is called exactly once for every scene whose
/// `enter` was called.
pub trait Scene {
    fn name(&self) -> &str;
    fn enter(&mut self, payload: Value) -> Result<(), SceneError>;
    fn poll_enter(&mut self) -> Poll<Result<(), SceneError>> {
        Poll::Ready(Ok(()))
    }
    fn update(&mut self, dt: f32) -> SceneCommand;
    fn render(&mut self, ctx: &mut dyn DrawContext);
    fn exit(&mut self) {}
}

pub type SceneFactory = Box<dyn Fn() -> Box<dyn Scene>>;

/// Exactly one active scene out of an open set of registered ones.
#[derive(Default)]
pub struct SceneManager {
    factories: BTreeMap<String, SceneFactory>,
    active: Option<Box<dyn Scene>>,
    entering: Option<Box<dyn Scene>>,
    fallback: Option<String>,
    quit_requested: bool,
}

impl SceneManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Scene> + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Scene switched to when entering another one fails.
    pub fn with_fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback = Some(name.into());
        self
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref().map(|scene| scene.name())
    }

    pub fn entering_name(&self) -> Option<&str> {
        self.entering.as_deref().map(|scene| scene.name())
    }

    pub fn is_transitioning(&self) -> bool {
        self.entering.is_some()
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    /// Exits the current scene, constructs `name` and starts entering it.
    ///
    /// The new scene becomes active once its enter completes; until then
    /// `update_active` and `render_active` do nothing.
    pub fn switch_to(&mut self, name: &str, payload: Value) -> Result<(), SceneError> {
        if let Some(entering) = self.entering_name() {
            return Err(SceneError::TransitionInProgress {
                requested: name.to_string(),
                entering: entering.to_string(),
            });
        }
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SceneError::UnknownScene {
                name: name.to_string(),
            })?;
        let mut scene = factory();

        info!(from = ?self.active_name(), to = name, "scene_switch_started");
        if let Some(mut previous) = self.active.take() {
            previous.exit();
        }
        if let Err(error) = scene.enter(payload) {
            scene.exit();
            return Err(self.fail_transition(name, error));
        }
        self.entering = Some(scene);
        self.poll_transition().map(|_| ())
    }

    /// Drives a pending enter; `Ok(true)` when it completed on this call.
    pub fn poll_transition(&mut self) -> Result<bool, SceneError> {
        let Some(scene) = self.entering.as_mut() else {
            return Ok(false);
        };
        match scene.poll_enter() {
            Poll::Pending => Ok(false),
            Poll::Ready(Ok(())) => {
                self.active = self.entering.take();
                info!(scene = ?self.active_name(), "scene_switch_finished");
                Ok(true)
            }
            Poll::Ready(Err(error)) => {
                let name = scene.name().to_string();
                if let Some(mut failed) = self.entering.take() {
                    failed.exit();
                }
                Err(self.fail_transition(&name, error))
            }
        }
    }

    fn fail_transition(&mut self, name: &str, error: SceneError) -> SceneError {
        error!(scene = name, error = %error, "scene_enter_failed");
        if let Some(fallback) = self.fallback.clone().filter(|fallback| fallback != name) {
            if let Err(fallback_error) = self.switch_to(&fallback, Value::Null) {
                warn!(scene = %fallback, error = %fallback_error, "scene_fallback_failed");
            }
        }
        error
    }

    pub fn update_active(&mut self, dt: f32) -> SceneCommand {
        if self.is_transitioning() {
            return SceneCommand::None;
        }
        match self.active.as_mut() {
            Some(scene) => scene.update(dt),
            None => SceneCommand::None,
        }
    }

    pub fn render_active(&mut self, ctx: &mut dyn DrawContext) {
        if self.is_transitioning() {
            return;
        }
        if let Some(scene) = self.active.as_mut() {
            scene.render(ctx);
        }
    }

    pub fn apply(&mut self, command: SceneCommand) {
        match command {
            SceneCommand::None => {}
            SceneCommand::SwitchTo { scene, payload } => {
                if let Err(error) = self.switch_to(&scene, payload) {
                    warn!(scene = %scene, error = %error, "scene_switch_rejected");
                }
            }
            SceneCommand::Quit => {
                info!(scene = ?self.active_name(), "quit_requested");
                self.quit_requested = true;
            }
        }
    }

    /// Exits whichever scenes have been entered.
    pub fn shutdown(&mut self) {
        for mut scene in [self.entering.take(), self.active.take()].into_iter().flatten() {
            scene.exit();
        }
    }
}

impl FrameDriver for SceneManager {
    fn update(&mut self, dt: f32) {
        if let Err(error) = self.poll_transition() {
            warn!(error = %error, "scene_transition_failed");
        }
        let command = self.update_active(dt);
        self.apply(command);
    }

    fn render(&mut self, ctx: &mut dyn DrawContext) {
        self.render_active(ctx);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fmt;
    use std::rc::Rc;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::app::rendering::RecordingDrawContext;

    #[derive(Debug, Default)]
    struct Journal {
        entries: Vec<String>,
    }

    impl Journal {
        fn count(&self, entry: &str) -> usize {
            self.entries.iter().filter(|e| *e == entry).count()
        }
    }

    struct FakeScene {
        name: &'static str,
        journal: Rc<RefCell<Journal>>,
        pending_polls: usize,
        fail_enter: bool,
        next_command: Option<SceneCommand>,
    }

    impl FakeScene {
        fn log(&self, what: &str) {
            self.journal
                .borrow_mut()
                .entries
                .push(format!("{}:{what}", self.name));
        }
    }

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }

    impl StdError for Boom {}

    impl Scene for FakeScene {
        fn name(&self) -> &str {
            self.name
        }

        fn enter(&mut self, payload: Value) -> Result<(), SceneError> {
            self.log(&format!("enter {payload}"));
            if self.fail_enter && self.pending_polls == 0 {
                return Err(SceneError::enter_failed(self.name, Boom));
            }
            Ok(())
        }

        fn poll_enter(&mut self) -> Poll<Result<(), SceneError>> {
            if self.pending_polls > 0 {
                self.pending_polls -= 1;
                return Poll::Pending;
            }
            if self.fail_enter {
                return Poll::Ready(Err(SceneError::enter_failed(self.name, Boom)));
            }
            self.log("ready");
            Poll::Ready(Ok(()))
        }

        fn update(&mut self, _dt: f32) -> SceneCommand {
            self.log("update");
            self.next_command.take().unwrap_or(SceneCommand::None)
        }

        fn render(&mut self, ctx: &mut dyn DrawContext) {
            self.log("render");
            ctx.draw_text(self.name, 0, 0, [255, 255, 255, 255]);
        }

        fn exit(&mut self) {
            self.log("exit");
        }
    }

    fn register(
        manager: &mut SceneManager,
        journal: &Rc<RefCell<Journal>>,
        name: &'static str,
        pending_polls: usize,
        fail_enter: bool,
    ) {
        let journal = Rc::clone(journal);
        manager.register(name, move || {
            Box::new(FakeScene {
                name,
                journal: Rc::clone(&journal),
                pending_polls,
                fail_enter,
                next_command: None,
            })
        });
    }

    #[test]
    fn switching_exits_previous_once_and_waits_for_enter() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let mut manager = SceneManager::new();
        register(&mut manager, &journal, "Overworld", 0, false);
        register(&mut manager, &journal, "VocabularyQuizScene", 2, false);
        manager.switch_to("Overworld", Value::Null).expect("overworld");
        assert_eq!(manager.active_name(), Some("Overworld"));

        manager
            .switch_to("VocabularyQuizScene", json!({ "quizId": "q1" }))
            .expect("quiz");
        let mut ctx = RecordingDrawContext::default();
        FrameDriver::update(&mut manager, 0.016);
        FrameDriver::render(&mut manager, &mut ctx);
        assert!(manager.is_transitioning());
        assert!(ctx.calls().is_empty());

        FrameDriver::update(&mut manager, 0.016);
        FrameDriver::render(&mut manager, &mut ctx);

        let journal = journal.borrow();
        assert_eq!(journal.count("Overworld:exit"), 1);
        assert_eq!(
            journal.entries[journal.entries.len() - 4..],
            [
                "VocabularyQuizScene:enter {\"quizId\":\"q1\"}".to_string(),
                "VocabularyQuizScene:ready".to_string(),
                "VocabularyQuizScene:update".to_string(),
                "VocabularyQuizScene:render".to_string(),
            ]
        );
        assert!(ctx.has_text("VocabularyQuizScene"));
    }

    #[test]
    fn unknown_scene_is_an_error_and_keeps_current() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let mut manager = SceneManager::new();
        register(&mut manager, &journal, "Title", 0, false);
        manager.switch_to("Title", Value::Null).expect("title");

        let error = manager.switch_to("Nowhere", Value::Null).expect_err("unknown");

        assert!(matches!(error, SceneError::UnknownScene { .. }));
        assert_eq!(manager.active_name(), Some("Title"));
        assert_eq!(journal.borrow().count("Title:exit"), 0);
    }

    #[test]
    fn switch_during_transition_is_rejected() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let mut manager = SceneManager::new();
        register(&mut manager, &journal, "Slow", 5, false);
        register(&mut manager, &journal, "Title", 0, false);
        manager.switch_to("Slow", Value::Null).expect("slow");

        let error = manager.switch_to("Title", Value::Null).expect_err("busy");

        assert!(matches!(error, SceneError::TransitionInProgress { .. }));
        assert_eq!(manager.entering_name(), Some("Slow"));
    }

    #[test]
    fn failed_enter_exits_new_scene_and_falls_back() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let mut manager = SceneManager::new().with_fallback("Title");
        register(&mut manager, &journal, "Title", 0, false);
        register(&mut manager, &journal, "Broken", 1, true);
        manager.switch_to("Broken", Value::Null).expect("entering");

        let error = manager.poll_transition().expect_err("enter fails");

        assert!(matches!(error, SceneError::EnterFailed { .. }));
        assert_eq!(manager.active_name(), Some("Title"));
        assert_eq!(journal.borrow().count("Broken:exit"), 1);
    }

    #[test]
    fn update_commands_switch_and_quit() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let mut manager = SceneManager::new();
        register(&mut manager, &journal, "B", 0, false);
        let inner = Rc::clone(&journal);
        manager.register("A", move || {
            Box::new(FakeScene {
                name: "A",
                journal: Rc::clone(&inner),
                pending_polls: 0,
                fail_enter: false,
                next_command: Some(SceneCommand::switch_to("B", json!(7))),
            })
        });
        manager.switch_to("A", Value::Null).expect("a");

        FrameDriver::update(&mut manager, 0.0);
        assert_eq!(manager.active_name(), Some("B"));

        manager.apply(SceneCommand::Quit);
        assert!(manager.quit_requested());
        manager.shutdown();
        assert_eq!(journal.borrow().count("B:exit"), 1);
        assert_eq!(manager.active_name(), None);
    }

    #[test]
    fn payload_decodes_typed_or_default() {
        #[derive(Debug, Default, Deserialize, PartialEq)]
        #[serde(rename_all = "camelCase")]
        struct QuizPayload {
            quiz_id: String,
        }

        let decoded: QuizPayload =
            decode_payload("Quiz", json!({ "quizId": "q1" })).expect("decode");
        assert_eq!(decoded.quiz_id, "q1");
        assert_eq!(
            decode_payload::<QuizPayload>("Quiz", Value::Null).expect("null"),
            QuizPayload::default()
        );
        assert!(matches!(
            decode_payload::<QuizPayload>("Quiz", json!([1])),
            Err(SceneError::InvalidPayload { .. })
        ));
    }
}
