use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::content::ContentProvider;
use crate::events::{EventQueue, GameEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub text: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default)]
    pub audio: Option<String>,
}

impl DialogueLine {
    pub fn new(text: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            translation: translation.into(),
            audio: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueScript {
    pub id: String,
    pub lines: Vec<DialogueLine>,
    /// Quiz launched when the script ends.
    pub follow_up_quiz: Option<String>,
}

/// One open conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueSession {
    script: DialogueScript,
    page: usize,
    revealed: usize,
    elapsed: f32,
}

impl DialogueSession {
    fn new(script: DialogueScript) -> Self {
        Self {
            script,
            page: 0,
            revealed: 0,
            elapsed: 0.0,
        }
    }

    pub fn dialogue_id(&self) -> &str {
        &self.script.id
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.script.lines.len()
    }

    pub fn current_line(&self) -> Option<&DialogueLine> {
        self.script.lines.get(self.page)
    }

    /// Characters of the current page now visible.
    pub fn revealed_chars(&self) -> usize {
        self.revealed
    }

    pub fn page_len(&self) -> usize {
        self.current_line()
            .map_or(0, |line| line.text.chars().count())
    }

    pub fn is_page_revealed(&self) -> bool {
        self.revealed >= self.page_len()
    }

    pub fn visible_text(&self) -> &str {
        self.current_line()
            .map_or("", |line| char_prefix(&line.text, self.revealed))
    }

    /// Translation revealed in step with the source text.
    pub fn visible_translation(&self) -> &str {
        let Some(line) = self.current_line() else {
            return "";
        };
        if self.is_page_revealed() {
            return &line.translation;
        }
        let page_len = self.page_len().max(1);
        let translation_len = line.translation.chars().count();
        char_prefix(&line.translation, translation_len * self.revealed / page_len)
    }

    fn reveal_page(&mut self) {
        self.revealed = self.page_len();
        self.elapsed = 0.0;
    }

    fn turn_page(&mut self) {
        self.page += 1;
        self.revealed = 0;
        self.elapsed = 0.0;
    }

    fn is_finished(&self) -> bool {
        self.page >= self.script.lines.len()
    }
}

fn char_prefix(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DialogueState {
    #[default]
    Closed,
    Showing(DialogueSession),
}

/// Paged conversation with a typewriter reveal.
///
/// `advance` is two-stage: the first press completes the current page's
/// reveal, the next press turns the page. Closing emits
/// `DIALOGUE_FINISHED`, or `QUIZ_TRIGGER` when the script names a quiz.
#[derive(Debug, Clone)]
pub struct DialogueEngine {
    state: DialogueState,
    char_seconds: f32,
}

impl DialogueEngine {
    pub fn new(char_seconds: f32) -> Self {
        Self {
            state: DialogueState::Closed,
            char_seconds,
        }
    }

    pub fn state(&self) -> &DialogueState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, DialogueState::Showing(_))
    }

    pub fn session(&self) -> Option<&DialogueSession> {
        match &self.state {
            DialogueState::Showing(session) => Some(session),
            DialogueState::Closed => None,
        }
    }

    /// Opens `id`. Unknown ids and requests while a session is open are
    /// logged and ignored.
    pub fn start(&mut self, id: &str, content: &dyn ContentProvider, events: &mut EventQueue) -> bool {
        if let DialogueState::Showing(session) = &self.state {
            warn!(requested = id, active = session.dialogue_id(), "dialogue_already_active");
            return false;
        }
        let Some(script) = content.dialogue(id) else {
            warn!(dialogue_id = id, "dialogue_not_found");
            return false;
        };

        debug!(dialogue_id = id, pages = script.lines.len(), "dialogue_started");
        self.state = DialogueState::Showing(DialogueSession::new(script));
        events.emit(GameEvent::DialogueStarted { id: id.to_string() });
        self.enter_page(events);
        true
    }

    pub fn update(&mut self, dt: f32) {
        let DialogueState::Showing(session) = &mut self.state else {
            return;
        };
        if session.is_page_revealed() || !dt.is_finite() || dt <= 0.0 {
            return;
        }
        if self.char_seconds <= 0.0 {
            session.reveal_page();
            return;
        }
        session.elapsed += dt;
        let page_len = session.page_len();
        while session.elapsed >= self.char_seconds && session.revealed < page_len {
            session.elapsed -= self.char_seconds;
            session.revealed += 1;
        }
    }

    pub fn advance(&mut self, events: &mut EventQueue) {
        let DialogueState::Showing(session) = &mut self.state else {
            return;
        };
        if !session.is_page_revealed() {
            session.reveal_page();
            return;
        }
        session.turn_page();
        self.enter_page(events);
    }

    /// Announces the current page, or closes the session past the last one.
    fn enter_page(&mut self, events: &mut EventQueue) {
        let DialogueState::Showing(session) = &self.state else {
            return;
        };
        if !session.is_finished() {
            if let Some(audio) = session.current_line().and_then(|line| line.audio.clone()) {
                events.emit(GameEvent::PlaySound { key: audio });
            }
            return;
        }

        let DialogueState::Showing(session) = std::mem::take(&mut self.state) else {
            return;
        };
        let DialogueScript {
            id,
            follow_up_quiz,
            ..
        } = session.script;
        debug!(dialogue_id = %id, follow_up = ?follow_up_quiz, "dialogue_finished");
        match follow_up_quiz {
            Some(quiz_id) => events.emit(GameEvent::QuizTrigger { quiz_id }),
            None => events.emit(GameEvent::DialogueFinished { id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentDatabase;

    fn content() -> ContentDatabase {
        let mut content = ContentDatabase::new();
        content.insert_dialogue(DialogueScript {
            id: "elder".to_string(),
            lines: vec![
                DialogueLine::new("Kaixo!", "Hello!"),
                DialogueLine {
                    audio: Some("agur".to_string()),
                    ..DialogueLine::new("Agur", "Bye")
                },
            ],
            follow_up_quiz: None,
        });
        content.insert_dialogue(DialogueScript {
            id: "quizmaster".to_string(),
            lines: vec![DialogueLine::new("Prest?", "Ready?")],
            follow_up_quiz: Some("q1".to_string()),
        });
        content.insert_dialogue(DialogueScript {
            id: "silent".to_string(),
            lines: Vec::new(),
            follow_up_quiz: None,
        });
        content
    }

    fn revealed(engine: &DialogueEngine) -> usize {
        engine.session().map_or(0, DialogueSession::revealed_chars)
    }

    #[test]
    fn reveal_is_time_driven_and_monotonic() {
        let content = content();
        let mut engine = DialogueEngine::new(0.05);
        let mut events = EventQueue::new();
        assert!(engine.start("elder", &content, &mut events));

        let mut last = revealed(&engine);
        for _ in 0..20 {
            engine.update(0.02);
            let now = revealed(&engine);
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, 6);
        assert_eq!(engine.session().map(DialogueSession::visible_text), Some("Kaixo!"));
    }

    #[test]
    fn partial_reveal_shows_prefix() {
        let content = content();
        let mut engine = DialogueEngine::new(0.25);
        let mut events = EventQueue::new();
        engine.start("elder", &content, &mut events);

        engine.update(0.5);

        let session = engine.session().expect("session");
        assert_eq!(session.visible_text(), "Ka");
        assert_eq!(session.visible_translation(), "He");
    }

    #[test]
    fn first_advance_completes_reveal_second_turns_page() {
        let content = content();
        let mut engine = DialogueEngine::new(0.05);
        let mut events = EventQueue::new();
        engine.start("elder", &content, &mut events);
        events.clear();

        engine.advance(&mut events);
        let session = engine.session().expect("session");
        assert_eq!(session.page(), 0);
        assert!(session.is_page_revealed());

        engine.advance(&mut events);
        assert_eq!(engine.session().map(DialogueSession::page), Some(1));
        assert_eq!(revealed(&engine), 0);
        assert_eq!(
            events.take(),
            vec![GameEvent::PlaySound {
                key: "agur".to_string()
            }]
        );
    }

    #[test]
    fn advancing_past_last_page_closes_with_finished_event() {
        let content = content();
        let mut engine = DialogueEngine::new(0.05);
        let mut events = EventQueue::new();
        engine.start("elder", &content, &mut events);
        for _ in 0..4 {
            engine.advance(&mut events);
        }

        assert!(!engine.is_active());
        assert_eq!(
            events.take().last(),
            Some(&GameEvent::DialogueFinished {
                id: "elder".to_string()
            })
        );
    }

    #[test]
    fn follow_up_quiz_replaces_finished_event() {
        let content = content();
        let mut engine = DialogueEngine::new(0.05);
        let mut events = EventQueue::new();
        engine.start("quizmaster", &content, &mut events);
        engine.advance(&mut events);
        engine.advance(&mut events);

        assert_eq!(
            events.take(),
            vec![
                GameEvent::DialogueStarted {
                    id: "quizmaster".to_string()
                },
                GameEvent::QuizTrigger {
                    quiz_id: "q1".to_string()
                },
            ]
        );
    }

    #[test]
    fn unknown_dialogue_is_a_silent_no_op() {
        let content = content();
        let mut engine = DialogueEngine::new(0.05);
        let mut events = EventQueue::new();

        assert!(!engine.start("nobody", &content, &mut events));
        assert!(!engine.is_active());
        assert!(events.is_empty());
    }

    #[test]
    fn empty_script_starts_and_finishes_immediately() {
        let content = content();
        let mut engine = DialogueEngine::new(0.05);
        let mut events = EventQueue::new();

        assert!(engine.start("silent", &content, &mut events));

        assert!(!engine.is_active());
        assert_eq!(
            events.take(),
            vec![
                GameEvent::DialogueStarted {
                    id: "silent".to_string()
                },
                GameEvent::DialogueFinished {
                    id: "silent".to_string()
                },
            ]
        );
    }

    #[test]
    fn second_start_while_showing_is_rejected() {
        let content = content();
        let mut engine = DialogueEngine::new(0.05);
        let mut events = EventQueue::new();
        engine.start("elder", &content, &mut events);

        assert!(!engine.start("quizmaster", &content, &mut events));
        assert_eq!(
            engine.session().map(DialogueSession::dialogue_id),
            Some("elder")
        );
    }

    #[test]
    fn reveal_counts_characters_not_bytes() {
        assert_eq!(char_prefix("ñandú", 2), "ña");
        assert_eq!(char_prefix("ñandú", 10), "ñandú");
    }
}
