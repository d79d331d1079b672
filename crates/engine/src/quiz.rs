use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::content::ContentProvider;
use crate::events::{EventQueue, GameEvent};
use crate::grid::Direction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(alias = "question")]
    pub prompt: String,
    pub options: Vec<String>,
    pub correct: usize,
    #[serde(default)]
    pub audio: Option<String>,
}

impl QuizQuestion {
    pub fn correct_option(&self) -> Option<&str> {
        self.options.get(self.correct).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizDefinition {
    pub id: String,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizSession {
    quiz: QuizDefinition,
    index: usize,
    cursor: usize,
    score: u32,
    correct_answers: usize,
}

impl QuizSession {
    pub fn quiz_id(&self) -> &str {
        &self.quiz.id
    }

    pub fn question_index(&self) -> usize {
        self.index
    }

    pub fn question_count(&self) -> usize {
        self.quiz.questions.len()
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        self.quiz.questions.get(self.index)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn correct_answers(&self) -> usize {
        self.correct_answers
    }

    fn is_finished(&self) -> bool {
        self.index >= self.quiz.questions.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum QuizState {
    #[default]
    Closed,
    Active(QuizSession),
}

/// Multiple-choice question sequence with a wrapping selection cursor.
#[derive(Debug, Clone)]
pub struct QuizEngine {
    state: QuizState,
    points_per_correct: u32,
}

impl QuizEngine {
    pub fn new(points_per_correct: u32) -> Self {
        Self {
            state: QuizState::Closed,
            points_per_correct,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, QuizState::Active(_))
    }

    pub fn session(&self) -> Option<&QuizSession> {
        match &self.state {
            QuizState::Active(session) => Some(session),
            QuizState::Closed => None,
        }
    }

    pub fn start(&mut self, id: &str, content: &dyn ContentProvider, events: &mut EventQueue) -> bool {
        if let QuizState::Active(session) = &self.state {
            warn!(requested = id, active = session.quiz_id(), "quiz_already_active");
            return false;
        }
        let Some(quiz) = content.quiz(id) else {
            warn!(quiz_id = id, "quiz_not_found");
            return false;
        };

        debug!(quiz_id = id, questions = quiz.questions.len(), "quiz_started");
        self.state = QuizState::Active(QuizSession {
            quiz,
            index: 0,
            cursor: 0,
            score: 0,
            correct_answers: 0,
        });
        events.emit(GameEvent::QuizStarted { id: id.to_string() });
        self.finish_if_done(events);
        true
    }

    /// Up/Left select the previous option, Down/Right the next; wraps.
    pub fn move_cursor(&mut self, direction: Direction) {
        let QuizState::Active(session) = &mut self.state else {
            return;
        };
        let count = session.current_question().map_or(0, |q| q.options.len());
        if count == 0 {
            return;
        }
        session.cursor = match direction {
            Direction::Up | Direction::Left => (session.cursor + count - 1) % count,
            Direction::Down | Direction::Right => (session.cursor + 1) % count,
        };
    }

    pub fn submit(&mut self, events: &mut EventQueue) -> Option<AnswerOutcome> {
        let QuizState::Active(session) = &mut self.state else {
            return None;
        };
        let question = session.current_question()?.clone();
        let correct = session.cursor == question.correct;
        if correct {
            session.score = session.score.saturating_add(self.points_per_correct);
            session.correct_answers += 1;
            if let Some(word) = question.correct_option() {
                events.emit(GameEvent::VocabularyLearned {
                    word: word.to_string(),
                });
            }
        }
        if let Some(audio) = question.audio {
            events.emit(GameEvent::PlaySound { key: audio });
        }
        session.index += 1;
        session.cursor = 0;

        let finished = self.finish_if_done(events);
        Some(AnswerOutcome { correct, finished })
    }

    fn finish_if_done(&mut self, events: &mut EventQueue) -> bool {
        match &self.state {
            QuizState::Active(session) if session.is_finished() => {}
            _ => return false,
        }
        let QuizState::Active(session) = std::mem::take(&mut self.state) else {
            return false;
        };
        debug!(quiz_id = %session.quiz.id, score = session.score, "quiz_completed");
        events.emit(GameEvent::QuizCompleted {
            id: session.quiz.id,
            score: session.score,
        });
        true
    }
}
