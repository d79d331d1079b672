use std::rc::Rc;

use engine::app::{DrawContext, LINE_ADVANCE};
use engine::events::{EventKind, EventQueue, GameEvent};
use engine::{decode_payload, Direction, GridPos, QuizEngine, Scene, SceneCommand, SceneError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::hud::{self, ACCENT, BACKGROUND, BAD, GOOD, MUTED, TEXT};
use super::{to_payload, OverworldPayload, SceneContext, SceneInbox, OVERWORLD_SCENE, QUIZ_SCENE};

const FEEDBACK_SECONDS: f32 = 1.2;
const OPTIONS_TOP: i32 = 64;
const OPTION_SPACING: i32 = LINE_ADVANCE + 5;

/// Which quiz to run and where the overworld should resume afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct QuizPayload {
    pub(crate) quiz_id: String,
    pub(crate) return_map: Option<String>,
    pub(crate) position: Option<GridPos>,
    pub(crate) facing: Option<Direction>,
}

struct Feedback {
    correct: bool,
    answer: String,
    remaining: f32,
}

struct QuizResult {
    score: u32,
    correct: usize,
    total: usize,
}

/// Full-screen multiple-choice vocabulary quiz.
pub(crate) struct VocabularyQuizScene {
    context: Rc<SceneContext>,
    quiz: QuizEngine,
    payload: QuizPayload,
    inbox: SceneInbox,
    feedback: Option<Feedback>,
    correct: usize,
    total: usize,
    result: Option<QuizResult>,
    command: SceneCommand,
}

impl VocabularyQuizScene {
    pub(crate) fn new(context: Rc<SceneContext>) -> Self {
        let quiz = QuizEngine::new(context.config.quiz_points_per_correct);
        Self {
            context,
            quiz,
            payload: QuizPayload::default(),
            inbox: SceneInbox::default(),
            feedback: None,
            correct: 0,
            total: 0,
            result: None,
            command: SceneCommand::None,
        }
    }

    fn return_command(&self) -> SceneCommand {
        let payload = OverworldPayload {
            map: self.payload.return_map.clone(),
            position: self.payload.position,
            facing: self.payload.facing,
        };
        SceneCommand::switch_to(OVERWORLD_SCENE, to_payload(&payload))
    }

    fn on_action(&mut self, queue: &mut EventQueue) {
        if self.result.is_some() {
            self.command = self.return_command();
            return;
        }
        if self.feedback.take().is_some() {
            return;
        }
        let answer = self
            .quiz
            .session()
            .and_then(|session| session.current_question())
            .and_then(|question| question.correct_option())
            .unwrap_or_default()
            .to_string();
        let Some(outcome) = self.quiz.submit(queue) else {
            return;
        };
        if outcome.correct {
            self.correct += 1;
        }
        self.feedback = Some(Feedback {
            correct: outcome.correct,
            answer,
            remaining: FEEDBACK_SECONDS,
        });
        if outcome.finished {
            self.finish(queue);
        }
    }

    fn finish(&mut self, queue: &EventQueue) {
        let score = queue
            .iter()
            .find_map(|event| match event {
                GameEvent::QuizCompleted { score, .. } => Some(*score),
                _ => None,
            })
            .unwrap_or_default();
        info!(
            quiz_id = %self.payload.quiz_id,
            score,
            correct = self.correct,
            total = self.total,
            "quiz_result"
        );
        self.result = Some(QuizResult {
            score,
            correct: self.correct,
            total: self.total,
        });
    }

    fn render_question(&self, ctx: &mut dyn DrawContext) {
        let Some(session) = self.quiz.session() else {
            return;
        };
        let Some(question) = session.current_question() else {
            return;
        };
        let header = format!(
            "QUESTION {}/{}",
            session.question_index() + 1,
            session.question_count()
        );
        ctx.draw_text(&header, 6, 6, MUTED);
        ctx.draw_text(&format!("SCORE {}", session.score()), 6, 14, MUTED);

        let (width, _) = ctx.size();
        let mut y = 30;
        for line in hud::wrap_text(&question.prompt, width.saturating_sub(12)) {
            hud::draw_centered(ctx, &line, y, TEXT);
            y += LINE_ADVANCE;
        }

        for (index, option) in question.options.iter().enumerate() {
            let y = OPTIONS_TOP + index as i32 * OPTION_SPACING;
            let selected = index == session.cursor();
            let color = if selected { ACCENT } else { TEXT };
            if selected {
                ctx.draw_text(">", 24, y, ACCENT);
            }
            ctx.draw_text(option, 34, y, color);
        }
    }

    fn render_feedback(ctx: &mut dyn DrawContext, feedback: &Feedback) {
        if feedback.correct {
            hud::draw_centered(ctx, "ZUZEN! CORRECT!", 60, GOOD);
        } else {
            hud::draw_centered(ctx, "NOT QUITE...", 56, BAD);
            hud::draw_centered(ctx, &format!("ANSWER: {}", feedback.answer), 68, TEXT);
        }
    }

    fn render_result(ctx: &mut dyn DrawContext, result: &QuizResult) {
        hud::draw_centered(ctx, "QUIZ COMPLETE", 40, ACCENT);
        hud::draw_centered(
            ctx,
            &format!("{}/{} CORRECT", result.correct, result.total),
            60,
            TEXT,
        );
        hud::draw_centered(ctx, &format!("+{} XP", result.score), 72, GOOD);
        hud::draw_centered(ctx, "PRESS ENTER", 120, MUTED);
    }
}

impl Scene for VocabularyQuizScene {
    fn name(&self) -> &str {
        QUIZ_SCENE
    }

    fn enter(&mut self, payload: Value) -> Result<(), SceneError> {
        self.payload = decode_payload(QUIZ_SCENE, payload)?;
        self.inbox = SceneInbox::open(
            &self.context.bus,
            &[
                EventKind::InputDirectionDown,
                EventKind::InputActionPress,
                EventKind::InputCancelPress,
            ],
        );

        let mut queue = EventQueue::new();
        let started = self
            .quiz
            .start(&self.payload.quiz_id, self.context.content.as_ref(), &mut queue);
        if started {
            self.total = self
                .quiz
                .session()
                .map_or(0, |session| session.question_count());
            if !self.quiz.is_active() {
                self.finish(&queue);
            }
        } else {
            self.command = self.return_command();
        }
        self.context.bus.publish(&mut queue);
        Ok(())
    }

    fn update(&mut self, dt: f32) -> SceneCommand {
        let mut queue = EventQueue::new();
        for event in self.inbox.drain() {
            match event {
                GameEvent::InputDirectionDown { direction } if self.feedback.is_none() => {
                    self.quiz.move_cursor(direction);
                }
                GameEvent::InputActionPress => self.on_action(&mut queue),
                GameEvent::InputCancelPress => {
                    if self.quiz.is_active() {
                        info!(quiz_id = %self.payload.quiz_id, "quiz_abandoned");
                    }
                    self.command = self.return_command();
                }
                _ => {}
            }
        }
        if let Some(feedback) = self.feedback.as_mut() {
            feedback.remaining -= dt.max(0.0);
            if feedback.remaining <= 0.0 {
                self.feedback = None;
            }
        }
        self.context.bus.publish(&mut queue);
        std::mem::replace(&mut self.command, SceneCommand::None)
    }

    fn render(&mut self, ctx: &mut dyn DrawContext) {
        ctx.clear(BACKGROUND);
        if let Some(feedback) = &self.feedback {
            Self::render_feedback(ctx, feedback);
        } else if let Some(result) = &self.result {
            Self::render_result(ctx, result);
        } else {
            self.render_question(ctx);
        }
    }

    fn exit(&mut self) {
        self.inbox.close(&self.context.bus);
    }
}
