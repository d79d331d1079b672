use std::rc::Rc;

use engine::app::DrawContext;
use engine::events::{EventKind, GameEvent};
use engine::{Scene, SceneCommand, SceneError};
use serde_json::Value;
use tracing::info;

use super::hud::{self, ACCENT, BACKGROUND, MUTED, TEXT};
use super::{SceneContext, SceneInbox, OVERWORLD_SCENE, TITLE_SCENE};

const BLINK_PERIOD_SECONDS: f32 = 1.0;
const BLINK_VISIBLE_SECONDS: f32 = 0.65;

pub(crate) struct TitleScene {
    context: Rc<SceneContext>,
    inbox: SceneInbox,
    blink: f32,
    command: SceneCommand,
}

impl TitleScene {
    pub(crate) fn new(context: Rc<SceneContext>) -> Self {
        Self {
            context,
            inbox: SceneInbox::default(),
            blink: 0.0,
            command: SceneCommand::None,
        }
    }
}

impl Scene for TitleScene {
    fn name(&self) -> &str {
        TITLE_SCENE
    }

    fn enter(&mut self, _payload: Value) -> Result<(), SceneError> {
        self.inbox = SceneInbox::open(
            &self.context.bus,
            &[EventKind::InputActionPress, EventKind::InputCancelPress],
        );
        Ok(())
    }

    fn update(&mut self, dt: f32) -> SceneCommand {
        for event in self.inbox.drain() {
            match event {
                GameEvent::InputActionPress => {
                    info!("title_continue");
                    self.command = SceneCommand::switch_to(OVERWORLD_SCENE, Value::Null);
                }
                GameEvent::InputCancelPress => self.command = SceneCommand::Quit,
                _ => {}
            }
        }
        if dt.is_finite() && dt > 0.0 {
            self.blink = (self.blink + dt) % BLINK_PERIOD_SECONDS;
        }
        std::mem::replace(&mut self.command, SceneCommand::None)
    }

    fn render(&mut self, ctx: &mut dyn DrawContext) {
        ctx.clear(BACKGROUND);
        hud::draw_centered(ctx, "EUSKAL QUEST", 44, ACCENT);
        hud::draw_centered(ctx, "LEARN BASQUE ONE STEP AT A TIME", 56, MUTED);

        let progress = self.context.progress.borrow();
        let summary = format!("LEVEL {}  XP {}", progress.level_label(), progress.xp());
        hud::draw_centered(ctx, &summary, 80, TEXT);

        if self.blink < BLINK_VISIBLE_SECONDS {
            hud::draw_centered(ctx, "PRESS ENTER", 108, TEXT);
        }
        hud::draw_centered(ctx, "ESC TO QUIT", 140, MUTED);
    }

    fn exit(&mut self) {
        self.inbox.close(&self.context.bus);
    }
}
