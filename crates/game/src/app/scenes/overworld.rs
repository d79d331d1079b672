use std::rc::Rc;
use std::task::Poll;

use engine::app::{DrawContext, SourceRect};
use engine::events::{EventKind, EventQueue, GameEvent};
use engine::world::{
    MapLoadError, MapObjectKind, PendingMap, TileMap, Warp, COLLISION_LAYER_NAME,
};
use engine::{
    decode_payload, DialogueEngine, Direction, GridPos, MovementGate, MovementWorld,
    NpcDefinition, NpcRegistry, PixelPos, PlayerMovementController, Scene, SceneCommand,
    SceneError, SpriteAnimator, SubscriptionSet,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::hud::{self, BACKGROUND, TEXT};
use super::{
    to_payload, QuizPayload, SceneContext, SceneInbox, OVERWORLD_SCENE, QUIZ_SCENE,
};

const PLAYER_SPRITE: &str = "sprites/player_sprite";
const SPAWN_LABEL: &str = "spawn";
const DEFAULT_SPAWN: GridPos = GridPos::new(1, 1);
const LEVEL_UP_BANNER_SECONDS: f32 = 2.0;

pub(super) const INBOX_KINDS: [EventKind; 8] = [
    EventKind::InputDirectionDown,
    EventKind::InputActionPress,
    EventKind::DialogueRequested,
    EventKind::QuizTrigger,
    EventKind::PlayerEnterWarp,
    EventKind::VocabularyLearned,
    EventKind::LessonCompleted,
    EventKind::LevelUp,
];

/// Where the overworld should open. Every field is optional; an empty
/// payload opens the configured start map at its spawn label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct OverworldPayload {
    pub(crate) map: Option<String>,
    pub(crate) position: Option<GridPos>,
    pub(crate) facing: Option<Direction>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Arrival {
    position: Option<GridPos>,
    facing: Option<Direction>,
}

struct PendingLoad {
    pending: PendingMap,
    arrival: Arrival,
}

/// Tile-grid exploration: the player walks the active map, talks to NPCs
/// and follows warps.
pub(crate) struct Overworld {
    context: Rc<SceneContext>,
    map: Option<Rc<TileMap>>,
    loading: Option<PendingLoad>,
    controller: PlayerMovementController,
    gate: MovementGate,
    gate_subscriptions: SubscriptionSet,
    npcs: NpcRegistry,
    dialogue: DialogueEngine,
    animator: SpriteAnimator,
    inbox: SceneInbox,
    last_word: Option<String>,
    banner: Option<(String, f32)>,
    command: SceneCommand,
}

impl Overworld {
    pub(crate) fn new(context: Rc<SceneContext>) -> Self {
        let config = &context.config;
        let gate = MovementGate::new();
        let controller = PlayerMovementController::new(DEFAULT_SPAWN, Direction::Down, config)
            .with_gate(gate.clone());
        let npcs = NpcRegistry::new(config.patrol_step_seconds);
        let dialogue = DialogueEngine::new(config.char_reveal_seconds);
        let animator =
            SpriteAnimator::new(PLAYER_SPRITE, config.animation_frame_seconds, config.tile_size);
        Self {
            context,
            map: None,
            loading: None,
            controller,
            gate,
            gate_subscriptions: SubscriptionSet::new(),
            npcs,
            dialogue,
            animator,
            inbox: SceneInbox::default(),
            last_word: None,
            banner: None,
            command: SceneCommand::None,
        }
    }

    fn begin_load(&mut self, map_id: &str, arrival: Arrival) {
        debug!(map = map_id, "map_requested");
        self.loading = Some(PendingLoad {
            pending: self.context.maps.request(map_id),
            arrival,
        });
    }

    fn poll_loading(&mut self) -> Poll<Result<(), MapLoadError>> {
        let Some(load) = self.loading.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let Poll::Ready(result) = load.pending.poll() else {
            return Poll::Pending;
        };
        let arrival = load.arrival;
        self.loading = None;
        Poll::Ready(result.map(|map| self.activate(map, arrival)))
    }

    fn activate(&mut self, map: Rc<TileMap>, arrival: Arrival) {
        let (spawn, spawn_facing) = spawn_point(&map);
        let position = arrival.position.unwrap_or(spawn);
        let facing = arrival.facing.unwrap_or(spawn_facing);

        self.npcs.load(NpcDefinition::from_map(&map));
        self.controller.place(position, facing);
        self.animator.reset();
        info!(
            map = map.id(),
            area = map.area_name(),
            col = position.col,
            row = position.row,
            npcs = self.npcs.len(),
            "area_activated"
        );
        let area = map.id().to_string();
        self.map = Some(map);
        self.context.bus.emit(GameEvent::AreaEntered { area });
    }

    /// Applies one inbox event. Returns true when it started an NPC
    /// interaction; direction input is ignored once one has started.
    fn handle(
        &mut self,
        event: GameEvent,
        interacting: bool,
        map: &TileMap,
        queue: &mut EventQueue,
    ) -> bool {
        match event {
            GameEvent::InputDirectionDown { direction } => {
                if !interacting && !self.dialogue.is_active() {
                    self.controller.enqueue(direction);
                }
            }
            GameEvent::InputActionPress => {
                if self.dialogue.is_active() {
                    self.dialogue.advance(queue);
                } else if !interacting && self.controller.interact(&self.npcs, queue) {
                    self.controller.clear_intents();
                    return true;
                }
            }
            GameEvent::DialogueRequested { id } => {
                self.dialogue.start(&id, self.context.content.as_ref(), queue);
            }
            GameEvent::QuizTrigger { quiz_id } => {
                info!(quiz_id = %quiz_id, map = map.id(), "quiz_requested");
                let payload = QuizPayload {
                    quiz_id,
                    return_map: Some(map.id().to_string()),
                    position: Some(self.controller.grid_position()),
                    facing: Some(self.controller.facing()),
                };
                self.command = SceneCommand::switch_to(QUIZ_SCENE, to_payload(&payload));
            }
            GameEvent::PlayerEnterWarp { warp } => self.enter_warp(warp),
            GameEvent::VocabularyLearned { word } => self.last_word = Some(word),
            GameEvent::LessonCompleted { vocab, .. } => {
                if let Some(word) = vocab.last() {
                    self.last_word = Some(word.clone());
                }
            }
            GameEvent::LevelUp { level, .. } => {
                self.banner = Some((format!("LEVEL UP! {level}"), LEVEL_UP_BANNER_SECONDS));
            }
            _ => {}
        }
        false
    }

    /// Drains the inbox. An interaction is published and its follow-ups
    /// handled before the controller runs, so the gate is already closed.
    fn handle_inbox(&mut self, map: &TileMap, queue: &mut EventQueue) {
        let mut interacting = false;
        for event in self.inbox.drain() {
            if self.handle(event, interacting, map, queue) {
                interacting = true;
            }
        }
        if !interacting {
            return;
        }
        self.context.bus.publish(queue);
        for event in self.inbox.drain() {
            self.handle(event, true, map, queue);
        }
        self.context.bus.publish(queue);
    }

    fn enter_warp(&mut self, warp: Warp) {
        let arrival = Arrival {
            position: warp.destination.position,
            facing: warp.destination.facing,
        };
        match warp.destination.scene {
            Some(scene) => {
                info!(scene = %scene, map = %warp.target_map, "warp_to_scene");
                let payload = OverworldPayload {
                    map: Some(warp.target_map).filter(|map| !map.is_empty()),
                    position: arrival.position,
                    facing: arrival.facing,
                };
                self.command = SceneCommand::switch_to(scene, to_payload(&payload));
            }
            None => {
                info!(map = %warp.target_map, "warp_to_map");
                self.controller.clear_intents();
                self.begin_load(&warp.target_map, arrival);
            }
        }
    }

    fn render_world(&self, ctx: &mut dyn DrawContext, map: &TileMap) {
        let tile = (map.tile_width().max(1), map.tile_height().max(1));
        let view = ctx.size();
        let camera = camera_origin(
            self.controller.pixel_position(),
            tile,
            (map.width() * tile.0, map.height() * tile.1),
            view,
        );

        if let Some(tileset) = map.tileset() {
            let columns = tileset.columns.max(1);
            let (tw, th) = (tileset.tile_width.max(1), tileset.tile_height.max(1));
            for layer in map.layers() {
                if !layer.is_visible() || layer.name() == COLLISION_LAYER_NAME {
                    continue;
                }
                for row in 0..layer.height() as i32 {
                    for col in 0..layer.width() as i32 {
                        let Some(gid) = layer.tile_at(col, row) else {
                            continue;
                        };
                        if gid < tileset.first_gid {
                            continue;
                        }
                        let x = col * tile.0 as i32 - camera.0;
                        let y = row * tile.1 as i32 - camera.1;
                        if x + tile.0 as i32 <= 0
                            || y + tile.1 as i32 <= 0
                            || x >= view.0 as i32
                            || y >= view.1 as i32
                        {
                            continue;
                        }
                        let index = gid - tileset.first_gid;
                        let src = SourceRect::new((index % columns) * tw, (index / columns) * th, tw, th);
                        ctx.draw_image_region(&tileset.image, src, x, y);
                    }
                }
            }
        }

        let frame = SourceRect::new(0, 0, tile.0, tile.1);
        for npc in self.npcs.iter() {
            let position = npc.position();
            let x = position.col * tile.0 as i32 - camera.0;
            let y = position.row * tile.1 as i32 - camera.1;
            ctx.draw_image_region(npc.sprite(), frame, x, y);
        }

        let player = self.controller.pixel_position();
        ctx.draw_image_region(
            self.animator.sprite(),
            self.animator.source_rect(self.controller.facing()),
            player.x.round() as i32 - camera.0,
            player.y.round() as i32 - camera.1,
        );
    }
}

impl Scene for Overworld {
    fn name(&self) -> &str {
        OVERWORLD_SCENE
    }

    fn enter(&mut self, payload: Value) -> Result<(), SceneError> {
        let payload: OverworldPayload = decode_payload(OVERWORLD_SCENE, payload)?;
        let map_id = payload
            .map
            .unwrap_or_else(|| self.context.start_map.clone());
        self.inbox = SceneInbox::open(&self.context.bus, &INBOX_KINDS);
        self.gate_subscriptions = self.gate.subscribe(&self.context.bus);
        self.begin_load(
            &map_id,
            Arrival {
                position: payload.position,
                facing: payload.facing,
            },
        );
        Ok(())
    }

    fn poll_enter(&mut self) -> Poll<Result<(), SceneError>> {
        self.poll_loading()
            .map(|result| result.map_err(|error| SceneError::enter_failed(OVERWORLD_SCENE, error)))
    }

    fn update(&mut self, dt: f32) -> SceneCommand {
        if self.loading.is_some() {
            match self.poll_loading() {
                Poll::Pending => return SceneCommand::None,
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(error)) => warn!(error = %error, "warp_cancelled"),
            }
        }
        let Some(map) = self.map.clone() else {
            return SceneCommand::None;
        };

        let mut queue = EventQueue::new();
        self.handle_inbox(&map, &mut queue);

        self.npcs.update(dt);
        self.dialogue.update(dt);
        let world = MovementWorld {
            map: &map,
            npcs: &self.npcs,
            held: &self.context.held,
        };
        self.controller.update(dt, &world, &mut queue);
        if self.controller.is_moving() {
            self.animator.update(dt);
        } else {
            self.animator.reset();
        }
        if let Some((_, remaining)) = self.banner.as_mut() {
            *remaining -= dt.max(0.0);
            if *remaining <= 0.0 {
                self.banner = None;
            }
        }

        self.context.bus.publish(&mut queue);
        std::mem::replace(&mut self.command, SceneCommand::None)
    }

    fn render(&mut self, ctx: &mut dyn DrawContext) {
        ctx.clear(BACKGROUND);
        let Some(map) = self.map.clone() else {
            hud::draw_centered(ctx, "LOADING...", 76, TEXT);
            return;
        };
        self.render_world(ctx, &map);

        {
            let progress = self.context.progress.borrow();
            hud::draw_status(
                ctx,
                progress.level_label(),
                progress.xp(),
                self.last_word.as_deref(),
            );
        }
        if let Some(session) = self.dialogue.session() {
            hud::draw_dialogue(ctx, session);
        } else if !self.controller.is_moving() {
            if let Some(prompt) = self
                .npcs
                .prompt_for(self.controller.grid_position(), self.controller.facing())
            {
                hud::draw_prompt(ctx, &prompt);
            }
        }
        if let Some((text, _)) = &self.banner {
            hud::draw_banner(ctx, text);
        }
    }

    fn exit(&mut self) {
        let bus = &self.context.bus;
        self.inbox.close(bus);
        self.gate_subscriptions.release(bus);
        self.loading = None;
    }
}

/// The `spawn` label's cell and facing, or the top-left walkable default.
fn spawn_point(map: &TileMap) -> (GridPos, Direction) {
    map.objects_of(MapObjectKind::Label)
        .find(|object| object.name == SPAWN_LABEL)
        .map(|object| {
            let facing = object
                .property_str("facing")
                .and_then(Direction::parse)
                .unwrap_or(Direction::Down);
            (map.grid_of(object), facing)
        })
        .unwrap_or((DEFAULT_SPAWN, Direction::Down))
}

/// Top-left of the view in map pixels: centred on the focused tile and
/// clamped to the map, or centred on the map when it is smaller than the
/// view.
pub(crate) fn camera_origin(
    focus: PixelPos,
    tile: (u32, u32),
    map_px: (u32, u32),
    view: (u32, u32),
) -> (i32, i32) {
    let axis = |focus: f32, tile: u32, map: u32, view: u32| -> i32 {
        let (map, view) = (map as i32, view as i32);
        if map <= view {
            return (map - view) / 2;
        }
        let centred = focus.round() as i32 + tile as i32 / 2 - view / 2;
        centred.clamp(0, map - view)
    };
    (
        axis(focus.x, tile.0, map_px.0, view.0),
        axis(focus.y, tile.1, map_px.1, view.1),
    )
}
