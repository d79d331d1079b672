use std::cell::RefCell;
use std::env;
use std::rc::Rc;

use engine::events::{EventBus, EventKind, GameEvent};
use engine::world::FileMapLoader;
use engine::{
    resolve_app_paths, AppError, AppPaths, AppRuntime, ContentDatabase, FileSaveStore,
    GameConfig, InputMapper, KeyBindings, LevelTable, LoopConfig, ProgressTracker, SaveStore,
    SceneManager,
};
use serde_json::Value;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use super::scenes::{register_scenes, SceneContext, TITLE_SCENE};

const STEP_SECONDS_ENV_VAR: &str = "GAME_STEP_SECONDS";
const START_MAP_ENV_VAR: &str = "GAME_START_MAP";
const DEFAULT_START_MAP: &str = "entrance_hall.json";
const PRELOAD_DIRS: [&str; 2] = ["sprites", "tilesets"];

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) runtime: AppRuntime,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    let paths = resolve_app_paths()?;
    let config = game_config(env::var(STEP_SECONDS_ENV_VAR).ok().as_deref());
    let start_map = resolve_start_map(env::var(START_MAP_ENV_VAR).ok().as_deref());
    info!(
        root = %paths.root.display(),
        start_map = %start_map,
        step_seconds = config.step_duration_seconds,
        "app_configured"
    );

    let bus = Rc::new(EventBus::with_failure_threshold(
        config.handler_failure_threshold,
    ));
    let store: Rc<dyn SaveStore> = Rc::new(FileSaveStore::new(paths.saves_dir.clone()));
    let progress = Rc::new(RefCell::new(ProgressTracker::load(
        store,
        config.save_slot,
        LevelTable::from_config(&config),
        config.lesson_default_xp,
    )));
    // Lives for the whole app; never released.
    let _progress_subscriptions = ProgressTracker::subscribe(&progress, &bus);
    subscribe_event_log(&bus);

    let input = InputMapper::new(KeyBindings::default());
    let context = Rc::new(SceneContext {
        bus: Rc::clone(&bus),
        content: Rc::new(load_content(&paths)),
        maps: Rc::new(FileMapLoader::new(paths.maps_dir())),
        progress,
        held: input.held_directions(),
        start_map,
        config,
    });
    let mut scenes = SceneManager::new().with_fallback(TITLE_SCENE);
    register_scenes(&mut scenes, &context);

    Ok(AppWiring {
        config: LoopConfig::default(),
        runtime: AppRuntime {
            bus,
            input,
            scenes,
            initial_scene: TITLE_SCENE.to_string(),
            initial_payload: Value::Null,
            asset_root: paths.assets_dir,
            preload_dirs: PRELOAD_DIRS.iter().map(|dir| dir.to_string()).collect(),
        },
    })
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn load_content(paths: &AppPaths) -> ContentDatabase {
    let manifest = paths.manifest_path();
    match ContentDatabase::load_manifest(&paths.assets_dir, &manifest) {
        Ok(content) => content,
        Err(error) => {
            warn!(
                manifest = %manifest.display(),
                error = %error,
                "content_load_failed_using_empty"
            );
            ContentDatabase::new()
        }
    }
}

/// Audio output is external; cues are only logged, as are preloads.
fn subscribe_event_log(bus: &EventBus) {
    bus.subscribe(EventKind::PlaySound, |event, _| {
        if let GameEvent::PlaySound { key } = event {
            debug!(key = %key, "play_sound");
        }
        Ok(())
    });
    bus.subscribe(EventKind::AssetLoaded, |event, _| {
        if let GameEvent::AssetLoaded { asset } = event {
            debug!(asset = %asset, "asset_preloaded");
        }
        Ok(())
    });
    bus.subscribe(EventKind::AssetsComplete, |_, _| {
        info!("assets_ready");
        Ok(())
    });
}

fn game_config(step_seconds: Option<&str>) -> GameConfig {
    let mut config = GameConfig::default();
    if let Some(step) = step_seconds.and_then(parse_step_seconds) {
        config.step_duration_seconds = step;
    }
    config.normalized()
}

fn parse_step_seconds(raw: &str) -> Option<f32> {
    match raw.trim().parse::<f32>() {
        Ok(value) if value.is_finite() && value > 0.0 => Some(value),
        _ => {
            warn!(
                var = STEP_SECONDS_ENV_VAR,
                value = raw,
                "invalid_env_override_using_default"
            );
            None
        }
    }
}

fn resolve_start_map(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        Some(_) => {
            warn!(var = START_MAP_ENV_VAR, "invalid_env_override_using_default");
            DEFAULT_START_MAP.to_string()
        }
        None => DEFAULT_START_MAP.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use engine::content::ContentProvider;
    use engine::world::{is_blocked, parse_tiled_map};
    use engine::{GridPos, NpcDefinition};

    use super::*;

    fn shipped_paths() -> AppPaths {
        AppPaths::under(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../.."))
    }

    #[test]
    fn step_override_accepts_positive_seconds() {
        let config = game_config(Some(" 0.35 "));
        assert_eq!(config.step_duration_seconds, 0.35);
    }

    #[test]
    fn invalid_step_override_keeps_default() {
        let default = GameConfig::default().step_duration_seconds;
        for raw in ["", "fast", "0", "-1", "NaN", "inf"] {
            assert_eq!(game_config(Some(raw)).step_duration_seconds, default, "{raw}");
        }
        assert_eq!(game_config(None).step_duration_seconds, default);
    }

    #[test]
    fn start_map_override_falls_back_when_blank() {
        assert_eq!(resolve_start_map(Some("cave.json")), "cave.json");
        assert_eq!(resolve_start_map(Some("   ")), DEFAULT_START_MAP);
        assert_eq!(resolve_start_map(None), DEFAULT_START_MAP);
    }

    #[test]
    fn shipped_images_preload() {
        let assets_dir = shipped_paths().assets_dir;
        let mut store = engine::app::AssetStore::new(assets_dir);
        let mut events = engine::events::EventQueue::new();
        let dirs: Vec<String> = PRELOAD_DIRS.iter().map(|dir| dir.to_string()).collect();

        let loaded = store.preload(&dirs, &mut events);

        assert_eq!(loaded, 5);
        assert!(store.is_loaded("sprites/player_sprite"));
        assert!(store.is_loaded("tilesets/school_tileset.png"));
        assert_eq!(events.take().last(), Some(&GameEvent::AssetsComplete));
    }

    #[test]
    fn missing_manifest_yields_empty_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let content = load_content(&AppPaths::under(dir.path().to_path_buf()));
        assert_eq!(content.dialogue_count(), 0);
        assert_eq!(content.quiz_count(), 0);
    }

    #[test]
    fn shipped_content_loads() {
        let content = load_content(&shipped_paths());
        assert!(content.dialogue("receptionist").is_some());
        assert_eq!(
            content.dialogue("teacher_intro").and_then(|script| script.follow_up_quiz),
            Some("colors".to_string())
        );
        assert_eq!(content.quiz("greetings").map(|quiz| quiz.questions.len()), Some(3));
        assert_eq!(content.translate("urdina"), Some("blue"));
    }

    #[test]
    fn shipped_maps_parse_with_spawn_npcs_and_warps() {
        let maps_dir = shipped_paths().maps_dir();
        let raw = fs::read_to_string(maps_dir.join(DEFAULT_START_MAP)).expect("start map");
        let hall = parse_tiled_map(DEFAULT_START_MAP, &raw).expect("parse start map");
        assert_eq!(hall.area_name(), "Entrance Hall");
        assert!(is_blocked(&hall, 0, 0));
        assert!(!is_blocked(&hall, 9, 9));

        let npcs = NpcDefinition::from_map(&hall);
        let receptionist = npcs
            .iter()
            .find(|npc| npc.id == "receptionist")
            .expect("receptionist");
        assert_eq!(receptionist.position, GridPos::new(9, 3));
        assert_eq!(receptionist.dialogue.as_deref(), Some("receptionist"));

        let door = hall.warp_at(GridPos::new(17, 5)).expect("classroom door");
        assert_eq!(door.target_map, "classroom.json");
        let raw = fs::read_to_string(maps_dir.join(&door.target_map)).expect("classroom");
        let classroom = parse_tiled_map(&door.target_map, &raw).expect("parse classroom");
        let back = classroom.warp_at(GridPos::new(0, 4)).expect("hall door");
        assert_eq!(back.destination.position, Some(GridPos::new(16, 5)));
    }
}
