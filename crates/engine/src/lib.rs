use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod animation;
pub mod app;
pub mod config;
pub mod content;
pub mod dialogue;
pub mod events;
pub mod grid;
pub mod input;
pub mod json;
pub mod movement;
pub mod npc;
pub mod progress;
pub mod quiz;
pub mod save;
pub mod world;

pub use animation::SpriteAnimator;
pub use app::{
    decode_payload, run_app, run_app_with_metrics, AppError, AppRuntime, DrawContext, GameLoop,
    LoopConfig, LoopMetricsSnapshot, MetricsHandle, RecordingDrawContext, Renderer, Rgba, Scene,
    SceneCommand, SceneError, SceneManager, SourceRect,
};
pub use config::GameConfig;
pub use content::{ContentDatabase, ContentError, ContentProvider, VocabEntry};
pub use dialogue::{DialogueEngine, DialogueLine, DialogueScript, DialogueState};
pub use events::{EventBus, EventKind, EventQueue, GameEvent, SubscriptionSet};
pub use grid::{Direction, GridPos, PixelPos};
pub use input::{HeldDirections, InputMapper, KeyBindings, LogicalInput};
pub use movement::{MovementGate, MovementWorld, PlayerMovementController};
pub use npc::{NpcDefinition, NpcRegistry};
pub use progress::{LevelTable, Progress, ProgressTracker};
pub use quiz::{QuizDefinition, QuizEngine, QuizQuestion, QuizState};
pub use save::{FileSaveStore, MemorySaveStore, SaveError, SaveStore};
pub use world::{FileMapLoader, MapLoadError, MapLoader, StaticMapLoader, TileMap};

pub const ROOT_ENV_VAR: &str = "EUSKAL_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
    pub saves_dir: PathBuf,
}

impl AppPaths {
    /// Layout under an already resolved root. Creates nothing.
    pub fn under(root: PathBuf) -> Self {
        Self {
            assets_dir: root.join("assets"),
            saves_dir: root.join("saves"),
            root,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.assets_dir.join("manifest.json")
    }

    pub fn maps_dir(&self) -> PathBuf {
        self.assets_dir.join("maps")
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create save directory at {path}: {source}")]
    CreateSaveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "EUSKAL_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/euskal-quest\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let paths = AppPaths::under(resolve_root()?);
    fs::create_dir_all(&paths.saves_dir).map_err(|source| StartupError::CreateSaveDir {
        path: paths.saves_dir.clone(),
        source,
    })?;
    Ok(paths)
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            exe_dir
                .ancestors()
                .find(|candidate| is_repo_marker(candidate))
                .map(normalize_path)
                .ok_or_else(|| StartupError::RootNotFound {
                    start_dir: normalize_path(&exe_dir),
                    env_var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    path.join("Cargo.toml").is_file() && path.join("assets").is_dir()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
