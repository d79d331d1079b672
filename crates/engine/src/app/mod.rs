mod assets;
mod game_loop;
mod loop_runner;
mod metrics;
mod rendering;
mod scene;

pub use assets::{normalize_key, AssetStore, LoadedImage};
pub use game_loop::{
    FrameDriver, FrameHandle, FrameScheduler, GameLoop, LoopRequest, LoopRequests,
    ManualFrameScheduler,
};
pub use loop_runner::{run_app, run_app_with_metrics, AppError, AppRuntime, LoopConfig};
pub use metrics::{subscribe_loop_metrics, LoopMetricsSnapshot, MetricsHandle};
pub use rendering::{
    text_width, DrawCall, DrawContext, FrameCanvas, RecordingDrawContext, Renderer, Rgba,
    SourceRect, GLYPH_ADVANCE, GLYPH_HEIGHT, LINE_ADVANCE, LOGICAL_HEIGHT, LOGICAL_WIDTH,
    PLACEHOLDER_COLOR,
};
pub use scene::{decode_payload, Scene, SceneCommand, SceneError, SceneFactory, SceneManager};
