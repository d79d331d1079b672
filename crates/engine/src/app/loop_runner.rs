use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use crate::events::{EventBus, EventQueue, GameEvent};
use crate::input::InputMapper;
use crate::StartupError;

use super::assets::AssetStore;
use super::game_loop::{GameLoop, LoopRequests, ManualFrameScheduler};
use super::metrics::subscribe_loop_metrics;
use super::rendering::{Renderer, LOGICAL_HEIGHT, LOGICAL_WIDTH};
use super::scene::{SceneError, SceneManager};
use super::MetricsHandle;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub logical_width: u32,
    pub logical_height: u32,
    pub max_frame_delta: Duration,
    pub metrics_log_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Euskal Quest".to_string(),
            window_width: LOGICAL_WIDTH * 4,
            window_height: LOGICAL_HEIGHT * 4,
            logical_width: LOGICAL_WIDTH,
            logical_height: LOGICAL_HEIGHT,
            max_frame_delta: Duration::from_millis(250),
            metrics_log_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("failed to enter initial scene: {0}")]
    InitialScene(#[source] SceneError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

/// Everything the window loop owns once it starts.
pub struct AppRuntime {
    pub bus: Rc<EventBus>,
    pub input: InputMapper,
    pub scenes: SceneManager,
    pub initial_scene: String,
    pub initial_payload: Value,
    pub asset_root: PathBuf,
    /// Asset subdirectories decoded before the first scene opens.
    pub preload_dirs: Vec<String>,
}

pub fn run_app(config: LoopConfig, runtime: AppRuntime) -> Result<(), AppError> {
    run_app_with_metrics(config, runtime, MetricsHandle::default())
}

pub fn run_app_with_metrics(
    config: LoopConfig,
    runtime: AppRuntime,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let AppRuntime {
        bus,
        mut input,
        mut scenes,
        initial_scene,
        initial_payload,
        asset_root,
        preload_dirs,
    } = runtime;

    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let logical_size = (config.logical_width.max(1), config.logical_height.max(1));
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .with_min_inner_size(LogicalSize::new(logical_size.0 as f64, logical_size.1 as f64))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let mut assets = AssetStore::new(asset_root);
    let mut asset_events = EventQueue::new();
    let preloaded = assets.preload(&preload_dirs, &mut asset_events);
    let mut renderer = Renderer::new(Arc::clone(&window), logical_size, assets)
        .map_err(AppError::CreateRenderer)?;

    event_loop.set_control_flow(ControlFlow::Poll);

    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let _metrics_subscriptions = subscribe_loop_metrics(&bus, metrics_log_interval, metrics_handle);
    let (loop_requests, _loop_subscriptions) = LoopRequests::subscribe(&bus);

    info!(
        logical_width = logical_size.0,
        logical_height = logical_size.1,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        preloaded_images = preloaded,
        "loop_config"
    );
    bus.publish(&mut asset_events);
    scenes
        .switch_to(&initial_scene, initial_payload)
        .map_err(AppError::InitialScene)?;

    let mut game_loop = GameLoop::new(
        ManualFrameScheduler::new(),
        Rc::clone(&bus),
        max_frame_delta,
    );
    game_loop.start(Instant::now());

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    info!(reason = "window_close", "shutdown_requested");
                    window_target.exit();
                }
                WindowEvent::Resized(new_size) => {
                    if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                        warn!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::ScaleFactorChanged { .. } => {
                    let size = window.inner_size();
                    if let Err(error) = renderer.resize(size.width, size.height) {
                        warn!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::Focused(focused) => {
                    if focused {
                        bus.emit(GameEvent::ResumeGame);
                    } else {
                        input.release_all();
                        publish_input_edges(&mut input, &bus);
                        bus.emit(GameEvent::PauseGame);
                    }
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.repeat {
                        return;
                    }
                    let Some(raw) = key_name(event.physical_key) else {
                        return;
                    };
                    match event.state {
                        ElementState::Pressed => input.press(raw),
                        ElementState::Released => input.release(raw),
                    };
                    publish_input_edges(&mut input, &bus);
                }
                WindowEvent::RedrawRequested => {
                    let Some(handle) = game_loop.scheduler_mut().fire() else {
                        if let Err(error) = renderer.present() {
                            warn!(error = %error, "renderer_present_failed");
                        }
                        return;
                    };
                    let now = Instant::now();
                    let drawn =
                        renderer.draw_frame(|ctx| game_loop.tick(handle, now, &mut scenes, ctx));
                    if let Err(error) = drawn {
                        warn!(error = %error, "renderer_draw_failed");
                        window_target.exit();
                    }
                    if scenes.quit_requested() {
                        info!(reason = "scene_quit", "shutdown_requested");
                        window_target.exit();
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                for request in loop_requests.take() {
                    game_loop.apply(request, Instant::now());
                }
                if game_loop.scheduler().has_pending() {
                    window_target.set_control_flow(ControlFlow::Poll);
                    window.request_redraw();
                } else {
                    window_target.set_control_flow(ControlFlow::Wait);
                }
            }
            Event::LoopExiting => {
                scenes.shutdown();
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

fn publish_input_edges(input: &mut InputMapper, bus: &EventBus) {
    for edge in input.drain_edges() {
        bus.emit(edge.to_event());
    }
}

/// Raw identifier the input bindings use for a physical key.
fn key_name(key: PhysicalKey) -> Option<&'static str> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    let name = match code {
        KeyCode::ArrowUp => "ArrowUp",
        KeyCode::ArrowDown => "ArrowDown",
        KeyCode::ArrowLeft => "ArrowLeft",
        KeyCode::ArrowRight => "ArrowRight",
        KeyCode::KeyW => "KeyW",
        KeyCode::KeyA => "KeyA",
        KeyCode::KeyS => "KeyS",
        KeyCode::KeyD => "KeyD",
        KeyCode::KeyZ => "KeyZ",
        KeyCode::KeyX => "KeyX",
        KeyCode::Enter | KeyCode::NumpadEnter => "Enter",
        KeyCode::Space => "Space",
        KeyCode::Escape => "Escape",
        KeyCode::Backspace => "Backspace",
        _ => return None,
    };
    Some(name)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}
