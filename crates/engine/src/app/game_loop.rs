use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::events::{EventBus, EventKind, GameEvent, SubscriptionSet};

use super::rendering::DrawContext;

/// Identifies one scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

/// Platform animation-frame primitive.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameHandle;
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// What the loop drives each frame.
pub trait FrameDriver {
    fn update(&mut self, dt: f32);
    fn render(&mut self, ctx: &mut dyn DrawContext);
}

/// Scheduler whose frames fire only when the caller asks.
#[derive(Debug, Default)]
pub struct ManualFrameScheduler {
    next: u64,
    pending: Option<FrameHandle>,
    requested: usize,
    cancelled: usize,
}

impl ManualFrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<FrameHandle> {
        self.pending
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Takes the scheduled frame, as the platform does when it fires.
    pub fn fire(&mut self) -> Option<FrameHandle> {
        self.pending.take()
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled
    }
}

impl FrameScheduler for ManualFrameScheduler {
    fn request_frame(&mut self) -> FrameHandle {
        self.next += 1;
        let handle = FrameHandle(self.next);
        self.pending = Some(handle);
        self.requested += 1;
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if self.pending == Some(handle) {
            self.pending = None;
            self.cancelled += 1;
        }
    }
}

pub(crate) fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

/// Variable-timestep frame loop.
///
/// Each fired frame computes a clamped delta since the previous one, runs
/// update then render, emits `FRAME_TICK` and schedules the next frame.
/// Resuming resets the time baseline so a pause never shows up as one long
/// frame.
pub struct GameLoop<S: FrameScheduler> {
    scheduler: S,
    bus: Rc<EventBus>,
    max_frame_delta: Duration,
    running: bool,
    last_frame: Option<Instant>,
    scheduled: Option<FrameHandle>,
}

impl<S: FrameScheduler> GameLoop<S> {
    pub fn new(scheduler: S, bus: Rc<EventBus>, max_frame_delta: Duration) -> Self {
        Self {
            scheduler,
            bus,
            max_frame_delta,
            running: false,
            last_frame: None,
            scheduled: None,
        }
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self, now: Instant) {
        if self.running {
            return;
        }
        self.running = true;
        self.last_frame = Some(now);
        self.schedule();
        info!(max_frame_delta_ms = self.max_frame_delta.as_millis() as u64, "loop_started");
    }

    pub fn pause(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Some(handle) = self.scheduled.take() {
            self.scheduler.cancel_frame(handle);
        }
        info!("loop_paused");
    }

    pub fn resume(&mut self, now: Instant) {
        if self.running {
            return;
        }
        self.running = true;
        self.last_frame = Some(now);
        self.schedule();
        info!("loop_resumed");
    }

    pub fn apply(&mut self, request: LoopRequest, now: Instant) {
        match request {
            LoopRequest::Pause => self.pause(),
            LoopRequest::Resume => self.resume(now),
        }
    }

    /// Runs one frame for `handle`. Returns the delta used, or `None` when
    /// the loop is paused or the handle is not the one scheduled.
    pub fn tick(
        &mut self,
        handle: FrameHandle,
        now: Instant,
        driver: &mut dyn FrameDriver,
        ctx: &mut dyn DrawContext,
    ) -> Option<f32> {
        if !self.running || self.scheduled != Some(handle) {
            debug!(?handle, running = self.running, "stale_frame_ignored");
            return None;
        }
        self.scheduled = None;

        let elapsed = self
            .last_frame
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_frame = Some(now);
        let dt = clamp_frame_delta(elapsed, self.max_frame_delta).as_secs_f32();

        driver.update(dt);
        driver.render(ctx);
        self.bus.emit(GameEvent::FrameTick { dt });

        if self.running {
            self.schedule();
        }
        Some(dt)
    }

    fn schedule(&mut self) {
        if self.scheduled.is_none() {
            self.scheduled = Some(self.scheduler.request_frame());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopRequest {
    Pause,
    Resume,
}

/// Pause/resume requests raised on the bus, applied by the loop owner
/// between frames.
#[derive(Debug, Clone, Default)]
pub struct LoopRequests {
    queue: Rc<RefCell<Vec<LoopRequest>>>,
}

impl LoopRequests {
    pub fn subscribe(bus: &EventBus) -> (Self, SubscriptionSet) {
        let requests = Self::default();
        let mut subscriptions = SubscriptionSet::new();
        for (kind, request) in [
            (EventKind::PauseGame, LoopRequest::Pause),
            (EventKind::ResumeGame, LoopRequest::Resume),
        ] {
            let queue = Rc::clone(&requests.queue);
            subscriptions.push(bus.subscribe(kind, move |_, _| {
                queue.borrow_mut().push(request);
                Ok(())
            }));
        }
        (requests, subscriptions)
    }

    pub fn take(&self) -> Vec<LoopRequest> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::rendering::RecordingDrawContext;

    #[derive(Default)]
    struct CountingDriver {
        updates: Vec<f32>,
        renders: usize,
        order: Vec<&'static str>,
    }

    impl FrameDriver for CountingDriver {
        fn update(&mut self, dt: f32) {
            self.updates.push(dt);
            self.order.push("update");
        }

        fn render(&mut self, _ctx: &mut dyn DrawContext) {
            self.renders += 1;
            self.order.push("render");
        }
    }

    fn new_loop() -> GameLoop<ManualFrameScheduler> {
        GameLoop::new(
            ManualFrameScheduler::new(),
            Rc::new(EventBus::new()),
            Duration::from_millis(250),
        )
    }

    fn fire(
        game_loop: &mut GameLoop<ManualFrameScheduler>,
        now: Instant,
        driver: &mut CountingDriver,
    ) -> Option<f32> {
        let handle = game_loop.scheduler_mut().fire()?;
        let mut ctx = RecordingDrawContext::default();
        game_loop.tick(handle, now, driver, &mut ctx)
    }

    #[test]
    fn tick_updates_then_renders_and_reschedules() {
        let mut game_loop = new_loop();
        let mut driver = CountingDriver::default();
        let t0 = Instant::now();
        game_loop.start(t0);

        let dt = fire(&mut game_loop, t0 + Duration::from_millis(16), &mut driver);

        assert!((dt.expect("ticked") - 0.016).abs() < 1e-6);
        assert_eq!(driver.order, vec!["update", "render"]);
        assert!(game_loop.scheduler().has_pending());
    }

    #[test]
    fn long_frames_are_clamped() {
        let mut game_loop = new_loop();
        let mut driver = CountingDriver::default();
        let t0 = Instant::now();
        game_loop.start(t0);

        let dt = fire(&mut game_loop, t0 + Duration::from_secs(3), &mut driver);

        assert_eq!(dt, Some(0.25));
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let mut game_loop = new_loop();
        let t0 = Instant::now();
        game_loop.start(t0);
        game_loop.start(t0);
        assert_eq!(game_loop.scheduler().requested(), 1);

        game_loop.pause();
        game_loop.pause();
        assert_eq!(game_loop.scheduler().cancelled(), 1);
        assert!(!game_loop.scheduler().has_pending());

        game_loop.resume(t0);
        game_loop.resume(t0);
        assert_eq!(game_loop.scheduler().requested(), 2);
        assert!(game_loop.is_running());
    }

    #[test]
    fn resume_after_long_pause_has_no_delta_spike() {
        let mut game_loop = new_loop();
        let mut driver = CountingDriver::default();
        let t0 = Instant::now();
        game_loop.start(t0);
        fire(&mut game_loop, t0 + Duration::from_millis(16), &mut driver);

        game_loop.pause();
        let resumed_at = t0 + Duration::from_secs(30);
        game_loop.resume(resumed_at);
        let dt = fire(
            &mut game_loop,
            resumed_at + Duration::from_millis(16),
            &mut driver,
        )
        .expect("ticked");

        assert!((dt - 0.016).abs() < 1e-6);
    }

    #[test]
    fn stale_handle_after_pause_is_ignored() {
        let mut game_loop = new_loop();
        let mut driver = CountingDriver::default();
        let t0 = Instant::now();
        game_loop.start(t0);
        let stale = game_loop.scheduler().pending().expect("scheduled");
        game_loop.pause();

        let mut ctx = RecordingDrawContext::default();
        let result = game_loop.tick(stale, t0, &mut driver, &mut ctx);

        assert_eq!(result, None);
        assert!(driver.updates.is_empty());
        assert_eq!(driver.renders, 0);
    }

    #[test]
    fn frame_tick_is_emitted_with_delta() {
        let bus = Rc::new(EventBus::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe(EventKind::FrameTick, move |event, _| {
            sink.borrow_mut().push(event.clone());
            Ok(())
        });
        let mut game_loop = GameLoop::new(
            ManualFrameScheduler::new(),
            Rc::clone(&bus),
            Duration::from_millis(250),
        );
        let mut driver = CountingDriver::default();
        let t0 = Instant::now();
        game_loop.start(t0);

        fire(&mut game_loop, t0 + Duration::from_millis(20), &mut driver);

        assert_eq!(seen.borrow().len(), 1);
        assert!(matches!(seen.borrow()[0], GameEvent::FrameTick { dt } if (dt - 0.02).abs() < 1e-6));
    }

    #[test]
    fn bus_requests_pause_and_resume_the_loop() {
        let bus = EventBus::new();
        let (requests, _subscriptions) = LoopRequests::subscribe(&bus);
        let mut game_loop = new_loop();
        let t0 = Instant::now();
        game_loop.start(t0);

        bus.emit(GameEvent::PauseGame);
        for request in requests.take() {
            game_loop.apply(request, t0);
        }
        assert!(!game_loop.is_running());

        bus.emit(GameEvent::ResumeGame);
        for request in requests.take() {
            game_loop.apply(request, t0);
        }
        assert!(game_loop.is_running());
        assert!(requests.take().is_empty());
    }
}
