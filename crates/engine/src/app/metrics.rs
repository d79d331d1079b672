use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::events::{EventBus, EventKind, GameEvent, SubscriptionSet};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub frame_time_ms: f32,
    pub max_frame_time_ms: f32,
    /// Tiles the player walked during the interval.
    pub player_steps: u32,
}

/// Latest published snapshot, shared with whoever displays it.
#[derive(Clone, Debug, Default)]
pub struct MetricsHandle {
    snapshot: Rc<Cell<LoopMetricsSnapshot>>,
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        self.snapshot.get()
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        self.snapshot.set(snapshot);
    }
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    frames: u32,
    frame_time_sum: Duration,
    frame_time_max: Duration,
    player_steps: u32,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval_start: now,
            interval,
            frames: 0,
            frame_time_sum: Duration::ZERO,
            frame_time_max: Duration::ZERO,
            player_steps: 0,
        }
    }

    pub(crate) fn record_frame(&mut self, frame_dt: Duration) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(frame_dt);
        self.frame_time_max = self.frame_time_max.max(frame_dt);
    }

    pub(crate) fn record_step(&mut self) {
        self.player_steps = self.player_steps.saturating_add(1);
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = if self.frames == 0 {
            0.0
        } else {
            (self.frame_time_sum.as_secs_f32() / self.frames as f32) * 1000.0
        };
        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / elapsed_seconds,
            frame_time_ms,
            max_frame_time_ms: self.frame_time_max.as_secs_f32() * 1000.0,
            player_steps: self.player_steps,
        };

        self.interval_start = now;
        self.frames = 0;
        self.frame_time_sum = Duration::ZERO;
        self.frame_time_max = Duration::ZERO;
        self.player_steps = 0;
        Some(snapshot)
    }
}

/// Counts `PlayerMoved` steps and `FrameTick` frames; each interval the
/// snapshot is logged and published to `handle`.
pub fn subscribe_loop_metrics(
    bus: &EventBus,
    interval: Duration,
    handle: MetricsHandle,
) -> SubscriptionSet {
    let accumulator = Rc::new(RefCell::new(MetricsAccumulator::new(interval, Instant::now())));
    let mut subscriptions = SubscriptionSet::new();

    let steps = Rc::clone(&accumulator);
    subscriptions.push(bus.subscribe(EventKind::PlayerMoved, move |_, _| {
        steps.borrow_mut().record_step();
        Ok(())
    }));

    subscriptions.push(bus.subscribe(EventKind::FrameTick, move |event, _| {
        let GameEvent::FrameTick { dt } = event else {
            return Ok(());
        };
        let mut accumulator = accumulator.borrow_mut();
        accumulator.record_frame(Duration::try_from_secs_f32(*dt).unwrap_or_default());
        if let Some(snapshot) = accumulator.maybe_snapshot(Instant::now()) {
            handle.publish(snapshot);
            info!(
                fps = snapshot.fps,
                frame_time_ms = snapshot.frame_time_ms,
                max_frame_time_ms = snapshot.max_frame_time_ms,
                player_steps = snapshot.player_steps,
                "loop_metrics"
            );
        }
        Ok(())
    }));
    subscriptions
}
