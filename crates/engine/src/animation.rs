use crate::app::SourceRect;
use crate::grid::Direction;

pub const DEFAULT_FRAME_COUNT: u32 = 4;

/// Cycles walk frames on its own fixed interval.
///
/// Sheets are laid out one row per facing (down, left, right, up) and one
/// column per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteAnimator {
    sprite: String,
    frame_seconds: f32,
    frame_width: u32,
    frame_height: u32,
    frame_count: u32,
    elapsed: f32,
    frame: u32,
}

impl SpriteAnimator {
    pub fn new(sprite: impl Into<String>, frame_seconds: f32, frame_size: u32) -> Self {
        Self {
            sprite: sprite.into(),
            frame_seconds,
            frame_width: frame_size,
            frame_height: frame_size,
            frame_count: DEFAULT_FRAME_COUNT,
            elapsed: 0.0,
            frame: 0,
        }
    }

    pub fn with_frame_count(mut self, frame_count: u32) -> Self {
        self.frame_count = frame_count.max(1);
        self.frame %= self.frame_count;
        self
    }

    pub fn sprite(&self) -> &str {
        &self.sprite
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn update(&mut self, dt: f32) {
        if self.frame_seconds <= 0.0 || !dt.is_finite() || dt <= 0.0 {
            return;
        }
        self.elapsed += dt;
        while self.elapsed >= self.frame_seconds {
            self.elapsed -= self.frame_seconds;
            self.frame = (self.frame + 1) % self.frame_count;
        }
    }

    /// Back to the standing frame.
    pub fn reset(&mut self) {
        self.elapsed = 0.0;
        self.frame = 0;
    }

    pub fn source_rect(&self, facing: Direction) -> SourceRect {
        SourceRect {
            x: self.frame * self.frame_width,
            y: facing_row(facing) * self.frame_height,
            width: self.frame_width,
            height: self.frame_height,
        }
    }
}

fn facing_row(facing: Direction) -> u32 {
    match facing {
        Direction::Down => 0,
        Direction::Left => 1,
        Direction::Right => 2,
        Direction::Up => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_advance_on_fixed_interval_and_wrap() {
        let mut animator = SpriteAnimator::new("player", 0.25, 16);
        animator.update(0.125);
        assert_eq!(animator.frame(), 0);
        animator.update(0.125);
        assert_eq!(animator.frame(), 1);
        animator.update(0.75);
        assert_eq!(animator.frame(), 0);
    }

    #[test]
    fn large_delta_advances_several_frames() {
        let mut animator = SpriteAnimator::new("player", 0.25, 16);
        animator.update(0.5);
        assert_eq!(animator.frame(), 2);
    }

    #[test]
    fn source_rect_selects_row_by_facing() {
        let mut animator = SpriteAnimator::new("player", 0.25, 16);
        animator.update(0.25);
        assert_eq!(
            animator.source_rect(Direction::Up),
            SourceRect {
                x: 16,
                y: 48,
                width: 16,
                height: 16
            }
        );
        animator.reset();
        assert_eq!(animator.source_rect(Direction::Down).x, 0);
    }

    #[test]
    fn negative_delta_is_ignored() {
        let mut animator = SpriteAnimator::new("player", 0.25, 16);
        animator.update(-1.0);
        assert_eq!(animator.frame(), 0);
    }
}
