use std::fmt;

use serde::{Deserialize, Serialize};

/// Tile size used by the default 240x160 presentation.
pub const DEFAULT_TILE_SIZE: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" | "north" => Some(Direction::Up),
            "down" | "south" => Some(Direction::Down),
            "left" | "west" => Some(Direction::Left),
            "right" | "east" => Some(Direction::Right),
            _ => None,
        }
    }

    pub(crate) const fn bit(self) -> u8 {
        match self {
            Direction::Up => 0b0001,
            Direction::Down => 0b0010,
            Direction::Left => 0b0100,
            Direction::Right => 0b1000,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridPos {
    pub col: i32,
    pub row: i32,
}

impl GridPos {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    pub fn step(self, direction: Direction) -> Self {
        let (dc, dr) = direction.delta();
        Self {
            col: self.col.saturating_add(dc),
            row: self.row.saturating_add(dr),
        }
    }

    pub fn to_pixel(self, tile_size: u32) -> PixelPos {
        PixelPos {
            x: self.col as f32 * tile_size as f32,
            y: self.row as f32 * tile_size as f32,
        }
    }

    /// Cell containing the given pixel coordinate.
    pub fn from_pixel(x: f32, y: f32, tile_width: u32, tile_height: u32) -> Self {
        let tw = tile_width.max(1) as f32;
        let th = tile_height.max(1) as f32;
        Self {
            col: (x / tw).floor() as i32,
            row: (y / th).floor() as i32,
        }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelPos {
    pub x: f32,
    pub y: f32,
}

impl PixelPos {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn lerp(self, to: PixelPos, t: f32) -> PixelPos {
        let t = t.clamp(0.0, 1.0);
        PixelPos {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
        }
    }
}
