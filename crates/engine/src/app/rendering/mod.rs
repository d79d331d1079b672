mod canvas;
mod font;
mod recording;
mod renderer;

pub use canvas::FrameCanvas;
pub use font::{text_width, GLYPH_ADVANCE, GLYPH_HEIGHT, LINE_ADVANCE};
pub use recording::{DrawCall, RecordingDrawContext};
pub use renderer::Renderer;

pub type Rgba = [u8; 4];

/// Logical resolution every scene draws against.
pub const LOGICAL_WIDTH: u32 = 240;
pub const LOGICAL_HEIGHT: u32 = 160;

pub const PLACEHOLDER_COLOR: Rgba = [255, 0, 255, 255];

/// Region of a source image, in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SourceRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Abstract 2D surface the scenes render into.
///
/// Images are addressed by asset key; a key that cannot be resolved draws
/// as a placeholder of the requested size instead of failing.
pub trait DrawContext {
    fn size(&self) -> (u32, u32);
    fn clear(&mut self, color: Rgba);
    fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgba);
    fn draw_image_region(&mut self, image: &str, src: SourceRect, x: i32, y: i32);
    fn draw_text(&mut self, text: &str, x: i32, y: i32, color: Rgba);
}
