use super::{DrawContext, Rgba, SourceRect, LOGICAL_HEIGHT, LOGICAL_WIDTH};

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    Clear(Rgba),
    FillRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        color: Rgba,
    },
    Image {
        key: String,
        src: SourceRect,
        x: i32,
        y: i32,
    },
    Text {
        text: String,
        x: i32,
        y: i32,
        color: Rgba,
    },
}

/// Draw context that records calls instead of rasterizing them.
#[derive(Debug, Clone)]
pub struct RecordingDrawContext {
    width: u32,
    height: u32,
    calls: Vec<DrawCall>,
}

impl Default for RecordingDrawContext {
    fn default() -> Self {
        Self::new(LOGICAL_WIDTH, LOGICAL_HEIGHT)
    }
}

impl RecordingDrawContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            calls: Vec::new(),
        }
    }

    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    pub fn take(&mut self) -> Vec<DrawCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.calls.iter().filter_map(|call| match call {
            DrawCall::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn has_text(&self, needle: &str) -> bool {
        self.texts().any(|text| text.contains(needle))
    }
}

impl DrawContext for RecordingDrawContext {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgba) {
        self.calls.push(DrawCall::Clear(color));
    }

    fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgba) {
        self.calls.push(DrawCall::FillRect {
            x,
            y,
            width,
            height,
            color,
        });
    }

    fn draw_image_region(&mut self, image: &str, src: SourceRect, x: i32, y: i32) {
        self.calls.push(DrawCall::Image {
            key: image.to_string(),
            src,
            x,
            y,
        });
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, color: Rgba) {
        self.calls.push(DrawCall::Text {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }
}
