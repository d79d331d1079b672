use crate::app::assets::AssetStore;

use super::font::{glyph_pixels, GLYPH_ADVANCE, LINE_ADVANCE};
use super::{DrawContext, Rgba, SourceRect, PLACEHOLDER_COLOR};

/// `DrawContext` over a row-major RGBA8 buffer. All writes are clipped.
pub struct FrameCanvas<'a> {
    frame: &'a mut [u8],
    width: u32,
    height: u32,
    assets: &'a mut AssetStore,
}

impl<'a> FrameCanvas<'a> {
    pub fn new(frame: &'a mut [u8], width: u32, height: u32, assets: &'a mut AssetStore) -> Self {
        Self {
            frame,
            width,
            height,
            assets,
        }
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: Rgba) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let Some(pixel) = self.frame.get_mut(offset..offset + 4) else {
            return;
        };
        if color[3] == 255 {
            pixel.copy_from_slice(&color);
        } else if color[3] > 0 {
            blend(pixel, color);
        }
    }
}

fn blend(pixel: &mut [u8], color: Rgba) {
    let alpha = u16::from(color[3]);
    for channel in 0..3 {
        let src = u16::from(color[channel]);
        let dst = u16::from(pixel[channel]);
        pixel[channel] = ((src * alpha + dst * (255 - alpha)) / 255) as u8;
    }
    pixel[3] = 255;
}

impl DrawContext for FrameCanvas<'_> {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgba) {
        for chunk in self.frame.chunks_exact_mut(4) {
            chunk.copy_from_slice(&color);
        }
    }

    fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgba) {
        let left = x.max(0);
        let top = y.max(0);
        let right = x.saturating_add(width as i32).min(self.width as i32);
        let bottom = y.saturating_add(height as i32).min(self.height as i32);
        for py in top..bottom {
            for px in left..right {
                self.put_pixel(px, py, color);
            }
        }
    }

    fn draw_image_region(&mut self, image: &str, src: SourceRect, x: i32, y: i32) {
        let Some(loaded) = self.assets.image(image) else {
            self.fill_rect(x, y, src.width, src.height, PLACEHOLDER_COLOR);
            return;
        };
        let (frame, width, height) = (&mut *self.frame, self.width as i32, self.height as i32);
        for sy in 0..src.height {
            let py = y + sy as i32;
            if py < 0 || py >= height {
                continue;
            }
            for sx in 0..src.width {
                let px = x + sx as i32;
                if px < 0 || px >= width {
                    continue;
                }
                let Some(color) = loaded.pixel(src.x + sx, src.y + sy) else {
                    continue;
                };
                if color[3] == 0 {
                    continue;
                }
                let offset = (py as usize * width as usize + px as usize) * 4;
                if let Some(pixel) = frame.get_mut(offset..offset + 4) {
                    if color[3] == 255 {
                        pixel.copy_from_slice(&color);
                    } else {
                        blend(pixel, color);
                    }
                }
            }
        }
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, color: Rgba) {
        let (mut cursor_x, mut cursor_y) = (x, y);
        for ch in text.chars() {
            if ch == '\n' {
                cursor_x = x;
                cursor_y += LINE_ADVANCE;
                continue;
            }
            for (col, row) in glyph_pixels(ch) {
                self.put_pixel(cursor_x + col, cursor_y + row, color);
            }
            cursor_x += GLYPH_ADVANCE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::assets::LoadedImage;

    const WHITE: Rgba = [255, 255, 255, 255];

    fn pixel(frame: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * width + x) * 4) as usize;
        [frame[offset], frame[offset + 1], frame[offset + 2], frame[offset + 3]]
    }

    #[test]
    fn fill_rect_clips_to_frame() {
        let mut assets = AssetStore::new("unused");
        let mut frame = vec![0u8; 4 * 4 * 4];
        let mut canvas = FrameCanvas::new(&mut frame, 4, 4, &mut assets);

        canvas.fill_rect(-2, 2, 10, 10, WHITE);

        assert_eq!(pixel(&frame, 4, 0, 1), [0, 0, 0, 0]);
        assert_eq!(pixel(&frame, 4, 3, 3), WHITE);
    }

    #[test]
    fn missing_image_draws_placeholder_of_source_size() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut assets = AssetStore::new(dir.path());
        let mut frame = vec![0u8; 8 * 8 * 4];
        let mut canvas = FrameCanvas::new(&mut frame, 8, 8, &mut assets);

        canvas.draw_image_region("sprites/nobody", SourceRect::new(0, 0, 2, 2), 1, 1);

        assert_eq!(pixel(&frame, 8, 1, 1), PLACEHOLDER_COLOR);
        assert_eq!(pixel(&frame, 8, 2, 2), PLACEHOLDER_COLOR);
        assert_eq!(pixel(&frame, 8, 3, 3), [0, 0, 0, 0]);
    }

    #[test]
    fn image_region_copies_opaque_pixels_only() {
        let mut assets = AssetStore::new("unused");
        assets.insert(
            "sheet",
            LoadedImage {
                width: 2,
                height: 1,
                rgba: vec![0, 0, 0, 0, 9, 8, 7, 255],
            },
        );
        let mut frame = vec![1u8; 4 * 4 * 4];
        let mut canvas = FrameCanvas::new(&mut frame, 4, 4, &mut assets);

        canvas.draw_image_region("sheet", SourceRect::new(0, 0, 2, 1), 0, 0);

        assert_eq!(pixel(&frame, 4, 0, 0), [1, 1, 1, 1]);
        assert_eq!(pixel(&frame, 4, 1, 0), [9, 8, 7, 255]);
    }

    #[test]
    fn text_near_edges_never_writes_out_of_bounds() {
        let mut assets = AssetStore::new("unused");
        let mut frame = vec![0u8; 3 * 3 * 4];
        let mut canvas = FrameCanvas::new(&mut frame, 3, 3, &mut assets);

        canvas.draw_text("AGUR\nKAIXO", -2, -2, WHITE);
        canvas.draw_text("I", 0, 0, WHITE);

        assert_eq!(pixel(&frame, 3, 0, 0), WHITE);
    }
}
