use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture, TextureError};
use winit::window::Window;

use crate::app::assets::AssetStore;

use super::{DrawContext, FrameCanvas};

/// Fixed logical-resolution pixel buffer scaled onto the window surface.
pub struct Renderer {
    pixels: Pixels<'static>,
    assets: AssetStore,
    width: u32,
    height: u32,
}

impl Renderer {
    pub fn new(window: Arc<Window>, logical: (u32, u32), assets: AssetStore) -> Result<Self, Error> {
        let size = window.inner_size();
        let surface = SurfaceTexture::new(size.width.max(1), size.height.max(1), window);
        let (width, height) = (logical.0.max(1), logical.1.max(1));
        let pixels = Pixels::new(width, height, surface)?;
        Ok(Self {
            pixels,
            assets,
            width,
            height,
        })
    }

    pub fn logical_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), TextureError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels.resize_surface(width, height)
    }

    /// Runs `draw` against the frame buffer, then presents it.
    pub fn draw_frame<R>(&mut self, draw: impl FnOnce(&mut dyn DrawContext) -> R) -> Result<R, Error> {
        let frame = self.pixels.frame_mut();
        let mut canvas = FrameCanvas::new(frame, self.width, self.height, &mut self.assets);
        let result = draw(&mut canvas);
        self.pixels.render()?;
        Ok(result)
    }

    /// Presents the previous frame again without redrawing.
    pub fn present(&self) -> Result<(), Error> {
        self.pixels.render()
    }
}
