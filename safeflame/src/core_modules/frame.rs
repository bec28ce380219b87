// THEORY:
// `Frame` is the engine's view of one camera image. It wraps an `image::RgbaImage`
// so that the rest of the engine can ask the two questions the heuristics need:
// "which pixels fall inside this HSV band?" (a binary `Mask`) and "what does this
// frame look like in grayscale?" (for motion and edges). Like `Pixel` and `Chunk`
// it is a data container; it has no memory of previous frames.

use crate::config::HsvBand;
use crate::core_modules::mask::Mask;
use crate::core_modules::pixel::pixel::Pixel;
use crate::error::EngineError;
use image::{GrayImage, Luma, RgbaImage};

const CHANNELS: usize = 4;

#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbaImage,
}

impl Frame {
    /// Wraps a raw RGBA buffer, rejecting buffers whose length does not match the size.
    pub fn from_rgba(width: u32, height: u32, buffer: Vec<u8>) -> Result<Self, EngineError> {
        let expected = width as usize * height as usize * CHANNELS;
        let actual = buffer.len();
        RgbaImage::from_raw(width, height, buffer)
            .map(|image| Self { image })
            .ok_or(EngineError::FrameSize {
                width,
                height,
                expected,
                actual,
            })
    }

    /// An all-black frame, used when a tick carries detections but no image.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255])),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Marks every pixel whose HSV representation falls inside `band`.
    pub fn hsv_mask(&self, band: &HsvBand) -> Mask {
        let mut mask = Mask::new(self.width(), self.height());
        for (x, y, rgba) in self.image.enumerate_pixels() {
            if band.contains(Pixel::from(*rgba).hsv()) {
                mask.set(x, y, true);
            }
        }
        mask
    }

    pub fn gray(&self) -> GrayImage {
        let mut gray = GrayImage::new(self.width(), self.height());
        for (x, y, rgba) in self.image.enumerate_pixels() {
            gray.put_pixel(x, y, Luma([Pixel::from(*rgba).gray()]));
        }
        gray
    }
}

impl From<RgbaImage> for Frame {
    fn from(image: RgbaImage) -> Self {
        Self { image }
    }
}

impl From<image::DynamicImage> for Frame {
    fn from(image: image::DynamicImage) -> Self {
        Self { image: image.to_rgba8() }
    }
}
