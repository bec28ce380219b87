// THEORY:
// Debug overlays: an annotated copy of a frame showing what the engine saw. Zone
// outlines are red when a flame overlaps the zone and green otherwise, flame
// regions are boxed in red and confirmed smoke regions in gray. Nothing here
// feeds back into the engine.

use crate::core_modules::frame::Frame;
use crate::signals::FactBundle;
use crate::types::{Rect, Zone};
use image::{ImageEncoder, ImageError, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use std::path::Path;

const ZONE_ACTIVE: Rgba<u8> = Rgba([255, 0, 0, 255]);
const ZONE_IDLE: Rgba<u8> = Rgba([0, 255, 0, 255]);
const FLAME_BOX: Rgba<u8> = Rgba([255, 64, 0, 255]);
const SMOKE_BOX: Rgba<u8> = Rgba([160, 160, 160, 255]);
const LINE_WIDTH: i32 = 2;

/// Returns an annotated copy of `frame`.
pub fn annotate(frame: &Frame, facts: &FactBundle, zones: &[Zone]) -> RgbaImage {
    let mut canvas = frame.image().clone();
    for zone in zones {
        let color = if facts.flame_present(&zone.name) { ZONE_ACTIVE } else { ZONE_IDLE };
        draw_outline(&mut canvas, &zone.rect(), color);
    }
    for rect in &facts.flame_rects {
        draw_outline(&mut canvas, rect, FLAME_BOX);
    }
    for rect in &facts.smoke_rects {
        draw_outline(&mut canvas, rect, SMOKE_BOX);
    }
    canvas
}

/// Draws a `LINE_WIDTH` thick rectangle border inside `rect`, clipped to the canvas.
pub fn draw_outline(canvas: &mut RgbaImage, rect: &Rect, color: Rgba<u8>) {
    if rect.x.checked_add(rect.w).is_none() || rect.y.checked_add(rect.h).is_none() {
        return;
    }
    for inset in 0..LINE_WIDTH {
        let (w, h) = (rect.w - 2 * inset, rect.h - 2 * inset);
        if w <= 0 || h <= 0 {
            break;
        }
        let ring = imageproc::rect::Rect::at(rect.x + inset, rect.y + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, ring, color);
    }
}

pub fn save_png(path: impl AsRef<Path>, image: &RgbaImage) -> Result<(), ImageError> {
    let output = std::io::BufWriter::new(std::fs::File::create(path)?);
    let encoder = image::codecs::png::PngEncoder::new(output);
    encoder.write_image(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgba8)?;
    Ok(())
}
