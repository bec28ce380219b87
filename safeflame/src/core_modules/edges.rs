// THEORY:
// A compact Canny edge detector over an 8-bit grayscale image, used by the
// boil-over heuristic to measure how "busy" the region above a pot is.
//
// Algorithm steps:
// 1.  **Gradient**: 3x3 Sobel in x and y with replicated borders. Magnitude is the
//     L1 norm |gx| + |gy|.
// 2.  **Non-maximum suppression**: each pixel's gradient direction is quantized to
//     one of four axes (0, 45, 90, 135 degrees); a pixel survives only if its
//     magnitude is a local maximum along that axis.
// 3.  **Hysteresis**: survivors above `high` are strong edges. Survivors above
//     `low` become edges only when 8-connected, directly or transitively, to a
//     strong edge.

use image::GrayImage;

/// Returns a binary edge map as a flat row-major `Vec<bool>`.
pub fn canny(gray: &GrayImage, low: f32, high: f32) -> Vec<bool> {
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    let mut edges = vec![false; width * height];
    if width == 0 || height == 0 {
        return edges;
    }

    // --- 1. Gradient ---
    let sample = |x: i64, y: i64| -> f32 {
        let cx = x.clamp(0, width as i64 - 1) as u32;
        let cy = y.clamp(0, height as i64 - 1) as u32;
        gray.get_pixel(cx, cy).0[0] as f32
    };
    let mut magnitude = vec![0.0f32; width * height];
    let mut direction = vec![0u8; width * height];
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let gx = (sample(x + 1, y - 1) + 2.0 * sample(x + 1, y) + sample(x + 1, y + 1))
                - (sample(x - 1, y - 1) + 2.0 * sample(x - 1, y) + sample(x - 1, y + 1));
            let gy = (sample(x - 1, y + 1) + 2.0 * sample(x, y + 1) + sample(x + 1, y + 1))
                - (sample(x - 1, y - 1) + 2.0 * sample(x, y - 1) + sample(x + 1, y - 1));
            let i = y as usize * width + x as usize;
            magnitude[i] = gx.abs() + gy.abs();
            direction[i] = quantize_direction(gx, gy);
        }
    }

    // --- 2. Non-maximum suppression ---
    let mag_at = |x: i64, y: i64| -> f32 {
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            0.0
        } else {
            magnitude[y as usize * width + x as usize]
        }
    };
    let mut candidates = vec![0u8; width * height]; // 0 none, 1 weak, 2 strong
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let i = y as usize * width + x as usize;
            let m = magnitude[i];
            if m <= low {
                continue;
            }
            let (dx, dy) = match direction[i] {
                0 => (1, 0),
                1 => (1, 1),
                2 => (0, 1),
                _ => (1, -1),
            };
            if m < mag_at(x + dx, y + dy) || m < mag_at(x - dx, y - dy) {
                continue;
            }
            candidates[i] = if m > high { 2 } else { 1 };
        }
    }

    // --- 3. Hysteresis ---
    let mut stack: Vec<usize> = Vec::new();
    for (i, c) in candidates.iter().enumerate() {
        if *c == 2 {
            edges[i] = true;
            stack.push(i);
        }
    }
    while let Some(i) = stack.pop() {
        let x = (i % width) as i64;
        let y = (i / width) as i64;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let ni = ny as usize * width + nx as usize;
                if candidates[ni] == 1 && !edges[ni] {
                    edges[ni] = true;
                    stack.push(ni);
                }
            }
        }
    }

    edges
}

/// Counts the edge pixels `canny` finds in `gray`.
pub fn edge_pixel_count(gray: &GrayImage, low: f32, high: f32) -> usize {
    canny(gray, low, high).into_iter().filter(|e| *e).count()
}

/// Quantizes a gradient to 0 (horizontal), 1 (45 deg), 2 (vertical) or 3 (135 deg).
/// Image y grows downward, so a positive `gx * gy` product is the 45 degree diagonal.
fn quantize_direction(gx: f32, gy: f32) -> u8 {
    let ax = gx.abs();
    let ay = gy.abs();
    // tan(22.5 deg) ~= 0.4142
    if ay <= ax * 0.4142 {
        0
    } else if ax <= ay * 0.4142 {
        2
    } else if gx * gy > 0.0 {
        1
    } else {
        3
    }
}
