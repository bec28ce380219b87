// THEORY:
// A `Mask` is a binary image: one flag per pixel saying "this pixel matched the
// color band". It is the bridge between single-pixel color tests and the spatial
// question the heuristics actually care about: "is there a large enough patch of
// flame- or smoke-colored pixels, and where is it?"
//
// Algorithm steps, in the order the extractor applies them:
// 1.  **Opening**: an erosion followed by a dilation with a square structuring
//     element. Erosion removes speckles smaller than the element; dilation grows
//     the survivors back to roughly their original shape. Both passes are
//     separable for a square element, so each is a horizontal then a vertical
//     sweep. Pixels outside the image never erode a border pixel and never
//     dilate into the image.
// 2.  **Region extraction**: 8-connected components, found with the same
//     stack-driven region growing the blob detector uses on its heatmap. Each
//     component is summarized as its bounding rectangle and its pixel count.
//     Only outer components are reported: a component sitting inside another
//     component's hole is dropped, as is any hole itself. The background is
//     4-connected (the dual of the 8-connected foreground) and is flooded from the
//     image border first; a component is outer when it touches the border or
//     that flooded background.

use crate::types::Rect;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

/// One connected patch of set pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// The tight bounding rectangle of the patch.
    pub rect: Rect,
    /// Number of set pixels in the patch.
    pub area: usize,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.data[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            let i = self.index(x, y);
            self.data[i] = value;
        }
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// Morphological opening with a `kernel_size` x `kernel_size` square.
    pub fn open(&self, kernel_size: u32) -> Mask {
        if kernel_size <= 1 {
            return self.clone();
        }
        self.erode(kernel_size).dilate(kernel_size)
    }

    pub fn erode(&self, kernel_size: u32) -> Mask {
        // Out-of-image samples count as set, so the border is not eaten away.
        let horizontal = self.sweep(kernel_size, true, |window| window.iter().all(|v| v.unwrap_or(true)));
        horizontal.sweep(kernel_size, false, |window| window.iter().all(|v| v.unwrap_or(true)))
    }

    pub fn dilate(&self, kernel_size: u32) -> Mask {
        let horizontal = self.sweep(kernel_size, true, |window| window.iter().any(|v| v.unwrap_or(false)));
        horizontal.sweep(kernel_size, false, |window| window.iter().any(|v| v.unwrap_or(false)))
    }

    /// Applies `reduce` to a one-dimensional window around every pixel.
    /// The window spans `kernel_size` samples with the anchor at `kernel_size / 2`.
    fn sweep<F>(&self, kernel_size: u32, horizontal: bool, reduce: F) -> Mask
    where
        F: Fn(&[Option<bool>]) -> bool,
    {
        let before = (kernel_size / 2) as i64;
        let after = kernel_size as i64 - 1 - before;
        let mut out = Mask::new(self.width, self.height);
        let mut window: Vec<Option<bool>> = Vec::with_capacity(kernel_size as usize);

        for y in 0..self.height {
            for x in 0..self.width {
                window.clear();
                for offset in -before..=after {
                    let (sx, sy) = if horizontal {
                        (x as i64 + offset, y as i64)
                    } else {
                        (x as i64, y as i64 + offset)
                    };
                    let inside = sx >= 0 && sy >= 0 && sx < self.width as i64 && sy < self.height as i64;
                    window.push(inside.then(|| self.get(sx as u32, sy as u32)));
                }
                if reduce(&window) {
                    out.set(x, y, true);
                }
            }
        }
        out
    }

    /// Finds every outer 8-connected patch of set pixels. Patches enclosed by
    /// another patch are not reported.
    pub fn regions(&self) -> Vec<Region> {
        let outside = self.outer_background();
        let mut visited = vec![false; self.data.len()];
        let mut regions = Vec::new();

        for y in 0..self.height {
            for x in 0..self.width {
                let i = self.index(x, y);
                if !self.data[i] || visited[i] {
                    continue;
                }
                visited[i] = true;
                let (region, is_outer) = self.grow_region(x, y, &mut visited, &outside);
                if is_outer {
                    regions.push(region);
                }
            }
        }
        regions
    }

    /// Unset pixels 4-connected to the image border.
    fn outer_background(&self) -> Vec<bool> {
        let mut outside = vec![false; self.data.len()];
        if self.data.is_empty() {
            return outside;
        }
        let mut stack = Vec::new();
        let (w, h) = (self.width, self.height);
        let border = (0..w)
            .flat_map(|x| [(x, 0), (x, h.saturating_sub(1))])
            .chain((0..h).flat_map(|y| [(0, y), (w.saturating_sub(1), y)]));
        for (x, y) in border {
            let i = self.index(x, y);
            if !self.data[i] && !outside[i] {
                outside[i] = true;
                stack.push((x, y));
            }
        }

        while let Some((cx, cy)) = stack.pop() {
            for (nx, ny) in self.four_neighbors(cx, cy) {
                let ni = self.index(nx, ny);
                if !self.data[ni] && !outside[ni] {
                    outside[ni] = true;
                    stack.push((nx, ny));
                }
            }
        }
        outside
    }

    fn four_neighbors(&self, x: u32, y: u32) -> impl Iterator<Item = (u32, u32)> + use<> {
        let (w, h) = (self.width as i64, self.height as i64);
        [(0i64, -1i64), (-1, 0), (1, 0), (0, 1)].into_iter().filter_map(move |(dx, dy)| {
            let (nx, ny) = (x as i64 + dx, y as i64 + dy);
            (nx >= 0 && ny >= 0 && nx < w && ny < h).then_some((nx as u32, ny as u32))
        })
    }

    /// Depth-first region growing from a seed pixel that is already marked visited.
    /// Also reports whether the region borders the image edge or the outer background.
    fn grow_region(&self, seed_x: u32, seed_y: u32, visited: &mut [bool], outside: &[bool]) -> (Region, bool) {
        let mut stack = vec![(seed_x, seed_y)];
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (seed_x, seed_y, seed_x, seed_y);
        let mut area = 0usize;
        let mut is_outer = false;

        while let Some((cx, cy)) = stack.pop() {
            area += 1;
            min_x = min_x.min(cx);
            min_y = min_y.min(cy);
            max_x = max_x.max(cx);
            max_y = max_y.max(cy);

            if !is_outer {
                let on_edge = cx == 0 || cy == 0 || cx + 1 == self.width || cy + 1 == self.height;
                is_outer = on_edge || self.four_neighbors(cx, cy).any(|(nx, ny)| outside[self.index(nx, ny)]);
            }

            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = cx as i64 + dx;
                    let ny = cy as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= self.width as i64 || ny >= self.height as i64 {
                        continue;
                    }
                    let ni = self.index(nx as u32, ny as u32);
                    if self.data[ni] && !visited[ni] {
                        visited[ni] = true;
                        stack.push((nx as u32, ny as u32));
                    }
                }
            }
        }

        let region = Region {
            rect: Rect::new(
                min_x as i32,
                min_y as i32,
                (max_x - min_x + 1) as i32,
                (max_y - min_y + 1) as i32,
            ),
            area,
        };
        (region, is_outer)
    }
}
