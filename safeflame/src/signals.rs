// THEORY:
// The `signals` module is the Signal Extractor: the pixel-level layer of the hazard
// engine. It takes one frame, the classifier's detections and the monitored zones,
// and produces a `FactBundle` of plain facts the tracker can reason about: where
// flame-colored regions are, which smoke regions have persisted long enough to be
// believed, which zones show boil-over activity, which zones have a flame inside
// them, and which flammable objects sit too close to a zone.
//
// Key architectural principles:
// 1.  **Heuristics, not models**: every signal is a threshold over pixel
//     statistics. False positives and negatives are expected; they are filtered
//     downstream by the tracker's timers and cooldowns rather than here.
// 2.  **Minimal memory**: the extractor remembers exactly two things between
//     ticks, the previous grayscale frame (the motion baseline for boil-over) and
//     the smoke persistence ledger. Everything else is recomputed per frame.
// 3.  **Explicit time**: the tick's timestamp is passed in, never read here, so a
//     replayed recording behaves exactly like the live feed did.

use crate::config::SignalConfig;
use crate::core_modules::edges;
use crate::core_modules::frame::Frame;
use crate::types::{Detection, Rect, Seconds, Zone};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// A flammable object found too close to a zone's center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityHazard {
    pub object_class: String,
    pub zone_name: String,
    /// Center-to-center distance in pixels.
    pub distance: f64,
}

/// The per-tick output of the Signal Extractor. Missing fields deserialize as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactBundle {
    pub flame_rects: Vec<Rect>,
    /// Smoke regions that passed the persistence gate.
    pub smoke_rects: Vec<Rect>,
    pub boilover_zone_names: Vec<String>,
    pub zone_flame_present: HashMap<String, bool>,
    pub proximity_hazards: Vec<ProximityHazard>,
}

impl FactBundle {
    pub fn flame_present(&self, zone_name: &str) -> bool {
        self.zone_flame_present.get(zone_name).copied().unwrap_or(false)
    }
}

type BucketKey = (i32, i32);

pub struct SignalExtractor {
    config: SignalConfig,
    /// Grayscale copy of the previous frame; the motion baseline for boil-over.
    prev_gray: Option<GrayImage>,
    /// Smoke bucket -> timestamp it was first seen in the current unbroken run.
    smoke_first_seen: HashMap<BucketKey, Seconds>,
}

impl SignalExtractor {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            config,
            prev_gray: None,
            smoke_first_seen: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Replaces the thresholds. A changed bucket size invalidates the smoke ledger.
    pub fn set_config(&mut self, config: SignalConfig) {
        if config.smoke_bucket_size != self.config.smoke_bucket_size {
            self.smoke_first_seen.clear();
        }
        self.config = config;
    }

    /// Runs every heuristic over one frame and advances the motion baseline.
    pub fn analyze(&mut self, frame: &Frame, detections: &[Detection], zones: &[Zone], now: Seconds) -> FactBundle {
        let gray = frame.gray();

        let flame_rects = self.detect_flame(frame);
        let smoke_rects = if self.config.smoke_detection_enabled {
            self.detect_smoke(frame, now)
        } else {
            self.smoke_first_seen.clear();
            Vec::new()
        };
        let boilover_zone_names = if self.config.boilover_detection_enabled {
            self.detect_boilover(&gray, zones)
        } else {
            Vec::new()
        };
        let zone_flame_present = zone_flame_overlap(&flame_rects, zones);
        let proximity_hazards = self.proximity_hazards(detections, zones);

        self.prev_gray = Some(gray);

        debug!(
            flames = flame_rects.len(),
            smoke = smoke_rects.len(),
            boilover = boilover_zone_names.len(),
            proximity = proximity_hazards.len(),
            "signals extracted"
        );

        FactBundle {
            flame_rects,
            smoke_rects,
            boilover_zone_names,
            zone_flame_present,
            proximity_hazards,
        }
    }

    /// Flame-colored regions at least `flame_min_area` pixels large.
    pub fn detect_flame(&self, frame: &Frame) -> Vec<Rect> {
        frame
            .hsv_mask(&self.config.flame_band)
            .open(self.config.flame_kernel_size)
            .regions()
            .into_iter()
            .filter(|region| region.area >= self.config.flame_min_area)
            .map(|region| region.rect)
            .collect()
    }

    /// Smoke-colored regions whose grid bucket has been seen continuously for at
    /// least `smoke_persistence_seconds`. Buckets absent from this frame are forgotten.
    pub fn detect_smoke(&mut self, frame: &Frame, now: Seconds) -> Vec<Rect> {
        let candidates: Vec<Rect> = frame
            .hsv_mask(&self.config.smoke_band)
            .open(self.config.smoke_kernel_size)
            .regions()
            .into_iter()
            .filter(|region| region.area >= self.config.smoke_min_area)
            .map(|region| region.rect)
            .collect();

        let cell = self.config.smoke_bucket_size.max(1) as i32;
        let mut active: HashSet<BucketKey> = HashSet::new();
        let mut confirmed = Vec::new();

        for rect in candidates {
            let key = (rect.x.div_euclid(cell), rect.y.div_euclid(cell));
            active.insert(key);
            let first_seen = *self.smoke_first_seen.entry(key).or_insert(now);
            if now - first_seen >= self.config.smoke_persistence_seconds {
                confirmed.push(rect);
            } else {
                trace!(?key, age = now - first_seen, "smoke bucket not yet persistent");
            }
        }

        self.smoke_first_seen.retain(|key, _| active.contains(key));
        confirmed
    }

    /// Zones whose strip directly above (half the zone's height, same width) shows
    /// either enough frame-to-frame motion or enough edges. Needs a previous frame.
    pub fn detect_boilover(&self, gray: &GrayImage, zones: &[Zone]) -> Vec<String> {
        let Some(prev) = self.prev_gray.as_ref() else {
            return Vec::new();
        };
        if prev.dimensions() != gray.dimensions() {
            // Frame size changed; there is no comparable baseline this tick.
            return Vec::new();
        }

        let (width, height) = (gray.width() as i32, gray.height() as i32);
        let mut flagged = Vec::new();

        for zone in zones {
            let rect = zone.rect();
            let x0 = rect.x.max(0);
            let x1 = rect.right().min(width);
            let y0 = rect.y.saturating_sub(rect.h / 2).max(0);
            let y1 = rect.y.min(height);
            if x1 <= x0 || y1 <= y0 {
                continue;
            }

            let mut motion_pixels = 0usize;
            for y in y0..y1 {
                for x in x0..x1 {
                    let current = gray.get_pixel(x as u32, y as u32).0[0];
                    let previous = prev.get_pixel(x as u32, y as u32).0[0];
                    if current.abs_diff(previous) > self.config.boilover_motion_threshold {
                        motion_pixels += 1;
                    }
                }
            }

            let roi = image::imageops::crop_imm(gray, x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
                .to_image();
            let edge_pixels = edges::edge_pixel_count(
                &roi,
                self.config.boilover_edge_threshold,
                self.config.boilover_edge_high_threshold,
            );

            trace!(zone = %zone.name, motion_pixels, edge_pixels, "boil-over strip measured");
            if motion_pixels > self.config.boilover_min_area || edge_pixels > self.config.boilover_min_area {
                flagged.push(zone.name.clone());
            }
        }
        flagged
    }

    /// Every (flammable object, zone) pair closer than `proximity_distance_px`.
    pub fn proximity_hazards(&self, detections: &[Detection], zones: &[Zone]) -> Vec<ProximityHazard> {
        let mut hazards = Vec::new();
        for detection in detections
            .iter()
            .filter(|d| self.config.flammable_objects.iter().any(|c| *c == d.class_name))
        {
            let (ox, oy) = detection.bbox.center();
            for zone in zones {
                let (zx, zy) = zone.rect().center();
                let distance = (ox as f64 - zx as f64).hypot(oy as f64 - zy as f64);
                if distance < self.config.proximity_distance_px {
                    hazards.push(ProximityHazard {
                        object_class: detection.class_name.clone(),
                        zone_name: zone.name.clone(),
                        distance,
                    });
                }
            }
        }
        hazards
    }
}

/// A zone has a flame iff some flame rectangle overlaps it with non-zero area.
pub fn zone_flame_overlap(flame_rects: &[Rect], zones: &[Zone]) -> HashMap<String, bool> {
    zones
        .iter()
        .map(|zone| {
            let rect = zone.rect();
            (zone.name.clone(), flame_rects.iter().any(|flame| flame.intersects(&rect)))
        })
        .collect()
}
