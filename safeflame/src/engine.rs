// THEORY:
// The `engine` module is the top-level API of the hazard engine. It wraps the two
// stages, the stateless-per-frame `SignalExtractor` and the stateful
// `HazardTracker`, behind a single facade that a host drives one tick at a time.
//
// Each tick runs the stages strictly in order:
// 1.  **Signal extraction**: pixels + detections + zones -> `FactBundle`.
// 2.  **Hazard tracking**: facts + detections + zones + time -> alerts.
//
// Everything fallible (frame construction, zone replacement, config updates)
// happens at this boundary before a tick, so `tick` itself cannot fail. A host that
// shares one engine between a capture loop and a control surface wraps it in a
// single lock; the engine is the unit of mutual exclusion.

use crate::config::{ConfigValue, EngineConfig};
use crate::core_modules::frame::Frame;
use crate::error::EngineError;
use crate::hazard::AlertEvent;
use crate::signals::{FactBundle, SignalExtractor};
use crate::tracker::{BurnerState, HazardTracker, KitchenStatus};
use crate::types::{Detection, Seconds, Zone};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// The output of one engine tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub facts: FactBundle,
    /// Alerts that survived their cooldowns, in emission order.
    pub alerts: Vec<AlertEvent>,
}

impl TickReport {
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }
}

pub struct HazardEngine {
    config: EngineConfig,
    extractor: SignalExtractor,
    tracker: HazardTracker,
    zones: Vec<Zone>,
}

impl HazardEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            extractor: SignalExtractor::new(config.signals.clone()),
            tracker: HazardTracker::new(config.tracker.clone()),
            config,
            zones: Vec::new(),
        })
    }

    pub fn with_zones(config: EngineConfig, zones: Vec<Zone>) -> Result<Self, EngineError> {
        let mut engine = Self::new(config)?;
        engine.set_zones(zones)?;
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Replaces the monitored zones. Names must be unique and every zone well formed.
    /// Tracker state and cooldown history of zones that are no longer configured are
    /// discarded.
    pub fn set_zones(&mut self, zones: Vec<Zone>) -> Result<(), EngineError> {
        let mut seen = HashSet::new();
        for zone in &zones {
            if !zone.is_well_formed() {
                return Err(EngineError::InvalidZone(zone.name.clone()));
            }
            if !seen.insert(zone.name.as_str()) {
                return Err(EngineError::DuplicateZone(zone.name.clone()));
            }
        }
        self.tracker.retain_zones(&zones);
        info!(count = zones.len(), "zones replaced");
        self.zones = zones;
        Ok(())
    }

    /// Evaluates one frame.
    pub fn tick(&mut self, frame: &Frame, detections: &[Detection], now: Seconds) -> TickReport {
        // --- 1. Signal extraction ---
        let facts = self.extractor.analyze(frame, detections, &self.zones, now);

        // --- 2. Hazard tracking ---
        let alerts = self.tracker.update(&facts, detections, &self.zones, now);

        if !alerts.is_empty() {
            debug!(count = alerts.len(), at = now, "tick produced alerts");
        }
        TickReport { facts, alerts }
    }

    /// Convenience wrapper over `tick` for hosts holding a raw RGBA buffer.
    pub fn tick_rgba(
        &mut self,
        width: u32,
        height: u32,
        buffer: Vec<u8>,
        detections: &[Detection],
        now: Seconds,
    ) -> Result<TickReport, EngineError> {
        let frame = Frame::from_rgba(width, height, buffer)?;
        Ok(self.tick(&frame, detections, now))
    }

    pub fn status(&self, now: Seconds) -> KitchenStatus {
        self.tracker.status(&self.zones, now)
    }

    pub fn zone_state(&self, name: &str) -> BurnerState {
        self.tracker.zone_state(name)
    }

    /// Manual "turn off" override for a configured zone.
    pub fn force_off(&mut self, zone_name: &str, now: Seconds) -> Result<(), EngineError> {
        if !self.zones.iter().any(|z| z.name == zone_name) {
            return Err(EngineError::UnknownZone(zone_name.to_string()));
        }
        self.tracker.force_off(zone_name, now);
        Ok(())
    }

    /// Applies one named config update and pushes the result into both stages.
    pub fn update_config(&mut self, key: &str, value: &ConfigValue) -> Result<(), EngineError> {
        self.config.update(key, value)?;
        self.apply_config();
        info!(key, ?value, "config updated");
        Ok(())
    }

    /// Replaces the whole configuration after validating it.
    pub fn set_config(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        config.validate()?;
        self.config = config;
        self.apply_config();
        Ok(())
    }

    fn apply_config(&mut self) {
        self.extractor.set_config(self.config.signals.clone());
        self.tracker.set_config(self.config.tracker.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::hazard::{HazardKind, Severity};
    use crate::types::{BoundingBox, Rect};

    const ORANGE: [u8; 4] = [255, 140, 0, 255];

    fn frame_with_flame(rect: Option<Rect>) -> Frame {
        let (width, height) = (200u32, 200u32);
        let mut buffer = vec![0u8; (width * height * 4) as usize];
        for px in buffer.chunks_mut(4) {
            px[3] = 255;
        }
        if let Some(rect) = rect {
            for y in rect.y..rect.bottom() {
                for x in rect.x..rect.right() {
                    let i = ((y as u32 * width + x as u32) * 4) as usize;
                    buffer[i..i + 4].copy_from_slice(&ORANGE);
                }
            }
        }
        Frame::from_rgba(width, height, buffer).unwrap()
    }

    fn quiet_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.signals.smoke_detection_enabled = false;
        config.signals.boilover_detection_enabled = false;
        config
    }

    fn engine() -> HazardEngine {
        HazardEngine::with_zones(quiet_config(), vec![Zone::new("B1", 40, 40, 60, 60)]).unwrap()
    }

    #[test]
    fn rejects_duplicate_zone_names() {
        let mut engine = engine();
        let err = engine
            .set_zones(vec![Zone::new("B1", 0, 0, 10, 10), Zone::new("B1", 20, 0, 10, 10)])
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateZone(name) if name == "B1"));
        assert_eq!(engine.zones().len(), 1);
    }

    #[test]
    fn rejects_zones_that_overflow_or_are_empty() {
        let mut engine = engine();
        let err = engine.set_zones(vec![Zone::new("B1", i32::MAX - 5, 10, 100, 100)]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidZone(name) if name == "B1"));
        assert!(matches!(
            engine.set_zones(vec![Zone::new("B2", 0, 0, 0, 10)]),
            Err(EngineError::InvalidZone(_))
        ));
        assert_eq!(engine.zones()[0].name, "B1");
        assert_eq!(engine.zones()[0].x, 40);
    }

    #[test]
    fn rejects_invalid_initial_config() {
        let mut config = EngineConfig::default();
        config.tracker.unattended_warning_seconds = 10.0;
        assert!(matches!(
            HazardEngine::new(config),
            Err(EngineError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn flame_in_zone_escalates_over_ticks() {
        let mut engine = engine();
        let flame = frame_with_flame(Some(Rect::new(50, 50, 40, 40)));

        let report = engine.tick(&flame, &[], 1000.0);
        assert!(report.facts.flame_present("B1"));
        assert!(!report.has_alerts());
        assert_eq!(engine.zone_state("B1"), BurnerState::ActiveUnattended);

        let report = engine.tick(&flame, &[], 1060.0);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].kind(), HazardKind::Unattended);
        assert_eq!(report.alerts[0].severity, Severity::Info);

        let report = engine.tick(&frame_with_flame(None), &[], 1061.0);
        assert!(!report.has_alerts());
        assert_eq!(engine.zone_state("B1"), BurnerState::Off);
    }

    #[test]
    fn person_in_view_keeps_zone_attended() {
        let mut engine = engine();
        let flame = frame_with_flame(Some(Rect::new(50, 50, 40, 40)));
        let person = vec![Detection::new("person", 0.95, BoundingBox::new(0, 0, 30, 100))];
        for t in 0..400 {
            assert!(!engine.tick(&flame, &person, 1000.0 + t as f64).has_alerts());
        }
        assert_eq!(engine.zone_state("B1"), BurnerState::ActiveAttended);
        assert!(engine.status(1400.0).person_present);
    }

    #[test]
    fn removed_zones_lose_their_history() {
        let mut engine = engine();
        let flame = frame_with_flame(Some(Rect::new(50, 50, 40, 40)));
        engine.tick(&flame, &[], 1000.0);
        engine.set_zones(vec![Zone::new("B2", 0, 0, 20, 20)]).unwrap();
        engine.set_zones(vec![Zone::new("B1", 40, 40, 60, 60)]).unwrap();
        engine.tick(&flame, &[], 1100.0);
        // The clock restarted at 1100 instead of carrying over from 1000.
        assert_eq!(engine.status(1100.0).zones["B1"].unattended_seconds, Some(0.0));
    }

    #[test]
    fn force_off_requires_a_configured_zone() {
        let mut engine = engine();
        assert!(matches!(engine.force_off("B9", 1000.0), Err(EngineError::UnknownZone(_))));
        engine.tick(&frame_with_flame(Some(Rect::new(50, 50, 40, 40))), &[], 1000.0);
        engine.force_off("B1", 1001.0).unwrap();
        assert_eq!(engine.zone_state("B1"), BurnerState::Off);
    }

    #[test]
    fn config_updates_reach_the_tracker() {
        let mut engine = engine();
        engine
            .update_config("unattended_info_seconds", &ConfigValue::Number(5.0))
            .unwrap();
        let flame = frame_with_flame(Some(Rect::new(50, 50, 40, 40)));
        engine.tick(&flame, &[], 1000.0);
        let report = engine.tick(&flame, &[], 1005.0);
        assert_eq!(report.alerts.len(), 1);

        let err = engine.update_config("no_such_key", &ConfigValue::Bool(true)).unwrap_err();
        assert!(matches!(err, EngineError::Config(ConfigError::UnknownKey(_))));
        assert_eq!(engine.config().tracker.unattended_info_seconds, 5.0);
    }

    #[test]
    fn tick_rgba_checks_buffer_size() {
        let mut engine = engine();
        let err = engine.tick_rgba(10, 10, vec![0; 12], &[], 1000.0).unwrap_err();
        assert!(matches!(err, EngineError::FrameSize { expected: 400, actual: 12, .. }));
        assert!(engine.tick_rgba(10, 10, vec![0; 400], &[], 1000.0).is_ok());
    }
}
