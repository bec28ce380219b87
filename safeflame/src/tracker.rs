// THEORY:
// The `tracker` module is the heart of the hazard engine. It adds memory to the
// stateless facts the signal extractor produces: how long each zone has been
// burning with nobody around, whether a person is in view, and when each kind of
// alert last fired for each zone.
//
// Key architectural principles:
// 1.  **Per-zone state machine**: every zone name gets a `ZoneTracker`, created
//     lazily the first time the name is seen. Its `BurnerState` is recomputed from
//     scratch each tick from three inputs only: flame presence, person presence
//     and the elapsed unattended time. Alert history never feeds back into state.
// 2.  **Absence-anchored escalation**: the unattended clock for a zone starts when
//     the person left, not when the burner was first noticed, if they were already
//     gone. Escalation thresholds are checked most severe first.
// 3.  **Cooldown ledger**: every candidate alert passes through `maybe_alert`,
//     keyed on (hazard kind, zone). CRITICAL unattended reminders use a shorter
//     repeat interval than every other alert.
// 4.  **No failure states**: the tracker never returns an error. Unknown zones
//     start OFF, missing facts read as "nothing seen".

use crate::config::TrackerConfig;
use crate::hazard::{AlertEvent, Hazard, HazardKind, Severity, KITCHEN_ZONE};
use crate::signals::FactBundle;
use crate::types::{Detection, Seconds, Zone};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurnerState {
    #[default]
    Off,
    ActiveAttended,
    ActiveUnattended,
    AlertInfo,
    AlertWarning,
    AlertCritical,
}

/// Tracked state for a single zone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneTracker {
    pub state: BurnerState,
    /// When the current unattended run started. `None` unless flame-on and person-absent.
    pub unattended_since: Option<Seconds>,
    /// Time of the last manual "turn off" override. The next unattended run of this
    /// zone cannot start before it.
    pub manual_off_at: Option<Seconds>,
}

impl ZoneTracker {
    fn reset(&mut self, state: BurnerState) {
        self.state = state;
        self.unattended_since = None;
        self.manual_off_at = None;
    }
}

/// Process-wide person presence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceState {
    pub person_present: bool,
    pub person_absent_since: Option<Seconds>,
}

impl PresenceState {
    fn update(&mut self, person_detected: bool, now: Seconds) {
        if person_detected {
            if !self.person_present {
                debug!("person entered the monitored area");
            }
            self.person_present = true;
            self.person_absent_since = None;
        } else {
            if self.person_present {
                debug!(at = now, "person left the monitored area");
                self.person_absent_since = Some(now);
            }
            self.person_present = false;
        }
    }
}

/// Last firing time per (hazard kind, zone).
#[derive(Debug, Clone, Default)]
pub struct CooldownLedger {
    last_fired: HashMap<(HazardKind, String), Seconds>,
}

impl CooldownLedger {
    /// Records `now` and returns true iff at least `cooldown` seconds have passed since
    /// the last firing of this key. A clock that moved backward suppresses the alert.
    pub fn try_fire(&mut self, kind: HazardKind, zone: &str, now: Seconds, cooldown: Seconds) -> bool {
        let key = (kind, zone.to_string());
        if let Some(last) = self.last_fired.get(&key) {
            if now - *last < cooldown {
                return false;
            }
        }
        self.last_fired.insert(key, now);
        true
    }

    pub fn last_fired(&self, kind: HazardKind, zone: &str) -> Option<Seconds> {
        self.last_fired.get(&(kind, zone.to_string())).copied()
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }

    /// Drops zone-scoped entries for zones not in `keep`. Kitchen-wide entries always stay.
    fn retain_zones(&mut self, keep: &HashSet<&str>) {
        self.last_fired
            .retain(|(_, zone), _| zone == KITCHEN_ZONE || keep.contains(zone.as_str()));
    }
}

/// Dashboard view of one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatus {
    pub state: BurnerState,
    pub unattended_seconds: Option<Seconds>,
}

/// Dashboard view of the whole kitchen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitchenStatus {
    pub person_present: bool,
    pub person_absent_seconds: Option<Seconds>,
    pub zones: BTreeMap<String, ZoneStatus>,
}

pub struct HazardTracker {
    config: TrackerConfig,
    zones: HashMap<String, ZoneTracker>,
    presence: PresenceState,
    ledger: CooldownLedger,
}

impl HazardTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            zones: HashMap::new(),
            presence: PresenceState::default(),
            ledger: CooldownLedger::default(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TrackerConfig) {
        self.config = config;
    }

    pub fn presence(&self) -> &PresenceState {
        &self.presence
    }

    pub fn zone(&self, name: &str) -> Option<&ZoneTracker> {
        self.zones.get(name)
    }

    pub fn zone_state(&self, name: &str) -> BurnerState {
        self.zones.get(name).map(|z| z.state).unwrap_or_default()
    }

    pub fn ledger(&self) -> &CooldownLedger {
        &self.ledger
    }

    /// Evaluates one tick and returns the alerts that survived their cooldowns,
    /// in emission order: unattended (zone order), proximity, boil-over, smoke, flame.
    pub fn update(&mut self, facts: &FactBundle, detections: &[Detection], zones: &[Zone], now: Seconds) -> Vec<AlertEvent> {
        let mut alerts = Vec::new();

        // --- 1. Global presence ---
        let person_detected = detections.iter().any(|d| d.class_name == self.config.person_class);
        self.presence.update(person_detected, now);

        // --- 2. Per-zone escalation ---
        for zone in zones {
            let flame_on = self.config.assume_burners_active || facts.flame_present(&zone.name);
            if let Some(alert) = self.evaluate_zone(&zone.name, flame_on, now) {
                alerts.push(alert);
            }
        }

        // --- 3. Cross-zone hazards ---
        for hazard in &facts.proximity_hazards {
            let candidate = Hazard::Proximity {
                object: hazard.object_class.clone(),
                zone: hazard.zone_name.clone(),
                distance: hazard.distance,
            };
            alerts.extend(self.maybe_alert(candidate, Severity::Warning, now, None));
        }
        for zone_name in &facts.boilover_zone_names {
            let candidate = Hazard::Boilover { zone: zone_name.clone() };
            alerts.extend(self.maybe_alert(candidate, Severity::Warning, now, None));
        }
        if !facts.smoke_rects.is_empty() {
            alerts.extend(self.maybe_alert(Hazard::Smoke, Severity::Critical, now, None));
        }
        if !facts.flame_rects.is_empty() && zones.is_empty() {
            alerts.extend(self.maybe_alert(Hazard::Flame, Severity::Warning, now, None));
        }

        alerts
    }

    fn evaluate_zone(&mut self, name: &str, flame_on: bool, now: Seconds) -> Option<AlertEvent> {
        let person_present = self.presence.person_present;
        let absent_since = self.presence.person_absent_since;
        let config = &self.config;
        let tracker = self.zones.entry(name.to_string()).or_default();
        let previous = tracker.state;

        if !flame_on {
            tracker.reset(BurnerState::Off);
        } else if person_present {
            tracker.reset(BurnerState::ActiveAttended);
        } else {
            let manual_off_at = tracker.manual_off_at;
            let since = *tracker.unattended_since.get_or_insert_with(|| {
                let seed = absent_since.map_or(now, |absent| absent.min(now));
                seed_after_override(seed, manual_off_at)
            });
            let elapsed = (now - since).max(0.0);

            let (state, escalation) = if elapsed >= config.unattended_critical_seconds {
                (BurnerState::AlertCritical, Some((Severity::Critical, config.critical_repeat_seconds)))
            } else if elapsed >= config.unattended_warning_seconds {
                (BurnerState::AlertWarning, Some((Severity::Warning, config.alert_cooldown_seconds)))
            } else if elapsed >= config.unattended_info_seconds {
                (BurnerState::AlertInfo, Some((Severity::Info, config.alert_cooldown_seconds)))
            } else {
                (BurnerState::ActiveUnattended, None)
            };
            tracker.state = state;

            if previous != state {
                debug!(zone = name, ?previous, ?state, elapsed, "zone state changed");
            }
            let (severity, cooldown) = escalation?;
            let hazard = Hazard::Unattended { zone: name.to_string(), elapsed };
            return self.maybe_alert(hazard, severity, now, Some(cooldown));
        }

        if previous != tracker.state {
            debug!(zone = name, ?previous, state = ?tracker.state, "zone state changed");
        }
        None
    }

    /// Emits an alert for `hazard` unless the same (kind, zone) fired within the
    /// cooldown. `cooldown` overrides the configured default.
    pub fn maybe_alert(
        &mut self,
        hazard: Hazard,
        severity: Severity,
        now: Seconds,
        cooldown: Option<Seconds>,
    ) -> Option<AlertEvent> {
        let cooldown = cooldown.unwrap_or(self.config.alert_cooldown_seconds);
        let kind = hazard.kind();
        if !self.ledger.try_fire(kind, hazard.zone_name(), now, cooldown) {
            trace!(kind = %kind, zone = hazard.zone_name(), "alert suppressed by cooldown");
            return None;
        }
        let alert = AlertEvent::new(hazard, severity, now);
        info!(kind = %kind, zone = %alert.zone_name, severity = %severity, "{}", alert.message);
        Some(alert)
    }

    /// Manual "turn off" override: the zone drops to OFF and its unattended clock is
    /// cleared. A later unattended run cannot be anchored before `now`.
    pub fn force_off(&mut self, name: &str, now: Seconds) {
        let tracker = self.zones.entry(name.to_string()).or_default();
        tracker.state = BurnerState::Off;
        tracker.unattended_since = None;
        tracker.manual_off_at = Some(now);
        info!(zone = name, "zone manually turned off");
    }

    /// Drops tracker and cooldown entries for zones not in `active`. Cooldowns of
    /// kitchen-wide hazards (smoke, flame) are kept.
    pub fn retain_zones(&mut self, active: &[Zone]) {
        let keep: HashSet<&str> = active.iter().map(|z| z.name.as_str()).collect();
        self.zones.retain(|name, _| keep.contains(name.as_str()));
        self.ledger.retain_zones(&keep);
    }

    /// Read-only snapshot for the given zones. Zones never evaluated report OFF.
    pub fn status(&self, zones: &[Zone], now: Seconds) -> KitchenStatus {
        let zones = zones
            .iter()
            .map(|zone| {
                let tracker = self.zones.get(&zone.name);
                let status = ZoneStatus {
                    state: tracker.map(|t| t.state).unwrap_or_default(),
                    unattended_seconds: tracker.and_then(|t| t.unattended_since).map(|since| (now - since).max(0.0)),
                };
                (zone.name.clone(), status)
            })
            .collect();

        KitchenStatus {
            person_present: self.presence.person_present,
            person_absent_seconds: self.presence.person_absent_since.map(|since| (now - since).max(0.0)),
            zones,
        }
    }
}

fn seed_after_override(seed: Seconds, manual_off_at: Option<Seconds>) -> Seconds {
    manual_off_at.map_or(seed, |off| seed.max(off))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::ProximityHazard;
    use crate::types::{BoundingBox, Rect};

    fn zone() -> Vec<Zone> {
        vec![Zone::new("B1", 0, 0, 100, 100)]
    }

    fn flame_on() -> FactBundle {
        let mut facts = FactBundle::default();
        facts.zone_flame_present.insert("B1".into(), true);
        facts
    }

    fn person() -> Vec<Detection> {
        vec![Detection::new("person", 0.9, BoundingBox::new(0, 0, 1, 1))]
    }

    fn tracker() -> HazardTracker {
        HazardTracker::new(TrackerConfig::default())
    }

    #[test]
    fn presence_transitions_record_absence_start() {
        let mut t = tracker();
        t.update(&FactBundle::default(), &person(), &[], 1000.0);
        assert!(t.presence().person_present);
        t.update(&FactBundle::default(), &[], &[], 1010.0);
        assert!(!t.presence().person_present);
        assert_eq!(t.presence().person_absent_since, Some(1010.0));
        // Staying absent keeps the original timestamp.
        t.update(&FactBundle::default(), &[], &[], 1020.0);
        assert_eq!(t.presence().person_absent_since, Some(1010.0));
        t.update(&FactBundle::default(), &person(), &[], 1030.0);
        assert_eq!(t.presence().person_absent_since, None);
    }

    #[test]
    fn unchanged_input_below_threshold_is_silent() {
        let mut t = tracker();
        for i in 0..50 {
            let alerts = t.update(&flame_on(), &[], &zone(), 1000.0 + i as f64);
            assert!(alerts.is_empty());
        }
        assert_eq!(t.zone_state("B1"), BurnerState::ActiveUnattended);
    }

    #[test]
    fn escalation_follows_thresholds() {
        let mut t = tracker();
        let zones = zone();
        assert!(t.update(&flame_on(), &[], &zones, 1000.0).is_empty());
        assert!(t.update(&flame_on(), &[], &zones, 1059.0).is_empty());

        let alerts = t.update(&flame_on(), &[], &zones, 1060.0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(t.zone_state("B1"), BurnerState::AlertInfo);
        // Inside the 30s cooldown.
        assert!(t.update(&flame_on(), &[], &zones, 1080.0).is_empty());
        assert_eq!(t.update(&flame_on(), &[], &zones, 1090.0).len(), 1);

        let alerts = t.update(&flame_on(), &[], &zones, 1180.0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert_eq!(t.zone_state("B1"), BurnerState::AlertWarning);

        let alerts = t.update(&flame_on(), &[], &zones, 1300.0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert!(t.update(&flame_on(), &[], &zones, 1314.0).is_empty());
        assert_eq!(t.update(&flame_on(), &[], &zones, 1315.0).len(), 1);
    }

    #[test]
    fn de_escalates_on_person_or_flame_off() {
        let mut t = tracker();
        let zones = zone();
        t.update(&flame_on(), &[], &zones, 1000.0);
        t.update(&flame_on(), &[], &zones, 1200.0);
        assert_eq!(t.zone_state("B1"), BurnerState::AlertWarning);

        t.update(&flame_on(), &person(), &zones, 1201.0);
        assert_eq!(t.zone_state("B1"), BurnerState::ActiveAttended);
        assert_eq!(t.zone("B1").unwrap().unattended_since, None);

        t.update(&flame_on(), &[], &zones, 1202.0);
        t.update(&flame_on(), &[], &zones, 1400.0);
        assert_eq!(t.zone_state("B1"), BurnerState::AlertWarning);
        t.update(&FactBundle::default(), &[], &zones, 1401.0);
        assert_eq!(t.zone_state("B1"), BurnerState::Off);
        assert_eq!(t.zone("B1").unwrap().unattended_since, None);
    }

    #[test]
    fn scenario_person_leaves_then_critical_repeats() {
        let mut t = tracker();
        let zones = zone();

        assert!(t.update(&flame_on(), &person(), &zones, 1000.0).is_empty());
        assert_eq!(t.zone_state("B1"), BurnerState::ActiveAttended);

        assert!(t.update(&flame_on(), &[], &zones, 1010.0).is_empty());
        assert_eq!(t.zone_state("B1"), BurnerState::ActiveUnattended);

        let alerts = t.update(&flame_on(), &[], &zones, 1311.0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind(), HazardKind::Unattended);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(t.zone_state("B1"), BurnerState::AlertCritical);

        let alerts = t.update(&flame_on(), &[], &zones, 1327.0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
    }

    #[test]
    fn unattended_clock_starts_when_the_person_left() {
        let mut t = tracker();
        let zones = zone();
        t.update(&FactBundle::default(), &person(), &zones, 1000.0);
        t.update(&FactBundle::default(), &[], &zones, 1010.0);
        // The burner is only noticed 100s later; the clock is anchored at 1010.
        let alerts = t.update(&flame_on(), &[], &zones, 1110.0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(t.zone("B1").unwrap().unattended_since, Some(1010.0));
    }

    #[test]
    fn cooldown_suppresses_repeats_per_zone() {
        let mut t = tracker();
        let fire = |t: &mut HazardTracker, now: f64| {
            let hazard = Hazard::Proximity { object: "bottle".into(), zone: "B1".into(), distance: 10.0 };
            t.maybe_alert(hazard, Severity::Warning, now, Some(30.0))
        };
        assert!(fire(&mut t, 1000.0).is_some());
        assert!(fire(&mut t, 1010.0).is_none());
        assert!(fire(&mut t, 1031.0).is_some());
        // A different zone has its own ledger entry.
        let other = Hazard::Proximity { object: "bottle".into(), zone: "B2".into(), distance: 10.0 };
        assert!(t.maybe_alert(other, Severity::Warning, 1032.0, None).is_some());
    }

    #[test]
    fn global_hazards_fire_once_per_cooldown() {
        let mut t = tracker();
        let mut facts = FactBundle::default();
        facts.smoke_rects.push(Rect::new(100, 100, 50, 50));
        facts.boilover_zone_names.push("B1".into());
        facts.proximity_hazards.push(ProximityHazard {
            object_class: "cup".into(),
            zone_name: "B1".into(),
            distance: 80.0,
        });

        let alerts = t.update(&facts, &[], &zone(), 1000.0);
        let kinds: Vec<HazardKind> = alerts.iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec![HazardKind::Proximity, HazardKind::Boilover, HazardKind::Smoke]);
        assert_eq!(alerts[2].severity, Severity::Critical);
        assert_eq!(alerts[2].zone_name, KITCHEN_ZONE);

        assert!(t.update(&facts, &[], &zone(), 1005.0).is_empty());
    }

    #[test]
    fn flame_without_zones_warns_only_when_unconfigured() {
        let mut t = tracker();
        let mut facts = FactBundle::default();
        facts.flame_rects.push(Rect::new(100, 100, 50, 50));

        let alerts = t.update(&facts, &[], &[], 1000.0);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind(), HazardKind::Flame);
        assert_eq!(alerts[0].severity, Severity::Warning);

        let mut t = tracker();
        assert!(t.update(&facts, &[], &zone(), 1000.0).is_empty());
    }

    #[test]
    fn assume_active_escalates_without_flame() {
        let mut config = TrackerConfig::default();
        config.assume_burners_active = true;
        let mut t = HazardTracker::new(config);
        let zones = zone();
        t.update(&FactBundle::default(), &person(), &zones, 1000.0);
        assert_eq!(t.zone_state("B1"), BurnerState::ActiveAttended);
        t.update(&FactBundle::default(), &[], &zones, 1010.0);
        assert_eq!(t.zone_state("B1"), BurnerState::ActiveUnattended);
    }

    #[test]
    fn manual_off_restarts_the_clock_even_when_assumed_active() {
        let mut config = TrackerConfig::default();
        config.assume_burners_active = true;
        let mut t = HazardTracker::new(config);
        let zones = zone();
        t.update(&FactBundle::default(), &person(), &zones, 1000.0);
        t.update(&FactBundle::default(), &[], &zones, 1010.0);
        t.update(&FactBundle::default(), &[], &zones, 1200.0);
        assert_eq!(t.zone_state("B1"), BurnerState::AlertWarning);

        t.force_off("B1", 1201.0);
        assert_eq!(t.zone_state("B1"), BurnerState::Off);
        assert_eq!(t.zone("B1").unwrap().unattended_since, None);

        // Still assumed active and still nobody home, but the clock restarts at 1201.
        assert!(t.update(&FactBundle::default(), &[], &zones, 1202.0).is_empty());
        assert_eq!(t.zone_state("B1"), BurnerState::ActiveUnattended);
        assert_eq!(t.zone("B1").unwrap().unattended_since, Some(1201.0));
    }

    #[test]
    fn backward_clock_never_yields_negative_elapsed() {
        let mut t = tracker();
        let zones = zone();
        t.update(&flame_on(), &[], &zones, 1000.0);
        assert!(t.update(&flame_on(), &[], &zones, 990.0).is_empty());
        let status = t.status(&zones, 990.0);
        assert_eq!(status.zones["B1"].unattended_seconds, Some(0.0));
    }

    #[test]
    fn status_reports_zone_states_and_absence() {
        let mut t = tracker();
        let zones = zone();
        t.update(&flame_on(), &person(), &zones, 1000.0);
        let status = t.status(&zones, 1005.0);
        assert!(status.person_present);
        assert_eq!(status.zones["B1"].state, BurnerState::ActiveAttended);
        assert_eq!(status.zones["B1"].unattended_seconds, None);

        t.update(&flame_on(), &[], &zones, 1010.0);
        let status = t.status(&zones, 1025.0);
        assert_eq!(status.person_absent_seconds, Some(15.0));
        assert_eq!(status.zones["B1"].unattended_seconds, Some(15.0));

        let unseen = vec![Zone::new("B9", 0, 0, 1, 1)];
        assert_eq!(t.status(&unseen, 1025.0).zones["B9"].state, BurnerState::Off);
        assert!(t.status(&[], 1025.0).zones.is_empty());
    }

    #[test]
    fn retain_zones_forgets_removed_entries() {
        let mut t = tracker();
        let mut facts = flame_on();
        facts.boilover_zone_names.push("B2".into());
        let zones = vec![Zone::new("B1", 0, 0, 100, 100), Zone::new("B2", 200, 0, 100, 100)];
        t.update(&facts, &[], &zones, 1000.0);
        assert!(t.zone("B2").is_some());
        assert!(t.ledger().last_fired(HazardKind::Boilover, "B2").is_some());

        t.retain_zones(&zones[..1]);
        assert!(t.zone("B2").is_none());
        assert!(t.ledger().last_fired(HazardKind::Boilover, "B2").is_none());
        assert!(t.zone("B1").is_some());
    }

    #[test]
    fn zone_changes_keep_kitchen_wide_cooldowns() {
        let mut t = tracker();
        let mut facts = FactBundle::default();
        facts.smoke_rects.push(Rect::new(100, 100, 50, 50));
        let zones = vec![Zone::new("B1", 0, 0, 100, 100), Zone::new("B2", 200, 0, 100, 100)];

        assert_eq!(t.update(&facts, &[], &zones, 1000.0).len(), 1);
        t.retain_zones(&zones);
        assert_eq!(t.ledger().last_fired(HazardKind::Smoke, KITCHEN_ZONE), Some(1000.0));
        assert!(t.update(&facts, &[], &zones, 1001.0).is_empty());

        t.retain_zones(&[]);
        assert!(t.update(&facts, &[], &zones, 1002.0).is_empty());
    }
}
