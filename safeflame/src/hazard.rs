// THEORY:
// The alert vocabulary of the engine. A `Hazard` is a closed set of variants, each
// carrying the payload that describes it, so every consumer (cooldown keys,
// messages, advice lookup, the dashboard) matches exhaustively instead of
// comparing strings. An `AlertEvent` is the immutable unit handed downstream; the
// engine keeps no reference to it after returning it.

use crate::types::Seconds;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Zone label used for hazards that are not tied to a single zone.
pub const KITCHEN_ZONE: &str = "kitchen";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload-free discriminant of a `Hazard`; half of a cooldown key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    Unattended,
    Proximity,
    Boilover,
    Smoke,
    Flame,
}

impl HazardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardKind::Unattended => "unattended",
            HazardKind::Proximity => "proximity",
            HazardKind::Boilover => "boilover",
            HazardKind::Smoke => "smoke",
            HazardKind::Flame => "flame",
        }
    }
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Hazard {
    /// A zone has been flame-on with nobody present for `elapsed` seconds.
    Unattended { zone: String, elapsed: Seconds },
    /// A flammable object sits `distance` pixels from a zone's center.
    Proximity { object: String, zone: String, distance: f64 },
    /// Motion or edge activity above a zone suggests a pot boiling over.
    Boilover { zone: String },
    /// A persistent smoke region somewhere in view.
    Smoke,
    /// Flame seen while no zones are configured.
    Flame,
}

impl Hazard {
    pub fn kind(&self) -> HazardKind {
        match self {
            Hazard::Unattended { .. } => HazardKind::Unattended,
            Hazard::Proximity { .. } => HazardKind::Proximity,
            Hazard::Boilover { .. } => HazardKind::Boilover,
            Hazard::Smoke => HazardKind::Smoke,
            Hazard::Flame => HazardKind::Flame,
        }
    }

    /// The zone an alert for this hazard is filed under.
    pub fn zone_name(&self) -> &str {
        match self {
            Hazard::Unattended { zone, .. } | Hazard::Proximity { zone, .. } | Hazard::Boilover { zone } => zone,
            Hazard::Smoke | Hazard::Flame => KITCHEN_ZONE,
        }
    }

    /// Operator-facing text for this hazard at the given severity.
    pub fn message(&self, severity: Severity) -> String {
        match (self, severity) {
            (Hazard::Unattended { zone, elapsed }, Severity::Critical) => format!(
                "CRITICAL: {zone} has been unattended for over {}s! Turn off the burner immediately.",
                *elapsed as u64
            ),
            (Hazard::Unattended { zone, elapsed }, Severity::Warning) => format!(
                "Warning: {zone} unattended for {}s. Please check your cooking.",
                *elapsed as u64
            ),
            (Hazard::Unattended { zone, .. }, Severity::Info) => {
                format!("Notice: {zone} is on and no one is in the kitchen.")
            }
            (Hazard::Proximity { object, zone, .. }, _) => {
                format!("Warning: {object} detected near {zone}. Move it away from the heat source.")
            }
            (Hazard::Boilover { zone }, _) => {
                format!("Warning: Potential boil-over detected at {zone}! Reduce heat or remove the pot.")
            }
            (Hazard::Smoke, _) => "CRITICAL: Smoke detected in the kitchen! Check for fire immediately.".to_string(),
            (Hazard::Flame, _) => {
                "Warning: Open flame detected. Define burner zones for better monitoring.".to_string()
            }
        }
    }
}

/// One emitted alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(flatten)]
    pub hazard: Hazard,
    pub severity: Severity,
    pub message: String,
    pub timestamp: Seconds,
    pub zone_name: String,
}

impl AlertEvent {
    pub fn new(hazard: Hazard, severity: Severity, timestamp: Seconds) -> Self {
        Self {
            message: hazard.message(severity),
            zone_name: hazard.zone_name().to_string(),
            hazard,
            severity,
            timestamp,
        }
    }

    pub fn kind(&self) -> HazardKind {
        self.hazard.kind()
    }
}
