// THEORY:
// All thresholds, timers and feature toggles the engine reads live in one typed
// value, `EngineConfig`, handed to the engine at construction. Nothing in the
// engine reads ambient or global state. Runtime changes (from the dashboard's
// control surface) go through `EngineConfig::update`, which only accepts known
// keys, checks the value's type, re-validates the whole document and commits the
// change atomically.

use crate::core_modules::pixel::pixel::Hsv;
use crate::error::ConfigError;
use crate::types::Seconds;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest accepted morphology kernel side.
pub const MAX_KERNEL_SIZE: u32 = 31;
/// Largest accepted smoke grid cell, in pixels.
pub const MAX_SMOKE_BUCKET_SIZE: u32 = 4096;

/// An inclusive color band in 8-bit HSV (hue in half-degrees).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvBand {
    pub h_min: u8,
    pub h_max: u8,
    pub s_min: u8,
    pub s_max: u8,
    pub v_min: u8,
    pub v_max: u8,
}

impl HsvBand {
    pub fn contains(&self, hsv: Hsv) -> bool {
        (self.h_min..=self.h_max).contains(&hsv.hue)
            && (self.s_min..=self.s_max).contains(&hsv.saturation)
            && (self.v_min..=self.v_max).contains(&hsv.value)
    }

    fn is_ordered(&self) -> bool {
        self.h_min <= self.h_max && self.s_min <= self.s_max && self.v_min <= self.v_max
    }
}

/// Thresholds for the pixel-level signal extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub flame_band: HsvBand,
    /// Side of the square structuring element used to open the flame mask.
    pub flame_kernel_size: u32,
    /// Minimum region area in pixels for a flame region to count.
    pub flame_min_area: usize,

    pub smoke_band: HsvBand,
    pub smoke_kernel_size: u32,
    pub smoke_min_area: usize,
    pub smoke_detection_enabled: bool,
    /// How long a smoke bucket must be continuously observed before it is confirmed.
    pub smoke_persistence_seconds: Seconds,
    /// Cell size of the coarse grid smoke regions are bucketed into.
    pub smoke_bucket_size: u32,

    pub boilover_detection_enabled: bool,
    /// Lower hysteresis threshold of the edge detector.
    pub boilover_edge_threshold: f32,
    /// Upper hysteresis threshold of the edge detector.
    pub boilover_edge_high_threshold: f32,
    /// Per-pixel absolute difference a pixel must exceed to count as motion.
    pub boilover_motion_threshold: u8,
    /// Motion or edge pixel count a zone must exceed to be flagged.
    pub boilover_min_area: usize,

    /// Center-to-center distance below which a flammable object is a hazard.
    pub proximity_distance_px: f64,
    pub flammable_objects: Vec<String>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            flame_band: HsvBand {
                h_min: 0,
                h_max: 40,
                s_min: 100,
                s_max: 255,
                v_min: 200,
                v_max: 255,
            },
            flame_kernel_size: 5,
            flame_min_area: 500,
            smoke_band: HsvBand {
                h_min: 0,
                h_max: 30,
                s_min: 0,
                s_max: 60,
                v_min: 150,
                v_max: 230,
            },
            smoke_kernel_size: 7,
            smoke_min_area: 2000,
            smoke_detection_enabled: true,
            smoke_persistence_seconds: 3.0,
            smoke_bucket_size: 50,
            boilover_detection_enabled: true,
            boilover_edge_threshold: 80.0,
            boilover_edge_high_threshold: 200.0,
            boilover_motion_threshold: 30,
            boilover_min_area: 1000,
            proximity_distance_px: 150.0,
            flammable_objects: [
                "bottle", "cup", "cell phone", "book", "paper", "backpack", "handbag", "tie", "umbrella",
                "suitcase", "wine glass", "teddy bear", "laptop", "remote", "keyboard", "mouse",
                "hair drier", "scissors", "potted plant", "vase",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Timers and overrides for the per-zone hazard tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub unattended_info_seconds: Seconds,
    pub unattended_warning_seconds: Seconds,
    pub unattended_critical_seconds: Seconds,
    /// Minimum spacing between two alerts with the same hazard kind and zone.
    pub alert_cooldown_seconds: Seconds,
    /// Shorter spacing used for repeated CRITICAL unattended alerts.
    pub critical_repeat_seconds: Seconds,
    /// Treat every zone as flame-on regardless of the extractor's verdict.
    pub assume_burners_active: bool,
    /// Detection class that counts as a person in the monitored area.
    pub person_class: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            unattended_info_seconds: 60.0,
            unattended_warning_seconds: 180.0,
            unattended_critical_seconds: 300.0,
            alert_cooldown_seconds: 30.0,
            critical_repeat_seconds: 15.0,
            assume_burners_active: false,
            person_class: "person".to_string(),
        }
    }
}

/// The complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub signals: SignalConfig,
    pub tracker: TrackerConfig,
}

/// A value supplied to `EngineConfig::update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl EngineConfig {
    /// Short escalation timers for demonstrations: burners are assumed active and the
    /// noisier smoke and boil-over heuristics are switched off.
    pub fn demo() -> Self {
        let mut config = Self::default();
        config.tracker.unattended_info_seconds = 10.0;
        config.tracker.unattended_warning_seconds = 30.0;
        config.tracker.unattended_critical_seconds = 60.0;
        config.tracker.alert_cooldown_seconds = 10.0;
        config.tracker.assume_burners_active = true;
        config.signals.smoke_persistence_seconds = 1.5;
        config.signals.smoke_detection_enabled = false;
        config.signals.boilover_detection_enabled = false;
        config
    }

    /// Parses a (possibly partial) JSON document over the defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tracker;
        let durations = [
            ("unattended_info_seconds", t.unattended_info_seconds),
            ("unattended_warning_seconds", t.unattended_warning_seconds),
            ("unattended_critical_seconds", t.unattended_critical_seconds),
            ("alert_cooldown_seconds", t.alert_cooldown_seconds),
            ("critical_repeat_seconds", t.critical_repeat_seconds),
            ("smoke_persistence_seconds", self.signals.smoke_persistence_seconds),
        ];
        for (key, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("{key} must be a non-negative number of seconds")));
            }
        }
        if !(t.unattended_info_seconds <= t.unattended_warning_seconds
            && t.unattended_warning_seconds <= t.unattended_critical_seconds)
        {
            return Err(ConfigError::Invalid(
                "unattended thresholds must satisfy info <= warning <= critical".to_string(),
            ));
        }

        let s = &self.signals;
        if !s.flame_band.is_ordered() || !s.smoke_band.is_ordered() {
            return Err(ConfigError::Invalid("HSV band minimums must not exceed maximums".to_string()));
        }
        for (key, size) in [("flame_kernel_size", s.flame_kernel_size), ("smoke_kernel_size", s.smoke_kernel_size)] {
            if !(1..=MAX_KERNEL_SIZE).contains(&size) {
                return Err(ConfigError::Invalid(format!("{key} must be in 1..={MAX_KERNEL_SIZE}")));
            }
        }
        if !(1..=MAX_SMOKE_BUCKET_SIZE).contains(&s.smoke_bucket_size) {
            return Err(ConfigError::Invalid(format!("smoke_bucket_size must be in 1..={MAX_SMOKE_BUCKET_SIZE}")));
        }
        if s.boilover_edge_threshold > s.boilover_edge_high_threshold {
            return Err(ConfigError::Invalid(
                "boilover_edge_threshold must not exceed boilover_edge_high_threshold".to_string(),
            ));
        }
        if !s.proximity_distance_px.is_finite() || s.proximity_distance_px < 0.0 {
            return Err(ConfigError::Invalid("proximity_distance_px must be non-negative".to_string()));
        }
        Ok(())
    }

    /// Applies a single named update. Unknown keys and mistyped values are rejected,
    /// and the result must still validate; on any error `self` is left untouched.
    pub fn update(&mut self, key: &str, value: &ConfigValue) -> Result<(), ConfigError> {
        let mut next = self.clone();
        {
            let s = &mut next.signals;
            let t = &mut next.tracker;
            match key {
                "flame_h_min" => s.flame_band.h_min = byte(key, value)?,
                "flame_h_max" => s.flame_band.h_max = byte(key, value)?,
                "flame_s_min" => s.flame_band.s_min = byte(key, value)?,
                "flame_s_max" => s.flame_band.s_max = byte(key, value)?,
                "flame_v_min" => s.flame_band.v_min = byte(key, value)?,
                "flame_v_max" => s.flame_band.v_max = byte(key, value)?,
                "flame_kernel_size" => s.flame_kernel_size = count(key, value)? as u32,
                "flame_min_area" => s.flame_min_area = count(key, value)?,
                "smoke_h_min" => s.smoke_band.h_min = byte(key, value)?,
                "smoke_h_max" => s.smoke_band.h_max = byte(key, value)?,
                "smoke_s_min" => s.smoke_band.s_min = byte(key, value)?,
                "smoke_s_max" => s.smoke_band.s_max = byte(key, value)?,
                "smoke_v_min" => s.smoke_band.v_min = byte(key, value)?,
                "smoke_v_max" => s.smoke_band.v_max = byte(key, value)?,
                "smoke_kernel_size" => s.smoke_kernel_size = count(key, value)? as u32,
                "smoke_min_area" => s.smoke_min_area = count(key, value)?,
                "smoke_detection_enabled" => s.smoke_detection_enabled = flag(key, value)?,
                "smoke_persistence_seconds" => s.smoke_persistence_seconds = number(key, value)?,
                "smoke_bucket_size" => s.smoke_bucket_size = count(key, value)? as u32,
                "boilover_detection_enabled" => s.boilover_detection_enabled = flag(key, value)?,
                "boilover_edge_threshold" => s.boilover_edge_threshold = number(key, value)? as f32,
                "boilover_edge_high_threshold" => s.boilover_edge_high_threshold = number(key, value)? as f32,
                "boilover_motion_threshold" => s.boilover_motion_threshold = byte(key, value)?,
                "boilover_min_area" => s.boilover_min_area = count(key, value)?,
                "proximity_distance_px" => s.proximity_distance_px = number(key, value)?,
                "flammable_objects" => s.flammable_objects = list(key, value)?,
                "unattended_info_seconds" => t.unattended_info_seconds = number(key, value)?,
                "unattended_warning_seconds" => t.unattended_warning_seconds = number(key, value)?,
                "unattended_critical_seconds" => t.unattended_critical_seconds = number(key, value)?,
                "alert_cooldown_seconds" => t.alert_cooldown_seconds = number(key, value)?,
                "critical_repeat_seconds" => t.critical_repeat_seconds = number(key, value)?,
                "assume_burners_active" => t.assume_burners_active = flag(key, value)?,
                "person_class" => t.person_class = text(key, value)?,
                _ => return Err(ConfigError::UnknownKey(key.to_string())),
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

fn number(key: &str, value: &ConfigValue) -> Result<f64, ConfigError> {
    match value {
        ConfigValue::Number(n) if n.is_finite() => Ok(*n),
        _ => Err(ConfigError::InvalidValue { key: key.to_string(), expected: "a number" }),
    }
}

fn count(key: &str, value: &ConfigValue) -> Result<usize, ConfigError> {
    match value {
        ConfigValue::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64 => {
            Ok(*n as usize)
        }
        _ => Err(ConfigError::InvalidValue { key: key.to_string(), expected: "a non-negative integer" }),
    }
}

fn byte(key: &str, value: &ConfigValue) -> Result<u8, ConfigError> {
    match count(key, value) {
        Ok(n) if n <= u8::MAX as usize => Ok(n as u8),
        _ => Err(ConfigError::InvalidValue { key: key.to_string(), expected: "an integer in 0..=255" }),
    }
}

fn flag(key: &str, value: &ConfigValue) -> Result<bool, ConfigError> {
    match value {
        ConfigValue::Bool(b) => Ok(*b),
        _ => Err(ConfigError::InvalidValue { key: key.to_string(), expected: "a boolean" }),
    }
}

fn text(key: &str, value: &ConfigValue) -> Result<String, ConfigError> {
    match value {
        ConfigValue::Text(s) if !s.is_empty() => Ok(s.clone()),
        _ => Err(ConfigError::InvalidValue { key: key.to_string(), expected: "a non-empty string" }),
    }
}

fn list(key: &str, value: &ConfigValue) -> Result<Vec<String>, ConfigError> {
    match value {
        ConfigValue::List(items) => Ok(items.clone()),
        _ => Err(ConfigError::InvalidValue { key: key.to_string(), expected: "a list of strings" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().expect("defaults are valid");
        EngineConfig::demo().validate().expect("demo preset is valid");
    }

    #[test]
    fn update_rejects_unknown_keys() {
        let mut config = EngineConfig::default();
        let err = config.update("VIDEO_PATH", &ConfigValue::Text("x.mp4".into())).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(key) if key == "VIDEO_PATH"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn update_rejects_wrong_types() {
        let mut config = EngineConfig::default();
        let err = config.update("assume_burners_active", &ConfigValue::Number(1.0)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        let err = config.update("flame_h_max", &ConfigValue::Number(300.0)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn update_is_atomic_when_validation_fails() {
        let mut config = EngineConfig::default();
        // Warning below info breaks the escalation order.
        let err = config.update("unattended_warning_seconds", &ConfigValue::Number(10.0)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert_eq!(config.tracker.unattended_warning_seconds, 180.0);
    }

    #[test]
    fn kernel_and_bucket_sizes_are_bounded() {
        let mut config = EngineConfig::default();
        let err = config.update("flame_kernel_size", &ConfigValue::Number(4294967295.0)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(config.update("smoke_kernel_size", &ConfigValue::Number(32.0)).is_err());
        assert!(config.update("smoke_bucket_size", &ConfigValue::Number(3_000_000_000.0)).is_err());
        assert_eq!(config, EngineConfig::default());

        config.update("flame_kernel_size", &ConfigValue::Number(MAX_KERNEL_SIZE as f64)).unwrap();
        assert_eq!(config.signals.flame_kernel_size, MAX_KERNEL_SIZE);
    }

    #[test]
    fn update_applies_known_keys() {
        let mut config = EngineConfig::default();
        config.update("critical_repeat_seconds", &ConfigValue::Number(5.0)).unwrap();
        config.update("assume_burners_active", &ConfigValue::Bool(true)).unwrap();
        config
            .update("flammable_objects", &ConfigValue::List(vec!["towel".into()]))
            .unwrap();
        assert_eq!(config.tracker.critical_repeat_seconds, 5.0);
        assert!(config.tracker.assume_burners_active);
        assert_eq!(config.signals.flammable_objects, vec!["towel".to_string()]);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = EngineConfig::from_json_str(r#"{"tracker": {"alert_cooldown_seconds": 5}}"#).unwrap();
        assert_eq!(config.tracker.alert_cooldown_seconds, 5.0);
        assert_eq!(config.tracker.unattended_critical_seconds, 300.0);
        assert_eq!(config.signals.flame_min_area, 500);
    }

    #[test]
    fn untagged_values_deserialize_by_shape() {
        let v: ConfigValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, ConfigValue::Bool(true));
        let v: ConfigValue = serde_json::from_str("12").unwrap();
        assert_eq!(v, ConfigValue::Number(12.0));
        let v: ConfigValue = serde_json::from_str(r#"["cup"]"#).unwrap();
        assert_eq!(v, ConfigValue::List(vec!["cup".into()]));
    }
}
