// THEORY:
// A scenario is a recorded (or hand-written) session: the zones, a default frame
// size, and a list of ticks. Each tick carries its own timestamp, the detections
// the classifier produced for it, and optionally the path of the frame image.
// Frame paths are resolved relative to the scenario file, so a scenario directory
// can be moved around as a unit.

use std::path::{Path, PathBuf};

use anyhow::Context;
use safeflame::{Detection, Frame, Seconds, Zone};
use serde::Deserialize;

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default = "default_width")]
    pub frame_width: u32,
    #[serde(default = "default_height")]
    pub frame_height: u32,
    pub ticks: Vec<ScenarioTick>,
    /// Directory frame paths are relative to. Set by `load`.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioTick {
    pub timestamp: Seconds,
    #[serde(default)]
    pub frame: Option<PathBuf>,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl Scenario {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let scenario: Scenario = serde_json::from_str(json).context("invalid scenario")?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading scenario {}", path.display()))?;
        let mut scenario = Self::from_json_str(&text)?;
        scenario.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(scenario)
    }

    /// The frame for `tick`: its image if one is given, otherwise a blank frame of the
    /// scenario's default size.
    pub fn frame_for(&self, tick: &ScenarioTick) -> anyhow::Result<Frame> {
        match &tick.frame {
            Some(relative) => {
                let path = self.base_dir.join(relative);
                let image = image::open(&path).with_context(|| format!("loading frame {}", path.display()))?;
                Ok(Frame::from(image))
            }
            None => Ok(Frame::blank(self.frame_width, self.frame_height)),
        }
    }
}
