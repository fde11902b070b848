use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::aggregator::{ClassEntry, ClassTable};
use crate::crossing::{CountingLine, LineKind, MIN_PATH_LENGTH};
use crate::detector::DetectorConfig;
use crate::error::Error;
use crate::tracker::TrackerConfig;
use crate::worker::WorkerConfig;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LineConfig {
    pub kind: LineKind,
    /// Manual endpoints; both are needed for a manual line
    pub p1: Option<(f32, f32)>,
    pub p2: Option<(f32, f32)>,
    pub detection_threshold: f32,
    pub min_path_length: usize,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            kind: LineKind::Manual,
            p1: None,
            p2: None,
            detection_threshold: CountingLine::DEFAULT_THRESHOLD,
            min_path_length: MIN_PATH_LENGTH,
        }
    }
}

impl LineConfig {
    /// The configured manual line, if both endpoints are present.
    pub fn manual_line(&self) -> Option<CountingLine> {
        match (self.kind, self.p1, self.p2) {
            (LineKind::Manual, Some(p1), Some(p2)) => Some(self.apply(CountingLine::new(p1, p2))),
            _ => None,
        }
    }

    /// Automatic line for a frame of the given size.
    pub fn auto_line(&self, width: u32, height: u32) -> Option<CountingLine> {
        CountingLine::auto(self.kind, width, height).map(|l| self.apply(l))
    }

    #[inline]
    fn apply(&self, line: CountingLine) -> CountingLine {
        line.with_threshold(self.detection_threshold)
            .with_min_path_length(self.min_path_length)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub tracking: TrackerConfig,
    pub line: LineConfig,
    pub classes: Vec<ClassEntry>,
    pub detector: DetectorConfig,
    pub worker: WorkerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracking: TrackerConfig::default(),
            line: LineConfig::default(),
            classes: ClassTable::vehicles().entries().to_vec(),
            detector: DetectorConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let t = &self.tracking;
        t.validate()?;

        let l = &self.line;
        if !(l.detection_threshold >= 0.0) {
            return Err(invalid("line.detection_threshold must not be negative"));
        }
        if l.min_path_length < MIN_PATH_LENGTH {
            return Err(invalid(format!(
                "line.min_path_length must be at least {}",
                MIN_PATH_LENGTH
            )));
        }
        if l.min_path_length > t.path_history_length {
            return Err(invalid(
                "line.min_path_length exceeds tracking.path_history_length, nothing would be counted",
            ));
        }
        if l.kind == LineKind::Manual && l.p1.is_some() != l.p2.is_some() {
            return Err(invalid("line needs both p1 and p2"));
        }
        if let Some(line) = l.manual_line() {
            if line.is_degenerate() {
                warn!(p1 = ?line.p1, p2 = ?line.p2, "counting line has zero length, nothing will be counted");
            }
        }

        if !(self.worker.target_fps >= 0.0) {
            return Err(invalid("worker.target_fps must not be negative"));
        }

        self.class_table().map(|_| ())
    }

    #[inline]
    pub fn class_table(&self) -> Result<ClassTable, Error> {
        ClassTable::new(self.classes.clone())
    }
}

#[inline]
fn invalid<S: Into<String>>(msg: S) -> Error {
    Error::InvalidConfig(msg.into())
}
