use serde_derive::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregator::{Aggregator, ClassTable, CountsSnapshot};
use crate::config::{Config, LineConfig};
use crate::crossing::{CountingLine, CrossingDetector, CrossingEvent};
use crate::error::Error;
use crate::frame::Frame;
use crate::track::Track;
use crate::tracker::{Tracker, TrackerConfig};

/// Outcome of one processed frame.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub events: Vec<CrossingEvent>,
    pub active_tracks: usize,
}

impl FrameReport {
    /// Whether any counter moved this frame.
    #[inline]
    pub fn count_updated(&self) -> bool {
        !self.events.is_empty()
    }
}

/// Tracks and counts taken from the same frame.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CounterSnapshot {
    pub tracks: Vec<Track>,
    pub counts: CountsSnapshot,
}

/// Tracker, crossing detector and aggregator driven as one unit per frame.
#[derive(Debug, Clone)]
pub struct LineCounter {
    tracker: Tracker,
    detector: CrossingDetector,
    aggregator: Aggregator,
    line: Option<CountingLine>,
    line_config: LineConfig,
    /// Set once a line was placed automatically or set by hand; automatic
    /// placement is skipped from then on.
    line_fixed: bool,
}

impl LineCounter {
    pub fn new(tracking: TrackerConfig, classes: ClassTable) -> Self {
        Self {
            tracker: Tracker::new(tracking),
            detector: CrossingDetector::new(classes.clone()),
            aggregator: Aggregator::new(classes),
            line: None,
            line_config: LineConfig::default(),
            line_fixed: false,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        config.validate()?;

        let mut counter = Self::new(config.tracking, config.class_table()?);
        counter.line_config = config.line.clone();
        counter.line = config.line.manual_line();
        counter.line_fixed = counter.line.is_some();

        Ok(counter)
    }

    /// Runs association, crossing check and counting for `frame`.
    pub fn process(&mut self, frame: &Frame) -> FrameReport {
        if !self.line_fixed {
            self.place_auto_line(frame.dims);
        }

        self.tracker.update(&frame.detections, frame.timestamp);

        let events = match &self.line {
            Some(line) => self.detector.check(&mut self.tracker, line),
            None => Vec::new(),
        };

        self.aggregator.apply(&events);

        FrameReport {
            events,
            active_tracks: self.tracker.len(),
        }
    }

    fn place_auto_line(&mut self, (width, height): (u32, u32)) {
        if width == 0 || height == 0 {
            return;
        }

        if let Some(line) = self.line_config.auto_line(width, height) {
            info!(p1 = ?line.p1, p2 = ?line.p2, "counting line placed automatically");
            self.line = Some(line);
            self.line_fixed = true;
        }
    }

    /// Replaces the counting line; takes effect on the next frame.
    pub fn set_line(&mut self, line: CountingLine) {
        if line.is_degenerate() {
            warn!(p1 = ?line.p1, p2 = ?line.p2, "counting line has zero length, nothing will be counted");
        }

        info!(p1 = ?line.p1, p2 = ?line.p2, threshold = line.threshold, "counting line set");
        self.line = Some(line);
        self.line_fixed = true;
    }

    /// Removes the counting line; tracking continues without counting and no
    /// automatic line is placed again.
    pub fn clear_line(&mut self) {
        self.line = None;
        self.line_fixed = true;
        info!("counting line cleared");
    }

    #[inline]
    pub fn line(&self) -> Option<&CountingLine> {
        self.line.as_ref()
    }

    /// Changes the corridor width of the current line and of future automatic ones.
    pub fn set_detection_threshold(&mut self, threshold: f32) -> Result<(), Error> {
        if !(threshold >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "detection threshold must not be negative, got {}",
                threshold
            )));
        }

        self.line_config.detection_threshold = threshold;

        if let Some(line) = &mut self.line {
            line.threshold = threshold;
        }

        Ok(())
    }

    /// Swaps tracker settings; rejected when the path would become too short
    /// for the line's crossing check.
    pub fn set_tracker_config(&mut self, config: TrackerConfig) -> Result<(), Error> {
        config.validate()?;

        let min_path = self
            .line
            .as_ref()
            .map_or(self.line_config.min_path_length, |l| l.min_path_length);
        if min_path > config.path_history_length {
            return Err(Error::InvalidConfig(format!(
                "path_history_length {} is below the line's min_path_length {}",
                config.path_history_length, min_path
            )));
        }

        self.tracker.set_config(config);

        Ok(())
    }

    #[inline]
    pub fn tracker_config(&self) -> &TrackerConfig {
        self.tracker.config()
    }

    #[inline]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    #[inline]
    pub fn tracks(&self) -> Vec<Track> {
        self.tracker.snapshot()
    }

    #[inline]
    pub fn counts(&self) -> CountsSnapshot {
        self.aggregator.snapshot()
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            tracks: self.tracks(),
            counts: self.counts(),
        }
    }

    /// Clears tracks and counts together. The line and settings are kept.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.aggregator.reset();
    }
}

impl Default for LineCounter {
    fn default() -> Self {
        Self::new(TrackerConfig::default(), ClassTable::default())
    }
}
