//! Directional counting-line crossing.
//!
//! A crossing is a sign change of the side test between two consecutive path
//! points, accepted only when the newer point lies within `threshold` pixels
//! of the finite segment `p1-p2`. Endpoint order fixes the direction
//! convention: `Up` when the newer point is on the positive side of
//! `p2 - p1`, so swapping `p1` and `p2` swaps every reported direction.

use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregator::ClassTable;
use crate::detection::ClassId;
use crate::math;
use crate::tracker::{Participant, Tracker};

/// Crossing tests never run on paths shorter than this.
pub const MIN_PATH_LENGTH: usize = 3;

/// How many recent position pairs are scanned, so one missed frame still counts.
const SCANNED_PAIRS: usize = 2;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
        }
    }
}

/// How the counting line is placed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    /// Endpoints given explicitly
    #[default]
    Manual,
    /// Across the frame at half height
    Horizontal,
    /// Down the frame at half width
    Vertical,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CountingLine {
    pub p1: (f32, f32),
    pub p2: (f32, f32),
    /// Max distance (px) from the segment at which a crossing still counts
    pub threshold: f32,
    /// Path length required before crossing tests run, never below 3
    pub min_path_length: usize,
}

impl CountingLine {
    pub const DEFAULT_THRESHOLD: f32 = 100.0;

    pub fn new(p1: (f32, f32), p2: (f32, f32)) -> Self {
        Self {
            p1,
            p2,
            threshold: Self::DEFAULT_THRESHOLD,
            min_path_length: MIN_PATH_LENGTH,
        }
    }

    #[inline]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    #[inline]
    pub fn with_min_path_length(mut self, len: usize) -> Self {
        self.min_path_length = len;
        self
    }

    /// Left-to-right line at half the frame height.
    pub fn horizontal(width: u32, height: u32) -> Self {
        let y = (height / 2) as f32;
        Self::new((0.0, y), (width as f32, y))
    }

    /// Top-to-bottom line at half the frame width.
    pub fn vertical(width: u32, height: u32) -> Self {
        let x = (width / 2) as f32;
        Self::new((x, 0.0), (x, height as f32))
    }

    /// Automatic placement for `kind`, `None` for manual lines.
    pub fn auto(kind: LineKind, width: u32, height: u32) -> Option<Self> {
        match kind {
            LineKind::Manual => None,
            LineKind::Horizontal => Some(Self::horizontal(width, height)),
            LineKind::Vertical => Some(Self::vertical(width, height)),
        }
    }

    /// Same segment with endpoints swapped (opposite direction convention).
    pub fn reversed(&self) -> Self {
        Self {
            p1: self.p2,
            p2: self.p1,
            ..*self
        }
    }

    #[inline]
    pub fn start(&self) -> na::Point2<f32> {
        na::Point2::new(self.p1.0, self.p1.1)
    }

    #[inline]
    pub fn end(&self) -> na::Point2<f32> {
        na::Point2::new(self.p2.0, self.p2.1)
    }

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        (self.end() - self.start()).norm_squared() <= math::DEGENERATE_EPS
    }

    /// Signed side of `p`; see [`math::side`].
    #[inline]
    pub fn side(&self, p: &na::Point2<f32>) -> f32 {
        math::side(&self.start(), &self.end(), p)
    }

    #[inline]
    pub fn distance(&self, p: &na::Point2<f32>) -> f32 {
        math::segment_distance(p, &self.start(), &self.end())
    }

    /// Direction of the move `prev -> cur` if it crosses the line inside the
    /// counted corridor.
    pub fn crossing(&self, prev: &na::Point2<f32>, cur: &na::Point2<f32>) -> Option<Direction> {
        if self.is_degenerate() {
            return None;
        }

        let side_cur = self.side(cur);
        let side_prev = self.side(prev);

        if side_cur * side_prev >= 0.0 {
            return None;
        }

        if self.distance(cur) > self.threshold {
            return None;
        }

        Some(if side_cur > 0.0 {
            Direction::Up
        } else {
            Direction::Down
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CrossingEvent {
    pub track_id: u32,
    pub class: ClassId,
    pub class_name: String,
    pub direction: Direction,
    /// Time of the frame that confirmed the crossing
    pub timestamp: f64,
}

/// Confirms at most one crossing per track.
#[derive(Debug, Clone)]
pub struct CrossingDetector {
    classes: ClassTable,
}

impl CrossingDetector {
    pub fn new(classes: ClassTable) -> Self {
        Self { classes }
    }

    #[inline]
    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    /// Checks every uncounted track of `tracker` against `line`, latching
    /// `counted` on the ones that crossed.
    #[inline]
    pub fn check(&self, tracker: &mut Tracker, line: &CountingLine) -> Vec<CrossingEvent> {
        self.check_tracks(tracker.tracks_mut(), line)
    }

    pub(crate) fn check_tracks(
        &self,
        tracks: &mut [Participant],
        line: &CountingLine,
    ) -> Vec<CrossingEvent> {
        if line.is_degenerate() {
            debug!(p1 = ?line.p1, p2 = ?line.p2, "zero-length counting line, skipping crossing check");
            return Vec::new();
        }

        let min_len = line.min_path_length.max(MIN_PATH_LENGTH);
        let mut events = Vec::new();

        for track in tracks
            .iter_mut()
            .filter(|t| !t.is_counted() && t.path().len() >= min_len)
        {
            let Some(direction) = Self::scan(track, line) else {
                continue;
            };

            track.mark_counted();

            let class_name = self.classes.name(track.class());
            info!(
                track_id = track.id(),
                class = class_name,
                direction = direction.as_str(),
                "vehicle counted"
            );

            events.push(CrossingEvent {
                track_id: track.id(),
                class: track.class(),
                class_name: class_name.to_string(),
                direction,
                timestamp: track.last_update(),
            });
        }

        events
    }

    /// Newest pair first, then the one before it.
    fn scan(track: &Participant, line: &CountingLine) -> Option<Direction> {
        let path = track.path();

        (0..SCANNED_PAIRS).find_map(|k| {
            let cur = path.nth_back(k)?;
            let prev = path.nth_back(k + 1)?;

            line.crossing(prev, cur)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAR: ClassId = 2;

    fn line() -> CountingLine {
        CountingLine::new((0.0, 100.0), (200.0, 100.0)).with_threshold(10.0)
    }

    fn detector() -> CrossingDetector {
        CrossingDetector::new(ClassTable::default())
    }

    fn track(points: &[(f32, f32)]) -> Participant {
        Participant::with_path(1, CAR, points, 20)
    }

    #[test]
    fn counts_downward_move_as_up() {
        let mut tracks = [track(&[(50.0, 80.0), (50.0, 95.0), (50.0, 110.0)])];

        let events = detector().check_tracks(&mut tracks, &line());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, Direction::Up);
        assert_eq!(events[0].class_name, "car");
        assert!(tracks[0].is_counted());
    }

    #[test]
    fn reversed_line_flips_direction() {
        let mut tracks = [track(&[(50.0, 80.0), (50.0, 95.0), (50.0, 110.0)])];

        let events = detector().check_tracks(&mut tracks, &line().reversed());

        assert_eq!(events[0].direction, Direction::Down);
    }

    #[test]
    fn short_path_is_ignored() {
        let mut tracks = [track(&[(50.0, 95.0), (50.0, 105.0)])];

        assert!(detector().check_tracks(&mut tracks, &line()).is_empty());
        assert!(!tracks[0].is_counted());
    }

    #[test]
    fn outside_corridor_is_rejected() {
        // crosses the infinite line well past the p2 end
        let mut tracks = [track(&[(300.0, 80.0), (300.0, 95.0), (300.0, 105.0)])];

        assert!(detector().check_tracks(&mut tracks, &line()).is_empty());
        assert!(!tracks[0].is_counted());
    }

    #[test]
    fn far_landing_point_is_rejected() {
        let mut tracks = [track(&[(50.0, 60.0), (50.0, 90.0), (50.0, 130.0)])];

        assert!(detector().check_tracks(&mut tracks, &line()).is_empty());
    }

    #[test]
    fn older_pair_covers_missed_frame() {
        // crossed between the 2nd and 3rd point, 4th point moved on along the line
        let mut tracks = [track(&[(50.0, 80.0), (50.0, 95.0), (50.0, 105.0), (60.0, 106.0)])];

        let events = detector().check_tracks(&mut tracks, &line());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, Direction::Up);
    }

    #[test]
    fn far_newest_crossing_falls_back_to_older_pair() {
        // newest pair crosses the infinite line but lands 60px away
        let mut tracks = [track(&[(50.0, 90.0), (50.0, 105.0), (150.0, 40.0)])];

        let events = detector().check_tracks(&mut tracks, &line());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, Direction::Up);
        assert!(tracks[0].is_counted());
    }

    #[test]
    fn checks_tracks_owned_by_tracker() {
        let mut tracker = Tracker::default();
        for (i, y) in [80.0, 95.0, 110.0].into_iter().enumerate() {
            let det = crate::detection::Detection::centered(50.0, y, 20.0, 20.0, CAR, 0.9);
            tracker.update(&[det], i as f64 * 0.1);
        }

        let events = detector().check(&mut tracker, &line());

        assert_eq!(events.len(), 1);
        assert!(tracker.iter().all(|t| t.is_counted()));
    }

    #[test]
    fn counted_track_is_skipped() {
        let mut tracks = [track(&[(50.0, 80.0), (50.0, 95.0), (50.0, 110.0)])];
        let det = detector();

        assert_eq!(det.check_tracks(&mut tracks, &line()).len(), 1);
        assert!(det.check_tracks(&mut tracks, &line()).is_empty());
    }

    #[test]
    fn zero_length_line_never_counts() {
        let mut tracks = [track(&[(50.0, 80.0), (50.0, 95.0), (50.0, 110.0)])];
        let point = CountingLine::new((50.0, 100.0), (50.0, 100.0)).with_threshold(1000.0);

        assert!(point.is_degenerate());
        assert!(detector().check_tracks(&mut tracks, &point).is_empty());
    }

    #[test]
    fn min_path_length_is_respected() {
        let mut tracks = [track(&[(50.0, 80.0), (50.0, 95.0), (50.0, 110.0)])];

        assert!(detector()
            .check_tracks(&mut tracks, &line().with_min_path_length(4))
            .is_empty());
    }

    #[test]
    fn auto_lines_split_frame() {
        let h = CountingLine::horizontal(640, 480);
        assert_eq!((h.p1, h.p2), ((0.0, 240.0), (640.0, 240.0)));

        let v = CountingLine::vertical(640, 480);
        assert_eq!((v.p1, v.p2), ((320.0, 0.0), (320.0, 480.0)));

        assert!(CountingLine::auto(LineKind::Manual, 640, 480).is_none());
    }

    #[test]
    fn direction_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Direction::Up).unwrap(), "\"UP\"");
    }
}
