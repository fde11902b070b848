use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::bbox::{BBox, Ltrb};
use crate::circular_queue::CircularQueue;
use crate::crossing::MIN_PATH_LENGTH;
use crate::detection::{ClassId, Detection};
use crate::error::Error;
use crate::math;
use crate::track::{Track, TrackState};

/// Id given to the first track of a fresh (or reset) tracker.
pub const FIRST_TRACK_ID: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Match score (px) a detection must stay strictly under to join a track
    pub max_distance: f32,
    /// Max number of centroids kept per track
    pub path_history_length: usize,
    /// Seconds without a match after which a track is dropped
    pub track_timeout: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_distance: 150.0,
            path_history_length: 20,
            track_timeout: 1.5,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.max_distance > 0.0) {
            return Err(Error::InvalidConfig(
                "tracking.max_distance must be positive".into(),
            ));
        }
        if !(self.track_timeout > 0.0) {
            return Err(Error::InvalidConfig(
                "tracking.track_timeout must be positive".into(),
            ));
        }
        if self.path_history_length < MIN_PATH_LENGTH {
            return Err(Error::InvalidConfig(format!(
                "tracking.path_history_length must be at least {}",
                MIN_PATH_LENGTH
            )));
        }

        Ok(())
    }
}

/// A live track as owned by [`Tracker`].
#[derive(Debug, Clone)]
pub struct Participant {
    id: u32,
    class: ClassId,
    bbox: BBox<Ltrb>,
    confidence: f32,
    path: CircularQueue<na::Point2<f32>>,
    last_update: f64,
    hits: u32,
    counted: bool,
}

impl Participant {
    fn new(id: u32, ts_sec: f64, det: &Detection, path_len: usize) -> Self {
        let mut path = CircularQueue::with_capacity(path_len);
        path.push(det.centroid());

        Self {
            id,
            class: det.class,
            bbox: det.bbox,
            confidence: det.confidence,
            path,
            last_update: ts_sec,
            hits: 1,
            counted: false,
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn class(&self) -> ClassId {
        self.class
    }

    #[inline]
    pub fn is_counted(&self) -> bool {
        self.counted
    }

    #[inline]
    pub fn last_update(&self) -> f64 {
        self.last_update
    }

    #[inline]
    pub fn path(&self) -> &CircularQueue<na::Point2<f32>> {
        &self.path
    }

    /// Latest centroid. The path always holds at least one point.
    #[inline]
    pub fn centroid(&self) -> na::Point2<f32> {
        self.path
            .last()
            .copied()
            .unwrap_or_else(|| self.bbox.centroid())
    }

    /// Where the track should be next frame if it keeps its last displacement.
    pub fn prediction(&self) -> Option<na::Point2<f32>> {
        let last = self.path.nth_back(0)?;
        let prev = self.path.nth_back(1)?;

        Some(math::extrapolate(prev, last))
    }

    /// Smaller of the raw and the predicted centroid distance.
    pub fn match_score(&self, pos: &na::Point2<f32>) -> f32 {
        let raw = na::distance(&self.centroid(), pos);

        match self.prediction() {
            Some(pred) => raw.min(na::distance(&pred, pos)),
            None => raw,
        }
    }

    pub fn state(&self) -> TrackState {
        if self.counted {
            TrackState::Counted
        } else if self.hits > 1 {
            TrackState::Tracked
        } else {
            TrackState::New
        }
    }

    fn update(&mut self, ts_sec: f64, det: &Detection) {
        self.path.push(det.centroid());
        self.bbox = det.bbox;
        self.confidence = det.confidence;
        self.last_update = ts_sec;
        self.hits += 1;
    }

    /// One-way latch, there is no way back to uncounted.
    #[inline]
    pub(crate) fn mark_counted(&mut self) {
        self.counted = true;
    }

    #[cfg(test)]
    pub(crate) fn with_path(id: u32, class: ClassId, points: &[(f32, f32)], cap: usize) -> Self {
        let (x, y) = points.first().copied().unwrap_or_default();
        let det = Detection::centered(x, y, 10.0, 10.0, class, 1.0);
        let mut p = Self::new(id, 0.0, &det, cap);

        for &(x, y) in points.iter().skip(1) {
            p.update(0.0, &Detection::centered(x, y, 10.0, 10.0, class, 1.0));
        }

        p
    }
}

impl From<&Participant> for Track {
    fn from(p: &Participant) -> Track {
        Track {
            track_id: p.id,
            class: p.class,
            confidence: p.confidence,
            bbox: p.bbox,
            path: p.path.iter().map(|pt| (pt.x, pt.y)).collect(),
            counted: p.counted,
            state: p.state(),
            last_update: p.last_update,
        }
    }
}

/// Frame-to-frame association of detections into tracks.
///
/// Matching is greedy in detection order: each detection takes the closest
/// free track of its class, so when two detections compete for one track the
/// earlier one in the input wins and the later one starts a new track.
#[derive(Debug, Clone)]
pub struct Tracker {
    config: TrackerConfig,
    tracks: Vec<Participant>,
    next_id: u32,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::with_capacity(64),
            next_id: FIRST_TRACK_ID,
        }
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Applies new settings; a shorter path cap trims existing paths right away.
    pub fn set_config(&mut self, config: TrackerConfig) {
        if config.path_history_length != self.config.path_history_length {
            for t in &mut self.tracks {
                t.path.set_capacity(config.path_history_length);
            }
        }

        self.config = config;
    }

    pub fn update(&mut self, detections: &[Detection], ts_sec: f64) {
        let mut taken = vec![false; self.tracks.len()];
        let mut spawned = Vec::new();
        let mut matched = 0usize;

        for det in detections {
            let pos = det.centroid();

            // `min_by` keeps the first of equal scores, i.e. the oldest track
            let best = self
                .tracks
                .iter()
                .enumerate()
                .filter(|(i, t)| !taken[*i] && t.class == det.class)
                .map(|(i, t)| (i, t.match_score(&pos)))
                .filter(|&(_, score)| score < self.config.max_distance)
                .min_by(|a, b| a.1.total_cmp(&b.1));

            if let Some((i, _)) = best {
                taken[i] = true;
                matched += 1;
                self.tracks[i].update(ts_sec, det);
            } else {
                let id = self.next_id;
                self.next_id += 1;

                debug!(track_id = id, class = det.class, x = pos.x, y = pos.y, "track created");
                spawned.push(Participant::new(
                    id,
                    ts_sec,
                    det,
                    self.config.path_history_length,
                ));
            }
        }

        self.tracks.extend(spawned);

        let timeout = self.config.track_timeout;
        self.tracks.retain(|t| {
            let keep = ts_sec - t.last_update <= timeout;
            if !keep {
                debug!(track_id = t.id, counted = t.counted, "track evicted");
            }
            keep
        });

        trace!(
            detections = detections.len(),
            matched,
            active = self.tracks.len(),
            "association done"
        );
    }

    /// Copies of all live tracks in creation order.
    pub fn snapshot(&self) -> Vec<Track> {
        self.tracks.iter().map(Into::into).collect()
    }

    #[inline]
    pub fn get(&self, id: u32) -> Option<&Participant> {
        self.tracks.iter().find(|t| t.id == id)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.tracks.iter()
    }

    #[inline]
    pub(crate) fn tracks_mut(&mut self) -> &mut [Participant] {
        &mut self.tracks
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Drops every track and restarts ids from [`FIRST_TRACK_ID`].
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = FIRST_TRACK_ID;
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAR: ClassId = 2;
    const BUS: ClassId = 5;

    fn det(x: f32, y: f32, class: ClassId) -> Detection {
        Detection::centered(x, y, 20.0, 20.0, class, 0.9)
    }

    fn ids(tracker: &Tracker) -> Vec<u32> {
        tracker.iter().map(|t| t.id()).collect()
    }

    #[test]
    fn keeps_id_for_smooth_motion() {
        let mut tracker = Tracker::default();

        for i in 0..30 {
            tracker.update(&[det(10.0 + i as f32 * 12.0, 50.0, CAR)], i as f64 * 0.033);
            assert_eq!(ids(&tracker), vec![FIRST_TRACK_ID]);
        }
    }

    #[test]
    fn classes_never_mix() {
        let mut tracker = Tracker::default();

        tracker.update(&[det(100.0, 100.0, CAR)], 0.0);
        tracker.update(&[det(101.0, 100.0, BUS)], 0.1);

        assert_eq!(tracker.len(), 2);
        let bus = tracker.iter().find(|t| t.class() == BUS).unwrap();
        assert_eq!(bus.id(), FIRST_TRACK_ID + 1);
        assert_eq!(bus.path().len(), 1);
    }

    #[test]
    fn too_far_spawns_new_track() {
        let mut tracker = Tracker::new(TrackerConfig {
            max_distance: 50.0,
            ..Default::default()
        });

        tracker.update(&[det(0.0, 0.0, CAR)], 0.0);
        tracker.update(&[det(60.0, 0.0, CAR)], 0.1);

        assert_eq!(ids(&tracker), vec![1, 2]);
    }

    #[test]
    fn prediction_rescues_fast_mover() {
        let mut tracker = Tracker::new(TrackerConfig {
            max_distance: 50.0,
            ..Default::default()
        });

        // 40 px/frame, then 80 px jump: raw distance 80 but prediction only 40 away
        tracker.update(&[det(0.0, 0.0, CAR)], 0.0);
        tracker.update(&[det(40.0, 0.0, CAR)], 0.1);
        tracker.update(&[det(120.0, 0.0, CAR)], 0.2);

        assert_eq!(ids(&tracker), vec![1]);
    }

    #[test]
    fn earlier_detection_claims_contested_track() {
        let mut tracker = Tracker::default();
        tracker.update(&[det(100.0, 100.0, CAR)], 0.0);

        // both within max_distance; the second one is even closer
        tracker.update(&[det(130.0, 100.0, CAR), det(105.0, 100.0, CAR)], 0.1);

        assert_eq!(ids(&tracker), vec![1, 2]);
        assert_eq!(tracker.get(1).unwrap().centroid(), na::Point2::new(130.0, 100.0));
        assert_eq!(tracker.get(2).unwrap().centroid(), na::Point2::new(105.0, 100.0));
    }

    #[test]
    fn path_is_capped() {
        let mut tracker = Tracker::new(TrackerConfig {
            path_history_length: 5,
            ..Default::default()
        });

        for i in 0..50 {
            tracker.update(&[det(i as f32, 0.0, CAR)], i as f64 * 0.01);
            assert!(tracker.get(1).unwrap().path().len() <= 5);
        }

        let last = tracker.snapshot().pop().unwrap();
        assert_eq!(last.path.first(), Some(&(45.0, 0.0)));
        assert_eq!(last.path.last(), Some(&(49.0, 0.0)));
    }

    #[test]
    fn shrinking_cap_trims_live_paths() {
        let mut tracker = Tracker::default();
        for i in 0..10 {
            tracker.update(&[det(i as f32, 0.0, CAR)], i as f64 * 0.01);
        }

        tracker.set_config(TrackerConfig {
            path_history_length: 3,
            ..Default::default()
        });

        assert_eq!(tracker.get(1).unwrap().path().len(), 3);
    }

    #[test]
    fn stale_tracks_are_evicted() {
        let mut tracker = Tracker::default();
        tracker.update(&[det(0.0, 0.0, CAR)], 0.0);

        tracker.update(&[], 1.5);
        assert_eq!(tracker.len(), 1);

        tracker.update(&[], 1.6);
        assert!(tracker.is_empty());
    }

    #[test]
    fn states_follow_lifecycle() {
        let mut tracker = Tracker::default();
        tracker.update(&[det(0.0, 0.0, CAR)], 0.0);
        assert_eq!(tracker.get(1).unwrap().state(), TrackState::New);

        tracker.update(&[det(5.0, 0.0, CAR)], 0.1);
        assert_eq!(tracker.get(1).unwrap().state(), TrackState::Tracked);

        tracker.tracks_mut()[0].mark_counted();
        tracker.update(&[det(10.0, 0.0, CAR)], 0.2);
        let t = tracker.get(1).unwrap();
        assert_eq!(t.state(), TrackState::Counted);
        assert!(t.is_counted());
    }

    #[test]
    fn reset_restarts_ids() {
        let mut tracker = Tracker::default();
        tracker.update(&[det(0.0, 0.0, CAR), det(500.0, 0.0, CAR)], 0.0);
        assert_eq!(ids(&tracker), vec![1, 2]);

        tracker.reset();
        assert!(tracker.is_empty());

        tracker.update(&[det(0.0, 0.0, CAR)], 0.1);
        assert_eq!(ids(&tracker), vec![FIRST_TRACK_ID]);
    }
}
