use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::detection::ClassId;

/// Lifecycle stage of a track. Eviction is not a state: evicted tracks are gone.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Created this frame from an unmatched detection
    New,
    /// Matched at least once since creation, not counted yet
    Tracked,
    /// Crossing confirmed; still updated but never counted again
    Counted,
}

/// Read-only copy of a track for rendering.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub track_id: u32,
    pub class: ClassId,
    pub confidence: f32,
    pub bbox: BBox<Ltrb>,

    // centroids, oldest first
    pub path: Vec<(f32, f32)>,

    pub counted: bool,
    pub state: TrackState,

    // seconds, same clock as `Frame::timestamp`
    pub last_update: f64,
}

impl Track {
    #[inline]
    pub fn centroid(&self) -> Option<(f32, f32)> {
        self.path.last().copied()
    }
}
