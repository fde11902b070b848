use serde_derive::{Deserialize, Serialize};

use crate::detection::Detection;

/// All detections produced for one captured image.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// (width, height) of the source image, `(0, 0)` when unknown
    #[serde(default)]
    pub dims: (u32, u32),
    #[serde(default)]
    pub detections: Vec<Detection>,
    pub timestamp: f64, // in seconds
}

impl Frame {
    #[inline]
    pub fn new(timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            dims: (0, 0),
            detections,
            timestamp,
        }
    }

    #[inline]
    pub fn with_dims(mut self, width: u32, height: u32) -> Self {
        self.dims = (width, height);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
