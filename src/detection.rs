use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};

/// Detector class index (COCO numbering by default).
pub type ClassId = u32;

/// One detector output for one frame: corner box, class and confidence.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BBox<Ltrb>,
    #[serde(rename = "c")]
    pub class: ClassId,
    #[serde(rename = "p")]
    pub confidence: f32,
}

impl Detection {
    #[inline]
    pub fn new(bbox: BBox<Ltrb>, class: ClassId, confidence: f32) -> Self {
        Self {
            bbox,
            class,
            confidence,
        }
    }

    /// Box of size `w` x `h` centered on (`cx`, `cy`).
    #[inline]
    pub fn centered(cx: f32, cy: f32, w: f32, h: f32, class: ClassId, confidence: f32) -> Self {
        Self::new(BBox::xywh(cx, cy, w, h).as_ltrb(), class, confidence)
    }

    #[inline(always)]
    pub fn centroid(&self) -> na::Point2<f32> {
        self.bbox.centroid()
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.bbox.width()
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.bbox.height()
    }
}
