//! Detector-side adapter: turns raw model output into [`Detection`]s and drops
//! the ones the counter should never see.

use ndarray::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::aggregator::ClassTable;
use crate::bbox::BBox;
use crate::detection::{ClassId, Detection};
use crate::error::Error;
use crate::frame::Frame;

const BOX_COLUMNS: usize = 4;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// Raw class score a prediction row needs to become a detection
    pub score_threshold: f32,
    /// Detections at or below this confidence are dropped
    pub min_confidence: f32,
    /// Boxes must be wider and taller than this (px)
    pub min_box_size: f32,
    /// Accepted classes; empty means the counted class table
    pub classes: Vec<ClassId>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.05,
            min_confidence: 0.10,
            min_box_size: 50.0,
            classes: Vec::new(),
        }
    }
}

/// Rejects detections outside the accepted classes, low-confidence ones and
/// boxes too small (or inverted) to be a vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFilter {
    min_confidence: f32,
    min_box_size: f32,
    classes: Vec<ClassId>,
}

impl DetectionFilter {
    pub fn new(config: &DetectorConfig, table: &ClassTable) -> Self {
        let classes = if config.classes.is_empty() {
            table.ids().collect()
        } else {
            config.classes.clone()
        };

        Self {
            min_confidence: config.min_confidence,
            min_box_size: config.min_box_size,
            classes,
        }
    }

    #[inline]
    pub fn accepts(&self, det: &Detection) -> bool {
        self.classes.contains(&det.class)
            && det.confidence > self.min_confidence
            && det.width() > self.min_box_size
            && det.height() > self.min_box_size
    }

    /// Filters `frame` in place, keeping detection order.
    pub fn apply(&self, frame: &mut Frame) {
        frame.detections.retain(|d| self.accepts(d));
    }
}

/// Decodes one image worth of predictions.
///
/// Each row is `[cx, cy, w, h, score_0, .., score_n]`; the box is multiplied by
/// `scale` (pass the frame size for normalized outputs, `(1.0, 1.0)` for pixel
/// outputs) and the best-scoring class is taken.
pub fn decode_predictions(
    view: ArrayView2<'_, f32>,
    score_threshold: f32,
    scale: (f32, f32),
) -> Result<Vec<Detection>, Error> {
    let shape = view.shape();
    if shape[1] <= BOX_COLUMNS {
        return Err(Error::BadPredictionShape {
            shape: shape.to_vec(),
        });
    }

    let (sx, sy) = scale;
    let mut results = Vec::new();

    for row in view.outer_iter() {
        let scores = row.slice(s![BOX_COLUMNS..]);

        let Some((class, score)) = scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };

        if score <= score_threshold {
            continue;
        }

        let bbox = BBox::xywh(row[0] * sx, row[1] * sy, row[2] * sx, row[3] * sy);
        results.push(Detection::new(bbox.as_ltrb(), class as ClassId, score));
    }

    Ok(results)
}

/// Batched variant of [`decode_predictions`] over `[batch, rows, cols]`.
pub fn decode_batch(
    view: ArrayView3<'_, f32>,
    score_threshold: f32,
    scale: (f32, f32),
) -> Result<Vec<Vec<Detection>>, Error> {
    view.outer_iter()
        .map(|batch| decode_predictions(batch, score_threshold, scale))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> DetectionFilter {
        DetectionFilter::new(&DetectorConfig::default(), &ClassTable::default())
    }

    #[test]
    fn filter_drops_small_weak_and_foreign() {
        let f = filter();

        assert!(f.accepts(&Detection::centered(100.0, 100.0, 60.0, 60.0, 2, 0.5)));
        // too small
        assert!(!f.accepts(&Detection::centered(100.0, 100.0, 40.0, 60.0, 2, 0.5)));
        // too weak
        assert!(!f.accepts(&Detection::centered(100.0, 100.0, 60.0, 60.0, 2, 0.1)));
        // person
        assert!(!f.accepts(&Detection::centered(100.0, 100.0, 60.0, 60.0, 0, 0.9)));
        // inverted box
        assert!(!f.accepts(&Detection::new(BBox::ltrb(100.0, 100.0, 20.0, 20.0), 2, 0.9)));
    }

    #[test]
    fn explicit_class_list_overrides_table() {
        let config = DetectorConfig {
            classes: vec![0],
            ..Default::default()
        };
        let f = DetectionFilter::new(&config, &ClassTable::default());

        assert!(f.accepts(&Detection::centered(100.0, 100.0, 60.0, 60.0, 0, 0.9)));
        assert!(!f.accepts(&Detection::centered(100.0, 100.0, 60.0, 60.0, 2, 0.9)));
    }

    #[test]
    fn apply_keeps_order() {
        let mut frame = Frame::new(
            0.0,
            vec![
                Detection::centered(10.0, 10.0, 60.0, 60.0, 2, 0.9),
                Detection::centered(20.0, 20.0, 5.0, 5.0, 2, 0.9),
                Detection::centered(30.0, 30.0, 60.0, 60.0, 7, 0.9),
            ],
        );

        filter().apply(&mut frame);

        let classes: Vec<_> = frame.iter().map(|d| d.class).collect();
        assert_eq!(classes, vec![2, 7]);
    }

    #[test]
    fn decodes_best_class() {
        let preds = array![
            [0.5, 0.5, 0.25, 0.5, 0.1, 0.0, 0.8],
            [0.1, 0.1, 0.1, 0.1, 0.01, 0.02, 0.03],
        ];

        let dets = decode_predictions(preds.view(), 0.05, (640.0, 480.0)).unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class, 2);
        assert_eq!(dets[0].bbox.as_slice(), &[240.0, 120.0, 400.0, 360.0]);
        assert!((dets[0].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn rejects_rows_without_scores() {
        let preds = Array2::<f32>::zeros((3, 4));

        assert!(matches!(
            decode_predictions(preds.view(), 0.05, (1.0, 1.0)),
            Err(Error::BadPredictionShape { .. })
        ));
    }

    #[test]
    fn decodes_batches() {
        let preds = Array3::<f32>::zeros((2, 5, 6));

        let out = decode_batch(preds.view(), 0.05, (1.0, 1.0)).unwrap();

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|d| d.is_empty()));
    }
}
