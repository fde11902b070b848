//! Line-crossing object counter.
//!
//! Per-frame detections are associated into persistent tracks, each track is
//! tested against a single directional counting line and counted at most
//! once, and counts are kept per class and direction.
//!
//! ```no_run
//! use linecount::{CountingLine, Detection, Frame, LineCounter};
//!
//! let mut counter = LineCounter::default();
//! counter.set_line(CountingLine::new((0.0, 100.0), (200.0, 100.0)));
//!
//! let frame = Frame::new(0.0, vec![Detection::centered(50.0, 80.0, 60.0, 60.0, 2, 0.9)]);
//! let report = counter.process(&frame);
//! println!("{} tracks, {} new counts", report.active_tracks, report.events.len());
//! ```

pub mod aggregator;
pub mod bbox;
pub mod circular_queue;
pub mod config;
pub mod counter;
pub mod crossing;
pub mod detection;
pub mod detector;
pub mod error;
pub mod frame;
pub mod math;
pub mod track;
pub mod tracker;
pub mod worker;

pub use aggregator::{Aggregator, ClassEntry, ClassTable, CountsSnapshot, DirectionCounts};
pub use config::Config;
pub use counter::{CounterSnapshot, FrameReport, LineCounter};
pub use crossing::{CountingLine, CrossingDetector, CrossingEvent, Direction, LineKind};
pub use detection::{ClassId, Detection};
pub use error::Error;
pub use frame::Frame;
pub use track::{Track, TrackState};
pub use tracker::{Tracker, TrackerConfig};
pub use worker::{FrameSource, SharedCounter, Worker, WorkerConfig};
