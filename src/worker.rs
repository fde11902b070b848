//! Capture-side loop and the handle the presentation side reads through.
//!
//! The whole per-frame unit of work runs under one lock, so readers only ever
//! see complete frames. `reset` goes through the same lock.

use crossbeam_channel::Sender;
use serde_derive::{Deserialize, Serialize};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::aggregator::CountsSnapshot;
use crate::counter::{CounterSnapshot, FrameReport, LineCounter};
use crate::crossing::{CountingLine, CrossingEvent};
use crate::error::Error;
use crate::frame::Frame;
use crate::track::Track;
use crate::tracker::TrackerConfig;

/// Supplies frames of detections (the external detector adapter).
pub trait FrameSource: Send {
    /// Next frame, or `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, Error>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    #[inline]
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        (**self).next_frame()
    }
}

/// Frames from any iterator, ends with it.
pub struct IterSource<I>(pub I);

impl<I: Iterator<Item = Frame> + Send> FrameSource for IterSource<I> {
    #[inline]
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        Ok(self.0.next())
    }
}

/// One JSON-encoded [`Frame`] per line; blank lines are skipped.
pub struct JsonLinesSource<R> {
    reader: R,
    line: String,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead + Send> FrameSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }

            let text = self.line.trim();
            if !text.is_empty() {
                return Ok(Some(serde_json::from_str(text)?));
            }
        }
    }
}

/// Cloneable handle to a [`LineCounter`] guarded by a single lock.
#[derive(Debug, Clone, Default)]
pub struct SharedCounter {
    inner: Arc<Mutex<LineCounter>>,
}

impl SharedCounter {
    pub fn new(counter: LineCounter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(counter)),
        }
    }

    /// Locks the counter. A panic in another holder does not make the state
    /// unusable: every mutation completes under the lock, so it is recovered.
    pub fn lock(&self) -> MutexGuard<'_, LineCounter> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[inline]
    pub fn process(&self, frame: &Frame) -> FrameReport {
        self.lock().process(frame)
    }

    #[inline]
    pub fn reset(&self) {
        self.lock().reset()
    }

    #[inline]
    pub fn tracks(&self) -> Vec<Track> {
        self.lock().tracks()
    }

    #[inline]
    pub fn counts(&self) -> CountsSnapshot {
        self.lock().counts()
    }

    #[inline]
    pub fn snapshot(&self) -> CounterSnapshot {
        self.lock().snapshot()
    }

    #[inline]
    pub fn set_line(&self, line: CountingLine) {
        self.lock().set_line(line)
    }

    #[inline]
    pub fn clear_line(&self) {
        self.lock().clear_line()
    }

    #[inline]
    pub fn set_detection_threshold(&self, threshold: f32) -> Result<(), Error> {
        self.lock().set_detection_threshold(threshold)
    }

    #[inline]
    pub fn set_tracker_config(&self, config: TrackerConfig) -> Result<(), Error> {
        self.lock().set_tracker_config(config)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Frame rate cap for the loop, `0` runs as fast as the source delivers
    pub target_fps: f32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { target_fps: 30.0 }
    }
}

impl WorkerConfig {
    fn frame_period(&self) -> Option<Duration> {
        if !(self.target_fps > 0.0) {
            return None;
        }

        // a period too long for `Duration` means effectively unpaced
        Duration::try_from_secs_f32(1.0 / self.target_fps).ok()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub frames: u64,
    pub events: u64,
}

/// Background loop feeding a [`FrameSource`] into a [`SharedCounter`].
///
/// Stopping is cooperative: the flag is read between frames only, so a stop
/// never interrupts a frame halfway.
pub struct Worker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<WorkerStats, Error>>>,
}

impl Worker {
    pub fn spawn<S>(
        counter: SharedCounter,
        source: S,
        config: WorkerConfig,
        events: Option<Sender<CrossingEvent>>,
    ) -> Self
    where
        S: FrameSource + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        let handle = thread::spawn(move || run(counter, source, config, events, flag));

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Asks the loop to exit after the current frame.
    #[inline]
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Waits for the loop to end (source exhausted, stopped or failed).
    pub fn join(mut self) -> Result<WorkerStats, Error> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| Error::WorkerPanicked)?,
            None => Ok(WorkerStats::default()),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop();
            let _ = handle.join();
        }
    }
}

fn run<S: FrameSource>(
    counter: SharedCounter,
    mut source: S,
    config: WorkerConfig,
    mut events: Option<Sender<CrossingEvent>>,
    stop: Arc<AtomicBool>,
) -> Result<WorkerStats, Error> {
    let period = config.frame_period();
    let mut stats = WorkerStats::default();

    info!(target_fps = config.target_fps, "worker started");

    while !stop.load(Ordering::Acquire) {
        let started = Instant::now();

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("frame source exhausted");
                break;
            }
            Err(err) => {
                warn!(%err, "frame source failed, stopping worker");
                return Err(err);
            }
        };

        let report = counter.process(&frame);
        stats.frames += 1;
        stats.events += report.events.len() as u64;

        let disconnected = match &events {
            Some(tx) => report.events.into_iter().any(|ev| tx.send(ev).is_err()),
            None => false,
        };

        if disconnected {
            warn!("crossing event receiver dropped, no longer forwarding events");
            events = None;
        }

        if let Some(period) = period {
            if let Some(rest) = period.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
    }

    info!(frames = stats.frames, events = stats.events, "worker stopped");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn json_lines_skip_blanks() {
        let data = "{\"timestamp\":0.0,\"detections\":[{\"bbox\":[0,0,10,10],\"c\":2,\"p\":0.9}]}\n\n{\"timestamp\":0.1}\n";
        let mut src = JsonLinesSource::new(Cursor::new(data));

        let first = src.next_frame().unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first.detections[0].class, 2);

        let second = src.next_frame().unwrap().unwrap();
        assert!(second.is_empty());
        assert_eq!(second.timestamp, 0.1);

        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn json_lines_report_garbage() {
        let mut src = JsonLinesSource::new(Cursor::new("not json\n"));

        assert!(matches!(src.next_frame(), Err(Error::Json(_))));
    }

    #[test]
    fn zero_fps_disables_pacing() {
        assert!(WorkerConfig { target_fps: 0.0 }.frame_period().is_none());
        assert!(WorkerConfig::default().frame_period().is_some());
        assert!(WorkerConfig { target_fps: 1e-30 }.frame_period().is_none());
    }
}
