use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::crossing::{CrossingEvent, Direction};
use crate::detection::ClassId;
use crate::error::Error;

/// Bucket for class ids missing from the table.
pub const UNKNOWN_CLASS: &str = "unknown";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    pub id: ClassId,
    pub name: String,
}

impl ClassEntry {
    pub fn new<S: ToString>(id: ClassId, name: S) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

/// Closed, ordered set of counted classes. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassTable {
    entries: Arc<[ClassEntry]>,
}

impl ClassTable {
    pub fn new(entries: Vec<ClassEntry>) -> Result<Self, Error> {
        for (i, e) in entries.iter().enumerate() {
            if entries[..i].iter().any(|o| o.id == e.id) {
                return Err(Error::InvalidConfig(format!("duplicate class id {}", e.id)));
            }
            if e.name == UNKNOWN_CLASS {
                return Err(Error::InvalidConfig(format!(
                    "class name `{}` is reserved",
                    UNKNOWN_CLASS
                )));
            }
        }

        Ok(Self {
            entries: entries.into(),
        })
    }

    /// COCO vehicle classes: car, motorcycle, bus, truck.
    pub fn vehicles() -> Self {
        Self {
            entries: vec![
                ClassEntry::new(2, "car"),
                ClassEntry::new(3, "motorcycle"),
                ClassEntry::new(5, "bus"),
                ClassEntry::new(7, "truck"),
            ]
            .into(),
        }
    }

    #[inline]
    pub fn entries(&self) -> &[ClassEntry] {
        &self.entries
    }

    #[inline]
    pub fn ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    #[inline]
    pub fn contains(&self, id: ClassId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn name(&self, id: ClassId) -> &str {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.name.as_str())
            .unwrap_or(UNKNOWN_CLASS)
    }

    /// Counter slot for `id`; unknown ids share the last slot.
    #[inline]
    fn slot(&self, id: ClassId) -> usize {
        self.entries
            .iter()
            .position(|e| e.id == id)
            .unwrap_or(self.entries.len())
    }

    /// Number of counter slots including the unknown bucket.
    #[inline]
    fn slots(&self) -> usize {
        self.entries.len() + 1
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::vehicles()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectionCounts {
    pub up: u64,
    pub down: u64,
}

impl DirectionCounts {
    #[inline]
    pub fn add(&mut self, direction: Direction) {
        match direction {
            Direction::Up => self.up += 1,
            Direction::Down => self.down += 1,
        }
    }

    #[inline]
    pub fn get(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
        }
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.up + self.down
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClassCounts {
    pub class: String,
    pub up: u64,
    pub down: u64,
}

/// Point-in-time copy of all counters. Every configured class is listed, in
/// table order, followed by the unknown bucket.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct CountsSnapshot {
    pub per_class: Vec<ClassCounts>,
    pub total_up: u64,
    pub total_down: u64,
}

impl CountsSnapshot {
    pub fn get(&self, class: &str) -> DirectionCounts {
        self.per_class
            .iter()
            .find(|c| c.class == class)
            .map(|c| DirectionCounts {
                up: c.up,
                down: c.down,
            })
            .unwrap_or_default()
    }

    #[inline]
    pub fn up(&self, class: &str) -> u64 {
        self.get(class).up
    }

    #[inline]
    pub fn down(&self, class: &str) -> u64 {
        self.get(class).down
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total_up + self.total_down
    }
}

/// Per-class, per-direction counters fed by crossing events.
#[derive(Debug, Clone)]
pub struct Aggregator {
    classes: ClassTable,
    counts: Vec<DirectionCounts>,
    totals: DirectionCounts,
}

impl Aggregator {
    pub fn new(classes: ClassTable) -> Self {
        let counts = vec![DirectionCounts::default(); classes.slots()];

        Self {
            classes,
            counts,
            totals: DirectionCounts::default(),
        }
    }

    #[inline]
    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn apply(&mut self, events: &[CrossingEvent]) {
        for ev in events {
            let slot = self.classes.slot(ev.class);
            self.counts[slot].add(ev.direction);
            self.totals.add(ev.direction);
        }
    }

    #[inline]
    pub fn totals(&self) -> DirectionCounts {
        self.totals
    }

    pub fn snapshot(&self) -> CountsSnapshot {
        let names = self
            .classes
            .entries()
            .iter()
            .map(|e| e.name.as_str())
            .chain(std::iter::once(UNKNOWN_CLASS));

        CountsSnapshot {
            per_class: names
                .zip(self.counts.iter())
                .map(|(name, c)| ClassCounts {
                    class: name.to_string(),
                    up: c.up,
                    down: c.down,
                })
                .collect(),
            total_up: self.totals.up,
            total_down: self.totals.down,
        }
    }

    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = DirectionCounts::default());
        self.totals = DirectionCounts::default();

        info!("counts reset");
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(ClassTable::default())
    }
}
