use crate::frame::BBox;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// Identity used to deduplicate detections within one camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CooldownKey {
    /// Detector supplied a stable track id
    Track { class_id: u32, track_id: i64 },
    /// No track id: position quantized to 10px cells in canvas space
    Position { class_id: u32, cells: [i32; 4] },
}

impl CooldownKey {
    pub fn track(class_id: u32, track_id: i64) -> Self {
        CooldownKey::Track { class_id, track_id }
    }

    /// Quantize a canvas-space box by dividing each coordinate by 10 and rounding
    pub fn position(class_id: u32, bbox: &BBox) -> Self {
        let q = |v: f32| (v / 10.0).round() as i32;
        CooldownKey::Position {
            class_id,
            cells: [q(bbox.x1), q(bbox.y1), q(bbox.x2), q(bbox.y2)],
        }
    }
}

/// Per-camera table of last emission times with a bounded size.
///
/// When full, entries older than `retention` are purged first; if the table
/// is still full the least recently emitted entry is evicted.
#[derive(Debug)]
pub struct CooldownTable {
    entries: HashMap<CooldownKey, Instant>,
    capacity: usize,
    retention: Duration,
}

impl CooldownTable {
    /// `retention` should be the longest cooldown any key uses
    pub fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            retention,
        }
    }

    /// Record an emission for `key` at `now` unless it is still cooling down.
    ///
    /// Returns `true` when the caller should emit.
    pub fn try_emit(&mut self, key: CooldownKey, cooldown: Duration, now: Instant) -> bool {
        if let Some(last) = self.entries.get(&key) {
            if now.saturating_duration_since(*last) < cooldown {
                trace!("Suppressed {:?}: still cooling down", key);
                return false;
            }
        } else if self.entries.len() >= self.capacity {
            self.make_room(now);
        }

        self.entries.insert(key, now);
        true
    }

    /// Whether `key` would be suppressed at `now` without touching the table
    pub fn is_cooling_down(&self, key: &CooldownKey, cooldown: Duration, now: Instant) -> bool {
        self.entries
            .get(key)
            .is_some_and(|last| now.saturating_duration_since(*last) < cooldown)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries whose last emission is older than the retention window
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let retention = self.retention;
        self.entries
            .retain(|_, last| now.saturating_duration_since(*last) < retention);
        before - self.entries.len()
    }

    fn make_room(&mut self, now: Instant) {
        let purged = self.purge_expired(now);
        if purged > 0 {
            trace!("Purged {} expired cooldown entries", purged);
        }

        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, last)| **last)
                .map(|(key, _)| *key);
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
