use crate::config::DetectionConfig;
use crate::cooldown::{CooldownKey, CooldownTable};
use crate::detector::Detection;
use crate::frame::BBox;
use crate::normalize::LetterboxParams;
use std::time::{Duration, Instant};

/// Why a detection did not produce an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    WrongClass,
    LowConfidence,
    TooSmall,
    CoolingDown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Emit an event for the box mapped back to source coordinates
    Emit { source_bbox: BBox },
    Rejected(RejectReason),
}

impl Verdict {
    /// Whether the detection passed the class and confidence filter
    pub fn is_candidate(&self) -> bool {
        !matches!(
            self,
            Verdict::Rejected(RejectReason::WrongClass | RejectReason::LowConfidence)
        )
    }
}

/// Thresholds applied to every detection of one camera
#[derive(Debug, Clone)]
pub struct DetectionPolicy {
    pub class_id: u32,
    pub confidence_threshold: f32,
    pub min_box_area: f32,
    pub track_cooldown: Duration,
    pub position_cooldown: Duration,
}

impl DetectionPolicy {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            class_id: config.person_class_id,
            confidence_threshold: config.confidence_threshold,
            min_box_area: config.min_box_area,
            track_cooldown: config.track_cooldown(),
            position_cooldown: config.event_cooldown(),
        }
    }
}

/// Class, confidence, size and cooldown filtering for one camera
#[derive(Debug)]
pub struct DetectionFilter {
    policy: DetectionPolicy,
    cooldowns: CooldownTable,
}

impl DetectionFilter {
    pub fn new(policy: DetectionPolicy, table_capacity: usize) -> Self {
        let retention = policy.track_cooldown.max(policy.position_cooldown);
        Self {
            policy,
            cooldowns: CooldownTable::new(table_capacity, retention),
        }
    }

    pub fn policy(&self) -> &DetectionPolicy {
        &self.policy
    }

    /// Decide whether `detection` becomes an event at `now`.
    ///
    /// A tracked detection claims its track's cooldown window before the size
    /// check, so a small sighting still suppresses the same track for the
    /// full window. Untracked boxes are size-checked first and undersized
    /// ones never claim a position slot. Emitting records `now` for the key.
    pub fn evaluate(
        &mut self,
        detection: &Detection,
        params: &LetterboxParams,
        now: Instant,
    ) -> Verdict {
        if detection.class_id != self.policy.class_id {
            return Verdict::Rejected(RejectReason::WrongClass);
        }
        if detection.confidence.is_nan()
            || detection.confidence <= self.policy.confidence_threshold
        {
            return Verdict::Rejected(RejectReason::LowConfidence);
        }

        let source_bbox = params.unletterbox(&detection.bbox);
        let large_enough = source_bbox.area() >= self.policy.min_box_area;

        match detection.track_id {
            Some(track_id) => {
                let key = CooldownKey::track(detection.class_id, track_id);
                if !self.cooldowns.try_emit(key, self.policy.track_cooldown, now) {
                    return Verdict::Rejected(RejectReason::CoolingDown);
                }
                if !large_enough {
                    return Verdict::Rejected(RejectReason::TooSmall);
                }
            }
            None => {
                if !large_enough {
                    return Verdict::Rejected(RejectReason::TooSmall);
                }
                let key = CooldownKey::position(detection.class_id, &detection.bbox);
                if !self.cooldowns.try_emit(key, self.policy.position_cooldown, now) {
                    return Verdict::Rejected(RejectReason::CoolingDown);
                }
            }
        }

        Verdict::Emit { source_bbox }
    }

    pub fn tracked_keys(&self) -> usize {
        self.cooldowns.len()
    }
}
