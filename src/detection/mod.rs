//! Per-camera detection: frame sampling, filtering, snapshots and event emission.

mod policy;
mod snapshot;
mod worker;

#[cfg(test)]
mod tests;

pub use policy::{DetectionFilter, DetectionPolicy, RejectReason, Verdict};
pub use snapshot::SnapshotStore;
pub use worker::{DetectionDeps, DetectionWorker, WorkerTimings};
