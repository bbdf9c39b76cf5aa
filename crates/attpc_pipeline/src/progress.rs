//! Progress reporting (§5: "a multi-producer queue"), kept deliberately
//! separate from `tracing` logging: this channel is the in-scope C10
//! interface an embedding UI or CLI renders a progress bar from, while
//! logging is for developers. `std::sync::mpsc` is a literal
//! multi-producer, single-consumer channel, so many worker threads can
//! report without contending on a lock.

use std::sync::mpsc::{self, Receiver, Sender};

/// One phase's identity, for tagging progress and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PointCloud,
    Cluster,
    Estimate,
    Solve,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::PointCloud => "phase1_point_cloud",
            Phase::Cluster => "phase2_cluster",
            Phase::Estimate => "phase3_estimate",
            Phase::Solve => "phase4_solve",
        }
    }
}

/// A single progress update. `total` is the number of events the
/// current phase was asked to process; `completed` counts events
/// finished so far, success or soft-rejection alike.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub phase: Phase,
    pub event_id: i64,
    pub completed: usize,
    pub total: usize,
}

/// The worker-side handle: cheap to clone, one per worker thread.
#[derive(Clone)]
pub struct ProgressReporter {
    sender: Sender<ProgressUpdate>,
}

impl ProgressReporter {
    /// Sends an update. Send failure (consumer dropped the receiver)
    /// is not a pipeline error -- progress reporting is best-effort.
    pub fn report(&self, update: ProgressUpdate) {
        let _ = self.sender.send(update);
    }
}

/// Builds a fresh progress channel: a `ProgressReporter` for workers to
/// clone and a `Receiver` for the embedding consumer to drain.
pub fn channel() -> (ProgressReporter, Receiver<ProgressUpdate>) {
    let (sender, receiver) = mpsc::channel();
    (ProgressReporter { sender }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporter_clones_share_one_channel() {
        let (reporter, receiver) = channel();
        let other = reporter.clone();
        reporter.report(ProgressUpdate {
            phase: Phase::PointCloud,
            event_id: 1,
            completed: 1,
            total: 2,
        });
        other.report(ProgressUpdate {
            phase: Phase::PointCloud,
            event_id: 2,
            completed: 2,
            total: 2,
        });
        drop(reporter);
        drop(other);
        let updates: Vec<_> = receiver.iter().collect();
        assert_eq!(updates.len(), 2);
    }

    #[test]
    fn report_after_receiver_dropped_does_not_panic() {
        let (reporter, receiver) = channel();
        drop(receiver);
        reporter.report(ProgressUpdate {
            phase: Phase::Solve,
            event_id: 1,
            completed: 1,
            total: 1,
        });
    }
}
