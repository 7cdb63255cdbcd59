use crate::batch::BatchReport;
use serde::Serialize;
use std::sync::mpsc::{self, Receiver, Sender};

/// Sink for batch and fetch status. Implementations must return promptly; the
/// orchestrator calls these from its own thread between process polls.
pub trait Reporter: Send + Sync {
    fn batch_started(&self, total: usize);
    /// `index` is 1-based.
    fn job_starting(&self, index: usize, total: usize);
    fn job_progress(&self, percent: u8);
    /// When `report.cancelled` is set the sink should not present a
    /// success/failure summary.
    fn batch_finished(&self, report: &BatchReport);
    fn notify_failure(&self, message: &str);
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReporterEvent {
    BatchStarted { total: usize },
    JobStarting { index: usize, total: usize },
    JobProgress { percent: u8 },
    BatchFinished { report: BatchReport },
    Failure { message: String },
}

/// Forwards every call as a `ReporterEvent`. Sends never block; events are
/// dropped once the receiving side is gone.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: Sender<ReporterEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, Receiver<ReporterEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ReporterEvent) {
        let _ = self.tx.send(event);
    }
}

impl Reporter for ChannelReporter {
    fn batch_started(&self, total: usize) {
        self.send(ReporterEvent::BatchStarted { total });
    }

    fn job_starting(&self, index: usize, total: usize) {
        self.send(ReporterEvent::JobStarting { index, total });
    }

    fn job_progress(&self, percent: u8) {
        self.send(ReporterEvent::JobProgress { percent });
    }

    fn batch_finished(&self, report: &BatchReport) {
        self.send(ReporterEvent::BatchFinished {
            report: report.clone(),
        });
    }

    fn notify_failure(&self, message: &str) {
        self.send(ReporterEvent::Failure {
            message: message.to_string(),
        });
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn batch_started(&self, _total: usize) {}
    fn job_starting(&self, _index: usize, _total: usize) {}
    fn job_progress(&self, _percent: u8) {}
    fn batch_finished(&self, _report: &BatchReport) {}
    fn notify_failure(&self, _message: &str) {}
}
