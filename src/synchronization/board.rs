use std::sync::Arc;

use parking_lot::RwLock;

use super::WorkerReport;
use crate::id::WorkerId;

/// Shared, read mostly snapshot of every worker's progress and losses.
///
/// The coordinator writes to it as messages arrive; anyone holding a clone can read it.
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    reports: Arc<RwLock<Vec<WorkerReport>>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every report, used when a new epoch starts.
    pub fn publish(&self, reports: Vec<WorkerReport>) {
        *self.reports.write() = reports;
    }

    /// Replaces the report of a single worker.
    pub fn update(&self, report: WorkerReport) {
        let mut reports = self.reports.write();
        let i = report.worker.index();

        if i < reports.len() {
            reports[i] = report;
        } else if i == reports.len() {
            reports.push(report);
        }
    }

    pub fn get(&self, worker: WorkerId) -> Option<WorkerReport> {
        self.reports.read().get(worker.index()).cloned()
    }

    pub fn snapshot(&self) -> Vec<WorkerReport> {
        self.reports.read().clone()
    }
}
