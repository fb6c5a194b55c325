use std::time::Duration;

use log::info;
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::synchronization::{LossLabel, ProgressBoard, WorkerReport};

/// Spawns a task logging the board every `every`, at least a millisecond, until `stop` fires.
pub fn spawn_reporter(
    board: ProgressBoard,
    every: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    for report in board.snapshot() {
                        info!("{}", format_report(&report));
                    }
                }
            }
        }
    })
}

/// Renders one line of the progress table.
pub fn format_report(report: &WorkerReport) -> String {
    let (done, total) = report.progress;

    let status = if report.finished {
        "finished"
    } else if report.waiting {
        "waiting"
    } else {
        "training"
    };

    let loss = match report.losses.iter().next_back() {
        Some((LossLabel::Final, loss)) => format!("final loss {loss:.4}"),
        Some((LossLabel::Batch(i), loss)) => format!("loss {loss:.4} at batch {i}"),
        None => "no loss yet".to_string(),
    };

    format!("{}: {done}/{total} batches, {status}, {loss}", report.worker)
}
