use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{CoordinationState, ProgressBoard, SyncMsg, SyncOutcome};
use crate::{
    aggregation::{AggregationErr, Weights},
    config::MergeScope,
};

/// The central barrier of an epoch.
///
/// Resolves a round whenever every still training worker is waiting, until the stop signal
/// fires. Then it drains whatever is still queued and runs a last resolution pass so the final
/// models of the workers make it into the merged model.
pub struct SyncCoordinator {
    state: CoordinationState,
    rx: mpsc::UnboundedReceiver<SyncMsg>,
    weights: Weights,
    scope: MergeScope,
    board: ProgressBoard,
    stop: CancellationToken,
}

impl SyncCoordinator {
    /// Creates a new `SyncCoordinator`.
    ///
    /// # Arguments
    /// * `totals` - The amount of local batches of every worker, indexed by worker id.
    /// * `weights` - The weight of every worker in a merge.
    /// * `scope` - Which submissions a round merges.
    /// * `board` - Where worker progress is published.
    /// * `stop` - Set once every worker joined.
    ///
    /// # Returns
    /// The coordinator and the sender workers talk to it through.
    pub fn new(
        totals: &[usize],
        weights: Weights,
        scope: MergeScope,
        board: ProgressBoard,
        stop: CancellationToken,
    ) -> (Self, mpsc::UnboundedSender<SyncMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = CoordinationState::new(totals);
        board.publish(state.reports());

        let coordinator = Self {
            state,
            rx,
            weights,
            scope,
            board,
            stop,
        };

        (coordinator, tx)
    }

    /// Runs the coordinator until the stop signal.
    ///
    /// # Returns
    /// The final merged model, round count and worker reports, or the `AggregationErr` that
    /// made a round impossible. Workers waiting on a failed round see their reply dropped.
    pub async fn run(mut self) -> Result<SyncOutcome, AggregationErr> {
        loop {
            tokio::select! {
                biased;
                msg = self.rx.recv() => match msg {
                    Some(msg) => {
                        self.apply(msg);
                        if self.state.round_ready() {
                            self.resolve()?;
                        }
                    }
                    None => {
                        self.stop.cancelled().await;
                        break;
                    }
                },
                _ = self.stop.cancelled() => break,
            }
        }

        while let Ok(msg) = self.rx.try_recv() {
            self.apply(msg);
        }

        debug!("stop signal received, running the final round");
        self.resolve()?;

        info!(
            "synchronization finished after {} rounds",
            self.state.rounds()
        );

        Ok(self.state.into_outcome())
    }

    fn apply(&mut self, msg: SyncMsg) {
        let worker = msg.worker();

        match msg {
            SyncMsg::Progress { batch, total, .. } => {
                self.state.record_progress(worker, batch, total);
            }
            SyncMsg::Submit {
                batch,
                model,
                loss,
                reply,
                ..
            } => {
                debug!(worker = worker.index(), batch = batch; "joined the barrier");
                self.state.submit(worker, batch, model, loss, reply);
            }
            SyncMsg::Finish {
                model, loss, total, ..
            } => {
                debug!(worker = worker.index(); "finished {total} batches, loss {loss}");
                self.state.finish(worker, model, loss, total);
            }
        }

        if let Some(report) = self.state.report(worker) {
            self.board.update(report);
        }
    }

    fn resolve(&mut self) -> Result<(), AggregationErr> {
        let round = self.state.resolve(&self.weights, self.scope).map_err(|e| {
            warn!("aggregation failed: {e}");
            e
        })?;

        debug!(
            "round {} merged {:?}, released {:?}",
            self.state.rounds(),
            round.merged,
            round.released
        );

        for worker in round.released {
            if let Some(report) = self.state.report(worker) {
                self.board.update(report);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use ndarray::arr1;
    use tokio::sync::oneshot;

    use super::*;
    use crate::{id::WorkerId, model::ModelState};

    const A: WorkerId = WorkerId::new(0);
    const B: WorkerId = WorkerId::new(1);

    fn state(probe: f32) -> ModelState {
        let mut s = ModelState::new();
        s.insert("probe", arr1(&[probe]).into_dyn());
        s
    }

    #[tokio::test]
    async fn stop_terminates_idle_coordinator() {
        let stop = CancellationToken::new();
        let (coordinator, _tx) = SyncCoordinator::new(
            &[3, 3],
            Weights::uniform([A, B]),
            MergeScope::Retained,
            ProgressBoard::new(),
            stop.clone(),
        );

        let task = tokio::spawn(coordinator.run());
        stop.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome.rounds, 0);
        assert!(outcome.merged.is_none());
    }

    #[tokio::test]
    async fn stop_releases_stragglers_in_final_round() {
        let stop = CancellationToken::new();
        let board = ProgressBoard::new();
        let (coordinator, tx) = SyncCoordinator::new(
            &[3, 3],
            Weights::uniform([A, B]),
            MergeScope::Retained,
            board.clone(),
            stop.clone(),
        );

        let (reply, rx) = oneshot::channel();
        tx.send(SyncMsg::Submit {
            worker: A,
            batch: 2,
            model: state(4.),
            loss: 1.,
            reply,
        })
        .unwrap();

        let task = tokio::spawn(coordinator.run());
        stop.cancel();

        let merged: Arc<ModelState> = rx.await.unwrap();
        assert_eq!(merged.get("probe").unwrap()[[0]], 4.);

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.rounds, 1);
        assert_eq!(board.get(A).unwrap().progress, (2, 3));
    }
}
