mod error;

use std::{fs, num::NonZeroUsize, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

pub use error::ConfigErr;

use crate::{aggregation::WeightingScheme, optimization::OptimizerSpec, schedule::SchedulePlan};

/// Which submissions a synchronization round averages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeScope {
    /// The latest model of every worker that has submitted at least once, finished
    /// workers and stragglers included.
    #[default]
    Retained,
    /// Only the workers blocked on the barrier when the round resolves.
    WaitingOnly,
}

/// Settings of the federated coordination engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederatedConfig {
    /// Local batches between two synchronization points.
    pub sync_every_n_batch: usize,
    /// Seconds between the "still waiting" wakeups of a worker blocked on the barrier.
    pub wait_interval: f64,
    /// Keeps momentum and moment estimates across merges instead of rebuilding the optimizer.
    #[serde(alias = "keep_optim_dict")]
    pub keep_optimizer_state: bool,
    pub repetitions_dataset: usize,
    pub weighting: WeightingScheme,
    pub merge_scope: MergeScope,
    /// Periodically logs the progress board while an epoch runs.
    pub verbose: bool,
    /// Seconds between two progress reports.
    pub report_interval: f64,
}

impl Default for FederatedConfig {
    fn default() -> Self {
        Self {
            sync_every_n_batch: 10,
            wait_interval: 0.1,
            keep_optimizer_state: false,
            repetitions_dataset: 1,
            weighting: WeightingScheme::Uniform,
            merge_scope: MergeScope::Retained,
            verbose: false,
            report_interval: 1.0,
        }
    }
}

impl FederatedConfig {
    pub fn validate(&self) -> Result<(), ConfigErr> {
        if self.sync_every_n_batch == 0 {
            return Err(ConfigErr::SyncInterval(self.sync_every_n_batch));
        }

        for secs in [self.wait_interval, self.report_interval] {
            interval(secs)?;
        }

        if self.repetitions_dataset == 0 {
            return Err(ConfigErr::Repetitions);
        }

        Ok(())
    }

    /// The interval a barrier wait wakes up at to log that it is still waiting.
    pub fn poll_interval(&self) -> Duration {
        interval(self.wait_interval).unwrap_or(DEFAULT_INTERVAL)
    }

    pub fn report_interval(&self) -> Duration {
        interval(self.report_interval).unwrap_or(DEFAULT_INTERVAL)
    }
}

/// Fallback for intervals that bypassed `validate`.
const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Converts seconds into a timer period, which must be representable and non-zero.
fn interval(secs: f64) -> Result<Duration, ConfigErr> {
    match Duration::try_from_secs_f64(secs) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(ConfigErr::WaitInterval(secs)),
    }
}

/// Learning rate schedule applied once per epoch, starting from the optimizer's rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub lr_end: f32,
    #[serde(default)]
    pub plan: SchedulePlan,
    #[serde(default)]
    pub restarts: usize,
}

/// The full configuration of a federated training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub optimizer: OptimizerSpec,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
    #[serde(default)]
    pub federated: FederatedConfig,
}

impl TrainingConfig {
    /// Parses and validates a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigErr> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigErr> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigErr> {
        self.federated.validate()?;
        self.optimizer.validate()?;
        self.effective_epochs()?;

        if let Some(schedule) = self.schedule {
            if !schedule.lr_end.is_finite() || schedule.lr_end <= 0.0 {
                return Err(ConfigErr::Hyperparameter {
                    name: "lr_end",
                    value: schedule.lr_end,
                });
            }
        }

        Ok(())
    }

    /// The amount of epochs to run once every epoch walks the dataset
    /// `repetitions_dataset` times.
    pub fn effective_epochs(&self) -> Result<NonZeroUsize, ConfigErr> {
        let epochs = self.epochs.get();
        let repetitions = self.federated.repetitions_dataset;

        if repetitions == 0 {
            return Err(ConfigErr::Repetitions);
        }

        NonZeroUsize::new(epochs / repetitions).ok_or(ConfigErr::Epochs {
            epochs,
            repetitions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = FederatedConfig::default();
        assert_eq!(config.sync_every_n_batch, 10);
        assert!((config.poll_interval().as_secs_f64() - 0.1).abs() < 1e-9);
        assert!(!config.keep_optimizer_state);
        assert_eq!(config.merge_scope, MergeScope::Retained);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_json_with_aliases() {
        let config = TrainingConfig::from_json_str(
            r#"{
                "epochs": 6,
                "batch_size": 32,
                "federated": {
                    "sync_every_n_batch": 4,
                    "keep_optim_dict": true,
                    "repetitions_dataset": 2,
                    "weighting": "proportional",
                    "merge_scope": "waiting_only"
                }
            }"#,
        )
        .unwrap();

        assert!(config.federated.keep_optimizer_state);
        assert_eq!(config.federated.weighting, WeightingScheme::Proportional);
        assert_eq!(config.federated.merge_scope, MergeScope::WaitingOnly);
        assert_eq!(config.federated.wait_interval, 0.1);
        assert_eq!(config.effective_epochs().unwrap().get(), 3);
        assert_eq!(config.optimizer, OptimizerSpec::default());
    }

    #[test]
    fn rejects_zero_sync_interval() {
        let config = FederatedConfig {
            sync_every_n_batch: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigErr::SyncInterval(0))));
    }

    #[test]
    fn rejects_intervals_timers_cannot_use() {
        for secs in [1e-10, 1e30, 0.0, -1.0, f64::NAN] {
            let config = FederatedConfig {
                wait_interval: secs,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(ConfigErr::WaitInterval(_))));

            let config = FederatedConfig {
                report_interval: secs,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(ConfigErr::WaitInterval(_))));
        }

        let config = FederatedConfig {
            wait_interval: 1e-10,
            report_interval: 1e30,
            ..Default::default()
        };
        assert!(!config.poll_interval().is_zero());
        assert!(!config.report_interval().is_zero());
    }

    #[test]
    fn rejects_unknown_weighting_scheme() {
        let res = TrainingConfig::from_json_str(
            r#"{"epochs": 1, "batch_size": 1, "federated": {"weighting": "by_vibes"}}"#,
        );
        assert!(matches!(res, Err(ConfigErr::Parse(_))));
    }

    #[test]
    fn rejects_repetitions_exceeding_epochs() {
        let res = TrainingConfig::from_json_str(
            r#"{"epochs": 1, "batch_size": 1, "federated": {"repetitions_dataset": 3}}"#,
        );
        assert!(matches!(
            res,
            Err(ConfigErr::Epochs {
                epochs: 1,
                repetitions: 3
            })
        ));
    }
}
