//! Per epoch learning rate schedules interpolated on a log10 scale.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::ConfigErr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePlan {
    /// Linear interpolation of `log10(lr)`.
    #[default]
    LogLinear,
    /// Half cosine interpolation of `log10(lr)`.
    LogCosine,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningRateScheduler {
    period: f64,
    log_start: f64,
    log_end: f64,
    plan: SchedulePlan,
}

impl LearningRateScheduler {
    /// Creates a new `LearningRateScheduler`.
    ///
    /// # Arguments
    /// * `total_epochs` - The amount of epochs the schedule spans.
    /// * `lr_start` - The learning rate of the first epoch.
    /// * `lr_end` - The learning rate the schedule tends to.
    /// * `plan` - The interpolation between both rates.
    /// * `restarts` - How many times the schedule starts over, splitting `total_epochs` in
    ///   `restarts + 1` equal periods.
    ///
    /// # Returns
    /// A new `LearningRateScheduler` or a `ConfigErr` if any argument is out of range.
    pub fn new(
        total_epochs: usize,
        lr_start: f32,
        lr_end: f32,
        plan: SchedulePlan,
        restarts: usize,
    ) -> Result<Self, ConfigErr> {
        if total_epochs == 0 {
            return Err(ConfigErr::Schedule("the schedule spans no epoch".into()));
        }

        if restarts >= total_epochs {
            return Err(ConfigErr::Schedule(format!(
                "{restarts} restarts do not fit in {total_epochs} epochs"
            )));
        }

        for (name, lr) in [("lr_start", lr_start), ("lr_end", lr_end)] {
            if !lr.is_finite() || lr <= 0.0 {
                return Err(ConfigErr::Hyperparameter { name, value: lr });
            }
        }

        Ok(Self {
            period: total_epochs as f64 / (restarts + 1) as f64,
            log_start: f64::from(lr_start).log10(),
            log_end: f64::from(lr_end).log10(),
            plan,
        })
    }

    /// Returns the learning rate of the given epoch.
    pub fn get_lr(&self, epoch: usize) -> f32 {
        let t = epoch as f64 % self.period;

        let exp = match self.plan {
            SchedulePlan::LogLinear => {
                (self.log_end - self.log_start) / self.period * t + self.log_start
            }
            SchedulePlan::LogCosine => {
                ((PI * t / self.period).cos() / 2.0 + 0.5) * (self.log_start - self.log_end).abs()
                    + self.log_end
            }
        };

        10f64.powf(exp) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-6 * b.abs().max(1.0)
    }

    #[test]
    fn log_linear_walks_decades() {
        let sched = LearningRateScheduler::new(4, 1e-1, 1e-5, SchedulePlan::LogLinear, 0).unwrap();
        assert!(close(sched.get_lr(0), 1e-1));
        assert!(close(sched.get_lr(1), 1e-2));
        assert!(close(sched.get_lr(3), 1e-4));
    }

    #[test]
    fn log_cosine_starts_high_and_halves_the_exponent_midway() {
        let sched = LearningRateScheduler::new(4, 1e-1, 1e-3, SchedulePlan::LogCosine, 0).unwrap();
        assert!(close(sched.get_lr(0), 1e-1));
        assert!(close(sched.get_lr(2), 1e-2));
    }

    #[test]
    fn restarts_repeat_the_period() {
        let sched = LearningRateScheduler::new(6, 1.0, 1e-3, SchedulePlan::LogLinear, 1).unwrap();
        assert!(close(sched.get_lr(1), sched.get_lr(4)));
        assert!(close(sched.get_lr(3), 1.0));
    }

    #[test]
    fn rejects_out_of_range_arguments() {
        assert!(LearningRateScheduler::new(0, 1.0, 0.1, SchedulePlan::LogLinear, 0).is_err());
        assert!(LearningRateScheduler::new(2, 1.0, 0.1, SchedulePlan::LogLinear, 2).is_err());
        assert!(LearningRateScheduler::new(2, 0.0, 0.1, SchedulePlan::LogCosine, 0).is_err());
    }
}
