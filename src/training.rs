/**
 * LowRank
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use serde_derive::Serialize;
use tracing::info;

use crate::error::{ConfigError, Result, ShapeError};

/// Hyperparameters of a gradient descent run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrainingConfig {
    /// Number of full-batch updates, the loop always runs all of them
    pub steps: usize,
    /// Loss is reported every `epoch_size` steps
    pub epoch_size: usize,
    pub regularization: f64,
    pub learning_rate: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            steps: 100,
            epoch_size: 10,
            regularization: 0.03,
            learning_rate: 1e-5,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.epoch_size == 0 {
            return Err(ConfigError::ZeroEpochSize);
        }
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(ConfigError::InvalidRegularization(self.regularization));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::InvalidLearningRate(self.learning_rate));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LossReport {
    /// Masked squared error plus the regularization penalty
    pub total: f64,
    /// `total` divided by the number of cells of the rating matrix
    pub per_cell: f64,
    /// RMSE over held-out ratings, `None` if there is nothing to evaluate against. A perfect fit
    /// is `Some(0.0)`.
    pub test_rmse: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub step: usize,
    pub loss: LossReport,
}

/// Receives a report at every epoch boundary of a training run.
pub trait Reporter {
    fn report(&mut self, report: &EpochReport);
}

impl<F> Reporter for F where F: FnMut(&EpochReport) {
    fn report(&mut self, report: &EpochReport) {
        self(report)
    }
}

/// Emits epoch reports as `tracing` events.
#[derive(Debug, Clone, Default)]
pub struct LogReporter {
    label: String,
}

impl LogReporter {
    pub fn new(label: &str) -> Self {
        LogReporter { label: label.to_string() }
    }
}

impl Reporter for LogReporter {
    fn report(&mut self, report: &EpochReport) {
        match report.loss.test_rmse {
            Some(rmse) => info!(
                model = %self.label,
                "iteration {:3}: net loss {:5.2} and RMSE {:1.8}",
                report.step,
                report.loss.total,
                rmse,
            ),
            None => info!(
                model = %self.label,
                "iteration {:3}: net loss {:5.2}, avg loss {:1.8}",
                report.step,
                report.loss.total,
                report.loss.per_cell,
            ),
        }
    }
}

/// A model trainable by plain gradient descent.
pub trait GradientDescent {

    fn loss(&self, regularization: f64) -> std::result::Result<LossReport, ShapeError>;

    /// Computes all gradients from the current state, then applies them. A step is atomic: on
    /// error, nothing has been updated.
    fn descend(&mut self, regularization: f64, learning_rate: f64)
        -> std::result::Result<(), ShapeError>;
}

/// Runs `config.steps` descent steps and reports the loss before every step whose index is a
/// multiple of `config.epoch_size`. There is no early stopping. Returns the loss after the last
/// step.
pub fn train<M, R>(model: &mut M, config: &TrainingConfig, reporter: &mut R) -> Result<LossReport>
    where M: GradientDescent + ?Sized,
          R: Reporter + ?Sized {

    config.validate()?;

    for step in 0..config.steps {
        if step % config.epoch_size == 0 {
            let loss = model.loss(config.regularization)?;
            reporter.report(&EpochReport { step, loss });
        }

        model.descend(config.regularization, config.learning_rate)?;
    }

    Ok(model.loss(config.regularization)?)
}

#[cfg(test)]
mod tests {

    use super::*;

    /// f(x) = 0.5 * (x - 3)^2, with the regularization acting as an extra pull towards zero
    struct Parabola {
        x: f64,
    }

    impl GradientDescent for Parabola {
        fn loss(&self, regularization: f64) -> std::result::Result<LossReport, ShapeError> {
            let total = 0.5 * (self.x - 3.0).powi(2) + 0.5 * regularization * self.x * self.x;
            Ok(LossReport { total, per_cell: total, test_rmse: None })
        }

        fn descend(&mut self, regularization: f64, learning_rate: f64)
            -> std::result::Result<(), ShapeError> {
            self.x -= learning_rate * ((self.x - 3.0) + regularization * self.x);
            Ok(())
        }
    }

    #[test]
    fn reports_at_every_epoch_boundary() {
        let mut model = Parabola { x: 0.0 };
        let config = TrainingConfig { steps: 25, epoch_size: 10, regularization: 0.0, learning_rate: 0.5 };

        let mut steps = Vec::new();
        let final_loss = train(&mut model, &config, &mut |report: &EpochReport| steps.push(report.step))
            .unwrap();

        assert_eq!(steps, vec![0, 10, 20]);
        assert!(final_loss.total < 0.01);
        assert!((model.x - 3.0).abs() < 0.1);
    }

    #[test]
    fn zero_steps_leave_the_model_untouched() {
        let mut model = Parabola { x: 1.0 };
        let config = TrainingConfig { steps: 0, ..TrainingConfig::default() };

        let mut num_reports = 0;
        train(&mut model, &config, &mut |_: &EpochReport| num_reports += 1).unwrap();

        assert_eq!(num_reports, 0);
        assert_eq!(model.x, 1.0);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let mut model = Parabola { x: 1.0 };
        let mut reporter = LogReporter::new("parabola");

        let zero_epoch = TrainingConfig { epoch_size: 0, ..TrainingConfig::default() };
        assert!(train(&mut model, &zero_epoch, &mut reporter).is_err());

        let negative_rate = TrainingConfig { learning_rate: -0.1, ..TrainingConfig::default() };
        assert!(train(&mut model, &negative_rate, &mut reporter).is_err());

        let negative_regularization = TrainingConfig { regularization: -1.0, ..TrainingConfig::default() };
        assert_eq!(negative_regularization.validate(), Err(ConfigError::InvalidRegularization(-1.0)));
    }
}
