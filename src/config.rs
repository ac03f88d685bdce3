//! Configuration structures for training
//!
//! This module provides configuration structures for setting up training parameters:
//! the learning rate, epoch count and progress logging, plus an optional learning
//! rate scheduler applied between epochs.

use crate::error::{CnnError, Result};
use crate::network::FitOptions;
use crate::utils::lr_scheduler::{CosineAnnealing, ExponentialDecay, LRScheduler, StepDecay};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Scheduler names accepted in `scheduler_type`.
pub const SCHEDULER_TYPES: [&str; 4] = ["constant", "step_decay", "exponential", "cosine_annealing"];

/// Configuration for training, including the learning rate scheduler.
///
/// This structure is used to parse training configuration from JSON files.
/// Every field has a default, so `{}` is a valid configuration. Different
/// scheduler types require different optional fields:
///
/// - **StepDecay**: Requires `step_size` and `gamma`
/// - **ExponentialDecay**: Requires `decay_rate`
/// - **CosineAnnealing**: Requires `min_lr` and `T_max`
///
/// # Example
///
/// ```json
/// {
///   "learning_rate": 0.01,
///   "epochs": 20,
///   "verbose": true,
///   "log_interval": 500,
///   "seed": 7,
///   "scheduler_type": "step_decay",
///   "step_size": 3,
///   "gamma": 0.5
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[allow(non_snake_case)]
pub struct TrainingConfig {
    /// Initial learning rate
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Number of passes over the training data
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Accepted for compatibility; training is per sample
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Emit running loss/accuracy through `tracing`
    #[serde(default)]
    pub verbose: bool,

    /// Samples between progress lines
    #[serde(default = "default_log_interval")]
    pub log_interval: usize,

    /// Seed for weight initialization and shuffling, applied by
    /// [`build_network_from_config`](crate::architecture::build_network_from_config)
    pub seed: Option<u64>,

    /// Type of learning rate scheduler: "constant", "step_decay", "exponential", or "cosine_annealing"
    pub scheduler_type: Option<String>,

    /// Step size for StepDecay scheduler (epochs between LR reductions)
    pub step_size: Option<usize>,

    /// Multiplicative factor for StepDecay scheduler (LR multiplier)
    pub gamma: Option<f64>,

    /// Decay rate for ExponentialDecay scheduler (per-epoch multiplier)
    pub decay_rate: Option<f64>,

    /// Minimum learning rate for CosineAnnealing scheduler
    pub min_lr: Option<f64>,

    /// Total number of epochs for CosineAnnealing scheduler
    pub T_max: Option<usize>,
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_epochs() -> usize {
    10
}

fn default_batch_size() -> usize {
    1
}

fn default_log_interval() -> usize {
    100
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            verbose: false,
            log_interval: default_log_interval(),
            seed: None,
            scheduler_type: None,
            step_size: None,
            gamma: None,
            decay_rate: None,
            min_lr: None,
            T_max: None,
        }
    }
}

impl TrainingConfig {
    /// Options for [`Network::fit`](crate::network::Network::fit).
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            epochs: self.epochs,
            batch_size: self.batch_size,
            verbose: self.verbose,
            log_interval: self.log_interval,
        }
    }

    /// Builds the configured scheduler, starting from `learning_rate`.
    ///
    /// Returns `Ok(None)` when no scheduler (or "constant") is configured.
    pub fn scheduler(&self) -> Result<Option<Box<dyn LRScheduler>>> {
        let Some(kind) = self.scheduler_type.as_deref() else {
            return Ok(None);
        };
        let lr = self.learning_rate;
        let scheduler: Box<dyn LRScheduler> = match kind {
            "constant" => return Ok(None),
            "step_decay" => Box::new(StepDecay::new(
                lr,
                require(self.step_size, "step_decay", "step_size")?,
                require(self.gamma, "step_decay", "gamma")?,
            )),
            "exponential" => Box::new(ExponentialDecay::new(
                lr,
                require(self.decay_rate, "exponential", "decay_rate")?,
            )),
            "cosine_annealing" => Box::new(CosineAnnealing::new(
                lr,
                require(self.min_lr, "cosine_annealing", "min_lr")?,
                require(self.T_max, "cosine_annealing", "T_max")?,
            )),
            other => return Err(unknown_scheduler(other)),
        };
        Ok(Some(scheduler))
    }
}

fn require<T>(value: Option<T>, scheduler: &str, field: &str) -> Result<T> {
    value.ok_or_else(|| CnnError::InvalidConfig(format!("{scheduler} scheduler requires {field}")))
}

fn unknown_scheduler(name: &str) -> CnnError {
    CnnError::InvalidConfig(format!(
        "Invalid scheduler type '{}'. Must be one of: {}",
        name,
        SCHEDULER_TYPES.join(", ")
    ))
}

/// Loads a training configuration from a JSON file.
///
/// Reads the file at `path` and deserializes its JSON contents into a `TrainingConfig`.
///
/// # Returns
///
/// `Ok(TrainingConfig)` on success, `CnnError::Io` / `CnnError::Json` if the file cannot
/// be read or parsed, and `CnnError::InvalidConfig` if a value is out of range.
///
/// # Examples
///
/// ```no_run
/// use rust_cnn::config::load_config;
///
/// let cfg = load_config("training.json").unwrap();
/// assert!(cfg.learning_rate > 0.0);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    let config: TrainingConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks value ranges and the scheduler name.
pub fn validate_config(config: &TrainingConfig) -> Result<()> {
    if !(config.learning_rate > 0.0 && config.learning_rate.is_finite()) {
        return Err(CnnError::InvalidConfig(
            "learning_rate must be positive".to_string(),
        ));
    }

    if config.batch_size == 0 {
        return Err(CnnError::InvalidConfig(
            "batch_size must be at least 1".to_string(),
        ));
    }

    if config.log_interval == 0 {
        return Err(CnnError::InvalidConfig(
            "log_interval must be at least 1".to_string(),
        ));
    }

    if let Some(gamma) = config.gamma {
        if gamma < 0.0 {
            return Err(CnnError::InvalidConfig(
                "gamma must be non-negative".to_string(),
            ));
        }
    }

    if let Some(decay_rate) = config.decay_rate {
        if decay_rate < 0.0 {
            return Err(CnnError::InvalidConfig(
                "decay_rate must be non-negative".to_string(),
            ));
        }
    }

    if let Some(min_lr) = config.min_lr {
        if min_lr < 0.0 {
            return Err(CnnError::InvalidConfig(
                "min_lr must be non-negative".to_string(),
            ));
        }
    }

    if let Some(ref kind) = config.scheduler_type {
        if !SCHEDULER_TYPES.contains(&kind.as_str()) {
            return Err(unknown_scheduler(kind));
        }
    }

    Ok(())
}
