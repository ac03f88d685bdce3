//! Learning rate scheduler trait and implementations
//!
//! This module defines the LRScheduler trait for adjusting learning rates between
//! epochs. A scheduler is normally stepped from the epoch-done hook passed to
//! [`Network::fit`](crate::network::Network::fit).

use std::f64::consts::PI;

/// Core trait for learning rate schedulers.
///
/// Schedulers adjust the learning rate during training based on the current epoch.
///
/// # Example
///
/// ```
/// use rust_cnn::utils::lr_scheduler::{LRScheduler, StepDecay};
///
/// let mut scheduler = StepDecay::new(0.1, 3, 0.5);
/// for _ in 0..3 {
///     scheduler.step();
/// }
/// assert!((scheduler.get_lr() - 0.05).abs() < 1e-12);
///
/// scheduler.reset();
/// assert_eq!(scheduler.get_lr(), 0.1);
/// ```
pub trait LRScheduler: Send {
    /// Learning rate for the current epoch.
    fn get_lr(&self) -> f64;

    /// Advance to the next epoch. Call once at the end of every epoch.
    fn step(&mut self);

    /// Return to the initial learning rate and epoch 0.
    fn reset(&mut self);
}

/// Step decay learning rate scheduler.
///
/// Multiplies the learning rate by `gamma` every `step_size` epochs.
///
/// Formula: lr = initial_lr * gamma^(epoch / step_size)
#[derive(Debug, Clone)]
pub struct StepDecay {
    initial_lr: f64,
    step_size: usize,
    gamma: f64,
    current_epoch: usize,
    current_lr: f64,
}

impl StepDecay {
    /// Creates a new step decay scheduler. A `step_size` of 0 is treated as 1.
    pub fn new(initial_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            initial_lr,
            step_size: step_size.max(1),
            gamma,
            current_epoch: 0,
            current_lr: initial_lr,
        }
    }
}

impl LRScheduler for StepDecay {
    fn get_lr(&self) -> f64 {
        self.current_lr
    }

    fn step(&mut self) {
        self.current_epoch += 1;
        let num_decays = self.current_epoch / self.step_size;
        self.current_lr = self.initial_lr * self.gamma.powi(num_decays as i32);
    }

    fn reset(&mut self) {
        self.current_epoch = 0;
        self.current_lr = self.initial_lr;
    }
}

/// Exponential decay learning rate scheduler.
///
/// Formula: lr = initial_lr * gamma^epoch
#[derive(Debug, Clone)]
pub struct ExponentialDecay {
    initial_lr: f64,
    gamma: f64,
    current_epoch: usize,
    current_lr: f64,
}

impl ExponentialDecay {
    pub fn new(initial_lr: f64, gamma: f64) -> Self {
        Self {
            initial_lr,
            gamma,
            current_epoch: 0,
            current_lr: initial_lr,
        }
    }
}

impl LRScheduler for ExponentialDecay {
    fn get_lr(&self) -> f64 {
        self.current_lr
    }

    fn step(&mut self) {
        self.current_epoch += 1;
        self.current_lr = self.initial_lr * self.gamma.powi(self.current_epoch as i32);
    }

    fn reset(&mut self) {
        self.current_epoch = 0;
        self.current_lr = self.initial_lr;
    }
}

/// Cosine annealing from `initial_lr` down to `min_lr` over `t_max` epochs.
///
/// Formula: lr = min_lr + (initial_lr - min_lr) * (1 + cos(pi * epoch / t_max)) / 2
///
/// The rate stays at `min_lr` once `epoch >= t_max`.
#[derive(Debug, Clone)]
pub struct CosineAnnealing {
    initial_lr: f64,
    min_lr: f64,
    t_max: usize,
    current_epoch: usize,
    current_lr: f64,
}

impl CosineAnnealing {
    pub fn new(initial_lr: f64, min_lr: f64, t_max: usize) -> Self {
        Self {
            initial_lr,
            min_lr,
            t_max: t_max.max(1),
            current_epoch: 0,
            current_lr: initial_lr,
        }
    }
}

impl LRScheduler for CosineAnnealing {
    fn get_lr(&self) -> f64 {
        self.current_lr
    }

    fn step(&mut self) {
        self.current_epoch += 1;
        let progress = self.current_epoch.min(self.t_max) as f64 / self.t_max as f64;
        self.current_lr =
            self.min_lr + (self.initial_lr - self.min_lr) * (1.0 + (PI * progress).cos()) / 2.0;
    }

    fn reset(&mut self) {
        self.current_epoch = 0;
        self.current_lr = self.initial_lr;
    }
}
