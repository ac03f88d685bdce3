//! Shared utilities for network implementations
//!
//! This module provides activation functions and learning-rate schedulers used
//! by the layers and by training loops.

pub mod activations;
pub mod lr_scheduler;
