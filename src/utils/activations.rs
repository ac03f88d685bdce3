//! Activation functions for network layers
//!
//! This module provides the element-wise activations used by the layers:
//! - ReLU and its derivative (hidden activations)
//! - Softmax (output layer), with max subtraction for numerical stability

/// ReLU activation: `max(0, x)`.
pub fn relu(x: f64) -> f64 {
    if x > 0.0 {
        x
    } else {
        0.0
    }
}

/// ReLU derivative with respect to its input (0 at the kink).
pub fn relu_derivative(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Softmax over a slice of logits.
///
/// Subtracts the maximum before exponentiation so large logits cannot
/// overflow. An empty slice yields an empty vector.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max_value = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut output: Vec<f64> = logits.iter().map(|&x| (x - max_value).exp()).collect();
    let sum: f64 = output.iter().sum();
    let inv_sum = 1.0 / sum;
    for value in output.iter_mut() {
        *value *= inv_sum;
    }
    output
}
