//! Loss functions
//!
//! A loss compares a one-hot label with the network's prediction. Its
//! derivative seeds the backward pass.

use crate::error::{CnnError, Result};
use crate::tensor::Tensor;

/// Smallest probability used inside logarithms and divisions.
pub const PROBABILITY_FLOOR: f64 = 1e-12;

/// Loss function trait.
///
/// `loss` returns one value per class; the network sums them into a scalar
/// per sample. `loss_derivative` is the gradient with respect to the
/// prediction and is fed into the last layer's backward pass.
pub trait LossFunction: Send + Sync {
    fn loss(&self, label: &Tensor, prediction: &Tensor) -> Result<Tensor>;

    fn loss_derivative(&self, label: &Tensor, prediction: &Tensor) -> Result<Tensor>;

    /// Scalar loss for one sample.
    fn total_loss(&self, label: &Tensor, prediction: &Tensor) -> Result<f64> {
        Ok(self.loss(label, prediction)?.sum())
    }
}

/// Categorical cross-entropy, `-sum(label * ln(prediction))`.
///
/// The derivative is taken with respect to the probabilities (`-label /
/// prediction`), which pairs with the Jacobian softmax gradient of
/// [`OutputLayer`](crate::layers::OutputLayer).
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss;

fn check_pair(label: &Tensor, prediction: &Tensor) -> Result<()> {
    if label.shape() != prediction.shape() {
        return Err(CnnError::shape_mismatch(
            "loss label/prediction",
            label.shape(),
            prediction.shape(),
        ));
    }
    Ok(())
}

impl LossFunction for CrossEntropyLoss {
    fn loss(&self, label: &Tensor, prediction: &Tensor) -> Result<Tensor> {
        check_pair(label, prediction)?;
        let values = label
            .values()
            .iter()
            .zip(prediction.values())
            .map(|(&y, &p)| if y == 0.0 { 0.0 } else { -y * p.max(PROBABILITY_FLOOR).ln() })
            .collect();
        Tensor::new(label.shape().to_vec(), values)
    }

    fn loss_derivative(&self, label: &Tensor, prediction: &Tensor) -> Result<Tensor> {
        check_pair(label, prediction)?;
        let values = label
            .values()
            .iter()
            .zip(prediction.values())
            .map(|(&y, &p)| -y / p.max(PROBABILITY_FLOOR))
            .collect();
        Tensor::new(label.shape().to_vec(), values)
    }
}
