//! Softmax output layer
//!
//! Turns the final activations into a probability distribution. The backward
//! pass expects the gradient of the loss with respect to the probabilities (as
//! produced by [`CrossEntropyLoss`](crate::loss::CrossEntropyLoss)).

use crate::error::Result;
use crate::layers::{check_shape, recorded, Layer};
use crate::tensor::Tensor;
use crate::utils::activations::softmax;
use serde::Deserialize;

/// How the output layer differentiates the softmax.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftmaxGradient {
    /// Full Jacobian-vector product: `s_i * (g_i - sum_j g_j * s_j)`.
    ///
    /// Combined with the cross-entropy derivative `-y / s` this is exactly
    /// `s - y` for a one-hot label.
    #[default]
    Jacobian,
    /// Diagonal of the Jacobian only: `s_i * (1 - s_i) * g_i`.
    ///
    /// Drops the cross terms between classes.
    Diagonal,
}

/// Softmax over every element of its input.
#[derive(Debug, Clone)]
pub struct OutputLayer {
    shape: Vec<usize>,
    gradient_mode: SoftmaxGradient,
    recent_output: Option<Tensor>,
}

impl OutputLayer {
    pub fn new(shape: &[usize]) -> Self {
        Self::with_gradient(shape, SoftmaxGradient::default())
    }

    pub fn with_gradient(shape: &[usize], gradient_mode: SoftmaxGradient) -> Self {
        Self {
            shape: shape.to_vec(),
            gradient_mode,
            recent_output: None,
        }
    }

    pub fn gradient_mode(&self) -> SoftmaxGradient {
        self.gradient_mode
    }
}

impl Layer for OutputLayer {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        check_shape("output layer input", &self.shape, input)?;
        Tensor::new(self.shape.clone(), softmax(input.values()))
    }

    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor> {
        let output = self.forward(input)?;
        self.recent_output = Some(output.clone());
        Ok(output)
    }

    fn backward(&mut self, gradient: &Tensor, _learning_rate: f64) -> Result<Tensor> {
        check_shape("output layer gradient", &self.shape, gradient)?;
        let probabilities = recorded(&self.recent_output, "output")?;

        match self.gradient_mode {
            SoftmaxGradient::Jacobian => {
                let weighted = probabilities.inner_product(gradient)?;
                let values = probabilities
                    .values()
                    .iter()
                    .zip(gradient.values())
                    .map(|(&s, &g)| s * (g - weighted))
                    .collect();
                Tensor::new(self.shape.clone(), values)
            }
            SoftmaxGradient::Diagonal => {
                let derivative = Tensor::new(
                    self.shape.clone(),
                    probabilities.values().iter().map(|&s| s * (1.0 - s)).collect(),
                )?;
                gradient.mul_elem(&derivative)
            }
        }
    }

    fn input_shape(&self) -> &[usize] {
        &self.shape
    }

    fn output_shape(&self) -> &[usize] {
        &self.shape
    }

    fn parameter_count(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "output"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_output_forward_is_a_distribution() {
        let layer = OutputLayer::new(&[3]);
        let output = layer.forward(&Tensor::from_vec(vec![1.0, 2.0, 3.0])).unwrap();
        assert_relative_eq!(output.sum(), 1.0, epsilon = 1e-12);
        assert_eq!(output.max_value_index(), Some(2));
    }

    #[test]
    fn test_output_forward_large_logits() {
        let layer = OutputLayer::new(&[2]);
        let output = layer.forward(&Tensor::from_vec(vec![1000.0, 0.0])).unwrap();
        assert!(output.values().iter().all(|v| v.is_finite()));
        assert_relative_eq!(output.get(0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_jacobian_backward_matches_numerical_gradient() {
        let mut layer = OutputLayer::new(&[4]);
        let input = Tensor::from_vec(vec![0.3, -1.2, 2.0, 0.5]);
        let upstream = Tensor::from_vec(vec![0.7, -0.1, 0.4, 1.5]);
        let loss = |x: &Tensor| {
            layer.forward(x).unwrap().inner_product(&upstream).unwrap()
        };

        let eps = 1e-6;
        let mut numerical = Vec::new();
        for i in 0..input.len() {
            let mut plus = input.clone();
            plus.values_mut()[i] += eps;
            let mut minus = input.clone();
            minus.values_mut()[i] -= eps;
            numerical.push((loss(&plus) - loss(&minus)) / (2.0 * eps));
        }

        layer.forward_train(&input).unwrap();
        let analytical = layer.backward(&upstream, 0.0).unwrap();
        for (a, n) in analytical.values().iter().zip(&numerical) {
            assert_relative_eq!(*a, *n, epsilon = 1e-6, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_diagonal_backward_formula() {
        let mut layer = OutputLayer::with_gradient(&[2], SoftmaxGradient::Diagonal);
        let probabilities = layer.forward_train(&Tensor::from_vec(vec![0.0, 0.0])).unwrap();
        assert_relative_eq!(probabilities.get(0), 0.5, epsilon = 1e-12);

        let gradient = layer.backward(&Tensor::from_vec(vec![2.0, -4.0]), 0.0).unwrap();
        assert_relative_eq!(gradient.get(0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(gradient.get(1), -1.0, epsilon = 1e-12);
    }
}
