//! ReLU activation layer

use crate::error::Result;
use crate::layers::{check_shape, recorded, Layer};
use crate::tensor::Tensor;
use crate::utils::activations::{relu, relu_derivative};

/// Element-wise `max(0, x)`. Shape preserving, no parameters.
#[derive(Debug, Clone)]
pub struct ReluLayer {
    shape: Vec<usize>,
    recent_input: Option<Tensor>,
}

impl ReluLayer {
    pub fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            recent_input: None,
        }
    }
}

impl Layer for ReluLayer {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        check_shape("relu input", &self.shape, input)?;
        let values = input.values().iter().map(|&x| relu(x)).collect();
        Tensor::new(self.shape.clone(), values)
    }

    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor> {
        let output = self.forward(input)?;
        self.recent_input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, gradient: &Tensor, _learning_rate: f64) -> Result<Tensor> {
        check_shape("relu gradient", &self.shape, gradient)?;
        let input = recorded(&self.recent_input, "relu")?;
        let mask = Tensor::new(
            self.shape.clone(),
            input.values().iter().map(|&x| relu_derivative(x)).collect(),
        )?;
        gradient.mul_elem(&mask)
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
        "relu"
    }
}
