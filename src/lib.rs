//! Rust Convolutional Network Library
//!
//! This library provides an N-dimensional tensor with region iteration, the
//! convolutional layers built on top of it, and a sequential network that trains
//! them with per-sample stochastic gradient descent.
//!
//! # Modules
//!
//! - `tensor`: Dense N-d tensor, coordinate/region iterators, cross-correlation
//! - `layers`: Layer trait and implementations (Convolution, MaxPooling, Dense, ReLU, Output)
//! - `loss`: Loss function trait and cross-entropy
//! - `network`: Layer chain with fit/validate/predict
//! - `utils`: Activation functions and learning rate schedulers
//! - `config`: Training configuration structures
//! - `architecture`: Architecture configuration and network building
//! - `error`: Error type shared by every fallible operation
//!
//! # Example
//!
//! ```
//! use rust_cnn::loss::CrossEntropyLoss;
//! use rust_cnn::network::{FitOptions, Network};
//! use rust_cnn::tensor::Tensor;
//!
//! let mut network = Network::new(&[4, 4], 0.05, CrossEntropyLoss).with_seed(1);
//! network
//!     .add_convolution_layer(&[3, 3], 2)?
//!     .add_dense_layer(2)?
//!     .add_output_layer()?;
//!
//! let inputs = vec![Tensor::zeros(&[4, 4])];
//! let labels = vec![Tensor::one_hot(0, 2)?];
//! network.fit(&inputs, &labels, &FitOptions::default(), |_, _| {})?;
//! let class = network.predict_index(&inputs[0])?;
//! assert!(class < 2);
//! # Ok::<(), rust_cnn::CnnError>(())
//! ```

pub mod architecture;
pub mod config;
pub mod error;
pub mod layers;
pub mod loss;
pub mod network;
pub mod tensor;
pub mod utils;

pub use error::{CnnError, Result};
pub use network::{EpochReport, Evaluation, FitOptions, Network, TrainingHistory};
pub use tensor::Tensor;
