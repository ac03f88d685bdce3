//! Architecture configuration structures
//!
//! This module provides configuration structures for defining network architectures
//! via JSON configuration files. This enables architecture experimentation without code changes.
//!
//! Only the network input shape is given explicitly; every layer's input shape
//! follows from the layers before it.

use crate::config::TrainingConfig;
use crate::error::{CnnError, Result};
use crate::layers::SoftmaxGradient;
use crate::loss::CrossEntropyLoss;
use crate::network::Network;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Layer kinds accepted in `layer_type`.
pub const LAYER_TYPES: [&str; 5] = ["convolution", "max_pooling", "dense", "relu", "output"];

/// Configuration for a single layer in the network.
///
/// Defines the layer type and its parameters. Different layer types require different fields:
///
/// - **convolution**: Requires `filter_shape` and `filters`
/// - **max_pooling**: Requires `stride` and `window`
/// - **dense**: Requires `outputs`
/// - **relu**: No parameters
/// - **output**: Optional `softmax_gradient` ("jacobian" (default) or "diagonal")
///
/// # Examples
///
/// ```json
/// {
///   "layer_type": "convolution",
///   "filter_shape": [3, 3],
///   "filters": 8
/// }
/// ```
///
/// ```json
/// {
///   "layer_type": "max_pooling",
///   "stride": [2, 2],
///   "window": [2, 2]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LayerConfig {
    /// Type of layer: "convolution", "max_pooling", "dense", "relu", or "output"
    pub layer_type: String,

    // Convolution layer parameters
    /// Extent of one filter
    pub filter_shape: Option<Vec<usize>>,
    /// Number of filters
    pub filters: Option<usize>,

    // Max pooling layer parameters
    /// Step between window origins, per axis
    pub stride: Option<Vec<usize>>,
    /// Pooling window extent, per axis
    pub window: Option<Vec<usize>>,

    // Dense layer parameters
    /// Number of outputs
    pub outputs: Option<usize>,

    // Output layer parameters
    /// Softmax differentiation mode
    pub softmax_gradient: Option<SoftmaxGradient>,
}

/// Configuration for the entire network architecture.
///
/// Layers are applied in the order they appear in the configuration.
///
/// # Example
///
/// ```json
/// {
///   "input_shape": [28, 28],
///   "layers": [
///     { "layer_type": "convolution", "filter_shape": [5, 5], "filters": 8 },
///     { "layer_type": "max_pooling", "stride": [2, 2], "window": [2, 2] },
///     { "layer_type": "relu" },
///     { "layer_type": "dense", "outputs": 10 },
///     { "layer_type": "output" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ArchitectureConfig {
    /// Shape of one input sample
    pub input_shape: Vec<usize>,
    /// Sequence of layer configurations defining the network structure
    pub layers: Vec<LayerConfig>,
}

/// Loads an architecture configuration from a JSON file.
///
/// Reads the file at `path` and deserializes its JSON contents into an `ArchitectureConfig`.
/// Performs basic validation on the configuration structure.
///
/// # Returns
///
/// `Ok(ArchitectureConfig)` on success, or an error if the file cannot be read, the JSON
/// is invalid, or a layer is missing a required field.
///
/// # Examples
///
/// ```no_run
/// use rust_cnn::architecture::load_architecture;
///
/// let arch = load_architecture("architecture.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: impl AsRef<Path>) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

fn invalid(index: usize, message: impl std::fmt::Display) -> CnnError {
    CnnError::InvalidConfig(format!("Layer {}: {}", index, message))
}

fn positive_extents(
    values: &Option<Vec<usize>>,
    index: usize,
    kind: &str,
    field: &str,
) -> Result<()> {
    match values {
        None => Err(invalid(index, format!("{} layer requires '{}'", kind, field))),
        Some(values) if values.is_empty() => {
            Err(invalid(index, format!("{} must not be empty", field)))
        }
        Some(values) if values.contains(&0) => {
            Err(invalid(index, format!("{} entries must be greater than 0", field)))
        }
        Some(_) => Ok(()),
    }
}

/// Validates an architecture configuration.
///
/// Checks that:
/// - The input shape is non-empty with non-zero extents
/// - Architecture has at least one layer
/// - Each layer has the required fields for its type
/// - Parameter values are within valid ranges
///
/// Shape compatibility between layers is checked when the network is built.
///
/// # Errors
///
/// Returns `CnnError::InvalidConfig` with a descriptive message.
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.input_shape.is_empty() || config.input_shape.contains(&0) {
        return Err(CnnError::InvalidConfig(format!(
            "input_shape {:?} must be non-empty with extents greater than 0",
            config.input_shape
        )));
    }

    if config.layers.is_empty() {
        return Err(CnnError::InvalidConfig(
            "Architecture must have at least one layer".to_string(),
        ));
    }

    for (i, layer) in config.layers.iter().enumerate() {
        validate_layer(layer, i)?;
    }

    Ok(())
}

/// Validates a single layer configuration.
fn validate_layer(layer: &LayerConfig, index: usize) -> Result<()> {
    let layer_type = layer.layer_type.to_lowercase();

    match layer_type.as_str() {
        "convolution" => {
            positive_extents(&layer.filter_shape, index, "Convolution", "filter_shape")?;
            match layer.filters {
                None => return Err(invalid(index, "Convolution layer requires 'filters'")),
                Some(0) => return Err(invalid(index, "filters must be greater than 0")),
                Some(_) => {}
            }
        }
        "max_pooling" => {
            positive_extents(&layer.stride, index, "MaxPooling", "stride")?;
            positive_extents(&layer.window, index, "MaxPooling", "window")?;
        }
        "dense" => match layer.outputs {
            None => return Err(invalid(index, "Dense layer requires 'outputs'")),
            Some(0) => return Err(invalid(index, "outputs must be greater than 0")),
            Some(_) => {}
        },
        "relu" | "output" => {}
        _ => {
            return Err(invalid(
                index,
                format!(
                    "Invalid layer type '{}'. Must be one of: {}",
                    layer.layer_type,
                    LAYER_TYPES.join(", ")
                ),
            ));
        }
    }

    Ok(())
}

/// Builds a network from an architecture configuration.
///
/// Creates a [`Network`] with a cross-entropy loss and appends every configured
/// layer in order. With `seed` set, weight initialization and shuffling are
/// reproducible.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or a layer does not fit the
/// shape produced by the layers before it.
///
/// # Examples
///
/// ```no_run
/// use rust_cnn::architecture::{build_network, load_architecture};
///
/// let config = load_architecture("architecture.json").unwrap();
/// let network = build_network(&config, 0.01, Some(42)).unwrap();
/// assert_eq!(network.len(), config.layers.len());
/// ```
pub fn build_network(
    config: &ArchitectureConfig,
    learning_rate: f64,
    seed: Option<u64>,
) -> Result<Network> {
    validate_architecture(config)?;

    let mut network = Network::new(&config.input_shape, learning_rate, CrossEntropyLoss);
    if let Some(seed) = seed {
        network = network.with_seed(seed);
    }

    for (i, layer_config) in config.layers.iter().enumerate() {
        let layer_type = layer_config.layer_type.to_lowercase();
        let added = match layer_type.as_str() {
            "convolution" => network.add_convolution_layer(
                layer_config.filter_shape.as_deref().unwrap_or_default(),
                layer_config.filters.unwrap_or_default(),
            ),
            "max_pooling" => network.add_max_pooling_layer(
                layer_config.stride.as_deref().unwrap_or_default(),
                layer_config.window.as_deref().unwrap_or_default(),
            ),
            "dense" => network.add_dense_layer(layer_config.outputs.unwrap_or_default()),
            "relu" => network.add_relu_layer(),
            "output" => network
                .add_output_layer_with(layer_config.softmax_gradient.unwrap_or_default()),
            other => Err(invalid(i, format!("Invalid layer type '{}'", other))),
        };
        added.map_err(|e| invalid(i, e))?;
    }

    Ok(network)
}

/// Builds a network using the learning rate and seed of a training configuration.
///
/// # Examples
///
/// ```no_run
/// use rust_cnn::architecture::{build_network_from_config, load_architecture};
/// use rust_cnn::config::load_config;
///
/// let architecture = load_architecture("architecture.json").unwrap();
/// let training = load_config("training.json").unwrap();
/// let network = build_network_from_config(&architecture, &training).unwrap();
/// assert_eq!(network.learning_rate(), training.learning_rate);
/// ```
pub fn build_network_from_config(
    architecture: &ArchitectureConfig,
    training: &TrainingConfig,
) -> Result<Network> {
    build_network(architecture, training.learning_rate, training.seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ArchitectureConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_build_from_config() {
        let config = parse(
            r#"{
                "input_shape": [6, 6],
                "layers": [
                    { "layer_type": "convolution", "filter_shape": [3, 3], "filters": 2 },
                    { "layer_type": "max_pooling", "stride": [2, 2], "window": [2, 2] },
                    { "layer_type": "relu" },
                    { "layer_type": "dense", "outputs": 3 },
                    { "layer_type": "output", "softmax_gradient": "diagonal" }
                ]
            }"#,
        );
        let network = build_network(&config, 0.1, Some(1)).unwrap();
        assert_eq!(network.len(), 5);
        assert_eq!(network.layers()[1].output_shape(), &[2, 2, 2]);
        assert_eq!(network.output_shape(), &[3]);
    }

    #[test]
    fn test_missing_field_names_layer_index() {
        let config = parse(
            r#"{ "input_shape": [4], "layers": [ { "layer_type": "relu" }, { "layer_type": "dense" } ] }"#,
        );
        let err = validate_architecture(&config).unwrap_err();
        assert!(err.to_string().contains("Layer 1"));
    }

    #[test]
    fn test_layer_too_large_for_input() {
        let config = parse(
            r#"{ "input_shape": [2, 2], "layers": [ { "layer_type": "convolution", "filter_shape": [3, 3], "filters": 1 } ] }"#,
        );
        let err = build_network(&config, 0.1, None).unwrap_err();
        assert!(matches!(err, CnnError::InvalidConfig(ref message) if message.starts_with("Layer 0")));
    }
}
