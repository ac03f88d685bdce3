//! Tests for architecture parsing and building
//!
//! This file tests the architecture module including:
//! - Loading valid JSON architecture configs
//! - Building networks from configs
//! - Handling invalid JSON and missing files
//! - Validating required layer fields
//! - Layers that do not fit the shape before them

use rust_cnn::architecture::{build_network, build_network_from_config, load_architecture};
use rust_cnn::config::TrainingConfig;
use rust_cnn::layers::SoftmaxGradient;
use rust_cnn::tensor::Tensor;
use rust_cnn::CnnError;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("failed to write temp config");
    file
}

const SMALL_CNN: &str = r#"{
  "input_shape": [8, 8],
  "layers": [
    { "layer_type": "convolution", "filter_shape": [3, 3], "filters": 4 },
    { "layer_type": "max_pooling", "stride": [2, 2], "window": [2, 2] },
    { "layer_type": "relu" },
    { "layer_type": "dense", "outputs": 10 },
    { "layer_type": "output" }
  ]
}"#;

// ============================================================================
// Valid Architecture Tests
// ============================================================================

mod valid_architecture_tests {
    use super::*;

    #[test]
    fn test_load_small_cnn() {
        let file = write_temp_config(SMALL_CNN);
        let config = load_architecture(file.path()).expect("Failed to load architecture");

        assert_eq!(config.input_shape, vec![8, 8]);
        assert_eq!(config.layers.len(), 5);
        assert_eq!(config.layers[0].filter_shape, Some(vec![3, 3]));
        assert_eq!(config.layers[1].window, Some(vec![2, 2]));
        assert_eq!(config.layers[3].outputs, Some(10));
    }

    #[test]
    fn test_build_small_cnn() {
        let file = write_temp_config(SMALL_CNN);
        let config = load_architecture(file.path()).unwrap();
        let network = build_network(&config, 0.01, Some(42)).unwrap();

        assert_eq!(network.len(), 5);
        assert_eq!(network.layers()[0].output_shape(), &[6, 6, 4]);
        assert_eq!(network.layers()[1].output_shape(), &[3, 3, 4]);
        assert_eq!(network.output_shape(), &[10]);
        assert_eq!(network.parameter_count(), 36 + 36 * 10 + 10);

        let prediction = network.predict(&Tensor::zeros(&[8, 8])).unwrap();
        assert!((prediction.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_network() {
        let file = write_temp_config(SMALL_CNN);
        let config = load_architecture(file.path()).unwrap();
        let input = Tensor::new(vec![8, 8], (0..64).map(|v| v as f64 / 64.0).collect()).unwrap();

        let a = build_network(&config, 0.01, Some(3)).unwrap();
        let b = build_network(&config, 0.01, Some(3)).unwrap();
        assert_eq!(a.predict(&input).unwrap(), b.predict(&input).unwrap());
    }

    #[test]
    fn test_training_config_supplies_rate_and_seed() {
        let file = write_temp_config(SMALL_CNN);
        let architecture = load_architecture(file.path()).unwrap();
        let training = TrainingConfig {
            learning_rate: 0.03,
            seed: Some(11),
            ..TrainingConfig::default()
        };
        let input = Tensor::new(vec![8, 8], (0..64).map(|v| v as f64 / 32.0).collect()).unwrap();

        let from_config = build_network_from_config(&architecture, &training).unwrap();
        let explicit = build_network(&architecture, 0.03, Some(11)).unwrap();
        assert_eq!(from_config.learning_rate(), 0.03);
        assert_eq!(
            from_config.predict(&input).unwrap(),
            explicit.predict(&input).unwrap()
        );
    }

    #[test]
    fn test_softmax_gradient_option() {
        let file = write_temp_config(
            r#"{ "input_shape": [4], "layers": [ { "layer_type": "output", "softmax_gradient": "diagonal" } ] }"#,
        );
        let config = load_architecture(file.path()).unwrap();
        assert_eq!(
            config.layers[0].softmax_gradient,
            Some(SoftmaxGradient::Diagonal)
        );
    }
}

// ============================================================================
// Invalid Architecture Tests
// ============================================================================

mod invalid_architecture_tests {
    use super::*;

    #[test]
    fn test_invalid_json() {
        let file = write_temp_config(r#"{ "input_shape": [8, 8], "layers": [ "#);
        assert!(matches!(
            load_architecture(file.path()),
            Err(CnnError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_architecture("does/not/exist/architecture.json"),
            Err(CnnError::Io(_))
        ));
    }

    #[test]
    fn test_empty_layers() {
        let file = write_temp_config(r#"{ "input_shape": [8, 8], "layers": [] }"#);
        let err = load_architecture(file.path()).unwrap_err();
        assert!(err.to_string().contains("at least one layer"));
    }

    #[test]
    fn test_unknown_layer_type() {
        let file = write_temp_config(
            r#"{ "input_shape": [8, 8], "layers": [ { "layer_type": "lstm" } ] }"#,
        );
        let err = load_architecture(file.path()).unwrap_err();
        assert!(err.to_string().contains("lstm"));
    }

    #[test]
    fn test_convolution_requires_filters() {
        let file = write_temp_config(
            r#"{ "input_shape": [8, 8], "layers": [ { "layer_type": "convolution", "filter_shape": [3, 3] } ] }"#,
        );
        let err = load_architecture(file.path()).unwrap_err();
        assert!(err.to_string().contains("filters"));
    }

    #[test]
    fn test_zero_pooling_stride() {
        let file = write_temp_config(
            r#"{ "input_shape": [8, 8], "layers": [ { "layer_type": "max_pooling", "stride": [0, 2], "window": [2, 2] } ] }"#,
        );
        assert!(matches!(
            load_architecture(file.path()),
            Err(CnnError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_pooling_window_larger_than_feature_map() {
        let file = write_temp_config(
            r#"{
  "input_shape": [4, 4],
  "layers": [
    { "layer_type": "convolution", "filter_shape": [3, 3], "filters": 1 },
    { "layer_type": "max_pooling", "stride": [1, 1], "window": [3, 3] }
  ]
}"#,
        );
        let config = load_architecture(file.path()).unwrap();
        let err = build_network(&config, 0.01, None).unwrap_err();
        assert!(err.to_string().contains("Layer 1"));
    }
}
