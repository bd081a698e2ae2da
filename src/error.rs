//! Error types for the classification pipeline.

use std::path::PathBuf;

use thiserror::Error;
use tract_onnx::prelude::TractError;

use crate::model::Device;

/// Result type alias for pipeline operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All the ways a classification run can fail. No variant is retried
/// anywhere; every failure propagates to the caller.
///
/// `tract` reports failures through `anyhow`, which cannot be chained as a
/// `source`, so tract-backed variants carry the cause for display only.
#[derive(Error, Debug)]
pub enum Error {
    /// The input image could not be read or decoded.
    #[error("failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The model file is missing or not a valid ONNX graph.
    #[error("failed to load model {path}: {cause}")]
    ModelLoad { path: PathBuf, cause: TractError },

    /// The input spec or transform chain is inconsistent.
    #[error("invalid pipeline configuration: {message}")]
    Config { message: String },

    /// The requested execution device is not available.
    #[error("unsupported device {0:?}")]
    UnsupportedDevice(String),

    /// The loaded model could not be optimized for the target device.
    #[error("failed to compile model for {device}: {cause}")]
    Compilation { device: Device, cause: TractError },

    /// The forward pass rejected the input tensor.
    #[error("inference failed: {cause}")]
    Inference { cause: TractError },

    /// The predicted class index has no entry in the label map.
    #[error("class index {index} is outside the label map ({len} entries)")]
    Lookup { index: usize, len: usize },

    /// The class map file is not a valid JSON label array.
    #[error("failed to parse class map {path}: {source}")]
    ClassMap {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
