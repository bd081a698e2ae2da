//! Model loading, compilation and single-shot inference.
//!
//! A [`Model`] is a parsed ONNX graph with its input fact declared; calling
//! [`Model::compile`] optimizes it for a [`Device`] and yields a
//! [`CompiledModel`] that can run forward passes. The split keeps an
//! uncompiled model from ever reaching inference.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tract_onnx::prelude::*;

use crate::error::{Error, Result};
use crate::pipeline::InputSpec;

type TractSimplePlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Execution target a model is compiled for. tract runs on the CPU; any
/// other identifier is rejected at parse time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
        }
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("cpu") {
            Ok(Device::Cpu)
        } else {
            Err(Error::UnsupportedDevice(value.to_string()))
        }
    }
}

/// A loaded, not yet runnable model.
#[derive(Debug)]
pub struct Model {
    graph: InferenceModel,
    path: PathBuf,
}

impl Model {
    /// Read an ONNX model from `path` and declare its input as an f32
    /// tensor shaped per the spec's model-native layout.
    pub fn load<P: AsRef<Path>>(path: P, spec: &InputSpec) -> Result<Self> {
        let path = path.as_ref();
        let shape = spec.model_shape();
        let input_shape = tvec!(shape[0], shape[1], shape[2], shape[3]);
        let graph = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|cause| Error::ModelLoad {
                path: path.to_path_buf(),
                cause,
            })?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), input_shape))
            .map_err(|cause| Error::ModelLoad {
                path: path.to_path_buf(),
                cause,
            })?;
        tracing::debug!("loaded model {}", path.display());
        Ok(Model {
            graph,
            path: path.to_path_buf(),
        })
    }

    /// Optimize the graph and bind it to `device`, making it runnable.
    pub fn compile(self, device: Device) -> Result<CompiledModel> {
        let plan = self
            .graph
            .into_optimized()
            .and_then(|model| model.into_runnable())
            .map_err(|cause| Error::Compilation { device, cause })?;
        tracing::debug!("compiled model {} for {device}", self.path.display());
        Ok(CompiledModel { plan, device })
    }
}

/// A model bound to an execution device, ready for inference.
pub struct CompiledModel {
    plan: TractSimplePlan,
    device: Device,
}

impl CompiledModel {
    pub fn device(&self) -> Device {
        self.device
    }

    /// Run one synchronous forward pass and return the flattened f32
    /// output buffer.
    pub fn infer(&self, input: Tensor) -> Result<Vec<f32>> {
        let outputs = self
            .plan
            .run(tvec!(input))
            .map_err(|cause| Error::Inference { cause })?;
        let scores = outputs[0]
            .to_array_view::<f32>()
            .map_err(|cause| Error::Inference { cause })?
            .iter()
            .copied()
            .collect();
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InputSpec;

    #[test]
    fn device_parses_case_insensitively() {
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
    }

    #[test]
    fn unknown_device_is_rejected() {
        let err = "GPU".parse::<Device>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedDevice(name) if name == "GPU"));
    }

    #[test]
    fn missing_model_path_fails_to_load() {
        let err = Model::load("no/such/model.onnx", &InputSpec::imagenet()).unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
    }
}
