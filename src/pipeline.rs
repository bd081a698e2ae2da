//! The classification pipeline: input spec, transform chain, inference
//! and top-1 interpretation.

use std::path::Path;

use image::imageops::FilterType;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tract_onnx::prelude::{Tensor, TractError};

use crate::error::{Error, Result};
use crate::labels::ClassMap;
use crate::model::{CompiledModel, Device, Model};
use crate::transform::{
    ConvertToBgr, GenericTransform, ImageSize, ImageTransform, ImageTransformResult, Normalization,
    ResizeBgrImage, ToArray, ToTensor, Transpose,
};

/// Spatial input size of the bundled classification models.
pub const MODEL_INPUT_SIZE: usize = 227;

/// Memory ordering of tensor dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    Nhwc,
    Nchw,
}

impl Layout {
    /// Axis permutation taking `self` ordering into `other` ordering,
    /// suitable for `permuted_axes`.
    fn axes_to(self, other: Layout) -> [usize; 4] {
        match (self, other) {
            (Layout::Nhwc, Layout::Nchw) => [0, 3, 1, 2],
            (Layout::Nchw, Layout::Nhwc) => [0, 2, 3, 1],
            _ => [0, 1, 2, 3],
        }
    }
}

impl std::str::FromStr for Layout {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "NHWC" => Ok(Layout::Nhwc),
            "NCHW" => Ok(Layout::Nchw),
            other => Err(Error::Config {
                message: format!("unknown tensor layout {other:?}"),
            }),
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layout::Nhwc => write!(f, "NHWC"),
            Layout::Nchw => write!(f, "NCHW"),
        }
    }
}

/// Immutable description of the tensor the model expects.
///
/// `shape` is given in `tensor_layout` order; when `model_layout` differs,
/// the pipeline inserts a [`Transpose`] step so the image can be prepared
/// in NHWC while the compiled graph consumes NCHW.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputSpec {
    pub shape: [usize; 4],
    pub tensor_layout: Layout,
    pub model_layout: Layout,
    /// Optional per-channel mean/scale preprocessing.
    #[serde(default)]
    pub normalization: Option<Normalization>,
}

impl InputSpec {
    /// The spec used by the bundled ImageNet models: a single 227x227 BGR
    /// image, prepared NHWC, consumed NCHW, no normalization.
    pub fn imagenet() -> Self {
        InputSpec {
            shape: [1, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, 3],
            tensor_layout: Layout::Nhwc,
            model_layout: Layout::Nchw,
            normalization: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.shape.iter().any(|&dim| dim == 0) {
            return Err(Error::Config {
                message: format!("input shape {:?} has a zero dimension", self.shape),
            });
        }
        if self.batch() != 1 {
            return Err(Error::Config {
                message: format!("batch size must be 1, got {}", self.batch()),
            });
        }
        if self.channels() != 3 {
            return Err(Error::Config {
                message: format!("expected 3 input channels, got {}", self.channels()),
            });
        }
        Ok(())
    }

    fn batch(&self) -> usize {
        self.shape[0]
    }

    pub fn height(&self) -> usize {
        match self.tensor_layout {
            Layout::Nhwc => self.shape[1],
            Layout::Nchw => self.shape[2],
        }
    }

    pub fn width(&self) -> usize {
        match self.tensor_layout {
            Layout::Nhwc => self.shape[2],
            Layout::Nchw => self.shape[3],
        }
    }

    pub fn channels(&self) -> usize {
        match self.tensor_layout {
            Layout::Nhwc => self.shape[3],
            Layout::Nchw => self.shape[1],
        }
    }

    /// `shape` reordered into the model-native layout.
    pub fn model_shape(&self) -> [usize; 4] {
        let axes = self.tensor_layout.axes_to(self.model_layout);
        [
            self.shape[axes[0]],
            self.shape[axes[1]],
            self.shape[axes[2]],
            self.shape[axes[3]],
        ]
    }

    /// Permutation the prepared tensor needs before entering the model,
    /// `None` when the layouts already agree.
    pub fn transpose_axes(&self) -> Option<[usize; 4]> {
        (self.tensor_layout != self.model_layout)
            .then(|| self.tensor_layout.axes_to(self.model_layout))
    }
}

/// Top-1 classification outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub index: usize,
    pub score: f32,
    pub label: String,
}

pub struct ClassificationPipeline {
    steps: Vec<ImageTransform>,
    model: CompiledModel,
    labels: ClassMap,
}

impl ClassificationPipeline {
    /// Validate the spec, build the transform chain, load the model and
    /// compile it for `device`.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        spec: InputSpec,
        device: Device,
        labels: ClassMap,
    ) -> Result<Self> {
        spec.validate()?;
        let model = Model::load(model_path, &spec)?.compile(device)?;
        Ok(ClassificationPipeline {
            steps: build_steps(&spec),
            model,
            labels,
        })
    }

    pub fn transform_image(&self, image: &RgbaImage) -> Result<Tensor> {
        let mut result = ImageTransformResult::RgbaImage(image.clone());

        for step in &self.steps {
            result = step.transform(result).map_err(|message| Error::Config {
                message: message.to_string(),
            })?;
            tracing::debug!("transform output shape {:?}", result.shape());
        }

        match result {
            ImageTransformResult::Tensor(tensor) => Ok(tensor),
            _ => Err(Error::Config {
                message: "transform chain did not end in a tensor".to_string(),
            }),
        }
    }

    /// Preprocess `image`, run one forward pass and interpret the output.
    pub fn classify(&self, image: &RgbaImage) -> Result<Classification> {
        let tensor = self.transform_image(image)?;
        let scores = self.model.infer(tensor)?;
        let (index, score) = max_element(&scores).ok_or_else(|| Error::Inference {
            cause: TractError::msg("model produced an empty output"),
        })?;
        let label = self.labels.get(index).ok_or(Error::Lookup {
            index,
            len: self.labels.len(),
        })?;
        Ok(Classification {
            index,
            score,
            label: label.to_string(),
        })
    }

    pub fn labels(&self) -> &ClassMap {
        &self.labels
    }
}

fn build_steps(spec: &InputSpec) -> Vec<ImageTransform> {
    let mut steps: Vec<ImageTransform> = vec![
        ConvertToBgr {}.into(),
        ResizeBgrImage {
            image_size: ImageSize {
                width: spec.width(),
                height: spec.height(),
            },
            filter: FilterType::Triangle,
        }
        .into(),
        ToArray {}.into(),
    ];
    if let Some(normalization) = &spec.normalization {
        steps.push(normalization.clone().into());
    }
    if let Some(axes) = spec.transpose_axes() {
        steps.push(Transpose { axes }.into());
    }
    steps.push(ToTensor {}.into());
    steps
}

/// Index and value of the maximum element; the lowest index wins on ties.
pub fn max_element(values: &[f32]) -> Option<(usize, f32)> {
    let mut index = 0;
    let mut max = *values.first()?;
    for (i, &value) in values.iter().enumerate().skip(1) {
        if value > max {
            index = i;
            max = value;
        }
    }
    Some((index, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_element_finds_the_maximum() {
        assert_eq!(max_element(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
    }

    #[test]
    fn max_element_breaks_ties_on_the_lowest_index() {
        assert_eq!(max_element(&[0.1, 0.9, 0.9, 0.2]), Some((1, 0.9)));
    }

    #[test]
    fn max_element_of_empty_buffer_is_none() {
        assert_eq!(max_element(&[]), None);
    }

    #[test]
    fn imagenet_spec_is_valid() {
        let spec = InputSpec::imagenet();
        assert!(spec.validate().is_ok());
        assert_eq!(spec.height(), 227);
        assert_eq!(spec.width(), 227);
        assert_eq!(spec.channels(), 3);
    }

    #[test]
    fn zero_dimension_is_a_config_error() {
        let spec = InputSpec {
            shape: [1, 0, 227, 3],
            ..InputSpec::imagenet()
        };
        assert!(matches!(spec.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn non_rgb_channel_count_is_a_config_error() {
        let spec = InputSpec {
            shape: [1, 227, 227, 4],
            ..InputSpec::imagenet()
        };
        assert!(matches!(spec.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn model_shape_reorders_nhwc_into_nchw() {
        let spec = InputSpec::imagenet();
        assert_eq!(spec.model_shape(), [1, 3, 227, 227]);
        assert_eq!(spec.transpose_axes(), Some([0, 3, 1, 2]));
    }

    #[test]
    fn matching_layouts_skip_the_transpose() {
        let spec = InputSpec {
            shape: [1, 3, 227, 227],
            tensor_layout: Layout::Nchw,
            model_layout: Layout::Nchw,
            normalization: None,
        };
        assert_eq!(spec.transpose_axes(), None);
        assert_eq!(spec.model_shape(), [1, 3, 227, 227]);
        assert_eq!(build_steps(&spec).len(), 4);
    }

    #[test]
    fn normalization_adds_a_step() {
        let mut spec = InputSpec::imagenet();
        assert_eq!(build_steps(&spec).len(), 5);
        spec.normalization = Some(Normalization {
            sub: [127.5, 127.5, 127.5],
            div: [127.5, 127.5, 127.5],
        });
        assert_eq!(build_steps(&spec).len(), 6);
    }

    #[test]
    fn layout_parses_from_tags() {
        assert_eq!("NHWC".parse::<Layout>().unwrap(), Layout::Nhwc);
        assert_eq!("nchw".parse::<Layout>().unwrap(), Layout::Nchw);
        assert!("NCWH".parse::<Layout>().is_err());
    }
}
