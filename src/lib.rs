//! Top-1 image classification with a pre-trained ONNX model.
//!
//! The pipeline decodes an image, reorders it RGBA to BGR, resizes it to
//! the model's input size, runs one forward pass on the CPU and maps the
//! highest-scoring output index to an ImageNet label.
//!
//! ```no_run
//! use imagenet_classify::{
//!     load_image, ClassMap, ClassificationPipeline, Device, InputSpec,
//! };
//!
//! # fn main() -> imagenet_classify::Result<()> {
//! let image = load_image("shih_tzu.jpg")?;
//! let labels = ClassMap::from_path(imagenet_classify::labels::DEFAULT_CLASS_MAP)?;
//! let pipeline =
//!     ClassificationPipeline::new("squeezenet.onnx", InputSpec::imagenet(), Device::Cpu, labels)?;
//!
//! let top = pipeline.classify(&image)?;
//! println!("Result: {}", top.label);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod labels;
pub mod model;
pub mod pipeline;
pub mod transform;

pub use error::{Error, Result};
pub use labels::ClassMap;
pub use model::{CompiledModel, Device, Model};
pub use pipeline::{Classification, ClassificationPipeline, InputSpec, Layout};
pub use transform::{load_image, ImageSize};
