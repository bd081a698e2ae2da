//! Image preprocessing steps.
//!
//! Preprocessing is a chain of [`ImageTransform`] steps folded over an
//! [`ImageTransformResult`]. A classification chain converts the decoded
//! RGBA buffer to BGR channel order, resizes it to the model's spatial
//! input size, lifts it into an NHWC `Array4<f32>` and finally into a
//! tract [`Tensor`], with optional normalization and layout transposition
//! in between.

use std::path::Path;

use enum_dispatch::enum_dispatch;
use image::imageops::{resize, FilterType};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use tract_onnx::prelude::{tract_ndarray, tract_ndarray::Array4, tract_ndarray::Ix4, Tensor};
use tract_onnx::tract_core::ndarray::Array;

use crate::error::{Error, Result};

/// Read an image from disk into an RGBA pixel buffer.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|source| Error::ImageRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_rgba8())
}

/// Spatial size of a pixel buffer or tensor plane.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

#[enum_dispatch]
#[derive(Clone, Serialize, Deserialize)]
pub enum ImageTransform {
    ConvertToBgr(ConvertToBgr),
    ResizeBgrImage(ResizeBgrImage),
    Normalization(Normalization),
    Transpose(Transpose),
    ToArray(ToArray),
    ToTensor(ToTensor),
}

#[enum_dispatch(ImageTransform)]
pub trait GenericTransform {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str>;
}

#[derive(Serialize, Deserialize)]
#[serde(remote = "FilterType")]
enum FilterOption {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

/// Drops the alpha channel and reverses the channel order, RGBA to BGR.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConvertToBgr {}

impl GenericTransform for ConvertToBgr {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::RgbaImage(image) => {
                let (width, height) = image.dimensions();
                let mut bgr = RgbImage::new(width, height);
                for (x, y, pixel) in image.enumerate_pixels() {
                    let Rgba([r, g, b, _]) = *pixel;
                    bgr.put_pixel(x, y, Rgb([b, g, r]));
                }
                Ok(ImageTransformResult::BgrImage(bgr))
            }
            ImageTransformResult::BgrImage(image) => Ok(ImageTransformResult::BgrImage(image)),
            ImageTransformResult::Array4(_) => Err("Color conversion not implemented for Array4"),
            ImageTransformResult::Tensor(_) => Err("Color conversion not implemented for Tensor"),
        }
    }
}

#[serde_as]
#[derive(Clone, Serialize, Deserialize)]
pub struct ResizeBgrImage {
    pub image_size: ImageSize,
    #[serde(with = "FilterOption")]
    pub filter: FilterType,
}

impl GenericTransform for ResizeBgrImage {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::BgrImage(image) => Ok(resize(
                &image,
                self.image_size.width as u32,
                self.image_size.height as u32,
                self.filter,
            )
            .into()),
            ImageTransformResult::RgbaImage(_) => Err("Image resize expects BGR channel order"),
            ImageTransformResult::Tensor(_) => Err("Image resize not implemented for Tensor"),
            ImageTransformResult::Array4(_) => Err("Image resize not implemented for Array4"),
        }
    }
}

/// Per-channel `(x - sub) / div` over the channel axis of an NHWC array.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Normalization {
    pub sub: [f32; 3],
    pub div: [f32; 3],
}

impl GenericTransform for Normalization {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::RgbaImage(_) => Err("Not implemented"),
            ImageTransformResult::BgrImage(_) => Err("Not implemented"),
            ImageTransformResult::Tensor(_) => Err("Not implemented"),
            ImageTransformResult::Array4(arr) => {
                let sub = Array::from_shape_vec((1, 1, 1, 3), self.sub.to_vec())
                    .map_err(|_| "Wrong conversion to array")?;
                let div = Array::from_shape_vec((1, 1, 1, 3), self.div.to_vec())
                    .map_err(|_| "Wrong conversion to array")?;
                Ok(ImageTransformResult::Array4((arr - sub) / div))
            }
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Transpose {
    pub axes: [usize; 4],
}

impl GenericTransform for Transpose {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::RgbaImage(_) => Err("Not implemented"),
            ImageTransformResult::BgrImage(_) => Err("Not implemented"),
            ImageTransformResult::Array4(arr) => {
                let arr = arr.permuted_axes(self.axes);
                Ok(ImageTransformResult::Array4(arr))
            }
            ImageTransformResult::Tensor(tensor) => {
                // note that the same operation on Tensor is not safe as it is on Array4
                let tensor = tensor
                    .permute_axes(&self.axes)
                    .map_err(|_| "Transpose should match the shape of the tensor")?;
                Ok(ImageTransformResult::Tensor(tensor))
            }
        }
    }
}

/// Lifts a BGR pixel buffer into an NHWC `Array4<f32>` of raw 0-255 values.
#[derive(Clone, Serialize, Deserialize)]
pub struct ToArray {}

impl GenericTransform for ToArray {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::BgrImage(image) => {
                let (width, height) = image.dimensions();
                let arr = tract_ndarray::Array4::from_shape_fn(
                    (1_usize, height as usize, width as usize, 3_usize),
                    |(_, y, x, c)| image[(x as _, y as _)][c] as f32,
                );
                Ok(ImageTransformResult::Array4(arr))
            }
            ImageTransformResult::RgbaImage(_) => Err("Convert to BGR before building the array"),
            ImageTransformResult::Tensor(tensor) => {
                let dyn_arr = tensor
                    .into_array::<f32>()
                    .map_err(|_| "Cannot convert tensor to Array4")?;
                let arr4 = dyn_arr
                    .into_dimensionality::<Ix4>()
                    .map_err(|_| "Cannot convert dynamic Array to Array4")?;
                Ok(ImageTransformResult::Array4(arr4))
            }
            ImageTransformResult::Array4(arr4) => Ok(ImageTransformResult::Array4(arr4)),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ToTensor {}

impl GenericTransform for ToTensor {
    fn transform(&self, input: ImageTransformResult) -> Result<ImageTransformResult, &'static str> {
        match input {
            ImageTransformResult::BgrImage(image) => {
                let (width, height) = image.dimensions();
                let tensor: Tensor = tract_ndarray::Array4::from_shape_fn(
                    (1_usize, height as usize, width as usize, 3_usize),
                    |(_, y, x, c)| image[(x as _, y as _)][c] as f32,
                )
                .into();
                Ok(ImageTransformResult::Tensor(tensor))
            }
            ImageTransformResult::RgbaImage(_) => Err("Convert to BGR before building the tensor"),
            ImageTransformResult::Tensor(tensor) => {
                // already a tensor
                Ok(ImageTransformResult::Tensor(tensor))
            }
            ImageTransformResult::Array4(arr4) => Ok(ImageTransformResult::Tensor(arr4.into())),
        }
    }
}

pub enum ImageTransformResult {
    RgbaImage(RgbaImage),
    /// 3-channel buffer in BGR order; `RgbImage` is only the container.
    BgrImage(RgbImage),
    Array4(Array4<f32>),
    Tensor(Tensor),
}

impl ImageTransformResult {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            ImageTransformResult::RgbaImage(image) => {
                let (width, height) = image.dimensions();
                vec![width as usize, height as usize]
            }
            ImageTransformResult::BgrImage(image) => {
                let (width, height) = image.dimensions();
                vec![width as usize, height as usize]
            }
            ImageTransformResult::Array4(array) => array.shape().to_vec(),
            ImageTransformResult::Tensor(tensor) => tensor.shape().to_vec(),
        }
    }
}

impl From<RgbaImage> for ImageTransformResult {
    fn from(rgba_image: RgbaImage) -> Self {
        ImageTransformResult::RgbaImage(rgba_image)
    }
}

impl From<RgbImage> for ImageTransformResult {
    fn from(bgr_image: RgbImage) -> Self {
        ImageTransformResult::BgrImage(bgr_image)
    }
}

impl From<Array4<f32>> for ImageTransformResult {
    fn from(array: Array4<f32>) -> Self {
        ImageTransformResult::Array4(array)
    }
}

impl From<Tensor> for ImageTransformResult {
    fn from(tensor: Tensor) -> Self {
        ImageTransformResult::Tensor(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_rgba(width: u32, height: u32, pixel: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(pixel))
    }

    #[test]
    fn convert_to_bgr_swaps_channels() {
        let input = solid_rgba(2, 2, [10, 20, 30, 255]);
        let result = ConvertToBgr {}.transform(input.into()).unwrap();
        match result {
            ImageTransformResult::BgrImage(image) => {
                assert_eq!(image.get_pixel(0, 0).0, [30, 20, 10]);
            }
            _ => panic!("expected a BGR image"),
        }
    }

    #[test]
    fn resize_hits_target_dimensions() {
        let input = solid_rgba(500, 500, [0, 0, 0, 255]);
        let bgr = ConvertToBgr {}.transform(input.into()).unwrap();
        let resize = ResizeBgrImage {
            image_size: ImageSize {
                width: 227,
                height: 227,
            },
            filter: FilterType::Triangle,
        };
        let result = resize.transform(bgr).unwrap();
        assert_eq!(result.shape(), vec![227, 227]);
    }

    #[test]
    fn resize_rejects_tensor_input() {
        let resize = ResizeBgrImage {
            image_size: ImageSize {
                width: 227,
                height: 227,
            },
            filter: FilterType::Triangle,
        };
        let tensor: Tensor = Array4::<f32>::zeros((1, 2, 2, 3)).into();
        assert!(resize.transform(tensor.into()).is_err());
    }

    #[test]
    fn to_array_is_nhwc_with_raw_values() {
        let input = solid_rgba(4, 2, [10, 20, 30, 255]);
        let bgr = ConvertToBgr {}.transform(input.into()).unwrap();
        let result = ToArray {}.transform(bgr).unwrap();
        match result {
            ImageTransformResult::Array4(arr) => {
                assert_eq!(arr.shape(), &[1, 2, 4, 3]);
                // BGR order, unnormalized
                assert_eq!(arr[[0, 0, 0, 0]], 30.0);
                assert_eq!(arr[[0, 0, 0, 1]], 20.0);
                assert_eq!(arr[[0, 0, 0, 2]], 10.0);
            }
            _ => panic!("expected an Array4"),
        }
    }

    #[test]
    fn normalization_applies_sub_and_div() {
        let arr = Array4::from_elem((1, 1, 1, 3), 100.0_f32);
        let step = Normalization {
            sub: [50.0, 100.0, 0.0],
            div: [25.0, 1.0, 100.0],
        };
        let result = step.transform(arr.into()).unwrap();
        match result {
            ImageTransformResult::Array4(arr) => {
                assert_eq!(arr[[0, 0, 0, 0]], 2.0);
                assert_eq!(arr[[0, 0, 0, 1]], 0.0);
                assert_eq!(arr[[0, 0, 0, 2]], 1.0);
            }
            _ => panic!("expected an Array4"),
        }
    }

    #[test]
    fn transpose_turns_nhwc_into_nchw() {
        let mut arr = Array4::<f32>::zeros((1, 4, 5, 3));
        arr[[0, 2, 3, 1]] = 7.0;
        let result = Transpose { axes: [0, 3, 1, 2] }.transform(arr.into()).unwrap();
        match result {
            ImageTransformResult::Array4(arr) => {
                assert_eq!(arr.shape(), &[1, 3, 4, 5]);
                assert_eq!(arr[[0, 1, 2, 3]], 7.0);
            }
            _ => panic!("expected an Array4"),
        }
    }

    #[test]
    fn to_tensor_keeps_shape() {
        let arr = Array4::<f32>::zeros((1, 3, 227, 227));
        let result = ToTensor {}.transform(arr.into()).unwrap();
        assert_eq!(result.shape(), vec![1, 3, 227, 227]);
    }
}
