use anyhow::{Result, bail};
use image::{ImageBuffer, Rgb, imageops::FilterType};
use video_ingest::{Frame, FrameFormat};

use crate::ModelError;

/// Edge length of the square classifier input.
pub const DEFAULT_INPUT_EDGE: usize = 224;

/// NHWC float tensor (`[1, H, W, 3]`) scaled into `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    data: Vec<f32>,
    shape: [usize; 4],
}

impl InputTensor {
    pub fn new(shape: [usize; 4], data: Vec<f32>) -> Result<Self, ModelError> {
        if shape.iter().product::<usize>() != data.len() {
            return Err(ModelError::TensorShape {
                shape,
                len: data.len(),
            });
        }
        Ok(Self { data, shape })
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Resizes frames to the model resolution and normalises them.
///
/// Channel order is passed through unchanged (BGR from the camera).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preprocessor {
    width: usize,
    height: usize,
}

impl Preprocessor {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn prepare(&self, frame: &Frame) -> Result<InputTensor> {
        if !matches!(frame.format, FrameFormat::Bgr8) {
            bail!("unsupported frame format");
        }
        if frame.width <= 0 || frame.height <= 0 {
            bail!(
                "frame has non-positive size {}x{}",
                frame.width,
                frame.height
            );
        }
        let (width, height) = (frame.width as u32, frame.height as u32);
        let view = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(width, height, &frame.data[..])
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "frame buffer of {} bytes is too small for {width}x{height}",
                    frame.data.len()
                )
            })?;

        let (target_w, target_h) = (self.width as u32, self.height as u32);
        let data = if (width, height) == (target_w, target_h) {
            normalise(view.as_raw())
        } else {
            let resized = image::imageops::resize(&view, target_w, target_h, FilterType::Triangle);
            normalise(resized.as_raw())
        };

        Ok(InputTensor::new([1, self.height, self.width, 3], data)?)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_EDGE, DEFAULT_INPUT_EDGE)
    }
}

fn normalise(bytes: &[u8]) -> Vec<f32> {
    bytes.iter().map(|&value| f32::from(value) / 255.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: i32, height: i32) -> Frame {
        let data = (0..width * height * 3).map(|i| (i % 256) as u8).collect();
        Frame::from_bgr(width, height, data).unwrap()
    }

    #[test]
    fn produces_configured_shape_within_unit_range() {
        let preprocessor = Preprocessor::default();
        for (w, h) in [(640, 480), (224, 224), (17, 301)] {
            let tensor = preprocessor.prepare(&gradient_frame(w, h)).unwrap();
            assert_eq!(tensor.shape(), [1, 224, 224, 3]);
            assert_eq!(tensor.as_slice().len(), 224 * 224 * 3);
            assert!(tensor.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn scales_bytes_by_one_over_255() {
        let frame = Frame::from_bgr(2, 1, vec![0, 51, 255, 255, 51, 0]).unwrap();
        let tensor = Preprocessor::new(2, 1).prepare(&frame).unwrap();
        assert_eq!(tensor.as_slice(), &[0.0, 0.2, 1.0, 1.0, 0.2, 0.0]);
    }

    #[test]
    fn rejects_truncated_frames() {
        let mut frame = gradient_frame(8, 8);
        frame.data.truncate(10);
        assert!(Preprocessor::default().prepare(&frame).is_err());
    }

    #[test]
    fn tensor_shape_must_match_data() {
        assert!(matches!(
            InputTensor::new([1, 2, 2, 3], vec![0.0; 11]),
            Err(ModelError::TensorShape { .. })
        ));
    }
}
