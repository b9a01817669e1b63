//! Model runtimes behind a common synchronous `infer` interface.
//!
//! Backends are loaded once at start-up; a missing or malformed artifact is a
//! start-up error, never a per-request one.

use std::path::Path;

use anyhow::Result;

use crate::{InputTensor, ModelError};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "with-tch")]
mod torch;

#[cfg(feature = "onnx")]
pub use onnx::OnnxRuntime;
#[cfg(feature = "with-tch")]
pub use torch::TorchRuntime;

/// Per-class scores aligned with the label list.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassScores(pub Vec<f32>);

impl ClassScores {
    /// Index and value of the highest score. Ties resolve to the first index;
    /// NaN scores are ignored, so an all-NaN output has no maximum.
    pub fn argmax(&self) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (index, score) in self.0.iter().copied().enumerate() {
            if score.is_nan() {
                continue;
            }
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((index, score)),
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Synchronous classifier over `[1, H, W, 3]` inputs.
pub trait ModelRuntime: Send + Sync {
    fn name(&self) -> &'static str;
    /// Expected input as `(width, height)`.
    fn input_size(&self) -> (usize, usize);
    /// Number of scores produced per input.
    fn output_width(&self) -> usize;
    fn infer(&self, input: &InputTensor) -> Result<ClassScores>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelBackend {
    Onnx,
    Torch,
}

impl ModelBackend {
    /// TorchScript artifacts are recognised by extension; everything else is ONNX.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("pt" | "ts" | "torchscript") => ModelBackend::Torch,
            _ => ModelBackend::Onnx,
        }
    }
}

/// Load the artifact at `path` with the requested backend.
pub fn load_runtime(
    backend: ModelBackend,
    path: &Path,
    input_size: (usize, usize),
) -> Result<Box<dyn ModelRuntime>> {
    match backend {
        #[cfg(feature = "onnx")]
        ModelBackend::Onnx => Ok(Box::new(OnnxRuntime::load(path, input_size)?)),
        #[cfg(feature = "with-tch")]
        ModelBackend::Torch => Ok(Box::new(TorchRuntime::load(path, input_size)?)),
        #[allow(unreachable_patterns)]
        other => {
            let _ = (path, input_size);
            Err(ModelError::BackendUnavailable(match other {
                ModelBackend::Onnx => "onnx",
                ModelBackend::Torch => "with-tch",
            })
            .into())
        }
    }
}

/// Flatten a `[1, N]` or `[N]` output shape to `N`.
#[cfg_attr(not(any(feature = "onnx", feature = "with-tch")), allow(dead_code))]
pub(crate) fn classifier_width(shape: &[usize]) -> Result<usize, ModelError> {
    match shape {
        [n] | [1, n] if *n > 0 => Ok(*n),
        _ => Err(ModelError::OutputShape(shape.to_vec())),
    }
}
