//! Classification core: frame preprocessing, model runtimes, and the
//! argmax detector that turns class scores into a labelled [`Detection`].

use thiserror::Error;

pub mod detector;
pub mod labels;
pub mod preprocess;
pub mod runtime;
#[cfg(all(feature = "onnx", any(test, feature = "test-util")))]
pub mod testing;

pub use detector::{Detection, Detector, UNKNOWN_LABEL};
pub use labels::{DEFAULT_LABELS, LabelSet};
pub use preprocess::{DEFAULT_INPUT_EDGE, InputTensor, Preprocessor};
pub use runtime::{ClassScores, ModelBackend, ModelRuntime, load_runtime};

#[cfg(feature = "with-tch")]
pub use tch;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("label list has {labels} entries but the model produces {outputs} scores")]
    LabelMismatch { labels: usize, outputs: usize },
    #[error("label list is empty")]
    EmptyLabels,
    #[error("label #{0} is blank")]
    BlankLabel(usize),
    #[error("tensor shape {shape:?} does not hold {len} values")]
    TensorShape { shape: [usize; 4], len: usize },
    #[error("model backend `{0}` is not compiled in")]
    BackendUnavailable(&'static str),
    #[error("unsupported model output shape {0:?}")]
    OutputShape(Vec<usize>),
}
