use anyhow::{Context, Result};
use tracing::{debug, warn};
use video_ingest::Frame;

use crate::{ClassScores, LabelSet, ModelError, ModelRuntime, Preprocessor};

/// Label reported when the winning index has no entry in the label list.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Top-1 classification of a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
}

/// Preprocessor, model runtime, and label list bundled into one per-frame call.
pub struct Detector {
    runtime: Box<dyn ModelRuntime>,
    labels: LabelSet,
    preprocessor: Preprocessor,
}

impl Detector {
    /// Pair `runtime` with `labels`, refusing lists that do not match the
    /// model's output width.
    pub fn new(runtime: Box<dyn ModelRuntime>, labels: LabelSet) -> Result<Self, ModelError> {
        let outputs = runtime.output_width();
        if labels.len() != outputs {
            return Err(ModelError::LabelMismatch {
                labels: labels.len(),
                outputs,
            });
        }
        let (width, height) = runtime.input_size();
        Ok(Self {
            runtime,
            labels,
            preprocessor: Preprocessor::new(width, height),
        })
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn runtime_name(&self) -> &'static str {
        self.runtime.name()
    }

    /// Classify one frame.
    pub fn detect(&self, frame: &Frame) -> Result<Detection> {
        let span = tracing::debug_span!("detector.detect", width = frame.width, height = frame.height);
        let _guard = span.enter();

        let tensor = self
            .preprocessor
            .prepare(frame)
            .context("Failed to prepare tensor from frame")?;
        let scores = self
            .runtime
            .infer(&tensor)
            .context("Classifier inference failed")?;
        let detection = self.classify(&scores);
        debug!(label = %detection.label, confidence = detection.confidence, "frame classified");
        Ok(detection)
    }

    /// Reduce scores to the top label.
    pub fn classify(&self, scores: &ClassScores) -> Detection {
        let Some((index, confidence)) = scores.argmax() else {
            warn!(len = scores.len(), "classifier produced no usable scores");
            return Detection {
                label: UNKNOWN_LABEL.to_string(),
                confidence: 0.0,
            };
        };
        match self.labels.get(index) {
            Some(label) => Detection {
                label: label.to_string(),
                confidence,
            },
            None => {
                warn!(
                    index,
                    labels = self.labels.len(),
                    "classifier index outside label list"
                );
                Detection {
                    label: UNKNOWN_LABEL.to_string(),
                    confidence,
                }
            }
        }
    }
}
