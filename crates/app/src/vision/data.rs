use ml_core::Detection;
use serde::Serialize;

pub(crate) const RELEASE_MESSAGE: &str = "Resources released";

#[derive(Debug, Serialize)]
pub(crate) struct PredictionResponse {
    pub(crate) label: String,
    pub(crate) confidence: f32,
}

impl From<Detection> for PredictionResponse {
    fn from(detection: Detection) -> Self {
        Self {
            label: detection.label,
            confidence: detection.confidence,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReleaseResponse {
    pub(crate) message: &'static str,
    /// False when no camera handle was open.
    pub(crate) released: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse<'a> {
    pub(crate) status: &'static str,
    pub(crate) camera_open: bool,
    pub(crate) camera_opens: u64,
    pub(crate) source: String,
    pub(crate) backend: &'static str,
    pub(crate) labels: Vec<&'a str>,
}
