//! Blocking service core shared by every HTTP handler.
//!
//! Owns the camera singleton and the detector. Each method performs one
//! capture → process step on the calling thread; handlers run them on the
//! blocking pool.

use std::time::Instant;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use anyhow::{Context, Result};
use ml_core::{Detection, Detector, load_runtime};
use thiserror::Error;
use tracing::info;
use video_ingest::{Camera, CaptureError, Frame, open_source};

use crate::vision::{
    annotation::annotate,
    config::ServiceConfig,
    data::ErrorResponse,
    encoding::encode_jpeg,
};

#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error("Failed to capture image")]
    Capture(#[source] CaptureError),
    #[error("Failed to classify frame")]
    Inference(#[source] anyhow::Error),
    #[error("Failed to encode image")]
    Encode(#[source] anyhow::Error),
    #[error("Worker pool unavailable")]
    Blocking,
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

pub(crate) struct VisionService {
    camera: Camera,
    detector: Detector,
    threshold: f32,
    jpeg_quality: u8,
}

impl VisionService {
    pub(crate) fn new(camera: Camera, detector: Detector, threshold: f32, jpeg_quality: u8) -> Self {
        Self {
            camera,
            detector,
            threshold,
            jpeg_quality,
        }
    }

    /// Load the model, validate the label list, and prepare the (still closed)
    /// camera. Any failure here is fatal.
    pub(crate) fn from_config(config: &ServiceConfig) -> Result<Self> {
        let runtime = load_runtime(config.backend, &config.model_path, config.input_size)
            .with_context(|| format!("failed to load model {}", config.model_path.display()))?;
        let detector = Detector::new(runtime, config.labels.clone())
            .context("label list does not match the model")?;
        let camera = Camera::new(open_source(&config.source, config.capture_size)?);
        info!(
            source = %camera.describe(),
            backend = detector.runtime_name(),
            labels = detector.labels().len(),
            "vision service ready"
        );
        Ok(Self::new(
            camera,
            detector,
            config.threshold,
            config.jpeg_quality,
        ))
    }

    pub(crate) fn camera(&self) -> &Camera {
        &self.camera
    }

    pub(crate) fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Capture one frame and classify it.
    pub(crate) fn predict(&self) -> Result<Detection, ServiceError> {
        let frame = self.capture()?;
        self.detect(&frame)
    }

    /// Capture one frame and return it as JPEG, without inference.
    pub(crate) fn snapshot(&self) -> Result<Vec<u8>, ServiceError> {
        let frame = self.capture()?;
        self.encode(&frame)
    }

    /// Capture, classify, overlay, and encode one stream frame.
    pub(crate) fn annotated_frame(&self) -> Result<Vec<u8>, ServiceError> {
        let mut frame = self.capture()?;
        let detection = self.detect(&frame)?;
        annotate(&mut frame, &detection, self.threshold);
        self.encode(&frame)
    }

    /// Publish totals the camera tracks itself. Opens are counted under the
    /// camera lock, so concurrent first requests report a single open.
    pub(crate) fn record_camera_totals(&self) {
        metrics::counter!("wildcam_camera_opens_total").absolute(self.camera.opened_count());
    }

    pub(crate) fn release(&self) -> bool {
        let released = self.camera.release();
        if released {
            metrics::counter!("wildcam_camera_releases_total").increment(1);
        }
        released
    }

    fn capture(&self) -> Result<Frame, ServiceError> {
        let start = Instant::now();
        let result = self.camera.capture();
        metrics::histogram!("wildcam_stage_seconds", "stage" => "capture")
            .record(start.elapsed().as_secs_f64());
        match result {
            Ok(frame) => {
                metrics::counter!("wildcam_frames_captured_total").increment(1);
                Ok(frame)
            }
            Err(err) => {
                metrics::counter!("wildcam_capture_failures_total").increment(1);
                Err(ServiceError::Capture(err))
            }
        }
    }

    fn detect(&self, frame: &Frame) -> Result<Detection, ServiceError> {
        let start = Instant::now();
        let detection = self.detector.detect(frame).map_err(ServiceError::Inference)?;
        metrics::histogram!("wildcam_stage_seconds", "stage" => "inference")
            .record(start.elapsed().as_secs_f64());
        if detection.confidence > self.threshold {
            metrics::counter!("wildcam_detections_total", "label" => detection.label.clone())
                .increment(1);
        }
        Ok(detection)
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, ServiceError> {
        let start = Instant::now();
        let jpeg = encode_jpeg(frame, self.jpeg_quality).map_err(ServiceError::Encode)?;
        metrics::histogram!("wildcam_stage_seconds", "stage" => "encoding")
            .record(start.elapsed().as_secs_f64());
        Ok(jpeg)
    }
}
