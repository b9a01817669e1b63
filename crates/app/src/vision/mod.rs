//! Live wildlife classification service: camera capture, classification, frame
//! annotation, and the HTTP surface that exposes them.
//!
//! The module is split into focused submodules:
//! - `config`: CLI flags and the validated `ServiceConfig`.
//! - `service`: Camera + detector core shared by every handler.
//! - `annotation`: Bounding box and caption overlay.
//! - `encoding`: JPEG and multipart framing.
//! - `server`: Actix Web endpoints.
//! - `data`: JSON response bodies.
//! - `telemetry`: Tracing subscriber and Prometheus recorder.

pub use config::ServeArgs;

mod annotation;
mod config;
mod data;
mod encoding;
mod server;
mod service;
mod telemetry;

use anyhow::{Context, Result};
use tracing::info;

use config::ServiceConfig;
use service::VisionService;

/// Load the model, then serve HTTP until the process is stopped.
pub fn serve(args: ServeArgs) -> Result<()> {
    telemetry::init_tracing(args.verbose);
    let config = ServiceConfig::try_from(args)?;
    telemetry::init_metrics_recorder();

    let service = VisionService::from_config(&config)?;
    actix_web::rt::System::new()
        .block_on(server::serve(&config, service))
        .context("vision service terminated")
}

/// Load the model and validate the label list without opening the camera or
/// binding a socket.
pub fn check(args: ServeArgs) -> Result<()> {
    telemetry::init_tracing(args.verbose);
    let config = ServiceConfig::try_from(args)?;
    let service = VisionService::from_config(&config)?;
    let detector = service.detector();
    info!(
        model = %config.model_path.display(),
        backend = detector.runtime_name(),
        labels = detector.labels().len(),
        source = %service.camera().describe(),
        "configuration is valid"
    );
    Ok(())
}
