//! Translation of CLI arguments into a validated `ServiceConfig`.
//!
//! Everything here is checked before the model is loaded or a socket is
//! bound; a bad flag never reaches the HTTP layer.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use ml_core::{DEFAULT_INPUT_EDGE, LabelSet, ModelBackend};

use crate::vision::annotation::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::vision::encoding::DEFAULT_JPEG_QUALITY;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Onnx,
    Torch,
}

impl From<BackendArg> for ModelBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Onnx => ModelBackend::Onnx,
            BackendArg::Torch => ModelBackend::Torch,
        }
    }
}

/// Arguments shared by the `serve` and `check` subcommands.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Camera index, `/dev/videoN`, stream URL, or image file/directory.
    #[arg(long = "source", value_name = "URI", default_value = "0")]
    pub source: String,
    /// Classifier artifact (ONNX, or TorchScript with `with-tch`).
    #[arg(long = "model", value_name = "PATH")]
    pub model: PathBuf,
    /// Runtime used for the artifact; inferred from its extension when omitted.
    #[arg(long = "backend", value_enum)]
    pub backend: Option<BackendArg>,
    /// Comma separated labels in model output order.
    #[arg(long = "labels", value_name = "LIST", conflicts_with = "labels_file")]
    pub labels: Option<String>,
    /// File with one label per line, in model output order.
    #[arg(long = "labels-file", value_name = "PATH")]
    pub labels_file: Option<PathBuf>,
    /// Square model input edge in pixels.
    #[arg(long = "input-size", value_name = "PX", default_value_t = DEFAULT_INPUT_EDGE)]
    pub input_size: usize,
    /// Capture width requested from hardware cameras.
    #[arg(long = "capture-width", value_name = "PX", default_value_t = 640)]
    pub capture_width: i32,
    /// Capture height requested from hardware cameras.
    #[arg(long = "capture-height", value_name = "PX", default_value_t = 480)]
    pub capture_height: i32,
    /// Minimum confidence before a detection is drawn on the stream.
    #[arg(long = "threshold", value_name = "SCORE", default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
    pub threshold: f32,
    /// JPEG quality used by the encoder (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = DEFAULT_JPEG_QUALITY)]
    pub jpeg_quality: u8,
    /// Interface to listen on.
    #[arg(long = "bind", value_name = "ADDR", default_value = "0.0.0.0")]
    pub bind: String,
    #[arg(long = "port", value_name = "PORT", default_value_t = 5000)]
    pub port: u16,
    /// HTTP worker threads; defaults to the number of CPUs.
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,
    /// Enable debug logging.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

#[derive(Clone, Debug)]
/// Canonical configuration consumed by the service.
pub struct ServiceConfig {
    pub source: String,
    pub model_path: PathBuf,
    pub backend: ModelBackend,
    pub labels: LabelSet,
    pub input_size: (usize, usize),
    pub capture_size: (i32, i32),
    pub threshold: f32,
    pub jpeg_quality: u8,
    pub bind: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl TryFrom<ServeArgs> for ServiceConfig {
    type Error = anyhow::Error;

    fn try_from(args: ServeArgs) -> Result<Self> {
        if args.source.trim().is_empty() {
            bail!("--source must not be empty");
        }
        if args.input_size == 0 {
            bail!("--input-size must be a positive integer");
        }
        if args.capture_width <= 0 || args.capture_height <= 0 {
            bail!("Capture width and height must be positive integers");
        }
        if !(0.0..=1.0).contains(&args.threshold) {
            bail!("--threshold must be between 0 and 1");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        if args.workers == Some(0) {
            bail!("--workers must be at least 1");
        }

        let labels = match (args.labels, args.labels_file) {
            (Some(list), None) => LabelSet::parse_list(&list)?,
            (None, Some(path)) => LabelSet::from_file(&path)?,
            (None, None) => LabelSet::default(),
            (Some(_), Some(_)) => bail!("--labels and --labels-file are mutually exclusive"),
        };

        let backend = args
            .backend
            .map(ModelBackend::from)
            .unwrap_or_else(|| ModelBackend::from_path(&args.model));

        Ok(Self {
            source: args.source,
            model_path: args.model,
            backend,
            labels,
            input_size: (args.input_size, args.input_size),
            capture_size: (args.capture_width, args.capture_height),
            threshold: args.threshold,
            jpeg_quality: args.jpeg_quality,
            bind: args.bind,
            port: args.port,
            workers: args.workers,
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: ServeArgs,
    }

    fn parse(argv: &[&str]) -> Result<ServiceConfig> {
        let harness = Harness::try_parse_from(std::iter::once("wildcam").chain(argv.iter().copied()))?;
        ServiceConfig::try_from(harness.args)
    }

    #[test]
    fn defaults_match_the_deployed_service() {
        let config = parse(&["--model", "model.onnx"]).unwrap();
        assert_eq!(config.source, "0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.input_size, (224, 224));
        assert_eq!(config.threshold, 0.8);
        assert_eq!(config.backend, ModelBackend::Onnx);
        assert_eq!(config.labels, LabelSet::default());
    }

    #[test]
    fn explicit_labels_override_defaults() {
        let config = parse(&["--model", "m.pt", "--labels", "deer,frog,nothing,orangutan,tiger"])
            .unwrap();
        assert_eq!(config.labels.len(), 5);
        assert_eq!(config.backend, ModelBackend::Torch);
    }

    #[test]
    fn labels_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "a\nb\n").unwrap();
        let config = parse(&["--model", "m.onnx", "--labels-file", path.to_str().unwrap()]).unwrap();
        assert_eq!(config.labels.get(1), Some("b"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse(&["--model", "m.onnx", "--threshold", "1.5"]).is_err());
        assert!(parse(&["--model", "m.onnx", "--jpeg-quality", "0"]).is_err());
        assert!(parse(&["--model", "m.onnx", "--workers", "0"]).is_err());
        assert!(parse(&["--model", "m.onnx", "--labels", "a,,b"]).is_err());
        assert!(parse(&["--model", "m.onnx", "--labels", "a", "--labels-file", "x"]).is_err());
    }

    #[test]
    fn model_is_required() {
        assert!(parse(&[]).is_err());
    }
}
