//! Frame sources feeding the wildcam service.
//!
//! The [`Camera`] owns at most one open device at a time. Devices come from a
//! [`DeviceOpener`] picked by [`open_source`] from the configured URI: still
//! images are always available, local cameras and network feeds need the
//! `with-opencv` feature.

use std::path::Path;

use anyhow::Result;

pub mod camera;
#[cfg(feature = "with-opencv")]
pub mod device;
pub mod stills;
pub mod types;

pub use camera::{Camera, CaptureDevice, DeviceOpener, HandleId};
pub use stills::StillImageOpener;
pub use types::{CaptureError, Frame, FrameFormat};

const STILLS_SCHEME: &str = "image://";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Transport a source URI resolves to.
pub enum SourceKind {
    /// Local V4L device by index or `/dev/videoN`.
    Device,
    /// RTSP/HTTP/UDP feeds such as IP webcams.
    Network,
    /// Image file or directory replayed as a feed.
    Stills,
}

impl SourceKind {
    pub fn from_uri(uri: &str) -> Self {
        const NETWORK_SCHEMES: [&str; 5] = ["rtsp://", "rtsps://", "http://", "https://", "udp://"];
        if NETWORK_SCHEMES.iter().any(|scheme| uri.starts_with(scheme)) {
            SourceKind::Network
        } else if uri.starts_with(STILLS_SCHEME) {
            SourceKind::Stills
        } else if parse_device_index(uri).is_some() {
            SourceKind::Device
        } else if Path::new(uri).exists() {
            SourceKind::Stills
        } else {
            SourceKind::Device
        }
    }
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if stripped.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = stripped.parse::<i32>() {
                return Some(index);
            }
        }
    }
    None
}

/// Build the opener for `uri`. `target_size` is the capture resolution
/// requested from hardware devices.
pub fn open_source(uri: &str, target_size: (i32, i32)) -> Result<Box<dyn DeviceOpener>> {
    match SourceKind::from_uri(uri) {
        SourceKind::Stills => {
            let path = uri.strip_prefix(STILLS_SCHEME).unwrap_or(uri);
            Ok(Box::new(StillImageOpener::new(path)))
        }
        #[cfg(feature = "with-opencv")]
        SourceKind::Device | SourceKind::Network => {
            Ok(Box::new(device::OpenCvOpener::new(uri, target_size)))
        }
        #[cfg(not(feature = "with-opencv"))]
        kind @ (SourceKind::Device | SourceKind::Network) => {
            let _ = target_size;
            Err(CaptureError::Unsupported(format!(
                "{kind:?} source {uri:?} requires building video-ingest with `with-opencv`"
            ))
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_source_uris() {
        assert_eq!(SourceKind::from_uri("0"), SourceKind::Device);
        assert_eq!(SourceKind::from_uri("/dev/video2"), SourceKind::Device);
        assert_eq!(
            SourceKind::from_uri("http://192.168.1.2:8080/video"),
            SourceKind::Network
        );
        assert_eq!(SourceKind::from_uri("rtsp://cam/live"), SourceKind::Network);
        assert_eq!(SourceKind::from_uri("image://frames"), SourceKind::Stills);
    }

    #[test]
    fn existing_paths_are_stills() {
        let dir = tempfile::tempdir().unwrap();
        let uri = dir.path().to_str().unwrap();
        assert_eq!(SourceKind::from_uri(uri), SourceKind::Stills);
        assert!(open_source(uri, (640, 480)).is_ok());
    }

    #[test]
    fn parses_device_indices() {
        assert_eq!(parse_device_index("3"), Some(3));
        assert_eq!(parse_device_index("/dev/video1"), Some(1));
        assert_eq!(parse_device_index("/dev/videoX"), None);
    }
}
