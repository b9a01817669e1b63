use anyhow::Error;
use chrono::Utc;
use thiserror::Error;

/// Raw BGR frame captured from a video source.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub const fn channels(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

impl Frame {
    /// Wrap a packed BGR buffer, stamping it with the current wall-clock time.
    pub fn from_bgr(width: i32, height: i32, data: Vec<u8>) -> Result<Self, CaptureError> {
        if width <= 0 || height <= 0 {
            return Err(CaptureError::Malformed(format!(
                "non-positive frame size {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * FrameFormat::Bgr8.channels();
        if data.len() != expected {
            return Err(CaptureError::Malformed(format!(
                "frame buffer holds {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        })
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source returned no frame")]
    NoFrame,
    #[error("camera handle is not open")]
    NotOpen,
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unsupported video source: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Other(#[from] Error),
}
