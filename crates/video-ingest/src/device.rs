//! OpenCV-backed camera capture for local devices and network feeds.

use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use tracing::warn;

use crate::{
    camera::{CaptureDevice, DeviceOpener},
    parse_device_index,
    types::{CaptureError, Frame},
};

const CAPTURE_FPS: f64 = 30.0;

/// Opens `uri` (device index, `/dev/videoN`, or stream URL) through OpenCV.
pub struct OpenCvOpener {
    uri: String,
    target_size: (i32, i32),
}

impl OpenCvOpener {
    pub fn new(uri: impl Into<String>, target_size: (i32, i32)) -> Self {
        Self {
            uri: uri.into(),
            target_size,
        }
    }
}

impl DeviceOpener for OpenCvOpener {
    fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let mut cap = open_video_capture(&self.uri)?;
        if parse_device_index(&self.uri).is_some() {
            configure_camera(&mut cap, self.target_size, CAPTURE_FPS);
        }
        Ok(Box::new(OpenCvDevice {
            cap,
            frame: Mat::default(),
            scratch: Mat::default(),
            target_size: self.target_size,
        }))
    }

    fn describe(&self) -> String {
        self.uri.clone()
    }
}

pub struct OpenCvDevice {
    cap: VideoCapture,
    frame: Mat,
    scratch: Mat,
    target_size: (i32, i32),
}

impl CaptureDevice for OpenCvDevice {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        let grabbed = self
            .cap
            .read(&mut self.frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        let size = self
            .frame
            .size()
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed || size.width <= 0 || size.height <= 0 {
            return Err(CaptureError::NoFrame);
        }
        if self.frame.channels() != 3 {
            return Err(CaptureError::Malformed(format!(
                "expected 3 channels, device produced {}",
                self.frame.channels()
            )));
        }

        let (target_w, target_h) = self.target_size;
        let working = if size.width != target_w || size.height != target_h {
            opencv::imgproc::resize(
                &self.frame,
                &mut self.scratch,
                core::Size {
                    width: target_w,
                    height: target_h,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            &self.scratch
        } else {
            &self.frame
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();
        Frame::from_bgr(target_w, target_h, data)
    }

    fn is_opened(&self) -> bool {
        self.cap.is_opened().unwrap_or(false)
    }

    fn release(&mut self) {
        if let Err(err) = self.cap.release() {
            warn!("failed to release video capture: {err}");
        }
    }
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!("failed to open device #{index} with backend {backend}: {err}");
                }
            }
        }
    }

    for backend in [videoio::CAP_FFMPEG, videoio::CAP_ANY] {
        match VideoCapture::from_file(uri, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                warn!("failed to open {uri} with backend {backend}: {err}");
            }
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

/// Apply common capture settings (resolution, fps, preferred pixel format).
fn configure_camera(cap: &mut VideoCapture, target_size: (i32, i32), fps: f64) {
    let mut fourcc_set = false;
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        if matches!(cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64), Ok(true)) {
            fourcc_set = true;
        }
    }
    if !fourcc_set {
        if let Ok(yuyv) = videoio::VideoWriter::fourcc('Y', 'U', 'Y', 'V') {
            let _ = cap.set(videoio::CAP_PROP_FOURCC, yuyv as f64);
        }
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, target_size.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, target_size.1 as f64);
    let _ = cap.set(videoio::CAP_PROP_FPS, fps);
}
