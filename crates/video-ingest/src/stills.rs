//! Still-image replay source: a single image or a directory of images served
//! as an endless camera feed. Lets the service run without capture hardware.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::Utc;
use tracing::debug;

use crate::{
    camera::{CaptureDevice, DeviceOpener},
    types::{CaptureError, Frame},
};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct StillImageOpener {
    root: PathBuf,
}

impl StillImageOpener {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DeviceOpener for StillImageOpener {
    fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let paths = collect_images(&self.root)?;
        let frames = paths
            .iter()
            .map(|path| decode_bgr(path))
            .collect::<Result<Vec<_>, _>>()?;
        if frames.is_empty() {
            return Err(CaptureError::Open {
                uri: self.root.display().to_string(),
            });
        }
        debug!(count = frames.len(), root = %self.root.display(), "loaded still images");
        Ok(Box::new(StillImageDevice {
            frames,
            cursor: 0,
            open: true,
        }))
    }

    fn describe(&self) -> String {
        format!("stills:{}", self.root.display())
    }
}

/// Replays decoded frames in order, looping forever.
pub struct StillImageDevice {
    frames: Vec<Frame>,
    cursor: usize,
    open: bool,
}

impl CaptureDevice for StillImageDevice {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        let mut frame = self
            .frames
            .get(self.cursor % self.frames.len())
            .cloned()
            .ok_or(CaptureError::NoFrame)?;
        self.cursor = self.cursor.wrapping_add(1);
        frame.timestamp_ms = Utc::now().timestamp_millis();
        Ok(frame)
    }

    fn is_opened(&self) -> bool {
        self.open
    }

    fn release(&mut self) {
        self.open = false;
        self.frames.clear();
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn collect_images(root: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    if !root.is_dir() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut paths = fs::read_dir(root)
        .with_context(|| format!("failed to list {}", root.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && is_image(path))
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

fn decode_bgr(path: &Path) -> Result<Frame, CaptureError> {
    let rgb = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut data = rgb.into_raw();
    for pixel in data.chunks_exact_mut(3) {
        pixel.swap(0, 2);
    }
    Frame::from_bgr(width as i32, height as i32, data)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn write_png(path: &Path, color: [u8; 3]) {
        RgbImage::from_pixel(4, 3, Rgb(color)).save(path).unwrap();
    }

    #[test]
    fn single_file_is_decoded_as_bgr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.png");
        write_png(&path, [10, 20, 30]);

        let mut device = StillImageOpener::new(&path).open().unwrap();
        let frame = device.read().unwrap();
        assert_eq!((frame.width, frame.height), (4, 3));
        assert_eq!(frame.pixel(0, 0), Some([30, 20, 10]));
    }

    #[test]
    fn directory_replays_in_sorted_order_and_loops() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("b.png"), [0, 0, 2]);
        write_png(&dir.path().join("a.png"), [0, 0, 1]);
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut device = StillImageOpener::new(dir.path()).open().unwrap();
        let order: Vec<u8> = (0..3)
            .map(|_| device.read().unwrap().pixel(0, 0).unwrap()[0])
            .collect();
        assert_eq!(order, vec![1, 2, 1]);
    }

    #[test]
    fn empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let result = StillImageOpener::new(dir.path()).open();
        assert!(matches!(result, Err(CaptureError::Open { .. })));
    }

    #[test]
    fn released_device_stops_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.png");
        write_png(&path, [1, 1, 1]);
        let mut device = StillImageOpener::new(&path).open().unwrap();
        device.release();
        assert!(!device.is_opened());
        assert!(matches!(device.read(), Err(CaptureError::NotOpen)));
    }
}
