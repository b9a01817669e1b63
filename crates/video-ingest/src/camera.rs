//! Process-wide camera handle with lazy acquisition and explicit release.
//!
//! The handle stays open across requests so the device is not re-initialised
//! per frame. Every open/read/release transition happens under one mutex, which
//! also serialises reads on the underlying device.

use std::sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use tracing::{debug, info, warn};

use crate::types::{CaptureError, Frame};

/// An open capture device.
pub trait CaptureDevice: Send {
    /// Block until the next frame is available or the device fails.
    fn read(&mut self) -> Result<Frame, CaptureError>;
    fn is_opened(&self) -> bool;
    fn release(&mut self);
}

/// Factory for capture devices; called every time the camera has to be (re)opened.
pub trait DeviceOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError>;
    /// Human readable source description used in logs.
    fn describe(&self) -> String;
}

/// Generation number of an opened handle. Two acquisitions returning the same
/// id were served by the same underlying device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

struct OpenHandle {
    id: HandleId,
    device: Box<dyn CaptureDevice>,
}

/// Shared camera resource: absent until first use, open until released.
pub struct Camera {
    opener: Box<dyn DeviceOpener>,
    slot: Mutex<Option<OpenHandle>>,
    opened: AtomicU64,
}

impl Camera {
    pub fn new(opener: Box<dyn DeviceOpener>) -> Self {
        Self {
            opener,
            slot: Mutex::new(None),
            opened: AtomicU64::new(0),
        }
    }

    pub fn describe(&self) -> String {
        self.opener.describe()
    }

    /// A panicking reader must not wedge the camera for everyone else.
    fn lock(&self) -> MutexGuard<'_, Option<OpenHandle>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ensure a handle is open, reusing the current one when possible.
    pub fn acquire(&self) -> Result<HandleId, CaptureError> {
        let mut slot = self.lock();
        self.ensure_open(&mut slot)
    }

    /// Read one frame from the currently open handle.
    ///
    /// Returns [`CaptureError::NotOpen`] when no handle is open, e.g. after a
    /// concurrent release. A failed read closes the handle so the next
    /// acquisition starts from a fresh device.
    pub fn read(&self) -> Result<Frame, CaptureError> {
        let mut slot = self.lock();
        Self::read_locked(&mut slot)
    }

    /// Acquire and read in a single critical section.
    pub fn capture(&self) -> Result<Frame, CaptureError> {
        let mut slot = self.lock();
        self.ensure_open(&mut slot)?;
        Self::read_locked(&mut slot)
    }

    /// Close the handle if one is open. Returns whether anything was released.
    pub fn release(&self) -> bool {
        let mut slot = self.lock();
        match slot.take() {
            Some(mut handle) => {
                handle.device.release();
                info!(handle = handle.id.0, "camera released");
                true
            }
            None => {
                debug!("camera release requested with no open handle");
                false
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|handle| handle.device.is_opened())
    }

    /// Total number of device opens since start-up.
    pub fn opened_count(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    fn ensure_open(&self, slot: &mut Option<OpenHandle>) -> Result<HandleId, CaptureError> {
        if let Some(handle) = slot.as_ref() {
            if handle.device.is_opened() {
                return Ok(handle.id);
            }
        }
        if let Some(mut stale) = slot.take() {
            warn!(handle = stale.id.0, "camera handle closed underneath us; reopening");
            stale.device.release();
        }

        let span = tracing::info_span!("camera.open", source = %self.opener.describe());
        let _guard = span.enter();
        let device = self.opener.open()?;
        let id = HandleId(self.opened.fetch_add(1, Ordering::SeqCst) + 1);
        info!(handle = id.0, "camera opened");
        *slot = Some(OpenHandle { id, device });
        Ok(id)
    }

    fn read_locked(slot: &mut Option<OpenHandle>) -> Result<Frame, CaptureError> {
        let handle = slot.as_mut().ok_or(CaptureError::NotOpen)?;
        match handle.device.read() {
            Ok(frame) => Ok(frame),
            Err(err) => {
                if let Some(mut failed) = slot.take() {
                    warn!(handle = failed.id.0, "camera read failed, closing handle: {err}");
                    failed.device.release();
                }
                Err(err)
            }
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.release();
    }
}
