//! Screen capture module
//! Uses `xcap` for cross-platform screenshots of the primary display and crops
//! them to the profile's capture rectangle.
//! Latency goal: well under one 200ms tick.
//! Debug: `DEBUG_CAPTURE=1` saves the latest frame to `screenshots/debug_frame.png`.

use image::{DynamicImage, GenericImageView, RgbImage};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};
use xcap::Monitor;

pub const DEBUG_DIR: &str = "screenshots";

/// A rectangle on the primary display, in physical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Checks the rectangle is non-empty and inside a `screen_w` x `screen_h` display.
    pub fn validate(&self, screen_w: u32, screen_h: u32) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::EmptyRegion);
        }
        if self.x.saturating_add(self.width) > screen_w || self.y.saturating_add(self.height) > screen_h {
            return Err(CaptureError::OutOfBounds {
                rect: *self,
                screen: (screen_w, screen_h),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Failed to enumerate monitors: {0}")]
    MonitorEnumeration(String),

    #[error("No monitors found")]
    NoMonitor,

    #[error(
        "Screen capture failed: {0}. On macOS, grant Screen Recording permission to the terminal in System Settings > Privacy & Security"
    )]
    CaptureFailed(String),

    #[error("Captured empty screenshot - possible permission issue or no display")]
    EmptyScreenshot,

    #[error("Capture region has zero width or height")]
    EmptyRegion,

    #[error(
        "Capture region ({},{},{},{}) exceeds screen dimensions {}x{}",
        rect.x, rect.y, rect.width, rect.height, screen.0, screen.1
    )]
    OutOfBounds { rect: CaptureRect, screen: (u32, u32) },
}

/// Anything that can hand out the pixels of a screen rectangle on demand.
pub trait FrameSource {
    fn capture(&mut self, rect: CaptureRect) -> Result<RgbImage, CaptureError>;
}

/// Primary monitor via `xcap`.
#[derive(Debug, Default)]
pub struct ScreenSource {
    debug_dump: bool,
}

impl ScreenSource {
    pub fn new() -> Self {
        Self {
            debug_dump: env::var_os("DEBUG_CAPTURE").is_some(),
        }
    }
}

impl FrameSource for ScreenSource {
    fn capture(&mut self, rect: CaptureRect) -> Result<RgbImage, CaptureError> {
        let start = Instant::now();

        let screenshot = capture_primary_monitor()?;
        let (screen_w, screen_h) = screenshot.dimensions();
        rect.validate(screen_w, screen_h)?;

        let frame = screenshot.crop_imm(rect.x, rect.y, rect.width, rect.height).to_rgb8();
        if self.debug_dump {
            save_debug(&frame, "debug_frame.png");
        }

        debug!(latency = ?start.elapsed(), width = rect.width, height = rect.height, "frame captured");
        Ok(frame)
    }
}

/// Full screenshot of the primary (first) monitor.
pub fn capture_primary_monitor() -> Result<DynamicImage, CaptureError> {
    let monitors = Monitor::all().map_err(|e| CaptureError::MonitorEnumeration(e.to_string()))?;
    let primary = monitors.first().ok_or(CaptureError::NoMonitor)?;

    let raw = primary
        .capture_image()
        .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

    let screenshot = DynamicImage::ImageRgba8(raw);
    if screenshot.dimensions() == (0, 0) {
        return Err(CaptureError::EmptyScreenshot);
    }
    Ok(screenshot)
}

/// Size of the primary monitor in physical pixels.
pub fn primary_monitor_size() -> Result<(u32, u32), CaptureError> {
    Ok(capture_primary_monitor()?.dimensions())
}

/// Best-effort dump into `screenshots/`; failures only warn.
pub fn save_debug(image: &RgbImage, name: &str) {
    let path = std::path::Path::new(DEBUG_DIR).join(name);
    let result = fs::create_dir_all(DEBUG_DIR)
        .map_err(image::ImageError::IoError)
        .and_then(|_| image.save(&path));
    if let Err(err) = result {
        warn!(path = %path.display(), error = %err, "failed to save debug image");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_inside_screen_is_valid() {
        assert!(CaptureRect::new(0, 0, 1920, 1080).validate(1920, 1080).is_ok());
        assert!(CaptureRect::new(100, 200, 800, 600).validate(1920, 1080).is_ok());
    }

    #[test]
    fn rect_outside_screen_is_rejected() {
        let err = CaptureRect::new(1500, 0, 500, 100).validate(1920, 1080).unwrap_err();
        assert!(matches!(err, CaptureError::OutOfBounds { screen: (1920, 1080), .. }));
        assert!(matches!(
            CaptureRect::new(0, 0, 0, 100).validate(1920, 1080),
            Err(CaptureError::EmptyRegion)
        ));
        assert!(CaptureRect::new(u32::MAX, 0, 10, 10).validate(1920, 1080).is_err());
    }

    #[test]
    #[ignore = "requires graphical display and screen recording permissions"]
    fn test_capture_dimensions() {
        let (w, h) = primary_monitor_size().expect("primary_monitor_size failed");
        let rect = CaptureRect::new(0, 0, w.min(200), h.min(300));
        let frame = ScreenSource::new().capture(rect).expect("capture failed");
        assert_eq!(frame.dimensions(), (rect.width, rect.height));
    }
}
