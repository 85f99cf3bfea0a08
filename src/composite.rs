//! Composite buffer.
//! One growing image holding every captured row that has not been dropped yet,
//! plus the processed-height marker: rows above it already live in pages, rows
//! below it are the pending tail.

use image::{RgbImage, imageops};
use thiserror::Error;

/// Tallest composite kept in memory. Older rows are already paged out by then.
pub const DEFAULT_HEIGHT_CAP: u32 = 2000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompositeError {
    #[error("strip width {strip} does not match composite width {composite}")]
    WidthMismatch { composite: u32, strip: u32 },

    #[error("cropping {excess} rows would drop pending content (only {processed} rows are paged)")]
    PendingCrop { excess: u32, processed: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    image: RgbImage,
    processed: u32,
}

impl Composite {
    /// Starts a composite from the first frame of a session. Nothing is paged yet.
    pub fn new(first: RgbImage) -> Self {
        Self {
            image: first,
            processed: 0,
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Rows already committed to pages.
    pub fn processed(&self) -> u32 {
        self.processed
    }

    pub fn pending_height(&self) -> u32 {
        self.image.height() - self.processed
    }

    /// Copy of the rows not yet committed to a page.
    pub fn pending_tail(&self) -> RgbImage {
        imageops::crop_imm(&self.image, 0, self.processed, self.width(), self.pending_height()).to_image()
    }

    pub fn check_width(&self, width: u32) -> Result<(), CompositeError> {
        if width != self.width() {
            return Err(CompositeError::WidthMismatch {
                composite: self.width(),
                strip: width,
            });
        }
        Ok(())
    }

    /// Appends `strip` below the current rows.
    pub fn append(&mut self, strip: &RgbImage) -> Result<(), CompositeError> {
        self.check_width(strip.width())?;
        if strip.height() == 0 {
            return Ok(());
        }

        let old_height = self.height();
        let mut grown = RgbImage::new(self.width(), old_height + strip.height());
        imageops::replace(&mut grown, &self.image, 0, 0);
        imageops::replace(&mut grown, strip, 0, i64::from(old_height));
        self.image = grown;
        Ok(())
    }

    /// Marks `rows` more rows as paged.
    pub(crate) fn advance(&mut self, rows: u32) {
        debug_assert!(rows <= self.pending_height());
        self.processed = (self.processed + rows).min(self.height());
    }

    /// Drops the oldest rows so the composite is at most `cap` rows tall and moves
    /// the marker up by the same amount. Returns the number of rows dropped.
    ///
    /// Must run after pagination: only already-paged rows may be cropped.
    pub fn enforce_cap(&mut self, cap: u32) -> Result<u32, CompositeError> {
        let height = self.height();
        if height <= cap {
            return Ok(0);
        }

        let excess = height - cap;
        if excess > self.processed {
            return Err(CompositeError::PendingCrop {
                excess,
                processed: self.processed,
            });
        }

        self.image = imageops::crop_imm(&self.image, 0, excess, self.width(), cap).to_image();
        self.processed -= excess;
        Ok(excess)
    }
}
