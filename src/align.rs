//! Alignment engine.
//! Finds the vertical shift at which a freshly captured frame continues the
//! composite image. Brute-force search over every candidate shift, scoring each
//! one by the squared RGB difference between the frame's leading rows and the
//! composite's trailing rows.
//! Only every second row and column is sampled to keep a tick under ~100ms on
//! full-width captures.

use image::RgbImage;
use thiserror::Error;

/// Trailing frame rows that are never tested as a shift. Scrolling more than
/// `frame.height - margin` rows between two ticks is not expected.
pub const DEFAULT_SEARCH_MARGIN: u32 = 200;

const SAMPLE_STRIDE: usize = 2;
const CHANNELS: usize = 3;

/// Best shift found for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    /// Number of new rows at the bottom of the frame. 0 means nothing moved.
    pub shift: u32,
    /// Squared RGB difference per overlap pixel (downsampled).
    pub error: f64,
    /// Candidate shifts scored before the search ended.
    pub evaluated: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlignError {
    #[error("frame height {height} leaves no candidate shift (search margin {margin})")]
    FrameTooSmall { height: u32, margin: u32 },

    #[error("cannot align empty image ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct Aligner {
    margin: u32,
}

impl Default for Aligner {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_MARGIN)
    }
}

impl Aligner {
    pub fn new(margin: u32) -> Self {
        Self { margin }
    }

    /// Finds the shift `s` in `[0, frame.height - margin)` whose overlap error is
    /// the global minimum. Ties keep the smallest shift; a perfect match (error 0)
    /// ends the search immediately.
    pub fn find_shift(&self, reference: &RgbImage, frame: &RgbImage) -> Result<Alignment, AlignError> {
        for image in [reference, frame] {
            if image.width() == 0 || image.height() == 0 {
                return Err(AlignError::EmptyImage {
                    width: image.width(),
                    height: image.height(),
                });
            }
        }

        let frame_height = frame.height();
        if frame_height <= self.margin {
            return Err(AlignError::FrameTooSmall {
                height: frame_height,
                margin: self.margin,
            });
        }

        let mut best: Option<Alignment> = None;
        let mut evaluated = 0;
        for shift in 0..frame_height - self.margin {
            evaluated += 1;
            let (sum, area) = overlap_error(reference, frame, shift);
            let error = sum as f64 / area as f64;
            if best.is_none_or(|b| error < b.error) {
                best = Some(Alignment { shift, error, evaluated });
            }
            if sum == 0 {
                break;
            }
        }

        best.map(|b| Alignment { evaluated, ..b })
            .ok_or(AlignError::FrameTooSmall {
                height: frame_height,
                margin: self.margin,
            })
    }
}

/// Returns the sampled squared difference and the overlap area for one shift.
///
/// The frame's rows `[frame.height - shift - h, frame.height - shift)` are laid
/// over the reference's last `h` rows, where `h` is the overlap height clamped to
/// the reference height. The area is the full (not sampled) overlap size.
fn overlap_error(reference: &RgbImage, frame: &RgbImage, shift: u32) -> (u64, u64) {
    let width = reference.width().min(frame.width()) as usize;
    let height = (frame.height() - shift).min(reference.height()) as usize;

    let ref_top = reference.height() as usize - height;
    let frame_top = (frame.height() - shift) as usize - height;
    let ref_stride = reference.width() as usize * CHANNELS;
    let frame_stride = frame.width() as usize * CHANNELS;
    let ref_raw = reference.as_raw();
    let frame_raw = frame.as_raw();

    let mut sum = 0u64;
    for y in (0..height).step_by(SAMPLE_STRIDE) {
        let a = &ref_raw[(ref_top + y) * ref_stride..][..width * CHANNELS];
        let b = &frame_raw[(frame_top + y) * frame_stride..][..width * CHANNELS];
        for (pa, pb) in a
            .chunks_exact(CHANNELS)
            .zip(b.chunks_exact(CHANNELS))
            .step_by(SAMPLE_STRIDE)
        {
            for c in 0..CHANNELS {
                let d = i32::from(pa[c]) - i32::from(pb[c]);
                sum += (d * d) as u64;
            }
        }
    }

    (sum, (width * height) as u64)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgb;

    /// Deterministic, non-periodic content so every shift scores differently.
    pub(crate) fn scroll_content(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let h = (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663)).wrapping_mul(2_654_435_761);
            Rgb([(h >> 24) as u8, (h >> 16) as u8, (h >> 8) as u8])
        })
    }

    /// Rows `[top, top + height)` of `content`.
    pub(crate) fn window(content: &RgbImage, top: u32, height: u32) -> RgbImage {
        image::imageops::crop_imm(content, 0, top, content.width(), height).to_image()
    }

    #[test]
    fn finds_exact_continuation() {
        let content = scroll_content(64, 1200);
        let reference = window(&content, 0, 600);
        let frame = window(&content, 600 - 400 + 37, 400);

        let found = Aligner::default().find_shift(&reference, &frame).unwrap();
        assert_eq!(found.shift, 37);
        assert_eq!(found.error, 0.0);
        // Early exit: the search stopped at the perfect match.
        assert_eq!(found.evaluated, 38);
    }

    #[test]
    fn still_frame_gives_zero_shift() {
        let content = scroll_content(48, 900);
        let reference = window(&content, 0, 700);
        let frame = window(&content, 300, 400);

        let found = Aligner::default().find_shift(&reference, &frame).unwrap();
        assert_eq!(found.shift, 0);
        assert_eq!(found.error, 0.0);
        assert_eq!(found.evaluated, 1);
    }

    #[test]
    fn noisy_continuation_still_wins() {
        let content = scroll_content(40, 1000);
        let reference = window(&content, 0, 500);
        let mut frame = window(&content, 500 - 300 + 12, 300);
        for (x, y, px) in frame.enumerate_pixels_mut() {
            if (x + y) % 7 == 0 && px.0[0] < 250 {
                px.0[0] += 3;
            }
        }

        let found = Aligner::new(100).find_shift(&reference, &frame).unwrap();
        assert_eq!(found.shift, 12);
        assert!(found.error > 0.0);
        assert!(found.error < 10.0, "error {}", found.error);
        assert_eq!(found.evaluated, 200);
    }

    #[test]
    fn ties_keep_smallest_shift() {
        let reference = RgbImage::from_pixel(30, 50, Rgb([10, 10, 10]));
        let frame = RgbImage::from_pixel(30, 50, Rgb([200, 10, 10]));

        let found = Aligner::new(10).find_shift(&reference, &frame).unwrap();
        assert_eq!(found.shift, 0);
        assert_eq!(found.evaluated, 40);
    }

    #[test]
    fn error_is_normalized_by_full_overlap() {
        let reference = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
        let frame = RgbImage::from_pixel(4, 4, Rgb([10, 0, 0]));

        let found = Aligner::new(3).find_shift(&reference, &frame).unwrap();
        // 2x2 sampled pixels at 100 each, over a 4x4 overlap.
        assert_eq!(found.error, 400.0 / 16.0);
    }

    #[test]
    fn frame_shorter_than_margin_is_degenerate() {
        let reference = scroll_content(10, 300);
        let frame = scroll_content(10, 200);

        let err = Aligner::default().find_shift(&reference, &frame).unwrap_err();
        assert_eq!(err, AlignError::FrameTooSmall { height: 200, margin: 200 });
    }

    #[test]
    fn short_reference_uses_clamped_overlap() {
        let content = scroll_content(32, 600);
        let reference = window(&content, 0, 150);
        // The reference's last row (149) sits at frame row 129, so 170 rows are new.
        let frame = window(&content, 20, 300);

        let found = Aligner::new(100).find_shift(&reference, &frame).unwrap();
        assert_eq!(found.shift, 170);
        assert_eq!(found.error, 0.0);
    }

    #[test]
    fn empty_images_are_rejected() {
        let empty = RgbImage::new(0, 0);
        let frame = scroll_content(10, 300);
        assert!(matches!(
            Aligner::default().find_shift(&empty, &frame),
            Err(AlignError::EmptyImage { .. })
        ));
    }
}
