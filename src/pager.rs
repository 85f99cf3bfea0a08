//! Page segmenter.
//! Cuts the pending part of the composite into pages of a fixed height. The cut
//! is moved up to the brightest row within the last `cut_search` rows of each page.

use std::sync::Arc;

use image::{RgbImage, imageops};
use tracing::debug;

use crate::composite::Composite;

/// Rows above a page's nominal bottom edge that are searched for a better cut.
pub const DEFAULT_CUT_SEARCH: u32 = 200;

/// A finalized page. Shared so undo snapshots do not copy page pixels.
pub type Page = Arc<RgbImage>;

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    page_height: u32,
    cut_search: u32,
}

impl Paginator {
    pub fn new(page_height: u32) -> Self {
        Self::with_cut_search(page_height, DEFAULT_CUT_SEARCH)
    }

    pub fn with_cut_search(page_height: u32, cut_search: u32) -> Self {
        Self {
            page_height: page_height.max(1),
            cut_search,
        }
    }

    /// Commits pages while at least one full page of pending rows exists.
    /// The remainder stays pending in the composite.
    pub fn drain(&self, composite: &mut Composite) -> Vec<Page> {
        let mut pages = Vec::new();
        while composite.pending_height() >= self.page_height {
            let top = composite.processed();
            let offset = self.best_cut_offset(composite.image(), top);
            let height = self.page_height - offset;

            let page = imageops::crop_imm(composite.image(), 0, top, composite.width(), height).to_image();
            debug!(top, height, trimmed = offset, "page committed");
            composite.advance(height);
            pages.push(Arc::new(page));
        }
        pages
    }

    /// Bottom rows to trim from the page starting at `top`.
    ///
    /// Offsets are scanned from the top of the search window downwards and a row
    /// takes over on `>=`, so among equally bright rows the one closest to the
    /// page bottom wins.
    fn best_cut_offset(&self, image: &RgbImage, top: u32) -> u32 {
        let window = self.cut_search.min(self.page_height - 1);
        let bottom = top + self.page_height - 1;

        let mut best_brightness = 0u64;
        let mut best_offset = 0;
        for offset in (0..=window).rev() {
            let brightness = row_brightness(image, bottom - offset);
            if brightness >= best_brightness {
                best_brightness = brightness;
                best_offset = offset;
            }
        }
        best_offset
    }
}

/// Sum of R+G+B over one row.
fn row_brightness(image: &RgbImage, y: u32) -> u64 {
    let stride = image.width() as usize * 3;
    let start = y as usize * stride;
    image.as_raw()[start..start + stride]
        .iter()
        .map(|&c| u64::from(c))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const INK: Rgb<u8> = Rgb([40, 40, 40]);
    const PAPER: Rgb<u8> = Rgb([250, 250, 250]);

    fn text_block(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, INK)
    }

    #[test]
    fn cuts_at_brightest_row_in_window() {
        let mut image = text_block(8, 1000);
        // Blank line 30 rows above the nominal cut of the first page.
        for x in 0..8 {
            image.put_pixel(x, 400 - 30 - 1, PAPER);
        }
        let mut composite = Composite::new(image);

        let pages = Paginator::new(400).drain(&mut composite);

        assert_eq!(pages[0].height(), 370);
        assert_eq!(composite.processed(), pages.iter().map(|p| p.height()).sum::<u32>());
    }

    #[test]
    fn uniform_rows_are_not_trimmed() {
        let mut composite = Composite::new(text_block(8, 1000));

        let pages = Paginator::new(300).drain(&mut composite);

        let heights: Vec<u32> = pages.iter().map(|p| p.height()).collect();
        assert_eq!(heights, vec![300, 300, 300]);
        assert_eq!(composite.processed(), 900);
        assert_eq!(composite.pending_height(), 100);
    }

    #[test]
    fn equal_bright_rows_keep_the_lowest() {
        let mut image = text_block(4, 600);
        // Page 0 spans rows [0, 500): bright rows at offsets 150 and 20.
        for y in [349, 479] {
            for x in 0..4 {
                image.put_pixel(x, y, PAPER);
            }
        }
        let mut composite = Composite::new(image);

        let pages = Paginator::new(500).drain(&mut composite);

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].height(), 480);
    }

    #[test]
    fn search_window_is_bounded() {
        let mut image = text_block(4, 500);
        // Brighter row just outside the 201-row window.
        for x in 0..4 {
            image.put_pixel(x, 500 - 1 - 201, PAPER);
        }
        let mut composite = Composite::new(image);

        let pages = Paginator::new(500).drain(&mut composite);

        assert_eq!(pages[0].height(), 500);
    }

    #[test]
    fn short_pages_keep_at_least_one_row() {
        let mut image = RgbImage::from_pixel(4, 50, INK);
        for x in 0..4 {
            image.put_pixel(x, 0, PAPER);
        }
        let mut composite = Composite::new(image);

        let pages = Paginator::new(10).drain(&mut composite);

        assert_eq!(pages[0].height(), 1);
        assert_eq!(composite.processed(), pages.iter().map(|p| p.height()).sum::<u32>());
    }

    #[test]
    fn less_than_a_page_stays_pending() {
        let mut composite = Composite::new(text_block(4, 299));
        assert!(Paginator::new(300).drain(&mut composite).is_empty());
        assert_eq!(composite.pending_height(), 299);
    }

    #[test]
    fn page_pixels_come_from_composite() {
        let content = crate::align::tests::scroll_content(16, 700);
        let mut composite = Composite::new(content.clone());

        let pages = Paginator::new(300).drain(&mut composite);

        let mut top = 0;
        for page in &pages {
            let expected = imageops::crop_imm(&content, 0, top, 16, page.height()).to_image();
            assert_eq!(**page, expected);
            top += page.height();
        }
        assert_eq!(top, composite.processed());
    }
}
