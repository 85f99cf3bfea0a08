//! Stacked preview of a session: pages top to bottom with a gap between them,
//! then the pending tail. Written to `screenshots/` when `DEBUG_CAPTURE` is set.

use image::{Rgb, RgbImage, imageops};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::session::SessionState;

/// Gap drawn between two pages.
pub const PAGE_MARGIN: u32 = 20;

const MARGIN_COLOR: Rgb<u8> = Rgb([96, 96, 96]);

/// Height of the full stack, margins included.
pub fn visual_length(state: &SessionState) -> u32 {
    state
        .pages
        .iter()
        .map(|p| p.height() + PAGE_MARGIN)
        .sum::<u32>()
        + state.composite.pending_height()
        + PAGE_MARGIN
}

/// Renders the stack. With auto-follow on, only the newest page and the tail are
/// drawn, which is what a viewer pinned to the bottom would show.
pub fn render(state: &SessionState) -> RgbImage {
    let skip = if state.auto_follow {
        state.pages.len().saturating_sub(1)
    } else {
        0
    };
    let pages = &state.pages[skip..];
    let tail = state.composite.pending_tail();

    let width = state.composite.width();
    let height = pages.iter().map(|p| p.height() + PAGE_MARGIN).sum::<u32>() + tail.height() + PAGE_MARGIN;
    let mut canvas = RgbImage::new(width, height);

    let mut y = 0u32;
    for page in pages {
        imageops::replace(&mut canvas, &**page, 0, i64::from(y));
        y += page.height();
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(0, y as i32).of_size(width, PAGE_MARGIN),
            MARGIN_COLOR,
        );
        y += PAGE_MARGIN;
    }
    imageops::replace(&mut canvas, &tail, 0, i64::from(y));
    y += tail.height();
    draw_filled_rect_mut(
        &mut canvas,
        Rect::at(0, y as i32).of_size(width, PAGE_MARGIN),
        MARGIN_COLOR,
    );
    canvas
}
