//! Read-only row access shared by whole images and halo slices.
//!
//! Row indices are always absolute image rows. A source may hold only part of
//! the image (a band plus its halo); `first_row`/`row_count` describe which
//! rows it can serve.
use super::CHANNELS;
use std::ops::Range;

pub trait RowSource {
    /// Image width in pixels.
    fn width(&self) -> usize;

    /// Height of the full logical image, not just the rows held here.
    fn image_height(&self) -> usize;

    /// First absolute row held by this source.
    fn first_row(&self) -> usize {
        0
    }

    /// Number of rows held, starting at `first_row`.
    fn row_count(&self) -> usize {
        self.image_height()
    }

    /// Pixel bytes (`width * CHANNELS`, padding excluded) of absolute row `y`.
    ///
    /// Panics if `y` is not held by this source.
    fn row(&self, y: usize) -> &[u8];

    fn held_rows(&self) -> Range<usize> {
        self.first_row()..self.first_row() + self.row_count()
    }

    fn covers(&self, rows: &Range<usize>) -> bool {
        let held = self.held_rows();
        rows.start >= held.start && rows.end <= held.end
    }

    fn row_bytes(&self) -> usize {
        self.width() * CHANNELS
    }
}
