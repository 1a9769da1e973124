//! Owned 3-channel 8-bit raster with explicit row stride.
//!
//! Rows are stored top-down. `stride` is the number of bytes between the
//! starts of consecutive rows and may exceed `width * CHANNELS` (BMP rows are
//! padded to 4 bytes). Padding bytes are carried along untouched; every pixel
//! access goes through `(x, y)` checked against `width`/`height`.
use super::traits::RowSource;
use super::CHANNELS;
use crate::error::{try_alloc_bytes, FilterError};
use std::ops::Range;

#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    stride: usize,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl PixelBuffer {
    /// Zero-filled buffer with tightly packed rows.
    pub fn new(width: usize, height: usize) -> Result<Self, FilterError> {
        Self::with_stride(width, height, width.saturating_mul(CHANNELS))
    }

    /// Zero-filled buffer with an explicit row stride in bytes.
    pub fn with_stride(width: usize, height: usize, stride: usize) -> Result<Self, FilterError> {
        let len = checked_len(width, height, stride)?;
        let data = try_alloc_bytes(len)?;
        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    /// Wrap raw bytes laid out as `height` rows of `stride` bytes.
    pub fn from_raw(
        width: usize,
        height: usize,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<Self, FilterError> {
        let len = checked_len(width, height, stride)?;
        if data.len() != len {
            return Err(FilterError::InvalidImage(format!(
                "buffer holds {} bytes, expected {} ({} rows of {} bytes)",
                data.len(),
                len,
                height,
                stride
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    /// Wrap tightly packed RGB bytes.
    pub fn from_rgb(width: usize, height: usize, data: Vec<u8>) -> Result<Self, FilterError> {
        Self::from_raw(width, height, width.saturating_mul(CHANNELS), data)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn channels(&self) -> usize {
        CHANNELS
    }

    /// Bytes of pixel data per row, padding excluded.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width * CHANNELS
    }

    /// Raw storage including row padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.stride;
        let end = start + self.width * CHANNELS;
        &mut self.data[start..end]
    }

    /// Pixel at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; CHANNELS]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = y * self.stride + x * CHANNELS;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// Write a pixel; returns `false` (and writes nothing) outside the image.
    pub fn set_pixel(&mut self, x: usize, y: usize, px: [u8; CHANNELS]) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let i = y * self.stride + x * CHANNELS;
        self.data[i..i + CHANNELS].copy_from_slice(&px);
        true
    }

    /// Same dimensions and identical pixel bytes; row padding is ignored.
    pub fn same_pixels(&self, other: &PixelBuffer) -> bool {
        self.width == other.width
            && self.height == other.height
            && (0..self.height).all(|y| self.row(y) == other.row(y))
    }

    /// Copy rows `rows` into a tightly packed vector.
    pub fn pack_rows(&self, rows: Range<usize>) -> Vec<u8> {
        let mut out = Vec::with_capacity(rows.len() * self.row_bytes());
        for y in rows {
            out.extend_from_slice(self.row(y));
        }
        out
    }

    /// Overwrite the pixel bytes of rows starting at `start_row` from packed data.
    pub fn unpack_rows(&mut self, start_row: usize, packed: &[u8]) -> Result<(), FilterError> {
        let row_bytes = self.row_bytes();
        if row_bytes == 0 || packed.len() % row_bytes != 0 {
            return Err(FilterError::InvalidImage(format!(
                "packed data of {} bytes is not a whole number of {}-byte rows",
                packed.len(),
                row_bytes
            )));
        }
        let rows = packed.len() / row_bytes;
        if start_row + rows > self.height {
            return Err(FilterError::InvalidImage(format!(
                "rows {}..{} exceed image height {}",
                start_row,
                start_row + rows,
                self.height
            )));
        }
        for (i, src) in packed.chunks_exact(row_bytes).enumerate() {
            self.row_mut(start_row + i).copy_from_slice(src);
        }
        Ok(())
    }

    /// Deep copy that reports allocation failure instead of aborting.
    pub fn try_clone(&self) -> Result<Self, FilterError> {
        let mut data = try_alloc_bytes(self.data.len())?;
        data.copy_from_slice(&self.data);
        Ok(Self {
            width: self.width,
            height: self.height,
            stride: self.stride,
            data,
        })
    }

    /// Split the storage into disjoint mutable row bands.
    ///
    /// `ranges` must be contiguous and cover `[0, height)` exactly.
    pub fn split_rows_mut(
        &mut self,
        ranges: &[Range<usize>],
    ) -> Result<Vec<RowsMut<'_>>, FilterError> {
        let mut expected = 0usize;
        for r in ranges {
            if r.start != expected || r.end < r.start {
                return Err(FilterError::InvalidConfiguration(format!(
                    "row range {:?} does not continue at row {}",
                    r, expected
                )));
            }
            expected = r.end;
        }
        if expected != self.height {
            return Err(FilterError::InvalidConfiguration(format!(
                "row ranges end at {}, image height is {}",
                expected, self.height
            )));
        }

        let (width, stride) = (self.width, self.stride);
        let mut rest: &mut [u8] = &mut self.data;
        let mut out = Vec::with_capacity(ranges.len());
        for r in ranges {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(r.len() * stride);
            out.push(RowsMut {
                start_row: r.start,
                width,
                stride,
                data: head,
            });
            rest = tail;
        }
        Ok(out)
    }
}

impl RowSource for PixelBuffer {
    #[inline]
    fn width(&self) -> usize {
        self.width
    }

    #[inline]
    fn image_height(&self) -> usize {
        self.height
    }

    #[inline]
    fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width * CHANNELS]
    }
}

/// Mutable view over a contiguous run of rows of a [`PixelBuffer`].
pub struct RowsMut<'a> {
    start_row: usize,
    width: usize,
    stride: usize,
    data: &'a mut [u8],
}

impl<'a> RowsMut<'a> {
    /// Absolute index of the first row in this view.
    pub fn start_row(&self) -> usize {
        self.start_row
    }

    pub fn row_count(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.data.len() / self.stride
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Backing bytes; row `i` of the view starts at `i * stride`.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        self.data
    }
}

fn checked_len(width: usize, height: usize, stride: usize) -> Result<usize, FilterError> {
    if width == 0 || height == 0 {
        return Err(FilterError::InvalidImage(format!(
            "image dimensions must be positive, got {}x{}",
            width, height
        )));
    }
    let row_bytes = width
        .checked_mul(CHANNELS)
        .ok_or_else(|| FilterError::InvalidImage(format!("width {} overflows", width)))?;
    if stride < row_bytes {
        return Err(FilterError::InvalidImage(format!(
            "stride ({}) must be >= width * channels ({})",
            stride, row_bytes
        )));
    }
    stride
        .checked_mul(height)
        .ok_or(FilterError::AllocationFailure { bytes: usize::MAX })
}
