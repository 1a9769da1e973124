//! Per-band worker: convolve the owned rows of one band.
//!
//! A worker reads its band plus halo and writes only the band's owned rows.
//! In shared memory it reads straight from the source [`PixelBuffer`]; across
//! a transport it receives a [`BandRequest`] carrying a packed copy of exactly
//! those rows and answers with a [`WorkerReply`] carrying the owned rows only.
use crate::convolution::convolve_rows;
use crate::error::{try_alloc_bytes, FilterError};
use crate::image::{PixelBuffer, RowSource, CHANNELS};
use crate::kernel::{BoundaryPolicy, Kernel};
use crate::partition::Band;
use serde::{Deserialize, Serialize};

/// Packed, halo-inclusive rows of a band, addressed by absolute row index.
#[derive(Clone, Copy, Debug)]
pub struct HaloSlice<'a> {
    width: usize,
    image_height: usize,
    first_row: usize,
    row_count: usize,
    data: &'a [u8],
}

impl<'a> HaloSlice<'a> {
    /// `data` holds tightly packed rows starting at absolute row `first_row`.
    pub fn new(
        width: usize,
        image_height: usize,
        first_row: usize,
        data: &'a [u8],
    ) -> Result<Self, FilterError> {
        let row_bytes = width.checked_mul(CHANNELS).ok_or_else(|| {
            FilterError::InvalidImage(format!("width {width} overflows a row"))
        })?;
        if row_bytes == 0 || data.len() % row_bytes != 0 {
            return Err(FilterError::InvalidImage(format!(
                "halo slice of {} bytes is not a whole number of {}-byte rows",
                data.len(),
                row_bytes
            )));
        }
        let row_count = data.len() / row_bytes;
        if first_row
            .checked_add(row_count)
            .map_or(true, |end| end > image_height)
        {
            return Err(FilterError::InvalidImage(format!(
                "halo slice of {} rows at row {} exceeds image height {}",
                row_count, first_row, image_height
            )));
        }
        Ok(Self {
            width,
            image_height,
            first_row,
            row_count,
            data,
        })
    }
}

impl RowSource for HaloSlice<'_> {
    fn width(&self) -> usize {
        self.width
    }

    fn image_height(&self) -> usize {
        self.image_height
    }

    fn first_row(&self) -> usize {
        self.first_row
    }

    fn row_count(&self) -> usize {
        self.row_count
    }

    #[inline]
    fn row(&self, y: usize) -> &[u8] {
        assert!(
            y >= self.first_row && y < self.first_row + self.row_count,
            "row {y} outside halo slice {}..{}",
            self.first_row,
            self.first_row + self.row_count
        );
        let row_bytes = self.width * CHANNELS;
        let start = (y - self.first_row) * row_bytes;
        &self.data[start..start + row_bytes]
    }
}

/// Convolve `band` and return its owned rows, tightly packed.
pub fn run_band<S: RowSource + ?Sized>(
    src: &S,
    kernel: &Kernel,
    band: &Band,
    policy: BoundaryPolicy,
) -> Result<Vec<u8>, FilterError> {
    let row_bytes = src.row_bytes();
    let mut out = try_alloc_bytes(band.owned_row_count() * row_bytes)?;
    run_into(src, kernel, band, policy, &mut out, row_bytes)?;
    Ok(out)
}

/// Convolve `band` into `out`, whose row `i` starts at `i * out_stride` and
/// corresponds to absolute row `band.start_row + i`.
pub fn run_into<S: RowSource + ?Sized>(
    src: &S,
    kernel: &Kernel,
    band: &Band,
    policy: BoundaryPolicy,
    out: &mut [u8],
    out_stride: usize,
) -> Result<(), FilterError> {
    let needed = band.source_rows();
    if !src.covers(&needed) {
        return Err(FilterError::worker(
            band.index,
            format!(
                "source holds rows {:?}, band needs {:?}",
                src.held_rows(),
                needed
            ),
        ));
    }
    convolve_rows(src, kernel, policy, band.owned_rows(), out, out_stride)
        .map_err(|e| FilterError::worker(band.index, e.to_string()))
}

/// Self-contained work order for one band.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BandRequest {
    pub band_index: usize,
    pub image_width: usize,
    pub image_height: usize,
    pub channels: usize,
    pub start_row: usize,
    pub end_row: usize,
    pub halo_above: usize,
    pub halo_below: usize,
    pub kernel: Kernel,
    pub policy: BoundaryPolicy,
    /// Rows `start_row - halo_above .. end_row + halo_below`, packed.
    pub rows: Vec<u8>,
}

impl BandRequest {
    pub fn from_buffer(
        src: &PixelBuffer,
        band: &Band,
        kernel: &Kernel,
        policy: BoundaryPolicy,
    ) -> Self {
        Self {
            band_index: band.index,
            image_width: src.width(),
            image_height: src.height(),
            channels: CHANNELS,
            start_row: band.start_row,
            end_row: band.end_row,
            halo_above: band.halo_above,
            halo_below: band.halo_below,
            kernel: kernel.clone(),
            policy,
            rows: src.pack_rows(band.source_rows()),
        }
    }

    pub fn band(&self) -> Band {
        Band {
            index: self.band_index,
            start_row: self.start_row,
            end_row: self.end_row,
            halo_above: self.halo_above,
            halo_below: self.halo_below,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, FilterError> {
        bincode::serialize(self).map_err(|e| {
            FilterError::worker(self.band_index, format!("failed to encode request: {e}"))
        })
    }

    pub fn decode(frame: &[u8]) -> Result<Self, FilterError> {
        bincode::deserialize(frame).map_err(|e| {
            FilterError::InvalidConfiguration(format!("malformed band request: {e}"))
        })
    }
}

/// Owned rows computed by a worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BandReply {
    pub band_index: usize,
    pub start_row: usize,
    pub row_count: usize,
    pub rows: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum WorkerReply {
    Done(BandReply),
    Failed { band_index: usize, reason: String },
}

impl WorkerReply {
    pub fn encode(&self) -> Result<Vec<u8>, FilterError> {
        let band = match self {
            WorkerReply::Done(r) => r.band_index,
            WorkerReply::Failed { band_index, .. } => *band_index,
        };
        bincode::serialize(self)
            .map_err(|e| FilterError::worker(band, format!("failed to encode reply: {e}")))
    }

    /// Decode a reply expected for band `band`.
    pub fn decode(frame: &[u8], band: usize) -> Result<Self, FilterError> {
        bincode::deserialize(frame)
            .map_err(|e| FilterError::worker(band, format!("malformed reply: {e}")))
    }
}

/// Execute a decoded request. Failures are reported in the reply, not dropped.
pub fn handle_request(req: &BandRequest) -> WorkerReply {
    match compute_request(req) {
        Ok(rows) => WorkerReply::Done(BandReply {
            band_index: req.band_index,
            start_row: req.start_row,
            row_count: req.end_row.saturating_sub(req.start_row),
            rows,
        }),
        Err(e) => WorkerReply::Failed {
            band_index: req.band_index,
            reason: e.to_string(),
        },
    }
}

fn compute_request(req: &BandRequest) -> Result<Vec<u8>, FilterError> {
    if req.channels != CHANNELS {
        return Err(FilterError::InvalidImage(format!(
            "expected {} channels, request carries {}",
            CHANNELS, req.channels
        )));
    }
    let past_end = req
        .end_row
        .checked_add(req.halo_below)
        .map_or(true, |end| end > req.image_height);
    if req.end_row <= req.start_row || req.halo_above > req.start_row || past_end {
        return Err(FilterError::InvalidConfiguration(format!(
            "invalid band rows {}..{} with halos {}/{} in an image of height {}",
            req.start_row, req.end_row, req.halo_above, req.halo_below, req.image_height
        )));
    }
    let band = req.band();
    let slice = HaloSlice::new(
        req.image_width,
        req.image_height,
        req.start_row - req.halo_above,
        &req.rows,
    )?;
    if slice.row_count() != band.source_row_count() {
        return Err(FilterError::InvalidImage(format!(
            "request carries {} rows, band {} needs {}",
            slice.row_count(),
            band.index,
            band.source_row_count()
        )));
    }
    run_band(&slice, &req.kernel, &band, req.policy)
}
