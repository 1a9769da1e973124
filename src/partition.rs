//! Row-band domain decomposition.
//!
//! `[0, height)` is split into contiguous bands whose sizes differ by at most
//! one row; the first `height % workers` bands get the extra row. Each band
//! also records its halo: the rows above and below it (at most `radius`,
//! clipped to the image) that a worker must read but never writes.
use crate::error::FilterError;
use log::debug;
use serde::Serialize;
use std::ops::Range;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Band {
    /// Position in the partition (0-based, top to bottom).
    pub index: usize,
    pub start_row: usize,
    /// Exclusive.
    pub end_row: usize,
    pub halo_above: usize,
    pub halo_below: usize,
}

impl Band {
    /// Rows this band writes.
    pub fn owned_rows(&self) -> Range<usize> {
        self.start_row..self.end_row
    }

    pub fn owned_row_count(&self) -> usize {
        self.end_row - self.start_row
    }

    /// Rows this band reads: the owned rows plus both halos.
    pub fn source_rows(&self) -> Range<usize> {
        self.start_row - self.halo_above..self.end_row + self.halo_below
    }

    pub fn source_row_count(&self) -> usize {
        self.halo_above + self.owned_row_count() + self.halo_below
    }
}

/// Ordered bands exactly covering `[0, height)` with their owned rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    height: usize,
    radius: usize,
    bands: Vec<Band>,
}

impl Partition {
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn owned_ranges(&self) -> Vec<Range<usize>> {
        self.bands.iter().map(Band::owned_rows).collect()
    }
}

/// Split `height` rows across `worker_count` bands with halos of `radius` rows.
///
/// `worker_count` is clamped to `height` so no band is empty.
pub fn partition(
    height: usize,
    worker_count: usize,
    radius: usize,
) -> Result<Partition, FilterError> {
    if height == 0 {
        return Err(FilterError::InvalidImage(
            "cannot partition an image with zero rows".to_string(),
        ));
    }
    if worker_count == 0 {
        return Err(FilterError::InvalidConfiguration(
            "worker count must be at least 1".to_string(),
        ));
    }
    let workers = worker_count.min(height);
    if workers < worker_count {
        debug!(
            "partition: clamping {} workers to image height {}",
            worker_count, height
        );
    }

    let base = height / workers;
    let remainder = height % workers;
    let mut bands = Vec::with_capacity(workers);
    let mut start_row = 0usize;
    for index in 0..workers {
        let rows = base + usize::from(index < remainder);
        let end_row = start_row + rows;
        bands.push(Band {
            index,
            start_row,
            end_row,
            halo_above: radius.min(start_row),
            halo_below: radius.min(height - end_row),
        });
        start_row = end_row;
    }
    debug_assert_eq!(start_row, height);

    Ok(Partition {
        height,
        radius,
        bands,
    })
}
