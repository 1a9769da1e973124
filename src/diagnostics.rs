//! Serializable summary of a coordinator run.
use crate::partition::Band;
use serde::{Deserialize, Serialize};

/// Timing for a single band, measured by whichever backend ran it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandTiming {
    pub index: usize,
    pub start_row: usize,
    pub end_row: usize,
    pub halo_above: usize,
    pub halo_below: usize,
    pub elapsed_ms: f64,
}

impl BandTiming {
    pub fn new(band: &Band, elapsed_ms: f64) -> Self {
        Self {
            index: band.index,
            start_row: band.start_row,
            end_row: band.end_row,
            halo_above: band.halo_above,
            halo_below: band.halo_below,
            elapsed_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub width: usize,
    pub height: usize,
    pub workers_requested: usize,
    pub workers_used: usize,
    pub backend: String,
    pub boundary: String,
    pub kernel_size: usize,
    pub bands: Vec<BandTiming>,
    pub total_ms: f64,
}

impl RunReport {
    /// Slowest band, the lower bound on wall time for a perfectly parallel run.
    pub fn slowest_band_ms(&self) -> f64 {
        self.bands
            .iter()
            .map(|b| b.elapsed_ms)
            .fold(0.0, f64::max)
    }
}

pub(crate) fn elapsed_ms(start: std::time::Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
