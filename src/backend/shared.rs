//! Shared-memory backends.
//!
//! Workers read the source buffer directly and write into disjoint row slices
//! of the output obtained with [`PixelBuffer::split_rows_mut`]. No band ever
//! writes a row it does not own, so no locking is needed; joining every
//! worker is the single synchronisation point.
use super::{Backend, Job};
use crate::diagnostics::{elapsed_ms, BandTiming};
use crate::error::FilterError;
use crate::image::{PixelBuffer, RowsMut};
use crate::partition::Band;
use crate::worker;
use log::debug;
use std::time::Instant;

fn run_band(job: &Job<'_>, band: &Band, rows: &mut RowsMut<'_>) -> Result<BandTiming, FilterError> {
    debug_assert_eq!(rows.start_row(), band.start_row);
    let start = Instant::now();
    let stride = rows.stride();
    worker::run_into(
        job.source,
        job.kernel,
        band,
        job.policy,
        rows.as_mut_bytes(),
        stride,
    )?;
    Ok(BandTiming::new(band, elapsed_ms(start)))
}

fn split_output<'o>(
    job: &Job<'_>,
    output: &'o mut PixelBuffer,
) -> Result<Vec<RowsMut<'o>>, FilterError> {
    output.split_rows_mut(&job.partition.owned_ranges())
}

/// Bands one after another on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sequential;

impl Backend for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn execute(
        &self,
        job: &Job<'_>,
        output: &mut PixelBuffer,
    ) -> Result<Vec<BandTiming>, FilterError> {
        let slices = split_output(job, output)?;
        job.partition
            .bands()
            .iter()
            .zip(slices)
            .map(|(band, mut rows)| run_band(job, band, &mut rows))
            .collect()
    }
}

/// Number of OS threads to use for `bands` bands.
///
/// The partition may hold up to one band per image row; threads are capped
/// at the machine's available parallelism.
pub(crate) fn thread_limit(bands: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    bands.min(cores).max(1)
}

/// Scoped OS threads, each joined through its own handle. Bands are dealt
/// round-robin when there are more bands than [`thread_limit`] allows.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScopedThreads;

impl Backend for ScopedThreads {
    fn name(&self) -> &'static str {
        "threads"
    }

    fn execute(
        &self,
        job: &Job<'_>,
        output: &mut PixelBuffer,
    ) -> Result<Vec<BandTiming>, FilterError> {
        let slices = split_output(job, output)?;
        let bands = job.partition.bands();
        let threads = thread_limit(bands.len());
        let mut groups: Vec<Vec<(&Band, RowsMut<'_>)>> = (0..threads).map(|_| Vec::new()).collect();
        for (i, pair) in bands.iter().zip(slices).enumerate() {
            groups[i % threads].push(pair);
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = groups
                .into_iter()
                .enumerate()
                .map(|(t, group)| {
                    let first_band = group.first().map_or(t, |(band, _)| band.index);
                    let spawned = std::thread::Builder::new()
                        .name(format!("band-worker-{t}"))
                        .spawn_scoped(scope, move || {
                            group
                                .into_iter()
                                .map(|(band, mut rows)| run_band(job, band, &mut rows))
                                .collect::<Vec<_>>()
                        });
                    (first_band, spawned)
                })
                .collect();
            debug!(
                "threads: {} band(s) on {} thread(s)",
                bands.len(),
                handles.len()
            );

            let mut timings: Vec<Option<BandTiming>> = vec![None; bands.len()];
            let mut first_err = None;
            for (first_band, spawned) in handles {
                let outcome = match spawned {
                    Ok(handle) => handle
                        .join()
                        .map_err(|_| FilterError::worker(first_band, "worker thread panicked")),
                    Err(e) => Err(FilterError::worker(
                        first_band,
                        format!("failed to spawn thread: {e}"),
                    )),
                };
                match outcome {
                    Ok(results) => {
                        for result in results {
                            match result {
                                Ok(timing) => {
                                    let index = timing.index;
                                    timings[index] = Some(timing);
                                }
                                Err(e) => {
                                    first_err.get_or_insert(e);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = first_err {
                return Err(e);
            }
            timings
                .into_iter()
                .enumerate()
                .map(|(i, t)| t.ok_or_else(|| FilterError::worker(i, "band produced no result")))
                .collect()
        })
    }
}

/// Bands as tasks on a rayon pool of [`thread_limit`] threads.
#[cfg(feature = "parallel")]
#[derive(Clone, Copy, Debug, Default)]
pub struct RayonBackend;

#[cfg(feature = "parallel")]
impl Backend for RayonBackend {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn execute(
        &self,
        job: &Job<'_>,
        output: &mut PixelBuffer,
    ) -> Result<Vec<BandTiming>, FilterError> {
        use rayon::prelude::*;

        let slices = split_output(job, output)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_limit(job.partition.len()))
            .build()
            .map_err(|e| {
                FilterError::InvalidConfiguration(format!("failed to build thread pool: {e}"))
            })?;
        pool.install(|| {
            slices
                .into_par_iter()
                .zip(job.partition.bands().par_iter())
                .map(|(mut rows, band)| run_band(job, band, &mut rows))
                .collect()
        })
    }
}
