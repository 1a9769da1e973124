//! Splits a frame into row bands, hands them to a backend and returns the
//! assembled result.
//!
//! The output is either complete or absent: any band failure surfaces as an
//! error and the partially written buffer is dropped.
use crate::backend::{Backend, Job, ScopedThreads};
use crate::diagnostics::{elapsed_ms, RunReport};
use crate::error::FilterError;
use crate::image::PixelBuffer;
use crate::kernel::{BoundaryPolicy, Kernel};
use crate::partition::partition;
use log::{debug, info};
use std::time::Instant;

pub struct Coordinator {
    kernel: Kernel,
    policy: BoundaryPolicy,
    backend: Box<dyn Backend>,
}

impl Coordinator {
    /// Coordinator backed by one scoped thread per band.
    pub fn new(kernel: Kernel, policy: BoundaryPolicy) -> Self {
        Self {
            kernel,
            policy,
            backend: Box::new(ScopedThreads),
        }
    }

    pub fn with_backend(mut self, backend: impl Backend + 'static) -> Self {
        self.backend = Box::new(backend);
        self
    }

    pub fn with_boxed_backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn policy(&self) -> BoundaryPolicy {
        self.policy
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn run(&self, source: &PixelBuffer, worker_count: usize) -> Result<PixelBuffer, FilterError> {
        self.run_with_report(source, worker_count)
            .map(|(output, _)| output)
    }

    /// Run the filter and return the output together with per-band timings.
    pub fn run_with_report(
        &self,
        source: &PixelBuffer,
        worker_count: usize,
    ) -> Result<(PixelBuffer, RunReport), FilterError> {
        if worker_count == 0 {
            return Err(FilterError::InvalidConfiguration(
                "worker count must be at least 1".to_string(),
            ));
        }
        let total = Instant::now();
        let partition = partition(source.height(), worker_count, self.kernel.radius())?;
        debug!(
            "coordinator: {}x{} image, {} band(s), radius {}, backend {}",
            source.width(),
            source.height(),
            partition.len(),
            partition.radius(),
            self.backend.name()
        );

        let mut output = source.try_clone()?;
        let job = Job {
            source,
            kernel: &self.kernel,
            policy: self.policy,
            partition: &partition,
        };
        let bands = self.backend.execute(&job, &mut output)?;
        if bands.len() != partition.len() {
            return Err(FilterError::worker(
                bands.len(),
                format!(
                    "backend reported {} of {} bands",
                    bands.len(),
                    partition.len()
                ),
            ));
        }

        let report = RunReport {
            width: source.width(),
            height: source.height(),
            workers_requested: worker_count,
            workers_used: partition.len(),
            backend: self.backend.name().to_string(),
            boundary: self.policy.as_str().to_string(),
            kernel_size: self.kernel.size(),
            bands,
            total_ms: elapsed_ms(total),
        };
        info!(
            "filtered {}x{} with {} worker(s) on {} in {:.2} ms (slowest band {:.2} ms)",
            report.width,
            report.height,
            report.workers_used,
            report.backend,
            report.total_ms,
            report.slowest_band_ms()
        );
        Ok((output, report))
    }
}

/// Filter `source` with `worker_count` threads using the default backend.
pub fn run(
    source: &PixelBuffer,
    kernel: &Kernel,
    worker_count: usize,
    policy: BoundaryPolicy,
) -> Result<PixelBuffer, FilterError> {
    Coordinator::new(kernel.clone(), policy).run(source, worker_count)
}
