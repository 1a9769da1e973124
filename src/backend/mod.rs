//! Pluggable execution strategies behind one worker contract.
//!
//! Every backend receives the same [`Job`] and an output buffer that already
//! holds a copy of the source (so row padding survives). It must write each
//! band's owned rows exactly once and nothing else, then report per-band
//! timings in band order.
//!
//! - [`shared`] – workers share the source buffer read-only and get disjoint
//!   `&mut` row slices of the output: [`Sequential`], [`ScopedThreads`] and,
//!   with the `parallel` feature, [`RayonBackend`].
//! - [`message`] – workers own nothing but the frames they receive:
//!   [`MessagePassing`] over in-process channels or child processes.
pub mod message;
pub mod shared;

#[cfg(feature = "parallel")]
pub use shared::RayonBackend;
pub use message::{MessagePassing, ProcessLauncher, RemoteWorker, ThreadLauncher, WorkerLauncher};
pub use shared::{ScopedThreads, Sequential};

use crate::diagnostics::BandTiming;
use crate::error::FilterError;
use crate::image::PixelBuffer;
use crate::kernel::{BoundaryPolicy, Kernel};
use crate::partition::Partition;
use serde::{Deserialize, Serialize};

/// Immutable inputs shared by every worker of a run.
#[derive(Clone, Copy, Debug)]
pub struct Job<'a> {
    pub source: &'a PixelBuffer,
    pub kernel: &'a Kernel,
    pub policy: BoundaryPolicy,
    pub partition: &'a Partition,
}

pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run every band of `job.partition`, writing owned rows into `output`.
    fn execute(
        &self,
        job: &Job<'_>,
        output: &mut PixelBuffer,
    ) -> Result<Vec<BandTiming>, FilterError>;
}

/// Backend selection as it appears in configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Sequential,
    #[default]
    Threads,
    Rayon,
    MessagePassing,
    Processes,
}

impl BackendKind {
    pub fn build(self) -> Result<Box<dyn Backend>, FilterError> {
        Ok(match self {
            BackendKind::Sequential => Box::new(Sequential),
            BackendKind::Threads => Box::new(ScopedThreads),
            #[cfg(feature = "parallel")]
            BackendKind::Rayon => Box::new(RayonBackend),
            #[cfg(not(feature = "parallel"))]
            BackendKind::Rayon => {
                return Err(FilterError::InvalidConfiguration(
                    "the rayon backend requires the `parallel` feature".to_string(),
                ))
            }
            BackendKind::MessagePassing => Box::new(MessagePassing::in_process()),
            BackendKind::Processes => Box::new(MessagePassing::new(ProcessLauncher::current_exe()?)),
        })
    }
}
