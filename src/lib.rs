//! Row-band parallel convolution for 24-bit RGB rasters.
//!
//! An image is cut into contiguous row bands. Each band is filtered by an
//! independent worker that sees only its own rows plus a halo of
//! `kernel.radius()` rows on either side, and the coordinator reassembles a
//! result that is byte-identical whatever the worker count or backend.

// Public modules (stable-ish surface)
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod diagnostics;
pub mod error;
pub mod image;
pub mod kernel;

// Engine internals, public for tools, benches and custom backends.
pub mod backend;
pub mod convolution;
pub mod partition;
pub mod transport;
pub mod worker;

// --- High-level re-exports -------------------------------------------------

pub use crate::coordinator::{run, Coordinator};
pub use crate::error::FilterError;
pub use crate::image::PixelBuffer;
pub use crate::kernel::{BoundaryPolicy, Kernel, KernelPreset};

pub use crate::backend::{Backend, BackendKind};
pub use crate::diagnostics::RunReport;

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use band_filter::prelude::*;
///
/// # fn main() -> Result<(), FilterError> {
/// let (w, h) = (640usize, 480usize);
/// let img = PixelBuffer::from_rgb(w, h, vec![128u8; w * h * 3])?;
///
/// let out = Coordinator::new(Kernel::box_blur(), BoundaryPolicy::ZeroPad)
///     .with_backend(MessagePassing::in_process())
///     .run(&img, 4)?;
/// assert_eq!(out.width(), w);
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    pub use crate::backend::{MessagePassing, ScopedThreads, Sequential};
    pub use crate::{BoundaryPolicy, Coordinator, FilterError, Kernel, KernelPreset, PixelBuffer};
}
