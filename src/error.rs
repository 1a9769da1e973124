//! Error type shared by the codec, the engine and the tools.
//!
//! Every failure is surfaced to the caller. The engine either returns a fully
//! assembled buffer or one of these errors; there is no partial result.

/// Failure kinds reported by the filter engine.
#[derive(Debug)]
pub enum FilterError {
    /// Bad dimensions or a corrupt/unsupported image header.
    InvalidImage(String),
    /// Rejected before any work is dispatched (worker count, kernel shape, config).
    InvalidConfiguration(String),
    /// A worker never delivered a usable result for its band.
    WorkerFailure { band: usize, reason: String },
    /// The output buffer could not be reserved.
    AllocationFailure { bytes: usize },
    /// File-system error at the tool boundary.
    Io(std::io::Error),
}

impl FilterError {
    pub(crate) fn worker(band: usize, reason: impl Into<String>) -> Self {
        FilterError::WorkerFailure {
            band,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterError::InvalidImage(e) => write!(f, "Invalid image: {}", e),
            FilterError::InvalidConfiguration(e) => write!(f, "Invalid configuration: {}", e),
            FilterError::WorkerFailure { band, reason } => {
                write!(f, "Worker for band {} failed: {}", band, reason)
            }
            FilterError::AllocationFailure { bytes } => {
                write!(f, "Failed to allocate {} bytes for the output image", bytes)
            }
            FilterError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FilterError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FilterError {
    fn from(e: std::io::Error) -> Self {
        FilterError::Io(e)
    }
}

impl From<image::ImageError> for FilterError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => FilterError::Io(io),
            other => FilterError::InvalidImage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for FilterError {
    fn from(e: serde_json::Error) -> Self {
        FilterError::InvalidConfiguration(e.to_string())
    }
}

/// Reserve a zero-filled byte vector, reporting allocation failure instead of aborting.
pub(crate) fn try_alloc_bytes(len: usize) -> Result<Vec<u8>, FilterError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| FilterError::AllocationFailure { bytes: len })?;
    data.resize(len, 0);
    Ok(data)
}
