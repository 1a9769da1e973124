//! Point-to-point frame transports between the coordinator and its workers.
//!
//! A [`Transport`] moves opaque byte frames reliably and in order. Failures
//! surface as [`TransportError`]; a closed peer is `Disconnected`, never a
//! silently missing frame.
//!
//! - [`channel`] – in-process endpoints backed by `std::sync::mpsc`; the only
//!   thing crossing between coordinator and worker is owned frame bytes.
//! - [`stream`] – length-prefixed frames over any `Read`/`Write` pair, used to
//!   talk to worker child processes over their stdin/stdout.
pub mod channel;
pub mod stream;

pub use channel::{channel_pair, ChannelTransport};
pub use stream::StreamTransport;

use crate::error::FilterError;
use crate::worker::{handle_request, BandRequest};
use log::debug;

/// Frames larger than this are rejected as corrupt.
pub const MAX_FRAME_BYTES: usize = 1 << 30;

#[derive(Debug)]
pub enum TransportError {
    /// The peer closed its end.
    Disconnected,
    FrameTooLarge(usize),
    Io(std::io::Error),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Disconnected => write!(f, "peer disconnected"),
            TransportError::FrameTooLarge(n) => {
                write!(f, "frame of {} bytes exceeds limit of {}", n, MAX_FRAME_BYTES)
            }
            TransportError::Io(e) => write!(f, "transport I/O error: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::BrokenPipe => {
                TransportError::Disconnected
            }
            _ => TransportError::Io(e),
        }
    }
}

pub trait Transport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Block until the next frame arrives.
    fn recv(&mut self) -> Result<Vec<u8>, TransportError>;

    /// Close the sending direction so the peer observes end-of-stream.
    fn close(&mut self) {}
}

/// Worker side: answer band requests until the coordinator disconnects.
///
/// Returns the number of requests served. A frame that does not decode ends
/// the loop with an error.
pub fn serve<T: Transport + ?Sized>(link: &mut T) -> Result<usize, FilterError> {
    let mut served = 0usize;
    loop {
        let frame = match link.recv() {
            Ok(frame) => frame,
            Err(TransportError::Disconnected) => {
                debug!("worker: coordinator closed the link after {} request(s)", served);
                return Ok(served);
            }
            Err(e) => {
                return Err(FilterError::InvalidConfiguration(format!(
                    "worker transport failed: {e}"
                )))
            }
        };
        let request = BandRequest::decode(&frame)?;
        debug!(
            "worker: band {} rows {}..{}",
            request.band_index, request.start_row, request.end_row
        );
        let reply = handle_request(&request).encode()?;
        link.send(&reply)
            .map_err(|e| FilterError::worker(request.band_index, e.to_string()))?;
        served += 1;
    }
}
