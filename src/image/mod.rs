pub mod buffer;
pub mod io;
pub mod traits;

/// Interleaved 8-bit channels per pixel (RGB).
pub const CHANNELS: usize = 3;

pub use self::buffer::{PixelBuffer, RowsMut};
pub use self::traits::RowSource;
