//! Image codecs that turn file bytes into a [`PixelBuffer`] and back.
//!
//! A codec carries whatever format-specific header data it needs in its
//! `Metadata` so an unmodified decode/encode cycle reproduces the file.
pub mod bmp;

pub use bmp::{BmpCodec, BmpMetadata};

use crate::error::FilterError;
use crate::image::PixelBuffer;

pub trait ImageCodec {
    type Metadata;

    fn decode(&self, bytes: &[u8]) -> Result<(PixelBuffer, Self::Metadata), FilterError>;

    fn encode(&self, buffer: &PixelBuffer, metadata: &Self::Metadata)
        -> Result<Vec<u8>, FilterError>;
}
