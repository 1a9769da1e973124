//! 24-bit uncompressed Windows bitmap.
//!
//! Layout: 14-byte file header, an info header of at least 40 bytes
//! (BITMAPINFOHEADER or a later extension), optional bytes up to `bfOffBits`,
//! then rows padded to 4 bytes. Rows are bottom-up when the stored height is
//! positive. Pixels are BGR on disk and RGB in the buffer.
//!
//! Header bytes the filter does not interpret are kept verbatim in
//! [`BmpMetadata`] and written back on encode; only the size and dimension
//! fields are recomputed.
use super::ImageCodec;
use crate::error::FilterError;
use crate::image::{PixelBuffer, CHANNELS};

const FILE_HEADER_LEN: usize = 14;
const INFO_HEADER_MIN_LEN: usize = 40;
const HEADERS_LEN: usize = FILE_HEADER_LEN + INFO_HEADER_MIN_LEN;

// Offsets within the file header.
const BF_SIZE: usize = 2;
const BF_OFF_BITS: usize = 10;

// Offsets within the info header.
const BI_SIZE: usize = 0;
const BI_WIDTH: usize = 4;
const BI_HEIGHT: usize = 8;
const BI_PLANES: usize = 12;
const BI_BIT_COUNT: usize = 14;
const BI_COMPRESSION: usize = 16;
const BI_SIZE_IMAGE: usize = 20;
const BI_X_PELS: usize = 24;
const BI_Y_PELS: usize = 28;

const BI_RGB: u32 = 0;
/// 72 DPI in pixels per metre.
const DEFAULT_PELS_PER_METER: u32 = 2835;

/// Header bytes of a decoded bitmap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BmpMetadata {
    pub file_header: [u8; FILE_HEADER_LEN],
    /// The complete info header, `biSize` bytes long.
    pub info_header: Vec<u8>,
    /// Bytes between the info header and the pixel array.
    pub gap: Vec<u8>,
    /// Rows stored top-down (negative `biHeight`).
    pub top_down: bool,
}

impl BmpMetadata {
    /// A plain bottom-up 24-bit header for a `width` x `height` image.
    pub fn for_dimensions(width: usize, height: usize) -> Result<Self, FilterError> {
        let mut file_header = [0u8; FILE_HEADER_LEN];
        file_header[0..2].copy_from_slice(b"BM");
        let mut info_header = vec![0u8; INFO_HEADER_MIN_LEN];
        put_u32(&mut info_header, BI_SIZE, INFO_HEADER_MIN_LEN as u32);
        put_u16(&mut info_header, BI_PLANES, 1);
        put_u16(&mut info_header, BI_BIT_COUNT, 24);
        put_u32(&mut info_header, BI_COMPRESSION, BI_RGB);
        put_u32(&mut info_header, BI_X_PELS, DEFAULT_PELS_PER_METER);
        put_u32(&mut info_header, BI_Y_PELS, DEFAULT_PELS_PER_METER);
        let mut meta = Self {
            file_header,
            info_header,
            gap: Vec::new(),
            top_down: false,
        };
        meta.update_dimensions(width, height)?;
        Ok(meta)
    }

    pub fn width(&self) -> i32 {
        get_i32(&self.info_header, BI_WIDTH)
    }

    pub fn height(&self) -> i32 {
        get_i32(&self.info_header, BI_HEIGHT)
    }

    pub fn pixel_offset(&self) -> usize {
        FILE_HEADER_LEN + self.info_header.len() + self.gap.len()
    }

    fn update_dimensions(&mut self, width: usize, height: usize) -> Result<(), FilterError> {
        let stride = file_stride(width)?;
        let image_size = stride
            .checked_mul(height)
            .ok_or_else(|| too_large(width, height))?;
        let offset = self.pixel_offset();
        let file_size = offset
            .checked_add(image_size)
            .ok_or_else(|| too_large(width, height))?;

        let w = i32::try_from(width).map_err(|_| too_large(width, height))?;
        let h = i32::try_from(height).map_err(|_| too_large(width, height))?;
        let file_size = u32::try_from(file_size).map_err(|_| too_large(width, height))?;
        let image_size = u32::try_from(image_size).map_err(|_| too_large(width, height))?;
        let offset = u32::try_from(offset).map_err(|_| too_large(width, height))?;

        put_u32(&mut self.file_header, BF_SIZE, file_size);
        put_u32(&mut self.file_header, BF_OFF_BITS, offset);
        put_i32(&mut self.info_header, BI_WIDTH, w);
        put_i32(&mut self.info_header, BI_HEIGHT, if self.top_down { -h } else { h });
        put_u32(&mut self.info_header, BI_SIZE_IMAGE, image_size);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BmpCodec;

impl ImageCodec for BmpCodec {
    type Metadata = BmpMetadata;

    fn decode(&self, bytes: &[u8]) -> Result<(PixelBuffer, BmpMetadata), FilterError> {
        if bytes.len() <= HEADERS_LEN {
            return Err(invalid(format!(
                "file of {} bytes is too small for a bitmap",
                bytes.len()
            )));
        }
        if &bytes[0..2] != b"BM" {
            return Err(invalid("missing BM signature"));
        }
        let off_bits = get_u32(bytes, BF_OFF_BITS) as usize;
        let info_len = get_u32(bytes, FILE_HEADER_LEN + BI_SIZE) as usize;
        if info_len < INFO_HEADER_MIN_LEN {
            return Err(invalid(format!("unsupported info header size {info_len}")));
        }
        let info_end = FILE_HEADER_LEN + info_len;
        if info_end > off_bits || off_bits > bytes.len() {
            return Err(invalid(format!(
                "pixel offset {off_bits} is inconsistent with a {info_len}-byte info header"
            )));
        }
        let info = &bytes[FILE_HEADER_LEN..info_end];

        let planes = get_u16(info, BI_PLANES);
        let bit_count = get_u16(info, BI_BIT_COUNT);
        let compression = get_u32(info, BI_COMPRESSION);
        if planes != 1 {
            return Err(invalid(format!("expected 1 colour plane, found {planes}")));
        }
        if bit_count != 24 {
            return Err(invalid(format!(
                "only 24-bit bitmaps are supported, found {bit_count}-bit"
            )));
        }
        if compression != BI_RGB {
            return Err(invalid(format!(
                "compressed bitmaps are not supported (compression {compression})"
            )));
        }

        let raw_width = get_i32(info, BI_WIDTH);
        let raw_height = get_i32(info, BI_HEIGHT);
        if raw_width <= 0 || raw_height == 0 {
            return Err(invalid(format!(
                "invalid dimensions {raw_width}x{raw_height}"
            )));
        }
        let width = raw_width as usize;
        let height = raw_height.unsigned_abs() as usize;
        let top_down = raw_height < 0;

        let stride = file_stride(width)?;
        let pixel_len = stride
            .checked_mul(height)
            .ok_or_else(|| too_large(width, height))?;
        let pixels = bytes
            .get(off_bits..)
            .and_then(|rest| rest.get(..pixel_len))
            .ok_or_else(|| {
                invalid(format!(
                    "pixel data truncated: need {} bytes at offset {}, file has {}",
                    pixel_len,
                    off_bits,
                    bytes.len()
                ))
            })?;

        let mut buffer = PixelBuffer::with_stride(width, height, stride)?;
        let row_bytes = width * CHANNELS;
        let data = buffer.data_mut();
        for (file_row, src) in pixels.chunks_exact(stride).enumerate() {
            let y = if top_down { file_row } else { height - 1 - file_row };
            let dst = &mut data[y * stride..(y + 1) * stride];
            swap_red_blue(&src[..row_bytes], &mut dst[..row_bytes]);
            dst[row_bytes..].copy_from_slice(&src[row_bytes..]);
        }

        let mut file_header = [0u8; FILE_HEADER_LEN];
        file_header.copy_from_slice(&bytes[..FILE_HEADER_LEN]);
        let meta = BmpMetadata {
            file_header,
            info_header: info.to_vec(),
            gap: bytes[info_end..off_bits].to_vec(),
            top_down,
        };
        Ok((buffer, meta))
    }

    fn encode(&self, buffer: &PixelBuffer, metadata: &BmpMetadata) -> Result<Vec<u8>, FilterError> {
        if metadata.info_header.len() < INFO_HEADER_MIN_LEN {
            return Err(invalid("metadata carries a truncated info header"));
        }
        let width = buffer.width();
        let height = buffer.height();
        let mut meta = metadata.clone();
        meta.update_dimensions(width, height)?;

        let stride = file_stride(width)?;
        let row_bytes = buffer.row_bytes();
        let carry_padding = buffer.stride() == stride;
        let total = meta.pixel_offset() + stride * height;

        let mut out = Vec::new();
        out.try_reserve_exact(total)
            .map_err(|_| FilterError::AllocationFailure { bytes: total })?;
        out.extend_from_slice(&meta.file_header);
        out.extend_from_slice(&meta.info_header);
        out.extend_from_slice(&meta.gap);

        let mut row = vec![0u8; stride];
        let data = buffer.data();
        for file_row in 0..height {
            let y = if meta.top_down { file_row } else { height - 1 - file_row };
            let src = &data[y * buffer.stride()..];
            swap_red_blue(&src[..row_bytes], &mut row[..row_bytes]);
            if carry_padding {
                row[row_bytes..].copy_from_slice(&src[row_bytes..stride]);
            }
            out.extend_from_slice(&row);
        }
        debug_assert_eq!(out.len(), total);
        Ok(out)
    }
}

/// Bytes per stored row: pixel bytes rounded up to a multiple of 4.
pub fn file_stride(width: usize) -> Result<usize, FilterError> {
    width
        .checked_mul(CHANNELS)
        .and_then(|b| b.checked_add(3))
        .map(|b| b & !3)
        .ok_or_else(|| invalid(format!("width {width} is too large")))
}

fn swap_red_blue(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(CHANNELS).zip(dst.chunks_exact_mut(CHANNELS)) {
        d[0] = s[2];
        d[1] = s[1];
        d[2] = s[0];
    }
}

fn invalid(msg: impl Into<String>) -> FilterError {
    FilterError::InvalidImage(msg.into())
}

fn too_large(width: usize, height: usize) -> FilterError {
    invalid(format!("{width}x{height} is too large for a bitmap"))
}

fn get_u16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn get_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn get_i32(b: &[u8], at: usize) -> i32 {
    get_u32(b, at) as i32
}

fn put_u16(b: &mut [u8], at: usize, v: u16) {
    b[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_u32(b: &mut [u8], at: usize, v: u32) {
    b[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_i32(b: &mut [u8], at: usize, v: i32) {
    put_u32(b, at, v as u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(width: usize, height: usize) -> PixelBuffer {
        let mut img = PixelBuffer::new(width, height).unwrap();
        for y in 0..height {
            for x in 0..width {
                img.set_pixel(x, y, [(x * 40) as u8, (y * 60) as u8, 200]);
            }
        }
        img
    }

    #[test]
    fn stride_rounds_to_four_bytes() {
        assert_eq!(file_stride(1).unwrap(), 4);
        assert_eq!(file_stride(4).unwrap(), 12);
        assert_eq!(file_stride(5).unwrap(), 16);
    }

    #[test]
    fn synthesised_header_is_54_bytes_bottom_up() {
        let meta = BmpMetadata::for_dimensions(3, 2).unwrap();
        assert_eq!(meta.pixel_offset(), 54);
        assert_eq!(meta.width(), 3);
        assert_eq!(meta.height(), 2);
        assert_eq!(get_u32(&meta.file_header, BF_SIZE), 54 + 12 * 2);
    }

    #[test]
    fn stored_rows_are_bottom_up_bgr() {
        let img = sample(2, 2);
        let meta = BmpMetadata::for_dimensions(2, 2).unwrap();
        let bytes = BmpCodec.encode(&img, &meta).unwrap();
        assert_eq!(bytes.len(), 54 + 8 * 2);
        // First stored row is the bottom image row (y = 1): BGR of (0,1).
        assert_eq!(&bytes[54..57], &[200, 60, 0]);
        // Second stored row is y = 0, pixel (1,0).
        assert_eq!(&bytes[62 + 3..62 + 6], &[200, 0, 40]);
    }

    #[test]
    fn decode_restores_top_down_rgb() {
        let img = sample(3, 4);
        let bytes = BmpCodec
            .encode(&img, &BmpMetadata::for_dimensions(3, 4).unwrap())
            .unwrap();
        let (decoded, meta) = BmpCodec.decode(&bytes).unwrap();
        assert_eq!(decoded.stride(), 12);
        assert!(decoded.same_pixels(&img));
        assert!(!meta.top_down);
    }

    #[test]
    fn negative_height_is_top_down() {
        let img = sample(2, 3);
        let mut meta = BmpMetadata::for_dimensions(2, 3).unwrap();
        meta.top_down = true;
        let bytes = BmpCodec.encode(&img, &meta).unwrap();
        assert_eq!(get_i32(&bytes, FILE_HEADER_LEN + BI_HEIGHT), -3);
        assert_eq!(&bytes[54..57], &[200, 0, 0]);
        let (decoded, meta) = BmpCodec.decode(&bytes).unwrap();
        assert!(meta.top_down);
        assert!(decoded.same_pixels(&img));
    }

    #[test]
    fn gap_bytes_survive_reencode() {
        let img = sample(2, 2);
        let mut meta = BmpMetadata::for_dimensions(2, 2).unwrap();
        meta.gap = vec![1, 2, 3, 4, 5, 6];
        let bytes = BmpCodec.encode(&img, &meta).unwrap();
        assert_eq!(get_u32(&bytes, BF_OFF_BITS), 60);
        let (decoded, decoded_meta) = BmpCodec.decode(&bytes).unwrap();
        assert_eq!(decoded_meta.gap, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(BmpCodec.encode(&decoded, &decoded_meta).unwrap(), bytes);
    }

    #[test]
    fn rejects_malformed_files() {
        let img = sample(2, 2);
        let good = BmpCodec
            .encode(&img, &BmpMetadata::for_dimensions(2, 2).unwrap())
            .unwrap();

        let mut bad_sig = good.clone();
        bad_sig[0] = b'X';
        let mut bad_bits = good.clone();
        put_u16(&mut bad_bits, FILE_HEADER_LEN + BI_BIT_COUNT, 32);
        let mut compressed = good.clone();
        put_u32(&mut compressed, FILE_HEADER_LEN + BI_COMPRESSION, 1);
        let mut zero_height = good.clone();
        put_i32(&mut zero_height, FILE_HEADER_LEN + BI_HEIGHT, 0);
        let truncated = good[..good.len() - 1].to_vec();

        for (name, bytes) in [
            ("signature", bad_sig),
            ("bit depth", bad_bits),
            ("compression", compressed),
            ("zero height", zero_height),
            ("truncated", truncated),
            ("header only", good[..54].to_vec()),
        ] {
            assert!(
                matches!(BmpCodec.decode(&bytes), Err(FilterError::InvalidImage(_))),
                "{name}"
            );
        }
    }
}
