//! I/O helpers for RGB images and JSON.
//!
//! - `read_image`: `.bmp` through [`BmpCodec`] (headers kept), anything else
//!   through the `image` crate.
//! - `write_image_atomic`: write a sibling temporary file, then replace the
//!   target in one rename so a failed run never leaves a partial file behind.
//! - `load_rgb_image` / `save_rgb_image`: `image`-crate formats by extension.
//!   `save_rgb_image` also backs the non-BMP branch of `write_image_atomic`.
//! - `write_json_file`: pretty-print a serializable value to disk.
use super::PixelBuffer;
use crate::codec::{BmpCodec, BmpMetadata, ImageCodec};
use crate::error::FilterError;
use image::RgbImage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Load any format the `image` crate understands as 8-bit RGB.
pub fn load_rgb_image(path: &Path) -> Result<PixelBuffer, FilterError> {
    let img = image::open(path)
        .map_err(|e| FilterError::InvalidImage(format!("Failed to open {}: {e}", path.display())))?
        .into_rgb8();
    let width = img.width() as usize;
    let height = img.height() as usize;
    PixelBuffer::from_rgb(width, height, img.into_raw())
}

/// Save through the `image` crate, format chosen by extension.
pub fn save_rgb_image(buffer: &PixelBuffer, path: &Path) -> Result<(), FilterError> {
    ensure_parent_dir(path)?;
    to_rgb_image(buffer)?.save(path).map_err(|e| {
        FilterError::InvalidImage(format!("Failed to save {}: {e}", path.display()))
    })
}

fn to_rgb_image(buffer: &PixelBuffer) -> Result<RgbImage, FilterError> {
    let mut packed = Vec::with_capacity(buffer.row_bytes() * buffer.height());
    for y in 0..buffer.height() {
        let start = y * buffer.stride();
        packed.extend_from_slice(&buffer.data()[start..start + buffer.row_bytes()]);
    }
    RgbImage::from_raw(buffer.width() as u32, buffer.height() as u32, packed)
        .ok_or_else(|| FilterError::InvalidImage("Failed to create image buffer".to_string()))
}

fn is_bmp(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("bmp"))
}

/// Read `path`, keeping bitmap headers when the file is a `.bmp`.
pub fn read_image(path: &Path) -> Result<(PixelBuffer, Option<BmpMetadata>), FilterError> {
    if is_bmp(path) {
        let bytes = fs::read(path)?;
        let (buffer, meta) = BmpCodec.decode(&bytes).map_err(|e| match e {
            FilterError::InvalidImage(msg) => {
                FilterError::InvalidImage(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        Ok((buffer, Some(meta)))
    } else {
        Ok((load_rgb_image(path)?, None))
    }
}

/// Encode `buffer` for `path` and move it into place atomically.
///
/// `.bmp` targets reuse `meta` when present and a synthesised header
/// otherwise. Other formats are written with [`save_rgb_image`] to a sibling
/// temporary file that keeps the target's extension.
pub fn write_image_atomic(
    path: &Path,
    buffer: &PixelBuffer,
    meta: Option<&BmpMetadata>,
) -> Result<(), FilterError> {
    let bmp_bytes = if is_bmp(path) {
        Some(match meta {
            Some(meta) => BmpCodec.encode(buffer, meta)?,
            None => {
                let meta = BmpMetadata::for_dimensions(buffer.width(), buffer.height())?;
                BmpCodec.encode(buffer, &meta)?
            }
        })
    } else {
        image::ImageFormat::from_path(path).map_err(|e| {
            FilterError::InvalidConfiguration(format!(
                "Unsupported output format {}: {e}",
                path.display()
            ))
        })?;
        None
    };

    ensure_parent_dir(path)?;
    let tmp = temp_sibling(path);
    let written = match bmp_bytes {
        Some(bytes) => fs::write(&tmp, bytes).map_err(FilterError::from),
        None => save_rgb_image(buffer, &tmp),
    };
    commit(&tmp, path, written)
}

/// Rename `tmp` onto `path` if `written` succeeded; remove `tmp` otherwise.
fn commit(
    tmp: &Path,
    path: &Path,
    written: Result<(), FilterError>,
) -> Result<(), FilterError> {
    if let Err(e) = written.and_then(|_| fs::rename(tmp, path).map_err(FilterError::from)) {
        let _ = fs::remove_file(tmp);
        return Err(e);
    }
    Ok(())
}

/// `dir/name.ext` -> `dir/name.<pid>.tmp.ext`.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_stem()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Serialize a value as pretty JSON to `path`, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), FilterError> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<(), FilterError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("band_filter_io_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn gradient() -> PixelBuffer {
        let mut img = PixelBuffer::new(5, 3).unwrap();
        for y in 0..3 {
            for x in 0..5 {
                img.set_pixel(x, y, [x as u8 * 50, y as u8 * 80, 7]);
            }
        }
        img
    }

    #[test]
    fn bmp_write_then_read_keeps_pixels() {
        let dir = scratch_dir("bmp");
        let path = dir.join("out.bmp");
        let img = gradient();
        write_image_atomic(&path, &img, None).unwrap();
        let (back, meta) = read_image(&path).unwrap();
        assert!(back.same_pixels(&img));
        assert_eq!(meta.unwrap().pixel_offset(), 54);
        let leftovers: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn png_goes_through_image_crate() {
        let dir = scratch_dir("png");
        let path = dir.join("nested/out.png");
        let img = gradient();
        write_image_atomic(&path, &img, None).unwrap();
        let (back, meta) = read_image(&path).unwrap();
        assert!(meta.is_none());
        assert!(back.same_pixels(&img));
        let leftovers: Vec<_> = fs::read_dir(dir.join("nested")).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn save_then_load_through_image_crate() {
        let dir = scratch_dir("save");
        let path = dir.join("plain.png");
        let mut img = PixelBuffer::with_stride(5, 3, 16).unwrap();
        let src = gradient();
        for y in 0..3 {
            for x in 0..5 {
                img.set_pixel(x, y, src.pixel(x, y).unwrap());
            }
        }
        save_rgb_image(&img, &path).unwrap();
        let back = load_rgb_image(&path).unwrap();
        assert_eq!(back.stride(), 15);
        assert!(back.same_pixels(&src));
    }

    #[test]
    fn temp_file_keeps_the_extension() {
        let tmp = temp_sibling(Path::new("out/dir/image.png"));
        assert_eq!(tmp.parent(), Some(Path::new("out/dir")));
        assert_eq!(tmp.extension().and_then(|e| e.to_str()), Some("png"));
        assert_ne!(tmp, Path::new("out/dir/image.png"));
    }

    #[test]
    fn unsupported_extension_writes_nothing() {
        let dir = scratch_dir("unsupported");
        let path = dir.join("out.xyz");
        let err = write_image_atomic(&path, &gradient(), None).unwrap_err();
        assert!(matches!(err, FilterError::InvalidConfiguration(_)));
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn corrupt_bmp_names_the_file() {
        let dir = scratch_dir("corrupt");
        let path = dir.join("bad.bmp");
        fs::write(&path, b"not a bitmap at all").unwrap();
        match read_image(&path) {
            Err(FilterError::InvalidImage(msg)) => assert!(msg.contains("bad.bmp")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
