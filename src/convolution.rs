//! Direct 2D convolution of interleaved RGB rows.
//!
//! For output pixel `(x, y)` and each channel `c`:
//!
//! ```text
//! sum_c = Σ_ky Σ_kx weight[ky][kx] * sample_c(x + kx - r, y + ky - r)
//! ```
//!
//! with `r = kernel.radius()`. Taps outside the image resolve through the
//! [`BoundaryPolicy`]. Accumulation is `f32` (`f64` under `Renormalize`) in a
//! fixed tap order (kernel rows top to bottom, columns left to right), so a
//! pixel's value does not depend on which band or worker computed it. The only rounding is the final
//! clamp to `[0, 255]` and round-to-nearest.
use crate::error::FilterError;
use crate::image::{PixelBuffer, RowSource, CHANNELS};
use crate::kernel::{BoundaryPolicy, Kernel};
use std::ops::Range;

/// In-bounds weight below which `Renormalize` falls back to the raw sum.
const RENORMALIZE_EPS: f64 = 1e-6;

/// Compute one output pixel.
pub fn apply<S: RowSource + ?Sized>(
    src: &S,
    x: usize,
    y: usize,
    kernel: &Kernel,
    policy: BoundaryPolicy,
) -> [u8; CHANNELS] {
    let ctx = TapContext::new(kernel, policy, src.width());
    let mut taps = Vec::with_capacity(kernel.size());
    ctx.gather_rows(src, y, &mut taps);
    ctx.accumulate(&taps, x)
}

/// Convolve image rows `rows` of `src` into `out`.
///
/// Row `rows.start + i` is written to `out[i * out_stride..]`, pixel bytes
/// only; any padding in `out` is left alone. `src` must hold every input row
/// the kernel touches, i.e. `rows` widened by the radius and clipped to the
/// image.
pub fn convolve_rows<S: RowSource + ?Sized>(
    src: &S,
    kernel: &Kernel,
    policy: BoundaryPolicy,
    rows: Range<usize>,
    out: &mut [u8],
    out_stride: usize,
) -> Result<(), FilterError> {
    if rows.is_empty() {
        return Ok(());
    }
    let height = src.image_height();
    if rows.end > height {
        return Err(FilterError::InvalidConfiguration(format!(
            "output rows {:?} exceed image height {}",
            rows, height
        )));
    }
    let row_bytes = src.row_bytes();
    if out_stride < row_bytes {
        return Err(FilterError::InvalidConfiguration(format!(
            "output stride {} is smaller than a row ({} bytes)",
            out_stride, row_bytes
        )));
    }
    let needed_out = (rows.len() - 1) * out_stride + row_bytes;
    if out.len() < needed_out {
        return Err(FilterError::InvalidConfiguration(format!(
            "output slice holds {} bytes, {} rows need {}",
            out.len(),
            rows.len(),
            needed_out
        )));
    }
    let radius = kernel.radius();
    let needed_in = rows.start.saturating_sub(radius)..(rows.end + radius).min(height);
    if !src.covers(&needed_in) {
        return Err(FilterError::InvalidConfiguration(format!(
            "source holds rows {:?} but rows {:?} are required",
            src.held_rows(),
            needed_in
        )));
    }

    let ctx = TapContext::new(kernel, policy, src.width());
    let mut taps = Vec::with_capacity(kernel.size());
    for (i, y) in rows.enumerate() {
        ctx.gather_rows(src, y, &mut taps);
        let dst = &mut out[i * out_stride..i * out_stride + row_bytes];
        for (x, px) in dst.chunks_exact_mut(CHANNELS).enumerate() {
            px.copy_from_slice(&ctx.accumulate(&taps, x));
        }
    }
    Ok(())
}

/// Single-pass sweep over the whole image; the reference every partitioned
/// run must reproduce byte for byte.
pub fn convolve_reference(
    src: &PixelBuffer,
    kernel: &Kernel,
    policy: BoundaryPolicy,
) -> Result<PixelBuffer, FilterError> {
    let mut out = src.try_clone()?;
    let stride = out.stride();
    convolve_rows(src, kernel, policy, 0..src.height(), out.data_mut(), stride)?;
    Ok(out)
}

struct TapContext<'k> {
    kernel: &'k Kernel,
    policy: BoundaryPolicy,
    radius: isize,
    width: isize,
    /// Sum of all weights, in `f64` and in tap order.
    total_weight: f64,
}

impl<'k> TapContext<'k> {
    fn new(kernel: &'k Kernel, policy: BoundaryPolicy, width: usize) -> Self {
        Self {
            kernel,
            policy,
            radius: kernel.radius() as isize,
            width: width as isize,
            total_weight: kernel.weights().iter().map(|&w| f64::from(w)).sum(),
        }
    }

    /// Resolve the source row for each kernel row; `None` marks a padded row.
    fn gather_rows<'a, S: RowSource + ?Sized>(
        &self,
        src: &'a S,
        y: usize,
        taps: &mut Vec<Option<&'a [u8]>>,
    ) {
        taps.clear();
        let height = src.image_height() as isize;
        for ky in 0..self.kernel.size() {
            let iy = y as isize + ky as isize - self.radius;
            let row = if (0..height).contains(&iy) {
                Some(src.row(iy as usize))
            } else if self.policy == BoundaryPolicy::Clamp {
                Some(src.row(iy.clamp(0, height - 1) as usize))
            } else {
                None
            };
            taps.push(row);
        }
    }

    #[inline]
    fn accumulate(&self, taps: &[Option<&[u8]>], x: usize) -> [u8; CHANNELS] {
        if self.policy == BoundaryPolicy::Renormalize {
            return self.accumulate_renormalized(taps, x);
        }
        let size = self.kernel.size();
        let mut acc = [0.0f32; CHANNELS];
        for (ky, row) in taps.iter().enumerate() {
            let Some(row) = row else { continue };
            for kx in 0..size {
                let Some(ix) = self.column(x, kx) else { continue };
                let w = self.kernel.weight(ky, kx);
                let base = ix * CHANNELS;
                for (c, a) in acc.iter_mut().enumerate() {
                    *a += w * row[base + c] as f32;
                }
            }
        }
        acc.map(to_u8)
    }

    /// In-bounds taps only, rescaled by `total / in_bounds` in `f64`.
    ///
    /// The weighted sum is divided by the in-bounds weight before the rescale,
    /// so a uniform kernel yields the exact mean of the valid neighbours.
    fn accumulate_renormalized(&self, taps: &[Option<&[u8]>], x: usize) -> [u8; CHANNELS] {
        let size = self.kernel.size();
        let mut acc = [0.0f64; CHANNELS];
        let mut in_bounds = 0.0f64;
        for (ky, row) in taps.iter().enumerate() {
            let Some(row) = row else { continue };
            for kx in 0..size {
                let Some(ix) = self.column(x, kx) else { continue };
                let w = f64::from(self.kernel.weight(ky, kx));
                let base = ix * CHANNELS;
                for (c, a) in acc.iter_mut().enumerate() {
                    *a += w * f64::from(row[base + c]);
                }
                in_bounds += w;
            }
        }
        if in_bounds != self.total_weight && in_bounds.abs() > RENORMALIZE_EPS {
            for a in &mut acc {
                *a = *a / in_bounds * self.total_weight;
            }
        }
        acc.map(|v| snap(v).clamp(0.0, 255.0).round() as u8)
    }

    /// Source column for kernel column `kx`, or `None` for a padded tap.
    #[inline]
    fn column(&self, x: usize, kx: usize) -> Option<usize> {
        let ix = x as isize + kx as isize - self.radius;
        if (0..self.width).contains(&ix) {
            Some(ix as usize)
        } else if self.policy == BoundaryPolicy::Clamp {
            Some(ix.clamp(0, self.width - 1) as usize)
        } else {
            None
        }
    }
}

/// Drop the residue of `f32` weight rounding so exact halves stay halves.
#[inline]
fn snap(v: f64) -> f64 {
    (v * 1e4).round() / 1e4
}

#[inline]
fn to_u8(v: f32) -> u8 {
    v.clamp(0.0, 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelPreset;

    fn filled(w: usize, h: usize, v: u8) -> PixelBuffer {
        PixelBuffer::from_rgb(w, h, vec![v; w * h * CHANNELS]).unwrap()
    }

    fn ramp(w: usize, h: usize) -> PixelBuffer {
        let mut data = Vec::with_capacity(w * h * CHANNELS);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 20) as u8, (y * 30) as u8, ((x + y) * 7) as u8]);
            }
        }
        PixelBuffer::from_rgb(w, h, data).unwrap()
    }

    #[test]
    fn zero_pad_corner_and_edge_of_white_image() {
        let img = filled(4, 4, 255);
        let k = Kernel::box_blur();
        // Corner: 4 of 9 taps inside the image.
        assert_eq!(apply(&img, 0, 0, &k, BoundaryPolicy::ZeroPad), [113; 3]);
        // Top edge: 6 of 9 taps inside.
        assert_eq!(apply(&img, 1, 0, &k, BoundaryPolicy::ZeroPad), [170; 3]);
        // Interior: all 9 taps.
        assert_eq!(apply(&img, 1, 1, &k, BoundaryPolicy::ZeroPad), [255; 3]);
    }

    #[test]
    fn clamp_and_renormalize_keep_flat_images_flat() {
        let img = filled(5, 3, 200);
        let k = Kernel::box_blur();
        for policy in [BoundaryPolicy::Clamp, BoundaryPolicy::Renormalize] {
            for (x, y) in [(0, 0), (4, 2), (2, 0), (2, 1)] {
                assert_eq!(apply(&img, x, y, &k, policy), [200; 3], "{policy:?} at ({x},{y})");
            }
        }
    }

    #[test]
    fn clamp_replicates_per_axis() {
        // Single row [10, 20, 30] (all channels), kernel picks the left neighbour.
        let img = PixelBuffer::from_rgb(3, 1, vec![10, 10, 10, 20, 20, 20, 30, 30, 30]).unwrap();
        let left = Kernel::new(3, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(apply(&img, 0, 0, &left, BoundaryPolicy::Clamp), [10; 3]);
        assert_eq!(apply(&img, 2, 0, &left, BoundaryPolicy::Clamp), [20; 3]);
        assert_eq!(apply(&img, 0, 0, &left, BoundaryPolicy::ZeroPad), [0; 3]);
    }

    #[test]
    fn renormalize_averages_valid_neighbours() {
        let img = PixelBuffer::from_rgb(2, 2, vec![0, 0, 0, 90, 90, 90, 30, 30, 30, 60, 60, 60])
            .unwrap();
        let out = apply(&img, 0, 0, &Kernel::box_blur(), BoundaryPolicy::Renormalize);
        // Mean of the four pixels.
        assert_eq!(out, [45; 3]);
    }

    #[test]
    fn renormalized_corner_mean_rounds_half_up() {
        // Corner of a 2x2 image sees all four pixels; the mean is (a + b + 0 + 1) / 4.
        let k = Kernel::box_blur();
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                let img = PixelBuffer::from_rgb(2, 2, vec![a, b, 0, b, 0, a, 0, 1, 1, 1, 0, 0])
                    .unwrap();
                let expected = ((f64::from(a) + f64::from(b) + 1.0) / 4.0).round() as u8;
                let out = apply(&img, 0, 0, &k, BoundaryPolicy::Renormalize);
                assert_eq!(out[0], expected, "a={a} b={b}");
            }
        }
        // 70 + 3 + 0 + 1 = 74, mean 18.5.
        let img = PixelBuffer::from_rgb(2, 2, vec![70, 0, 0, 3, 0, 0, 0, 0, 0, 1, 0, 0]).unwrap();
        assert_eq!(apply(&img, 0, 0, &k, BoundaryPolicy::Renormalize)[0], 19);
    }

    #[test]
    fn renormalized_wide_uniform_kernel_is_the_mean() {
        // 1/25 rounds down in f32, so the rescale lands just under the half.
        let k = Kernel::new(5, vec![1.0 / 25.0; 25]).unwrap();
        let img = PixelBuffer::from_rgb(2, 2, vec![70, 8, 0, 3, 8, 0, 0, 8, 0, 1, 9, 255])
            .unwrap();
        // Red 74 / 4 = 18.5, green 33 / 4 = 8.25, blue 255 / 4 = 63.75.
        assert_eq!(
            apply(&img, 1, 1, &k, BoundaryPolicy::Renormalize),
            [19, 8, 64]
        );
    }

    #[test]
    fn results_saturate_at_channel_limits() {
        let img = ramp(4, 4);
        let out = convolve_reference(&img, &KernelPreset::Sharpen.kernel(), BoundaryPolicy::ZeroPad)
            .unwrap();
        // Only the right and lower neighbours exist; every channel goes negative.
        assert_eq!(out.pixel(0, 0), Some([0, 0, 0]));
        // Right and lower neighbours are padded; green overshoots 255.
        assert_eq!(out.pixel(3, 3), Some([200, 255, 140]));

        let edges =
            convolve_reference(&img, &KernelPreset::EdgeDetect.kernel(), BoundaryPolicy::Clamp)
                .unwrap();
        // Red is linear in x, so the Laplacian-style kernel cancels it.
        assert_eq!(edges.pixel(1, 1).unwrap()[0], 0);
    }

    #[test]
    fn identity_kernel_reproduces_input() {
        let img = ramp(6, 5);
        let out =
            convolve_reference(&img, &KernelPreset::Identity.kernel(), BoundaryPolicy::ZeroPad)
                .unwrap();
        assert!(out.same_pixels(&img));
    }

    #[test]
    fn row_sweep_matches_per_pixel_apply() {
        let img = ramp(7, 6);
        let k = Kernel::new(5, (0..25).map(|i| i as f32 / 300.0).collect()).unwrap();
        for policy in [
            BoundaryPolicy::ZeroPad,
            BoundaryPolicy::Clamp,
            BoundaryPolicy::Renormalize,
        ] {
            let out = convolve_reference(&img, &k, policy).unwrap();
            for y in 0..6 {
                for x in 0..7 {
                    assert_eq!(out.pixel(x, y).unwrap(), apply(&img, x, y, &k, policy));
                }
            }
        }
    }

    #[test]
    fn sweep_leaves_row_padding_untouched() {
        let mut data = vec![9u8; 2 * 8];
        data[6] = 0xAA;
        data[7] = 0xBB;
        let img = PixelBuffer::from_raw(2, 2, 8, data).unwrap();
        let out = convolve_reference(&img, &Kernel::box_blur(), BoundaryPolicy::ZeroPad).unwrap();
        assert_eq!(&out.data()[6..8], &[0xAA, 0xBB]);
    }

    #[test]
    fn rejects_undersized_output() {
        let img = filled(3, 3, 1);
        let mut out = vec![0u8; 10];
        let err = convolve_rows(
            &img,
            &Kernel::box_blur(),
            BoundaryPolicy::ZeroPad,
            0..2,
            &mut out,
            9,
        );
        assert!(matches!(err, Err(FilterError::InvalidConfiguration(_))));
    }
}
