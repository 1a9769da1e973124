use band_filter::PixelBuffer;

/// Generates a high-contrast RGB checkerboard.
pub fn checkerboard_rgb(width: usize, height: usize, cell: usize) -> PixelBuffer {
    assert!(width > 0 && height > 0, "image dimensions must be positive");
    assert!(cell > 0, "cell size must be positive");

    let mut img = PixelBuffer::new(width, height).unwrap();
    for y in 0..height {
        for x in 0..width {
            let sum = x / cell + y / cell;
            let px = if sum & 1 == 0 {
                [32u8, 40, 200]
            } else {
                [220u8, 210, 16]
            };
            img.set_pixel(x, y, px);
        }
    }
    img
}

/// Deterministic pseudo-random pixels (xorshift32).
pub fn noise_rgb(width: usize, height: usize, seed: u32) -> PixelBuffer {
    noise_rgb_with_stride(width, height, width * 3, seed)
}

/// Like [`noise_rgb`] but rows are `stride` bytes apart; padding is filled
/// with a marker byte so tests can check it survives.
pub fn noise_rgb_with_stride(width: usize, height: usize, stride: usize, seed: u32) -> PixelBuffer {
    let mut state = seed.max(1);
    let mut img = PixelBuffer::with_stride(width, height, stride).unwrap();
    img.data_mut().fill(PADDING_MARKER);
    for y in 0..height {
        for x in 0..width {
            let mut px = [0u8; 3];
            for c in &mut px {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                *c = (state >> 24) as u8;
            }
            img.set_pixel(x, y, px);
        }
    }
    img
}

pub const PADDING_MARKER: u8 = 0xAB;

/// Uniform colour.
pub fn solid_rgb(width: usize, height: usize, px: [u8; 3]) -> PixelBuffer {
    let data = px.iter().copied().cycle().take(width * height * 3).collect();
    PixelBuffer::from_rgb(width, height, data).unwrap()
}
