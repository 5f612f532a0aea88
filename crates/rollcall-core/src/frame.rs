//! Owned RGB24 frame with downscale and luminance helpers.

/// Luma values below this count as dark when probing for a covered lens.
const DARK_PIXEL_CUTOFF: u8 = 32;

/// A single video frame, tightly packed RGB24 (3 bytes per pixel, row-major).
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Build a frame from raw RGB24 bytes. `data` must hold exactly
    /// `width * height * 3` bytes.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width as usize) * (height as usize) * 3);
        Self { data, width, height }
    }

    /// Frame filled with a single color, mostly useful in tests.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self { data, width, height }
    }

    /// RGB triple at (x, y). Coordinates must be inside the frame.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// BT.601 luminance of the pixel at (x, y).
    pub fn luma_at(&self, x: u32, y: u32) -> u8 {
        let [r, g, b] = self.rgb_at(x, y);
        let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        y.round().clamp(0.0, 255.0) as u8
    }

    /// Average luminance across the whole frame (0.0 to 255.0).
    pub fn mean_luma(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let mut sum = 0.0f64;
        for y in 0..self.height {
            for x in 0..self.width {
                sum += self.luma_at(x, y) as f64;
            }
        }
        (sum / (self.width as f64 * self.height as f64)) as f32
    }

    /// Whether more than `threshold_pct` of pixels fall below the dark cutoff.
    ///
    /// A covered or failing camera produces frames that are almost entirely
    /// dark; normal indoor scenes are not.
    pub fn is_dark(&self, threshold_pct: f32) -> bool {
        let pixels = (self.width as usize) * (self.height as usize);
        if pixels == 0 {
            return true;
        }
        let mut dark = 0usize;
        for y in 0..self.height {
            for x in 0..self.width {
                if self.luma_at(x, y) < DARK_PIXEL_CUTOFF {
                    dark += 1;
                }
            }
        }
        (dark as f32 / pixels as f32) > threshold_pct
    }

    /// Uniform nearest-neighbor downscale by an integral divisor.
    ///
    /// A divisor of 2 halves both dimensions. Divisors below 2 return a
    /// copy of the frame unchanged. The result always keeps at least one
    /// pixel per axis for non-empty input.
    pub fn downscale(&self, divisor: u32) -> Frame {
        if divisor <= 1 || self.width == 0 || self.height == 0 {
            return self.clone();
        }

        let new_w = (self.width / divisor).max(1);
        let new_h = (self.height / divisor).max(1);
        let mut data = Vec::with_capacity(new_w as usize * new_h as usize * 3);

        for y in 0..new_h {
            let src_y = (y * divisor).min(self.height - 1);
            for x in 0..new_w {
                let src_x = (x * divisor).min(self.width - 1);
                data.extend_from_slice(&self.rgb_at(src_x, src_y));
            }
        }

        Frame { data, width: new_w, height: new_h }
    }

    /// Copy into an `image` buffer, for encoding to disk.
    pub fn to_image(&self) -> image::RgbImage {
        image::RgbImage::from_fn(self.width, self.height, |x, y| image::Rgb(self.rgb_at(x, y)))
    }
}

impl From<image::RgbImage> for Frame {
    fn from(img: image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Frame { data: img.into_raw(), width, height }
    }
}
