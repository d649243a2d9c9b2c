//! Frame type and pixel conversion: YUYV/GREY/MJPG to RGB, dark detection.

use image::{ImageFormat, Rgb, RgbImage};

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DARK_FRAME_RATIO: f32 = 0.95;

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Wrap an already-decoded image, classifying it as dark or not.
    pub fn from_image(image: RgbImage, sequence: u32) -> Self {
        let is_dark = is_dark_frame(&image, DARK_FRAME_RATIO);
        Self {
            image,
            sequence,
            is_dark,
        }
    }

    /// Mirror the frame horizontally (selfie view).
    pub fn mirrored(mut self) -> Self {
        image::imageops::flip_horizontal_in_place(&mut self.image);
        self
    }
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// BT.601 limited-range YUV to RGB.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> Rgb<u8> {
    let c = (y as f32 - 16.0) * 1.164;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    Rgb([
        clamp_u8(c + 1.596 * e),
        clamp_u8(c - 0.392 * d - 0.813 * e),
        clamp_u8(c + 2.017 * d),
    ])
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V], with U and V shared
/// by the pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected || width % 2 != 0 {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut image = RgbImage::new(width, height);
    for (i, chunk) in yuyv[..expected].chunks_exact(4).enumerate() {
        let [y0, u, y1, v] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let px = (i * 2) as u32;
        let (x, y) = (px % width, px / width);
        image.put_pixel(x, y, yuv_to_rgb(y0, u, v));
        image.put_pixel(x + 1, y, yuv_to_rgb(y1, u, v));
    }
    Ok(image)
}

/// Replicate 8-bit grayscale into three channels.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = width as usize * height as usize;
    if grey.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: grey.len(),
        });
    }
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let p = grey[(y * width + x) as usize];
        Rgb([p, p, p])
    }))
}

/// Decode a motion-JPEG buffer to RGB.
pub fn mjpeg_to_rgb(jpeg: &[u8]) -> Result<RgbImage, FrameError> {
    let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?;
    Ok(decoded.into_rgb8())
}

/// Check whether a frame is dark: more than `threshold_pct` of pixels have a
/// luma below 32.
pub fn is_dark_frame(image: &RgbImage, threshold_pct: f32) -> bool {
    let total = image.width() as usize * image.height() as usize;
    if total == 0 {
        return true;
    }
    let dark = image
        .pixels()
        .filter(|p| {
            let [r, g, b] = p.0;
            let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            luma < 32.0
        })
        .count();
    (dark as f32 / total as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame decode failed: {0}")]
    Decode(#[from] image::ImageError),
}
