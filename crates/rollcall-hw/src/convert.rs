//! Pixel format conversion to RGB24.

use rollcall_core::Frame;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("buffer too short: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPG decode failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Convert packed YUYV (4:2:2) to RGB24 with BT.601 integer math.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]. Both pixels share
/// the chroma pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Frame, ConvertError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(ConvertError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for quad in yuyv[..expected].chunks_exact(4) {
        let u = quad[1];
        let v = quad[3];
        data.extend_from_slice(&yuv_to_rgb(quad[0], u, v));
        data.extend_from_slice(&yuv_to_rgb(quad[2], u, v));
    }

    Ok(Frame::new(width, height, data))
}

/// Expand 8-bit grayscale to RGB24 by replicating the luma channel.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<Frame, ConvertError> {
    let expected = (width * height) as usize;
    if grey.len() < expected {
        return Err(ConvertError::InvalidLength {
            expected,
            actual: grey.len(),
        });
    }

    let mut data = Vec::with_capacity(expected * 3);
    for &luma in &grey[..expected] {
        data.extend_from_slice(&[luma, luma, luma]);
    }

    Ok(Frame::new(width, height, data))
}

/// Decode one MJPG buffer to RGB24. Dimensions come from the JPEG itself.
pub fn mjpg_to_rgb(buf: &[u8]) -> Result<Frame, ConvertError> {
    let img = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)?;
    Ok(Frame::from(img.to_rgb8()))
}

/// BT.601 limited-range YUV to RGB for one pixel.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let clamp = |v: i32| -> u8 { v.clamp(0, 255) as u8 };
    [
        clamp((298 * c + 409 * e + 128) >> 8),
        clamp((298 * c - 100 * d - 208 * e + 128) >> 8),
        clamp((298 * c + 516 * d + 128) >> 8),
    ]
}
