//! V4L2 webcam capture via the `v4l` crate.

use crate::convert;
use rollcall_core::{Frame, SourceError, VideoSource};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Device opened when no camera is configured.
pub const DEFAULT_DEVICE: &str = "/dev/video0";

/// Resolution requested from the driver. Drivers are free to negotiate
/// something else.
const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;

/// Fraction of near-black pixels above which a frame counts as dark.
const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// Highest /dev/videoN index probed during discovery.
const MAX_PROBED_DEVICES: usize = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera at {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("device does not support video capture")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 capture device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion JPEG (one JPEG per frame, common on UVC webcams).
    Mjpg,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<PixelFormat> {
        [
            (FourCC::new(b"YUYV"), PixelFormat::Yuyv),
            (FourCC::new(b"MJPG"), PixelFormat::Mjpg),
            (FourCC::new(b"GREY"), PixelFormat::Grey),
        ]
        .into_iter()
        .find_map(|(code, format)| (fourcc == code).then_some(format))
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    device_path: String,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    /// Set after the first dark-frame warning so the log is not flooded.
    warned_dark: bool,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            // EBUSY surfaces as an opaque io error string.
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy(device_path.to_string())
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("query capabilities: {e}")))?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        let (width, height, pixel_format) = negotiate_format(&device)?;

        Ok(Self {
            device,
            device_path: device_path.to_string(),
            width,
            height,
            pixel_format,
            warned_dark: false,
        })
    }

    /// Capture a single RGB frame.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| CameraError::CaptureFailed(format!("mmap stream: {e}")))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("dequeue: {e}")))?;
        tracing::trace!(seq = meta.sequence, bytes = buf.len(), "dequeued frame");

        let frame = self.buf_to_frame(buf)?;

        if !self.warned_dark && frame.is_dark(DARK_FRAME_THRESHOLD) {
            self.warned_dark = true;
            tracing::warn!(
                device = %self.device_path,
                "camera frames are almost entirely dark, is the lens covered?"
            );
        }

        Ok(frame)
    }

    /// Convert a raw buffer to an RGB frame based on the negotiated format.
    fn buf_to_frame(&self, buf: &[u8]) -> Result<Frame, CameraError> {
        match self.pixel_format {
            PixelFormat::Yuyv => convert::yuyv_to_rgb(buf, self.width, self.height),
            PixelFormat::Mjpg => convert::mjpg_to_rgb(buf),
            PixelFormat::Grey => convert::grey_to_rgb(buf, self.width, self.height),
        }
        .map_err(|e| {
            CameraError::CaptureFailed(format!("{:?} conversion failed: {e}", self.pixel_format))
        })
    }

    /// List V4L2 capture devices by probing /dev/video0 through /dev/video15.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_PROBED_DEVICES)
            .map(|i| format!("/dev/video{i}"))
            .filter_map(probe_device)
            .collect()
    }
}

/// Ask the driver for YUYV at the default resolution and classify whatever
/// it actually gives back. Returns (width, height, format).
fn negotiate_format(device: &Device) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut wanted = device
        .format()
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("query format: {e}")))?;
    wanted.fourcc = FourCC::new(b"YUYV");
    wanted.width = CAPTURE_WIDTH;
    wanted.height = CAPTURE_HEIGHT;

    let negotiated = device
        .set_format(&wanted)
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("set format: {e}")))?;

    let Some(pixel_format) = PixelFormat::from_fourcc(negotiated.fourcc) else {
        return Err(CameraError::FormatNegotiationFailed(format!(
            "driver offered {:?}, need YUYV, MJPG, or GREY",
            negotiated.fourcc
        )));
    };

    tracing::info!(
        width = negotiated.width,
        height = negotiated.height,
        fourcc = ?negotiated.fourcc,
        "negotiated format"
    );

    Ok((negotiated.width, negotiated.height, pixel_format))
}

fn probe_device(path: String) -> Option<DeviceInfo> {
    if !Path::new(&path).exists() {
        return None;
    }
    let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        return None;
    }
    Some(DeviceInfo {
        path,
        name: caps.card,
        driver: caps.driver,
        bus: caps.bus,
    })
}

impl VideoSource for Camera {
    fn next_frame(&mut self) -> Result<Frame, SourceError> {
        self.capture_frame()
            .map_err(|e| SourceError::Acquisition(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_classification() {
        assert_eq!(
            PixelFormat::from_fourcc(FourCC::new(b"YUYV")),
            Some(PixelFormat::Yuyv)
        );
        assert_eq!(
            PixelFormat::from_fourcc(FourCC::new(b"MJPG")),
            Some(PixelFormat::Mjpg)
        );
        assert_eq!(
            PixelFormat::from_fourcc(FourCC::new(b"GREY")),
            Some(PixelFormat::Grey)
        );
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"H264")), None);
    }
}
