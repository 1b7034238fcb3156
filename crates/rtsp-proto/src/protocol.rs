use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes per pixel in the decoder's raw output (`rgb24`).
pub const BYTES_PER_PIXEL: usize = 3;

/// One camera, addressed by its base URL, and the two feeds derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEndpoint {
    pub base_url: String,
    /// Low-resolution sub-stream shown in the preview.
    pub preview_url: String,
    /// Full-resolution main stream written to disk.
    pub record_url: String,
}

impl StreamEndpoint {
    pub fn new(base_url: &str, preview_path: &str, record_path: &str) -> Self {
        let base_url = base_url.trim().to_string();
        Self {
            preview_url: join_url(&base_url, preview_path),
            record_url: join_url(&base_url, record_path),
            base_url,
        }
    }
}

/// Join a base URL and a relative path with exactly one `/` between them.
fn join_url(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if base.ends_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Width, height and integral frame rate of a video feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamGeometry {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl StreamGeometry {
    /// Size in bytes of one decoded `rgb24` frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

impl fmt::Display for StreamGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}fps", self.width, self.height, self.fps)
    }
}

/// Pixel layout tag handed to the display sink along with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit R, G, B interleaved, rows top to bottom.
    #[default]
    Rgb24,
}

#[derive(Debug, thiserror::Error)]
#[error("frame buffer holds {got} bytes, {width}x{height} rgb24 needs {expected}")]
pub struct FrameLengthMismatch {
    pub width: u32,
    pub height: u32,
    pub expected: usize,
    pub got: usize,
}

/// A decoded picture: `height` rows of `width` RGB pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct RawFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RawFrame {
    pub fn from_bytes(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameLengthMismatch> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(FrameLengthMismatch {
                width,
                height,
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        PixelFormat::Rgb24
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// RGB sample at column `x`, row `y`. Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        assert!(x < self.width && y < self.height, "pixel ({x},{y}) out of bounds");
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// One row of interleaved samples.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * BYTES_PER_PIXEL;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Lifecycle of the single camera session.
///
/// Transitions:
///   Idle -> Starting -> Running -> Stopping -> Idle
///   Starting -> Idle (probe or launch failure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    /// Probing the sub-streams and launching ffmpeg.
    Starting,
    /// Recorder and decoder running, preview ticking.
    Running,
    /// Tearing down processes and the scheduler.
    Stopping,
}

impl SessionState {
    /// Short label for the status bar.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Starting => "CONNECTING",
            SessionState::Running => "LIVE",
            SessionState::Stopping => "STOPPING",
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == SessionState::Idle
    }
}
