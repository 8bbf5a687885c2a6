use std::path::PathBuf;

/// Per-channel configuration, produced by the CLI layer — either from a
/// single `stream_url` positional argument or from the fixed 8-channel
/// table (`rkvision::config::fixed_channels`).
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub id: u32,
    pub url: String,
    pub port: u16,
    pub prefer_hw: bool,
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub snapshot_dir: PathBuf,
    pub conf_threshold: f32,
    pub nms_threshold: f32,
}

/// Pixel layout of a pinned DMA surface or a host-memory plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Nv12,
    Yuv420p,
    Nv21,
    Bgr,
    Rgb,
    /// DRM layer reported format code 0 — treated as NV12 per the router's
    /// fallback policy.
    Unknown,
}

/// A pinned memory region with a kernel FD when hardware DMA-BUF sharing is
/// available, or a sentinel "no-FD" plus an ordinary heap allocation when
/// running software-only. Allocated once per channel at worst-case size
/// (2560x1440x32bpp) and reused for the lifetime of the channel.
pub struct Surface {
    pub fd: Option<i32>,
    pub ptr: *mut u8,
    pub size: usize,
    pub max_width: u32,
    pub max_height: u32,
    pub bpp: u32,
}

// Surfaces are owned by exactly one Channel and never shared across threads
// except through the strict producer/consumer handoff the router enforces;
// the raw pointer is safe to send across the decode-loop/encoder thread pair
// on that basis.
unsafe impl Send for Surface {}

impl Surface {
    pub fn is_hardware(&self) -> bool {
        self.fd.is_some()
    }

    /// Safety: caller must not read/write past `size` bytes, and must
    /// respect the single-writer/single-reader invariant documented on
    /// `Surface`.
    pub unsafe fn as_slice(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr, self.size)
    }

    /// Safety: see `as_slice`.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr, self.size)
    }
}

/// A single decoded video plane: pointer/offset plus the stride FFmpeg or
/// the DMA-BUF descriptor actually reported (pitch may exceed width).
#[derive(Debug, Clone, Copy)]
pub struct PlaneLayout {
    pub offset: usize,
    pub pitch: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Bt601,
    Bt709,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRange {
    Full,
    Limited,
}

/// Either a DMA-BUF-backed frame (preferred — zero-copy into the converter)
/// or a host-memory planar YUV buffer (software decode path).
pub enum DecodedFrame {
    Dma {
        fd: i32,
        format: PixelFormat,
        planes: Vec<PlaneLayout>,
        width: u32,
        height: u32,
        pts: i64,
    },
    Host {
        data: Vec<u8>,
        planes: Vec<PlaneLayout>,
        width: u32,
        height: u32,
        format: PixelFormat,
        color_space: ColorSpace,
        color_range: ColorRange,
        pts: i64,
    },
}

impl DecodedFrame {
    pub fn width(&self) -> u32 {
        match self {
            DecodedFrame::Dma { width, .. } | DecodedFrame::Host { width, .. } => *width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            DecodedFrame::Dma { height, .. } | DecodedFrame::Host { height, .. } => *height,
        }
    }

    /// The decoder's own packet timestamp, or `-1` when FFmpeg reported
    /// none. Matches the original implementation's `pkt_pts > 0` gate for
    /// "is this frame's timestamp usable".
    pub fn pts(&self) -> i64 {
        match self {
            DecodedFrame::Dma { pts, .. } | DecodedFrame::Host { pts, .. } => *pts,
        }
    }

    /// Width/height are non-zero and within the 4096 bound the router
    /// enforces before attempting any conversion.
    pub fn has_valid_dimensions(&self) -> bool {
        let (w, h) = (self.width(), self.height());
        w > 0 && h > 0 && w <= 4096 && h <= 4096
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    Nchw,
    Nhwc,
}

/// Established once at model load and immutable thereafter.
#[derive(Debug, Clone)]
pub struct NnTensorDescriptor {
    pub model_width: u32,
    pub model_height: u32,
    pub channels: u32,
    pub layout: TensorLayout,
    pub out_scale: Vec<f32>,
    pub out_zero_point: Vec<i32>,
    pub input_format: PixelFormat,
}

impl NnTensorDescriptor {
    /// Exact byte size the converter must produce for the NN-scratch
    /// surface: `model_w * model_h * channels`, uint8 NHWC BGR.
    pub fn input_byte_len(&self) -> usize {
        self.model_width as usize * self.model_height as usize * self.channels as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Produced by post-process; consumed by the Annotator. Ephemeral — lives
/// for exactly one frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Exactly one "latest" is kept per channel; older ones are discarded by
/// the publisher's ingress queue.
#[derive(Debug, Clone)]
pub struct EncodedJpeg {
    pub bytes: Vec<u8>,
    pub capture_ts_ms: i64,
}
