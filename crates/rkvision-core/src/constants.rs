/// Worst-case DMA scratch surface size every channel allocates once at
/// startup (2560x1440x32bpp).
pub const DMA_SCRATCH_MAX_WIDTH: u32 = 2560;
pub const DMA_SCRATCH_MAX_HEIGHT: u32 = 1440;
pub const DMA_SCRATCH_BPP: u32 = 32;

/// Display surface default, matching the original implementation's
/// `WIDTH_P`/`HEIGHT_P`.
pub const DEFAULT_DISPLAY_WIDTH: u32 = 1280;
pub const DEFAULT_DISPLAY_HEIGHT: u32 = 720;

/// Ingress queue bound — `push` drops the oldest frame once full.
pub const INGRESS_QUEUE_CAPACITY: usize = 5;

/// JPEG quality and MJPEG pacing targets.
pub const JPEG_QUALITY: u8 = 95;
pub const STREAM_FPS_HINT: u32 = 30;
pub const STREAM_FRAME_INTERVAL_MS: u64 = 33;

/// Supervisor backoff/restart policy.
pub const BACKOFF_SLEEP_SECS: u64 = 2;
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Largest frame dimension the router will accept before dropping.
pub const MAX_FRAME_DIMENSION: u32 = 4096;

/// Fixed multi-channel table: 8 channels, ports 8090..8097.
pub const FIXED_CHANNEL_COUNT: u32 = 8;
pub const FIXED_CHANNEL_BASE_PORT: u16 = 8090;
