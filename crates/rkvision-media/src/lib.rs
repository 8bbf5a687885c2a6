// crates/rkvision-media/src/lib.rs
//
// The per-channel frame pipeline: decode -> route -> convert -> infer ->
// post-process -> annotate -> encode -> publish, plus the supervisor that
// keeps a channel alive across stream failures.

pub mod annotate;
pub mod convert;
pub mod dashboard;
pub mod decode;
pub mod dma;
#[cfg(feature = "hwaccel")]
pub mod hwlib;
pub mod jpeg;
pub mod nn;
pub mod postprocess;
pub mod publisher;
pub mod router;
pub mod snapshot;
pub mod supervisor;

pub use dashboard::{dashboard_html, index_html};
pub use decode::{probe_hardware_decoders, Decoder, FrameEvent};
pub use publisher::MjpegPublisher;
pub use supervisor::{ChannelSupervisor, SupervisorExit, SupervisorState};