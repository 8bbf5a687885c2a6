pub mod constants;
pub mod error;
pub mod types;

pub use error::{PipelineError, Result};
pub use types::{
    BoundingBox, ChannelConfig, ColorRange, ColorSpace, DecodedFrame, Detection, EncodedJpeg,
    NnTensorDescriptor, PixelFormat, PlaneLayout, Surface, TensorLayout,
};
