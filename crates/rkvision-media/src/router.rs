// crates/rkvision-media/src/router.rs
//
// Frame Router: chooses HW vs SW conversion per frame, extracts pitch and
// DRM descriptors, and hands the two scratch surfaces (NN, Display) to the
// downstream stages. Every observed real-world failure mode here degrades
// silently to software on a per-frame basis — the alternative (failing the
// whole channel) is unacceptable on lossy live sources.

use log::debug;
use rkvision_core::{ColorRange, ColorSpace, DecodedFrame, PixelFormat, Surface};

use crate::convert::sw::{self, OutputOrder, SwSource};

#[cfg(feature = "hwaccel")]
use crate::convert::hw;
#[cfg(feature = "hwaccel")]
use crate::hwlib::HwLibs;

const MAX_DIMENSION: u32 = 4096;

pub struct RouteOutcome {
    pub used_hardware: bool,
}

/// Rounds `w` up to a multiple of 16 and `h` up to a multiple of 2 for the
/// DMA-BUF path, or both up to a multiple of 2 for the software path.
fn align(w: u32, h: u32, dma_path: bool) -> (u32, u32) {
    let w_align = if dma_path { 16 } else { 2 };
    let h_align = 2;
    let aw = (w + w_align - 1) / w_align * w_align;
    let ah = (h + h_align - 1) / h_align * h_align;
    (aw.max(w_align), ah.max(h_align))
}

/// Routes one decoded frame to NN-scratch and Display-scratch surfaces.
/// Returns `None` when the frame is dropped (bad dimensions, or both the
/// hardware and software paths refused it) — the caller logs and continues.
#[allow(clippy::too_many_arguments)]
pub fn route(
    #[cfg(feature = "hwaccel")] hw_libs: Option<&HwLibs>,
    frame: &DecodedFrame,
    prefer_hw: bool,
    nn_scratch: &mut Surface,
    model_w: u32,
    model_h: u32,
    display_scratch: &mut Surface,
    display_w: u32,
    display_h: u32,
) -> Option<RouteOutcome> {
    let (w, h) = (frame.width(), frame.height());
    if w == 0 || h == 0 || w > MAX_DIMENSION || h > MAX_DIMENSION {
        debug!("dropping frame with invalid dimensions {w}x{h}");
        return None;
    }

    let is_dma = matches!(frame, DecodedFrame::Dma { .. });
    let (_aligned_w, _aligned_h) = align(w, h, is_dma);

    if prefer_hw {
        if let DecodedFrame::Dma {
            fd,
            format,
            planes,
            ..
        } = frame
        {
            if *fd >= 0 {
                let pitch = planes.first().map(|p| p.pitch as u32).unwrap_or(w);
                #[cfg(feature = "hwaccel")]
                if let Some(hw_libs) = hw_libs {
                    let nn_ok = hw::resize_convert(
                        hw_libs, *fd, w, h, pitch, *format, nn_scratch, model_w, model_h,
                    );
                    if let Ok((src_tag, _)) = nn_ok {
                        let _ = hw::resize_convert(
                            hw_libs,
                            *fd,
                            w,
                            h,
                            pitch,
                            src_tag,
                            display_scratch,
                            display_w,
                            display_h,
                        );
                        return Some(RouteOutcome { used_hardware: true });
                    }
                    debug!("RGA conversion failed for this frame, falling back to software");
                }
            }
        }
    }

    software_path(frame, nn_scratch, model_w, model_h, display_scratch, display_w, display_h)
}

fn software_path(
    frame: &DecodedFrame,
    nn_scratch: &mut Surface,
    model_w: u32,
    model_h: u32,
    display_scratch: &mut Surface,
    display_w: u32,
    display_h: u32,
) -> Option<RouteOutcome> {
    let (data, planes, format, color_space, color_range) = match frame {
        DecodedFrame::Host {
            data,
            planes,
            format,
            color_space,
            color_range,
            ..
        } => (data.as_slice(), planes.as_slice(), *format, *color_space, *color_range),
        DecodedFrame::Dma { .. } => {
            // Mapping a DMA-BUF read-only for the software path is a
            // platform-specific mmap; without the hardware present this
            // path cannot be exercised, so it is treated as a drop like
            // any other software-path refusal.
            debug!("DMA-BUF frame has no host mapping available for software fallback");
            return None;
        }
    };

    let y_stride = planes.first().map(|p| p.pitch).unwrap_or(frame.width() as usize);
    let uv_stride = match format {
        PixelFormat::Yuv420p => y_stride / 2,
        _ => y_stride,
    };

    let src = SwSource {
        data,
        width: frame.width(),
        height: frame.height(),
        y_stride,
        uv_stride,
        format,
        color_space,
        color_range,
    };

    let nn_bytes = sw::resize_convert(&src, model_w, model_h, OutputOrder::Bgr).ok()?;
    let display_bytes = sw::resize_convert(&src, display_w, display_h, OutputOrder::Bgr).ok()?;

    copy_into(nn_scratch, &nn_bytes);
    copy_into(display_scratch, &display_bytes);

    Some(RouteOutcome { used_hardware: false })
}

fn copy_into(surface: &mut Surface, bytes: &[u8]) {
    let len = bytes.len().min(surface.size);
    unsafe {
        let dst = surface.as_mut_slice();
        dst[..len].copy_from_slice(&bytes[..len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dma_alignment_rounds_width_to_16_and_height_to_2() {
        assert_eq!(align(1281, 721, true), (1296, 722));
    }

    #[test]
    fn software_alignment_rounds_both_to_2() {
        assert_eq!(align(1281, 721, false), (1282, 722));
    }
}
