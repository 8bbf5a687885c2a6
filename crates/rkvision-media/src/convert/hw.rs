// crates/rkvision-media/src/convert/hw.rs
//
// RGA-backed YUV -> RGB/BGR resize with stride + alignment negotiation.
// Source format is often mis-reported on embedded hardware, so each call
// tries a small ordered policy table of (source tag, output tag) pairs
// until one reports success (§4.4, §9 "dynamic pixel-format discovery").

use rkvision_core::{PixelFormat, Surface};

#[cfg(feature = "hwaccel")]
use crate::hwlib::HwLibs;

/// Ordered source-format guesses, tried in this order for every call.
const SOURCE_TAGS: [PixelFormat; 3] = [PixelFormat::Nv12, PixelFormat::Yuv420p, PixelFormat::Nv21];
/// Ordered output-format guesses.
const OUTPUT_TAGS: [PixelFormat; 2] = [PixelFormat::Bgr, PixelFormat::Rgb];

fn fmt_code(fmt: PixelFormat) -> i32 {
    // Matches the RK_FORMAT_* constants referenced by the original's
    // rga_func.cpp; values are opaque to this crate beyond being passed
    // straight through to the vendor blit entry point.
    match fmt {
        PixelFormat::Nv12 => 0x10,
        PixelFormat::Yuv420p => 0x11,
        PixelFormat::Nv21 => 0x12,
        PixelFormat::Bgr => 0x20,
        PixelFormat::Rgb => 0x21,
        PixelFormat::Unknown => 0x10, // treated as NV12
    }
}

/// `resize_convert(src_fd, ...) -> ok | fail`. Clamps a reported pitch
/// smaller than width up to width (embedded decoders occasionally under-
/// report this) and never fails the caller's channel — `Err` here just
/// means "try software for this frame".
#[cfg(feature = "hwaccel")]
pub fn resize_convert(
    hw: &HwLibs,
    src_fd: i32,
    src_w: u32,
    src_h: u32,
    src_pitch: u32,
    reported_fmt: PixelFormat,
    dst: &mut Surface,
    dst_w: u32,
    dst_h: u32,
) -> Result<(PixelFormat, PixelFormat), String> {
    if src_fd < 0 || dst.ptr.is_null() {
        return Err("missing source fd or null destination surface".into());
    }
    if src_w == 0 || src_h == 0 || src_w > 4096 || src_h > 4096 {
        return Err("source dimensions out of range".into());
    }
    let pitch = src_pitch.max(src_w);

    let source_order: Vec<PixelFormat> = if reported_fmt == PixelFormat::Unknown {
        SOURCE_TAGS.to_vec()
    } else {
        std::iter::once(reported_fmt)
            .chain(SOURCE_TAGS.iter().copied())
            .collect()
    };

    for src_tag in source_order {
        for &dst_tag in &OUTPUT_TAGS {
            let res = hw.rga_blit(
                src_fd,
                src_w,
                src_h,
                pitch,
                fmt_code(src_tag),
                dst,
                dst_w,
                dst_h,
                fmt_code(dst_tag),
            );
            if res.is_ok() {
                return Ok((src_tag, dst_tag));
            }
        }
    }
    Err("all source/output format combinations failed".into())
}

#[cfg(not(feature = "hwaccel"))]
pub fn resize_convert(
    _src_fd: i32,
    _src_w: u32,
    _src_h: u32,
    _src_pitch: u32,
    _reported_fmt: PixelFormat,
    _dst: &mut Surface,
    _dst_w: u32,
    _dst_h: u32,
) -> Result<(PixelFormat, PixelFormat), String> {
    Err("hwaccel feature disabled".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_codes_are_distinct() {
        let mut codes: Vec<i32> = [
            PixelFormat::Nv12,
            PixelFormat::Yuv420p,
            PixelFormat::Nv21,
            PixelFormat::Bgr,
            PixelFormat::Rgb,
        ]
        .iter()
        .map(|f| fmt_code(*f))
        .collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 5);
    }
}
