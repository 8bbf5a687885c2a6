// crates/rkvision-media/src/convert/sw.rs
//
// CPU YUV420P/NV12 -> RGB/BGR resize, stride-aware, BT.601/709 aware.
// Fused scale+convert: a separate scale-then-convert pass would double the
// memory traffic on what is already a memory-bound loop.

use rkvision_core::{ColorRange, ColorSpace, PixelFormat};

use super::color::{coeffs_for, yuv_to_rgb};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum OutputOrder {
    Rgb,
    Bgr,
}

pub struct SwSource<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub y_stride: usize,
    pub uv_stride: usize,
    pub format: PixelFormat,
    pub color_space: ColorSpace,
    pub color_range: ColorRange,
}

/// Stride-aware nearest-neighbor scale fused with YUV -> RGB/BGR.
/// Destination pixel (x, y) samples source
/// `(floor(x * W / W'), floor(y * H / H'))`, clamped to `(W-1, H-1)`.
pub fn resize_convert(
    src: &SwSource,
    dst_w: u32,
    dst_h: u32,
    order: OutputOrder,
) -> Result<Vec<u8>, String> {
    if src.width == 0 || src.height == 0 || dst_w == 0 || dst_h == 0 {
        return Err("zero-sized source or destination".into());
    }

    let y_plane = src.data;
    let (u_plane, v_plane): (&[u8], &[u8]) = match src.format {
        PixelFormat::Nv12 | PixelFormat::Unknown => {
            // Format tag 0 with 2 planes is treated as NV12 (§4.3/§4.5):
            // the UV plane is interleaved, starting right after the Y plane.
            let uv_start = src.y_stride * src.height as usize;
            (&src.data[uv_start..], &[])
        }
        PixelFormat::Nv21 => {
            let uv_start = src.y_stride * src.height as usize;
            (&src.data[uv_start..], &[])
        }
        PixelFormat::Yuv420p => {
            let u_start = src.y_stride * src.height as usize;
            let u_len = src.uv_stride * (src.height as usize / 2);
            (&src.data[u_start..u_start + u_len], &src.data[u_start + u_len..])
        }
        PixelFormat::Bgr | PixelFormat::Rgb => {
            return Err("source is already RGB/BGR, not YUV".into());
        }
    };

    let swap_uv_for_nv21 = matches!(src.format, PixelFormat::Nv21);
    let coeffs = coeffs_for(src.color_space, src.color_range);

    let mut out = vec![0u8; dst_w as usize * dst_h as usize * 3];

    for dy in 0..dst_h {
        let sy = ((dy as u64 * src.height as u64) / dst_h as u64).min(src.height as u64 - 1) as u32;
        for dx in 0..dst_w {
            let sx = ((dx as u64 * src.width as u64) / dst_w as u64).min(src.width as u64 - 1) as u32;

            let y_idx = sy as usize * src.y_stride + sx as usize;
            let y_val = *y_plane.get(y_idx).unwrap_or(&16);

            let (u_val, v_val) = match src.format {
                PixelFormat::Yuv420p => {
                    let cx = sx as usize / 2;
                    let cy = sy as usize / 2;
                    let u_idx = cy * src.uv_stride + cx;
                    let v_idx = u_idx;
                    (
                        *u_plane.get(u_idx).unwrap_or(&128),
                        *v_plane.get(v_idx).unwrap_or(&128),
                    )
                }
                _ => {
                    let cx = (sx as usize) & !1;
                    let cy = sy as usize / 2;
                    let base = cy * src.uv_stride + cx;
                    let a = *u_plane.get(base).unwrap_or(&128);
                    let b = *u_plane.get(base + 1).unwrap_or(&128);
                    if swap_uv_for_nv21 {
                        (b, a)
                    } else {
                        (a, b)
                    }
                }
            };

            let (r, g, b) = yuv_to_rgb(y_val, u_val, v_val, &coeffs);

            let out_idx = (dy as usize * dst_w as usize + dx as usize) * 3;
            match order {
                OutputOrder::Rgb => {
                    out[out_idx] = r;
                    out[out_idx + 1] = g;
                    out[out_idx + 2] = b;
                }
                OutputOrder::Bgr => {
                    out[out_idx] = b;
                    out[out_idx + 1] = g;
                    out[out_idx + 2] = r;
                }
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_nv12(width: u32, height: u32, y: u8) -> Vec<u8> {
        let mut data = vec![y; (width * height) as usize];
        data.extend(vec![128u8; (width * height / 2) as usize]);
        data
    }

    #[test]
    fn gray_source_yields_equal_channels_in_both_orders() {
        let data = gray_nv12(16, 16, 128);
        let src = SwSource {
            data: &data,
            width: 16,
            height: 16,
            y_stride: 16,
            uv_stride: 16,
            format: PixelFormat::Nv12,
            color_space: ColorSpace::Bt709,
            color_range: ColorRange::Full,
        };
        let rgb = resize_convert(&src, 8, 8, OutputOrder::Rgb).unwrap();
        for px in rgb.chunks(3) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }

    #[test]
    fn pitch_greater_than_width_does_not_produce_stripe_artifacts() {
        // pitch = 1920 for a 1280-wide frame: every row must still read
        // from the correct stride offset, not from a tightly packed buffer.
        let width = 1280u32;
        let height = 8u32;
        let pitch = 1920usize;
        let mut data = vec![0u8; pitch * height as usize];
        for row in 0..height as usize {
            for col in 0..width as usize {
                data[row * pitch + col] = 200;
            }
            // Garbage in the padding region past `width` — must never be sampled.
            for col in width as usize..pitch {
                data[row * pitch + col] = 0;
            }
        }
        data.extend(vec![128u8; pitch * height as usize / 2]);
        let src = SwSource {
            data: &data,
            width,
            height,
            y_stride: pitch,
            uv_stride: pitch,
            format: PixelFormat::Nv12,
            color_space: ColorSpace::Bt709,
            color_range: ColorRange::Full,
        };
        let rgb = resize_convert(&src, 64, height, OutputOrder::Bgr).unwrap();
        for px in rgb.chunks(3) {
            assert_eq!(px[0], 200);
        }
    }

    #[test]
    fn format_tag_zero_with_two_planes_is_treated_as_nv12() {
        let data = gray_nv12(16, 16, 100);
        let src = SwSource {
            data: &data,
            width: 16,
            height: 16,
            y_stride: 16,
            uv_stride: 16,
            format: PixelFormat::Unknown,
            color_space: ColorSpace::Bt709,
            color_range: ColorRange::Full,
        };
        let rgb = resize_convert(&src, 16, 16, OutputOrder::Bgr).unwrap();
        assert_eq!(rgb[0], 100);
    }
}
