// crates/rkvision-media/src/decode.rs
//
// Decoder Adapter: opens a demux context, picks a hardware decoder by
// codec name when requested and falls back to the generic software
// decoder on failure. Pulls frames non-blockingly; `Again` is a yield, not
// an error. Audio packets are counted and discarded, never decoded.

use std::path::Path;

use anyhow::Result;
use log::{debug, info, warn};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::Id as CodecId;
use ffmpeg::format::context::Input;
use ffmpeg::format::input;
use ffmpeg::media::Type;

#[cfg(feature = "hwaccel")]
use drm_fourcc::DrmFourcc;

use rkvision_core::constants::MAX_FRAME_DIMENSION;
use rkvision_core::{ColorRange, ColorSpace, DecodedFrame, PixelFormat, PlaneLayout};

pub enum FrameEvent {
    Frame(DecodedFrame),
    Again,
    End,
    Error(String),
}

/// Per-codec hardware decoder name, tried before the generic software
/// decoder of the same codec id.
fn hw_decoder_name(codec: CodecId) -> Option<&'static str> {
    match codec {
        CodecId::H264 => Some("h264_rkmpp"),
        CodecId::HEVC => Some("hevc_rkmpp"),
        _ => None,
    }
}

pub struct Decoder {
    ictx: Input,
    decoder: ffmpeg::decoder::video::Video,
    video_idx: usize,
    audio_idx: Option<usize>,
    audio_packets: u64,
    using_hardware: bool,
    color_space: ColorSpace,
}

impl Decoder {
    /// Opens `url`, finds the best video stream, and picks a codec per
    /// §4.2: if `prefer_hw` and the codec is H.264/H.265, try the hardware
    /// decoder name first; on unavailability or open failure, fall back to
    /// the generic software decoder for the same codec id. A hardware
    /// decoder is additionally asked (advisory-only) to prefer DMA-BUF
    /// output, frame-buffer-compression, de-interlace, half-buffer and
    /// zero-copy — `open` must not fail because a hint is rejected.
    pub fn open(url: &str, prefer_hw: bool) -> Result<Self> {
        let ictx = input(&Path::new(url))
            .or_else(|_| input(url))
            .map_err(|e| anyhow::anyhow!("failed to open input {url}: {e}"))?;

        let video_idx = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| anyhow::anyhow!("no video stream in {url}"))?
            .index();
        let audio_idx = ictx.streams().best(Type::Audio).map(|s| s.index());

        let codec_id = ictx.stream(video_idx).unwrap().parameters().id();
        let params = ictx.stream(video_idx).unwrap().parameters();

        let (decoder, using_hardware) = if prefer_hw {
            match open_hardware(codec_id, &params) {
                Some(dec) => {
                    info!("using hardware decoder for {url}");
                    (dec, true)
                }
                None => {
                    info!("hardware decoder unavailable, using software decoder: {codec_id:?}");
                    (open_software(&params)?, false)
                }
            }
        } else {
            (open_software(&params)?, false)
        };

        let color_space = if using_hardware {
            ColorSpace::Bt709
        } else {
            ColorSpace::Bt601
        };

        Ok(Self {
            ictx,
            decoder,
            video_idx,
            audio_idx,
            audio_packets: 0,
            using_hardware,
            color_space,
        })
    }

    pub fn is_hardware(&self) -> bool {
        self.using_hardware
    }

    /// Audio is out of scope beyond this counter — no audio decode,
    /// resample, or output.
    pub fn audio_packet_count(&self) -> u64 {
        self.audio_packets
    }

    /// Non-blocking pull. `send_packet` errors are recoverable — the
    /// packet is dropped and the loop continues; `Again`/EOF from
    /// `receive_frame` are normal; any other receive error breaks the
    /// decode loop without tearing the channel down (the supervisor
    /// restarts it).
    pub fn pull(&mut self) -> FrameEvent {
        loop {
            let packet = match self.ictx.packets().next() {
                Some((stream, packet)) if stream.index() == self.video_idx => packet,
                Some((stream, _)) if Some(stream.index()) == self.audio_idx => {
                    self.audio_packets += 1;
                    continue;
                }
                Some(_) => continue,
                None => return FrameEvent::End,
            };

            if self.decoder.send_packet(&packet).is_err() {
                debug!("dropping undecodable packet");
                continue;
            }

            // receive_frame fails whenever the decoder just needs another
            // packet before it has a full frame ready; treated as "try
            // again" via `.is_ok()`. Actual stream termination is signalled
            // by `packets()` running dry above, not by a receive_frame
            // error.
            let mut frame = ffmpeg::util::frame::video::Video::empty();
            if self.decoder.receive_frame(&mut frame).is_ok() {
                return self.to_decoded_frame(&frame);
            }
        }
    }

    fn to_decoded_frame(&self, frame: &ffmpeg::util::frame::video::Video) -> FrameEvent {
        let width = frame.width();
        let height = frame.height();
        if width == 0 || height == 0 || width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
            return FrameEvent::Again;
        }

        let pts = frame.pts().unwrap_or(-1);

        #[cfg(feature = "hwaccel")]
        if self.using_hardware {
            if let Some((fd, format, planes)) = try_extract_dma(frame) {
                return FrameEvent::Frame(DecodedFrame::Dma {
                    fd,
                    format,
                    planes,
                    width,
                    height,
                    pts,
                });
            }
        }

        let stride = frame.stride(0);
        let data_len = stride * height as usize + frame.stride(1) * (height as usize / 2) * 2;
        let mut data = Vec::with_capacity(data_len);
        data.extend_from_slice(frame.data(0));
        data.extend_from_slice(frame.data(1));
        if !frame.data(2).is_empty() {
            data.extend_from_slice(frame.data(2));
        }

        let planes = vec![
            PlaneLayout {
                offset: 0,
                pitch: stride,
            },
            PlaneLayout {
                offset: frame.data(0).len(),
                pitch: frame.stride(1),
            },
        ];

        let color_range = match frame.color_range() {
            ffmpeg::util::color::Range::MPEG => ColorRange::Limited,
            ffmpeg::util::color::Range::JPEG => ColorRange::Full,
            _ => {
                if self.using_hardware {
                    ColorRange::Full
                } else {
                    ColorRange::Limited
                }
            }
        };

        let format = match frame.format() {
            ffmpeg::format::Pixel::NV12 => PixelFormat::Nv12,
            ffmpeg::format::Pixel::YUV420P => PixelFormat::Yuv420p,
            ffmpeg::format::Pixel::NV21 => PixelFormat::Nv21,
            _ => PixelFormat::Unknown,
        };

        FrameEvent::Frame(DecodedFrame::Host {
            data,
            planes,
            width,
            height,
            format,
            color_space: self.color_space,
            color_range,
            pts,
        })
    }

    /// Idempotent. `Input`/`decoder::video::Video` drop their FFmpeg
    /// contexts on `Drop`; calling this more than once is a no-op beyond
    /// that.
    pub fn close(self) {
        drop(self);
    }
}

/// Advisory options passed to the rkmpp decoder: DRM PRIME output, AFBC
/// (ARM Frame Buffer Compression) tuned for RGA, half-size decode buffers,
/// de-interlacing, and zero-copy. A hardware decoder that doesn't recognize
/// one of these keys ignores it rather than failing `avcodec_open2`, so
/// `open_as_with` below is not expected to fail because of this dictionary.
fn hw_decoder_options() -> ffmpeg::Dictionary<'static> {
    let mut opts = ffmpeg::Dictionary::new();
    opts.set("afbc", "rga");
    opts.set("fast_parse", "1");
    opts.set("buf_mode", "half");
    opts.set("deint", "1");
    opts.set("output_format", "drm_prime");
    opts.set("pixel_format", "nv12");
    opts.set("zero_copy", "1");
    opts
}

/// Reads the zero-copy DMA-BUF handle off a hardware-decoded frame. Only
/// meaningful once the decoder has actually negotiated `AV_PIX_FMT_DRM_PRIME`
/// output (requested via `output_format=drm_prime` in `hw_decoder_options`);
/// any other pixel format means the driver fell back to a normal host-memory
/// frame and this returns `None` so the caller copies it like a software
/// frame instead.
#[cfg(feature = "hwaccel")]
fn try_extract_dma(
    frame: &ffmpeg::util::frame::video::Video,
) -> Option<(i32, PixelFormat, Vec<PlaneLayout>)> {
    if frame.format() != ffmpeg::format::Pixel::DRM_PRIME {
        return None;
    }

    // Safety: for AV_PIX_FMT_DRM_PRIME frames, FFmpeg documents data[0] as a
    // pointer to an AVDRMFrameDescriptor owned by the frame's buffer; it is
    // valid for the frame's lifetime, which outlives this call.
    let desc = unsafe { *((*frame.as_ptr()).data[0] as *const ffmpeg::ffi::AVDRMFrameDescriptor) };
    if desc.nb_objects == 0 || desc.nb_layers == 0 {
        return None;
    }

    let fd = desc.objects[0].fd;
    let layer = desc.layers[0];
    let format = DrmFourcc::try_from(layer.format)
        .map(fourcc_to_pixel_format)
        .unwrap_or(PixelFormat::Unknown);

    let planes = (0..layer.nb_planes as usize)
        .map(|i| {
            let p = layer.planes[i];
            PlaneLayout {
                offset: p.offset as usize,
                pitch: p.pitch as usize,
            }
        })
        .collect();

    Some((fd, format, planes))
}

#[cfg(feature = "hwaccel")]
fn fourcc_to_pixel_format(fourcc: DrmFourcc) -> PixelFormat {
    match fourcc {
        DrmFourcc::Nv12 => PixelFormat::Nv12,
        DrmFourcc::Nv21 => PixelFormat::Nv21,
        DrmFourcc::Yuv420 => PixelFormat::Yuv420p,
        _ => PixelFormat::Unknown,
    }
}

fn open_hardware(
    codec_id: CodecId,
    params: &ffmpeg::codec::parameters::Parameters,
) -> Option<ffmpeg::decoder::video::Video> {
    let name = hw_decoder_name(codec_id)?;
    let codec = ffmpeg::decoder::find_by_name(name)?;
    let ctx = ffmpeg::codec::context::Context::from_parameters(params.clone()).ok()?;
    match ctx.decoder().open_as_with(codec, hw_decoder_options()) {
        Ok(opened) => opened.video().ok(),
        Err(e) => {
            warn!("failed to open hardware decoder {name}: {e}");
            None
        }
    }
}

fn open_software(
    params: &ffmpeg::codec::parameters::Parameters,
) -> Result<ffmpeg::decoder::video::Video> {
    let ctx = ffmpeg::codec::context::Context::from_parameters(params.clone())?;
    Ok(ctx.decoder().video()?)
}

/// One-time startup probe: logs whether the RKMPP decoders this build was
/// compiled against are actually resolvable by name, rather than
/// discovering it lazily on the first channel's `open()` failure.
pub fn probe_hardware_decoders() {
    for (codec, name) in [(CodecId::H264, "h264_rkmpp"), (CodecId::HEVC, "hevc_rkmpp")] {
        let available = ffmpeg::decoder::find_by_name(name).is_some();
        info!("decoder availability: {codec:?} -> {name} = {available}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hw_decoder_names_match_rkmpp_convention() {
        assert_eq!(hw_decoder_name(CodecId::H264), Some("h264_rkmpp"));
        assert_eq!(hw_decoder_name(CodecId::HEVC), Some("hevc_rkmpp"));
        assert_eq!(hw_decoder_name(CodecId::MPEG2VIDEO), None);
    }
}
