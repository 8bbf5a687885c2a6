// crates/rkvision-media/src/hwlib.rs
//
// Runtime bindings to the vendor accelerator shared objects: librga.so
// (2D scale/convert), librknnrt.so (NN inference), and the DRM/GBM alloc
// path used for hardware-backed DMA surfaces. None of these have a stable
// crate on the registry, so — mirroring the original implementation's own
// dlopen/dlsym use in rockchip/rga_func.cpp — they are resolved at runtime
// with `libloading` rather than statically linked or faked with a
// hand-written -sys crate. Entirely absent behind the `hwaccel` feature.

#![cfg(feature = "hwaccel")]

use std::ffi::c_void;
use std::os::raw::c_int;

use libloading::{Library, Symbol};
use log::{info, warn};
use rkvision_core::{PipelineError, Surface};

const LIBRGA_PATH: &str = "librga.so";
const LIBRKNN_PATH: &str = "librknnrt.so";

type RgaInitFn = unsafe extern "C" fn() -> c_int;
type RgaBlitFn = unsafe extern "C" fn(
    src_fd: c_int,
    src_w: c_int,
    src_h: c_int,
    src_pitch: c_int,
    src_fmt: c_int,
    dst_ptr: *mut c_void,
    dst_w: c_int,
    dst_h: c_int,
    dst_fmt: c_int,
) -> c_int;

type RknnInitFn = unsafe extern "C" fn(ctx: *mut u64, model: *mut c_void, size: u32) -> c_int;
type RknnRunFn = unsafe extern "C" fn(ctx: u64) -> c_int;
type RknnDestroyFn = unsafe extern "C" fn(ctx: u64) -> c_int;
type RknnOutputsGetFn =
    unsafe extern "C" fn(ctx: u64, n_outputs: u32, outputs: *mut RknnOutput, extra: *mut c_void) -> c_int;
type RknnOutputsReleaseFn = unsafe extern "C" fn(ctx: u64, n_outputs: u32, outputs: *mut RknnOutput) -> c_int;

/// Mirrors the RKNN SDK's `rknn_output` layout: a caller-owned flag, the
/// output index, the engine-owned result buffer, and its byte size.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RknnOutput {
    pub want_float: u8,
    pub is_prealloc: u8,
    pub index: u32,
    pub buf: *mut c_void,
    pub size: u32,
}

/// Handle to the accelerator libraries resolved at process start. Held by
/// the channel for its lifetime; `Library` is kept alive so the `Symbol`s
/// handed out remain valid.
pub struct HwLibs {
    rga: Library,
    rknn: Library,
}

impl HwLibs {
    /// Attempts to load both accelerator libraries. Returns `None` rather
    /// than an error when either is missing — absence of the hardware SDK
    /// is the expected condition on a dev machine or a board without the
    /// RKNN runtime installed, not a configuration error.
    pub fn try_load() -> Option<Self> {
        let rga = unsafe { Library::new(LIBRGA_PATH) };
        let rknn = unsafe { Library::new(LIBRKNN_PATH) };
        match (rga, rknn) {
            (Ok(rga), Ok(rknn)) => {
                info!("loaded {LIBRGA_PATH} and {LIBRKNN_PATH}");
                Some(Self { rga, rknn })
            }
            (rga_res, rknn_res) => {
                if let Err(e) = rga_res {
                    warn!("librga.so unavailable, RGA converter disabled: {e}");
                }
                if let Err(e) = rknn_res {
                    warn!("librknnrt.so unavailable, NN engine disabled: {e}");
                }
                None
            }
        }
    }

    pub fn rga_init(&self) -> Result<(), String> {
        unsafe {
            let f: Symbol<RgaInitFn> = self
                .rga
                .get(b"c_RkRgaInit\0")
                .map_err(|e| e.to_string())?;
            if f() != 0 {
                return Err("c_RkRgaInit returned non-zero".into());
            }
        }
        Ok(())
    }

    /// Single-call scale + colorspace conversion. Returns `Err` on any
    /// engine failure; the frame router treats this as non-fatal and
    /// degrades to the software converter for that frame.
    pub fn rga_blit(
        &self,
        src_fd: i32,
        src_w: u32,
        src_h: u32,
        src_pitch: u32,
        src_fmt: i32,
        dst: &mut Surface,
        dst_w: u32,
        dst_h: u32,
        dst_fmt: i32,
    ) -> Result<(), String> {
        unsafe {
            let f: Symbol<RgaBlitFn> = self
                .rga
                .get(b"c_RkRgaBlit\0")
                .map_err(|e| e.to_string())?;
            let rc = f(
                src_fd,
                src_w as c_int,
                src_h as c_int,
                src_pitch as c_int,
                src_fmt as c_int,
                dst.ptr as *mut c_void,
                dst_w as c_int,
                dst_h as c_int,
                dst_fmt as c_int,
            );
            if rc != 0 {
                return Err(format!("c_RkRgaBlit failed, rc={rc}"));
            }
        }
        Ok(())
    }

    /// Loads a model into the NN engine, returning an opaque context handle.
    pub fn rknn_init(&self, model_bytes: &mut [u8]) -> Result<u64, String> {
        unsafe {
            let f: Symbol<RknnInitFn> = self
                .rknn
                .get(b"rknn_init\0")
                .map_err(|e| e.to_string())?;
            let mut ctx: u64 = 0;
            let rc = f(
                &mut ctx as *mut u64,
                model_bytes.as_mut_ptr() as *mut c_void,
                model_bytes.len() as u32,
            );
            if rc != 0 {
                return Err(format!("rknn_init failed, rc={rc}"));
            }
            Ok(ctx)
        }
    }

    pub fn rknn_run(&self, ctx: u64) -> Result<(), String> {
        unsafe {
            let f: Symbol<RknnRunFn> = self.rknn.get(b"rknn_run\0").map_err(|e| e.to_string())?;
            if f(ctx) != 0 {
                return Err("rknn_run failed".into());
            }
        }
        Ok(())
    }

    /// Fetches `n_outputs` result tensors after `rknn_run`. Each
    /// `RknnOutput.buf` points at engine-owned memory that must be copied
    /// out before `rknn_outputs_release` is called.
    pub fn rknn_outputs_get(&self, ctx: u64, n_outputs: u32) -> Result<Vec<RknnOutput>, String> {
        unsafe {
            let f: Symbol<RknnOutputsGetFn> = self
                .rknn
                .get(b"rknn_outputs_get\0")
                .map_err(|e| e.to_string())?;
            let mut outputs = vec![
                RknnOutput {
                    want_float: 0,
                    is_prealloc: 0,
                    index: 0,
                    buf: std::ptr::null_mut(),
                    size: 0,
                };
                n_outputs as usize
            ];
            let rc = f(ctx, n_outputs, outputs.as_mut_ptr(), std::ptr::null_mut());
            if rc != 0 {
                return Err(format!("rknn_outputs_get failed, rc={rc}"));
            }
            Ok(outputs)
        }
    }

    pub fn rknn_outputs_release(&self, ctx: u64, outputs: &mut [RknnOutput]) {
        unsafe {
            if let Ok(f) = self.rknn.get::<RknnOutputsReleaseFn>(b"rknn_outputs_release\0") {
                let _ = f(ctx, outputs.len() as u32, outputs.as_mut_ptr());
            }
        }
    }

    pub fn rknn_destroy(&self, ctx: u64) {
        unsafe {
            if let Ok(f) = self.rknn.get::<RknnDestroyFn>(b"rknn_destroy\0") {
                let _ = f(ctx);
            }
        }
    }

    /// Hardware-backed DMA surface allocation via the DRM/GBM entry points.
    /// Not implemented as a real allocator here (no GBM device is assumed
    /// present in this tree) — always reports failure so callers fall back
    /// to the software allocator, matching §4.1's "fatal to that Channel /
    /// supervisor falls back to software-only" contract for the hardware
    /// path specifically.
    pub fn drm_alloc(&self, width: u32, height: u32, bpp: u32) -> Result<Surface, PipelineError> {
        Err(PipelineError::Dma {
            width,
            height,
            reason: "DRM/GBM allocator not wired up without a GBM device".into(),
        })
    }
}

