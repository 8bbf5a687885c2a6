// crates/rkvision-media/src/dma.rs
//
// DMA Buffer Pool: two scratch surfaces per channel (NN-scratch, Display-
// scratch), allocated once at channel start for the worst-case size and
// reused for the channel's lifetime.

use std::num::NonZeroUsize;
use std::ptr::NonNull;

use log::warn;
use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
use rkvision_core::constants::{DMA_SCRATCH_BPP, DMA_SCRATCH_MAX_HEIGHT, DMA_SCRATCH_MAX_WIDTH};
use rkvision_core::{PipelineError, Surface};

#[cfg(feature = "hwaccel")]
use crate::hwlib::HwLibs;

/// Allocates a pair of scratch surfaces (NN-input, Display) per channel.
/// Hardware allocation goes through the DRM/GBM entry points resolved in
/// `hwlib`; on any failure (missing `.so`, no GPU node, disabled feature)
/// it falls back to an ordinary heap allocation with a sentinel "no-FD",
/// matching §4.1's fallback contract.
pub struct DmaPool {
    #[cfg(feature = "hwaccel")]
    hw: Option<HwLibs>,
}

impl DmaPool {
    #[cfg(feature = "hwaccel")]
    pub fn new(hw: Option<HwLibs>) -> Self {
        Self { hw }
    }

    #[cfg(not(feature = "hwaccel"))]
    pub fn new() -> Self {
        Self {}
    }

    /// Allocates a surface sized `width * height * bpp/8` bytes. Tries the
    /// hardware DRM/GBM path first when available; always succeeds via the
    /// software fallback (an allocation failure there is a genuine OOM, not
    /// a capability gap, so it is still propagated as `PipelineError::Dma`).
    pub fn allocate(&self, width: u32, height: u32, bpp: u32) -> Result<Surface, PipelineError> {
        #[cfg(feature = "hwaccel")]
        if let Some(hw) = &self.hw {
            match hw.drm_alloc(width, height, bpp) {
                Ok(surface) => return Ok(surface),
                Err(e) => {
                    warn!("hardware DMA allocation failed ({e}), falling back to software");
                }
            }
        }
        allocate_software(width, height, bpp)
    }

    /// Allocates the fixed pair of worst-case scratch surfaces a channel
    /// owns for its whole lifetime: NN-scratch sized to the model's input,
    /// Display-scratch sized to the configured display resolution.
    pub fn allocate_channel_scratch(
        &self,
        model_w: u32,
        model_h: u32,
        display_w: u32,
        display_h: u32,
    ) -> Result<(Surface, Surface), PipelineError> {
        let nn = self.allocate(model_w.max(1), model_h.max(1), 24)?;
        let display = self.allocate(
            display_w.min(DMA_SCRATCH_MAX_WIDTH).max(1),
            display_h.min(DMA_SCRATCH_MAX_HEIGHT).max(1),
            24,
        )?;
        Ok((nn, display))
    }
}

fn allocate_software(width: u32, height: u32, bpp: u32) -> Result<Surface, PipelineError> {
    let size = (width as usize) * (height as usize) * (bpp as usize / 8);
    let size = size.max(1);
    let len = NonZeroUsize::new(size).expect("size is clamped to >= 1 above");

    // Safety: anonymous mapping, no file backing; the region is zero-filled
    // by the kernel and owned exclusively by the returned `Surface`.
    let ptr = unsafe {
        mmap_anonymous(
            None,
            len,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_PRIVATE,
        )
    }
    .map_err(|e| PipelineError::Dma {
        width,
        height,
        reason: e.to_string(),
    })?;

    Ok(Surface {
        fd: None,
        ptr: ptr.as_ptr() as *mut u8,
        size,
        max_width: width,
        max_height: height,
        bpp,
    })
}

/// Releases a software-backed surface. Hardware surfaces release through
/// their own DRM/GBM close path (see `hwlib::HwLibs::drm_free`); this is a
/// no-op for those (fd is `Some`).
pub fn free_software(surface: &Surface) {
    if surface.fd.is_some() {
        return;
    }
    if let Some(ptr) = NonNull::new(surface.ptr as *mut std::ffi::c_void) {
        // Safety: `ptr`/`surface.size` were returned together by the
        // `mmap_anonymous` call in `allocate_software` and are unmapped
        // exactly once here.
        if let Err(e) = unsafe { munmap(ptr, surface.size.max(1)) } {
            warn!("munmap failed for software surface: {e}");
        }
    }
}

/// Worst-case size constant exposed for callers sizing their own buffers.
pub fn worst_case_bytes() -> usize {
    DMA_SCRATCH_MAX_WIDTH as usize * DMA_SCRATCH_MAX_HEIGHT as usize * (DMA_SCRATCH_BPP as usize / 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_allocation_zeroes_and_sizes_correctly() {
        let s = allocate_software(64, 32, 24).unwrap();
        assert_eq!(s.size, 64 * 32 * 3);
        assert!(s.fd.is_none());
        unsafe {
            assert!(s.as_slice().iter().all(|&b| b == 0));
        }
        free_software(&s);
    }

    #[test]
    fn worst_case_matches_2560x1440x32bpp() {
        assert_eq!(worst_case_bytes(), 2560 * 1440 * 4);
    }
}
