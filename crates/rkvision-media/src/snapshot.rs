// crates/rkvision-media/src/snapshot.rs
//
// Writes a cropped JPEG of every detection with a positive capture
// timestamp to `<snapshot_dir>/<pts>_<class>_<prop>.jpg`. Generalized from
// the original implementation's person-only debug dump (`save_debug_frames`
// in mjpeg_streamer.cpp) to any detection class.

use std::fs;
use std::path::Path;

use log::warn;
use rkvision_core::Detection;

use crate::jpeg::JpegEncoder;

/// Crops each detection's box out of the display frame and writes it as a
/// standalone JPEG. `prop` is the detection's confidence expressed as an
/// integer percent, matching the original's filename convention.
pub fn write_snapshots(
    dir: &Path,
    encoder: &JpegEncoder,
    display_bgr: &[u8],
    width: u32,
    height: u32,
    detections: &[Detection],
    capture_ts_ms: i64,
) {
    if capture_ts_ms <= 0 || detections.is_empty() {
        return;
    }
    if let Err(e) = fs::create_dir_all(dir) {
        warn!("failed to create snapshot dir {}: {e}", dir.display());
        return;
    }

    for det in detections {
        let left = det.bbox.left.max(0.0) as u32;
        let top = det.bbox.top.max(0.0) as u32;
        let right = (det.bbox.right as u32).min(width);
        let bottom = (det.bbox.bottom as u32).min(height);
        if right <= left || bottom <= top {
            continue;
        }
        let crop_w = right - left;
        let crop_h = bottom - top;

        let mut crop = vec![0u8; crop_w as usize * crop_h as usize * 3];
        for row in 0..crop_h {
            let src_start = ((top + row) as usize * width as usize + left as usize) * 3;
            let dst_start = row as usize * crop_w as usize * 3;
            let len = crop_w as usize * 3;
            crop[dst_start..dst_start + len]
                .copy_from_slice(&display_bgr[src_start..src_start + len]);
        }

        match encoder.encode(&crop, crop_w, crop_h) {
            Ok(bytes) => {
                let prop = (det.confidence * 100.0).round() as u32;
                let filename = format!("{capture_ts_ms}_{}_{prop}.jpg", det.class_name);
                if let Err(e) = fs::write(dir.join(filename), bytes) {
                    warn!("failed to write detection snapshot: {e}");
                }
            }
            Err(e) => warn!("snapshot jpeg encode failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkvision_core::BoundingBox;

    #[test]
    fn zero_timestamp_writes_nothing() {
        let dir = std::env::temp_dir().join("rkvision_snapshot_test_zero_ts");
        let _ = fs::remove_dir_all(&dir);
        let encoder = JpegEncoder::new();
        let dets = vec![Detection {
            class_name: "person".into(),
            confidence: 0.8,
            bbox: BoundingBox {
                left: 0.0,
                top: 0.0,
                right: 4.0,
                bottom: 4.0,
            },
        }];
        write_snapshots(&dir, &encoder, &vec![128u8; 8 * 8 * 3], 8, 8, &dets, 0);
        assert!(!dir.exists());
    }

    #[test]
    fn positive_timestamp_writes_one_file_per_detection() {
        let dir = std::env::temp_dir().join("rkvision_snapshot_test_positive_ts");
        let _ = fs::remove_dir_all(&dir);
        let encoder = JpegEncoder::new();
        let dets = vec![Detection {
            class_name: "person".into(),
            confidence: 0.8,
            bbox: BoundingBox {
                left: 0.0,
                top: 0.0,
                right: 4.0,
                bottom: 4.0,
            },
        }];
        write_snapshots(&dir, &encoder, &vec![128u8; 8 * 8 * 3], 8, 8, &dets, 42);
        let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let _ = fs::remove_dir_all(&dir);
    }
}
