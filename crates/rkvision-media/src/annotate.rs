// crates/rkvision-media/src/annotate.rs
//
// Draws each Detection's rectangle, class label and confidence onto the
// display scratch surface, plus a timestamp/object-count/FPS overlay in
// the top-left. All drawing happens on a clone so the scratch surface
// stays safe to overwrite on the next frame.

use rkvision_core::Detection;

const RECT_COLOR_BGR: (u8, u8, u8) = (0, 220, 0);
const TEXT_COLOR_BGR: (u8, u8, u8) = (255, 255, 255);

/// A packed BGR image buffer the annotator owns a private copy of.
pub struct AnnotatedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl AnnotatedFrame {
    fn set_pixel(&mut self, x: i32, y: i32, bgr: (u8, u8, u8)) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        let idx = (y as u32 * self.width + x as u32) as usize * 3;
        self.data[idx] = bgr.0;
        self.data[idx + 1] = bgr.1;
        self.data[idx + 2] = bgr.2;
    }

    fn draw_hline(&mut self, x0: i32, x1: i32, y: i32, color: (u8, u8, u8)) {
        for x in x0..=x1 {
            self.set_pixel(x, y, color);
        }
    }

    fn draw_vline(&mut self, x: i32, y0: i32, y1: i32, color: (u8, u8, u8)) {
        for y in y0..=y1 {
            self.set_pixel(x, y, color);
        }
    }

    fn draw_rect(&mut self, left: i32, top: i32, right: i32, bottom: i32, color: (u8, u8, u8)) {
        self.draw_hline(left, right, top, color);
        self.draw_hline(left, right, bottom, color);
        self.draw_vline(left, top, bottom, color);
        self.draw_vline(right, top, bottom, color);
    }

    /// 3x5 bitmap digit/colon font, scaled 2x, for the timestamp/FPS
    /// overlay — no extra font-rendering dependency is justified at this
    /// overlay's size.
    fn draw_text(&mut self, x: i32, y: i32, text: &str, color: (u8, u8, u8)) {
        let mut cx = x;
        for ch in text.chars() {
            draw_glyph(self, cx, y, ch, color);
            cx += 8;
        }
    }
}

fn glyph_rows(ch: char) -> [u8; 5] {
    // Each row is a 3-bit mask (bit 2 = leftmost column).
    match ch {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        _ => [0b000, 0b000, 0b000, 0b000, 0b000],
    }
}

fn draw_glyph(frame: &mut AnnotatedFrame, x: i32, y: i32, ch: char, color: (u8, u8, u8)) {
    for (row, bits) in glyph_rows(ch).iter().enumerate() {
        for col in 0..3 {
            if bits & (1 << (2 - col)) != 0 {
                for dy in 0..2 {
                    for dx in 0..2 {
                        frame.set_pixel(
                            x + col as i32 * 2 + dx,
                            y + row as i32 * 2 + dy,
                            color,
                        );
                    }
                }
            }
        }
    }
}

/// Renders `H:M:S.mmm` from a millisecond timestamp.
pub fn format_timestamp(ts_ms: i64) -> String {
    let ts_ms = ts_ms.max(0);
    let total_secs = ts_ms / 1000;
    let ms = ts_ms % 1000;
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    format!("{h}:{m:02}:{s:02}.{ms:03}")
}

pub fn annotate(
    display_bgr: &[u8],
    width: u32,
    height: u32,
    detections: &[Detection],
    ts_ms: i64,
    fps: f32,
) -> AnnotatedFrame {
    let mut frame = AnnotatedFrame {
        data: display_bgr.to_vec(),
        width,
        height,
    };

    for det in detections {
        frame.draw_rect(
            det.bbox.left as i32,
            det.bbox.top as i32,
            det.bbox.right as i32,
            det.bbox.bottom as i32,
            RECT_COLOR_BGR,
        );
        let label = format!("{}:{:.0}", det.class_name, det.confidence * 100.0);
        frame.draw_text(det.bbox.left as i32, (det.bbox.top as i32 - 10).max(0), &label, RECT_COLOR_BGR);
    }

    let overlay = format!("{} obj={} fps={:.1}", format_timestamp(ts_ms), detections.len(), fps);
    frame.draw_text(4, 4, &overlay, TEXT_COLOR_BGR);

    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkvision_core::BoundingBox;

    #[test]
    fn timestamp_formatting_matches_expected_layout() {
        assert_eq!(format_timestamp(3_723_456), "1:02:03.456");
        assert_eq!(format_timestamp(0), "0:00:00.000");
    }

    #[test]
    fn annotate_draws_rectangle_pixels_without_panicking_at_edges() {
        let width = 32;
        let height = 32;
        let buf = vec![0u8; (width * height * 3) as usize];
        let dets = vec![Detection {
            class_name: "person".into(),
            confidence: 0.9,
            bbox: BoundingBox {
                left: -5.0,
                top: -5.0,
                right: 40.0,
                bottom: 40.0,
            },
        }];
        let out = annotate(&buf, width, height, &dets, 1234, 29.7);
        assert_eq!(out.data.len(), buf.len());
    }
}
