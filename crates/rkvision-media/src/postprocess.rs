// crates/rkvision-media/src/postprocess.rs
//
// YOLOv5 anchor decode + NMS. Takes the three int8 output tensors plus
// their per-output (scale, zero-point), the model's input size, the
// display size, and confidence/NMS thresholds; returns Detections already
// in display coordinates.
//
// Scale mapping: the box-coordinate scale factor is computed as
// `display / model` (not `model / display`) — see DESIGN.md's Open
// Question note for why the reverse mapping in the observed source was
// not carried forward as-is.

use rkvision_core::{BoundingBox, Detection};

use crate::nn::OutputTensor;

/// One detection head's fixed anchor box sizes, in model-input pixels.
pub type AnchorSet = [(f32, f32); 3];

pub const ANCHORS: [AnchorSet; 3] = [
    [(10.0, 13.0), (16.0, 30.0), (33.0, 23.0)],
    [(30.0, 61.0), (62.0, 45.0), (59.0, 119.0)],
    [(116.0, 90.0), (156.0, 198.0), (373.0, 326.0)],
];

const STRIDES: [u32; 3] = [8, 16, 32];

#[derive(Clone)]
struct RawBox {
    cx: f32,
    cy: f32,
    w: f32,
    h: f32,
    confidence: f32,
    class_idx: usize,
}

fn dequantize(raw: i8, scale: f32, zero_point: i32) -> f32 {
    (raw as i32 - zero_point) as f32 * scale
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decodes one output head's raw int8 tensor into candidate boxes in
/// model-input-pixel space. `grid_size` is `model_dim / stride`; the tensor
/// layout is `[grid_h, grid_w, num_anchors, 5 + num_classes]`.
fn decode_head(
    tensor: &OutputTensor,
    anchors: &AnchorSet,
    stride: u32,
    grid_w: u32,
    grid_h: u32,
    num_classes: usize,
    conf_threshold: f32,
) -> Vec<RawBox> {
    let mut out = Vec::new();
    let values_per_anchor = 5 + num_classes;
    let per_cell = anchors.len() * values_per_anchor;

    for gy in 0..grid_h {
        for gx in 0..grid_w {
            let cell_base = (gy * grid_w + gx) as usize * per_cell;
            for (a_idx, (anchor_w, anchor_h)) in anchors.iter().enumerate() {
                let base = cell_base + a_idx * values_per_anchor;
                if base + values_per_anchor > tensor.bytes.len() {
                    continue;
                }
                let get = |i: usize| dequantize(tensor.bytes[base + i], tensor.scale, tensor.zero_point);

                let obj = sigmoid(get(4));
                if obj < conf_threshold {
                    continue;
                }

                let tx = sigmoid(get(0));
                let ty = sigmoid(get(1));
                let tw = sigmoid(get(2));
                let th = sigmoid(get(3));

                let cx = (tx * 2.0 - 0.5 + gx as f32) * stride as f32;
                let cy = (ty * 2.0 - 0.5 + gy as f32) * stride as f32;
                let w = (tw * 2.0).powi(2) * anchor_w;
                let h = (th * 2.0).powi(2) * anchor_h;

                let mut best_class = 0usize;
                let mut best_score = f32::MIN;
                for c in 0..num_classes {
                    let score = sigmoid(get(5 + c));
                    if score > best_score {
                        best_score = score;
                        best_class = c;
                    }
                }

                let confidence = obj * best_score;
                if confidence < conf_threshold {
                    continue;
                }

                out.push(RawBox {
                    cx,
                    cy,
                    w,
                    h,
                    confidence,
                    class_idx: best_class,
                });
            }
        }
    }
    out
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix1 = a.left.max(b.left);
    let iy1 = a.top.max(b.top);
    let ix2 = a.right.min(b.right);
    let iy2 = a.bottom.min(b.bottom);
    let iw = (ix2 - ix1).max(0.0);
    let ih = (iy2 - iy1).max(0.0);
    let inter = iw * ih;
    let area_a = (a.right - a.left).max(0.0) * (a.bottom - a.top).max(0.0);
    let area_b = (b.right - b.left).max(0.0) * (b.bottom - b.top).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

fn nms(mut boxes: Vec<(RawBox, BoundingBox)>, nms_threshold: f32) -> Vec<(RawBox, BoundingBox)> {
    boxes.sort_by(|a, b| b.0.confidence.partial_cmp(&a.0.confidence).unwrap());
    let mut kept: Vec<(RawBox, BoundingBox)> = Vec::new();
    'outer: for candidate in boxes {
        for (_, kept_box) in &kept {
            if iou(&candidate.1, kept_box) > nms_threshold {
                continue 'outer;
            }
        }
        kept.push(candidate);
    }
    kept
}

#[allow(clippy::too_many_arguments)]
pub fn postprocess(
    outputs: &[OutputTensor],
    labels: &[String],
    model_w: u32,
    model_h: u32,
    display_w: u32,
    display_h: u32,
    conf_threshold: f32,
    nms_threshold: f32,
) -> Vec<Detection> {
    let scale_x = display_w as f32 / model_w as f32;
    let scale_y = display_h as f32 / model_h as f32;

    let mut all_boxes: Vec<(RawBox, BoundingBox)> = Vec::new();

    for (head_idx, tensor) in outputs.iter().enumerate() {
        if tensor.bytes.is_empty() {
            continue;
        }
        let stride = STRIDES[head_idx.min(2)];
        let grid_w = (model_w / stride).max(1);
        let grid_h = (model_h / stride).max(1);
        let anchors = &ANCHORS[head_idx.min(2)];

        let raw = decode_head(
            tensor,
            anchors,
            stride,
            grid_w,
            grid_h,
            labels.len(),
            conf_threshold,
        );

        for b in raw {
            let half_w = b.w / 2.0;
            let half_h = b.h / 2.0;
            let bbox = BoundingBox {
                left: (b.cx - half_w) * scale_x,
                top: (b.cy - half_h) * scale_y,
                right: (b.cx + half_w) * scale_x,
                bottom: (b.cy + half_h) * scale_y,
            };
            all_boxes.push((b, bbox));
        }
    }

    let kept = nms(all_boxes, nms_threshold);

    kept.into_iter()
        .map(|(raw, bbox)| Detection {
            class_name: labels
                .get(raw.class_idx)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", raw.class_idx)),
            confidence: raw.confidence,
            bbox,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BoundingBox {
            left: 0.0,
            top: 0.0,
            right: 10.0,
            bottom: 10.0,
        };
        assert!((iou(&b, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox {
            left: 0.0,
            top: 0.0,
            right: 10.0,
            bottom: 10.0,
        };
        let b = BoundingBox {
            left: 20.0,
            top: 20.0,
            right: 30.0,
            bottom: 30.0,
        };
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_suppresses_heavily_overlapping_lower_confidence_box() {
        let high = RawBox {
            cx: 50.0,
            cy: 50.0,
            w: 20.0,
            h: 20.0,
            confidence: 0.9,
            class_idx: 0,
        };
        let low = RawBox {
            cx: 51.0,
            cy: 51.0,
            w: 20.0,
            h: 20.0,
            confidence: 0.5,
            class_idx: 0,
        };
        let bbox = |b: &RawBox| BoundingBox {
            left: b.cx - b.w / 2.0,
            top: b.cy - b.h / 2.0,
            right: b.cx + b.w / 2.0,
            bottom: b.cy + b.h / 2.0,
        };
        let boxes = vec![
            (high.clone(), bbox(&high)),
            (low.clone(), bbox(&low)),
        ];
        let kept = nms(boxes, 0.5);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].0.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn empty_outputs_yield_no_detections() {
        let outputs = vec![OutputTensor {
            bytes: Vec::new(),
            scale: 1.0,
            zero_point: 0,
        }];
        let labels = vec!["person".to_string()];
        let dets = postprocess(&outputs, &labels, 640, 640, 1280, 720, 0.25, 0.45);
        assert!(dets.is_empty());
    }
}
