//! Skeleton and phase indicator drawn over a copy of the video frame

use crate::classifier::SwingPhase;
use crate::pose::{BodyPart, PoseEstimate};
use crate::video::Frame;

/// Keypoint pairs joined by a bone
pub const SKELETON_EDGES: [(BodyPart, BodyPart); 16] = [
    (BodyPart::Nose, BodyPart::LeftEye),
    (BodyPart::Nose, BodyPart::RightEye),
    (BodyPart::LeftEye, BodyPart::LeftEar),
    (BodyPart::RightEye, BodyPart::RightEar),
    (BodyPart::LeftShoulder, BodyPart::RightShoulder),
    (BodyPart::LeftShoulder, BodyPart::LeftElbow),
    (BodyPart::RightShoulder, BodyPart::RightElbow),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    (BodyPart::LeftShoulder, BodyPart::LeftHip),
    (BodyPart::RightShoulder, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
];

mod colors {
    pub const KEYPOINT: [u8; 4] = [0x00, 0xFF, 0x00, 0xFF];
    pub const BONE: [u8; 4] = [0x2F, 0x73, 0x36, 0xFF];
    pub const PHASE_ACTIVE: [u8; 4] = [0x1E, 0x5B, 0x28, 0xFF];
    pub const PHASE_IDLE: [u8; 4] = [0xF3, 0xF4, 0xF6, 0xFF];
}

#[derive(Debug, Clone, Copy)]
pub struct OverlayRenderer {
    min_confidence: f32,
    marker_radius: f32,
    bone_width: f32,
}

impl OverlayRenderer {
    pub fn new(min_confidence: f32) -> Self {
        Self {
            min_confidence,
            marker_radius: 5.0,
            bone_width: 3.0,
        }
    }

    /// Redraw `frame` with the pose and the current phase on top
    pub fn render(&self, frame: &Frame, pose: Option<&PoseEstimate>, phase: SwingPhase) -> Frame {
        let mut out = frame.clone();

        if let Some(pose) = pose {
            for (from, to) in SKELETON_EDGES.iter() {
                let a = pose.confident(*from, self.min_confidence);
                let b = pose.confident(*to, self.min_confidence);
                if let (Some(a), Some(b)) = (a, b) {
                    let half_width = self.bone_width / 2.0;
                    draw_line(&mut out, (a.x, a.y), (b.x, b.y), half_width, colors::BONE);
                }
            }

            for keypoint in &pose.keypoints {
                if keypoint.confidence >= self.min_confidence {
                    let (x, y) = (keypoint.x, keypoint.y);
                    fill_disc(&mut out, x, y, self.marker_radius, colors::KEYPOINT);
                }
            }
        }

        draw_phase_strip(&mut out, phase);
        out
    }
}

/// Height of the phase strip along the top edge
fn strip_height(frame: &Frame) -> u32 {
    (frame.size.height / 24).max(4).min(frame.size.height)
}

fn draw_phase_strip(frame: &mut Frame, phase: SwingPhase) {
    let height = strip_height(frame) as i64;
    let width = frame.size.width as i64;
    let segments = SwingPhase::ALL.len() as i64;

    for (i, segment_phase) in SwingPhase::ALL.iter().enumerate() {
        let i = i as i64;
        let start = width * i / segments;
        // One pixel gap between segments
        let end = (width * (i + 1) / segments - 1).max(start + 1);
        let color = if *segment_phase == phase {
            colors::PHASE_ACTIVE
        } else {
            colors::PHASE_IDLE
        };
        for y in 0..height {
            for x in start..end {
                frame.put_pixel(x, y, color);
            }
        }
    }
}

fn fill_disc(frame: &mut Frame, cx: f32, cy: f32, radius: f32, color: [u8; 4]) {
    if !cx.is_finite() || !cy.is_finite() {
        return;
    }
    let r2 = radius * radius;
    let (min_x, max_x) = ((cx - radius).floor() as i64, (cx + radius).ceil() as i64);
    let (min_y, max_y) = ((cy - radius).floor() as i64, (cy + radius).ceil() as i64);

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            if dx * dx + dy * dy <= r2 {
                frame.put_pixel(x, y, color);
            }
        }
    }
}

type Point = (f32, f32);

fn draw_line(frame: &mut Frame, from: Point, to: Point, half_width: f32, color: [u8; 4]) {
    let length = ((to.0 - from.0).powi(2) + (to.1 - from.1).powi(2)).sqrt();
    if !length.is_finite() {
        return;
    }

    // Only the part that can touch the frame is stamped
    let margin = half_width.max(0.0) + 1.0;
    let min = (-margin, -margin);
    let max = (frame.size.width as f32 + margin, frame.size.height as f32 + margin);
    let Some((from, to)) = clip_segment(from, to, min, max) else {
        return;
    };
    let length = ((to.0 - from.0).powi(2) + (to.1 - from.1).powi(2)).sqrt();

    // Stamp discs every half pixel along the segment
    let steps = (length * 2.0).ceil().max(1.0) as u32;
    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        let x = from.0 + (to.0 - from.0) * t;
        let y = from.1 + (to.1 - from.1) * t;
        fill_disc(frame, x, y, half_width, color);
    }
}

/// Liang-Barsky clip of a segment against the box `min..=max`
fn clip_segment(from: Point, to: Point, min: Point, max: Point) -> Option<(Point, Point)> {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let mut enter = 0.0f32;
    let mut exit = 1.0f32;

    let edges = [
        (-dx, from.0 - min.0),
        (dx, max.0 - from.0),
        (-dy, from.1 - min.1),
        (dy, max.1 - from.1),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            // Parallel to this edge and outside it
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            enter = enter.max(r);
        } else {
            exit = exit.min(r);
        }
        if enter > exit {
            return None;
        }
    }

    Some((
        (from.0 + dx * enter, from.1 + dy * enter),
        (from.0 + dx * exit, from.1 + dy * exit),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;
    use crate::video::FrameSize;

    const BLACK: [u8; 4] = [0, 0, 0, 255];

    fn blank() -> Frame {
        Frame::filled(0, 0.0, FrameSize::new(120, 120), BLACK)
    }

    #[test]
    fn test_markers_respect_confidence() {
        let pose = PoseEstimate::new(vec![
            Keypoint::new(BodyPart::Nose, 30.0, 60.0, 0.9),
            Keypoint::new(BodyPart::LeftAnkle, 90.0, 60.0, 0.1),
        ]);
        let out = OverlayRenderer::new(0.3).render(&blank(), Some(&pose), SwingPhase::Setup);

        assert_eq!(out.pixel(30, 60), Some(colors::KEYPOINT));
        assert_eq!(out.pixel(90, 60), Some(BLACK));
    }

    #[test]
    fn test_bones_need_both_endpoints() {
        let pose = PoseEstimate::new(vec![
            Keypoint::new(BodyPart::LeftShoulder, 20.0, 40.0, 0.9),
            Keypoint::new(BodyPart::LeftElbow, 100.0, 40.0, 0.9),
            Keypoint::new(BodyPart::LeftHip, 20.0, 100.0, 0.2),
        ]);
        let out = OverlayRenderer::new(0.3).render(&blank(), Some(&pose), SwingPhase::Setup);

        // Shoulder to elbow midpoint is drawn, shoulder to hip midpoint is not
        assert_eq!(out.pixel(60, 40), Some(colors::BONE));
        assert_eq!(out.pixel(20, 70), Some(BLACK));
    }

    #[test]
    fn test_far_off_frame_bones_are_clipped() {
        let pose = PoseEstimate::new(vec![
            Keypoint::new(BodyPart::LeftShoulder, -1.0e7, 50.0, 0.9),
            Keypoint::new(BodyPart::LeftElbow, 1.0e7, 50.0, 0.9),
            Keypoint::new(BodyPart::RightShoulder, 5.0e6, -5.0e6, 0.9),
            Keypoint::new(BodyPart::RightElbow, 6.0e6, -4.0e6, 0.9),
        ]);
        let out = OverlayRenderer::new(0.3).render(&blank(), Some(&pose), SwingPhase::Setup);

        assert_eq!(out.pixel(0, 50), Some(colors::BONE));
        assert_eq!(out.pixel(119, 50), Some(colors::BONE));
        assert_eq!(out.pixel(60, 80), Some(BLACK));
    }

    #[test]
    fn test_clip_segment() {
        let (min, max) = ((0.0, 0.0), (10.0, 10.0));

        let (a, b) = clip_segment((-10.0, 5.0), (30.0, 5.0), min, max).unwrap();
        assert_eq!((a, b), ((0.0, 5.0), (10.0, 5.0)));

        let inside = clip_segment((2.0, 2.0), (8.0, 3.0), min, max).unwrap();
        assert_eq!(inside, ((2.0, 2.0), (8.0, 3.0)));

        assert!(clip_segment((-5.0, -5.0), (-1.0, 20.0), min, max).is_none());
        assert!(clip_segment((20.0, 20.0), (30.0, 20.0), min, max).is_none());
    }

    #[test]
    fn test_render_leaves_source_frame_untouched() {
        let frame = blank();
        let pose = PoseEstimate::new(vec![Keypoint::new(BodyPart::Nose, 60.0, 60.0, 1.0)]);
        let _ = OverlayRenderer::new(0.3).render(&frame, Some(&pose), SwingPhase::Impact);
        assert_eq!(frame, blank());
    }

    #[test]
    fn test_phase_strip_highlights_current_phase() {
        let renderer = OverlayRenderer::new(0.3);
        let out = renderer.render(&blank(), None, SwingPhase::Impact);

        // 120px wide strip: Impact is the fourth of five 24px segments
        assert_eq!(out.pixel(80, 1), Some(colors::PHASE_ACTIVE));
        assert_eq!(out.pixel(10, 1), Some(colors::PHASE_IDLE));
        assert_eq!(out.pixel(10, 60), Some(BLACK));
    }
}
