//! Frame annotation: track boxes, the virtual line, count overlays, and the
//! frame index, drawn directly onto an [`RgbImage`], plus JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use crate::counting::LineConfig;
use crate::detect::Detection;
use crate::error::CoreError;
use crate::frame::Frame;
use crate::geometry::{BBox, Point};
use crate::tracker::Track;

const LINE_COLOR: Rgb<u8> = Rgb([255, 64, 64]);
const OVERLAY_BG: Rgb<u8> = Rgb([0, 0, 0]);
const OVERLAY_FG: Rgb<u8> = Rgb([255, 255, 255]);

/// Per-class box colors, cycled by class id.
const CLASS_PALETTE: [(u8, u8, u8); 8] = [
    (0, 255, 0),
    (0, 160, 255),
    (255, 200, 0),
    (255, 0, 255),
    (0, 255, 255),
    (255, 128, 0),
    (128, 255, 0),
    (255, 0, 128),
];

pub fn class_color(class_id: u32) -> Rgb<u8> {
    let (r, g, b) = CLASS_PALETTE[class_id as usize % CLASS_PALETTE.len()];
    Rgb([r, g, b])
}

/// Running counts shown in the overlay.
#[derive(Debug, Clone, Copy)]
pub struct CountOverlay {
    pub entry: u64,
    pub exit: u64,
    pub net: i64,
}

/// Render the fully annotated frame: one box + label per track, the virtual
/// line, the count overlay, and the frame index.
pub fn annotate_frame(
    frame: &Frame,
    tracks: &[&Track],
    line: Option<&LineConfig>,
    counts: Option<CountOverlay>,
) -> RgbImage {
    let mut img = frame.to_rgb_image();

    for track in tracks {
        let color = class_color(track.class_id);
        draw_box(&mut img, &track.bbox, color);
        let label = format!("#{} {:.0}%", track.id, track.confidence * 100.0);
        let x = track.bbox.x1;
        let y = (track.bbox.y1 - 10).max(0);
        draw_label_box(&mut img, x, y, &label, color);
    }

    if let Some(line) = line {
        let (p1, p2) = line.resolve(frame.width, frame.height);
        draw_segment(&mut img, p1, p2, LINE_COLOR);
    }

    if let Some(c) = counts {
        draw_label_box(&mut img, 4, 4, &format!("IN {}", c.entry), OVERLAY_FG);
        draw_label_box(&mut img, 4, 14, &format!("OUT {}", c.exit), OVERLAY_FG);
        draw_label_box(&mut img, 4, 24, &format!("NET {}", c.net), OVERLAY_FG);
    }

    let info = format!("FRAME {:06}", frame.index);
    let info_w = info.chars().count() as i32 * 6 + 4;
    let x = (frame.width as i32 - info_w - 2).max(0);
    let y = (frame.height as i32 - 12).max(0);
    draw_label_box(&mut img, x, y, &info, OVERLAY_FG);

    img
}

/// Render detections without track identity (still-image path).
pub fn annotate_detections(frame: &Frame, detections: &[Detection]) -> RgbImage {
    let mut img = frame.to_rgb_image();
    for det in detections {
        let color = class_color(det.class_id);
        draw_box(&mut img, &det.bbox, color);
        let label = format!("{:.0}%", det.confidence * 100.0);
        draw_label_box(&mut img, det.bbox.x1, (det.bbox.y1 - 10).max(0), &label, color);
    }
    img
}

/// Encode the image as JPEG at the given quality (1..=100).
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(img)
        .map_err(|e| CoreError::Validation(format!("jpeg encode failed: {e}")))?;
    Ok(buf)
}

/// One-pixel box outline, clamped to the image.
fn draw_box(img: &mut RgbImage, bbox: &BBox, color: Rgb<u8>) {
    let w = img.width() as i32;
    let h = img.height() as i32;
    let x1 = bbox.x1.clamp(0, w - 1);
    let x2 = bbox.x2.clamp(0, w - 1);
    let y1 = bbox.y1.clamp(0, h - 1);
    let y2 = bbox.y2.clamp(0, h - 1);

    for x in x1..=x2 {
        img.put_pixel(x as u32, y1 as u32, color);
        img.put_pixel(x as u32, y2 as u32, color);
    }
    for y in y1..=y2 {
        img.put_pixel(x1 as u32, y as u32, color);
        img.put_pixel(x2 as u32, y as u32, color);
    }
}

/// Bresenham segment between two points, clamped to the image.
fn draw_segment(img: &mut RgbImage, p1: Point, p2: Point, color: Rgb<u8>) {
    let w = img.width() as i32;
    let h = img.height() as i32;
    let mut x = p1.x.round() as i32;
    let mut y = p1.y.round() as i32;
    let x_end = p2.x.round() as i32;
    let y_end = p2.y.round() as i32;

    let dx = (x_end - x).abs();
    let dy = -(y_end - y).abs();
    let sx = if x < x_end { 1 } else { -1 };
    let sy = if y < y_end { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if (0..w).contains(&x) && (0..h).contains(&y) {
            img.put_pixel(x as u32, y as u32, color);
        }
        if x == x_end && y == y_end {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn fill_rect(img: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32, color: Rgb<u8>) {
    let w = img.width() as i32;
    let h = img.height() as i32;
    for y in y1.clamp(0, h - 1)..=y2.clamp(0, h - 1) {
        for x in x1.clamp(0, w - 1)..=x2.clamp(0, w - 1) {
            img.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// Text on a dark backing rectangle.
fn draw_label_box(img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let text_w = text.chars().count() as i32 * 6;
    fill_rect(img, x, y, x + text_w + 2, y + 8, OVERLAY_BG);
    draw_text(img, x + 2, y + 1, text, color);
}

/// 5x7 bitmap text. Unknown characters advance the cursor without drawing.
fn draw_text(img: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let w = img.width() as i32;
    let h = img.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= h {
                    continue;
                }
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = x + col;
                        if px >= 0 && px < w {
                            img.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
        x += 6;
    }
}

#[rustfmt::skip]
fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'A' => Some([0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
        'E' => Some([0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111]),
        'F' => Some([0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000]),
        'I' => Some([0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
        'M' => Some([0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001]),
        'N' => Some([0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001]),
        'O' => Some([0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
        'R' => Some([0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001]),
        'T' => Some([0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100]),
        'U' => Some([0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
        '0' => Some([0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110]),
        '1' => Some([0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
        '2' => Some([0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111]),
        '3' => Some([0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110]),
        '4' => Some([0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010]),
        '5' => Some([0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110]),
        '6' => Some([0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110]),
        '7' => Some([0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000]),
        '8' => Some([0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110]),
        '9' => Some([0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100]),
        '#' => Some([0b01010, 0b11111, 0b01010, 0b01010, 0b01010, 0b11111, 0b01010]),
        '%' => Some([0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0b00000]),
        '-' => Some([0b00000, 0b00000, 0b00000, 0b01110, 0b00000, 0b00000, 0b00000]),
        '.' => Some([0, 0, 0, 0, 0, 0b00110, 0b00110]),
        ' ' => Some([0, 0, 0, 0, 0, 0, 0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;
    use crate::tracker::{MultiObjectTracker, TrackerConfig};

    fn blank_frame(width: u32, height: u32) -> Frame {
        Frame::from_rgb24(
            0,
            width,
            height,
            vec![0u8; (width * height * 3) as usize],
            chrono::Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn annotated_frame_keeps_dimensions() {
        let frame = blank_frame(64, 48);
        let img = annotate_frame(&frame, &[], None, None);
        assert_eq!(img.dimensions(), (64, 48));
    }

    #[test]
    fn track_box_is_drawn() {
        let frame = blank_frame(64, 64);
        let mut tracker = MultiObjectTracker::new(TrackerConfig::default());
        let det = Detection::new(BBox::new(10, 10, 40, 40).unwrap(), 0.9, 0).unwrap();
        tracker.step(0, &[det]).unwrap();
        let tracks: Vec<&Track> = tracker.tracks().iter().collect();

        let img = annotate_frame(&frame, &tracks, None, None);
        assert_eq!(*img.get_pixel(10, 25), class_color(0));
        assert_eq!(*img.get_pixel(25, 40), class_color(0));
    }

    #[test]
    fn line_is_drawn() {
        let frame = blank_frame(100, 100);
        let line = LineConfig::new(60.0, 0.0, 60.0, 100.0).unwrap();
        let img = annotate_frame(&frame, &[], Some(&line), None);
        assert_eq!(*img.get_pixel(60, 50), LINE_COLOR);
    }

    #[test]
    fn oversized_box_is_clamped() {
        let frame = blank_frame(32, 32);
        let frame_big_box = Detection::new(BBox::new(-5, -5, 100, 100).unwrap(), 0.5, 1).unwrap();
        let img = annotate_detections(&frame, &[frame_big_box]);
        assert_eq!(img.dimensions(), (32, 32));
    }

    #[test]
    fn jpeg_output_has_magic_bytes() {
        let frame = blank_frame(32, 32);
        let img = annotate_frame(&frame, &[], None, None);
        let jpeg = encode_jpeg(&img, 85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }
}
