//! 5×5 bitmap font shared by the grid overlay and the element annotator.
//!
//! Each glyph is five rows; bit 4 of a row is the leftmost pixel.

use image::{Rgba, RgbaImage};

const DIGITS: [[u8; 5]; 10] = [
    [0x0E, 0x11, 0x11, 0x11, 0x0E],
    [0x04, 0x0C, 0x04, 0x04, 0x0E],
    [0x0E, 0x11, 0x06, 0x08, 0x1F],
    [0x1E, 0x01, 0x06, 0x01, 0x1E],
    [0x06, 0x0A, 0x12, 0x1F, 0x02],
    [0x1F, 0x10, 0x1E, 0x01, 0x1E],
    [0x0E, 0x10, 0x1E, 0x11, 0x0E],
    [0x1F, 0x01, 0x02, 0x04, 0x04],
    [0x0E, 0x11, 0x0E, 0x11, 0x0E],
    [0x0E, 0x11, 0x0F, 0x01, 0x0E],
];

const LETTERS: [[u8; 5]; 26] = [
    [0x0E, 0x11, 0x1F, 0x11, 0x11],
    [0x1E, 0x11, 0x1E, 0x11, 0x1E],
    [0x0E, 0x10, 0x10, 0x10, 0x0E],
    [0x1C, 0x12, 0x11, 0x12, 0x1C],
    [0x1F, 0x10, 0x1E, 0x10, 0x1F],
    [0x1F, 0x10, 0x1E, 0x10, 0x10],
    [0x0E, 0x10, 0x13, 0x11, 0x0E],
    [0x11, 0x11, 0x1F, 0x11, 0x11],
    [0x0E, 0x04, 0x04, 0x04, 0x0E],
    [0x07, 0x02, 0x02, 0x12, 0x0C],
    [0x11, 0x12, 0x1C, 0x12, 0x11],
    [0x10, 0x10, 0x10, 0x10, 0x1F],
    [0x11, 0x1B, 0x15, 0x11, 0x11],
    [0x11, 0x19, 0x15, 0x13, 0x11],
    [0x0E, 0x11, 0x11, 0x11, 0x0E],
    [0x1E, 0x11, 0x1E, 0x10, 0x10],
    [0x0E, 0x11, 0x15, 0x12, 0x0D],
    [0x1E, 0x11, 0x1E, 0x12, 0x11],
    [0x0F, 0x10, 0x0E, 0x01, 0x1E],
    [0x1F, 0x04, 0x04, 0x04, 0x04],
    [0x11, 0x11, 0x11, 0x11, 0x0E],
    [0x11, 0x11, 0x11, 0x0A, 0x04],
    [0x11, 0x11, 0x15, 0x1B, 0x11],
    [0x11, 0x0A, 0x04, 0x0A, 0x11],
    [0x11, 0x0A, 0x04, 0x04, 0x04],
    [0x1F, 0x02, 0x04, 0x08, 0x1F],
];

pub const GLYPH_SIZE: u32 = 5;

/// Lower-case letters render as upper case; unsupported characters as nothing.
pub fn glyph(c: char) -> Option<[u8; 5]> {
    let c = c.to_ascii_uppercase();
    match c {
        '0'..='9' => Some(DIGITS[(c as u8 - b'0') as usize]),
        'A'..='Z' => Some(LETTERS[(c as u8 - b'A') as usize]),
        '_' => Some([0x00, 0x00, 0x00, 0x00, 0x1F]),
        '-' => Some([0x00, 0x00, 0x0E, 0x00, 0x00]),
        _ => None,
    }
}

/// Horizontal advance of one character at `scale`, including the 1px gap.
pub fn advance(scale: u32) -> u32 {
    GLYPH_SIZE * scale + 1
}

pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * advance(scale)
}

/// Alpha-blend `colour` onto one pixel; the destination stays opaque.
pub fn blend(pixel: &mut Rgba<u8>, colour: [u8; 4]) {
    let a = colour[3] as f32 / 255.0;
    for ch in 0..3 {
        pixel[ch] = (pixel[ch] as f32 * (1.0 - a) + colour[ch] as f32 * a).round() as u8;
    }
    pixel[3] = 255;
}

/// Darken a rectangle to make a label readable on any background.
pub fn shade_rect(canvas: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, keep: f32) {
    let (cw, ch) = canvas.dimensions();
    for py in y..y.saturating_add(h).min(ch) {
        for px in x..x.saturating_add(w).min(cw) {
            let p = canvas.get_pixel_mut(px, py);
            for c in 0..3 {
                p[c] = (p[c] as f32 * keep) as u8;
            }
            p[3] = 255;
        }
    }
}

/// Draw `text` with its top-left corner at (x, y). Pixels outside the canvas are clipped.
pub fn draw_text(canvas: &mut RgbaImage, text: &str, x: u32, y: u32, scale: u32, colour: [u8; 4]) {
    let (w, h) = canvas.dimensions();
    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else { continue };
        let gx = x + i as u32 * advance(scale);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if (bits >> (GLYPH_SIZE - 1 - col)) & 1 == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        let px = gx + col * scale + sx;
                        let py = y + row as u32 * scale + sy;
                        if px < w && py < h {
                            blend(canvas.get_pixel_mut(px, py), colour);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_grid_label_character_has_a_glyph() {
        for c in ('A'..='Z').chain('0'..='9') {
            assert!(glyph(c).is_some(), "missing glyph for {c}");
        }
        assert_eq!(glyph('a'), glyph('A'));
        assert!(glyph('?').is_none());
    }

    #[test]
    fn drawing_is_clipped_to_canvas() {
        let mut canvas = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        draw_text(&mut canvas, "W99", 4, 4, 2, [255, 255, 255, 255]);
        assert!(canvas.pixels().any(|p| p[0] == 255));
    }
}
