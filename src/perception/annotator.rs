/// Draws detected elements onto the screenshot and renders the element list
/// that accompanies it in the planning prompt.
use std::collections::HashMap;

use crate::errors::{SeeClawError, SeeClawResult};
use crate::perception::glyphs;
use crate::perception::types::{ElementType, UIElement};

/// Containment chains deeper than this are cut (guards against parent cycles).
const MAX_CHAIN_DEPTH: usize = 10;

fn element_colour(kind: ElementType) -> [u8; 4] {
    match kind {
        ElementType::Button => [255, 68, 68, 220],
        ElementType::Input => [68, 255, 68, 220],
        ElementType::Link => [68, 68, 255, 220],
        ElementType::Icon => [255, 170, 0, 220],
        ElementType::Checkbox | ElementType::Radio => [255, 68, 255, 220],
        ElementType::Menu => [0, 220, 255, 220],
        ElementType::MenuItem => [0, 200, 220, 220],
        ElementType::Select => [170, 170, 68, 220],
        ElementType::Text => [170, 170, 170, 200],
        ElementType::Image => [255, 200, 100, 220],
        ElementType::Container => [120, 120, 80, 180],
        ElementType::GridCell => [0, 200, 255, 130],
        ElementType::Unknown => [255, 255, 255, 200],
    }
}

/// Draw a box and the element id for every element. Returns PNG bytes.
/// Labels are drawn at 2× on wide (> 1600 px) screenshots.
pub fn annotate_image(src_bytes: &[u8], elements: &[UIElement]) -> SeeClawResult<Vec<u8>> {
    let img = image::load_from_memory(src_bytes)
        .map_err(|e| SeeClawError::Perception(format!("annotate load: {e}")))?;
    let mut canvas = img.to_rgba8();
    let (w, h) = canvas.dimensions();
    let wide = w > 1600;
    let scale = if wide { 2 } else { 1 };
    let thickness = if wide { 3 } else { 2 };

    for elem in elements {
        let [x1, y1, x2, y2] = elem.bbox;
        let x1 = (x1 * w as f32).round() as i64;
        let y1 = (y1 * h as f32).round() as i64;
        let x2 = (x2 * w as f32).round() as i64;
        let y2 = (y2 * h as f32).round() as i64;
        let colour = element_colour(elem.kind);

        draw_rect(&mut canvas, (x1, y1, x2, y2), colour, thickness);

        // Only the short id goes on the image; names travel in the element list.
        let pad = 2 * scale;
        let label_h = glyphs::GLYPH_SIZE * scale + pad * 2;
        let lx = x1.max(0) as u32;
        let ly = (y1 - label_h as i64).max(0) as u32;
        glyphs::shade_rect(
            &mut canvas,
            lx,
            ly,
            glyphs::text_width(&elem.id, scale) + pad * 2,
            label_h,
            0.2,
        );
        glyphs::draw_text(&mut canvas, &elem.id, lx + pad, ly + pad, scale, colour);
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| SeeClawError::Perception(format!("PNG encode: {e}")))?;
    Ok(out)
}

fn draw_rect(
    canvas: &mut image::RgbaImage,
    (x1, y1, x2, y2): (i64, i64, i64, i64),
    colour: [u8; 4],
    thickness: i64,
) {
    let (w, h) = canvas.dimensions();
    let mut plot = |x: i64, y: i64| {
        if x >= 0 && y >= 0 && x < w as i64 && y < h as i64 {
            glyphs::blend(canvas.get_pixel_mut(x as u32, y as u32), colour);
        }
    };
    for t in 0..thickness {
        for x in x1..=x2 {
            plot(x, y1 + t);
            plot(x, y2 - t);
        }
        for y in y1..=y2 {
            plot(x1 + t, y);
            plot(x2 - t, y);
        }
    }
}

/// Text listing of elements for the planning prompt.
///
/// Nested elements are addressed by containment chain: element 12 inside 7
/// inside 3 is listed as `3>7>12`. The model answers with the last id only.
pub fn build_element_list(elements: &[UIElement]) -> String {
    if elements.is_empty() {
        return "No UI elements detected.".to_string();
    }
    let by_id: HashMap<&str, &UIElement> = elements.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut lines = vec!["Detected elements:".to_string()];
    for e in elements {
        let name = match &e.label {
            Some(n) if !n.is_empty() => format!(" \"{n}\""),
            _ => String::new(),
        };
        lines.push(format!(
            "  - [{}] {} ({:.0}%){}",
            containment_chain(&e.id, &by_id),
            e.kind.as_str(),
            e.confidence * 100.0,
            name,
        ));
    }
    lines.join("\n")
}

fn containment_chain<'a>(id: &'a str, by_id: &HashMap<&'a str, &'a UIElement>) -> String {
    let mut chain = vec![id];
    let mut current = id;
    for _ in 0..MAX_CHAIN_DEPTH {
        match by_id.get(current).and_then(|e| e.parent_id.as_deref()) {
            Some(parent) => {
                chain.push(parent);
                current = parent;
            }
            None => break,
        }
    }
    chain.reverse();
    chain.join(">")
}
