/// SoM (Set-of-Mark) grid fallback.
///
/// When no detector output is usable, an N×N labeled grid is drawn over the
/// screenshot and every cell becomes a synthetic element whose id is its label.
///
/// Labeling convention:
///   - Columns: A … Z, AA, AB … ZZ (left → right, bijective base 26)
///   - Rows:    1 … N              (top  → bottom)
use crate::errors::{SeeClawError, SeeClawResult};
use crate::perception::glyphs;
use crate::perception::types::{ElementType, UIElement};

/// Largest grid whose columns fit in two letters (26 + 26²).
pub const MAX_GRID_N: u32 = 702;

const LINE_COLOUR: [u8; 4] = [0, 200, 255, 130];
const LABEL_COLOUR: [u8; 4] = [255, 220, 0, 255];

/// Column letters for a 0-indexed column. 0→A, 25→Z, 26→AA, 27→AB, 52→BA.
pub fn col_label(col: u32) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Inverse of [`col_label`]. Case-insensitive.
pub fn parse_col(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 2 {
        return None;
    }
    let mut n: u32 = 0;
    for c in letters.chars() {
        let c = c.to_ascii_uppercase();
        if !c.is_ascii_uppercase() {
            return None;
        }
        n = n * 26 + (c as u32 - 'A' as u32 + 1);
    }
    Some(n - 1)
}

/// `col=2, row=3` → `"C4"`.
pub fn format_label(col: u32, row: u32) -> String {
    format!("{}{}", col_label(col), row + 1)
}

/// `"C4"` → `(2, 3)`. Whitespace and letter case are ignored; no bounds check.
pub fn parse_label(label: &str) -> Option<(u32, u32)> {
    let label = label.trim();
    let split = label
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(label.len());
    let (letters, digits) = label.split_at(split);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let col = parse_col(letters)?;
    let row = digits.parse::<u32>().ok()?.checked_sub(1)?;
    Some((col, row))
}

/// An N×N grid. `n` is always within `1..=MAX_GRID_N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpec {
    n: u32,
}

impl GridSpec {
    pub fn new(n: u32) -> SeeClawResult<Self> {
        if n == 0 || n > MAX_GRID_N {
            return Err(SeeClawError::Config(format!(
                "grid size must be in 1..={MAX_GRID_N}, got {n}"
            )));
        }
        Ok(Self { n })
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    pub fn label(&self, col: u32, row: u32) -> Option<String> {
        (col < self.n && row < self.n).then(|| format_label(col, row))
    }

    /// Parses a label and rejects cells outside this grid.
    pub fn parse(&self, label: &str) -> Option<(u32, u32)> {
        parse_label(label).filter(|&(col, row)| col < self.n && row < self.n)
    }

    /// Normalized rectangle `[col/N, row/N, (col+1)/N, (row+1)/N]`.
    pub fn cell_bbox(&self, col: u32, row: u32) -> [f32; 4] {
        let n = self.n as f64;
        [
            (col as f64 / n) as f32,
            (row as f64 / n) as f32,
            ((col + 1) as f64 / n) as f32,
            ((row + 1) as f64 / n) as f32,
        ]
    }

    /// Center of a cell in normalized space, computed without the f32 round trip.
    pub fn cell_center(&self, col: u32, row: u32) -> (f64, f64) {
        let n = self.n as f64;
        ((col as f64 + 0.5) / n, (row as f64 + 0.5) / n)
    }

    pub fn last_label(&self) -> String {
        format_label(self.n - 1, self.n - 1)
    }

    /// Every cell as a synthetic element, row-major from the top-left.
    pub fn elements(&self) -> Vec<UIElement> {
        let mut cells = Vec::with_capacity((self.n * self.n) as usize);
        for row in 0..self.n {
            for col in 0..self.n {
                cells.push(UIElement {
                    id: format_label(col, row),
                    kind: ElementType::GridCell,
                    bbox: self.cell_bbox(col, row),
                    label: None,
                    confidence: 1.0,
                    parent_id: None,
                });
            }
        }
        cells
    }
}

/// Overlay the grid on `src_bytes` (any format `image` can decode) with every
/// cell's label printed inside the cell. Returns PNG bytes.
pub fn draw_som_grid(src_bytes: &[u8], grid: GridSpec) -> SeeClawResult<Vec<u8>> {
    let img = image::load_from_memory(src_bytes)
        .map_err(|e| SeeClawError::Perception(format!("load image: {e}")))?;
    let mut canvas = img.to_rgba8();
    let (w, h) = canvas.dimensions();
    let n = grid.n();

    // Line positions follow the same proportional split as `cell_bbox`.
    let edge = |i: u32, extent: u32| ((i as u64 * extent as u64) / n as u64) as u32;

    for col in 1..n {
        let x = edge(col, w);
        for y in 0..h {
            for dx in 0..2 {
                if x + dx < w {
                    glyphs::blend(canvas.get_pixel_mut(x + dx, y), LINE_COLOUR);
                }
            }
        }
    }
    for row in 1..n {
        let y = edge(row, h);
        for x in 0..w {
            for dy in 0..2 {
                if y + dy < h {
                    glyphs::blend(canvas.get_pixel_mut(x, y + dy), LINE_COLOUR);
                }
            }
        }
    }

    let cell_w = (w / n).max(1);
    let scale = if cell_w >= 80 { 2 } else { 1 };
    let pad = 4;
    for row in 0..n {
        for col in 0..n {
            let label = format_label(col, row);
            let x = edge(col, w) + pad;
            let y = edge(row, h) + pad;
            if x >= w || y >= h {
                continue;
            }
            glyphs::shade_rect(
                &mut canvas,
                x.saturating_sub(1),
                y.saturating_sub(1),
                glyphs::text_width(&label, scale) + 1,
                glyphs::GLYPH_SIZE * scale + 2,
                0.25,
            );
            glyphs::draw_text(&mut canvas, &label, x, y, scale, LABEL_COLOUR);
        }
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| SeeClawError::Perception(format!("PNG encode: {e}")))?;
    Ok(out)
}

/// Prompt fragment explaining how to address grid cells.
pub fn build_grid_prompt(grid: GridSpec) -> String {
    let n = grid.n();
    format!(
        "No UI elements were detected, so the screenshot has a {n}x{n} grid overlay. \
         Every cell has its label printed in its top-left corner \
         (A1 = top-left cell, {last} = bottom-right cell). \
         Columns run left to right, rows top to bottom. \
         Use the label of the cell covering the target as `element_id`.",
        last = grid.last_label(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn column_labels_follow_spreadsheet_convention() {
        assert_eq!(col_label(0), "A");
        assert_eq!(col_label(25), "Z");
        assert_eq!(col_label(26), "AA");
        assert_eq!(col_label(27), "AB");
        assert_eq!(col_label(52), "BA");
        assert_eq!(col_label(MAX_GRID_N - 1), "ZZ");
    }

    #[test]
    fn parses_labels() {
        assert_eq!(parse_label("C4"), Some((2, 3)));
        assert_eq!(parse_label(" aa10 "), Some((26, 9)));
        assert_eq!(parse_label("A0"), None);
        assert_eq!(parse_label("4C"), None);
        assert_eq!(parse_label("AAA1"), None);
        assert_eq!(parse_label("C"), None);
        assert_eq!(parse_label("C4x"), None);
    }

    #[test]
    fn grid_rejects_out_of_range_cells() {
        let grid = GridSpec::new(8).unwrap();
        assert_eq!(grid.parse("H8"), Some((7, 7)));
        assert_eq!(grid.parse("I1"), None);
        assert_eq!(grid.parse("A9"), None);
        assert_eq!(grid.last_label(), "H8");
        assert!(GridSpec::new(0).is_err());
        assert!(GridSpec::new(MAX_GRID_N + 1).is_err());
    }

    #[test]
    fn cells_tile_the_unit_square() {
        let grid = GridSpec::new(12).unwrap();
        let cells = grid.elements();
        assert_eq!(cells.len(), 144);
        assert_eq!(cells[0].id, "A1");
        assert_eq!(cells[143].id, "L12");
        let total: f32 = cells.iter().map(|c| c.area()).sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(cells.iter().all(UIElement::is_well_formed));
    }

    #[test]
    fn draws_png_of_same_size() {
        let src = image::RgbaImage::from_pixel(120, 90, image::Rgba([30, 30, 30, 255]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(src)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let out = draw_som_grid(&png, GridSpec::new(4).unwrap()).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 90));
    }

    proptest! {
        #[test]
        fn label_round_trips(n in 1u32..=MAX_GRID_N, c in 0u32..MAX_GRID_N, r in 0u32..MAX_GRID_N) {
            let grid = GridSpec::new(n).unwrap();
            let (col, row) = (c % n, r % n);
            let label = grid.label(col, row).unwrap();
            prop_assert_eq!(grid.parse(&label), Some((col, row)));
        }

        #[test]
        fn distinct_cells_do_not_overlap(n in 1u32..40, a in 0u32..1600, b in 0u32..1600) {
            let grid = GridSpec::new(n).unwrap();
            let (ca, ra) = (a % n, (a / n) % n);
            let (cb, rb) = (b % n, (b / n) % n);
            prop_assume!((ca, ra) != (cb, rb));
            let x = grid.cell_bbox(ca, ra);
            let y = grid.cell_bbox(cb, rb);
            let overlap_w = x[2].min(y[2]) - x[0].max(y[0]);
            let overlap_h = x[3].min(y[3]) - x[1].max(y[1]);
            prop_assert!(overlap_w <= 1e-6 || overlap_h <= 1e-6);
        }
    }
}
