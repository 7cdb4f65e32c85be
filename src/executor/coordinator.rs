/// DPI-aware coordinate mapping.
///
/// normalized bbox centre → logical pixels (× logical size) → physical pixels
/// (× scale factor) → desktop position (+ monitor origin). The metadata always
/// comes from the snapshot the locator was resolved against.
use serde::{Deserialize, Serialize};

use crate::errors::{SeeClawError, SeeClawResult};
use crate::perception::som_grid::GridSpec;
use crate::perception::types::{CaptureMeta, PerceptionSnapshot, PerceptionSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Id of an element in the snapshot.
    Element(String),
    /// Grid cell label (`"C4"`); only valid for grid snapshots.
    GridLabel(String),
}

impl Locator {
    /// Interpret a planner-provided id according to how the snapshot was built.
    pub fn for_snapshot(id: &str, snapshot: &PerceptionSnapshot) -> Self {
        match snapshot.source() {
            PerceptionSource::SomGrid => Locator::GridLabel(id.trim().to_string()),
            PerceptionSource::Detector => Locator::Element(id.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalPoint {
    pub x: i32,
    pub y: i32,
}

/// Map a normalized point through one capture's metadata.
pub fn normalized_to_physical(nx: f64, ny: f64, meta: &CaptureMeta) -> PhysicalPoint {
    let lx = nx * meta.logical_width as f64;
    let ly = ny * meta.logical_height as f64;
    PhysicalPoint {
        x: meta.monitor_origin_x + (lx * meta.scale_factor).round() as i32,
        y: meta.monitor_origin_y + (ly * meta.scale_factor).round() as i32,
    }
}

pub fn resolve(locator: &Locator, snapshot: &PerceptionSnapshot) -> SeeClawResult<PhysicalPoint> {
    let (nx, ny) = match locator {
        Locator::Element(id) => snapshot
            .element(id)
            .map(|e| e.center())
            .ok_or_else(|| SeeClawError::Executor(format!("unknown element id '{id}'")))?,
        Locator::GridLabel(label) => {
            let n = snapshot.grid_n().ok_or_else(|| {
                SeeClawError::Executor(format!(
                    "grid label '{label}' used but the current view has no grid"
                ))
            })?;
            let grid = GridSpec::new(n)?;
            let (col, row) = grid.parse(label).ok_or_else(|| {
                SeeClawError::Executor(format!(
                    "invalid grid label '{label}' (expected A1..{})",
                    grid.last_label()
                ))
            })?;
            grid.cell_center(col, row)
        }
    };
    let point = normalized_to_physical(nx, ny, snapshot.meta());
    tracing::debug!(?locator, x = point.x, y = point.y, "locator resolved");
    Ok(point)
}

/// Resolve a planner-provided element id against the snapshot it refers to.
pub fn locate(id: &str, snapshot: &PerceptionSnapshot) -> SeeClawResult<PhysicalPoint> {
    resolve(&Locator::for_snapshot(id, snapshot), snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::{ElementType, UIElement};
    use proptest::prelude::*;

    fn meta(w: u32, h: u32, scale: f64, ox: i32, oy: i32) -> CaptureMeta {
        CaptureMeta {
            logical_width: w,
            logical_height: h,
            scale_factor: scale,
            monitor_origin_x: ox,
            monitor_origin_y: oy,
            monitor_index: 0,
        }
    }

    #[test]
    fn grid_cell_centre_on_scaled_secondary_monitor() {
        let grid = GridSpec::new(4).unwrap();
        let snap = PerceptionSnapshot::grid(None, grid.elements(), meta(1600, 900, 1.5, 2560, 0), 4);
        // B3 → col 1, row 2 → centre (0.375, 0.625).
        let p = locate("B3", &snap).unwrap();
        assert_eq!(p, PhysicalPoint { x: 2560 + 900, y: 844 });
    }

    #[test]
    fn element_centre_maps_through_meta() {
        let elem = UIElement {
            id: "1".into(),
            kind: ElementType::Button,
            bbox: [0.25, 0.5, 0.75, 1.0],
            label: None,
            confidence: 0.9,
            parent_id: None,
        };
        let snap = PerceptionSnapshot::from_detections(None, vec![elem], meta(1000, 800, 2.0, -2000, 100));
        assert_eq!(locate("1", &snap).unwrap(), PhysicalPoint { x: -1000, y: 1300 });
    }

    #[test]
    fn bad_locators_are_executor_errors() {
        let grid = GridSpec::new(8).unwrap();
        let grid_snap = PerceptionSnapshot::grid(None, grid.elements(), meta(800, 600, 1.0, 0, 0), 8);
        assert!(matches!(locate("Z99", &grid_snap), Err(SeeClawError::Executor(_))));

        let det_snap = PerceptionSnapshot::from_detections(None, Vec::new(), meta(800, 600, 1.0, 0, 0));
        assert!(matches!(locate("7", &det_snap), Err(SeeClawError::Executor(_))));
        assert!(resolve(&Locator::GridLabel("A1".into()), &det_snap).is_err());
    }

    proptest! {
        #[test]
        fn corners_map_to_origin_and_far_corner(
            w in 1u32..8000, h in 1u32..8000,
            scale in 0.5f64..4.0,
            ox in -10_000i32..10_000, oy in -10_000i32..10_000,
        ) {
            let m = meta(w, h, scale, ox, oy);
            prop_assert_eq!(normalized_to_physical(0.0, 0.0, &m), PhysicalPoint { x: ox, y: oy });
            let far = normalized_to_physical(1.0, 1.0, &m);
            prop_assert_eq!(far.x, ox + (w as f64 * scale).round() as i32);
            prop_assert_eq!(far.y, oy + (h as f64 * scale).round() as i32);
        }

        #[test]
        fn every_grid_cell_resolves_inside_its_own_cell(n in 1u32..30, idx in 0u32..900) {
            let grid = GridSpec::new(n).unwrap();
            let (col, row) = (idx % n, (idx / n) % n);
            let m = meta(1920, 1080, 1.25, 0, 0);
            let snap = PerceptionSnapshot::grid(None, grid.elements(), m, n);
            let p = locate(&grid.label(col, row).unwrap(), &snap).unwrap();
            let (pw, ph) = (1920.0 * 1.25, 1080.0 * 1.25);
            let [x1, y1, x2, y2] = grid.cell_bbox(col, row);
            prop_assert!(p.x as f64 >= (x1 as f64 * pw).floor() && p.x as f64 <= (x2 as f64 * pw).ceil());
            prop_assert!(p.y as f64 >= (y1 as f64 * ph).floor() && p.y as f64 <= (y2 as f64 * ph).ceil());
        }
    }
}
