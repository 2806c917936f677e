//! Depth-row to virtual scan conversion
//!
//! A depth camera joins the scan pipeline by turning one image row into a
//! fan of beams: column `i` of a `width`-pixel row maps to an angle inside the
//! horizontal field of view, and the depth value becomes the beam range.
//! Zero depth means "no return" and is reported as an invalid point.

use crate::raw::{RawPoint, RawScan};

/// One row of a z16 depth image
#[derive(Debug, Clone, PartialEq)]
pub struct DepthRow {
    /// Depth per column in millimeters (0 = no data)
    pub depth_mm: Vec<u16>,
    /// Horizontal field of view in degrees
    pub hfov_deg: f64,
}

/// Convert a depth row into a raw scan
///
/// Ranges are emitted in millimeters; the reader's unit normalization turns
/// them into meters. The leftmost column gets the largest angle so that the
/// result is counter-clockwise like a lidar scan.
pub fn depth_row_to_scan(row: &DepthRow) -> RawScan {
    let width = row.depth_mm.len();
    if width == 0 {
        return RawScan::default();
    }

    let half_fov = row.hfov_deg / 2.0;
    let step = if width > 1 {
        row.hfov_deg / (width - 1) as f64
    } else {
        0.0
    };

    let points = row
        .depth_mm
        .iter()
        .enumerate()
        .map(|(i, &depth)| {
            let angle = if width > 1 {
                half_fov - step * i as f64
            } else {
                0.0
            };
            let point = RawPoint::new(angle, f64::from(depth));
            if depth == 0 { point.invalid() } else { point }
        })
        .collect();

    RawScan::new(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_row_angles() {
        let row = DepthRow {
            depth_mm: vec![1000, 2000, 3000],
            hfov_deg: 90.0,
        };
        let scan = depth_row_to_scan(&row);

        assert_eq!(scan.len(), 3);
        assert!((scan.points[0].angle_deg - 45.0).abs() < 1e-9);
        assert!(scan.points[1].angle_deg.abs() < 1e-9);
        assert!((scan.points[2].angle_deg + 45.0).abs() < 1e-9);
        assert_eq!(scan.points[2].range, 3000.0);
    }

    #[test]
    fn test_zero_depth_is_invalid() {
        let row = DepthRow {
            depth_mm: vec![0, 1500],
            hfov_deg: 60.0,
        };
        let scan = depth_row_to_scan(&row);
        assert!(!scan.points[0].valid);
        assert!(scan.points[1].valid);
    }

    #[test]
    fn test_degenerate_rows() {
        let empty = DepthRow {
            depth_mm: vec![],
            hfov_deg: 87.0,
        };
        assert!(depth_row_to_scan(&empty).is_empty());

        let single = DepthRow {
            depth_mm: vec![1200],
            hfov_deg: 87.0,
        };
        let scan = depth_row_to_scan(&single);
        assert_eq!(scan.points[0].angle_deg, 0.0);
    }
}
