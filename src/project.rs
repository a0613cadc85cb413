//! Screen-space projection of oriented surfels.
//!
//! A surfel's local frame maps `(u, v, 1)` to camera space through its two scaled tangent
//! axes and its center. Composing that with the pinhole intrinsics yields the plane basis
//! used for ray-splat intersection, and the same basis gives a closed-form screen-space
//! bounding ellipse.

use crate::camera::Intrinsics;
use crate::config::{EXTENT_EPSILON, FILTER_SIZE, TILE_HEIGHT, TILE_WIDTH};
use crate::math::{
    mat3_column, mat3_mul_vec, mat4_rotation_block, quat_to_rotation_matrix, transform_point_4x3,
    Vec3,
};
use crate::splat::Transmat;

/// `|n . p| / |p|` at or below this is treated as an edge-on surfel.
pub const EDGE_ON_EPSILON: f32 = 1e-6;

/// Builds the plane basis for a surfel, or `None` when it is seen exactly edge-on.
pub fn compute_transmat(
    position: Vec3,
    rotation: [f32; 4],
    scale: [f32; 2],
    scale_modifier: f32,
    view_matrix: &[f32; 16],
    intrinsics: &Intrinsics,
) -> Option<Transmat> {
    let r = quat_to_rotation_matrix(rotation);
    let w = mat4_rotation_block(view_matrix);

    let axis_u = mat3_mul_vec(w, mat3_column(r, 0)) * (scale[0] * scale_modifier);
    let axis_v = mat3_mul_vec(w, mat3_column(r, 1)) * (scale[1] * scale_modifier);
    let normal = mat3_mul_vec(w, mat3_column(r, 2));
    let center = transform_point_4x3(position, view_matrix);

    // The local-to-camera map [axis_u | axis_v | center] is singular exactly when the
    // view ray to the center lies in the surfel plane.
    if normal.dot(center).abs() <= EDGE_ON_EPSILON * center.length() {
        return None;
    }

    Some(apply_intrinsics(axis_u, axis_v, center, intrinsics))
}

fn apply_intrinsics(a: Vec3, b: Vec3, c: Vec3, k: &Intrinsics) -> Transmat {
    let row_x = |v: Vec3| k.fx * v.x + k.cx * v.z;
    let row_y = |v: Vec3| k.fy * v.y + k.cy * v.z;
    Transmat {
        tu: Vec3::new(row_x(a), row_x(b), row_x(c)),
        tv: Vec3::new(row_y(a), row_y(b), row_y(c)),
        tw: Vec3::new(a.z, b.z, c.z),
    }
}

/// Camera-space unit normal of the surfel plane, oriented towards the camera.
pub fn camera_normal(transmat: &Transmat, k: &Intrinsics) -> Vec3 {
    let unproject = |col: usize| {
        let pick = |v: Vec3| match col {
            0 => v.x,
            1 => v.y,
            _ => v.z,
        };
        let z = pick(transmat.tw);
        Vec3::new(
            (pick(transmat.tu) - k.cx * z) / k.fx,
            (pick(transmat.tv) - k.cy * z) / k.fy,
            z,
        )
    };
    let normal = unproject(0).cross(unproject(1)).normalize();
    if normal.dot(unproject(2)) > 0.0 {
        -normal
    } else {
        normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub center: [f32; 2],
    /// Per-axis half extents in pixels.
    pub extent: [f32; 2],
}

impl Footprint {
    /// Integer pixel radius: `cutoff` times the larger extent, never below the filter radius.
    pub fn radius(&self, cutoff: f32) -> u32 {
        let max_extent = self.extent[0].max(self.extent[1]);
        (cutoff * max_extent).max(cutoff * FILTER_SIZE).ceil() as u32
    }
}

/// Solves the screen-space center and extents of the surfel's unit ellipse.
///
/// Returns `None` when the homogeneous system has a zero denominator.
pub fn compute_footprint(transmat: &Transmat) -> Option<Footprint> {
    let Transmat { tu, tv, tw } = *transmat;
    let signs = Vec3::new(1.0, 1.0, -1.0);
    let distance = tw.mul_elem(tw).mul_elem(signs).sum();
    if distance == 0.0 {
        return None;
    }
    let f = signs * (1.0 / distance);

    let center = [
        f.mul_elem(tu).mul_elem(tw).sum(),
        f.mul_elem(tv).mul_elem(tw).sum(),
    ];
    let second = [
        f.mul_elem(tu).mul_elem(tu).sum(),
        f.mul_elem(tv).mul_elem(tv).sum(),
    ];
    let extent = [
        (center[0] * center[0] - second[0]).max(0.0).sqrt() + EXTENT_EPSILON,
        (center[1] * center[1] - second[1]).max(0.0).sqrt() + EXTENT_EPSILON,
    ];
    Some(Footprint { center, extent })
}

/// Tile-grid rectangle; `min` inclusive, `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileRect {
    pub min: (u32, u32),
    pub max: (u32, u32),
}

impl TileRect {
    pub fn tile_count(&self) -> u32 {
        (self.max.0.saturating_sub(self.min.0)) * (self.max.1.saturating_sub(self.min.1))
    }

    pub fn is_empty(&self) -> bool {
        self.tile_count() == 0
    }

    /// Tile ids covered, row by row.
    pub fn tile_ids(&self, grid_width: u32) -> impl Iterator<Item = u32> + '_ {
        (self.min.1..self.max.1)
            .flat_map(move |y| (self.min.0..self.max.0).map(move |x| y * grid_width + x))
    }
}

/// Tiles touched by a square of half-width `radius` around `center`, clipped to the grid.
pub fn tile_rect(center: [f32; 2], radius: u32, grid: (u32, u32)) -> TileRect {
    let r = radius as f32;
    let to_tile = |v: f32, size: u32, limit: u32| (v / size as f32).max(0.0).min(limit as f32) as u32;
    TileRect {
        min: (
            to_tile(center[0] - r, TILE_WIDTH, grid.0),
            to_tile(center[1] - r, TILE_HEIGHT, grid.1),
        ),
        max: (
            to_tile(center[0] + r + (TILE_WIDTH - 1) as f32, TILE_WIDTH, grid.0),
            to_tile(center[1] + r + (TILE_HEIGHT - 1) as f32, TILE_HEIGHT, grid.1),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const IDENTITY_VIEW: [f32; 16] = [
        1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
    ];

    fn intrinsics() -> Intrinsics {
        Intrinsics {
            fx: 100.0,
            fy: 80.0,
            cx: 32.0,
            cy: 24.0,
        }
    }

    #[test]
    fn face_on_surfel_projects_to_pinhole_center() {
        let t = compute_transmat(
            Vec3::new(0.5, -0.25, 5.0),
            [1.0, 0.0, 0.0, 0.0],
            [0.2, 0.1],
            1.0,
            &IDENTITY_VIEW,
            &intrinsics(),
        )
        .expect("face-on surfel projects");
        let fp = compute_footprint(&t).expect("non-degenerate footprint");
        assert_abs_diff_eq!(fp.center[0], 32.0 + 100.0 * 0.5 / 5.0, epsilon = 1e-3);
        assert_abs_diff_eq!(fp.center[1], 24.0 - 80.0 * 0.25 / 5.0, epsilon = 1e-3);
        // One-sigma extents are scale * focal / depth, plus the fixed epsilon.
        assert_abs_diff_eq!(fp.extent[0], 100.0 * 0.2 / 5.0 + EXTENT_EPSILON, epsilon = 1e-2);
        assert_abs_diff_eq!(fp.extent[1], 80.0 * 0.1 / 5.0 + EXTENT_EPSILON, epsilon = 1e-2);
    }

    #[test]
    fn edge_on_surfel_fails_projection() {
        let half = std::f32::consts::FRAC_PI_4;
        let t = compute_transmat(
            Vec3::new(0.0, 0.0, 5.0),
            [half.cos(), 0.0, half.sin(), 0.0],
            [0.2, 0.2],
            1.0,
            &IDENTITY_VIEW,
            &intrinsics(),
        );
        assert!(t.is_none());
    }

    #[test]
    fn scale_modifier_scales_extent() {
        let project = |modifier| {
            let t = compute_transmat(
                Vec3::new(0.0, 0.0, 4.0),
                [1.0, 0.0, 0.0, 0.0],
                [0.3, 0.3],
                modifier,
                &IDENTITY_VIEW,
                &intrinsics(),
            )
            .expect("projects");
            compute_footprint(&t).expect("footprint").extent[0]
        };
        let base = project(1.0) - EXTENT_EPSILON;
        let doubled = project(2.0) - EXTENT_EPSILON;
        assert_abs_diff_eq!(doubled, 2.0 * base, epsilon = 1e-3);
    }

    #[test]
    fn zero_denominator_fails_footprint() {
        let t = Transmat {
            tu: Vec3::new(1.0, 0.0, 0.0),
            tv: Vec3::new(0.0, 1.0, 0.0),
            tw: Vec3::new(1.0, 0.0, 1.0),
        };
        assert!(compute_footprint(&t).is_none());
    }

    #[test]
    fn camera_normal_faces_the_camera() {
        for rotation in [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]] {
            let t = compute_transmat(
                Vec3::new(0.0, 0.0, 3.0),
                rotation,
                [0.5, 0.5],
                1.0,
                &IDENTITY_VIEW,
                &intrinsics(),
            )
            .expect("projects");
            let n = camera_normal(&t, &intrinsics());
            assert_abs_diff_eq!(n.z, -1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn radius_respects_filter_floor() {
        let tiny = Footprint {
            center: [0.0, 0.0],
            extent: [0.01, 0.01],
        };
        assert_eq!(tiny.radius(3.0), (3.0 * FILTER_SIZE).ceil() as u32);
        let wide = Footprint {
            center: [0.0, 0.0],
            extent: [4.2, 1.0],
        };
        assert_eq!(wide.radius(3.0), 13);
    }

    #[test]
    fn tile_rect_clips_to_grid() {
        let rect = tile_rect([8.0, 8.0], 3, (4, 4));
        assert_eq!(rect, TileRect { min: (0, 0), max: (1, 1) });
        assert_eq!(rect.tile_count(), 1);

        let straddle = tile_rect([16.0, 16.0], 2, (4, 4));
        assert_eq!(straddle.tile_count(), 4);

        let off_screen = tile_rect([-100.0, 8.0], 5, (4, 4));
        assert!(off_screen.is_empty());

        let beyond = tile_rect([500.0, 500.0], 10, (4, 4));
        assert!(beyond.is_empty());
    }

    #[test]
    fn tile_ids_walk_rows() {
        let rect = TileRect { min: (1, 0), max: (3, 2) };
        let ids: Vec<u32> = rect.tile_ids(4).collect();
        assert_eq!(ids, vec![1, 2, 5, 6]);
    }
}
