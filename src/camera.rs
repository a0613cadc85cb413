use crate::config::{NEAR_PLANE, TILE_HEIGHT, TILE_WIDTH};
use crate::math::{transform_point_4x3, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl Intrinsics {
    /// Pinhole intrinsics for a vertical field of view, principal point at the image center.
    pub fn from_fov(fov_y: f32, width: u32, height: u32) -> Self {
        let h = height.max(1) as f32;
        let w = width.max(1) as f32;
        let tan_half = (fov_y * 0.5).tan().max(1e-6);
        let fy = h / (2.0 * tan_half);
        Self {
            fx: fy,
            fy,
            cx: (w - 1.0) * 0.5,
            cy: (h - 1.0) * 0.5,
        }
    }
}

/// Per-frame camera inputs. View space is x right, y down, z forward.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// World-to-view transform, column-major (element (r, c) at `c * 4 + r`).
    pub view_matrix: [f32; 16],
    pub position: Vec3,
    pub intrinsics: Intrinsics,
    pub tan_fovx: f32,
    pub tan_fovy: f32,
    pub width: u32,
    pub height: u32,
}

impl Camera {
    pub fn new(
        view_matrix: [f32; 16],
        position: Vec3,
        intrinsics: Intrinsics,
        width: u32,
        height: u32,
    ) -> Self {
        let tan_fovx = width as f32 / (2.0 * intrinsics.fx);
        let tan_fovy = height as f32 / (2.0 * intrinsics.fy);
        Self {
            view_matrix,
            position,
            intrinsics,
            tan_fovx,
            tan_fovy,
            width,
            height,
        }
    }

    pub fn look_at(eye: Vec3, target: Vec3, fov_y: f32, width: u32, height: u32) -> Self {
        let forward = (target - eye).normalize();
        let world_up = Vec3::new(0.0, 1.0, 0.0);
        let right = forward.cross(world_up);
        let right = if right.length_squared() < 1e-6 {
            Vec3::new(1.0, 0.0, 0.0)
        } else {
            right.normalize()
        };
        let up = right.cross(forward).normalize();
        let down = -up;

        let rows = [right, down, forward];
        let mut view_matrix = [0.0; 16];
        for (r, axis) in rows.iter().enumerate() {
            view_matrix[r] = axis.x;
            view_matrix[4 + r] = axis.y;
            view_matrix[8 + r] = axis.z;
            view_matrix[12 + r] = -axis.dot(eye);
        }
        view_matrix[15] = 1.0;

        Self::new(
            view_matrix,
            eye,
            Intrinsics::from_fov(fov_y, width, height),
            width,
            height,
        )
    }

    pub fn world_to_view(&self, point: Vec3) -> Vec3 {
        transform_point_4x3(point, &self.view_matrix)
    }

    /// Tile grid covering the image.
    pub fn tile_grid(&self) -> (u32, u32) {
        (
            self.width.div_ceil(TILE_WIDTH),
            self.height.div_ceil(TILE_HEIGHT),
        )
    }
}

/// Near-plane test. Returns the view-space position when the point is in front of the camera.
pub fn in_frustum(position: Vec3, camera: &Camera, prefiltered: bool) -> Option<Vec3> {
    let p_view = camera.world_to_view(position);
    if p_view.z <= NEAR_PLANE {
        if prefiltered {
            log::warn!(
                "prefiltered primitive at ({:.3}, {:.3}, {:.3}) lies behind the near plane",
                position.x,
                position.y,
                position.z
            );
        }
        return None;
    }
    Some(p_view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn look_at_puts_target_on_positive_z() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0, 64, 48);
        let v = camera.world_to_view(Vec3::ZERO);
        assert_abs_diff_eq!(v.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(v.y, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(v.z, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn look_at_maps_world_up_to_negative_view_y() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0, 64, 64);
        let v = camera.world_to_view(Vec3::new(0.0, 1.0, 0.0));
        assert!(v.y < 0.0);
        let v = camera.world_to_view(Vec3::new(1.0, 0.0, 0.0));
        assert!(v.x > 0.0);
    }

    #[test]
    fn look_at_straight_down_falls_back_to_x_right() {
        let camera = Camera::look_at(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, 1.0, 32, 32);
        let v = camera.world_to_view(Vec3::ZERO);
        assert_abs_diff_eq!(v.z, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn near_plane_rejects_points_behind_camera() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0, 32, 32);
        assert!(in_frustum(Vec3::ZERO, &camera, false).is_some());
        assert!(in_frustum(Vec3::new(0.0, 0.0, 6.0), &camera, false).is_none());
        assert!(in_frustum(Vec3::new(0.0, 0.0, 4.9), &camera, true).is_none());
    }

    #[test]
    fn tile_grid_rounds_up() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0, 33, 16);
        assert_eq!(camera.tile_grid(), (3, 1));
    }
}
