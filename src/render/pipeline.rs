use rayon::prelude::*;

use crate::camera::{in_frustum, Camera};
use crate::config::{RasterConfig, NUM_CHANNELS};
use crate::project::{camera_normal, compute_footprint, compute_transmat, tile_rect};
use crate::sh::compute_color_from_sh;
use crate::splat::{ProjectedSplat, SplatScene};

// --- Preprocess ---

/// Projects every primitive into its arena slot. Culled primitives keep the inactive default.
pub fn preprocess_splats(
    scene: &SplatScene,
    camera: &Camera,
    config: &RasterConfig,
) -> Vec<ProjectedSplat> {
    let grid = camera.tile_grid();
    (0..scene.len())
        .into_par_iter()
        .map(|idx| preprocess_splat(idx, scene, camera, config, grid))
        .collect()
}

pub fn preprocess_splat(
    idx: usize,
    scene: &SplatScene,
    camera: &Camera,
    config: &RasterConfig,
    grid: (u32, u32),
) -> ProjectedSplat {
    let inactive = ProjectedSplat::default();

    let Some(p_view) = in_frustum(scene.positions[idx], camera, config.prefiltered) else {
        return inactive;
    };

    let transmat = match &scene.transmats_precomp {
        Some(transmats) => transmats[idx],
        None => match compute_transmat(
            scene.positions[idx],
            scene.rotations[idx],
            scene.scales[idx],
            config.scale_modifier,
            &camera.view_matrix,
            &camera.intrinsics,
        ) {
            Some(t) => t,
            None => return inactive,
        },
    };

    let Some(footprint) = compute_footprint(&transmat) else {
        return inactive;
    };

    let opacity = scene.opacities[idx];
    let radius = footprint.radius(config.footprint_cutoff(opacity));
    let rect = tile_rect(footprint.center, radius, grid);
    if rect.is_empty() {
        return inactive;
    }

    let (rgb, clamped) = match &scene.colors_precomp {
        Some(colors) => (colors[idx], [false; 3]),
        None => {
            let color = compute_color_from_sh(
                idx,
                scene.sh_degree,
                scene.max_coeffs,
                &scene.positions,
                camera.position,
                &scene.shs,
            );
            let mut rgb = [0.0; NUM_CHANNELS];
            for (dst, src) in rgb.iter_mut().zip(color.rgb) {
                *dst = src;
            }
            (rgb, color.clamped)
        }
    };

    ProjectedSplat {
        radius,
        point_image: footprint.center,
        depth: p_view.z,
        conic_opacity: [0.0, 0.0, 0.0, opacity],
        rgb,
        clamped,
        transmat,
        normal: camera_normal(&transmat, &camera.intrinsics),
        tiles_touched: rect.tile_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Intrinsics;
    use crate::math::Vec3;
    use crate::splat::Transmat;
    use approx::assert_abs_diff_eq;

    const IDENTITY_VIEW: [f32; 16] = [
        1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
    ];

    fn test_camera() -> Camera {
        Camera::new(
            IDENTITY_VIEW,
            Vec3::ZERO,
            Intrinsics {
                fx: 40.0,
                fy: 40.0,
                cx: 32.0,
                cy: 32.0,
            },
            64,
            64,
        )
    }

    fn scene_with(position: Vec3, rotation: [f32; 4], opacity: f32) -> SplatScene {
        let mut scene = SplatScene::new(0);
        scene.push(position, [0.3, 0.3], rotation, opacity, &[[1.0, 0.0, -3.0]]);
        scene
    }

    fn run(scene: &SplatScene, config: &RasterConfig) -> Vec<ProjectedSplat> {
        preprocess_splats(scene, &test_camera(), config)
    }

    #[test]
    fn visible_surfel_fills_every_output() {
        let scene = scene_with(Vec3::new(0.0, 0.0, 4.0), [1.0, 0.0, 0.0, 0.0], 0.8);
        let out = run(&scene, &RasterConfig::default())[0];
        assert!(out.is_visible());
        assert_abs_diff_eq!(out.point_image[0], 32.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.point_image[1], 32.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.depth, 4.0, epsilon = 1e-6);
        assert_eq!(out.conic_opacity, [0.0, 0.0, 0.0, 0.8]);
        assert!(out.tiles_touched >= 1);
        // 3 * (40 * 0.3 / 4 + 0.01) = 9.03 -> 10 pixels.
        assert_eq!(out.radius, 10);
        assert_eq!(out.clamped, [false, false, true]);
        assert_eq!(out.rgb[2], 0.0);
    }

    #[test]
    fn behind_near_plane_is_inactive() {
        let scene = scene_with(Vec3::new(0.0, 0.0, -2.0), [1.0, 0.0, 0.0, 0.0], 1.0);
        let out = run(&scene, &RasterConfig::default())[0];
        assert_eq!(out, ProjectedSplat::default());
        assert_eq!(out.radius, 0);
        assert_eq!(out.tiles_touched, 0);
    }

    #[test]
    fn edge_on_surfel_is_inactive() {
        let half = std::f32::consts::FRAC_PI_4;
        let scene = scene_with(
            Vec3::new(0.0, 0.0, 4.0),
            [half.cos(), 0.0, half.sin(), 0.0],
            1.0,
        );
        let out = run(&scene, &RasterConfig::default())[0];
        assert_eq!(out.radius, 0);
        assert_eq!(out.tiles_touched, 0);
    }

    #[test]
    fn off_screen_surfel_is_inactive() {
        let scene = scene_with(Vec3::new(40.0, 0.0, 4.0), [1.0, 0.0, 0.0, 0.0], 1.0);
        let out = run(&scene, &RasterConfig::default())[0];
        assert!(!out.is_visible());
    }

    #[test]
    fn tight_footprint_shrinks_low_opacity_radius() {
        let scene = scene_with(Vec3::new(0.0, 0.0, 2.0), [1.0, 0.0, 0.0, 0.0], 0.02);
        let loose = run(&scene, &RasterConfig::default())[0];
        let tight = run(
            &scene,
            &RasterConfig {
                tight_footprint: true,
                ..RasterConfig::default()
            },
        )[0];
        assert!(tight.radius < loose.radius);
        assert!(tight.is_visible());
    }

    #[test]
    fn precomputed_inputs_are_authoritative() {
        let mut scene = scene_with(Vec3::new(0.0, 0.0, 4.0), [1.0, 0.0, 0.0, 0.0], 1.0);
        scene.colors_precomp = Some(vec![[0.1, 0.2, 0.3]]);
        let reference = run(&scene, &RasterConfig::default())[0];

        // Same plane basis supplied directly, with rotation/scale left meaningless.
        let transmat: Transmat = reference.transmat;
        scene.rotations[0] = [0.0, 0.0, 0.0, 0.0];
        scene.scales[0] = [0.0, 0.0];
        scene.transmats_precomp = Some(vec![transmat]);
        let out = run(&scene, &RasterConfig::default())[0];

        assert_eq!(out.rgb, [0.1, 0.2, 0.3]);
        assert_eq!(out.clamped, [false; 3]);
        assert_eq!(out.transmat, reference.transmat);
        assert_eq!(out.radius, reference.radius);
    }

    #[test]
    fn each_primitive_gets_its_own_slot() {
        let mut scene = SplatScene::new(0);
        for z in [3.0, -1.0, 5.0] {
            scene.push(
                Vec3::new(0.0, 0.0, z),
                [0.2, 0.2],
                [1.0, 0.0, 0.0, 0.0],
                0.5,
                &[[0.0; 3]],
            );
        }
        let out = run(&scene, &RasterConfig::default());
        assert_eq!(out.len(), 3);
        assert!(out[0].is_visible());
        assert!(!out[1].is_visible());
        assert!(out[2].is_visible());
        assert_abs_diff_eq!(out[2].depth, 5.0, epsilon = 1e-6);
    }
}
