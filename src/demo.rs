use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

use crate::math::{hsv_to_rgb, quat_normalize, Vec3};
use crate::sh::SH_C0;
use crate::splat::SplatScene;

// --- Demo surfel generators ---

fn random_sphere_point(rng: &mut impl Rng) -> Vec3 {
    let z = rng.random_range(-1.0_f32..1.0_f32);
    let theta = rng.random_range(0.0_f32..TAU);
    let r = (1.0 - z * z).sqrt();
    Vec3::new(r * theta.cos(), z, r * theta.sin())
}

/// Shortest-arc rotation taking local +z onto `normal`.
pub fn quat_from_normal(normal: Vec3) -> [f32; 4] {
    let n = normal.normalize();
    if n.z < -1.0 + 1e-6 {
        return [0.0, 1.0, 0.0, 0.0];
    }
    quat_normalize([1.0 + n.z, -n.y, n.x, 0.0])
}

fn dc_from_rgb(rgb: [f32; 3]) -> [f32; 3] {
    rgb.map(|c| (c - 0.5) / SH_C0)
}

/// Degree-1 coefficients: base color plus a faint random view-dependent sheen.
fn sh_with_sheen(rng: &mut impl Rng, rgb: [f32; 3]) -> [[f32; 3]; 4] {
    let mut sh = [[0.0; 3]; 4];
    sh[0] = dc_from_rgb(rgb);
    for coeff in sh.iter_mut().skip(1) {
        let s = rng.random_range(-0.08_f32..0.08_f32);
        *coeff = [s, s, s];
    }
    sh
}

fn push_torus_knot(scene: &mut SplatScene, rng: &mut impl Rng, count: usize) {
    let p = 2.0;
    let q = 3.0;
    let major = 1.4;
    let minor = 0.38;

    for i in 0..count {
        let t = i as f32 / count.max(1) as f32 * TAU * 2.0;

        // Knot lies in the XZ plane with Y up.
        let ring = Vec3::new((p * t).cos(), 0.0, (p * t).sin()) * major;
        let tube_dir = Vec3::new(
            (q * t).cos() * (p * t).cos(),
            (q * t).sin(),
            (q * t).cos() * (p * t).sin(),
        );
        let base = ring + tube_dir * minor;

        let jitter = Vec3::new(
            rng.random_range(-0.04_f32..0.04_f32),
            rng.random_range(-0.04_f32..0.04_f32),
            rng.random_range(-0.04_f32..0.04_f32),
        );

        let hue = ((q * t).sin() * 0.5 + 0.5) * 360.0;
        let rgb = hsv_to_rgb(hue, 0.80, 0.95);

        let scale = rng.random_range(0.018_f32..0.042_f32);
        scene.push(
            base + jitter,
            [scale, scale * rng.random_range(0.9_f32..1.2_f32)],
            quat_from_normal(tube_dir),
            rng.random_range(0.68_f32..0.95_f32),
            &sh_with_sheen(rng, rgb),
        );
    }
}

fn push_sphere_clusters(scene: &mut SplatScene, rng: &mut impl Rng, count: usize) {
    let centers = [
        Vec3::new(1.8, 0.3, 0.4),
        Vec3::new(-1.6, -0.2, 0.8),
        Vec3::new(0.3, 1.2, -1.6),
        Vec3::new(-0.5, -1.0, -1.4),
    ];

    let palette = [
        [1.0, 0.47, 0.31],
        [0.39, 0.82, 1.0],
        [0.63, 1.0, 0.51],
        [1.0, 0.86, 0.35],
    ];

    for i in 0..count {
        let cluster = i % centers.len();
        let dir = random_sphere_point(rng);
        let radius = rng.random::<f32>().cbrt() * rng.random_range(0.5_f32..1.4_f32);
        let position = centers[cluster] + dir * radius;

        let rgb = palette[cluster].map(|c: f32| (c + rng.random_range(-0.1_f32..0.1_f32)).clamp(0.0, 1.0));

        let scale = rng.random_range(0.02_f32..0.06_f32);
        scene.push(
            position,
            [scale, scale * rng.random_range(0.8_f32..1.3_f32)],
            quat_from_normal(dir),
            rng.random_range(0.60_f32..0.95_f32),
            &sh_with_sheen(rng, rgb),
        );
    }
}

/// Torus knot plus four surfel clusters, reproducible for a given seed.
pub fn generate_demo_scene(seed: u64, knot_count: usize, cluster_count: usize) -> SplatScene {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scene = SplatScene::new(1);
    push_torus_knot(&mut scene, &mut rng, knot_count);
    push_sphere_clusters(&mut scene, &mut rng, cluster_count);
    scene
}
