//! View-dependent color from real spherical harmonics up to band 3.
//!
//! Coefficients for one primitive are stored contiguously, one RGB triple per basis
//! term, in the usual band order (l = 0, then l = 1 with m = -1, 0, 1, and so on).

use crate::math::Vec3;

pub const SH_C0: f32 = 0.282_094_79;
pub const SH_C1: f32 = 0.488_602_5;
pub const SH_C2: [f32; 5] = [
    1.092_548_4,
    -1.092_548_4,
    0.315_391_57,
    -1.092_548_4,
    0.546_274_2,
];
pub const SH_C3: [f32; 7] = [
    -0.590_043_6,
    2.890_611_4,
    -0.457_045_8,
    0.373_176_34,
    -0.457_045_8,
    1.445_305_7,
    -0.590_043_6,
];

/// Evaluated color plus the per-channel record of clamping at zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShColor {
    pub rgb: [f32; 3],
    pub clamped: [bool; 3],
}

/// Evaluates primitive `idx` seen from `campos`.
///
/// `shs` holds `max_coeffs` triples per primitive; only the first `(deg + 1)^2` are read.
/// The camera must not coincide with the primitive center.
pub fn compute_color_from_sh(
    idx: usize,
    deg: u32,
    max_coeffs: usize,
    means: &[Vec3],
    campos: Vec3,
    shs: &[[f32; 3]],
) -> ShColor {
    let pos = means[idx];
    let dir = (pos - campos).normalize();
    let sh = &shs[idx * max_coeffs..(idx + 1) * max_coeffs];
    let raw = eval_sh(deg, sh, dir);
    finish_color(raw)
}

/// Raw SH sum for a unit direction, without bias or clamping.
pub fn eval_sh(deg: u32, sh: &[[f32; 3]], dir: Vec3) -> Vec3 {
    let c = |i: usize| Vec3::from_array(sh[i]);
    let mut result = c(0) * SH_C0;

    if deg > 0 {
        let (x, y, z) = (dir.x, dir.y, dir.z);
        result = result + c(1) * (-SH_C1 * y) + c(2) * (SH_C1 * z) + c(3) * (-SH_C1 * x);

        if deg > 1 {
            let (xx, yy, zz) = (x * x, y * y, z * z);
            let (xy, yz, xz) = (x * y, y * z, x * z);
            result = result
                + c(4) * (SH_C2[0] * xy)
                + c(5) * (SH_C2[1] * yz)
                + c(6) * (SH_C2[2] * (2.0 * zz - xx - yy))
                + c(7) * (SH_C2[3] * xz)
                + c(8) * (SH_C2[4] * (xx - yy));

            if deg > 2 {
                result = result
                    + c(9) * (SH_C3[0] * y * (3.0 * xx - yy))
                    + c(10) * (SH_C3[1] * xy * z)
                    + c(11) * (SH_C3[2] * y * (4.0 * zz - xx - yy))
                    + c(12) * (SH_C3[3] * z * (2.0 * zz - 3.0 * xx - 3.0 * yy))
                    + c(13) * (SH_C3[4] * x * (4.0 * zz - xx - yy))
                    + c(14) * (SH_C3[5] * z * (xx - yy))
                    + c(15) * (SH_C3[6] * x * (xx - 3.0 * yy));
            }
        }
    }
    result
}

fn finish_color(raw: Vec3) -> ShColor {
    let biased = raw + Vec3::new(0.5, 0.5, 0.5);
    let values = biased.to_array();
    let clamped = values.map(|v| v < 0.0);
    let rgb = values.map(|v| v.max(0.0));
    ShColor { rgb, clamped }
}
