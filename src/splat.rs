use crate::config::{MAX_SH_DEGREE, NUM_CHANNELS};
use crate::error::RenderError;
use crate::math::Vec3;

/// Number of SH coefficients per channel for a degree.
pub const fn sh_coeff_count(degree: u32) -> usize {
    ((degree + 1) * (degree + 1)) as usize
}

/// Ray-splat plane basis: rows `Tu`, `Tv`, `Tw` over local `(u, v, 1)`.
///
/// For a pixel `(x, y)` the splat-local intersection satisfies
/// `(x * Tw - Tu) . (u, v, 1) = 0` and `(y * Tw - Tv) . (u, v, 1) = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transmat {
    pub tu: Vec3,
    pub tv: Vec3,
    pub tw: Vec3,
}

impl Transmat {
    pub fn from_floats(v: [f32; 9]) -> Self {
        Self {
            tu: Vec3::new(v[0], v[1], v[2]),
            tv: Vec3::new(v[3], v[4], v[5]),
            tw: Vec3::new(v[6], v[7], v[8]),
        }
    }

    pub fn to_floats(self) -> [f32; 9] {
        [
            self.tu.x, self.tu.y, self.tu.z, self.tv.x, self.tv.y, self.tv.z, self.tw.x,
            self.tw.y, self.tw.z,
        ]
    }
}

/// Scene primitives stored as parallel arrays indexed by primitive id.
///
/// `transmats_precomp` replaces (rotation, scale) and `colors_precomp` replaces the SH
/// block when present.
#[derive(Debug, Clone)]
pub struct SplatScene {
    pub positions: Vec<Vec3>,
    /// In-plane scales; the normal axis is fixed to unit length.
    pub scales: Vec<[f32; 2]>,
    /// `[w, x, y, z]` quaternions.
    pub rotations: Vec<[f32; 4]>,
    pub opacities: Vec<f32>,
    /// `len() * max_coeffs` RGB coefficients.
    pub shs: Vec<[f32; 3]>,
    pub sh_degree: u32,
    /// Coefficients stored per primitive (stride of `shs`).
    pub max_coeffs: usize,
    pub transmats_precomp: Option<Vec<Transmat>>,
    pub colors_precomp: Option<Vec<[f32; NUM_CHANNELS]>>,
}

impl SplatScene {
    pub fn new(sh_degree: u32) -> Self {
        Self {
            positions: Vec::new(),
            scales: Vec::new(),
            rotations: Vec::new(),
            opacities: Vec::new(),
            shs: Vec::new(),
            sh_degree,
            max_coeffs: sh_coeff_count(sh_degree),
            transmats_precomp: None,
            colors_precomp: None,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Appends one primitive. `sh` is truncated or zero-padded to the scene's stride.
    pub fn push(
        &mut self,
        position: Vec3,
        scale: [f32; 2],
        rotation: [f32; 4],
        opacity: f32,
        sh: &[[f32; 3]],
    ) {
        self.positions.push(position);
        self.scales.push(scale);
        self.rotations.push(rotation);
        self.opacities.push(opacity);
        let take = sh.len().min(self.max_coeffs);
        self.shs.extend_from_slice(&sh[..take]);
        self.shs
            .extend(std::iter::repeat([0.0; 3]).take(self.max_coeffs - take));
    }

    pub fn sh_coeffs(&self, idx: usize) -> &[[f32; 3]] {
        let start = idx * self.max_coeffs;
        &self.shs[start..start + self.max_coeffs]
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if self.sh_degree > MAX_SH_DEGREE {
            return Err(RenderError::UnsupportedShDegree(self.sh_degree));
        }
        let p = self.len();
        check_len("opacities", p, self.opacities.len())?;

        match &self.transmats_precomp {
            Some(transmats) => check_len("transmats_precomp", p, transmats.len())?,
            None => {
                check_len("scales", p, self.scales.len())?;
                check_len("rotations", p, self.rotations.len())?;
            }
        }

        match &self.colors_precomp {
            Some(colors) => check_len("colors_precomp", p, colors.len())?,
            None => {
                let needed = sh_coeff_count(self.sh_degree);
                if self.max_coeffs < needed {
                    return Err(RenderError::ShStrideTooSmall {
                        degree: self.sh_degree,
                        stride: self.max_coeffs,
                        needed,
                    });
                }
                check_len("shs", p * self.max_coeffs, self.shs.len())?;
            }
        }
        Ok(())
    }
}

impl Default for SplatScene {
    fn default() -> Self {
        Self::new(0)
    }
}

fn check_len(name: &'static str, expected: usize, actual: usize) -> Result<(), RenderError> {
    if expected != actual {
        return Err(RenderError::LengthMismatch {
            name,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Per-primitive state written once by preprocessing and read by the rasterizer.
/// `Default` is the inactive sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProjectedSplat {
    /// Footprint radius in pixels; 0 means culled.
    pub radius: u32,
    pub point_image: [f32; 2],
    pub depth: f32,
    /// Conic terms are always zero here; slot 3 holds opacity.
    pub conic_opacity: [f32; 4],
    pub rgb: [f32; NUM_CHANNELS],
    /// Channels whose SH result was clamped at zero.
    pub clamped: [bool; 3],
    pub transmat: Transmat,
    /// Camera-space unit normal facing the camera.
    pub normal: Vec3,
    pub tiles_touched: u32,
}

impl ProjectedSplat {
    pub fn is_visible(&self) -> bool {
        self.radius > 0
    }

    pub fn opacity(&self) -> f32 {
        self.conic_opacity[3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coefficient_counts_per_degree() {
        assert_eq!(sh_coeff_count(0), 1);
        assert_eq!(sh_coeff_count(1), 4);
        assert_eq!(sh_coeff_count(2), 9);
        assert_eq!(sh_coeff_count(3), 16);
    }

    #[test]
    fn push_pads_sh_to_stride() {
        let mut scene = SplatScene::new(1);
        scene.push(Vec3::ZERO, [1.0, 1.0], [1.0, 0.0, 0.0, 0.0], 0.5, &[[1.0; 3]]);
        assert_eq!(scene.shs.len(), 4);
        assert_eq!(scene.sh_coeffs(0)[1], [0.0; 3]);
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn validate_reports_mismatched_arrays() {
        let mut scene = SplatScene::new(0);
        scene.push(Vec3::ZERO, [1.0, 1.0], [1.0, 0.0, 0.0, 0.0], 0.5, &[[1.0; 3]]);
        scene.opacities.push(0.3);
        assert_eq!(
            scene.validate(),
            Err(RenderError::LengthMismatch {
                name: "opacities",
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn validate_rejects_degree_above_three() {
        let scene = SplatScene {
            sh_degree: 4,
            ..SplatScene::default()
        };
        assert_eq!(scene.validate(), Err(RenderError::UnsupportedShDegree(4)));
    }

    #[test]
    fn precomputed_colors_bypass_sh_stride_check() {
        let mut scene = SplatScene::new(3);
        scene.max_coeffs = 1;
        scene.positions.push(Vec3::ZERO);
        scene.scales.push([1.0, 1.0]);
        scene.rotations.push([1.0, 0.0, 0.0, 0.0]);
        scene.opacities.push(1.0);
        assert!(matches!(
            scene.validate(),
            Err(RenderError::ShStrideTooSmall { .. })
        ));
        scene.colors_precomp = Some(vec![[0.2, 0.4, 0.6]]);
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn precomputed_transmats_bypass_scale_and_rotation_checks() {
        let mut scene = SplatScene::new(0);
        scene.positions.push(Vec3::new(0.0, 0.0, 4.0));
        scene.opacities.push(0.5);
        scene.shs.push([0.0; 3]);
        assert!(matches!(
            scene.validate(),
            Err(RenderError::LengthMismatch { name: "scales", .. })
        ));
        scene.transmats_precomp = Some(vec![Transmat::default()]);
        assert!(scene.validate().is_ok());

        scene.transmats_precomp = Some(Vec::new());
        assert_eq!(
            scene.validate(),
            Err(RenderError::LengthMismatch {
                name: "transmats_precomp",
                expected: 1,
                actual: 0
            })
        );
    }

    #[test]
    fn default_scene_is_empty_and_valid() {
        let scene = SplatScene::default();
        assert!(scene.is_empty());
        assert_eq!(scene.max_coeffs, 1);
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn transmat_float_layout_is_row_major() {
        let floats = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let t = Transmat::from_floats(floats);
        assert_eq!(t.tv, Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(t.to_floats(), floats);
    }
}
