//! Rasterizer constants and per-frame options.

/// Tile width in pixels.
pub const TILE_WIDTH: u32 = 16;
/// Tile height in pixels.
pub const TILE_HEIGHT: u32 = 16;
/// Lanes per tile, and the capacity of one fetched batch.
pub const BATCH_SIZE: usize = (TILE_WIDTH * TILE_HEIGHT) as usize;

/// Color channels carried through the rasterizer.
pub const NUM_CHANNELS: usize = 3;

pub const MAX_SH_DEGREE: u32 = 3;

/// View-space depth below which primitives and ray intersections are rejected.
pub const NEAR_PLANE: f32 = 0.2;

/// Screen-space low-pass filter radius in pixels (Botsch et al. 2005).
pub const FILTER_SIZE: f32 = std::f32::consts::FRAC_1_SQRT_2;
pub const FILTER_INV_SQUARE: f32 = 1.0 / (FILTER_SIZE * FILTER_SIZE);

pub const MAX_ALPHA: f32 = 0.99;
pub const MIN_ALPHA: f32 = 1.0 / 255.0;
pub const TRANSMITTANCE_EPSILON: f32 = 1e-4;

/// Added to every solved footprint extent.
pub const EXTENT_EPSILON: f32 = 1e-2;
/// Footprint radius in units of the solved extent when the tight policy is off.
pub const SIGMA_CUTOFF: f32 = 3.0;
pub const TIGHT_CUTOFF_FLOOR: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterConfig {
    /// Size footprints from opacity (`sqrt(9 + ln(opacity))`) instead of a fixed 3x multiple.
    pub tight_footprint: bool,
    /// Accumulate and output the depth-distortion regulariser.
    pub distortion_regularizer: bool,
    /// Primitives were culled upstream; a frustum failure is then logged as unexpected.
    pub prefiltered: bool,
    /// Multiplies both in-plane scales before projection.
    pub scale_modifier: f32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            tight_footprint: false,
            distortion_regularizer: false,
            prefiltered: false,
            scale_modifier: 1.0,
        }
    }
}

impl RasterConfig {
    /// Multiple of the solved extent used as the footprint radius for a primitive.
    pub fn footprint_cutoff(&self, opacity: f32) -> f32 {
        if self.tight_footprint {
            (9.0 + opacity.ln()).max(TIGHT_CUTOFF_FLOOR).sqrt()
        } else {
            SIGMA_CUTOFF
        }
    }
}
