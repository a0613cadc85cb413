use rayon::prelude::*;

use crate::config::{
    RasterConfig, BATCH_SIZE, FILTER_INV_SQUARE, MAX_ALPHA, MIN_ALPHA, NEAR_PLANE, NUM_CHANNELS,
    TILE_HEIGHT, TILE_WIDTH, TRANSMITTANCE_EPSILON,
};
use crate::error::RenderError;
use crate::math::Vec3;
use crate::sort::TileRange;
use crate::splat::{ProjectedSplat, Transmat};

use super::{FrameBand, FrameBuffers};

// --- Ray-splat intersection ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Squared distance used for the Gaussian falloff.
    pub rho: f32,
    /// Camera-space depth of the sample.
    pub depth: f32,
}

/// Intersects the ray through pixel `pixf` with a surfel.
///
/// Returns `None` when the ray is parallel to the surfel plane. The falloff distance is the
/// smaller of the local-plane distance and the filtered screen-space distance to `center`.
pub fn intersect_splat(pixf: [f32; 2], center: [f32; 2], t: &Transmat) -> Option<RayHit> {
    let k = t.tw * pixf[0] - t.tu;
    let l = t.tw * pixf[1] - t.tv;
    let p = k.cross(l);
    if p.z == 0.0 {
        return None;
    }
    let s = [p.x / p.z, p.y / p.z];
    let rho3d = s[0] * s[0] + s[1] * s[1];

    let d = [center[0] - pixf[0], center[1] - pixf[1]];
    let rho2d = FILTER_INV_SQUARE * (d[0] * d[0] + d[1] * d[1]);

    let hit = if rho3d <= rho2d {
        RayHit {
            rho: rho3d,
            depth: s[0] * t.tw.x + s[1] * t.tw.y + t.tw.z,
        }
    } else {
        RayHit {
            rho: rho2d,
            depth: t.tw.z,
        }
    };
    Some(hit)
}

/// Alpha for a sample, or `None` when it is outside the support or too faint to matter.
pub fn splat_alpha(opacity: f32, rho: f32) -> Option<f32> {
    let power = -0.5 * rho;
    if power > 0.0 {
        return None;
    }
    let alpha = MAX_ALPHA.min(opacity * power.exp());
    if alpha < MIN_ALPHA {
        return None;
    }
    Some(alpha)
}

// --- Per-pixel accumulation ---

/// Front-to-back compositing state for one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelAccumulator {
    pub transmittance: f32,
    pub color: [f32; NUM_CHANNELS],
    pub depth: f32,
    pub normal: Vec3,
    pub distortion: f32,
    /// Candidates examined so far.
    pub contributor: u32,
    /// Value of `contributor` at the last sample that was blended.
    pub last_contributor: u32,
    pub done: bool,
}

impl Default for PixelAccumulator {
    fn default() -> Self {
        Self {
            transmittance: 1.0,
            color: [0.0; NUM_CHANNELS],
            depth: 0.0,
            normal: Vec3::ZERO,
            distortion: 0.0,
            contributor: 0,
            last_contributor: 0,
            done: false,
        }
    }
}

impl PixelAccumulator {
    /// Blends one sample. Marks the pixel done instead when the sample would push
    /// transmittance below the saturation threshold.
    pub fn composite(
        &mut self,
        alpha: f32,
        depth: f32,
        feature: &[f32; NUM_CHANNELS],
        normal: Vec3,
        track_distortion: bool,
    ) {
        let test_t = self.transmittance * (1.0 - alpha);
        if test_t < TRANSMITTANCE_EPSILON {
            self.done = true;
            return;
        }

        let weight = alpha * self.transmittance;
        for (acc, &value) in self.color.iter_mut().zip(feature) {
            *acc += value * weight;
        }
        if track_distortion {
            self.distortion += (depth * (1.0 - self.transmittance) - self.depth) * weight;
        }
        self.depth += depth * weight;
        self.normal += normal * weight;

        self.transmittance = test_t;
        self.last_contributor = self.contributor;
    }

    /// Runs candidate `j` of a fetched batch through intersection, alpha and blending.
    fn process(&mut self, pixf: [f32; 2], batch: &TileBatch, j: usize, track_distortion: bool) {
        self.contributor += 1;

        let Some(hit) = intersect_splat(pixf, batch.xy[j], &batch.transmat[j]) else {
            return;
        };
        if hit.depth < NEAR_PLANE {
            return;
        }
        let Some(alpha) = splat_alpha(batch.opacity[j], hit.rho) else {
            return;
        };
        self.composite(
            alpha,
            hit.depth,
            &batch.rgb[j],
            batch.normal[j],
            track_distortion,
        );
    }
}

// --- Tile-shared batch ---

/// Tile-local staging for one batch of candidates.
///
/// Filled completely before any lane reads it; the fetch and consume phases never overlap.
struct TileBatch {
    len: usize,
    xy: [[f32; 2]; BATCH_SIZE],
    opacity: [f32; BATCH_SIZE],
    transmat: [Transmat; BATCH_SIZE],
    rgb: [[f32; NUM_CHANNELS]; BATCH_SIZE],
    normal: [Vec3; BATCH_SIZE],
}

impl TileBatch {
    fn new() -> Self {
        Self {
            len: 0,
            xy: [[0.0; 2]; BATCH_SIZE],
            opacity: [0.0; BATCH_SIZE],
            transmat: [Transmat::default(); BATCH_SIZE],
            rgb: [[0.0; NUM_CHANNELS]; BATCH_SIZE],
            normal: [Vec3::ZERO; BATCH_SIZE],
        }
    }

    /// Each lane loads the candidate at `batch_start + lane`, done lanes included.
    fn fetch(
        &mut self,
        batch_start: usize,
        range_end: usize,
        point_list: &[u32],
        projected: &[ProjectedSplat],
    ) {
        self.len = range_end.saturating_sub(batch_start).min(BATCH_SIZE);
        for lane in 0..self.len {
            let coll_id = point_list[batch_start + lane];
            let splat = &projected[coll_id as usize];
            self.xy[lane] = splat.point_image;
            self.opacity[lane] = splat.opacity();
            self.transmat[lane] = splat.transmat;
            self.rgb[lane] = splat.rgb;
            self.normal[lane] = splat.normal;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PixelLane {
    x: u32,
    y: u32,
    inside: bool,
    acc: PixelAccumulator,
}

// --- Rasterizer ---

/// Read-only inputs to the tile pass.
#[derive(Debug, Clone, Copy)]
pub struct RasterInput<'a> {
    pub ranges: &'a [TileRange],
    pub point_list: &'a [u32],
    pub projected: &'a [ProjectedSplat],
    pub background: [f32; NUM_CHANNELS],
    pub config: &'a RasterConfig,
}

/// Composites every tile of `frame`. Tile rows run in parallel; each row owns a disjoint
/// band of every output plane.
pub fn rasterize_tiles(input: &RasterInput<'_>, frame: &mut FrameBuffers) -> Result<(), RenderError> {
    let width = frame.width;
    let height = frame.height;
    if width == 0 || height == 0 {
        return Err(RenderError::EmptyImage { width, height });
    }
    let grid = (width.div_ceil(TILE_WIDTH), height.div_ceil(TILE_HEIGHT));
    let num_tiles = (grid.0 * grid.1) as usize;
    if input.ranges.len() != num_tiles {
        return Err(RenderError::RangeCountMismatch {
            expected: num_tiles,
            actual: input.ranges.len(),
        });
    }
    check_sorted_inputs(input)?;

    frame
        .bands_mut(TILE_HEIGHT as usize)
        .into_par_iter()
        .enumerate()
        .for_each(|(tile_y, mut band)| {
            let mut batch = TileBatch::new();
            for tile_x in 0..grid.0 {
                let tile_id = tile_y as u32 * grid.0 + tile_x;
                rasterize_tile(
                    (tile_x, tile_y as u32),
                    input.ranges[tile_id as usize],
                    input,
                    (width, height),
                    &mut batch,
                    &mut band,
                );
            }
        });
    Ok(())
}

/// Rejects ranges outside the point list and ids outside the projected arena.
fn check_sorted_inputs(input: &RasterInput<'_>) -> Result<(), RenderError> {
    let len = input.point_list.len();
    for (tile, range) in input.ranges.iter().enumerate() {
        if range.start > range.end || range.end as usize > len {
            return Err(RenderError::RangeOutOfBounds {
                tile,
                start: range.start,
                end: range.end,
                len,
            });
        }
    }
    if let Some((index, &id)) = input
        .point_list
        .iter()
        .enumerate()
        .find(|(_, &id)| id as usize >= input.projected.len())
    {
        return Err(RenderError::PrimitiveIdOutOfBounds {
            index,
            id,
            len: input.projected.len(),
        });
    }
    Ok(())
}

fn rasterize_tile(
    tile: (u32, u32),
    range: TileRange,
    input: &RasterInput<'_>,
    (width, height): (u32, u32),
    batch: &mut TileBatch,
    band: &mut FrameBand<'_>,
) {
    let pix_min = (tile.0 * TILE_WIDTH, tile.1 * TILE_HEIGHT);
    let mut lanes = [PixelLane::default(); BATCH_SIZE];
    for (i, lane) in lanes.iter_mut().enumerate() {
        lane.x = pix_min.0 + i as u32 % TILE_WIDTH;
        lane.y = pix_min.1 + i as u32 / TILE_WIDTH;
        lane.inside = lane.x < width && lane.y < height;
        lane.acc.done = !lane.inside;
    }

    let track_distortion = input.config.distortion_regularizer;
    let start = range.start as usize;
    let end = range.end as usize;
    let rounds = range.len().div_ceil(BATCH_SIZE);

    for round in 0..rounds {
        if lanes.iter().all(|lane| lane.acc.done) {
            break;
        }

        batch.fetch(start + round * BATCH_SIZE, end, input.point_list, input.projected);

        for lane in lanes.iter_mut().filter(|lane| !lane.acc.done) {
            let pixf = [lane.x as f32, lane.y as f32];
            for j in 0..batch.len {
                if lane.acc.done {
                    break;
                }
                lane.acc.process(pixf, batch, j, track_distortion);
            }
        }
    }

    for lane in lanes.iter().filter(|lane| lane.inside) {
        let idx = ((lane.y - pix_min.1) * width + lane.x) as usize;
        band.write_pixel(idx, &lane.acc, &input.background, track_distortion);
    }
}
