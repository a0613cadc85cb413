pub mod halfblock;
pub mod pipeline;
pub mod rasterizer;

use crossterm::style::Color;

use crate::camera::Camera;
use crate::config::{RasterConfig, NUM_CHANNELS};
use crate::error::RenderError;
use crate::math::clamp_u8;
use crate::sort::{bin_splats, TileBinning};
use crate::splat::{ProjectedSplat, SplatScene};

use self::rasterizer::{PixelAccumulator, RasterInput};

pub fn rgb_to_ansi256(r: u8, g: u8, b: u8) -> u8 {
    if r == g && g == b {
        if r < 8 {
            return 16;
        }
        if r > 248 {
            return 231;
        }
        return 232 + ((r as f32 - 8.0) / 247.0 * 24.0) as u8;
    }
    let ri = (r as f32 / 255.0 * 5.0 + 0.5) as u8;
    let gi = (g as f32 / 255.0 * 5.0 + 0.5) as u8;
    let bi = (b as f32 / 255.0 * 5.0 + 0.5) as u8;
    16 + 36 * ri + 6 * gi + bi
}

pub fn make_color(r: u8, g: u8, b: u8, use_truecolor: bool) -> Color {
    if use_truecolor {
        Color::Rgb { r, g, b }
    } else {
        Color::AnsiValue(rgb_to_ansi256(r, g, b))
    }
}

// --- Frame buffers ---

/// Per-pixel outputs of one frame, row-major, `width * height` entries per plane.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffers {
    pub width: u32,
    pub height: u32,
    /// Composited color, already blended with the background.
    pub color: Vec<[f32; NUM_CHANNELS]>,
    /// Transmittance left after the last blended sample.
    pub final_t: Vec<f32>,
    /// Candidates examined up to and including the last contributor.
    pub n_contrib: Vec<u32>,
    /// Alpha-weighted depth; divide by `alpha` for the expected surface depth.
    pub depth: Vec<f32>,
    pub alpha: Vec<f32>,
    pub normal: Vec<[f32; 3]>,
    /// Stays zero unless the distortion regularizer is enabled.
    pub distortion: Vec<f32>,
}

impl FrameBuffers {
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            color: vec![[0.0; NUM_CHANNELS]; len],
            final_t: vec![1.0; len],
            n_contrib: vec![0; len],
            depth: vec![0.0; len],
            alpha: vec![0.0; len],
            normal: vec![[0.0; 3]; len],
            distortion: vec![0.0; len],
        }
    }

    pub fn pixel_index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Splits every plane into matching bands of `rows` image rows.
    pub fn bands_mut(&mut self, rows: usize) -> Vec<FrameBand<'_>> {
        let chunk = (rows * self.width as usize).max(1);
        let color = self.color.chunks_mut(chunk);
        let final_t = self.final_t.chunks_mut(chunk);
        let n_contrib = self.n_contrib.chunks_mut(chunk);
        let depth = self.depth.chunks_mut(chunk);
        let alpha = self.alpha.chunks_mut(chunk);
        let normal = self.normal.chunks_mut(chunk);
        let distortion = self.distortion.chunks_mut(chunk);

        color
            .zip(final_t)
            .zip(n_contrib)
            .zip(depth)
            .zip(alpha)
            .zip(normal)
            .zip(distortion)
            .map(
                |((((((color, final_t), n_contrib), depth), alpha), normal), distortion)| {
                    FrameBand {
                        color,
                        final_t,
                        n_contrib,
                        depth,
                        alpha,
                        normal,
                        distortion,
                    }
                },
            )
            .collect()
    }

    /// Color plane as packed 8-bit RGB.
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.color.len() * 3);
        for px in &self.color {
            out.extend([
                clamp_u8(px[0] * 255.0),
                clamp_u8(px[1] * 255.0),
                clamp_u8(px[2] * 255.0),
            ]);
        }
        out
    }

    pub fn to_rgb_pixels(&self) -> Vec<[u8; 3]> {
        self.color
            .iter()
            .map(|px| {
                [
                    clamp_u8(px[0] * 255.0),
                    clamp_u8(px[1] * 255.0),
                    clamp_u8(px[2] * 255.0),
                ]
            })
            .collect()
    }

    /// Expected depth mapped to 8-bit gray, near is bright. Pixels with almost no coverage
    /// are black.
    pub fn depth_to_gray8(&self) -> Vec<u8> {
        const MIN_COVERAGE: f32 = 1e-3;
        let expected: Vec<Option<f32>> = self
            .depth
            .iter()
            .zip(&self.alpha)
            .map(|(&d, &a)| (a > MIN_COVERAGE).then(|| d / a))
            .collect();

        let (near, far) = expected
            .iter()
            .flatten()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &d| {
                (lo.min(d), hi.max(d))
            });
        let span = (far - near).max(1e-6);

        expected
            .iter()
            .map(|d| match d {
                Some(d) => clamp_u8((1.0 - (d - near) / span) * 235.0 + 20.0),
                None => 0,
            })
            .collect()
    }
}

/// Mutable view over a horizontal band of every output plane.
#[derive(Debug)]
pub struct FrameBand<'a> {
    pub color: &'a mut [[f32; NUM_CHANNELS]],
    pub final_t: &'a mut [f32],
    pub n_contrib: &'a mut [u32],
    pub depth: &'a mut [f32],
    pub alpha: &'a mut [f32],
    pub normal: &'a mut [[f32; 3]],
    pub distortion: &'a mut [f32],
}

impl FrameBand<'_> {
    /// Finalizes one pixel; `idx` is relative to the band.
    pub fn write_pixel(
        &mut self,
        idx: usize,
        acc: &PixelAccumulator,
        background: &[f32; NUM_CHANNELS],
        write_distortion: bool,
    ) {
        let t = acc.transmittance;
        for ch in 0..NUM_CHANNELS {
            self.color[idx][ch] = acc.color[ch] + t * background[ch];
        }
        self.final_t[idx] = t;
        self.n_contrib[idx] = acc.last_contributor;
        self.depth[idx] = acc.depth;
        self.alpha[idx] = 1.0 - t;
        self.normal[idx] = acc.normal.to_array();
        if write_distortion {
            self.distortion[idx] = acc.distortion;
        }
    }
}

// --- Frame driver ---

#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// One slot per scene primitive; culled slots keep `radius == 0`.
    pub projected: Vec<ProjectedSplat>,
    pub binning: TileBinning,
    pub frame: FrameBuffers,
    /// Total (tile, primitive) pairs the rasterizer consumed.
    pub num_rendered: usize,
}

/// Preprocess, bin and rasterize one view of `scene`.
pub fn render_frame(
    scene: &SplatScene,
    camera: &Camera,
    background: [f32; NUM_CHANNELS],
    config: &RasterConfig,
) -> Result<RenderOutput, RenderError> {
    if camera.width == 0 || camera.height == 0 {
        return Err(RenderError::EmptyImage {
            width: camera.width,
            height: camera.height,
        });
    }
    scene.validate()?;

    let grid = camera.tile_grid();
    let projected = pipeline::preprocess_splats(scene, camera, config);
    let binning = bin_splats(&projected, grid);
    log::debug!(
        "preprocessed {} primitives, {} visible, {} tile entries over {}x{} tiles",
        scene.len(),
        projected.iter().filter(|s| s.is_visible()).count(),
        binning.num_rendered(),
        grid.0,
        grid.1
    );

    let mut frame = FrameBuffers::new(camera.width, camera.height);
    let input = RasterInput {
        ranges: &binning.ranges,
        point_list: &binning.point_list,
        projected: &projected,
        background,
        config,
    };
    rasterizer::rasterize_tiles(&input, &mut frame)?;

    let num_rendered = binning.num_rendered();
    Ok(RenderOutput {
        projected,
        binning,
        frame,
        num_rendered,
    })
}
