//! Duplicates visible primitives per touched tile and sorts them by (tile, depth).
//!
//! This is the CPU stand-in for the sort step that runs between preprocessing and
//! rasterization. The rasterizer only reads its `point_list` and `ranges`.

use rayon::prelude::*;

use crate::project::tile_rect;
use crate::splat::ProjectedSplat;

/// `[start, end)` into the sorted point list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileRange {
    pub start: u32,
    pub end: u32,
}

impl TileRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct TileBinning {
    /// Primitive ids ordered by tile, then front to back.
    pub point_list: Vec<u32>,
    /// One range per tile, row-major over the tile grid.
    pub ranges: Vec<TileRange>,
}

impl TileBinning {
    pub fn num_rendered(&self) -> usize {
        self.point_list.len()
    }
}

/// Sort key: tile id in the high word, depth bits in the low word.
///
/// Depths are positive past the near plane, so their bit patterns order like the floats.
pub fn tile_depth_key(tile_id: u32, depth: f32) -> u64 {
    (u64::from(tile_id) << 32) | u64::from(depth.to_bits())
}

pub fn bin_splats(projected: &[ProjectedSplat], grid: (u32, u32)) -> TileBinning {
    let num_tiles = (grid.0 * grid.1) as usize;

    let mut keyed: Vec<(u64, u32)> = projected
        .par_iter()
        .enumerate()
        .filter(|(_, splat)| splat.is_visible())
        .flat_map_iter(|(idx, splat)| {
            let rect = tile_rect(splat.point_image, splat.radius, grid);
            let depth = splat.depth;
            rect.tile_ids(grid.0)
                .map(move |tile_id| (tile_depth_key(tile_id, depth), idx as u32))
                .collect::<Vec<_>>()
        })
        .collect();

    // Ties on (tile, depth) fall back to primitive id so output is deterministic.
    keyed.par_sort_unstable();

    let ranges = identify_tile_ranges(&keyed, num_tiles);
    let point_list = keyed.into_iter().map(|(_, idx)| idx).collect();
    TileBinning { point_list, ranges }
}

fn identify_tile_ranges(keyed: &[(u64, u32)], num_tiles: usize) -> Vec<TileRange> {
    let mut ranges = vec![TileRange::default(); num_tiles];
    let mut current: Option<usize> = None;
    for (i, &(key, _)) in keyed.iter().enumerate() {
        let tile = (key >> 32) as usize;
        if current != Some(tile) {
            if let Some(prev) = current {
                ranges[prev].end = i as u32;
            }
            ranges[tile].start = i as u32;
            current = Some(tile);
        }
    }
    if let Some(last) = current {
        ranges[last].end = keyed.len() as u32;
    }
    ranges
}
