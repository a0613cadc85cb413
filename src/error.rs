use thiserror::Error;

/// Rejected frame inputs. Culling never produces one of these.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RenderError {
    #[error("image size {width}x{height} is empty")]
    EmptyImage { width: u32, height: u32 },
    #[error("SH degree {0} exceeds the supported maximum of 3")]
    UnsupportedShDegree(u32),
    #[error("SH stride {stride} is too small for degree {degree} (needs {needed})")]
    ShStrideTooSmall {
        degree: u32,
        stride: usize,
        needed: usize,
    },
    #[error("buffer '{name}' holds {actual} entries, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("tile range table has {actual} entries for a {expected}-tile grid")]
    RangeCountMismatch { expected: usize, actual: usize },
    #[error("tile {tile} range [{start}, {end}) does not fit a point list of {len} entries")]
    RangeOutOfBounds {
        tile: usize,
        start: u32,
        end: u32,
        len: usize,
    },
    #[error("point list entry {index} names primitive {id}, but only {len} were projected")]
    PrimitiveIdOutOfBounds { index: usize, id: u32, len: usize },
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SceneLoadError {
    #[error("failed to read scene file")]
    Io(#[from] std::io::Error),
    #[error("PLY parse error: {0}")]
    Ply(String),
    #[error("SPLAT parse error: {0}")]
    Splat(String),
    #[error("unsupported scene format '{0}' (expected .ply or .splat)")]
    UnsupportedFormat(String),
}
