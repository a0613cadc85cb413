pub mod dot_splat;
pub mod ply;

use std::path::Path;

use crate::error::SceneLoadError;
use crate::splat::SplatScene;

/// Loads a `.ply` or `.splat` scene, chosen by file extension.
pub fn load_scene(path: &Path, max_sh_degree: u32) -> Result<SplatScene, SceneLoadError> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "ply" => ply::load_ply_file(path, max_sh_degree),
        "splat" => dot_splat::load_splat_file(path),
        _ => Err(SceneLoadError::UnsupportedFormat(path.display().to_string())),
    }
}
