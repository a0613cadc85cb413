use std::fs;
use std::path::Path;

use crate::error::SceneLoadError;
use crate::math::{quat_normalize, Vec3};
use crate::sh::SH_C0;
use crate::splat::SplatScene;

const RECORD_SIZE: usize = 32;

fn read_vec3_f32(bytes: &[u8]) -> Vec3 {
    let x = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let y = f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let z = f32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    Vec3::new(x, y, z)
}

fn decode_scale_value(v: f32) -> f32 {
    if v > 0.0 {
        v
    } else {
        v.exp().max(1e-4)
    }
}

/// Degree-0 SH coefficient that evaluates back to `c / 255`.
fn rgb_to_dc(c: u8) -> f32 {
    (c as f32 / 255.0 - 0.5) / SH_C0
}

/// Parses packed 32-byte records: position, scale (3 x f32), RGBA8, quantized `[w,x,y,z]`.
/// The first two scale axes become the surfel's in-plane scales.
pub fn parse_splat(data: &[u8]) -> Result<SplatScene, SceneLoadError> {
    if data.len() < RECORD_SIZE {
        return Err(SceneLoadError::Splat("file too small".into()));
    }
    if data.len() % RECORD_SIZE != 0 {
        return Err(SceneLoadError::Splat(format!(
            "size {} is not a multiple of 32 bytes ({} complete records)",
            data.len(),
            data.len() / RECORD_SIZE
        )));
    }

    let mut scene = SplatScene::new(0);
    for chunk in data.chunks_exact(RECORD_SIZE) {
        let position = read_vec3_f32(&chunk[0..12]);
        let scale_raw = read_vec3_f32(&chunk[12..24]);
        let dc = [rgb_to_dc(chunk[24]), rgb_to_dc(chunk[25]), rgb_to_dc(chunk[26])];
        let opacity = chunk[27] as f32 / 255.0;

        let rotation = quat_normalize([
            chunk[28] as f32 / 127.5 - 1.0,
            chunk[29] as f32 / 127.5 - 1.0,
            chunk[30] as f32 / 127.5 - 1.0,
            chunk[31] as f32 / 127.5 - 1.0,
        ]);

        scene.push(
            position,
            [decode_scale_value(scale_raw.x), decode_scale_value(scale_raw.y)],
            rotation,
            opacity,
            &[dc],
        );
    }

    Ok(scene)
}

pub fn load_splat_file(path: &Path) -> Result<SplatScene, SceneLoadError> {
    let data = fs::read(path)?;
    parse_splat(&data)
}
