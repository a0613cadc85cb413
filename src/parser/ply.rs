use std::fs;
use std::path::Path;

use crate::config::MAX_SH_DEGREE;
use crate::error::SceneLoadError;
use crate::math::{quat_normalize, sigmoid, Vec3};
use crate::sh::SH_C0;
use crate::splat::{sh_coeff_count, SplatScene};

type PlyResult<T> = Result<T, SceneLoadError>;

fn ply_err(msg: impl Into<String>) -> SceneLoadError {
    SceneLoadError::Ply(msg.into())
}

#[derive(Debug, Clone, Copy)]
enum PlyType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl PlyType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "char" | "int8" => Some(Self::Char),
            "uchar" | "uint8" => Some(Self::UChar),
            "short" | "int16" => Some(Self::Short),
            "ushort" | "uint16" => Some(Self::UShort),
            "int" | "int32" => Some(Self::Int),
            "uint" | "uint32" => Some(Self::UInt),
            "float" | "float32" => Some(Self::Float),
            "double" | "float64" => Some(Self::Double),
            _ => None,
        }
    }

    fn size(self) -> usize {
        match self {
            Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Double => 8,
        }
    }

    fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    fn read_as_f32(self, bytes: &[u8]) -> f32 {
        match self {
            Self::Char => i8::from_le_bytes([bytes[0]]) as f32,
            Self::UChar => bytes[0] as f32,
            Self::Short => i16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            Self::UShort => u16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            Self::Int => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            Self::UInt => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            Self::Float => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::Double => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&bytes[0..8]);
                f64::from_le_bytes(arr) as f32
            }
        }
    }
}

/// Vertex fields this loader understands.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Position(usize),
    Dc(usize),
    Rest(usize),
    Rgb(usize),
    Opacity,
    Scale(usize),
    Rotation(usize),
    Ignored,
}

impl Field {
    fn from_name(name: &str) -> Self {
        match name {
            "x" => Self::Position(0),
            "y" => Self::Position(1),
            "z" => Self::Position(2),
            "f_dc_0" => Self::Dc(0),
            "f_dc_1" => Self::Dc(1),
            "f_dc_2" => Self::Dc(2),
            "red" | "r" => Self::Rgb(0),
            "green" | "g" => Self::Rgb(1),
            "blue" | "b" => Self::Rgb(2),
            "opacity" => Self::Opacity,
            "scale_0" => Self::Scale(0),
            "scale_1" => Self::Scale(1),
            "rot_0" => Self::Rotation(0),
            "rot_1" => Self::Rotation(1),
            "rot_2" => Self::Rotation(2),
            "rot_3" => Self::Rotation(3),
            other => match other.strip_prefix("f_rest_").map(str::parse::<usize>) {
                Some(Ok(i)) => Self::Rest(i),
                _ => Self::Ignored,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct PlyProperty {
    field: Field,
    ty: PlyType,
}

#[derive(Debug)]
struct PlyHeader {
    vertex_count: usize,
    props: Vec<PlyProperty>,
    /// Byte offset of the first vertex.
    body_start: usize,
}

fn find_ply_header_end(data: &[u8]) -> Option<usize> {
    let marker = b"end_header";
    let pos = data.windows(marker.len()).position(|w| w == marker)?;
    let mut end = pos + marker.len();
    while end < data.len() && data[end] != b'\n' {
        end += 1;
    }
    if end < data.len() {
        end += 1;
    }
    Some(end)
}

fn parse_header(data: &[u8]) -> PlyResult<PlyHeader> {
    let header_end = find_ply_header_end(data).ok_or_else(|| ply_err("missing end_header"))?;
    let header_text = std::str::from_utf8(&data[..header_end])
        .map_err(|_| ply_err("header is not valid UTF-8"))?;

    let mut is_binary_le = false;
    let mut vertex_count: usize = 0;
    let mut in_vertex_element = false;
    let mut props: Vec<PlyProperty> = Vec::new();

    for line in header_text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("comment") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[0] {
            "format" => {
                if parts.len() >= 2 && parts[1] == "binary_little_endian" {
                    is_binary_le = true;
                }
            }
            "element" if parts.len() >= 3 => {
                in_vertex_element = parts[1] == "vertex";
                if in_vertex_element {
                    vertex_count = parts[2]
                        .parse::<usize>()
                        .map_err(|_| ply_err(format!("bad vertex count '{}'", parts[2])))?;
                }
            }
            "property" if in_vertex_element && parts.len() >= 3 => {
                if parts[1] == "list" {
                    return Err(ply_err("list properties in vertex element are unsupported"));
                }
                let ty = PlyType::parse(parts[1])
                    .ok_or_else(|| ply_err(format!("unsupported property type '{}'", parts[1])))?;
                props.push(PlyProperty {
                    field: Field::from_name(parts[2]),
                    ty,
                });
            }
            _ => {}
        }
    }

    if !is_binary_le {
        return Err(ply_err("only binary_little_endian format is supported"));
    }
    if vertex_count == 0 || props.is_empty() {
        return Err(ply_err("missing vertex element or properties"));
    }
    Ok(PlyHeader {
        vertex_count,
        props,
        body_start: header_end,
    })
}

/// Highest SH degree whose higher-order coefficients fit in `rest_count` floats.
fn degree_from_rest_count(rest_count: usize) -> u32 {
    let per_channel = rest_count / 3;
    (0..=MAX_SH_DEGREE)
        .rev()
        .find(|&deg| sh_coeff_count(deg) - 1 <= per_channel)
        .unwrap_or(0)
}

/// Parses a binary little-endian Gaussian-splat PLY.
///
/// Opacity is stored as a logit and scales as logarithms. Higher-order SH coefficients
/// (`f_rest_*`) are channel-major; the degree is inferred from their count and capped at
/// `max_sh_degree`. Files with three scales keep the first two.
pub fn parse_ply(data: &[u8], max_sh_degree: u32) -> PlyResult<SplatScene> {
    let header = parse_header(data)?;

    let stride: usize = header
        .props
        .iter()
        .try_fold(0usize, |acc, prop| acc.checked_add(prop.ty.size()))
        .ok_or_else(|| ply_err("size overflow computing vertex stride"))?;
    let needed = header
        .vertex_count
        .checked_mul(stride)
        .and_then(|bytes| bytes.checked_add(header.body_start))
        .ok_or_else(|| ply_err("size overflow computing buffer size"))?;
    if data.len() < needed {
        return Err(ply_err(format!(
            "file truncated (need {needed} bytes, have {})",
            data.len()
        )));
    }

    let rest_count = header
        .props
        .iter()
        .filter(|p| matches!(p.field, Field::Rest(_)))
        .count();
    let rest_per_channel = rest_count / 3;
    let file_degree = degree_from_rest_count(rest_count);
    let degree = file_degree.min(max_sh_degree.min(MAX_SH_DEGREE));
    let coeffs = sh_coeff_count(degree);

    let mut scene = SplatScene::new(degree);
    let body = &data[header.body_start..needed];
    let mut rest = vec![0.0_f32; rest_count];

    for chunk in body.chunks_exact(stride) {
        let mut position = [0.0_f32; 3];
        let mut dc = [0.0_f32; 3];
        let mut rgb = [0.0_f32; 3];
        let mut have_dc = false;
        let mut have_rgb = false;
        let mut opacity_raw = 4.0_f32;
        let mut scale_raw = [-3.0_f32, -3.0_f32];
        let mut rotation = [1.0_f32, 0.0, 0.0, 0.0];
        rest.fill(0.0);

        let mut cursor = 0usize;
        for prop in &header.props {
            let field_end = cursor + prop.ty.size();
            let value = prop.ty.read_as_f32(&chunk[cursor..field_end]);
            cursor = field_end;

            match prop.field {
                Field::Position(i) => position[i] = value,
                Field::Dc(i) => {
                    dc[i] = value;
                    have_dc = true;
                }
                Field::Rest(i) if i < rest_count => rest[i] = value,
                Field::Rgb(i) => {
                    // Integer colors are 0..255, float colors already 0..1.
                    rgb[i] = if prop.ty.is_float() { value } else { value / 255.0 };
                    have_rgb = true;
                }
                Field::Opacity => opacity_raw = value,
                Field::Scale(i) => scale_raw[i] = value,
                Field::Rotation(i) => rotation[i] = value,
                Field::Rest(_) | Field::Ignored => {}
            }
        }

        let mut sh = vec![[0.0_f32; 3]; coeffs];
        sh[0] = if have_dc {
            dc
        } else if have_rgb {
            rgb.map(|c| (c - 0.5) / SH_C0)
        } else {
            [(220.0 / 255.0 - 0.5) / SH_C0; 3]
        };
        for (j, coeff) in sh.iter_mut().enumerate().skip(1) {
            for (ch, value) in coeff.iter_mut().enumerate() {
                *value = rest[ch * rest_per_channel + j - 1];
            }
        }

        scene.push(
            Vec3::from_array(position),
            scale_raw.map(|s| s.exp().max(1e-4)),
            quat_normalize(rotation),
            sigmoid(opacity_raw).clamp(0.0, 1.0),
            &sh,
        );
    }

    log::debug!(
        "parsed {} PLY vertices, SH degree {} (file has {})",
        scene.len(),
        degree,
        file_degree
    );
    Ok(scene)
}

pub fn load_ply_file(path: &Path, max_sh_degree: u32) -> PlyResult<SplatScene> {
    let data = fs::read(path)?;
    parse_ply(&data, max_sh_degree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn build_ply(props: &[&str], rows: &[Vec<f32>]) -> Vec<u8> {
        let mut header = format!(
            "ply\nformat binary_little_endian 1.0\ncomment test\nelement vertex {}\n",
            rows.len()
        );
        for p in props {
            header.push_str(&format!("property float {p}\n"));
        }
        header.push_str("end_header\n");
        let mut data = header.into_bytes();
        for row in rows {
            for v in row {
                data.extend_from_slice(&v.to_le_bytes());
            }
        }
        data
    }

    const BASE: [&str; 11] = [
        "x", "y", "z", "f_dc_0", "f_dc_1", "f_dc_2", "opacity", "scale_0", "scale_1", "rot_0",
        "rot_1",
    ];

    #[test]
    fn parses_degree_zero_vertex() {
        let mut props = BASE.to_vec();
        props.extend(["rot_2", "rot_3"]);
        let row = vec![1.0, 2.0, 3.0, 0.5, -0.5, 0.0, 0.0, 0.0, (0.5f32).ln(), 2.0, 0.0, 0.0, 0.0];
        let scene = parse_ply(&build_ply(&props, &[row]), 3).expect("valid ply");

        assert_eq!(scene.len(), 1);
        assert_eq!(scene.sh_degree, 0);
        assert_eq!(scene.positions[0], Vec3::new(1.0, 2.0, 3.0));
        assert_abs_diff_eq!(scene.opacities[0], 0.5);
        assert_abs_diff_eq!(scene.scales[0][0], 1.0);
        assert_abs_diff_eq!(scene.scales[0][1], 0.5, epsilon = 1e-6);
        assert_eq!(scene.rotations[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(scene.sh_coeffs(0), &[[0.5, -0.5, 0.0]]);
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn rest_coefficients_are_channel_major() {
        let mut props: Vec<String> = BASE.iter().map(|s| s.to_string()).collect();
        for i in 0..9 {
            props.push(format!("f_rest_{i}"));
        }
        let prop_refs: Vec<&str> = props.iter().map(String::as_str).collect();
        let mut row = vec![0.0; 11];
        row[9] = 1.0;
        row.extend((0..9).map(|i| i as f32));
        let scene = parse_ply(&build_ply(&prop_refs, &[row]), 3).expect("valid ply");

        assert_eq!(scene.sh_degree, 1);
        let sh = scene.sh_coeffs(0);
        assert_eq!(sh.len(), 4);
        // Coefficient 1 takes f_rest_0, f_rest_3, f_rest_6 for r, g, b.
        assert_eq!(sh[1], [0.0, 3.0, 6.0]);
        assert_eq!(sh[3], [2.0, 5.0, 8.0]);
    }

    #[test]
    fn degree_cap_truncates_coefficients() {
        let mut props: Vec<String> = BASE.iter().map(|s| s.to_string()).collect();
        for i in 0..45 {
            props.push(format!("f_rest_{i}"));
        }
        let prop_refs: Vec<&str> = props.iter().map(String::as_str).collect();
        let row = vec![0.0; 11 + 45];
        let full = parse_ply(&build_ply(&prop_refs, &[row.clone()]), 3).expect("valid ply");
        let capped = parse_ply(&build_ply(&prop_refs, &[row]), 1).expect("valid ply");
        assert_eq!(full.sh_degree, 3);
        assert_eq!(full.max_coeffs, 16);
        assert_eq!(capped.sh_degree, 1);
        assert_eq!(capped.max_coeffs, 4);
    }

    #[test]
    fn float_rgb_fallback_is_unit_range() {
        let props = ["x", "y", "z", "red", "green", "blue"];
        let scene = parse_ply(&build_ply(&props, &[vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.5]]), 0)
            .expect("valid ply");
        let dc = scene.sh_coeffs(0)[0];
        assert_abs_diff_eq!(dc[0] * SH_C0 + 0.5, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(dc[1] * SH_C0 + 0.5, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(dc[2], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn uchar_rgb_fallback_is_scaled_from_255() {
        let mut data = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\n\
            property float x\nproperty float y\nproperty float z\n\
            property uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n"
            .to_vec();
        for v in [0.5_f32, -1.0, 2.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&[255, 0, 51]);

        let scene = parse_ply(&data, 0).expect("valid ply");
        assert_eq!(scene.positions[0], Vec3::new(0.5, -1.0, 2.0));
        let dc = scene.sh_coeffs(0)[0];
        assert_abs_diff_eq!(dc[0] * SH_C0 + 0.5, 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(dc[1] * SH_C0 + 0.5, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(dc[2] * SH_C0 + 0.5, 0.2, epsilon = 1e-5);
    }

    #[test]
    fn rejects_ascii_and_truncated_files() {
        let ascii = b"ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nend_header\n0\n";
        assert!(matches!(parse_ply(ascii, 3), Err(SceneLoadError::Ply(_))));

        let mut data = build_ply(&["x", "y", "z"], &[vec![1.0, 2.0, 3.0]]);
        data.truncate(data.len() - 2);
        assert!(matches!(parse_ply(&data, 3), Err(SceneLoadError::Ply(_))));

        assert!(matches!(parse_ply(b"garbage", 3), Err(SceneLoadError::Ply(_))));
    }

    #[test]
    fn degree_inference() {
        assert_eq!(degree_from_rest_count(0), 0);
        assert_eq!(degree_from_rest_count(9), 1);
        assert_eq!(degree_from_rest_count(24), 2);
        assert_eq!(degree_from_rest_count(45), 3);
        assert_eq!(degree_from_rest_count(12), 1);
    }
}
