use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::terminal;

use surfel_splat::config::MAX_SH_DEGREE;
use surfel_splat::demo::generate_demo_scene;
use surfel_splat::math::Vec3;
use surfel_splat::parser::load_scene;
use surfel_splat::render::halfblock::{detect_truecolor, print_preview};
use surfel_splat::{render_frame, Camera, RasterConfig, SplatScene};

#[derive(Debug, Parser)]
#[command(
    name = "surfel-splat",
    version,
    about = "Render 2D Gaussian surfel scenes on the CPU"
)]
struct Cli {
    /// Path to a .ply or .splat scene file (runs demo if omitted)
    input: Option<PathBuf>,
    #[arg(long, help = "Render the built-in demo scene", conflicts_with = "input")]
    demo: bool,
    #[arg(long, default_value_t = 640, help = "Image width in pixels")]
    width: u32,
    #[arg(long, default_value_t = 480, help = "Image height in pixels")]
    height: u32,
    #[arg(long, default_value_t = 60.0, help = "Vertical field of view in degrees")]
    fov: f32,
    #[arg(
        long,
        help = "Camera distance from the scene center (defaults to fit the scene)"
    )]
    distance: Option<f32>,
    #[arg(
        long,
        value_name = "R,G,B",
        value_delimiter = ',',
        num_args = 3,
        default_values_t = [0.0, 0.0, 0.0],
        help = "Background color, components in [0, 1]"
    )]
    background: Vec<f32>,
    #[arg(long, help = "Size footprints by opacity instead of a fixed 3 sigma")]
    tight_footprint: bool,
    #[arg(long, help = "Accumulate the depth distortion map")]
    distortion: bool,
    #[arg(long, default_value_t = 1.0, help = "Multiplier applied to surfel scales")]
    scale_modifier: f32,
    #[arg(long, default_value_t = MAX_SH_DEGREE, help = "Highest SH degree to load")]
    sh_degree: u32,
    #[arg(long, short, default_value = "render.png", help = "Color output PNG")]
    output: PathBuf,
    #[arg(long, help = "Also write a normalized depth PNG")]
    depth_output: Option<PathBuf>,
    #[arg(long, help = "Print a halfblock preview to the terminal")]
    preview: bool,
    #[arg(long, help = "Flip Y axis")]
    flip_y: bool,
    #[arg(long, default_value_t = 7, help = "Seed for the demo scene")]
    seed: u64,
}

fn load_scene_from_cli(cli: &Cli) -> Result<SplatScene> {
    match cli.input.as_ref() {
        Some(path) if !cli.demo => load_scene(path, cli.sh_degree)
            .with_context(|| format!("failed to load scene '{}'", path.display())),
        _ => Ok(generate_demo_scene(cli.seed, 30_000, 15_000)),
    }
}

fn scene_bounds(scene: &SplatScene) -> (Vec3, f32) {
    if scene.is_empty() {
        return (Vec3::ZERO, 1.0);
    }
    let mut min = Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
    let mut max = Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
    for p in &scene.positions {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        min.z = min.z.min(p.z);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
        max.z = max.z.max(p.z);
    }
    let center = (min + max) * 0.5;
    let radius = ((max - min) * 0.5).length().max(1e-3);
    (center, radius)
}

fn write_png(path: &Path, width: u32, height: u32, color: png::ColorType, data: &[u8]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating '{}'", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(data)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.width == 0 || cli.height == 0 {
        bail!("image size must be non-zero, got {}x{}", cli.width, cli.height);
    }

    let mut scene = load_scene_from_cli(&cli)?;
    if cli.flip_y {
        for p in &mut scene.positions {
            p.y = -p.y;
        }
    }

    let (center, radius) = scene_bounds(&scene);
    let fov_y = cli.fov.to_radians();
    let distance = cli
        .distance
        .unwrap_or_else(|| radius / (fov_y * 0.5).tan().max(1e-3) + radius);
    let eye = center + Vec3::new(0.0, 0.0, distance);
    let camera = Camera::look_at(eye, center, fov_y, cli.width, cli.height);

    let background = [cli.background[0], cli.background[1], cli.background[2]];
    let config = RasterConfig {
        tight_footprint: cli.tight_footprint,
        distortion_regularizer: cli.distortion,
        scale_modifier: cli.scale_modifier,
        ..RasterConfig::default()
    };

    let start = std::time::Instant::now();
    let output = render_frame(&scene, &camera, background, &config).context("render failed")?;
    log::info!(
        "rendered {} primitives ({} tile entries) at {}x{} in {:.1?}",
        scene.len(),
        output.num_rendered,
        cli.width,
        cli.height,
        start.elapsed()
    );

    let frame = &output.frame;
    write_png(
        &cli.output,
        frame.width,
        frame.height,
        png::ColorType::Rgb,
        &frame.to_rgb8(),
    )?;
    if let Some(path) = &cli.depth_output {
        write_png(
            path,
            frame.width,
            frame.height,
            png::ColorType::Grayscale,
            &frame.depth_to_gray8(),
        )?;
    }

    if cli.preview {
        let (cols, _) = terminal::size().unwrap_or((80, 24));
        print_preview(
            &frame.to_rgb_pixels(),
            frame.width as usize,
            frame.height as usize,
            cols.max(1) as usize,
            detect_truecolor(),
            &mut io::stdout().lock(),
        )?;
    }

    Ok(())
}
