use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser;

use murale_core::{
    decode_tex_file, package_in_folder, prepare_package, HeadlessBackend, NullSoundPlayer,
    NullTextRasterizer, PlayerConfig, ScalingMode, Vec2,
};

#[cfg(feature = "gpu")]
mod gl_backend;
#[cfg(feature = "gpu")]
mod window;

/// Plays back a packaged wallpaper scene.
#[derive(Parser, Debug)]
#[command(name = "murale", version)]
#[command(after_help = "Examples:\n  murale ./my_wallpaper\n  murale --pkg ./scene.pkg --debug\n  murale decode materials/sky.tex\n  murale ./my_wallpaper --snapshot out.png --at 2.5")]
struct Cli {
    /// Wallpaper folder containing scene.pkg, or `decode <file.tex>`.
    args: Vec<PathBuf>,

    /// Path to the scene.pkg file.
    #[arg(long)]
    pkg: Option<PathBuf>,

    /// Decode a single .tex to PNG (with --tex).
    #[arg(long)]
    decode: bool,

    /// The .tex file to decode (used with --decode).
    #[arg(long)]
    tex: Option<PathBuf>,

    /// Custom path for the upstream assets directory.
    #[arg(long = "assets-dir")]
    assets_dir: Option<PathBuf>,

    /// Scaling mode: fit or cover.
    #[arg(long, default_value = "fit")]
    scaling: String,

    /// Verbose debug logging plus the debug overlay.
    #[arg(long)]
    debug: bool,

    /// Debug overlay only.
    #[arg(long = "debug-ui")]
    debug_ui: bool,

    /// Mute all audio output.
    #[arg(long)]
    silent: bool,

    /// Info-level logging.
    #[arg(long)]
    info: bool,

    /// Keep the RGBA decoder's color channels instead of the opacity remap.
    #[arg(long = "no-alpha-remap")]
    no_alpha_remap: bool,

    /// Disable the legacy shader source patches (mask flip, waterripple).
    #[arg(long = "no-shader-fixups")]
    no_shader_fixups: bool,

    /// Render a single frame headlessly to this PNG instead of opening a
    /// window.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Scene time in seconds for --snapshot.
    #[arg(long = "at", default_value_t = 0.0)]
    at: f64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.debug {
        log::LevelFilter::Debug
    } else if cli.info {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    // `decode <file>` subcommand form.
    if cli.args.first().map(|a| a.as_os_str()) == Some("decode".as_ref()) {
        let tex = cli
            .args
            .get(1)
            .context("usage: murale decode <file.tex>")?;
        return cmd_decode(tex);
    }
    // `--decode --tex <file>` flag form.
    if cli.decode {
        let tex = cli.tex.as_ref().context("--decode requires --tex <file>")?;
        return cmd_decode(tex);
    }

    let config = PlayerConfig {
        assets_dir: cli.assets_dir.clone(),
        scaling: ScalingMode::parse(&cli.scaling),
        silent: cli.silent,
        debug: cli.debug,
        debug_ui: cli.debug || cli.debug_ui,
        decode: murale_core::DecodeOptions {
            rgba_opacity_remap: !cli.no_alpha_remap,
        },
        legacy_shader_fixups: !cli.no_shader_fixups,
        ..Default::default()
    };

    let pkg_path = match (&cli.pkg, cli.args.first()) {
        (Some(pkg), _) => pkg.clone(),
        (None, Some(folder)) => package_in_folder(folder)?,
        (None, None) => anyhow::bail!("no wallpaper folder or --pkg given (see --help)"),
    };

    let root = std::env::current_dir().context("resolve working directory")?;
    prepare_package(&root, &pkg_path)?;

    match &cli.snapshot {
        Some(out) => cmd_snapshot(&config, &root, out, cli.at),
        None => run_window(config, root),
    }
}

fn cmd_decode(tex_path: &Path) -> anyhow::Result<()> {
    let image = decode_tex_file(tex_path, &murale_core::DecodeOptions::default())?;

    let stem = tex_path
        .file_stem()
        .context("texture path has no file name")?
        .to_string_lossy();
    let out_dir = PathBuf::from("test_out");
    std::fs::create_dir_all(&out_dir).context("create test_out")?;
    let out = out_dir.join(format!("{stem}.png"));

    image::save_buffer_with_format(
        &out,
        &image.rgba,
        image.width,
        image.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", out.display()))?;

    println!("wrote {}", out.display());
    Ok(())
}

fn cmd_snapshot(
    config: &PlayerConfig,
    root: &Path,
    out: &Path,
    at: f64,
) -> anyhow::Result<()> {
    let mut backend = HeadlessBackend::new();
    let mut sound = NullSoundPlayer;
    let mut renderer = murale_core::build_renderer(&mut backend, config, root, &mut sound)?;

    let (width, height) = renderer.scene_size();
    renderer.update_viewport(width, height);
    renderer.update_mouse(Vec2::ZERO);
    renderer.update(&mut backend, 1.0 / 60.0, at, &mut NullTextRasterizer);
    renderer.render(&mut backend, at, width, height);

    let (w, h, rgba) = backend
        .frame_pixels()
        .context("no frame produced by the software backend")?;
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create '{}'", parent.display()))?;
        }
    }
    image::save_buffer_with_format(
        out,
        rgba,
        w,
        h,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", out.display()))?;

    println!("wrote {}", out.display());
    Ok(())
}

#[cfg(feature = "gpu")]
fn run_window(config: PlayerConfig, root: PathBuf) -> anyhow::Result<()> {
    window::run(config, root)
}

#[cfg(not(feature = "gpu"))]
fn run_window(_config: PlayerConfig, _root: PathBuf) -> anyhow::Result<()> {
    anyhow::bail!(
        "this build has no window support; rebuild with `--features gpu`, or use --snapshot <out.png> for a headless frame"
    )
}
