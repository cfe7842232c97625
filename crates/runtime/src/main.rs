#![deny(clippy::all, clippy::pedantic)]

mod watcher;

use anyhow::{Context, Result};
use clap::Parser;
use compute::BackendSelection;
use glam::Vec3;
use render::{Camera, FrameBaker, RenderConfig, RenderContext, RotatingBoxScene};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Renders a rotating box with the SDF raymarcher and writes each frame as a PNG.
#[derive(Parser, Debug)]
#[command(name = "raymarch", version)]
struct Args {
    #[arg(long, default_value_t = 800)]
    width: u32,
    #[arg(long, default_value_t = 600)]
    height: u32,
    /// Directory holding the WGSL kernel sources.
    #[arg(long, default_value = "kernels")]
    kernel_dir: PathBuf,
    /// auto, cpu or gpu.
    #[arg(long, default_value_t = BackendSelection::Auto)]
    backend: BackendSelection,
    #[arg(long, default_value_t = 1)]
    frames: u32,
    /// Seconds of scene time between frames.
    #[arg(long, default_value_t = 1.0 / 30.0)]
    frame_step: f32,
    #[arg(long, default_value_t = 16)]
    volume_capacity: usize,
    /// Where the frame PNGs go.
    #[arg(long, default_value = "frames")]
    output: PathBuf,
    /// Rebuild the kernel program when its sources change.
    #[arg(long)]
    watch: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    run(&args)
}

fn run(args: &Args) -> Result<()> {
    let config = RenderConfig {
        resolution: (args.width, args.height),
        kernel_dir: args.kernel_dir.clone(),
        backend: args.backend,
        volume_capacity: args.volume_capacity,
    };
    let context = RenderContext::initialize(config).context("render context setup failed")?;

    let kernel_watcher = if args.watch {
        match watcher::start(&args.kernel_dir) {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::error!("Failed to start kernel watcher: {e:?}");
                None
            }
        }
    } else {
        None
    };

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;

    let box_position = Vec3::new(-2.0, 0.0, 0.0);
    let camera = Camera::looking_at(Vec3::new(0.0, 1.5, -6.0), box_position);
    let mut baker = FrameBaker::new(context, Box::new(RotatingBoxScene::new(box_position)));

    tracing::info!(frames = args.frames, "starting render loop");
    for index in 0..args.frames {
        if kernel_watcher.as_ref().is_some_and(watcher::KernelWatcher::take_changed) {
            match baker.context_mut().reload_program() {
                Ok(()) => tracing::info!("kernel program rebuilt"),
                Err(e) => tracing::error!("kernel rebuild failed, keeping previous program: {e}"),
            }
        }

        let frame = baker.bake_frame(&camera, args.frame_step);
        if let Some(failure) = &frame.failure {
            tracing::warn!(frame = index, "frame failed: {failure}");
        }

        let path = args.output.join(format!("frame_{index:04}.png"));
        frame
            .image
            .save(&path)
            .with_context(|| format!("cannot write {}", path.display()))?;
        tracing::info!(
            frame = index,
            elapsed_ms = frame.elapsed.as_secs_f64() * 1e3,
            path = %path.display(),
            "frame written"
        );
    }

    if let Some(render_time) = baker.last_render_time() {
        tracing::info!("last kernel + readback time: {render_time:?}");
    }
    baker.into_context().shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_render_config() {
        let args = Args::try_parse_from(["raymarch"]).unwrap();
        let defaults = RenderConfig::default();
        assert_eq!((args.width, args.height), defaults.resolution);
        assert_eq!(args.kernel_dir, defaults.kernel_dir);
        assert_eq!(args.backend, defaults.backend);
        assert_eq!(args.volume_capacity, defaults.volume_capacity);
        assert!(!args.watch);
    }

    #[test]
    fn backend_parses_case_insensitively() {
        let args = Args::try_parse_from(["raymarch", "--backend", "GPU", "--frames", "3"]).unwrap();
        assert_eq!(args.backend, BackendSelection::Gpu);
        assert_eq!(args.frames, 3);
        assert!(Args::try_parse_from(["raymarch", "--backend", "tpu"]).is_err());
    }
}
