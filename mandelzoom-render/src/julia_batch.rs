//! One Julia image per sampled pixel of a Mandelbrot view.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use mandelzoom_core::{Complex, Julia, Region, Shape};

use crate::coloring::{ColoringPipeline, DisplayGrid};
use crate::error::RenderError;
use crate::export::{ImageWriter, VideoEncoder};
use crate::kernel::{compute_julia, RenderCancel};

/// Settings for a Julia-per-point batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JuliaBatchSettings {
    /// Sample every `sample_step`-th pixel along each axis.
    #[serde(default = "default_sample_step")]
    pub sample_step: u32,
    #[serde(default = "default_resolution")]
    pub resolution: Shape,
    #[serde(default = "default_region")]
    pub region: Region,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_escape_radius")]
    pub escape_radius: f64,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_sample_step() -> u32 {
    JuliaBatchSettings::DEFAULT_SAMPLE_STEP
}

fn default_resolution() -> Shape {
    Shape::square(JuliaBatchSettings::DEFAULT_RESOLUTION)
}

fn default_region() -> Region {
    JuliaBatchSettings::DEFAULT_REGION
}

fn default_max_iterations() -> u32 {
    Julia::DEFAULT_MAX_ITERATIONS
}

fn default_escape_radius() -> f64 {
    Julia::DEFAULT_ESCAPE_RADIUS
}

fn default_fps() -> u32 {
    crate::animate::DEFAULT_FPS
}

impl JuliaBatchSettings {
    pub const DEFAULT_SAMPLE_STEP: u32 = 80;
    pub const DEFAULT_RESOLUTION: u32 = 256;
    pub const DEFAULT_REGION: Region = Region {
        x_min: -1.5,
        x_max: 1.5,
        y_min: -1.5,
        y_max: 1.5,
    };
}

impl Default for JuliaBatchSettings {
    fn default() -> Self {
        Self {
            sample_step: default_sample_step(),
            resolution: default_resolution(),
            region: default_region(),
            max_iterations: default_max_iterations(),
            escape_radius: default_escape_radius(),
            fps: default_fps(),
        }
    }
}

/// A sampled pixel of the Mandelbrot view and its Julia constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JuliaSample {
    pub px: u32,
    pub py: u32,
    pub c: Complex,
}

impl JuliaSample {
    /// `julia_px{px}_py{py}_cx{re}_cy{im}.png`, five decimals.
    pub fn file_name(&self) -> String {
        format!(
            "julia_px{}_py{}_cx{:.5}_cy{:.5}.png",
            self.px, self.py, self.c.re, self.c.im
        )
    }
}

/// Sampled pixels in row-major order, with the same pixel mapping the kernel
/// uses.
pub fn sample_points(view: Shape, region: &Region, step: u32) -> crate::Result<Vec<JuliaSample>> {
    if step == 0 {
        return Err(RenderError::InvalidSampleStep);
    }
    let mut samples = Vec::new();
    for py in (0..view.height).step_by(step as usize) {
        for px in (0..view.width).step_by(step as usize) {
            samples.push(JuliaSample {
                px,
                py,
                c: region.pixel_to_complex(px, py, view.width, view.height),
            });
        }
    }
    Ok(samples)
}

#[derive(Debug, Clone, PartialEq)]
pub struct JuliaBatchOutput {
    pub images: Vec<PathBuf>,
    pub video: Option<PathBuf>,
}

/// Render, colorize, and save a Julia set for every sampled pixel of `view`.
///
/// Samples are computed in parallel batches of one per rayon thread, and each
/// batch is written in sample order before the next starts. `cancel`, when
/// given, is checked before every batch and every write. The encoder, when
/// given, runs only if at least two images were produced.
#[allow(clippy::too_many_arguments)]
pub fn render_julia_batch(
    view: Shape,
    region: &Region,
    settings: &JuliaBatchSettings,
    pipeline: &ColoringPipeline,
    cycles: f64,
    writer: &dyn ImageWriter,
    out_dir: &Path,
    encoder: Option<(&dyn VideoEncoder, &Path)>,
    cancel: Option<&RenderCancel>,
) -> crate::Result<JuliaBatchOutput> {
    let start = Instant::now();
    region.validate()?;
    let samples = sample_points(view, region, settings.sample_step)?;
    std::fs::create_dir_all(out_dir)?;
    debug!(
        samples = samples.len(),
        step = settings.sample_step,
        "Starting Julia batch"
    );

    let gen = cancel.map(RenderCancel::generation);
    if let Some(c) = cancel {
        c.reset_progress(samples.len());
    }
    let cancelled = || match (cancel, gen) {
        (Some(c), Some(g)) => c.generation() != g,
        _ => false,
    };

    let render = |s: &JuliaSample| -> crate::Result<DisplayGrid> {
        let grid = compute_julia(
            settings.resolution,
            &settings.region,
            s.c,
            settings.max_iterations,
            settings.escape_radius,
        )?;
        pipeline.colorize(&grid, cycles)
    };

    let vmax = settings.max_iterations as f64 / cycles;
    let batch_size = rayon::current_num_threads().max(1);
    let mut images = Vec::with_capacity(samples.len());

    for batch in samples.chunks(batch_size) {
        if cancelled() {
            debug!(written = images.len(), "Julia batch cancelled");
            return Err(RenderError::Cancelled);
        }
        let rendered: Vec<DisplayGrid> = batch
            .par_iter()
            .map(&render)
            .collect::<crate::Result<_>>()?;

        for (sample, display) in batch.iter().zip(&rendered) {
            if cancelled() {
                debug!(written = images.len(), "Julia batch cancelled");
                return Err(RenderError::Cancelled);
            }
            let path = out_dir.join(sample.file_name());
            let vmin = display.range().map_or(0.0, |(lo, _)| lo);
            writer.save_image(&path, display, vmax, vmin)?;
            debug!(path = %path.display(), "Saved Julia image");
            images.push(path);
            if let Some(c) = cancel {
                c.inc_progress();
            }
        }
    }

    let video = match encoder {
        Some((encoder, output)) if images.len() >= 2 => {
            encoder.encode_video(out_dir, output, settings.fps)?;
            Some(output.to_path_buf())
        }
        _ => None,
    };

    info!(
        elapsed_ms = start.elapsed().as_millis(),
        images = images.len(),
        "Julia batch complete"
    );
    Ok(JuliaBatchOutput { images, video })
}
