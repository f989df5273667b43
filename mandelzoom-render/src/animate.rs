//! Render a materialized animation plan to numbered PNG frames.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use mandelzoom_core::{FrameSequence, FrameSpec, RenderConfig};

use crate::coloring::{ColoringPipeline, DisplayGrid};
use crate::error::RenderError;
use crate::export::{frame_path, ImageWriter, VideoEncoder};
use crate::kernel::{compute, RenderCancel};

/// Lower end of the color scale for animation frames.
pub const FRAME_VMIN: f64 = 1.0;

/// Frames per second handed to the video encoder by default.
pub const DEFAULT_FPS: u32 = 10;

/// What a finished animation run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationOutput {
    pub frames: Vec<PathBuf>,
    pub video: Option<PathBuf>,
}

/// Renders frames with a fixed base config, coloring, and image writer.
///
/// Frames are computed in parallel batches but always written in index
/// order.
pub struct AnimationRunner<'a> {
    base: RenderConfig,
    pipeline: ColoringPipeline,
    cycles: f64,
    writer: &'a dyn ImageWriter,
    encoder: Option<(&'a dyn VideoEncoder, PathBuf)>,
    fps: u32,
}

impl<'a> AnimationRunner<'a> {
    pub fn new(
        base: RenderConfig,
        pipeline: ColoringPipeline,
        cycles: f64,
        writer: &'a dyn ImageWriter,
    ) -> Self {
        Self {
            base,
            pipeline,
            cycles,
            writer,
            encoder: None,
            fps: DEFAULT_FPS,
        }
    }

    /// Encode the frames into `output` once they are all written.
    pub fn with_encoder(mut self, encoder: &'a dyn VideoEncoder, output: PathBuf) -> Self {
        self.encoder = Some((encoder, output));
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    fn render_frame(&self, frame: &FrameSpec) -> crate::Result<DisplayGrid> {
        let config = frame.config(&self.base);
        let grid = compute(&config, &frame.region)?;
        self.pipeline.colorize(&grid, self.cycles)
    }

    /// Render every frame of `frames` into `out_dir/<index>.png`.
    pub fn run(
        &self,
        frames: FrameSequence,
        out_dir: &Path,
        cancel: Option<&RenderCancel>,
    ) -> crate::Result<AnimationOutput> {
        if self.cycles <= 0.0 || !self.cycles.is_finite() {
            return Err(mandelzoom_core::CoreError::InvalidCycles(self.cycles).into());
        }
        std::fs::create_dir_all(out_dir)?;

        let start = Instant::now();
        let total = frames.frame_count() as usize;
        let gen = cancel.map(RenderCancel::generation);
        if let Some(c) = cancel {
            c.reset_progress(total);
        }

        let cancelled = || match (cancel, gen) {
            (Some(c), Some(g)) => c.generation() != g,
            _ => false,
        };

        let batch_size = rayon::current_num_threads().max(1);
        let all: Vec<FrameSpec> = frames.collect();
        let mut written = Vec::with_capacity(total);

        for batch in all.chunks(batch_size) {
            if cancelled() {
                debug!(written = written.len(), "Animation cancelled");
                return Err(RenderError::Cancelled);
            }

            let rendered: Vec<DisplayGrid> = batch
                .par_iter()
                .map(|frame| self.render_frame(frame))
                .collect::<crate::Result<_>>()?;

            for (frame, display) in batch.iter().zip(&rendered) {
                if cancelled() {
                    debug!(written = written.len(), "Animation cancelled");
                    return Err(RenderError::Cancelled);
                }
                let path = frame_path(out_dir, frame.index);
                let vmax = frame.max_iterations as f64 / self.cycles;
                self.writer.save_image(&path, display, vmax, FRAME_VMIN)?;
                debug!(index = frame.index, path = %path.display(), "Wrote frame");
                written.push(path);
                if let Some(c) = cancel {
                    c.inc_progress();
                }
            }
        }

        let video = match &self.encoder {
            Some((encoder, output)) if written.len() >= 2 => {
                encoder.encode_video(out_dir, output, self.fps)?;
                Some(output.clone())
            }
            _ => None,
        };

        info!(
            elapsed_ms = start.elapsed().as_millis(),
            frames = written.len(),
            "Animation complete"
        );
        Ok(AnimationOutput {
            frames: written,
            video,
        })
    }
}
