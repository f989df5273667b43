//! Long-lived front-end state: preferences plus the batch-job slot every
//! command shares.

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use mandelzoom_core::{AnimationPlan, Shape};
use mandelzoom_render::{
    compute, load_grid, render_julia_batch, save_grid, AnimationOutput, AnimationRunner,
    Colormap, ImageWriter, JuliaBatchOutput, PngImageWriter,
};

use crate::app_dir;
use crate::cli::{ColoringArgs, Cmd, ViewArgs};
use crate::error::{AppError, Result};
use crate::job::{join_job, spawn_job, JobSlot};
use crate::preferences::AppPreferences;
use crate::session::Session;

type JobHandle<T> = JoinHandle<mandelzoom_render::Result<T>>;

pub struct App {
    prefs: AppPreferences,
    jobs: Arc<JobSlot>,
}

impl App {
    pub fn new(prefs: AppPreferences) -> Self {
        Self {
            prefs,
            jobs: Arc::new(JobSlot::new()),
        }
    }

    /// Slot guarding animation and Julia batches; at most one runs at a time.
    pub fn jobs(&self) -> &Arc<JobSlot> {
        &self.jobs
    }

    /// Run one command to completion.
    pub fn run(&self, command: Cmd) -> Result<()> {
        match command {
            Cmd::Compute {
                view,
                coloring,
                output,
                png,
            } => {
                let output =
                    output.unwrap_or_else(|| app_dir::output_directory().join("fractal.npy"));
                self.compute(&view, &coloring, &output, png.as_deref())
            }
            Cmd::Colorize {
                input,
                output,
                iterations,
                coloring,
            } => {
                let output = output.unwrap_or_else(|| input.with_extension("png"));
                self.colorize(&input, &output, iterations, &coloring)
            }
            Cmd::Animate {
                plan,
                frames,
                output,
                preview,
                view,
                coloring,
            } => {
                let plan: AnimationPlan = serde_json::from_str(&std::fs::read_to_string(&plan)?)?;
                if preview {
                    let output = output
                        .unwrap_or_else(|| app_dir::output_directory().join("preview.png"));
                    return self.preview(&plan, frames, &view, &coloring, &output);
                }
                let output = output.unwrap_or_else(app_dir::frames_directory);
                let handle = self.start_animation(&plan, frames, &view, &coloring, &output)?;
                let done = join_job(handle)??;
                info!(frames = done.frames.len(), "Animation written");
                Ok(())
            }
            Cmd::Julia {
                step,
                output,
                view,
                coloring,
            } => {
                let output = output.unwrap_or_else(app_dir::julia_directory);
                let handle = self.start_julia(step, &view, &coloring, &output)?;
                let done = join_job(handle)??;
                info!(images = done.images.len(), "Julia batch written");
                Ok(())
            }
        }
    }

    /// Build a session from preferences with view and coloring flags applied.
    pub fn session(&self, view: &ViewArgs, coloring: &ColoringArgs) -> Result<Session> {
        let (mut session, resolve_err) = Session::from_preferences(&self.prefs)?;
        if let Some(e) = resolve_err {
            warn!("Preferences: {e}");
        }

        let current = session.config().shape;
        let width = view.width.or(view.resolution).unwrap_or(current.width);
        let height = view.height.or(view.resolution).unwrap_or(current.height);
        session.set_shape(Shape::new(height, width))?;

        if let Some(it) = view.iterations {
            session.set_max_iterations(it)?;
        }
        if let Some(t) = view.threshold {
            session.set_escape_threshold(t)?;
        }
        if let Some(strategy) = view.strategy() {
            session.set_strategy(strategy)?;
        }
        if let Some(d) = view.degree {
            session.set_degree(d)?;
        }
        if let Some(region) = view.region {
            session.set_region(region)?;
        }
        if let Some(c) = &coloring.coloring {
            if let Some(e) = session.set_coloring(c) {
                warn!("{e}; using identity coloring");
            }
        }
        if let Some(name) = &coloring.colormap {
            session.set_colormap(name)?;
        }
        if let Some(c) = coloring.cycles {
            session.set_cycles(c)?;
        }
        Ok(session)
    }

    fn compute(
        &self,
        view: &ViewArgs,
        coloring: &ColoringArgs,
        output: &Path,
        png: Option<&Path>,
    ) -> Result<()> {
        let mut session = self.session(view, coloring)?;
        session.recompute()?;

        ensure_parent(output)?;
        if let Some(grid) = session.grid() {
            save_grid(output, grid)?;
            info!("Saved grid to {}", output.display());
        }
        if let Some(png) = png {
            ensure_parent(png)?;
            session.save_image(png, display_min(&session))?;
            info!("Saved image to {}", png.display());
        }
        Ok(())
    }

    fn colorize(
        &self,
        input: &Path,
        output: &Path,
        iterations: Option<u32>,
        coloring: &ColoringArgs,
    ) -> Result<()> {
        let mut session = self.session(&ViewArgs::default(), coloring)?;
        session.load_grid(load_grid(input, iterations)?)?;

        ensure_parent(output)?;
        session.save_image(output, display_min(&session))?;
        info!("Saved image to {}", output.display());
        Ok(())
    }

    fn preview(
        &self,
        plan: &AnimationPlan,
        frame_count: u32,
        view: &ViewArgs,
        coloring: &ColoringArgs,
        output: &Path,
    ) -> Result<()> {
        let AnimationPlan::Stepwise(stepwise) = plan else {
            return Err(AppError::Usage("--preview needs a stepwise plan".to_string()));
        };
        let session = self.session(view, coloring)?;
        let (config, region) = stepwise.preview(frame_count)?;
        let grid = compute(&config, &region)?;
        let display = session.pipeline().colorize(&grid, session.cycles())?;

        ensure_parent(output)?;
        let vmax = config.max_iterations as f64 / session.cycles();
        let vmin = display.range().map_or(0.0, |(lo, _)| lo);
        session
            .image_writer()
            .save_image(output, &display, vmax, vmin)?;
        info!("Saved preview to {}", output.display());
        Ok(())
    }

    /// Start rendering `plan` on the job thread.
    ///
    /// Stepwise plans carry their own kernel config; interpolated plans use
    /// the view flags.
    pub fn start_animation(
        &self,
        plan: &AnimationPlan,
        frame_count: u32,
        view: &ViewArgs,
        coloring: &ColoringArgs,
        out_dir: &Path,
    ) -> Result<JobHandle<AnimationOutput>> {
        let session = self.session(view, coloring)?;
        let base = match plan {
            AnimationPlan::Stepwise(p) => p.config,
            AnimationPlan::Interpolated(_) => *session.config(),
        };
        let frames = plan.materialize(frame_count)?;
        let writer = session.image_writer();
        let pipeline = session.pipeline();
        let cycles = session.cycles();
        let fps = self.prefs.fps;
        let out_dir = out_dir.to_path_buf();

        let handle = spawn_job(&self.jobs, "animation", move || {
            AnimationRunner::new(base, pipeline, cycles, &writer)
                .with_fps(fps)
                .run(frames, &out_dir, None)
        })?;
        Ok(handle)
    }

    /// Start a Julia-per-point batch over the current view on the job thread.
    pub fn start_julia(
        &self,
        step: Option<u32>,
        view: &ViewArgs,
        coloring: &ColoringArgs,
        out_dir: &Path,
    ) -> Result<JobHandle<JuliaBatchOutput>> {
        let session = self.session(view, coloring)?;
        let mut settings = self.prefs.julia;
        if let Some(step) = step {
            settings.sample_step = step;
        }
        let shape = session.config().shape;
        let region = session.region();
        let pipeline = session.pipeline();
        let cycles = session.cycles();
        let writer = PngImageWriter::new(Colormap::by_name(session.colormap_name())?);
        let out_dir = out_dir.to_path_buf();

        let handle = spawn_job(&self.jobs, "julia-batch", move || {
            render_julia_batch(
                shape, &region, &settings, &pipeline, cycles, &writer, &out_dir, None, None,
            )
        })?;
        Ok(handle)
    }
}

fn display_min(session: &Session) -> f64 {
    session
        .display()
        .and_then(|d| d.range())
        .map_or(0.0, |(lo, _)| lo)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
