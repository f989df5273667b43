//! Interactive exploration state: the current view, coloring, and region
//! history, plus the last computed grids.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use mandelzoom_core::animation::{PREVIEW_HALVING_THRESHOLD, PREVIEW_SIDE};
use mandelzoom_core::{Complex, CoreError, Region, RenderConfig, Shape, Strategy};
use mandelzoom_render::{
    colormap_index, colormap_names, compute_cancellable, ColoringPipeline, ColoringResolveError,
    Colormap, DisplayGrid, DivergenceGrid, ExportMetadata, ImageWriter, PngImageWriter,
    RenderCancel,
};

use crate::error::{AppError, Result};
use crate::preferences::AppPreferences;

pub struct Session {
    config: RenderConfig,
    region: Region,
    start_config: RenderConfig,
    start_region: Region,
    pipeline: ColoringPipeline,
    colormap: Colormap,
    cycles: f64,
    history: VecDeque<Region>,
    history_depth: usize,
    grid: Option<DivergenceGrid>,
    display: Option<DisplayGrid>,
    cancel: Arc<RenderCancel>,
}

impl Session {
    /// Build a session from preferences.
    ///
    /// An unknown coloring identifier is not fatal; it falls back to identity
    /// and the resolution error is returned alongside the session.
    pub fn from_preferences(prefs: &AppPreferences) -> Result<(Self, Option<ColoringResolveError>)> {
        let config = prefs.render_config()?;
        prefs.region.validate()?;
        if prefs.cycles <= 0.0 || !prefs.cycles.is_finite() {
            return Err(CoreError::InvalidCycles(prefs.cycles).into());
        }
        let (pipeline, resolve_err) = ColoringPipeline::resolve(&prefs.coloring);
        let session = Self {
            config,
            region: prefs.region,
            start_config: config,
            start_region: prefs.region,
            pipeline,
            colormap: Colormap::by_name(&prefs.colormap)?,
            cycles: prefs.cycles,
            history: VecDeque::new(),
            history_depth: prefs.history_depth,
            grid: None,
            display: None,
            cancel: Arc::new(RenderCancel::new()),
        };
        Ok((session, resolve_err))
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn pipeline(&self) -> ColoringPipeline {
        self.pipeline
    }

    pub fn colormap_name(&self) -> &str {
        self.colormap.name()
    }

    pub fn cycles(&self) -> f64 {
        self.cycles
    }

    pub fn grid(&self) -> Option<&DivergenceGrid> {
        self.grid.as_ref()
    }

    pub fn display(&self) -> Option<&DisplayGrid> {
        self.display.as_ref()
    }

    /// Handle another thread can use to cancel an in-flight recompute.
    pub fn cancel_handle(&self) -> Arc<RenderCancel> {
        Arc::clone(&self.cancel)
    }

    // -- Rendering ----------------------------------------------------------

    /// Recompute the grid for the current view, then recolor it.
    pub fn recompute(&mut self) -> Result<&DisplayGrid> {
        let grid = compute_cancellable(&self.config, &self.region, &self.cancel)?;
        info!(
            escaped = grid.escaped_count(),
            pixels = grid.len(),
            "Recomputed view"
        );
        self.grid = Some(grid);
        self.recolor()
    }

    /// Reapply the coloring to the last grid without recomputing it.
    pub fn recolor(&mut self) -> Result<&DisplayGrid> {
        let grid = self.grid.as_ref().ok_or(AppError::NoGrid)?;
        let display = self.pipeline.colorize(grid, self.cycles)?;
        self.display = Some(display);
        self.display.as_ref().ok_or(AppError::NoGrid)
    }

    /// Adopt a grid computed elsewhere (e.g. loaded from disk) and color it.
    pub fn load_grid(&mut self, grid: DivergenceGrid) -> Result<&DisplayGrid> {
        self.config = self
            .config
            .with_shape(Shape::new(grid.height, grid.width))
            .with_max_iterations(grid.max_iterations.max(RenderConfig::MIN_ITERATIONS));
        self.grid = Some(grid);
        self.recolor()
    }

    /// Write the current display grid through the session's colormap.
    ///
    /// Values are scaled to `[vmin, max_iterations / cycles]`.
    pub fn save_image(&self, path: &Path, vmin: f64) -> Result<()> {
        let display = self.display.as_ref().ok_or(AppError::NoGrid)?;
        let vmax = self.config.max_iterations as f64 / self.cycles;
        self.image_writer().save_image(path, display, vmax, vmin)?;
        Ok(())
    }

    /// PNG writer carrying the session's colormap and view metadata.
    pub fn image_writer(&self) -> PngImageWriter {
        PngImageWriter::new(self.colormap.clone()).with_metadata(ExportMetadata {
            region: Some(self.region),
            max_iterations: Some(self.config.max_iterations),
            degree: Some(self.config.degree),
            escape_threshold: Some(self.config.escape_threshold),
            coloring: Some(self.pipeline.kind().identifier().to_string()),
            cycles: Some(self.cycles),
            julia_c: None,
        })
    }

    /// Low-cost stand-in for the current view: 100×100, with large
    /// iteration budgets halved.
    pub fn preview_config(&self) -> (RenderConfig, Region) {
        let iterations = if self.config.max_iterations >= PREVIEW_HALVING_THRESHOLD {
            self.config.max_iterations / 2
        } else {
            self.config.max_iterations
        };
        let config = self
            .config
            .with_shape(Shape::square(PREVIEW_SIDE))
            .with_max_iterations(iterations);
        (config, self.region)
    }

    // -- Navigation ---------------------------------------------------------

    /// Zoom to the box spanned by two corners, in any order.
    pub fn select_region(&mut self, a: Complex, b: Complex) -> Result<()> {
        let region = Region::from_corners(a, b)?;
        self.push_region(region);
        Ok(())
    }

    /// Zoom to the box spanned by two pixel corners of the current grid.
    pub fn select_pixels(&mut self, x0: u32, y0: u32, x1: u32, y1: u32) -> Result<()> {
        let Shape { height, width } = self.config.shape;
        let a = self.region.pixel_to_complex(x0, y0, width, height);
        let b = self.region.pixel_to_complex(x1, y1, width, height);
        self.select_region(a, b)
    }

    /// Jump to `region`, remembering the current one.
    pub fn set_region(&mut self, region: Region) -> Result<()> {
        region.validate()?;
        self.push_region(region);
        Ok(())
    }

    fn push_region(&mut self, region: Region) {
        if self.history_depth > 0 {
            if self.history.len() == self.history_depth {
                self.history.pop_front();
            }
            self.history.push_back(self.region);
        }
        debug!(%region, depth = self.history.len(), "Region changed");
        self.region = region;
    }

    /// Return to the previous region. Returns `false` if there is none.
    pub fn back(&mut self) -> bool {
        match self.history.pop_back() {
            Some(previous) => {
                self.region = previous;
                true
            }
            None => false,
        }
    }

    pub fn can_go_back(&self) -> bool {
        !self.history.is_empty()
    }

    /// Restore the starting view and parameters, clearing history.
    pub fn reset(&mut self) {
        self.config = self.start_config;
        self.region = self.start_region;
        self.history.clear();
        self.grid = None;
        self.display = None;
    }

    // -- Parameters ---------------------------------------------------------

    pub fn set_degree(&mut self, degree: u32) -> Result<()> {
        self.set_config(self.config.with_degree(degree))
    }

    pub fn set_max_iterations(&mut self, max_iterations: u32) -> Result<()> {
        self.set_config(self.config.with_max_iterations(max_iterations))
    }

    pub fn set_escape_threshold(&mut self, threshold: f64) -> Result<()> {
        self.set_config(self.config.with_escape_threshold(threshold))
    }

    pub fn set_strategy(&mut self, strategy: Strategy) -> Result<()> {
        self.set_config(self.config.with_strategy(strategy))
    }

    pub fn set_shape(&mut self, shape: Shape) -> Result<()> {
        self.set_config(self.config.with_shape(shape))
    }

    fn set_config(&mut self, config: RenderConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Switch coloring; unknown identifiers fall back to identity.
    pub fn set_coloring(&mut self, identifier: &str) -> Option<ColoringResolveError> {
        let (pipeline, err) = ColoringPipeline::resolve(identifier);
        self.pipeline = pipeline;
        err
    }

    pub fn set_cycles(&mut self, cycles: f64) -> Result<()> {
        if cycles <= 0.0 || !cycles.is_finite() {
            return Err(CoreError::InvalidCycles(cycles).into());
        }
        self.cycles = cycles;
        Ok(())
    }

    pub fn set_colormap(&mut self, name: &str) -> Result<()> {
        self.colormap = Colormap::by_name(name)?;
        Ok(())
    }

    /// Cycle forward through the colormap list.
    pub fn next_colormap(&mut self) -> Result<()> {
        self.step_colormap(1)
    }

    /// Cycle backward through the colormap list.
    pub fn prev_colormap(&mut self) -> Result<()> {
        self.step_colormap(-1)
    }

    fn step_colormap(&mut self, delta: isize) -> Result<()> {
        let names = colormap_names();
        let current = colormap_index(self.colormap.name()).unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(names.len() as isize) as usize;
        self.set_colormap(&names[next])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandelzoom_render::ColoringKind;

    fn small_session() -> Session {
        let prefs = AppPreferences {
            width: 24,
            height: 16,
            max_iterations: 40,
            history_depth: 3,
            ..Default::default()
        };
        let (session, err) = Session::from_preferences(&prefs).unwrap();
        assert!(err.is_none());
        session
    }

    #[test]
    fn recompute_then_recolor() {
        let mut s = small_session();
        assert!(matches!(s.recolor(), Err(AppError::NoGrid)));

        let first = s.recompute().unwrap().clone();
        assert_eq!(first.len(), 24 * 16);

        s.set_coloring("hist");
        let second = s.recolor().unwrap();
        assert_ne!(&first, second);
        assert_eq!(s.pipeline().kind(), ColoringKind::HistogramEqualized);
    }

    #[test]
    fn selection_is_normalized_and_undoable() {
        let mut s = small_session();
        s.select_region(Complex::new(0.5, 0.5), Complex::new(-0.5, -0.25))
            .unwrap();
        assert_eq!(s.region(), Region::new(-0.5, 0.5, -0.25, 0.5).unwrap());
        assert!(s.can_go_back());
        assert!(s.back());
        assert_eq!(s.region(), Region::DEFAULT);
        assert!(!s.back());
    }

    #[test]
    fn history_is_bounded() {
        let mut s = small_session();
        for i in 1..=5 {
            let w = 1.0 / i as f64;
            s.set_region(Region::new(-w, w, -w, w).unwrap()).unwrap();
        }
        let mut steps = 0;
        while s.back() {
            steps += 1;
        }
        assert_eq!(steps, 3);
        // The oldest regions fell off the end.
        assert_eq!(s.region(), Region::new(-0.5, 0.5, -0.5, 0.5).unwrap());
    }

    #[test]
    fn degenerate_selection_is_rejected() {
        let mut s = small_session();
        let p = Complex::new(0.1, 0.1);
        assert!(s.select_region(p, p).is_err());
        assert!(!s.can_go_back());
    }

    #[test]
    fn pixel_selection_maps_through_current_view() {
        let mut s = small_session();
        s.select_pixels(0, 0, 23, 15).unwrap();
        assert_eq!(s.region(), Region::DEFAULT);
    }

    #[test]
    fn reset_restores_start() {
        let mut s = small_session();
        s.set_degree(3).unwrap();
        s.set_region(Region::new(-1.0, 0.0, -0.5, 0.5).unwrap())
            .unwrap();
        s.recompute().unwrap();
        s.reset();
        assert_eq!(s.region(), Region::DEFAULT);
        assert_eq!(s.config().degree, 2);
        assert!(!s.can_go_back());
        assert!(s.grid().is_none());
    }

    #[test]
    fn invalid_parameters_leave_state_untouched() {
        let mut s = small_session();
        s.set_strategy(Strategy::new(false, true, true)).unwrap();
        assert!(s.set_degree(5).is_err());
        assert_eq!(s.config().degree, 2);
        assert!(s.set_max_iterations(1).is_err());
        assert!(s.set_cycles(0.0).is_err());
        assert_eq!(s.cycles(), 1.0);
        assert!(s.set_colormap("nope").is_err());
        assert_eq!(s.colormap_name(), "RdPu_r");
    }

    #[test]
    fn unknown_coloring_falls_back() {
        let mut s = small_session();
        let err = s.set_coloring("rainbow");
        assert!(err.is_some());
        assert_eq!(s.pipeline().kind(), ColoringKind::Identity);
    }

    #[test]
    fn colormap_cycling_wraps() {
        let mut s = small_session();
        let names = colormap_names();
        s.set_colormap(&names[0]).unwrap();
        s.prev_colormap().unwrap();
        assert_eq!(s.colormap_name(), names[names.len() - 1]);
        s.next_colormap().unwrap();
        assert_eq!(s.colormap_name(), names[0]);
    }

    #[test]
    fn preview_halves_large_budgets() {
        let mut s = small_session();
        let (cfg, region) = s.preview_config();
        assert_eq!(cfg.shape, Shape::square(100));
        assert_eq!(cfg.max_iterations, 40);
        assert_eq!(region, s.region());

        s.set_max_iterations(120).unwrap();
        assert_eq!(s.preview_config().0.max_iterations, 60);
    }

    #[test]
    fn load_grid_adopts_shape() {
        let mut s = small_session();
        let grid = DivergenceGrid::new(5, 7, 30);
        s.load_grid(grid).unwrap();
        assert_eq!(s.config().shape, Shape::new(7, 5));
        assert_eq!(s.config().max_iterations, 30);
        assert_eq!(s.display().unwrap().len(), 35);
    }
}
