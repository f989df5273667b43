use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use mandelzoom_core::orbit::step_native;
use mandelzoom_core::{Complex, DecomposedPower, Fractal, Julia, Region, RenderConfig, Shape};

use crate::divergence_grid::DivergenceGrid;
use crate::error::RenderError;

/// Smallest number of pixels a rayon worker takes per split (one 64×64 tile).
const MIN_PIXELS_PER_TASK: usize = 64 * 64;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Tracks the current render generation for cancellation and progress.
///
/// Incrementing the generation signals in-flight kernel runs to stop at the
/// next pass boundary. Progress is counted in passes.
#[derive(Debug)]
pub struct RenderCancel {
    generation: AtomicU64,
    progress_done: AtomicUsize,
    progress_total: AtomicUsize,
}

impl RenderCancel {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            progress_done: AtomicUsize::new(0),
            progress_total: AtomicUsize::new(0),
        }
    }

    /// Cancel the current render by advancing the generation.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Read the current generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Reset progress for a new run with `total` work units.
    pub fn reset_progress(&self, total: usize) {
        self.progress_total.store(total, Ordering::Relaxed);
        self.progress_done.store(0, Ordering::Relaxed);
    }

    /// Increment completed work units by one.
    pub fn inc_progress(&self) {
        self.progress_done.fetch_add(1, Ordering::Relaxed);
    }

    /// Read the current progress as `(done, total)`.
    pub fn progress(&self) -> (usize, usize) {
        (
            self.progress_done.load(Ordering::Relaxed),
            self.progress_total.load(Ordering::Relaxed),
        )
    }
}

impl Default for RenderCancel {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Orbit storage
// ---------------------------------------------------------------------------

enum Orbits {
    Native(Vec<Complex>),
    Decomposed {
        zx: Vec<f64>,
        zy: Vec<f64>,
        power: DecomposedPower,
    },
}

/// One kernel evaluation, advanced a pass at a time.
///
/// Each pass updates every still-relevant pixel once. A pixel's divergence
/// time is written only on the pass where it first escapes; pixels are
/// partitioned between rayon workers so each cell has exactly one writer.
pub struct KernelRun {
    config: RenderConfig,
    c: Vec<Complex>,
    orbits: Orbits,
    /// `true` until the pixel escapes.
    active: Vec<bool>,
    grid: DivergenceGrid,
    passes_run: u32,
    remaining: usize,
}

impl KernelRun {
    /// Validate inputs and prepare orbit buffers (`z₀ = 0`).
    pub fn new(config: &RenderConfig, region: &Region) -> crate::Result<Self> {
        config.validate()?;
        region.validate()?;

        let Shape { height, width } = config.shape;
        let c = region.sample_points(width, height);
        let len = c.len();
        let orbits = if config.strategy.use_native_complex {
            Orbits::Native(vec![Complex::ZERO; len])
        } else {
            Orbits::Decomposed {
                zx: vec![0.0; len],
                zy: vec![0.0; len],
                power: DecomposedPower::try_from(config.degree)?,
            }
        };

        Ok(Self {
            config: *config,
            c,
            orbits,
            active: vec![true; len],
            grid: DivergenceGrid::new(width, height, config.max_iterations),
            passes_run: 0,
            remaining: len,
        })
    }

    pub fn passes_run(&self) -> u32 {
        self.passes_run
    }

    /// Pixels that have not escaped yet.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Budget exhausted, or every pixel escaped.
    pub fn is_finished(&self) -> bool {
        self.passes_run >= self.config.max_iterations || self.remaining == 0
    }

    /// Divergence times recorded so far.
    pub fn snapshot(&self) -> &DivergenceGrid {
        &self.grid
    }

    pub fn finish(self) -> DivergenceGrid {
        self.grid
    }

    /// Run one pass. Returns `false` once the run is finished.
    pub fn step(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        let pass = self.passes_run;
        let strategy = self.config.strategy;
        let escaped = match &mut self.orbits {
            Orbits::Native(z) => {
                if strategy.mutate_in_place {
                    native_in_place(
                        z,
                        &self.c,
                        &mut self.grid.data,
                        &mut self.active,
                        &self.config,
                        pass,
                    )
                } else {
                    native_reallocating(
                        z,
                        &self.c,
                        &mut self.grid.data,
                        &mut self.active,
                        &self.config,
                        pass,
                    )
                }
            }
            Orbits::Decomposed { zx, zy, power } => {
                if strategy.mutate_in_place {
                    decomposed_in_place(
                        zx,
                        zy,
                        *power,
                        &self.c,
                        &mut self.grid.data,
                        &mut self.active,
                        &self.config,
                        pass,
                    )
                } else {
                    decomposed_reallocating(
                        zx,
                        zy,
                        *power,
                        &self.c,
                        &mut self.grid.data,
                        &mut self.active,
                        &self.config,
                        pass,
                    )
                }
            }
        };
        self.remaining -= escaped;
        self.passes_run += 1;
        !self.is_finished()
    }
}

/// Value an escaped orbit is reset to when it keeps being iterated.
#[inline]
fn clamp_value(config: &RenderConfig) -> Complex {
    Complex::new(config.escape_threshold, 0.0)
}

/// Record the escape for `pass` if this is the first one. Returns 1 if so.
#[inline]
fn record_escape(time: &mut u32, active: &mut bool, pass: u32) -> usize {
    if *active {
        *time = pass;
        *active = false;
        1
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Reference strategy: a fresh orbit buffer per pass.
fn native_reallocating(
    z: &mut Vec<Complex>,
    c: &[Complex],
    times: &mut [u32],
    active: &mut [bool],
    config: &RenderConfig,
    pass: u32,
) -> usize {
    let degree = config.degree;
    let mut next: Vec<Complex> = z
        .par_iter()
        .zip(c.par_iter())
        .with_min_len(MIN_PIXELS_PER_TASK)
        .map(|(&z, &c)| step_native(z, c, degree))
        .collect();

    let threshold_sq = config.escape_threshold_sq();
    let clamp = clamp_value(config);
    let escaped = next
        .par_iter_mut()
        .zip(times.par_iter_mut())
        .zip(active.par_iter_mut())
        .with_min_len(MIN_PIXELS_PER_TASK)
        .map(|((z, time), active)| {
            if z.norm_sq() > threshold_sq {
                *z = clamp;
                record_escape(time, active, pass)
            } else {
                0
            }
        })
        .sum();

    *z = next;
    escaped
}

fn native_in_place(
    z: &mut [Complex],
    c: &[Complex],
    times: &mut [u32],
    active: &mut [bool],
    config: &RenderConfig,
    pass: u32,
) -> usize {
    let degree = config.degree;
    let threshold_sq = config.escape_threshold_sq();
    let clamp = clamp_value(config);
    let masked = config.strategy.is_masked();

    z.par_iter_mut()
        .zip(c.par_iter())
        .zip(times.par_iter_mut())
        .zip(active.par_iter_mut())
        .with_min_len(MIN_PIXELS_PER_TASK)
        .map(|(((z, &c), time), active)| {
            if masked && !*active {
                return 0;
            }
            *z = step_native(*z, c, degree);
            if z.norm_sq() > threshold_sq {
                if !masked {
                    *z = clamp;
                }
                record_escape(time, active, pass)
            } else {
                0
            }
        })
        .sum()
}

/// Split-plane strategy that builds new `Zx`/`Zy` planes every pass.
///
/// The update is applied before the magnitude test, so the recorded pass
/// matches the native strategies exactly.
#[allow(clippy::too_many_arguments)]
fn decomposed_reallocating(
    zx: &mut Vec<f64>,
    zy: &mut Vec<f64>,
    power: DecomposedPower,
    c: &[Complex],
    times: &mut [u32],
    active: &mut [bool],
    config: &RenderConfig,
    pass: u32,
) -> usize {
    let (mut next_x, mut next_y): (Vec<f64>, Vec<f64>) = zx
        .par_iter()
        .zip(zy.par_iter())
        .zip(c.par_iter())
        .with_min_len(MIN_PIXELS_PER_TASK)
        .map(|((&x, &y), c)| power.step(x, y, c.re, c.im))
        .unzip();

    let threshold_sq = config.escape_threshold_sq();
    let clamp = clamp_value(config);
    let escaped = next_x
        .par_iter_mut()
        .zip(next_y.par_iter_mut())
        .zip(times.par_iter_mut())
        .zip(active.par_iter_mut())
        .with_min_len(MIN_PIXELS_PER_TASK)
        .map(|(((x, y), time), active)| {
            if *x * *x + *y * *y > threshold_sq {
                *x = clamp.re;
                *y = clamp.im;
                record_escape(time, active, pass)
            } else {
                0
            }
        })
        .sum();

    *zx = next_x;
    *zy = next_y;
    escaped
}

#[allow(clippy::too_many_arguments)]
fn decomposed_in_place(
    zx: &mut [f64],
    zy: &mut [f64],
    power: DecomposedPower,
    c: &[Complex],
    times: &mut [u32],
    active: &mut [bool],
    config: &RenderConfig,
    pass: u32,
) -> usize {
    let threshold_sq = config.escape_threshold_sq();
    let clamp = clamp_value(config);
    let masked = config.strategy.is_masked();

    zx.par_iter_mut()
        .zip(zy.par_iter_mut())
        .zip(c.par_iter())
        .zip(times.par_iter_mut())
        .zip(active.par_iter_mut())
        .with_min_len(MIN_PIXELS_PER_TASK)
        .map(|((((x, y), c), time), active)| {
            if masked && !*active {
                return 0;
            }
            let (nx, ny) = power.step(*x, *y, c.re, c.im);
            if nx * nx + ny * ny > threshold_sq {
                if masked {
                    *x = nx;
                    *y = ny;
                } else {
                    *x = clamp.re;
                    *y = clamp.im;
                }
                record_escape(time, active, pass)
            } else {
                *x = nx;
                *y = ny;
                0
            }
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Compute the divergence-time grid of `region` under `config`.
///
/// Fails fast with a configuration error on an invalid shape, budget,
/// threshold, region, or a degree the chosen strategy cannot express.
pub fn compute(config: &RenderConfig, region: &Region) -> crate::Result<DivergenceGrid> {
    let start = Instant::now();
    let mut run = KernelRun::new(config, region)?;
    debug!(
        width = config.shape.width,
        height = config.shape.height,
        degree = config.degree,
        strategy = config.strategy.label(),
        "Starting kernel run"
    );

    while run.step() {}

    info!(
        elapsed_ms = start.elapsed().as_millis(),
        passes = run.passes_run(),
        remaining = run.remaining(),
        "Kernel run complete"
    );
    Ok(run.finish())
}

/// Like [`compute`], but checks `cancel` between passes.
///
/// A cancelled run returns [`RenderError::Cancelled`]; no partial grid
/// escapes.
pub fn compute_cancellable(
    config: &RenderConfig,
    region: &Region,
    cancel: &RenderCancel,
) -> crate::Result<DivergenceGrid> {
    let gen = cancel.generation();
    let mut run = KernelRun::new(config, region)?;
    cancel.reset_progress(config.max_iterations as usize);

    loop {
        if cancel.generation() != gen {
            debug!(passes = run.passes_run(), "Kernel run cancelled");
            return Err(RenderError::Cancelled);
        }
        let more = run.step();
        cancel.inc_progress();
        if !more {
            break;
        }
    }
    Ok(run.finish())
}

/// Evaluate `fractal` point by point over `region`, rows in parallel.
pub fn compute_points<F: Fractal + Sync>(
    fractal: &F,
    region: &Region,
    shape: Shape,
) -> crate::Result<DivergenceGrid> {
    if shape.width == 0 || shape.height == 0 {
        return Err(mandelzoom_core::CoreError::InvalidShape {
            height: shape.height,
            width: shape.width,
        }
        .into());
    }
    region.validate()?;

    let mut grid = DivergenceGrid::new(shape.width, shape.height, fractal.max_iterations());
    let width = shape.width;
    grid.data
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(py, row)| {
            for (px, cell) in row.iter_mut().enumerate() {
                let point = region.pixel_to_complex(px as u32, py as u32, width, shape.height);
                *cell = fractal.escape_time(point);
            }
        });
    Ok(grid)
}

/// Julia set for constant `c` over `region`.
pub fn compute_julia(
    shape: Shape,
    region: &Region,
    c: Complex,
    max_iterations: u32,
    escape_radius: f64,
) -> crate::Result<DivergenceGrid> {
    let julia = Julia::new(c, max_iterations, escape_radius)?;
    compute_points(&julia, region, shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandelzoom_core::{CoreError, Mandelbrot, Strategy};
    use std::sync::Arc;

    fn config(shape: Shape, max_iterations: u32, strategy: Strategy) -> RenderConfig {
        RenderConfig::new(shape, max_iterations, 2, 2.0, strategy).unwrap()
    }

    fn view() -> Region {
        Region::new(-2.0, 1.0, -1.0, 1.0).unwrap()
    }

    #[test]
    fn three_by_three_center_and_corner() {
        let cfg = config(Shape::square(3), 10, Strategy::new(true, false, false));
        let grid = compute(&cfg, &Region::DEFAULT).unwrap();
        assert_eq!(grid.get(1, 1), 10, "c = 0 never escapes");
        assert!(grid.get(0, 0) < 10, "c = -2-2i escapes early");
        assert_eq!(grid.get(0, 0), 0);
    }

    #[test]
    fn every_strategy_matches_reference() {
        let shape = Shape::new(40, 60);
        let reference = compute(&config(shape, 80, Strategy::REFERENCE), &view()).unwrap();
        for strategy in Strategy::all() {
            let grid = compute(&config(shape, 80, strategy), &view()).unwrap();
            assert_eq!(grid, reference, "{} diverges from reference", strategy.label());
        }
    }

    #[test]
    fn reference_matches_point_oracle() {
        let cfg = config(Shape::new(25, 35), 60, Strategy::REFERENCE);
        let grid = compute(&cfg, &view()).unwrap();
        let oracle = compute_points(&Mandelbrot::new(&cfg), &view(), cfg.shape).unwrap();
        assert_eq!(grid, oracle);
    }

    #[test]
    fn decomposed_variants_agree_at_higher_degrees() {
        let shape = Shape::new(30, 30);
        for degree in 3..=4 {
            let grids: Vec<_> = [(false, false), (true, false), (true, true)]
                .iter()
                .map(|&(in_place, mask)| {
                    let cfg = RenderConfig::new(
                        shape,
                        50,
                        degree,
                        2.0,
                        Strategy::new(false, in_place, mask),
                    )
                    .unwrap();
                    compute(&cfg, &Region::DEFAULT).unwrap()
                })
                .collect();
            assert_eq!(grids[0], grids[1], "degree {degree}");
            assert_eq!(grids[0], grids[2], "degree {degree}");

            let native = compute(
                &RenderConfig::new(shape, 50, degree, 2.0, Strategy::REFERENCE).unwrap(),
                &Region::DEFAULT,
            )
            .unwrap();
            let differing = native
                .data
                .iter()
                .zip(&grids[0].data)
                .filter(|(a, b)| a != b)
                .count();
            assert!(differing <= shape.pixel_count() / 100, "degree {degree}: {differing} differ");
        }
    }

    #[test]
    fn divergence_times_are_write_once() {
        for strategy in Strategy::all() {
            let cfg = config(Shape::new(20, 30), 40, strategy);
            let mut run = KernelRun::new(&cfg, &view()).unwrap();
            let mut previous = run.snapshot().clone();
            while run.step() {
                let current = run.snapshot();
                for (before, after) in previous.data.iter().zip(&current.data) {
                    if *before < cfg.max_iterations {
                        assert_eq!(before, after, "{} rewrote a time", strategy.label());
                    }
                    assert!(*after <= cfg.max_iterations);
                    assert!(*after == cfg.max_iterations || *after < run.passes_run());
                }
                previous = current.clone();
            }
        }
    }

    #[test]
    fn exits_early_when_everything_escapes() {
        let cfg = config(Shape::square(16), 500, Strategy::new(true, true, true));
        let far = Region::new(5.0, 6.0, 5.0, 6.0).unwrap();
        let mut run = KernelRun::new(&cfg, &far).unwrap();
        while run.step() {}
        assert_eq!(run.passes_run(), 1);
        assert!(run.finish().data.iter().all(|&t| t == 0));
    }

    #[test]
    fn custom_threshold_is_honoured() {
        let strict = compute(
            &RenderConfig::new(Shape::square(21), 30, 2, 1.0, Strategy::REFERENCE).unwrap(),
            &Region::DEFAULT,
        )
        .unwrap();
        let loose = compute(
            &RenderConfig::new(Shape::square(21), 30, 2, 8.0, Strategy::REFERENCE).unwrap(),
            &Region::DEFAULT,
        )
        .unwrap();
        assert!(strict.escaped_count() > loose.escaped_count());
    }

    #[test]
    fn native_supports_high_degree() {
        let cfg = RenderConfig::new(Shape::square(11), 20, 6, 2.0, Strategy::REFERENCE).unwrap();
        let grid = compute(&cfg, &Region::DEFAULT).unwrap();
        assert_eq!(grid.get(5, 5), 20);
    }

    #[test]
    fn invalid_inputs_fail_fast() {
        let mut cfg = RenderConfig::default().with_shape(Shape::square(4));
        cfg.strategy = Strategy::new(false, false, false);
        assert!(matches!(
            compute(&cfg.with_degree(5), &Region::DEFAULT),
            Err(RenderError::Core(CoreError::UnsupportedDegree { degree: 5, .. }))
        ));
        assert!(matches!(
            compute(&cfg.with_shape(Shape::new(0, 4)), &Region::DEFAULT),
            Err(RenderError::Core(CoreError::InvalidShape { .. }))
        ));
        assert!(matches!(
            compute(&cfg.with_max_iterations(1), &Region::DEFAULT),
            Err(RenderError::Core(CoreError::InvalidMaxIterations(1)))
        ));
        let inverted = Region {
            x_min: 1.0,
            x_max: -1.0,
            y_min: -1.0,
            y_max: 1.0,
        };
        assert!(matches!(
            compute(&cfg, &inverted),
            Err(RenderError::Core(CoreError::InvalidRegion { .. }))
        ));
    }

    #[test]
    fn julia_grid_has_escapes_and_interior() {
        let grid = compute_julia(
            Shape::square(64),
            &Region::new(-1.5, 1.5, -1.5, 1.5).unwrap(),
            Complex::new(-0.4, 0.6),
            128,
            4.0,
        )
        .unwrap();
        assert!(grid.escaped_count() > 0);
        assert!(grid.escaped_count() < grid.len());
    }

    #[test]
    fn uncancelled_run_matches_compute() {
        let cfg = config(Shape::new(20, 20), 50, Strategy::REFERENCE);
        let cancel = RenderCancel::new();
        let a = compute_cancellable(&cfg, &view(), &cancel).unwrap();
        let b = compute(&cfg, &view()).unwrap();
        assert_eq!(a, b);
        let (done, total) = cancel.progress();
        assert!(done > 0 && done <= total);
    }

    #[test]
    fn cancellation_stops_run() {
        let cfg = config(Shape::square(512), 50_000, Strategy::new(true, true, true));
        let region = Region::new(-0.8, -0.7, 0.05, 0.15).unwrap();
        let cancel = Arc::new(RenderCancel::new());

        let cancel_clone = Arc::clone(&cancel);
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(5));
            cancel_clone.cancel();
        });

        match compute_cancellable(&cfg, &region, &cancel) {
            Err(RenderError::Cancelled) => {
                let (done, total) = cancel.progress();
                assert!(done < total, "a cancelled run must stop before the budget");
            }
            Ok(grid) => assert_eq!(grid.len(), 512 * 512),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
