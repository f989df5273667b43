use mandelzoom_core::{
    AnimationPlan, Complex, Fractal, InterpolatedPlan, Julia, Mandelbrot, Region, RenderConfig,
    ScaleMode, Shape, TranslationMode,
};

/// Evaluate every pixel of a region point by point into a flat Vec.
fn render_grid<F: Fractal>(fractal: &F, region: &Region, shape: Shape) -> Vec<u32> {
    region
        .sample_points(shape.width, shape.height)
        .into_iter()
        .map(|c| fractal.escape_time(c))
        .collect()
}

#[test]
fn headless_mandelbrot_render() {
    let config = RenderConfig::default().with_max_iterations(256);
    let mandelbrot = Mandelbrot::new(&config);
    let region = Region::new(-2.0, 1.0, -1.2, 1.2).unwrap();

    let results = render_grid(&mandelbrot, &region, Shape::square(100));

    assert_eq!(results.len(), 100 * 100);
    let interior = results.iter().filter(|&&t| t == 256).count();
    assert!(interior > 0, "should have some interior points");
    assert!(interior < results.len(), "should have some escaped points");
    assert!(results.iter().all(|&t| t <= 256));
}

#[test]
fn headless_render_is_deterministic() {
    let mandelbrot = Mandelbrot::default();
    let region = Region::DEFAULT;

    let run1 = render_grid(&mandelbrot, &region, Shape::new(60, 80));
    let run2 = render_grid(&mandelbrot, &region, Shape::new(60, 80));

    assert_eq!(run1, run2, "two identical renders must produce identical results");
}

#[test]
fn headless_julia_render() {
    let julia = Julia::default();
    let region = Region::new(-1.5, 1.5, -1.5, 1.5).unwrap();

    let results = render_grid(&julia, &region, Shape::square(100));

    assert_eq!(results.len(), 100 * 100);
    assert!(results.iter().any(|&t| t < julia.max_iterations()));
}

#[test]
fn zoom_animation_frames_stay_valid() {
    let plan = AnimationPlan::Interpolated(InterpolatedPlan::new(
        Region::DEFAULT,
        Region::from_center(Complex::new(-0.743643887, 0.131825904), 1e-4, 1e-4),
        200,
        ScaleMode::Exponential,
        TranslationMode::ScaleDependent,
    ));

    let frames: Vec<_> = plan.materialize(30).unwrap().collect();

    assert_eq!(frames.len(), 30);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.index as usize, i);
        assert!(frame.region.validate().is_ok(), "frame {i} is inverted");
    }
    let widths: Vec<f64> = frames.iter().map(|f| f.region.half_extents().0).collect();
    assert!(
        widths.windows(2).all(|w| w[1] < w[0]),
        "zoom-in must shrink every frame"
    );
}
