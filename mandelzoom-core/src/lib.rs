pub mod animation;
pub mod complex;
pub mod config;
pub mod error;
pub mod fractal;
pub mod julia;
pub mod mandelbrot;
pub mod orbit;
pub mod region;

// Re-export primary types for convenience.
pub use animation::{
    AnimationPlan, FrameSequence, FrameSpec, InterpolatedPlan, ScaleMode, StepDeltas,
    StepwisePlan, TranslationMode,
};
pub use complex::Complex;
pub use config::{RenderConfig, Shape, Strategy};
pub use error::CoreError;
pub use fractal::Fractal;
pub use julia::Julia;
pub use mandelbrot::Mandelbrot;
pub use orbit::DecomposedPower;
pub use region::Region;

/// Convenience result type for the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
