//! Command-line definitions for the `mandelzoom` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use mandelzoom_core::{Region, Strategy};

#[derive(Debug, Parser)]
#[command(name = "mandelzoom", about = "Escape-time fractal renderer and zoom animator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(Debug, Subcommand)]
pub enum Cmd {
    /// Compute a divergence grid and save it as `.npy`
    Compute {
        #[command(flatten)]
        view: ViewArgs,
        #[command(flatten)]
        coloring: ColoringArgs,
        /// Grid file to write
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also write a colored PNG here
        #[arg(long)]
        png: Option<PathBuf>,
    },
    /// Color a saved `.npy` grid into a PNG
    Colorize {
        #[arg(long)]
        input: PathBuf,
        /// Defaults to the input path with a `.png` extension
        #[arg(long)]
        output: Option<PathBuf>,
        /// Iteration budget of the grid; defaults to its largest value
        #[arg(long)]
        iterations: Option<u32>,
        #[command(flatten)]
        coloring: ColoringArgs,
    },
    /// Render a JSON animation plan to numbered PNG frames
    Animate {
        /// JSON file holding a stepwise or interpolated plan
        #[arg(long)]
        plan: PathBuf,
        #[arg(long)]
        frames: u32,
        /// Frame directory, or the preview image with `--preview`
        #[arg(long)]
        output: Option<PathBuf>,
        /// Render only a small image of the last stepwise frame
        #[arg(long)]
        preview: bool,
        #[command(flatten)]
        view: ViewArgs,
        #[command(flatten)]
        coloring: ColoringArgs,
    },
    /// Render one Julia set per sampled pixel of the view
    Julia {
        /// Sample every N-th pixel along each axis
        #[arg(long)]
        step: Option<u32>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        view: ViewArgs,
        #[command(flatten)]
        coloring: ColoringArgs,
    },
}

/// Kernel and view overrides on top of the saved preferences.
#[derive(Debug, Clone, Default, Args)]
pub struct ViewArgs {
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    /// Square size; `--width`/`--height` take precedence
    #[arg(long)]
    pub resolution: Option<u32>,
    #[arg(long)]
    pub iterations: Option<u32>,
    #[arg(long)]
    pub degree: Option<u32>,
    #[arg(long)]
    pub threshold: Option<f64>,
    /// `x_min,x_max,y_min,y_max`
    #[arg(long, value_parser = parse_region, allow_hyphen_values = true)]
    pub region: Option<Region>,
    /// Use separate real/imaginary arrays instead of complex values
    #[arg(long)]
    pub decomposed: bool,
    /// Update orbit arrays in place
    #[arg(long)]
    pub in_place: bool,
    /// Skip pixels that already escaped
    #[arg(long)]
    pub mask: bool,
}

impl ViewArgs {
    /// The strategy the flags ask for, if any strategy flag was given.
    pub fn strategy(&self) -> Option<Strategy> {
        (self.decomposed || self.in_place || self.mask)
            .then(|| Strategy::new(!self.decomposed, self.in_place, self.mask))
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct ColoringArgs {
    /// none, log, sqrt, or hist
    #[arg(long)]
    pub coloring: Option<String>,
    #[arg(long)]
    pub colormap: Option<String>,
    #[arg(long)]
    pub cycles: Option<f64>,
}

/// Parse `x_min,x_max,y_min,y_max` into a validated region.
pub fn parse_region(raw: &str) -> Result<Region, String> {
    let bounds: Vec<f64> = raw
        .split(',')
        .map(|s| s.trim().parse::<f64>().map_err(|e| format!("'{s}': {e}")))
        .collect::<Result<_, _>>()?;
    match bounds.as_slice() {
        [x0, x1, y0, y1] => Region::new(*x0, *x1, *y0, *y1).map_err(|e| e.to_string()),
        _ => Err(format!("expected 4 comma-separated bounds, got {}", bounds.len())),
    }
}
