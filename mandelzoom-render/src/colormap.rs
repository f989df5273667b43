use rayon::prelude::*;

use crate::buffer::RenderBuffer;
use crate::coloring::DisplayGrid;
use crate::error::RenderError;

const LUT_SIZE: usize = 256;

/// Suffix that selects the reversed variant of a colormap.
const REVERSED_SUFFIX: &str = "_r";

/// Colormap used when nothing else is configured.
pub const DEFAULT_COLORMAP: &str = "RdPu_r";

type Stops = &'static [[u8; 3]];

/// Evenly spaced gradient stops, light to dark where that applies.
const BASE_COLORMAPS: &[(&str, Stops)] = &[
    (
        "Blues",
        &[
            [247, 251, 255],
            [222, 235, 247],
            [198, 219, 239],
            [158, 202, 225],
            [107, 174, 214],
            [66, 146, 198],
            [33, 113, 181],
            [8, 81, 156],
            [8, 48, 107],
        ],
    ),
    (
        "RdPu",
        &[
            [255, 247, 243],
            [253, 224, 221],
            [252, 197, 192],
            [250, 159, 181],
            [247, 104, 161],
            [221, 52, 151],
            [174, 1, 126],
            [122, 1, 119],
            [73, 0, 106],
        ],
    ),
    ("gray", &[[0, 0, 0], [255, 255, 255]]),
    (
        "hot",
        &[
            [11, 0, 0],
            [139, 0, 0],
            [255, 11, 0],
            [255, 139, 0],
            [255, 255, 11],
            [255, 255, 139],
            [255, 255, 255],
        ],
    ),
    (
        "inferno",
        &[
            [0, 0, 4],
            [31, 12, 72],
            [85, 15, 109],
            [136, 34, 106],
            [186, 54, 85],
            [227, 89, 51],
            [249, 140, 10],
            [249, 201, 50],
            [252, 255, 164],
        ],
    ),
    (
        "magma",
        &[
            [0, 0, 4],
            [28, 16, 68],
            [79, 18, 123],
            [129, 37, 129],
            [181, 54, 122],
            [229, 80, 100],
            [251, 135, 97],
            [254, 194, 135],
            [252, 253, 191],
        ],
    ),
    (
        "turbo",
        &[
            [48, 18, 59],
            [70, 107, 227],
            [41, 187, 236],
            [49, 242, 153],
            [163, 253, 61],
            [237, 208, 58],
            [251, 128, 34],
            [209, 49, 7],
            [122, 4, 3],
        ],
    ),
    (
        "twilight",
        &[
            [226, 217, 226],
            [135, 165, 199],
            [94, 103, 181],
            [79, 42, 127],
            [47, 20, 54],
            [110, 34, 78],
            [168, 66, 72],
            [201, 130, 110],
            [226, 217, 226],
        ],
    ),
    (
        "viridis",
        &[
            [68, 1, 84],
            [72, 40, 120],
            [62, 74, 137],
            [49, 104, 142],
            [38, 130, 142],
            [31, 158, 137],
            [53, 183, 121],
            [110, 206, 88],
            [181, 222, 43],
            [253, 231, 37],
        ],
    ),
];

/// Every selectable colormap name: each base map followed by its reverse.
pub fn colormap_names() -> Vec<String> {
    BASE_COLORMAPS
        .iter()
        .flat_map(|(name, _)| [name.to_string(), format!("{name}{REVERSED_SUFFIX}")])
        .collect()
}

/// Position of `name` in [`colormap_names`].
pub fn colormap_index(name: &str) -> Option<usize> {
    colormap_names().iter().position(|n| n == name)
}

/// A named 256-entry gradient, sampled over a `[vmin, vmax]` value range.
#[derive(Debug, Clone)]
pub struct Colormap {
    name: String,
    colors: Vec<[u8; 4]>,
}

impl Colormap {
    /// Look up a colormap by name; a `_r` suffix reverses it.
    pub fn by_name(name: &str) -> crate::Result<Self> {
        let (base, reversed) = match name.strip_suffix(REVERSED_SUFFIX) {
            Some(base) => (base, true),
            None => (name, false),
        };
        let stops = BASE_COLORMAPS
            .iter()
            .find(|(n, _)| *n == base)
            .map(|(_, stops)| *stops)
            .ok_or_else(|| RenderError::UnknownColormap(name.to_string()))?;

        let mut colors = gradient_lut(stops);
        if reversed {
            colors.reverse();
        }
        Ok(Self {
            name: name.to_string(),
            colors,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Color for `value`, normalized into `[vmin, vmax]` and clipped.
    ///
    /// Non-finite values map to opaque black.
    pub fn map(&self, value: f64, vmin: f64, vmax: f64) -> [u8; 4] {
        if !value.is_finite() {
            return [0, 0, 0, 255];
        }
        let span = vmax - vmin;
        let t = if span > 0.0 {
            ((value - vmin) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let idx = ((t * LUT_SIZE as f64) as usize).min(LUT_SIZE - 1);
        self.colors[idx]
    }

    /// Colorize a display grid into an RGBA buffer.
    pub fn colorize(&self, grid: &DisplayGrid, vmin: f64, vmax: f64) -> RenderBuffer {
        let mut pixels = vec![0u8; grid.len() * 4];
        pixels
            .par_chunks_mut(4)
            .zip(grid.data.par_iter())
            .for_each(|(pixel, &value)| {
                pixel.copy_from_slice(&self.map(value, vmin, vmax));
            });
        RenderBuffer {
            width: grid.width,
            height: grid.height,
            pixels,
        }
    }

    /// Generate `count` evenly spaced colors (for a legend strip).
    pub fn preview_colors(&self, count: usize) -> Vec<[u8; 4]> {
        (0..count)
            .map(|i| self.map(i as f64, 0.0, count.saturating_sub(1) as f64))
            .collect()
    }
}

impl Default for Colormap {
    fn default() -> Self {
        let mut colors = gradient_lut(BASE_COLORMAPS[1].1);
        colors.reverse();
        Self {
            name: DEFAULT_COLORMAP.to_string(),
            colors,
        }
    }
}

/// Build a gradient LUT by interpolating between evenly spaced stops.
fn gradient_lut(stops: &[[u8; 3]]) -> Vec<[u8; 4]> {
    let segments = stops.len().saturating_sub(1).max(1) as f64;
    (0..LUT_SIZE)
        .map(|i| {
            let t = i as f64 / (LUT_SIZE - 1) as f64 * segments;
            let lo = (t.floor() as usize).min(stops.len() - 1);
            let hi = (lo + 1).min(stops.len() - 1);
            let frac = t - lo as f64;
            let inv = 1.0 - frac;
            let (a, b) = (stops[lo], stops[hi]);
            [
                (a[0] as f64 * inv + b[0] as f64 * frac).round() as u8,
                (a[1] as f64 * inv + b[1] as f64 * frac).round() as u8,
                (a[2] as f64 * inv + b[2] as f64 * frac).round() as u8,
                255,
            ]
        })
        .collect()
}
