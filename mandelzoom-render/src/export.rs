//! Image writing with embedded metadata (tEXt chunks), plus the video-encoder
//! seam and frame file naming.

use std::cmp::Ordering;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::debug;

use mandelzoom_core::{Complex, Region};

use crate::buffer::RenderBuffer;
use crate::coloring::DisplayGrid;
use crate::colormap::Colormap;

/// Persists one display grid as an image.
pub trait ImageWriter: Send + Sync {
    /// Write `grid` to `path`, scaling values from `[vmin, vmax]` onto the
    /// writer's colormap.
    fn save_image(&self, path: &Path, grid: &DisplayGrid, vmax: f64, vmin: f64)
        -> crate::Result<()>;
}

/// Turns a directory of numbered frames into a video file.
pub trait VideoEncoder: Send + Sync {
    fn encode_video(&self, input_dir: &Path, output: &Path, fps: u32) -> crate::Result<()>;
}

/// Parameters embedded in exported PNGs.
#[derive(Debug, Clone, Default)]
pub struct ExportMetadata {
    pub region: Option<Region>,
    pub max_iterations: Option<u32>,
    pub degree: Option<u32>,
    pub escape_threshold: Option<f64>,
    pub coloring: Option<String>,
    pub cycles: Option<f64>,
    pub julia_c: Option<Complex>,
}

impl ExportMetadata {
    fn description(&self, colormap: &str) -> String {
        let mut desc = match self.julia_c {
            Some(c) => format!("Julia c = {c}"),
            None => "Mandelbrot".to_string(),
        };
        if let Some(region) = &self.region {
            desc.push_str(&format!(", Region: {region}"));
        }
        if let Some(it) = self.max_iterations {
            desc.push_str(&format!(", Iterations: {it}"));
        }
        desc.push_str(&format!(", Colormap: {colormap}"));
        desc
    }

    fn pairs(&self, colormap: &str, width: u32, height: u32) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("MandelZoom.Colormap".to_string(), colormap.to_string()),
            ("MandelZoom.Resolution".to_string(), format!("{width}x{height}")),
        ];
        if let Some(r) = &self.region {
            let [x0, x1, y0, y1] = r.to_array();
            pairs.push(("MandelZoom.Region".into(), format!("{x0} {x1} {y0} {y1}")));
        }
        if let Some(v) = self.max_iterations {
            pairs.push(("MandelZoom.MaxIterations".into(), v.to_string()));
        }
        if let Some(v) = self.degree {
            pairs.push(("MandelZoom.Degree".into(), v.to_string()));
        }
        if let Some(v) = self.escape_threshold {
            pairs.push(("MandelZoom.EscapeThreshold".into(), v.to_string()));
        }
        if let Some(v) = &self.coloring {
            pairs.push(("MandelZoom.Coloring".into(), v.clone()));
        }
        if let Some(v) = self.cycles {
            pairs.push(("MandelZoom.Cycles".into(), v.to_string()));
        }
        if let Some(c) = self.julia_c {
            pairs.push(("MandelZoom.JuliaC_Re".into(), c.re.to_string()));
            pairs.push(("MandelZoom.JuliaC_Im".into(), c.im.to_string()));
        }
        pairs
    }
}

/// Writes 8-bit RGBA PNGs through a named colormap.
#[derive(Debug, Clone, Default)]
pub struct PngImageWriter {
    colormap: Colormap,
    metadata: ExportMetadata,
}

impl PngImageWriter {
    pub fn new(colormap: Colormap) -> Self {
        Self {
            colormap,
            metadata: ExportMetadata::default(),
        }
    }

    /// Writer for the colormap called `name`.
    pub fn with_colormap_name(name: &str) -> crate::Result<Self> {
        Ok(Self::new(Colormap::by_name(name)?))
    }

    pub fn with_metadata(mut self, metadata: ExportMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn colormap(&self) -> &Colormap {
        &self.colormap
    }
}

impl ImageWriter for PngImageWriter {
    fn save_image(
        &self,
        path: &Path,
        grid: &DisplayGrid,
        vmax: f64,
        vmin: f64,
    ) -> crate::Result<()> {
        let buffer = self.colormap.colorize(grid, vmin, vmax);
        let name = self.colormap.name();
        let mut text = vec![
            ("Software".to_string(), "MandelZoom".to_string()),
            ("Description".to_string(), self.metadata.description(name)),
        ];
        text.extend(self.metadata.pairs(name, grid.width, grid.height));
        write_png(&buffer, path, &text)
    }
}

/// Write an RGBA buffer as a PNG file with the given tEXt chunks.
///
/// Uses the `png` crate directly so custom keywords stay readable by
/// exiftool and similar tools.
pub fn write_png(
    buffer: &RenderBuffer,
    path: &Path,
    text: &[(String, String)],
) -> crate::Result<()> {
    let writer = BufWriter::new(File::create(path)?);

    let mut encoder = png::Encoder::new(writer, buffer.width, buffer.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Default);
    for (key, value) in text {
        encoder.add_text_chunk(key.clone(), value.clone())?;
    }

    let mut png_writer = encoder.write_header()?;
    png_writer.write_image_data(&buffer.pixels)?;

    debug!(
        width = buffer.width,
        height = buffer.height,
        path = %path.display(),
        "Exported PNG"
    );
    Ok(())
}

/// File name of animation frame `index` inside `dir`.
pub fn frame_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("{index}.png"))
}

/// PNG files in `dir`, sorted naturally (`2.png` before `10.png`).
pub fn ordered_frames(dir: &Path) -> crate::Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if is_png && path.is_file() {
            frames.push(path);
        }
    }
    frames.sort_by(|a, b| {
        let name = |p: &PathBuf| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        natural_cmp(&name(a), &name(b))
    });
    Ok(frames)
}

/// Compare strings treating runs of ASCII digits as numbers.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let na = take_number(&mut a);
                let nb = take_number(&mut b);
                // Compare by length first so arbitrarily long runs never overflow.
                let ord = na
                    .len()
                    .cmp(&nb.len())
                    .then_with(|| na.cmp(&nb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
