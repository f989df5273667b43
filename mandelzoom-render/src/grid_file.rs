//! Divergence grids as NumPy `.npy` (format version 1.0) files.
//!
//! Grids are written as little-endian `<i8`, C order, 2-D `(height, width)`.
//! The reader also accepts `<i4`, `<u4` and `<u8` payloads.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use mandelzoom_core::RenderConfig;

use crate::divergence_grid::DivergenceGrid;
use crate::error::RenderError;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
/// Header plus preamble is padded to a multiple of this.
const HEADER_ALIGN: usize = 64;
/// Magic, version bytes, and the `u16` header length.
const PREAMBLE_LEN: usize = MAGIC.len() + 2 + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    I4,
    I8,
    U4,
    U8,
}

impl Dtype {
    fn parse(descr: &str) -> Option<Self> {
        match descr {
            "<i4" => Some(Self::I4),
            "<i8" => Some(Self::I8),
            "<u4" => Some(Self::U4),
            "<u8" => Some(Self::U8),
            _ => None,
        }
    }

    fn size(self) -> usize {
        match self {
            Self::I4 | Self::U4 => 4,
            Self::I8 | Self::U8 => 8,
        }
    }

    /// Decode one little-endian element as a wide signed value.
    fn decode(self, bytes: &[u8]) -> i128 {
        let mut buf4 = [0u8; 4];
        let mut buf8 = [0u8; 8];
        match self {
            Self::I4 => {
                buf4.copy_from_slice(bytes);
                i32::from_le_bytes(buf4) as i128
            }
            Self::U4 => {
                buf4.copy_from_slice(bytes);
                u32::from_le_bytes(buf4) as i128
            }
            Self::I8 => {
                buf8.copy_from_slice(bytes);
                i64::from_le_bytes(buf8) as i128
            }
            Self::U8 => {
                buf8.copy_from_slice(bytes);
                u64::from_le_bytes(buf8) as i128
            }
        }
    }
}

fn format_error(reason: impl Into<String>) -> RenderError {
    RenderError::GridFormat {
        reason: reason.into(),
    }
}

/// Serialize `grid` in `.npy` form.
pub fn write_npy<W: Write>(mut out: W, grid: &DivergenceGrid) -> crate::Result<()> {
    let mut header = format!(
        "{{'descr': '<i8', 'fortran_order': False, 'shape': ({}, {}), }}",
        grid.height, grid.width
    );
    let unpadded = PREAMBLE_LEN + header.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');

    let header_len = u16::try_from(header.len())
        .map_err(|_| format_error("header does not fit a version 1.0 file"))?;

    out.write_all(MAGIC)?;
    out.write_all(&[1, 0])?;
    out.write_all(&header_len.to_le_bytes())?;
    out.write_all(header.as_bytes())?;
    for &v in &grid.data {
        out.write_all(&i64::from(v).to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
}

/// Parse a `.npy` stream into a grid.
///
/// `max_iterations` sets the grid's sentinel; `None` uses the largest stored
/// value, raised to the smallest valid budget. Values must be non-negative and no larger than the sentinel.
pub fn read_npy<R: Read>(mut input: R, max_iterations: Option<u32>) -> crate::Result<DivergenceGrid> {
    let mut preamble = [0u8; PREAMBLE_LEN];
    input.read_exact(&mut preamble)?;
    if &preamble[..MAGIC.len()] != MAGIC {
        return Err(format_error("missing NUMPY magic"));
    }
    let major = preamble[MAGIC.len()];
    if major != 1 {
        return Err(format_error(format!("unsupported format version {major}")));
    }
    let header_len = u16::from_le_bytes([preamble[8], preamble[9]]) as usize;
    let mut header = vec![0u8; header_len];
    input.read_exact(&mut header)?;
    let header =
        std::str::from_utf8(&header).map_err(|_| format_error("header is not ASCII"))?;

    let descr = header_value(header, "descr")
        .map(|v| v.trim_matches(|c| c == '\'' || c == '"'))
        .ok_or_else(|| format_error("header has no 'descr'"))?;
    let dtype = Dtype::parse(descr)
        .ok_or_else(|| format_error(format!("unsupported dtype {descr}")))?;
    if header_value(header, "fortran_order") != Some("False") {
        return Err(format_error("only C-order arrays are supported"));
    }
    let (height, width) = header_value(header, "shape")
        .and_then(parse_shape)
        .ok_or_else(|| format_error("shape must be a 2-D tuple"))?;

    let count = (height as usize)
        .checked_mul(width as usize)
        .ok_or_else(|| format_error(format!("shape ({height}, {width}) is too large")))?;
    let expected = count
        .checked_mul(dtype.size())
        .ok_or_else(|| format_error(format!("shape ({height}, {width}) is too large")))?;

    // Grow with the stream so a lying header cannot force a huge allocation.
    let mut payload = Vec::new();
    input.take(expected as u64).read_to_end(&mut payload)?;
    if payload.len() != expected {
        return Err(format_error(format!(
            "payload has {} bytes, shape needs {expected}",
            payload.len()
        )));
    }

    let mut data = Vec::with_capacity(count);
    for chunk in payload.chunks_exact(dtype.size()) {
        let v = dtype.decode(chunk);
        let v = u32::try_from(v)
            .map_err(|_| format_error(format!("value {v} is not a divergence time")))?;
        data.push(v);
    }

    let stored_max = data.iter().copied().max().unwrap_or(0);
    let max_iterations = match max_iterations {
        Some(m) if stored_max > m => {
            return Err(format_error(format!(
                "value {stored_max} exceeds max iterations {m}"
            )))
        }
        Some(m) => m,
        None => stored_max.max(RenderConfig::MIN_ITERATIONS),
    };
    DivergenceGrid::from_data(width, height, max_iterations, data)
}

/// Write `grid` to `path`.
pub fn save_grid(path: &Path, grid: &DivergenceGrid) -> crate::Result<()> {
    write_npy(BufWriter::new(File::create(path)?), grid)?;
    debug!(
        width = grid.width,
        height = grid.height,
        path = %path.display(),
        "Saved divergence grid"
    );
    Ok(())
}

/// Read a grid from `path`; see [`read_npy`].
pub fn load_grid(path: &Path, max_iterations: Option<u32>) -> crate::Result<DivergenceGrid> {
    let grid = read_npy(BufReader::new(File::open(path)?), max_iterations)?;
    debug!(
        width = grid.width,
        height = grid.height,
        max_iterations = grid.max_iterations,
        path = %path.display(),
        "Loaded divergence grid"
    );
    Ok(grid)
}

/// Raw text of `key`'s value in a Python dict literal.
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let key_pos = header
        .find(&format!("'{key}'"))
        .or_else(|| header.find(&format!("\"{key}\"")))?;
    let rest = &header[key_pos + key.len() + 2..];
    let rest = rest.trim_start().strip_prefix(':')?.trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')')? + 1
    } else {
        rest.find([',', '}']).unwrap_or(rest.len())
    };
    Some(rest[..end].trim())
}

fn parse_shape(tuple: &str) -> Option<(u32, u32)> {
    let inner = tuple.strip_prefix('(')?.strip_suffix(')')?;
    let dims: Vec<u32> = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect::<Option<_>>()?;
    match dims.as_slice() {
        [h, w] => Some((*h, *w)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn npy_with(descr: &str, shape: &str, payload: &[u8]) -> Vec<u8> {
        let header = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape}, }}\n");
        let mut bytes = MAGIC.to_vec();
        bytes.extend([1, 0]);
        bytes.extend((header.len() as u16).to_le_bytes());
        bytes.extend(header.as_bytes());
        bytes.extend(payload);
        bytes
    }

    #[test]
    fn written_header_is_aligned() {
        let grid = DivergenceGrid::from_data(3, 2, 9, vec![0, 1, 2, 3, 4, 9]).unwrap();
        let mut bytes = Vec::new();
        write_npy(&mut bytes, &grid).unwrap();

        assert_eq!(&bytes[..6], MAGIC);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((PREAMBLE_LEN + header_len) % HEADER_ALIGN, 0);
        assert_eq!(bytes[PREAMBLE_LEN + header_len - 1], b'\n');
        assert_eq!(bytes.len(), PREAMBLE_LEN + header_len + 6 * 8);

        let header = std::str::from_utf8(&bytes[PREAMBLE_LEN..PREAMBLE_LEN + header_len]).unwrap();
        assert!(header.contains("'shape': (2, 3)"));
        assert!(header.contains("'descr': '<i8'"));
    }

    #[test]
    fn reads_back_what_it_writes() {
        let grid = DivergenceGrid::from_data(3, 2, 9, vec![0, 1, 2, 3, 4, 9]).unwrap();
        let mut bytes = Vec::new();
        write_npy(&mut bytes, &grid).unwrap();
        assert_eq!(read_npy(bytes.as_slice(), Some(9)).unwrap(), grid);
    }

    #[test]
    fn reads_int32_payload_and_infers_max() {
        let payload: Vec<u8> = [5i32, 0, 7, 7].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = npy_with("<i4", "(2, 2)", &payload);
        let grid = read_npy(bytes.as_slice(), None).unwrap();
        assert_eq!(grid.max_iterations, 7);
        assert_eq!(grid.data, vec![5, 0, 7, 7]);
        assert_eq!(grid.escaped_count(), 2);
    }

    #[test]
    fn rejects_bad_input() {
        let payload: Vec<u8> = [-1i32].iter().flat_map(|v| v.to_le_bytes()).collect();
        let negative = npy_with("<i4", "(1, 1)", &payload);
        assert!(matches!(
            read_npy(negative.as_slice(), None),
            Err(RenderError::GridFormat { .. })
        ));

        let floats = npy_with("<f8", "(1, 1)", &[0; 8]);
        assert!(matches!(
            read_npy(floats.as_slice(), None),
            Err(RenderError::GridFormat { .. })
        ));

        let three_d = npy_with("<i8", "(1, 1, 1)", &[0; 8]);
        assert!(matches!(
            read_npy(three_d.as_slice(), None),
            Err(RenderError::GridFormat { .. })
        ));

        let payload: Vec<u8> = [12i64].iter().flat_map(|v| v.to_le_bytes()).collect();
        let too_big = npy_with("<i8", "(1, 1)", &payload);
        assert!(read_npy(too_big.as_slice(), Some(10)).is_err());

        assert!(matches!(
            read_npy(&b"not a numpy file"[..], None),
            Err(RenderError::GridFormat { .. })
        ));
    }

    #[test]
    fn truncated_payload_is_format_error() {
        let bytes = npy_with("<i8", "(2, 2)", &[0; 8]);
        assert!(matches!(
            read_npy(bytes.as_slice(), None),
            Err(RenderError::GridFormat { .. })
        ));
    }

    #[test]
    fn oversized_shape_is_rejected_before_reading() {
        let huge = npy_with("<i8", "(4294967295, 4294967295)", &[0; 8]);
        assert!(matches!(
            read_npy(huge.as_slice(), None),
            Err(RenderError::GridFormat { .. })
        ));

        // Valid on paper, but the stream holds a single value.
        let large = npy_with("<i8", "(65536, 65536)", &[0; 8]);
        assert!(matches!(
            read_npy(large.as_slice(), None),
            Err(RenderError::GridFormat { .. })
        ));
    }

    #[test]
    fn all_escaped_grid_gets_usable_budget() {
        let bytes = npy_with("<i8", "(1, 2)", &[0; 16]);
        let grid = read_npy(bytes.as_slice(), None).unwrap();
        assert_eq!(grid.max_iterations, RenderConfig::MIN_ITERATIONS);
        assert_eq!(grid.escaped_count(), 2);
    }

    #[test]
    fn save_and_load_through_files() {
        let dir = std::env::temp_dir().join("mandelzoom_test_grid_file");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("grid.npy");

        let grid = DivergenceGrid::new(5, 4, 30);
        save_grid(&path, &grid).unwrap();
        assert_eq!(load_grid(&path, Some(30)).unwrap(), grid);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
