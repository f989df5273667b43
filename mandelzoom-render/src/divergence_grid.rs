use crate::error::RenderError;

/// Per-pixel divergence times for a full frame, row-major.
///
/// This is the raw output of the kernel before coloring. Keeping it separate
/// from display values lets the caller recolor without recomputing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivergenceGrid {
    pub width: u32,
    pub height: u32,
    /// Sentinel for "did not escape"; every cell is `<= max_iterations`.
    pub max_iterations: u32,
    pub data: Vec<u32>,
}

impl DivergenceGrid {
    /// A grid where no pixel has escaped yet.
    pub fn new(width: u32, height: u32, max_iterations: u32) -> Self {
        let size = width as usize * height as usize;
        Self {
            width,
            height,
            max_iterations,
            data: vec![max_iterations; size],
        }
    }

    /// Wrap existing values, checking that they fill the shape.
    pub fn from_data(
        width: u32,
        height: u32,
        max_iterations: u32,
        data: Vec<u32>,
    ) -> crate::Result<Self> {
        if data.len() != width as usize * height as usize {
            return Err(RenderError::GridSizeMismatch {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            max_iterations,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Number of pixels whose orbit escaped within the budget.
    pub fn escaped_count(&self) -> usize {
        self.data
            .iter()
            .filter(|&&t| t < self.max_iterations)
            .count()
    }

    /// Largest stored value, or 0 for an empty grid.
    pub fn max_value(&self) -> u32 {
        self.data.iter().copied().max().unwrap_or(0)
    }

    /// Row `y` as a slice.
    pub fn row(&self, y: u32) -> &[u32] {
        let start = y as usize * self.width as usize;
        &self.data[start..start + self.width as usize]
    }
}
