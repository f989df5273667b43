//! Deterministic per-frame parameters for zoom animations.
//!
//! Two plan kinds exist:
//!
//! - [`StepwisePlan`]: start from a configuration and apply additive /
//!   multiplicative deltas every frame.
//! - [`InterpolatedPlan`]: interpolate between a start and an end region.
//!
//! Both are materialized into a [`FrameSequence`], a lazy, cloneable iterator
//! of [`FrameSpec`]s. Every frame is a pure function of the plan and its
//! index, so iterating twice (or calling [`FrameSequence::frame`]) always
//! yields the same values.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::complex::Complex;
use crate::config::{RenderConfig, Shape};
use crate::error::CoreError;
use crate::region::Region;

/// Resolution of the stepwise preview render.
pub const PREVIEW_SIDE: u32 = 100;
/// Iteration budgets at or above this are halved for previews.
pub const PREVIEW_HALVING_THRESHOLD: u32 = 50;

/// Parameters of a single animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSpec {
    pub index: u32,
    pub region: Region,
    pub max_iterations: u32,
    pub escape_threshold: f64,
}

impl FrameSpec {
    /// `base` with this frame's iteration budget and threshold applied.
    pub fn config(&self, base: &RenderConfig) -> RenderConfig {
        base.with_max_iterations(self.max_iterations)
            .with_escape_threshold(self.escape_threshold)
    }
}

// ---------------------------------------------------------------------------
// Stepwise
// ---------------------------------------------------------------------------

/// Per-frame changes applied by a [`StepwisePlan`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepDeltas {
    /// Added to the iteration budget every frame (floored at 2).
    #[serde(default)]
    pub iterations: i64,
    /// Added to the escape threshold every frame.
    #[serde(default)]
    pub threshold: f64,
    /// Center movement per frame along the real axis.
    #[serde(default)]
    pub x: f64,
    /// Center movement per frame along the imaginary axis.
    #[serde(default)]
    pub y: f64,
    /// Multiplier applied to the half-extents every frame, and to the
    /// center movement from the second moving frame on.
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for StepDeltas {
    fn default() -> Self {
        Self {
            iterations: 0,
            threshold: 0.0,
            x: 0.0,
            y: 0.0,
            scale: 1.0,
        }
    }
}

/// Incremental zoom: the start view evolved by fixed deltas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepwisePlan {
    pub start: Region,
    pub config: RenderConfig,
    #[serde(default)]
    pub deltas: StepDeltas,
}

/// Mutable walk state for one pass over a stepwise plan.
#[derive(Debug, Clone, Copy)]
struct StepState {
    center: Complex,
    half_width: f64,
    half_height: f64,
    step_x: f64,
    step_y: f64,
    iterations: i64,
    threshold: f64,
}

impl StepState {
    fn start(plan: &StepwisePlan) -> Self {
        let (half_width, half_height) = plan.start.half_extents();
        Self {
            center: plan.start.center(),
            half_width,
            half_height,
            step_x: plan.deltas.x,
            step_y: plan.deltas.y,
            iterations: plan.config.max_iterations as i64,
            threshold: plan.config.escape_threshold,
        }
    }

    /// Move from frame `index - 1` to frame `index` (`index >= 1`).
    fn advance(&mut self, index: u32, deltas: &StepDeltas) {
        if index > 1 {
            self.step_x *= deltas.scale;
            self.step_y *= deltas.scale;
        }
        self.half_width *= deltas.scale;
        self.half_height *= deltas.scale;
        self.threshold += deltas.threshold;
        self.iterations = (self.iterations + deltas.iterations).max(RenderConfig::MIN_ITERATIONS as i64);
        self.center.re += self.step_x;
        self.center.im += self.step_y;
    }

    fn frame(&self, index: u32, plan: &StepwisePlan) -> FrameSpec {
        let region = if index == 0 {
            plan.start
        } else {
            Region::from_center(self.center, self.half_width, self.half_height)
        };
        FrameSpec {
            index,
            region,
            max_iterations: self.iterations.clamp(0, u32::MAX as i64) as u32,
            escape_threshold: self.threshold,
        }
    }
}

impl StepwisePlan {
    pub fn new(start: Region, config: RenderConfig, deltas: StepDeltas) -> Self {
        Self {
            start,
            config,
            deltas,
        }
    }

    fn state_at(&self, index: u32) -> StepState {
        let mut state = StepState::start(self);
        for i in 1..=index {
            state.advance(i, &self.deltas);
        }
        state
    }

    /// Configuration and region for a quick look at the last frame:
    /// rendered at 100×100 with large iteration budgets halved.
    pub fn preview(&self, frame_count: u32) -> crate::Result<(RenderConfig, Region)> {
        if frame_count == 0 {
            return Err(CoreError::InvalidFrameCount(frame_count));
        }
        let last = self.state_at(frame_count - 1).frame(frame_count - 1, self);
        let iterations = if last.max_iterations < PREVIEW_HALVING_THRESHOLD {
            last.max_iterations
        } else {
            last.max_iterations / 2
        };
        let config = last
            .config(&self.config)
            .with_max_iterations(iterations)
            .with_shape(Shape::square(PREVIEW_SIDE));
        Ok((config, last.region))
    }
}

// ---------------------------------------------------------------------------
// Interpolated
// ---------------------------------------------------------------------------

/// How the zoom level moves from the start to the end region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    Linear,
    #[default]
    Exponential,
    None,
}

/// How the center moves from the start to the end region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMode {
    Linear,
    /// Translation progress follows zoom progress.
    #[default]
    ScaleDependent,
    None,
}

/// Zoom between two fixed regions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedPlan {
    pub start: Region,
    pub end: Region,
    /// Held constant across every frame.
    pub max_iterations: u32,
    #[serde(default = "default_threshold")]
    pub escape_threshold: f64,
    #[serde(default)]
    pub scale_mode: ScaleMode,
    #[serde(default)]
    pub translation_mode: TranslationMode,
}

fn default_threshold() -> f64 {
    RenderConfig::DEFAULT_ESCAPE_THRESHOLD
}

impl InterpolatedPlan {
    pub fn new(
        start: Region,
        end: Region,
        max_iterations: u32,
        scale_mode: ScaleMode,
        translation_mode: TranslationMode,
    ) -> Self {
        Self {
            start,
            end,
            max_iterations,
            escape_threshold: RenderConfig::DEFAULT_ESCAPE_THRESHOLD,
            scale_mode,
            translation_mode,
        }
    }
}

/// `(v - lo) / (hi - lo)`, or 1 when the interval is empty.
pub fn normalize(v: f64, hi: f64, lo: f64) -> f64 {
    let span = hi - lo;
    if span == 0.0 {
        return 1.0;
    }
    (v - lo) / span
}

/// Interpolation constants derived once per materialization.
#[derive(Debug, Clone, Copy)]
struct Interpolation {
    start_center: Complex,
    start_offset: (f64, f64),
    scale_mode: ScaleMode,
    translation_mode: TranslationMode,
    /// End offset over start offset (x axis); 1 when not scaling.
    ratio: f64,
    /// Additive per-frame offset change for linear scaling.
    linear_step: f64,
    translation: Complex,
    last_index: f64,
}

impl Interpolation {
    fn new(plan: &InterpolatedPlan, frame_count: u32) -> Self {
        let start_offset = plan.start.half_extents();
        let end_offset = plan.end.half_extents();
        let start_center = plan.start.center();
        let end_center = plan.end.center();
        let last_index = frame_count.saturating_sub(1).max(1) as f64;

        // Equal extents mean nothing to scale; a zero start extent would
        // divide by zero.
        let mut scale_mode = plan.scale_mode;
        if end_offset.0 == start_offset.0 || start_offset.0 == 0.0 {
            scale_mode = ScaleMode::None;
        }
        let mut translation_mode = plan.translation_mode;
        if scale_mode == ScaleMode::None && translation_mode == TranslationMode::ScaleDependent {
            translation_mode = TranslationMode::Linear;
        }

        let (ratio, linear_step) = match scale_mode {
            ScaleMode::None => (1.0, 0.0),
            _ => (
                end_offset.0 / start_offset.0,
                (end_offset.0 - start_offset.0) / last_index,
            ),
        };

        Self {
            start_center,
            start_offset,
            scale_mode,
            translation_mode,
            ratio,
            linear_step,
            translation: Complex::new(
                end_center.re - start_center.re,
                end_center.im - start_center.im,
            ),
            last_index,
        }
    }

    fn scale_multiplier(&self, index: u32) -> f64 {
        let i = index as f64;
        match self.scale_mode {
            ScaleMode::Linear => (self.start_offset.0 + self.linear_step * i) / self.start_offset.0,
            ScaleMode::Exponential => self.ratio.powf(i / self.last_index),
            ScaleMode::None => 1.0,
        }
    }

    fn translation_at(&self, index: u32, multiplier: f64) -> Complex {
        let progress = match self.translation_mode {
            TranslationMode::Linear => index as f64 / self.last_index,
            TranslationMode::ScaleDependent => normalize(multiplier, self.ratio, 1.0),
            TranslationMode::None => 0.0,
        };
        Complex::new(self.translation.re * progress, self.translation.im * progress)
    }

    fn region_at(&self, index: u32, start: &Region) -> Region {
        if index == 0 {
            return *start;
        }
        let m = self.scale_multiplier(index);
        let t = self.translation_at(index, m);
        Region::from_center(
            Complex::new(self.start_center.re + t.re, self.start_center.im + t.im),
            self.start_offset.0 * m,
            self.start_offset.1 * m,
        )
    }
}

// ---------------------------------------------------------------------------
// Plan + sequence
// ---------------------------------------------------------------------------

/// An animation request, tagged by mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AnimationPlan {
    Stepwise(StepwisePlan),
    Interpolated(InterpolatedPlan),
}

impl AnimationPlan {
    /// Validate the plan and produce its lazy frame sequence.
    pub fn materialize(&self, frame_count: u32) -> crate::Result<FrameSequence> {
        if frame_count == 0 {
            return Err(CoreError::InvalidFrameCount(frame_count));
        }
        let kind = match self {
            Self::Stepwise(plan) => {
                plan.start.validate()?;
                debug!(frame_count, scale = plan.deltas.scale, "Materialized stepwise plan");
                SequenceKind::Stepwise {
                    plan: *plan,
                    state: StepState::start(plan),
                }
            }
            Self::Interpolated(plan) => {
                plan.start.validate()?;
                plan.end.validate()?;
                let interpolation = Interpolation::new(plan, frame_count);
                debug!(
                    frame_count,
                    scale = ?interpolation.scale_mode,
                    translation = ?interpolation.translation_mode,
                    "Materialized interpolated plan"
                );
                SequenceKind::Interpolated {
                    plan: *plan,
                    interpolation,
                }
            }
        };
        Ok(FrameSequence {
            kind,
            frame_count,
            next_index: 0,
        })
    }

    /// The start region of either plan kind.
    pub fn start_region(&self) -> Region {
        match self {
            Self::Stepwise(plan) => plan.start,
            Self::Interpolated(plan) => plan.start,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SequenceKind {
    Stepwise { plan: StepwisePlan, state: StepState },
    Interpolated { plan: InterpolatedPlan, interpolation: Interpolation },
}

/// Lazy, finite, restartable sequence of frames.
///
/// Cloning the sequence (or calling [`restart`](Self::restart)) replays the
/// same frames from the current or first index.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    kind: SequenceKind,
    frame_count: u32,
    next_index: u32,
}

impl FrameSequence {
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Random access to frame `index`, independent of iteration position.
    pub fn frame(&self, index: u32) -> Option<FrameSpec> {
        if index >= self.frame_count {
            return None;
        }
        Some(match &self.kind {
            SequenceKind::Stepwise { plan, .. } => plan.state_at(index).frame(index, plan),
            SequenceKind::Interpolated {
                plan,
                interpolation,
            } => interpolated_frame(plan, interpolation, index),
        })
    }

    /// Rewind to frame 0.
    pub fn restart(&mut self) {
        self.next_index = 0;
        if let SequenceKind::Stepwise { plan, state } = &mut self.kind {
            *state = StepState::start(plan);
        }
    }
}

fn interpolated_frame(
    plan: &InterpolatedPlan,
    interpolation: &Interpolation,
    index: u32,
) -> FrameSpec {
    FrameSpec {
        index,
        region: interpolation.region_at(index, &plan.start),
        max_iterations: plan.max_iterations,
        escape_threshold: plan.escape_threshold,
    }
}

impl Iterator for FrameSequence {
    type Item = FrameSpec;

    fn next(&mut self) -> Option<FrameSpec> {
        if self.next_index >= self.frame_count {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        Some(match &mut self.kind {
            SequenceKind::Stepwise { plan, state } => {
                if index > 0 {
                    state.advance(index, &plan.deltas);
                }
                state.frame(index, plan)
            }
            SequenceKind::Interpolated {
                plan,
                interpolation,
            } => interpolated_frame(plan, interpolation, index),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.frame_count - self.next_index) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrameSequence {}
