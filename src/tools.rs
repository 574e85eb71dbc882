//! Editing tools
//!
//! Every tool implements [`EditTool`]: it turns its gesture state into a
//! modifier on the segmentation's reference lattice plus the modification
//! mode to apply it with. The [`ToolRegistry`] holds one instance of each
//! tool kind.

use crate::brush::{PaintBrush, ScissorsCut, ScissorsShape, View};
use crate::config::EditorConfig;
use crate::engine::{ModificationMode, ModifyOptions};
use crate::grid::VoxelGrid;
use crate::segmentation::Segmentation;
use crate::state::{AlignedSource, EditorState};
use crate::{Error, Result};
use nalgebra::{Vector2, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ToolKind {
    Paint,
    Erase,
    Scissors,
    Rectangle,
    Threshold,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::Paint,
        ToolKind::Erase,
        ToolKind::Scissors,
        ToolKind::Rectangle,
        ToolKind::Threshold,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Paint => "Paint",
            ToolKind::Erase => "Erase",
            ToolKind::Scissors => "Scissors",
            ToolKind::Rectangle => "Rectangle",
            ToolKind::Threshold => "Threshold",
        }
    }
}

/// Inputs available to a tool when it builds its modifier
pub struct ToolContext<'a> {
    pub segmentation: &'a Segmentation,
    pub state: &'a EditorState,
    /// View of the gesture; tools working on the whole volume ignore it
    pub view: Option<&'a View>,
    /// Source volume on the reference lattice
    pub source: Option<&'a AlignedSource>,
}

/// How a generated modifier is to be applied
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolEdit {
    pub mode: ModificationMode,
    pub options: ModifyOptions,
}

pub trait EditTool {
    fn kind(&self) -> ToolKind;

    /// Whether [`ToolContext::source`] must be provided
    fn needs_source_volume(&self) -> bool {
        false
    }

    /// Write the tool's stencil into `modifier`.
    ///
    /// Returns `None` when the gesture produced nothing to apply. The gesture
    /// state is consumed either way.
    fn generate_modifier(
        &mut self,
        ctx: &ToolContext<'_>,
        modifier: &mut VoxelGrid<u8>,
    ) -> Result<Option<ToolEdit>>;

    /// Drop any gesture in progress
    fn reset(&mut self) {}
}

fn require_view<'a>(ctx: &ToolContext<'a>, kind: ToolKind) -> Result<&'a View> {
    ctx.view.ok_or_else(|| {
        Error::InvalidParameter(format!("{} tool needs an interaction view", kind.name()))
    })
}

/// Paint and erase brush tool
#[derive(Debug, Clone)]
pub struct PaintTool {
    brush: PaintBrush,
    points: Vec<Vector3<f64>>,
    erase: bool,
    erase_all_segments: bool,
}

impl PaintTool {
    pub fn paint(brush: PaintBrush) -> Self {
        Self {
            brush,
            points: Vec::new(),
            erase: false,
            erase_all_segments: false,
        }
    }

    pub fn eraser(brush: PaintBrush) -> Self {
        Self {
            erase: true,
            ..Self::paint(brush)
        }
    }

    pub fn brush(&self) -> &PaintBrush {
        &self.brush
    }

    pub fn brush_mut(&mut self) -> &mut PaintBrush {
        &mut self.brush
    }

    /// Erase from every segment instead of the selected one
    pub fn set_erase_all_segments(&mut self, erase_all: bool) {
        self.erase_all_segments = erase_all;
    }

    /// Add a stroke point (RAS)
    pub fn add_point(&mut self, point: Vector3<f64>) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    fn mode(&self) -> ModificationMode {
        match (self.erase, self.erase_all_segments) {
            (false, _) => ModificationMode::Add,
            (true, false) => ModificationMode::Remove,
            (true, true) => ModificationMode::RemoveAll,
        }
    }
}

impl EditTool for PaintTool {
    fn kind(&self) -> ToolKind {
        if self.erase {
            ToolKind::Erase
        } else {
            ToolKind::Paint
        }
    }

    fn generate_modifier(
        &mut self,
        ctx: &ToolContext<'_>,
        modifier: &mut VoxelGrid<u8>,
    ) -> Result<Option<ToolEdit>> {
        let view = require_view(ctx, self.kind())?;
        let points = std::mem::take(&mut self.points);
        if points.is_empty() {
            return Ok(None);
        }
        let extent = self.brush.paint_stroke(&points, view, ctx.segmentation, modifier)?;
        if extent.is_empty() {
            return Ok(None);
        }
        // Pixel mode paints exactly the picked voxel, regardless of masking.
        let options = ModifyOptions {
            extent: Some(extent),
            bypass_masking: self.brush.config().pixel_mode,
        };
        Ok(Some(ToolEdit {
            mode: self.mode(),
            options,
        }))
    }

    fn reset(&mut self) {
        self.points.clear();
    }
}

/// Scissors and rectangle cut tool
#[derive(Debug, Clone)]
pub struct ScissorsTool {
    cut: ScissorsCut,
    kind: ToolKind,
}

impl ScissorsTool {
    pub fn scissors(cut: ScissorsCut) -> Self {
        Self {
            cut,
            kind: ToolKind::Scissors,
        }
    }

    /// Scissors locked to the rectangle shape
    pub fn rectangle(mut cut: ScissorsCut) -> Self {
        cut.set_shape(ScissorsShape::Rectangle);
        Self {
            cut,
            kind: ToolKind::Rectangle,
        }
    }

    pub fn cut(&self) -> &ScissorsCut {
        &self.cut
    }

    pub fn cut_mut(&mut self) -> &mut ScissorsCut {
        &mut self.cut
    }

    /// Start the outline at a view pixel
    pub fn begin(&mut self, point: Vector2<f64>) {
        self.cut.begin(point);
    }

    /// Extend the outline to a view pixel
    pub fn add_point(&mut self, point: Vector2<f64>) {
        self.cut.add_point(point);
    }
}

impl EditTool for ScissorsTool {
    fn kind(&self) -> ToolKind {
        self.kind
    }

    fn generate_modifier(
        &mut self,
        ctx: &ToolContext<'_>,
        modifier: &mut VoxelGrid<u8>,
    ) -> Result<Option<ToolEdit>> {
        let view = require_view(ctx, self.kind)?;
        let edit = self.cut.cut(view, ctx.segmentation, modifier);
        self.cut.clear();
        Ok(edit?.map(|edit| ToolEdit {
            mode: edit.mode,
            options: ModifyOptions::with_extent(edit.extent),
        }))
    }

    fn reset(&mut self) {
        self.cut.clear();
    }
}

/// What an automatic threshold replaces in the current range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AutoThresholdMode {
    /// `[threshold, volume max]`
    SetLowerMax,
    /// `[volume min, threshold]`
    SetMinUpper,
    /// Lower bound only
    SetLower,
    /// Upper bound only
    SetUpper,
}

/// Selects source voxels within an intensity range and makes them the
/// segment's content
#[derive(Debug, Clone)]
pub struct ThresholdTool {
    range: [f64; 2],
}

impl Default for ThresholdTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ThresholdTool {
    pub fn new() -> Self {
        Self { range: [0.0, 0.0] }
    }

    pub fn range(&self) -> [f64; 2] {
        self.range
    }

    pub fn set_range(&mut self, min: f64, max: f64) -> Result<()> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(Error::InvalidParameter(format!(
                "threshold range [{}, {}] is invalid",
                min, max
            )));
        }
        self.range = [min, max];
        Ok(())
    }

    /// Update the range from the Otsu threshold of `image`
    pub fn auto_threshold(&mut self, image: &VoxelGrid<f32>, mode: AutoThresholdMode) -> Result<[f64; 2]> {
        let (min, max) = image.scalar_range().ok_or_else(|| {
            Error::InvalidParameter("cannot threshold an empty volume".to_string())
        })?;
        let (min, max) = (min as f64, max as f64);
        let threshold = otsu_threshold(image, 256).unwrap_or(min);
        let [lower, upper] = self.range;
        self.range = match mode {
            AutoThresholdMode::SetLowerMax => [threshold, max],
            AutoThresholdMode::SetMinUpper => [min, threshold],
            AutoThresholdMode::SetLower => [threshold, upper.max(threshold)],
            AutoThresholdMode::SetUpper => [lower.min(threshold), threshold],
        };
        log::debug!("auto threshold {:?}: {:?}", mode, self.range);
        Ok(self.range)
    }
}

impl EditTool for ThresholdTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Threshold
    }

    fn needs_source_volume(&self) -> bool {
        true
    }

    fn generate_modifier(
        &mut self,
        ctx: &ToolContext<'_>,
        modifier: &mut VoxelGrid<u8>,
    ) -> Result<Option<ToolEdit>> {
        let source = ctx.source.ok_or_else(|| {
            Error::InvalidParameter("threshold tool needs a source volume".to_string())
        })?;
        let reference = *ctx.segmentation.reference_geometry();
        modifier.reset(reference);
        let [min, max] = self.range;
        let extent = modifier.extent();
        for (ijk, value) in extent.iter().zip(modifier.data_mut().iter_mut()) {
            let intensity = source.grid.value(ijk) as f64;
            *value = u8::from(intensity >= min && intensity <= max);
        }
        Ok(Some(ToolEdit {
            mode: ModificationMode::Set,
            options: ModifyOptions::with_extent(extent),
        }))
    }
}

/// Otsu's threshold over a `bins`-bucket histogram; `None` for an empty image
pub fn otsu_threshold(image: &VoxelGrid<f32>, bins: usize) -> Option<f64> {
    let (lo, hi) = image.scalar_range()?;
    let (lo, hi) = (lo as f64, hi as f64);
    let bins = bins.max(2);
    if hi <= lo {
        return Some(lo);
    }
    let width = (hi - lo) / bins as f64;
    let mut histogram = vec![0u64; bins];
    for &value in image.data() {
        let bin = (((value as f64 - lo) / width) as usize).min(bins - 1);
        histogram[bin] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let weighted: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();
    let (mut background, mut background_sum) = (0u64, 0.0);
    let (mut best, mut best_variance) = (0usize, -1.0);
    for (t, &count) in histogram.iter().enumerate() {
        background += count;
        if background == 0 {
            continue;
        }
        let foreground = total - background;
        if foreground == 0 {
            break;
        }
        background_sum += t as f64 * count as f64;
        let mean_background = background_sum / background as f64;
        let mean_foreground = (weighted - background_sum) / foreground as f64;
        let variance = background as f64
            * foreground as f64
            * (mean_background - mean_foreground).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best = t;
        }
    }
    Some(lo + (best + 1) as f64 * width)
}

/// One instance of every tool kind, with the currently active one
pub struct ToolRegistry {
    paint: PaintTool,
    erase: PaintTool,
    scissors: ScissorsTool,
    rectangle: ScissorsTool,
    threshold: ThresholdTool,
    active: Option<ToolKind>,
}

impl ToolRegistry {
    pub fn new(config: &EditorConfig) -> Self {
        let brush = PaintBrush::new(config.brush.clone());
        let cut = ScissorsCut::new(config.scissors.clone());
        Self {
            paint: PaintTool::paint(brush.clone()),
            erase: PaintTool::eraser(brush),
            scissors: ScissorsTool::scissors(cut.clone()),
            rectangle: ScissorsTool::rectangle(cut),
            threshold: ThresholdTool::new(),
            active: None,
        }
    }

    pub fn get(&self, kind: ToolKind) -> &dyn EditTool {
        match kind {
            ToolKind::Paint => &self.paint,
            ToolKind::Erase => &self.erase,
            ToolKind::Scissors => &self.scissors,
            ToolKind::Rectangle => &self.rectangle,
            ToolKind::Threshold => &self.threshold,
        }
    }

    pub fn get_mut(&mut self, kind: ToolKind) -> &mut dyn EditTool {
        match kind {
            ToolKind::Paint => &mut self.paint,
            ToolKind::Erase => &mut self.erase,
            ToolKind::Scissors => &mut self.scissors,
            ToolKind::Rectangle => &mut self.rectangle,
            ToolKind::Threshold => &mut self.threshold,
        }
    }

    pub fn paint_mut(&mut self) -> &mut PaintTool {
        &mut self.paint
    }

    pub fn erase_mut(&mut self) -> &mut PaintTool {
        &mut self.erase
    }

    pub fn scissors_mut(&mut self) -> &mut ScissorsTool {
        &mut self.scissors
    }

    pub fn rectangle_mut(&mut self) -> &mut ScissorsTool {
        &mut self.rectangle
    }

    pub fn threshold_mut(&mut self) -> &mut ThresholdTool {
        &mut self.threshold
    }

    pub fn active(&self) -> Option<ToolKind> {
        self.active
    }

    /// Switch tools, dropping the gesture of the previously active one
    pub fn set_active(&mut self, kind: Option<ToolKind>) {
        if let Some(previous) = self.active {
            if Some(previous) != kind {
                self.get_mut(previous).reset();
            }
        }
        self.active = kind;
    }
}
