//! Editor configuration

use crate::brush::{ScissorsOperation, ScissorsShape, SliceCutMode};
use crate::history::DEFAULT_UNDO_CAPACITY;
use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Paint brush settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BrushConfig {
    /// Absolute brush diameter in mm
    pub diameter_mm: f64,
    /// Brush diameter as percent of the smaller viewport dimension
    pub relative_diameter_percent: f64,
    pub diameter_is_relative: bool,
    pub min_diameter_mm: f64,
    pub max_diameter_mm: f64,
    /// Sphere brush instead of a slice-thick cylinder
    pub sphere: bool,
    /// Stamp single voxels instead of the brush shape
    pub pixel_mode: bool,
    /// Segments around the brush circumference
    pub resolution: usize,
    /// Maximum gap between stroke samples, as a fraction of the diameter
    pub stroke_sampling_fraction: f64,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            diameter_mm: 5.0,
            relative_diameter_percent: 3.0,
            diameter_is_relative: true,
            min_diameter_mm: 0.01,
            max_diameter_mm: 100.0,
            sphere: false,
            pixel_mode: false,
            resolution: 32,
            stroke_sampling_fraction: 0.25,
        }
    }
}

/// Scissors settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScissorsConfig {
    pub shape: ScissorsShape,
    pub operation: ScissorsOperation,
    pub slice_cut_mode: SliceCutMode,
    /// Cut thickness for [`SliceCutMode::Symmetric`], in mm
    pub slice_cut_depth_mm: f64,
    /// Vertices of the circle approximation
    pub circle_points: usize,
}

impl Default for ScissorsConfig {
    fn default() -> Self {
        Self {
            shape: ScissorsShape::FreeForm,
            operation: ScissorsOperation::EraseInside,
            slice_cut_mode: SliceCutMode::Unlimited,
            slice_cut_depth_mm: 0.0,
            circle_points: 72,
        }
    }
}

/// All tunables of an editing session
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EditorConfig {
    pub undo_capacity: usize,
    pub brush: BrushConfig,
    pub scissors: ScissorsConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_capacity: DEFAULT_UNDO_CAPACITY,
            brush: BrushConfig::default(),
            scissors: ScissorsConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Check every setting for a usable value
    pub fn validate(&self) -> Result<()> {
        let brush = &self.brush;
        if !(brush.min_diameter_mm > 0.0 && brush.min_diameter_mm <= brush.max_diameter_mm) {
            return Err(Error::InvalidParameter(format!(
                "brush diameter limits [{}, {}] are invalid",
                brush.min_diameter_mm, brush.max_diameter_mm
            )));
        }
        if !(brush.diameter_mm >= brush.min_diameter_mm && brush.diameter_mm <= brush.max_diameter_mm) {
            return Err(Error::InvalidParameter(format!(
                "brush diameter {} outside [{}, {}]",
                brush.diameter_mm, brush.min_diameter_mm, brush.max_diameter_mm
            )));
        }
        if !(brush.relative_diameter_percent > 0.0 && brush.relative_diameter_percent <= 100.0) {
            return Err(Error::InvalidParameter(format!(
                "relative brush diameter {}% must be in (0, 100]",
                brush.relative_diameter_percent
            )));
        }
        if brush.resolution < 3 {
            return Err(Error::InvalidParameter(
                "brush resolution must be at least 3".to_string(),
            ));
        }
        if !(brush.stroke_sampling_fraction > 0.0 && brush.stroke_sampling_fraction <= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "stroke sampling fraction {} must be in (0, 1]",
                brush.stroke_sampling_fraction
            )));
        }
        if self.scissors.circle_points < 3 {
            return Err(Error::InvalidParameter(
                "circle needs at least 3 points".to_string(),
            ));
        }
        if !(self.scissors.slice_cut_depth_mm >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "slice cut depth {} must not be negative",
                self.scissors.slice_cut_depth_mm
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EditorConfig::default();
        config.validate().expect("defaults must validate");
        assert_eq!(config.undo_capacity, 10);
        assert_eq!(config.brush.diameter_mm, 5.0);
        assert_eq!(config.scissors.slice_cut_mode, SliceCutMode::Unlimited);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EditorConfig::default();
        config.brush.diameter_mm = 500.0;
        assert!(matches!(config.validate(), Err(Error::InvalidParameter(_))));

        let mut config = EditorConfig::default();
        config.brush.stroke_sampling_fraction = 0.0;
        assert!(config.validate().is_err());

        let mut config = EditorConfig::default();
        config.scissors.slice_cut_depth_mm = f64::NAN;
        assert!(config.validate().is_err());
    }
}
