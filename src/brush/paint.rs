use super::{TargetFrame, View};
use crate::config::BrushConfig;
use crate::grid::{ImageGeometry, VoxelGrid};
use crate::mesh::Mesh;
use crate::segmentation::Segmentation;
use crate::stencil::{rasterize_mesh, stencil_extent};
use crate::types::{round_index, transform_point, Extent};
use crate::{Error, Result};
use nalgebra::Vector3;

/// Upper bound on samples interpolated between two pick points
pub const MAX_SAMPLES_PER_SEGMENT: usize = 1024;

/// Paint brush: a circle (slice-thick cylinder) or sphere stamped at every
/// stroke sample
#[derive(Debug, Clone, PartialEq)]
pub struct PaintBrush {
    config: BrushConfig,
}

impl PaintBrush {
    pub fn new(config: BrushConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrushConfig {
        &self.config
    }

    pub fn set_sphere(&mut self, sphere: bool) {
        self.config.sphere = sphere;
    }

    pub fn set_pixel_mode(&mut self, pixel_mode: bool) {
        self.config.pixel_mode = pixel_mode;
    }

    /// Use an absolute diameter, clamped to the configured limits
    pub fn set_absolute_diameter(&mut self, diameter_mm: f64) -> Result<()> {
        if !diameter_mm.is_finite() || diameter_mm <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "brush diameter {} must be positive",
                diameter_mm
            )));
        }
        self.config.diameter_mm = diameter_mm.clamp(self.config.min_diameter_mm, self.config.max_diameter_mm);
        self.config.diameter_is_relative = false;
        Ok(())
    }

    /// Use a diameter relative to the view size
    pub fn set_relative_diameter(&mut self, percent: f64) -> Result<()> {
        if !percent.is_finite() || percent <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "relative brush diameter {}% must be positive",
                percent
            )));
        }
        self.config.relative_diameter_percent = percent.min(100.0);
        self.config.diameter_is_relative = true;
        Ok(())
    }

    /// Grow or shrink the brush by `factor`, keeping it within limits
    pub fn scale_diameter(&mut self, factor: f64) -> Result<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "scale factor {} must be positive",
                factor
            )));
        }
        if self.config.diameter_is_relative {
            self.config.relative_diameter_percent =
                (self.config.relative_diameter_percent * factor).clamp(0.01, 100.0);
        } else {
            self.config.diameter_mm = (self.config.diameter_mm * factor)
                .clamp(self.config.min_diameter_mm, self.config.max_diameter_mm);
        }
        Ok(())
    }

    /// Effective brush diameter in mm for `view`
    pub fn diameter_mm(&self, view: &View) -> f64 {
        let diameter = if self.config.diameter_is_relative {
            let (viewport, mm_per_pixel) = match view {
                View::Slice(slice) => (slice.viewport, slice.mm_per_pixel()),
                View::Camera(camera) => (camera.viewport, camera.world_per_pixel()),
            };
            let pixels = viewport[0].min(viewport[1]) as f64;
            self.config.relative_diameter_percent / 100.0 * pixels * mm_per_pixel
        } else {
            self.config.diameter_mm
        };
        diameter.clamp(self.config.min_diameter_mm, self.config.max_diameter_mm)
    }

    /// Closed brush surface centered at `center` (RAS).
    ///
    /// Slice views get a cylinder one slice thick along the slice normal
    /// unless the sphere brush is selected; camera views always use a sphere.
    pub fn stamp_mesh(&self, center: Vector3<f64>, view: &View, reference: &ImageGeometry) -> Result<Mesh> {
        let radius = 0.5 * self.diameter_mm(view);
        match view {
            View::Slice(slice) if !self.config.sphere => Mesh::cylinder(
                center,
                slice.normal()?,
                radius,
                slice.slice_spacing_for(reference),
                self.config.resolution,
            ),
            _ => Mesh::sphere(center, radius, self.config.resolution),
        }
    }

    /// Pick points plus interpolated samples wherever consecutive points are
    /// farther apart than the sampling distance.
    ///
    /// At most [`MAX_SAMPLES_PER_SEGMENT`] samples are placed between two
    /// points; beyond that the spacing grows.
    pub fn stroke_samples(&self, points: &[Vector3<f64>], view: &View) -> Vec<Vector3<f64>> {
        let step = self.config.stroke_sampling_fraction * self.diameter_mm(view);
        let mut samples = Vec::with_capacity(points.len());
        for (index, point) in points.iter().enumerate() {
            if index > 0 && step > 0.0 {
                let previous = points[index - 1];
                let distance = (point - previous).norm();
                let steps = ((distance / step).ceil() as usize).min(MAX_SAMPLES_PER_SEGMENT);
                for s in 1..steps {
                    samples.push(previous + (point - previous) * (s as f64 / steps as f64));
                }
            }
            samples.push(*point);
        }
        samples
    }

    /// Rasterize a stroke through `points` (RAS) into `modifier`.
    ///
    /// The modifier is reset to the segmentation's reference lattice. Returns
    /// the extent touched by the stroke, empty when nothing was painted.
    pub fn paint_stroke(
        &self,
        points: &[Vector3<f64>],
        view: &View,
        segmentation: &Segmentation,
        modifier: &mut VoxelGrid<u8>,
    ) -> Result<Extent> {
        let frame = TargetFrame::of(segmentation)?;
        modifier.reset(frame.geometry);
        let full = frame.geometry.extent();

        let mut touched = Extent::empty();
        for sample in self.stroke_samples(points, view) {
            if self.config.pixel_mode {
                let ijk = round_index(transform_point(&frame.world_to_ijk, sample));
                if modifier.set(ijk, 1) {
                    touched.include_index(ijk);
                }
                continue;
            }
            let mesh = self.stamp_mesh(sample, view, &frame.geometry)?;
            let region = stencil_extent(&mesh, &frame.world_to_ijk).intersect(&full);
            if region.is_empty() {
                continue;
            }
            if rasterize_mesh(modifier, &mesh, &frame.world_to_ijk, 1, Some(&region)) > 0 {
                touched = touched.union(&region);
            }
        }
        log::debug!(
            "paint stroke: {} points, extent {:?}",
            points.len(),
            touched
        );
        Ok(touched)
    }
}

impl Default for PaintBrush {
    fn default() -> Self {
        Self::new(BrushConfig::default())
    }
}
