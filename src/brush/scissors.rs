use super::{TargetFrame, View};
use crate::config::ScissorsConfig;
use crate::engine::ModificationMode;
use crate::geometry::{xy_to_ras, CameraView, SliceView};
use crate::grid::VoxelGrid;
use crate::mesh::{Mesh, Outline};
use crate::segmentation::Segmentation;
use crate::stencil::{rasterize_mesh, stencil_extent};
use crate::types::{transform_point, BBox3, Extent};
use crate::{Error, Result};
use nalgebra::{Vector2, Vector3};
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Outline drawn by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScissorsShape {
    /// Freehand polyline, closed between the last and first point
    FreeForm,
    /// First point is the center, the latest point sets the radius
    Circle,
    /// First and latest point are opposite corners
    Rectangle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScissorsOperation {
    EraseInside,
    EraseOutside,
    FillInside,
    FillOutside,
}

impl ScissorsOperation {
    pub fn is_inside(self) -> bool {
        matches!(self, ScissorsOperation::EraseInside | ScissorsOperation::FillInside)
    }

    pub fn is_erase(self) -> bool {
        matches!(self, ScissorsOperation::EraseInside | ScissorsOperation::EraseOutside)
    }

    pub fn modification_mode(self) -> ModificationMode {
        if self.is_erase() {
            ModificationMode::Remove
        } else {
            ModificationMode::Add
        }
    }
}

/// Through-plane reach of a cut made in a slice view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SliceCutMode {
    /// Through the whole volume
    Unlimited,
    /// From the current slice along the slice normal
    Positive,
    /// From the current slice against the slice normal
    Negative,
    /// Slab of the configured depth centered on the current slice
    Symmetric,
}

/// Stencil produced by a cut
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScissorsEdit {
    pub mode: ModificationMode,
    /// Extent holding the stencil
    pub extent: Extent,
}

/// Scissors / rectangle gesture in progress
#[derive(Debug, Clone, PartialEq)]
pub struct ScissorsCut {
    config: ScissorsConfig,
    points: Vec<Vector2<f64>>,
}

impl ScissorsCut {
    pub fn new(config: ScissorsConfig) -> Self {
        Self {
            config,
            points: Vec::new(),
        }
    }

    pub fn config(&self) -> &ScissorsConfig {
        &self.config
    }

    pub fn set_shape(&mut self, shape: ScissorsShape) {
        self.config.shape = shape;
    }

    pub fn set_operation(&mut self, operation: ScissorsOperation) {
        self.config.operation = operation;
    }

    pub fn set_slice_cut_mode(&mut self, mode: SliceCutMode) {
        self.config.slice_cut_mode = mode;
    }

    pub fn set_slice_cut_depth(&mut self, depth_mm: f64) -> Result<()> {
        if !(depth_mm >= 0.0) || !depth_mm.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "slice cut depth {} must not be negative",
                depth_mm
            )));
        }
        self.config.slice_cut_depth_mm = depth_mm;
        Ok(())
    }

    /// Start a new gesture at `point` (view pixel coordinates)
    pub fn begin(&mut self, point: Vector2<f64>) {
        self.points.clear();
        self.points.push(point);
    }

    /// Extend the gesture to `point`
    pub fn add_point(&mut self, point: Vector2<f64>) {
        match self.config.shape {
            ScissorsShape::FreeForm => self.points.push(point),
            ScissorsShape::Circle | ScissorsShape::Rectangle => {
                self.points.truncate(1);
                self.points.push(point);
            }
        }
    }

    /// Abandon the gesture without modifying anything
    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn points(&self) -> &[Vector2<f64>] {
        &self.points
    }

    /// Closed outline of the current gesture in view pixel coordinates
    pub fn outline(&self) -> Vec<Vector2<f64>> {
        match self.config.shape {
            ScissorsShape::FreeForm => self.points.clone(),
            ScissorsShape::Circle => {
                let (Some(&center), Some(&edge)) = (self.points.first(), self.points.get(1)) else {
                    return Vec::new();
                };
                let radius = (edge - center).norm();
                let n = self.config.circle_points.max(3);
                (0..n)
                    .map(|i| {
                        let phi = 2.0 * PI * i as f64 / n as f64;
                        center + Vector2::new(phi.cos(), phi.sin()) * radius
                    })
                    .collect()
            }
            ScissorsShape::Rectangle => {
                let (Some(&a), Some(&b)) = (self.points.first(), self.points.get(1)) else {
                    return Vec::new();
                };
                vec![
                    Vector2::new(a.x, a.y),
                    Vector2::new(b.x, a.y),
                    Vector2::new(b.x, b.y),
                    Vector2::new(a.x, b.y),
                ]
            }
        }
    }

    /// Rasterize the cut into `modifier` on the segmentation's reference
    /// lattice.
    ///
    /// Returns `None` when the outline or its depth range is degenerate; the
    /// modifier is left untouched then.
    pub fn cut(
        &self,
        view: &View,
        segmentation: &Segmentation,
        modifier: &mut VoxelGrid<u8>,
    ) -> Result<Option<ScissorsEdit>> {
        let frame = TargetFrame::of(segmentation)?;
        let outline = match Outline::new(&self.outline()) {
            Ok(outline) => outline.into_counter_clockwise(),
            Err(Error::DegenerateGeometry(reason)) => {
                log::debug!("scissors: no stencil ({})", reason);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let mesh = match view {
            View::Slice(slice) => self.slice_prism(&outline, slice, &frame)?,
            View::Camera(camera) => camera_frustum(&outline, camera, &frame)?,
        };
        let Some(mesh) = mesh else {
            return Ok(None);
        };

        let operation = self.config.operation;
        let full = frame.geometry.extent();
        let extent = if operation.is_inside() {
            let region = stencil_extent(&mesh, &frame.world_to_ijk).intersect(&full);
            modifier.reset(frame.geometry.with_extent(region));
            rasterize_mesh(modifier, &mesh, &frame.world_to_ijk, 1, None);
            region
        } else {
            modifier.reset(frame.geometry);
            match view {
                View::Slice(slice) => self.fill_cut_side(modifier, slice, &frame)?,
                View::Camera(_) => modifier.fill(1),
            }
            rasterize_mesh(modifier, &mesh, &frame.world_to_ijk, 0, None);
            full
        };
        log::debug!(
            "scissors {:?} {:?}: {} voxels in {:?}",
            self.config.shape,
            operation,
            modifier.count_set(),
            extent
        );
        Ok(Some(ScissorsEdit {
            mode: operation.modification_mode(),
            extent,
        }))
    }

    fn slice_prism(&self, outline: &Outline, view: &SliceView, frame: &TargetFrame) -> Result<Option<Mesh>> {
        let Some((near, far)) = self.slice_depth_range(view, frame)? else {
            log::debug!("scissors: slice lies outside the volume on the cut side");
            return Ok(None);
        };
        let points: Vec<Vector3<f64>> = outline
            .vertices()
            .iter()
            .map(|p| xy_to_ras(view, *p))
            .collect();
        Mesh::prism(&points, view.normal()?, near, far).map(Some)
    }

    /// Prism depth range along the slice normal, measured from the slice
    /// plane and padded by half a slice so boundary slices are included
    fn slice_depth_range(&self, view: &SliceView, frame: &TargetFrame) -> Result<Option<(f64, f64)>> {
        let normal = view.normal()?;
        let half_slice = 0.5 * view.slice_spacing_for(&frame.geometry);
        let (min, max) = depth_bounds(&frame.world_bounds, view.origin(), normal);
        let (near, far) = match self.config.slice_cut_mode {
            SliceCutMode::Unlimited => (min - half_slice, max + half_slice),
            SliceCutMode::Positive => (-half_slice, max + half_slice),
            SliceCutMode::Negative => (min - half_slice, half_slice),
            SliceCutMode::Symmetric => {
                let half = (0.5 * self.config.slice_cut_depth_mm).max(half_slice);
                (-half, half)
            }
        };
        Ok((far > near).then_some((near, far)))
    }

    /// Region an outside cut may touch: the whole lattice, or only the cut
    /// side of the slice plane for one-sided modes
    fn fill_cut_side(&self, modifier: &mut VoxelGrid<u8>, view: &SliceView, frame: &TargetFrame) -> Result<()> {
        let mode = self.config.slice_cut_mode;
        if !matches!(mode, SliceCutMode::Positive | SliceCutMode::Negative) {
            modifier.fill(1);
            return Ok(());
        }
        let normal = view.normal()?;
        let origin = view.origin();
        let half_slice = 0.5 * view.slice_spacing_for(&frame.geometry);
        let extent = modifier.extent();
        for (ijk, value) in extent.iter().zip(modifier.data_mut().iter_mut()) {
            let index = Vector3::new(ijk[0] as f64, ijk[1] as f64, ijk[2] as f64);
            let depth = (transform_point(&frame.ijk_to_world, index) - origin).dot(&normal);
            let inside = match mode {
                SliceCutMode::Positive => depth >= -half_slice,
                _ => depth <= half_slice,
            };
            *value = u8::from(inside);
        }
        Ok(())
    }
}

impl Default for ScissorsCut {
    fn default() -> Self {
        Self::new(ScissorsConfig::default())
    }
}

/// Frustum (or prism for parallel projection) behind the outline, clipped to
/// the camera clipping range and the volume's depth range
fn camera_frustum(outline: &Outline, camera: &CameraView, frame: &TargetFrame) -> Result<Option<Mesh>> {
    let dop = camera.direction_of_projection()?;
    let (min, max) = depth_bounds(&frame.world_bounds, camera.position, dop);
    let near = (min - 0.5).max(camera.clipping_range[0]);
    let far = (max + 0.5).min(camera.clipping_range[1]);
    if far <= near || (!camera.parallel_projection && near <= 0.0) {
        log::debug!("scissors: volume outside the clipping range [{}, {}]", near, far);
        return Ok(None);
    }

    let focal = outline
        .vertices()
        .iter()
        .map(|p| camera.display_to_focal_plane(*p))
        .collect::<Result<Vec<_>>>()?;
    let ring = |depth: f64| -> Result<Vec<Vector3<f64>>> {
        focal.iter().map(|p| camera.point_at_depth(*p, depth)).collect()
    };
    Mesh::loft(&ring(near)?, &ring(far)?, &outline.triangulate()).map(Some)
}

/// Signed distance range of the box corners from `origin` along `axis`
fn depth_bounds(bounds: &BBox3, origin: Vector3<f64>, axis: Vector3<f64>) -> (f64, f64) {
    bounds
        .corners()
        .iter()
        .map(|corner| (corner - origin).dot(&axis))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| (lo.min(d), hi.max(d)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ImageGeometry;

    /// 12 x 12 x 10 volume with 1 mm voxels, k = 0 at z = 0
    fn segmentation() -> Segmentation {
        let geometry = ImageGeometry::axis_aligned(Vector3::zeros(), Vector3::repeat(1.0), [12, 12, 10]);
        Segmentation::new(geometry).expect("valid geometry")
    }

    fn slice_at(z: f64) -> SliceView {
        SliceView::axial(Vector3::new(0.0, 0.0, z), 1.0, [100, 100])
    }

    fn square_cut(config: ScissorsConfig) -> ScissorsCut {
        let mut cut = ScissorsCut::new(config);
        cut.begin(Vector2::new(2.0, 2.0));
        for p in [(6.0, 2.0), (6.0, 6.0), (2.0, 6.0)] {
            cut.add_point(Vector2::new(p.0, p.1));
        }
        cut
    }

    #[test]
    fn test_outline_shapes() {
        let mut cut = ScissorsCut::default();
        cut.set_shape(ScissorsShape::Rectangle);
        cut.begin(Vector2::new(0.0, 0.0));
        assert!(cut.outline().is_empty());
        cut.add_point(Vector2::new(5.0, 5.0));
        cut.add_point(Vector2::new(10.0, 4.0));
        assert_eq!(cut.points().len(), 2);
        assert_eq!(cut.outline()[2], Vector2::new(10.0, 4.0));

        cut.set_shape(ScissorsShape::Circle);
        let outline = cut.outline();
        assert_eq!(outline.len(), 72);
        let radius: f64 = Vector2::new(10.0_f64, 4.0).norm();
        assert!(outline.iter().all(|p| (p.norm() - radius).abs() < 1e-9));
    }

    #[test]
    fn test_depth_ranges_per_mode() {
        let seg = segmentation();
        let frame = TargetFrame::of(&seg).expect("linear frame");
        let view = slice_at(4.0);
        // volume spans z in [-0.5, 9.5]
        let mut cut = ScissorsCut::default();
        let range = |cut: &ScissorsCut| cut.slice_depth_range(&view, &frame).expect("valid view");

        assert_eq!(range(&cut), Some((-5.0, 6.0)));
        cut.set_slice_cut_mode(SliceCutMode::Positive);
        assert_eq!(range(&cut), Some((-0.5, 6.0)));
        cut.set_slice_cut_mode(SliceCutMode::Negative);
        assert_eq!(range(&cut), Some((-5.0, 0.5)));
        cut.set_slice_cut_mode(SliceCutMode::Symmetric);
        assert_eq!(range(&cut), Some((-0.5, 0.5)));
        cut.set_slice_cut_depth(4.0).expect("valid depth");
        assert_eq!(range(&cut), Some((-2.0, 2.0)));
    }

    #[test]
    fn test_fill_inside_positive_cut() {
        let seg = segmentation();
        let mut config = ScissorsConfig::default();
        config.operation = ScissorsOperation::FillInside;
        config.slice_cut_mode = SliceCutMode::Positive;
        let cut = square_cut(config);
        let mut modifier = VoxelGrid::new(*seg.reference_geometry());
        let edit = cut
            .cut(&View::Slice(slice_at(4.0)), &seg, &mut modifier)
            .expect("cut")
            .expect("stencil");
        assert_eq!(edit.mode, ModificationMode::Add);
        // slice at k = 4, cut reaches to the far end of the volume
        assert!(modifier.set_voxels().all(|[_, _, k]| k >= 4));
        assert!(modifier.value([4, 4, 9]) == 1 && modifier.value([4, 4, 4]) == 1);
        assert_eq!(modifier.value([4, 4, 3]), 0);
    }

    #[test]
    fn test_erase_outside_negative_keeps_other_side() {
        let seg = segmentation();
        let mut config = ScissorsConfig::default();
        config.operation = ScissorsOperation::EraseOutside;
        config.slice_cut_mode = SliceCutMode::Negative;
        let cut = square_cut(config);
        let mut modifier = VoxelGrid::new(*seg.reference_geometry());
        let edit = cut
            .cut(&View::Slice(slice_at(4.0)), &seg, &mut modifier)
            .expect("cut")
            .expect("stencil");
        assert_eq!(edit.mode, ModificationMode::Remove);
        assert_eq!(edit.extent, seg.reference_geometry().extent());
        assert_eq!(modifier.value([0, 0, 0]), 1, "outside the outline, on the cut side");
        assert_eq!(modifier.value([4, 4, 2]), 0, "inside the outline");
        assert_eq!(modifier.value([0, 0, 7]), 0, "beyond the slice on the protected side");
    }

    #[test]
    fn test_too_few_points_produce_no_stencil() {
        let seg = segmentation();
        let mut cut = ScissorsCut::default();
        cut.begin(Vector2::new(1.0, 1.0));
        cut.add_point(Vector2::new(5.0, 1.0));
        let mut modifier = VoxelGrid::new(*seg.reference_geometry());
        modifier.fill(1);
        let result = cut.cut(&View::Slice(slice_at(4.0)), &seg, &mut modifier).expect("no error");
        assert!(result.is_none());
        assert_eq!(modifier.count_set(), modifier.extent().voxel_count());
    }

    #[test]
    fn test_camera_cut_through_volume() {
        let seg = segmentation();
        let camera = CameraView {
            position: Vector3::new(5.5, 5.5, 50.0),
            focal_point: Vector3::new(5.5, 5.5, 4.5),
            view_up: Vector3::y(),
            clipping_range: [1.0, 200.0],
            parallel_projection: true,
            parallel_scale: 50.0,
            view_angle: 30.0,
            viewport: [100, 100],
        };
        let mut config = ScissorsConfig::default();
        config.operation = ScissorsOperation::FillInside;
        let mut cut = ScissorsCut::new(config);
        cut.set_shape(ScissorsShape::Rectangle);
        // one pixel per mm around the focal point at display (50, 50)
        cut.begin(Vector2::new(47.0, 47.0));
        cut.add_point(Vector2::new(53.0, 53.0));
        let mut modifier = VoxelGrid::new(*seg.reference_geometry());
        cut.cut(&View::Camera(camera), &seg, &mut modifier)
            .expect("cut")
            .expect("stencil");
        for k in 0..10 {
            assert_eq!(modifier.value([5, 5, k]), 1, "column filled at k = {}", k);
        }
        assert_eq!(modifier.value([0, 0, 5]), 0);
    }
}
