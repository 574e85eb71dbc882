//! Conversions between view, world and voxel index coordinates
//!
//! Slice views are described by an `XY -> RAS` matrix: `(x, y)` are viewport
//! pixels and `z` selects the pane (slice offset) of a lightbox view.
//! Camera views describe a 3D renderer looking at the scene.
//!
//! Segmentations and source volumes may sit below a parent transform. Only
//! linear parents can be inverted here; non-linear ones are rejected with
//! [`Error::UnsupportedTransform`].

use crate::grid::ImageGeometry;
use crate::types::{round_index, transform_point, transform_vector};
use crate::{Error, Result};
use nalgebra::{Matrix4, Vector2, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Transform from a node's local frame to RAS world
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParentTransform {
    Identity,
    Linear(Matrix4<f64>),
    /// Deformable transform (grid, B-spline, ...); only its name is kept
    NonLinear(String),
}

impl ParentTransform {
    pub fn is_linear(&self) -> bool {
        !matches!(self, ParentTransform::NonLinear(_))
    }

    /// Local-to-world matrix
    pub fn to_world(&self) -> Result<Matrix4<f64>> {
        match self {
            ParentTransform::Identity => Ok(Matrix4::identity()),
            ParentTransform::Linear(matrix) => Ok(*matrix),
            ParentTransform::NonLinear(name) => Err(Error::UnsupportedTransform(format!(
                "parent transform '{}' is not linear",
                name
            ))),
        }
    }

    /// World-to-local matrix
    pub fn from_world(&self) -> Result<Matrix4<f64>> {
        self.to_world()?.try_inverse().ok_or_else(|| {
            Error::UnsupportedTransform("parent transform is not invertible".to_string())
        })
    }
}

impl Default for ParentTransform {
    fn default() -> Self {
        ParentTransform::Identity
    }
}

/// A 2D slice view
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SliceView {
    /// Viewport pixel (x, y, pane) to RAS
    pub xy_to_ras: Matrix4<f64>,
    /// Viewport size in pixels
    pub viewport: [u32; 2],
    /// Through-plane spacing; zero to derive it from the edited volume
    pub slice_spacing: f64,
}

impl SliceView {
    pub fn new(xy_to_ras: Matrix4<f64>, viewport: [u32; 2]) -> Self {
        Self {
            xy_to_ras,
            viewport,
            slice_spacing: 0.0,
        }
    }

    /// Axial view with `mm_per_pixel` scaling whose pixel (0, 0) maps to `origin`
    pub fn axial(origin: Vector3<f64>, mm_per_pixel: f64, viewport: [u32; 2]) -> Self {
        let mut xy_to_ras = Matrix4::identity() * mm_per_pixel;
        xy_to_ras[(3, 3)] = 1.0;
        xy_to_ras.fixed_view_mut::<3, 1>(0, 3).copy_from(&origin);
        Self::new(xy_to_ras, viewport)
    }

    pub fn with_slice_spacing(mut self, spacing: f64) -> Self {
        self.slice_spacing = spacing;
        self
    }

    /// Unit slice normal in RAS
    pub fn normal(&self) -> Result<Vector3<f64>> {
        let normal = transform_vector(&self.xy_to_ras, Vector3::z());
        let norm = normal.norm();
        if norm <= f64::EPSILON {
            return Err(Error::DegenerateGeometry(
                "slice view has no through-plane axis".to_string(),
            ));
        }
        Ok(normal / norm)
    }

    /// RAS position of the slice plane origin (pixel 0, 0 of pane 0)
    pub fn origin(&self) -> Vector3<f64> {
        xyz_to_ras(self, Vector3::zeros())
    }

    /// Physical size of one screen pixel
    pub fn mm_per_pixel(&self) -> f64 {
        transform_vector(&self.xy_to_ras, Vector3::x()).norm()
    }

    /// Slice spacing, derived from `geometry` when not set explicitly.
    ///
    /// The derived spacing is that of the image axis most aligned with the
    /// slice normal.
    pub fn slice_spacing_for(&self, geometry: &ImageGeometry) -> f64 {
        if self.slice_spacing > 0.0 {
            return self.slice_spacing;
        }
        let Ok(normal) = self.normal() else {
            return 1.0;
        };
        let directions = geometry.directions();
        let spacing = geometry.spacing();
        (0..3)
            .max_by(|&a, &b| {
                let da = directions.column(a).dot(&normal).abs();
                let db = directions.column(b).dot(&normal).abs();
                da.total_cmp(&db)
            })
            .map(|axis| spacing[axis])
            .unwrap_or(1.0)
    }
}

/// A 3D camera view
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraView {
    pub position: Vector3<f64>,
    pub focal_point: Vector3<f64>,
    pub view_up: Vector3<f64>,
    /// Near and far clipping distances along the direction of projection
    pub clipping_range: [f64; 2],
    pub parallel_projection: bool,
    /// Half height of the viewport in world units (parallel projection)
    pub parallel_scale: f64,
    /// Vertical view angle in degrees (perspective projection)
    pub view_angle: f64,
    /// Viewport size in pixels
    pub viewport: [u32; 2],
}

impl CameraView {
    /// Unit direction of projection
    pub fn direction_of_projection(&self) -> Result<Vector3<f64>> {
        let dop = self.focal_point - self.position;
        let norm = dop.norm();
        if norm <= f64::EPSILON {
            return Err(Error::DegenerateGeometry(
                "camera position coincides with focal point".to_string(),
            ));
        }
        Ok(dop / norm)
    }

    /// Orthonormal camera frame (right, up, direction of projection)
    pub fn frame(&self) -> Result<(Vector3<f64>, Vector3<f64>, Vector3<f64>)> {
        let dop = self.direction_of_projection()?;
        let right = dop.cross(&self.view_up);
        let norm = right.norm();
        if norm <= f64::EPSILON {
            return Err(Error::DegenerateGeometry(
                "view up is parallel to the direction of projection".to_string(),
            ));
        }
        let right = right / norm;
        let up = right.cross(&dop);
        Ok((right, up, dop))
    }

    pub fn focal_distance(&self) -> f64 {
        (self.focal_point - self.position).norm()
    }

    /// Size of one display pixel on the focal plane
    pub fn world_per_pixel(&self) -> f64 {
        let height = self.viewport[1].max(1) as f64;
        let half_height = if self.parallel_projection {
            self.parallel_scale
        } else {
            self.focal_distance() * (self.view_angle.to_radians() * 0.5).tan()
        };
        2.0 * half_height / height
    }

    /// World position of a display pixel on the focal plane.
    ///
    /// Display coordinates have their origin at the bottom-left corner.
    pub fn display_to_focal_plane(&self, display: Vector2<f64>) -> Result<Vector3<f64>> {
        let (right, up, _) = self.frame()?;
        let world_per_pixel = self.world_per_pixel();
        let dx = display.x - self.viewport[0] as f64 * 0.5;
        let dy = display.y - self.viewport[1] as f64 * 0.5;
        Ok(self.focal_point + right * (dx * world_per_pixel) + up * (dy * world_per_pixel))
    }

    /// Point at `depth` along the viewing ray through a focal-plane point.
    ///
    /// Depth is measured along the direction of projection from the camera.
    pub fn point_at_depth(&self, focal_plane_point: Vector3<f64>, depth: f64) -> Result<Vector3<f64>> {
        let dop = self.direction_of_projection()?;
        let focal_distance = self.focal_distance();
        if self.parallel_projection {
            Ok(focal_plane_point + dop * (depth - focal_distance))
        } else {
            let ray = focal_plane_point - self.position;
            Ok(self.position + ray * (depth / focal_distance))
        }
    }
}

/// Slice-view pixel to RAS (pane 0)
pub fn xy_to_ras(view: &SliceView, xy: Vector2<f64>) -> Vector3<f64> {
    xyz_to_ras(view, Vector3::new(xy.x, xy.y, 0.0))
}

/// Slice-view pixel plus pane index to RAS
pub fn xyz_to_ras(view: &SliceView, xyz: Vector3<f64>) -> Vector3<f64> {
    transform_point(&view.xy_to_ras, xyz)
}

/// RAS to slice-view pixel plus pane index
pub fn ras_to_xy(view: &SliceView, ras: Vector3<f64>) -> Result<Vector3<f64>> {
    let ras_to_xy = view.xy_to_ras.try_inverse().ok_or_else(|| {
        Error::DegenerateGeometry("slice view matrix is singular".to_string())
    })?;
    Ok(transform_point(&ras_to_xy, ras))
}

/// Matrix taking RAS positions to continuous voxel indices of `geometry`
/// living under `parent`
pub fn world_to_ijk_matrix(geometry: &ImageGeometry, parent: &ParentTransform) -> Result<Matrix4<f64>> {
    Ok(geometry.world_to_image()? * parent.from_world()?)
}

/// RAS position to continuous voxel index
pub fn ras_to_ijk(
    geometry: &ImageGeometry,
    parent: &ParentTransform,
    ras: Vector3<f64>,
) -> Result<Vector3<f64>> {
    Ok(transform_point(&world_to_ijk_matrix(geometry, parent)?, ras))
}

/// RAS position to nearest voxel index
pub fn world_to_ijk(
    geometry: &ImageGeometry,
    parent: &ParentTransform,
    ras: Vector3<f64>,
) -> Result<[i32; 3]> {
    Ok(round_index(ras_to_ijk(geometry, parent, ras)?))
}

/// Slice-view pixel plus pane index to nearest voxel index
pub fn xyz_to_ijk(
    view: &SliceView,
    xyz: Vector3<f64>,
    geometry: &ImageGeometry,
    parent: &ParentTransform,
) -> Result<[i32; 3]> {
    world_to_ijk(geometry, parent, xyz_to_ras(view, xyz))
}

/// Slice-view pixel (pane 0) to nearest voxel index
pub fn xy_to_ijk(
    view: &SliceView,
    xy: Vector2<f64>,
    geometry: &ImageGeometry,
    parent: &ParentTransform,
) -> Result<[i32; 3]> {
    xyz_to_ijk(view, Vector3::new(xy.x, xy.y, 0.0), geometry, parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> ImageGeometry {
        ImageGeometry::axis_aligned(Vector3::new(-10.0, -10.0, -10.0), Vector3::new(1.0, 1.0, 2.5), [21, 21, 9])
    }

    #[test]
    fn test_xy_ras_roundtrip() {
        let view = SliceView::axial(Vector3::new(-10.0, -10.0, 0.0), 0.5, [400, 300]);
        let ras = xy_to_ras(&view, Vector2::new(20.0, 40.0));
        assert!((ras - Vector3::new(0.0, 10.0, 0.0)).norm() < 1e-12);

        let xy = ras_to_xy(&view, ras).expect("invertible view");
        assert!((xy - Vector3::new(20.0, 40.0, 0.0)).norm() < 1e-9);
        assert!((view.mm_per_pixel() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_pane_index_moves_through_plane() {
        let view = SliceView::axial(Vector3::zeros(), 1.0, [100, 100]);
        let ras = xyz_to_ras(&view, Vector3::new(0.0, 0.0, 2.0));
        assert!((ras.z - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_xy_to_ijk_rounds_to_nearest() {
        let view = SliceView::axial(Vector3::zeros(), 1.0, [100, 100]);
        let ijk = xy_to_ijk(&view, Vector2::new(0.4, -0.6), &reference(), &ParentTransform::Identity)
            .expect("linear");
        assert_eq!(ijk, [10, 9, 4]);
    }

    #[test]
    fn test_linear_parent_is_inverted() {
        let mut shift = Matrix4::identity();
        shift[(0, 3)] = 5.0;
        let parent = ParentTransform::Linear(shift);
        let ijk = world_to_ijk(&reference(), &parent, Vector3::new(5.0, 0.0, 0.0)).expect("linear");
        assert_eq!(ijk, [10, 10, 4]);
    }

    #[test]
    fn test_non_linear_parent_rejected() {
        let parent = ParentTransform::NonLinear("bspline".to_string());
        let result = world_to_ijk(&reference(), &parent, Vector3::zeros());
        assert!(matches!(result, Err(Error::UnsupportedTransform(_))));
    }

    #[test]
    fn test_slice_spacing_from_geometry() {
        let view = SliceView::axial(Vector3::zeros(), 1.0, [100, 100]);
        assert!((view.slice_spacing_for(&reference()) - 2.5).abs() < 1e-12);
        let view = view.with_slice_spacing(0.75);
        assert!((view.slice_spacing_for(&reference()) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_camera_depth_parallel_and_perspective() {
        let mut camera = CameraView {
            position: Vector3::new(0.0, 0.0, 100.0),
            focal_point: Vector3::zeros(),
            view_up: Vector3::y(),
            clipping_range: [1.0, 1000.0],
            parallel_projection: true,
            parallel_scale: 50.0,
            view_angle: 30.0,
            viewport: [100, 100],
        };
        let center = camera
            .display_to_focal_plane(Vector2::new(50.0, 50.0))
            .expect("valid camera");
        assert!(center.norm() < 1e-9);

        let corner = camera
            .display_to_focal_plane(Vector2::new(100.0, 100.0))
            .expect("valid camera");
        let near = camera.point_at_depth(corner, 10.0).expect("valid camera");
        assert!((near.z - 90.0).abs() < 1e-9);
        assert!((near.x - corner.x).abs() < 1e-9, "parallel rays keep x");

        camera.parallel_projection = false;
        let corner = camera
            .display_to_focal_plane(Vector2::new(100.0, 100.0))
            .expect("valid camera");
        let half = camera.point_at_depth(corner, 50.0).expect("valid camera");
        assert!((half.x - corner.x * 0.5).abs() < 1e-9, "perspective rays converge");
    }
}
