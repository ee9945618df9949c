use std::fmt;
use std::str::FromStr;

use nalgebra as na;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::intrinsics::{DistortionCoeffs, Intrinsics, UndistortCriteria};
use super::{Brown, Fisheye, OpenCVModel, Pinhole};
use crate::error::{Error, Result};
use crate::grid::CoordinateMap;

/// Smallest camera-frame depth that still projects.
const MIN_DEPTH: f64 = 1e-9;

pub trait CameraModel
where
    Self: Sync,
{
    fn intrinsics(&self) -> &Intrinsics;
    fn params(&self) -> na::DVector<f64>;
    fn param_count(&self) -> usize {
        self.params().len()
    }
    fn width(&self) -> f64 {
        self.intrinsics().width as f64
    }
    fn height(&self) -> f64 {
        self.intrinsics().height as f64
    }

    /// Maps an ideal (pinhole) normalized coordinate to a distorted normalized coordinate.
    fn distort(&self, xy: &na::Vector2<f64>) -> na::Vector2<f64>;

    /// Inverse of [`CameraModel::distort`]. `None` when the solve does not converge.
    fn undistort(&self, xy_d: &na::Vector2<f64>) -> Option<na::Vector2<f64>>;

    /// Camera-frame ray to distorted normalized image coordinate.
    fn project_normalized(&self, ray: &na::Vector3<f64>) -> Option<na::Vector2<f64>> {
        if ray.z <= MIN_DEPTH || !ray.iter().all(|v| v.is_finite()) {
            return None;
        }
        Some(self.distort(&na::Vector2::new(ray.x / ray.z, ray.y / ray.z)))
    }

    /// Camera-frame point to pixel coordinate. `None` behind the camera.
    fn project_one(&self, pt: &na::Vector3<f64>) -> Option<na::Vector2<f64>> {
        self.project_normalized(pt)
            .map(|xy| self.intrinsics().normalized_to_pixel(&xy))
    }

    /// Pixel coordinate to a unit ray in the camera frame.
    fn unproject_one(&self, pt: &na::Vector2<f64>) -> Option<na::Vector3<f64>> {
        let xy_d = self.intrinsics().pixel_to_normalized(pt);
        let xy = self.undistort(&xy_d)?;
        Some(na::Vector3::new(xy.x, xy.y, 1.0).normalize())
    }

    fn project(&self, p3d: &[na::Vector3<f64>]) -> Vec<Option<na::Vector2<f64>>> {
        p3d.par_iter()
            .map(|pt| {
                self.project_one(pt)
                    .filter(|p2d| self.intrinsics().contains(p2d))
            })
            .collect()
    }

    fn unproject(&self, p2d: &[na::Vector2<f64>]) -> Vec<Option<na::Vector3<f64>>> {
        p2d.par_iter()
            .map(|pt| {
                if self.intrinsics().contains(pt) {
                    self.unproject_one(pt)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Map from an undistorted image with camera matrix `projection_mat` and size
    /// `new_w_h` into this (distorted) camera's pixels.
    fn init_undistort_map(
        &self,
        projection_mat: &na::Matrix3<f64>,
        new_w_h: (u32, u32),
    ) -> CoordinateMap {
        self.init_undistort_map_region(
            projection_mat,
            (0, 0),
            (new_w_h.0 as usize, new_w_h.1 as usize),
        )
    }

    /// The `size` window at `offset` of [`CameraModel::init_undistort_map`].
    fn init_undistort_map_region(
        &self,
        projection_mat: &na::Matrix3<f64>,
        offset: (usize, usize),
        size: (usize, usize),
    ) -> CoordinateMap {
        let fx = projection_mat[(0, 0)];
        let fy = projection_mat[(1, 1)];
        let cx = projection_mat[(0, 2)];
        let cy = projection_mat[(1, 2)];
        CoordinateMap::from_par_fn(size.0, size.1, |c, r| {
            let (x, y) = ((offset.0 + c) as f64, (offset.1 + r) as f64);
            let ray = na::Vector3::new((x - cx) / fx, (y - cy) / fy, 1.0);
            self.project_one(&ray)
                .filter(|p2d| self.intrinsics().contains(p2d))
        })
    }
}

/// Newton solve of `distort(xy) = xy_d` with a central-difference Jacobian.
///
/// Starts from the distorted point. Rejects solutions in a fold-over region
/// (non-positive Jacobian determinant, or a root pointing away from `xy_d`),
/// where the model is not invertible.
pub(crate) fn newton_undistort<F>(
    distort: F,
    xy_d: &na::Vector2<f64>,
    intrinsics: &Intrinsics,
    criteria: &UndistortCriteria,
) -> Option<na::Vector2<f64>>
where
    F: Fn(&na::Vector2<f64>) -> na::Vector2<f64>,
{
    let pixel_error = |xy: &na::Vector2<f64>| {
        let err = distort(xy) - xy_d;
        (na::Vector2::new(err.x * intrinsics.fx, err.y * intrinsics.fy).norm(), err)
    };
    let jacobian = |xy: &na::Vector2<f64>| {
        let h = 1e-7 * (1.0 + xy.norm());
        let dx = na::Vector2::new(h, 0.0);
        let dy = na::Vector2::new(0.0, h);
        let col0 = (distort(&(xy + dx)) - distort(&(xy - dx))) / (2.0 * h);
        let col1 = (distort(&(xy + dy)) - distort(&(xy - dy))) / (2.0 * h);
        na::Matrix2::from_columns(&[col0, col1])
    };

    let mut xy = *xy_d;
    for _ in 0..criteria.max_iterations {
        let (err_px, err) = pixel_error(&xy);
        if !err_px.is_finite() {
            return None;
        }
        if err_px < criteria.tolerance_px {
            break;
        }
        let step = jacobian(&xy).try_inverse()? * err;
        xy -= step;
    }
    let (err_px, _) = pixel_error(&xy);
    if err_px < criteria.tolerance_px && jacobian(&xy).determinant() > 0.0 && xy.dot(xy_d) >= 0.0 {
        Some(xy)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CameraType {
    #[default]
    #[serde(rename = "pinhole")]
    Pinhole,
    #[serde(rename = "brown")]
    Brown,
    #[serde(rename = "fisheye")]
    Fisheye,
    #[serde(rename = "opencv")]
    OpenCV,
}

impl CameraType {
    /// Distortion coefficients this camera type accepts.
    pub fn accepted_coeffs(&self) -> &'static [&'static str] {
        match self {
            CameraType::Pinhole => &[],
            CameraType::Brown => &["k1", "k2", "p1", "p2", "k3"],
            CameraType::Fisheye => &["k1", "k2", "k3", "k4"],
            CameraType::OpenCV => &[
                "k1", "k2", "p1", "p2", "k3", "k4", "k5", "k6", "s1", "s2", "s3", "s4",
            ],
        }
    }
}

impl FromStr for CameraType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pinhole" => Ok(CameraType::Pinhole),
            "brown" => Ok(CameraType::Brown),
            "fisheye" => Ok(CameraType::Fisheye),
            "opencv" => Ok(CameraType::OpenCV),
            _ => Err(Error::UnknownCameraType(s.to_string())),
        }
    }
}

impl fmt::Display for CameraType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CameraType::Pinhole => "pinhole",
            CameraType::Brown => "brown",
            CameraType::Fisheye => "fisheye",
            CameraType::OpenCV => "opencv",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub enum GenericModel {
    Pinhole(Pinhole),
    Brown(Brown),
    Fisheye(Fisheye),
    OpenCV(OpenCVModel),
}

macro_rules! dispatch {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            GenericModel::Pinhole($m) => $body,
            GenericModel::Brown($m) => $body,
            GenericModel::Fisheye($m) => $body,
            GenericModel::OpenCV($m) => $body,
        }
    };
}

impl GenericModel {
    /// Builds a camera of `camera_type`. A non-zero coefficient the type does
    /// not accept is a configuration error.
    pub fn new(
        camera_type: CameraType,
        intrinsics: Intrinsics,
        coeffs: &DistortionCoeffs,
        criteria: UndistortCriteria,
    ) -> Result<GenericModel> {
        let accepted = camera_type.accepted_coeffs();
        if let Some((name, value)) = coeffs
            .named()
            .into_iter()
            .find(|(name, value)| *value != 0.0 && !accepted.contains(name))
        {
            return Err(Error::InvalidIntrinsics(format!(
                "{} camera does not accept coefficient {} (= {})",
                camera_type, name, value
            )));
        }
        if let Some((name, _)) = coeffs.named().into_iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::InvalidIntrinsics(format!(
                "distortion coefficient {} is not finite",
                name
            )));
        }
        let model = match camera_type {
            CameraType::Pinhole => GenericModel::Pinhole(Pinhole::new(intrinsics)),
            CameraType::Brown => GenericModel::Brown(Brown::new(intrinsics, coeffs, criteria)),
            CameraType::Fisheye => {
                GenericModel::Fisheye(Fisheye::new(intrinsics, coeffs, criteria))
            }
            CameraType::OpenCV => {
                GenericModel::OpenCV(OpenCVModel::new(intrinsics, coeffs, criteria))
            }
        };
        Ok(model)
    }

    pub fn camera_type(&self) -> CameraType {
        match self {
            GenericModel::Pinhole(_) => CameraType::Pinhole,
            GenericModel::Brown(_) => CameraType::Brown,
            GenericModel::Fisheye(_) => CameraType::Fisheye,
            GenericModel::OpenCV(_) => CameraType::OpenCV,
        }
    }

    /// The distortion-free camera sharing this camera's intrinsics.
    pub fn to_pinhole(&self) -> GenericModel {
        GenericModel::Pinhole(Pinhole::new(*self.intrinsics()))
    }

    pub fn is_pinhole(&self) -> bool {
        matches!(self, GenericModel::Pinhole(_))
    }
}

impl CameraModel for GenericModel {
    fn intrinsics(&self) -> &Intrinsics {
        dispatch!(self, m => m.intrinsics())
    }
    fn params(&self) -> na::DVector<f64> {
        dispatch!(self, m => m.params())
    }
    fn distort(&self, xy: &na::Vector2<f64>) -> na::Vector2<f64> {
        dispatch!(self, m => m.distort(xy))
    }
    fn undistort(&self, xy_d: &na::Vector2<f64>) -> Option<na::Vector2<f64>> {
        dispatch!(self, m => m.undistort(xy_d))
    }
}
