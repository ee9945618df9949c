use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Focal length, either one value for both axes or `[fx, fy]`.
///
/// Units are those of the sensor size. Without a sensor size the focal length is
/// normalized by the largest image dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FocalLength {
    Single(f64),
    Xy([f64; 2]),
}

impl FocalLength {
    pub fn xy(&self) -> (f64, f64) {
        match self {
            FocalLength::Single(f) => (*f, *f),
            FocalLength::Xy([fx, fy]) => (*fx, *fy),
        }
    }
}

impl Default for FocalLength {
    fn default() -> Self {
        FocalLength::Single(1.0)
    }
}

/// Lens distortion coefficients. Unset coefficients are zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortionCoeffs {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
    pub p1: f64,
    pub p2: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
    pub s4: f64,
}

impl DistortionCoeffs {
    /// `(name, value)` pairs in OpenCV order.
    pub fn named(&self) -> [(&'static str, f64); 12] {
        [
            ("k1", self.k1),
            ("k2", self.k2),
            ("p1", self.p1),
            ("p2", self.p2),
            ("k3", self.k3),
            ("k4", self.k4),
            ("k5", self.k5),
            ("k6", self.k6),
            ("s1", self.s1),
            ("s2", self.s2),
            ("s3", self.s3),
            ("s4", self.s4),
        ]
    }

    pub fn is_zero(&self) -> bool {
        self.named().iter().all(|(_, v)| *v == 0.0)
    }
}

/// Stopping rule for the numerical inverse of a distortion model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UndistortCriteria {
    pub max_iterations: u32,
    /// Residual, in source pixels, below which the solve has converged.
    pub tolerance_px: f64,
}

impl Default for UndistortCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            tolerance_px: 1e-3,
        }
    }
}

/// Pixel-scale camera matrix terms and image size.
///
/// Pixel coordinates use the centre convention: integer coordinate `i` is the
/// centre of pixel `i`, so the image centre is `((w - 1) / 2, (h - 1) / 2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl Intrinsics {
    /// Builds pixel-scale intrinsics from physical or normalized parameters.
    ///
    /// `offset` is the principal point offset from the image centre, in the units
    /// of `focal_len`.
    pub fn new(
        focal_len: FocalLength,
        im_size: (u32, u32),
        sensor_size: Option<(f64, f64)>,
        offset: (f64, f64),
    ) -> Result<Intrinsics> {
        let (width, height) = im_size;
        if width == 0 || height == 0 {
            return Err(Error::InvalidIntrinsics(format!(
                "image size must be non-zero, got {}x{}",
                width, height
            )));
        }
        let (f_x, f_y) = focal_len.xy();
        if !(f_x.is_finite() && f_y.is_finite() && f_x > 0.0 && f_y > 0.0) {
            return Err(Error::InvalidIntrinsics(format!(
                "focal length must be positive, got ({}, {})",
                f_x, f_y
            )));
        }
        let (scale_x, scale_y) = match sensor_size {
            Some((sw, sh)) => {
                if !(sw.is_finite() && sh.is_finite() && sw > 0.0 && sh > 0.0) {
                    return Err(Error::InvalidIntrinsics(format!(
                        "sensor size must be positive, got ({}, {})",
                        sw, sh
                    )));
                }
                (width as f64 / sw, height as f64 / sh)
            }
            None => {
                let s = width.max(height) as f64;
                (s, s)
            }
        };
        if !(offset.0.is_finite() && offset.1.is_finite()) {
            return Err(Error::InvalidIntrinsics(format!(
                "principal point offset must be finite, got {:?}",
                offset
            )));
        }
        Ok(Intrinsics {
            fx: f_x * scale_x,
            fy: f_y * scale_y,
            cx: (width as f64 - 1.0) / 2.0 + offset.0 * scale_x,
            cy: (height as f64 - 1.0) / 2.0 + offset.1 * scale_y,
            width,
            height,
        })
    }

    pub fn from_camera_matrix(k: &na::Matrix3<f64>, width: u32, height: u32) -> Result<Intrinsics> {
        let (fx, fy) = (k[(0, 0)], k[(1, 1)]);
        if !(fx > 0.0 && fy > 0.0) {
            return Err(Error::InvalidIntrinsics(format!(
                "camera matrix focal lengths must be positive, got ({}, {})",
                fx, fy
            )));
        }
        Ok(Intrinsics {
            fx,
            fy,
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            width,
            height,
        })
    }

    pub fn camera_matrix(&self) -> na::Matrix3<f64> {
        na::Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    pub fn pixel_to_normalized(&self, p: &na::Vector2<f64>) -> na::Vector2<f64> {
        na::Vector2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    pub fn normalized_to_pixel(&self, xy: &na::Vector2<f64>) -> na::Vector2<f64> {
        na::Vector2::new(self.fx * xy.x + self.cx, self.fy * xy.y + self.cy)
    }

    /// True when `p` lies on the image, `[-0.5, width - 0.5) x [-0.5, height - 0.5)`
    /// with integer coordinates at pixel centres.
    pub fn contains(&self, p: &na::Vector2<f64>) -> bool {
        p.x >= -0.5
            && p.y >= -0.5
            && p.x < self.width as f64 - 0.5
            && p.y < self.height as f64 - 0.5
    }
}
