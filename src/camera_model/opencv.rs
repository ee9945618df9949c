use super::generic::{CameraModel, newton_undistort};
use super::intrinsics::{DistortionCoeffs, Intrinsics, UndistortCriteria};
use nalgebra as na;

/// OpenCV's general model: rational radial (k1..k6), tangential (p1, p2) and
/// thin prism (s1..s4) distortion.
#[derive(Debug, Clone)]
pub struct OpenCVModel {
    pub intrinsics: Intrinsics,
    pub coeffs: DistortionCoeffs,
    pub criteria: UndistortCriteria,
}

impl OpenCVModel {
    pub fn new(
        intrinsics: Intrinsics,
        coeffs: &DistortionCoeffs,
        criteria: UndistortCriteria,
    ) -> OpenCVModel {
        OpenCVModel {
            intrinsics,
            coeffs: *coeffs,
            criteria,
        }
    }
}

/// Forward OpenCV distortion of a normalized point. Coefficients left at zero
/// drop out, so the Brown-Conrady and pinhole models are special cases.
pub(crate) fn distort_opencv(xy: &na::Vector2<f64>, c: &DistortionCoeffs) -> na::Vector2<f64> {
    let (x, y) = (xy.x, xy.y);
    let r2 = x * x + y * y;
    let r4 = r2 * r2;
    let r6 = r4 * r2;
    let radial = (1.0 + c.k1 * r2 + c.k2 * r4 + c.k3 * r6) / (1.0 + c.k4 * r2 + c.k5 * r4 + c.k6 * r6);
    let xy2 = 2.0 * x * y;
    let xd = x * radial + c.p1 * xy2 + c.p2 * (r2 + 2.0 * x * x) + c.s1 * r2 + c.s2 * r4;
    let yd = y * radial + c.p1 * (r2 + 2.0 * y * y) + c.p2 * xy2 + c.s3 * r2 + c.s4 * r4;
    na::Vector2::new(xd, yd)
}

impl CameraModel for OpenCVModel {
    fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    fn params(&self) -> na::DVector<f64> {
        let i = &self.intrinsics;
        let c = &self.coeffs;
        na::dvector![
            i.fx, i.fy, i.cx, i.cy, c.k1, c.k2, c.p1, c.p2, c.k3, c.k4, c.k5, c.k6, c.s1, c.s2,
            c.s3, c.s4
        ]
    }

    fn distort(&self, xy: &na::Vector2<f64>) -> na::Vector2<f64> {
        distort_opencv(xy, &self.coeffs)
    }

    fn undistort(&self, xy_d: &na::Vector2<f64>) -> Option<na::Vector2<f64>> {
        newton_undistort(
            |xy| distort_opencv(xy, &self.coeffs),
            xy_d,
            &self.intrinsics,
            &self.criteria,
        )
    }
}
