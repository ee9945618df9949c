use super::generic::{CameraModel, newton_undistort};
use super::intrinsics::{DistortionCoeffs, Intrinsics, UndistortCriteria};
use super::opencv::distort_opencv;
use nalgebra as na;

/// Brown-Conrady model: radial k1, k2, k3 and tangential p1, p2.
///
/// Matches the 4 and 5 coefficient forms of the OpenCV model and ODM / OpenSfM
/// `brown` estimates.
#[derive(Debug, Clone)]
pub struct Brown {
    pub intrinsics: Intrinsics,
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub p1: f64,
    pub p2: f64,
    pub criteria: UndistortCriteria,
}

impl Brown {
    pub fn new(
        intrinsics: Intrinsics,
        coeffs: &DistortionCoeffs,
        criteria: UndistortCriteria,
    ) -> Brown {
        Brown {
            intrinsics,
            k1: coeffs.k1,
            k2: coeffs.k2,
            k3: coeffs.k3,
            p1: coeffs.p1,
            p2: coeffs.p2,
            criteria,
        }
    }

    fn coeffs(&self) -> DistortionCoeffs {
        DistortionCoeffs {
            k1: self.k1,
            k2: self.k2,
            k3: self.k3,
            p1: self.p1,
            p2: self.p2,
            ..Default::default()
        }
    }
}

impl CameraModel for Brown {
    fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    fn params(&self) -> na::DVector<f64> {
        let i = &self.intrinsics;
        na::dvector![i.fx, i.fy, i.cx, i.cy, self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    fn distort(&self, xy: &na::Vector2<f64>) -> na::Vector2<f64> {
        distort_opencv(xy, &self.coeffs())
    }

    fn undistort(&self, xy_d: &na::Vector2<f64>) -> Option<na::Vector2<f64>> {
        let coeffs = self.coeffs();
        newton_undistort(
            |xy| distort_opencv(xy, &coeffs),
            xy_d,
            &self.intrinsics,
            &self.criteria,
        )
    }
}
