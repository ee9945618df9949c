use super::generic::CameraModel;
use super::intrinsics::Intrinsics;
use nalgebra as na;

#[derive(Debug, Clone)]
pub struct Pinhole {
    pub intrinsics: Intrinsics,
}

impl Pinhole {
    pub fn new(intrinsics: Intrinsics) -> Pinhole {
        Pinhole { intrinsics }
    }
}

impl CameraModel for Pinhole {
    fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    fn params(&self) -> na::DVector<f64> {
        let i = &self.intrinsics;
        na::dvector![i.fx, i.fy, i.cx, i.cy]
    }

    fn distort(&self, xy: &na::Vector2<f64>) -> na::Vector2<f64> {
        *xy
    }

    fn undistort(&self, xy_d: &na::Vector2<f64>) -> Option<na::Vector2<f64>> {
        Some(*xy_d)
    }
}
