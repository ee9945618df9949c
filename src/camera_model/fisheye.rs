use super::generic::CameraModel;
use super::intrinsics::{DistortionCoeffs, Intrinsics, UndistortCriteria};
use nalgebra as na;
use std::f64::consts::FRAC_PI_2;

/// OpenCV fisheye (Kannala-Brandt) model, distorting the incidence angle with k1..k4.
#[derive(Debug, Clone)]
pub struct Fisheye {
    pub intrinsics: Intrinsics,
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
    pub criteria: UndistortCriteria,
}

impl Fisheye {
    pub fn new(
        intrinsics: Intrinsics,
        coeffs: &DistortionCoeffs,
        criteria: UndistortCriteria,
    ) -> Fisheye {
        Fisheye {
            intrinsics,
            k1: coeffs.k1,
            k2: coeffs.k2,
            k3: coeffs.k3,
            k4: coeffs.k4,
            criteria,
        }
    }

    fn f(&self, theta: f64) -> f64 {
        let theta2 = theta * theta;
        let theta4 = theta2 * theta2;
        let theta6 = theta2 * theta4;
        let theta8 = theta2 * theta6;
        theta * (1.0 + self.k1 * theta2 + self.k2 * theta4 + self.k3 * theta6 + self.k4 * theta8)
    }

    fn df_dtheta(&self, theta: f64) -> f64 {
        let theta2 = theta * theta;
        let theta4 = theta2 * theta2;
        let theta6 = theta2 * theta4;
        let theta8 = theta2 * theta6;
        1.0 + 3.0 * self.k1 * theta2
            + 5.0 * self.k2 * theta4
            + 7.0 * self.k3 * theta6
            + 9.0 * self.k4 * theta8
    }
}

impl CameraModel for Fisheye {
    fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    fn params(&self) -> na::DVector<f64> {
        let i = &self.intrinsics;
        na::dvector![i.fx, i.fy, i.cx, i.cy, self.k1, self.k2, self.k3, self.k4]
    }

    fn distort(&self, xy: &na::Vector2<f64>) -> na::Vector2<f64> {
        let r = xy.norm();
        if r < 1e-12 {
            return *xy;
        }
        let theta_d = self.f(r.atan());
        xy * (theta_d / r)
    }

    fn undistort(&self, xy_d: &na::Vector2<f64>) -> Option<na::Vector2<f64>> {
        let theta_d = xy_d.norm();
        if theta_d < 1e-12 {
            return Some(*xy_d);
        }
        // residual tolerance in radians of distorted angle
        let tolerance = self.criteria.tolerance_px / self.intrinsics.fx.max(self.intrinsics.fy);
        let mut theta = theta_d.min(FRAC_PI_2 - 1e-6);
        let mut converged = false;
        for _ in 0..self.criteria.max_iterations {
            let residual = self.f(theta) - theta_d;
            if residual.abs() < tolerance {
                converged = true;
                break;
            }
            let slope = self.df_dtheta(theta);
            if slope <= 0.0 {
                return None;
            }
            theta -= residual / slope;
            if !theta.is_finite() {
                return None;
            }
        }
        if !converged && (self.f(theta) - theta_d).abs() >= tolerance {
            return None;
        }
        if !(0.0..FRAC_PI_2).contains(&theta) || self.df_dtheta(theta) <= 0.0 {
            return None;
        }
        let scaling = theta.tan() / theta_d;
        Some(xy_d * scaling)
    }
}
