use nalgebra as na;

use crate::error::{Error, Result};

/// Camera exterior orientation: position in the ground CRS and omega, phi, kappa
/// rotation in degrees.
///
/// The rotation follows the PATB convention `R = Rx(omega) * Ry(phi) * Rz(kappa)`
/// and is converted to OpenCV camera axes (x right, y down, z forward). With zero
/// rotation the camera looks straight down, image right is +x (east) and image
/// down is -y (south).
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    position: na::Vector3<f64>,
    opk_deg: [f64; 3],
    /// Camera frame to world frame.
    rotation: na::Rotation3<f64>,
}

impl Pose {
    pub fn new(position: [f64; 3], opk_deg: [f64; 3]) -> Result<Pose> {
        if position.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidPose(format!(
                "position must be finite, got {:?}",
                position
            )));
        }
        if opk_deg.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidPose(format!(
                "rotation must be finite, got {:?}",
                opk_deg
            )));
        }
        let [omega, phi, kappa] = opk_deg.map(f64::to_radians);
        let r_omega = na::Rotation3::from_axis_angle(&na::Vector3::x_axis(), omega);
        let r_phi = na::Rotation3::from_axis_angle(&na::Vector3::y_axis(), phi);
        let r_kappa = na::Rotation3::from_axis_angle(&na::Vector3::z_axis(), kappa);
        let patb_to_cv = na::Matrix3::from_diagonal(&na::Vector3::new(1.0, -1.0, -1.0));
        let rotation =
            na::Rotation3::from_matrix_unchecked((r_omega * r_phi * r_kappa).matrix() * patb_to_cv);
        Ok(Pose {
            position: na::Vector3::from(position),
            opk_deg,
            rotation,
        })
    }

    pub fn position(&self) -> &na::Vector3<f64> {
        &self.position
    }

    pub fn opk_deg(&self) -> [f64; 3] {
        self.opk_deg
    }

    pub fn rotation(&self) -> &na::Rotation3<f64> {
        &self.rotation
    }

    /// Camera-to-world rigid transform.
    pub fn isometry(&self) -> na::Isometry3<f64> {
        na::Isometry3::from_parts(
            na::Translation3::from(self.position),
            na::UnitQuaternion::from_rotation_matrix(&self.rotation),
        )
    }

    pub fn world_to_camera(&self, pt: &na::Vector3<f64>) -> na::Vector3<f64> {
        self.rotation.inverse() * (pt - self.position)
    }

    pub fn camera_to_world(&self, pt: &na::Vector3<f64>) -> na::Vector3<f64> {
        self.rotation * pt + self.position
    }

    /// Rotates a camera-frame direction into the world frame.
    pub fn direction_to_world(&self, dir: &na::Vector3<f64>) -> na::Vector3<f64> {
        self.rotation * dir
    }
}
