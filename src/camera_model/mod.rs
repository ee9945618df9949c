pub mod brown;
pub mod fisheye;
pub mod generic;
pub mod intrinsics;
pub mod opencv;
pub mod pinhole;

pub use brown::Brown;
pub use fisheye::Fisheye;
pub use generic::{CameraModel, CameraType, GenericModel};
pub use intrinsics::{DistortionCoeffs, FocalLength, Intrinsics, UndistortCriteria};
pub use opencv::OpenCVModel;
pub use pinhole::Pinhole;
