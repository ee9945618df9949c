/// The simple-ortho error type.
///
/// Per-pixel numerical failures (non-convergent undistortion, rays missing the
/// terrain, coordinates outside the source image) are never reported here: they
/// become invalid cells in the coordinate map and the output mask.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid camera intrinsics: {0}")]
    InvalidIntrinsics(String),
    #[error("invalid camera pose: {0}")]
    InvalidPose(String),
    #[error("unknown camera type: {0}")]
    UnknownCameraType(String),
    #[error("unknown interpolation type: {0}")]
    UnknownInterp(String),
    #[error("unknown data type: {0}")]
    UnknownDataType(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("DEM coverage: {0}")]
    DemCoverage(String),
    #[error("source image size {actual:?} does not match camera image size {expected:?}")]
    ImageSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("unsupported raster: {0}")]
    UnsupportedRaster(String),
    #[error("camera position and orientation file: {0}")]
    PoseFile(String),
    #[error("orthorectification cancelled")]
    Cancelled,
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("image error: {source}")]
    Image {
        #[from]
        source: image::ImageError,
    },
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("glob pattern error: {source}")]
    Glob {
        #[from]
        source: glob::PatternError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
