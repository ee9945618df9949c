use serde::{Deserialize, Serialize};

use crate::camera_model::{
    CameraType, DistortionCoeffs, FocalLength, GenericModel, Intrinsics, UndistortCriteria,
};
use crate::error::{Error, Result};
use crate::interp::Interp;
use crate::intersect::IntersectCriteria;
use crate::mapper::MapMode;
use crate::raster::DataType;
use crate::remap::RemapStrategy;

/// Camera interior orientation as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    #[serde(rename = "type")]
    pub camera_type: CameraType,
    pub focal_len: FocalLength,
    /// Sensor `[width, height]`, in the units of `focal_len`.
    pub sensor_size: Option<[f64; 2]>,
    /// Image `[width, height]` in pixels. Taken from the source image when unset.
    pub im_size: Option<[u32; 2]>,
    /// Principal point offset from the image centre, in `focal_len` units.
    pub cx: f64,
    pub cy: f64,
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

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            camera_type: CameraType::Pinhole,
            focal_len: FocalLength::Single(50.0),
            sensor_size: Some([36.0, 24.0]),
            im_size: None,
            cx: 0.0,
            cy: 0.0,
            k1: 0.0,
            k2: 0.0,
            k3: 0.0,
            k4: 0.0,
            k5: 0.0,
            k6: 0.0,
            p1: 0.0,
            p2: 0.0,
            s1: 0.0,
            s2: 0.0,
            s3: 0.0,
            s4: 0.0,
        }
    }
}

impl CameraConfig {
    pub fn distortion(&self) -> DistortionCoeffs {
        DistortionCoeffs {
            k1: self.k1,
            k2: self.k2,
            k3: self.k3,
            k4: self.k4,
            k5: self.k5,
            k6: self.k6,
            p1: self.p1,
            p2: self.p2,
            s1: self.s1,
            s2: self.s2,
            s3: self.s3,
            s4: self.s4,
        }
    }

    /// Intrinsics for an image of `im_size`, which must agree with a
    /// configured `im_size`.
    pub fn intrinsics(&self, im_size: (u32, u32)) -> Result<Intrinsics> {
        if let Some([w, h]) = self.im_size {
            if (w, h) != im_size {
                return Err(Error::ImageSizeMismatch {
                    expected: (w, h),
                    actual: im_size,
                });
            }
        }
        Intrinsics::new(
            self.focal_len,
            im_size,
            self.sensor_size.map(|[w, h]| (w, h)),
            (self.cx, self.cy),
        )
    }

    pub fn build(&self, im_size: (u32, u32), criteria: UndistortCriteria) -> Result<GenericModel> {
        GenericModel::new(
            self.camera_type,
            self.intrinsics(im_size)?,
            &self.distortion(),
            criteria,
        )
    }
}

/// Orthorectification options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrthoConfig {
    /// Output cell size `[x, y]` in ground units.
    pub resolution: [f64; 2],
    pub dem_interp: Interp,
    /// 1-based DEM band.
    pub dem_band: usize,
    pub interp: Interp,
    /// Project through the full distortion model rather than pre-undistorting
    /// the source image.
    pub full_remap: bool,
    pub per_band: bool,
    /// Output data type. The source type when unset.
    pub dtype: Option<DataType>,
    /// Output nodata. The output type's default when unset.
    pub nodata: Option<f64>,
    pub write_mask: bool,
    /// Tile `[width, height]` in output cells.
    pub tile_size: [usize; 2],
    pub undistort: UndistortCriteria,
    pub intersect: IntersectCriteria,
}

impl Default for OrthoConfig {
    fn default() -> Self {
        OrthoConfig {
            resolution: [0.5, 0.5],
            dem_interp: Interp::CubicSpline,
            dem_band: 1,
            interp: Interp::Bilinear,
            full_remap: true,
            per_band: false,
            dtype: None,
            nodata: None,
            write_mask: true,
            tile_size: [512, 512],
            undistort: UndistortCriteria::default(),
            intersect: IntersectCriteria::default(),
        }
    }
}

impl OrthoConfig {
    pub fn map_mode(&self) -> MapMode {
        if self.full_remap {
            MapMode::FullModel
        } else {
            MapMode::UndistortedPinhole
        }
    }

    pub fn remap_strategy(&self) -> RemapStrategy {
        if self.per_band {
            RemapStrategy::PerBand
        } else {
            RemapStrategy::WholeImage
        }
    }

    pub fn validate(&self) -> Result<()> {
        let [rx, ry] = self.resolution;
        if !(rx.is_finite() && ry.is_finite() && rx > 0.0 && ry > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "resolution must be positive, got {:?}",
                self.resolution
            )));
        }
        if self.dem_band == 0 {
            return Err(Error::InvalidConfig(
                "dem_band is 1-based and must be at least 1".to_string(),
            ));
        }
        if !self.interp.supports_image() {
            return Err(Error::InvalidConfig(format!(
                "{} interpolation is not supported for image resampling",
                self.interp
            )));
        }
        if self.tile_size.iter().any(|s| *s == 0) {
            return Err(Error::InvalidConfig(format!(
                "tile_size must be non-zero, got {:?}",
                self.tile_size
            )));
        }
        if self.undistort.max_iterations == 0
            || !(self.undistort.tolerance_px.is_finite() && self.undistort.tolerance_px > 0.0)
        {
            return Err(Error::InvalidConfig(format!(
                "invalid undistort criteria {:?}",
                self.undistort
            )));
        }
        if self.intersect.max_iterations == 0
            || !(self.intersect.tolerance.is_finite() && self.intersect.tolerance > 0.0)
        {
            return Err(Error::InvalidConfig(format!(
                "invalid intersect criteria {:?}",
                self.intersect
            )));
        }
        if let (Some(dtype), Some(nodata)) = (self.dtype, self.nodata) {
            let (min, max) = dtype.range();
            if !nodata.is_nan() && (nodata < min || nodata > max) {
                return Err(Error::InvalidConfig(format!(
                    "nodata {} is outside the {} range",
                    nodata, dtype
                )));
            }
        }
        Ok(())
    }
}

/// Everything read from or written to the configuration file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub camera: CameraConfig,
    pub ortho: OrthoConfig,
}
