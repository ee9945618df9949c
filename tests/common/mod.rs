#![allow(dead_code)]

use simple_ortho::camera_model::{
    CameraType, DistortionCoeffs, FocalLength, GenericModel, Intrinsics, UndistortCriteria,
};
use simple_ortho::dem::Dem;
use simple_ortho::grid::GeoTransform;
use simple_ortho::pose::Pose;
use simple_ortho::raster::{BandData, Raster};

/// 50 mm lens on a 36 x 24 mm sensor.
pub fn frame_camera(camera_type: CameraType, coeffs: &DistortionCoeffs, w: u32, h: u32) -> GenericModel {
    let intrinsics = Intrinsics::new(
        FocalLength::Single(50.0),
        (w, h),
        Some((36.0, 24.0)),
        (0.0, 0.0),
    )
    .unwrap();
    GenericModel::new(camera_type, intrinsics, coeffs, UndistortCriteria::default()).unwrap()
}

pub fn pinhole_camera(w: u32, h: u32) -> GenericModel {
    frame_camera(CameraType::Pinhole, &DistortionCoeffs::default(), w, h)
}

/// Camera at `(0, 0, altitude)` looking straight down.
pub fn nadir_pose(altitude: f64) -> Pose {
    Pose::new([0.0, 0.0, altitude], [0.0, 0.0, 0.0]).unwrap()
}

/// DEM with `cell` sized cells and its top left corner at `(west, north)`,
/// holding `f(x, y)` at each cell centre.
pub fn dem_from_fn<F>(west: f64, north: f64, cell: f64, width: usize, height: usize, f: F) -> Dem
where
    F: Fn(f64, f64) -> f64,
{
    let transform = GeoTransform::from_origin(west, north, cell, cell);
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let (x, y) = transform.pixel_to_world(col as f64 + 0.5, row as f64 + 0.5);
            data.push(f(x, y) as f32);
        }
    }
    Dem::new(width, height, data, transform, None).unwrap()
}

/// Flat DEM at elevation `z` covering `[-half, half]` in x and y.
pub fn flat_dem(z: f64, half: f64, cell: f64) -> Dem {
    let n = (2.0 * half / cell).ceil() as usize;
    dem_from_fn(-half, half, cell, n, n, |_, _| z)
}

/// Single-band 8-bit raster holding `f(col, row)`.
pub fn raster_u8<F>(w: usize, h: usize, f: F) -> Raster
where
    F: Fn(usize, usize) -> u8,
{
    let data = (0..w * h).map(|i| f(i % w, i / w)).collect();
    Raster::from_bands(w, h, vec![BandData::U8(data)], None).unwrap()
}

/// Three-band 8-bit raster with distinct, never-zero band patterns.
pub fn rgb_u8(w: usize, h: usize) -> Raster {
    let band = |k: usize| {
        BandData::U8(
            (0..w * h)
                .map(|i| ((i % w + i / w + 37 * k) % 200 + 20) as u8)
                .collect(),
        )
    };
    Raster::from_bands(w, h, vec![band(0), band(1), band(2)], None).unwrap()
}
