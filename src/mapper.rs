use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::camera_model::{CameraModel, GenericModel};
use crate::error::{Error, Result};
use crate::grid::{CoordinateMap, Extent, OrthoGrid, Tile};
use crate::intersect::{intersect_plane, Intersection, RayTerrainIntersector};
use crate::pose::Pose;

/// How ortho cells are projected into the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapMode {
    /// Project through the full distortion model.
    #[default]
    FullModel,
    /// Project through the distortion-free camera into a source image that
    /// has already been remapped with [`OrthoGridMapper::undistort_map`].
    UndistortedPinhole,
}

/// Computes, for each ortho cell, the source pixel that sees it.
#[derive(Debug, Clone)]
pub struct OrthoGridMapper<'a> {
    /// Camera the grid is projected through.
    camera: GenericModel,
    /// Camera that took the source image.
    source_camera: GenericModel,
    pose: &'a Pose,
    intersector: RayTerrainIntersector<'a>,
    mode: MapMode,
}

impl<'a> OrthoGridMapper<'a> {
    pub fn new(
        camera: &GenericModel,
        pose: &'a Pose,
        intersector: RayTerrainIntersector<'a>,
        mode: MapMode,
    ) -> OrthoGridMapper<'a> {
        let projection = match mode {
            MapMode::FullModel => camera.clone(),
            MapMode::UndistortedPinhole => camera.to_pinhole(),
        };
        OrthoGridMapper {
            camera: projection,
            source_camera: camera.clone(),
            pose,
            intersector,
            mode,
        }
    }

    pub fn mode(&self) -> MapMode {
        self.mode
    }

    pub fn intersector(&self) -> &RayTerrainIntersector<'a> {
        &self.intersector
    }

    /// Source pixel seeing ground `(x, y)`.
    ///
    /// The terrain point under a cell centre is `(x, y, h(x, y))`, which is the
    /// fixed point the ray intersection converges to for that cell's ray.
    /// `None` outside DEM coverage, behind the camera, or outside the source.
    pub fn map_cell(&self, x: f64, y: f64) -> Option<na::Vector2<f64>> {
        let z = self.intersector.sampler().elevation_at(x, y)?;
        let p_cam = self.pose.world_to_camera(&na::Vector3::new(x, y, z));
        self.camera
            .project_one(&p_cam)
            .filter(|p| self.camera.intrinsics().contains(p))
    }

    pub fn map_tile(&self, grid: &OrthoGrid, tile: &Tile) -> CoordinateMap {
        let map = CoordinateMap::from_par_fn(tile.width, tile.height, |col, row| {
            let (x, y) = grid.cell_center(tile.col_off + col, tile.row_off + row);
            self.map_cell(x, y)
        });
        log::trace!(
            "tile ({}, {}) {}x{}: {} invalid cells",
            tile.col_off,
            tile.row_off,
            tile.width,
            tile.height,
            map.invalid_count()
        );
        map
    }

    pub fn map_grid(&self, grid: &OrthoGrid) -> CoordinateMap {
        self.map_tile(grid, &grid.full_tile())
    }

    /// False in full model mode, or for a pinhole camera.
    pub fn needs_undistort(&self) -> bool {
        self.mode == MapMode::UndistortedPinhole && !self.source_camera.is_pinhole()
    }

    /// Map from the undistorted source image into the distorted one. `None`
    /// when no pre-pass is needed.
    pub fn undistort_map(&self) -> Option<CoordinateMap> {
        let intrinsics = self.source_camera.intrinsics();
        self.needs_undistort().then(|| {
            self.source_camera.init_undistort_map(
                &intrinsics.camera_matrix(),
                (intrinsics.width, intrinsics.height),
            )
        })
    }

    /// One tile, in source pixels, of [`OrthoGridMapper::undistort_map`].
    pub fn undistort_tile(&self, tile: &Tile) -> CoordinateMap {
        let map = self.source_camera.init_undistort_map_region(
            &self.source_camera.intrinsics().camera_matrix(),
            (tile.col_off, tile.row_off),
            (tile.width, tile.height),
        );
        log::trace!(
            "undistort tile ({}, {}) {}x{}: {} invalid pixels",
            tile.col_off,
            tile.row_off,
            tile.width,
            tile.height,
            map.invalid_count()
        );
        map
    }

    /// World-space ray of a source pixel.
    pub fn pixel_ray(&self, pixel: &na::Vector2<f64>) -> Option<na::Vector3<f64>> {
        let ray = self.source_camera.unproject_one(pixel)?;
        Some(self.pose.direction_to_world(&ray))
    }

    /// Terrain point seen by a source pixel.
    pub fn trace_pixel(&self, pixel: &na::Vector2<f64>, seed: Option<f64>) -> Option<Intersection> {
        let dir = self.pixel_ray(pixel)?;
        self.intersector.intersect(self.pose.position(), &dir, seed)
    }

    /// Pixel-corner coordinates around the source image border, clockwise from
    /// the top left, with `samples_per_edge` points on each edge.
    pub fn boundary_pixels(&self, samples_per_edge: usize) -> Vec<na::Vector2<f64>> {
        let n = samples_per_edge.max(2);
        let intrinsics = self.source_camera.intrinsics();
        let (w, h) = (intrinsics.width as f64, intrinsics.height as f64);
        let (left, top, right, bottom) = (-0.5, -0.5, w - 0.5, h - 0.5);
        let lerp = |a: f64, b: f64, i: usize| a + (b - a) * i as f64 / (n - 1) as f64;
        let mut pixels = Vec::with_capacity(4 * (n - 1));
        for i in 0..n - 1 {
            pixels.push(na::Vector2::new(lerp(left, right, i), top));
        }
        for i in 0..n - 1 {
            pixels.push(na::Vector2::new(right, lerp(top, bottom, i)));
        }
        for i in 0..n - 1 {
            pixels.push(na::Vector2::new(lerp(right, left, i), bottom));
        }
        for i in 0..n - 1 {
            pixels.push(na::Vector2::new(left, lerp(bottom, top, i)));
        }
        pixels
    }

    /// Ground extent of the source image on the terrain.
    ///
    /// Border pixels are traced in order, each seeded with the previous ray's
    /// elevation. A ray that misses the DEM falls back to the plane at
    /// `fallback_z`.
    pub fn footprint(&self, samples_per_edge: usize, fallback_z: f64) -> Result<Extent> {
        let mut seed = None;
        let mut points = Vec::new();
        for pixel in self.boundary_pixels(samples_per_edge) {
            let dir = self.pixel_ray(&pixel).ok_or_else(|| {
                Error::DemCoverage(format!(
                    "source pixel ({:.1}, {:.1}) has no camera ray",
                    pixel.x, pixel.y
                ))
            })?;
            let origin = self.pose.position();
            let point = match self.intersector.intersect(origin, &dir, seed) {
                Some(hit) => {
                    seed = Some(hit.point.z);
                    hit.point
                }
                None => intersect_plane(origin, &dir, fallback_z).ok_or_else(|| {
                    Error::DemCoverage(format!(
                        "ray through source pixel ({:.1}, {:.1}) never reaches the ground",
                        pixel.x, pixel.y
                    ))
                })?,
            };
            points.push((point.x, point.y));
        }
        Extent::from_points(points)
            .filter(|e| e.width().is_finite() && e.height().is_finite())
            .ok_or_else(|| Error::DemCoverage("source footprint is unbounded".to_string()))
    }
}
