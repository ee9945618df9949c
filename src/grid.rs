use nalgebra as na;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// GDAL-ordered affine transform from pixel `(col, row)` to ground `(x, y)`:
/// `x = g0 + col * g1 + row * g2`, `y = g3 + col * g4 + row * g5`.
///
/// Pixel coordinates here use the corner convention: `(0, 0)` is the top left
/// corner of the top left pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// North-up transform with its top left corner at `(west, north)`.
    pub fn from_origin(west: f64, north: f64, res_x: f64, res_y: f64) -> GeoTransform {
        GeoTransform([west, res_x, 0.0, north, 0.0, -res_y])
    }

    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let g = &self.0;
        (
            g[0] + col * g[1] + row * g[2],
            g[3] + col * g[4] + row * g[5],
        )
    }

    pub fn inverse(&self) -> Option<GeoTransform> {
        let g = &self.0;
        let det = g[1] * g[5] - g[2] * g[4];
        if det.abs() < f64::EPSILON || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        let a = g[5] * inv_det;
        let b = -g[2] * inv_det;
        let d = -g[4] * inv_det;
        let e = g[1] * inv_det;
        Some(GeoTransform([
            -(a * g[0] + b * g[3]),
            a,
            b,
            -(d * g[0] + e * g[3]),
            d,
            e,
        ]))
    }

    /// Ground size of one pixel along x and y.
    pub fn resolution(&self) -> (f64, f64) {
        let g = &self.0;
        (g[1].hypot(g[4]), g[2].hypot(g[5]))
    }
}

/// Axis-aligned ground rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn from_points<I>(points: I) -> Option<Extent>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        points.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => Extent {
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                },
                Some(e) => Extent {
                    min_x: e.min_x.min(x),
                    min_y: e.min_y.min(y),
                    max_x: e.max_x.max(x),
                    max_y: e.max_y.max(y),
                },
            })
        })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        let e = Extent {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        (e.min_x < e.max_x && e.min_y < e.max_y).then_some(e)
    }
}

/// A rectangular window of the ortho grid, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

/// The north-up output grid.
#[derive(Debug, Clone, PartialEq)]
pub struct OrthoGrid {
    pub extent: Extent,
    pub resolution: (f64, f64),
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
}

impl OrthoGrid {
    /// Grid covering `extent` with its origin at the top left corner.
    /// `width = ceil(extent width / resolution x)`, likewise for height.
    pub fn new(extent: Extent, resolution: (f64, f64)) -> Result<OrthoGrid> {
        let (res_x, res_y) = resolution;
        if !(res_x.is_finite() && res_y.is_finite() && res_x > 0.0 && res_y > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "resolution must be positive, got {:?}",
                resolution
            )));
        }
        if !(extent.width() > 0.0 && extent.height() > 0.0)
            || !extent.width().is_finite()
            || !extent.height().is_finite()
        {
            return Err(Error::DemCoverage(format!(
                "ortho extent is empty or unbounded: {:?}",
                extent
            )));
        }
        let width = ((extent.max_x - extent.min_x) / res_x).ceil() as usize;
        let height = ((extent.max_y - extent.min_y) / res_y).ceil() as usize;
        Ok(OrthoGrid {
            extent,
            resolution,
            width,
            height,
            transform: GeoTransform::from_origin(extent.min_x, extent.max_y, res_x, res_y),
        })
    }

    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform
            .pixel_to_world(col as f64 + 0.5, row as f64 + 0.5)
    }

    pub fn full_tile(&self) -> Tile {
        Tile {
            col_off: 0,
            row_off: 0,
            width: self.width,
            height: self.height,
        }
    }

    /// Row-major tiles of at most `tile_size` (width, height) cells.
    pub fn tiles(&self, tile_size: (usize, usize)) -> Vec<Tile> {
        tile_layout(self.width, self.height, tile_size)
    }
}

/// Row-major tiles of at most `tile_size` covering a `width` x `height` array.
pub fn tile_layout(width: usize, height: usize, tile_size: (usize, usize)) -> Vec<Tile> {
    let (tw, th) = (tile_size.0.max(1), tile_size.1.max(1));
    let mut tiles = Vec::new();
    for row_off in (0..height).step_by(th) {
        for col_off in (0..width).step_by(tw) {
            tiles.push(Tile {
                col_off,
                row_off,
                width: tw.min(width - col_off),
                height: th.min(height - row_off),
            });
        }
    }
    tiles
}

/// Source pixel coordinate per output cell, with its validity.
///
/// Matrices are `height` rows by `width` columns. Invalid cells hold NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateMap {
    pub map_x: na::DMatrix<f32>,
    pub map_y: na::DMatrix<f32>,
    pub valid: na::DMatrix<bool>,
}

impl CoordinateMap {
    fn from_cells(width: usize, height: usize, cells: Vec<Option<na::Vector2<f64>>>) -> CoordinateMap {
        let at = |r: usize, c: usize| cells[r * width + c];
        CoordinateMap {
            map_x: na::DMatrix::from_fn(height, width, |r, c| {
                at(r, c).map_or(f32::NAN, |p| p.x as f32)
            }),
            map_y: na::DMatrix::from_fn(height, width, |r, c| {
                at(r, c).map_or(f32::NAN, |p| p.y as f32)
            }),
            valid: na::DMatrix::from_fn(height, width, |r, c| at(r, c).is_some()),
        }
    }

    /// Builds a map from `f(col, row)` on the rayon pool.
    pub fn from_par_fn<F>(width: usize, height: usize, f: F) -> CoordinateMap
    where
        F: Fn(usize, usize) -> Option<na::Vector2<f64>> + Sync,
    {
        let cells: Vec<_> = (0..width * height)
            .into_par_iter()
            .map(|i| f(i % width, i / width))
            .collect();
        Self::from_cells(width, height, cells)
    }

    pub fn width(&self) -> usize {
        self.map_x.ncols()
    }

    pub fn height(&self) -> usize {
        self.map_x.nrows()
    }

    pub fn get(&self, col: usize, row: usize) -> Option<(f32, f32)> {
        if self.valid[(row, col)] {
            Some((self.map_x[(row, col)], self.map_y[(row, col)]))
        } else {
            None
        }
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    pub fn invalid_count(&self) -> usize {
        self.valid.len() - self.valid_count()
    }
}
