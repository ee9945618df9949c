use nalgebra as na;

use crate::error::{Error, Result};
use crate::grid::{Extent, GeoTransform};
use crate::interp::{self, Interp};

/// Summary of the valid DEM cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// A single-band elevation grid with its ground-to-pixel transform.
///
/// Read-only once built; share it between workers behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Dem {
    data: na::DMatrix<f32>,
    transform: GeoTransform,
    inverse: GeoTransform,
    nodata: Option<f32>,
    stats: Option<DemStats>,
}

impl Dem {
    /// `data` is row-major, `height` rows of `width` elevations.
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<f32>,
        transform: GeoTransform,
        nodata: Option<f32>,
    ) -> Result<Dem> {
        if width == 0 || height == 0 || data.len() != width * height {
            return Err(Error::InvalidConfig(format!(
                "DEM of {}x{} cells needs {} values, got {}",
                width,
                height,
                width * height,
                data.len()
            )));
        }
        let inverse = transform.inverse().ok_or_else(|| {
            Error::InvalidConfig(format!("DEM transform is not invertible: {:?}", transform))
        })?;
        let mut dem = Dem {
            data: na::DMatrix::from_row_slice(height, width, &data),
            transform,
            inverse,
            nodata,
            stats: None,
        };
        dem.stats = dem.compute_stats();
        if let Some(stats) = &dem.stats {
            log::debug!(
                "DEM {}x{}: min {:.3}, max {:.3}, mean {:.3}",
                width,
                height,
                stats.min,
                stats.max,
                stats.mean
            );
        } else {
            log::warn!("DEM {}x{} has no valid cells", width, height);
        }
        Ok(dem)
    }

    fn compute_stats(&self) -> Option<DemStats> {
        let (mut min, mut max, mut sum, mut count) = (f64::MAX, f64::MIN, 0.0, 0usize);
        for row in 0..self.height() {
            for col in 0..self.width() {
                if let Some(z) = self.value(col, row) {
                    let z = z as f64;
                    min = min.min(z);
                    max = max.max(z);
                    sum += z;
                    count += 1;
                }
            }
        }
        (count > 0).then(|| DemStats {
            min,
            max,
            mean: sum / count as f64,
        })
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn nodata(&self) -> Option<f32> {
        self.nodata
    }

    pub fn stats(&self) -> Option<DemStats> {
        self.stats
    }

    /// Elevation of one cell, `None` for no-data.
    pub fn value(&self, col: usize, row: usize) -> Option<f32> {
        let z = self.data[(row, col)];
        if z.is_nan() || self.nodata.is_some_and(|nd| z == nd) {
            None
        } else {
            Some(z)
        }
    }

    /// Ground `(x, y)` to continuous corner-convention pixel `(col, row)`.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        self.inverse.pixel_to_world(x, y)
    }

    pub fn bounds(&self) -> Extent {
        let (w, h) = (self.width() as f64, self.height() as f64);
        let corners = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
            .map(|(c, r)| self.transform.pixel_to_world(c, r));
        // four finite corners always give an extent
        Extent::from_points(corners).unwrap_or(Extent {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 0.0,
            max_y: 0.0,
        })
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (col, row) = self.world_to_pixel(x, y);
        col >= 0.0 && row >= 0.0 && col < self.width() as f64 && row < self.height() as f64
    }

    /// Minimum valid elevation over the cells inside `extent`.
    pub fn min_within(&self, extent: &Extent) -> Option<f64> {
        let corners = [
            (extent.min_x, extent.min_y),
            (extent.max_x, extent.min_y),
            (extent.max_x, extent.max_y),
            (extent.min_x, extent.max_y),
        ]
        .map(|(x, y)| self.world_to_pixel(x, y));
        let window = Extent::from_points(corners)?;
        let col0 = window.min_x.floor().max(0.0) as usize;
        let row0 = window.min_y.floor().max(0.0) as usize;
        let col1 = (window.max_x.ceil().max(0.0) as usize).min(self.width());
        let row1 = (window.max_y.ceil().max(0.0) as usize).min(self.height());
        (row0..row1)
            .flat_map(|row| (col0..col1).map(move |col| (col, row)))
            .filter_map(|(col, row)| self.value(col, row))
            .map(|z| z as f64)
            .reduce(f64::min)
    }
}

/// Interpolated terrain height lookups on a [`Dem`].
#[derive(Debug, Clone, Copy)]
pub struct ElevationSampler<'a> {
    dem: &'a Dem,
    interp: Interp,
    support: (f64, f64),
}

impl<'a> ElevationSampler<'a> {
    pub fn new(dem: &'a Dem, interp: Interp) -> ElevationSampler<'a> {
        ElevationSampler {
            dem,
            interp,
            support: (1.0, 1.0),
        }
    }

    /// Sets the area, in DEM pixels, that one query stands for. Only the
    /// `average` kernel uses it.
    pub fn with_support(mut self, support: (f64, f64)) -> ElevationSampler<'a> {
        self.support = support;
        self
    }

    pub fn dem(&self) -> &'a Dem {
        self.dem
    }

    pub fn interp(&self) -> Interp {
        self.interp
    }

    /// Terrain height at ground `(x, y)`. `None` outside the DEM or when the
    /// kernel neighbourhood touches a no-data cell.
    pub fn elevation_at(&self, x: f64, y: f64) -> Option<f64> {
        if !self.dem.contains(x, y) {
            return None;
        }
        let (col, row) = self.dem.world_to_pixel(x, y);
        interp::sample(
            self.interp,
            |c, r| self.dem.value(c, r).map(|z| z as f64),
            self.dem.width(),
            self.dem.height(),
            col - 0.5,
            row - 0.5,
            self.support,
        )
    }
}
