use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rayon::prelude::*;

use crate::camera_model::{CameraModel, GenericModel};
use crate::config::OrthoConfig;
use crate::dem::{Dem, ElevationSampler};
use crate::error::{Error, Result};
use crate::grid::{tile_layout, Extent, GeoTransform, OrthoGrid, Tile};
use crate::intersect::RayTerrainIntersector;
use crate::mapper::OrthoGridMapper;
use crate::pose::Pose;
use crate::raster::Raster;
use crate::remap::{merge_mask, RemapStrategy, Remapper, MASK_VALID};

/// Points traced along each edge of the source image for its footprint.
const FOOTPRINT_SAMPLES_PER_EDGE: usize = 32;

/// The orthorectified image.
#[derive(Debug, Clone)]
pub struct OrthoOutput {
    pub raster: Raster,
    /// 255 for valid cells, 0 otherwise. `None` when masks are disabled.
    pub mask: Option<Vec<u8>>,
    pub grid: OrthoGrid,
    pub transform: GeoTransform,
}

/// Orthorectifies the images of one camera pose onto a shared DEM.
pub struct OrthoRectifier {
    camera: GenericModel,
    pose: Pose,
    dem: Arc<Dem>,
    config: OrthoConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl OrthoRectifier {
    pub fn new(
        camera: GenericModel,
        pose: Pose,
        dem: Arc<Dem>,
        config: OrthoConfig,
    ) -> Result<OrthoRectifier> {
        config.validate()?;
        if dem.stats().is_none() {
            return Err(Error::DemCoverage("DEM has no valid elevations".to_string()));
        }
        Ok(OrthoRectifier {
            camera,
            pose,
            dem,
            config,
            cancel: None,
        })
    }

    /// Aborts [`OrthoRectifier::process`] between tiles once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> OrthoRectifier {
        self.cancel = Some(flag);
        self
    }

    pub fn camera(&self) -> &GenericModel {
        &self.camera
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn config(&self) -> &OrthoConfig {
        &self.config
    }

    fn mapper(&self) -> OrthoGridMapper<'_> {
        let [rx, ry] = self.config.resolution;
        let (dx, dy) = self.dem.transform().resolution();
        let sampler = ElevationSampler::new(&self.dem, self.config.dem_interp)
            .with_support((rx / dx, ry / dy));
        let intersector = RayTerrainIntersector::new(sampler, self.config.intersect);
        OrthoGridMapper::new(&self.camera, &self.pose, intersector, self.config.map_mode())
    }

    /// Ground extent seen by the camera on the terrain.
    pub fn footprint(&self) -> Result<Extent> {
        let fallback_z = self.dem.stats().map_or(0.0, |s| s.min);
        self.mapper()
            .footprint(FOOTPRINT_SAMPLES_PER_EDGE, fallback_z)
    }

    /// Output grid over the footprint. Fails when the footprint misses the DEM.
    pub fn ortho_grid(&self) -> Result<OrthoGrid> {
        let footprint = self.footprint()?;
        if footprint.intersection(&self.dem.bounds()).is_none() {
            return Err(Error::DemCoverage(format!(
                "footprint {:?} does not overlap the DEM bounds {:?}",
                footprint,
                self.dem.bounds()
            )));
        }
        let [rx, ry] = self.config.resolution;
        OrthoGrid::new(footprint, (rx, ry))
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Orthorectifies `src`, which must have the camera's image size.
    pub fn process(&self, src: &Raster) -> Result<OrthoOutput> {
        let start = Instant::now();
        let intrinsics = self.camera.intrinsics();
        let expected = (intrinsics.width, intrinsics.height);
        let actual = (src.width() as u32, src.height() as u32);
        if expected != actual {
            return Err(Error::ImageSizeMismatch { expected, actual });
        }
        self.check_cancelled()?;

        let mapper = self.mapper();
        let now = Instant::now();
        let grid = self.ortho_grid()?;
        log::debug!(
            "ortho grid {}x{} over {:?} in {:.3}s",
            grid.width,
            grid.height,
            grid.extent,
            now.elapsed().as_secs_f64()
        );

        let undistorted = self.undistort_source(&mapper, src)?;
        let (src, src_mask) = match &undistorted {
            Some((raster, mask)) => (raster, Some(mask.as_slice())),
            None => (src, None),
        };

        let dtype = self.config.dtype.unwrap_or(src.dtype());
        let remapper = Remapper::new(
            self.config.interp,
            dtype,
            self.config.nodata,
            self.config.remap_strategy(),
        )?;
        let output = Mutex::new((
            Raster::new(
                grid.width,
                grid.height,
                src.band_count(),
                dtype,
                Some(remapper.nodata()),
            ),
            vec![MASK_VALID; grid.width * grid.height],
        ));

        let now = Instant::now();
        let [tw, th] = self.config.tile_size;
        let tiles = grid.tiles((tw, th));
        match remapper.strategy() {
            RemapStrategy::WholeImage => {
                tiles.par_iter().try_for_each(|tile| -> Result<()> {
                    self.check_cancelled()?;
                    let map = mapper.map_tile(&grid, tile);
                    let (tile_raster, tile_mask) = remapper.remap_masked(src, src_mask, &map);
                    let mut guard = output.lock().unwrap_or_else(|e| e.into_inner());
                    let (raster, mask) = &mut *guard;
                    raster.paste(&tile_raster, tile.col_off, tile.row_off);
                    merge_tile_mask(mask, grid.width, tile, &tile_mask);
                    Ok(())
                })?;
            }
            RemapStrategy::PerBand => {
                for band in 0..src.band_count() {
                    tiles.par_iter().try_for_each(|tile| -> Result<()> {
                        self.check_cancelled()?;
                        let map = mapper.map_tile(&grid, tile);
                        let (data, tile_mask) = remapper.remap_band(src, band, src_mask, &map);
                        let mut guard = output.lock().unwrap_or_else(|e| e.into_inner());
                        let (raster, mask) = &mut *guard;
                        raster.paste_band(band, &data, tile.width, tile.col_off, tile.row_off);
                        merge_tile_mask(mask, grid.width, tile, &tile_mask);
                        Ok(())
                    })?;
                    log::trace!("band {} remapped", band);
                }
            }
        }
        log::debug!(
            "mapped and remapped {} tiles in {:.3}s",
            tiles.len(),
            now.elapsed().as_secs_f64()
        );

        let (mut raster, mask) = output.into_inner().unwrap_or_else(|e| e.into_inner());
        if remapper.strategy() == RemapStrategy::PerBand {
            // a cell lost in a later band still carries values from earlier ones
            raster.fill_where_masked(&mask, remapper.nodata());
        }
        log::debug!("orthorectified in {:.3}s", start.elapsed().as_secs_f64());
        Ok(OrthoOutput {
            raster,
            mask: self.config.write_mask.then_some(mask),
            transform: grid.transform,
            grid,
        })
    }

    /// Remaps `src` through the undistort map, tile by tile, when the mapper
    /// projects through the pinhole camera. Returns the undistorted image with
    /// its validity mask.
    fn undistort_source(
        &self,
        mapper: &OrthoGridMapper<'_>,
        src: &Raster,
    ) -> Result<Option<(Raster, Vec<u8>)>> {
        if !mapper.needs_undistort() {
            return Ok(None);
        }
        let now = Instant::now();
        let (width, height) = (src.width(), src.height());
        let prepass = Remapper::new(
            self.config.interp,
            src.dtype(),
            src.nodata(),
            RemapStrategy::WholeImage,
        )?;
        let output = Mutex::new((
            Raster::new(width, height, src.band_count(), src.dtype(), src.nodata()),
            vec![MASK_VALID; width * height],
        ));
        let [tw, th] = self.config.tile_size;
        tile_layout(width, height, (tw, th))
            .par_iter()
            .try_for_each(|tile| -> Result<()> {
                self.check_cancelled()?;
                let map = mapper.undistort_tile(tile);
                let (tile_raster, tile_mask) = prepass.remap(src, &map);
                let mut guard = output.lock().unwrap_or_else(|e| e.into_inner());
                let (raster, mask) = &mut *guard;
                raster.paste(&tile_raster, tile.col_off, tile.row_off);
                merge_tile_mask(mask, width, tile, &tile_mask);
                Ok(())
            })?;
        log::debug!("undistort pass in {:.3}s", now.elapsed().as_secs_f64());
        Ok(Some(output.into_inner().unwrap_or_else(|e| e.into_inner())))
    }
}

/// Merges a tile's mask into the `width` wide mask of the whole array.
fn merge_tile_mask(mask: &mut [u8], width: usize, tile: &Tile, tile_mask: &[u8]) {
    for row in 0..tile.height {
        let dst = (tile.row_off + row) * width + tile.col_off;
        merge_mask(
            &mut mask[dst..dst + tile.width],
            &tile_mask[row * tile.width..(row + 1) * tile.width],
        );
    }
}
