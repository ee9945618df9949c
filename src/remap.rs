use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::CoordinateMap;
use crate::interp::{self, Interp};
use crate::raster::{BandData, DataType, Raster};

/// Mask value of a valid output cell.
pub const MASK_VALID: u8 = 255;

/// How the bands of a multi-band source are resampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemapStrategy {
    /// One band at a time, holding a single band of output samples in flight.
    PerBand,
    /// All bands of a cell together.
    #[default]
    WholeImage,
}

/// Resamples a source raster through a coordinate map.
#[derive(Debug, Clone, Copy)]
pub struct Remapper {
    interp: Interp,
    dtype: DataType,
    nodata: f64,
    strategy: RemapStrategy,
}

impl Remapper {
    /// `nodata` defaults to the output type's default nodata.
    pub fn new(
        interp: Interp,
        dtype: DataType,
        nodata: Option<f64>,
        strategy: RemapStrategy,
    ) -> Result<Remapper> {
        if !interp.supports_image() {
            return Err(Error::InvalidConfig(format!(
                "{} interpolation is not supported for image resampling",
                interp
            )));
        }
        Ok(Remapper {
            interp,
            dtype,
            nodata: nodata.unwrap_or_else(|| dtype.default_nodata()),
            strategy,
        })
    }

    pub fn interp(&self) -> Interp {
        self.interp
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    pub fn strategy(&self) -> RemapStrategy {
        self.strategy
    }

    /// Resamples every band of `src` at `map`.
    ///
    /// Returns the output raster, sized like the map, and its mask (255 valid,
    /// 0 invalid). A cell is invalid when its map entry is invalid or outside
    /// the source, or when its kernel touches a source nodata pixel in any band.
    /// Invalid cells hold the output nodata in every band.
    pub fn remap(&self, src: &Raster, map: &CoordinateMap) -> (Raster, Vec<u8>) {
        self.remap_masked(src, None, map)
    }

    /// [`Remapper::remap`] with a source validity mask: source pixels whose
    /// `src_mask` entry is 0 count as nodata, whatever their value.
    pub fn remap_masked(
        &self,
        src: &Raster,
        src_mask: Option<&[u8]>,
        map: &CoordinateMap,
    ) -> (Raster, Vec<u8>) {
        let (width, height) = (map.width(), map.height());
        let bands = src.band_count();
        let mut out = Raster::new(width, height, bands, self.dtype, Some(self.nodata));
        if width == 0 || height == 0 {
            return (out, Vec::new());
        }

        match self.strategy {
            RemapStrategy::WholeImage => {
                let mut samples = vec![0.0; width * height * bands];
                let mut valid = vec![true; width * height];
                samples
                    .par_chunks_mut(width * bands)
                    .zip(valid.par_chunks_mut(width))
                    .enumerate()
                    .for_each(|(row, (samples, valid))| {
                        for (col, (cell, ok)) in
                            samples.chunks_mut(bands).zip(valid.iter_mut()).enumerate()
                        {
                            *ok = self.sample_cell(src, src_mask, map, col, row, cell);
                        }
                    });
                for (i, cell) in samples.chunks(bands).enumerate() {
                    if valid[i] {
                        for (band, value) in cell.iter().enumerate() {
                            out.set(band, i % width, i / width, *value);
                        }
                    }
                }
                (out, to_mask(&valid))
            }
            RemapStrategy::PerBand => {
                let mut mask = vec![MASK_VALID; width * height];
                for band in 0..bands {
                    let (data, band_mask) = self.remap_band(src, band, src_mask, map);
                    out.paste_band(band, &data, width, 0, 0);
                    merge_mask(&mut mask, &band_mask);
                }
                // a cell lost in a later band still carries values from earlier ones
                out.fill_where_masked(&mask, self.nodata);
                (out, mask)
            }
        }
    }

    /// Resamples a single band of `src` at `map`, returning its samples in the
    /// output type and the band's own mask.
    pub fn remap_band(
        &self,
        src: &Raster,
        band: usize,
        src_mask: Option<&[u8]>,
        map: &CoordinateMap,
    ) -> (BandData, Vec<u8>) {
        let (width, height) = (map.width(), map.height());
        let samples: Vec<Option<f64>> = (0..width * height)
            .into_par_iter()
            .map(|i| {
                let (u, v, support) = self.source_coord(src, map, i % width, i / width)?;
                self.sample(src, src_mask, band, u, v, support)
            })
            .collect();
        let mut data = BandData::filled(self.dtype, width * height, self.nodata);
        let mut mask = vec![0; width * height];
        for (i, sample) in samples.into_iter().enumerate() {
            if let Some(value) = sample {
                data.set(i, value);
                mask[i] = MASK_VALID;
            }
        }
        (data, mask)
    }

    /// Fills `cell` with every band's sample. False when any band has none.
    fn sample_cell(
        &self,
        src: &Raster,
        src_mask: Option<&[u8]>,
        map: &CoordinateMap,
        col: usize,
        row: usize,
        cell: &mut [f64],
    ) -> bool {
        let Some((u, v, support)) = self.source_coord(src, map, col, row) else {
            return false;
        };
        for (band, value) in cell.iter_mut().enumerate() {
            match self.sample(src, src_mask, band, u, v, support) {
                Some(s) => *value = s,
                None => return false,
            }
        }
        true
    }

    fn sample(
        &self,
        src: &Raster,
        src_mask: Option<&[u8]>,
        band: usize,
        u: f64,
        v: f64,
        support: (f64, f64),
    ) -> Option<f64> {
        interp::sample(
            self.interp,
            |col, row| {
                if src_mask.is_some_and(|m| m[row * src.width() + col] == 0) {
                    return None;
                }
                let value = src.get(band, col, row);
                (!src.is_nodata(value)).then_some(value)
            },
            src.width(),
            src.height(),
            u,
            v,
            support,
        )
    }

    /// Source coordinate of a map cell on the source image, with its
    /// footprint in source pixels.
    fn source_coord(
        &self,
        src: &Raster,
        map: &CoordinateMap,
        col: usize,
        row: usize,
    ) -> Option<(f64, f64, (f64, f64))> {
        let (u, v) = map.get(col, row)?;
        let (u, v) = (u as f64, v as f64);
        let (w, h) = (src.width() as f64, src.height() as f64);
        if !(u >= -0.5 && v >= -0.5 && u < w - 0.5 && v < h - 0.5) {
            return None;
        }
        let support = if self.interp == Interp::Average {
            map_support(map, col, row)
        } else {
            (1.0, 1.0)
        };
        Some((u, v, support))
    }
}

fn to_mask(valid: &[bool]) -> Vec<u8> {
    valid
        .iter()
        .map(|v| if *v { MASK_VALID } else { 0 })
        .collect()
}

/// Marks invalid in `mask` every cell invalid in `other`.
pub fn merge_mask(mask: &mut [u8], other: &[u8]) {
    for (m, o) in mask.iter_mut().zip(other) {
        *m = (*m).min(*o);
    }
}

/// Source-pixel size of one map cell, from the map's finite differences.
fn map_support(map: &CoordinateMap, col: usize, row: usize) -> (f64, f64) {
    let (u, v) = match map.get(col, row) {
        Some(p) => p,
        None => return (1.0, 1.0),
    };
    let neighbour = |dc: isize, dr: isize| {
        let c = col.checked_add_signed(dc)?;
        let r = row.checked_add_signed(dr)?;
        if c >= map.width() || r >= map.height() {
            return None;
        }
        map.get(c, r)
    };
    let step = |a: Option<(f32, f32)>, b: Option<(f32, f32)>| {
        a.or(b).map(|(nu, nv)| ((nu - u).abs() as f64, (nv - v).abs() as f64))
    };
    let along_col = step(neighbour(1, 0), neighbour(-1, 0)).unwrap_or((1.0, 0.0));
    let along_row = step(neighbour(0, 1), neighbour(0, -1)).unwrap_or((0.0, 1.0));
    (
        along_col.0.max(along_row.0).max(1.0),
        along_col.1.max(along_row.1).max(1.0),
    )
}
