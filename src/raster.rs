use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Pixel data type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    #[serde(rename = "uint8")]
    U8,
    #[serde(rename = "uint16")]
    U16,
    #[serde(rename = "int16")]
    I16,
    #[serde(rename = "uint32")]
    U32,
    #[serde(rename = "int32")]
    I32,
    #[serde(rename = "float32")]
    F32,
    #[serde(rename = "float64")]
    F64,
}

impl DataType {
    /// Representable `(min, max)`.
    pub fn range(&self) -> (f64, f64) {
        match self {
            DataType::U8 => (u8::MIN as f64, u8::MAX as f64),
            DataType::U16 => (u16::MIN as f64, u16::MAX as f64),
            DataType::I16 => (i16::MIN as f64, i16::MAX as f64),
            DataType::U32 => (u32::MIN as f64, u32::MAX as f64),
            DataType::I32 => (i32::MIN as f64, i32::MAX as f64),
            DataType::F32 => (f32::MIN as f64, f32::MAX as f64),
            DataType::F64 => (f64::MIN, f64::MAX),
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }

    /// Rounds and clamps `value` into this type's range. Integer types map NaN to 0.
    pub fn convert(&self, value: f64) -> f64 {
        match self {
            DataType::F64 => value,
            DataType::F32 => {
                if value.is_nan() {
                    value
                } else {
                    let (min, max) = self.range();
                    value.clamp(min, max) as f32 as f64
                }
            }
            _ => {
                if value.is_nan() {
                    0.0
                } else {
                    let (min, max) = self.range();
                    value.round().clamp(min, max)
                }
            }
        }
    }

    /// Nodata used when none is configured: 0 for unsigned, the minimum for
    /// signed integers and NaN for floats.
    pub fn default_nodata(&self) -> f64 {
        match self {
            DataType::U8 | DataType::U16 | DataType::U32 => 0.0,
            DataType::I16 | DataType::I32 => self.range().0,
            DataType::F32 | DataType::F64 => f64::NAN,
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "uint8" | "u8" => Ok(DataType::U8),
            "uint16" | "u16" => Ok(DataType::U16),
            "int16" | "i16" => Ok(DataType::I16),
            "uint32" | "u32" => Ok(DataType::U32),
            "int32" | "i32" => Ok(DataType::I32),
            "float32" | "f32" => Ok(DataType::F32),
            "float64" | "f64" => Ok(DataType::F64),
            _ => Err(Error::UnknownDataType(s.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::U8 => "uint8",
            DataType::U16 => "uint16",
            DataType::I16 => "int16",
            DataType::U32 => "uint32",
            DataType::I32 => "int32",
            DataType::F32 => "float32",
            DataType::F64 => "float64",
        };
        write!(f, "{}", name)
    }
}

/// Row-major samples of one band, stored in its native type.
#[derive(Debug, Clone, PartialEq)]
pub enum BandData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl BandData {
    /// `len` samples of `value` (converted to `dtype`).
    pub fn filled(dtype: DataType, len: usize, value: f64) -> BandData {
        let v = dtype.convert(value);
        match dtype {
            DataType::U8 => BandData::U8(vec![v as u8; len]),
            DataType::U16 => BandData::U16(vec![v as u16; len]),
            DataType::I16 => BandData::I16(vec![v as i16; len]),
            DataType::U32 => BandData::U32(vec![v as u32; len]),
            DataType::I32 => BandData::I32(vec![v as i32; len]),
            DataType::F32 => BandData::F32(vec![v as f32; len]),
            DataType::F64 => BandData::F64(vec![v; len]),
        }
    }

    pub fn dtype(&self) -> DataType {
        match self {
            BandData::U8(_) => DataType::U8,
            BandData::U16(_) => DataType::U16,
            BandData::I16(_) => DataType::I16,
            BandData::U32(_) => DataType::U32,
            BandData::I32(_) => DataType::I32,
            BandData::F32(_) => DataType::F32,
            BandData::F64(_) => DataType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BandData::U8(v) => v.len(),
            BandData::U16(v) => v.len(),
            BandData::I16(v) => v.len(),
            BandData::U32(v) => v.len(),
            BandData::I32(v) => v.len(),
            BandData::F32(v) => v.len(),
            BandData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> f64 {
        match self {
            BandData::U8(v) => v[i] as f64,
            BandData::U16(v) => v[i] as f64,
            BandData::I16(v) => v[i] as f64,
            BandData::U32(v) => v[i] as f64,
            BandData::I32(v) => v[i] as f64,
            BandData::F32(v) => v[i] as f64,
            BandData::F64(v) => v[i],
        }
    }

    /// Stores `value`, rounded and clamped to the band's type.
    pub fn set(&mut self, i: usize, value: f64) {
        let value = self.dtype().convert(value);
        match self {
            BandData::U8(v) => v[i] = value as u8,
            BandData::U16(v) => v[i] = value as u16,
            BandData::I16(v) => v[i] = value as i16,
            BandData::U32(v) => v[i] = value as u32,
            BandData::I32(v) => v[i] = value as i32,
            BandData::F32(v) => v[i] = value as f32,
            BandData::F64(v) => v[i] = value,
        }
    }
}

/// A planar multi-band raster.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    dtype: DataType,
    bands: Vec<BandData>,
    nodata: Option<f64>,
}

impl Raster {
    /// A raster with every sample set to `nodata`, or zero without one.
    pub fn new(
        width: usize,
        height: usize,
        band_count: usize,
        dtype: DataType,
        nodata: Option<f64>,
    ) -> Raster {
        let fill = nodata.unwrap_or(0.0);
        Raster {
            width,
            height,
            dtype,
            bands: (0..band_count)
                .map(|_| BandData::filled(dtype, width * height, fill))
                .collect(),
            nodata,
        }
    }

    pub fn from_bands(
        width: usize,
        height: usize,
        bands: Vec<BandData>,
        nodata: Option<f64>,
    ) -> Result<Raster> {
        let first = bands
            .first()
            .ok_or_else(|| Error::UnsupportedRaster("raster has no bands".to_string()))?;
        let dtype = first.dtype();
        if let Some(band) = bands
            .iter()
            .find(|b| b.dtype() != dtype || b.len() != width * height)
        {
            return Err(Error::UnsupportedRaster(format!(
                "band of {} x {} expected for a {}x{} raster, got {} x {}",
                dtype,
                width * height,
                width,
                height,
                band.dtype(),
                band.len()
            )));
        }
        Ok(Raster {
            width,
            height,
            dtype,
            bands,
            nodata,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn band(&self, band: usize) -> &BandData {
        &self.bands[band]
    }

    pub fn bands(&self) -> &[BandData] {
        &self.bands
    }

    pub fn get(&self, band: usize, col: usize, row: usize) -> f64 {
        self.bands[band].get(row * self.width + col)
    }

    pub fn set(&mut self, band: usize, col: usize, row: usize, value: f64) {
        let width = self.width;
        self.bands[band].set(row * width + col, value);
    }

    /// NaN, or equal to the declared nodata.
    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nd| value == nd)
    }

    /// Copies `tile` into this raster with its top left sample at
    /// `(col_off, row_off)`. Samples beyond the edge are dropped.
    pub fn paste(&mut self, tile: &Raster, col_off: usize, row_off: usize) {
        for band in 0..self.band_count().min(tile.band_count()) {
            self.paste_band(band, tile.band(band), tile.width, col_off, row_off);
        }
    }

    /// Copies one band of `tile_width` samples per row into `band`.
    pub fn paste_band(
        &mut self,
        band: usize,
        tile: &BandData,
        tile_width: usize,
        col_off: usize,
        row_off: usize,
    ) {
        if tile_width == 0 {
            return;
        }
        let tile_height = tile.len() / tile_width;
        let cols = tile_width.min(self.width.saturating_sub(col_off));
        let rows = tile_height.min(self.height.saturating_sub(row_off));
        for row in 0..rows {
            for col in 0..cols {
                let value = tile.get(row * tile_width + col);
                self.set(band, col_off + col, row_off + row, value);
            }
        }
    }

    /// Sets every band to `value` where `mask` is 0.
    pub fn fill_where_masked(&mut self, mask: &[u8], value: f64) {
        for band in self.bands.iter_mut() {
            for (i, _) in mask.iter().enumerate().filter(|(_, m)| **m == 0) {
                band.set(i, value);
            }
        }
    }
}
