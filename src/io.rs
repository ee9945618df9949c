use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::dem::Dem;
use crate::error::{Error, Result};
use crate::grid::GeoTransform;
use crate::ortho::OrthoOutput;
use crate::raster::{BandData, DataType, Raster};

/// Serializes an object to a JSON file.
pub fn object_to_json<T: Serialize, P: AsRef<Path>>(output_path: P, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    std::fs::write(output_path, j)?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned, P: AsRef<Path>>(file_path: P) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// `<path>.json`, the metadata file next to a raster.
pub fn sidecar_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut s = path.as_ref().as_os_str().to_owned();
    s.push(".json");
    PathBuf::from(s)
}

/// `<ortho_dir>/<src stem>_ORTHO.tif`.
pub fn ortho_filename<P: AsRef<Path>, Q: AsRef<Path>>(src: P, ortho_dir: Q) -> PathBuf {
    let stem = src
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    ortho_dir.as_ref().join(format!("{}_ORTHO.tif", stem))
}

/// One line of the camera position and orientation file.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseRecord {
    pub stem: String,
    /// Easting, northing, altitude.
    pub position: [f64; 3],
    /// Omega, phi, kappa in degrees.
    pub opk_deg: [f64; 3],
}

/// Pose records keyed by image file stem.
#[derive(Debug, Clone, Default)]
pub struct PoseTable {
    records: HashMap<String, PoseRecord>,
}

impl PoseTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record for `stem`, matched exactly first and then ignoring case.
    pub fn get(&self, stem: &str) -> Option<&PoseRecord> {
        self.records.get(stem).or_else(|| {
            self.records
                .values()
                .find(|r| r.stem.eq_ignore_ascii_case(stem))
        })
    }

    pub fn get_for_path<P: AsRef<Path>>(&self, path: P) -> Result<&PoseRecord> {
        let stem = path
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.get(&stem)
            .ok_or_else(|| Error::PoseFile(format!("no record for {}", stem)))
    }
}

/// Parses `<stem> <easting> <northing> <altitude> <omega> <phi> <kappa>` lines.
/// Blank lines and `#` comments are skipped.
pub fn parse_pose_text(text: &str) -> Result<PoseTable> {
    let mut records = HashMap::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 7 {
            return Err(Error::PoseFile(format!(
                "line {}: expected 7 fields, got {}",
                idx + 1,
                fields.len()
            )));
        }
        let mut values = [0.0; 6];
        for (v, field) in values.iter_mut().zip(&fields[1..]) {
            *v = field.parse().map_err(|_| {
                Error::PoseFile(format!("line {}: '{}' is not a number", idx + 1, field))
            })?;
        }
        let stem = fields[0].to_string();
        if records.contains_key(&stem) {
            log::warn!("line {}: duplicate record for {}, keeping the last", idx + 1, stem);
        }
        records.insert(
            stem.clone(),
            PoseRecord {
                stem,
                position: [values[0], values[1], values[2]],
                opk_deg: [values[3], values[4], values[5]],
            },
        );
    }
    log::debug!("parsed {} pose records", records.len());
    Ok(PoseTable { records })
}

pub fn read_pose_file<P: AsRef<Path>>(path: P) -> Result<PoseTable> {
    let text = std::fs::read_to_string(path)?;
    parse_pose_text(&text)
}

fn planar<T: Copy>(samples: &[T], channels: usize) -> Vec<Vec<T>> {
    (0..channels)
        .map(|c| samples.iter().skip(c).step_by(channels).copied().collect())
        .collect()
}

/// Splits a decoded image into one band per channel.
pub fn raster_from_dynamic_image(img: &DynamicImage, nodata: Option<f64>) -> Result<Raster> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let channels = img.color().channel_count() as usize;
    let bands: Vec<BandData> = match img {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => planar(img.as_bytes(), channels)
            .into_iter()
            .map(BandData::U8)
            .collect(),
        DynamicImage::ImageLuma16(i) => vec![BandData::U16(i.as_raw().clone())],
        DynamicImage::ImageLumaA16(i) => planar(i.as_raw(), channels)
            .into_iter()
            .map(BandData::U16)
            .collect(),
        DynamicImage::ImageRgb16(i) => planar(i.as_raw(), channels)
            .into_iter()
            .map(BandData::U16)
            .collect(),
        DynamicImage::ImageRgba16(i) => planar(i.as_raw(), channels)
            .into_iter()
            .map(BandData::U16)
            .collect(),
        DynamicImage::ImageRgb32F(i) => planar(i.as_raw(), channels)
            .into_iter()
            .map(BandData::F32)
            .collect(),
        DynamicImage::ImageRgba32F(i) => planar(i.as_raw(), channels)
            .into_iter()
            .map(BandData::F32)
            .collect(),
        other => {
            return Err(Error::UnsupportedRaster(format!(
                "unsupported pixel layout {:?}",
                other.color()
            )));
        }
    };
    Raster::from_bands(w, h, bands, nodata)
}

pub fn read_source_image<P: AsRef<Path>>(path: P, nodata: Option<f64>) -> Result<Raster> {
    let img = image::ImageReader::open(path.as_ref())?
        .with_guessed_format()?
        .decode()?;
    raster_from_dynamic_image(&img, nodata)
}

fn default_scale() -> f64 {
    1.0
}

/// DEM georeferencing, read from `<dem file>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemMeta {
    pub geo_transform: GeoTransform,
    /// Raw (unscaled) nodata value.
    #[serde(default)]
    pub nodata: Option<f64>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

/// Builds a DEM from channel `band` (1-based) of `img`.
/// Elevation is `raw * scale + offset`; raw nodata becomes NaN.
pub fn dem_from_dynamic_image(img: &DynamicImage, band: usize, meta: &DemMeta) -> Result<Dem> {
    let raster = raster_from_dynamic_image(img, meta.nodata)?;
    if band == 0 || band > raster.band_count() {
        return Err(Error::InvalidConfig(format!(
            "DEM band {} requested, DEM has {} bands",
            band,
            raster.band_count()
        )));
    }
    let data = raster.band(band - 1);
    let elevations = (0..data.len())
        .map(|i| {
            let raw = data.get(i);
            if raster.is_nodata(raw) {
                f32::NAN
            } else {
                (raw * meta.scale + meta.offset) as f32
            }
        })
        .collect();
    Dem::new(
        raster.width(),
        raster.height(),
        elevations,
        meta.geo_transform,
        None,
    )
}

pub fn read_dem<P: AsRef<Path>>(path: P, band: usize) -> Result<Dem> {
    let meta: DemMeta = object_from_json(sidecar_path(&path))?;
    let img = image::ImageReader::open(path.as_ref())?
        .with_guessed_format()?
        .decode()?;
    dem_from_dynamic_image(&img, band, &meta)
}

/// Ortho georeferencing, written to `<output>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrthoMeta {
    pub geo_transform: GeoTransform,
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub dtype: DataType,
    pub nodata: Option<f64>,
    /// Whether the image carries the validity mask as its last channel.
    pub mask_alpha: bool,
}

fn mask_alpha<T: Copy>(mask: Option<&[u8]>, i: usize, valid: T, invalid: T) -> Option<T> {
    mask.map(|m| if m[i] == 0 { invalid } else { valid })
}

fn interleave<T: Copy>(bands: &[&Vec<T>], mask: Option<&[u8]>, valid: T, invalid: T) -> Vec<T> {
    let len = bands.first().map_or(0, |b| b.len());
    let mut out = Vec::with_capacity(len * (bands.len() + mask.is_some() as usize));
    for i in 0..len {
        out.extend(bands.iter().map(|b| b[i]));
        out.extend(mask_alpha(mask, i, valid, invalid));
    }
    out
}

/// Packs an output raster, with the mask as alpha when given, into an image.
///
/// Supported: 8- and 16-bit rasters with 1 or 3 bands, and 32-bit float rasters
/// with 3 bands. Single-band rasters never carry alpha.
pub fn ortho_to_dynamic_image(raster: &Raster, mask: Option<&[u8]>) -> Result<DynamicImage> {
    let (w, h) = (raster.width() as u32, raster.height() as u32);
    let unsupported = || {
        Error::UnsupportedRaster(format!(
            "cannot write {} bands of {}",
            raster.band_count(),
            raster.dtype()
        ))
    };
    let bands = raster.bands();
    let img = match bands {
        [BandData::U8(b)] => image::GrayImage::from_raw(w, h, b.clone()).map(DynamicImage::from),
        [BandData::U16(b)] => {
            image::ImageBuffer::<image::Luma<u16>, _>::from_raw(w, h, b.clone())
                .map(DynamicImage::from)
        }
        [BandData::U8(r), BandData::U8(g), BandData::U8(b)] => {
            let data = interleave(&[r, g, b], mask, u8::MAX, 0);
            match mask {
                Some(_) => image::RgbaImage::from_raw(w, h, data).map(DynamicImage::from),
                None => image::RgbImage::from_raw(w, h, data).map(DynamicImage::from),
            }
        }
        [BandData::U16(r), BandData::U16(g), BandData::U16(b)] => {
            let data = interleave(&[r, g, b], mask, u16::MAX, 0);
            match mask {
                Some(_) => image::ImageBuffer::<image::Rgba<u16>, _>::from_raw(w, h, data)
                    .map(DynamicImage::from),
                None => image::ImageBuffer::<image::Rgb<u16>, _>::from_raw(w, h, data)
                    .map(DynamicImage::from),
            }
        }
        [BandData::F32(r), BandData::F32(g), BandData::F32(b)] => {
            let data = interleave(&[r, g, b], mask, 1.0, 0.0);
            match mask {
                Some(_) => image::Rgba32FImage::from_raw(w, h, data).map(DynamicImage::from),
                None => image::Rgb32FImage::from_raw(w, h, data).map(DynamicImage::from),
            }
        }
        _ => None,
    };
    img.ok_or_else(unsupported)
}

/// `<ortho file>` with `_mask` appended to its stem.
pub fn mask_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}_mask.tif", stem))
}

fn write_committed(img: &DynamicImage, path: &Path) -> Result<()> {
    let tmp = path.with_extension("tif.partial");
    let saved = img
        .save_with_format(&tmp, image::ImageFormat::Tiff)
        .map_err(Error::from)
        .and_then(|_| std::fs::rename(&tmp, path).map_err(Error::from));
    if saved.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    saved
}

/// Writes the ortho image as TIFF plus its JSON sidecar.
///
/// Three-band outputs carry the mask as alpha. Single-band outputs write the
/// mask to a separate 8-bit image at [`mask_path`]. Each image goes to a
/// temporary file first and is renamed into place when complete.
pub fn write_ortho<P: AsRef<Path>>(path: P, output: &OrthoOutput) -> Result<()> {
    let path = path.as_ref();
    let raster = &output.raster;
    let mask = output.mask.as_deref();
    let alpha = raster.band_count() == 3 && mask.is_some();
    let img = ortho_to_dynamic_image(raster, if alpha { mask } else { None })?;
    write_committed(&img, path)?;
    if let (Some(mask), false) = (mask, alpha) {
        let mask_img = image::GrayImage::from_raw(
            raster.width() as u32,
            raster.height() as u32,
            mask.to_vec(),
        )
        .ok_or_else(|| Error::UnsupportedRaster("mask size does not match raster".to_string()))?;
        write_committed(&DynamicImage::from(mask_img), &mask_path(path))?;
    }
    let meta = OrthoMeta {
        geo_transform: output.transform,
        width: raster.width(),
        height: raster.height(),
        bands: raster.band_count(),
        dtype: raster.dtype(),
        nodata: raster.nodata(),
        mask_alpha: alpha,
    };
    object_to_json(sidecar_path(path), &meta)?;
    log::info!("wrote {}", path.display());
    Ok(())
}
