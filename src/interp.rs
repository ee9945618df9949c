use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Most taps along one axis of any kernel (lanczos, radius 3).
const MAX_TAPS: usize = 6;

/// Interpolation kernel, used both for DEM sampling and image resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interp {
    Nearest,
    /// Box average over the area one output cell covers in the input grid.
    Average,
    #[default]
    Bilinear,
    /// Catmull-Rom cubic convolution.
    Cubic,
    /// Cubic B-spline (smoothing, not interpolating).
    CubicSpline,
    #[serde(alias = "gaussian")]
    Gauss,
    /// Lanczos windowed sinc with three lobes.
    Lanczos,
}

impl Interp {
    /// Kernel half-width in input pixels.
    pub fn radius(&self) -> i64 {
        match self {
            Interp::Nearest | Interp::Average | Interp::Bilinear => 1,
            Interp::Cubic | Interp::CubicSpline | Interp::Gauss => 2,
            Interp::Lanczos => 3,
        }
    }

    /// Separable kernel weight at offset `t` from the sample position.
    pub fn weight(&self, t: f64) -> f64 {
        let t = t.abs();
        match self {
            Interp::Nearest => {
                if t < 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            Interp::Average | Interp::Bilinear => (1.0 - t).max(0.0),
            Interp::Cubic => {
                let a = -0.5;
                if t <= 1.0 {
                    (a + 2.0) * t * t * t - (a + 3.0) * t * t + 1.0
                } else if t < 2.0 {
                    a * t * t * t - 5.0 * a * t * t + 8.0 * a * t - 4.0 * a
                } else {
                    0.0
                }
            }
            Interp::CubicSpline => {
                if t < 1.0 {
                    (4.0 - 6.0 * t * t + 3.0 * t * t * t) / 6.0
                } else if t < 2.0 {
                    (2.0 - t).powi(3) / 6.0
                } else {
                    0.0
                }
            }
            Interp::Gauss => {
                if t < 2.0 {
                    (-2.0 * t * t).exp()
                } else {
                    0.0
                }
            }
            Interp::Lanczos => {
                if t < 1e-12 {
                    1.0
                } else if t < 3.0 {
                    let pt = PI * t;
                    3.0 * pt.sin() * (pt / 3.0).sin() / (pt * pt)
                } else {
                    0.0
                }
            }
        }
    }

    /// Kernels available for resampling the source image.
    pub fn supports_image(&self) -> bool {
        !matches!(self, Interp::CubicSpline | Interp::Gauss)
    }
}

impl FromStr for Interp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nearest" => Ok(Interp::Nearest),
            "average" => Ok(Interp::Average),
            "bilinear" => Ok(Interp::Bilinear),
            "cubic" => Ok(Interp::Cubic),
            "cubic_spline" => Ok(Interp::CubicSpline),
            "gauss" | "gaussian" => Ok(Interp::Gauss),
            "lanczos" => Ok(Interp::Lanczos),
            _ => Err(Error::UnknownInterp(s.to_string())),
        }
    }
}

impl fmt::Display for Interp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Interp::Nearest => "nearest",
            Interp::Average => "average",
            Interp::Bilinear => "bilinear",
            Interp::Cubic => "cubic",
            Interp::CubicSpline => "cubic_spline",
            Interp::Gauss => "gauss",
            Interp::Lanczos => "lanczos",
        };
        write!(f, "{}", name)
    }
}

fn clamp_index(i: i64, len: usize) -> usize {
    i.clamp(0, len as i64 - 1) as usize
}

/// Tap indices and weights of `interp` along one axis at centre-convention
/// coordinate `u`. Zero weights are dropped so that they never touch the grid.
fn axis_taps(interp: Interp, u: f64, len: usize, support: f64) -> Vec<(usize, f64)> {
    match interp {
        Interp::Nearest => vec![(clamp_index(u.round() as i64, len), 1.0)],
        Interp::Average => {
            let half = (support / 2.0).max(0.5);
            let first = (u - half).ceil() as i64;
            let last = ((u + half).floor() as i64).max(first);
            (first..=last)
                .map(|i| (clamp_index(i, len), 1.0))
                .collect()
        }
        _ => {
            let r = interp.radius();
            let u0 = u.floor() as i64;
            let mut taps = Vec::with_capacity(MAX_TAPS);
            for i in (u0 - r + 1)..=(u0 + r) {
                let w = interp.weight(u - i as f64);
                if w != 0.0 {
                    taps.push((clamp_index(i, len), w));
                }
            }
            taps
        }
    }
}

/// Samples a `width` x `height` grid at centre-convention coordinate `(u, v)`.
///
/// `fetch(col, row)` returns `None` for no-data cells, in which case the whole
/// sample is `None`. Taps beyond the grid edge are clamped to the edge, so
/// `fetch` is only ever called with in-bounds indices. `support` is the size,
/// in grid pixels, of the area one output sample covers, and is used only by
/// [`Interp::Average`].
pub fn sample<F>(
    interp: Interp,
    fetch: F,
    width: usize,
    height: usize,
    u: f64,
    v: f64,
    support: (f64, f64),
) -> Option<f64>
where
    F: Fn(usize, usize) -> Option<f64>,
{
    if width == 0 || height == 0 || !u.is_finite() || !v.is_finite() {
        return None;
    }
    let cols = axis_taps(interp, u, width, support.0);
    let rows = axis_taps(interp, v, height, support.1);
    let mut acc = 0.0;
    let mut weight_sum = 0.0;
    for &(row, wy) in &rows {
        for &(col, wx) in &cols {
            let value = fetch(col, row)?;
            let w = wx * wy;
            acc += value * w;
            weight_sum += w;
        }
    }
    if weight_sum.abs() < 1e-12 {
        None
    } else {
        Some(acc / weight_sum)
    }
}
