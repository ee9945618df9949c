use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::dem::ElevationSampler;

/// Rays whose world-space z component is above this never reach the ground.
const MIN_DESCENT: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntersectCriteria {
    pub max_iterations: u32,
    /// Elevation change, in ground units, below which the solve has converged.
    pub tolerance: f64,
}

impl Default for IntersectCriteria {
    fn default() -> Self {
        IntersectCriteria {
            max_iterations: 20,
            tolerance: 0.01,
        }
    }
}

/// A converged ray/terrain intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub point: na::Vector3<f64>,
    /// DEM lookups used to reach `point`.
    pub iterations: u32,
}

/// Ray/plane intersection at elevation `z`. `None` when the plane lies
/// behind the ray origin or the ray does not descend.
pub fn intersect_plane(
    origin: &na::Vector3<f64>,
    direction: &na::Vector3<f64>,
    z: f64,
) -> Option<na::Vector3<f64>> {
    let dir = direction.try_normalize(f64::EPSILON)?;
    if dir.z > -MIN_DESCENT {
        return None;
    }
    let t = (z - origin.z) / dir.z;
    if t < 0.0 || !t.is_finite() {
        return None;
    }
    Some(origin + dir * t)
}

/// Finds where world-space camera rays meet the DEM surface.
///
/// Each solve intersects the ray with the horizontal plane at the current
/// elevation estimate, samples the DEM under that point and repeats until the
/// estimate moves by less than the tolerance.
#[derive(Debug, Clone, Copy)]
pub struct RayTerrainIntersector<'a> {
    sampler: ElevationSampler<'a>,
    criteria: IntersectCriteria,
    default_seed: f64,
}

impl<'a> RayTerrainIntersector<'a> {
    pub fn new(sampler: ElevationSampler<'a>, criteria: IntersectCriteria) -> Self {
        let default_seed = sampler.dem().stats().map_or(0.0, |s| s.mean);
        RayTerrainIntersector {
            sampler,
            criteria,
            default_seed,
        }
    }

    pub fn sampler(&self) -> &ElevationSampler<'a> {
        &self.sampler
    }

    pub fn criteria(&self) -> &IntersectCriteria {
        &self.criteria
    }

    /// Elevation used when the caller has no seed, the DEM mean.
    pub fn default_seed(&self) -> f64 {
        self.default_seed
    }

    /// Intersects the ray `origin + t * direction`, `t >= 0`, with the terrain.
    ///
    /// `seed` is the starting elevation, typically the previous ray's solution.
    /// `None` when the ray does not descend, leaves DEM coverage, or the
    /// iteration does not settle within the iteration cap.
    pub fn intersect(
        &self,
        origin: &na::Vector3<f64>,
        direction: &na::Vector3<f64>,
        seed: Option<f64>,
    ) -> Option<Intersection> {
        let mut z = seed.filter(|s| s.is_finite()).unwrap_or(self.default_seed);
        for iteration in 1..=self.criteria.max_iterations {
            let p = intersect_plane(origin, direction, z)?;
            let z_dem = self.sampler.elevation_at(p.x, p.y)?;
            if (z_dem - z).abs() < self.criteria.tolerance {
                return Some(Intersection {
                    point: na::Vector3::new(p.x, p.y, z_dem),
                    iterations: iteration,
                });
            }
            z = z_dem;
        }
        None
    }
}
