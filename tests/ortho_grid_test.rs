mod common;

use approx::assert_relative_eq;
use common::{flat_dem, frame_camera, nadir_pose, pinhole_camera};
use nalgebra as na;
use simple_ortho::camera_model::{CameraModel, CameraType, DistortionCoeffs};
use simple_ortho::dem::ElevationSampler;
use simple_ortho::grid::{CoordinateMap, Extent, OrthoGrid};
use simple_ortho::interp::Interp;
use simple_ortho::intersect::{IntersectCriteria, RayTerrainIntersector};
use simple_ortho::mapper::{MapMode, OrthoGridMapper};
use simple_ortho::pose::Pose;
use simple_ortho::Error;

fn same_map(a: &CoordinateMap, b: &CoordinateMap) -> bool {
    a.valid == b.valid
        && a.map_x.iter().zip(b.map_x.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
        && a.map_y.iter().zip(b.map_y.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
}

#[test]
fn test_grid_dimensions() {
    let extent = Extent {
        min_x: 1000.0,
        min_y: 5000.0,
        max_x: 1010.3,
        max_y: 5004.0,
    };
    let grid = OrthoGrid::new(extent, (1.0, 0.5)).unwrap();
    assert_eq!(grid.width, 11);
    assert_eq!(grid.height, 8);
    assert_eq!(grid.transform.0, [1000.0, 1.0, 0.0, 5004.0, 0.0, -0.5]);
    let (x, y) = grid.cell_center(0, 0);
    assert_relative_eq!(x, 1000.5);
    assert_relative_eq!(y, 5003.75);

    assert!(matches!(
        OrthoGrid::new(extent, (0.0, 1.0)),
        Err(Error::InvalidConfig(_))
    ));
    let empty = Extent {
        max_x: 1000.0,
        ..extent
    };
    assert!(matches!(
        OrthoGrid::new(empty, (1.0, 1.0)),
        Err(Error::DemCoverage(_))
    ));
}

#[test]
fn test_tiles_cover_grid_once() {
    let extent = Extent {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 1234.0,
        max_y: 777.0,
    };
    let grid = OrthoGrid::new(extent, (1.0, 1.0)).unwrap();
    let mut hits = vec![0u8; grid.width * grid.height];
    for tile in grid.tiles((256, 100)) {
        assert!(tile.width <= 256 && tile.height <= 100);
        for row in tile.row_off..tile.row_off + tile.height {
            for col in tile.col_off..tile.col_off + tile.width {
                hits[row * grid.width + col] += 1;
            }
        }
    }
    assert!(hits.iter().all(|h| *h == 1));
}

#[test]
fn test_center_cell_maps_to_center_pixel() {
    let camera = pinhole_camera(4000, 3000);
    let pose = nadir_pose(1000.0);
    let dem = flat_dem(0.0, 1000.0, 10.0);
    let intersector = RayTerrainIntersector::new(
        ElevationSampler::new(&dem, Interp::Bilinear),
        IntersectCriteria::default(),
    );
    let mapper = OrthoGridMapper::new(&camera, &pose, intersector, MapMode::FullModel);

    // one 1 m cell centred under the camera
    let grid = OrthoGrid::new(
        Extent {
            min_x: -0.5,
            min_y: -0.5,
            max_x: 0.5,
            max_y: 0.5,
        },
        (1.0, 1.0),
    )
    .unwrap();
    let map = mapper.map_grid(&grid);
    let (u, v) = map.get(0, 0).unwrap();
    assert!((u as f64 - 2000.0).abs() <= 1.0);
    assert!((v as f64 - 1500.0).abs() <= 1.0);

    // 1 m east is fx / 1000 pixels right, 1 m north is fy / 1000 pixels up
    let east = mapper.map_cell(1.0, 0.0).unwrap();
    let north = mapper.map_cell(0.0, 1.0).unwrap();
    assert_relative_eq!(east.x - 1999.5, 50.0 * 4000.0 / 36.0 / 1000.0, epsilon = 1e-6);
    assert_relative_eq!(1499.5 - north.y, 50.0 * 3000.0 / 24.0 / 1000.0, epsilon = 1e-6);
}

#[test]
fn test_mapping_is_deterministic() {
    let camera = frame_camera(
        CameraType::OpenCV,
        &DistortionCoeffs {
            k1: -0.1,
            k2: 0.02,
            p1: 0.001,
            ..Default::default()
        },
        400,
        300,
    );
    let pose = Pose::new([5.0, -3.0, 800.0], [1.5, -2.0, 15.0]).unwrap();
    let dem = common::dem_from_fn(-600.0, 600.0, 4.0, 300, 300, |x, y| 20.0 + 0.05 * x + 10.0 * (y / 50.0).sin());
    let intersector = RayTerrainIntersector::new(
        ElevationSampler::new(&dem, Interp::Cubic),
        IntersectCriteria::default(),
    );
    let mapper = OrthoGridMapper::new(&camera, &pose, intersector, MapMode::FullModel);
    let extent = mapper.footprint(16, 0.0).unwrap();
    let grid = OrthoGrid::new(extent, (5.0, 5.0)).unwrap();
    let first = mapper.map_grid(&grid);
    let second = mapper.map_grid(&grid);
    assert!(same_map(&first, &second));
    assert!(first.valid_count() > first.invalid_count());

    // tiled mapping gives the same cells as one pass
    for tile in grid.tiles((17, 23)) {
        let part = mapper.map_tile(&grid, &tile);
        for row in 0..tile.height {
            for col in 0..tile.width {
                let a = part.get(col, row);
                let b = first.get(tile.col_off + col, tile.row_off + row);
                assert_eq!(a.map(|(u, v)| (u.to_bits(), v.to_bits())), b.map(|(u, v)| (u.to_bits(), v.to_bits())));
            }
        }
    }
}

#[test]
fn test_out_of_bounds_cells_invalid() {
    let camera = pinhole_camera(400, 300);
    let pose = Pose::new([0.0, 0.0, 1000.0], [3.0, -2.0, 25.0]).unwrap();
    let dem = flat_dem(10.0, 2000.0, 20.0);
    let intersector = RayTerrainIntersector::new(
        ElevationSampler::new(&dem, Interp::Bilinear),
        IntersectCriteria::default(),
    );
    let mapper = OrthoGridMapper::new(&camera, &pose, intersector, MapMode::FullModel);
    // a grid much larger than the footprint
    let grid = OrthoGrid::new(
        Extent {
            min_x: -800.0,
            min_y: -800.0,
            max_x: 800.0,
            max_y: 800.0,
        },
        (8.0, 8.0),
    )
    .unwrap();
    let map = mapper.map_grid(&grid);
    assert!(map.valid_count() > 0);
    assert!(map.invalid_count() > 0);
    for row in 0..grid.height {
        for col in 0..grid.width {
            let (x, y) = grid.cell_center(col, row);
            let p = camera
                .project_one(&pose.world_to_camera(&na::Vector3::new(x, y, 10.0)))
                .unwrap();
            let inside = p.x >= -0.5 && p.y >= -0.5 && p.x < 399.5 && p.y < 299.5;
            assert_eq!(map.get(col, row).is_some(), inside, "cell ({}, {})", col, row);
            if let Some((u, v)) = map.get(col, row) {
                assert!(u >= -0.5 && v >= -0.5 && u < 399.5 && v < 299.5);
            } else {
                assert!(map.map_x[(row, col)].is_nan());
            }
        }
    }
}

#[test]
fn test_footprint_of_nadir_camera() {
    let camera = pinhole_camera(400, 300);
    let pose = nadir_pose(1000.0);
    let dem = flat_dem(0.0, 1000.0, 10.0);
    let intersector = RayTerrainIntersector::new(
        ElevationSampler::new(&dem, Interp::Bilinear),
        IntersectCriteria::default(),
    );
    let mapper = OrthoGridMapper::new(&camera, &pose, intersector, MapMode::FullModel);
    assert_eq!(mapper.boundary_pixels(8).len(), 28);
    let e = mapper.footprint(8, 0.0).unwrap();
    assert_relative_eq!(e.min_x, -360.0, epsilon = 1e-6);
    assert_relative_eq!(e.max_x, 360.0, epsilon = 1e-6);
    assert_relative_eq!(e.min_y, -240.0, epsilon = 1e-6);
    assert_relative_eq!(e.max_y, 240.0, epsilon = 1e-6);

    // looking at the horizon has no bounded footprint
    let oblique = Pose::new([0.0, 0.0, 1000.0], [80.0, 0.0, 0.0]).unwrap();
    let intersector = RayTerrainIntersector::new(
        ElevationSampler::new(&dem, Interp::Bilinear),
        IntersectCriteria::default(),
    );
    let mapper = OrthoGridMapper::new(&camera, &oblique, intersector, MapMode::FullModel);
    assert!(matches!(mapper.footprint(8, 0.0), Err(Error::DemCoverage(_))));
}

#[test]
fn test_undistort_map_only_for_distorted_pinhole_mode() {
    let dem = flat_dem(0.0, 1000.0, 10.0);
    let pose = nadir_pose(1000.0);
    let brown = frame_camera(
        CameraType::Brown,
        &DistortionCoeffs {
            k1: -0.1,
            ..Default::default()
        },
        200,
        150,
    );
    let pinhole = pinhole_camera(200, 150);
    let intersector = RayTerrainIntersector::new(
        ElevationSampler::new(&dem, Interp::Bilinear),
        IntersectCriteria::default(),
    );
    let full = OrthoGridMapper::new(&brown, &pose, intersector, MapMode::FullModel);
    assert!(full.undistort_map().is_none());
    let pre = OrthoGridMapper::new(&pinhole, &pose, intersector, MapMode::UndistortedPinhole);
    assert!(pre.undistort_map().is_none());
    let pre = OrthoGridMapper::new(&brown, &pose, intersector, MapMode::UndistortedPinhole);
    let map = pre.undistort_map().unwrap();
    assert_eq!((map.width(), map.height()), (200, 150));
    // barrel distortion pulls the undistorted corner inwards
    let (u, v) = map.get(0, 0).unwrap();
    assert!(u > 0.0 && v > 0.0);
    let (u, v) = map.get(100, 75).unwrap();
    assert!((u - 100.0).abs() < 0.6 && (v - 75.0).abs() < 0.6);
}
