use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra as na;
use simple_ortho::camera_model::{
    CameraModel, CameraType, DistortionCoeffs, FocalLength, GenericModel, Intrinsics,
    UndistortCriteria,
};
use simple_ortho::dem::{Dem, ElevationSampler};
use simple_ortho::grid::{CoordinateMap, Extent, GeoTransform, OrthoGrid};
use simple_ortho::interp::Interp;
use simple_ortho::intersect::{IntersectCriteria, RayTerrainIntersector};
use simple_ortho::mapper::{MapMode, OrthoGridMapper};
use simple_ortho::pose::Pose;
use simple_ortho::raster::{BandData, DataType, Raster};
use simple_ortho::remap::{RemapStrategy, Remapper};

fn brown_camera() -> GenericModel {
    let intrinsics = Intrinsics::new(FocalLength::Single(50.0), (1000, 750), Some((36.0, 24.0)), (0.0, 0.0)).unwrap();
    let coeffs = DistortionCoeffs {
        k1: -0.1,
        k2: 0.02,
        p1: 0.001,
        p2: -0.0005,
        ..Default::default()
    };
    GenericModel::new(CameraType::Brown, intrinsics, &coeffs, UndistortCriteria::default()).unwrap()
}

fn hilly_dem() -> Dem {
    let (w, h) = (500, 500);
    let transform = GeoTransform::from_origin(-1000.0, 1000.0, 4.0, 4.0);
    let data = (0..w * h)
        .map(|i| {
            let (x, y) = transform.pixel_to_world((i % w) as f64 + 0.5, (i / w) as f64 + 0.5);
            (50.0 + 20.0 * (x / 120.0).sin() * (y / 90.0).cos()) as f32
        })
        .collect();
    Dem::new(w, h, data, transform, None).unwrap()
}

fn bench_unproject(c: &mut Criterion) {
    let camera = brown_camera();
    let pixels: Vec<na::Vector2<f64>> = (0..1000)
        .map(|i| na::Vector2::new((i % 40) as f64 * 25.0, (i / 40) as f64 * 30.0))
        .collect();
    c.bench_function("brown_unproject_1000", |b| {
        b.iter(|| camera.unproject(black_box(&pixels)))
    });
}

fn bench_map_tile(c: &mut Criterion) {
    let camera = brown_camera();
    let pose = Pose::new([0.0, 0.0, 1200.0], [2.0, -1.5, 30.0]).unwrap();
    let dem = hilly_dem();
    let intersector = RayTerrainIntersector::new(
        ElevationSampler::new(&dem, Interp::CubicSpline),
        IntersectCriteria::default(),
    );
    let mapper = OrthoGridMapper::new(&camera, &pose, intersector, MapMode::FullModel);
    let grid = OrthoGrid::new(
        Extent {
            min_x: -256.0,
            min_y: -256.0,
            max_x: 256.0,
            max_y: 256.0,
        },
        (2.0, 2.0),
    )
    .unwrap();
    let tile = grid.full_tile();
    c.bench_function("map_tile_256x256", |b| {
        b.iter(|| mapper.map_tile(black_box(&grid), black_box(&tile)))
    });
}

fn bench_remap(c: &mut Criterion) {
    let (w, h) = (1000, 750);
    let band = |k: usize| BandData::U8((0..w * h).map(|i| ((i % w + i / w + k) % 256) as u8).collect());
    let src = Raster::from_bands(w, h, vec![band(0), band(60), band(120)], None).unwrap();
    let map = CoordinateMap::from_par_fn(512, 512, |c, r| {
        Some(na::Vector2::new(100.0 + 1.3 * c as f64 + 0.2 * r as f64, 50.0 + 1.2 * r as f64))
    });
    for interp in [Interp::Bilinear, Interp::Cubic, Interp::Lanczos] {
        let remapper = Remapper::new(interp, DataType::U8, None, RemapStrategy::WholeImage).unwrap();
        c.bench_function(&format!("remap_512x512_{}", interp), |b| {
            b.iter(|| remapper.remap(black_box(&src), black_box(&map)))
        });
    }
}

criterion_group!(benches, bench_unproject, bench_map_tile, bench_remap);
criterion_main!(benches);
