mod common;

use approx::assert_relative_eq;
use common::{frame_camera, pinhole_camera};
use nalgebra as na;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use simple_ortho::camera_model::{
    CameraModel, CameraType, DistortionCoeffs, FocalLength, GenericModel, Intrinsics,
    UndistortCriteria,
};
use simple_ortho::grid::CoordinateMap;
use simple_ortho::interp::Interp;
use simple_ortho::raster::{BandData, DataType, Raster};
use simple_ortho::remap::{RemapStrategy, Remapper};
use simple_ortho::Error;

const ALL_TYPES: [CameraType; 4] = [
    CameraType::Pinhole,
    CameraType::Brown,
    CameraType::Fisheye,
    CameraType::OpenCV,
];

fn random_rays(n: usize, max_tan: f64) -> Vec<na::Vector3<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    (0..n)
        .map(|_| {
            na::Vector3::new(
                rng.random_range(-max_tan..max_tan),
                rng.random_range(-max_tan..max_tan),
                1.0,
            )
            .normalize()
        })
        .collect()
}

#[test]
fn test_zero_distortion_reduces_to_pinhole() {
    let pinhole = pinhole_camera(4000, 3000);
    for camera_type in ALL_TYPES {
        let camera = frame_camera(camera_type, &DistortionCoeffs::default(), 4000, 3000);
        for ray in random_rays(200, 0.3) {
            let expected = pinhole
                .unproject_one(&pinhole.project_one(&ray).unwrap())
                .unwrap();
            let p = camera.project_one(&ray).unwrap();
            let back = camera.unproject_one(&p).unwrap();
            assert_relative_eq!(back, expected, epsilon = 1e-8);
        }
    }
}

#[test]
fn test_pinhole_round_trip() {
    let camera = pinhole_camera(4000, 3000);
    for r in (10..3000).step_by(97) {
        for c in (10..4000).step_by(131) {
            let p = na::Vector2::new(c as f64, r as f64);
            let ray = camera.unproject_one(&p).unwrap();
            assert_relative_eq!(ray.norm(), 1.0, epsilon = 1e-12);
            let back = camera.project_one(&ray).unwrap();
            assert_relative_eq!(back, p, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_distorted_round_trip() {
    let models = [
        (
            CameraType::Brown,
            DistortionCoeffs {
                k1: -0.12,
                k2: 0.05,
                k3: -0.01,
                p1: 0.001,
                p2: -0.0005,
                ..Default::default()
            },
        ),
        (
            CameraType::Fisheye,
            DistortionCoeffs {
                k1: -0.02,
                k2: 0.01,
                k3: -0.003,
                k4: 0.0005,
                ..Default::default()
            },
        ),
        (
            CameraType::OpenCV,
            DistortionCoeffs {
                k1: -0.1,
                k2: 0.04,
                p1: 0.0008,
                p2: 0.0004,
                k4: 0.01,
                k5: -0.005,
                s1: 0.001,
                s3: -0.0005,
                ..Default::default()
            },
        ),
    ];
    for (camera_type, coeffs) in models {
        let camera = frame_camera(camera_type, &coeffs, 4000, 3000);
        assert_eq!(camera.camera_type(), camera_type);
        let pts: Vec<_> = (100..3000)
            .step_by(350)
            .flat_map(|r| (100..4000).step_by(450).map(move |c| na::Vector2::new(c as f64, r as f64)))
            .collect();
        let rays = camera.unproject(&pts);
        for (p, ray) in pts.iter().zip(&rays) {
            let ray = ray.unwrap();
            let back = camera.project_one(&ray).unwrap();
            assert!(
                (back - p).norm() < 1e-2,
                "{} camera: {:?} came back as {:?}",
                camera_type,
                p,
                back
            );
        }
    }
}

#[test]
fn test_project_filters_points_outside_the_image() {
    let camera = pinhole_camera(400, 300);
    let pts = [
        na::Vector3::new(0.0, 0.0, 10.0),
        na::Vector3::new(100.0, 0.0, 1.0),
        na::Vector3::new(0.0, 0.0, -10.0),
    ];
    let projected = camera.project(&pts);
    assert!(projected[0].is_some());
    assert!(projected[1].is_none());
    assert!(projected[2].is_none());
}

#[test]
fn test_image_bounds_use_pixel_centres() {
    let camera = pinhole_camera(400, 300);
    let i = camera.intrinsics();
    assert!(i.contains(&na::Vector2::new(-0.5, -0.5)));
    assert!(i.contains(&na::Vector2::new(399.49, 299.49)));
    assert!(!i.contains(&na::Vector2::new(-0.51, 10.0)));
    assert!(!i.contains(&na::Vector2::new(10.0, -0.51)));
    assert!(!i.contains(&na::Vector2::new(399.5, 10.0)));
    assert!(!i.contains(&na::Vector2::new(10.0, 299.5)));

    // a region of the undistort map matches the same window of the full map
    let brown = frame_camera(
        CameraType::Brown,
        &DistortionCoeffs {
            k1: -0.1,
            ..Default::default()
        },
        400,
        300,
    );
    let k = brown.intrinsics().camera_matrix();
    let full = brown.init_undistort_map(&k, (400, 300));
    let region = brown.init_undistort_map_region(&k, (390, 120), (10, 7));
    for row in 0..7 {
        for col in 0..10 {
            assert_eq!(region.get(col, row), full.get(390 + col, 120 + row));
        }
    }
}

#[test]
fn test_principal_point_is_image_centre() {
    let camera = pinhole_camera(4000, 3000);
    let i = camera.intrinsics();
    assert_relative_eq!(i.cx, 1999.5);
    assert_relative_eq!(i.cy, 1499.5);
    assert_relative_eq!(i.fx, 50.0 * 4000.0 / 36.0);
    assert_relative_eq!(i.fy, 50.0 * 3000.0 / 24.0);

    let offset = Intrinsics::new(FocalLength::Xy([0.8, 0.8]), (400, 300), None, (0.01, -0.02)).unwrap();
    assert_relative_eq!(offset.fx, 320.0);
    assert_relative_eq!(offset.cx, 199.5 + 4.0);
    assert_relative_eq!(offset.cy, 149.5 - 8.0);
}

#[test]
fn test_non_convergent_undistort_is_invalid() {
    // strong barrel distortion folds over at r = sqrt(1 / (3 * 0.5))
    let camera = frame_camera(
        CameraType::OpenCV,
        &DistortionCoeffs {
            k1: -0.5,
            ..Default::default()
        },
        4000,
        3000,
    );
    let i = *camera.intrinsics();
    let far = i.normalized_to_pixel(&na::Vector2::new(0.9, 0.0));
    assert!(camera.unproject_one(&far).is_none());
    let near = i.normalized_to_pixel(&na::Vector2::new(0.1, 0.05));
    assert!(camera.unproject_one(&near).is_some());
}

#[test]
fn test_brown_matches_opencv_radial() {
    let coeffs = DistortionCoeffs {
        k1: -0.2,
        ..Default::default()
    };
    let brown = frame_camera(CameraType::Brown, &coeffs, 4000, 3000);
    let opencv = frame_camera(CameraType::OpenCV, &coeffs, 4000, 3000);
    for ray in random_rays(100, 0.3) {
        let pb = brown.project_one(&ray).unwrap();
        let po = opencv.project_one(&ray).unwrap();
        assert_relative_eq!(pb, po, epsilon = 1e-12);
        let xy = na::Vector2::new(ray.x / ray.z, ray.y / ray.z);
        let r2 = xy.norm_squared();
        assert_relative_eq!(brown.distort(&xy), xy * (1.0 + coeffs.k1 * r2), epsilon = 1e-12);
    }
}

fn checker(p: &na::Vector2<f64>) -> u8 {
    // square borders fall between pixel centres
    let square = 20.0;
    let (i, j) = (((p.x + 0.5) / square).floor() as i64, ((p.y + 0.5) / square).floor() as i64);
    if (i + j).rem_euclid(2) == 0 {
        200
    } else {
        50
    }
}

#[test]
fn test_brown_k1_undistorts_checkerboard() {
    let (w, h) = (320u32, 240u32);
    let intrinsics = Intrinsics::new(FocalLength::Single(1.0), (w, h), None, (0.0, 0.0)).unwrap();
    let coeffs = DistortionCoeffs {
        k1: -0.1,
        ..Default::default()
    };
    let camera = GenericModel::new(
        CameraType::Brown,
        intrinsics,
        &coeffs,
        UndistortCriteria::default(),
    )
    .unwrap();

    // synthesize what the lens records of an ideal checkerboard
    let distorted: Vec<u8> = (0..(w * h) as usize)
        .map(|i| {
            let p_d = na::Vector2::new((i % w as usize) as f64, (i / w as usize) as f64);
            let xy = camera.undistort(&intrinsics.pixel_to_normalized(&p_d)).unwrap();
            checker(&intrinsics.normalized_to_pixel(&xy))
        })
        .collect();
    let src = Raster::from_bands(w as usize, h as usize, vec![BandData::U8(distorted)], None).unwrap();

    let map: CoordinateMap = camera.init_undistort_map(&intrinsics.camera_matrix(), (w, h));
    assert!(map.valid_count() > (w * h) as usize * 9 / 10);
    let remapper = Remapper::new(Interp::Nearest, DataType::U8, Some(0.0), RemapStrategy::WholeImage).unwrap();
    let (undistorted, mask) = remapper.remap(&src, &map);

    let mut checked = 0;
    let mut mismatched = 0;
    for row in 0..h as usize {
        for col in 0..w as usize {
            if mask[row * w as usize + col] == 0 {
                continue;
            }
            checked += 1;
            let expected = checker(&na::Vector2::new(col as f64, row as f64));
            if undistorted.get(0, col, row) as u8 != expected {
                mismatched += 1;
            }
        }
    }
    assert!(checked > 0);
    // nearest sampling may only disagree on square borders
    assert!(
        (mismatched as f64) < 0.03 * checked as f64,
        "{} of {} pixels differ",
        mismatched,
        checked
    );
}

#[test]
fn test_invalid_intrinsics() {
    let err = Intrinsics::new(FocalLength::Single(-1.0), (400, 300), None, (0.0, 0.0));
    assert!(matches!(err, Err(Error::InvalidIntrinsics(_))));
    let err = Intrinsics::new(FocalLength::Single(50.0), (400, 300), Some((0.0, 24.0)), (0.0, 0.0));
    assert!(matches!(err, Err(Error::InvalidIntrinsics(_))));
    let err = Intrinsics::new(FocalLength::Single(50.0), (0, 300), None, (0.0, 0.0));
    assert!(matches!(err, Err(Error::InvalidIntrinsics(_))));
}

#[test]
fn test_unaccepted_coefficients_rejected() {
    let intrinsics = *pinhole_camera(400, 300).intrinsics();
    let fisheye_p1 = DistortionCoeffs {
        p1: 0.01,
        ..Default::default()
    };
    let err = GenericModel::new(
        CameraType::Fisheye,
        intrinsics,
        &fisheye_p1,
        UndistortCriteria::default(),
    );
    assert!(matches!(err, Err(Error::InvalidIntrinsics(_))));

    let brown_k4 = DistortionCoeffs {
        k4: 0.01,
        ..Default::default()
    };
    assert!(GenericModel::new(CameraType::Brown, intrinsics, &brown_k4, UndistortCriteria::default()).is_err());
    assert!(GenericModel::new(CameraType::OpenCV, intrinsics, &brown_k4, UndistortCriteria::default()).is_ok());
}

#[test]
fn test_camera_type_names() {
    for camera_type in ALL_TYPES {
        let parsed: CameraType = camera_type.to_string().parse().unwrap();
        assert_eq!(parsed, camera_type);
    }
    assert!(matches!(
        "kb8".parse::<CameraType>(),
        Err(Error::UnknownCameraType(_))
    ));
}
