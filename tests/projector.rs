//! End-to-end scenarios exercising the public model + projector API.

use float_eq::assert_float_eq;
use ndarray::{Array2, Array3};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::SeedableRng;
use rand_isaac::isaac64::Isaac64Rng;

use mbir::error::Error;
use mbir::geometry::{detector_uv_to_mn, recon_ijk_to_xyz, xyz_to_detector_uv};
use mbir::image::zeros_volume;
use mbir::model::{default_angles, ConeBeamModel, SinogramShape};
use mbir::projector::{back_project, forward_project, forward_project_view};

/// The reference scenario: 32 views of a 32-row, 64-channel detector,
/// reconstructed on a 64 x 64 x 32 grid, angles spanning pi plus the
/// detector cone angle.
fn reference_model() -> ConeBeamModel {
    let sino = SinogramShape { views: 32, rows: 32, channels: 64 };
    let source_detector_dist = 4.0 * sino.channels as f32;
    let angles = default_angles(sino, source_detector_dist);
    ConeBeamModel::new(sino, &angles, source_detector_dist, source_detector_dist / 2.0).unwrap()
}

#[test]
fn zero_phantom_projects_to_zero_sinogram() {
    let model = reference_model();
    let phantom = zeros_volume(model.recon_shape());
    let sinogram = forward_project(&model, &phantom).unwrap();
    assert_eq!(sinogram.dim(), (32, 32, 64));
    assert!(sinogram.iter().all(|&v| v == 0.0));
}

// A single unit voxel near the centre of the grid must light up only a small
// neighbourhood of its geometrically predicted detector position, with total
// energy fixed by the footprint algebra.
#[test]
fn single_central_voxel_lands_where_geometry_predicts() {
    let model = reference_model();
    let params = model.projector_params();
    let recon = model.recon_shape();
    let geom = model.geometry();

    // With this angle sweep, view 16 sits at angle 0 exactly
    let view = 16;
    let angle = model.angle(view);
    assert_float_eq!(angle, 0.0, abs <= 1e-6);

    let (i, j, k) = (32, 32, 16);
    let flat = i * recon.cols + j;
    let mut values = Array2::zeros((1, recon.slices));
    values[[0, k]] = 1.0;

    let detector_view =
        forward_project_view(values.view(), &[flat], angle, &params).unwrap();

    // Predict the detector position by running the geometry chain directly
    let (x, y, z) = recon_ijk_to_xyz((i, j, k), recon.as_tuple(), geom, angle);
    let (u, v, pixel_mag) =
        xyz_to_detector_uv(x, y, z, geom.source_detector_dist, geom.magnification);
    let (m, n) = detector_uv_to_mn(u, v, geom, 32, 64);
    let (m, n) = (m.round() as i64, n.round() as i64);

    let mut energy = 0.0_f64;
    for ((row, chan), &value) in detector_view.indexed_iter() {
        if value != 0.0 {
            assert!(
                (row as i64 - m).abs() <= 2 && (chan as i64 - n).abs() <= 2,
                "unexpected energy at ({row}, {chan}), predicted centre ({m}, {n})"
            );
            assert!(value > 0.0);
            energy += value as f64;
        }
    }

    // Per direction the taps sum to delta_voxel * W with projected width
    // W = pixel_mag * delta_voxel / pitch (pitch = 1 here); the separable
    // footprint's total is the product of the two directional sums.
    let directional_sum = (geom.delta_voxel * geom.delta_voxel * pixel_mag) as f64;
    assert_float_eq!(energy, directional_sum * directional_sum, rmax <= 0.05);
}

// <F x, y> == <x, B y> over the full multi-view operators, for random dense
// vectors on both sides.
#[test]
fn forward_and_back_projection_are_adjoint() {
    let sino = SinogramShape { views: 12, rows: 8, channels: 16 };
    let source_detector_dist = 4.0 * sino.channels as f32;
    let angles = default_angles(sino, source_detector_dist);
    let model =
        ConeBeamModel::new(sino, &angles, source_detector_dist, source_detector_dist / 2.0)
            .unwrap();

    let mut rng = Isaac64Rng::seed_from_u64(0xC0FFEE);
    let x = Array3::random_using(
        model.recon_shape().as_tuple(),
        Uniform::new(-1.0_f32, 1.0),
        &mut rng,
    );
    let y = Array3::random_using(
        model.sinogram_shape().as_tuple(),
        Uniform::new(-1.0_f32, 1.0),
        &mut rng,
    );

    let fx = forward_project(&model, &x).unwrap();
    let by = back_project(&model, &y, 1).unwrap();

    let lhs: f64 = fx.iter().zip(y.iter()).map(|(&a, &b)| a as f64 * b as f64).sum();
    let rhs: f64 = by.iter().zip(x.iter()).map(|(&a, &b)| a as f64 * b as f64).sum();
    assert_float_eq!(lhs, rhs, abs <= 1e-6, rmax <= 1e-4);
}

// Constructing a model whose angle list disagrees with the declared number
// of views must fail eagerly, before any projection arrays exist.
#[test]
fn mismatched_angle_count_fails_at_construction() {
    let sino = SinogramShape { views: 32, rows: 32, channels: 64 };
    let angles: Vec<f32> = (0..16).map(|view| view as f32 * 0.1).collect();
    let err = ConeBeamModel::new(sino, &angles, 256.0, 128.0).unwrap_err();
    assert_eq!(err, Error::ViewParamsMismatch { n_params: 16, n_views: 32 });
    assert!(err.to_string().contains("16"));
    assert!(err.to_string().contains("32"));
}

// The back-projection of a one-hot sinogram view is supported only by the
// voxels whose footprints reach that detector cell; everything else is
// exactly zero.
#[test]
fn one_hot_back_projection_has_local_support() {
    let model = reference_model();
    let mut sinogram = Array3::zeros(model.sinogram_shape().as_tuple());
    sinogram[[16, 16, 32]] = 1.0;
    let volume = back_project(&model, &sinogram, 1).unwrap();

    let touched = volume.iter().filter(|&&v| v != 0.0).count();
    assert!(touched > 0);
    // far fewer voxels than the whole volume lie under one detector cell
    assert!(touched < volume.len() / 10);
    assert!(volume.iter().all(|&v| v >= 0.0));
}
