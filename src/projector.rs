//! Forward and backward cone-beam projection.
//!
//! Both directions consume the identical [`SparseKernel`] output, which
//! makes them exact adjoints of each other (up to float summation order) —
//! the property the iterative solver's convergence rests on:
//!
//! + `forward_project_view` scatter-accumulates voxel values into one
//!   detector view through the outer product of the row and channel
//!   footprints;
//!
//! + `back_project_view_to_pixels` gathers detector values back through the
//!   same outer product, optionally with the weight product raised to a
//!   power (`coeff_power = 2` yields the diagonal-Hessian back-projection).
//!
//! The whole-volume drivers `forward_project` and `back_project` fan the
//! per-view operators out over all views in parallel; view results are
//! combined only by summation, so any execution order gives the same answer.

use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use crate::error::Error;
use crate::image::{gather_voxel_values, scatter_add_voxel_values, zeros_volume};
use crate::model::{ConeBeamModel, ProjectorParams};
use crate::system_matrix::{SparseKernel, DEFAULT_PSF_RADIUS};
use crate::{Anglef32, Intensityf32, Sinogram, Volume};

/// Forward project one batch of voxels into a single detector view.
///
/// `voxel_values` must be shaped `(pixel_indices.len(), num_slices)`; the
/// rank is enforced by the view type and the dimensions are checked before
/// any computation. Colliding footprint taps accumulate: several voxels may
/// deposit into the same detector cell.
pub fn forward_project_view(
    voxel_values: ArrayView2<Intensityf32>,
    pixel_indices: &[usize],
    angle: Anglef32,
    params: &ProjectorParams,
) -> Result<Array2<Intensityf32>, Error> {
    let num_slices = params.recon.slices;
    if voxel_values.dim() != (pixel_indices.len(), num_slices) {
        return Err(Error::VoxelValuesShape {
            num_pixels: pixel_indices.len(),
            num_slices,
            got_rows: voxel_values.nrows(),
            got_cols: voxel_values.ncols(),
        });
    }

    let kernel = SparseKernel::compute(pixel_indices, angle, params, DEFAULT_PSF_RADIUS)?;

    let num_det_rows = params.sinogram.rows;
    let num_det_channels = params.sinogram.channels;
    let mut view = Array2::zeros((num_det_rows, num_det_channels));

    for entry in 0..kernel.num_entries() {
        let value = voxel_values[[entry / num_slices, entry % num_slices]];
        if value == 0.0 {
            continue;
        }
        for tap_row in 0..kernel.psf_width() {
            let m = kernel.row_index[[entry, tap_row]];
            if m < 0 || m >= num_det_rows as i32 {
                continue;
            }
            let row_weight = kernel.row_weight[[entry, tap_row]];
            for tap_chan in 0..kernel.psf_width() {
                let n = kernel.chan_index[[entry, tap_chan]];
                if n < 0 || n >= num_det_channels as i32 {
                    continue;
                }
                view[[m as usize, n as usize]] +=
                    value * row_weight * kernel.chan_weight[[entry, tap_chan]];
            }
        }
    }

    Ok(view)
}

/// Back project a single detector view onto a batch of voxels.
///
/// Returns per-slice contributions shaped `(pixel_indices.len(),
/// num_slices)`; summing over slices is the caller's business. The weight
/// product is raised to `coeff_power` *before* summation, so
/// `coeff_power = 2` back-projects the squared weights (the diagonal of the
/// Hessian), which is not the square of the `coeff_power = 1` result.
pub fn back_project_view_to_pixels(
    sinogram_view: ArrayView2<Intensityf32>,
    pixel_indices: &[usize],
    angle: Anglef32,
    params: &ProjectorParams,
    coeff_power: i32,
) -> Result<Array2<Intensityf32>, Error> {
    let params = params.single_view();
    let num_det_rows = params.sinogram.rows;
    let num_det_channels = params.sinogram.channels;
    if sinogram_view.dim() != (num_det_rows, num_det_channels) {
        return Err(Error::SinogramViewShape {
            det_rows: num_det_rows,
            det_channels: num_det_channels,
            got_rows: sinogram_view.nrows(),
            got_cols: sinogram_view.ncols(),
        });
    }

    let kernel = SparseKernel::compute(pixel_indices, angle, &params, DEFAULT_PSF_RADIUS)?;

    let num_slices = params.recon.slices;
    let mut back = Array2::zeros((pixel_indices.len(), num_slices));

    for entry in 0..kernel.num_entries() {
        let mut accumulated = 0.0;
        for tap_row in 0..kernel.psf_width() {
            let m = kernel.row_index[[entry, tap_row]];
            if m < 0 || m >= num_det_rows as i32 {
                continue;
            }
            let row_weight = kernel.row_weight[[entry, tap_row]];
            for tap_chan in 0..kernel.psf_width() {
                let n = kernel.chan_index[[entry, tap_chan]];
                if n < 0 || n >= num_det_channels as i32 {
                    continue;
                }
                let weight = (row_weight * kernel.chan_weight[[entry, tap_chan]]).powi(coeff_power);
                accumulated += sinogram_view[[m as usize, n as usize]] * weight;
            }
        }
        back[[entry / num_slices, entry % num_slices]] = accumulated;
    }

    Ok(back)
}

/// Forward project a whole volume into a whole sinogram, views in parallel.
pub fn forward_project(model: &ConeBeamModel, volume: &Volume) -> Result<Sinogram, Error> {
    let recon = model.recon_shape();
    if volume.dim() != recon.as_tuple() {
        return Err(Error::VolumeShape { expected: recon.as_tuple(), got: volume.dim() });
    }

    let params = model.projector_params();
    let pixel_indices: Vec<usize> = (0..recon.num_pixels()).collect();
    let voxel_values = gather_voxel_values(volume, &pixel_indices, recon);

    let views: Vec<Array2<Intensityf32>> = (0..model.num_views())
        .into_par_iter()
        .map(|view| {
            forward_project_view(voxel_values.view(), &pixel_indices, model.angle(view), &params)
        })
        .collect::<Result<_, _>>()?;

    let shape = model.sinogram_shape();
    let mut sinogram = Sinogram::zeros(shape.as_tuple());
    for (view, data) in views.into_iter().enumerate() {
        sinogram.index_axis_mut(Axis(0), view).assign(&data);
    }
    Ok(sinogram)
}

/// Back project a whole sinogram into a volume, views in parallel, combined
/// by an associative commutative sum so the execution order cannot matter.
pub fn back_project(
    model: &ConeBeamModel,
    sinogram: &Sinogram,
    coeff_power: i32,
) -> Result<Volume, Error> {
    let shape = model.sinogram_shape();
    if sinogram.dim() != shape.as_tuple() {
        return Err(Error::SinogramShapeMismatch { expected: shape.as_tuple(), got: sinogram.dim() });
    }

    let recon = model.recon_shape();
    let params = model.projector_params();
    let pixel_indices: Vec<usize> = (0..recon.num_pixels()).collect();

    let contributions = (0..model.num_views())
        .into_par_iter()
        .map(|view| {
            back_project_view_to_pixels(
                sinogram.index_axis(Axis(0), view),
                &pixel_indices,
                model.angle(view),
                &params,
                coeff_power,
            )
        })
        .try_reduce(
            || Array2::zeros((recon.num_pixels(), recon.slices)),
            |a, b| Ok(a + b),
        )?;

    let mut volume = zeros_volume(recon);
    scatter_add_voxel_values(&mut volume, &pixel_indices, contributions.view(), recon, 1.0);
    Ok(volume)
}

// ------------------------------ TESTS ------------------------------
#[cfg(test)]
mod test {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use float_eq::assert_float_eq;

    use crate::model::{ConeBeamModel, ReconShape, SinogramShape};

    fn small_model() -> ConeBeamModel {
        let sino = SinogramShape { views: 3, rows: 5, channels: 7 };
        let angles = [0.0, 0.9, 2.1];
        ConeBeamModel::new(sino, &angles, 64.0, 32.0)
            .unwrap()
            .with_recon_shape(ReconShape { rows: 7, cols: 7, slices: 5 })
            .unwrap()
    }

    #[test]
    fn wrong_voxel_values_shape_is_rejected_before_projecting() {
        let model = small_model();
        let params = model.projector_params();
        let values = Array2::<f32>::zeros((3, 5));
        let err = forward_project_view(values.view(), &[0, 1], 0.0, &params).unwrap_err();
        assert_eq!(
            err,
            Error::VoxelValuesShape { num_pixels: 2, num_slices: 5, got_rows: 3, got_cols: 5 }
        );
    }

    #[test]
    fn wrong_sinogram_view_shape_is_rejected_before_projecting() {
        let model = small_model();
        let params = model.projector_params();
        let view = Array2::<f32>::zeros((5, 6));
        let err = back_project_view_to_pixels(view.view(), &[0], 0.0, &params, 1).unwrap_err();
        assert_eq!(
            err,
            Error::SinogramViewShape { det_rows: 5, det_channels: 7, got_rows: 5, got_cols: 6 }
        );
    }

    // The per-view operators must satisfy <F x, y> == <x, B y> for the same
    // kernel: tested across voxels, angles, and a detector view with
    // structure.
    #[test]
    fn per_view_operators_are_adjoint() {
        let model = small_model();
        let params = model.projector_params();
        let pixels: Vec<usize> = (0..49).collect();
        let slices = model.recon_shape().slices;

        // Deterministic but unstructured test vectors
        let x = Array2::from_shape_fn((pixels.len(), slices), |(p, k)| {
            ((p * 31 + k * 17) % 23) as f32 / 23.0 - 0.4
        });
        let y = Array2::from_shape_fn((5, 7), |(m, n)| ((m * 7 + n * 13) % 11) as f32 / 11.0 - 0.3);

        for view in 0..3 {
            let angle = model.angle(view);
            let fx = forward_project_view(x.view(), &pixels, angle, &params).unwrap();
            let by = back_project_view_to_pixels(y.view(), &pixels, angle, &params, 1).unwrap();

            let lhs: f64 = fx.iter().zip(y.iter()).map(|(&a, &b)| a as f64 * b as f64).sum();
            let rhs: f64 = by.iter().zip(x.iter()).map(|(&a, &b)| a as f64 * b as f64).sum();
            assert_float_eq!(lhs, rhs, abs <= 1e-9, rmax <= 1e-5);
        }
    }

    // Two voxels whose footprints overlap must sum, not overwrite, in the
    // shared detector cells.
    #[test]
    fn colliding_footprints_accumulate() {
        let model = small_model();
        let params = model.projector_params();
        let slices = model.recon_shape().slices;
        let centre = 3 * 7 + 3;
        let neighbour = centre + 1;

        let one = Array2::from_elem((1, slices), 1.0);
        let both = Array2::from_elem((2, slices), 1.0);

        let a = forward_project_view(one.view(), &[centre], 0.0, &params).unwrap();
        let b = forward_project_view(one.view(), &[neighbour], 0.0, &params).unwrap();
        let ab = forward_project_view(both.view(), &[centre, neighbour], 0.0, &params).unwrap();

        let diff = (&a + &b - &ab).mapv(f32::abs);
        assert!(diff.iter().all(|&d| d < 1e-5));
        // and they genuinely overlap somewhere
        assert!(a.iter().zip(b.iter()).any(|(&p, &q)| p > 0.0 && q > 0.0));
    }

    // coeff_power = 2 back-projects squared weights; on a uniform view this
    // is strictly smaller than the square of the power-1 back-projection
    // whenever more than one tap contributes, and strictly positive where
    // power-1 is.
    #[test]
    fn hessian_power_squares_weights_before_summation() {
        let model = small_model();
        let params = model.projector_params();
        let ones = Array2::from_elem((5, 7), 1.0);
        let pixels: Vec<usize> = (0..49).collect();

        let b1 = back_project_view_to_pixels(ones.view(), &pixels, 0.9, &params, 1).unwrap();
        let b2 = back_project_view_to_pixels(ones.view(), &pixels, 0.9, &params, 2).unwrap();

        for (&v1, &v2) in b1.iter().zip(b2.iter()) {
            assert_eq!(v1 > 0.0, v2 > 0.0);
            if v1 > 0.0 {
                // sum(w^2) <= (sum w)^2, equality only for a single tap
                assert!(v2 <= v1 * v1 + 1e-6);
            }
        }
        // somewhere the footprint really is spread over several taps
        assert!(b1
            .iter()
            .zip(b2.iter())
            .any(|(&v1, &v2)| v1 > 0.0 && v2 < v1 * v1 * 0.999));
    }

    // Whole-sinogram driver against a serial reference: same result in any
    // execution order because views combine by summation only.
    #[test]
    fn whole_volume_drivers_match_per_view_composition() {
        let model = small_model();
        let params = model.projector_params();
        let recon = model.recon_shape();
        let pixels: Vec<usize> = (0..recon.num_pixels()).collect();

        let mut volume = zeros_volume(recon);
        volume[[3, 3, 2]] = 1.0;
        volume[[1, 5, 4]] = -2.0;

        let sinogram = forward_project(&model, &volume).unwrap();
        let values = gather_voxel_values(&volume, &pixels, recon);
        for view in 0..model.num_views() {
            let expected =
                forward_project_view(values.view(), &pixels, model.angle(view), &params).unwrap();
            assert_eq!(sinogram.index_axis(Axis(0), view), expected);
        }

        let back = back_project(&model, &sinogram, 1).unwrap();
        let mut expected = Array2::<f32>::zeros((recon.num_pixels(), recon.slices));
        for view in 0..model.num_views() {
            expected = expected
                + back_project_view_to_pixels(
                    sinogram.index_axis(Axis(0), view),
                    &pixels,
                    model.angle(view),
                    &params,
                    1,
                )
                .unwrap();
        }
        for (pixel, &flat) in pixels.iter().enumerate() {
            let [i, j] = crate::index::index1_to_2(flat, recon.plane());
            for k in 0..recon.slices {
                assert_float_eq!(back[[i, j, k]], expected[[pixel, k]], rmax <= 1e-5);
            }
        }
    }
}
