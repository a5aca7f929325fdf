//! Gathering and scattering batches of voxel columns between the recon
//! volume and the (num_pixels, num_slices) working arrays the projectors
//! operate on.

use ndarray::{Array2, ArrayView2};

use crate::index::index1_to_2;
use crate::model::{ReconShape, SinogramShape};
use crate::{Intensityf32, Sinogram, Volume};

pub fn zeros_volume(recon: ReconShape) -> Volume {
    Volume::zeros(recon.as_tuple())
}

pub fn zeros_sinogram(sinogram: SinogramShape) -> Sinogram {
    Sinogram::zeros(sinogram.as_tuple())
}

/// Collect the slice columns of the given plane pixels into a
/// (num_pixels, num_slices) array, in the order the indices are given.
pub fn gather_voxel_values(
    volume: &Volume,
    pixel_indices: &[usize],
    recon: ReconShape,
) -> Array2<Intensityf32> {
    Array2::from_shape_fn((pixel_indices.len(), recon.slices), |(pixel, k)| {
        let [i, j] = index1_to_2(pixel_indices[pixel], recon.plane());
        volume[[i, j, k]]
    })
}

/// Add `scale * values` into the slice columns of the given plane pixels.
pub fn scatter_add_voxel_values(
    volume: &mut Volume,
    pixel_indices: &[usize],
    values: ArrayView2<Intensityf32>,
    recon: ReconShape,
    scale: Intensityf32,
) {
    for (pixel, &flat) in pixel_indices.iter().enumerate() {
        let [i, j] = index1_to_2(flat, recon.plane());
        for k in 0..recon.slices {
            volume[[i, j, k]] += scale * values[[pixel, k]];
        }
    }
}
