//! Sparse, separable system-matrix entries for one view and a batch of
//! voxels.
//!
//! The projection footprint of a voxel onto the detector is approximated as
//! the outer product of two independent 1D footprints, one along the
//! detector channels and one along the detector rows. For each (voxel,
//! slice) pair the builder returns `2p + 1` (weight, detector index) taps in
//! each direction, centred on the rounded fractional detector coordinate of
//! the voxel centre. The overlap model is rectangular-beam: each tap weight
//! is the length of intersection between a unit detector cell and the
//! voxel's projected width `W`, trapezoidal in the tap-to-centre distance.
//!
//! Both the forward and the back projector consume the output of this one
//! builder, which is what makes them exact adjoints of each other.
//!
//! Taps whose detector index falls outside the detector are kept, with
//! weight exactly zero: output shapes depend only on the batch size and
//! `psf_radius`, never on the data.

use ndarray::{Array2, ArrayViewMut1};

use crate::error::Error;
use crate::geometry::{detector_uv_to_mn, recon_ijk_to_xyz, xyz_to_detector_uv};
use crate::index::index1_to_2;
use crate::model::ProjectorParams;
use crate::{Anglef32, Weightf32};

/// Half-width of the footprint in detector cells. One cell per side is
/// enough while `delta_voxel * magnification` stays near the detector pitch,
/// which the default model configuration guarantees.
pub const DEFAULT_PSF_RADIUS: usize = 1;

/// The separable sparse projection kernel for a batch of voxels at one view.
///
/// All four arrays are shaped `(num_pixels * num_slices, 2 * psf_radius + 1)`
/// and row `pixel * num_slices + slice` describes that (pixel, slice) pair:
/// the slice index varies fastest within a pixel block, and callers reshape
/// relying on exactly that ordering.
#[derive(Clone, Debug)]
pub struct SparseKernel {
    /// Channel-direction footprint weights (Bij).
    pub chan_weight: Array2<Weightf32>,
    /// Detector channel index of each channel tap; may lie outside
    /// `[0, num_det_channels)`, in which case the weight is zero.
    pub chan_index: Array2<i32>,
    /// Row-direction footprint weights (Cij).
    pub row_weight: Array2<Weightf32>,
    /// Detector row index of each row tap; may lie outside
    /// `[0, num_det_rows)`, in which case the weight is zero.
    pub row_index: Array2<i32>,
}

impl SparseKernel {
    /// Compute the kernel for `pixel_indices` (flat indices into the recon
    /// plane) at view angle `angle`. `psf_radius` must be fixed per call;
    /// the output shape is `(pixel_indices.len() * num_slices,
    /// 2 * psf_radius + 1)`.
    pub fn compute(
        pixel_indices: &[usize],
        angle: Anglef32,
        params: &ProjectorParams,
        psf_radius: usize,
    ) -> Result<Self, Error> {
        let recon = params.recon;
        let geom = &params.geometry;
        let num_det_rows = params.sinogram.rows;
        let num_det_channels = params.sinogram.channels;

        let num_slices = recon.slices;
        let psf_width = 2 * psf_radius + 1;
        let num_entries = pixel_indices.len() * num_slices;

        let mut chan_weight = Array2::zeros((num_entries, psf_width));
        let mut chan_index = Array2::zeros((num_entries, psf_width));
        let mut row_weight = Array2::zeros((num_entries, psf_width));
        let mut row_index = Array2::zeros((num_entries, psf_width));

        for (pixel, &flat) in pixel_indices.iter().enumerate() {
            if flat >= recon.num_pixels() {
                return Err(Error::PixelIndexOutOfRange {
                    index: flat,
                    rows: recon.rows,
                    cols: recon.cols,
                });
            }
            let [i, j] = index1_to_2(flat, recon.plane());

            for k in 0..num_slices {
                let entry = pixel * num_slices + k;

                let (x, y, z) = recon_ijk_to_xyz((i, j, k), recon.as_tuple(), geom, angle);
                let (u, v, pixel_mag) =
                    xyz_to_detector_uv(x, y, z, geom.source_detector_dist, geom.magnification);
                let (m, n) = detector_uv_to_mn(u, v, geom, num_det_rows, num_det_channels);

                // Cone angle of the ray through this voxel, per direction
                let cone_angle_channel = u.atan2(geom.source_detector_dist);
                let cone_angle_row = v.atan2(geom.source_detector_dist);

                // cos of the angle between the view direction and the ray,
                // clipped to the larger of {cos, sin} so the projected
                // footprint width never collapses for 45-degree rays
                let beta = angle - cone_angle_channel;
                let cos_alpha_col = beta.cos().abs().max(beta.sin().abs());
                let cos_alpha_row = cone_angle_row
                    .cos()
                    .abs()
                    .max(cone_angle_row.sin().abs());

                // Projected voxel width in detector cells, per direction
                let w_col = pixel_mag * (geom.delta_voxel / geom.delta_det_channel)
                    * (cos_alpha_col / cone_angle_channel.cos());
                let w_row = pixel_mag * (geom.delta_voxel / geom.delta_det_row)
                    * (cos_alpha_row / cone_angle_row.cos());

                footprint_taps(
                    n,
                    w_col,
                    geom.delta_voxel / (cos_alpha_col * geom.delta_det_channel),
                    num_det_channels,
                    psf_radius,
                    chan_weight.row_mut(entry),
                    chan_index.row_mut(entry),
                );
                footprint_taps(
                    m,
                    w_row,
                    geom.delta_voxel / (cos_alpha_row * geom.delta_det_row),
                    num_det_rows,
                    psf_radius,
                    row_weight.row_mut(entry),
                    row_index.row_mut(entry),
                );
            }
        }

        Ok(Self { chan_weight, chan_index, row_weight, row_index })
    }

    /// Number of (pixel, slice) entries, i.e. rows of the four arrays.
    pub fn num_entries(&self) -> usize {
        self.chan_weight.nrows()
    }

    /// Number of taps per direction: `2 * psf_radius + 1`.
    pub fn psf_width(&self) -> usize {
        self.chan_weight.ncols()
    }
}

/// Fill one direction's taps for a single (pixel, slice) entry.
///
/// `frac` is the fractional detector coordinate of the voxel centre, `width`
/// the projected voxel width in detector cells, `scale` the weight per unit
/// overlap length. Out-of-detector taps keep their index but get weight
/// exactly zero.
fn footprint_taps(
    frac: f32,
    width: f32,
    scale: f32,
    num_cells: usize,
    psf_radius: usize,
    mut weights: ArrayViewMut1<Weightf32>,
    mut indices: ArrayViewMut1<i32>,
) {
    let centre = frac.round() as i32;
    for tap in 0..(2 * psf_radius + 1) {
        let cell = centre + tap as i32 - psf_radius as i32;
        let distance = (cell as f32 - frac).abs();

        // Trapezoidal overlap between a unit detector cell and a projected
        // voxel of width `width`, both centred as given
        let overlap = ((width + 1.0) / 2.0 - ((width - 1.0).abs() / 2.0).max(distance)).max(0.0);

        let in_bounds = cell >= 0 && cell < num_cells as i32;
        weights[tap] = if in_bounds { scale * overlap } else { 0.0 };
        indices[tap] = cell;
    }
}
