//! The cone-beam coordinate chain: voxel grid index -> physical position ->
//! detector (u,v) -> fractional detector (row, channel) index.
//!
//! All three steps are pure functions over scalars, designed to be applied
//! element-wise inside the batched kernel computation in
//! [`crate::system_matrix`]. Everything is expressed in ALU, the system's
//! arbitrary length unit; only ratios of lengths matter.

use crate::{Anglef32, Lengthf32};

/// How close (in ALU) the magnification denominator may get to zero before
/// being clamped. [`crate::model::ConeBeamModel::new`] rejects any
/// configuration whose voxel grid can reach this close to the source plane,
/// so the clamp never fires for a validated model.
pub const MIN_SOURCE_PLANE_CLEARANCE: Lengthf32 = 1e-4;

/// The immutable scalar geometry of one cone-beam setup.
///
/// `magnification = source_detector_dist / source_iso_dist`, so the source to
/// iso-centre distance is recoverable as `source_detector_dist /
/// magnification`. Offsets are calibration corrections in detector-index
/// units; pitches and distances are ALU.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryParams {
    pub delta_det_channel: Lengthf32,
    pub delta_det_row: Lengthf32,
    pub det_channel_offset: Lengthf32,
    pub det_row_offset: Lengthf32,
    pub det_rotation: Anglef32,
    pub source_detector_dist: Lengthf32,
    pub magnification: Lengthf32,
    pub delta_voxel: Lengthf32,
    pub recon_slice_offset: Lengthf32,
}

impl GeometryParams {
    pub fn source_iso_dist(&self) -> Lengthf32 {
        self.source_detector_dist / self.magnification
    }
}

/// Physical (x, y, z) of the centre of voxel (i, j, k), for the view in which
/// the object has been rotated by `angle` about the z axis.
///
/// The grid is centred on the iso-centre, so the rotation is about the centre
/// of the (rows, cols) plane. The rotation is of the *object*; the sign
/// convention here (`x = cos*x~ - sin*y~`) is the one the adjointness and
/// single-voxel placement tests pin down.
#[inline]
pub fn recon_ijk_to_xyz(
    (i, j, k): (usize, usize, usize),
    (num_rows, num_cols, num_slices): (usize, usize, usize),
    geom: &GeometryParams,
    angle: Anglef32,
) -> (Lengthf32, Lengthf32, Lengthf32) {
    let x_tilde = geom.delta_voxel * (i as Lengthf32 - (num_rows as Lengthf32 - 1.0) / 2.0);
    let y_tilde = geom.delta_voxel * (j as Lengthf32 - (num_cols as Lengthf32 - 1.0) / 2.0);

    let (sin, cos) = angle.sin_cos();
    let x = cos * x_tilde - sin * y_tilde;
    let y = sin * x_tilde + cos * y_tilde;

    let z = geom.delta_voxel * (k as Lengthf32 - (num_slices as Lengthf32 - 1.0) / 2.0)
        + geom.recon_slice_offset;
    (x, y, z)
}

/// Project a physical point onto the detector plane.
///
/// Returns the detector-plane coordinates (u, v) in ALU and the per-voxel
/// magnification `pixel_mag = dist / (dist/magnification - y)`. A voxel on
/// the source plane would make the denominator zero; it is clamped to
/// [`MIN_SOURCE_PLANE_CLEARANCE`] instead of raising, because a per-element
/// failure is unusable inside a batched evaluation.
#[inline]
pub fn xyz_to_detector_uv(
    x: Lengthf32,
    y: Lengthf32,
    z: Lengthf32,
    source_detector_dist: Lengthf32,
    magnification: Lengthf32,
) -> (Lengthf32, Lengthf32, Lengthf32) {
    let source_iso_dist = source_detector_dist / magnification;
    let denominator = source_iso_dist - y;
    let denominator = denominator.signum() * denominator.abs().max(MIN_SOURCE_PLANE_CLEARANCE);
    let pixel_mag = source_detector_dist / denominator;

    let u = pixel_mag * x;
    let v = pixel_mag * z;
    (u, v, pixel_mag)
}

/// Fractional detector (row, channel) coordinates (m, n) of a detector-plane
/// point, after undoing the detector tilt and applying the calibration
/// offsets. NOT rounded: the kernel builder needs the fractional position to
/// compute footprint overlaps.
#[inline]
pub fn detector_uv_to_mn(
    u: Lengthf32,
    v: Lengthf32,
    geom: &GeometryParams,
    num_det_rows: usize,
    num_det_channels: usize,
) -> (Lengthf32, Lengthf32) {
    let (sin, cos) = geom.det_rotation.sin_cos();
    let u_tilde = cos * u + sin * v;
    let v_tilde = -sin * u + cos * v;

    let det_center_channels = (num_det_channels as Lengthf32 - 1.0) / 2.0;
    let det_center_rows = (num_det_rows as Lengthf32 - 1.0) / 2.0;

    let n = u_tilde / geom.delta_det_channel + det_center_channels + geom.det_channel_offset;
    let m = v_tilde / geom.delta_det_row + det_center_rows + geom.det_row_offset;
    (m, n)
}
