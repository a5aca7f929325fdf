//! Errors surfaced by model validation and the projectors.
//!
//! Numerical edge cases inside the batched projection paths are handled by
//! clamping or zeroing, never by raising: out-of-range detector taps get zero
//! weight, and the source-plane denominator is clamped (see
//! [`crate::geometry`]). Everything that *can* be rejected eagerly is
//! rejected here, before any projection runs.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("all view-dependent vectors must have the same length as the number of views: \
             got {n_params} view parameter rows and {n_views} sinogram views")]
    ViewParamsMismatch { n_params: usize, n_views: usize },

    #[error("number of recon slices must match number of sinogram rows: \
             got {recon_slices} slices in recon_shape and {det_rows} rows in sinogram_shape")]
    SliceRowMismatch { recon_slices: usize, det_rows: usize },

    #[error("invalid geometry: magnification must exceed 1 for a cone-beam setup \
             (source-to-iso distance must be positive and smaller than \
             source-to-detector distance), got magnification = {magnification}")]
    InvalidMagnification { magnification: f32 },

    #[error("invalid geometry: the voxel grid reaches to within {reach} ALU of the source \
             plane at {source_iso_dist} ALU; shrink the recon grid or move the source")]
    SourcePlaneReachable { reach: f32, source_iso_dist: f32 },

    #[error("voxel_values must have shape (num_pixels, num_slices) = ({num_pixels}, {num_slices}), \
             got ({got_rows}, {got_cols})")]
    VoxelValuesShape {
        num_pixels: usize,
        num_slices: usize,
        got_rows: usize,
        got_cols: usize,
    },

    #[error("sinogram view must have shape (num_det_rows, num_det_channels) = \
             ({det_rows}, {det_channels}), got ({got_rows}, {got_cols})")]
    SinogramViewShape {
        det_rows: usize,
        det_channels: usize,
        got_rows: usize,
        got_cols: usize,
    },

    #[error("volume must have shape (rows, cols, slices) = {expected:?}, got {got:?}")]
    VolumeShape {
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    #[error("sinogram must have shape (views, rows, channels) = {expected:?}, got {got:?}")]
    SinogramShapeMismatch {
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    #[error("pixel index {index} is outside the {rows} x {cols} recon plane")]
    PixelIndexOutOfRange {
        index: usize,
        rows: usize,
        cols: usize,
    },
}
