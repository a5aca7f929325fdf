//! The cone-beam model: an immutable, validated bundle of sinogram shape,
//! recon shape, per-view parameters and scalar geometry.
//!
//! The original system expressed this as a class hierarchy with mutable
//! parameter stores; here it is a plain configuration struct plus free
//! projector functions (see [`crate::projector`]). Builder-style `with_*`
//! methods return a *re-validated* model, so an invalid configuration can
//! never reach a projection call.

use ndarray::Array2;

use crate::error::Error;
use crate::geometry::{GeometryParams, MIN_SOURCE_PLANE_CLEARANCE};
use crate::{Anglef32, Lengthf32};

/// Sinogram dimensions: (views, detector rows, detector channels).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinogramShape {
    pub views: usize,
    pub rows: usize,
    pub channels: usize,
}

/// Recon volume dimensions: (rows, cols, slices). The (rows, cols) plane is
/// the one voxel batches are indexed into; slices pair up with detector rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconShape {
    pub rows: usize,
    pub cols: usize,
    pub slices: usize,
}

impl ReconShape {
    pub fn num_pixels(&self) -> usize {
        self.rows * self.cols
    }

    pub fn plane(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.rows, self.cols, self.slices)
    }
}

impl SinogramShape {
    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.views, self.rows, self.channels)
    }
}

/// Everything a single projector call needs, passed as one opaque `Copy`
/// bundle: sinogram shape, recon shape, geometry scalars.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectorParams {
    pub sinogram: SinogramShape,
    pub recon: ReconShape,
    pub geometry: GeometryParams,
}

impl ProjectorParams {
    /// The same bundle restricted to a single view: what the back-projector
    /// uses when handed one (rows x channels) slice of the sinogram.
    pub fn single_view(&self) -> Self {
        let mut params = *self;
        params.sinogram.views = 1;
        params
    }
}

/// An immutable cone-beam acquisition model.
///
/// View-dependent parameters are stored as a 2D array with one row per view;
/// in this geometry the only column is the view angle, but the layout leaves
/// room for source wobble and the like, and the one-row-per-view invariant is
/// enforced at construction.
#[derive(Clone, Debug)]
pub struct ConeBeamModel {
    sinogram_shape: SinogramShape,
    recon_shape: ReconShape,
    view_params: Array2<Anglef32>,
    geometry: GeometryParams,
}

impl ConeBeamModel {
    /// Build a model with default detector pitches (1 ALU), no calibration
    /// offsets, voxels sized so that one voxel projects onto roughly one
    /// detector channel, and a recon grid of (channels, channels, rows).
    pub fn new(
        sinogram_shape: SinogramShape,
        angles: &[Anglef32],
        source_detector_dist: Lengthf32,
        source_iso_dist: Lengthf32,
    ) -> Result<Self, Error> {
        if !(source_iso_dist > 0.0 && source_iso_dist < source_detector_dist) {
            return Err(Error::InvalidMagnification {
                magnification: source_detector_dist / source_iso_dist,
            });
        }
        let magnification = source_detector_dist / source_iso_dist;

        let geometry = GeometryParams {
            delta_det_channel: 1.0,
            delta_det_row: 1.0,
            det_channel_offset: 0.0,
            det_row_offset: 0.0,
            det_rotation: 0.0,
            source_detector_dist,
            magnification,
            delta_voxel: 1.0 / magnification,
            recon_slice_offset: 0.0,
        };

        let recon_shape = ReconShape {
            rows: sinogram_shape.channels,
            cols: sinogram_shape.channels,
            slices: sinogram_shape.rows,
        };

        let view_params =
            Array2::from_shape_fn((angles.len(), 1), |(view, _)| angles[view]);

        let model = Self { sinogram_shape, recon_shape, view_params, geometry };
        model.verify_valid_params()?;
        Ok(model)
    }

    pub fn with_recon_shape(mut self, recon_shape: ReconShape) -> Result<Self, Error> {
        self.recon_shape = recon_shape;
        self.verify_valid_params()?;
        Ok(self)
    }

    pub fn with_delta_voxel(mut self, delta_voxel: Lengthf32) -> Result<Self, Error> {
        self.geometry.delta_voxel = delta_voxel;
        self.verify_valid_params()?;
        Ok(self)
    }

    pub fn with_det_channel_offset(mut self, det_channel_offset: Lengthf32) -> Result<Self, Error> {
        self.geometry.det_channel_offset = det_channel_offset;
        self.verify_valid_params()?;
        Ok(self)
    }

    pub fn with_det_row_offset(mut self, det_row_offset: Lengthf32) -> Result<Self, Error> {
        self.geometry.det_row_offset = det_row_offset;
        self.verify_valid_params()?;
        Ok(self)
    }

    pub fn with_det_rotation(mut self, det_rotation: Anglef32) -> Result<Self, Error> {
        self.geometry.det_rotation = det_rotation;
        self.verify_valid_params()?;
        Ok(self)
    }

    pub fn with_recon_slice_offset(mut self, recon_slice_offset: Lengthf32) -> Result<Self, Error> {
        self.geometry.recon_slice_offset = recon_slice_offset;
        self.verify_valid_params()?;
        Ok(self)
    }

    /// Check that all parameters are compatible for a reconstruction.
    /// Called by every constructor and `with_*` method, so a held model is
    /// always valid.
    fn verify_valid_params(&self) -> Result<(), Error> {
        let n_params = self.view_params.nrows();
        let n_views = self.sinogram_shape.views;
        if n_params != n_views {
            return Err(Error::ViewParamsMismatch { n_params, n_views });
        }

        if self.recon_shape.slices != self.sinogram_shape.rows {
            return Err(Error::SliceRowMismatch {
                recon_slices: self.recon_shape.slices,
                det_rows: self.sinogram_shape.rows,
            });
        }

        if !(self.geometry.magnification > 1.0) || !self.geometry.magnification.is_finite() {
            return Err(Error::InvalidMagnification {
                magnification: self.geometry.magnification,
            });
        }

        // The farthest any voxel centre gets from the rotation axis, over all
        // view angles. If that circle touches the source plane the
        // magnification denominator can vanish; such grids are rejected here
        // so the batched mapper only ever clamps dead code.
        let half_diag = Lengthf32::hypot(
            (self.recon_shape.rows as Lengthf32 - 1.0) / 2.0,
            (self.recon_shape.cols as Lengthf32 - 1.0) / 2.0,
        );
        let reach = self.geometry.delta_voxel * half_diag;
        let source_iso_dist = self.geometry.source_iso_dist();
        if source_iso_dist - reach <= MIN_SOURCE_PLANE_CLEARANCE {
            return Err(Error::SourcePlaneReachable { reach, source_iso_dist });
        }

        Ok(())
    }

    pub fn sinogram_shape(&self) -> SinogramShape {
        self.sinogram_shape
    }

    pub fn recon_shape(&self) -> ReconShape {
        self.recon_shape
    }

    pub fn geometry(&self) -> &GeometryParams {
        &self.geometry
    }

    pub fn num_views(&self) -> usize {
        self.sinogram_shape.views
    }

    pub fn angle(&self, view: usize) -> Anglef32 {
        self.view_params[(view, 0)]
    }

    pub fn view_params(&self) -> &Array2<Anglef32> {
        &self.view_params
    }

    pub fn projector_params(&self) -> ProjectorParams {
        ProjectorParams {
            sinogram: self.sinogram_shape,
            recon: self.recon_shape,
            geometry: self.geometry,
        }
    }
}

/// Evenly spaced view angles spanning pi plus the full detector cone angle:
/// the sweep the original driver script uses, covering every ray direction at
/// least once.
pub fn default_angles(sinogram_shape: SinogramShape, source_detector_dist: Lengthf32) -> Vec<Anglef32> {
    let detector_cone_angle =
        2.0 * (sinogram_shape.channels as Lengthf32 / 2.0).atan2(source_detector_dist);
    let span = std::f32::consts::PI + detector_cone_angle;
    let start = -span / 2.0;
    let n = sinogram_shape.views;
    (0..n)
        .map(|view| start + span * view as Anglef32 / n as Anglef32)
        .collect()
}
