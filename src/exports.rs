pub use crate::error::Error;
pub use crate::geometry::GeometryParams;
pub use crate::model::{ConeBeamModel, ProjectorParams, ReconShape, SinogramShape};
pub use crate::system_matrix::SparseKernel;

/// All lengths in this crate are expressed in ALU (arbitrary length units).
pub type Lengthf32 = f32;
pub type Anglef32 = f32;
pub type Weightf32 = f32;
pub type Intensityf32 = f32;

/// Index into the flattened (rows x cols) recon plane.
pub type PlaneIndex = usize;

pub type Volume = ndarray::Array3<Intensityf32>;
pub type Sinogram = ndarray::Array3<Intensityf32>;
