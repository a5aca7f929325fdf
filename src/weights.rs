//! Per-measurement weight maps for the weighted-least-squares solver.
//!
//! Weights are a sinogram-shaped array; the transmission variants assume the
//! sinogram holds line integrals of attenuation, so `exp(-y)` is the
//! relative photon count (and hence the inverse noise variance) of each
//! measurement.

use serde::Deserialize;

use crate::Sinogram;

const EMISSION_FLOOR: f32 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WeightType {
    Unweighted,
    Transmission,
    TransmissionRoot,
    Emission,
}

/// Build the weight map for `sinogram` under the given noise model.
pub fn gen_weights(sinogram: &Sinogram, weight_type: WeightType) -> Sinogram {
    match weight_type {
        WeightType::Unweighted => sinogram.mapv(|_| 1.0),
        WeightType::Transmission => sinogram.mapv(|y| (-y).exp()),
        WeightType::TransmissionRoot => sinogram.mapv(|y| (-y / 2.0).exp()),
        WeightType::Emission => sinogram.mapv(|y| 1.0 / y.abs().max(EMISSION_FLOOR)),
    }
}
