//! Configuration file parser for VCD reconstruction

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::Error;
use crate::model::{default_angles, ConeBeamModel, ReconShape, SinogramShape};
use crate::vcd::VcdOptions;
use crate::weights::WeightType;

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Number of VCD iterations to perform
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Subsets per sweep, cycled over iterations
    #[serde(default = "default_granularity")]
    pub granularity: Vec<usize>,

    /// Sinogram shape as (views, det_rows, det_channels)
    pub sinogram_shape: (usize, usize, usize),

    /// Recon shape as (rows, cols, slices); derived from the sinogram when
    /// absent
    #[serde(default)]
    pub recon_shape: Option<(usize, usize, usize)>,

    /// Distance from the X-ray source to the detector, in ALU
    pub source_detector_dist: f32,

    /// Distance from the X-ray source to the rotation axis, in ALU
    pub source_iso_dist: f32,

    /// Explicit view angles in radians; an even span over pi plus the
    /// detector cone angle when absent
    #[serde(default)]
    pub angles: Option<Vec<f32>>,

    /// Voxel side length in ALU; detector pitch / magnification when absent
    #[serde(default)]
    pub delta_voxel: Option<f32>,

    #[serde(default)]
    pub det_channel_offset: f32,

    #[serde(default)]
    pub det_row_offset: f32,

    /// Detector tilt in radians
    #[serde(default)]
    pub det_rotation: f32,

    /// Vertical offset of the recon volume in ALU
    #[serde(default)]
    pub recon_slice_offset: f32,

    #[serde(default = "default_weight_type")]
    pub weight_type: WeightType,

    #[serde(default)]
    pub positivity: bool,
}

fn default_iterations() -> usize { 10 }
fn default_granularity() -> Vec<usize> { vec![1, 2, 8, 64] }
fn default_weight_type() -> WeightType { WeightType::TransmissionRoot }

impl Config {
    pub fn build_model(&self) -> Result<ConeBeamModel, Error> {
        let (views, rows, channels) = self.sinogram_shape;
        let sinogram_shape = SinogramShape { views, rows, channels };
        let angles = self
            .angles
            .clone()
            .unwrap_or_else(|| default_angles(sinogram_shape, self.source_detector_dist));

        let mut model = ConeBeamModel::new(
            sinogram_shape,
            &angles,
            self.source_detector_dist,
            self.source_iso_dist,
        )?;
        if let Some((rows, cols, slices)) = self.recon_shape {
            model = model.with_recon_shape(ReconShape { rows, cols, slices })?;
        }
        if let Some(delta_voxel) = self.delta_voxel {
            model = model.with_delta_voxel(delta_voxel)?;
        }
        model
            .with_det_channel_offset(self.det_channel_offset)?
            .with_det_row_offset(self.det_row_offset)?
            .with_det_rotation(self.det_rotation)?
            .with_recon_slice_offset(self.recon_slice_offset)
    }

    pub fn vcd_options(&self) -> VcdOptions {
        VcdOptions {
            iterations: self.iterations,
            granularity: self.granularity.clone(),
            positivity: self.positivity,
        }
    }
}

pub fn read_config_file(path: &Path) -> anyhow::Result<Config> {
    let config = fs::read_to_string(path)
        .with_context(|| format!("Couldn't read config file `{}`", path.display()))?;
    toml::from_str(&config)
        .with_context(|| format!("Couldn't parse config file `{}`", path.display()))
}
