//! Synthetic test objects: the modified 3D Shepp-Logan phantom on the recon
//! grid, used by the CLI demo and the end-to-end tests.

use itertools::iproduct;

use crate::image::zeros_volume;
use crate::model::ReconShape;
use crate::{Intensityf32, Volume};

/// One ellipsoid of the phantom, in normalised [-1, 1] coordinates over the
/// recon grid. `phi` rotates the ellipsoid in the (rows, cols) plane.
#[derive(Clone, Copy, Debug)]
struct Ellipsoid {
    x0: f32,
    y0: f32,
    z0: f32,
    a: f32,
    b: f32,
    c: f32,
    phi: f32,
    value: Intensityf32,
}

impl Ellipsoid {
    fn contains(&self, x: f32, y: f32, z: f32) -> bool {
        let (sin, cos) = self.phi.sin_cos();
        let dx = x - self.x0;
        let dy = y - self.y0;
        let dz = z - self.z0;
        let xr = cos * dx + sin * dy;
        let yr = -sin * dx + cos * dy;
        (xr / self.a).powi(2) + (yr / self.b).powi(2) + (dz / self.c).powi(2) <= 1.0
    }
}

// The modified (high-contrast) Shepp-Logan table; intensities are deltas and
// accumulate where ellipsoids overlap.
const MODIFIED_SHEPP_LOGAN: [Ellipsoid; 10] = [
    Ellipsoid { x0:  0.0,   y0:  0.0,    z0:  0.0,   a: 0.69,  b: 0.92,  c: 0.81, phi:  0.0,     value:  1.0 },
    Ellipsoid { x0:  0.0,   y0: -0.0184, z0:  0.0,   a: 0.6624, b: 0.874, c: 0.78, phi:  0.0,    value: -0.8 },
    Ellipsoid { x0:  0.22,  y0:  0.0,    z0:  0.0,   a: 0.11,  b: 0.31,  c: 0.22, phi: -0.31416, value: -0.2 },
    Ellipsoid { x0: -0.22,  y0:  0.0,    z0:  0.0,   a: 0.16,  b: 0.41,  c: 0.28, phi:  0.31416, value: -0.2 },
    Ellipsoid { x0:  0.0,   y0:  0.35,   z0: -0.15,  a: 0.21,  b: 0.25,  c: 0.41, phi:  0.0,     value:  0.1 },
    Ellipsoid { x0:  0.0,   y0:  0.1,    z0:  0.25,  a: 0.046, b: 0.046, c: 0.05, phi:  0.0,     value:  0.1 },
    Ellipsoid { x0:  0.0,   y0: -0.1,    z0:  0.25,  a: 0.046, b: 0.046, c: 0.05, phi:  0.0,     value:  0.1 },
    Ellipsoid { x0: -0.08,  y0: -0.605,  z0:  0.0,   a: 0.046, b: 0.023, c: 0.05, phi:  0.0,     value:  0.1 },
    Ellipsoid { x0:  0.0,   y0: -0.606,  z0:  0.0,   a: 0.023, b: 0.023, c: 0.02, phi:  0.0,     value:  0.1 },
    Ellipsoid { x0:  0.06,  y0: -0.605,  z0:  0.0,   a: 0.023, b: 0.046, c: 0.02, phi:  0.0,     value:  0.1 },
];

/// Generate the modified 3D Shepp-Logan phantom on the given recon grid.
pub fn gen_modified_shepp_logan(recon: ReconShape) -> Volume {
    let mut volume = zeros_volume(recon);
    let normalised = |index: usize, count: usize| {
        2.0 * (index as f32 - (count as f32 - 1.0) / 2.0) / count as f32
    };
    for (i, j, k) in iproduct!(0..recon.rows, 0..recon.cols, 0..recon.slices) {
        let x = normalised(i, recon.rows);
        let y = normalised(j, recon.cols);
        let z = normalised(k, recon.slices);
        let mut value = 0.0;
        for ellipsoid in &MODIFIED_SHEPP_LOGAN {
            if ellipsoid.contains(x, y, z) {
                value += ellipsoid.value;
            }
        }
        volume[[i, j, k]] = value;
    }
    volume
}
