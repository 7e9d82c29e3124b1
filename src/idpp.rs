//! Image-dependent pair potential (IDPP).
//!
//! IDPP replaces the real energy surface with an analytic objective that is
//! cheap to evaluate. For image `k` of an `n`-image band, the target distance
//! between atoms `a` and `b` is the linear interpolation of the endpoint
//! distances:
//!
//! ```text
//! d_target(k)_ab = d(0)_ab + k / (n - 1) * (d(n-1)_ab - d(0)_ab)
//! ```
//!
//! and the image energy is
//!
//! ```text
//! E = 1/2 * sum_{a != b} (d_ab - d_target_ab)^2 / d_ab^4
//! ```
//!
//! The `1/d^4` weight makes short distances matter most, which keeps atoms
//! from passing through each other the way they can in a plain linear
//! interpolation.
//!
//! # References
//!
//! - Smidstrup, S.; Pedersen, A.; Stokbro, K.; Jónsson, H.
//!   *J. Chem. Phys.* **2014**, 140, 214106.

use crate::geometry::Structure;
use crate::neb::ImagePotential;
use nalgebra::{DMatrix, DVector};

/// Per-image IDPP targets for a whole band.
#[derive(Debug, Clone)]
pub struct Idpp {
    targets: Vec<DMatrix<f64>>,
    mic: bool,
}

impl Idpp {
    /// Builds targets for an `num_images`-image band between `first` and
    /// `last`.
    ///
    /// # Panics
    ///
    /// Panics if `num_images < 2` or the endpoints have different atom counts.
    pub fn new(first: &Structure, last: &Structure, num_images: usize, mic: bool) -> Self {
        assert!(num_images >= 2);
        assert_eq!(first.num_atoms, last.num_atoms);

        let d0 = first.distance_matrix(mic);
        let d1 = last.distance_matrix(mic);
        let step = (&d1 - &d0) / (num_images - 1) as f64;
        let targets = (0..num_images).map(|k| &d0 + &step * k as f64).collect();

        Self { targets, mic }
    }

    /// Target distance matrix of image `index`.
    pub fn target(&self, index: usize) -> &DMatrix<f64> {
        &self.targets[index]
    }

    /// Number of images the targets were built for.
    pub fn num_images(&self) -> usize {
        self.targets.len()
    }
}

impl ImagePotential for Idpp {
    fn energy_and_forces(&self, index: usize, image: &Structure) -> (f64, DVector<f64>) {
        let target = &self.targets[index];
        let n = image.num_atoms;
        let mut energy = 0.0;
        let mut forces = DVector::zeros(n * 3);

        for a in 0..n {
            for b in (a + 1)..n {
                // Vector from a to b
                let r = image.displacement(a, b, self.mic);
                let d = r.norm();
                if d == 0.0 {
                    continue;
                }
                let dd = d - target[(a, b)];
                let d4 = d.powi(4);
                energy += dd * dd / d4;

                // dE/dd for this pair
                let de_dd = 2.0 * dd / d4 * (1.0 - 2.0 * dd / d);
                let g = r * (de_dd / d);
                for k in 0..3 {
                    // dd/dr_b = r / d, dd/dr_a = -r / d; force is -gradient
                    forces[b * 3 + k] -= g[k];
                    forces[a * 3 + k] += g[k];
                }
            }
        }

        (energy, forces)
    }
}
