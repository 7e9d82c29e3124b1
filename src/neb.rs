//! Nudged Elastic Band force projection.
//!
//! A [`NebBand`] wraps a chain of images and a per-image potential and exposes
//! the interior images as one flat coordinate vector, so any
//! [`crate::optimizer::Optimizer`] can relax the whole band at once.
//!
//! The NEB force on interior image `i` is the true force with its component
//! along the path tangent removed, plus a spring force along the tangent that
//! depends only on the lengths of the neighbouring segments:
//!
//! ```text
//! F_i = F_i - (F_i . t_i) t_i + k (|R_{i+1} - R_i| - |R_i - R_{i-1}|) t_i
//! ```
//!
//! The tangent `t_i` follows the improved tangent estimate of Henkelman and
//! Jónsson, which points towards the higher-energy neighbour and blends both
//! neighbours at energy extrema.
//!
//! # References
//!
//! - Henkelman, G.; Jónsson, H. *J. Chem. Phys.* **2000**, 113, 9978-9985.

use crate::geometry::Structure;
use crate::optimizer::Optimizable;
use nalgebra::{DVector, Vector3};

/// Energy and forces of a single image.
pub trait ImagePotential {
    /// Returns the energy and flat Cartesian forces of image `index`.
    fn energy_and_forces(&self, index: usize, image: &Structure) -> (f64, DVector<f64>);
}

/// A band of images relaxed under NEB forces.
pub struct NebBand<'a, P: ImagePotential> {
    images: &'a mut [Structure],
    potential: &'a P,
    spring: f64,
    mic: bool,
    /// Number of force evaluations of the whole band
    pub evaluations: usize,
}

impl<'a, P: ImagePotential> NebBand<'a, P> {
    /// Creates a band over `images`; the first and last image stay fixed.
    ///
    /// # Panics
    ///
    /// Panics if the band has fewer than three images.
    pub fn new(images: &'a mut [Structure], potential: &'a P, spring: f64, mic: bool) -> Self {
        assert!(images.len() >= 3, "a band needs at least one interior image");
        Self {
            images,
            potential,
            spring,
            mic,
            evaluations: 0,
        }
    }

    fn atoms(&self) -> usize {
        self.images[0].num_atoms
    }

    fn interior(&self) -> usize {
        self.images.len() - 2
    }

    /// Vector from image `from` to image `to`.
    fn image_difference(&self, from: usize, to: usize) -> DVector<f64> {
        let mut d = &self.images[to].coords - &self.images[from].coords;
        if self.mic {
            let reference = &self.images[from];
            for atom in 0..self.atoms() {
                let v = Vector3::new(d[atom * 3], d[atom * 3 + 1], d[atom * 3 + 2]);
                let w = reference.minimum_image(&v);
                for k in 0..3 {
                    d[atom * 3 + k] = w[k];
                }
            }
        }
        d
    }

    /// Energies of every image, endpoints included.
    pub fn energies(&self) -> Vec<f64> {
        self.images
            .iter()
            .enumerate()
            .map(|(i, image)| self.potential.energy_and_forces(i, image).0)
            .collect()
    }
}

/// Improved tangent estimate at an interior image.
///
/// `t_prev` and `t_next` are the segments arriving at and leaving the image.
/// The result is normalized.
pub fn improved_tangent(
    t_prev: &DVector<f64>,
    t_next: &DVector<f64>,
    e_prev: f64,
    e_here: f64,
    e_next: f64,
) -> DVector<f64> {
    let tangent = if e_next > e_here && e_here > e_prev {
        t_next.clone()
    } else if e_next < e_here && e_here < e_prev {
        t_prev.clone()
    } else {
        let dv_max = (e_next - e_here).abs().max((e_prev - e_here).abs());
        let dv_min = (e_next - e_here).abs().min((e_prev - e_here).abs());
        if e_next > e_prev {
            t_next * dv_max + t_prev * dv_min
        } else {
            t_next * dv_min + t_prev * dv_max
        }
    };

    let norm = tangent.norm();
    if norm > 1e-300 {
        return tangent / norm;
    }

    // Flat energy profile: use the bisector of the two segments
    let mut bisector = DVector::zeros(t_prev.len());
    for t in [t_prev, t_next] {
        let n = t.norm();
        if n > 0.0 {
            bisector += t / n;
        }
    }
    let norm = bisector.norm();
    if norm > 0.0 {
        bisector / norm
    } else {
        bisector
    }
}

impl<'a, P: ImagePotential> Optimizable for NebBand<'a, P> {
    fn positions(&self) -> DVector<f64> {
        let width = self.atoms() * 3;
        let mut x = DVector::zeros(self.interior() * width);
        for i in 0..self.interior() {
            x.rows_mut(i * width, width)
                .copy_from(&self.images[i + 1].coords);
        }
        x
    }

    fn set_positions(&mut self, x: &DVector<f64>) {
        let width = self.atoms() * 3;
        for i in 0..self.interior() {
            let block = x.rows(i * width, width).into_owned();
            self.images[i + 1].set_coords(&block);
        }
    }

    fn forces(&mut self) -> DVector<f64> {
        self.evaluations += 1;
        let n = self.images.len();
        let width = self.atoms() * 3;

        let evaluated: Vec<(f64, DVector<f64>)> = self
            .images
            .iter()
            .enumerate()
            .map(|(i, image)| self.potential.energy_and_forces(i, image))
            .collect();

        let mut out = DVector::zeros((n - 2) * width);
        let mut t_next = self.image_difference(0, 1);
        for i in 1..n - 1 {
            let t_prev = t_next;
            t_next = self.image_difference(i, i + 1);

            let tangent = improved_tangent(
                &t_prev,
                &t_next,
                evaluated[i - 1].0,
                evaluated[i].0,
                evaluated[i + 1].0,
            );

            let mut f = evaluated[i].1.clone();
            let ft = f.dot(&tangent);
            f -= &tangent * ft;
            let spring = (t_next.norm() - t_prev.norm()) * self.spring;
            f += &tangent * spring;

            let image = &self.images[i];
            for atom in 0..image.num_atoms {
                for k in 0..3 {
                    if !image.is_free(atom, k) {
                        f[atom * 3 + k] = 0.0;
                    }
                }
            }

            out.rows_mut((i - 1) * width, width).copy_from(&f);
        }
        out
    }
}
