//! Building the chain of images.
//!
//! [`build_path`] turns [`Options`] into a [`Chain`]: it reads the endpoints,
//! fills the band with copies of the initial structure and hands it to an
//! [`Interpolator`]. The interpolator is a trait object so the orchestration
//! can be exercised without any numerics.

use crate::config::{Method, Options};
use crate::geometry::Structure;
use crate::idpp::Idpp;
use crate::interpolation::{image_spacings, interpolate_linear, path_length, validate_images};
use crate::io::{read_frames, read_structure, StructureError};
use crate::neb::NebBand;
use crate::optimizer::{self, OptimizationReport, OptimizerKind};
use log::{debug, info, warn};
use std::path::PathBuf;
use thiserror::Error;

/// Message reported when neither a trajectory nor two endpoints are given.
pub const INPUT_COUNT_MESSAGE: &str = "expected a trajectory or exactly two endpoint structures";

/// Errors raised while building the chain.
#[derive(Error, Debug)]
pub enum PathError {
    /// Wrong number of `-i` paths
    #[error("expected a trajectory or exactly two endpoint structures")]
    InputCount(usize),
    /// Reading an endpoint failed
    #[error(transparent)]
    Structure(#[from] StructureError),
    /// The endpoints describe different systems
    #[error("Initial and final images differ: {0}")]
    ImageMismatch(String),
    /// Fewer than the two endpoints were requested
    #[error("A band needs at least 2 images, got {0}")]
    InvalidImageCount(usize),
    /// Interpolation produced an unusable band
    #[error("Interpolated band is invalid: {0}")]
    InvalidBand(String),
}

/// Ordered images from the initial to the final state.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    images: Vec<Structure>,
}

impl Chain {
    /// `[initial] + (nimage - 2) copies of initial + [final]`.
    pub fn new(initial: Structure, last: Structure, nimage: usize) -> Result<Self, PathError> {
        if nimage < 2 {
            return Err(PathError::InvalidImageCount(nimage));
        }
        if initial.num_atoms != last.num_atoms {
            return Err(PathError::ImageMismatch(format!(
                "{} atoms in the initial image, {} in the final image",
                initial.num_atoms, last.num_atoms
            )));
        }
        if let Some(atom) = (0..initial.num_atoms).find(|&a| initial.elements[a] != last.elements[a])
        {
            return Err(PathError::ImageMismatch(format!(
                "atom {} is {} in the initial image but {} in the final image",
                atom, initial.elements[atom], last.elements[atom]
            )));
        }

        let mut images = Vec::with_capacity(nimage);
        images.push(initial.clone());
        for _ in 0..nimage - 2 {
            images.push(initial.clone());
        }
        images.push(last);
        Ok(Self { images })
    }

    pub fn images(&self) -> &[Structure] {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut [Structure] {
        &mut self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn into_images(self) -> Vec<Structure> {
        self.images
    }
}

/// Parameters of IDPP refinement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefineParams {
    /// Spring constant of the band
    pub spring: f64,
    /// Stop once the largest per-atom force is below this value
    pub fmax: f64,
    /// Maximum number of optimizer steps
    pub steps: usize,
    /// Optimizer driving the band
    pub optimizer: OptimizerKind,
}

/// Fills the interior of a chain.
pub trait Interpolator {
    /// Straight-line interpolation between the endpoints.
    fn interpolate(&self, chain: &mut Chain) -> Result<(), PathError>;

    /// Relax an interpolated chain on the IDPP surface.
    fn refine(
        &self,
        chain: &mut Chain,
        params: &RefineParams,
    ) -> Result<OptimizationReport, PathError>;
}

/// The interpolator used by the command-line tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct BandInterpolator {
    /// Apply the minimum image convention
    pub mic: bool,
}

impl BandInterpolator {
    pub fn new(mic: bool) -> Self {
        Self { mic }
    }
}

impl Interpolator for BandInterpolator {
    fn interpolate(&self, chain: &mut Chain) -> Result<(), PathError> {
        interpolate_linear(chain.images_mut(), self.mic);
        Ok(())
    }

    fn refine(
        &self,
        chain: &mut Chain,
        params: &RefineParams,
    ) -> Result<OptimizationReport, PathError> {
        let n = chain.len();
        if n < 3 {
            debug!("No interior images, skipping IDPP refinement");
            return Ok(OptimizationReport {
                steps: 0,
                converged: true,
                max_force: 0.0,
            });
        }

        let images = chain.images_mut();
        let idpp = Idpp::new(&images[0], &images[n - 1], n, self.mic);
        let mut band = NebBand::new(images, &idpp, params.spring, self.mic);
        let mut driver = params.optimizer.build();
        let report = optimizer::run(driver.as_mut(), &mut band, params.fmax, params.steps);
        debug!("IDPP used {} band force evaluations", band.evaluations);
        let profile: Vec<String> = band.energies().iter().map(|e| format!("{:.4}", e)).collect();
        debug!("IDPP energy profile: [{}]", profile.join(", "));

        if !report.converged {
            warn!(
                "IDPP did not reach fmax {} within {} steps (max force {:.4})",
                params.fmax, params.steps, report.max_force
            );
        }
        Ok(report)
    }
}

/// Reads the initial and final structures named by `images`.
///
/// One path is read as a trajectory whose first and last frames are the
/// endpoints. Two paths are read as single structures, using the last frame
/// of any multi-frame file. The count is checked before anything is read.
pub fn load_endpoints(images: &[PathBuf]) -> Result<(Structure, Structure), PathError> {
    match images {
        [trajectory] => {
            let mut frames = read_frames(trajectory)?;
            info!(
                "Read {} frame(s) from {}",
                frames.len(),
                trajectory.display()
            );
            let last = frames
                .pop()
                .ok_or_else(|| StructureError::Empty(trajectory.display().to_string()))?;
            let first = if frames.is_empty() {
                last.clone()
            } else {
                frames.swap_remove(0)
            };
            Ok((first, last))
        }
        [initial, last] => {
            let first = read_structure(initial)?;
            let last = read_structure(last)?;
            Ok((first, last))
        }
        _ => Err(PathError::InputCount(images.len())),
    }
}

/// Builds the initial-guess chain described by `options`.
pub fn build_path(options: &Options, interpolator: &dyn Interpolator) -> Result<Chain, PathError> {
    let (initial, last) = load_endpoints(&options.images)?;
    info!(
        "Endpoints: {} atoms, building {} images with {} interpolation",
        initial.num_atoms, options.nimage, options.method
    );

    let mut chain = Chain::new(initial, last, options.nimage)?;
    interpolator.interpolate(&mut chain)?;

    if options.method == Method::Idpp {
        let params = options.refine_params();
        info!(
            "Refining with IDPP: {}, fmax {}, at most {} steps, spring {}",
            params.optimizer, params.fmax, params.steps, params.spring
        );
        let report = interpolator.refine(&mut chain, &params)?;
        info!(
            "IDPP finished after {} step(s), converged: {}",
            report.steps, report.converged
        );
    }

    validate_images(chain.images()).map_err(PathError::InvalidBand)?;

    let spacings = image_spacings(chain.images());
    let longest = spacings.iter().cloned().fold(0.0, f64::max);
    let shortest = spacings.iter().cloned().fold(f64::INFINITY, f64::min);
    info!(
        "Path length {:.4} A, image spacing {:.4} to {:.4} A",
        path_length(chain.images()),
        shortest,
        longest
    );

    Ok(chain)
}
