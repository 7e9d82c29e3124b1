//! Run options.
//!
//! [`Options`] is the immutable record every stage of a run reads from. It is
//! assembled once from the command line ([`crate::cli::Cli`]) layered on top
//! of the settings files ([`crate::settings::Settings`]).

use crate::cli::Cli;
use crate::io::CoordinateMode;
use crate::optimizer::OptimizerKind;
use crate::path::RefineParams;
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How interior images are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Method {
    /// Straight-line interpolation of Cartesian positions
    #[default]
    Linear,
    /// Linear interpolation refined with the image-dependent pair potential
    Idpp,
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear" => Ok(Method::Linear),
            "idpp" | "pair-potential" => Ok(Method::Idpp),
            other => Err(format!(
                "unknown interpolation method '{}' (expected linear or idpp)",
                other
            )),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Linear => write!(f, "linear"),
            Method::Idpp => write!(f, "idpp"),
        }
    }
}

/// Everything a run needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// One trajectory, or the initial and final structures
    pub images: Vec<PathBuf>,
    /// Total number of images, endpoints included
    pub nimage: usize,
    /// Write the combined trajectory file
    pub output: bool,
    /// Interpolation method
    pub method: Method,
    /// Maximum IDPP optimizer steps
    pub nstep: usize,
    /// Spring constant of the band
    pub spring: f64,
    /// Force convergence threshold for IDPP
    pub fmax: f64,
    /// Optimizer driving IDPP
    pub optimizer: OptimizerKind,
    /// Use the minimum image convention for displacements and distances
    pub mic: bool,
    /// Root directory for all output
    pub output_dir: PathBuf,
    /// File name of the combined trajectory
    pub trajectory_name: String,
    /// Coordinate layout of written POSCAR files
    pub coordinates: CoordinateMode,
}

impl Default for Options {
    fn default() -> Self {
        Self::resolve(Cli::default(), &Settings::default())
    }
}

impl Options {
    /// Merge command-line values over settings; anything not given on the
    /// command line falls back to the settings, which fall back to built-in
    /// defaults.
    pub fn resolve(cli: Cli, settings: &Settings) -> Self {
        let defaults = &settings.defaults;
        Self {
            images: cli.images,
            nimage: cli.nimage.unwrap_or(defaults.nimage),
            output: cli.output,
            method: cli.method.map(Into::into).unwrap_or(defaults.method),
            nstep: cli.nstep.unwrap_or(defaults.nstep),
            spring: cli.spring.unwrap_or(defaults.spring),
            fmax: cli.fmax.unwrap_or(defaults.fmax),
            optimizer: cli.optimizer.map(Into::into).unwrap_or(defaults.optimizer),
            mic: cli.mic || defaults.mic,
            output_dir: if cli.output_dir.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                cli.output_dir
            },
            trajectory_name: settings.output.trajectory_name.clone(),
            coordinates: if cli.direct {
                CoordinateMode::Direct
            } else {
                settings.output.coordinates
            },
        }
    }

    /// Parameters for IDPP refinement.
    pub fn refine_params(&self) -> RefineParams {
        RefineParams {
            spring: self.spring,
            fmax: self.fmax,
            steps: self.nstep,
            optimizer: self.optimizer,
        }
    }
}
