//! makeneb - initial path guesses for Nudged Elastic Band calculations
//!
//! makeneb takes the two endpoints of a reaction, either as two structure
//! files or as the first and last frame of one trajectory, and writes a band
//! of images between them in the directory layout VASP expects for NEB runs:
//!
//! ```text
//! 00/POSCAR   initial state
//! 01/POSCAR
//! ...
//! NN/POSCAR   final state
//! ```
//!
//! # Methods
//!
//! - **linear**: image `i` of `n` sits at `r_0 + i * (r_last - r_0) / (n - 1)`
//! - **idpp**: the linear band is relaxed on the image-dependent pair
//!   potential, whose minimum keeps every interatomic distance close to a
//!   linear interpolation of the endpoint distances. This avoids atoms
//!   passing through each other.
//!
//! # Quick Start
//!
//! ```no_run
//! use makeneb::config::Options;
//! use makeneb::path::BandInterpolator;
//!
//! let options = Options {
//!     images: vec!["IS/CONTCAR".into(), "FS/CONTCAR".into()],
//!     nimage: 7,
//!     ..Options::default()
//! };
//! let chain = makeneb::run(&options, &BandInterpolator::new(options.mic))?;
//! println!("wrote {} images", chain.len());
//! # Ok::<(), makeneb::error::MakenebError>(())
//! ```
//!
//! # Modules
//!
//! - [`cli`](cli/index.html) - Command-line interface
//! - [`config`](config/index.html) - Run options
//! - [`settings`](settings/index.html) - INI configuration files
//! - [`geometry`](geometry/index.html) - Periodic structures
//! - [`io`](io/index.html) - POSCAR, XDATCAR and XYZ readers and writers
//! - [`interpolation`](interpolation/index.html) - Linear interpolation
//! - [`idpp`](idpp/index.html) - Image-dependent pair potential
//! - [`neb`](neb/index.html) - NEB force projection
//! - [`optimizer`](optimizer/index.html) - MDMin, FIRE, BFGS and LBFGS
//! - [`path`](path/index.html) - Chain construction
//! - [`writer`](writer/index.html) - Output layout
//!
//! # References
//!
//! - Henkelman, G.; Jónsson, H. *J. Chem. Phys.* **2000**, 113, 9978-9985.
//! - Smidstrup, S.; Pedersen, A.; Stokbro, K.; Jónsson, H.
//!   *J. Chem. Phys.* **2014**, 140, 214106.

pub mod cli;
pub mod config;
/// Top-level error type
pub mod error;
pub mod geometry;
pub mod idpp;
/// Linear interpolation and path metrics
pub mod interpolation;
pub mod io;
pub mod neb;
pub mod optimizer;
pub mod path;
/// Configuration management system
pub mod settings;
pub mod writer;

pub use config::Options;
pub use geometry::Structure;

use error::MakenebError;
use path::{build_path, Chain, Interpolator};
use writer::{write_guess, WriteOptions};

/// Builds the chain described by `options` and writes it to disk.
pub fn run(options: &Options, interpolator: &dyn Interpolator) -> Result<Chain, MakenebError> {
    let chain = build_path(options, interpolator)?;
    let write_options = WriteOptions {
        output_dir: options.output_dir.clone(),
        trajectory: options.output.then(|| options.trajectory_name.clone()),
        coordinates: options.coordinates,
    };
    write_guess(chain.images(), &write_options)?;
    Ok(chain)
}
