//! Defines the command-line interface.

use crate::config::Method;
use crate::optimizer::OptimizerKind;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(
    name = "makeneb",
    version,
    about = "Generate an initial guess for a Nudged Elastic Band path.",
    long_about = "Generate an initial guess for a Nudged Elastic Band path.\n\n\
        Reads the endpoints from one trajectory (first and last frame) or from two \
        structure files, interpolates the interior images linearly or with the \
        image-dependent pair potential (IDPP), and writes every image to 00/POSCAR, \
        01/POSCAR, ... in the output directory."
)]
pub struct Cli {
    /// Images defining the path from initial to final state: one trajectory,
    /// or the initial and final structures.
    #[arg(
        short = 'i',
        long = "images",
        value_name = "FILE",
        num_args = 1..,
        required_unless_present = "write_config"
    )]
    pub images: Vec<PathBuf>,

    /// Number of images in the band, endpoints included. [default: 6]
    #[arg(short = 'n', long, value_name = "N", value_parser = parse_nimage)]
    pub nimage: Option<usize>,

    /// Also write every image to a combined XDATCAR trajectory.
    #[arg(short = 'o', long)]
    pub output: bool,

    /// Interpolation method for the initial guess; idpp may also be given as
    /// pair-potential. [default: linear]
    #[arg(long, value_enum, ignore_case = true)]
    pub method: Option<MethodArg>,

    /// Maximum number of IDPP optimizer steps. [default: 100]
    #[arg(long, value_name = "STEPS")]
    pub nstep: Option<usize>,

    /// Spring constant of the band. [default: 0.1]
    #[arg(long, value_name = "K")]
    pub spring: Option<f64>,

    /// Force convergence threshold for IDPP. [default: 0.1]
    #[arg(long, value_name = "FORCE")]
    pub fmax: Option<f64>,

    /// Optimizer used in the IDPP iterations. [default: MDMin]
    #[arg(long, value_enum, ignore_case = true)]
    pub optimizer: Option<OptimizerArg>,

    /// Use the minimum image convention for displacements and distances.
    #[arg(long)]
    pub mic: bool,

    /// Directory in which the image directories and trajectory are written.
    #[arg(short = 'd', long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Write POSCAR positions as fractional (Direct) coordinates.
    #[arg(long)]
    pub direct: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Write a commented makeneb_config.cfg template to the current directory and exit.
    #[arg(long)]
    pub write_config: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodArg {
    /// Straight-line interpolation
    Linear,
    /// Image-dependent pair potential (alias: pair-potential)
    #[value(alias = "pair-potential")]
    Idpp,
}

impl From<MethodArg> for Method {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Linear => Method::Linear,
            MethodArg::Idpp => Method::Idpp,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizerArg {
    #[value(name = "MDMin")]
    MdMin,
    #[value(name = "BFGS")]
    Bfgs,
    #[value(name = "LBFGS")]
    Lbfgs,
    #[value(name = "FIRE")]
    Fire,
}

impl From<OptimizerArg> for OptimizerKind {
    fn from(arg: OptimizerArg) -> Self {
        match arg {
            OptimizerArg::MdMin => OptimizerKind::MdMin,
            OptimizerArg::Bfgs => OptimizerKind::Bfgs,
            OptimizerArg::Lbfgs => OptimizerKind::Lbfgs,
            OptimizerArg::Fire => OptimizerKind::Fire,
        }
    }
}

fn parse_nimage(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a whole number", s))?;
    if n < 2 {
        return Err("a band needs at least the two endpoints".to_string());
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn try_parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("makeneb").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_full_flag_set() {
        let cli = try_parse(&[
            "-i", "IS/POSCAR", "FS/POSCAR", "-n", "8", "-o", "--method", "idpp", "--nstep", "50",
            "--spring", "0.2", "--fmax", "0.05", "--optimizer", "FIRE",
        ])
        .unwrap();

        assert_eq!(cli.images.len(), 2);
        assert_eq!(cli.nimage, Some(8));
        assert!(cli.output);
        assert_eq!(cli.method, Some(MethodArg::Idpp));
        assert_eq!(cli.nstep, Some(50));
        assert_eq!(cli.spring, Some(0.2));
        assert_eq!(cli.fmax, Some(0.05));
        assert_eq!(cli.optimizer, Some(OptimizerArg::Fire));
    }

    #[test]
    fn test_pair_potential_alias_and_case() {
        let cli = try_parse(&["-i", "XDATCAR", "--method", "pair-potential", "--optimizer", "lbfgs"])
            .unwrap();
        assert_eq!(cli.method, Some(MethodArg::Idpp));
        assert_eq!(cli.optimizer, Some(OptimizerArg::Lbfgs));
    }

    #[test]
    fn test_help_mentions_pair_potential_spelling() {
        let mut command = Cli::command();
        let help = command.render_long_help().to_string();
        assert!(help.contains("pair-potential"));
    }

    #[test]
    fn test_images_required() {
        assert!(try_parse(&["-n", "5"]).is_err());
        assert!(try_parse(&["--write-config"]).is_ok());
    }

    #[test]
    fn test_nimage_lower_bound() {
        assert!(try_parse(&["-i", "XDATCAR", "-n", "1"]).is_err());
        assert!(try_parse(&["-i", "XDATCAR", "-n", "two"]).is_err());
        assert_eq!(try_parse(&["-i", "XDATCAR", "-n", "2"]).unwrap().nimage, Some(2));
    }

    #[test]
    fn test_rejects_unknown_choices() {
        assert!(try_parse(&["-i", "XDATCAR", "--method", "spline"]).is_err());
        assert!(try_parse(&["-i", "XDATCAR", "--optimizer", "CG"]).is_err());
    }

    #[test]
    fn test_verbosity_counts() {
        assert_eq!(try_parse(&["-i", "XDATCAR", "-vv"]).unwrap().verbose, 2);
    }
}
