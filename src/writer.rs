//! Writing the chain to disk.
//!
//! Every image goes to `<output_dir>/NN/POSCAR`, and optionally the whole chain
//! to one trajectory file in `<output_dir>`.

use crate::geometry::Structure;
use crate::io::{write_poscar, write_xdatcar, CoordinateMode, StructureError};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Cannot create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Structure(#[from] StructureError),
}

/// Where and how the chain is written.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    pub output_dir: PathBuf,
    /// Name of the combined trajectory, if one is wanted
    pub trajectory: Option<String>,
    pub coordinates: CoordinateMode,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            trajectory: None,
            coordinates: CoordinateMode::Cartesian,
        }
    }
}

/// Digits used for image directory names: at least 2, enough for the
/// largest index of a chain of `len` images.
pub fn directory_width(len: usize) -> usize {
    let largest = len.saturating_sub(1);
    largest.to_string().len().max(2)
}

/// Zero-padded directory name of image `index`.
pub fn image_dir_name(index: usize, width: usize) -> String {
    format!("{:0width$}", index, width = width)
}

fn ensure_dir(path: &Path) -> Result<(), WriteError> {
    fs::create_dir_all(path).map_err(|source| WriteError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes every image and, if requested, the trajectory. Returns the paths
/// of the POSCAR files in chain order.
///
/// Existing image directories are reused; only their `POSCAR` is replaced.
pub fn write_guess(images: &[Structure], options: &WriteOptions) -> Result<Vec<PathBuf>, WriteError> {
    ensure_dir(&options.output_dir)?;
    let width = directory_width(images.len());

    let mut written = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        let dir = options.output_dir.join(image_dir_name(index, width));
        ensure_dir(&dir)?;
        let poscar = dir.join("POSCAR");
        write_poscar(image, &poscar, options.coordinates)?;
        debug!("Wrote {}", poscar.display());
        written.push(poscar);
    }
    info!(
        "Wrote {} images to {}",
        images.len(),
        options.output_dir.display()
    );

    if let Some(name) = &options.trajectory {
        let path = options.output_dir.join(name);
        write_xdatcar(images, &path)?;
        info!("Wrote trajectory {}", path.display());
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{read_frames, read_structure};
    use nalgebra::Matrix3;
    use tempfile::TempDir;

    fn images(n: usize) -> Vec<Structure> {
        (0..n)
            .map(|i| {
                Structure::new(
                    vec!["Na".to_string()],
                    vec![0.1 * i as f64, 0.0, 0.0],
                    Matrix3::from_diagonal_element(6.0),
                )
            })
            .collect()
    }

    fn options(dir: &TempDir) -> WriteOptions {
        WriteOptions {
            output_dir: dir.path().to_path_buf(),
            ..WriteOptions::default()
        }
    }

    #[test]
    fn test_directory_width() {
        assert_eq!(directory_width(1), 2);
        assert_eq!(directory_width(5), 2);
        assert_eq!(directory_width(100), 2);
        assert_eq!(directory_width(101), 3);
        assert_eq!(directory_width(150), 3);
        assert_eq!(directory_width(1001), 4);
        assert_eq!(image_dir_name(7, 2), "07");
        assert_eq!(image_dir_name(149, 3), "149");
    }

    #[test]
    fn test_writes_numbered_poscars() {
        let dir = TempDir::new().unwrap();
        let band = images(5);
        let written = write_guess(&band, &options(&dir)).unwrap();

        assert_eq!(written.len(), 5);
        assert_eq!(written[4], dir.path().join("04").join("POSCAR"));
        let back = read_structure(&written[2]).unwrap();
        assert!((back.get_atom_coords(0)[0] - 0.2).abs() < 1e-8);
        assert!(!dir.path().join("XDATCAR").exists());
    }

    #[test]
    fn test_rewrite_keeps_unrelated_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("01")).unwrap();
        fs::write(dir.path().join("01").join("INCAR"), "ISTART = 0\n").unwrap();
        fs::write(dir.path().join("01").join("POSCAR"), "stale").unwrap();

        write_guess(&images(3), &options(&dir)).unwrap();
        write_guess(&images(3), &options(&dir)).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("01").join("INCAR")).unwrap(),
            "ISTART = 0\n"
        );
        let back = read_structure(&dir.path().join("01").join("POSCAR")).unwrap();
        assert_eq!(back.num_atoms, 1);
    }

    #[test]
    fn test_long_chains_use_three_digits() {
        let dir = TempDir::new().unwrap();
        let written = write_guess(&images(101), &options(&dir)).unwrap();
        assert_eq!(written[0], dir.path().join("000").join("POSCAR"));
        assert_eq!(written[100], dir.path().join("100").join("POSCAR"));
        assert!(!dir.path().join("00").exists());
    }

    #[test]
    fn test_trajectory_holds_every_image() {
        let dir = TempDir::new().unwrap();
        let opts = WriteOptions {
            trajectory: Some("XDATCAR".to_string()),
            ..options(&dir)
        };
        write_guess(&images(4), &opts).unwrap();

        let frames = read_frames(&dir.path().join("XDATCAR")).unwrap();
        assert_eq!(frames.len(), 4);
        assert!((frames[3].get_atom_coords(0)[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_creates_missing_output_dir() {
        let dir = TempDir::new().unwrap();
        let opts = WriteOptions {
            output_dir: dir.path().join("neb").join("guess"),
            ..WriteOptions::default()
        };
        write_guess(&images(2), &opts).unwrap();
        assert!(dir.path().join("neb/guess/01/POSCAR").exists());
    }
}
