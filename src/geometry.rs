//! Core atomic structure representation.
//!
//! This module provides the [`Structure`] type used by every stage of the path
//! builder: readers produce it, the interpolators move its atoms and the
//! writers serialize it again.
//!
//! All positions are Cartesian in Angstroms. The cell is stored with lattice
//! vectors as *rows*, which is the layout used by POSCAR and XDATCAR files.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

/// Determinants below this value are treated as "no cell".
const CELL_EPS: f64 = 1e-12;

/// Represents an atomic structure with chemical symbols, Cartesian positions
/// and an optional periodic cell.
///
/// Positions use the same flat layout as the optimizers work on:
/// `[x1, y1, z1, x2, y2, z2, ...]`. Cloning a `Structure` produces a fully
/// independent deep copy, so images of a chain never alias each other.
///
/// # Examples
///
/// ```
/// use makeneb::geometry::Structure;
/// use nalgebra::Matrix3;
///
/// let cell = Matrix3::from_diagonal_element(10.0);
/// let water = Structure::new(
///     vec!["O".to_string(), "H".to_string(), "H".to_string()],
///     vec![0.0, 0.0, 0.0, 0.757, 0.586, 0.0, -0.757, 0.586, 0.0],
///     cell,
/// );
/// assert_eq!(water.num_atoms, 3);
/// assert_eq!(water.get_atom_coords(1), [0.757, 0.586, 0.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    /// Chemical symbols of each atom in file order
    pub elements: Vec<String>,
    /// Flattened Cartesian coordinates in Angstroms
    pub coords: DVector<f64>,
    /// Lattice vectors as rows, in Angstroms. Zero for non-periodic input.
    pub cell: Matrix3<f64>,
    /// Selective dynamics flags per atom and axis (`true` = free to move)
    pub selective: Option<Vec<[bool; 3]>>,
    /// Number of atoms
    pub num_atoms: usize,
}

impl Structure {
    /// Create a new `Structure` from symbols, flat coordinates and a cell.
    ///
    /// # Panics
    ///
    /// Panics if `coords.len() != elements.len() * 3`.
    pub fn new(elements: Vec<String>, coords: Vec<f64>, cell: Matrix3<f64>) -> Self {
        let num_atoms = elements.len();
        assert_eq!(coords.len(), num_atoms * 3);
        Self {
            elements,
            coords: DVector::from_vec(coords),
            cell,
            selective: None,
            num_atoms,
        }
    }

    /// Create a non-periodic structure (zero cell).
    pub fn molecule(elements: Vec<String>, coords: Vec<f64>) -> Self {
        Self::new(elements, coords, Matrix3::zeros())
    }

    /// Attach selective dynamics flags.
    ///
    /// # Panics
    ///
    /// Panics if there is not exactly one flag triple per atom.
    pub fn with_selective(mut self, flags: Vec<[bool; 3]>) -> Self {
        assert_eq!(flags.len(), self.num_atoms);
        self.selective = Some(flags);
        self
    }

    /// Get the Cartesian coordinates of a specific atom.
    pub fn get_atom_coords(&self, atom_idx: usize) -> [f64; 3] {
        let i = atom_idx * 3;
        [self.coords[i], self.coords[i + 1], self.coords[i + 2]]
    }

    /// Position of an atom as a vector.
    pub fn position(&self, atom_idx: usize) -> Vector3<f64> {
        let i = atom_idx * 3;
        Vector3::new(self.coords[i], self.coords[i + 1], self.coords[i + 2])
    }

    /// Overwrite the position of a single atom.
    pub fn set_position(&mut self, atom_idx: usize, pos: &Vector3<f64>) {
        let i = atom_idx * 3;
        self.coords[i] = pos.x;
        self.coords[i + 1] = pos.y;
        self.coords[i + 2] = pos.z;
    }

    /// Replace all coordinates, leaving every Cartesian component whose
    /// selective dynamics flag is `false` where it is.
    ///
    /// # Panics
    ///
    /// Panics if `coords` has the wrong length.
    pub fn set_coords(&mut self, coords: &DVector<f64>) {
        assert_eq!(coords.len(), self.num_atoms * 3);
        for atom in 0..self.num_atoms {
            for k in 0..3 {
                if self.is_free(atom, k) {
                    self.coords[atom * 3 + k] = coords[atom * 3 + k];
                }
            }
        }
    }

    /// Whether component `axis` (0, 1, 2 for x, y, z) of an atom may move.
    pub fn is_free(&self, atom_idx: usize, axis: usize) -> bool {
        self.selective
            .as_ref()
            .map(|flags| flags[atom_idx][axis])
            .unwrap_or(true)
    }

    /// Whether the atom is completely frozen by selective dynamics.
    pub fn is_fixed(&self, atom_idx: usize) -> bool {
        (0..3).all(|axis| !self.is_free(atom_idx, axis))
    }

    /// Returns true if the cell spans a non-zero volume.
    pub fn has_cell(&self) -> bool {
        self.cell.determinant().abs() > CELL_EPS
    }

    /// Cell volume in cubic Angstroms.
    pub fn volume(&self) -> f64 {
        self.cell.determinant().abs()
    }

    /// Fractional coordinates of every atom, or `None` if the cell is singular.
    pub fn scaled_positions(&self) -> Option<Vec<Vector3<f64>>> {
        // r_row = f_row * C  =>  f = (C^T)^-1 r
        let inv = self.cell.transpose().try_inverse()?;
        if !self.has_cell() {
            return None;
        }
        Some((0..self.num_atoms).map(|i| inv * self.position(i)).collect())
    }

    /// Convert a fractional coordinate into Cartesian coordinates in this cell.
    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.cell.transpose() * frac
    }

    /// Consecutive runs of identical symbols, as written on the species and
    /// count lines of VASP files.
    ///
    /// ```
    /// use makeneb::geometry::Structure;
    ///
    /// let s = Structure::molecule(
    ///     ["C", "H", "H", "C"].iter().map(|s| s.to_string()).collect(),
    ///     vec![0.0; 12],
    /// );
    /// let runs = s.species_runs();
    /// assert_eq!(runs, vec![("C".to_string(), 1), ("H".to_string(), 2), ("C".to_string(), 1)]);
    /// ```
    pub fn species_runs(&self) -> Vec<(String, usize)> {
        let mut runs: Vec<(String, usize)> = Vec::new();
        for symbol in &self.elements {
            match runs.last_mut() {
                Some((last, count)) if last == symbol => *count += 1,
                _ => runs.push((symbol.clone(), 1)),
            }
        }
        runs
    }

    /// Reduce a displacement to its shortest periodic image.
    ///
    /// For structures without a cell the displacement is returned unchanged.
    pub fn minimum_image(&self, d: &Vector3<f64>) -> Vector3<f64> {
        let inv = match self.cell.transpose().try_inverse() {
            Some(inv) if self.has_cell() => inv,
            _ => return *d,
        };
        let frac = inv * d;
        let wrapped = frac.map(|f| f - f.round());
        let base = self.to_cartesian(&wrapped);

        // Rounding in fractional space is exact only for orthogonal cells,
        // so check the neighbouring images for skewed ones.
        let mut best = base;
        let mut best_norm = base.norm_squared();
        for i in -1..=1 {
            for j in -1..=1 {
                for k in -1..=1 {
                    if i == 0 && j == 0 && k == 0 {
                        continue;
                    }
                    let shift = Vector3::new(i as f64, j as f64, k as f64);
                    let candidate = base + self.to_cartesian(&shift);
                    let norm = candidate.norm_squared();
                    if norm < best_norm {
                        best = candidate;
                        best_norm = norm;
                    }
                }
            }
        }
        best
    }

    /// Vector from atom `a` to atom `b`, optionally under the minimum image
    /// convention.
    pub fn displacement(&self, a: usize, b: usize, mic: bool) -> Vector3<f64> {
        let d = self.position(b) - self.position(a);
        if mic {
            self.minimum_image(&d)
        } else {
            d
        }
    }

    /// Full interatomic distance matrix.
    pub fn distance_matrix(&self, mic: bool) -> DMatrix<f64> {
        let n = self.num_atoms;
        let mut d = DMatrix::zeros(n, n);
        for a in 0..n {
            for b in (a + 1)..n {
                let r = self.displacement(a, b, mic).norm();
                d[(a, b)] = r;
                d[(b, a)] = r;
            }
        }
        d
    }

    /// Check that another structure describes the same atoms in the same
    /// order, which is required for interpolating between the two.
    pub fn same_atoms_as(&self, other: &Structure) -> bool {
        self.num_atoms == other.num_atoms && self.elements == other.elements
    }
}
