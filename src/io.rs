//! Structure file I/O.
//!
//! Readers and writers for the geometry formats used around NEB workflows:
//!
//! - POSCAR / CONTCAR (VASP 4 and VASP 5 layouts, selective dynamics)
//! - XDATCAR trajectories (fixed-cell and variable-cell)
//! - XYZ / extended XYZ trajectories
//!
//! The format is inferred from the file name. Readers always return
//! Cartesian positions in Angstroms; see [`crate::geometry::Structure`].

use crate::geometry::Structure;
use lazy_static::lazy_static;
use log::debug;
use nalgebra::{Matrix3, Vector3};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

lazy_static! {
    // "Direct configuration=     1" / "Cartesian configuration= 12"
    static ref CONFIG_RE: Regex =
        Regex::new(r"^\s*(Direct|Cartesian)\s+configuration\s*=?\s*(\d+)?").unwrap();
    // Lattice="a1x a1y a1z a2x ..." in an extended XYZ comment line
    static ref LATTICE_RE: Regex = Regex::new(r#"Lattice\s*=\s*"([^"]*)""#).unwrap();
}

/// Errors raised while reading or writing structure files.
#[derive(Error, Debug)]
pub enum StructureError {
    /// I/O error on a specific file
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        /// File that could not be read or written
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// The file name does not identify a supported format
    #[error("Cannot infer structure format of {}", .0.display())]
    UnknownFormat(PathBuf),
    /// Malformed content
    #[error("Parse error in {origin} (line {line}): {message}")]
    Parse {
        /// File name or other label of the parsed text
        origin: String,
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },
    /// A trajectory without a single frame
    #[error("{0} contains no structures")]
    Empty(String),
    /// Fractional coordinates were requested for a structure without a cell
    #[error("Cell of {0} is singular, fractional coordinates are undefined")]
    SingularCell(String),
    /// Frames of a trajectory disagree on their atoms
    #[error("Frames of {0} do not share the same atoms")]
    InconsistentFrames(String),
}

type Result<T> = std::result::Result<T, StructureError>;

/// Structure file formats understood by the readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// VASP POSCAR / CONTCAR
    Poscar,
    /// VASP XDATCAR trajectory
    Xdatcar,
    /// Plain or extended XYZ
    Xyz,
}

impl Format {
    /// Infer the format from a file name.
    ///
    /// ```
    /// use makeneb::io::Format;
    /// use std::path::Path;
    ///
    /// assert_eq!(Format::from_path(Path::new("00/POSCAR")), Some(Format::Poscar));
    /// assert_eq!(Format::from_path(Path::new("initial.vasp")), Some(Format::Poscar));
    /// assert_eq!(Format::from_path(Path::new("XDATCAR")), Some(Format::Xdatcar));
    /// assert_eq!(Format::from_path(Path::new("band.xyz")), Some(Format::Xyz));
    /// assert_eq!(Format::from_path(Path::new("notes.txt")), None);
    /// ```
    pub fn from_path(path: &Path) -> Option<Format> {
        let name = path.file_name()?.to_str()?.to_uppercase();
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        if name.contains("XDATCAR") || extension == "xdatcar" {
            return Some(Format::Xdatcar);
        }
        if name.contains("POSCAR") || name.contains("CONTCAR") {
            return Some(Format::Poscar);
        }
        match extension.as_str() {
            "vasp" | "poscar" | "contcar" => Some(Format::Poscar),
            "xyz" | "extxyz" => Some(Format::Xyz),
            _ => None,
        }
    }
}

/// How positions are written to POSCAR files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoordinateMode {
    /// Cartesian coordinates in Angstroms
    #[default]
    Cartesian,
    /// Fractional coordinates of the cell
    Direct,
}

impl FromStr for CoordinateMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cartesian" | "c" | "k" => Ok(CoordinateMode::Cartesian),
            "direct" | "d" | "fractional" => Ok(CoordinateMode::Direct),
            other => Err(format!("unknown coordinate mode '{}'", other)),
        }
    }
}

impl fmt::Display for CoordinateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateMode::Cartesian => write!(f, "cartesian"),
            CoordinateMode::Direct => write!(f, "direct"),
        }
    }
}

/// Reads every frame stored in a structure file.
///
/// Single-frame formats (POSCAR) yield a one-element vector.
///
/// # Errors
///
/// Returns [`StructureError::UnknownFormat`] for unrecognized file names,
/// [`StructureError::Io`] if the file cannot be read, and
/// [`StructureError::Parse`] / [`StructureError::Empty`] for bad content.
pub fn read_frames(path: &Path) -> Result<Vec<Structure>> {
    let format =
        Format::from_path(path).ok_or_else(|| StructureError::UnknownFormat(path.to_path_buf()))?;
    let content = fs::read_to_string(path).map_err(|source| StructureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let origin = path.display().to_string();

    let frames = match format {
        Format::Poscar => vec![parse_poscar(&content, &origin)?],
        Format::Xdatcar => parse_xdatcar(&content, &origin)?,
        Format::Xyz => parse_xyz(&content, &origin)?,
    };
    debug!("Read {} frame(s) from {} as {:?}", frames.len(), origin, format);

    if frames.is_empty() {
        return Err(StructureError::Empty(origin));
    }
    Ok(frames)
}

/// Reads a single structure. For trajectory files the last frame is used.
pub fn read_structure(path: &Path) -> Result<Structure> {
    let mut frames = read_frames(path)?;
    frames
        .pop()
        .ok_or_else(|| StructureError::Empty(path.display().to_string()))
}

/// Line cursor that remembers where it is for error messages.
struct Cursor<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    origin: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(content: &'a str, origin: &'a str) -> Self {
        Self {
            lines: content.lines().collect(),
            pos: 0,
            origin,
        }
    }

    fn error(&self, message: impl Into<String>) -> StructureError {
        StructureError::Parse {
            origin: self.origin.to_string(),
            line: self.pos.max(1),
            message: message.into(),
        }
    }

    fn next(&mut self, what: &str) -> Result<&'a str> {
        match self.lines.get(self.pos).copied() {
            Some(line) => {
                self.pos += 1;
                Ok(line)
            }
            None => {
                self.pos += 1;
                Err(self.error(format!("unexpected end of file while reading {}", what)))
            }
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn skip_blank(&mut self) {
        while matches!(self.peek(), Some(line) if line.trim().is_empty()) {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.lines.len()
    }

    fn floats(&self, line: &str, count: usize, what: &str) -> Result<Vec<f64>> {
        let values: Vec<f64> = line
            .split_whitespace()
            .take(count)
            .map(|t| t.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| self.error(format!("invalid number in {}: '{}'", what, line.trim())))?;
        if values.len() < count {
            return Err(self.error(format!(
                "expected {} values in {}, found {}",
                count,
                what,
                values.len()
            )));
        }
        Ok(values)
    }
}

/// Cell, symbols and title shared by POSCAR and XDATCAR headers.
struct VaspHeader {
    title: String,
    cell: Matrix3<f64>,
    elements: Vec<String>,
    scale: f64,
}

fn parse_vasp_header(cur: &mut Cursor<'_>) -> Result<VaspHeader> {
    let title = cur.next("title")?.trim().to_string();

    let scale_line = cur.next("scale factor")?;
    let scale_raw = cur.floats(scale_line, 1, "scale factor")?[0];

    let mut rows = [[0.0; 3]; 3];
    for row in rows.iter_mut() {
        let line = cur.next("lattice vector")?;
        let v = cur.floats(line, 3, "lattice vector")?;
        row.copy_from_slice(&v);
    }
    let raw_cell = Matrix3::from_row_slice(&rows.concat());

    // Negative scale means "target volume"
    let scale = if scale_raw < 0.0 {
        let volume = raw_cell.determinant().abs();
        if volume == 0.0 {
            return Err(cur.error("negative scale factor with a singular cell"));
        }
        (-scale_raw / volume).cbrt()
    } else {
        scale_raw
    };

    // VASP 5 has a symbol line before the counts, VASP 4 takes symbols from the title
    let line = cur.next("atom counts")?;
    let first_is_count = line
        .split_whitespace()
        .next()
        .map(|t| t.parse::<usize>().is_ok())
        .unwrap_or(false);

    let (symbols, count_line): (Vec<String>, &str) = if first_is_count {
        let symbols = title
            .split_whitespace()
            .filter(|t| t.chars().all(|c| c.is_ascii_alphabetic()))
            .map(|t| t.to_string())
            .collect();
        (symbols, line)
    } else {
        let symbols = line
            .split_whitespace()
            // POTCAR-style symbols like "Fe_pv" or "O/1234"
            .map(|t| {
                t.split(|c| c == '_' || c == '/')
                    .next()
                    .unwrap_or(t)
                    .to_string()
            })
            .collect();
        (symbols, cur.next("atom counts")?)
    };

    let counts: Vec<usize> = count_line
        .split_whitespace()
        .map(|t| t.parse::<usize>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| cur.error(format!("invalid atom counts: '{}'", count_line.trim())))?;

    if counts.len() != symbols.len() {
        return Err(cur.error(format!(
            "{} species but {} atom counts",
            symbols.len(),
            counts.len()
        )));
    }

    let elements = symbols
        .iter()
        .zip(&counts)
        .flat_map(|(symbol, &count)| std::iter::repeat(symbol.clone()).take(count))
        .collect();

    Ok(VaspHeader {
        title,
        cell: raw_cell * scale,
        elements,
        scale,
    })
}

fn parse_flag(token: &str) -> Option<bool> {
    match token.chars().next() {
        Some('T') | Some('t') => Some(true),
        Some('F') | Some('f') => Some(false),
        _ => None,
    }
}

/// Parses a POSCAR / CONTCAR file.
///
/// Trailing velocity or predictor-corrector blocks are ignored.
pub fn parse_poscar(content: &str, origin: &str) -> Result<Structure> {
    let mut cur = Cursor::new(content, origin);
    let header = parse_vasp_header(&mut cur)?;

    let mut mode_line = cur.next("coordinate mode")?;
    let selective = mode_line.trim_start().starts_with(['S', 's']);
    if selective {
        mode_line = cur.next("coordinate mode")?;
    }
    let cartesian = mode_line.trim_start().starts_with(['C', 'c', 'K', 'k']);

    let n = header.elements.len();
    let mut coords = Vec::with_capacity(n * 3);
    let mut flags = Vec::with_capacity(n);
    let frac_to_cart = header.cell.transpose();

    for _ in 0..n {
        let line = cur.next("atomic position")?;
        let v = cur.floats(line, 3, "atomic position")?;
        let pos = if cartesian {
            Vector3::new(v[0], v[1], v[2]) * header.scale
        } else {
            frac_to_cart * Vector3::new(v[0], v[1], v[2])
        };
        coords.extend_from_slice(&[pos.x, pos.y, pos.z]);

        if selective {
            let tokens: Vec<&str> = line.split_whitespace().skip(3).take(3).collect();
            let parsed: Option<Vec<bool>> = tokens.iter().map(|t| parse_flag(t)).collect();
            match parsed {
                Some(f) if f.len() == 3 => flags.push([f[0], f[1], f[2]]),
                _ => {
                    return Err(cur.error(format!(
                        "missing selective dynamics flags: '{}'",
                        line.trim()
                    )))
                }
            }
        }
    }

    debug!("Parsed POSCAR '{}' with {} atoms", header.title, n);
    let structure = Structure::new(header.elements, coords, header.cell);
    Ok(if selective {
        structure.with_selective(flags)
    } else {
        structure
    })
}

/// Parses an XDATCAR trajectory.
///
/// Fixed-cell files have one header followed by `Direct configuration=`
/// blocks. Variable-cell files repeat the header before every block; both
/// layouts are handled.
pub fn parse_xdatcar(content: &str, origin: &str) -> Result<Vec<Structure>> {
    let mut cur = Cursor::new(content, origin);
    let mut frames = Vec::new();
    let mut header = parse_vasp_header(&mut cur)?;

    loop {
        cur.skip_blank();
        let line = match cur.peek() {
            Some(line) => line,
            None => break,
        };

        let caps = match CONFIG_RE.captures(line) {
            Some(caps) => caps,
            None => {
                header = parse_vasp_header(&mut cur)?;
                continue;
            }
        };
        cur.next("configuration header")?;
        let cartesian = &caps[1] == "Cartesian";

        let n = header.elements.len();
        let mut coords = Vec::with_capacity(n * 3);
        for _ in 0..n {
            let line = cur.next("configuration position")?;
            let v = cur.floats(line, 3, "configuration position")?;
            let pos = if cartesian {
                Vector3::new(v[0], v[1], v[2]) * header.scale
            } else {
                header.cell.transpose() * Vector3::new(v[0], v[1], v[2])
            };
            coords.extend_from_slice(&[pos.x, pos.y, pos.z]);
        }
        frames.push(Structure::new(header.elements.clone(), coords, header.cell));

        if cur.at_end() {
            break;
        }
    }

    if frames.is_empty() {
        return Err(StructureError::Empty(origin.to_string()));
    }
    Ok(frames)
}

/// Parses a (possibly multi-frame) XYZ or extended XYZ file.
///
/// Only the `Lattice="..."` key of extended XYZ comment lines is honoured;
/// frames without it get a zero cell.
pub fn parse_xyz(content: &str, origin: &str) -> Result<Vec<Structure>> {
    let mut cur = Cursor::new(content, origin);
    let mut frames = Vec::new();

    loop {
        cur.skip_blank();
        if cur.at_end() {
            break;
        }

        let count_line = cur.next("atom count")?;
        let num_atoms = count_line
            .trim()
            .parse::<usize>()
            .map_err(|_| cur.error(format!("invalid atom count: '{}'", count_line.trim())))?;

        let comment = cur.next("comment line")?;
        let cell = match LATTICE_RE.captures(comment) {
            Some(caps) => {
                let v = cur.floats(&caps[1], 9, "Lattice")?;
                Matrix3::from_row_slice(&v)
            }
            None => Matrix3::zeros(),
        };

        let mut elements = Vec::with_capacity(num_atoms);
        let mut coords = Vec::with_capacity(num_atoms * 3);
        for _ in 0..num_atoms {
            let line = cur.next("atom line")?;
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 4 {
                return Err(cur.error(format!("malformed atom line: '{}'", line.trim())));
            }
            elements.push(parts[0].to_string());
            let v = cur.floats(&parts[1..4].join(" "), 3, "atom line")?;
            coords.extend_from_slice(&v);
        }
        frames.push(Structure::new(elements, coords, cell));
    }

    if frames.is_empty() {
        return Err(StructureError::Empty(origin.to_string()));
    }
    Ok(frames)
}

fn species_lines(structure: &Structure) -> String {
    let runs = structure.species_runs();
    let symbols: String = runs.iter().map(|(s, _)| format!(" {:>4}", s)).collect();
    let counts: String = runs.iter().map(|(_, c)| format!(" {:>4}", c)).collect();
    format!("{}\n{}\n", symbols, counts)
}

fn title_of(structure: &Structure) -> String {
    structure
        .species_runs()
        .iter()
        .map(|(s, c)| if *c == 1 { s.clone() } else { format!("{}{}", s, c) })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders a structure in VASP 5 POSCAR layout.
///
/// Selective dynamics flags are written when the structure carries them.
///
/// # Errors
///
/// [`StructureError::SingularCell`] if `mode` is `Direct` and the structure
/// has no cell.
pub fn format_poscar(structure: &Structure, mode: CoordinateMode) -> Result<String> {
    let mut out = String::new();
    out.push_str(&title_of(structure));
    out.push('\n');
    out.push_str("   1.00000000000000\n");
    for i in 0..3 {
        let row = structure.cell.row(i);
        out.push_str(&format!(
            "  {:21.16} {:21.16} {:21.16}\n",
            row[0], row[1], row[2]
        ));
    }
    out.push_str(&species_lines(structure));

    if structure.selective.is_some() {
        out.push_str("Selective dynamics\n");
    }

    let positions: Vec<Vector3<f64>> = match mode {
        CoordinateMode::Cartesian => {
            out.push_str("Cartesian\n");
            (0..structure.num_atoms).map(|i| structure.position(i)).collect()
        }
        CoordinateMode::Direct => {
            out.push_str("Direct\n");
            structure
                .scaled_positions()
                .ok_or_else(|| StructureError::SingularCell(title_of(structure)))?
        }
    };

    for (i, pos) in positions.iter().enumerate() {
        out.push_str(&format!("  {:20.16} {:20.16} {:20.16}", pos.x, pos.y, pos.z));
        if let Some(flags) = &structure.selective {
            for free in flags[i] {
                out.push_str(if free { "   T" } else { "   F" });
            }
        }
        out.push('\n');
    }
    Ok(out)
}

/// Renders a sequence of structures as an XDATCAR trajectory.
///
/// When every frame shares the first frame's cell a single header is
/// written; otherwise the header is repeated before each configuration.
pub fn format_xdatcar(frames: &[Structure]) -> Result<String> {
    let first = frames
        .first()
        .ok_or_else(|| StructureError::Empty("trajectory".to_string()))?;
    let origin = title_of(first);
    if frames.iter().any(|f| !f.same_atoms_as(first)) {
        return Err(StructureError::InconsistentFrames(origin));
    }
    let variable_cell = frames.iter().any(|f| f.cell != first.cell);

    let header = |s: &Structure| {
        let mut h = format!("{}\n           1\n", title_of(s));
        for i in 0..3 {
            let row = s.cell.row(i);
            h.push_str(&format!("  {:11.6} {:11.6} {:11.6}\n", row[0], row[1], row[2]));
        }
        h.push_str(&species_lines(s));
        h
    };

    let mut out = header(first);
    for (index, frame) in frames.iter().enumerate() {
        if variable_cell && index > 0 {
            out.push_str(&header(frame));
        }
        let scaled = frame
            .scaled_positions()
            .ok_or_else(|| StructureError::SingularCell(origin.clone()))?;
        out.push_str(&format!("Direct configuration={:6}\n", index + 1));
        for pos in scaled {
            out.push_str(&format!(" {:11.8} {:11.8} {:11.8}\n", pos.x, pos.y, pos.z));
        }
    }
    Ok(out)
}

fn write_text(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|source| StructureError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a structure to a POSCAR file, replacing any existing file.
pub fn write_poscar(structure: &Structure, path: &Path, mode: CoordinateMode) -> Result<()> {
    write_text(path, &format_poscar(structure, mode)?)
}

/// Writes an XDATCAR trajectory, replacing any existing file.
pub fn write_xdatcar(frames: &[Structure], path: &Path) -> Result<()> {
    write_text(path, &format_xdatcar(frames)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSCAR_V5: &str = "\
Pt O
1.0
   4.0 0.0 0.0
   0.0 4.0 0.0
   0.0 0.0 10.0
Pt O
2 1
Selective dynamics
Direct
0.0 0.0 0.0 F F F
0.5 0.5 0.0 F F F
0.25 0.25 0.2 T T T
";

    #[test]
    fn test_parse_poscar_direct_selective() {
        let s = parse_poscar(POSCAR_V5, "test").unwrap();
        assert_eq!(s.num_atoms, 3);
        assert_eq!(s.elements, vec!["Pt", "Pt", "O"]);
        assert_eq!(s.get_atom_coords(1), [2.0, 2.0, 0.0]);
        assert!((s.get_atom_coords(2)[2] - 2.0).abs() < 1e-12);
        assert!(s.is_fixed(0));
        assert!(!s.is_fixed(2));
    }

    #[test]
    fn test_parse_poscar_vasp4_symbols_from_title() {
        let content = "H O\n2.0\n1 0 0\n0 1 0\n0 0 1\n2 1\nCartesian\n0 0 0\n0.5 0 0\n0 0 0.5\n";
        let s = parse_poscar(content, "vasp4").unwrap();
        assert_eq!(s.elements, vec!["H", "H", "O"]);
        // Cartesian positions are scaled too
        assert_eq!(s.get_atom_coords(1), [1.0, 0.0, 0.0]);
        assert_eq!(s.cell[(0, 0)], 2.0);
    }

    #[test]
    fn test_parse_poscar_negative_scale_is_volume() {
        let content = "Cu\n-8.0\n1 0 0\n0 1 0\n0 0 1\nCu\n1\nDirect\n0.5 0.5 0.5\n";
        let s = parse_poscar(content, "vol").unwrap();
        assert!((s.volume() - 8.0).abs() < 1e-9);
        assert!((s.get_atom_coords(0)[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_poscar_truncated() {
        let content = "Cu\n1.0\n1 0 0\n0 1 0\n0 0 1\nCu\n2\nDirect\n0 0 0\n";
        let err = parse_poscar(content, "short").unwrap_err();
        assert!(err.to_string().contains("unexpected end of file"));
    }

    #[test]
    fn test_parse_poscar_count_mismatch() {
        let content = "Cu\n1.0\n1 0 0\n0 1 0\n0 0 1\nCu O\n2\nDirect\n0 0 0\n";
        assert!(matches!(
            parse_poscar(content, "bad"),
            Err(StructureError::Parse { .. })
        ));
    }

    #[test]
    fn test_poscar_written_then_read_back() {
        let s = parse_poscar(POSCAR_V5, "test").unwrap();
        for mode in [CoordinateMode::Cartesian, CoordinateMode::Direct] {
            let text = format_poscar(&s, mode).unwrap();
            let back = parse_poscar(&text, "round").unwrap();
            assert_eq!(back.elements, s.elements);
            assert_eq!(back.selective, s.selective);
            assert!((&back.coords - &s.coords).amax() < 1e-8);
            assert!((back.cell - s.cell).amax() < 1e-8);
        }
    }

    #[test]
    fn test_format_poscar_direct_needs_cell() {
        let s = Structure::molecule(vec!["H".to_string()], vec![0.0, 0.0, 0.0]);
        assert!(format_poscar(&s, CoordinateMode::Cartesian).is_ok());
        assert!(matches!(
            format_poscar(&s, CoordinateMode::Direct),
            Err(StructureError::SingularCell(_))
        ));
    }

    #[test]
    fn test_xdatcar_frames() {
        let s = parse_poscar(POSCAR_V5, "test").unwrap();
        let mut moved = s.clone();
        moved.set_position(2, &Vector3::new(1.0, 1.0, 2.5));

        let text = format_xdatcar(&[s.clone(), moved.clone()]).unwrap();
        assert_eq!(text.matches("Direct configuration=").count(), 2);

        let frames = parse_xdatcar(&text, "xdat").unwrap();
        assert_eq!(frames.len(), 2);
        assert!((frames[1].get_atom_coords(2)[2] - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_xdatcar_variable_cell_repeats_header() {
        let s = parse_poscar(POSCAR_V5, "test").unwrap();
        let mut bigger = s.clone();
        bigger.cell *= 1.1;

        let text = format_xdatcar(&[s, bigger.clone()]).unwrap();
        assert_eq!(text.matches("           1\n").count(), 2);

        let frames = parse_xdatcar(&text, "xdat").unwrap();
        assert_eq!(frames.len(), 2);
        assert!((frames[1].cell[(0, 0)] - bigger.cell[(0, 0)]).abs() < 1e-5);
    }

    #[test]
    fn test_xdatcar_rejects_mixed_atoms() {
        let a = Structure::new(vec!["H".to_string()], vec![0.0; 3], Matrix3::identity());
        let b = Structure::new(vec!["O".to_string()], vec![0.0; 3], Matrix3::identity());
        assert!(matches!(
            format_xdatcar(&[a, b]),
            Err(StructureError::InconsistentFrames(_))
        ));
    }

    #[test]
    fn test_parse_xyz_multi_frame_with_lattice() {
        let content = "\
2
Lattice=\"5.0 0.0 0.0 0.0 5.0 0.0 0.0 0.0 5.0\" Properties=species:S:1:pos:R:3
H 0.0 0.0 0.0
H 0.7 0.0 0.0

2
second frame
H 0.0 0.0 0.0
H 1.5 0.0 0.0
";
        let frames = parse_xyz(content, "xyz").unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].has_cell());
        assert!(!frames[1].has_cell());
        assert_eq!(frames[1].get_atom_coords(1), [1.5, 0.0, 0.0]);
    }

    #[test]
    fn test_parse_xyz_empty() {
        assert!(matches!(
            parse_xyz("\n\n", "empty"),
            Err(StructureError::Empty(_))
        ));
    }

    #[test]
    fn test_coordinate_mode_from_str() {
        assert_eq!("Direct".parse::<CoordinateMode>(), Ok(CoordinateMode::Direct));
        assert_eq!("cartesian".parse::<CoordinateMode>(), Ok(CoordinateMode::Cartesian));
        assert!("polar".parse::<CoordinateMode>().is_err());
    }
}
