//! Configuration management for makeneb.
//!
//! Users can change the built-in defaults through INI-format configuration
//! files. The files are read in this order, later files overriding earlier
//! ones key by key:
//!
//! 1. System configuration (`/etc/makeneb/makeneb_config.cfg`)
//! 2. User configuration (`~/.config/makeneb/makeneb_config.cfg`)
//! 3. Local configuration (`./makeneb_config.cfg`)
//!
//! Command-line flags override all of them (see [`crate::config::Options`]).
//!
//! # Configuration File Format
//!
//! ```ini
//! [defaults]
//! nimage = 6
//! method = linear
//! nstep = 100
//! spring = 0.1
//! fmax = 0.1
//! optimizer = MDMin
//! mic = false
//!
//! [output]
//! trajectory_name = XDATCAR
//! coordinates = cartesian
//!
//! [logging]
//! level = warn
//! ```
//!
//! A file that cannot be read or contains an invalid value is skipped with a
//! warning; it never aborts a run.

use crate::config::Method;
use crate::io::CoordinateMode;
use crate::optimizer::OptimizerKind;
use configparser::ini::Ini;
use log::{debug, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// File name looked up in every configuration directory.
pub const CONFIG_FILE_NAME: &str = "makeneb_config.cfg";

/// Errors that can occur during configuration loading and processing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error when reading or writing configuration files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// INI parsing error
    #[error("INI parsing error: {0}")]
    IniParse(String),
    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

type Section = HashMap<String, Option<String>>;

/// Main configuration structure containing all program settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Defaults for the band construction flags
    pub defaults: NebDefaults,
    /// Output layout
    pub output: OutputSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Defaults for flags that may be omitted on the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NebDefaults {
    /// Number of images, endpoints included (default: 6)
    pub nimage: usize,
    /// Interpolation method (default: linear)
    pub method: Method,
    /// Maximum IDPP optimizer steps (default: 100)
    pub nstep: usize,
    /// Spring constant (default: 0.1)
    pub spring: f64,
    /// IDPP force threshold (default: 0.1)
    pub fmax: f64,
    /// IDPP optimizer (default: MDMin)
    pub optimizer: OptimizerKind,
    /// Minimum image convention (default: false)
    pub mic: bool,
}

impl Default for NebDefaults {
    fn default() -> Self {
        Self {
            nimage: 6,
            method: Method::Linear,
            nstep: 100,
            spring: 0.1,
            fmax: 0.1,
            optimizer: OptimizerKind::MdMin,
            mic: false,
        }
    }
}

/// Output layout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// File name of the combined trajectory (default: "XDATCAR")
    pub trajectory_name: String,
    /// Coordinate layout of POSCAR files (default: cartesian)
    pub coordinates: CoordinateMode,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            trajectory_name: "XDATCAR".to_string(),
            coordinates: CoordinateMode::Cartesian,
        }
    }
}

/// Logging configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level: off, error, warn, info, debug, trace (default: "warn")
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl LoggingSettings {
    /// The configured level, or `Warn` if it is not a known level name.
    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(self.level.trim()).unwrap_or(LevelFilter::Warn)
    }
}

/// Configuration manager that handles loading and accessing program settings.
pub struct SettingsManager {
    settings: Settings,
    config_source: String,
    skipped: Vec<(PathBuf, ConfigError)>,
}

impl SettingsManager {
    /// Loads configuration from the system, user and local files.
    ///
    /// Missing files are silently ignored; unreadable or invalid ones are
    /// skipped and listed in [`SettingsManager::skipped`]. This never fails;
    /// with no usable file the built-in defaults are returned.
    pub fn load() -> Self {
        let mut paths = Vec::new();
        paths.extend(Self::get_system_config_path());
        paths.extend(Self::get_user_config_path());
        paths.push(Self::get_local_config_path());
        Self::load_from_paths(&paths)
    }

    /// Loads configuration from an explicit list of files, later files
    /// overriding earlier ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Self {
        let mut settings = Settings::default();
        let mut config_source = "built-in defaults".to_string();
        let mut skipped = Vec::new();

        for path in paths {
            if !path.exists() {
                continue;
            }
            // Apply to a copy so a bad value leaves no partial changes behind
            let mut candidate = settings.clone();
            match Self::load_config(path, &mut candidate) {
                Ok(()) => {
                    settings = candidate;
                    config_source = path.display().to_string();
                    debug!("Loaded configuration from: {}", path.display());
                }
                Err(e) => {
                    warn!("Failed to load config from {}: {}", path.display(), e);
                    skipped.push((path.clone(), e));
                }
            }
        }

        Self {
            settings,
            config_source,
            skipped,
        }
    }

    /// Returns the source of the loaded configuration.
    pub fn config_source(&self) -> &str {
        &self.config_source
    }

    /// Files that exist but could not be used, with the reason.
    pub fn skipped(&self) -> &[(PathBuf, ConfigError)] {
        &self.skipped
    }

    /// Gets a reference to the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Consumes the manager and returns the merged settings.
    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Reads one INI file and applies every key it sets.
    fn load_config(path: &Path, settings: &mut Settings) -> Result<(), ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::apply_config(&content, settings)
    }

    /// Applies the keys present in INI `content` on top of `settings`.
    pub fn apply_config(content: &str, settings: &mut Settings) -> Result<(), ConfigError> {
        let mut ini = Ini::new();
        let map = ini
            .read(content.to_string())
            .map_err(|e| ConfigError::IniParse(format!("Failed to parse INI: {}", e)))?;

        if let Some(section) = map.get("defaults") {
            Self::parse_defaults(section, &mut settings.defaults)?;
        }
        if let Some(section) = map.get("output") {
            Self::parse_output(section, &mut settings.output)?;
        }
        if let Some(section) = map.get("logging") {
            if let Some(Some(level)) = section.get("level") {
                LevelFilter::from_str(level.trim()).map_err(|_| {
                    ConfigError::InvalidValue(format!("Invalid log level: {}", level))
                })?;
                settings.logging.level = level.trim().to_string();
            }
        }
        Ok(())
    }

    fn parse_defaults(section: &Section, defaults: &mut NebDefaults) -> Result<(), ConfigError> {
        if let Some(value) = value(section, "nimage") {
            let nimage: usize = parse_value("nimage", value)?;
            if nimage < 2 {
                return Err(ConfigError::InvalidValue(format!(
                    "nimage must be at least 2, got {}",
                    nimage
                )));
            }
            defaults.nimage = nimage;
        }
        if let Some(value) = value(section, "method") {
            defaults.method = value.parse().map_err(ConfigError::InvalidValue)?;
        }
        if let Some(value) = value(section, "nstep") {
            defaults.nstep = parse_value("nstep", value)?;
        }
        if let Some(value) = value(section, "spring") {
            defaults.spring = parse_value("spring", value)?;
        }
        if let Some(value) = value(section, "fmax") {
            defaults.fmax = parse_value("fmax", value)?;
        }
        if let Some(value) = value(section, "optimizer") {
            defaults.optimizer = value.parse().map_err(ConfigError::InvalidValue)?;
        }
        if let Some(value) = value(section, "mic") {
            defaults.mic = parse_value("mic", value)?;
        }
        Ok(())
    }

    fn parse_output(section: &Section, output: &mut OutputSettings) -> Result<(), ConfigError> {
        if let Some(value) = value(section, "trajectory_name") {
            if value.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "trajectory_name must not be empty".to_string(),
                ));
            }
            output.trajectory_name = value.to_string();
        }
        if let Some(value) = value(section, "coordinates") {
            output.coordinates = value.parse().map_err(ConfigError::InvalidValue)?;
        }
        Ok(())
    }

    /// Gets the system configuration file path.
    fn get_system_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            Some(PathBuf::from("/etc/makeneb").join(CONFIG_FILE_NAME))
        }
        #[cfg(windows)]
        {
            std::env::var("PROGRAMDATA")
                .ok()
                .map(|pd| PathBuf::from(pd).join("makeneb").join(CONFIG_FILE_NAME))
        }
    }

    /// Gets the user configuration file path.
    fn get_user_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            std::env::var("HOME").ok().map(|home| {
                PathBuf::from(home)
                    .join(".config")
                    .join("makeneb")
                    .join(CONFIG_FILE_NAME)
            })
        }
        #[cfg(windows)]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|appdata| PathBuf::from(appdata).join("makeneb").join(CONFIG_FILE_NAME))
        }
    }

    /// Gets the local configuration file path.
    pub fn get_local_config_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE_NAME)
    }

    /// Creates a commented configuration file listing every option with its
    /// built-in default.
    pub fn create_template(path: &Path) -> Result<(), ConfigError> {
        fs::write(path, Self::generate_template_content())?;
        Ok(())
    }

    /// Generates the content for a makeneb_config.cfg template file.
    fn generate_template_content() -> String {
        let defaults = NebDefaults::default();
        let output = OutputSettings::default();
        let logging = LoggingSettings::default();
        format!(
            r#"# makeneb configuration file
#
# Files are read in this order, later files overriding earlier ones:
#
# 1. /etc/makeneb/makeneb_config.cfg
# 2. ~/.config/makeneb/makeneb_config.cfg
# 3. ./makeneb_config.cfg
#
# Command-line flags override every file. Missing keys keep the built-in
# defaults shown below.

[defaults]
# Number of images, endpoints included (at least 2)
nimage = {}

# Interpolation method: linear or idpp
method = {}

# Maximum number of IDPP optimizer steps
nstep = {}

# Spring constant of the band
spring = {}

# Force convergence threshold for IDPP
fmax = {}

# IDPP optimizer: MDMin, BFGS, LBFGS or FIRE
optimizer = {}

# Minimum image convention for periodic cells: true or false
mic = {}

[output]
# File name of the combined trajectory written with -o
trajectory_name = {}

# POSCAR coordinate layout: cartesian or direct
coordinates = {}

[logging]
# Log level: off, error, warn, info, debug, trace
# The RUST_LOG environment variable overrides this value.
level = {}
"#,
            defaults.nimage,
            defaults.method,
            defaults.nstep,
            defaults.spring,
            defaults.fmax,
            defaults.optimizer,
            defaults.mic,
            output.trajectory_name,
            output.coordinates,
            logging.level,
        )
    }
}

fn value<'a>(section: &'a Section, key: &str) -> Option<&'a str> {
    match section.get(key) {
        Some(Some(v)) => Some(v.trim()),
        _ => None,
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("Invalid {}: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::load_from_paths(&[dir.path().join("missing.cfg")]);
        assert_eq!(manager.settings(), &Settings::default());
        assert_eq!(manager.config_source(), "built-in defaults");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "a.cfg",
            "[defaults]\nnimage = 8\noptimizer = fire\n[output]\ncoordinates = direct\n",
        );
        let settings = SettingsManager::load_from_paths(&[path]).into_settings();

        assert_eq!(settings.defaults.nimage, 8);
        assert_eq!(settings.defaults.optimizer, OptimizerKind::Fire);
        assert_eq!(settings.defaults.method, Method::Linear);
        assert_eq!(settings.defaults.fmax, 0.1);
        assert_eq!(settings.output.coordinates, CoordinateMode::Direct);
        assert_eq!(settings.output.trajectory_name, "XDATCAR");
    }

    #[test]
    fn test_later_files_override_earlier_ones() {
        let dir = TempDir::new().unwrap();
        let system = write(&dir, "system.cfg", "[defaults]\nnimage = 8\nspring = 0.5\n");
        let local = write(&dir, "local.cfg", "[defaults]\nnimage = 10\n");

        let manager = SettingsManager::load_from_paths(&[system, local.clone()]);
        assert_eq!(manager.settings().defaults.nimage, 10);
        assert_eq!(manager.settings().defaults.spring, 0.5);
        assert_eq!(manager.config_source(), local.display().to_string());
    }

    #[test]
    fn test_invalid_file_is_skipped_whole() {
        let dir = TempDir::new().unwrap();
        let good = write(&dir, "good.cfg", "[defaults]\nnstep = 50\n");
        let bad = write(&dir, "bad.cfg", "[defaults]\nnstep = 7\nfmax = lots\n");

        let manager = SettingsManager::load_from_paths(&[good, bad.clone()]);
        assert_eq!(manager.skipped().len(), 1);
        assert_eq!(manager.skipped()[0].0, bad);
        let settings = manager.into_settings();
        assert_eq!(settings.defaults.nstep, 50);
        assert_eq!(settings.defaults.fmax, 0.1);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut settings = Settings::default();
        assert!(SettingsManager::apply_config("[defaults]\nnimage = 1\n", &mut settings).is_err());
        assert!(SettingsManager::apply_config("[defaults]\nmethod = neb\n", &mut settings).is_err());
        assert!(SettingsManager::apply_config("[logging]\nlevel = loud\n", &mut settings).is_err());
    }

    #[test]
    fn test_method_and_logging_keys() {
        let mut settings = Settings::default();
        SettingsManager::apply_config(
            "[defaults]\nmethod = IDPP\nmic = true\n[logging]\nlevel = debug\n",
            &mut settings,
        )
        .unwrap();
        assert_eq!(settings.defaults.method, Method::Idpp);
        assert!(settings.defaults.mic);
        assert_eq!(settings.logging.level_filter(), LevelFilter::Debug);
    }

    #[test]
    fn test_template_loads_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        SettingsManager::create_template(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[defaults]"));
        assert!(content.contains("optimizer = MDMin"));

        let manager = SettingsManager::load_from_paths(&[path]);
        assert_eq!(manager.settings(), &Settings::default());
    }
}
