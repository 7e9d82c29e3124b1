//! makeneb - Command Line Interface
//!
//! ```text
//! makeneb -i IS/CONTCAR FS/CONTCAR -n 7 --method idpp -o
//! makeneb -i XDATCAR -n 5
//! makeneb --write-config
//! ```
//!
//! Exit codes: 0 on success, 1 on a runtime failure, 2 on a usage error.

use clap::{CommandFactory, Parser};
use log::{error, info, warn, LevelFilter};
use makeneb::cli::Cli;
use makeneb::config::Options;
use makeneb::error::MakenebError;
use makeneb::path::{BandInterpolator, INPUT_COUNT_MESSAGE};
use makeneb::settings::SettingsManager;
use std::process;

fn main() {
    let cli = Cli::parse();
    let manager = SettingsManager::load();

    let level = log_level(manager.settings().logging.level_filter(), cli.verbose);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp_millis()
        .init();

    for (path, e) in manager.skipped() {
        warn!("Ignoring config file {}: {}", path.display(), e);
    }
    info!("Configuration loaded from: {}", manager.config_source());

    if cli.write_config {
        run_create_settings_template();
        return;
    }

    let options = Options::resolve(cli, manager.settings());
    let interpolator = BandInterpolator::new(options.mic);

    match makeneb::run(&options, &interpolator) {
        Ok(chain) => {
            info!(
                "Initial path with {} images written to {}",
                chain.len(),
                options.output_dir.display()
            );
        }
        Err(e) if e.is_input_count() => {
            eprintln!("{}", INPUT_COUNT_MESSAGE);
            process::exit(1);
        }
        Err(e) => {
            if let Err(help_error) = Cli::command().print_help() {
                warn!("Could not print help: {}", help_error);
            }
            println!();
            error!("{}", e);
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

/// Settings level raised by each `-v`.
fn log_level(configured: LevelFilter, verbose: u8) -> LevelFilter {
    let requested = match verbose {
        0 => return configured,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    configured.max(requested)
}

fn run_create_settings_template() {
    let path = SettingsManager::get_local_config_path();
    if path.exists() {
        eprintln!(
            "error: {} already exists, remove it first to create a fresh template",
            path.display()
        );
        process::exit(1);
    }
    match SettingsManager::create_template(&path) {
        Ok(()) => {
            println!("Settings template created: {}", path.display());
        }
        Err(e) => {
            let e = MakenebError::from(e);
            error!("Failed to create settings template: {}", e);
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_only_raises_the_level() {
        assert_eq!(log_level(LevelFilter::Warn, 0), LevelFilter::Warn);
        assert_eq!(log_level(LevelFilter::Warn, 1), LevelFilter::Info);
        assert_eq!(log_level(LevelFilter::Warn, 2), LevelFilter::Debug);
        assert_eq!(log_level(LevelFilter::Warn, 5), LevelFilter::Trace);
        assert_eq!(log_level(LevelFilter::Debug, 1), LevelFilter::Debug);
    }
}
