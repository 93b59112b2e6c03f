//! Shared helpers for the replay CLI: logger setup and path checks.

use std::error::Error;
use std::path::{Path, PathBuf};

/// Parse a log level name, falling back to `info` with a note on stderr.
pub fn parse_log_level(log_level: &str) -> log::LevelFilter {
    log_level.parse().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    })
}

/// Route `log` output to stderr, or append it to `log_file`, with millisecond timestamps.
///
/// # Errors
/// Returns an error if the log file cannot be opened or a logger is already installed.
pub fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    use std::io::Write;

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(parse_log_level(log_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:<5}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });
    if let Some(log_path) = log_file {
        ensure_parent_dir(log_path)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.try_init()?;
    Ok(())
}

/// Check that a recorded input exists and is a regular CSV file.
///
/// # Errors
/// Returns an error naming `what` (map, controls, ...) if the path is missing, is not a file, or
/// does not carry a `.csv` extension.
pub fn validate_input_file(input: &Path, what: &str) -> Result<(), Box<dyn Error>> {
    if !input.exists() {
        return Err(format!("{} file '{}' does not exist.", what, input.display()).into());
    }
    if !input.is_file() {
        return Err(format!("{} path '{}' is not a file.", what, input.display()).into());
    }
    if input.extension().and_then(|s| s.to_str()) != Some("csv") {
        return Err(format!("{} file '{}' is not a CSV file.", what, input.display()).into());
    }
    Ok(())
}

/// Create the parent directory of an output file if it does not exist yet.
pub fn ensure_parent_dir(output: &Path) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
