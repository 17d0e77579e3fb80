//! Command-line entry points (§2 component 12 support). A trimmed-down
//! version of the teacher's `cli` module: this gateway only needs to serve,
//! validate/print its configuration, and report its version.

use circle_domain::config::{Config, ConfigSeverity};
use clap::{Parser, Subcommand};

/// The Socratic circle dialogue gateway.
#[derive(Debug, Parser)]
#[command(name = "circled", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Loads the configuration from the path named by `CIRCLE_CONFIG` (or
/// `config.toml` by default), falling back to [`Config::default`] when the
/// file doesn't exist. Shared by `serve` and `config` subcommands.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("CIRCLE_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

/// Parses and validates the config, printing any issues. Returns `true`
/// when valid (no `Error`-severity issues).
pub fn validate_config(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!("\n{error_count} error(s), {warning_count} warning(s) in {config_path}");

    error_count == 0
}

/// Dumps the resolved config (with all defaults filled in) as TOML.
pub fn show_config(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}
