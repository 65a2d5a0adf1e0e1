//! Command-line interface and config loading.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ca_domain::config::{Config, ConfigSeverity};

#[derive(Debug, Parser)]
#[command(name = "codeassistd", about = "CodeAssist state service", version)]
pub struct Cli {
    /// Path to the TOML config file. Falls back to `CODEASSIST_CONFIG`,
    /// then `./codeassist.toml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (the default when no subcommand is given).
    Serve,
    /// Inspect or validate the configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Check the config file and report issues.
    Validate,
    /// Print the effective config (after defaults).
    Show,
}

/// Resolve and load the config file. A missing file is not an error: the
/// service runs on defaults for local development.
pub fn load_config(explicit: Option<&std::path::Path>) -> anyhow::Result<(Config, String)> {
    let path: PathBuf = explicit
        .map(PathBuf::from)
        .or_else(|| std::env::var("CODEASSIST_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./codeassist.toml"));

    if path.exists() {
        let config = Config::load(&path)
            .with_context(|| format!("loading config from {}", path.display()))?;
        Ok((config, path.display().to_string()))
    } else {
        tracing::warn!(
            path = %path.display(),
            "config file not found — using defaults"
        );
        Ok((Config::default(), format!("{} (defaults)", path.display())))
    }
}

/// `config validate`: print every issue, return whether the config is
/// usable.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();
    if issues.is_empty() {
        println!("{config_path}: OK");
        return true;
    }
    let mut ok = true;
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => println!("warning: {issue}"),
            ConfigSeverity::Error => {
                ok = false;
                println!("error: {issue}");
            }
        }
    }
    ok
}

/// `config show`: dump the effective config as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => eprintln!("failed to render config: {e}"),
    }
}
