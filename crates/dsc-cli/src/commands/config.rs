//! Configuration commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::settings::Config;

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

pub fn run(cmd: ConfigCommands, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show(config_path),
        ConfigCommands::Init { force } => init(config_path, force),
    }
}

fn show(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;
    let source = config_path
        .map(Path::to_path_buf)
        .or_else(Config::find_config_file);

    println!("DSC Configuration");
    println!("=================");
    match source {
        Some(path) => println!("Source: {}", path.display()),
        None => println!("Source: built-in defaults"),
    }
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}

fn init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = config_path.map_or_else(|| PathBuf::from("dsc.toml"), Path::to_path_buf);

    if path.exists() && !force {
        println!("Config file already exists: {}", path.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }

    write_default(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn write_default(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let text = Config::default().to_toml()?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_loadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dsc.toml");

        init(Some(&path), false).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.run.episodes, Config::default().run.episodes);
    }

    #[test]
    fn test_init_keeps_existing_file_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dsc.toml");
        std::fs::write(&path, "[run]\nepisodes = 3\n").unwrap();

        init(Some(&path), false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[run]\nepisodes = 3\n");

        init(Some(&path), true).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.run.episodes, 100);
    }
}
