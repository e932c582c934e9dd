//! Write a default `revcall.toml`.

use anyhow::{Context, Result};
use colored::Colorize;
use revcall::runtime::config::{EngineConfig, CONFIG_FILE_NAME};
use std::path::{Path, PathBuf};

pub fn run(path: Option<String>) -> Result<()> {
    let base_path = match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    println!("{} Initializing revcall config...", "→".blue());
    match write_default_config(&base_path)? {
        Some(config_path) => println!("  {} Created {}", "✓".green(), config_path.display()),
        None => println!(
            "  {} {} already exists",
            "•".yellow(),
            base_path.join(CONFIG_FILE_NAME).display()
        ),
    }

    println!();
    println!("Next steps:");
    println!("  {} revcall serve", "1.".blue());
    println!("  {} revcall register", "2.".blue());

    Ok(())
}

/// Write the default config into `dir`. Returns `None` if one already exists.
fn write_default_config(dir: &Path) -> Result<Option<PathBuf>> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        return Ok(None);
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let content = EngineConfig::default()
        .to_toml()
        .context("Failed to serialize default config")?;
    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    Ok(Some(config_path))
}
