use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use biolog::session::Session;

use super::Config;

pub fn show_history(config: &Config) -> Result<()> {
    let session = Session::load(&Session::default_path())?;

    if session.is_empty() {
        println!("No analyses recorded");
        return Ok(());
    }

    println!("{} analysis(es) recorded", session.len());
    for (i, block) in session.history().iter().enumerate() {
        println!("{:>3}. [{}] {} ({})", i + 1, block.language, block.caption, block.timestamp);
        if config.verbose {
            for line in block.code.lines() {
                println!("       {}", line);
            }
        }
    }
    Ok(())
}

pub fn clear_history(config: &Config) -> Result<()> {
    let path = Session::default_path();
    let mut session = Session::load(&path)?;
    let count = session.len();

    if config.dry_run {
        println!("[DRY RUN] Would remove {} analysis(es)", count);
        return Ok(());
    }

    session.clear();
    session.save(&path)?;
    println!("✓ Removed {} analysis(es)", count);
    Ok(())
}

/// Writes the renderer records as JSON to a file, or stdout.
pub fn export_history(output: Option<PathBuf>, config: &Config) -> Result<()> {
    let session = Session::load(&Session::default_path())?;
    let json = session.export_json()?;

    match output {
        Some(path) => {
            if config.dry_run {
                println!("[DRY RUN] Would write {} record(s) to {}", session.len(), path.display());
                return Ok(());
            }
            fs::write(&path, json)
                .with_context(|| format!("Failed to write export file: {}", path.display()))?;
            println!("✓ Exported {} record(s) to {}", session.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
