use anyhow::{Context, Result};
use clap::ValueEnum;

use dumpmill_engine::DumpConfig;
use dumpmill_state::store::now_rfc3339;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

/// Execute the `maintenance` command: set or clear the marker file that
/// stops orchestrator runs between jobs.
pub fn execute(config: &DumpConfig, toggle: Toggle) -> Result<()> {
    let path = config.maintenance_path();
    match toggle {
        Toggle::On => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, format!("enabled {}\n", now_rfc3339()))
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Maintenance mode on: runs will stop between jobs.");
        }
        Toggle::Off => match std::fs::remove_file(&path) {
            Ok(()) => println!("Maintenance mode off."),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                println!("Maintenance mode was not on.");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("removing {}", path.display()));
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_toggles_the_marker_file() {
        let dir = TempDir::new().unwrap();
        let config =
            DumpConfig::with_roots(dir.path().join("public"), dir.path().join("private"));

        execute(&config, Toggle::On).unwrap();
        assert!(config.maintenance_path().exists());

        execute(&config, Toggle::Off).unwrap();
        assert!(!config.maintenance_path().exists());

        // Off twice is not an error.
        execute(&config, Toggle::Off).unwrap();
    }
}
