use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    /// Default location of the cached widget state used by `dinner widget`.
    pub widget_state_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "dinner").context("Could not determine home directory")?;
        Self::in_dir(proj_dirs.data_dir().to_path_buf())
    }

    pub fn in_dir(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("dinner.db"),
            widget_state_path: data_dir.join("widget-state.json"),
            data_dir,
        })
    }
}
