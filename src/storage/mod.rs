//! Storage Layer
//!
//! Locates the per-user directories where the configuration and custom
//! lexicons live.

use anyhow::Result;
use std::path::PathBuf;

/// File name of the configuration inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// File name of a user lexicon inside the config directory
pub const LEXICON_FILE: &str = "lexicon.toml";

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "praixtech", "OcrLab")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the configuration directory, creating it if needed
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Default location of the configuration file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

/// Location of the user lexicon, if one has been placed there
pub fn user_lexicon_path() -> Option<PathBuf> {
    let path = get_config_dir().ok()?.join(LEXICON_FILE);
    path.is_file().then_some(path)
}
