// Configuration loading

pub mod layout;
pub mod settings;

pub use layout::{ColumnLayout, FileLayout, FileOption, LayoutStore, TableLayout};
pub use settings::{Distribution, Settings};

use std::path::PathBuf;

/// Directory holding every tabula configuration file.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tabula")
}
