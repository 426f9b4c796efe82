// Layout and behavior settings
// Loaded from ~/.config/tabula/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tabula_core::ColumnNaming;

/// How a multi-cell clipboard block is spread over several selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    /// One clipboard row per selection
    #[default]
    Vertically,
    /// One clipboard column per selection
    Horizontally,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Table layout
    #[serde(rename = "table.rowHeight")]
    pub row_height: f32,

    #[serde(rename = "table.minimumRowHeight")]
    pub minimum_row_height: f32,

    #[serde(rename = "table.columnWidth")]
    pub column_width: f32,

    #[serde(rename = "table.minimumColumnWidth")]
    pub minimum_column_width: f32,

    #[serde(rename = "table.rowOverdraw")]
    pub row_overdraw: usize,

    #[serde(rename = "table.columnOverdraw")]
    pub column_overdraw: usize,

    #[serde(rename = "table.columnNaming")]
    pub column_naming: ColumnNaming,

    // Navigation
    #[serde(rename = "navigation.pageRows")]
    pub page_move_rows: usize,

    #[serde(rename = "navigation.pageColumns")]
    pub page_move_columns: usize,

    /// Share of the viewport extent scrolled per auto-scroll step of a drag.
    #[serde(rename = "scroll.dragSpeed")]
    pub drag_scroll_speed: f32,

    // History
    #[serde(rename = "undo.historySize")]
    pub undo_history_size: usize,

    // Ingestion
    #[serde(rename = "ingest.batchSize")]
    pub ingest_batch_size: usize,

    // Clipboard
    #[serde(rename = "clipboard.treatEachCellAsSelection")]
    pub copy_cells_as_selections: bool,

    #[serde(rename = "clipboard.flattenBufferMultiSelection")]
    pub flatten_multi_selection_paste: bool,

    #[serde(rename = "clipboard.distributeBufferMultiSelection")]
    pub distribute_multi_selection_paste: Distribution,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            row_height: 24.0,
            minimum_row_height: 16.0,
            column_width: 120.0,
            minimum_column_width: 40.0,
            row_overdraw: 3,
            column_overdraw: 2,
            column_naming: ColumnNaming::Alphabetic,
            page_move_rows: 20,
            page_move_columns: 5,
            drag_scroll_speed: 0.1,
            undo_history_size: 100,
            ingest_batch_size: 1000,
            copy_cells_as_selections: false,
            flatten_multi_selection_paste: false,
            distribute_multi_selection_paste: Distribution::Vertically,
        }
    }
}

impl Settings {
    /// Row height actually used for a row with an optional override.
    pub fn effective_row_height(&self, height: Option<f32>) -> f32 {
        height.unwrap_or(self.row_height).max(self.minimum_row_height)
    }

    /// Column width actually used for a column with an optional override.
    pub fn effective_column_width(&self, width: Option<f32>) -> f32 {
        width.unwrap_or(self.column_width).max(self.minimum_column_width)
    }

    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        crate::config_dir().join("settings.json")
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            let settings = Self::default();
            settings.create_default_file(&path);
            return settings;
        }

        Self::load_from(&path)
    }

    /// Load settings from an explicit file, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                log::warn!("Error parsing {}: {}; using default settings", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                log::warn!("Error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse settings JSON, ignoring whole-line `//` comments
    pub fn parse(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        serde_json::from_str(&cleaned).map_err(|e| e.to_string())
    }

    /// Save current settings to disk
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Create default settings file with comments
    fn create_default_file(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Error creating config directory: {}", e);
                return;
            }
        }

        let default_config = r#"{
    // Table layout (pixels)
    "table.rowHeight": 24,
    "table.minimumRowHeight": 16,
    "table.columnWidth": 120,
    "table.minimumColumnWidth": 40,

    // Extra rows/columns rendered outside the visible area
    "table.rowOverdraw": 3,
    "table.columnOverdraw": 2,

    // Unnamed columns: "alphabetic", "numeric" or "numericZeroBased"
    "table.columnNaming": "alphabetic",

    // Page up/down and page left/right distances
    "navigation.pageRows": 20,
    "navigation.pageColumns": 5,
    "scroll.dragSpeed": 0.1,

    // Number of undo steps kept per table
    "undo.historySize": 100,

    // Rows inserted per frame while loading a file
    "ingest.batchSize": 1000,

    // Multi-selection clipboard behavior
    "clipboard.treatEachCellAsSelection": false,
    "clipboard.flattenBufferMultiSelection": false,
    "clipboard.distributeBufferMultiSelection": "vertically"
}
"#;

        if let Err(e) = fs::write(path, default_config) {
            log::warn!("Error writing default settings.json: {}", e);
        }
    }
}
