// Per-file layout memory
// Loaded from ~/.config/tabula/layouts.json
//
// Remembers, for each opened file, the parsing options that were used and
// the column/row layout the user left it in, so reopening restores both.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tabula_core::Align;

/// Saved display options for one column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnLayout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell_render: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grammar_scope: Option<String>,
}

/// Column options plus sparse row heights (indexed by model row).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TableLayout {
    pub columns: Vec<ColumnLayout>,
    pub row_heights: Vec<Option<f32>>,
}

/// Everything remembered about one file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLayout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escape: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<TableLayout>,
}

impl FileLayout {
    pub fn is_empty(&self) -> bool {
        *self == FileLayout::default()
    }
}

/// A single remembered entry of [`FileLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOption {
    Delimiter,
    Quote,
    Escape,
    Header,
    Encoding,
    Layout,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutStore {
    files: BTreeMap<String, FileLayout>,
}

impl LayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the layout store file path
    pub fn config_path() -> PathBuf {
        crate::config_dir().join("layouts.json")
    }

    /// Load the store from disk; a missing or unreadable file yields an empty store
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::new();
        }
        Self::load_from(&path).unwrap_or_else(|e| {
            log::warn!("Error loading {}: {}", path.display(), e);
            Self::new()
        })
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&contents).map_err(|e| e.to_string())
    }

    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, json).map_err(|e| e.to_string())
    }

    pub fn get(&self, file: &str) -> Option<&FileLayout> {
        self.files.get(file)
    }

    pub fn set(&mut self, file: &str, layout: FileLayout) {
        if layout.is_empty() {
            self.files.remove(file);
        } else {
            self.files.insert(file.to_string(), layout);
        }
    }

    /// Edit the entry for `file` in place, creating it if needed.
    pub fn update(&mut self, file: &str, f: impl FnOnce(&mut FileLayout)) {
        let mut layout = self.files.remove(file).unwrap_or_default();
        f(&mut layout);
        self.set(file, layout);
    }

    /// Re-key an entry after the file was renamed or moved.
    pub fn move_entry(&mut self, from: &str, to: &str) {
        if let Some(layout) = self.files.remove(from) {
            self.files.insert(to.to_string(), layout);
        }
    }

    pub fn clear(&mut self, file: &str) {
        self.files.remove(file);
    }

    pub fn clear_option(&mut self, file: &str, option: FileOption) {
        self.update(file, |layout| match option {
            FileOption::Delimiter => layout.delimiter = None,
            FileOption::Quote => layout.quote = None,
            FileOption::Escape => layout.escape = None,
            FileOption::Header => layout.header = None,
            FileOption::Encoding => layout.encoding = None,
            FileOption::Layout => layout.layout = None,
        });
    }

    pub fn clear_all(&mut self) {
        self.files.clear();
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
