//! Clipboard contract and the block copy format.
//!
//! Copied cells go to the clipboard as tab/newline separated text plus
//! structured metadata: the value blocks, one per copied selection, and
//! optionally one text entry per selection (or per cell) for hosts that
//! paste into multi-cursor text buffers.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One text selection as a multi-cursor host would paste it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardSelection {
    pub text: String,
    #[serde(default)]
    pub full_line: bool,
    #[serde(default)]
    pub indent_basis: usize,
}

impl ClipboardSelection {
    pub fn new(text: impl Into<String>, full_line: bool) -> Self {
        Self { text: text.into(), full_line, indent_basis: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardMetadata {
    /// One block of rows per copied selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Vec<Vec<Value>>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selections: Option<Vec<ClipboardSelection>>,
    #[serde(default)]
    pub full_line: bool,
    #[serde(default)]
    pub indent_basis: usize,
}

/// Host clipboard. The engine never touches a system clipboard directly.
pub trait Clipboard {
    fn write(&mut self, text: String, metadata: Option<ClipboardMetadata>);

    fn read_with_metadata(&self) -> (String, Option<ClipboardMetadata>);

    fn read(&self) -> String {
        self.read_with_metadata().0
    }
}

/// In-process clipboard for tests and headless hosts.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    text: String,
    metadata: Option<ClipboardMetadata>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> Option<&ClipboardMetadata> {
        self.metadata.as_ref()
    }
}

impl Clipboard for MemoryClipboard {
    fn write(&mut self, text: String, metadata: Option<ClipboardMetadata>) {
        self.text = text;
        self.metadata = metadata;
    }

    fn read_with_metadata(&self) -> (String, Option<ClipboardMetadata>) {
        (self.text.clone(), self.metadata.clone())
    }
}

/// Tab separated columns, newline separated rows.
pub fn block_text(values: &[Vec<Value>]) -> String {
    values
        .iter()
        .map(|row| row.iter().map(Value::to_string).collect::<Vec<_>>().join("\t"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// How a block is written to the clipboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyOptions {
    /// Append to what is already on the clipboard instead of replacing it.
    pub maintain: bool,
    /// Record one text selection per cell instead of one per block.
    pub cells_as_selections: bool,
    pub full_line: bool,
}

/// Write one selection's values to `clipboard`.
pub fn copy_block(clipboard: &mut dyn Clipboard, values: Vec<Vec<Value>>, options: CopyOptions) {
    let text = block_text(&values);
    let cell_selections = |values: &[Vec<Value>]| -> Vec<ClipboardSelection> {
        values
            .iter()
            .flatten()
            .map(|value| ClipboardSelection::new(value.to_string(), options.full_line))
            .collect()
    };

    if options.maintain {
        let (previous, metadata) = clipboard.read_with_metadata();
        let mut metadata = metadata.unwrap_or_default();
        let full_line = metadata.full_line;
        let selections = metadata
            .selections
            .get_or_insert_with(|| vec![ClipboardSelection::new(previous.clone(), full_line)]);
        if options.cells_as_selections {
            selections.extend(cell_selections(&values));
        } else {
            selections.push(ClipboardSelection::new(text.clone(), options.full_line));
        }
        metadata.values.get_or_insert_with(Vec::new).push(values);
        clipboard.write(format!("{previous}\n{text}"), Some(metadata));
    } else {
        let selections = options.cells_as_selections.then(|| cell_selections(&values));
        let metadata = ClipboardMetadata {
            values: Some(vec![values]),
            selections,
            full_line: options.full_line,
            indent_basis: 0,
        };
        clipboard.write(text, Some(metadata));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(rows: &[&[&str]]) -> Vec<Vec<Value>> {
        rows.iter().map(|r| r.iter().map(|&s| Value::from(s)).collect()).collect()
    }

    #[test]
    fn test_block_text() {
        let values = vec![vec![Value::from("a"), Value::Number(2.0)], vec![Value::Empty, Value::Bool(true)]];
        assert_eq!(block_text(&values), "a\t2\n\ttrue");
    }

    #[test]
    fn test_copy_replaces_clipboard() {
        let mut clipboard = MemoryClipboard::new();
        clipboard.write("old".into(), None);
        copy_block(&mut clipboard, block(&[&["a", "b"]]), CopyOptions::default());

        assert_eq!(clipboard.text(), "a\tb");
        let metadata = clipboard.metadata().unwrap();
        assert_eq!(metadata.values.as_ref().unwrap().len(), 1);
        assert!(metadata.selections.is_none());
    }

    #[test]
    fn test_copy_cells_as_selections() {
        let mut clipboard = MemoryClipboard::new();
        let options = CopyOptions { cells_as_selections: true, ..Default::default() };
        copy_block(&mut clipboard, block(&[&["a", "b"], &["c", "d"]]), options);

        let selections = clipboard.metadata().unwrap().selections.clone().unwrap();
        let texts: Vec<&str> = selections.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_maintained_copy_accumulates_blocks() {
        let mut clipboard = MemoryClipboard::new();
        copy_block(&mut clipboard, block(&[&["a"]]), CopyOptions::default());
        let maintain = CopyOptions { maintain: true, ..Default::default() };
        copy_block(&mut clipboard, block(&[&["b"]]), maintain);

        assert_eq!(clipboard.text(), "a\nb");
        let metadata = clipboard.metadata().unwrap();
        assert_eq!(metadata.values.as_ref().unwrap().len(), 2);
        let selections = metadata.selections.as_ref().unwrap();
        assert_eq!(selections.len(), 2);
        assert_eq!(selections[0].text, "a");
        assert_eq!(selections[1].text, "b");
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let metadata = ClipboardMetadata { full_line: true, ..Default::default() };
        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, r#"{"fullLine":true,"indentBasis":0}"#);
    }
}
