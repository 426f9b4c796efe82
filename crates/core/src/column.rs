//! Column naming and alignment shared by the store, the display layer and
//! layout memory.

use serde::{Deserialize, Serialize};

/// How unnamed columns are labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnNaming {
    /// 1, 2, 3, ...
    Numeric,
    /// 0, 1, 2, ...
    NumericZeroBased,
    /// A, B, ..., Z, AA, AB, ...
    #[default]
    Alphabetic,
}

/// Horizontal alignment of a column's cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// Name for the column at `index` under the given strategy.
pub fn column_name(index: usize, naming: ColumnNaming) -> String {
    match naming {
        ColumnNaming::Numeric => (index + 1).to_string(),
        ColumnNaming::NumericZeroBased => index.to_string(),
        ColumnNaming::Alphabetic => alphabetic(index),
    }
}

fn alphabetic(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alphabetic_names() {
        assert_eq!(column_name(0, ColumnNaming::Alphabetic), "A");
        assert_eq!(column_name(25, ColumnNaming::Alphabetic), "Z");
        assert_eq!(column_name(26, ColumnNaming::Alphabetic), "AA");
        assert_eq!(column_name(27, ColumnNaming::Alphabetic), "AB");
        assert_eq!(column_name(701, ColumnNaming::Alphabetic), "ZZ");
        assert_eq!(column_name(702, ColumnNaming::Alphabetic), "AAA");
    }

    #[test]
    fn test_numeric_names() {
        assert_eq!(column_name(0, ColumnNaming::Numeric), "1");
        assert_eq!(column_name(9, ColumnNaming::Numeric), "10");
        assert_eq!(column_name(0, ColumnNaming::NumericZeroBased), "0");
    }

    #[test]
    fn test_align_serde() {
        assert_eq!(serde_json::to_string(&Align::Center).unwrap(), "\"center\"");
        assert_eq!(Align::default(), Align::Left);
    }

    #[test]
    fn test_naming_serde_keys() {
        let naming: ColumnNaming = serde_json::from_str("\"numericZeroBased\"").unwrap();
        assert_eq!(naming, ColumnNaming::NumericZeroBased);
    }
}
