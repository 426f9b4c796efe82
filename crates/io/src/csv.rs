// CSV ingestion and persistence

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use encoding_rs::Encoding;

use tabula_engine::fill::{ReadProgress, RecordSource};
use tabula_engine::table::Table;

use crate::IoError;

/// Candidates tried when no delimiter is configured, in tie-break order.
const DELIMITER_CANDIDATES: &[u8] = &[b'\t', b';', b',', b'|'];
const SNIFF_LINES: usize = 10;

/// Parse and write options for one CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvOptions {
    /// `None` sniffs the delimiter from the first lines.
    pub delimiter: Option<u8>,
    pub quote: u8,
    /// `None` escapes quotes by doubling them.
    pub escape: Option<u8>,
    pub comment: Option<u8>,
    /// The first record names the columns.
    pub has_header: bool,
    /// Strip whitespace around fields when reading.
    pub trim: bool,
    /// Quote every field when writing.
    pub quote_all: bool,
    /// Encoding label (`"utf-8"`, `"windows-1252"`, `"shift_jis"`, ...).
    /// `None` reads UTF-8, falling back to Windows-1252, and writes UTF-8.
    pub encoding: Option<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote: b'"',
            escape: None,
            comment: None,
            has_header: false,
            trim: false,
            quote_all: false,
            encoding: None,
        }
    }
}

impl CsvOptions {
    fn encoding(&self) -> Result<Option<&'static Encoding>, IoError> {
        match &self.encoding {
            None => Ok(None),
            Some(label) => Encoding::for_label(label.trim().as_bytes())
                .map(Some)
                .ok_or_else(|| IoError::UnknownEncoding(label.clone())),
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode `bytes` with the configured encoding, or UTF-8 with a
/// Windows-1252 fallback for files exported by spreadsheet software.
pub fn decode(bytes: Vec<u8>, encoding: Option<&'static Encoding>) -> (String, &'static Encoding) {
    if let Some(encoding) = encoding {
        let (text, actual, _) = encoding.decode(&bytes);
        return (text.into_owned(), actual);
    }
    match String::from_utf8(bytes) {
        Ok(text) => match text.strip_prefix('\u{feff}') {
            Some(stripped) => (stripped.to_owned(), encoding_rs::UTF_8),
            None => (text, encoding_rs::UTF_8),
        },
        Err(e) => {
            let bytes = e.into_bytes();
            log::debug!("csv: input is not UTF-8, decoding as Windows-1252");
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            (text.into_owned(), encoding_rs::WINDOWS_1252)
        }
    }
}

/// Pick the delimiter giving the most consistent field count over the first
/// lines. A candidate must split the first line in at least two fields;
/// wider splits win ties. Defaults to a comma.
pub fn sniff_delimiter(content: &str, quote: u8) -> u8 {
    let lines: Vec<&str> = content.lines().filter(|l| !l.is_empty()).take(SNIFF_LINES).collect();

    let mut best = (b',', 0usize);
    for &candidate in DELIMITER_CANDIDATES {
        let widths: Vec<usize> = lines.iter().map(|line| fields_in_line(line, candidate, quote)).collect();
        let Some(&first) = widths.first().filter(|&&w| w > 1) else {
            continue;
        };
        let score = widths.iter().filter(|&&w| w == first).count() * first;
        if score > best.1 {
            best = (candidate, score);
        }
    }
    best.0
}

fn fields_in_line(line: &str, delimiter: u8, quote: u8) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .quote(quote)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(Result::ok)
        .map_or(1, |record| record.len())
}

// ============================================================================
// CsvSource
// ============================================================================

/// Records of a CSV document, fed to a table fill.
pub struct CsvSource {
    reader: csv::Reader<Cursor<Vec<u8>>>,
    record: csv::StringRecord,
    total_bytes: u64,
    delimiter: u8,
    encoding: &'static Encoding,
}

impl CsvSource {
    pub fn from_path(path: &Path, options: &CsvOptions) -> Result<Self, IoError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(bytes, options)
    }

    pub fn from_reader(mut input: impl Read, options: &CsvOptions) -> Result<Self, IoError> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        Self::from_bytes(bytes, options)
    }

    pub fn from_bytes(bytes: Vec<u8>, options: &CsvOptions) -> Result<Self, IoError> {
        let (text, encoding) = decode(bytes, options.encoding()?);
        let delimiter = options.delimiter.unwrap_or_else(|| sniff_delimiter(&text, options.quote));
        log::debug!(
            "csv: {} bytes as {}, delimiter {:?}",
            text.len(),
            encoding.name(),
            delimiter as char
        );

        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(delimiter)
            .quote(options.quote)
            .comment(options.comment)
            .has_headers(false)
            .flexible(true)
            .trim(if options.trim { csv::Trim::All } else { csv::Trim::None });
        if let Some(escape) = options.escape {
            builder.escape(Some(escape)).double_quote(false);
        }

        let text = text.into_bytes();
        let total_bytes = text.len() as u64;
        Ok(Self {
            reader: builder.from_reader(Cursor::new(text)),
            record: csv::StringRecord::new(),
            total_bytes,
            delimiter,
            encoding,
        })
    }

    /// The configured or sniffed delimiter.
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// The encoding the input was decoded with.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }
}

impl RecordSource for CsvSource {
    type Error = IoError;

    fn read(&mut self) -> Result<Option<Vec<String>>, IoError> {
        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }
        Ok(Some(self.record.iter().map(str::to_owned).collect()))
    }

    fn progress(&self) -> ReadProgress {
        ReadProgress::new(self.reader.position().byte(), self.total_bytes)
    }
}

// ============================================================================
// Encoding tables
// ============================================================================

/// The table as CSV bytes: a header row when `has_header` (unnamed columns
/// write an empty name), then every row in model order.
pub fn encode_table(table: &Table, options: &CsvOptions) -> Result<Vec<u8>, IoError> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(options.delimiter.unwrap_or(b','))
        .quote(options.quote)
        .flexible(true)
        .quote_style(if options.quote_all { csv::QuoteStyle::Always } else { csv::QuoteStyle::Necessary });
    if let Some(escape) = options.escape {
        builder.escape(escape).double_quote(false);
    }

    let mut writer = builder.from_writer(Vec::new());
    if options.has_header {
        writer.write_record(table.columns().iter().map(|name| name.as_deref().unwrap_or("")))?;
    }
    for row in table.rows() {
        writer.write_record(row.iter().map(|value| value.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| IoError::Io(e.into_error()))?;

    match options.encoding()? {
        Some(encoding) if encoding != encoding_rs::UTF_8 => {
            let text = String::from_utf8_lossy(&bytes);
            let (encoded, _, unmappable) = encoding.encode(&text);
            if unmappable {
                log::warn!("csv: some characters can't be represented in {}", encoding.name());
            }
            Ok(encoded.into_owned())
        }
        _ => Ok(bytes),
    }
}

/// Write the table to `path`. Usable as a table save handler.
pub fn save_table(table: &Table, path: &Path, options: &CsvOptions) -> Result<(), IoError> {
    let bytes = encode_table(table, options)?;
    fs::write(path, bytes)?;
    log::debug!("csv: saved table {} to {}", table.id(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::IdAllocator;
    use tabula_engine::value::Value;

    fn read_all(source: &mut CsvSource) -> Vec<Vec<String>> {
        let mut records = Vec::new();
        while let Some(record) = source.read().unwrap() {
            records.push(record);
        }
        records
    }

    #[test]
    fn test_sniff_delimiters() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n", b'"'), b';');
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3\n", b'"'), b',');
        assert_eq!(sniff_delimiter("a\tb\tc\n1\t2\t3\n", b'"'), b'\t');
        assert_eq!(sniff_delimiter("a|b|c\n1|2|3\n", b'"'), b'|');
        assert_eq!(sniff_delimiter("single\n", b'"'), b',');
        assert_eq!(sniff_delimiter("", b'"'), b',');
    }

    #[test]
    fn test_sniff_ignores_quoted_commas() {
        let content = "name;address\n\"Doe, Jane\";\"1 Main St, Apt 4\"\nBob;\"2 Elm\"\n";
        assert_eq!(sniff_delimiter(content, b'"'), b';');
    }

    #[test]
    fn test_windows_1252_fallback() {
        let bytes = b"caf\xe9,na\xefve\n".to_vec();
        let (text, encoding) = decode(bytes, None);
        assert_eq!(text, "café,naïve\n");
        assert_eq!(encoding, encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let (text, _) = decode(b"\xef\xbb\xbfa,b".to_vec(), None);
        assert_eq!(text, "a,b");
    }

    #[test]
    fn test_source_reads_records_and_progress() {
        let options = CsvOptions::default();
        let mut source = CsvSource::from_bytes(b"a,b\n\"x, y\",2\n".to_vec(), &options).unwrap();
        assert_eq!(source.delimiter(), b',');
        assert_eq!(source.progress().bytes_read, 0);

        let records = read_all(&mut source);
        assert_eq!(records, vec![vec!["a", "b"], vec!["x, y", "2"]]);
        let progress = source.progress();
        assert!(progress.bytes_read > 0);
        assert!(progress.bytes_read <= progress.total_bytes);
    }

    #[test]
    fn test_source_options() {
        let options = CsvOptions {
            delimiter: Some(b';'),
            quote: b'\'',
            comment: Some(b'#'),
            trim: true,
            ..CsvOptions::default()
        };
        let mut source = CsvSource::from_bytes(b"# note\n'a;b'; c \n".to_vec(), &options).unwrap();
        assert_eq!(read_all(&mut source), vec![vec!["a;b", "c"]]);
    }

    #[test]
    fn test_unknown_encoding_is_rejected() {
        let options = CsvOptions { encoding: Some("klingon".into()), ..CsvOptions::default() };
        let result = CsvSource::from_bytes(Vec::new(), &options);
        assert!(matches!(result, Err(IoError::UnknownEncoding(_))));
    }

    #[test]
    fn test_encode_with_header() {
        let ids = IdAllocator::new();
        let table = Table::with_data(
            &ids,
            vec![Some("name".into()), None],
            vec![vec![Value::from("a,b"), Value::Number(2.0)], vec![Value::Empty, Value::Bool(true)]],
        )
        .unwrap();

        let options = CsvOptions { has_header: true, ..CsvOptions::default() };
        let bytes = encode_table(&table, &options).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "name,\n\"a,b\",2\n,true\n");

        let options = CsvOptions { delimiter: Some(b'\t'), quote_all: true, ..CsvOptions::default() };
        let bytes = encode_table(&table, &options).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "\"a,b\"\t\"2\"\n\"\"\t\"true\"\n");
    }

    #[test]
    fn test_encode_to_legacy_encoding() {
        let ids = IdAllocator::new();
        let table = Table::with_data(&ids, vec![None], vec![vec![Value::from("é")]]).unwrap();
        let options = CsvOptions { encoding: Some("windows-1252".into()), ..CsvOptions::default() };
        assert_eq!(encode_table(&table, &options).unwrap(), b"\xe9\n".to_vec());
    }
}
