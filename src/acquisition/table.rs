//! Quote-aware CSV tables
//!
//! A small reader for the tabular exports the pipeline consumes. Cells are
//! kept as text; empty cells become `None` so downstream code can tell a
//! missing value from an empty string.

use std::path::{Path, PathBuf};

use super::SourceError;

/// Splits CSV records respecting quoted fields (commas and line breaks
/// inside quotes). Lines are fed one at a time; a record is complete once
/// a line ends outside quotes.
#[derive(Debug, Default)]
struct RecordSplitter {
    fields: Vec<String>,
    current: String,
    in_quotes: bool,
}

impl RecordSplitter {
    /// Feed one physical line. Returns the finished record, or `None` while
    /// a quoted field is still open.
    fn feed(&mut self, line: &str) -> Option<Vec<String>> {
        let mut chars = line.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '"' => {
                    if self.in_quotes {
                        // Escaped quote ("")
                        if chars.peek() == Some(&'"') {
                            self.current.push('"');
                            chars.next();
                        } else {
                            self.in_quotes = false;
                        }
                    } else {
                        self.in_quotes = true;
                    }
                }
                ',' if !self.in_quotes => {
                    self.fields.push(std::mem::take(&mut self.current));
                }
                _ => self.current.push(ch),
            }
        }

        if self.in_quotes {
            self.current.push('\n');
            return None;
        }
        self.fields.push(std::mem::take(&mut self.current));
        Some(std::mem::take(&mut self.fields))
    }

    fn is_open(&self) -> bool {
        self.in_quotes
    }
}

/// A parsed CSV file: one header row plus data rows of optional cells.
#[derive(Debug, Clone)]
pub struct RawTable {
    source: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    /// Read a CSV file from disk.
    ///
    /// Fails with `SourceNotFound` when the file does not exist,
    /// `EmptySource` when it has no data rows, and `MalformedSource` for
    /// anything else that prevents parsing.
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SourceError::SourceNotFound(path.to_path_buf()),
            _ => SourceError::malformed(path, e.to_string()),
        })?;
        let text = String::from_utf8(bytes)
            .map_err(|e| SourceError::malformed(path, format!("invalid UTF-8: {e}")))?;

        let table = Self::parse(&text, path)?;
        tracing::debug!(
            path = %path.display(),
            columns = table.headers.len(),
            rows = table.rows.len(),
            "Read CSV table"
        );
        Ok(table)
    }

    /// Parse CSV text. `source` is only used to label errors.
    pub fn parse(text: &str, source: impl AsRef<Path>) -> Result<Self, SourceError> {
        let source = source.as_ref();
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        // (first line number, fields) per record
        let mut records = Vec::new();
        let mut splitter = RecordSplitter::default();
        let mut start = 0;
        for (idx, line) in text.lines().enumerate() {
            if !splitter.is_open() {
                if line.trim().is_empty() {
                    continue;
                }
                start = idx + 1;
            }
            if let Some(fields) = splitter.feed(line) {
                records.push((start, fields));
            }
        }
        if splitter.is_open() {
            return Err(SourceError::malformed(
                source,
                format!("unterminated quoted field starting on line {start}"),
            ));
        }

        let mut records = records.into_iter();
        let (_, header_fields) = records
            .next()
            .ok_or_else(|| SourceError::EmptySource(source.to_path_buf()))?;
        let headers: Vec<String> = header_fields
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (line_no, mut fields) in records {
            if fields.len() > headers.len() {
                return Err(SourceError::malformed(
                    source,
                    format!(
                        "expected {} fields, saw {} on line {}",
                        headers.len(),
                        fields.len(),
                        line_no
                    ),
                ));
            }
            // Short rows are padded with missing values
            fields.resize(headers.len(), String::new());
            rows.push(
                fields
                    .into_iter()
                    .map(|f| if f.is_empty() { None } else { Some(f) })
                    .collect(),
            );
        }

        if rows.is_empty() {
            return Err(SourceError::EmptySource(source.to_path_buf()));
        }

        Ok(Self {
            source: source.to_path_buf(),
            headers,
            rows,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by exact header name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Required columns absent from the header, in the order given
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .map(|name| (*name).to_string())
            .collect()
    }

    /// Cell text at (row, column); `None` for empty cells
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }
}
