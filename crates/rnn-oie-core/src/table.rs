//! # Delimited Table Reader
//!
//! Reads header-first, delimiter-separated text files (tab-separated by
//! default) into rows of string fields addressed by column name.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{OieError, Result};

/// A parsed delimited table.
#[derive(Debug, Clone)]
pub struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    lines: Vec<usize>,
}

impl Table {
    /// Read a table from `path`, splitting fields on `sep`.
    pub fn read<P: AsRef<Path>>(path: P, sep: char) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let table = Self::parse(BufReader::new(file), sep)?;
        tracing::debug!(
            "Read {} rows with columns {:?} from {}",
            table.len(),
            table.header,
            path.display()
        );
        Ok(table)
    }

    /// Parse a table from any buffered reader.
    ///
    /// The first non-empty line is the header. Blank lines are skipped and
    /// every data row must have exactly as many fields as the header.
    pub fn parse<R: BufRead>(reader: R, sep: char) -> Result<Self> {
        let mut header: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        let mut lines = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }

            let fields: Vec<String> = line.split(sep).map(str::to_string).collect();

            match &header {
                None => header = Some(fields),
                Some(columns) => {
                    if fields.len() != columns.len() {
                        return Err(OieError::MalformedRow {
                            line: idx + 1,
                            reason: format!(
                                "expected {} fields, found {}",
                                columns.len(),
                                fields.len()
                            ),
                        });
                    }
                    rows.push(fields);
                    lines.push(idx + 1);
                }
            }
        }

        let header = header.ok_or_else(|| OieError::MalformedRow {
            line: 1,
            reason: "missing header row".into(),
        })?;

        Ok(Self {
            header,
            rows,
            lines,
        })
    }

    /// Column names in file order.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in the header.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|column| column == name)
            .ok_or_else(|| OieError::MissingColumn {
                column: name.to_string(),
            })
    }

    /// Every value of column `name`, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&str>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    /// Field `col` of row `row`.
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// 1-based source line number of data row `row`.
    pub fn line_of(&self, row: usize) -> usize {
        self.lines.get(row).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "run_id\tword\tpred\tlabel\n0\tJohn\tsaw\tA0-B\n\n0\tsaw\tsaw\tP-B\n";

    #[test]
    fn test_parse_header_and_rows() {
        let table = Table::parse(Cursor::new(SAMPLE), '\t').unwrap();
        assert_eq!(table.header(), &["run_id", "word", "pred", "label"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("word").unwrap(), vec!["John", "saw"]);
        assert_eq!(table.line_of(1), 4);
    }

    #[test]
    fn test_missing_column() {
        let table = Table::parse(Cursor::new(SAMPLE), '\t').unwrap();
        assert!(matches!(
            table.column("tag"),
            Err(OieError::MissingColumn { column }) if column == "tag"
        ));
    }

    #[test]
    fn test_ragged_row_is_rejected() {
        let input = "run_id,word\n0,a\n1\n";
        let err = Table::parse(Cursor::new(input), ',').unwrap_err();
        assert!(matches!(err, OieError::MalformedRow { line: 3, .. }));
    }

    #[test]
    fn test_crlf_and_custom_separator() {
        let input = "a;b\r\n1;2\r\n";
        let table = Table::parse(Cursor::new(input), ';').unwrap();
        assert_eq!(table.column("b").unwrap(), vec!["2"]);
    }

    #[test]
    fn test_empty_input_has_no_header() {
        assert!(Table::parse(Cursor::new(""), '\t').is_err());
    }

    #[test]
    fn test_read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.tsv");
        std::fs::write(&path, SAMPLE).unwrap();
        let table = Table::read(&path, '\t').unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, 3), Some("A0-B"));
    }
}
