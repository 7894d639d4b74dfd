//! Tabular input and output (CSV).

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::MatchError;
use crate::engine::state::MatchedRow;

/// Extra columns appended to the matched table.
pub const MATCH_COLUMNS: &[&str] = &[
    "matched_token",
    "matched_reading",
    "candidate_pf",
    "target_pf",
];

/// One input record. Identity is its position in the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub index: usize,
    pub part_number: Option<String>,
    pub value: Option<String>,
    /// Every original cell, in header order.
    pub cells: Vec<String>,
}

impl Row {
    pub fn new(index: usize, part_number: Option<&str>, value: Option<&str>) -> Self {
        let cells = vec![
            part_number.unwrap_or_default().to_string(),
            value.unwrap_or_default().to_string(),
        ];
        Self {
            index,
            part_number: part_number.map(str::to_string),
            value: value.map(str::to_string),
            cells,
        }
    }

    fn padded_cells(&self, width: usize) -> Vec<&str> {
        (0..width)
            .map(|i| self.cells.get(i).map(String::as_str).unwrap_or(""))
            .collect()
    }
}

/// Rows of an input file plus its header line.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

fn non_empty(cell: Option<&str>) -> Option<String> {
    cell.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn find_column(headers: &[String], name: &str, path: &Path) -> Result<usize, MatchError> {
    let wanted = name.trim();
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(wanted))
        .ok_or_else(|| MatchError::MissingColumn {
            column: name.to_string(),
            path: path.to_path_buf(),
        })
}

fn csv_error(path: &Path, e: csv::Error) -> MatchError {
    MatchError::Csv {
        path: path.to_path_buf(),
        source: e,
    }
}

impl Dataset {
    /// Build an in-memory dataset with `part_number,value` headers.
    pub fn from_pairs(pairs: &[(Option<&str>, Option<&str>)]) -> Self {
        Self {
            headers: vec!["part_number".to_string(), "value".to_string()],
            rows: pairs
                .iter()
                .enumerate()
                .map(|(i, (part, value))| Row::new(i, *part, *value))
                .collect(),
        }
    }

    /// Read a headered CSV file. The part-number and value columns are
    /// located case-insensitively; empty cells become absent fields.
    pub fn from_csv(
        path: &Path,
        part_column: &str,
        value_column: &str,
    ) -> Result<Self, MatchError> {
        if !path.is_file() {
            return Err(MatchError::InputNotFound(path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| csv_error(path, e))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| csv_error(path, e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let part_idx = find_column(&headers, part_column, path)?;
        let value_idx = find_column(&headers, value_column, path)?;

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| csv_error(path, e))?;
            rows.push(Row {
                index,
                part_number: non_empty(record.get(part_idx)),
                value: non_empty(record.get(value_idx)),
                cells: record.iter().map(str::to_string).collect(),
            });
        }

        tracing::info!(
            path = %path.display(),
            rows = rows.len(),
            columns = headers.len(),
            "Loaded input dataset"
        );
        Ok(Self { headers, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Hex SHA-256 over the header line and every cell of every row.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hash_record(&mut hasher, self.headers.iter().map(String::as_str));
        for row in &self.rows {
            hash_record(&mut hasher, row.cells.iter().map(String::as_str));
        }
        hex::encode(hasher.finalize())
    }
}

// Length prefixes keep `["ab", ""]` and `["a", "b"]` apart.
fn hash_record<'a>(hasher: &mut Sha256, cells: impl ExactSizeIterator<Item = &'a str>) {
    hasher.update((cells.len() as u64).to_le_bytes());
    for cell in cells {
        hasher.update((cell.len() as u64).to_le_bytes());
        hasher.update(cell.as_bytes());
    }
}

fn create_writer(path: &Path) -> Result<csv::Writer<File>, MatchError> {
    csv::Writer::from_path(path).map_err(|e| csv_error(path, e))
}

/// Write the matched table: original columns plus match evidence.
pub fn write_matched(
    path: &Path,
    headers: &[String],
    rows: &[MatchedRow],
) -> Result<PathBuf, MatchError> {
    let mut writer = create_writer(path)?;
    let header_line: Vec<&str> = headers
        .iter()
        .map(String::as_str)
        .chain(MATCH_COLUMNS.iter().copied())
        .collect();
    writer.write_record(&header_line).map_err(|e| csv_error(path, e))?;

    for matched in rows {
        let evidence = &matched.evidence;
        let extra = [
            evidence.token.clone(),
            evidence.reading.as_str().to_string(),
            evidence.candidate_pf.to_string(),
            evidence.target_pf.to_string(),
        ];
        let mut record = matched.row.padded_cells(headers.len());
        record.extend(extra.iter().map(String::as_str));
        writer.write_record(&record).map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

/// Write the unmatched table with the original columns only.
pub fn write_unmatched(
    path: &Path,
    headers: &[String],
    rows: &[Row],
) -> Result<PathBuf, MatchError> {
    let mut writer = create_writer(path)?;
    writer.write_record(headers).map_err(|e| csv_error(path, e))?;
    for row in rows {
        writer
            .write_record(row.padded_cells(headers.len()))
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("input.csv");
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_from_csv_locates_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "Manufacturer, Part_Number ,Value\nSamsung,CL10B104KB8NNNC,0.1uF\nMurata,,\n",
        );
        let dataset = Dataset::from_csv(&path, "part_number", "value").unwrap();
        assert_eq!(dataset.headers, vec!["Manufacturer", "Part_Number", "Value"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows[0].part_number.as_deref(), Some("CL10B104KB8NNNC"));
        assert_eq!(dataset.rows[0].value.as_deref(), Some("0.1uF"));
        assert_eq!(dataset.rows[1].part_number, None);
        assert_eq!(dataset.rows[1].value, None);
        assert_eq!(dataset.rows[1].index, 1);
    }

    #[test]
    fn test_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "mpn,value\nX,1\n");
        let err = Dataset::from_csv(&path, "part_number", "value").unwrap_err();
        assert!(
            matches!(err, MatchError::MissingColumn { ref column, .. } if column == "part_number")
        );
    }

    #[test]
    fn test_missing_file() {
        let err = Dataset::from_csv(Path::new("does_not_exist.csv"), "a", "b").unwrap_err();
        assert!(matches!(err, MatchError::InputNotFound(_)));
    }

    #[test]
    fn test_invalid_utf8_keeps_csv_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        std::fs::write(&path, b"part_number,value\n\xff\xfe,1pF\n").unwrap();
        let err = Dataset::from_csv(&path, "part_number", "value").unwrap_err();
        assert!(matches!(err, MatchError::Csv { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let pairs = |value| [(Some("CL10B104KB8NNNC"), Some("0.1uF")), (Some("XYZ"), Some(value))];
        let a = Dataset::from_pairs(&pairs("1pF"));
        let same = Dataset::from_pairs(&pairs("1pF"));
        let other = Dataset::from_pairs(&pairs("2pF"));
        assert_eq!(a.fingerprint(), same.fingerprint());
        assert_ne!(a.fingerprint(), other.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let split = Dataset::from_pairs(&[(Some("a"), Some("b"))]);
        let joined = Dataset::from_pairs(&[(Some("ab"), Some(""))]);
        assert_ne!(split.fingerprint(), joined.fingerprint());
    }

    #[test]
    fn test_write_unmatched_pads_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unmatched.csv");
        let headers = vec!["part_number".to_string(), "value".to_string(), "note".to_string()];
        let rows = vec![Row::new(0, Some("ABC"), None)];
        write_unmatched(&path, &headers, &rows).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "part_number,value,note\nABC,,\n");
    }
}
