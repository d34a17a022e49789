// 🔌 Row Sources
// Where raw records come from. The normalizer never touches I/O;
// it only sees the Vec<Record> a source hands back.

use crate::record::{CellValue, Record};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

// ============================================================================
// CORE TRAIT
// ============================================================================

/// RowSource - the only interface the pipeline needs from a data source
///
/// Adding a source (another export format, a live sheet) means
/// implementing this trait; nothing downstream changes.
pub trait RowSource: Send + Sync {
    /// Fetch every row, unordered
    ///
    /// # Returns
    /// * `Ok(Vec<Record>)` - raw rows, possibly empty
    /// * `Err(anyhow::Error)` - if the source cannot be read at all
    fn fetch(&self) -> Result<Vec<Record>>;

    /// Human-readable description for logs and headers
    fn describe(&self) -> String;
}

/// SourceKind - file formats a sheet can be exported to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// CSV export with a header row
    Csv,
    /// JSON array of flat objects (what "get all records" returns)
    Json,
}

impl SourceKind {
    pub fn name(&self) -> &str {
        match self {
            SourceKind::Csv => "CSV",
            SourceKind::Json => "JSON",
        }
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect source kind from the file extension
///
/// # Examples:
/// ```
/// # use std::path::Path;
/// # use stock_dashboard::source::{detect_source, SourceKind};
/// assert_eq!(detect_source(Path::new("AAPL.csv")).unwrap(), SourceKind::Csv);
/// assert_eq!(detect_source(Path::new("aapl.JSON")).unwrap(), SourceKind::Json);
/// ```
pub fn detect_source(path: &Path) -> Result<SourceKind> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => Ok(SourceKind::Csv),
        "json" => Ok(SourceKind::Json),
        _ => Err(anyhow::anyhow!(
            "Could not detect source type from file name: {} (expected .csv or .json)",
            path.display()
        )),
    }
}

/// Build the source for a path, picking the reader from its extension
pub fn open_source(path: &Path) -> Result<Box<dyn RowSource>> {
    let kind = detect_source(path)?;
    Ok(match kind {
        SourceKind::Csv => Box::new(CsvFileSource::new(path)),
        SourceKind::Json => Box::new(JsonFileSource::new(path)),
    })
}

// ============================================================================
// FILE SOURCES
// ============================================================================

/// CSV export of the sheet. Every cell arrives as text; blanks are Empty.
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvFileSource { path: path.into() }
    }
}

impl RowSource for CsvFileSource {
    fn fetch(&self) -> Result<Vec<Record>> {
        use csv::ReaderBuilder;

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open file: {}", self.path.display()))?;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(file);

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read CSV header in {}", self.path.display()))?
            .clone();

        let mut records = Vec::new();
        for (line_num, result) in reader.records().enumerate() {
            let row = result.with_context(|| {
                // +2 because: 1-indexed + header row
                format!("Failed to parse CSV line {} in {}", line_num + 2, self.path.display())
            })?;

            // Ragged rows: cells past the end are simply absent
            let record: Record = headers
                .iter()
                .zip(row.iter())
                .map(|(name, value)| (name.to_string(), CellValue::from(value)))
                .collect();
            records.push(record);
        }

        debug!(path = %self.path.display(), rows = records.len(), "read CSV source");
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("CSV {}", self.path.display())
    }
}

/// JSON array of objects, e.g. `[{"Date": "...", "Close": 150.9}]`
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileSource { path: path.into() }
    }
}

impl RowSource for JsonFileSource {
    fn fetch(&self) -> Result<Vec<Record>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open file: {}", self.path.display()))?;

        let records: Vec<Record> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| {
                format!(
                    "Failed to parse {} as a JSON array of flat objects",
                    self.path.display()
                )
            })?;

        debug!(path = %self.path.display(), rows = records.len(), "read JSON source");
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("JSON {}", self.path.display())
    }
}

// ============================================================================
// IN-MEMORY SOURCE
// ============================================================================

/// Fixed rows held in memory (tests, embedding)
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<Record>,
}

impl MemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        MemorySource { records }
    }
}

impl RowSource for MemorySource {
    fn fetch(&self) -> Result<Vec<Record>> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("memory ({} rows)", self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_detect_source_by_extension() {
        assert_eq!(detect_source(Path::new("prices.csv")).unwrap(), SourceKind::Csv);
        assert_eq!(detect_source(Path::new("dump.Json")).unwrap(), SourceKind::Json);
        assert!(detect_source(Path::new("prices.xlsx")).is_err());
        assert!(detect_source(Path::new("prices")).is_err());
    }

    #[test]
    fn test_csv_source_reads_cells_as_text() {
        let file = write_temp(
            ".csv",
            "Date, Open ,Close\n01/03/2023 09:30:00,150.2,150.9\n02/03/2023 09:30:00,,151\n",
        );
        let records = CsvFileSource::new(file.path()).fetch().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].get("Date"),
            Some(&CellValue::Text("01/03/2023 09:30:00".to_string()))
        );
        assert_eq!(records[0].get("Open"), Some(&CellValue::Text("150.2".to_string())));
        assert_eq!(records[1].get("Open"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_csv_source_tolerates_short_rows() {
        let file = write_temp(".csv", "Date,Open,Close\n01/03/2023 09:30:00,150.2\n");
        let records = CsvFileSource::new(file.path()).fetch().unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].contains("Close"));
    }

    #[test]
    fn test_json_source() {
        let file = write_temp(
            ".json",
            r#"[{"Date": "01/03/2023 09:30:00", "Close": 150.9}, {"Date": "x", "Close": "n/a"}]"#,
        );
        let source = open_source(file.path()).unwrap();
        let records = source.fetch().unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Close"), Some(&CellValue::Number(150.9)));
        assert!(source.describe().starts_with("JSON"));
    }

    #[test]
    fn test_json_source_rejects_non_array() {
        let file = write_temp(".json", r#"{"Date": "01/03/2023 09:30:00"}"#);
        let err = JsonFileSource::new(file.path()).fetch().unwrap_err();
        assert!(format!("{:#}", err).contains("JSON array"));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = CsvFileSource::new("/definitely/not/here.csv").fetch().unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.csv"));
    }

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new(vec![Record::new().with("Date", "01/01/2023 00:00:00")]);
        assert_eq!(source.fetch().unwrap().len(), 1);
        assert_eq!(source.describe(), "memory (1 rows)");
    }
}
