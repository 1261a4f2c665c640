//! Row sources feeding the ingestion pipeline.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

/// One data row of a source, cells in header order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// 1-based line number in the source, header included
    pub line: u64,
    pub cells: Vec<String>,
}

impl SourceRow {
    /// Trimmed cell text, `None` for missing or empty cells.
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells
            .get(index)
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }
}

/// Trait for sources yielding rows of named columns.
#[async_trait]
pub trait ObservationSource: Send {
    /// Column names, in cell order.
    fn headers(&self) -> &[String];

    /// Next data row, `None` at end of input.
    async fn next_row(&mut self) -> Result<Option<SourceRow>>;
}

/// Delimited text with a header row.
pub struct CsvSource<R: Read + Send> {
    name: String,
    headers: Vec<String>,
    reader: csv::Reader<R>,
    record: csv::StringRecord,
}

impl CsvSource<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Self::from_reader(path.display().to_string(), file)
    }
}

impl<R: Read + Send> CsvSource<R> {
    pub fn from_reader(name: impl Into<String>, input: R) -> Result<Self> {
        let name = name.into();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(input);

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read header row of {}", name))?
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>();
        debug!(source = %name, columns = headers.len(), "Opened CSV source");

        Ok(Self {
            name,
            headers,
            reader,
            record: csv::StringRecord::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl<R: Read + Send> ObservationSource for CsvSource<R> {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    async fn next_row(&mut self) -> Result<Option<SourceRow>> {
        let more = self
            .reader
            .read_record(&mut self.record)
            .with_context(|| format!("Malformed row in {}", self.name))?;
        if !more {
            return Ok(None);
        }

        let line = self.record.position().map(|p| p.line()).unwrap_or_default();
        Ok(Some(SourceRow {
            line,
            cells: self.record.iter().map(|c| c.to_string()).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_csv_rows() {
        let mut source = CsvSource::from_reader("wind", test_utils::WIND_CSV.as_bytes()).unwrap();
        assert_eq!(source.headers(), ["DATE_UTC", "WSPD"]);

        let first = source.next_row().await.unwrap().unwrap();
        assert_eq!(first.line, 2);
        assert_eq!(first.cell(0), Some("2024-03-01T00:00:00Z"));
        assert_eq!(first.cell(1), Some("4.2"));

        let second = source.next_row().await.unwrap().unwrap();
        assert_eq!(second.cell(1), None);
        assert_eq!(second.cell(5), None);

        assert!(source.next_row().await.unwrap().is_some());
        assert!(source.next_row().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trimmed_headers() {
        let data = "DATE_UTC , WSPD\n2024-03-01 00:00:00, 3.0\n";
        let mut source = CsvSource::from_reader("padded", data.as_bytes()).unwrap();
        assert_eq!(source.headers(), ["DATE_UTC", "WSPD"]);
        assert_eq!(source.next_row().await.unwrap().unwrap().cell(1), Some("3.0"));
    }

    #[test]
    fn test_open_missing_file() {
        assert!(CsvSource::open("/nonexistent/obs.csv").is_err());
    }
}
