//! Cleaned input sources for the loader

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::{Result, WarehouseError};

/// One record read from a source, or the reason it could not be decoded.
#[derive(Debug, Clone)]
pub struct SourceRow<T> {
    /// 1-based position of the record in its source (header excluded).
    pub row: usize,
    pub record: std::result::Result<T, String>,
}

/// A finite sequence of cleaned records.
///
/// `read` fails only when the source as a whole cannot be read; records that
/// cannot be decoded are returned as `Err` rows so the loader can reject them
/// individually.
pub trait RecordSource<T> {
    fn label(&self) -> String;

    fn read(&self) -> Result<Vec<SourceRow<T>>>;
}

/// Records already held in memory.
impl<T: Clone> RecordSource<T> for Vec<T> {
    fn label(&self) -> String {
        "in-memory".to_string()
    }

    fn read(&self) -> Result<Vec<SourceRow<T>>> {
        Ok(self
            .iter()
            .enumerate()
            .map(|(idx, record)| SourceRow {
                row: idx + 1,
                record: Ok(record.clone()),
            })
            .collect())
    }
}

/// A cleaned CSV file whose header names match the warehouse columns.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, err: impl ToString) -> WarehouseError {
        WarehouseError::SourceUnavailable {
            source_name: self.path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl<T: DeserializeOwned> RecordSource<T> for CsvSource {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&self) -> Result<Vec<SourceRow<T>>> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| self.unavailable(e))?;

        // Force header parsing so an unreadable header fails the whole source
        reader.headers().map_err(|e| self.unavailable(e))?;

        let mut rows = Vec::new();
        for (idx, result) in reader.deserialize::<T>().enumerate() {
            match result {
                Ok(record) => rows.push(SourceRow {
                    row: idx + 1,
                    record: Ok(record),
                }),
                Err(e) if e.is_io_error() => return Err(self.unavailable(e)),
                Err(e) => rows.push(SourceRow {
                    row: idx + 1,
                    record: Err(e.to_string()),
                }),
            }
        }

        tracing::debug!(source = %self.path.display(), rows = rows.len(), "Read cleaned source");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CustomerRecord, SaleRecord};
    use std::io::Write;

    #[test]
    fn test_csv_source_reads_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "customer_id,name,region,join_date").unwrap();
        writeln!(file, "1001,William White,East,2021-11-11").unwrap();
        writeln!(file, "1002,Wylie Coyote,,2023-02-14").unwrap();

        let source = CsvSource::new(file.path());
        let rows: Vec<SourceRow<CustomerRecord>> = source.read().unwrap();

        assert_eq!(rows.len(), 2);
        let second = rows[1].record.as_ref().unwrap();
        assert_eq!(second.customer_id, Some(1002));
        assert_eq!(second.region, None);
        assert_eq!(rows[1].row, 2);
    }

    #[test]
    fn test_csv_source_keeps_bad_rows_as_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let header = "sale_id,customer_id,product_id,sale_date,sale_amount_usd,quantity";
        writeln!(file, "{header}").unwrap();
        writeln!(file, "550,1001,101,2024-01-06,6344.96,1").unwrap();
        writeln!(file, "551,1002,102,not-a-date,312.80,1").unwrap();

        let rows: Vec<SourceRow<SaleRecord>> = CsvSource::new(file.path()).read().unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows[0].record.is_ok());
        assert!(rows[1].record.is_err());
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let source = CsvSource::new("/nonexistent/customers.csv");
        let result: Result<Vec<SourceRow<CustomerRecord>>> = source.read();
        assert!(matches!(
            result,
            Err(WarehouseError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_vec_source_numbers_rows() {
        let source = vec![CustomerRecord::default(), CustomerRecord::default()];
        let rows = source.read().unwrap();
        assert_eq!(rows.iter().map(|r| r.row).collect::<Vec<_>>(), vec![1, 2]);
    }
}
