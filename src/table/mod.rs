pub mod adapter;
pub mod writer;

use std::io::Read;
use std::path::Path;
use crate::error::AkiResult;

pub use adapter::{load_readings, ColumnBindings};
pub use writer::{save_summary, write_flagged, write_flagged_to};

/// A fully materialised CSV table; cells are kept as text until the adapter reads them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> AkiResult<Self> {
        let reader = csv::Reader::from_path(path)?;
        Self::from_csv(reader)
    }

    pub fn from_reader<R: Read>(reader: R) -> AkiResult<Self> {
        Self::from_csv(csv::Reader::from_reader(reader))
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> AkiResult<Self> {
        let headers = reader
            .headers()?
            .iter()
            .map(|header| header.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
