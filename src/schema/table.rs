//! Session table loading
//!
//! Reads a header-first CSV into typed columns. A column is numeric when every
//! non-missing cell parses as a number; identifier columns are always text.

use crate::error::MotorError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

/// Unique per-session identifier column
pub const SESSION_ID_COLUMN: &str = "sessionId";

/// Participant identifier column (many sessions per participant)
pub const PARTICIPANT_ID_COLUMN: &str = "participantId";

/// Columns that identify a row and never carry features
pub const ID_COLUMNS: [&str; 2] = [SESSION_ID_COLUMN, PARTICIPANT_ID_COLUMN];

/// Cell contents treated as missing when reading a dataset
pub const MISSING_TOKENS: [&str; 8] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

/// Inferred type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Cell storage for one column
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Text(_) => ColumnKind::Text,
        }
    }

    /// Whether the cell at `row` is missing
    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnData::Numeric(v) => v[row].is_none(),
            ColumnData::Text(v) => v[row].is_none(),
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
        }
    }
}

/// Raw session dataset, one row per session. Never mutated after loading.
#[derive(Debug, Clone)]
pub struct SessionTable {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    n_rows: usize,
}

impl SessionTable {
    /// Build a table from columns of equal length
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, MotorError> {
        let n_rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        let mut index = HashMap::with_capacity(columns.len());

        for (i, column) in columns.iter().enumerate() {
            if column.data.len() != n_rows {
                return Err(MotorError::ParseError(format!(
                    "Column {} has {} rows, expected {}",
                    column.name,
                    column.data.len(),
                    n_rows
                )));
            }
            if index.insert(column.name.clone(), i).is_some() {
                return Err(MotorError::Schema(format!(
                    "Duplicate column: {}",
                    column.name
                )));
            }
        }

        Ok(Self {
            columns,
            index,
            n_rows,
        })
    }

    /// Load a CSV dataset from disk
    pub fn from_path(path: &Path) -> Result<Self, MotorError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Load a CSV dataset from any reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, MotorError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();

        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        for (line, record) in csv_reader.records().enumerate() {
            let record = record?;
            if record.len() != headers.len() {
                return Err(MotorError::ParseError(format!(
                    "Record {} has {} fields, header has {}",
                    line + 1,
                    record.len(),
                    headers.len()
                )));
            }
            for (column, value) in cells.iter_mut().zip(record.iter()) {
                column.push(if is_missing_token(value) {
                    None
                } else {
                    Some(value.to_string())
                });
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, values)| infer_column(name, values))
            .collect();

        Self::from_columns(columns)
    }

    /// Write the table as CSV with a header row
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), MotorError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(self.columns.iter().map(|c| c.name.as_str()))?;

        for row in 0..self.n_rows {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|c| render_cell(&c.data, row).unwrap_or_default())
                .collect();
            csv_writer.write_record(&record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in header order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.column(name).map(|c| c.data.kind())
    }

    /// Numeric cells of a column, `None` if absent or not numeric
    pub fn numeric(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Numeric(values)) => Some(values),
            _ => None,
        }
    }

    /// Text cells of a column, `None` if absent or not text
    pub fn text(&self, name: &str) -> Option<&[Option<String>]> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Text(values)) => Some(values),
            _ => None,
        }
    }

    /// Render any cell as text (`None` when missing or the column is absent)
    pub fn cell_text(&self, name: &str, row: usize) -> Option<String> {
        self.column(name)
            .filter(|_| row < self.n_rows)
            .and_then(|c| render_cell(&c.data, row))
    }

    /// Fail with a schema error naming the first absent column
    pub fn require_columns(&self, names: &[&str]) -> Result<(), MotorError> {
        for name in names {
            if !self.has_column(name) {
                return Err(MotorError::Schema(format!("Missing required column: {name}")));
            }
        }
        Ok(())
    }

    /// Position of the first row with the given session id
    pub fn find_session(&self, session_id: &str) -> Option<usize> {
        let ids = self.text(SESSION_ID_COLUMN)?;
        ids.iter().position(|id| id.as_deref() == Some(session_id))
    }
}

fn is_missing_token(value: &str) -> bool {
    MISSING_TOKENS.contains(&value)
}

fn infer_column(name: String, values: Vec<Option<String>>) -> Column {
    if ID_COLUMNS.contains(&name.as_str()) {
        return Column::text(name, values);
    }

    let parsed: Option<Vec<Option<f64>>> = values
        .iter()
        .map(|cell| match cell {
            None => Some(None),
            Some(text) => text.parse::<f64>().ok().filter(|v| v.is_finite()).map(Some),
        })
        .collect();

    match parsed {
        Some(numbers) => Column::numeric(name, numbers),
        None => Column::text(name, values),
    }
}

fn render_cell(data: &ColumnData, row: usize) -> Option<String> {
    match data {
        ColumnData::Numeric(values) => values[row].map(|v| v.to_string()),
        ColumnData::Text(values) => values[row].clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "sessionId,participantId,r1_hitRate,device_os,screen_dpr\n\
                          S_00001,P_001,0.91,Windows,1.5\n\
                          S_00002,P_001,,macOS,NaN\n\
                          S_00003,P_002,0.75,None,2\n";

    #[test]
    fn test_infers_column_kinds() {
        let table = SessionTable::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.kind("r1_hitRate"), Some(ColumnKind::Numeric));
        assert_eq!(table.kind("screen_dpr"), Some(ColumnKind::Numeric));
        assert_eq!(table.kind("device_os"), Some(ColumnKind::Text));
        assert_eq!(table.kind(SESSION_ID_COLUMN), Some(ColumnKind::Text));
    }

    #[test]
    fn test_missing_tokens() {
        let table = SessionTable::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.numeric("r1_hitRate").unwrap()[1], None);
        assert_eq!(table.numeric("screen_dpr").unwrap()[1], None);
        assert_eq!(table.text("device_os").unwrap()[2], None);
    }

    #[test]
    fn test_numeric_identifiers_stay_text() {
        let csv = "sessionId,participantId,r1_hitRate\n1,10,0.5\n2,10,0.6\n";
        let table = SessionTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.kind(PARTICIPANT_ID_COLUMN), Some(ColumnKind::Text));
        assert_eq!(table.find_session("2"), Some(1));
    }

    #[test]
    fn test_find_session() {
        let table = SessionTable::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(table.find_session("S_00003"), Some(2));
        assert_eq!(table.find_session("S_99999"), None);
    }

    #[test]
    fn test_require_columns() {
        let table = SessionTable::from_reader(SAMPLE.as_bytes()).unwrap();
        assert!(table.require_columns(&ID_COLUMNS).is_ok());
        let err = table.require_columns(&["userInfo_gender"]).unwrap_err();
        assert!(matches!(err, MotorError::Schema(_)));
    }

    #[test]
    fn test_ragged_record_is_rejected() {
        let csv = "sessionId,participantId\nS_1,P_1,extra\n";
        assert!(SessionTable::from_reader(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_csv_round_trip_preserves_missing() {
        let table = SessionTable::from_reader(SAMPLE.as_bytes()).unwrap();
        let mut buffer = Vec::new();
        table.write_csv(&mut buffer).unwrap();

        let reloaded = SessionTable::from_reader(buffer.as_slice()).unwrap();
        assert_eq!(reloaded.n_rows(), 3);
        assert_eq!(reloaded.numeric("r1_hitRate").unwrap()[1], None);
        assert_eq!(reloaded.cell_text("device_os", 0).as_deref(), Some("Windows"));
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let columns = vec![
            Column::numeric("a", vec![Some(1.0)]),
            Column::numeric("a", vec![Some(2.0)]),
        ];
        assert!(SessionTable::from_columns(columns).is_err());
    }
}
