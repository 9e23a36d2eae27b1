//! Column-oriented tables: the tabular engine.
//!
//! A [`DataFrame`] is a list of named, equally long columns. Each column is
//! either numeric (`f64`) or text; missing cells are `None`. Conversion to and
//! from `ndarray` matrices is provided for the numeric code paths.

mod csv_io;

pub use csv_io::{read_csv, write_csv};

use ndarray::Array2;
use std::collections::HashSet;
use std::mem::size_of;

use crate::errors::{ContractViolation, DataContractError};

/// One column of a [`DataFrame`].
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Floating-point values.
    Numeric(Vec<Option<f64>>),
    /// Free text or categorical values.
    Text(Vec<Option<String>>),
}

impl Column {
    /// Creates a numeric column with no missing values.
    #[must_use]
    pub fn numeric(values: impl IntoIterator<Item = f64>) -> Self {
        Self::Numeric(values.into_iter().map(Some).collect())
    }

    /// Creates a text column with no missing values.
    #[must_use]
    pub fn text<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self::Text(values.into_iter().map(|s| Some(s.into())).collect())
    }

    /// Creates a text column repeating `value`.
    #[must_use]
    pub fn constant_text(value: &str, len: usize) -> Self {
        Self::Text(vec![Some(value.to_string()); len])
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    /// Returns true if the column has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true for numeric columns.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Numeric(_))
    }

    /// Number of missing cells.
    #[must_use]
    pub fn null_count(&self) -> usize {
        match self {
            Self::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::Text(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Approximate in-memory size in bytes, including string payloads.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len() * size_of::<Option<f64>>(),
            Self::Text(v) => v
                .iter()
                .map(|s| size_of::<Option<String>>() + s.as_ref().map_or(0, String::len))
                .sum(),
        }
    }

    /// Returns the numeric value at `row`.
    #[must_use]
    pub fn f64_at(&self, row: usize) -> Option<f64> {
        match self {
            Self::Numeric(v) => v.get(row).copied().flatten(),
            Self::Text(_) => None,
        }
    }

    /// Returns the text value at `row`.
    #[must_use]
    pub fn str_at(&self, row: usize) -> Option<&str> {
        match self {
            Self::Text(v) => v.get(row).and_then(|s| s.as_deref()),
            Self::Numeric(_) => None,
        }
    }

    fn take(&self, rows: &[usize]) -> Self {
        match self {
            Self::Numeric(v) => Self::Numeric(rows.iter().map(|&i| v[i]).collect()),
            Self::Text(v) => Self::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    fn cell_key(&self, row: usize, out: &mut String) {
        match self {
            Self::Numeric(v) => match v[row] {
                Some(x) => out.push_str(&format!("{:x}", x.to_bits())),
                None => out.push('\u{0}'),
            },
            Self::Text(v) => match &v[row] {
                Some(s) => out.push_str(s),
                None => out.push('\u{0}'),
            },
        }
    }
}

/// A table of named columns with equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl DataFrame {
    /// Creates an empty frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a frame from named columns.
    ///
    /// # Errors
    ///
    /// Returns an error if column lengths differ or a name repeats.
    pub fn from_columns(
        columns: impl IntoIterator<Item = (String, Column)>,
    ) -> Result<Self, DataContractError> {
        let mut frame = Self::new();
        for (name, column) in columns {
            if frame.index_of(&name).is_some() {
                return Err(DataContractError::new(
                    ContractViolation::MalformedArtifact,
                    format!("Duplicate column '{name}'"),
                ));
            }
            frame.insert_column(name, column)?;
        }
        Ok(frame)
    }

    /// Builds a numeric frame from a matrix, one column per matrix column.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of names does not match the matrix width.
    pub fn from_matrix(names: &[String], matrix: &Array2<f64>) -> Result<Self, DataContractError> {
        if names.len() != matrix.ncols() {
            return Err(DataContractError::new(
                ContractViolation::MalformedArtifact,
                format!(
                    "Matrix has {} columns but {} names were given",
                    matrix.ncols(),
                    names.len()
                ),
            ));
        }
        Self::from_columns(
            names
                .iter()
                .zip(matrix.columns())
                .map(|(name, col)| (name.clone(), Column::numeric(col.iter().copied()))),
        )
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Number of columns.
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Column names in order.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Returns true if a column with `name` exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Returns the column called `name`.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index_of(name).map(|i| &self.columns[i])
    }

    /// Iterates over `(name, column)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Appends a column, or replaces an existing one with the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the column length differs from the frame's.
    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        column: Column,
    ) -> Result<(), DataContractError> {
        let name = name.into();
        if !self.columns.is_empty() && column.len() != self.n_rows() {
            return Err(DataContractError::new(
                ContractViolation::MalformedArtifact,
                format!(
                    "Column '{name}' has {} rows, expected {}",
                    column.len(),
                    self.n_rows()
                ),
            ));
        }
        match self.index_of(&name) {
            Some(i) => self.columns[i] = column,
            None => {
                self.names.push(name);
                self.columns.push(column);
            }
        }
        Ok(())
    }

    /// Returns a copy without the named columns. Unknown names are ignored.
    #[must_use]
    pub fn without_columns(&self, drop: &[&str]) -> Self {
        let (names, columns) = self
            .iter()
            .filter(|(name, _)| !drop.contains(name))
            .map(|(name, col)| (name.to_string(), col.clone()))
            .unzip();
        Self { names, columns }
    }

    /// Returns a copy holding only `rows`, in the given order.
    #[must_use]
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
        }
    }

    /// Names of numeric columns.
    #[must_use]
    pub fn numeric_columns(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, c)| c.is_numeric())
            .map(|(n, _)| n.to_string())
            .collect()
    }

    /// Names of text columns.
    #[must_use]
    pub fn text_columns(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, c)| !c.is_numeric())
            .map(|(n, _)| n.to_string())
            .collect()
    }

    /// Total number of missing cells.
    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.columns.iter().map(Column::null_count).sum()
    }

    /// Number of rows identical to an earlier row.
    #[must_use]
    pub fn duplicate_row_count(&self) -> usize {
        let mut seen = HashSet::with_capacity(self.n_rows());
        let mut duplicates = 0;
        let mut key = String::new();
        for row in 0..self.n_rows() {
            key.clear();
            for column in &self.columns {
                column.cell_key(row, &mut key);
                key.push('\u{1f}');
            }
            if !seen.insert(key.clone()) {
                duplicates += 1;
            }
        }
        duplicates
    }

    /// Approximate memory footprint in bytes.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.columns.iter().map(Column::memory_bytes).sum::<usize>()
            + self.names.iter().map(String::len).sum::<usize>()
    }

    /// Extracts the named numeric columns as a row-major matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if a column is missing, textual, or has missing cells.
    pub fn to_matrix(&self, names: &[String]) -> Result<Array2<f64>, DataContractError> {
        let n_rows = self.n_rows();
        let mut matrix = Array2::<f64>::zeros((n_rows, names.len()));
        for (j, name) in names.iter().enumerate() {
            let column = self.column(name).ok_or_else(|| {
                DataContractError::new(
                    ContractViolation::MissingColumn,
                    format!("Feature column '{name}' not found in dataset"),
                )
            })?;
            let Column::Numeric(values) = column else {
                return Err(DataContractError::new(
                    ContractViolation::NonNumeric,
                    format!("Feature column '{name}' is not numeric"),
                ));
            };
            for (i, value) in values.iter().enumerate() {
                matrix[[i, j]] = value.ok_or_else(|| {
                    DataContractError::new(
                        ContractViolation::NonNumeric,
                        format!("Feature column '{name}' has a missing value at row {i}"),
                    )
                })?;
            }
        }
        Ok(matrix)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> DataFrame {
        DataFrame::from_columns([
            ("a".to_string(), Column::Numeric(vec![Some(1.0), Some(2.0), Some(1.0), None])),
            ("b".to_string(), Column::text(["x", "y", "x", "z"])),
        ])
        .unwrap()
    }

    #[test]
    fn test_shape_and_kinds() {
        let frame = sample();
        assert_eq!(frame.n_rows(), 4);
        assert_eq!(frame.n_cols(), 2);
        assert_eq!(frame.numeric_columns(), vec!["a".to_string()]);
        assert_eq!(frame.text_columns(), vec!["b".to_string()]);
    }

    #[test]
    fn test_missing_and_duplicates() {
        let frame = sample();
        assert_eq!(frame.missing_count(), 1);
        assert_eq!(frame.duplicate_row_count(), 1);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut frame = sample();
        let err = frame.insert_column("c", Column::numeric([1.0])).unwrap_err();
        assert_eq!(err.kind, ContractViolation::MalformedArtifact);
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut frame = sample();
        frame.insert_column("b", Column::constant_text("k", 4)).unwrap();
        assert_eq!(frame.n_cols(), 2);
        assert_eq!(frame.column("b").unwrap().str_at(1), Some("k"));
    }

    #[test]
    fn test_matrix_roundtrip_and_errors() {
        let names = vec!["p".to_string(), "q".to_string()];
        let matrix = array![[1.0, 2.0], [3.0, 4.0]];
        let frame = DataFrame::from_matrix(&names, &matrix).unwrap();
        assert_eq!(frame.to_matrix(&names).unwrap(), matrix);

        let sample = sample();
        let err = sample.to_matrix(&["b".to_string()]).unwrap_err();
        assert_eq!(err.kind, ContractViolation::NonNumeric);
        let err = sample.to_matrix(&["a".to_string()]).unwrap_err();
        assert!(err.message.contains("missing value at row 3"));
    }

    #[test]
    fn test_take_rows_and_drop() {
        let frame = sample().take_rows(&[3, 0]).without_columns(&["b"]);
        assert_eq!(frame.column_names(), &["a".to_string()]);
        assert_eq!(frame.column("a").unwrap().f64_at(1), Some(1.0));
        assert_eq!(frame.column("a").unwrap().f64_at(0), None);
    }
}
