//! CSV encoding for [`DataFrame`].
//!
//! Column types are inferred on read: a column is numeric when every
//! non-empty field parses as `f64`. Empty fields and `NaN` are missing cells.

use csv::{ReaderBuilder, WriterBuilder};
use std::io::{Read, Write};

use super::{Column, DataFrame};
use crate::errors::{ContractViolation, DataContractError};

/// Parses a header-first CSV stream.
///
/// # Errors
///
/// Returns an error if the stream is not valid CSV or rows have uneven width.
pub fn read_csv<R: Read>(reader: R) -> Result<DataFrame, DataContractError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() {
        return Err(DataContractError::new(
            ContractViolation::MalformedArtifact,
            "CSV has no header row",
        ));
    }

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(malformed)?;
        for (cells, field) in raw.iter_mut().zip(record.iter()) {
            cells.push((!field.is_empty()).then(|| field.to_string()));
        }
    }

    DataFrame::from_columns(headers.into_iter().zip(raw.into_iter().map(infer_column)))
}

/// Writes `frame` as CSV with a header row.
///
/// # Errors
///
/// Returns an error if the underlying writer fails.
pub fn write_csv<W: Write>(frame: &DataFrame, writer: W) -> Result<(), csv::Error> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(frame.column_names())?;

    let mut row = Vec::with_capacity(frame.n_cols());
    for i in 0..frame.n_rows() {
        row.clear();
        for (_, column) in frame.iter() {
            row.push(match column {
                Column::Numeric(v) => v[i].map(|x| x.to_string()).unwrap_or_default(),
                Column::Text(v) => v[i].clone().unwrap_or_default(),
            });
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn infer_column(cells: Vec<Option<String>>) -> Column {
    let parsed: Option<Vec<Option<f64>>> = cells
        .iter()
        .map(|cell| match cell {
            None => Some(None),
            Some(s) => s.trim().parse::<f64>().ok().map(|x| (!x.is_nan()).then_some(x)),
        })
        .collect();

    match parsed {
        Some(values) => Column::Numeric(values),
        None => Column::Text(cells),
    }
}

fn malformed(err: csv::Error) -> DataContractError {
    DataContractError::new(ContractViolation::MalformedArtifact, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_infers_types_and_missing() {
        let data = "a,b,c\n1,x,\n2.5,y,NaN\n,z,3\n";
        let frame = read_csv(data.as_bytes()).unwrap();

        assert_eq!(frame.n_rows(), 3);
        assert_eq!(frame.numeric_columns(), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(frame.column("a").unwrap().f64_at(1), Some(2.5));
        assert_eq!(frame.column("a").unwrap().f64_at(2), None);
        assert_eq!(frame.missing_count(), 3);
    }

    #[test]
    fn test_write_then_read_preserves_values() {
        let frame = DataFrame::from_columns([
            ("x".to_string(), Column::Numeric(vec![Some(0.1), None])),
            ("label".to_string(), Column::text(["focus", "relaxation"])),
        ])
        .unwrap();

        let mut buf = Vec::new();
        write_csv(&frame, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf.clone()).unwrap(), "x,label\n0.1,focus\n,relaxation\n");
        assert_eq!(read_csv(buf.as_slice()).unwrap(), frame);
    }

    #[test]
    fn test_ragged_rows_are_malformed() {
        let err = read_csv("a,b\n1,2\n3\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind, ContractViolation::MalformedArtifact);
    }

    #[test]
    fn test_empty_input_is_malformed() {
        assert!(read_csv("".as_bytes()).is_err());
    }
}
