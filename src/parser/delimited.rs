use crate::error::{LoadError, Result};
use crate::models::{Row, Value};
use crate::schema::{ColumnDef, CsvOptions};
use csv::{ReaderBuilder, StringRecord};
use std::io::Read;

/// Streams delimited records, casting each field to its declared column type.
///
/// Fields are matched to `columns` by position. The header row, when present,
/// is consumed and never emitted. Row order is preserved.
pub fn parse_csv<R: Read>(
    reader: R,
    key: &str,
    columns: &[ColumnDef],
    options: &CsvOptions,
) -> Result<Vec<Row>> {
    let delimiter = options.separator.as_bytes().first().copied().unwrap_or(b',');
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(options.has_header)
        .escape(Some(b'\\'))
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut record = StringRecord::new();

    while reader
        .read_record(&mut record)
        .map_err(|source| LoadError::Csv {
            key: key.to_string(),
            source,
        })?
    {
        if record.len() != columns.len() {
            return Err(LoadError::RecordLength {
                key: key.to_string(),
                line: record.position().map(|p| p.line()).unwrap_or(0),
                expected: columns.len(),
                found: record.len(),
            });
        }
        rows.push(cast_record(&record, key, columns)?);
    }

    Ok(rows)
}

fn cast_record(record: &StringRecord, key: &str, columns: &[ColumnDef]) -> Result<Row> {
    let mut row = Row::new();
    for (field, column) in record.iter().zip(columns) {
        let value = Value::cast(field, column.column_type).ok_or_else(|| LoadError::Cast {
            table: key.to_string(),
            column: column.name.clone(),
            value: field.to_string(),
            expected: column.column_type,
        })?;
        row.insert(column.name.clone(), value);
    }
    Ok(row)
}
