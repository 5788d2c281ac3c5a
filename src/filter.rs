//! Referential filter.
//!
//! Files are cleaned one at a time in dependency order, so every reference
//! check runs against a table that has already been filtered itself. Each CSV
//! file goes through three passes: explicit exclusions, duplicate primary
//! keys (first occurrence wins), then dangling references.

use crate::error::{LoadError, Result};
use crate::models::{ParsedFile, ParsedFileData, Row, Value};
use crate::schema::{DatasourceSchema, Reference, SimpleFile};
use crate::toposort::topological_sort;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

/// Builds the composite primary key of a row.
struct CompositeKey<'a> {
    columns: Vec<&'a str>,
    separator: &'a str,
}

impl<'a> CompositeKey<'a> {
    /// `None` when the file declares no primary key.
    fn for_file(file: &'a SimpleFile) -> Result<Option<Self>> {
        let columns: Vec<&str> = file
            .primary_keys()
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        if columns.is_empty() {
            return Ok(None);
        }
        let separator = match file.csv_options().and_then(|o| o.id_separator.as_deref()) {
            Some(separator) => separator,
            None if columns.len() == 1 => "",
            None => {
                return Err(LoadError::CompositeKeyWithoutSeparator {
                    key: file.key.clone(),
                })
            }
        };
        Ok(Some(Self { columns, separator }))
    }

    fn of(&self, row: &Row) -> String {
        let mut key = String::new();
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                key.push_str(self.separator);
            }
            row.get(*column).unwrap_or(&Value::Null).write_key(&mut key);
        }
        key
    }

    fn join(&self, parts: &[String]) -> String {
        parts.join(self.separator)
    }
}

/// Filters every CSV file of `parsed` against the schema's keys and references.
///
/// Non-tabular files pass through untouched. Fails with
/// [`LoadError::ReferencedDataNotFound`] when a reference points at a file that
/// has not been filtered yet, which is always the case inside a cycle.
pub fn filter_datasource(
    mut parsed: ParsedFileData,
    schema: &DatasourceSchema,
) -> Result<ParsedFileData> {
    let order = topological_sort(schema.files(), |f| (f.key.as_str(), f.dependencies()));
    let mut output = ParsedFileData::new();
    let mut total_removed = 0usize;

    for file in order {
        let data = parsed
            .remove(&file.key)
            .ok_or_else(|| LoadError::MissingFile {
                key: file.key.clone(),
            })?;

        let data = match data {
            ParsedFile::Rows(rows) if file.is_csv() => {
                let before = rows.len();
                let rows = filter_rows(rows, file, &output)?;
                let removed = before - rows.len();
                total_removed += removed;
                info!(key = %file.key, kept = rows.len(), removed, "Filtered rows");
                ParsedFile::Rows(rows)
            }
            other => other,
        };
        output.insert(file.key.clone(), data);
    }

    debug!(files = output.len(), removed = total_removed, "Referential filter done");
    Ok(output)
}

fn filter_rows(mut rows: Vec<Row>, file: &SimpleFile, filtered: &ParsedFileData) -> Result<Vec<Row>> {
    let Some(options) = file.csv_options() else {
        return Ok(rows);
    };
    let key = CompositeKey::for_file(file)?;

    if let Some(key) = &key {
        if !options.exclude.is_empty() {
            let excluded: FxHashSet<String> =
                options.exclude.iter().map(|parts| key.join(parts)).collect();
            rows.retain(|row| !excluded.contains(&key.of(row)));
        }
        if options.filter_duplicates {
            let mut seen = FxHashSet::default();
            rows.retain(|row| seen.insert(key.of(row)));
        }
    }

    if options.filter_references {
        let mut targets: FxHashMap<(&str, &str), FxHashSet<String>> = FxHashMap::default();
        for column in file.columns() {
            let Some(reference) = &column.reference else {
                continue;
            };
            let target_key = (reference.key.as_str(), reference.column.as_str());
            if !targets.contains_key(&target_key) {
                let values = referenced_values(&file.key, reference, filtered)?;
                targets.insert(target_key, values);
            }
            let target = &targets[&target_key];
            // Null matches nothing, so a row without the foreign key dangles too.
            rows.retain(|row| match row.get(&column.name) {
                None | Some(Value::Null) => false,
                Some(value) => target.contains(&value.key_string()),
            });
        }
    }

    Ok(rows)
}

/// Key forms of every value in the referenced column of an already-filtered file.
fn referenced_values(
    key: &str,
    reference: &Reference,
    filtered: &ParsedFileData,
) -> Result<FxHashSet<String>> {
    let data = filtered
        .get(&reference.key)
        .ok_or_else(|| LoadError::ReferencedDataNotFound {
            key: key.to_string(),
            referenced: reference.key.clone(),
        })?;
    let rows = data.rows().ok_or_else(|| LoadError::NotATable {
        key: reference.key.clone(),
    })?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get(&reference.column))
        .filter(|value| !value.is_null())
        .map(Value::key_string)
        .collect())
}
