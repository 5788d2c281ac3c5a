//! Error taxonomy for the load pipeline.

use crate::schema::ColumnType;
use thiserror::Error;

/// Coarse grouping of [`LoadError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The dataset schema is inconsistent with itself or with the data layout.
    Schema,
    /// Cross-table constraints could not be enforced.
    Referential,
    /// Fetching or unpacking the input failed.
    Transport,
    /// A file could not be parsed or a value could not be cast.
    Format,
}

/// Every failure the pipeline can produce. All of them abort the whole load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("file \"{key}\" is not declared in the schema")]
    MissingFile { key: String },

    #[error("file \"{key}\" has a composite primary key but no id separator")]
    CompositeKeyWithoutSeparator { key: String },

    #[error("expected a single child group under the XML root, found {}", .groups.join(", "))]
    AmbiguousXmlRoot { groups: Vec<String> },

    #[error("\"{key}\" was expected to be a table")]
    NotATable { key: String },

    #[error("archive ended before these files were found: {}", .paths.join(", "))]
    MissingEntries { paths: Vec<String> },

    #[error("referenced data \"{referenced}\" not found for filtering \"{key}\"")]
    ReferencedDataNotFound { key: String, referenced: String },

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("CSV error in \"{key}\": {source}")]
    Csv { key: String, source: csv::Error },

    #[error("line {line} of \"{key}\" has {found} fields, expected {expected}")]
    RecordLength {
        key: String,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("XML error in \"{key}\": {source}")]
    Xml {
        key: String,
        source: quick_xml::Error,
    },

    #[error("JSON error in \"{key}\" on line {line}: {source}")]
    Json {
        key: String,
        line: usize,
        source: serde_json::Error,
    },

    #[error("cannot cast {value:?} to {expected} in \"{table}.{column}\"")]
    Cast {
        table: String,
        column: String,
        value: String,
        expected: ColumnType,
    },
}

impl LoadError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LoadError::Schema(_)
            | LoadError::MissingFile { .. }
            | LoadError::CompositeKeyWithoutSeparator { .. }
            | LoadError::AmbiguousXmlRoot { .. }
            | LoadError::NotATable { .. }
            | LoadError::MissingEntries { .. } => ErrorCategory::Schema,
            LoadError::ReferencedDataNotFound { .. } => ErrorCategory::Referential,
            LoadError::Transport(_) | LoadError::Io(_) | LoadError::Archive(_) => {
                ErrorCategory::Transport
            }
            LoadError::Csv { .. }
            | LoadError::RecordLength { .. }
            | LoadError::Xml { .. }
            | LoadError::Json { .. }
            | LoadError::Cast { .. } => ErrorCategory::Format,
        }
    }
}

pub type Result<T, E = LoadError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_taxonomy() {
        let schema = LoadError::CompositeKeyWithoutSeparator {
            key: "orders".to_string(),
        };
        assert_eq!(schema.category(), ErrorCategory::Schema);

        let referential = LoadError::ReferencedDataNotFound {
            key: "a".to_string(),
            referenced: "b".to_string(),
        };
        assert_eq!(referential.category(), ErrorCategory::Referential);

        let io = LoadError::Io(std::io::Error::other("boom"));
        assert_eq!(io.category(), ErrorCategory::Transport);

        let cast = LoadError::Cast {
            table: "t".to_string(),
            column: "c".to_string(),
            value: "x".to_string(),
            expected: ColumnType::Int,
        };
        assert_eq!(cast.category(), ErrorCategory::Format);
    }

    #[test]
    fn messages_name_the_offending_keys() {
        let err = LoadError::ReferencedDataNotFound {
            key: "orders".to_string(),
            referenced: "customers".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "referenced data \"customers\" not found for filtering \"orders\""
        );

        let err = LoadError::AmbiguousXmlRoot {
            groups: vec!["Invoice".to_string(), "Note".to_string()],
        };
        assert!(err.to_string().contains("Invoice, Note"));
    }
}
