use crate::graph::PropertyGraph;
use crate::schema::{ColumnType, IndexHint};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt::{self, Write};

/// One cell of a parsed table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Date(DateTime<Utc>),
    String(String),
}

pub type Row = BTreeMap<String, Value>;

impl Value {
    /// Casts a raw text field to `column_type`. Empty text is null for every type;
    /// `None` means the text is not a valid value of that type.
    pub fn cast(raw: &str, column_type: ColumnType) -> Option<Value> {
        if raw.is_empty() {
            return Some(Value::Null);
        }
        match column_type {
            ColumnType::String => Some(Value::String(raw.to_string())),
            ColumnType::Int => raw.trim().parse().ok().map(Value::Int),
            ColumnType::Float => raw.trim().parse().ok().map(Value::Float),
            ColumnType::Date => parse_date(raw.trim()).map(Value::Date),
        }
    }

    /// Casts a JSON value taken from a nested document.
    pub fn from_json(json: &JsonValue, column_type: ColumnType) -> Option<Value> {
        match json {
            JsonValue::Null => Some(Value::Null),
            JsonValue::String(s) => Value::cast(s, column_type),
            JsonValue::Number(n) => match column_type {
                ColumnType::Int => n
                    .as_i64()
                    .or_else(|| {
                        n.as_f64()
                            .filter(|f| f.fract() == 0.0)
                            .filter(|f| (i64::MIN as f64..i64::MAX as f64).contains(f))
                            .map(|f| f as i64)
                    })
                    .map(Value::Int),
                ColumnType::Float => n.as_f64().map(Value::Float),
                ColumnType::String => Some(Value::String(n.to_string())),
                ColumnType::Date => n
                    .as_i64()
                    .and_then(DateTime::<Utc>::from_timestamp_millis)
                    .map(Value::Date),
            },
            JsonValue::Bool(b) => match column_type {
                ColumnType::String => Some(Value::String(b.to_string())),
                _ => None,
            },
            JsonValue::Array(_) | JsonValue::Object(_) => match column_type {
                ColumnType::String => Some(Value::String(json.to_string())),
                _ => None,
            },
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Appends the textual form used for identifiers and composite keys.
    pub fn write_key(&self, buf: &mut String) {
        match self {
            Value::Null => buf.push_str("null"),
            Value::Int(i) => buf.push_str(itoa::Buffer::new().format(*i)),
            Value::Float(f) => {
                let _ = write!(buf, "{}", f);
            }
            Value::Date(d) => buf.push_str(&d.to_rfc3339()),
            Value::String(s) => buf.push_str(s),
        }
    }

    pub fn key_string(&self) -> String {
        let mut buf = String::new();
        self.write_key(&mut buf);
        buf
    }
}

/// Null renders as an empty string, everything else as its key form.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            other => f.write_str(&other.key_string()),
        }
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Generic XML element tree. Attributes are not kept.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct XmlElement {
    pub name: String,
    /// Concatenated text content, untrimmed.
    pub text: String,
    pub children: Vec<XmlElement>,
}

/// In-memory form of one parsed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParsedFile {
    Rows(Vec<Row>),
    Document(XmlElement),
    Records(Vec<JsonValue>),
}

impl ParsedFile {
    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            ParsedFile::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ParsedFile::Rows(_) => "rows",
            ParsedFile::Document(_) => "document",
            ParsedFile::Records(_) => "records",
        }
    }
}

/// Parsed files by file key.
pub type ParsedFileData = BTreeMap<String, ParsedFile>;

/// Opaque document handed to multimodel consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentData {
    pub content: ParsedFile,
    pub indexes: Vec<IndexHint>,
}

#[derive(Debug, Clone)]
pub enum KindData {
    Table(Vec<Row>),
    Graph(PropertyGraph),
    Document(DocumentData),
}

impl KindData {
    pub fn as_table(&self) -> Option<&[Row]> {
        match self {
            KindData::Table(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_graph(&self) -> Option<&PropertyGraph> {
        match self {
            KindData::Graph(graph) => Some(graph),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&DocumentData> {
        match self {
            KindData::Document(document) => Some(document),
            _ => None,
        }
    }
}

/// Result of one load: the filtered files plus both materialized views.
#[derive(Debug, Clone)]
pub struct DatasourceData {
    pub parsed: ParsedFileData,
    pub relational: BTreeMap<String, Vec<Row>>,
    pub multimodel: BTreeMap<String, KindData>,
}
