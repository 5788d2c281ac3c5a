//! Per-format parsers turning one byte stream into a [`ParsedFile`].

pub mod delimited;
pub mod ndjson;
pub mod xml;

use crate::error::Result;
use crate::models::ParsedFile;
use crate::schema::{FileFormat, SimpleFile};
use std::io::Read;
use tracing::debug;

/// Parses one file according to its declared format.
pub fn parse_simple_file<R: Read>(reader: R, file: &SimpleFile) -> Result<ParsedFile> {
    let parsed = match &file.format {
        FileFormat::Csv { columns, options } => {
            ParsedFile::Rows(delimited::parse_csv(reader, &file.key, columns, options)?)
        }
        FileFormat::Xml => ParsedFile::Document(xml::parse_xml(reader, &file.key)?),
        FileFormat::Ndjson => ParsedFile::Records(ndjson::parse_ndjson(reader, &file.key)?),
    };
    debug!(key = %file.key, kind = parsed.describe(), "Parsed file");
    Ok(parsed)
}
