//! Streaming archive reader.
//!
//! Entries are read straight off the incoming byte stream, in archive order,
//! and each entry named in the manifest is piped into its format parser
//! without ever buffering the whole archive. Unknown entries are skipped.
//!
//! An entry written with a data descriptor does not carry its size in the
//! local header, so it cannot be delimited from the stream alone. From that
//! entry on, the rest of the input is spooled to a temporary file at its
//! original offset and the remaining entries are read through the central
//! directory, still in archive order.

use crate::error::{LoadError, Result};
use crate::models::ParsedFileData;
use crate::parser::parse_simple_file;
use crate::schema::{DatasourceSchema, FileSource, SimpleFile};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use tracing::{debug, info, warn};
use zip::read::read_zipfile_from_stream;
use zip::result::ZipError;
use zip::ZipArchive;

const LOCAL_HEADER_LEN: usize = 30;
const LOCAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const DATA_DESCRIPTOR_FLAG: u16 = 1 << 3;

/// Parses the schema's file source from `reader`.
pub fn parse_source<R: Read>(reader: R, schema: &DatasourceSchema) -> Result<ParsedFileData> {
    match &schema.file {
        FileSource::Zip(zip) => read_archive(reader, &zip.files),
        FileSource::Single(file) => {
            let mut output = ParsedFileData::new();
            output.insert(file.key.clone(), parse_simple_file(reader, file)?);
            Ok(output)
        }
    }
}

/// Counts consumed bytes and keeps the fixed part of the current local header.
struct HeaderTap<R> {
    inner: R,
    position: u64,
    entry_start: u64,
    header: [u8; LOCAL_HEADER_LEN],
    header_len: usize,
}

impl<R: Read> HeaderTap<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            position: 0,
            entry_start: 0,
            header: [0; LOCAL_HEADER_LEN],
            header_len: 0,
        }
    }

    fn start_entry(&mut self) {
        self.entry_start = self.position;
        self.header_len = 0;
    }

    fn uses_data_descriptor(&self) -> bool {
        self.header_len == LOCAL_HEADER_LEN
            && self.header[..4] == LOCAL_HEADER_SIGNATURE
            && u16::from_le_bytes([self.header[6], self.header[7]]) & DATA_DESCRIPTOR_FLAG != 0
    }

    /// Copies the current entry and everything after it to a temporary file,
    /// at the same offsets as in the original archive.
    fn spool(mut self) -> io::Result<File> {
        let mut spool = tempfile::tempfile()?;
        spool.seek(SeekFrom::Start(self.entry_start))?;
        spool.write_all(&self.header[..self.header_len])?;
        io::copy(&mut self.inner, &mut spool)?;
        spool.rewind()?;
        Ok(spool)
    }
}

impl<R: Read> Read for HeaderTap<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        let wanted = (LOCAL_HEADER_LEN - self.header_len).min(n);
        self.header[self.header_len..self.header_len + wanted].copy_from_slice(&buf[..wanted]);
        self.header_len += wanted;
        self.position += n as u64;
        Ok(n)
    }
}

/// Reads a ZIP stream and parses every entry listed in `files`.
///
/// Any parser failure aborts the whole read. Manifest files that never show
/// up in the archive are reported together once the stream ends.
pub fn read_archive<R: Read>(reader: R, files: &[SimpleFile]) -> Result<ParsedFileData> {
    let manifest: FxHashMap<&str, &SimpleFile> =
        files.iter().map(|f| (f.path.as_str(), f)).collect();
    let mut output = ParsedFileData::new();
    let mut tap = HeaderTap::new(reader);

    if let Some(err) = read_streamed(&mut tap, &manifest, &mut output)? {
        if !tap.uses_data_descriptor() {
            return Err(err.into());
        }
        warn!(offset = tap.entry_start, "Entry sizes follow its data, spooling the rest of the archive");
        read_spooled(tap.spool()?, &manifest, &mut output)?;
    }

    let missing: Vec<String> = files
        .iter()
        .filter(|f| !output.contains_key(&f.key))
        .map(|f| f.path.clone())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingEntries { paths: missing });
    }

    info!(files = output.len(), "Archive read");
    Ok(output)
}

/// Parses entries off the stream until the central directory is reached.
///
/// Returns the error of an entry the streaming reader cannot delimit, leaving
/// `tap` positioned right after that entry's fixed header.
fn read_streamed<R: Read>(
    tap: &mut HeaderTap<R>,
    manifest: &FxHashMap<&str, &SimpleFile>,
    output: &mut ParsedFileData,
) -> Result<Option<ZipError>> {
    loop {
        tap.start_entry();
        let mut entry = match read_zipfile_from_stream(tap) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(err @ ZipError::UnsupportedArchive(_)) => return Ok(Some(err)),
            Err(err) => return Err(err.into()),
        };

        let Some(file) = manifest.get(entry.name()).copied() else {
            debug!(entry = entry.name(), "Skipping archive entry");
            continue;
        };

        debug!(entry = entry.name(), key = %file.key, size = entry.size(), "Parsing archive entry");
        let parsed = parse_simple_file(&mut entry, file)?;
        output.insert(file.key.clone(), parsed);
    }
}

/// Parses the listed entries of a spooled archive that were not streamed yet.
fn read_spooled(
    spool: File,
    manifest: &FxHashMap<&str, &SimpleFile>,
    output: &mut ParsedFileData,
) -> Result<()> {
    let mut archive = ZipArchive::new(spool)?;

    for index in 0..archive.len() {
        let file = archive
            .name_for_index(index)
            .and_then(|name| manifest.get(name).copied());
        let Some(file) = file else {
            continue;
        };
        // Entries before the spool offset were parsed from the stream already.
        if output.contains_key(&file.key) {
            continue;
        }

        let mut entry = archive.by_index(index)?;
        debug!(entry = entry.name(), key = %file.key, size = entry.size(), "Parsing spooled entry");
        let parsed = parse_simple_file(&mut entry, file)?;
        output.insert(file.key.clone(), parsed);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::models::{ParsedFile, Value};
    use crate::schema::{ColumnDef, ColumnType, CsvOptions, FileFormat};
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    pub(crate) fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn crc32(data: &[u8]) -> u32 {
        let mut crc = !0u32;
        for byte in data {
            crc ^= u32::from(*byte);
            for _ in 0..8 {
                crc = if crc & 1 == 1 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            }
        }
        !crc
    }

    /// Stored entries laid out by hand. Entries flagged `true` carry their
    /// sizes in a trailing data descriptor, the way streaming writers emit them.
    fn build_raw_zip(entries: &[(&str, &str, bool)]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();
        for (name, content, descriptor) in entries {
            let offset = out.len() as u32;
            let crc = crc32(content.as_bytes());
            let size = content.len() as u32;
            let flags: u16 = if *descriptor { 0x0008 } else { 0 };
            let (header_crc, header_size) = if *descriptor { (0, 0) } else { (crc, size) };

            out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&flags.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&0x0021u16.to_le_bytes());
            out.extend_from_slice(&header_crc.to_le_bytes());
            out.extend_from_slice(&header_size.to_le_bytes());
            out.extend_from_slice(&header_size.to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(content.as_bytes());
            if *descriptor {
                out.extend_from_slice(&0x0807_4b50u32.to_le_bytes());
                out.extend_from_slice(&crc.to_le_bytes());
                out.extend_from_slice(&size.to_le_bytes());
                out.extend_from_slice(&size.to_le_bytes());
            }

            central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&flags.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0x0021u16.to_le_bytes());
            central.extend_from_slice(&crc.to_le_bytes());
            central.extend_from_slice(&size.to_le_bytes());
            central.extend_from_slice(&size.to_le_bytes());
            central.extend_from_slice(&(name.len() as u16).to_le_bytes());
            central.extend_from_slice(&[0; 12]);
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name.as_bytes());
        }

        let central_offset = out.len() as u32;
        out.extend_from_slice(&central);
        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    fn csv_file(path: &str, key: &str) -> SimpleFile {
        SimpleFile {
            path: path.to_string(),
            key: key.to_string(),
            format: FileFormat::Csv {
                columns: vec![
                    ColumnDef::new("id", ColumnType::Int),
                    ColumnDef::new("name", ColumnType::String),
                ],
                options: CsvOptions::default(),
            },
        }
    }

    fn ndjson_file(path: &str, key: &str) -> SimpleFile {
        SimpleFile {
            path: path.to_string(),
            key: key.to_string(),
            format: FileFormat::Ndjson,
        }
    }

    #[test]
    fn parses_listed_entries_and_skips_others() {
        let archive = build_zip(&[
            ("data/orders.json", "{\"id\":1}\n{\"id\":2}\n"),
            ("README.txt", "not listed"),
            ("data/customers.csv", "id,name\n1,Alice\n2,Bob\n"),
        ]);
        let files = vec![
            csv_file("data/customers.csv", "customers"),
            ndjson_file("data/orders.json", "orders"),
        ];

        let parsed = read_archive(archive.as_slice(), &files).unwrap();
        assert_eq!(parsed.len(), 2);

        let customers = parsed["customers"].rows().unwrap();
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[1]["name"], Value::String("Bob".to_string()));
        assert!(matches!(&parsed["orders"], ParsedFile::Records(r) if r.len() == 2));
    }

    #[test]
    fn entries_with_data_descriptors_are_read() {
        let archive = build_raw_zip(&[
            ("data/customers.csv", "id,name\n1,Alice\n2,Bob\n", false),
            ("README.txt", "not listed", true),
            ("data/orders.json", "{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n", true),
        ]);
        let files = vec![
            csv_file("data/customers.csv", "customers"),
            ndjson_file("data/orders.json", "orders"),
        ];

        let parsed = read_archive(archive.as_slice(), &files).unwrap();
        assert_eq!(parsed["customers"].rows().unwrap().len(), 2);
        assert!(matches!(&parsed["orders"], ParsedFile::Records(r) if r.len() == 3));
    }

    #[test]
    fn data_descriptor_entry_can_come_first() {
        let archive = build_raw_zip(&[("data/customers.csv", "id,name\n7,Carol\n", true)]);
        let files = vec![csv_file("data/customers.csv", "customers")];

        let parsed = read_archive(archive.as_slice(), &files).unwrap();
        let customers = parsed["customers"].rows().unwrap();
        assert_eq!(customers[0]["id"], Value::Int(7));
    }

    #[test]
    fn missing_entries_fail_the_read() {
        let archive = build_zip(&[("data/customers.csv", "id,name\n1,Alice\n")]);
        let files = vec![
            csv_file("data/customers.csv", "customers"),
            ndjson_file("data/orders.json", "orders"),
        ];

        let err = read_archive(archive.as_slice(), &files).unwrap_err();
        assert!(matches!(err, LoadError::MissingEntries { ref paths } if paths == &["data/orders.json"]));
        assert_eq!(err.category(), ErrorCategory::Schema);
    }

    #[test]
    fn one_failing_parser_fails_everything() {
        let archive = build_zip(&[
            ("data/customers.csv", "id,name\n1,Alice\n"),
            ("data/orders.json", "{\"id\":1}\nnot json\n"),
        ]);
        let files = vec![
            csv_file("data/customers.csv", "customers"),
            ndjson_file("data/orders.json", "orders"),
        ];

        let err = read_archive(archive.as_slice(), &files).unwrap_err();
        assert!(matches!(err, LoadError::Json { line: 2, .. }));
    }

    #[test]
    fn garbage_input_is_an_archive_error() {
        let files = vec![csv_file("data/customers.csv", "customers")];
        let err = read_archive(&b"definitely not a zip file"[..], &files).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transport);
    }
}
