use crate::config::READ_CHUNK_SIZE;
use crate::error::{LoadError, Result};
use serde_json::Value as JsonValue;
use std::io::{ErrorKind, Read};

/// Splits a chunked byte stream into lines regardless of where chunks end.
#[derive(Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits every line completed by `chunk`; the unterminated tail is kept.
    pub fn push<F>(&mut self, chunk: &[u8], mut on_line: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut start = 0;
        for end in memchr::memchr_iter(b'\n', chunk) {
            if self.pending.is_empty() {
                on_line(&chunk[start..end])?;
            } else {
                self.pending.extend_from_slice(&chunk[start..end]);
                on_line(&self.pending)?;
                self.pending.clear();
            }
            start = end + 1;
        }
        self.pending.extend_from_slice(&chunk[start..]);
        Ok(())
    }

    /// Emits the trailing line left without a newline, if any.
    pub fn finish<F>(self, mut on_line: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        if !self.pending.is_empty() {
            on_line(&self.pending)?;
        }
        Ok(())
    }
}

struct RecordSink<'a> {
    key: &'a str,
    line: usize,
    records: Vec<JsonValue>,
}

impl RecordSink<'_> {
    fn accept(&mut self, line: &[u8]) -> Result<()> {
        self.line += 1;
        let line = line.trim_ascii();
        if line.is_empty() {
            return Ok(());
        }
        let record = serde_json::from_slice(line).map_err(|source| LoadError::Json {
            key: self.key.to_string(),
            line: self.line,
            source,
        })?;
        self.records.push(record);
        Ok(())
    }
}

/// Reads newline-delimited JSON, one record per non-blank line.
pub fn parse_ndjson<R: Read>(mut reader: R, key: &str) -> Result<Vec<JsonValue>> {
    let mut splitter = LineSplitter::new();
    let mut sink = RecordSink {
        key,
        line: 0,
        records: Vec::new(),
    };
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        splitter.push(&buf[..n], |line| sink.accept(line))?;
    }
    splitter.finish(|line| sink.accept(line))?;

    Ok(sink.records)
}
