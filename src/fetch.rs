//! Opening the dataset input, either over HTTP(S) or from the local filesystem.

use crate::config::{HTTP_TIMEOUT_SECS, READ_CHUNK_SIZE, USER_AGENT};
use crate::error::Result;
use std::fs::File;
use std::io::{BufReader, Read};
use std::time::Duration;
use tracing::info;

/// An open input stream and its length in bytes, when known.
pub struct Input {
    pub reader: Box<dyn Read>,
    pub length: Option<u64>,
}

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Opens `location` for streaming.
///
/// URLs are fetched with one GET; the response body is streamed, never
/// buffered. A missing `Content-Length` only leaves the length unknown.
pub fn open_input(location: &str) -> Result<Input> {
    if is_remote(location) {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        let response = client.get(location).send()?.error_for_status()?;
        let length = response.content_length();
        info!(url = location, bytes = ?length, "Downloading dataset");
        return Ok(Input {
            reader: Box::new(response),
            length,
        });
    }

    let file = File::open(location)?;
    let length = file.metadata().ok().map(|m| m.len());
    info!(path = location, bytes = ?length, "Reading dataset");
    Ok(Input {
        reader: Box::new(BufReader::with_capacity(READ_CHUNK_SIZE, file)),
        length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, LoadError};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn detects_urls() {
        assert!(is_remote("https://example.com/data.zip"));
        assert!(is_remote("http://localhost:8080/a.csv"));
        assert!(!is_remote("data/https.zip"));
        assert!(!is_remote("/tmp/data.zip"));
    }

    #[test]
    fn local_files_report_their_length() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"id,name\n1,Alice\n")?;

        let mut input = open_input(file.path().to_str().unwrap())?;
        assert_eq!(input.length, Some(16));

        let mut content = String::new();
        input.reader.read_to_string(&mut content)?;
        assert_eq!(content, "id,name\n1,Alice\n");
        Ok(())
    }

    #[test]
    fn missing_local_file_is_a_transport_error() {
        let err = open_input("/definitely/not/here.zip").err().unwrap();
        assert!(matches!(err, LoadError::Io(_)));
        assert_eq!(err.category(), ErrorCategory::Transport);
    }
}
