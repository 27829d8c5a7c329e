//! JSON-lines file sink.
//!
//! Appends one serialized record per line. The file is opened once and kept
//! open for the lifetime of the sink.

use super::{validate_path, Sink};
use crate::record::FieldRecord;
use crate::utils::error::SinkError;
use log::{debug, info};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends records to a file, one JSON document per line
pub struct FileSink {
    path: PathBuf,
    name: String,
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    /// Open (or create) `path` for appending
    ///
    /// # Errors
    /// * `SinkError::InvalidPath` - Path is empty, a directory, or its parent cannot be created
    /// * `SinkError::WriteFailed` - File cannot be opened
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();

        validate_path(path)?;

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directories: {}", parent.display());
                std::fs::create_dir_all(parent).map_err(|e| {
                    SinkError::InvalidPath(format!(
                        "Cannot create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(SinkError::WriteFailed)?;

        info!("Writing records to: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            name: format!("file:{}", path.display()),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn emit(&self, record: &FieldRecord) -> Result<(), SinkError> {
        // Serialize before locking so a bad record never leaves a partial line
        let line = serde_json::to_string(record)?;

        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.writer.lock().flush()?;
        Ok(())
    }
}

/// Read a JSON-lines record file
///
/// Blank lines are skipped.
///
/// # Errors
/// * `SinkError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `SinkError::SerializationFailed` - A line is not a valid record
pub fn read_records(input_path: impl AsRef<Path>) -> Result<Vec<FieldRecord>, SinkError> {
    let input_path = input_path.as_ref();

    debug!("Reading records from: {}", input_path.display());

    let file = File::open(input_path).map_err(SinkError::WriteFailed)?;

    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str::<FieldRecord>(&line)?);
    }

    debug!("Loaded {} records", records.len());

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ContextId;

    fn sample(id: u64) -> FieldRecord {
        let mut record = FieldRecord::new(ContextId::from(id));
        record.set("controller", "UsersController");
        record.set("action", "show");
        record.finish();
        record
    }

    #[test]
    fn test_emit_appends_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("records.jsonl");

        let sink = FileSink::create(&path).unwrap();
        sink.emit(&sample(1)).unwrap();
        sink.emit(&sample(2)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);

        let records = read_records(&path).unwrap();
        assert_eq!(records[0].context_id, ContextId::from(1));
        assert_eq!(records[1].get_str("action"), Some("show"));
    }

    #[test]
    fn test_reopen_appends() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("records.jsonl");

        FileSink::create(&path).unwrap().emit(&sample(1)).unwrap();
        FileSink::create(&path).unwrap().emit(&sample(2)).unwrap();

        assert_eq!(read_records(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_create_rejects_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = FileSink::create(temp_dir.path());
        assert!(matches!(result, Err(SinkError::InvalidPath(_))));
    }

    #[test]
    fn test_create_makes_parent_dirs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested_path = temp_dir.path().join("nested/dirs/records.jsonl");

        let sink = FileSink::create(&nested_path).unwrap();
        sink.emit(&sample(3)).unwrap();

        assert!(nested_path.exists());
    }

    #[test]
    fn test_read_records_rejects_garbage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"not\": \"a record\"}\n").unwrap();

        assert!(matches!(
            read_records(&path),
            Err(SinkError::SerializationFailed(_))
        ));
    }
}
