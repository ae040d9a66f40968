//! Atomic file sink with automatic cleanup on failure.
//!
//! Output is written to a temporary file in the destination directory and
//! renamed over the destination on `finish()`. Dropping the sink before
//! that removes the temporary file, so a failed run never leaves a
//! truncated CSV behind.

use crate::error::PipelineError;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

pub struct AtomicFileSink {
    writer: BufWriter<File>,
    temp_path: TempPath,
    final_path: PathBuf,
    bytes_written: u64,
}

impl AtomicFileSink {
    /// Create the destination directory (if needed) and open a temporary
    /// file next to `final_path`
    pub async fn create(final_path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let final_path = final_path.as_ref().to_path_buf();
        let parent = match final_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        tokio::fs::create_dir_all(&parent).await.map_err(|e| {
            PipelineError::sink(
                format!("failed to create output directory {}", parent.display()),
                e,
            )
        })?;

        let temp = tempfile::Builder::new()
            .prefix(".smelt-")
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(|e| {
                PipelineError::sink(
                    format!("failed to create temporary file in {}", parent.display()),
                    e,
                )
            })?;
        let (file, temp_path) = temp.into_parts();
        debug!(
            temp = %temp_path.display(),
            path = %final_path.display(),
            "Opened output sink"
        );

        Ok(AtomicFileSink {
            writer: BufWriter::new(File::from_std(file)),
            temp_path,
            final_path,
            bytes_written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: &str) -> Result<(), PipelineError> {
        self.writer.write_all(chunk.as_bytes()).await.map_err(|e| {
            PipelineError::sink(format!("failed to write {}", self.temp_path.display()), e)
        })?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Flush, sync, and atomically move the output into place
    pub async fn finish(mut self) -> Result<PathBuf, PipelineError> {
        self.writer.flush().await.map_err(|e| {
            PipelineError::sink(format!("failed to flush {}", self.temp_path.display()), e)
        })?;

        let file = self.writer.into_inner();
        file.sync_all().await.map_err(|e| {
            PipelineError::sink(format!("failed to sync {}", self.temp_path.display()), e)
        })?;
        drop(file);

        self.temp_path.persist(&self.final_path).map_err(|e| {
            PipelineError::sink(
                format!("failed to persist output to {}", self.final_path.display()),
                e.error,
            )
        })?;

        debug!(path = %self.final_path.display(), bytes = self.bytes_written, "Persisted output");
        Ok(self.final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn dir_entries(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .expect("Failed to read dir")
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[tokio::test]
    async fn test_successful_write() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let final_path = temp_dir.path().join("output.csv");

        let mut sink = AtomicFileSink::create(&final_path).await.expect("Failed to create sink");
        sink.write_chunk("name.first\n").await.unwrap();
        sink.write_chunk("Ann\n").await.unwrap();
        assert_eq!(sink.bytes_written(), 15);

        let result_path = sink.finish().await.expect("Failed to finish");

        assert_eq!(result_path, final_path);
        assert_eq!(fs::read_to_string(&final_path).unwrap(), "name.first\nAnn\n");
        assert_eq!(dir_entries(temp_dir.path()), vec![final_path]);
    }

    #[tokio::test]
    async fn test_drop_cleanup() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let final_path = temp_dir.path().join("output.csv");

        {
            let mut sink = AtomicFileSink::create(&final_path).await.unwrap();
            sink.write_chunk("partial\n").await.unwrap();
            assert_eq!(dir_entries(temp_dir.path()).len(), 1);
            // Dropped without finish()
        }

        assert!(dir_entries(temp_dir.path()).is_empty());
        assert!(!final_path.exists());
    }

    #[tokio::test]
    async fn test_creates_missing_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let final_path = temp_dir.path().join("data").join("nested").join("results.csv");

        let sink = AtomicFileSink::create(&final_path).await.unwrap();
        sink.finish().await.unwrap();

        assert!(final_path.exists());
        assert_eq!(fs::read_to_string(&final_path).unwrap(), "");

        // Directory creation is idempotent
        let sink = AtomicFileSink::create(&final_path).await.unwrap();
        sink.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_overwrites_existing_output() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let final_path = temp_dir.path().join("output.csv");
        fs::write(&final_path, "OLD_CONTENT").unwrap();

        let mut sink = AtomicFileSink::create(&final_path).await.unwrap();
        sink.write_chunk("NEW\n").await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(fs::read_to_string(&final_path).unwrap(), "NEW\n");
    }

    #[tokio::test]
    async fn test_directory_conflict_is_sink_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let blocker = temp_dir.path().join("data");
        fs::write(&blocker, "not a directory").unwrap();

        let err = AtomicFileSink::create(blocker.join("results.csv")).await.err().unwrap();

        assert_eq!(err.stage(), crate::error::PipelineStage::Sink);
    }
}
