//! Raw PCM sample file.
//!
//! The format is headerless signed 16-bit little-endian mono. Consumers must
//! know the sample rate out of band.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Append-only writer for the capture file.
pub struct SampleFileWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>, // None once closed
    scratch: Vec<u8>,
    samples_written: u64,
}

impl SampleFileWriter {
    /// Create or truncate the file at `path`.
    ///
    /// Parent directories are not created.
    ///
    /// # Errors
    /// Returns `EngineError::PathUnwritable` if the file cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| EngineError::PathUnwritable { path: path.clone(), source })?;

        debug!("Opened sample file {}", path.display());
        Ok(Self { path, writer: Some(BufWriter::new(file)), scratch: Vec::new(), samples_written: 0 })
    }

    /// Append samples, low byte first, in order.
    pub fn write_samples(&mut self, samples: &[i16]) -> std::io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(std::io::Error::other("sample file already closed"));
        };

        self.scratch.clear();
        self.scratch.extend(samples.iter().flat_map(|s| s.to_le_bytes()));
        writer.write_all(&self.scratch)?;
        self.samples_written += samples.len() as u64;
        Ok(())
    }

    /// Flush and release the file. Closing twice is a no-op.
    pub fn close(&mut self) -> std::io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => {
                writer.flush()?;
                debug!("Closed sample file {} ({} samples)", self.path.display(), self.samples_written);
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }
}

impl Drop for SampleFileWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to flush {}: {}", self.path.display(), e);
        }
    }
}

/// Decode a sample file back into 16-bit samples.
///
/// A trailing odd byte from a truncated write is ignored.
pub fn read_samples(path: impl AsRef<Path>) -> std::io::Result<Vec<i16>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    Ok(bytes.chunks_exact(2).map(|pair| i16::from_le_bytes([pair[0], pair[1]])).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_extremes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.pcm");

        let mut writer = SampleFileWriter::open(&path).unwrap();
        writer.write_samples(&[1, -1, 32767, -32768]).unwrap();
        writer.close().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![0x01, 0x00, 0xFF, 0xFF, 0xFF, 0x7F, 0x00, 0x80]);
        assert_eq!(read_samples(&path).unwrap(), vec![1, -1, 32767, -32768]);
    }

    #[test]
    fn test_open_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.pcm");
        std::fs::write(&path, [0xAAu8; 64]).unwrap();

        let mut writer = SampleFileWriter::open(&path).unwrap();
        writer.write_samples(&[7]).unwrap();
        drop(writer);

        assert_eq!(read_samples(&path).unwrap(), vec![7]);
    }

    #[test]
    fn test_appends_preserve_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.pcm");

        let mut writer = SampleFileWriter::open(&path).unwrap();
        writer.write_samples(&[1, 2]).unwrap();
        writer.write_samples(&[]).unwrap();
        writer.write_samples(&[3]).unwrap();
        assert_eq!(writer.samples_written(), 3);
        writer.close().unwrap();

        assert_eq!(read_samples(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SampleFileWriter::open(dir.path().join("signal.pcm")).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(writer.write_samples(&[1]).is_err());
    }

    #[test]
    fn test_missing_directory_is_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("signal.pcm");

        let err = SampleFileWriter::open(&path).err().unwrap();
        assert!(matches!(err, EngineError::PathUnwritable { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_read_ignores_trailing_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.pcm");
        std::fs::write(&path, [0x02, 0x00, 0x05]).unwrap();
        assert_eq!(read_samples(&path).unwrap(), vec![2]);
    }
}
