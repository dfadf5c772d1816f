
use anyhow::Context;
use flate2::write::GzEncoder;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::util::json_io::is_gzip;

/// Plain or gzip stream into the temporary file
enum StagedStream {
    Plain(NamedTempFile),
    Gzip(GzEncoder<NamedTempFile>)
}

impl Write for StagedStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            StagedStream::Plain(f) => f.write(buf),
            StagedStream::Gzip(g) => g.write(buf)
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            StagedStream::Plain(f) => f.flush(),
            StagedStream::Gzip(g) => g.flush()
        }
    }
}

/// An output file that is written under a temporary name in the destination directory.
/// Nothing appears at the destination until `close` and `persist` both succeed;
/// dropping the output (or the closed output) before that removes the temporary file.
pub struct StagedOutput {
    /// Final location
    destination: PathBuf,
    /// Buffered stream, gzip-compressed when the destination ends with `.gz`
    writer: BufWriter<StagedStream>
}

impl StagedOutput {
    /// Creates the temporary file next to `destination`
    /// # Errors
    /// * if the destination directory is not writable
    pub fn create(destination: &Path) -> anyhow::Result<Self> {
        let directory = match destination.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from(".")
        };
        let temp_file = tempfile::Builder::new()
            .prefix(".trioshard-")
            .suffix(".partial")
            .tempfile_in(&directory)
            .with_context(|| format!("Error while creating a temporary file for {destination:?}:"))?;
        let stream = if is_gzip(destination) {
            StagedStream::Gzip(GzEncoder::new(temp_file, flate2::Compression::default()))
        } else {
            StagedStream::Plain(temp_file)
        };
        Ok(Self {
            destination: destination.to_path_buf(),
            writer: BufWriter::new(stream)
        })
    }

    /// Flushes the buffer and completes the gzip trailer, leaving the data in the temporary file
    /// # Errors
    /// * if any buffered write fails
    pub fn close(self) -> anyhow::Result<ClosedOutput> {
        let destination = self.destination;
        let stream = self.writer.into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("Error while flushing output for {destination:?}:"))?;
        let temp_file = match stream {
            StagedStream::Plain(f) => f,
            StagedStream::Gzip(g) => g.finish()
                .with_context(|| format!("Error while finishing gzip stream for {destination:?}:"))?
        };
        temp_file.as_file().sync_all()
            .with_context(|| format!("Error while syncing output for {destination:?}:"))?;
        Ok(ClosedOutput { destination, temp_file })
    }

    /// Closes and moves the file into place
    pub fn commit(self) -> anyhow::Result<PathBuf> {
        self.close()?.persist()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

impl Write for StagedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// A completely written temporary file that has not been moved into place yet
pub struct ClosedOutput {
    /// Final location
    destination: PathBuf,
    /// The finished data
    temp_file: NamedTempFile
}

impl ClosedOutput {
    /// Renames the temporary file to the destination, replacing anything already there
    pub fn persist(self) -> anyhow::Result<PathBuf> {
        self.temp_file.persist(&self.destination)
            .map_err(|e| e.error)
            .with_context(|| format!("Error while moving output into place at {:?}:", self.destination))?;
        Ok(self.destination)
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use crate::util::json_io::open_input;

    fn dir_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_commit_plain() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let destination = tmp_dir.path().join("out.txt");
        let mut output = StagedOutput::create(&destination).unwrap();
        output.write_all(b"hello\n").unwrap();
        assert!(!destination.exists());

        assert_eq!(output.commit().unwrap(), destination);
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "hello\n");
        assert_eq!(dir_entries(tmp_dir.path()), 1);
    }

    #[test]
    fn test_commit_gzip_has_trailer() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let destination = tmp_dir.path().join("out.txt.gz");
        let mut output = StagedOutput::create(&destination).unwrap();
        output.write_all(b"abcdefgh").unwrap();
        output.commit().unwrap();

        // the last four bytes of a complete gzip member are the uncompressed size
        let raw = std::fs::read(&destination).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
        assert_eq!(&raw[raw.len() - 4..], &8u32.to_le_bytes());

        let mut text = String::new();
        open_input(&destination).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "abcdefgh");
    }

    #[test]
    fn test_dropped_output_leaves_nothing() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let destination = tmp_dir.path().join("out.jsonl.gz");
        let mut output = StagedOutput::create(&destination).unwrap();
        output.write_all(b"partial").unwrap();
        assert_eq!(dir_entries(tmp_dir.path()), 1);
        drop(output);
        assert!(!destination.exists());
        assert_eq!(dir_entries(tmp_dir.path()), 0);

        // closed but never persisted
        let output = StagedOutput::create(&destination).unwrap();
        let closed = output.close().unwrap();
        assert_eq!(closed.destination(), destination.as_path());
        drop(closed);
        assert_eq!(dir_entries(tmp_dir.path()), 0);
    }
}
