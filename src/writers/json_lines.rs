
use anyhow::Context;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::util::staged_output::{ClosedOutput, StagedOutput};

/// Streams one JSON object per line, gzip-compressed if the file ends with `.gz`.
/// Records go to a temporary file until the writer is finished; a writer that is dropped leaves nothing behind.
pub struct JsonLinesWriter {
    /// Handle on the staged output
    writer: StagedOutput,
    /// Number of records written so far
    num_records: u64
}

impl JsonLinesWriter {
    /// Starts a new output
    /// # Arguments
    /// * `filename` - the final path, `.gz` enables compression
    pub fn new(filename: &Path) -> anyhow::Result<Self> {
        let writer = StagedOutput::create(filename)?;
        Ok(Self {
            writer,
            num_records: 0
        })
    }

    /// Appends a single record
    pub fn write_record<T: Serialize>(&mut self, record: &T) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, record)
            .with_context(|| format!("Error while serializing record to {:?}:", self.writer.destination()))?;
        self.writer.write_all(b"\n")?;
        self.num_records += 1;
        Ok(())
    }

    /// Appends every record in order
    pub fn write_records<'a, T: Serialize + 'a>(&mut self, records: impl IntoIterator<Item = &'a T>) -> anyhow::Result<()> {
        for record in records.into_iter() {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Completes the stream without moving it into place
    pub fn close(self) -> anyhow::Result<ClosedOutput> {
        self.writer.close()
    }

    /// Completes the stream and moves it into place, returning the number of records written
    pub fn finish(self) -> anyhow::Result<u64> {
        let num_records = self.num_records;
        self.writer.commit()?;
        Ok(num_records)
    }

    pub fn filename(&self) -> &Path {
        self.writer.destination()
    }

    pub fn num_records(&self) -> u64 {
        self.num_records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use crate::util::json_io::open_input;

    #[test]
    fn test_json_lines() {
        let tmp_dir = tempfile::tempdir().unwrap();
        for name in ["records.jsonl", "records.jsonl.gz"] {
            let filename = tmp_dir.path().join(name);
            let mut writer = JsonLinesWriter::new(&filename).unwrap();
            writer.write_record(&vec![1, 2]).unwrap();
            writer.write_records(&[vec![3], vec![]]).unwrap();
            assert_eq!(writer.num_records(), 3);
            assert_eq!(writer.finish().unwrap(), 3);

            let mut text = String::new();
            open_input(&filename).unwrap().read_to_string(&mut text).unwrap();
            assert_eq!(text, "[1,2]\n[3]\n[]\n");
        }
    }

    #[test]
    fn test_abandoned_writer() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let filename = tmp_dir.path().join("examples_child.jsonl.gz");
        let mut writer = JsonLinesWriter::new(&filename).unwrap();
        writer.write_records(&[vec![1], vec![2]]).unwrap();
        drop(writer);

        assert!(!filename.exists());
        assert_eq!(std::fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }
}
