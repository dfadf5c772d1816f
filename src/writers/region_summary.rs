
use serde::Serialize;
use std::path::Path;

use crate::data_types::sample::SampleRole;
use crate::processor::RegionOutput;
use crate::util::staged_output::{ClosedOutput, StagedOutput};

/// Writes one row per processed work interval
pub struct RegionSummaryWriter {
    /// Handle on the writer, staged until the run completes
    csv_writer: csv::Writer<StagedOutput>,
}

/// Contains all the data written to each row of the summary file
#[derive(Serialize)]
struct RegionSummaryRow {
    /// 1-based inclusive literal of the interval
    region: String,
    /// Reads kept for the child
    child_reads: usize,
    /// Reads kept for the first parent, if present
    parent1_reads: Option<usize>,
    /// Reads kept for the second parent, if present
    parent2_reads: Option<usize>,
    /// Candidates over all called roles
    candidates: usize,
    /// Feature records over all called roles
    examples: usize,
    /// gVCF records over all called roles
    gvcf_records: usize
}

impl RegionSummaryRow {
    fn new(output: &RegionOutput) -> Self {
        let region = output.region.as_ref()
            .map(|r| r.to_literal())
            .unwrap_or_default();
        Self {
            region,
            child_reads: output.read_counts.get(&SampleRole::Child).copied().unwrap_or(0),
            parent1_reads: output.read_counts.get(&SampleRole::Parent1).copied(),
            parent2_reads: output.read_counts.get(&SampleRole::Parent2).copied(),
            candidates: output.candidates.values().map(|c| c.len()).sum(),
            examples: output.examples.values().map(|e| e.len()).sum(),
            gvcf_records: output.gvcfs.values().map(|g| g.len()).sum()
        }
    }
}

impl RegionSummaryWriter {
    /// Creates a new writer
    /// # Arguments
    /// * `filename` - path to the filename that will get opened, must be .csv/.tsv
    pub fn new(filename: &Path) -> anyhow::Result<Self> {
        // modify the delimiter to "," if it ends with .csv
        let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
        let delimiter: u8 = if is_csv { b',' } else { b'\t' };
        let csv_writer: csv::Writer<StagedOutput> = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(StagedOutput::create(filename)?);
        Ok(Self {
            csv_writer
        })
    }

    /// Writes the row for one processed interval
    pub fn write_region_summary(&mut self, output: &RegionOutput) -> csv::Result<()> {
        self.csv_writer.serialize(RegionSummaryRow::new(output))
    }

    /// Flushes any buffered rows and completes the file without moving it into place
    pub fn close(self) -> anyhow::Result<ClosedOutput> {
        let staged = self.csv_writer.into_inner()
            .map_err(|e| anyhow::anyhow!("Error while flushing the region summary: {}", e.error()))?;
        staged.close()
    }

    /// Completes the file and moves it into place
    pub fn finish(self) -> anyhow::Result<()> {
        self.close()?.persist()?;
        Ok(())
    }
}
