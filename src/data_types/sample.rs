
use log::trace;
use serde::{Deserialize, Serialize};
use strum_macros::EnumString;

use crate::collaborators::ReadSource;
use crate::data_types::ranges::Range;
use crate::data_types::reads::{AlignedRead, ReadRequirements};

/// The role a sample plays in a trio
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[derive(strum_macros::Display, EnumString, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SampleRole {
    #[strum(ascii_case_insensitive, serialize = "parent1")]
    #[clap(name = "parent1")]
    Parent1,
    /// The target sample
    #[strum(ascii_case_insensitive, serialize = "child")]
    #[clap(name = "child")]
    Child,
    #[strum(ascii_case_insensitive, serialize = "parent2")]
    #[clap(name = "parent2")]
    Parent2
}

/// Stacking order of the pileup blocks for a called role, as indices into `roles`.
/// The child and the first parent stack parent1, child, parent2; the second parent stacks itself on top instead.
/// Roles that are not present are skipped.
/// # Arguments
/// * `roles` - the roles of every sample, in processor order
/// * `called` - the role the pileup is built for
pub fn stacking_order(roles: &[SampleRole], called: SampleRole) -> Vec<usize> {
    let layout = match called {
        SampleRole::Parent2 => [SampleRole::Parent2, SampleRole::Child, SampleRole::Parent1],
        _ => [SampleRole::Parent1, SampleRole::Child, SampleRole::Parent2]
    };
    layout.iter()
        .filter_map(|role| roles.iter().position(|r| r == role))
        .collect()
}

/// Reads for the interval currently being processed.
/// The buffer is only ever replaced wholesale, never appended to.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    /// The interval these reads were loaded for
    region: Option<Range>,
    /// The reads themselves, in source order
    reads: Vec<AlignedRead>
}

impl ReadBuffer {
    /// Drops whatever was loaded before and stores `reads` for `region`
    pub fn replace(&mut self, region: Range, reads: Vec<AlignedRead>) {
        self.region = Some(region);
        self.reads = reads;
    }

    pub fn clear(&mut self) {
        self.region = None;
        self.reads.clear();
    }

    // getters
    pub fn region(&self) -> Option<&Range> {
        self.region.as_ref()
    }

    pub fn reads(&self) -> &[AlignedRead] {
        &self.reads
    }
}

/// One sample in the run, owning its read source and its per-interval read buffer
pub struct Sample {
    /// Trio role
    role: SampleRole,
    /// Sample name written into calls
    name: String,
    /// Exclusive handle on the read source
    read_source: Box<dyn ReadSource>,
    /// Reads for the current interval
    buffer: ReadBuffer,
    /// Order in which samples are stacked in this sample's pileups, as indices into the processor sample list
    order: Vec<usize>,
    /// Number of pileup rows for this sample
    pileup_height: usize
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // the read source does not have Debug, so skip it
        f.debug_struct("Sample")
            .field("role", &self.role)
            .field("name", &self.name)
            .field("num_reads", &self.buffer.reads().len())
            .field("order", &self.order)
            .field("pileup_height", &self.pileup_height)
            .finish()
    }
}

impl Sample {
    /// Constructor
    /// # Arguments
    /// * `role` - the trio role
    /// * `name` - the sample name
    /// * `read_source` - source of reads for this sample, owned exclusively
    /// * `order` - sample stacking order for pileups
    /// * `pileup_height` - number of pileup rows for this sample
    pub fn new(
        role: SampleRole, name: impl Into<String>, read_source: Box<dyn ReadSource>,
        order: Vec<usize>, pileup_height: usize
    ) -> Self {
        Self {
            role,
            name: name.into(),
            read_source,
            buffer: ReadBuffer::default(),
            order,
            pileup_height
        }
    }

    /// Fetches the reads for `region`, filters them, and replaces the buffer with the result.
    /// Returns the number of reads kept.
    /// # Errors
    /// * if the read source fails, in which case the buffer is left empty
    pub fn load_reads(&mut self, region: &Range, requirements: &ReadRequirements) -> anyhow::Result<usize> {
        self.buffer.clear();
        let fetched = self.read_source.query(region)?;
        let total = fetched.len();
        let kept: Vec<AlignedRead> = fetched.into_iter()
            .filter(|r| requirements.passes(r))
            .collect();
        trace!("{}: kept {} of {total} reads in {region}", self.role, kept.len());

        let num_kept = kept.len();
        self.buffer.replace(region.clone(), kept);
        Ok(num_kept)
    }

    /// Directly replaces the buffer, mostly useful when reads come from somewhere other than the source
    pub fn replace_reads(&mut self, region: Range, reads: Vec<AlignedRead>) {
        self.buffer.replace(region, reads);
    }

    /// Reads currently loaded
    pub fn reads(&self) -> &[AlignedRead] {
        self.buffer.reads()
    }

    // getters
    pub fn role(&self) -> SampleRole {
        self.role
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> &ReadBuffer {
        &self.buffer
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn pileup_height(&self) -> usize {
        self.pileup_height
    }
}
