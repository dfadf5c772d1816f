
use crate::data_types::candidate::Candidate;
use crate::data_types::contig::Contig;
use crate::data_types::feature_record::EncodedPileup;
use crate::data_types::label::Label;
use crate::data_types::ranges::Range;
use crate::data_types::reads::AlignedRead;
use crate::data_types::sample::{Sample, SampleRole};
use crate::data_types::variants::Variant;
use crate::realigner::{HaplotypeAlignments, ReadAlignment};

/// Range-bounded access to aligned reads for one sample
pub trait ReadSource: Send {
    /// Returns every read overlapping `region`, in source order
    fn query(&mut self, region: &Range) -> anyhow::Result<Vec<AlignedRead>>;
}

/// Read-only access to the reference sequence, shared by all workers
pub trait ReferenceSource: Send + Sync {
    /// All contigs in reference order
    fn contigs(&self) -> Vec<Contig>;

    /// Upper-case bases for `region`
    /// # Errors
    /// * if the contig is unknown or the region is past the contig end
    fn bases(&self, region: &Range) -> anyhow::Result<Vec<u8>>;

    /// Length of a contig, if known
    fn contig_length(&self, name: &str) -> Option<u64> {
        self.contigs().into_iter()
            .find(|c| c.name() == name)
            .map(|c| c.length())
    }
}

/// Range-bounded access to truth variants
pub trait TruthVariantSource: Send {
    /// Returns truth variants starting inside `region`, in file order
    fn query(&mut self, region: &Range) -> anyhow::Result<Vec<Variant>>;
}

/// Proposes candidate variants from a sample's loaded reads
pub trait CandidateCaller: Send {
    /// Returns candidates in a stable order for the region
    fn call(&self, region: &Range, sample: &Sample, reference: &dyn ReferenceSource) -> anyhow::Result<Vec<Candidate>>;
}

/// Aligns reads against a haplotype sequence
pub trait HaplotypeRealigner: Send {
    /// Returns one alignment per read, in read order
    /// # Arguments
    /// * `reads` - the reads to align
    /// * `haplotype` - the haplotype sequence
    /// * `haplotype_start` - reference position of the first haplotype base
    fn align(&self, reads: &[AlignedRead], haplotype: &[u8], haplotype_start: u64) -> anyhow::Result<Vec<ReadAlignment>>;
}

/// Encodes the evidence for a candidate into one image per ALT allele subset
pub trait PileupImageCreator: Send {
    /// Returns the encoded images, or None if there is not enough evidence to build one
    /// # Arguments
    /// * `candidate` - the candidate to encode
    /// * `called` - role of the sample the candidate was called in
    /// * `samples` - samples in stacking order
    /// * `haplotypes` - realignment output, if alt-aligned pileups are enabled
    /// * `reference` - reference access for the reference row
    fn encode(
        &self, candidate: &Candidate, called: SampleRole, samples: &[&Sample],
        haplotypes: Option<&HaplotypeAlignments>, reference: &dyn ReferenceSource
    ) -> anyhow::Result<Option<Vec<EncodedPileup>>>;

    /// Width of the images in bases, this is also the haplotype window
    fn width(&self) -> usize;
}

/// Produces gVCF-style records covering a region for one sample
pub trait ReferenceConfidenceEmitter: Send {
    /// Returns records sorted by start
    fn emit(
        &self, region: &Range, sample: &Sample, candidates: &[Candidate], reference: &dyn ReferenceSource
    ) -> anyhow::Result<Vec<Variant>>;
}

/// Assigns truth labels to candidates
pub trait VariantLabeler: Send {
    /// Returns exactly one label per candidate, in the same order
    fn label_candidates(&mut self, candidates: &[Candidate], region: &Range) -> anyhow::Result<Vec<Label>>;
}
