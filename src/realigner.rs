
use anyhow::Context;
use indexmap::IndexMap;
use log::trace;
use serde::Serialize;

use crate::collaborators::{HaplotypeRealigner, ReferenceSource};
use crate::data_types::ranges::Range;
use crate::data_types::reads::AlignedRead;
use crate::data_types::variants::Variant;
use crate::dwfa::read_wavefront::{DWFAError, ReadWavefront};

/// Reads shorter than this after trimming to the alignment window are not realigned
pub const MIN_REALIGNED_READ_LENGTH: usize = 15;

/// Raised when a variant's REF allele disagrees with the reference sequence at its position
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Reference bases {variant_bases:?} of the variant at {contig}:{position} does not match the bases in the reference {reference_bases:?}")]
pub struct ReferenceMismatchError {
    /// Contig of the variant
    pub contig: String,
    /// 1-based position of the variant
    pub position: u64,
    /// REF recorded on the variant
    pub variant_bases: String,
    /// What the reference actually has
    pub reference_bases: String
}

/// Result of aligning one read against one haplotype
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ReadAlignment {
    /// Name of the aligned read
    read_name: String,
    /// Offset of the read's first base in the haplotype
    haplotype_offset: usize,
    /// Edit distance to the haplotype, None if the read could not be aligned
    edit_distance: Option<usize>,
    /// Number of read bases that took part in the alignment
    aligned_bases: usize
}

impl ReadAlignment {
    pub fn new(read_name: String, haplotype_offset: usize, edit_distance: Option<usize>, aligned_bases: usize) -> Self {
        Self {
            read_name,
            haplotype_offset,
            edit_distance,
            aligned_bases
        }
    }

    // getters
    pub fn read_name(&self) -> &str {
        &self.read_name
    }

    pub fn haplotype_offset(&self) -> usize {
        self.haplotype_offset
    }

    pub fn edit_distance(&self) -> Option<usize> {
        self.edit_distance
    }

    pub fn aligned_bases(&self) -> usize {
        self.aligned_bases
    }
}

/// Haplotypes and read alignments for a single candidate, keyed by ALT allele
#[derive(Clone, Debug, Default, Serialize)]
pub struct HaplotypeAlignments {
    /// Reference position of the first haplotype base
    window_start: u64,
    /// The reads that went into the realignment, trimmed to the window
    reads: Vec<AlignedRead>,
    /// Haplotype sequence per ALT
    sequences: IndexMap<String, Vec<u8>>,
    /// Per-read alignments per ALT, in `reads` order
    alignments: IndexMap<String, Vec<ReadAlignment>>
}

impl HaplotypeAlignments {
    pub fn sequence(&self, alt: &str) -> Option<&[u8]> {
        self.sequences.get(alt).map(|s| s.as_slice())
    }

    pub fn read_alignments(&self, alt: &str) -> Option<&[ReadAlignment]> {
        self.alignments.get(alt).map(|a| a.as_slice())
    }

    /// Returns the ALT whose haplotype a read fits best, if it aligned to any of them
    pub fn best_alt_for_read(&self, read_name: &str) -> Option<&str> {
        self.alignments.iter()
            .filter_map(|(alt, alignments)| {
                alignments.iter()
                    .find(|a| a.read_name() == read_name)
                    .and_then(|a| a.edit_distance())
                    .map(|ed| (ed, alt.as_str()))
            })
            // ties go to the first ALT
            .min_by_key(|&(ed, _alt)| ed)
            .map(|(_ed, alt)| alt)
    }

    // getters
    pub fn window_start(&self) -> u64 {
        self.window_start
    }

    pub fn reads(&self) -> &[AlignedRead] {
        &self.reads
    }

    pub fn sequences(&self) -> &IndexMap<String, Vec<u8>> {
        &self.sequences
    }

    pub fn alignments(&self) -> &IndexMap<String, Vec<ReadAlignment>> {
        &self.alignments
    }
}

/// Builds the haplotype for every ALT of `variant` over a window of `window_width` bases and realigns `reads` against each.
/// The haplotype is `(width - 1) / 2` reference bases on either side of the ALT, clipped at the contig edges and truncated to `window_width`.
/// # Arguments
/// * `variant` - the candidate variant
/// * `reads` - candidate reads, typically the called sample's buffer
/// * `reference` - reference access
/// * `realigner` - the alignment routine, invoked once per ALT
/// * `window_width` - haplotype window width
/// # Errors
/// * `ReferenceMismatchError` if the variant REF does not match the reference
/// * if reference access or the realigner fails
pub fn align_to_all_haplotypes(
    variant: &Variant, reads: &[AlignedRead], reference: &dyn ReferenceSource,
    realigner: &dyn HaplotypeRealigner, window_width: usize
) -> anyhow::Result<HaplotypeAlignments> {
    let ref_bases = reference.bases(&variant.range())
        .with_context(|| format!("Error while loading reference bases for variant at {}", variant.range()))?;
    if !ref_bases.eq_ignore_ascii_case(variant.reference_bases().as_bytes()) {
        return Err(ReferenceMismatchError {
            contig: variant.contig().to_string(),
            position: variant.start() + 1,
            variant_bases: variant.reference_bases().to_string(),
            reference_bases: String::from_utf8_lossy(&ref_bases).to_string()
        }.into());
    }

    let contig_length = reference.contig_length(variant.contig())
        .with_context(|| format!("Unknown contig {:?}", variant.contig()))?;
    let half_width = (window_width.saturating_sub(1) / 2) as u64;
    let window_start = variant.start().saturating_sub(half_width);
    let window_end = (variant.end() + half_width).min(contig_length);

    let prefix = if window_start < variant.start() {
        reference.bases(&Range::new(variant.contig(), window_start, variant.start())?)?
    } else {
        vec![]
    };
    let suffix = if variant.end() < window_end {
        reference.bases(&Range::new(variant.contig(), variant.end(), window_end)?)?
    } else {
        vec![]
    };

    let window = Range::new(variant.contig(), window_start, window_end)?;
    let trimmed: Vec<AlignedRead> = reads.iter()
        .filter_map(|r| r.trim_to(&window))
        .filter(|r| r.bases().len() >= MIN_REALIGNED_READ_LENGTH)
        .collect();
    trace!("Realigning {} of {} reads in {window}", trimmed.len(), reads.len());

    let mut ret = HaplotypeAlignments {
        window_start,
        reads: trimmed,
        ..Default::default()
    };
    for alt in variant.alternate_bases().iter() {
        let mut haplotype = Vec::with_capacity(prefix.len() + alt.len() + suffix.len());
        haplotype.extend_from_slice(&prefix);
        haplotype.extend_from_slice(alt.as_bytes());
        haplotype.extend_from_slice(&suffix);
        haplotype.truncate(window_width);

        let alignments = realigner.align(&ret.reads, &haplotype, window_start)?;
        ret.sequences.insert(alt.clone(), haplotype);
        ret.alignments.insert(alt.clone(), alignments);
    }
    Ok(ret)
}

/// Production realigner, scores each read with a wavefront alignment starting at the read's offset in the haplotype
#[derive(Clone, Copy, Debug)]
pub struct DwfaRealigner {
    /// Reads with more edits than this are reported as unaligned
    max_edit_distance: usize
}

impl Default for DwfaRealigner {
    fn default() -> Self {
        Self { max_edit_distance: 50 }
    }
}

impl DwfaRealigner {
    pub fn new(max_edit_distance: usize) -> Self {
        Self { max_edit_distance }
    }
}

impl HaplotypeRealigner for DwfaRealigner {
    fn align(&self, reads: &[AlignedRead], haplotype: &[u8], haplotype_start: u64) -> anyhow::Result<Vec<ReadAlignment>> {
        let mut ret = Vec::with_capacity(reads.len());
        for read in reads.iter() {
            let offset = (read.start().saturating_sub(haplotype_start) as usize).min(haplotype.len());
            let mut wavefront = ReadWavefront::with_max_edit_distance(self.max_edit_distance);
            let edit_distance = match wavefront.align(&haplotype[offset..], read.bases()) {
                Ok(ed) => Some(ed),
                Err(DWFAError::MaxEditDistance) => None
            };
            ret.push(ReadAlignment::new(read.name().to_string(), offset, edit_distance, read.bases().len()));
        }
        Ok(ret)
    }
}
