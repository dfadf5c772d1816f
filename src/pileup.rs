
use anyhow::{bail, ensure};
use derive_builder::Builder;
use itertools::Itertools;
use log::trace;
use serde::Serialize;

use crate::collaborators::{PileupImageCreator, ReferenceSource};
use crate::data_types::candidate::Candidate;
use crate::data_types::feature_record::{EncodedPileup, RAW_TENSOR_FORMAT};
use crate::data_types::ranges::Range;
use crate::data_types::reads::AlignedRead;
use crate::data_types::sample::{Sample, SampleRole};
use crate::realigner::HaplotypeAlignments;

pub const MIN_PILEUP_HEIGHT: usize = 10;
pub const MAX_PILEUP_HEIGHT: usize = 100;
/// Channels without the alt-aligned haplotype channels
pub const BASE_CHANNELS: usize = 6;
/// Channels with the alt-aligned haplotype channels
pub const ALT_ALIGNED_CHANNELS: usize = 8;

const MAX_BASE_QUALITY: u8 = 40;
const MAX_MAPPING_QUALITY: u8 = 60;
const MAX_PIXEL: u8 = 254;
const FORWARD_STRAND: u8 = 70;
const REVERSE_STRAND: u8 = 240;
/// Edit distances at or beyond this saturate the haplotype channels
const MAX_SCORED_EDITS: usize = 25;

/// Checks that a pileup height is in the supported range
/// # Errors
/// * if the height is outside [10, 100]
pub fn check_pileup_height(height: usize) -> anyhow::Result<()> {
    if !(MIN_PILEUP_HEIGHT..=MAX_PILEUP_HEIGHT).contains(&height) {
        bail!("Pileup image heights must be between {MIN_PILEUP_HEIGHT} and {MAX_PILEUP_HEIGHT}.");
    }
    Ok(())
}

/// Image geometry
#[derive(Builder, Clone, Copy, Debug, Serialize)]
#[builder(default)]
pub struct PileupConfig {
    /// Number of columns, must be odd so the variant sits in the center
    pub width: usize,
    /// If true, add the two haplotype channels
    pub alt_aligned_pileup: bool
}

impl Default for PileupConfig {
    fn default() -> Self {
        Self {
            width: 199,
            alt_aligned_pileup: false
        }
    }
}

impl PileupConfig {
    pub fn num_channels(&self) -> usize {
        if self.alt_aligned_pileup {
            ALT_ALIGNED_CHANNELS
        } else {
            BASE_CHANNELS
        }
    }
}

/// Raw u8 tensor encoder, one [height, width, channels] image per ALT subset with the sample blocks stacked vertically
#[derive(Clone, Debug, Default)]
pub struct PileupEncoder {
    config: PileupConfig
}

impl PileupEncoder {
    /// Constructor
    /// # Errors
    /// * if the width is even or zero
    pub fn new(config: PileupConfig) -> anyhow::Result<Self> {
        ensure!(config.width % 2 == 1, "Pileup image width must be odd, got {}", config.width);
        Ok(Self { config })
    }

    /// Each single ALT, plus every pair for multi-allelic sites
    pub fn alt_subsets(alternates: &[String]) -> Vec<Vec<String>> {
        let mut ret: Vec<Vec<String>> = alternates.iter().map(|a| vec![a.clone()]).collect();
        if alternates.len() > 1 {
            ret.extend(alternates.iter().cloned().combinations(2));
        }
        ret
    }

    fn num_channels(&self) -> usize {
        self.config.num_channels()
    }

    /// Writes the reference row of a sample block
    fn fill_reference_row(&self, row: &mut [u8], window_bases: &[Option<u8>]) {
        let channels = self.num_channels();
        for (col, base) in window_bases.iter().enumerate() {
            let Some(base) = base else {
                continue;
            };
            let pixel = &mut row[col * channels..(col + 1) * channels];
            pixel[0] = base_value(*base);
            pixel[1] = MAX_PIXEL;
            pixel[2] = MAX_PIXEL;
            pixel[3] = FORWARD_STRAND;
        }
    }

    /// Writes one read row
    fn fill_read_row(
        &self, row: &mut [u8], read: &AlignedRead, window_start: i64, window_bases: &[Option<u8>],
        supports_alt: bool, haplotype_scores: [u8; 2]
    ) {
        let channels = self.num_channels();
        let support = if supports_alt { MAX_PIXEL } else { 0 };
        let strand = if read.flags().reverse_strand { REVERSE_STRAND } else { FORWARD_STRAND };
        let mapq = scale(read.mapping_quality(), MAX_MAPPING_QUALITY);
        for (col, ref_base) in window_bases.iter().enumerate() {
            let position = window_start + col as i64;
            if position < 0 {
                continue;
            }
            let Some((base, quality)) = read.base_at(position as u64) else {
                continue;
            };
            let pixel = &mut row[col * channels..(col + 1) * channels];
            pixel[0] = base_value(base);
            pixel[1] = scale(quality, MAX_BASE_QUALITY);
            pixel[2] = mapq;
            pixel[3] = strand;
            pixel[4] = support;
            pixel[5] = match ref_base {
                Some(rb) if !rb.eq_ignore_ascii_case(&base) => MAX_PIXEL,
                _ => 0
            };
            if channels == ALT_ALIGNED_CHANNELS {
                pixel[6] = haplotype_scores[0];
                pixel[7] = haplotype_scores[1];
            }
        }
    }
}

impl PileupImageCreator for PileupEncoder {
    fn encode(
        &self, candidate: &Candidate, called_role: SampleRole, samples: &[&Sample],
        haplotypes: Option<&HaplotypeAlignments>, reference: &dyn ReferenceSource
    ) -> anyhow::Result<Option<Vec<EncodedPileup>>> {
        let variant = candidate.variant();
        // sample names may repeat across a trio, roles do not
        let Some(called) = samples.iter().find(|s| s.role() == called_role) else {
            bail!("The {called_role} sample is not part of the pileup sample order");
        };
        let called_name = called.name();
        let variant_base = Range::new(variant.contig(), variant.start(), variant.start() + 1)?;
        if !called.reads().iter().any(|r| r.overlaps(&variant_base)) {
            trace!("No reads from {called_name} cover {}, skipping", variant.range());
            return Ok(None);
        }

        // window bases, None beyond the contig edges
        let width = self.config.width;
        let half_width = (width / 2) as i64;
        let window_start = variant.start() as i64 - half_width;
        let contig_length = reference.contig_length(variant.contig()).unwrap_or(0) as i64;
        let clip_start = window_start.max(0);
        let clip_end = (window_start + width as i64).min(contig_length);
        ensure!(clip_start < clip_end, "Variant at {} is outside of the reference", variant.range());
        let window_range = Range::new(variant.contig(), clip_start as u64, clip_end as u64)?;
        let mut window_bases: Vec<Option<u8>> = vec![None; width];
        for (i, &b) in reference.bases(&window_range)?.iter().enumerate() {
            window_bases[(clip_start - window_start) as usize + i] = Some(b);
        }

        let channels = self.num_channels();
        let height: usize = samples.iter().map(|s| s.pileup_height()).sum();
        let row_size = width * channels;

        let mut images = vec![];
        for subset in Self::alt_subsets(variant.alternate_bases()).into_iter() {
            let mut payload = vec![0u8; height * row_size];
            let mut row_offset = 0;
            for sample in samples.iter() {
                let block_rows = sample.pileup_height();
                let block = &mut payload[row_offset * row_size..(row_offset + block_rows) * row_size];
                self.fill_reference_row(&mut block[..row_size], &window_bases);

                let reads = sample.reads().iter().filter(|r| r.overlaps(&window_range));
                for (row, read) in (1..block_rows).zip(reads) {
                    let supports_alt = match haplotypes {
                        Some(h) if sample.role() == called_role => h.best_alt_for_read(read.name())
                            .map(|alt| subset.iter().any(|a| a == alt))
                            .unwrap_or(false),
                        _ => candidate.read_supports_any(read.name(), &subset)
                    };
                    let haplotype_scores = match haplotypes {
                        Some(h) => [
                            haplotype_score(h, &subset[0], read.name()),
                            haplotype_score(h, &subset[subset.len() - 1], read.name())
                        ],
                        None => [0, 0]
                    };
                    self.fill_read_row(
                        &mut block[row * row_size..(row + 1) * row_size], read, window_start,
                        &window_bases, supports_alt, haplotype_scores
                    );
                }
                row_offset += block_rows;
            }

            images.push(EncodedPileup {
                alt_alleles: subset,
                payload,
                shape: vec![height, width, channels],
                format: RAW_TENSOR_FORMAT.to_string()
            });
        }
        Ok(Some(images))
    }

    fn width(&self) -> usize {
        self.config.width
    }
}

/// Pixel value for a base
fn base_value(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => 250,
        b'G' => 180,
        b'T' => 100,
        b'C' => 30,
        _ => 0
    }
}

/// Linear scale of a capped value onto [0, 254]
fn scale(value: u8, cap: u8) -> u8 {
    (value.min(cap) as u32 * MAX_PIXEL as u32 / cap as u32) as u8
}

/// Higher is closer to the haplotype, 0 when the read was not aligned
fn haplotype_score(haplotypes: &HaplotypeAlignments, alt: &str, read_name: &str) -> u8 {
    haplotypes.read_alignments(alt)
        .and_then(|alignments| alignments.iter().find(|a| a.read_name() == read_name))
        .and_then(|a| a.edit_distance())
        .map(|ed| {
            let penalty = ed.min(MAX_SCORED_EDITS) * (MAX_PIXEL as usize / MAX_SCORED_EDITS);
            (MAX_PIXEL as usize - penalty) as u8
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::{test_candidate, test_read, FakeReadSource, FakeRealigner, InMemoryReference};
    use crate::data_types::sample::SampleRole;
    use crate::realigner::align_to_all_haplotypes;
    use rstest::rstest;

    const REFERENCE: &[u8] = b"ACGTACGTACGTACGTACGTACGTACGTACGTACGTACGT";

    fn sample(role: SampleRole, name: &str, height: usize, reads: Vec<AlignedRead>) -> Sample {
        let mut sample = Sample::new(role, name, Box::new(FakeReadSource::new(vec![])), vec![], height);
        sample.replace_reads(Range::new("chr1", 0, 40).unwrap(), reads);
        sample
    }

    fn pixel(image: &EncodedPileup, row: usize, col: usize) -> &[u8] {
        let channels = image.shape[2];
        let offset = (row * image.shape[1] + col) * channels;
        &image.payload[offset..offset + channels]
    }

    #[rstest]
    #[case(9, false)]
    #[case(10, true)]
    #[case(100, true)]
    #[case(101, false)]
    fn test_height_bounds(#[case] height: usize, #[case] valid: bool) {
        let result = check_pileup_height(height);
        assert_eq!(result.is_ok(), valid);
        if let Err(e) = result {
            assert_eq!(e.to_string(), "Pileup image heights must be between 10 and 100.");
        }
    }

    #[test]
    fn test_even_width() {
        let config = PileupConfigBuilder::default().width(10).build().unwrap();
        assert!(PileupEncoder::new(config).is_err());
    }

    #[test]
    fn test_alt_subsets() {
        let alts: Vec<String> = vec!["A".to_string(), "G".to_string(), "T".to_string()];
        let subsets = PileupEncoder::alt_subsets(&alts);
        assert_eq!(subsets.len(), 6);
        assert_eq!(subsets[3], vec!["A".to_string(), "G".to_string()]);
        assert_eq!(PileupEncoder::alt_subsets(&alts[..1]).len(), 1);
    }

    #[test]
    fn test_stacked_image() {
        let reference = InMemoryReference::new(&[("chr1", REFERENCE)]);
        let config = PileupConfigBuilder::default().width(11).build().unwrap();
        let encoder = PileupEncoder::new(config).unwrap();

        // position 20 is an A
        let candidate = test_candidate("chr1", 20, "A", &["T"]);
        let mut alt_bases = REFERENCE[10..30].to_vec();
        alt_bases[10] = b'T';
        let child = sample(SampleRole::Child, "child", 10, vec![test_read("c1", "chr1", 10, &alt_bases)]);
        let parent = sample(SampleRole::Parent1, "mom", 10, vec![test_read("m1", "chr1", 10, &REFERENCE[10..30])]);

        let images = encoder.encode(&candidate, SampleRole::Child, &[&parent, &child], None, &reference).unwrap().unwrap();
        assert_eq!(images.len(), 1);
        let image = &images[0];
        assert_eq!(image.shape, vec![20, 11, BASE_CHANNELS]);
        assert_eq!(image.payload.len(), 20 * 11 * BASE_CHANNELS);
        assert_eq!(image.format, "raw");

        // parent block first: reference row then the parent read, center column is the variant
        assert_eq!(pixel(image, 0, 5)[0], base_value(b'A'));
        assert_eq!(pixel(image, 1, 5)[0], base_value(b'A'));
        assert_eq!(pixel(image, 1, 5)[5], 0);
        // unused rows stay empty
        assert!(pixel(image, 2, 5).iter().all(|&v| v == 0));
        // child block starts at row 10
        assert_eq!(pixel(image, 11, 5)[0], base_value(b'T'));
        assert_eq!(pixel(image, 11, 5)[5], MAX_PIXEL);
    }

    #[test]
    fn test_no_coverage() {
        let reference = InMemoryReference::new(&[("chr1", REFERENCE)]);
        let encoder = PileupEncoder::new(PileupConfigBuilder::default().width(11).build().unwrap()).unwrap();
        let candidate = test_candidate("chr1", 20, "A", &["T"]);
        let child = sample(SampleRole::Child, "child", 10, vec![test_read("c1", "chr1", 0, &REFERENCE[0..15])]);
        assert!(encoder.encode(&candidate, SampleRole::Child, &[&child], None, &reference).unwrap().is_none());
    }

    #[test]
    fn test_alt_aligned_channels() {
        let reference = InMemoryReference::new(&[("chr1", REFERENCE)]);
        let config = PileupConfigBuilder::default().width(11).alt_aligned_pileup(true).build().unwrap();
        let encoder = PileupEncoder::new(config).unwrap();
        let candidate = test_candidate("chr1", 20, "A", &["T"]);
        let child = sample(SampleRole::Child, "child", 10, vec![test_read("c1", "chr1", 0, &REFERENCE[0..40])]);
        let haplotypes = align_to_all_haplotypes(
            candidate.variant(), child.reads(), &reference, &FakeRealigner::default(), 31
        ).unwrap();

        let images = encoder.encode(&candidate, SampleRole::Child, &[&child], Some(&haplotypes), &reference).unwrap().unwrap();
        let image = &images[0];
        assert_eq!(image.shape, vec![10, 11, ALT_ALIGNED_CHANNELS]);
        // the fake realigner reports a perfect alignment
        assert_eq!(pixel(image, 1, 5)[6], MAX_PIXEL);
        assert_eq!(pixel(image, 1, 5)[4], MAX_PIXEL);
        // reference row has no haplotype signal
        assert_eq!(pixel(image, 0, 5)[6], 0);
    }

    #[test]
    fn test_called_sample_by_role() {
        let reference = InMemoryReference::new(&[("chr1", REFERENCE)]);
        let encoder = PileupEncoder::new(PileupConfigBuilder::default().width(11).build().unwrap()).unwrap();
        let candidate = test_candidate("chr1", 20, "A", &["T"]);
        let mut alt_bases = REFERENCE[10..30].to_vec();
        alt_bases[10] = b'T';

        // both BAMs carry the same SM tag, only the child covers the variant
        let parent = sample(SampleRole::Parent1, "HG002", 10, vec![test_read("m1", "chr1", 0, &REFERENCE[0..15])]);
        let child = sample(SampleRole::Child, "HG002", 10, vec![test_read("c1", "chr1", 10, &alt_bases)]);

        let images = encoder.encode(&candidate, SampleRole::Child, &[&parent, &child], None, &reference).unwrap().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(pixel(&images[0], 11, 5)[0], base_value(b'T'));
        assert_eq!(pixel(&images[0], 11, 5)[5], MAX_PIXEL);

        // calling from the parent finds no coverage
        assert!(encoder.encode(&candidate, SampleRole::Parent1, &[&parent, &child], None, &reference).unwrap().is_none());
        assert!(encoder.encode(&candidate, SampleRole::Parent2, &[&parent, &child], None, &reference).is_err());
    }
}
