
use derive_builder::Builder;
use log::trace;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::collaborators::{ReferenceConfidenceEmitter, ReferenceSource};
use crate::data_types::candidate::Candidate;
use crate::data_types::ranges::Range;
use crate::data_types::sample::Sample;
use crate::data_types::variants::{Variant, VariantCall, NO_CALL};

/// Assumed per-base sequencing error rate for the genotype likelihoods
const BASE_ERROR_RATE: f64 = 1e-3;
/// Genotype qualities are capped here
pub const MAX_GENOTYPE_QUALITY: i32 = 99;

/// Failures of the gVCF contiguity check
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ContiguityError {
    #[error("no gVCF records were produced for {region}")]
    Empty { region: String },
    #[error("gVCF records for {region} start at {found}, expected {expected}")]
    StartMismatch { region: String, expected: u64, found: u64 },
    #[error("gVCF records for {region} end at {found}, expected {expected}")]
    EndMismatch { region: String, expected: u64, found: u64 },
    #[error("gVCF record at {found} in {region} does not follow the previous record, expected a start at {expected}")]
    Gap { region: String, expected: u64, found: u64 }
}

/// Verifies that `records` form a contiguous cover of `region`.
/// Records are visited in (start, end) order; a record must start at the previous end when the previous one is a reference block,
/// or one base after the previous start otherwise. Records that repeat the previous [start, end) are skipped.
/// # Errors
/// * if the records are empty, do not start at the region start, do not end at the region end, or leave a gap
pub fn check_contiguity(records: &[Variant], region: &Range) -> Result<(), ContiguityError> {
    let mut sorted: Vec<&Variant> = records.iter().collect();
    sorted.sort_by_key(|v| (v.start(), v.end()));

    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return Err(ContiguityError::Empty { region: region.to_string() });
    };
    if first.start() != region.start() {
        return Err(ContiguityError::StartMismatch { region: region.to_string(), expected: region.start(), found: first.start() });
    }
    if last.end() != region.end() {
        return Err(ContiguityError::EndMismatch { region: region.to_string(), expected: region.end(), found: last.end() });
    }

    for pair in sorted.windows(2) {
        let (v1, v2) = (pair[0], pair[1]);
        if v1.start() == v2.start() && v1.end() == v2.end() {
            continue;
        }
        let expected = if v1.is_reference_block() { v1.end() } else { v1.start() + 1 };
        if v2.start() != expected {
            return Err(ContiguityError::Gap { region: region.to_string(), expected, found: v2.start() });
        }
    }
    Ok(())
}

/// gVCF block settings
#[derive(Builder, Clone, Copy, Debug, Serialize)]
#[builder(default)]
pub struct GvcfConfig {
    /// Genotype qualities are rounded down to a multiple of this before blocks are merged
    pub gq_binsize: i32,
    /// Bases below this quality are ignored
    pub min_base_quality: u8
}

impl Default for GvcfConfig {
    fn default() -> Self {
        Self {
            gq_binsize: 5,
            min_base_quality: 10
        }
    }
}

/// Reference-confidence state at one position
#[derive(Clone, Debug, PartialEq)]
struct SiteConfidence {
    genotype: [i32; 2],
    binned_gq: i32,
    likelihoods: Vec<f64>
}

/// Produces `<*>` reference blocks from per-base reference support
#[derive(Clone, Debug, Default)]
pub struct GvcfBlockEmitter {
    config: GvcfConfig
}

impl GvcfBlockEmitter {
    pub fn new(config: GvcfConfig) -> Self {
        Self { config }
    }

    /// Computes the normalized log10 likelihoods for hom-ref, het, and hom-alt, plus the hom-ref genotype quality
    fn likelihoods(n_ref: usize, n_other: usize) -> (Vec<f64>, i32) {
        let (n_ref, n_other) = (n_ref as f64, n_other as f64);
        let correct = (1.0 - BASE_ERROR_RATE).log10();
        let error = BASE_ERROR_RATE.log10();
        let raw = [
            n_ref * correct + n_other * error,
            (n_ref + n_other) * 0.5f64.log10(),
            n_ref * error + n_other * correct
        ];
        let max = raw.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let total = max + raw.iter().map(|l| 10f64.powf(l - max)).sum::<f64>().log10();
        let normalized: Vec<f64> = raw.iter().map(|l| l - total).collect();

        let p_ref = 10f64.powf(normalized[0]);
        let gq = if p_ref >= 1.0 {
            MAX_GENOTYPE_QUALITY
        } else {
            (-10.0 * (1.0 - p_ref).log10()).round() as i32
        };
        (normalized, gq.clamp(0, MAX_GENOTYPE_QUALITY))
    }

    fn site_confidence(&self, n_ref: usize, n_other: usize) -> SiteConfidence {
        if n_ref + n_other == 0 {
            return SiteConfidence {
                genotype: [NO_CALL, NO_CALL],
                binned_gq: 0,
                likelihoods: vec![]
            };
        }
        let (likelihoods, gq) = Self::likelihoods(n_ref, n_other);
        let binsize = self.config.gq_binsize.max(1);
        SiteConfidence {
            genotype: [0, 0],
            binned_gq: (gq / binsize) * binsize,
            likelihoods
        }
    }
}

impl ReferenceConfidenceEmitter for GvcfBlockEmitter {
    fn emit(
        &self, region: &Range, sample: &Sample, candidates: &[Candidate], reference: &dyn ReferenceSource
    ) -> anyhow::Result<Vec<Variant>> {
        let bases = reference.bases(region)?;
        let mut n_ref = vec![0usize; bases.len()];
        let mut n_other = vec![0usize; bases.len()];
        for read in sample.reads().iter().filter(|r| r.overlaps(region)) {
            let start = read.start().max(region.start());
            let end = read.end().min(region.end());
            for position in start..end {
                let offset = (position - region.start()) as usize;
                match read.base_at(position) {
                    Some((base, quality)) if quality >= self.config.min_base_quality => {
                        if base.eq_ignore_ascii_case(&bases[offset]) {
                            n_ref[offset] += 1;
                        } else {
                            n_other[offset] += 1;
                        }
                    },
                    Some(_) => {},
                    // deleted in this read
                    None => n_other[offset] += 1
                }
            }
        }

        // blocks never span a candidate start
        let breaks: BTreeSet<u64> = candidates.iter()
            .map(|c| c.variant().start())
            .filter(|&p| p > region.start() && p < region.end())
            .collect();

        let mut blocks = vec![];
        let mut block_start = region.start();
        let mut current = self.site_confidence(n_ref[0], n_other[0]);
        for offset in 1..=bases.len() {
            let position = region.start() + offset as u64;
            let next = (offset < bases.len()).then(|| self.site_confidence(n_ref[offset], n_other[offset]));
            let same_block = match &next {
                Some(n) => n.genotype == current.genotype && n.binned_gq == current.binned_gq && !breaks.contains(&position),
                None => false
            };
            if same_block {
                continue;
            }

            let mut call = VariantCall::new(sample.name(), current.genotype);
            if current.genotype[0] != NO_CALL {
                call = call.with_quality(current.binned_gq, current.likelihoods.clone());
            }
            let ref_base = bases[(block_start - region.start()) as usize];
            blocks.push(Variant::new_reference_block(region.contig(), block_start, position, ref_base, call)?);

            if let Some(n) = next {
                block_start = position;
                current = n;
            }
        }

        trace!("{}: {} gVCF blocks in {region}", sample.role(), blocks.len());
        check_contiguity(&blocks, region)?;
        Ok(blocks)
    }
}
