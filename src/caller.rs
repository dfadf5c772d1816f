
use derive_builder::Builder;
use indexmap::IndexMap;
use log::{debug, trace};
use serde::Serialize;
use std::collections::BTreeMap;
use strum_macros::EnumString;

use crate::collaborators::{CandidateCaller, ReferenceSource};
use crate::data_types::candidate::Candidate;
use crate::data_types::ranges::Range;
use crate::data_types::reads::CigarKind;
use crate::data_types::sample::Sample;
use crate::data_types::variants::{Variant, VariantCall};

/// Which candidates survive after calling
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[derive(strum_macros::Display, EnumString, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum VariantSelection {
    /// Keep everything
    #[default]
    #[strum(ascii_case_insensitive, serialize = "all")]
    #[clap(name = "all")]
    All,
    /// Every ALT has the same length as REF
    #[strum(ascii_case_insensitive, serialize = "snps")]
    #[clap(name = "snps")]
    Snps,
    /// At least one ALT changes the length
    #[strum(ascii_case_insensitive, serialize = "indels")]
    #[clap(name = "indels")]
    Indels,
    /// More than one ALT allele
    #[strum(ascii_case_insensitive, serialize = "multi-allelics")]
    #[clap(name = "multi-allelics")]
    MultiAllelics
}

impl VariantSelection {
    /// Returns true if the variant passes this selection
    pub fn keep(&self, variant: &Variant) -> bool {
        match self {
            VariantSelection::All => true,
            VariantSelection::Snps => variant.is_snp(),
            VariantSelection::Indels => variant.alternate_bases().iter()
                .any(|a| a.len() != variant.reference_bases().len()),
            VariantSelection::MultiAllelics => variant.alternate_bases().len() > 1
        }
    }
}

/// Thresholds for the allele counting caller
#[derive(Builder, Clone, Copy, Debug, Serialize)]
#[builder(default)]
pub struct CallerConfig {
    /// Minimum number of reads for a substitution allele
    pub min_count_snps: usize,
    /// Minimum number of reads for an insertion or deletion allele
    pub min_count_indels: usize,
    /// Minimum fraction of depth for a substitution allele
    pub min_fraction_snps: f64,
    /// Minimum fraction of depth for an insertion or deletion allele
    pub min_fraction_indels: f64,
    /// Bases below this quality are not counted
    pub min_base_quality: u8,
    /// Post-call filter
    pub select_variant_types: VariantSelection
}

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            min_count_snps: 2,
            min_count_indels: 2,
            min_fraction_snps: 0.12,
            min_fraction_indels: 0.06,
            min_base_quality: 10,
            select_variant_types: VariantSelection::All
        }
    }
}

/// An observed allele, anchored at a reference position
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
struct ObservedAllele {
    reference: String,
    alternate: String
}

impl ObservedAllele {
    fn is_indel(&self) -> bool {
        self.reference.len() != self.alternate.len()
    }
}

/// Counts alleles per position over the loaded reads and proposes every allele that clears the thresholds
#[derive(Clone, Debug, Default)]
pub struct AlleleCountCaller {
    config: CallerConfig
}

impl AlleleCountCaller {
    pub fn new(config: CallerConfig) -> Self {
        Self { config }
    }

    /// Tallies depth and allele support for every position in `region`
    fn count_alleles(
        &self, region: &Range, sample: &Sample, region_bases: &[u8], reference: &dyn ReferenceSource
    ) -> anyhow::Result<(Vec<usize>, BTreeMap<u64, BTreeMap<ObservedAllele, Vec<String>>>)> {
        let mut depth = vec![0; region_bases.len()];
        let mut observed: BTreeMap<u64, BTreeMap<ObservedAllele, Vec<String>>> = Default::default();
        let in_region = |p: u64| region.start() <= p && p < region.end();
        let ref_base = |p: u64| region_bases[(p - region.start()) as usize];

        for read in sample.reads().iter() {
            if read.contig() != region.contig() {
                continue;
            }
            let mut read_alleles: Vec<(u64, ObservedAllele)> = vec![];
            for (op, ref_pos, read_pos) in read.walk() {
                match op.kind {
                    k if k.is_aligned() => {
                        for i in 0..op.len as u64 {
                            let p = ref_pos + i;
                            if !in_region(p) {
                                continue;
                            }
                            let offset = read_pos + i as usize;
                            if read.qualities()[offset] < self.config.min_base_quality {
                                continue;
                            }
                            depth[(p - region.start()) as usize] += 1;

                            let base = read.bases()[offset].to_ascii_uppercase();
                            let rb = ref_base(p);
                            if base != rb && is_canonical(base) && is_canonical(rb) {
                                read_alleles.push((p, ObservedAllele {
                                    reference: (rb as char).to_string(),
                                    alternate: (base as char).to_string()
                                }));
                            }
                        }
                    },
                    CigarKind::Insertion => {
                        // anchored on the preceding reference base, which must be aligned
                        if ref_pos == read.start() || !in_region(ref_pos - 1) {
                            continue;
                        }
                        let anchor = ref_base(ref_pos - 1);
                        let inserted = &read.bases()[read_pos..read_pos + op.len as usize];
                        if !is_canonical(anchor) || !inserted.iter().all(|&b| is_canonical(b.to_ascii_uppercase())) {
                            continue;
                        }
                        let mut alternate = (anchor as char).to_string();
                        alternate.push_str(&String::from_utf8_lossy(inserted).to_ascii_uppercase());
                        read_alleles.push((ref_pos - 1, ObservedAllele {
                            reference: (anchor as char).to_string(),
                            alternate
                        }));
                    },
                    CigarKind::Deletion => {
                        if ref_pos == read.start() || !in_region(ref_pos - 1) {
                            continue;
                        }
                        let deleted = Range::new(region.contig(), ref_pos - 1, ref_pos + op.len as u64)?;
                        let reference_bases = reference.bases(&deleted)?;
                        if !reference_bases.iter().all(|&b| is_canonical(b)) {
                            continue;
                        }
                        read_alleles.push((ref_pos - 1, ObservedAllele {
                            reference: String::from_utf8_lossy(&reference_bases).to_string(),
                            alternate: (reference_bases[0] as char).to_string()
                        }));
                    },
                    _ => {}
                }
            }

            // each read supports an allele once
            read_alleles.sort();
            read_alleles.dedup();
            for (p, allele) in read_alleles.into_iter() {
                observed.entry(p).or_default()
                    .entry(allele).or_default()
                    .push(read.name().to_string());
            }
        }
        Ok((depth, observed))
    }

    /// Returns true if the allele clears the count and fraction thresholds
    fn passes(&self, allele: &ObservedAllele, count: usize, depth: usize) -> bool {
        if depth == 0 {
            return false;
        }
        let fraction = count as f64 / depth as f64;
        if allele.is_indel() {
            count >= self.config.min_count_indels && fraction >= self.config.min_fraction_indels
        } else {
            count >= self.config.min_count_snps && fraction >= self.config.min_fraction_snps
        }
    }
}

impl CandidateCaller for AlleleCountCaller {
    fn call(&self, region: &Range, sample: &Sample, reference: &dyn ReferenceSource) -> anyhow::Result<Vec<Candidate>> {
        let region_bases = reference.bases(region)?.to_ascii_uppercase();
        let (depth, observed) = self.count_alleles(region, sample, &region_bases, reference)?;

        let mut candidates = vec![];
        for (position, alleles) in observed.into_iter() {
            let site_depth = depth[(position - region.start()) as usize];
            let passing: Vec<(ObservedAllele, Vec<String>)> = alleles.into_iter()
                .filter(|(allele, reads)| self.passes(allele, reads.len(), site_depth))
                .collect();
            if passing.is_empty() {
                continue;
            }

            // merge everything at this position onto the longest REF
            let merged_ref = passing.iter()
                .map(|(a, _r)| a.reference.as_str())
                .max_by_key(|r| r.len())
                .unwrap_or_default()
                .to_string();
            let mut support: IndexMap<String, Vec<String>> = IndexMap::new();
            for (allele, reads) in passing.into_iter() {
                let mut alternate = allele.alternate;
                alternate.push_str(&merged_ref[allele.reference.len()..]);
                if alternate == merged_ref {
                    continue;
                }
                support.entry(alternate).or_default().extend(reads);
            }
            if support.is_empty() {
                continue;
            }

            let variant = Variant::new(
                region.contig(), position, merged_ref, support.keys().cloned().collect(),
                VariantCall::no_call(sample.name())
            )?;
            if !self.config.select_variant_types.keep(&variant) {
                trace!("Skipping candidate at {} due to variant selection", variant.range());
                continue;
            }
            candidates.push(Candidate::new(variant, support));
        }
        debug!("{}: {} candidates in {region}", sample.role(), candidates.len());
        Ok(candidates)
    }
}

fn is_canonical(base: u8) -> bool {
    matches!(base, b'A' | b'C' | b'G' | b'T')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::{test_read, FakeReadSource, InMemoryReference};
    use crate::data_types::reads::{parse_cigar, AlignedRead};
    use crate::data_types::sample::SampleRole;
    use std::str::FromStr;

    const REFERENCE: &[u8] = b"ACGTACGTACGTACGTACGTACGTACGTACGTACGTACGT";

    fn sample_with(reads: Vec<AlignedRead>) -> Sample {
        let mut sample = Sample::new(SampleRole::Child, "child", Box::new(FakeReadSource::new(vec![])), vec![0], 100);
        sample.replace_reads(Range::new("chr1", 0, 40).unwrap(), reads);
        sample
    }

    fn cigar_read(name: &str, start: u64, cigar: &str, bases: &[u8]) -> AlignedRead {
        AlignedRead::new(name, "chr1", start, parse_cigar(cigar).unwrap(), bases.to_vec(), vec![30; bases.len()], 60).unwrap()
    }

    fn with_snv(name: &str) -> AlignedRead {
        let mut bases = REFERENCE[0..30].to_vec();
        // position 10 is G
        bases[10] = b'T';
        test_read(name, "chr1", 0, &bases)
    }

    #[test]
    fn test_snv_candidates() {
        let reference = InMemoryReference::new(&[("chr1", REFERENCE)]);
        let reads = vec![
            with_snv("alt1"),
            with_snv("alt2"),
            test_read("ref1", "chr1", 0, &REFERENCE[0..30])
        ];
        let sample = sample_with(reads);
        let caller = AlleleCountCaller::default();
        let region = Range::new("chr1", 0, 40).unwrap();
        let candidates = caller.call(&region, &sample, &reference).unwrap();
        assert_eq!(candidates.len(), 1);
        let variant = candidates[0].variant();
        assert_eq!(variant.start(), 10);
        assert_eq!(variant.reference_bases(), "G");
        assert_eq!(variant.alternate_bases(), &["T".to_string()]);
        assert_eq!(variant.call().genotype(), [-1, -1]);
        assert_eq!(candidates[0].supporting_reads("T"), &["alt1".to_string(), "alt2".to_string()]);
    }

    #[test]
    fn test_min_count() {
        let reference = InMemoryReference::new(&[("chr1", REFERENCE)]);
        let sample = sample_with(vec![with_snv("alt1"), test_read("ref1", "chr1", 0, &REFERENCE[0..30])]);
        let caller = AlleleCountCaller::default();
        let region = Range::new("chr1", 0, 40).unwrap();
        assert!(caller.call(&region, &sample, &reference).unwrap().is_empty());

        let config = CallerConfigBuilder::default().min_count_snps(1).build().unwrap();
        let caller = AlleleCountCaller::new(config);
        assert_eq!(caller.call(&region, &sample, &reference).unwrap().len(), 1);
    }

    #[test]
    fn test_merged_multiallelic() {
        let reference = InMemoryReference::new(&[("chr1", REFERENCE)]);
        // deletion of positions 11-12 anchored at 10, and an insertion of TT after 10
        let mut del_bases = REFERENCE[0..11].to_vec();
        del_bases.extend_from_slice(&REFERENCE[13..30]);
        let mut ins_bases = REFERENCE[0..11].to_vec();
        ins_bases.extend_from_slice(b"TT");
        ins_bases.extend_from_slice(&REFERENCE[11..30]);
        let reads = vec![
            cigar_read("del1", 0, "11M2D17M", &del_bases),
            cigar_read("del2", 0, "11M2D17M", &del_bases),
            cigar_read("ins1", 0, "11M2I19M", &ins_bases),
            cigar_read("ins2", 0, "11M2I19M", &ins_bases)
        ];
        let sample = sample_with(reads);
        let caller = AlleleCountCaller::default();
        let region = Range::new("chr1", 0, 40).unwrap();
        let candidates = caller.call(&region, &sample, &reference).unwrap();
        assert_eq!(candidates.len(), 1);
        let variant = candidates[0].variant();
        assert_eq!(variant.start(), 10);
        assert_eq!(variant.reference_bases(), "GTA");
        // alleles are ordered by their anchored REF then ALT, so the insertion ("G" -> "GTT") sorts first
        assert_eq!(variant.alternate_bases(), &["GTTTA".to_string(), "G".to_string()]);
        assert_eq!(candidates[0].supporting_reads("G"), &["del1".to_string(), "del2".to_string()]);

        let selection = VariantSelection::from_str("snps").unwrap();
        let config = CallerConfigBuilder::default().select_variant_types(selection).build().unwrap();
        assert!(AlleleCountCaller::new(config).call(&region, &sample, &reference).unwrap().is_empty());
        let config = CallerConfigBuilder::default().select_variant_types(VariantSelection::MultiAllelics).build().unwrap();
        assert_eq!(AlleleCountCaller::new(config).call(&region, &sample, &reference).unwrap().len(), 1);
    }

    #[test]
    fn test_low_quality_bases_ignored() {
        let reference = InMemoryReference::new(&[("chr1", REFERENCE)]);
        let mut bases = REFERENCE[0..30].to_vec();
        bases[10] = b'T';
        let mut quals = vec![30; 30];
        quals[10] = 2;
        let read = |name: &str| AlignedRead::new(name, "chr1", 0, parse_cigar("30M").unwrap(), bases.clone(), quals.clone(), 60).unwrap();
        let sample = sample_with(vec![read("a"), read("b")]);
        let region = Range::new("chr1", 0, 40).unwrap();
        assert!(AlleleCountCaller::default().call(&region, &sample, &reference).unwrap().is_empty());
    }
}
