
use log::{debug, trace};
use std::sync::Arc;

use crate::collaborators::{TruthVariantSource, VariantLabeler};
use crate::data_types::candidate::Candidate;
use crate::data_types::feature_record::FeatureRecord;
use crate::data_types::label::Label;
use crate::data_types::ranges::Range;
use crate::data_types::variants::Variant;
use crate::parsing::confident_regions::ConfidentRegions;

/// Raised when a label outside the confident regions would be attached to a record
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Cannot add a non-confident label to an example")]
pub struct UnconfidentLabelError;

/// Copies the label genotype onto a feature record.
/// The label scalar is the number of genotype alleles found in the record's considered ALT subset.
/// Payload, shape, format, and the ALT subset are left as they are.
/// # Errors
/// * `UnconfidentLabelError` if the label is not confident
pub fn attach_label(mut record: FeatureRecord, label: &Label) -> Result<FeatureRecord, UnconfidentLabelError> {
    if !label.is_confident() {
        return Err(UnconfidentLabelError);
    }
    let value = label_value(label.genotype(), record.alt_allele_indices());
    record.set_label(label.genotype(), value);
    Ok(record)
}

/// Counts the genotype alleles that are in the considered ALT subset
/// # Arguments
/// * `genotype` - allele indices, 0 = REF
/// * `alt_allele_indices` - 0-based indices into the ALT list
pub fn label_value(genotype: [i32; 2], alt_allele_indices: &[usize]) -> u8 {
    genotype.iter()
        .filter(|&&allele| allele > 0 && alt_allele_indices.contains(&(allele as usize - 1)))
        .count() as u8
}

/// Labels candidates by matching truth variants on position and REF allele
pub struct PositionalLabeler {
    /// Truth set access
    truth: Box<dyn TruthVariantSource>,
    /// Regions where the truth set is trusted
    confident: Arc<ConfidentRegions>
}

impl PositionalLabeler {
    pub fn new(truth: Box<dyn TruthVariantSource>, confident: Arc<ConfidentRegions>) -> Self {
        Self { truth, confident }
    }

    /// Genotype of `candidate` implied by the truth variant, or None if they describe different sites
    fn match_truth(candidate: &Variant, truth: &Variant) -> Option<[i32; 2]> {
        if candidate.start() != truth.start() {
            return None;
        }

        // REF alleles may be represented with different trailing context, pad the shorter one
        let cand_ref = candidate.reference_bases();
        let truth_ref = truth.reference_bases();
        let (cand_pad, truth_pad) = if cand_ref.len() >= truth_ref.len() {
            if !cand_ref.starts_with(truth_ref) {
                return None;
            }
            ("", &cand_ref[truth_ref.len()..])
        } else {
            if !truth_ref.starts_with(cand_ref) {
                return None;
            }
            (&truth_ref[cand_ref.len()..], "")
        };

        let candidate_alleles: Vec<String> = candidate.alternate_bases().iter()
            .map(|a| format!("{a}{cand_pad}"))
            .collect();
        let mut genotype = [0; 2];
        for (gt, &allele) in genotype.iter_mut().zip(truth.call().genotype().iter()) {
            if allele <= 0 {
                continue;
            }
            let truth_allele = match truth.alternate_bases().get(allele as usize - 1) {
                Some(a) => format!("{a}{truth_pad}"),
                None => continue
            };
            // unmatched truth alleles stay as REF
            if let Some(index) = candidate_alleles.iter().position(|a| *a == truth_allele) {
                *gt = index as i32 + 1;
            }
        }
        Some(genotype)
    }
}

impl VariantLabeler for PositionalLabeler {
    fn label_candidates(&mut self, candidates: &[Candidate], region: &Range) -> anyhow::Result<Vec<Label>> {
        let truth_variants = self.truth.query(region)?;
        debug!("Labeling {} candidates against {} truth variants in {region}", candidates.len(), truth_variants.len());

        let mut ret = Vec::with_capacity(candidates.len());
        for candidate in candidates.iter() {
            let variant = candidate.variant();
            let genotype = truth_variants.iter()
                .find_map(|t| Self::match_truth(variant, t))
                .unwrap_or([0, 0]);
            let confident = self.confident.envelops(&variant.range());
            trace!("\t{}:{} {:?} -> {genotype:?} (confident={confident})", variant.contig(), variant.start(), variant.alternate_bases());
            ret.push(Label::new(variant.clone(), genotype, confident));
        }
        Ok(ret)
    }
}
