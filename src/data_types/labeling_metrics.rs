
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

use crate::data_types::label::Label;

/// Counters describing candidate generation and labeling, summed across intervals
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct LabelingMetrics {
    /// Number of candidates generated
    pub n_candidate_variant_sites: u64,
    /// Candidates whose label was confident
    pub n_confident_candidates: u64,
    /// Candidates skipped because the label was not confident
    pub n_non_confident_candidates: u64,
    /// Confident labels with at least one non-reference allele
    pub n_non_reference_labels: u64,
    /// Feature records emitted
    pub n_feature_records: u64
}

impl AddAssign for LabelingMetrics {
    fn add_assign(&mut self, rhs: Self) {
        self.n_candidate_variant_sites += rhs.n_candidate_variant_sites;
        self.n_confident_candidates += rhs.n_confident_candidates;
        self.n_non_confident_candidates += rhs.n_non_confident_candidates;
        self.n_non_reference_labels += rhs.n_non_reference_labels;
        self.n_feature_records += rhs.n_feature_records;
    }
}

impl LabelingMetrics {
    /// Tallies the confidence counters from a set of labels
    pub fn add_labels(&mut self, labels: &[Label]) {
        for label in labels.iter() {
            if label.is_confident() {
                self.n_confident_candidates += 1;
                if label.is_variant() {
                    self.n_non_reference_labels += 1;
                }
            } else {
                self.n_non_confident_candidates += 1;
            }
        }
    }

    /// Fraction of candidates that were labeled as non-reference, if any were labeled
    pub fn non_reference_fraction(&self) -> Option<f64> {
        if self.n_confident_candidates > 0 {
            Some(self.n_non_reference_labels as f64 / self.n_confident_candidates as f64)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;
    use crate::data_types::variants::{Variant, VariantCall};

    #[test]
    fn test_add_labels() {
        let variant = Variant::new("1", 0, "A", vec!["C".to_string()], VariantCall::no_call("s")).unwrap();
        let labels = vec![
            Label::new(variant.clone(), [0, 1], true),
            Label::new(variant.clone(), [0, 0], true),
            Label::new(variant.clone(), [1, 1], false)
        ];
        let mut metrics = LabelingMetrics::default();
        metrics.add_labels(&labels);
        assert_eq!(metrics.n_confident_candidates, 2);
        assert_eq!(metrics.n_non_confident_candidates, 1);
        assert_eq!(metrics.n_non_reference_labels, 1);
        assert_approx_eq!(metrics.non_reference_fraction().unwrap(), 0.5);

        let mut total = LabelingMetrics::default();
        total += metrics;
        total += metrics;
        assert_eq!(total.n_confident_candidates, 4);
        assert_eq!(LabelingMetrics::default().non_reference_fraction(), None);
    }
}
