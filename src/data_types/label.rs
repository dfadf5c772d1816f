
use serde::Serialize;

use crate::data_types::variants::Variant;

/// A truth-derived genotype for one candidate
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Label {
    /// The candidate variant this label belongs to
    variant: Variant,
    /// Allele indices into the candidate's alleles, 0 = REF
    genotype: [i32; 2],
    /// True if the candidate lies in a confident truth region
    is_confident: bool
}

impl Label {
    pub fn new(variant: Variant, genotype: [i32; 2], is_confident: bool) -> Self {
        Self { variant, genotype, is_confident }
    }

    /// Returns true if either allele is non-reference
    pub fn is_variant(&self) -> bool {
        self.genotype.iter().any(|&a| a > 0)
    }

    // getters
    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn genotype(&self) -> [i32; 2] {
        self.genotype
    }

    pub fn is_confident(&self) -> bool {
        self.is_confident
    }
}
