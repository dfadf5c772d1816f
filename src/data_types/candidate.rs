
use indexmap::IndexMap;
use serde::Serialize;

use crate::data_types::variants::Variant;

/// A putative variant site with the reads that support each alternate allele
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candidate {
    /// The proposed variant, with a no-call for the sample
    variant: Variant,
    /// ALT allele -> names of the supporting reads
    allele_support: IndexMap<String, Vec<String>>
}

impl Candidate {
    /// Constructor
    pub fn new(variant: Variant, allele_support: IndexMap<String, Vec<String>>) -> Self {
        Self { variant, allele_support }
    }

    /// Names of the reads supporting an ALT allele, empty if the allele is unknown
    pub fn supporting_reads(&self, alt: &str) -> &[String] {
        self.allele_support.get(alt)
            .map(|v| v.as_slice())
            .unwrap_or_default()
    }

    /// Returns true if the read supports any of the given ALT alleles
    pub fn read_supports_any(&self, read_name: &str, alts: &[String]) -> bool {
        alts.iter().any(|a| self.supporting_reads(a).iter().any(|r| r == read_name))
    }

    // getters
    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn allele_support(&self) -> &IndexMap<String, Vec<String>> {
        &self.allele_support
    }
}
