
use serde::{Deserialize, Serialize};

use crate::data_types::ranges::Range;

/// Placeholder alternate allele used by reference blocks
pub const NO_ALT_ALLELE: &str = "<*>";

/// Genotype allele index used for a no-call
pub const NO_CALL: i32 = -1;

/// Coarse variant classes, mostly used for candidate selection
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum VariantType {
    /// REF and ALT are both length = 1
    Snv,
    /// REF length = 1, ALT length > 1
    Insertion,
    /// REF length > 1, ALT length = 1
    Deletion,
    /// REF and ALT lengths > 1
    Indel,
    /// More than one ALT allele
    MultiAllelic,
    /// Only ALT is the `<*>` placeholder
    ReferenceBlock
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum VariantError {
    #[error("reference bases must not be empty")]
    EmptyReference,
    #[error("at least one alternate allele is required")]
    MissingAlternate,
    #[error("alternate allele {index} is empty (length = 0)")]
    EmptyAlternate { index: usize },
    #[error("reference block must have end > start")]
    EmptyBlock,
}

/// The single per-sample call attached to a variant
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct VariantCall {
    /// Name of the sample
    sample_name: String,
    /// Allele indices, 0 = REF, -1 = no-call
    genotype: [i32; 2],
    /// Phred-scaled genotype quality, if known
    genotype_quality: Option<i32>,
    /// log10 genotype likelihoods in VCF order, may be empty
    genotype_likelihood: Vec<f64>
}

impl VariantCall {
    /// Creates a call with a genotype and no quality information
    pub fn new(sample_name: impl Into<String>, genotype: [i32; 2]) -> Self {
        Self {
            sample_name: sample_name.into(),
            genotype,
            genotype_quality: None,
            genotype_likelihood: vec![]
        }
    }

    /// Creates a no-call for the sample
    pub fn no_call(sample_name: impl Into<String>) -> Self {
        Self::new(sample_name, [NO_CALL, NO_CALL])
    }

    /// Attaches quality information
    pub fn with_quality(mut self, genotype_quality: i32, genotype_likelihood: Vec<f64>) -> Self {
        self.genotype_quality = Some(genotype_quality);
        self.genotype_likelihood = genotype_likelihood;
        self
    }

    pub fn set_genotype(&mut self, genotype: [i32; 2]) {
        self.genotype = genotype;
    }

    // getters
    pub fn sample_name(&self) -> &str {
        &self.sample_name
    }

    pub fn genotype(&self) -> [i32; 2] {
        self.genotype
    }

    pub fn genotype_quality(&self) -> Option<i32> {
        self.genotype_quality
    }

    pub fn genotype_likelihood(&self) -> &[f64] {
        &self.genotype_likelihood
    }
}

/// A variant site on one contig with exactly one call.
/// Coordinates are 0-based and half-open.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Variant {
    /// Contig name
    contig: String,
    /// First reference base of the variant
    start: u64,
    /// One past the last reference base
    end: u64,
    /// REF allele
    reference_bases: String,
    /// ALT alleles, in order
    alternate_bases: Vec<String>,
    /// The call for our sample
    call: VariantCall
}

impl Variant {
    /// Creates a new variant where the end is derived from the reference length.
    /// # Arguments
    /// * `contig` - contig name
    /// * `start` - 0-based position of the first reference base
    /// * `reference_bases` - the REF allele
    /// * `alternate_bases` - the ALT alleles
    /// * `call` - the sample call
    /// # Errors
    /// * if REF is empty, there are no ALTs, or any ALT is empty
    pub fn new(
        contig: impl Into<String>, start: u64, reference_bases: impl Into<String>,
        alternate_bases: Vec<String>, call: VariantCall
    ) -> Result<Self, VariantError> {
        let reference_bases = reference_bases.into();
        if reference_bases.is_empty() {
            return Err(VariantError::EmptyReference);
        }
        if alternate_bases.is_empty() {
            return Err(VariantError::MissingAlternate);
        }
        if let Some(index) = alternate_bases.iter().position(|a| a.is_empty()) {
            return Err(VariantError::EmptyAlternate { index });
        }

        let end = start + reference_bases.len() as u64;
        Ok(Self {
            contig: contig.into(),
            start,
            end,
            reference_bases,
            alternate_bases,
            call
        })
    }

    /// Creates a reference block covering [start, end) with the `<*>` placeholder ALT.
    /// # Arguments
    /// * `reference_base` - the reference base at `start`
    /// # Errors
    /// * if `end <= start`
    pub fn new_reference_block(
        contig: impl Into<String>, start: u64, end: u64, reference_base: u8, call: VariantCall
    ) -> Result<Self, VariantError> {
        if end <= start {
            return Err(VariantError::EmptyBlock);
        }
        Ok(Self {
            contig: contig.into(),
            start,
            end,
            reference_bases: (reference_base as char).to_string(),
            alternate_bases: vec![NO_ALT_ALLELE.to_string()],
            call
        })
    }

    /// Returns true if the only ALT is the `<*>` placeholder
    pub fn is_reference_block(&self) -> bool {
        self.alternate_bases.len() == 1 && self.alternate_bases[0] == NO_ALT_ALLELE
    }

    /// Classifies the variant
    pub fn variant_type(&self) -> VariantType {
        if self.is_reference_block() {
            return VariantType::ReferenceBlock;
        }
        if self.alternate_bases.len() > 1 {
            return VariantType::MultiAllelic;
        }
        match (self.reference_bases.len(), self.alternate_bases[0].len()) {
            (1, 1) => VariantType::Snv,
            (1, _) => VariantType::Insertion,
            (_, 1) => VariantType::Deletion,
            (_, _) => VariantType::Indel
        }
    }

    /// Returns true if every ALT has the same length as REF
    pub fn is_snp(&self) -> bool {
        !self.is_reference_block() && self.alternate_bases.iter().all(|a| a.len() == self.reference_bases.len())
    }

    /// Returns the 1-based allele index of an ALT, i.e. the value used in a genotype
    pub fn allele_index(&self, alt: &str) -> Option<usize> {
        self.alternate_bases.iter().position(|a| a == alt).map(|i| i + 1)
    }

    /// The reference span of the variant
    pub fn range(&self) -> Range {
        // end > start is guaranteed by the constructors
        Range::new(self.contig.clone(), self.start, self.end)
            .unwrap_or_else(|_| unreachable!("variant with empty span"))
    }

    pub fn call_mut(&mut self) -> &mut VariantCall {
        &mut self.call
    }

    // getters
    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn reference_bases(&self) -> &str {
        &self.reference_bases
    }

    pub fn alternate_bases(&self) -> &[String] {
        &self.alternate_bases
    }

    pub fn call(&self) -> &VariantCall {
        &self.call
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alts(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_variant_types() {
        let call = VariantCall::new("child", [0, 1]);
        let snv = Variant::new("1", 10, "A", alts(&["C"]), call.clone()).unwrap();
        assert_eq!(snv.variant_type(), VariantType::Snv);
        assert_eq!(snv.end(), 11);
        assert!(snv.is_snp());

        let ins = Variant::new("1", 10, "A", alts(&["ACGT"]), call.clone()).unwrap();
        assert_eq!(ins.variant_type(), VariantType::Insertion);

        let del = Variant::new("1", 10, "ACGT", alts(&["A"]), call.clone()).unwrap();
        assert_eq!(del.variant_type(), VariantType::Deletion);
        assert_eq!(del.range(), Range::new("1", 10, 14).unwrap());

        let indel = Variant::new("1", 10, "ACG", alts(&["TT"]), call.clone()).unwrap();
        assert_eq!(indel.variant_type(), VariantType::Indel);

        let multi = Variant::new("1", 10, "AC", alts(&["A", "GC"]), call.clone()).unwrap();
        assert_eq!(multi.variant_type(), VariantType::MultiAllelic);
        assert!(!multi.is_snp());
        assert_eq!(multi.allele_index("GC"), Some(2));
        assert_eq!(multi.allele_index("T"), None);

        let block = Variant::new_reference_block("1", 10, 20, b'A', VariantCall::new("child", [0, 0])).unwrap();
        assert!(block.is_reference_block());
        assert_eq!(block.variant_type(), VariantType::ReferenceBlock);
        assert_eq!(block.alternate_bases(), &[NO_ALT_ALLELE.to_string()]);
    }

    #[test]
    fn test_variant_errors() {
        let call = VariantCall::new("child", [0, 1]);
        assert_eq!(Variant::new("1", 0, "", alts(&["A"]), call.clone()), Err(VariantError::EmptyReference));
        assert_eq!(Variant::new("1", 0, "A", vec![], call.clone()), Err(VariantError::MissingAlternate));
        assert_eq!(Variant::new("1", 0, "A", alts(&["C", ""]), call.clone()), Err(VariantError::EmptyAlternate { index: 1 }));
        assert_eq!(Variant::new_reference_block("1", 5, 5, b'A', call), Err(VariantError::EmptyBlock));
    }

    #[test]
    fn test_call_updates() {
        let mut variant = Variant::new("1", 0, "A", alts(&["C"]), VariantCall::no_call("child")).unwrap();
        assert_eq!(variant.call().genotype(), [NO_CALL, NO_CALL]);
        variant.call_mut().set_genotype([0, 1]);
        assert_eq!(variant.call().genotype(), [0, 1]);
        assert_eq!(variant.call().sample_name(), "child");
    }
}
