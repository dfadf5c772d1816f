
use serde::Serialize;

use crate::data_types::variants::Variant;

/// Default tensor format tag written by the pileup encoder
pub const RAW_TENSOR_FORMAT: &str = "raw";

/// One encoded image for a subset of a candidate's ALT alleles, as returned by an image creator
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EncodedPileup {
    /// The ALT alleles this image represents
    pub alt_alleles: Vec<String>,
    /// Encoded bytes
    pub payload: Vec<u8>,
    /// Tensor shape, e.g. [height, width, channels]
    pub shape: Vec<usize>,
    /// Encoding tag
    pub format: String
}

/// A per-allele-subset model input derived from one candidate
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureRecord {
    /// The candidate variant; its call genotype is overwritten by labeling
    variant: Variant,
    /// ALT alleles included in this record
    alt_alleles_considered: Vec<String>,
    /// 0-based indices of `alt_alleles_considered` in the variant ALT list
    alt_allele_indices: Vec<usize>,
    /// Encoded image bytes
    encoded_payload: Vec<u8>,
    /// Tensor shape of the payload
    shape: Vec<usize>,
    /// Encoding tag
    format: String,
    /// Training label, number of genotype alleles in `alt_alleles_considered`
    label: Option<u8>
}

impl FeatureRecord {
    /// Builds an unlabeled record from a variant and an encoded pileup
    pub fn new(variant: Variant, encoded: EncodedPileup) -> Self {
        let alt_allele_indices = encoded.alt_alleles.iter()
            .filter_map(|alt| variant.alternate_bases().iter().position(|a| a == alt))
            .collect();
        Self {
            variant,
            alt_alleles_considered: encoded.alt_alleles,
            alt_allele_indices,
            encoded_payload: encoded.payload,
            shape: encoded.shape,
            format: encoded.format,
            label: None
        }
    }

    /// Sets the training label and the genotype of the call
    pub(crate) fn set_label(&mut self, genotype: [i32; 2], label: u8) {
        self.variant.call_mut().set_genotype(genotype);
        self.label = Some(label);
    }

    // getters
    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn alt_alleles_considered(&self) -> &[String] {
        &self.alt_alleles_considered
    }

    pub fn alt_allele_indices(&self) -> &[usize] {
        &self.alt_allele_indices
    }

    pub fn encoded_payload(&self) -> &[u8] {
        &self.encoded_payload
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn label(&self) -> Option<u8> {
        self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::variants::VariantCall;

    #[test]
    fn test_alt_indices() {
        let variant = Variant::new(
            "chr1", 5, "AC", vec!["A".to_string(), "GC".to_string()], VariantCall::no_call("child")
        ).unwrap();
        let encoded = EncodedPileup {
            alt_alleles: vec!["GC".to_string()],
            payload: vec![1, 2, 3],
            shape: vec![1, 3, 1],
            format: RAW_TENSOR_FORMAT.to_string()
        };
        let record = FeatureRecord::new(variant, encoded);
        assert_eq!(record.alt_allele_indices(), &[1]);
        assert_eq!(record.label(), None);
        assert_eq!(record.format(), "raw");
    }
}
