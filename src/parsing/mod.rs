/*!
# Parsing module
Contains the logic for reading input files into the collaborator types used by the pipeline.
*/
/// Indexed BAM reads for one sample
pub mod alignments;
/// Confident truth regions backed by interval trees
pub mod confident_regions;
/// Helper functions for noodles
pub mod noodles_helper;
/// FASTA reference access
pub mod reference;
/// Indexed truth VCF access
pub mod truth_variants;
