
/// Candidate variant sites with their supporting reads
pub mod candidate;
/// Contig definitions and the canonical contig ordering
pub mod contig;
/// Encoded per-allele feature records
pub mod feature_record;
/// Truth-derived labels for candidates
pub mod label;
/// Tracker for candidate and labeling counts
pub mod labeling_metrics;
/// Half-open genomic ranges and range set algebra
pub mod ranges;
/// Aligned reads, CIGAR handling, and read filters
pub mod reads;
/// Trio samples and their per-interval read buffers
pub mod sample;
/// Contains variant definition functionality and checks
pub mod variants;
