
/// Allele-count candidate generation from pileups
pub mod caller;
/// Command line interface functionality
pub mod cli;
/// Traits for the external collaborators of region processing
pub mod collaborators;
/// Reconciles the contigs shared by the reference and the other inputs
pub mod contig_coverage;
/// Contains various shared data types
pub mod data_types;
/// Contains the Dynamic WFA implementation used for realignment
pub mod dwfa;
/// Reference-confidence blocks and their contiguity checks
pub mod gvcf;
/// Assigns truth labels to candidates
pub mod labeler;
/// Tooling for parsing input files into meaningful structs / data
pub mod parsing;
/// Splits calling regions into work intervals and shards them across tasks
pub mod partition;
/// Encodes reads around a candidate into pileup feature records
pub mod pileup;
/// Drives one work interval through calling, realignment, encoding, and labeling
pub mod processor;
/// Realigns reads against candidate haplotypes
pub mod realigner;
/// Various utility functions that tend to be very generic
pub mod util;
/// All output writers
pub mod writers;
