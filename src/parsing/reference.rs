
use anyhow::{anyhow, bail, ensure};
use rust_lib_reference_genome::reference_genome::ReferenceGenome;
use std::path::Path;

use crate::collaborators::ReferenceSource;
use crate::data_types::contig::Contig;
use crate::data_types::ranges::Range;

/// In-memory FASTA reference
pub struct FastaReference {
    /// The loaded sequences
    genome: ReferenceGenome,
    /// Contigs in the order reported by the genome
    contigs: Vec<Contig>
}

impl FastaReference {
    /// Pre-loads a FASTA file into memory
    pub fn from_fasta(filename: &Path) -> anyhow::Result<Self> {
        let genome = match ReferenceGenome::from_fasta(filename) {
            Ok(rg) => rg,
            Err(e) => bail!("Error while loading reference genome from {filename:?}: {e:?}")
        };
        Ok(Self::from_genome(genome))
    }

    /// Wraps an already loaded genome
    pub fn from_genome(genome: ReferenceGenome) -> Self {
        let contigs = genome.contig_keys().iter()
            .enumerate()
            .map(|(index, name)| Contig::new(name.clone(), genome.get_full_chromosome(name).len() as u64, index))
            .collect();
        Self {
            genome,
            contigs
        }
    }
}

impl ReferenceSource for FastaReference {
    fn contigs(&self) -> Vec<Contig> {
        self.contigs.clone()
    }

    fn bases(&self, region: &Range) -> anyhow::Result<Vec<u8>> {
        let contig = self.contigs.iter()
            .find(|c| c.name() == region.contig())
            .ok_or(anyhow!("Contig {:?} is not in the reference", region.contig()))?;
        ensure!(region.end() <= contig.length(), "{region} extends past the end of {} ({} bp)", contig.name(), contig.length());

        let sequence = self.genome.get_full_chromosome(region.contig());
        Ok(sequence[region.start() as usize..region.end() as usize].to_ascii_uppercase())
    }

    fn contig_length(&self, name: &str) -> Option<u64> {
        self.contigs.iter()
            .find(|c| c.name() == name)
            .map(|c| c.length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_access() {
        let mut genome = ReferenceGenome::empty_reference();
        genome.add_contig("chr1".to_string(), "acgtACGTNN").unwrap();
        genome.add_contig("chr2".to_string(), "GGGG").unwrap();
        let reference = FastaReference::from_genome(genome);

        let contigs = reference.contigs();
        assert_eq!(contigs.len(), 2);
        assert_eq!(reference.contig_length("chr1"), Some(10));
        assert_eq!(reference.contig_length("chr3"), None);
        assert_eq!(reference.bases(&Range::new("chr1", 0, 6).unwrap()).unwrap(), b"ACGTAC".to_vec());
        assert!(reference.bases(&Range::new("chr2", 2, 5).unwrap()).is_err());
        assert!(reference.bases(&Range::new("chr3", 0, 1).unwrap()).is_err());
    }
}
