
use anyhow::Context;
use log::trace;
use noodles::bam;
use noodles::sam;
use noodles::sam::alignment::record::cigar::op::Kind;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::collaborators::ReadSource;
use crate::data_types::contig::Contig;
use crate::data_types::ranges::Range;
use crate::data_types::reads::{AlignedRead, CigarKind, CigarOp, ReadFlags};
use crate::parsing::noodles_helper::{sam_header_contigs, to_noodles_region};

/// Indexed BAM reader for one sample
pub struct BamReadSource {
    /// Path, for error messages
    filename: PathBuf,
    /// Indexed reader
    reader: bam::io::IndexedReader<noodles::bgzf::Reader<File>>,
    /// Header, needed for every query
    header: sam::Header
}

impl BamReadSource {
    /// Opens an indexed BAM file
    /// # Arguments
    /// * `filename` - the BAM file, with a .bai or .csi next to it
    pub fn open(filename: &Path) -> anyhow::Result<Self> {
        let mut reader = bam::io::indexed_reader::Builder::default()
            .build_from_path(filename)
            .with_context(|| format!("Error while opening {filename:?} (or associated index):"))?;
        let header = reader.read_header()
            .with_context(|| format!("Error while reading header of {filename:?}:"))?;
        Ok(Self {
            filename: filename.to_path_buf(),
            reader,
            header
        })
    }

    /// Contigs declared in the BAM header
    pub fn contigs(&self) -> Vec<Contig> {
        sam_header_contigs(&self.header)
    }

    pub fn header(&self) -> &sam::Header {
        &self.header
    }
}

impl ReadSource for BamReadSource {
    fn query(&mut self, region: &Range) -> anyhow::Result<Vec<AlignedRead>> {
        // contigs missing from this BAM have no reads
        if !self.header.reference_sequences().contains_key(region.contig().as_bytes()) {
            return Ok(vec![]);
        }

        let noodles_region = to_noodles_region(region)?;
        let query = self.reader.query(&self.header, &noodles_region)
            .with_context(|| format!("Error while querying {region} in {:?}:", self.filename))?;

        let mut ret = vec![];
        for result in query {
            let record = result.with_context(|| format!("Error while reading {:?}:", self.filename))?;
            if let Some(read) = convert_record(&record, region.contig())? {
                ret.push(read);
            }
        }
        Ok(ret)
    }
}

/// Converts a BAM record into our read type, returning None for unmapped reads or reads without stored bases
fn convert_record(record: &bam::Record, contig: &str) -> anyhow::Result<Option<AlignedRead>> {
    let name = record.name().map(|n| n.to_string()).unwrap_or_default();
    let flags = record.flags();
    let read_flags = ReadFlags {
        reverse_strand: flags.is_reverse_complemented(),
        duplicate: flags.is_duplicate(),
        secondary: flags.is_secondary(),
        supplementary: flags.is_supplementary(),
        qc_fail: flags.is_qc_fail(),
        unmapped: flags.is_unmapped()
    };

    // placed but unmapped reads carry no alignment
    if read_flags.unmapped {
        return Ok(None);
    }
    let start = match record.alignment_start() {
        Some(position) => position?.get() as u64 - 1,
        None => return Ok(None)
    };

    let bases: Vec<u8> = record.sequence().iter().collect();
    if bases.is_empty() {
        trace!("Skipping {name} without stored bases");
        return Ok(None);
    }
    let mut qualities: Vec<u8> = record.quality_scores().as_ref().to_vec();
    if qualities.len() != bases.len() || qualities.iter().all(|&q| q == u8::MAX) {
        // missing qualities are stored as 0xFF
        qualities = vec![0; bases.len()];
    }

    let mut cigar = vec![];
    for result in record.cigar().iter() {
        let op = result?;
        let kind = match op.kind() {
            Kind::Match => CigarKind::Match,
            Kind::Insertion => CigarKind::Insertion,
            Kind::Deletion => CigarKind::Deletion,
            Kind::Skip => CigarKind::Skip,
            Kind::SoftClip => CigarKind::SoftClip,
            Kind::HardClip => CigarKind::HardClip,
            Kind::Pad => CigarKind::Pad,
            Kind::SequenceMatch => CigarKind::SequenceMatch,
            Kind::SequenceMismatch => CigarKind::SequenceMismatch
        };
        cigar.push(CigarOp::new(kind, op.len() as u32));
    }

    let mapping_quality = record.mapping_quality().map(|m| m.get()).unwrap_or(0);
    let read = AlignedRead::new(name, contig, start, cigar, bases, qualities, mapping_quality)?
        .with_flags(read_flags);
    Ok(Some(read))
}
