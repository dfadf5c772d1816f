
use anyhow::{bail, Context};
use log::debug;
use noodles::bed::io::reader::Builder as BedBuilder;
use noodles::bed::{io::Reader as BedReader, Record as BedRecord};
use noodles::core::{Position, Region};
use noodles::sam;
use noodles::sam::header::record::value::map::read_group::tag as read_group_tag;
use noodles::vcf;
use std::collections::BTreeSet;
use std::io::BufReader;
use std::path::Path;

use crate::data_types::contig::Contig;
use crate::data_types::ranges::Range;
use crate::util::json_io::is_gzip;

/// Opens a BED file for reading; `.gz` files are decoded as BGZF
/// # Arguments
/// * `filename` - path to the .bed(.gz) file to open
pub fn open_bed_file(filename: &Path) -> anyhow::Result<BedReader<3, BufReader<Box<dyn std::io::Read>>>> {
    let inner: Box<dyn std::io::Read> = if is_gzip(filename) {
        #[allow(clippy::default_constructed_unit_structs)]
        let bgzf_reader = noodles::bgzf::io::reader::Builder::default()
            .build_from_path(filename)
            .with_context(|| format!("Error while opening BGZF {filename:?}:"))?;
        Box::new(bgzf_reader)
    } else {
        Box::new(std::fs::File::open(filename)
            .with_context(|| format!("Error while opening {filename:?}:"))?)
    };

    #[allow(clippy::default_constructed_unit_structs)]
    let bed_reader = BedBuilder::<3>::default()
        .build_from_reader(inner);
    Ok(bed_reader)
}

/// Reads every BED3 entry as a half-open `Range`, in file order.
/// Zero-length entries (start == end) cover no bases and are skipped.
/// # Arguments
/// * `filename` - path to the .bed(.gz) file
/// # Errors
/// * if the file cannot be read
/// * if an entry has no end or an end before its start
pub fn load_bed_ranges(filename: &Path) -> anyhow::Result<Vec<Range>> {
    debug!("Loading BED entries from {filename:?}...");
    let mut bed_reader = open_bed_file(filename)?;
    let mut record = BedRecord::<3>::default();
    let mut ranges = vec![];
    while bed_reader.read_record(&mut record)? > 0 {
        // noodles reports 1-based inclusive bounds
        let first = record.feature_start()
            .with_context(|| format!("Bad start in BED entry {record:?}"))?;
        let last = match record.feature_end() {
            Some(end) => end.with_context(|| format!("Bad end in BED entry {record:?}"))?,
            None => bail!("Missing end in BED entry {record:?}")
        };
        let start = (first.get() - 1) as u64;
        let end = last.get() as u64;
        if start == end {
            debug!("Skipping zero-length BED entry {record:?}");
            continue;
        }
        let range = Range::new(record.reference_sequence_name().to_string(), start, end)
            .with_context(|| format!("Invalid BED entry {record:?}"))?;
        ranges.push(range);
    }
    debug!("Loaded {} BED entries from {filename:?}", ranges.len());
    Ok(ranges)
}

/// Converts a half-open `Range` into a noodles query region
/// # Errors
/// * if the range cannot be expressed as 1-based positions
pub fn to_noodles_region(range: &Range) -> anyhow::Result<Region> {
    let start = Position::try_from(range.start() as usize + 1)?;
    let end = Position::try_from(range.end() as usize)?;
    Ok(Region::new(range.contig(), start..=end))
}

/// Extracts the contigs declared in a SAM/BAM header, in header order
pub fn sam_header_contigs(header: &sam::Header) -> Vec<Contig> {
    header.reference_sequences().iter()
        .enumerate()
        .map(|(index, (name, reference_sequence))| {
            Contig::new(name.to_string(), reference_sequence.length().get() as u64, index)
        })
        .collect()
}

/// Extracts the contigs declared in a VCF header, in header order.
/// Contigs without a declared length are skipped.
pub fn vcf_header_contigs(header: &vcf::Header) -> Vec<Contig> {
    header.contigs().iter()
        .filter_map(|(name, contig)| contig.length().map(|l| (name.clone(), l as u64)))
        .enumerate()
        .map(|(index, (name, length))| Contig::new(name, length, index))
        .collect()
}

/// Failure to pick a single sample from the read groups of an alignment file
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SampleNameError {
    #[error("No non-empty sample name found in the input reads. Please provide the name of the sample with the --sample-name argument.")]
    Missing,
    #[error("Multiple samples ({}) were found in the input reads. Only a BAM file containing a single sample is supported.", .names.join(", "))]
    Multiple { names: Vec<String> }
}

/// Returns the SM tag of every read group in a SAM/BAM header, in header order; read groups without one are skipped
pub fn read_group_samples(header: &sam::Header) -> Vec<String> {
    header.read_groups().values()
        .filter_map(|read_group| {
            read_group.other_fields().get(&read_group_tag::SAMPLE)
                .map(|s| s.to_string())
        })
        .collect()
}

/// Picks the single non-empty sample name from a list of read group samples
/// # Errors
/// * `SampleNameError::Missing` if no non-empty name is present
/// * `SampleNameError::Multiple` if more than one distinct name is present
pub fn resolve_sample_name(read_group_samples: &[String]) -> Result<String, SampleNameError> {
    let names: BTreeSet<&str> = read_group_samples.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    match names.len() {
        0 => Err(SampleNameError::Missing),
        1 => Ok(names.into_iter().next().unwrap_or_default().to_string()),
        _ => Err(SampleNameError::Multiple { names: names.into_iter().map(String::from).collect() })
    }
}

/// This will open a BAM file and retrieve its single sample name from the read groups
/// # Arguments
/// * `bam_fn` - the BAM filename to open
/// # Errors
/// * if the file cannot be opened
/// * if the read groups do not name exactly one sample
pub fn get_bam_sample_name(bam_fn: &Path) -> anyhow::Result<String> {
    #[allow(clippy::default_constructed_unit_structs)]
    let mut reader = noodles::bam::io::reader::Builder::default()
        .build_from_path(bam_fn)
        .with_context(|| format!("Error while opening {bam_fn:?}:"))?;
    let header = reader.read_header()
        .with_context(|| format!("Error while reading header of {bam_fn:?}:"))?;
    let name = resolve_sample_name(&read_group_samples(&header))?;
    Ok(name)
}
