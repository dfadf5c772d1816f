
use anyhow::{anyhow, Context};
use log::trace;
use noodles::vcf;
use noodles::vcf::variant::record::samples::keys::key as vcf_key;
use noodles_util::variant::io::indexed_reader::Builder as VcfBuilder;
use noodles_util::variant::io::IndexedReader as VcfReader;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::collaborators::TruthVariantSource;
use crate::data_types::contig::Contig;
use crate::data_types::ranges::Range;
use crate::data_types::variants::{Variant, VariantCall, NO_CALL};
use crate::parsing::noodles_helper::{to_noodles_region, vcf_header_contigs};

/// Indexed truth VCF, reading genotypes from the first sample
pub struct VcfTruthSource {
    /// Path, for error messages
    filename: PathBuf,
    /// Indexed reader
    reader: VcfReader<noodles::bgzf::Reader<File>>,
    /// Header, needed for every query
    header: vcf::Header,
    /// Name of the sample the genotypes come from
    sample_name: String
}

impl VcfTruthSource {
    /// Opens an indexed VCF file
    /// # Arguments
    /// * `filename` - the .vcf.gz file, with a .tbi or .csi next to it
    pub fn open(filename: &Path) -> anyhow::Result<Self> {
        let mut reader = VcfBuilder::default()
            .build_from_path(filename)
            .with_context(|| format!("Error while opening {filename:?} (or associated index):"))?;
        let header = reader.read_header()
            .with_context(|| format!("Error while reading header of {filename:?}:"))?;
        let sample_name = header.sample_names().get_index(0)
            .ok_or(anyhow!("No samples found in {filename:?}"))?
            .clone();
        Ok(Self {
            filename: filename.to_path_buf(),
            reader,
            header,
            sample_name
        })
    }

    /// Contigs declared in the VCF header
    pub fn contigs(&self) -> Vec<Contig> {
        vcf_header_contigs(&self.header)
    }

    pub fn sample_name(&self) -> &str {
        &self.sample_name
    }
}

impl TruthVariantSource for VcfTruthSource {
    fn query(&mut self, region: &Range) -> anyhow::Result<Vec<Variant>> {
        if !self.header.contigs().contains_key(region.contig()) {
            return Ok(vec![]);
        }

        let noodles_region = to_noodles_region(region)?;
        let mut ret = vec![];
        let query = self.reader.query(&self.header, &noodles_region)
            .with_context(|| format!("Error while querying {region} in {:?}:", self.filename))?;
        for result in query {
            let record: Box<dyn vcf::variant::Record> = result?;
            let record_buf = vcf::variant::RecordBuf::try_from_variant_record(&self.header, record.as_ref())?;
            if let Some(variant) = parse_truth_record(&record_buf, region, &self.sample_name)
                .with_context(|| format!("Error parsing variants in {record_buf:?}:"))? {
                trace!("\tFound {variant:?}");
                ret.push(variant);
            }
        }
        Ok(ret)
    }
}

/// Converts a record into a truth variant if it starts inside `region` and has at least one ALT
fn parse_truth_record(record: &vcf::variant::RecordBuf, region: &Range, sample_name: &str) -> anyhow::Result<Option<Variant>> {
    let position = record.variant_start().ok_or(anyhow!("Missing POS"))?.get() as u64 - 1;
    if position < region.start() || position >= region.end() {
        return Ok(None);
    }

    let alternates: Vec<String> = record.alternate_bases().as_ref().to_vec();
    if alternates.is_empty() {
        return Ok(None);
    }

    let genotype = match record.samples().values().next() {
        Some(sample) => match sample.get(vcf_key::GENOTYPE) {
            Some(Some(gt)) => parse_genotype(gt),
            _ => [NO_CALL, NO_CALL]
        },
        None => [NO_CALL, NO_CALL]
    };

    let variant = Variant::new(
        region.contig(), position, record.reference_bases(), alternates, VariantCall::new(sample_name, genotype)
    )?;
    Ok(Some(variant))
}

/// Parses the GT field into a diploid pair of allele indices; haploid calls are doubled and missing alleles are no-calls
fn parse_genotype(gt: &vcf::variant::record_buf::samples::sample::Value) -> [i32; 2] {
    if let vcf::variant::record_buf::samples::sample::Value::Genotype(genotype) = gt {
        let alleles: Vec<i32> = genotype.as_ref().iter()
            .map(|a| a.position().map(|p| p as i32).unwrap_or(NO_CALL))
            .collect();
        match alleles.as_slice() {
            [a] => [*a, *a],
            [a, b, ..] => [*a, *b],
            [] => [NO_CALL, NO_CALL]
        }
    } else {
        [NO_CALL, NO_CALL]
    }
}
