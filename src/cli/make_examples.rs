
use anyhow::{bail, ensure};
use clap::Args;
use log::info;
use serde::Serialize;
use std::path::PathBuf;

use crate::caller::{CallerConfig, VariantSelection};
use crate::cli::core::{check_optional_filename, check_region_entries, check_required_filename, FULL_VERSION};
use crate::data_types::reads::ReadRequirements;
use crate::data_types::sample::SampleRole;
use crate::gvcf::GvcfConfig;
use crate::parsing::noodles_helper::get_bam_sample_name;
use crate::partition::validate_shard_args;
use crate::pileup::{check_pileup_height, PileupConfig};
use crate::processor::{ProcessingMode, ProcessorConfig};
use crate::util::sharded_file::ShardedFileSpec;

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about)]
pub struct MakeExamplesSettings {
    #[clap(default_value = "")]
    #[clap(hide = true)]
    pub trioshard_version: String,

    /// Reference FASTA file
    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reference")]
    #[clap(value_name = "FASTA")]
    #[clap(help_heading = Some("Input/Output"))]
    pub reference_fn: PathBuf,

    /// Aligned reads for the child (indexed BAM)
    #[clap(required = true)]
    #[clap(long = "reads")]
    #[clap(value_name = "BAM")]
    #[clap(help_heading = Some("Input/Output"))]
    pub reads_child: PathBuf,

    /// Aligned reads for the first parent (indexed BAM)
    #[clap(long = "reads-parent1")]
    #[clap(value_name = "BAM")]
    #[clap(help_heading = Some("Input/Output"))]
    pub reads_parent1: Option<PathBuf>,

    /// Aligned reads for the second parent (indexed BAM)
    #[clap(long = "reads-parent2")]
    #[clap(value_name = "BAM")]
    #[clap(help_heading = Some("Input/Output"))]
    pub reads_parent2: Option<PathBuf>,

    /// Sample name of the child [default: read group SM tag]
    #[clap(long = "sample-name")]
    #[clap(value_name = "SAMPLE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub sample_name_child: Option<String>,

    /// Sample name of the first parent [default: read group SM tag]
    #[clap(long = "sample-name-parent1")]
    #[clap(value_name = "SAMPLE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub sample_name_parent1: Option<String>,

    /// Sample name of the second parent [default: read group SM tag]
    #[clap(long = "sample-name-parent2")]
    #[clap(value_name = "SAMPLE")]
    #[clap(help_heading = Some("Input/Output"))]
    pub sample_name_parent2: Option<String>,

    /// Truth variants for training (indexed VCF)
    #[clap(long = "truth-variants")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Input/Output"))]
    pub truth_variants: Option<PathBuf>,

    /// Confident regions of the truth set for training (BED)
    #[clap(long = "confident-regions")]
    #[clap(value_name = "BED")]
    #[clap(help_heading = Some("Input/Output"))]
    pub confident_regions: Option<PathBuf>,

    /// Output feature records, name@N is sharded (JSON lines, .gz to compress)
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "examples")]
    #[clap(value_name = "JSONL")]
    #[clap(help_heading = Some("Input/Output"))]
    pub examples: String,

    /// Optional output candidates, name@N is sharded
    #[clap(long = "candidates")]
    #[clap(value_name = "JSONL")]
    #[clap(help_heading = Some("Input/Output"))]
    pub candidates: Option<String>,

    /// Optional output gVCF records, name@N is sharded (calling mode only)
    #[clap(long = "gvcf")]
    #[clap(value_name = "JSONL")]
    #[clap(help_heading = Some("Input/Output"))]
    pub gvcf: Option<String>,

    /// Optional per-interval summary (TSV)
    #[clap(long = "region-summary")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub region_summary: Option<PathBuf>,

    /// calling or training
    #[clap(long = "mode")]
    #[clap(value_enum)]
    #[clap(default_value_t = ProcessingMode::Calling)]
    #[clap(help_heading = Some("Mode"))]
    pub mode: ProcessingMode,

    /// Regions to process, as literals (chr20:10,000,001-10,010,000) or BED files
    #[clap(long = "regions")]
    #[clap(value_name = "REGION")]
    #[clap(num_args = 1..)]
    #[clap(help_heading = Some("Regions"))]
    pub regions: Vec<String>,

    /// Regions to skip, as literals or BED files
    #[clap(long = "exclude-regions")]
    #[clap(value_name = "REGION")]
    #[clap(num_args = 1..)]
    #[clap(help_heading = Some("Regions"))]
    pub exclude_regions: Vec<String>,

    /// Contigs to drop before reconciling the inputs
    #[clap(long = "exclude-contigs")]
    #[clap(value_name = "CONTIG")]
    #[clap(num_args = 1..)]
    #[clap(help_heading = Some("Regions"))]
    pub exclude_contigs: Vec<String>,

    /// Minimum fraction of reference bases that must be shared by every input
    #[clap(long = "min-shared-contigs-basepairs")]
    #[clap(value_name = "FRACTION")]
    #[clap(default_value = "0.9")]
    #[clap(help_heading = Some("Regions"))]
    pub min_shared_contigs_basepairs: f64,

    /// Maximum size of a work interval
    #[clap(long = "partition-size")]
    #[clap(value_name = "BP")]
    #[clap(default_value = "1000")]
    #[clap(help_heading = Some("Regions"))]
    pub partition_size: u64,

    /// 0-based index of this task
    #[clap(long = "task-id")]
    #[clap(value_name = "INT")]
    #[clap(allow_hyphen_values = true)]
    #[clap(help_heading = Some("Sharding"))]
    pub task_id: Option<i64>,

    /// Total number of tasks, 0 for a single unsharded task
    #[clap(long = "num-shards")]
    #[clap(value_name = "INT")]
    #[clap(allow_hyphen_values = true)]
    #[clap(help_heading = Some("Sharding"))]
    pub num_shards: Option<i64>,

    /// Pileup rows for the child block
    #[clap(long = "pileup-image-height-child")]
    #[clap(value_name = "ROWS")]
    #[clap(default_value = "100")]
    #[clap(help_heading = Some("Pileup images"))]
    pub pileup_image_height_child: usize,

    /// Pileup rows for each parent block
    #[clap(long = "pileup-image-height-parent")]
    #[clap(value_name = "ROWS")]
    #[clap(default_value = "100")]
    #[clap(help_heading = Some("Pileup images"))]
    pub pileup_image_height_parent: usize,

    /// Pileup columns, must be odd
    #[clap(long = "pileup-image-width")]
    #[clap(value_name = "COLUMNS")]
    #[clap(default_value = "199")]
    #[clap(help_heading = Some("Pileup images"))]
    pub pileup_image_width: usize,

    /// Adds the haplotype channels from realigning reads to each ALT haplotype
    #[clap(long = "alt-aligned-pileup")]
    #[clap(help_heading = Some("Pileup images"))]
    pub alt_aligned_pileup: bool,

    /// Maximum edit distance when realigning reads to a haplotype
    #[clap(long = "realigner-max-edit-distance")]
    #[clap(value_name = "INT")]
    #[clap(default_value = "50")]
    #[clap(help_heading = Some("Pileup images"))]
    pub realigner_max_edit_distance: usize,

    /// Reads below this mapping quality are ignored
    #[clap(long = "min-mapping-quality")]
    #[clap(value_name = "MAPQ")]
    #[clap(default_value = "5")]
    #[clap(help_heading = Some("Read filters"))]
    pub min_mapping_quality: u8,

    /// Bases below this quality are ignored
    #[clap(long = "min-base-quality")]
    #[clap(value_name = "QUAL")]
    #[clap(default_value = "10")]
    #[clap(help_heading = Some("Read filters"))]
    pub min_base_quality: u8,

    /// Keep reads marked as duplicates
    #[clap(long = "keep-duplicates")]
    #[clap(help_heading = Some("Read filters"))]
    pub keep_duplicates: bool,

    /// Keep secondary alignments
    #[clap(long = "keep-secondary-alignments")]
    #[clap(help_heading = Some("Read filters"))]
    pub keep_secondary_alignments: bool,

    /// Keep supplementary alignments
    #[clap(long = "keep-supplementary-alignments")]
    #[clap(help_heading = Some("Read filters"))]
    pub keep_supplementary_alignments: bool,

    /// Minimum reads supporting a SNV candidate
    #[clap(long = "vsc-min-count-snps")]
    #[clap(value_name = "COUNT")]
    #[clap(default_value = "2")]
    #[clap(help_heading = Some("Candidate generation"))]
    pub vsc_min_count_snps: usize,

    /// Minimum reads supporting an indel candidate
    #[clap(long = "vsc-min-count-indels")]
    #[clap(value_name = "COUNT")]
    #[clap(default_value = "2")]
    #[clap(help_heading = Some("Candidate generation"))]
    pub vsc_min_count_indels: usize,

    /// Minimum fraction of depth supporting a SNV candidate
    #[clap(long = "vsc-min-fraction-snps")]
    #[clap(value_name = "FRACTION")]
    #[clap(default_value = "0.12")]
    #[clap(help_heading = Some("Candidate generation"))]
    pub vsc_min_fraction_snps: f64,

    /// Minimum fraction of depth supporting an indel candidate
    #[clap(long = "vsc-min-fraction-indels")]
    #[clap(value_name = "FRACTION")]
    #[clap(default_value = "0.06")]
    #[clap(help_heading = Some("Candidate generation"))]
    pub vsc_min_fraction_indels: f64,

    /// Only keep candidates of these types
    #[clap(long = "select-variant-types")]
    #[clap(value_enum)]
    #[clap(default_value_t = VariantSelection::All)]
    #[clap(help_heading = Some("Candidate generation"))]
    pub select_variant_types: VariantSelection,

    /// Bin size for genotype qualities when merging gVCF blocks
    #[clap(long = "gvcf-gq-binsize")]
    #[clap(value_name = "GQ")]
    #[clap(default_value = "5")]
    #[clap(help_heading = Some("gVCF"))]
    pub gvcf_gq_binsize: i32,

    /// Number of threads to use
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8
}

impl MakeExamplesSettings {
    /// (role, reads, sample name) for every sample that has reads, in parent1, child, parent2 order
    pub fn sample_inputs(&self) -> Vec<(SampleRole, PathBuf, Option<String>)> {
        let mut ret = vec![];
        if let Some(reads) = self.reads_parent1.as_ref() {
            ret.push((SampleRole::Parent1, reads.clone(), self.sample_name_parent1.clone()));
        }
        ret.push((SampleRole::Child, self.reads_child.clone(), self.sample_name_child.clone()));
        if let Some(reads) = self.reads_parent2.as_ref() {
            ret.push((SampleRole::Parent2, reads.clone(), self.sample_name_parent2.clone()));
        }
        ret
    }

    /// Pileup rows for a role
    pub fn pileup_height(&self, role: SampleRole) -> usize {
        match role {
            SampleRole::Child => self.pileup_image_height_child,
            SampleRole::Parent1 | SampleRole::Parent2 => self.pileup_image_height_parent
        }
    }

    /// Roles that get candidates and records; training only labels the child
    pub fn called_roles(&self) -> Vec<SampleRole> {
        match self.mode {
            ProcessingMode::Training => vec![SampleRole::Child],
            ProcessingMode::Calling => self.sample_inputs().into_iter().map(|(role, _r, _n)| role).collect()
        }
    }

    /// The task index used to resolve sharded output names
    pub fn task_index(&self) -> usize {
        self.task_id.unwrap_or(0).max(0) as usize
    }

    pub fn read_requirements(&self) -> ReadRequirements {
        ReadRequirements {
            min_mapping_quality: self.min_mapping_quality,
            min_base_quality: self.min_base_quality,
            keep_duplicates: self.keep_duplicates,
            keep_secondary_alignments: self.keep_secondary_alignments,
            keep_supplementary_alignments: self.keep_supplementary_alignments
        }
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            mode: self.mode,
            read_requirements: self.read_requirements(),
            called_roles: self.called_roles()
        }
    }

    pub fn caller_config(&self) -> CallerConfig {
        CallerConfig {
            min_count_snps: self.vsc_min_count_snps,
            min_count_indels: self.vsc_min_count_indels,
            min_fraction_snps: self.vsc_min_fraction_snps,
            min_fraction_indels: self.vsc_min_fraction_indels,
            min_base_quality: self.min_base_quality,
            select_variant_types: self.select_variant_types
        }
    }

    pub fn pileup_config(&self) -> PileupConfig {
        PileupConfig {
            width: self.pileup_image_width,
            alt_aligned_pileup: self.alt_aligned_pileup
        }
    }

    pub fn gvcf_config(&self) -> GvcfConfig {
        GvcfConfig {
            gq_binsize: self.gvcf_gq_binsize,
            min_base_quality: self.min_base_quality
        }
    }
}

/// Checks the option combinations that do not depend on the file system
/// # Errors
/// * if the shard arguments are inconsistent, or disagree with a sharded output name
/// * if training is missing the truth inputs, or asks for gVCF output
/// * if an image dimension or the partition size is out of range
pub fn check_make_examples_options(settings: &MakeExamplesSettings) -> anyhow::Result<()> {
    let shard = validate_shard_args(settings.task_id, settings.num_shards)?;
    let mut outputs = vec![&settings.examples];
    outputs.extend(settings.candidates.iter());
    outputs.extend(settings.gvcf.iter());
    for output in outputs.into_iter() {
        let spec = ShardedFileSpec::parse(output)?;
        if let Some(n) = spec.num_shards() {
            let expected = shard.map(|s| s.num_shards());
            ensure!(
                expected == Some(n),
                "Output {output:?} has {n} shards but --num-shards is {:?}", settings.num_shards
            );
        }
    }

    if settings.mode == ProcessingMode::Training {
        if settings.confident_regions.is_none() {
            bail!("confident_regions is required when in training mode.");
        }
        if settings.truth_variants.is_none() {
            bail!("truth_variants is required when in training mode.");
        }
        if settings.gvcf.is_some() {
            bail!("gvcf is not allowed in training mode.");
        }
    }

    check_pileup_height(settings.pileup_image_height_child)?;
    check_pileup_height(settings.pileup_image_height_parent)?;
    ensure!(settings.pileup_image_width % 2 == 1, "--pileup-image-width must be odd, got {}", settings.pileup_image_width);
    ensure!(settings.partition_size > 0, "--partition-size must be >0");
    ensure!(
        (0.0..=1.0).contains(&settings.min_shared_contigs_basepairs),
        "--min-shared-contigs-basepairs must be in [0, 1]"
    );
    ensure!(settings.gvcf_gq_binsize > 0, "--gvcf-gq-binsize must be >0");
    Ok(())
}

pub fn check_make_examples_settings(mut settings: MakeExamplesSettings) -> anyhow::Result<MakeExamplesSettings> {
    // hard code the version in
    settings.trioshard_version = FULL_VERSION.clone();
    info!("trioshard version: {:?}", &settings.trioshard_version);
    info!("Sub-command: make-examples");

    // fail fast on options before touching any files
    check_make_examples_options(&settings)?;

    info!("Inputs:");
    check_required_filename(&settings.reference_fn, "Reference FASTA")?;
    check_required_filename(&settings.reads_child, "Child reads")?;
    check_optional_filename(settings.reads_parent1.as_deref(), "Parent1 reads")?;
    check_optional_filename(settings.reads_parent2.as_deref(), "Parent2 reads")?;
    check_optional_filename(settings.truth_variants.as_deref(), "Truth variants")?;
    check_optional_filename(settings.confident_regions.as_deref(), "Confident regions")?;
    check_region_entries(&settings.regions, "Regions")?;
    check_region_entries(&settings.exclude_regions, "Excluded regions")?;

    info!("\tReference: {:?}", &settings.reference_fn);
    info!("\tChild reads: {:?}", &settings.reads_child);
    if settings.sample_name_child.is_none() {
        settings.sample_name_child = Some(get_bam_sample_name(&settings.reads_child)?);
    }
    info!("\tChild sample: {:?}", settings.sample_name_child.as_deref().unwrap_or_default());
    if let Some(reads) = settings.reads_parent1.clone() {
        info!("\tParent1 reads: {reads:?}");
        if settings.sample_name_parent1.is_none() {
            settings.sample_name_parent1 = Some(get_bam_sample_name(&reads)?);
        }
        info!("\tParent1 sample: {:?}", settings.sample_name_parent1.as_deref().unwrap_or_default());
    }
    if let Some(reads) = settings.reads_parent2.clone() {
        info!("\tParent2 reads: {reads:?}");
        if settings.sample_name_parent2.is_none() {
            settings.sample_name_parent2 = Some(get_bam_sample_name(&reads)?);
        }
        info!("\tParent2 sample: {:?}", settings.sample_name_parent2.as_deref().unwrap_or_default());
    }
    if let Some(filename) = settings.truth_variants.as_deref() {
        info!("\tTruth variants: {filename:?}");
    }
    if let Some(filename) = settings.confident_regions.as_deref() {
        info!("\tConfident regions: {filename:?}");
    }

    info!("Outputs:");
    info!("\tExamples: {:?}", &settings.examples);
    if let Some(candidates) = settings.candidates.as_ref() {
        info!("\tCandidates: {candidates:?}");
    }
    if let Some(gvcf) = settings.gvcf.as_ref() {
        info!("\tgVCF: {gvcf:?}");
    }
    if let Some(summary) = settings.region_summary.as_ref() {
        info!("\tRegion summary: {summary:?}");
    }

    info!("Processing parameters:");
    info!("\tMode: {}", settings.mode);
    info!("\tRegions: {:?}", settings.regions);
    info!("\tExcluded regions: {:?}", settings.exclude_regions);
    info!("\tPartition size: {}", settings.partition_size);
    match (settings.task_id, settings.num_shards) {
        (Some(t), Some(n)) if n > 0 => info!("\tTask: {t} of {n}"),
        _ => info!("\tTask: unsharded")
    };
    info!("\tPileup heights: child={}, parent={}", settings.pileup_image_height_child, settings.pileup_image_height_parent);
    info!("\tPileup width: {}", settings.pileup_image_width);
    info!("\tAlt-aligned pileup: {}", if settings.alt_aligned_pileup { "ENABLED" } else { "DISABLED" });
    info!("\tVariant selection: {}", settings.select_variant_types);

    if settings.threads == 0 {
        settings.threads = 1;
    }
    info!("Processing threads: {}", settings.threads);

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rstest::rstest;

    use crate::partition::RegionError;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: MakeExamplesSettings
    }

    fn parse(args: &[&str]) -> MakeExamplesSettings {
        let mut full = vec!["trioshard", "--reference", "ref.fa", "--reads", "child.bam", "--examples", "examples.jsonl"];
        full.extend_from_slice(args);
        TestCli::parse_from(full).settings
    }

    #[test]
    fn test_defaults() {
        let settings = parse(&[]);
        assert!(check_make_examples_options(&settings).is_ok());
        assert_eq!(settings.mode, ProcessingMode::Calling);
        assert_eq!(settings.partition_size, 1000);
        assert_eq!(settings.called_roles(), vec![SampleRole::Child]);
        assert_eq!(settings.task_index(), 0);
        let caller = settings.caller_config();
        assert_eq!(caller.min_count_snps, 2);
        assert_eq!(caller.select_variant_types, VariantSelection::All);
    }

    #[test]
    fn test_trio_roles() {
        let settings = parse(&["--reads-parent2", "p2.bam", "--reads-parent1", "p1.bam", "--pileup-image-height-parent", "40"]);
        let roles: Vec<SampleRole> = settings.sample_inputs().into_iter().map(|(r, _p, _n)| r).collect();
        assert_eq!(roles, vec![SampleRole::Parent1, SampleRole::Child, SampleRole::Parent2]);
        assert_eq!(settings.called_roles(), roles);
        assert_eq!(settings.pileup_height(SampleRole::Parent2), 40);
        assert_eq!(settings.pileup_height(SampleRole::Child), 100);

        let training = parse(&["--reads-parent1", "p1.bam", "--mode", "training", "--truth-variants", "t.vcf.gz", "--confident-regions", "c.bed"]);
        assert!(check_make_examples_options(&training).is_ok());
        assert_eq!(training.called_roles(), vec![SampleRole::Child]);
    }

    #[rstest]
    #[case(&["--mode", "training", "--confident-regions", "c.bed"], "truth_variants is required when in training mode.")]
    #[case(&["--mode", "training", "--truth-variants", "t.vcf.gz"], "confident_regions is required when in training mode.")]
    #[case(&["--mode", "training", "--truth-variants", "t.vcf.gz", "--confident-regions", "c.bed", "--gvcf", "g.jsonl"], "gvcf is not allowed in training mode.")]
    #[case(&["--pileup-image-height-child", "9"], "Pileup image heights must be between 10 and 100.")]
    #[case(&["--pileup-image-height-parent", "101"], "Pileup image heights must be between 10 and 100.")]
    #[case(&["--partition-size", "0"], "--partition-size must be >0")]
    fn test_invalid_options(#[case] args: &[&str], #[case] message: &str) {
        let settings = parse(args);
        let error = check_make_examples_options(&settings).unwrap_err();
        assert_eq!(error.to_string(), message);
    }

    #[rstest]
    #[case(&["--num-shards", "0"])]
    #[case(&["--task-id", "2"])]
    #[case(&["--task-id", "-1", "--num-shards", "2"])]
    #[case(&["--task-id", "2", "--num-shards", "2"])]
    #[case(&["--task-id", "1", "--num-shards", "1"])]
    fn test_invalid_shards(#[case] args: &[&str]) {
        let settings = parse(args);
        let error = check_make_examples_options(&settings).unwrap_err();
        assert!(matches!(error.downcast_ref::<RegionError>(), Some(RegionError::InvalidShardArgs { .. })));
    }

    #[test]
    fn test_sharded_outputs() {
        let mut settings = parse(&["--task-id", "1", "--num-shards", "4"]);
        settings.examples = "examples@4.jsonl.gz".to_string();
        assert!(check_make_examples_options(&settings).is_ok());
        assert_eq!(settings.task_index(), 1);

        settings.candidates = Some("candidates@3.jsonl.gz".to_string());
        assert!(check_make_examples_options(&settings).is_err());

        // a sharded name needs sharded arguments
        let mut unsharded = parse(&[]);
        unsharded.examples = "examples@4.jsonl.gz".to_string();
        assert!(check_make_examples_options(&unsharded).is_err());
    }
}
