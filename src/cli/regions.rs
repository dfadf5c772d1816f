
use anyhow::ensure;
use clap::Args;
use log::info;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::core::{check_region_entries, check_required_filename, FULL_VERSION};
use crate::partition::validate_shard_args;

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about)]
pub struct RegionsSettings {
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

    /// Optional reads to reconcile contigs against (indexed BAM), may be repeated
    #[clap(long = "reads")]
    #[clap(value_name = "BAM")]
    #[clap(num_args = 1..)]
    #[clap(help_heading = Some("Input/Output"))]
    pub reads: Vec<PathBuf>,

    /// Output TSV of work intervals [default: stdout]
    #[clap(short = 'o')]
    #[clap(long = "output")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output: Option<PathBuf>,

    /// Regions to process, as literals or BED files
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

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8
}

pub fn check_regions_settings(mut settings: RegionsSettings) -> anyhow::Result<RegionsSettings> {
    // hard code the version in
    settings.trioshard_version = FULL_VERSION.clone();
    info!("trioshard version: {:?}", &settings.trioshard_version);
    info!("Sub-command: regions");

    validate_shard_args(settings.task_id, settings.num_shards)?;
    ensure!(settings.partition_size > 0, "--partition-size must be >0");

    info!("Inputs:");
    check_required_filename(&settings.reference_fn, "Reference FASTA")?;
    for reads in settings.reads.iter() {
        check_required_filename(reads, "Reads")?;
    }
    check_region_entries(&settings.regions, "Regions")?;
    check_region_entries(&settings.exclude_regions, "Excluded regions")?;

    info!("\tReference: {:?}", &settings.reference_fn);
    for reads in settings.reads.iter() {
        info!("\tReads: {reads:?}");
    }
    info!("\tRegions: {:?}", settings.regions);
    info!("\tExcluded regions: {:?}", settings.exclude_regions);
    info!("\tPartition size: {}", settings.partition_size);
    Ok(settings)
}
