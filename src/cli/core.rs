
use anyhow::bail;
use clap::{Parser, Subcommand};
use lazy_static::lazy_static;
use std::path::Path;

use crate::cli::make_examples::MakeExamplesSettings;
use crate::cli::regions::RegionsSettings;
use crate::partition::is_bed_path;

lazy_static! {
    /// Stores the full version string we plan to use, which is generated in build.rs
    /// # Examples
    /// * `0.3.1-6bb9635-dirty` - while on a dirty branch
    /// * `0.3.1-6bb9635` - with a fresh commit
    pub static ref FULL_VERSION: String = format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("VERGEN_GIT_DESCRIBE"));
}

#[derive(Parser)]
#[clap(author,
    version = &**FULL_VERSION,
    about)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands
}

/// trioshard, deterministic genome sharding and per-region trio example generation.
/// Select a subcommand to see more usage information:
#[derive(Subcommand)]
pub enum Commands {
    /// Generates candidates, feature records, and gVCF records for one task
    MakeExamples(Box<MakeExamplesSettings>),
    /// Prints the work intervals owned by one task
    Regions(Box<RegionsSettings>)
}

pub fn get_cli() -> Cli {
    Cli::parse()
}

/// Checks if a file exists and will otherwise exit
/// # Arguments
/// * `filename` - the file path to check for
/// * `label` - the label to use for error messages
pub fn check_required_filename(filename: &Path, label: &str) -> anyhow::Result<()> {
    if !filename.exists() {
        bail!("{} does not exist: \"{}\"", label, filename.display());
    }
    Ok(())
}

/// Checks if an optional file exists, if it was provided
/// # Arguments
/// * `opt_filename` - the file path to check for, if any
/// * `label` - the label to use for error messages
pub fn check_optional_filename(opt_filename: Option<&Path>, label: &str) -> anyhow::Result<()> {
    if let Some(filename) = opt_filename {
        check_required_filename(filename, label)?;
    }
    Ok(())
}

/// Checks region entries that look like BED files
/// # Arguments
/// * `entries` - region literals or BED paths
/// * `label` - the label to use for error messages
pub fn check_region_entries(entries: &[String], label: &str) -> anyhow::Result<()> {
    for entry in entries.iter() {
        if is_bed_path(entry) {
            check_required_filename(Path::new(entry), label)?;
        }
    }
    Ok(())
}
