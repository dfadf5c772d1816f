
use anyhow::Context;
use log::{debug, info};
use std::path::Path;

use crate::data_types::contig::ContigMap;
use crate::data_types::ranges::{parse_literal, Range, RangeSet};
use crate::parsing::noodles_helper::load_bed_ranges;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegionError {
    #[error("Invalid shard arguments (task_id={task_id:?}, num_shards={num_shards:?}): both must be set and satisfy 0 <= task_id < num_shards")]
    InvalidShardArgs { task_id: Option<i64>, num_shards: Option<i64> },
    #[error("The regions to call is empty.")]
    EmptyRegion,
    #[error("max_window must be > 0")]
    InvalidWindow
}

/// A validated shard assignment
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShardSpec {
    task_id: usize,
    num_shards: usize
}

impl ShardSpec {
    /// Returns true if the interval at `position` in the global ordering belongs to this shard
    pub fn owns(&self, position: usize) -> bool {
        position % self.num_shards == self.task_id
    }

    // getters
    pub fn task_id(&self) -> usize {
        self.task_id
    }

    pub fn num_shards(&self) -> usize {
        self.num_shards
    }
}

/// Validates the shard arguments.
/// Returns `None` when the run is unsharded, which is the case when neither value is set or `num_shards` is 0.
/// # Arguments
/// * `task_id` - the 0-based task index
/// * `num_shards` - total number of tasks
/// # Errors
/// * if exactly one of the two values is provided
/// * if either value is negative
/// * if `task_id >= num_shards` for a sharded run
pub fn validate_shard_args(task_id: Option<i64>, num_shards: Option<i64>) -> Result<Option<ShardSpec>, RegionError> {
    let invalid = RegionError::InvalidShardArgs { task_id, num_shards };
    match (task_id, num_shards) {
        (None, None) => Ok(None),
        (Some(t), Some(n)) => {
            if t < 0 || n < 0 {
                Err(invalid)
            } else if n == 0 {
                Ok(None)
            } else if t >= n {
                Err(invalid)
            } else {
                Ok(Some(ShardSpec { task_id: t as usize, num_shards: n as usize }))
            }
        },
        _ => Err(invalid)
    }
}

/// Returns true if an include/exclude entry should be read as a BED file instead of a literal
pub fn is_bed_path(entry: &str) -> bool {
    entry.ends_with(".bed") || entry.ends_with(".bed.gz")
}

/// Converts a list of literals and/or BED files into a range set.
/// Entries on unknown contigs are dropped.
/// # Arguments
/// * `entries` - region literals or BED file paths
/// * `contigs` - the canonical contigs
/// # Errors
/// * if a literal is malformed
/// * if a BED file cannot be loaded
pub fn parse_region_entries(entries: &[String], contigs: &ContigMap) -> anyhow::Result<RangeSet> {
    let mut ranges = vec![];
    for entry in entries.iter() {
        if is_bed_path(entry) {
            let bed_ranges = load_bed_ranges(Path::new(entry))
                .with_context(|| format!("Error while loading regions from {entry:?}:"))?;
            debug!("Loaded {} ranges from {entry:?}", bed_ranges.len());
            ranges.extend(bed_ranges.into_iter().filter(|r| contigs.contains(r.contig())));
        } else {
            match parse_literal(entry, contigs)? {
                Some(r) => ranges.push(r),
                None => debug!("Ignoring region on unknown contig: {entry:?}")
            }
        }
    }
    Ok(RangeSet::from_ranges(ranges))
}

/// Builds the set of regions to call.
/// With no includes, every contig is used in full; otherwise the union of the includes is used.
/// Excludes are subtracted at the end, and everything is clipped to the contig extents.
/// An empty result is rejected by `plan_work_intervals`.
/// # Arguments
/// * `contigs` - the canonical contigs
/// * `include_entries` - region literals or BED files to include
/// * `exclude_entries` - region literals or BED files to exclude
/// # Errors
/// * if any of the entries cannot be parsed
pub fn build_calling_regions(contigs: &ContigMap, include_entries: &[String], exclude_entries: &[String]) -> anyhow::Result<RangeSet> {
    let included = if include_entries.is_empty() {
        RangeSet::from_contigs(contigs)
    } else {
        parse_region_entries(include_entries, contigs)?.clip_to_contigs(contigs)
    };

    let excluded = parse_region_entries(exclude_entries, contigs)?;
    Ok(included.subtract(&excluded))
}

/// Splits a range into consecutive windows of at most `max_window` bases, starting at the range start
fn slice_range(range: &Range, max_window: u64) -> Vec<Range> {
    let mut ret = vec![];
    let mut start = range.start();
    while start < range.end() {
        let end = (start + max_window).min(range.end());
        // start < end is guaranteed here
        if let Ok(r) = Range::new(range.contig(), start, end) {
            ret.push(r);
        }
        start = end;
    }
    ret
}

/// Generates the ordered work intervals for a task.
/// Every calling region is clipped to the contigs, sliced into windows of at most `max_window`, and sorted canonically.
/// When sharded, task `t` of `n` keeps every interval whose position in the global ordering is `t` modulo `n`.
/// # Arguments
/// * `contigs` - the canonical contigs
/// * `max_window` - the largest window size, must be > 0
/// * `calling_regions` - regions to call; all contigs if None
/// * `task_id` - the task index, must be set together with `num_shards`
/// * `num_shards` - the number of tasks; 0 means unsharded
/// # Errors
/// * `InvalidShardArgs` if the shard arguments are inconsistent
/// * `InvalidWindow` if `max_window` is 0
pub fn regions_to_process(
    contigs: &ContigMap,
    max_window: u64,
    calling_regions: Option<&RangeSet>,
    task_id: Option<i64>,
    num_shards: Option<i64>
) -> Result<Vec<Range>, RegionError> {
    let shard = validate_shard_args(task_id, num_shards)?;
    if max_window == 0 {
        return Err(RegionError::InvalidWindow);
    }

    let calling = match calling_regions {
        Some(cr) => cr.clip_to_contigs(contigs),
        None => RangeSet::from_contigs(contigs)
    };

    let mut windows: Vec<Range> = calling.sorted_ranges(contigs).iter()
        .flat_map(|r| slice_range(r, max_window))
        .collect();
    windows.sort_by_key(|r| r.sort_key(contigs));

    let total = windows.len();
    let selected: Vec<Range> = match shard {
        Some(spec) => {
            windows.into_iter()
                .enumerate()
                .filter_map(|(i, r)| if spec.owns(i) { Some(r) } else { None })
                .collect()
        },
        None => windows
    };

    match shard {
        Some(spec) => info!("Task {} of {} owns {} of {total} work intervals", spec.task_id(), spec.num_shards(), selected.len()),
        None => info!("Generated {total} work intervals")
    };
    Ok(selected)
}

/// Builds the calling regions from the include/exclude entries and returns the work intervals of one task
/// # Arguments
/// * `contigs` - the canonical contigs
/// * `include_entries` - region literals or BED files to include, all contigs if empty
/// * `exclude_entries` - region literals or BED files to exclude
/// * `max_window` - the largest window size, must be > 0
/// * `task_id` - the task index, must be set together with `num_shards`
/// * `num_shards` - the number of tasks; 0 means unsharded
/// # Errors
/// * if any of the entries cannot be parsed
/// * `EmptyRegion` if nothing is left to call, e.g. every include names an unknown contig
/// * `InvalidShardArgs` or `InvalidWindow` from `regions_to_process`
pub fn plan_work_intervals(
    contigs: &ContigMap,
    include_entries: &[String],
    exclude_entries: &[String],
    max_window: u64,
    task_id: Option<i64>,
    num_shards: Option<i64>
) -> anyhow::Result<Vec<Range>> {
    let calling_regions = build_calling_regions(contigs, include_entries, exclude_entries)?;
    if calling_regions.is_empty() {
        return Err(RegionError::EmptyRegion.into());
    }
    debug!("Calling regions cover {} bases in {} ranges", calling_regions.total_bases(), calling_regions.len());

    let intervals = regions_to_process(contigs, max_window, Some(&calling_regions), task_id, num_shards)?;
    Ok(intervals)
}
