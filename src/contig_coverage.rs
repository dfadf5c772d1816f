
use log::{debug, info};
use rustc_hash::FxHashSet;

use crate::data_types::contig::Contig;

/// Raised when too little of the reference is shared with the other inputs
#[derive(thiserror::Error, Debug)]
#[error("Reference contigs span {reference_bases} bases but only {common_bases} bases ({percent:.2}%) were found in common among our input files. \
Check that the sources were created on a common genome reference build. \
Common contigs: {common_names:?}; all reference contigs: {reference_names:?}")]
pub struct ContigMismatchError {
    pub reference_bases: u64,
    pub common_bases: u64,
    pub percent: f64,
    pub common_names: Vec<String>,
    pub reference_names: Vec<String>
}

/// Returns the contigs from the first set whose name and length are present in every other set.
/// Ordering and indices of the first set are preserved.
/// # Arguments
/// * `contig_sets` - the contig sets to compare, the first one defines the order
pub fn common_contigs(contig_sets: &[&[Contig]]) -> Vec<Contig> {
    let Some((first, others)) = contig_sets.split_first() else {
        return vec![];
    };

    first.iter()
        .filter(|c| {
            others.iter().all(|other| other.iter().any(|o| c.agrees_with(o)))
        })
        .cloned()
        .collect()
}

/// Reconciles the reference contigs against every other input and returns the agreed contig list.
/// Excluded contigs are removed from the reference before anything is compared, so they do not count against coverage.
/// # Arguments
/// * `ref_contigs` - contigs from the reference, in canonical order
/// * `other_contig_sets` - (label, contigs) for each other input, e.g. each BAM and the truth VCF
/// * `excluded_names` - contig names to drop up front
/// * `min_coverage_fraction` - minimum fraction of reference bases that must be shared
/// # Errors
/// * if the shared bases divided by the reference bases is strictly less than `min_coverage_fraction`
pub fn reconcile(
    ref_contigs: &[Contig],
    other_contig_sets: &[(String, Vec<Contig>)],
    excluded_names: &FxHashSet<String>,
    min_coverage_fraction: f64
) -> Result<Vec<Contig>, ContigMismatchError> {
    let kept: Vec<Contig> = ref_contigs.iter()
        .filter(|c| !excluded_names.contains(c.name()))
        .cloned()
        .collect();
    if kept.len() != ref_contigs.len() {
        debug!("Excluded {} reference contigs by name", ref_contigs.len() - kept.len());
    }

    let mut all_sets: Vec<&[Contig]> = vec![&kept];
    for (label, contigs) in other_contig_sets.iter() {
        debug!("Comparing {} contigs from {label} against the reference", contigs.len());
        all_sets.push(contigs);
    }
    let common = common_contigs(&all_sets);

    let reference_bases: u64 = kept.iter().map(|c| c.length()).sum();
    let common_bases: u64 = common.iter().map(|c| c.length()).sum();
    let fraction = if reference_bases > 0 {
        common_bases as f64 / reference_bases as f64
    } else {
        0.0
    };

    if fraction < min_coverage_fraction {
        return Err(ContigMismatchError {
            reference_bases,
            common_bases,
            percent: 100.0 * fraction,
            common_names: common.iter().map(|c| c.name().to_string()).collect(),
            reference_names: kept.iter().map(|c| c.name().to_string()).collect()
        });
    }

    info!(
        "Found {} common contigs covering {common_bases} of {reference_bases} reference bases ({:.2}%)",
        common.len(), 100.0 * fraction
    );
    Ok(common)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contigs(pairs: &[(&str, u64)]) -> Vec<Contig> {
        pairs.iter().enumerate()
            .map(|(i, &(n, l))| Contig::new(n, l, i))
            .collect()
    }

    #[test]
    fn test_common_contigs() {
        let reference = contigs(&[("chr1", 20), ("chrM", 10)]);
        let bam = contigs(&[("chrM", 10), ("chr1", 21)]);
        let common = common_contigs(&[&reference, &bam]);

        // index from the reference is kept
        assert_eq!(common, vec![Contig::new("chrM", 10, 1)]);
    }

    #[test]
    fn test_common_contigs_preserves_reference_order() {
        let reference = contigs(&[("1", 10), ("2", 20), ("3", 30)]);
        let bam = contigs(&[("3", 30), ("1", 10), ("2", 20)]);
        let vcf = contigs(&[("2", 20), ("3", 30)]);
        let names: Vec<String> = common_contigs(&[&reference, &bam, &vcf]).iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["2".to_string(), "3".to_string()]);
    }

    #[test]
    fn test_coverage_threshold() {
        let reference = contigs(&[("1", 100), ("2", 100)]);
        let others = vec![("reads".to_string(), contigs(&[("1", 100)]))];
        let excluded = FxHashSet::default();

        let err = reconcile(&reference, &others, &excluded, 0.6).unwrap_err();
        assert!(err.to_string().contains("span 200 bases"));
        assert_eq!(err.common_bases, 100);

        let ok = reconcile(&reference, &others, &excluded, 0.4).unwrap();
        assert_eq!(ok, vec![Contig::new("1", 100, 0)]);
    }

    #[test]
    fn test_exclusions_do_not_count() {
        let reference = contigs(&[("1", 100), ("2", 100), ("3", 100), ("4", 100), ("5", 100)]);
        let others = vec![("reads".to_string(), contigs(&[("1", 100), ("2", 100), ("3", 100)]))];
        let excluded: FxHashSet<String> = ["4".to_string(), "5".to_string()].into_iter().collect();
        let common = reconcile(&reference, &others, &excluded, 1.0).unwrap();
        assert_eq!(common.len(), 3);

        // without the exclusions, we only have 60%
        assert!(reconcile(&reference, &others, &FxHashSet::default(), 1.0).is_err());
    }

    #[test]
    fn test_empty_other_set() {
        let reference = contigs(&[("1", 100)]);
        let others = vec![("empty".to_string(), vec![])];
        let excluded = FxHashSet::default();
        assert!(reconcile(&reference, &others, &excluded, 0.1).is_err());

        // only a zero threshold can pass, with nothing in common
        let common = reconcile(&reference, &others, &excluded, 0.0).unwrap();
        assert!(common.is_empty());
    }

    #[test]
    fn test_no_other_sets() {
        // with nothing to compare against, everything agrees
        let reference = contigs(&[("1", 100), ("2", 50)]);
        let common = reconcile(&reference, &[], &FxHashSet::default(), 1.0).unwrap();
        assert_eq!(common, reference);
    }
}
