
use anyhow::Context;
use coitrees::{COITree, Interval, IntervalTree};
use std::collections::BTreeMap;
use std::path::Path;

use crate::data_types::ranges::Range;
use crate::parsing::noodles_helper::load_bed_ranges;

/// High-confidence truth regions, searchable per contig
#[derive(Clone)]
pub struct ConfidentRegions {
    /// Lookup from a chromosome to a COITree, which has 0-based inclusive ranges
    lookup_trees: BTreeMap<String, COITree<(), usize>>
}

impl std::fmt::Debug for ConfidentRegions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // COITree does not have Debug, so lets just convert it to a length for simplicity
        let lookup_counts: BTreeMap<String, usize> = self.lookup_trees.iter()
            .map(|(s, c)| {
                (s.clone(), c.len())
            })
            .collect();
        f.debug_struct("ConfidentRegions").field("lookup_trees_len", &lookup_counts).finish()
    }
}

impl ConfidentRegions {
    /// Loads a BED file of confident regions
    /// # Arguments
    /// * `bed_fn` - path to the .bed(.gz) file
    pub fn from_bed(bed_fn: &Path) -> anyhow::Result<Self> {
        let ranges = load_bed_ranges(bed_fn)
            .with_context(|| format!("Error while loading confident regions from {bed_fn:?}:"))?;
        Ok(Self::from_ranges(ranges))
    }

    /// Builds the lookup trees from half-open ranges
    pub fn from_ranges<I: IntoIterator<Item = Range>>(ranges: I) -> Self {
        let mut intervals: BTreeMap<String, Vec<Interval<()>>> = Default::default();
        for range in ranges.into_iter() {
            // 0-based half-open to 0-based inclusive
            let first = range.start() as i32;
            let last = range.end() as i32 - 1;
            intervals.entry(range.contig().to_string()).or_default()
                .push(Interval::new(first, last, ()));
        }

        let lookup_trees = intervals.into_iter()
            .map(|(chrom, coi_intervals)| (chrom, COITree::new(&coi_intervals)))
            .collect();
        Self {
            lookup_trees
        }
    }

    /// Returns true if the whole range lies inside a single confident interval
    pub fn envelops(&self, range: &Range) -> bool {
        let first = range.start() as i32;
        let last = range.end() as i32 - 1;
        match self.lookup_trees.get(range.contig()) {
            Some(coi_tree) => {
                let mut included = false;
                coi_tree.query(first, last, |i| {
                    if i.first <= first && i.last >= last {
                        included = true;
                    }
                });
                included
            },
            None => false
        }
    }

    /// Returns true if any base of the range is confident
    pub fn overlaps(&self, range: &Range) -> bool {
        match self.lookup_trees.get(range.contig()) {
            Some(coi_tree) => coi_tree.query_count(range.start() as i32, range.end() as i32 - 1) > 0,
            None => false
        }
    }

    /// Total number of confident intervals
    pub fn len(&self) -> usize {
        self.lookup_trees.values().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn r(contig: &str, start: u64, end: u64) -> Range {
        Range::new(contig, start, end).unwrap()
    }

    #[test]
    fn test_envelops() {
        let confident = ConfidentRegions::from_ranges(vec![r("chr1", 10, 20), r("chr1", 20, 30), r("chr2", 0, 5)]);
        assert_eq!(confident.len(), 3);
        assert!(confident.envelops(&r("chr1", 10, 11)));
        assert!(confident.envelops(&r("chr1", 15, 20)));
        assert!(!confident.envelops(&r("chr1", 9, 11)));
        // touching intervals are not merged, so a span across them is not enveloped
        assert!(!confident.envelops(&r("chr1", 18, 22)));
        assert!(confident.overlaps(&r("chr1", 18, 22)));
        assert!(!confident.overlaps(&r("chr1", 30, 40)));
        assert!(!confident.envelops(&r("chr3", 0, 1)));
    }

    #[test]
    fn test_from_bed() {
        let mut bed_file = tempfile::Builder::new().suffix(".bed").tempfile().unwrap();
        writeln!(bed_file, "chr1\t100\t200").unwrap();
        bed_file.flush().unwrap();

        let confident = ConfidentRegions::from_bed(bed_file.path()).unwrap();
        assert!(confident.envelops(&r("chr1", 100, 200)));
        assert!(!confident.envelops(&r("chr1", 99, 101)));
        assert!(!confident.envelops(&r("chr1", 199, 201)));
    }
}
