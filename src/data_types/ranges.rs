
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data_types::contig::ContigMap;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RangeError {
    #[error("range must have end > start: {contig}:{start}-{end}")]
    EmptyRange { contig: String, start: u64, end: u64 },
    #[error("invalid region literal: {literal:?}")]
    InvalidLiteral { literal: String },
}

/// A half-open genomic interval, [start, end) in 0-based coordinates
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Range {
    /// Contig name
    contig: String,
    /// First included base, 0-based
    start: u64,
    /// First excluded base, 0-based
    end: u64
}

impl Range {
    /// Creates a new half-open range.
    /// # Arguments
    /// * `contig` - the contig name
    /// * `start` - 0-based inclusive start
    /// * `end` - 0-based exclusive end
    /// # Errors
    /// * if `end <= start`
    pub fn new(contig: impl Into<String>, start: u64, end: u64) -> Result<Self, RangeError> {
        let contig = contig.into();
        if end <= start {
            return Err(RangeError::EmptyRange { contig, start, end });
        }
        Ok(Self { contig, start, end })
    }

    /// Number of bases spanned
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Ranges are never empty, this is only here to make clippy happy
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if the two ranges share at least one base
    pub fn overlaps(&self, other: &Range) -> bool {
        self.contig == other.contig && self.start < other.end && other.start < self.end
    }

    /// Returns true if `other` lies entirely inside this range
    pub fn envelops(&self, other: &Range) -> bool {
        self.contig == other.contig && self.start <= other.start && other.end <= self.end
    }

    /// Returns true if one range ends exactly where the other starts
    pub fn is_adjacent(&self, other: &Range) -> bool {
        self.contig == other.contig && (self.end == other.start || other.end == self.start)
    }

    /// Canonical sort key, (contig rank, start, end); None if the contig is unknown
    pub fn sort_key(&self, contigs: &ContigMap) -> Option<(usize, u64, u64)> {
        contigs.rank(&self.contig).map(|r| (r, self.start, self.end))
    }

    /// Formats this as a 1-based inclusive literal, e.g. "chr1:11-20" for [10, 20)
    pub fn to_literal(&self) -> String {
        format!("{}:{}-{}", self.contig, self.start + 1, self.end)
    }

    // getters
    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_literal())
    }
}

/// Parses a 1-based position that may contain thousands separators, e.g. "10,000"
fn parse_position(value: &str) -> Option<u64> {
    let cleaned: String = value.chars().filter(|&c| c != ',').collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<u64>().ok()
}

/// Parses a region literal into a half-open range.
/// Accepted forms are "contig:start-end" (1-based inclusive), "contig:pos" (a single base), and a bare "contig" for the full contig.
/// Only a trailing coordinate suffix is interpreted, so contig names that contain ':' still work as bare names.
/// # Arguments
/// * `literal` - the literal to parse
/// * `contigs` - the known contigs, used to resolve whole-contig literals and to drop unknown contigs
/// # Errors
/// * if the coordinates are malformed, zero, or reversed
/// # Returns
/// * `None` if the literal refers to a contig that is not in `contigs`
pub fn parse_literal(literal: &str, contigs: &ContigMap) -> Result<Option<Range>, RangeError> {
    let literal = literal.trim();
    let invalid = || RangeError::InvalidLiteral { literal: literal.to_string() };
    if literal.is_empty() {
        return Err(invalid());
    }

    // whole contig names take priority, this covers names like "HLA-A*01:01:01:01"
    if let Some(contig) = contigs.get(literal) {
        return Ok(contig.full_range());
    }

    let Some((contig, coords)) = literal.rsplit_once(':') else {
        // bare name that we do not know about
        return Ok(None);
    };
    if contig.is_empty() {
        return Err(invalid());
    }

    let (start, end) = match coords.split_once('-') {
        Some((s, e)) => {
            let s = parse_position(s).ok_or_else(invalid)?;
            let e = parse_position(e).ok_or_else(invalid)?;
            (s, e)
        },
        None => {
            let p = parse_position(coords).ok_or_else(invalid)?;
            (p, p)
        }
    };
    if start == 0 || end < start {
        return Err(invalid());
    }

    if !contigs.contains(contig) {
        return Ok(None);
    }

    // 1-based inclusive -> 0-based half-open
    Range::new(contig, start - 1, end).map(Some)
}

/// A normalized set of ranges, no two ranges on a contig overlap or touch.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RangeSet {
    /// Contig -> sorted, merged [start, end) pairs
    intervals: BTreeMap<String, Vec<(u64, u64)>>
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a normalized set from arbitrary ranges
    pub fn from_ranges<I: IntoIterator<Item = Range>>(ranges: I) -> Self {
        let mut intervals: BTreeMap<String, Vec<(u64, u64)>> = Default::default();
        for r in ranges.into_iter() {
            intervals.entry(r.contig).or_default().push((r.start, r.end));
        }
        for values in intervals.values_mut() {
            normalize(values);
        }
        Self { intervals }
    }

    /// All full-length contigs
    pub fn from_contigs(contigs: &ContigMap) -> Self {
        Self::from_ranges(contigs.full_ranges())
    }

    /// Adds a single range, merging with anything it overlaps or touches
    pub fn insert(&mut self, range: Range) {
        let entry = self.intervals.entry(range.contig).or_default();
        entry.push((range.start, range.end));
        normalize(entry);
    }

    /// Returns all bases in either set
    pub fn union(&self, other: &RangeSet) -> RangeSet {
        let mut intervals = self.intervals.clone();
        for (contig, values) in other.intervals.iter() {
            let entry = intervals.entry(contig.clone()).or_default();
            entry.extend(values.iter().copied());
            normalize(entry);
        }
        Self { intervals }
    }

    /// Returns only the bases covered by both sets
    pub fn intersection(&self, other: &RangeSet) -> RangeSet {
        let mut intervals: BTreeMap<String, Vec<(u64, u64)>> = Default::default();
        for (contig, values) in self.intervals.iter() {
            let Some(other_values) = other.intervals.get(contig) else {
                continue;
            };

            let mut shared = vec![];
            let (mut i, mut j) = (0, 0);
            while i < values.len() && j < other_values.len() {
                let (s1, e1) = values[i];
                let (s2, e2) = other_values[j];
                let start = s1.max(s2);
                let end = e1.min(e2);
                if start < end {
                    shared.push((start, end));
                }

                // advance whichever ends first
                if e1 < e2 {
                    i += 1;
                } else {
                    j += 1;
                }
            }

            if !shared.is_empty() {
                intervals.insert(contig.clone(), shared);
            }
        }
        Self { intervals }
    }

    /// Returns the bases in this set that are not in `other`.
    /// A range that has a hole cut out of its middle is split into two remnants.
    pub fn subtract(&self, other: &RangeSet) -> RangeSet {
        let mut intervals: BTreeMap<String, Vec<(u64, u64)>> = Default::default();
        for (contig, values) in self.intervals.iter() {
            let Some(other_values) = other.intervals.get(contig) else {
                intervals.insert(contig.clone(), values.clone());
                continue;
            };

            let mut remaining = vec![];
            let mut j = 0;
            for &(start, end) in values.iter() {
                let mut current = start;

                // skip any removals that end before this range
                while j < other_values.len() && other_values[j].1 <= current {
                    j += 1;
                }

                let mut k = j;
                while k < other_values.len() && other_values[k].0 < end {
                    let (rs, re) = other_values[k];
                    if rs > current {
                        remaining.push((current, rs));
                    }
                    current = current.max(re);
                    if current >= end {
                        break;
                    }
                    k += 1;
                }

                if current < end {
                    remaining.push((current, end));
                }
            }

            if !remaining.is_empty() {
                intervals.insert(contig.clone(), remaining);
            }
        }
        Self { intervals }
    }

    /// Keeps only the ranges on known contigs, clipped to the contig extents
    pub fn clip_to_contigs(&self, contigs: &ContigMap) -> RangeSet {
        self.intersection(&RangeSet::from_contigs(contigs))
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of disjoint ranges in the set
    pub fn len(&self) -> usize {
        self.intervals.values().map(|v| v.len()).sum()
    }

    /// Total number of bases covered
    pub fn total_bases(&self) -> u64 {
        self.intervals.values()
            .flat_map(|v| v.iter())
            .map(|(s, e)| e - s)
            .sum()
    }

    /// Returns true if the range is fully covered by one range in this set
    pub fn envelops(&self, range: &Range) -> bool {
        match self.intervals.get(range.contig()) {
            Some(values) => values.iter().any(|&(s, e)| s <= range.start() && range.end() <= e),
            None => false
        }
    }

    /// Returns the ranges in canonical order, (contig rank, start, end).
    /// Ranges on contigs that are not in `contigs` are dropped.
    pub fn sorted_ranges(&self, contigs: &ContigMap) -> Vec<Range> {
        let mut known: Vec<(usize, &String)> = self.intervals.keys()
            .filter_map(|c| contigs.rank(c).map(|r| (r, c)))
            .collect();
        known.sort();

        known.into_iter()
            .flat_map(|(_rank, contig)| {
                self.intervals[contig].iter()
                    .map(move |&(start, end)| Range { contig: contig.clone(), start, end })
            })
            .collect()
    }
}

/// Sorts and merges overlapping or touching intervals in place
fn normalize(values: &mut Vec<(u64, u64)>) {
    values.sort_unstable();
    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(values.len());
    for &(start, end) in values.iter() {
        match merged.last_mut() {
            Some(last) if start <= last.1 => {
                last.1 = last.1.max(end);
            },
            _ => merged.push((start, end))
        }
    }
    *values = merged;
}
