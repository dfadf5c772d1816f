
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::data_types::ranges::Range;

/// A named reference sequence with its length and its rank in the agreed contig ordering
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Contig {
    /// The contig name, e.g. "chr20"
    name: String,
    /// Number of bases in the contig
    length: u64,
    /// Rank in the canonical ordering, which is the reference ordering
    index: usize
}

impl Contig {
    /// Constructor
    pub fn new(name: impl Into<String>, length: u64, index: usize) -> Self {
        Self {
            name: name.into(),
            length,
            index
        }
    }

    /// Returns true if the name and length match; index is ignored since different sources order contigs differently
    pub fn agrees_with(&self, other: &Contig) -> bool {
        self.name == other.name && self.length == other.length
    }

    /// Returns the full-length range for this contig, or None for a zero-length contig
    pub fn full_range(&self) -> Option<Range> {
        if self.length == 0 {
            None
        } else {
            Range::new(self.name.clone(), 0, self.length).ok()
        }
    }

    // getters
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Ordered lookup from contig name to contig, this defines the canonical sort order for all ranges
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContigMap {
    contigs: IndexMap<String, Contig>
}

impl ContigMap {
    /// Builds the map from an ordered list of contigs.
    /// Ordering follows each contig's `index` so callers can pass them in any order.
    pub fn new(mut contigs: Vec<Contig>) -> Self {
        contigs.sort_by_key(|c| c.index());
        let contigs = contigs.into_iter()
            .map(|c| (c.name().to_string(), c))
            .collect();
        Self { contigs }
    }

    /// Convenience constructor from (name, length) pairs, indices are assigned in the given order
    pub fn from_name_lengths<S: Into<String>>(pairs: impl IntoIterator<Item = (S, u64)>) -> Self {
        let contigs = pairs.into_iter()
            .enumerate()
            .map(|(i, (name, length))| Contig::new(name, length, i))
            .collect();
        Self::new(contigs)
    }

    pub fn get(&self, name: &str) -> Option<&Contig> {
        self.contigs.get(name)
    }

    /// Returns the canonical rank of a contig, if it is known
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.contigs.get_index_of(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contigs.contains_key(name)
    }

    /// Iterates in canonical order
    pub fn iter(&self) -> impl Iterator<Item = &Contig> {
        self.contigs.values()
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    /// Sum of all contig lengths
    pub fn total_length(&self) -> u64 {
        self.contigs.values().map(|c| c.length()).sum()
    }

    /// Full-length ranges for every non-empty contig, in canonical order
    pub fn full_ranges(&self) -> Vec<Range> {
        self.contigs.values()
            .filter_map(|c| c.full_range())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.contigs.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contig_map_order() {
        let contigs = vec![
            Contig::new("b", 10, 1),
            Contig::new("a", 20, 0),
            Contig::new("c", 0, 2)
        ];
        let contig_map = ContigMap::new(contigs);
        assert_eq!(contig_map.names(), vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(contig_map.rank("b"), Some(1));
        assert_eq!(contig_map.rank("missing"), None);
        assert_eq!(contig_map.total_length(), 30);

        // the zero-length contig has no range
        let full = contig_map.full_ranges();
        assert_eq!(full.len(), 2);
        assert_eq!(full[0], Range::new("a", 0, 20).unwrap());
    }

    #[test]
    fn test_agrees_with() {
        let c1 = Contig::new("chr1", 100, 0);
        assert!(c1.agrees_with(&Contig::new("chr1", 100, 5)));
        assert!(!c1.agrees_with(&Contig::new("chr1", 101, 0)));
        assert!(!c1.agrees_with(&Contig::new("1", 100, 0)));
    }
}
