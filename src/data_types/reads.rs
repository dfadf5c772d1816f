
use anyhow::{bail, ensure};
use derive_builder::Builder;
use serde::Serialize;

use crate::data_types::ranges::Range;

/// CIGAR operation kinds, mirroring the SAM specification
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub enum CigarKind {
    Match,
    Insertion,
    Deletion,
    Skip,
    SoftClip,
    HardClip,
    Pad,
    SequenceMatch,
    SequenceMismatch
}

impl CigarKind {
    pub fn consumes_reference(&self) -> bool {
        matches!(self, CigarKind::Match | CigarKind::Deletion | CigarKind::Skip | CigarKind::SequenceMatch | CigarKind::SequenceMismatch)
    }

    pub fn consumes_read(&self) -> bool {
        matches!(self, CigarKind::Match | CigarKind::Insertion | CigarKind::SoftClip | CigarKind::SequenceMatch | CigarKind::SequenceMismatch)
    }

    /// Match-like operations pair one read base with one reference base
    pub fn is_aligned(&self) -> bool {
        matches!(self, CigarKind::Match | CigarKind::SequenceMatch | CigarKind::SequenceMismatch)
    }

    fn symbol(&self) -> char {
        match self {
            CigarKind::Match => 'M',
            CigarKind::Insertion => 'I',
            CigarKind::Deletion => 'D',
            CigarKind::Skip => 'N',
            CigarKind::SoftClip => 'S',
            CigarKind::HardClip => 'H',
            CigarKind::Pad => 'P',
            CigarKind::SequenceMatch => '=',
            CigarKind::SequenceMismatch => 'X'
        }
    }
}

/// A single CIGAR operation
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct CigarOp {
    pub kind: CigarKind,
    pub len: u32
}

impl CigarOp {
    pub fn new(kind: CigarKind, len: u32) -> Self {
        Self { kind, len }
    }
}

/// Parses a CIGAR string such as "10M2I5M"
/// # Errors
/// * if the string has an unknown operation, a missing length, or a zero length
pub fn parse_cigar(cigar: &str) -> anyhow::Result<Vec<CigarOp>> {
    let mut ret = vec![];
    let mut length: u32 = 0;
    let mut has_digits = false;
    for c in cigar.chars() {
        if let Some(d) = c.to_digit(10) {
            length = length.checked_mul(10)
                .and_then(|l| l.checked_add(d))
                .ok_or_else(|| anyhow::anyhow!("CIGAR length overflow in {cigar:?}"))?;
            has_digits = true;
            continue;
        }

        let kind = match c {
            'M' => CigarKind::Match,
            'I' => CigarKind::Insertion,
            'D' => CigarKind::Deletion,
            'N' => CigarKind::Skip,
            'S' => CigarKind::SoftClip,
            'H' => CigarKind::HardClip,
            'P' => CigarKind::Pad,
            '=' => CigarKind::SequenceMatch,
            'X' => CigarKind::SequenceMismatch,
            _ => bail!("Unknown CIGAR operation {c:?} in {cigar:?}")
        };
        ensure!(has_digits && length > 0, "CIGAR operation {c:?} is missing a length in {cigar:?}");
        ret.push(CigarOp::new(kind, length));
        length = 0;
        has_digits = false;
    }
    ensure!(!has_digits, "CIGAR string {cigar:?} ends with a dangling length");
    Ok(ret)
}

/// Formats CIGAR ops back into a string
pub fn cigar_string(ops: &[CigarOp]) -> String {
    ops.iter()
        .map(|op| format!("{}{}", op.len, op.kind.symbol()))
        .collect()
}

/// SAM flags that matter to read filtering and pileups
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ReadFlags {
    pub reverse_strand: bool,
    pub duplicate: bool,
    pub secondary: bool,
    pub supplementary: bool,
    pub qc_fail: bool,
    pub unmapped: bool
}

/// An aligned read with the fields we need downstream
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AlignedRead {
    /// Read name
    name: String,
    /// Contig the read is aligned to
    contig: String,
    /// 0-based reference position of the first aligned base
    start: u64,
    /// Alignment operations
    cigar: Vec<CigarOp>,
    /// Read bases, including soft-clipped bases
    bases: Vec<u8>,
    /// Phred base qualities, same length as `bases`
    qualities: Vec<u8>,
    /// Mapping quality
    mapping_quality: u8,
    /// SAM flags
    flags: ReadFlags
}

impl AlignedRead {
    /// Creates a new read.
    /// # Errors
    /// * if the CIGAR read length does not match the bases
    /// * if the qualities do not match the bases
    pub fn new(
        name: impl Into<String>, contig: impl Into<String>, start: u64, cigar: Vec<CigarOp>,
        bases: Vec<u8>, qualities: Vec<u8>, mapping_quality: u8
    ) -> anyhow::Result<Self> {
        let name = name.into();
        let read_len: u64 = cigar.iter()
            .filter(|op| op.kind.consumes_read())
            .map(|op| op.len as u64)
            .sum();
        ensure!(
            read_len == bases.len() as u64,
            "Read {name:?} has {} bases but CIGAR {} consumes {read_len}", bases.len(), cigar_string(&cigar)
        );
        ensure!(
            qualities.len() == bases.len(),
            "Read {name:?} has {} bases but {} qualities", bases.len(), qualities.len()
        );
        Ok(Self {
            name,
            contig: contig.into(),
            start,
            cigar,
            bases,
            qualities,
            mapping_quality,
            flags: ReadFlags::default()
        })
    }

    /// Replaces the flags
    pub fn with_flags(mut self, flags: ReadFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Returns the 0-based exclusive reference end
    pub fn end(&self) -> u64 {
        self.start + self.cigar.iter()
            .filter(|op| op.kind.consumes_reference())
            .map(|op| op.len as u64)
            .sum::<u64>()
    }

    /// Returns true if any reference base of the read falls in the range
    pub fn overlaps(&self, range: &Range) -> bool {
        self.contig == range.contig() && self.start < range.end() && range.start() < self.end()
    }

    /// Returns each CIGAR operation with the reference and read offsets at which it begins
    pub fn walk(&self) -> Vec<(CigarOp, u64, usize)> {
        let mut ret = Vec::with_capacity(self.cigar.len());
        let mut ref_pos = self.start;
        let mut read_pos = 0;
        for &op in self.cigar.iter() {
            ret.push((op, ref_pos, read_pos));
            if op.kind.consumes_reference() {
                ref_pos += op.len as u64;
            }
            if op.kind.consumes_read() {
                read_pos += op.len as usize;
            }
        }
        ret
    }

    /// Returns the (base, quality) aligned to a reference position, None if the position is deleted or not covered
    pub fn base_at(&self, position: u64) -> Option<(u8, u8)> {
        if position < self.start {
            return None;
        }
        for (op, ref_pos, read_pos) in self.walk() {
            let op_end = ref_pos + op.len as u64;
            if op.kind.consumes_reference() && ref_pos <= position && position < op_end {
                if op.kind.is_aligned() {
                    let offset = read_pos + (position - ref_pos) as usize;
                    return Some((self.bases[offset], self.qualities[offset]));
                }
                return None;
            }
            if ref_pos > position {
                break;
            }
        }
        None
    }

    /// Trims the read to the bases aligned inside `range`.
    /// Soft clips are dropped, and leading or trailing indels are removed so the result starts and ends with aligned bases.
    /// Returns None when nothing of the read is aligned inside the range.
    pub fn trim_to(&self, range: &Range) -> Option<AlignedRead> {
        if !self.overlaps(range) {
            return None;
        }

        let mut new_start: Option<u64> = None;
        let mut ops: Vec<CigarOp> = vec![];
        let mut bases: Vec<u8> = vec![];
        let mut quals: Vec<u8> = vec![];
        for (op, ref_pos, read_pos) in self.walk() {
            let len = op.len as u64;
            match op.kind {
                k if k.is_aligned() => {
                    let os = ref_pos.max(range.start());
                    let oe = (ref_pos + len).min(range.end());
                    if os < oe {
                        new_start.get_or_insert(os);
                        let offset = read_pos + (os - ref_pos) as usize;
                        let count = (oe - os) as usize;
                        ops.push(CigarOp::new(CigarKind::Match, count as u32));
                        bases.extend_from_slice(&self.bases[offset..offset + count]);
                        quals.extend_from_slice(&self.qualities[offset..offset + count]);
                    }
                },
                CigarKind::Insertion => {
                    if new_start.is_some() && ref_pos < range.end() {
                        ops.push(op);
                        bases.extend_from_slice(&self.bases[read_pos..read_pos + op.len as usize]);
                        quals.extend_from_slice(&self.qualities[read_pos..read_pos + op.len as usize]);
                    }
                },
                CigarKind::Deletion | CigarKind::Skip => {
                    let os = ref_pos.max(range.start());
                    let oe = (ref_pos + len).min(range.end());
                    if new_start.is_some() && os < oe {
                        ops.push(CigarOp::new(op.kind, (oe - os) as u32));
                    }
                },
                _ => {}
            }
        }

        // drop any trailing indels
        while let Some(last) = ops.last() {
            if last.kind.is_aligned() {
                break;
            }
            if last.kind == CigarKind::Insertion {
                let new_len = bases.len() - last.len as usize;
                bases.truncate(new_len);
                quals.truncate(new_len);
            }
            ops.pop();
        }

        let start = new_start?;
        let mut trimmed = AlignedRead::new(
            self.name.clone(), self.contig.clone(), start, merge_ops(ops),
            bases, quals, self.mapping_quality
        ).ok()?;
        trimmed.flags = self.flags;
        Some(trimmed)
    }

    // getters
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contig(&self) -> &str {
        &self.contig
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn cigar(&self) -> &[CigarOp] {
        &self.cigar
    }

    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    pub fn qualities(&self) -> &[u8] {
        &self.qualities
    }

    pub fn mapping_quality(&self) -> u8 {
        self.mapping_quality
    }

    pub fn flags(&self) -> ReadFlags {
        self.flags
    }
}

/// Merges adjacent operations of the same kind
fn merge_ops(ops: Vec<CigarOp>) -> Vec<CigarOp> {
    let mut merged: Vec<CigarOp> = Vec::with_capacity(ops.len());
    for op in ops.into_iter() {
        match merged.last_mut() {
            Some(last) if last.kind == op.kind => last.len += op.len,
            _ => merged.push(op)
        }
    }
    merged
}

/// Filters applied to every read before it enters a sample buffer
#[derive(Builder, Clone, Copy, Debug, Serialize)]
#[builder(default)]
pub struct ReadRequirements {
    /// Reads below this mapping quality are dropped
    pub min_mapping_quality: u8,
    /// Bases below this quality are ignored by the candidate caller
    pub min_base_quality: u8,
    /// If true, keep reads flagged as duplicates
    pub keep_duplicates: bool,
    /// If true, keep secondary alignments
    pub keep_secondary_alignments: bool,
    /// If true, keep supplementary alignments
    pub keep_supplementary_alignments: bool
}

impl Default for ReadRequirements {
    fn default() -> Self {
        Self {
            min_mapping_quality: 5,
            min_base_quality: 10,
            keep_duplicates: false,
            keep_secondary_alignments: false,
            keep_supplementary_alignments: false
        }
    }
}

impl ReadRequirements {
    /// Returns true if the read should be kept
    pub fn passes(&self, read: &AlignedRead) -> bool {
        let flags = read.flags();
        if flags.unmapped || flags.qc_fail {
            return false;
        }
        if flags.duplicate && !self.keep_duplicates {
            return false;
        }
        if flags.secondary && !self.keep_secondary_alignments {
            return false;
        }
        if flags.supplementary && !self.keep_supplementary_alignments {
            return false;
        }
        read.mapping_quality() >= self.min_mapping_quality
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_read(start: u64, cigar: &str, bases: &[u8]) -> AlignedRead {
        AlignedRead::new(
            "read1", "chr1", start, parse_cigar(cigar).unwrap(),
            bases.to_vec(), vec![30; bases.len()], 60
        ).unwrap()
    }

    #[test]
    fn test_parse_cigar() {
        let ops = parse_cigar("5S10M2I3D1=1X").unwrap();
        assert_eq!(ops.len(), 6);
        assert_eq!(ops[0], CigarOp::new(CigarKind::SoftClip, 5));
        assert_eq!(ops[3], CigarOp::new(CigarKind::Deletion, 3));
        assert_eq!(cigar_string(&ops), "5S10M2I3D1=1X");

        assert!(parse_cigar("10Q").is_err());
        assert!(parse_cigar("M").is_err());
        assert!(parse_cigar("10M5").is_err());
        assert!(parse_cigar("0M").is_err());
    }

    #[test]
    fn test_read_validation() {
        let result = AlignedRead::new("r", "chr1", 0, parse_cigar("5M").unwrap(), b"ACGT".to_vec(), vec![30; 4], 60);
        assert!(result.is_err());
        let result = AlignedRead::new("r", "chr1", 0, parse_cigar("4M").unwrap(), b"ACGT".to_vec(), vec![30; 3], 60);
        assert!(result.is_err());
    }

    #[test]
    fn test_end_and_base_at() {
        // ref:  10 11 12 13 14 15
        // read: A  C  -  -  G  T, with 2 soft-clipped bases and "TT" inserted between 14 and 15
        let read = make_read(10, "2S2M2D1M2I1M", b"NNACGTTT");
        assert_eq!(read.end(), 16);
        assert_eq!(read.base_at(9), None);
        assert_eq!(read.base_at(10), Some((b'A', 30)));
        assert_eq!(read.base_at(11), Some((b'C', 30)));
        assert_eq!(read.base_at(12), None);
        assert_eq!(read.base_at(14), Some((b'G', 30)));
        assert_eq!(read.base_at(15), Some((b'T', 30)));
        assert_eq!(read.base_at(16), None);
        assert!(read.overlaps(&Range::new("chr1", 15, 20).unwrap()));
        assert!(!read.overlaps(&Range::new("chr1", 16, 20).unwrap()));
        assert!(!read.overlaps(&Range::new("chr2", 10, 20).unwrap()));
    }

    #[test]
    fn test_trim_to() {
        let read = make_read(10, "2S10M", b"NNACGTACGTAC");

        // middle of the read
        let trimmed = read.trim_to(&Range::new("chr1", 12, 15).unwrap()).unwrap();
        assert_eq!(trimmed.start(), 12);
        assert_eq!(trimmed.bases(), b"GTA");
        assert_eq!(cigar_string(trimmed.cigar()), "3M");

        // window covering everything drops the soft clip
        let trimmed = read.trim_to(&Range::new("chr1", 0, 100).unwrap()).unwrap();
        assert_eq!(trimmed.start(), 10);
        assert_eq!(trimmed.bases(), b"ACGTACGTAC");

        // no overlap
        assert!(read.trim_to(&Range::new("chr1", 20, 30).unwrap()).is_none());
    }

    #[test]
    fn test_trim_to_indels() {
        // 3M 2I 2M 2D 3M starting at 100 covers 100..110
        let read = make_read(100, "3M2I2M2D3M", b"AAATTCCGGG");
        assert_eq!(read.end(), 110);

        // starting inside the deletion moves the start to the next aligned base
        let trimmed = read.trim_to(&Range::new("chr1", 105, 110).unwrap()).unwrap();
        assert_eq!(trimmed.start(), 107);
        assert_eq!(trimmed.bases(), b"GGG");
        assert_eq!(cigar_string(trimmed.cigar()), "3M");

        // ending right after the insertion drops it
        let trimmed = read.trim_to(&Range::new("chr1", 100, 103).unwrap()).unwrap();
        assert_eq!(trimmed.bases(), b"AAA");
        assert_eq!(cigar_string(trimmed.cigar()), "3M");

        // keeps interior indels
        let trimmed = read.trim_to(&Range::new("chr1", 101, 108).unwrap()).unwrap();
        assert_eq!(trimmed.bases(), b"AATTCCG");
        assert_eq!(cigar_string(trimmed.cigar()), "2M2I2M2D1M");
    }

    #[test]
    fn test_read_requirements() {
        let requirements = ReadRequirementsBuilder::default()
            .min_mapping_quality(20)
            .build().unwrap();
        let read = make_read(0, "4M", b"ACGT");
        assert!(requirements.passes(&read));

        let duplicate = read.clone().with_flags(ReadFlags { duplicate: true, ..Default::default() });
        assert!(!requirements.passes(&duplicate));
        let keep_dups = ReadRequirementsBuilder::default().keep_duplicates(true).build().unwrap();
        assert!(keep_dups.passes(&duplicate));

        let qc_fail = read.clone().with_flags(ReadFlags { qc_fail: true, ..Default::default() });
        assert!(!keep_dups.passes(&qc_fail));

        let low_mapq = AlignedRead::new("r", "chr1", 0, parse_cigar("4M").unwrap(), b"ACGT".to_vec(), vec![30; 4], 10).unwrap();
        assert!(!requirements.passes(&low_mapq));
    }
}
